use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::equipment::{EquipmentService, RecordHoursRequest};
use super::faults::{FaultService, ReportFaultRequest};
use super::inventory::{AdjustStockRequest, InventoryService};
use super::is_unique_violation;
use crate::auth::{consts as perm, AuthUser};
use crate::entities::sync_operation;
use crate::errors::ServiceError;
use crate::metrics::DOMAIN_METRICS;

pub const MAX_BATCH: usize = 100;

/// Stored status of an operation that a replay has claimed but not finished
const PENDING: &str = "pending";

enum Claim {
    Owned(Uuid),
    Taken(sync_operation::Model),
}

/// Operation kinds an offline client can queue
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display, strum::EnumString,
)]
pub enum SyncOpType {
    #[serde(rename = "fault.report")]
    #[strum(serialize = "fault.report")]
    FaultReport,
    #[serde(rename = "equipment.hours")]
    #[strum(serialize = "equipment.hours")]
    EquipmentHours,
    #[serde(rename = "part.adjust")]
    #[strum(serialize = "part.adjust")]
    PartAdjust,
}

impl SyncOpType {
    fn permission(self) -> &'static str {
        match self {
            SyncOpType::FaultReport => perm::FAULTS_CREATE,
            SyncOpType::EquipmentHours => perm::EQUIPMENT_LOG,
            SyncOpType::PartAdjust => perm::PARTS_ADJUST,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct QueuedOperation {
    #[validate(length(min = 1, max = 100))]
    pub client_op_id: String,
    pub op_type: SyncOpType,
    pub payload: Value,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SyncRequest {
    #[validate]
    pub operations: Vec<QueuedOperation>,
}

#[derive(Debug, Deserialize)]
struct EquipmentHoursPayload {
    equipment_id: Uuid,
    running_hours: i64,
}

#[derive(Debug, Deserialize)]
struct PartAdjustPayload {
    part_id: Uuid,
    delta: i32,
    reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncStatus {
    Applied,
    Duplicate,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncResult {
    pub client_op_id: String,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    pub applied: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub results: Vec<SyncResult>,
}

/// Replays operations queued by an offline technician client. Each client
/// operation id is applied at most once per user.
#[derive(Clone)]
pub struct SyncService {
    db: Arc<DatabaseConnection>,
    faults: Arc<FaultService>,
    equipment: Arc<EquipmentService>,
    inventory: Arc<InventoryService>,
}

impl SyncService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        faults: Arc<FaultService>,
        equipment: Arc<EquipmentService>,
        inventory: Arc<InventoryService>,
    ) -> Self {
        Self {
            db,
            faults,
            equipment,
            inventory,
        }
    }

    #[instrument(skip(self, user, req), fields(ops = req.operations.len()))]
    pub async fn apply_batch(
        &self,
        user: &AuthUser,
        req: SyncRequest,
    ) -> Result<SyncResponse, ServiceError> {
        req.validate()?;
        if req.operations.len() > MAX_BATCH {
            return Err(ServiceError::ValidationError(format!(
                "At most {} operations per sync",
                MAX_BATCH
            )));
        }
        let mut response = SyncResponse {
            applied: 0,
            duplicates: 0,
            failed: 0,
            results: Vec::with_capacity(req.operations.len()),
        };
        for op in req.operations {
            let result = self.apply_one(user, op).await?;
            match result.status {
                SyncStatus::Applied => response.applied += 1,
                SyncStatus::Duplicate => response.duplicates += 1,
                SyncStatus::Failed => response.failed += 1,
            }
            response.results.push(result);
        }
        info!(
            applied = response.applied,
            duplicates = response.duplicates,
            failed = response.failed,
            "sync batch processed"
        );
        Ok(response)
    }

    async fn apply_one(
        &self,
        user: &AuthUser,
        op: QueuedOperation,
    ) -> Result<SyncResult, ServiceError> {
        let row_id = match self.claim(user, &op).await? {
            Claim::Owned(id) => id,
            Claim::Taken(prev) => {
                return Ok(SyncResult {
                    client_op_id: op.client_op_id,
                    status: SyncStatus::Duplicate,
                    result: prev
                        .result
                        .as_deref()
                        .and_then(|r| serde_json::from_str(r).ok()),
                    error: None,
                });
            }
        };

        let outcome = if user.is_admin() || user.has_permission(op.op_type.permission()) {
            self.execute(user, op.op_type, op.payload).await
        } else {
            Err(ServiceError::Forbidden(format!(
                "Missing permission {}",
                op.op_type.permission()
            )))
        };
        let (status, result, error) = match outcome {
            Ok(value) => (SyncStatus::Applied, Some(value), None),
            Err(e) => {
                warn!(client_op_id = %op.client_op_id, op_type = %op.op_type, error = %e, "sync operation failed");
                (SyncStatus::Failed, None, Some(e.response_message()))
            }
        };

        sync_operation::Entity::update_many()
            .col_expr(sync_operation::Column::Status, Expr::value(status.to_string()))
            .col_expr(
                sync_operation::Column::Result,
                Expr::value(result.as_ref().map(Value::to_string)),
            )
            .col_expr(sync_operation::Column::Error, Expr::value(error.clone()))
            .filter(sync_operation::Column::Id.eq(row_id))
            .exec(&*self.db)
            .await?;

        if status == SyncStatus::Applied {
            DOMAIN_METRICS.sync_operations_applied.inc();
        }
        Ok(SyncResult {
            client_op_id: op.client_op_id,
            status,
            result,
            error,
        })
    }

    /// Takes ownership of a client op id before anything is executed. A new id
    /// is claimed by inserting a pending row; a failed one by flipping it back
    /// to pending. Anything else belongs to another replay.
    async fn claim(&self, user: &AuthUser, op: &QueuedOperation) -> Result<Claim, ServiceError> {
        let inserted = sync_operation::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.user_id),
            client_op_id: Set(op.client_op_id.clone()),
            op_type: Set(op.op_type.to_string()),
            status: Set(PENDING.to_string()),
            result: Set(None),
            error: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await;
        match inserted {
            Ok(row) => return Ok(Claim::Owned(row.id)),
            Err(e) if is_unique_violation(&e) => {}
            Err(e) => return Err(e.into()),
        }

        let existing = sync_operation::Entity::find()
            .filter(sync_operation::Column::UserId.eq(user.user_id))
            .filter(sync_operation::Column::ClientOpId.eq(op.client_op_id.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "sync operation {} conflicted but was not found",
                    op.client_op_id
                ))
            })?;
        if existing.status == SyncStatus::Failed.to_string() {
            let retried = sync_operation::Entity::update_many()
                .col_expr(sync_operation::Column::Status, Expr::value(PENDING))
                .filter(sync_operation::Column::Id.eq(existing.id))
                .filter(sync_operation::Column::Status.eq(SyncStatus::Failed.to_string()))
                .exec(&*self.db)
                .await?;
            if retried.rows_affected == 1 {
                return Ok(Claim::Owned(existing.id));
            }
        }
        Ok(Claim::Taken(existing))
    }

    async fn execute(
        &self,
        user: &AuthUser,
        op_type: SyncOpType,
        payload: Value,
    ) -> Result<Value, ServiceError> {
        match op_type {
            SyncOpType::FaultReport => {
                let req: ReportFaultRequest = serde_json::from_value(payload)?;
                let fault = self.faults.report(user, req).await?;
                Ok(serde_json::to_value(fault)?)
            }
            SyncOpType::EquipmentHours => {
                let p: EquipmentHoursPayload = serde_json::from_value(payload)?;
                let equipment = self
                    .equipment
                    .record_hours(
                        user,
                        p.equipment_id,
                        RecordHoursRequest {
                            running_hours: p.running_hours,
                        },
                    )
                    .await?;
                Ok(serde_json::to_value(equipment)?)
            }
            SyncOpType::PartAdjust => {
                let p: PartAdjustPayload = serde_json::from_value(payload)?;
                let adjusted = self
                    .inventory
                    .adjust(
                        user,
                        p.part_id,
                        AdjustStockRequest {
                            delta: p.delta,
                            reason: p.reason,
                        },
                    )
                    .await?;
                Ok(serde_json::to_value(adjusted.part)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_types_use_dotted_names() {
        let op: QueuedOperation = serde_json::from_value(serde_json::json!({
            "client_op_id": "tablet-7:42",
            "op_type": "part.adjust",
            "payload": {"part_id": Uuid::nil(), "delta": -1}
        }))
        .unwrap();
        assert_eq!(op.op_type, SyncOpType::PartAdjust);
        assert_eq!(op.op_type.to_string(), "part.adjust");
        assert_eq!(SyncOpType::FaultReport.permission(), "faults:create");
    }
}
