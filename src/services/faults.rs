use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::notifications::{NewNotification, NotificationService};
use super::vessels::VesselService;
use super::{fetch_page, Page};
use crate::auth::{AuthUser, UserRole};
use crate::entities::equipment::{self, EquipmentStatus};
use crate::entities::fault::{self, FaultSeverity, FaultStatus};
use crate::entities::user;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ReportFaultRequest {
    pub vessel_id: Uuid,
    pub equipment_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
    pub severity: FaultSeverity,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateFaultStatusRequest {
    pub status: FaultStatus,
    #[validate(length(max = 5000))]
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignFaultRequest {
    /// `null` unassigns
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FaultFilter {
    pub vessel_id: Option<Uuid>,
    pub status: Option<FaultStatus>,
    pub severity: Option<FaultSeverity>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Clone)]
pub struct FaultService {
    db: Arc<DatabaseConnection>,
    notifications: Arc<NotificationService>,
    event_sender: EventSender,
}

impl FaultService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        notifications: Arc<NotificationService>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            notifications,
            event_sender,
        }
    }

    pub async fn get(&self, user: &AuthUser, id: Uuid) -> Result<fault::Model, ServiceError> {
        fault::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|f| user.can_access(f.company_id))
            .ok_or_else(|| ServiceError::not_found("Fault", id))
    }

    /// A critical fault takes its equipment out of service and alerts the
    /// company managers
    #[instrument(skip(self, user, req), fields(severity = %req.severity))]
    pub async fn report(
        &self,
        user: &AuthUser,
        req: ReportFaultRequest,
    ) -> Result<fault::Model, ServiceError> {
        req.validate()?;
        let txn = self.db.begin().await?;
        let vessel = VesselService::find_scoped(&txn, user, req.vessel_id).await?;
        let equipment = match req.equipment_id {
            Some(equipment_id) => Some(
                equipment::Entity::find_by_id(equipment_id)
                    .one(&txn)
                    .await?
                    .filter(|e| e.vessel_id == vessel.id)
                    .ok_or_else(|| {
                        ServiceError::ValidationError(
                            "equipment_id does not belong to this vessel".into(),
                        )
                    })?,
            ),
            None => None,
        };

        let now = Utc::now();
        let created = fault::ActiveModel {
            id: Set(Uuid::new_v4()),
            vessel_id: Set(vessel.id),
            company_id: Set(vessel.company_id),
            equipment_id: Set(equipment.as_ref().map(|e| e.id)),
            title: Set(req.title.trim().to_string()),
            description: Set(req.description),
            severity: Set(req.severity.to_string()),
            status: Set(FaultStatus::Open.to_string()),
            reported_by: Set(user.user_id),
            assigned_to: Set(None),
            resolution_notes: Set(None),
            resolved_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        if req.severity == FaultSeverity::Critical {
            if let Some(eq) = equipment {
                let name = eq.name.clone();
                let mut active: equipment::ActiveModel = eq.into();
                active.status = Set(EquipmentStatus::Faulty.to_string());
                active.updated_at = Set(now);
                active.update(&txn).await?;
                info!(equipment = %name, "equipment marked faulty");
            }
            self.notifications
                .notify_company_roles(
                    &txn,
                    vessel.company_id,
                    &[UserRole::Manager],
                    NewNotification::new(
                        "critical_fault",
                        format!("Critical fault on {}: {}", vessel.name, created.title),
                        format!("Reported by {}. {}", user.display_name(), created.description),
                    )
                    .about("fault", created.id),
                )
                .await?;
        }
        txn.commit().await?;

        self.event_sender.emit(Event::FaultReported {
            fault_id: created.id,
            vessel_id: created.vessel_id,
            severity: created.severity.clone(),
        });
        Ok(created)
    }

    pub async fn list(
        &self,
        user: &AuthUser,
        filter: FaultFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<fault::Model>, ServiceError> {
        let mut query = fault::Entity::find();
        if let Some(company_id) = user.tenant_filter() {
            query = query.filter(fault::Column::CompanyId.eq(company_id));
        }
        if let Some(vessel_id) = filter.vessel_id {
            query = query.filter(fault::Column::VesselId.eq(vessel_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(fault::Column::Status.eq(status.to_string()));
        }
        if let Some(severity) = filter.severity {
            query = query.filter(fault::Column::Severity.eq(severity.to_string()));
        }
        if let Some(assignee) = filter.assigned_to {
            query = query.filter(fault::Column::AssignedTo.eq(assignee));
        }
        fetch_page(
            &self.db,
            query.order_by_desc(fault::Column::CreatedAt),
            page,
            per_page,
        )
        .await
    }

    #[instrument(skip(self, user, req))]
    pub async fn assign(
        &self,
        user: &AuthUser,
        id: Uuid,
        req: AssignFaultRequest,
    ) -> Result<fault::Model, ServiceError> {
        let existing = self.get(user, id).await?;
        let txn = self.db.begin().await?;
        if let Some(assignee_id) = req.assignee_id {
            let assignee = user::Entity::find_by_id(assignee_id)
                .one(&txn)
                .await?
                .filter(|u| u.is_active && u.company_id == Some(existing.company_id))
                .ok_or_else(|| {
                    ServiceError::ValidationError("Assignee must be an active member of the company".into())
                })?;
            self.notifications
                .notify_user(
                    &txn,
                    assignee.id,
                    Some(existing.company_id),
                    NewNotification::new(
                        "fault_assigned",
                        format!("Fault assigned: {}", existing.title),
                        format!("{} assigned this fault to you.", user.display_name()),
                    )
                    .about("fault", existing.id),
                )
                .await?;
        }
        let mut active: fault::ActiveModel = existing.into();
        active.assigned_to = Set(req.assignee_id);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// `open → in_progress → resolved → closed`, with `resolved → open` to reopen
    #[instrument(skip(self, user, req), fields(next = %req.status))]
    pub async fn update_status(
        &self,
        user: &AuthUser,
        id: Uuid,
        req: UpdateFaultStatusRequest,
    ) -> Result<fault::Model, ServiceError> {
        req.validate()?;
        let existing = self.get(user, id).await?;
        let current = existing.status().ok_or_else(|| {
            ServiceError::InternalError(format!("unknown fault status {}", existing.status))
        })?;
        if !current.can_transition_to(req.status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot move fault from {} to {}",
                current, req.status
            )));
        }
        let now = Utc::now();
        let mut active: fault::ActiveModel = existing.into();
        active.status = Set(req.status.to_string());
        match req.status {
            FaultStatus::Resolved => active.resolved_at = Set(Some(now)),
            FaultStatus::Open => active.resolved_at = Set(None),
            FaultStatus::InProgress | FaultStatus::Closed => {}
        }
        if req.resolution_notes.is_some() {
            active.resolution_notes = Set(req.resolution_notes);
        }
        active.updated_at = Set(now);
        let updated = active.update(&*self.db).await?;

        self.event_sender.emit(Event::FaultStatusChanged {
            fault_id: updated.id,
            old_status: current.to_string(),
            new_status: updated.status.clone(),
        });
        Ok(updated)
    }
}
