use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::vessels::VesselService;
use super::{fetch_page, Page};
use crate::auth::AuthUser;
use crate::entities::equipment::{self, EquipmentStatus};
use crate::entities::{fault, part};
use crate::errors::ServiceError;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateEquipmentRequest {
    pub vessel_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub location: Option<String>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub running_hours: i64,
    #[validate(range(min = 1))]
    pub maintenance_interval_hours: Option<i64>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateEquipmentRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub location: Option<String>,
    pub status: Option<EquipmentStatus>,
    #[validate(range(min = 1))]
    pub maintenance_interval_hours: Option<i64>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordHoursRequest {
    /// New cumulative running-hours reading
    #[validate(range(min = 0))]
    pub running_hours: i64,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct MaintenanceLogRequest {
    /// Reading at the time of service; defaults to the current counter
    #[validate(range(min = 0))]
    pub running_hours: Option<i64>,
    pub performed_at: Option<DateTime<Utc>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EquipmentFilter {
    pub vessel_id: Option<Uuid>,
    pub status: Option<EquipmentStatus>,
}

/// Equipment that has reached its service interval
#[derive(Debug, Serialize, ToSchema)]
pub struct MaintenanceDue {
    pub equipment: equipment::Model,
    pub hours_overdue: i64,
}

#[derive(Clone)]
pub struct EquipmentService {
    db: Arc<DatabaseConnection>,
}

impl EquipmentService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(&self, user: &AuthUser, id: Uuid) -> Result<equipment::Model, ServiceError> {
        equipment::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|e| user.can_access(e.company_id))
            .ok_or_else(|| ServiceError::not_found("Equipment", id))
    }

    #[instrument(skip(self, user, req), fields(vessel_id = %req.vessel_id))]
    pub async fn create(
        &self,
        user: &AuthUser,
        req: CreateEquipmentRequest,
    ) -> Result<equipment::Model, ServiceError> {
        req.validate()?;
        let vessel = VesselService::find_scoped(&*self.db, user, req.vessel_id).await?;
        let now = Utc::now();
        let created = equipment::ActiveModel {
            id: Set(Uuid::new_v4()),
            vessel_id: Set(vessel.id),
            company_id: Set(vessel.company_id),
            name: Set(req.name.trim().to_string()),
            category: Set(req.category),
            manufacturer: Set(req.manufacturer),
            model: Set(req.model),
            serial_number: Set(req.serial_number),
            location: Set(req.location),
            status: Set(EquipmentStatus::Operational.to_string()),
            running_hours: Set(req.running_hours),
            maintenance_interval_hours: Set(req.maintenance_interval_hours),
            hours_at_last_maintenance: Set(req.running_hours),
            last_maintenance_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;
        Ok(created)
    }

    pub async fn list(
        &self,
        user: &AuthUser,
        filter: EquipmentFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<equipment::Model>, ServiceError> {
        let mut query = equipment::Entity::find();
        if let Some(company_id) = user.tenant_filter() {
            query = query.filter(equipment::Column::CompanyId.eq(company_id));
        }
        if let Some(vessel_id) = filter.vessel_id {
            query = query.filter(equipment::Column::VesselId.eq(vessel_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(equipment::Column::Status.eq(status.to_string()));
        }
        fetch_page(
            &self.db,
            query.order_by_asc(equipment::Column::Name),
            page,
            per_page,
        )
        .await
    }

    pub async fn update(
        &self,
        user: &AuthUser,
        id: Uuid,
        req: UpdateEquipmentRequest,
    ) -> Result<equipment::Model, ServiceError> {
        req.validate()?;
        let existing = self.get(user, id).await?;
        let mut active: equipment::ActiveModel = existing.into();
        if let Some(name) = req.name {
            active.name = Set(name.trim().to_string());
        }
        if req.category.is_some() {
            active.category = Set(req.category);
        }
        if req.manufacturer.is_some() {
            active.manufacturer = Set(req.manufacturer);
        }
        if req.model.is_some() {
            active.model = Set(req.model);
        }
        if req.serial_number.is_some() {
            active.serial_number = Set(req.serial_number);
        }
        if req.location.is_some() {
            active.location = Set(req.location);
        }
        if let Some(status) = req.status {
            active.status = Set(status.to_string());
        }
        if let Some(interval) = req.maintenance_interval_hours {
            active.maintenance_interval_hours = Set(Some(interval));
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Removes the equipment; parts and faults referencing it are detached
    #[instrument(skip(self, user))]
    pub async fn delete(&self, user: &AuthUser, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get(user, id).await?;
        let txn = self.db.begin().await?;
        part::Entity::update_many()
            .col_expr(part::Column::EquipmentId, Expr::value(Option::<Uuid>::None))
            .filter(part::Column::EquipmentId.eq(existing.id))
            .exec(&txn)
            .await?;
        fault::Entity::update_many()
            .col_expr(fault::Column::EquipmentId, Expr::value(Option::<Uuid>::None))
            .filter(fault::Column::EquipmentId.eq(existing.id))
            .exec(&txn)
            .await?;
        equipment::Entity::delete_by_id(existing.id).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Running-hours counters only move forward
    #[instrument(skip(self, user, req))]
    pub async fn record_hours(
        &self,
        user: &AuthUser,
        id: Uuid,
        req: RecordHoursRequest,
    ) -> Result<equipment::Model, ServiceError> {
        req.validate()?;
        let existing = self.get(user, id).await?;
        if req.running_hours < existing.running_hours {
            return Err(ServiceError::ValidationError(format!(
                "Running hours cannot decrease (current reading {})",
                existing.running_hours
            )));
        }
        let mut active: equipment::ActiveModel = existing.into();
        active.running_hours = Set(req.running_hours);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        if updated.maintenance_due() {
            info!(equipment_id = %updated.id, "equipment reached its maintenance interval");
        }
        Ok(updated)
    }

    /// Logs a completed service: resets the interval counter and returns the
    /// equipment to operation
    #[instrument(skip(self, user, req))]
    pub async fn log_maintenance(
        &self,
        user: &AuthUser,
        id: Uuid,
        req: MaintenanceLogRequest,
    ) -> Result<equipment::Model, ServiceError> {
        req.validate()?;
        let existing = self.get(user, id).await?;
        let reading = req.running_hours.unwrap_or(existing.running_hours);
        if reading < existing.hours_at_last_maintenance {
            return Err(ServiceError::ValidationError(
                "Maintenance reading precedes the previous service".into(),
            ));
        }
        let running_hours = reading.max(existing.running_hours);
        let mut active: equipment::ActiveModel = existing.into();
        active.running_hours = Set(running_hours);
        active.hours_at_last_maintenance = Set(reading);
        active.last_maintenance_at = Set(Some(req.performed_at.unwrap_or_else(Utc::now)));
        active.status = Set(EquipmentStatus::Operational.to_string());
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        info!(equipment_id = %updated.id, reading, notes = ?req.notes, "maintenance logged");
        Ok(updated)
    }

    pub async fn maintenance_due(
        &self,
        user: &AuthUser,
        vessel_id: Option<Uuid>,
    ) -> Result<Vec<MaintenanceDue>, ServiceError> {
        let mut query = equipment::Entity::find()
            .filter(equipment::Column::MaintenanceIntervalHours.is_not_null())
            .filter(equipment::Column::Status.ne(EquipmentStatus::Decommissioned.to_string()));
        if let Some(company_id) = user.tenant_filter() {
            query = query.filter(equipment::Column::CompanyId.eq(company_id));
        }
        if let Some(vessel_id) = vessel_id {
            query = query.filter(equipment::Column::VesselId.eq(vessel_id));
        }
        let rows = query
            .order_by_asc(equipment::Column::VesselId)
            .all(&*self.db)
            .await?;
        let mut due: Vec<MaintenanceDue> = rows
            .into_iter()
            .filter_map(|e| {
                let left = e.hours_until_maintenance()?;
                (left <= 0).then_some(MaintenanceDue {
                    hours_overdue: -left,
                    equipment: e,
                })
            })
            .collect();
        due.sort_by(|a, b| b.hours_overdue.cmp(&a.hours_overdue));
        Ok(due)
    }
}
