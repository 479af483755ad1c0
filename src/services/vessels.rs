use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::companies::CompanyService;
use super::inventory::check_unit_cost;
use super::{fetch_page, is_unique_violation, Page};
use crate::auth::AuthUser;
use crate::entities::equipment::{self, EquipmentStatus};
use crate::entities::fault::{self, FaultStatus};
use crate::entities::hse_update::{self, EXPIRY_WARNING_DAYS};
use crate::entities::low_stock_alert::{self, AlertStatus};
use crate::entities::vessel::{self, VesselStatus};
use crate::entities::{part, purchase_order};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// IMO numbers are exactly seven digits
pub fn validate_imo(imo: &str) -> Result<(), ValidationError> {
    if imo.len() == 7 && imo.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("imo_number"))
    }
}

/// Accepts both `1234567` and `IMO 1234567`
pub fn normalize_imo(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("IMO")
        .or_else(|| trimmed.strip_prefix("imo"))
        .unwrap_or(trimmed);
    digits.trim().to_string()
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateVesselRequest {
    /// Administrators must name the owning company
    pub company_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub imo_number: String,
    #[validate(length(min = 1, max = 100))]
    pub vessel_type: String,
    #[validate(length(max = 100))]
    pub flag: Option<String>,
    #[validate(range(min = 1850, max = 2100))]
    pub year_built: Option<i32>,
    #[validate(email)]
    pub contact_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateVesselRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub vessel_type: Option<String>,
    #[validate(length(max = 100))]
    pub flag: Option<String>,
    #[validate(range(min = 1850, max = 2100))]
    pub year_built: Option<i32>,
    #[validate(email)]
    pub contact_email: Option<String>,
    pub status: Option<VesselStatus>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct OnboardEquipment {
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

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct OnboardPart {
    #[validate(length(min = 1, max = 100))]
    pub part_number: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0, max = 1_000_000))]
    pub quantity: i32,
    #[validate(range(min = 0, max = 1_000_000))]
    pub minimum_quantity: i32,
    pub unit_cost: Decimal,
    pub supplier: Option<String>,
    pub location: Option<String>,
    /// Index into the request's `equipment` list
    pub equipment_index: Option<usize>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct OnboardVesselRequest {
    #[validate]
    pub vessel: CreateVesselRequest,
    #[validate]
    #[serde(default)]
    pub equipment: Vec<OnboardEquipment>,
    #[validate]
    #[serde(default)]
    pub parts: Vec<OnboardPart>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OnboardedVessel {
    pub vessel: vessel::Model,
    pub equipment: Vec<equipment::Model>,
    pub parts: Vec<part::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VesselSummary {
    pub vessel: vessel::Model,
    pub equipment_count: u64,
    pub maintenance_due: u64,
    pub part_count: u64,
    pub low_stock_count: u64,
    pub open_alerts: u64,
    pub open_faults: u64,
    pub hse_expiring: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct VesselFilter {
    pub company_id: Option<Uuid>,
    pub status: Option<VesselStatus>,
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct VesselService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl VesselService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Loads a vessel the caller may see; other tenants' vessels read as missing
    pub async fn find_scoped<C: ConnectionTrait>(
        conn: &C,
        user: &AuthUser,
        id: Uuid,
    ) -> Result<vessel::Model, ServiceError> {
        vessel::Entity::find_by_id(id)
            .one(conn)
            .await?
            .filter(|v| user.can_access(v.company_id))
            .ok_or_else(|| ServiceError::not_found("Vessel", id))
    }

    fn check_imo(raw: &str) -> Result<String, ServiceError> {
        let imo = normalize_imo(raw);
        validate_imo(&imo).map_err(|_| {
            ServiceError::ValidationError("IMO number must be exactly 7 digits".into())
        })?;
        Ok(imo)
    }

    async fn insert_vessel<C: ConnectionTrait>(
        conn: &C,
        user: &AuthUser,
        req: CreateVesselRequest,
        status: VesselStatus,
    ) -> Result<vessel::Model, ServiceError> {
        let company_id = user.target_company(req.company_id)?;
        let imo = Self::check_imo(&req.imo_number)?;
        CompanyService::ensure_vessel_capacity(conn, company_id).await?;

        let now = Utc::now();
        let model = vessel::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            name: Set(req.name.trim().to_string()),
            imo_number: Set(imo.clone()),
            vessel_type: Set(req.vessel_type),
            flag: Set(req.flag),
            year_built: Set(req.year_built),
            status: Set(status.to_string()),
            contact_email: Set(req.contact_email.map(|e| e.trim().to_lowercase())),
            onboarded_at: Set((status == VesselStatus::Active).then_some(now)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        model.insert(conn).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict(format!("A vessel with IMO number {} already exists", imo))
            } else {
                ServiceError::db_error(e)
            }
        })
    }

    #[instrument(skip(self, user, req), fields(imo = %req.imo_number))]
    pub async fn create(
        &self,
        user: &AuthUser,
        req: CreateVesselRequest,
    ) -> Result<vessel::Model, ServiceError> {
        req.validate()?;
        let txn = self.db.begin().await?;
        let created = Self::insert_vessel(&txn, user, req, VesselStatus::Pending).await?;
        txn.commit().await?;
        info!(vessel_id = %created.id, "vessel registered");
        Ok(created)
    }

    /// Creates the vessel, its equipment and its spare-part inventory in one transaction
    #[instrument(skip(self, user, req), fields(imo = %req.vessel.imo_number))]
    pub async fn onboard(
        &self,
        user: &AuthUser,
        req: OnboardVesselRequest,
    ) -> Result<OnboardedVessel, ServiceError> {
        req.validate()?;
        for (i, p) in req.parts.iter().enumerate() {
            if let Some(idx) = p.equipment_index {
                if idx >= req.equipment.len() {
                    return Err(ServiceError::ValidationError(format!(
                        "parts[{}].equipment_index {} is out of range",
                        i, idx
                    )));
                }
            }
            check_unit_cost(p.unit_cost).map_err(|e| match e {
                ServiceError::ValidationError(msg) => {
                    ServiceError::ValidationError(format!("parts[{}].{}", i, msg))
                }
                other => other,
            })?;
        }

        let txn = self.db.begin().await?;
        let vessel = Self::insert_vessel(&txn, user, req.vessel, VesselStatus::Active).await?;
        let now = Utc::now();

        let mut equipment_rows = Vec::with_capacity(req.equipment.len());
        for e in req.equipment {
            let row = equipment::ActiveModel {
                id: Set(Uuid::new_v4()),
                vessel_id: Set(vessel.id),
                company_id: Set(vessel.company_id),
                name: Set(e.name),
                category: Set(e.category),
                manufacturer: Set(e.manufacturer),
                model: Set(e.model),
                serial_number: Set(e.serial_number),
                location: Set(e.location),
                status: Set(EquipmentStatus::Operational.to_string()),
                running_hours: Set(e.running_hours),
                maintenance_interval_hours: Set(e.maintenance_interval_hours),
                hours_at_last_maintenance: Set(e.running_hours),
                last_maintenance_at: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;
            equipment_rows.push(row);
        }

        let mut part_rows = Vec::with_capacity(req.parts.len());
        for p in req.parts {
            let row = part::ActiveModel {
                id: Set(Uuid::new_v4()),
                vessel_id: Set(vessel.id),
                company_id: Set(vessel.company_id),
                equipment_id: Set(p.equipment_index.map(|i| equipment_rows[i].id)),
                part_number: Set(p.part_number),
                name: Set(p.name),
                description: Set(p.description),
                quantity: Set(p.quantity),
                minimum_quantity: Set(p.minimum_quantity),
                unit_cost: Set(p.unit_cost.round_dp(2)),
                supplier: Set(p.supplier),
                location: Set(p.location),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;
            part_rows.push(row);
        }
        txn.commit().await?;

        info!(
            vessel_id = %vessel.id,
            equipment = equipment_rows.len(),
            parts = part_rows.len(),
            "vessel onboarded"
        );
        self.event_sender.emit(Event::VesselOnboarded {
            vessel_id: vessel.id,
            company_id: vessel.company_id,
            equipment_count: equipment_rows.len(),
            part_count: part_rows.len(),
        });
        Ok(OnboardedVessel {
            vessel,
            equipment: equipment_rows,
            parts: part_rows,
        })
    }

    pub async fn get(&self, user: &AuthUser, id: Uuid) -> Result<vessel::Model, ServiceError> {
        Self::find_scoped(&*self.db, user, id).await
    }

    pub async fn list(
        &self,
        user: &AuthUser,
        filter: VesselFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<vessel::Model>, ServiceError> {
        let mut query = vessel::Entity::find();
        match user.tenant_filter() {
            Some(company_id) => query = query.filter(vessel::Column::CompanyId.eq(company_id)),
            None => {
                if let Some(company_id) = filter.company_id {
                    query = query.filter(vessel::Column::CompanyId.eq(company_id));
                }
            }
        }
        if let Some(status) = filter.status {
            query = query.filter(vessel::Column::Status.eq(status.to_string()));
        }
        if let Some(term) = filter.search.filter(|s| !s.trim().is_empty()) {
            query = query.filter(vessel::Column::Name.contains(term.trim()));
        }
        fetch_page(&self.db, query.order_by_asc(vessel::Column::Name), page, per_page).await
    }

    #[instrument(skip(self, user, req))]
    pub async fn update(
        &self,
        user: &AuthUser,
        id: Uuid,
        req: UpdateVesselRequest,
    ) -> Result<vessel::Model, ServiceError> {
        req.validate()?;
        let existing = self.get(user, id).await?;
        let was_onboarded = existing.onboarded_at.is_some();
        let mut active: vessel::ActiveModel = existing.into();
        if let Some(name) = req.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(vessel_type) = req.vessel_type {
            active.vessel_type = Set(vessel_type);
        }
        if let Some(flag) = req.flag {
            active.flag = Set(Some(flag));
        }
        if let Some(year) = req.year_built {
            active.year_built = Set(Some(year));
        }
        if let Some(email) = req.contact_email {
            active.contact_email = Set(Some(email.trim().to_lowercase()));
        }
        if let Some(status) = req.status {
            if status == VesselStatus::Active && !was_onboarded {
                active.onboarded_at = Set(Some(Utc::now()));
            }
            active.status = Set(status.to_string());
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Deletes the vessel and everything hanging off it. Vessels with purchase
    /// history are kept for the accounting trail.
    #[instrument(skip(self, user))]
    pub async fn delete(&self, user: &AuthUser, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let vessel = Self::find_scoped(&txn, user, id).await?;
        let orders = purchase_order::Entity::find()
            .filter(purchase_order::Column::VesselId.eq(vessel.id))
            .count(&txn)
            .await?;
        if orders > 0 {
            return Err(ServiceError::Conflict(
                "Vessel has purchase orders; set it inactive instead".into(),
            ));
        }
        low_stock_alert::Entity::delete_many()
            .filter(low_stock_alert::Column::VesselId.eq(vessel.id))
            .exec(&txn)
            .await?;
        part::Entity::delete_many()
            .filter(part::Column::VesselId.eq(vessel.id))
            .exec(&txn)
            .await?;
        fault::Entity::delete_many()
            .filter(fault::Column::VesselId.eq(vessel.id))
            .exec(&txn)
            .await?;
        equipment::Entity::delete_many()
            .filter(equipment::Column::VesselId.eq(vessel.id))
            .exec(&txn)
            .await?;
        vessel::Entity::delete_by_id(vessel.id).exec(&txn).await?;
        txn.commit().await?;
        info!(vessel_id = %id, "vessel deleted");
        Ok(())
    }

    pub async fn summary(&self, user: &AuthUser, id: Uuid) -> Result<VesselSummary, ServiceError> {
        let db = &*self.db;
        let vessel = Self::find_scoped(db, user, id).await?;
        let now = Utc::now();

        let equipment_rows = equipment::Entity::find()
            .filter(equipment::Column::VesselId.eq(vessel.id))
            .all(db)
            .await?;
        let maintenance_due = equipment_rows.iter().filter(|e| e.maintenance_due()).count() as u64;
        let parts = part::Entity::find()
            .filter(part::Column::VesselId.eq(vessel.id))
            .all(db)
            .await?;
        let low_stock_count = parts.iter().filter(|p| p.is_low()).count() as u64;
        let open_alerts = low_stock_alert::Entity::find()
            .filter(low_stock_alert::Column::VesselId.eq(vessel.id))
            .filter(low_stock_alert::Column::Status.is_in(AlertStatus::unresolved_values()))
            .count(db)
            .await?;
        let open_faults = fault::Entity::find()
            .filter(fault::Column::VesselId.eq(vessel.id))
            .filter(fault::Column::Status.is_in([
                FaultStatus::Open.to_string(),
                FaultStatus::InProgress.to_string(),
            ]))
            .count(db)
            .await?;
        let hse_expiring = hse_update::Entity::find()
            .filter(hse_update::Column::VesselId.eq(vessel.id))
            .filter(hse_update::Column::ExpiresAt.lt(now + Duration::days(EXPIRY_WARNING_DAYS)))
            .count(db)
            .await?;

        Ok(VesselSummary {
            equipment_count: equipment_rows.len() as u64,
            maintenance_due,
            part_count: parts.len() as u64,
            low_stock_count,
            open_alerts,
            open_faults,
            hse_expiring,
            vessel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("9321483", true)]
    #[case("IMO 9321483", true)]
    #[case("imo9321483", true)]
    #[case("932148", false)]
    #[case("93214830", false)]
    #[case("93A1483", false)]
    fn imo_numbers(#[case] raw: &str, #[case] ok: bool) {
        assert_eq!(validate_imo(&normalize_imo(raw)).is_ok(), ok);
    }
}
