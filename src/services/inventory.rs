use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::alerts::AlertService;
use super::vessels::VesselService;
use super::{fetch_page, Page};
use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::entities::part::{self, StockStatus, MAX_STOCK_QUANTITY, MAX_UNIT_COST};
use crate::entities::{equipment, low_stock_alert, vessel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::reports::{InventoryValuation, VesselValuation};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePartRequest {
    pub vessel_id: Uuid,
    pub equipment_id: Option<Uuid>,
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
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePartRequest {
    pub equipment_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub part_number: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0, max = 1_000_000))]
    pub minimum_quantity: Option<i32>,
    pub unit_cost: Option<Decimal>,
    pub supplier: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    /// Signed change; negative for consumption
    #[validate(range(min = -1_000_000, max = 1_000_000))]
    pub delta: i32,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartFilter {
    pub vessel_id: Option<Uuid>,
    pub equipment_id: Option<Uuid>,
    pub search: Option<String>,
}

/// Part with its derived stock classification
#[derive(Debug, Serialize, ToSchema)]
pub struct PartView {
    #[serde(flatten)]
    pub part: part::Model,
    pub stock_status: StockStatus,
    pub reorder_quantity: i32,
}

impl From<part::Model> for PartView {
    fn from(part: part::Model) -> Self {
        Self {
            stock_status: part.stock_status(),
            reorder_quantity: part.reorder_quantity(),
            part,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdjustmentResult {
    pub part: PartView,
    pub old_quantity: i32,
    /// Alert opened by this adjustment, if any
    pub alert: Option<low_stock_alert::Model>,
}

pub(crate) fn check_unit_cost(cost: Decimal) -> Result<Decimal, ServiceError> {
    if cost.is_sign_negative() {
        return Err(ServiceError::ValidationError(
            "unit_cost must not be negative".into(),
        ));
    }
    if cost > MAX_UNIT_COST {
        return Err(ServiceError::ValidationError(format!(
            "unit_cost must not exceed {}",
            MAX_UNIT_COST
        )));
    }
    Ok(cost.round_dp(2))
}

/// Spare-parts inventory held aboard vessels
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    alerts: Arc<AlertService>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        alerts: Arc<AlertService>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            config,
            alerts,
            event_sender,
        }
    }

    async fn find(&self, user: &AuthUser, id: Uuid) -> Result<part::Model, ServiceError> {
        part::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|p| user.can_access(p.company_id))
            .ok_or_else(|| ServiceError::not_found("Part", id))
    }

    async fn check_equipment(&self, vessel_id: Uuid, equipment_id: Uuid) -> Result<(), ServiceError> {
        equipment::Entity::find_by_id(equipment_id)
            .one(&*self.db)
            .await?
            .filter(|e| e.vessel_id == vessel_id)
            .map(|_| ())
            .ok_or_else(|| {
                ServiceError::ValidationError("equipment_id does not belong to this vessel".into())
            })
    }

    /// Opens an alert when `part` is low; failures are logged, never surfaced
    async fn raise_alert(&self, part: &part::Model) -> Option<low_stock_alert::Model> {
        match self.alerts.open_if_needed(part).await {
            Ok(alert) => alert,
            Err(e) => {
                warn!(part_id = %part.id, error = %e, "could not open low-stock alert");
                None
            }
        }
    }

    #[instrument(skip(self, user, req), fields(part_number = %req.part_number))]
    pub async fn create(
        &self,
        user: &AuthUser,
        req: CreatePartRequest,
    ) -> Result<PartView, ServiceError> {
        req.validate()?;
        let unit_cost = check_unit_cost(req.unit_cost)?;
        let vessel = VesselService::find_scoped(&*self.db, user, req.vessel_id).await?;
        if let Some(equipment_id) = req.equipment_id {
            self.check_equipment(vessel.id, equipment_id).await?;
        }
        let now = Utc::now();
        let created = part::ActiveModel {
            id: Set(Uuid::new_v4()),
            vessel_id: Set(vessel.id),
            company_id: Set(vessel.company_id),
            equipment_id: Set(req.equipment_id),
            part_number: Set(req.part_number.trim().to_string()),
            name: Set(req.name.trim().to_string()),
            description: Set(req.description),
            quantity: Set(req.quantity),
            minimum_quantity: Set(req.minimum_quantity),
            unit_cost: Set(unit_cost),
            supplier: Set(req.supplier),
            location: Set(req.location),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;
        self.raise_alert(&created).await;
        Ok(created.into())
    }

    pub async fn get(&self, user: &AuthUser, id: Uuid) -> Result<PartView, ServiceError> {
        Ok(self.find(user, id).await?.into())
    }

    pub async fn list(
        &self,
        user: &AuthUser,
        filter: PartFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<PartView>, ServiceError> {
        let mut query = part::Entity::find();
        if let Some(company_id) = user.tenant_filter() {
            query = query.filter(part::Column::CompanyId.eq(company_id));
        }
        if let Some(vessel_id) = filter.vessel_id {
            query = query.filter(part::Column::VesselId.eq(vessel_id));
        }
        if let Some(equipment_id) = filter.equipment_id {
            query = query.filter(part::Column::EquipmentId.eq(equipment_id));
        }
        if let Some(term) = filter.search.filter(|s| !s.trim().is_empty()) {
            let term = term.trim().to_string();
            query = query.filter(
                part::Column::Name
                    .contains(&term)
                    .or(part::Column::PartNumber.contains(&term)),
            );
        }
        let page = fetch_page(&self.db, query.order_by_asc(part::Column::Name), page, per_page).await?;
        Ok(page.map(PartView::from))
    }

    #[instrument(skip(self, user, req))]
    pub async fn update(
        &self,
        user: &AuthUser,
        id: Uuid,
        req: UpdatePartRequest,
    ) -> Result<PartView, ServiceError> {
        req.validate()?;
        let existing = self.find(user, id).await?;
        if let Some(equipment_id) = req.equipment_id {
            self.check_equipment(existing.vessel_id, equipment_id).await?;
        }
        let mut active: part::ActiveModel = existing.into();
        if req.equipment_id.is_some() {
            active.equipment_id = Set(req.equipment_id);
        }
        if let Some(number) = req.part_number {
            active.part_number = Set(number.trim().to_string());
        }
        if let Some(name) = req.name {
            active.name = Set(name.trim().to_string());
        }
        if req.description.is_some() {
            active.description = Set(req.description);
        }
        if let Some(minimum) = req.minimum_quantity {
            active.minimum_quantity = Set(minimum);
        }
        if let Some(cost) = req.unit_cost {
            active.unit_cost = Set(check_unit_cost(cost)?);
        }
        if req.supplier.is_some() {
            active.supplier = Set(req.supplier);
        }
        if req.location.is_some() {
            active.location = Set(req.location);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        self.raise_alert(&updated).await;
        Ok(updated.into())
    }

    pub async fn delete(&self, user: &AuthUser, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find(user, id).await?;
        let txn = self.db.begin().await?;
        low_stock_alert::Entity::delete_many()
            .filter(low_stock_alert::Column::PartId.eq(existing.id))
            .exec(&txn)
            .await?;
        part::Entity::delete_by_id(existing.id).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Applies a signed stock change atomically. Stock never goes below zero;
    /// reaching the minimum raises the low-stock alert immediately.
    #[instrument(skip(self, user, req), fields(delta = req.delta))]
    pub async fn adjust(
        &self,
        user: &AuthUser,
        id: Uuid,
        req: AdjustStockRequest,
    ) -> Result<AdjustmentResult, ServiceError> {
        req.validate()?;
        if req.delta == 0 {
            return Err(ServiceError::ValidationError("delta must not be zero".into()));
        }
        let existing = self.find(user, id).await?;

        let txn = self.db.begin().await?;
        let result = part::Entity::update_many()
            .col_expr(
                part::Column::Quantity,
                Expr::col(part::Column::Quantity).add(req.delta),
            )
            .col_expr(part::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(part::Column::Id.eq(existing.id))
            .filter(Expr::expr(Expr::col(part::Column::Quantity).add(req.delta)).gte(0))
            .filter(
                Expr::expr(Expr::col(part::Column::Quantity).add(req.delta))
                    .lte(MAX_STOCK_QUANTITY),
            )
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 && req.delta > 0 {
            return Err(ServiceError::ValidationError(format!(
                "{} would exceed the stock limit of {} units",
                existing.name, MAX_STOCK_QUANTITY
            )));
        }
        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "{} has {} unit(s) in stock; cannot remove {}",
                existing.name,
                existing.quantity,
                req.delta.unsigned_abs()
            )));
        }
        let updated = part::Entity::find_by_id(existing.id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Part", existing.id))?;
        AlertService::resolve_if_restocked(&txn, &updated).await?;
        txn.commit().await?;

        info!(
            part_id = %updated.id,
            old = existing.quantity,
            new = updated.quantity,
            reason = ?req.reason,
            "stock adjusted"
        );
        self.event_sender.emit(Event::PartAdjusted {
            part_id: updated.id,
            old_quantity: existing.quantity,
            new_quantity: updated.quantity,
        });
        let alert = self.raise_alert(&updated).await;
        Ok(AdjustmentResult {
            part: updated.into(),
            old_quantity: existing.quantity,
            alert,
        })
    }

    /// Parts at or below their minimum, most depleted first
    pub async fn low_stock(
        &self,
        user: &AuthUser,
        vessel_id: Option<Uuid>,
    ) -> Result<Vec<PartView>, ServiceError> {
        let mut query = part::Entity::find()
            .filter(Expr::col(part::Column::Quantity).lte(Expr::col(part::Column::MinimumQuantity)));
        if let Some(company_id) = user.tenant_filter() {
            query = query.filter(part::Column::CompanyId.eq(company_id));
        }
        if let Some(vessel_id) = vessel_id {
            query = query.filter(part::Column::VesselId.eq(vessel_id));
        }
        let mut parts: Vec<PartView> = query
            .order_by_asc(part::Column::Quantity)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(PartView::from)
            .collect();
        parts.sort_by_key(|p| i64::from(p.part.quantity) - i64::from(p.part.minimum_quantity));
        Ok(parts)
    }

    /// Stock value per vessel, Σ quantity × unit cost
    pub async fn valuation(
        &self,
        user: &AuthUser,
        company_id: Option<Uuid>,
    ) -> Result<InventoryValuation, ServiceError> {
        let scope = user.tenant_filter().or(company_id);
        let mut vessels_query = vessel::Entity::find();
        let mut parts_query = part::Entity::find();
        if let Some(company_id) = scope {
            vessels_query = vessels_query.filter(vessel::Column::CompanyId.eq(company_id));
            parts_query = parts_query.filter(part::Column::CompanyId.eq(company_id));
        }
        let vessels = vessels_query
            .order_by_asc(vessel::Column::Name)
            .all(&*self.db)
            .await?;
        let parts = parts_query.all(&*self.db).await?;

        let mut per_vessel: BTreeMap<Uuid, (u64, i64, Decimal)> = BTreeMap::new();
        for p in &parts {
            let entry = per_vessel.entry(p.vessel_id).or_default();
            entry.0 += 1;
            entry.1 += i64::from(p.quantity);
            entry.2 += Decimal::from(p.quantity) * p.unit_cost.round_dp(2);
        }

        let rows: Vec<VesselValuation> = vessels
            .into_iter()
            .map(|v| {
                let (part_count, total_units, total_value) =
                    per_vessel.get(&v.id).copied().unwrap_or_default();
                VesselValuation {
                    vessel_id: v.id,
                    vessel_name: v.name,
                    part_count,
                    total_units,
                    total_value: total_value.round_dp(2),
                }
            })
            .collect();
        let total_value = rows.iter().map(|r| r.total_value).sum::<Decimal>().round_dp(2);
        Ok(InventoryValuation {
            currency: self.config.currency.clone(),
            vessels: rows,
            total_value,
        })
    }
}
