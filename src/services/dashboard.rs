use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use super::equipment::{EquipmentService, MaintenanceDue};
use super::hse::HseService;
use super::inventory::InventoryService;
use super::invoices::InvoiceService;
use crate::auth::{AuthUser, UserRole};
use crate::entities::fault::{self, FaultStatus};
use crate::entities::low_stock_alert::{self, AlertStatus};
use crate::entities::purchase_order::{self, PurchaseOrderStatus};
use crate::entities::{company, user, vessel};
use crate::errors::ServiceError;
use crate::reports::RevenueReport;

const RECENT_LIMIT: u64 = 10;

#[derive(Debug, Serialize, ToSchema)]
pub struct PlatformDashboard {
    pub companies: u64,
    pub active_subscriptions: u64,
    pub vessels: u64,
    pub users: u64,
    pub open_alerts: u64,
    pub purchase_orders_awaiting_approval: u64,
    pub revenue: RevenueReport,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ManagerDashboard {
    pub company_id: Uuid,
    pub vessels: u64,
    pub open_faults: u64,
    pub critical_faults: u64,
    pub low_stock_parts: u64,
    pub open_alerts: u64,
    pub purchase_orders_in_progress: u64,
    pub unpaid_invoices: u64,
    pub unpaid_total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TechnicianDashboard {
    pub assigned_faults: Vec<fault::Model>,
    pub maintenance_due: Vec<MaintenanceDue>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HseDashboard {
    pub totals: BTreeMap<String, BTreeMap<String, u64>>,
    pub attention_count: u64,
}

/// Summary shaped by the caller's role
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Dashboard {
    Admin(PlatformDashboard),
    Manager(ManagerDashboard),
    Technician(TechnicianDashboard),
    HseOfficer(HseDashboard),
}

#[derive(Clone)]
pub struct DashboardService {
    db: Arc<DatabaseConnection>,
    equipment: Arc<EquipmentService>,
    inventory: Arc<InventoryService>,
    invoices: Arc<InvoiceService>,
    hse: Arc<HseService>,
}

impl DashboardService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        equipment: Arc<EquipmentService>,
        inventory: Arc<InventoryService>,
        invoices: Arc<InvoiceService>,
        hse: Arc<HseService>,
    ) -> Self {
        Self {
            db,
            equipment,
            inventory,
            invoices,
            hse,
        }
    }

    #[instrument(skip(self, user), fields(role = %user.role))]
    pub async fn for_user(&self, user: &AuthUser) -> Result<Dashboard, ServiceError> {
        let role: UserRole = user
            .role
            .parse()
            .map_err(|_| ServiceError::Forbidden(format!("Unknown role {}", user.role)))?;
        Ok(match role {
            UserRole::Admin => Dashboard::Admin(self.platform().await?),
            UserRole::Manager => Dashboard::Manager(self.manager(user).await?),
            UserRole::Technician => Dashboard::Technician(self.technician(user).await?),
            UserRole::HseOfficer => {
                let board = self.hse.board(user, None).await?;
                Dashboard::HseOfficer(HseDashboard {
                    totals: board.totals,
                    attention_count: board.attention_count,
                })
            }
        })
    }

    async fn platform(&self) -> Result<PlatformDashboard, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();
        let companies = company::Entity::find().all(db).await?;
        let active_subscriptions = companies
            .iter()
            .filter(|c| c.active_tier(now) != company::SubscriptionTier::None)
            .count() as u64;
        Ok(PlatformDashboard {
            companies: companies.len() as u64,
            active_subscriptions,
            vessels: vessel::Entity::find().count(db).await?,
            users: user::Entity::find().count(db).await?,
            open_alerts: low_stock_alert::Entity::find()
                .filter(low_stock_alert::Column::Status.is_in(AlertStatus::unresolved_values()))
                .count(db)
                .await?,
            purchase_orders_awaiting_approval: purchase_order::Entity::find()
                .filter(
                    purchase_order::Column::Status.eq(PurchaseOrderStatus::Submitted.to_string()),
                )
                .count(db)
                .await?,
            revenue: self.invoices.revenue(None).await?,
        })
    }

    async fn manager(&self, user: &AuthUser) -> Result<ManagerDashboard, ServiceError> {
        let db = &*self.db;
        let company_id = user.require_company()?;
        let open_fault_states = [
            FaultStatus::Open.to_string(),
            FaultStatus::InProgress.to_string(),
        ];
        let open_faults = fault::Entity::find()
            .filter(fault::Column::CompanyId.eq(company_id))
            .filter(fault::Column::Status.is_in(open_fault_states.clone()));
        let critical_faults = open_faults
            .clone()
            .filter(fault::Column::Severity.eq(fault::FaultSeverity::Critical.to_string()))
            .count(db)
            .await?;
        let unpaid = self.invoices.unpaid_for_company(company_id).await?;

        Ok(ManagerDashboard {
            company_id,
            vessels: vessel::Entity::find()
                .filter(vessel::Column::CompanyId.eq(company_id))
                .count(db)
                .await?,
            open_faults: open_faults.count(db).await?,
            critical_faults,
            low_stock_parts: self.inventory.low_stock(user, None).await?.len() as u64,
            open_alerts: low_stock_alert::Entity::find()
                .filter(low_stock_alert::Column::CompanyId.eq(company_id))
                .filter(low_stock_alert::Column::Status.is_in(AlertStatus::unresolved_values()))
                .count(db)
                .await?,
            purchase_orders_in_progress: purchase_order::Entity::find()
                .filter(purchase_order::Column::CompanyId.eq(company_id))
                .filter(purchase_order::Column::Status.is_in([
                    PurchaseOrderStatus::Draft.to_string(),
                    PurchaseOrderStatus::Submitted.to_string(),
                    PurchaseOrderStatus::Approved.to_string(),
                    PurchaseOrderStatus::Invoiced.to_string(),
                ]))
                .count(db)
                .await?,
            unpaid_invoices: unpaid.len() as u64,
            unpaid_total: unpaid.iter().map(|i| i.total).sum(),
        })
    }

    async fn technician(&self, user: &AuthUser) -> Result<TechnicianDashboard, ServiceError> {
        let assigned_faults = fault::Entity::find()
            .filter(fault::Column::AssignedTo.eq(user.user_id))
            .filter(fault::Column::Status.is_in([
                FaultStatus::Open.to_string(),
                FaultStatus::InProgress.to_string(),
            ]))
            .order_by_desc(fault::Column::CreatedAt)
            .limit(RECENT_LIMIT)
            .all(&*self.db)
            .await?;
        Ok(TechnicianDashboard {
            assigned_faults,
            maintenance_due: self.equipment.maintenance_due(user, None).await?,
        })
    }
}
