use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod invoice_pdf;

/// Platform revenue: the markup collected on paid invoices
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevenueReport {
    pub currency: String,
    pub paid_invoices: u64,
    pub gross_billed: Decimal,
    pub supplier_cost: Decimal,
    pub markup_revenue: Decimal,
    pub outstanding_total: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VesselValuation {
    pub vessel_id: Uuid,
    pub vessel_name: String,
    pub part_count: u64,
    pub total_units: i64,
    pub total_value: Decimal,
}

/// Spare-part stock value, Σ quantity × unit cost, per vessel
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InventoryValuation {
    pub currency: String,
    pub vessels: Vec<VesselValuation>,
    pub total_value: Decimal,
}
