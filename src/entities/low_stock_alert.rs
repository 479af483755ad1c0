use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    AdminNotified,
    VesselNotified,
    Ordered,
    Resolved,
}

impl AlertStatus {
    pub const UNRESOLVED: [AlertStatus; 4] = [
        AlertStatus::Open,
        AlertStatus::AdminNotified,
        AlertStatus::VesselNotified,
        AlertStatus::Ordered,
    ];

    pub fn unresolved_values() -> Vec<String> {
        Self::UNRESOLVED.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "low_stock_alerts")]
#[schema(as = LowStockAlert)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub part_id: Uuid,
    pub vessel_id: Uuid,
    pub company_id: Uuid,
    pub quantity_at_alert: i32,
    pub minimum_quantity: i32,
    pub status: String,
    pub purchase_order_id: Option<Uuid>,
    pub admin_notified_at: Option<DateTime<Utc>>,
    pub vessel_notified_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status(&self) -> Option<AlertStatus> {
        self.status.parse().ok()
    }

    pub fn is_resolved(&self) -> bool {
        self.status() == Some(AlertStatus::Resolved)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::part::Entity",
        from = "Column::PartId",
        to = "super::part::Column::Id",
        on_delete = "Cascade"
    )]
    Part,
}

impl Related<super::part::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Part.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
