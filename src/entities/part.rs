use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Upper bound for stock and minimum quantities on a part
pub const MAX_STOCK_QUANTITY: i32 = 1_000_000;
/// Upper bound for a part's unit cost
pub const MAX_UNIT_COST: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

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
pub enum StockStatus {
    InStock,
    Low,
    Critical,
    OutOfStock,
}

impl StockStatus {
    pub fn classify(quantity: i32, minimum_quantity: i32) -> Self {
        if quantity <= 0 {
            StockStatus::OutOfStock
        } else if minimum_quantity > 0 && quantity <= minimum_quantity / 2 {
            StockStatus::Critical
        } else if quantity <= minimum_quantity {
            StockStatus::Low
        } else {
            StockStatus::InStock
        }
    }

    pub fn needs_reorder(self) -> bool {
        !matches!(self, StockStatus::InStock)
    }
}

/// Spare part held aboard a vessel (`parts_inventory`)
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "parts_inventory")]
#[schema(as = Part)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub vessel_id: Uuid,
    pub company_id: Uuid,
    pub equipment_id: Option<Uuid>,
    pub part_number: String,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub minimum_quantity: i32,
    pub unit_cost: Decimal,
    pub supplier: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.quantity, self.minimum_quantity)
    }

    pub fn is_low(&self) -> bool {
        self.quantity <= self.minimum_quantity
    }

    /// Quantity that restores twice the minimum, at least one unit
    pub fn reorder_quantity(&self) -> i32 {
        let wanted = i64::from(self.minimum_quantity) * 2 - i64::from(self.quantity);
        i32::try_from(wanted.max(1)).unwrap_or(i32::MAX)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vessel::Entity",
        from = "Column::VesselId",
        to = "super::vessel::Column::Id",
        on_delete = "Cascade"
    )]
    Vessel,
    #[sea_orm(has_many = "super::low_stock_alert::Entity")]
    Alerts,
}

impl Related<super::vessel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vessel.def()
    }
}

impl Related<super::low_stock_alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Alerts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 10, StockStatus::OutOfStock)]
    #[case(0, 0, StockStatus::OutOfStock)]
    #[case(5, 10, StockStatus::Critical)]
    #[case(4, 9, StockStatus::Critical)]
    #[case(5, 9, StockStatus::Low)]
    #[case(10, 10, StockStatus::Low)]
    #[case(11, 10, StockStatus::InStock)]
    #[case(3, 0, StockStatus::InStock)]
    #[case(i32::MAX, i32::MAX, StockStatus::Low)]
    #[case(1_073_741_823, i32::MAX, StockStatus::Critical)]
    #[case(1_073_741_824, i32::MAX, StockStatus::Low)]
    #[case(i32::MAX, 1, StockStatus::InStock)]
    fn classifies_stock(#[case] qty: i32, #[case] min: i32, #[case] expected: StockStatus) {
        assert_eq!(StockStatus::classify(qty, min), expected);
    }

    #[test]
    fn reorder_quantity_tops_up_to_twice_minimum() {
        let mut part = Model {
            id: Uuid::new_v4(),
            vessel_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            equipment_id: None,
            part_number: "FLT-220".into(),
            name: "Fuel filter".into(),
            description: None,
            quantity: 2,
            minimum_quantity: 5,
            unit_cost: Decimal::new(4550, 2),
            supplier: None,
            location: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(part.reorder_quantity(), 8);
        part.minimum_quantity = 0;
        assert_eq!(part.reorder_quantity(), 1);
        part.quantity = 0;
        part.minimum_quantity = i32::MAX;
        assert_eq!(part.reorder_quantity(), i32::MAX);
        part.quantity = i32::MAX;
        part.minimum_quantity = 0;
        assert_eq!(part.reorder_quantity(), 1);
    }
}
