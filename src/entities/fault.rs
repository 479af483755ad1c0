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
pub enum FaultSeverity {
    Low,
    Medium,
    High,
    Critical,
}

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
pub enum FaultStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl FaultStatus {
    pub fn can_transition_to(self, next: FaultStatus) -> bool {
        use FaultStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)
                | (Open, Resolved)
                | (InProgress, Resolved)
                | (Resolved, Closed)
                | (Resolved, Open)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "faults")]
#[schema(as = Fault)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub vessel_id: Uuid,
    pub company_id: Uuid,
    pub equipment_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub status: String,
    pub reported_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status(&self) -> Option<FaultStatus> {
        self.status.parse().ok()
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
}

impl Related<super::vessel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vessel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::FaultStatus::*;

    #[test]
    fn resolved_faults_can_reopen_but_closed_cannot() {
        assert!(Open.can_transition_to(InProgress));
        assert!(Resolved.can_transition_to(Open));
        assert!(Resolved.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Open));
        assert!(!InProgress.can_transition_to(Closed));
    }
}
