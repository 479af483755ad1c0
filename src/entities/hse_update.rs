use chrono::{DateTime, Duration, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Window in which a certificate or inspection counts as expiring
pub const EXPIRY_WARNING_DAYS: i64 = 30;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HseCategory {
    Certificate,
    Drill,
    Incident,
    Inspection,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    Expiring,
    Expired,
    Scheduled,
    Overdue,
    Completed,
    Open,
    Closed,
}

impl ComplianceStatus {
    pub fn needs_attention(self) -> bool {
        matches!(
            self,
            ComplianceStatus::Expiring
                | ComplianceStatus::Expired
                | ComplianceStatus::Overdue
                | ComplianceStatus::Open
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "hse_updates")]
#[schema(as = HseUpdate)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub vessel_id: Option<Uuid>,
    pub category: String,
    pub title: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub severity: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn category(&self) -> Option<HseCategory> {
        self.category.parse().ok()
    }

    /// Compliance is derived at read time, never stored
    pub fn compliance_status(&self, now: DateTime<Utc>) -> ComplianceStatus {
        match self.category() {
            Some(HseCategory::Certificate) | Some(HseCategory::Inspection) => {
                match self.expires_at {
                    Some(expires) if expires < now => ComplianceStatus::Expired,
                    Some(expires) if expires < now + Duration::days(EXPIRY_WARNING_DAYS) => {
                        ComplianceStatus::Expiring
                    }
                    _ => ComplianceStatus::Compliant,
                }
            }
            Some(HseCategory::Drill) => match (self.completed_at, self.due_at) {
                (Some(_), _) => ComplianceStatus::Completed,
                (None, Some(due)) if due < now => ComplianceStatus::Overdue,
                _ => ComplianceStatus::Scheduled,
            },
            Some(HseCategory::Incident) | None => {
                if self.closed_at.is_some() {
                    ComplianceStatus::Closed
                } else {
                    ComplianceStatus::Open
                }
            }
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: HseCategory) -> Model {
        Model {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            vessel_id: None,
            category: category.to_string(),
            title: "Safety Management Certificate".into(),
            description: None,
            reference: None,
            severity: None,
            issued_at: None,
            expires_at: None,
            due_at: None,
            completed_at: None,
            closed_at: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn certificate_status_follows_expiry() {
        let now = Utc::now();
        let mut cert = item(HseCategory::Certificate);
        cert.expires_at = Some(now - Duration::days(1));
        assert_eq!(cert.compliance_status(now), ComplianceStatus::Expired);
        cert.expires_at = Some(now + Duration::days(10));
        assert_eq!(cert.compliance_status(now), ComplianceStatus::Expiring);
        cert.expires_at = Some(now + Duration::days(90));
        assert_eq!(cert.compliance_status(now), ComplianceStatus::Compliant);
    }

    #[test]
    fn drill_is_overdue_until_completed() {
        let now = Utc::now();
        let mut drill = item(HseCategory::Drill);
        drill.due_at = Some(now - Duration::hours(2));
        assert_eq!(drill.compliance_status(now), ComplianceStatus::Overdue);
        drill.completed_at = Some(now);
        assert_eq!(drill.compliance_status(now), ComplianceStatus::Completed);
    }

    #[test]
    fn incident_open_until_closed() {
        let now = Utc::now();
        let mut incident = item(HseCategory::Incident);
        assert!(incident.compliance_status(now).needs_attention());
        incident.closed_at = Some(now);
        assert_eq!(incident.compliance_status(now), ComplianceStatus::Closed);
    }
}
