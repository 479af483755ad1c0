use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Subscription tier purchased through an activation code
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
pub enum SubscriptionTier {
    None,
    Basic,
    Professional,
    Enterprise,
}

impl SubscriptionTier {
    /// Maximum vessels allowed; `None` means unlimited
    pub fn vessel_limit(self) -> Option<u64> {
        match self {
            SubscriptionTier::None => Some(0),
            SubscriptionTier::Basic => Some(3),
            SubscriptionTier::Professional => Some(15),
            SubscriptionTier::Enterprise => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "companies")]
#[schema(as = Company)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub subscription_tier: String,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn tier(&self) -> SubscriptionTier {
        self.subscription_tier
            .parse()
            .unwrap_or(SubscriptionTier::None)
    }

    /// Tier in force at `now`; an expired subscription counts as no tier
    pub fn active_tier(&self, now: DateTime<Utc>) -> SubscriptionTier {
        match self.subscription_expires_at {
            Some(expires) if expires > now => self.tier(),
            _ => SubscriptionTier::None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vessel::Entity")]
    Vessels,
    #[sea_orm(has_many = "super::user::Entity")]
    Users,
}

impl Related<super::vessel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vessels.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn company(tier: &str, expires: Option<DateTime<Utc>>) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Northern Shipping".into(),
            contact_email: "ops@northern.example".into(),
            contact_phone: None,
            address: None,
            subscription_tier: tier.into(),
            subscription_expires_at: expires,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn expired_subscription_has_no_tier() {
        let now = Utc::now();
        let c = company("professional", Some(now - Duration::days(1)));
        assert_eq!(c.tier(), SubscriptionTier::Professional);
        assert_eq!(c.active_tier(now), SubscriptionTier::None);
        assert_eq!(c.active_tier(now).vessel_limit(), Some(0));
    }

    #[test]
    fn tier_limits() {
        assert_eq!(SubscriptionTier::Basic.vessel_limit(), Some(3));
        assert_eq!(SubscriptionTier::Professional.vessel_limit(), Some(15));
        assert_eq!(SubscriptionTier::Enterprise.vessel_limit(), None);
        let c = company("enterprise", Some(Utc::now() + Duration::days(30)));
        assert_eq!(c.active_tier(Utc::now()), SubscriptionTier::Enterprise);
    }
}
