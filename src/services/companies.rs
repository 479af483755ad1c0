use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{fetch_page, random_code, Page};
use crate::auth::AuthUser;
use crate::entities::activation_code::{self, ActivationCodeStatus};
use crate::entities::company::{self, SubscriptionTier};
use crate::entities::vessel;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Unambiguous uppercase alphabet: no `0 O 1 I`
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_PREFIX: &str = "SMS";
const MAX_BATCH: u32 = 100;

/// `SMS-XXXX-XXXX-XXXX`
pub fn generate_activation_code() -> String {
    format!(
        "{}-{}-{}-{}",
        CODE_PREFIX,
        random_code(CODE_ALPHABET, 4),
        random_code(CODE_ALPHABET, 4),
        random_code(CODE_ALPHABET, 4)
    )
}

pub fn is_valid_code_format(code: &str) -> bool {
    let parts: Vec<&str> = code.split('-').collect();
    parts.len() == 4
        && parts[0] == CODE_PREFIX
        && parts[1..]
            .iter()
            .all(|p| p.len() == 4 && p.bytes().all(|b| CODE_ALPHABET.contains(&b)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCompanyRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub contact_email: Option<String>,
    #[validate(length(max = 50))]
    pub contact_phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GenerateCodesRequest {
    pub tier: SubscriptionTier,
    #[validate(range(min = 1, max = 3650))]
    pub duration_days: i32,
    #[validate(range(min = 1, max = 100))]
    pub count: u32,
    #[validate(email)]
    pub purchaser_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RedeemCodeRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    /// Target company; only administrators may redeem for another company
    pub company_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionInfo {
    pub company_id: Uuid,
    pub tier: SubscriptionTier,
    pub active_tier: SubscriptionTier,
    pub expires_at: Option<DateTime<Utc>>,
    /// `None` means unlimited
    pub vessel_limit: Option<u64>,
    pub vessels_used: u64,
}

#[derive(Clone)]
pub struct CompanyService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CompanyService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    pub async fn find_company<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
    ) -> Result<company::Model, ServiceError> {
        company::Entity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Company", id))
    }

    pub async fn get_company(
        &self,
        user: &AuthUser,
        id: Uuid,
    ) -> Result<company::Model, ServiceError> {
        if !user.can_access(id) {
            return Err(ServiceError::not_found("Company", id));
        }
        Self::find_company(&*self.db, id).await
    }

    pub async fn list_companies(
        &self,
        search: Option<String>,
        page: u64,
        per_page: u64,
    ) -> Result<Page<company::Model>, ServiceError> {
        let mut query = company::Entity::find();
        if let Some(term) = search.filter(|s| !s.trim().is_empty()) {
            query = query.filter(company::Column::Name.contains(term.trim()));
        }
        fetch_page(
            &self.db,
            query.order_by_asc(company::Column::Name),
            page,
            per_page,
        )
        .await
    }

    #[instrument(skip(self, user, req))]
    pub async fn update_company(
        &self,
        user: &AuthUser,
        id: Uuid,
        req: UpdateCompanyRequest,
    ) -> Result<company::Model, ServiceError> {
        req.validate()?;
        let existing = self.get_company(user, id).await?;
        let mut active: company::ActiveModel = existing.into();
        if let Some(name) = req.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(email) = req.contact_email {
            active.contact_email = Set(email.trim().to_lowercase());
        }
        if let Some(phone) = req.contact_phone {
            active.contact_phone = Set(Some(phone));
        }
        if let Some(address) = req.address {
            active.address = Set(Some(address));
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    pub async fn subscription(
        &self,
        user: &AuthUser,
        company_id: Option<Uuid>,
    ) -> Result<SubscriptionInfo, ServiceError> {
        let id = match company_id {
            Some(id) => id,
            None => user.require_company()?,
        };
        let company = self.get_company(user, id).await?;
        let vessels_used = vessel::Entity::find()
            .filter(vessel::Column::CompanyId.eq(company.id))
            .count(&*self.db)
            .await?;
        let active_tier = company.active_tier(Utc::now());
        Ok(SubscriptionInfo {
            company_id: company.id,
            tier: company.tier(),
            active_tier,
            expires_at: company.subscription_expires_at,
            vessel_limit: active_tier.vessel_limit(),
            vessels_used,
        })
    }

    /// Refuses when the company's active subscription has no room for another vessel
    pub async fn ensure_vessel_capacity<C: ConnectionTrait>(
        conn: &C,
        company_id: Uuid,
    ) -> Result<(), ServiceError> {
        let company = Self::find_company(conn, company_id).await?;
        let tier = company.active_tier(Utc::now());
        let Some(limit) = tier.vessel_limit() else {
            return Ok(());
        };
        let used = vessel::Entity::find()
            .filter(vessel::Column::CompanyId.eq(company_id))
            .count(conn)
            .await?;
        if used >= limit {
            return Err(ServiceError::SubscriptionLimit(format!(
                "The {} subscription allows {} vessel(s); {} already registered",
                tier, limit, used
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, admin, req), fields(count = req.count, tier = %req.tier))]
    pub async fn generate_codes(
        &self,
        admin: &AuthUser,
        req: GenerateCodesRequest,
    ) -> Result<Vec<activation_code::Model>, ServiceError> {
        req.validate()?;
        if req.tier == SubscriptionTier::None {
            return Err(ServiceError::ValidationError(
                "Activation codes must unlock a paid tier".into(),
            ));
        }
        let txn = self.db.begin().await?;
        let mut created = Vec::with_capacity(req.count.min(MAX_BATCH) as usize);
        for _ in 0..req.count.min(MAX_BATCH) {
            let mut code = generate_activation_code();
            // 32^12 code space, uniqueness still checked
            while activation_code::Entity::find()
                .filter(activation_code::Column::Code.eq(code.clone()))
                .one(&txn)
                .await?
                .is_some()
            {
                code = generate_activation_code();
            }
            let model = activation_code::ActiveModel {
                id: Set(Uuid::new_v4()),
                code: Set(code),
                tier: Set(req.tier.to_string()),
                duration_days: Set(req.duration_days),
                status: Set(ActivationCodeStatus::Available.to_string()),
                purchaser_email: Set(req.purchaser_email.clone()),
                company_id: Set(None),
                redeemed_by: Set(None),
                redeemed_at: Set(None),
                created_by: Set(Some(admin.user_id)),
                created_at: Set(Utc::now()),
            }
            .insert(&txn)
            .await?;
            created.push(model);
        }
        txn.commit().await?;
        info!(count = created.len(), "activation codes generated");
        Ok(created)
    }

    pub async fn list_codes(
        &self,
        status: Option<ActivationCodeStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<Page<activation_code::Model>, ServiceError> {
        let mut query = activation_code::Entity::find();
        if let Some(status) = status {
            query = query.filter(activation_code::Column::Status.eq(status.to_string()));
        }
        fetch_page(
            &self.db,
            query.order_by_desc(activation_code::Column::CreatedAt),
            page,
            per_page,
        )
        .await
    }

    pub async fn revoke_code(&self, id: Uuid) -> Result<activation_code::Model, ServiceError> {
        let code = activation_code::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Activation code", id))?;
        if code.status != ActivationCodeStatus::Available.to_string() {
            return Err(ServiceError::Conflict(format!(
                "Activation code is already {}",
                code.status
            )));
        }
        let mut active: activation_code::ActiveModel = code.into();
        active.status = Set(ActivationCodeStatus::Revoked.to_string());
        Ok(active.update(&*self.db).await?)
    }

    /// Applies a code to a company: the subscription is extended from the later
    /// of now and the current expiry.
    #[instrument(skip(self, user, req))]
    pub async fn redeem(
        &self,
        user: &AuthUser,
        req: RedeemCodeRequest,
    ) -> Result<SubscriptionInfo, ServiceError> {
        req.validate()?;
        let company_id = user.target_company(req.company_id)?;
        let normalized = req.code.trim().to_uppercase();
        if !is_valid_code_format(&normalized) {
            return Err(ServiceError::ValidationError(
                "Activation code must look like SMS-XXXX-XXXX-XXXX".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let code = activation_code::Entity::find()
            .filter(activation_code::Column::Code.eq(normalized.clone()))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Activation code not found".into()))?;
        if code.status != ActivationCodeStatus::Available.to_string() {
            return Err(ServiceError::Conflict(format!(
                "Activation code has already been {}",
                code.status
            )));
        }
        let tier: SubscriptionTier = code
            .tier
            .parse()
            .map_err(|_| ServiceError::InternalError(format!("bad tier {}", code.tier)))?;

        let now = Utc::now();
        let claimed = activation_code::Entity::update_many()
            .col_expr(
                activation_code::Column::Status,
                Expr::value(ActivationCodeStatus::Redeemed.to_string()),
            )
            .col_expr(activation_code::Column::CompanyId, Expr::value(Some(company_id)))
            .col_expr(activation_code::Column::RedeemedBy, Expr::value(Some(user.user_id)))
            .col_expr(activation_code::Column::RedeemedAt, Expr::value(Some(now)))
            .filter(activation_code::Column::Id.eq(code.id))
            .filter(activation_code::Column::Status.eq(ActivationCodeStatus::Available.to_string()))
            .exec(&txn)
            .await?;
        if claimed.rows_affected != 1 {
            return Err(ServiceError::Conflict(
                "Activation code has already been redeemed".into(),
            ));
        }

        let company = Self::find_company(&txn, company_id).await?;
        let base = company
            .subscription_expires_at
            .filter(|current| *current > now)
            .unwrap_or(now);
        let expires_at = base + Duration::days(i64::from(code.duration_days));

        let mut active: company::ActiveModel = company.into();
        active.subscription_tier = Set(tier.to_string());
        active.subscription_expires_at = Set(Some(expires_at));
        active.updated_at = Set(now);
        active.update(&txn).await?;
        txn.commit().await?;

        info!(%company_id, %tier, %expires_at, "activation code redeemed");
        self.event_sender.emit(Event::ActivationCodeRedeemed {
            company_id,
            tier: tier.to_string(),
            expires_at,
        });
        self.subscription(user, Some(company_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn generated_codes_have_expected_shape() {
        for _ in 0..200 {
            let code = generate_activation_code();
            assert_eq!(code.len(), 18);
            assert!(is_valid_code_format(&code), "{code}");
            assert!(!code[4..].contains(['0', 'O', '1', 'I']));
        }
    }

    #[test]
    fn rejects_malformed_codes() {
        assert!(!is_valid_code_format("SMS-ABCD-EFGH"));
        assert!(!is_valid_code_format("SMX-ABCD-EFGH-JKLM"));
        assert!(!is_valid_code_format("SMS-ABCD-EFGH-JKL0"));
        assert!(!is_valid_code_format("SMS-abcd-EFGH-JKLM"));
        assert!(is_valid_code_format("SMS-ABCD-EFGH-JKLM"));
    }

    proptest! {
        #[test]
        fn ambiguous_characters_never_validate(c in prop::sample::select(vec!['0', 'O', '1', 'I'])) {
            let code = format!("SMS-ABC{}-EFGH-JKLM", c);
            prop_assert!(!is_valid_code_format(&code));
        }
    }
}
