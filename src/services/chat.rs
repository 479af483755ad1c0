use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::vessels::VesselService;
use crate::auth::AuthUser;
use crate::entities::chat_message;
use crate::errors::ServiceError;

pub const DEFAULT_LIMIT: u64 = 50;
pub const MAX_LIMIT: u64 = 200;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PostMessageRequest {
    /// Vessel channel; the company channel when empty
    pub vessel_id: Option<Uuid>,
    /// Needed by administrators posting to a company channel
    pub company_id: Option<Uuid>,
    #[validate(length(min = 1, max = 4000))]
    pub body: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChatQuery {
    pub vessel_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    /// Only messages strictly newer than this instant
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

/// Team chat served by polling
#[derive(Clone)]
pub struct ChatService {
    db: Arc<DatabaseConnection>,
}

impl ChatService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn channel_company(
        &self,
        user: &AuthUser,
        vessel_id: Option<Uuid>,
        company_id: Option<Uuid>,
    ) -> Result<Uuid, ServiceError> {
        match vessel_id {
            Some(vessel_id) => Ok(VesselService::find_scoped(&*self.db, user, vessel_id)
                .await?
                .company_id),
            None => user.target_company(company_id),
        }
    }

    pub async fn post(
        &self,
        user: &AuthUser,
        req: PostMessageRequest,
    ) -> Result<chat_message::Model, ServiceError> {
        req.validate()?;
        let body = req.body.trim();
        if body.is_empty() {
            return Err(ServiceError::ValidationError("Message body is empty".into()));
        }
        let company_id = self
            .channel_company(user, req.vessel_id, req.company_id)
            .await?;
        Ok(chat_message::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            vessel_id: Set(req.vessel_id),
            sender_id: Set(user.user_id),
            sender_name: Set(user.display_name().to_string()),
            body: Set(body.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?)
    }

    /// Messages of one channel in ascending order. Without `since` the latest
    /// `limit` messages are returned.
    pub async fn list(
        &self,
        user: &AuthUser,
        query: ChatQuery,
    ) -> Result<Vec<chat_message::Model>, ServiceError> {
        let company_id = self
            .channel_company(user, query.vessel_id, query.company_id)
            .await?;
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let mut select = chat_message::Entity::find()
            .filter(chat_message::Column::CompanyId.eq(company_id));
        select = match query.vessel_id {
            Some(vessel_id) => select.filter(chat_message::Column::VesselId.eq(vessel_id)),
            None => select.filter(chat_message::Column::VesselId.is_null()),
        };

        match query.since {
            Some(since) => Ok(select
                .filter(chat_message::Column::CreatedAt.gt(since))
                .order_by_asc(chat_message::Column::CreatedAt)
                .limit(limit)
                .all(&*self.db)
                .await?),
            None => {
                let mut latest = select
                    .order_by_desc(chat_message::Column::CreatedAt)
                    .limit(limit)
                    .all(&*self.db)
                    .await?;
                latest.reverse();
                Ok(latest)
            }
        }
    }
}
