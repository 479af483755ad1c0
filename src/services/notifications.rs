use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{fetch_page, Page};
use crate::auth::{AuthUser, UserRole};
use crate::config::AppConfig;
use crate::entities::{notification, user};
use crate::errors::ServiceError;
use crate::events::outbox::{self, OutboundMessage};

/// Content of an in-app notification
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: String,
    pub title: String,
    pub body: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(kind: &str, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            title: title.into(),
            body: body.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    pub fn about(mut self, entity_type: &str, entity_id: Uuid) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id);
        self
    }
}

/// In-app notifications plus the email fan-out that goes with them
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    async fn insert<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
        company_id: Option<Uuid>,
        n: &NewNotification,
    ) -> Result<notification::Model, ServiceError> {
        Ok(notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            company_id: Set(company_id),
            kind: Set(n.kind.clone()),
            title: Set(n.title.clone()),
            body: Set(n.body.clone()),
            entity_type: Set(n.entity_type.clone()),
            entity_id: Set(n.entity_id),
            read_at: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?)
    }

    /// Notify the SMS platform administrators: one in-app row per admin and an
    /// email to the configured admin mailbox.
    pub async fn notify_admins<C: ConnectionTrait>(
        &self,
        conn: &C,
        n: NewNotification,
    ) -> Result<(), ServiceError> {
        let admins = user::Entity::find()
            .filter(user::Column::Role.eq(UserRole::Admin.to_string()))
            .filter(user::Column::IsActive.eq(true))
            .all(conn)
            .await?;
        for admin in &admins {
            Self::insert(conn, admin.id, None, &n).await?;
        }
        outbox::enqueue(
            conn,
            OutboundMessage::email(
                self.config.sms_admin_email.clone(),
                format!("[SMS] {}", n.title),
                n.body.clone(),
            ),
        )
        .await?;
        debug!(admins = admins.len(), kind = %n.kind, "admins notified");
        Ok(())
    }

    /// In-app notification for every active user of `company_id` holding one of `roles`
    pub async fn notify_company_roles<C: ConnectionTrait>(
        &self,
        conn: &C,
        company_id: Uuid,
        roles: &[UserRole],
        n: NewNotification,
    ) -> Result<Vec<user::Model>, ServiceError> {
        let role_names: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        let recipients = user::Entity::find()
            .filter(user::Column::CompanyId.eq(company_id))
            .filter(user::Column::Role.is_in(role_names))
            .filter(user::Column::IsActive.eq(true))
            .all(conn)
            .await?;
        for recipient in &recipients {
            Self::insert(conn, recipient.id, Some(company_id), &n).await?;
        }
        Ok(recipients)
    }

    pub async fn notify_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        company_id: Option<Uuid>,
        n: NewNotification,
    ) -> Result<notification::Model, ServiceError> {
        Self::insert(conn, user_id, company_id, &n).await
    }

    #[instrument(skip(self, user))]
    pub async fn list(
        &self,
        user: &AuthUser,
        unread_only: bool,
        page: u64,
        per_page: u64,
    ) -> Result<Page<notification::Model>, ServiceError> {
        let mut query =
            notification::Entity::find().filter(notification::Column::UserId.eq(user.user_id));
        if unread_only {
            query = query.filter(notification::Column::ReadAt.is_null());
        }
        fetch_page(
            &self.db,
            query.order_by_desc(notification::Column::CreatedAt),
            page,
            per_page,
        )
        .await
    }

    pub async fn mark_read(
        &self,
        user: &AuthUser,
        id: Uuid,
    ) -> Result<notification::Model, ServiceError> {
        let found = notification::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|n| n.user_id == user.user_id)
            .ok_or_else(|| ServiceError::not_found("Notification", id))?;
        if found.read_at.is_some() {
            return Ok(found);
        }
        let mut active: notification::ActiveModel = found.into();
        active.read_at = Set(Some(Utc::now()));
        Ok(active.update(&*self.db).await?)
    }

    /// Returns the number of notifications marked
    pub async fn mark_all_read(&self, user: &AuthUser) -> Result<u64, ServiceError> {
        let result = notification::Entity::update_many()
            .col_expr(notification::Column::ReadAt, Expr::value(Some(Utc::now())))
            .filter(notification::Column::UserId.eq(user.user_id))
            .filter(notification::Column::ReadAt.is_null())
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        use sea_orm::PaginatorTrait;
        Ok(notification::Entity::find()
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::ReadAt.is_null())
            .count(&*self.db)
            .await?)
    }
}
