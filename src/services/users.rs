use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{fetch_page, Page};
use crate::auth::{AuthService, AuthUser, NewUser, UserProfile, UserRole};
use crate::entities::{refresh_token, user};
use crate::errors::ServiceError;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub role: UserRole,
    /// Required when an administrator creates a company user
    pub company_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub company_id: Option<Uuid>,
    pub role: Option<UserRole>,
}

/// Staff management inside a company
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, auth: Arc<AuthService>) -> Self {
        Self { db, auth }
    }

    async fn find_scoped(&self, caller: &AuthUser, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|u| caller.is_admin() || (u.company_id.is_some() && u.company_id == caller.company_id))
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    pub async fn list(
        &self,
        caller: &AuthUser,
        filter: UserFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<UserProfile>, ServiceError> {
        let mut query = user::Entity::find();
        match caller.tenant_filter() {
            Some(company_id) => query = query.filter(user::Column::CompanyId.eq(company_id)),
            None => {
                if let Some(company_id) = filter.company_id {
                    query = query.filter(user::Column::CompanyId.eq(company_id));
                }
            }
        }
        if let Some(role) = filter.role {
            query = query.filter(user::Column::Role.eq(role.to_string()));
        }
        let page = fetch_page(&self.db, query.order_by_asc(user::Column::Name), page, per_page).await?;
        Ok(page.map(UserProfile::from))
    }

    pub async fn get(&self, caller: &AuthUser, id: Uuid) -> Result<UserProfile, ServiceError> {
        Ok(self.find_scoped(caller, id).await?.into())
    }

    #[instrument(skip(self, caller, req), fields(role = %req.role))]
    pub async fn create(
        &self,
        caller: &AuthUser,
        req: CreateUserRequest,
    ) -> Result<UserProfile, ServiceError> {
        req.validate()?;
        let company_id = if req.role == UserRole::Admin {
            if !caller.is_admin() {
                return Err(ServiceError::Forbidden(
                    "Only administrators can create administrators".into(),
                ));
            }
            None
        } else {
            Some(caller.target_company(req.company_id)?)
        };
        let created = self
            .auth
            .insert_user(
                &*self.db,
                NewUser {
                    company_id,
                    email: req.email,
                    name: req.name,
                    password: req.password,
                    role: req.role,
                },
            )
            .await?;
        info!(user_id = %created.id, "user created");
        Ok(created.into())
    }

    #[instrument(skip(self, caller, req))]
    pub async fn update(
        &self,
        caller: &AuthUser,
        id: Uuid,
        req: UpdateUserRequest,
    ) -> Result<UserProfile, ServiceError> {
        req.validate()?;
        let existing = self.find_scoped(caller, id).await?;
        if req.role == Some(UserRole::Admin) && !caller.is_admin() {
            return Err(ServiceError::Forbidden(
                "Only administrators can grant the admin role".into(),
            ));
        }
        if existing.id == caller.user_id && req.is_active == Some(false) {
            return Err(ServiceError::InvalidOperation(
                "You cannot deactivate your own account".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let deactivating = req.is_active == Some(false) && existing.is_active;
        let mut active: user::ActiveModel = existing.into();
        if let Some(name) = req.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(role) = req.role {
            active.role = Set(role.to_string());
        }
        if let Some(is_active) = req.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        if deactivating {
            refresh_token::Entity::update_many()
                .col_expr(refresh_token::Column::Revoked, Expr::value(true))
                .filter(refresh_token::Column::UserId.eq(updated.id))
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;
        Ok(updated.into())
    }

    /// Soft delete: the account is deactivated and its sessions revoked
    pub async fn deactivate(&self, caller: &AuthUser, id: Uuid) -> Result<(), ServiceError> {
        self.update(
            caller,
            id,
            UpdateUserRequest {
                name: None,
                role: None,
                is_active: Some(false),
            },
        )
        .await?;
        Ok(())
    }
}
