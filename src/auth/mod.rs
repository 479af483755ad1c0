/*!
 * # Authentication and Authorization Module
 *
 * JWT bearer authentication for the SMS API:
 *
 * - HS256 access tokens carrying the caller's role, permissions and company
 * - Rotating refresh tokens whose ids are persisted in `refresh_tokens`
 * - Login attempt recording with a per-email lockout window
 *
 * Role-based access control lives in [`rbac`]; permission strings and the
 * wildcard matcher live in [`permissions`].
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::entities::{company, login_attempt, refresh_token, user};
use crate::errors::{ErrorResponse, ServiceError};
use crate::metrics::SECURITY_METRICS;

mod password;
mod permissions;
mod rbac;

pub use password::*;
pub use permissions::*;
pub use rbac::*;

const ACCESS_TOKEN: &str = "access";
const REFRESH_TOKEN: &str = "refresh";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,               // Subject (user ID)
    pub name: Option<String>,      // User's name
    pub email: Option<String>,     // User's email
    pub role: String,              // Single platform role
    pub permissions: Vec<String>,  // Permissions granted by the role
    pub tenant_id: Option<String>, // Company id; absent for platform admins
    pub jti: String,               // JWT ID (unique identifier for this token)
    pub iat: i64,                  // Issued at time
    pub exp: i64,                  // Expiration time
    pub nbf: i64,                  // Not valid before time
    pub iss: String,               // Issuer
    pub aud: String,               // Audience
    pub token_type: String,        // "access" or "refresh"
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: String,
    pub permissions: Vec<String>,
    pub company_id: Option<Uuid>,
    pub token_id: String,
}

impl AuthUser {
    pub fn has_role(&self, role: UserRole) -> bool {
        self.role == role.as_ref()
    }

    /// Check if the user has a specific permission, honouring wildcards
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| permission_matches(p, permission))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Admin)
    }

    /// Name shown to other users; falls back to the email address
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("unknown user")
    }

    /// Company filter for tenant-scoped queries; `None` means every company
    pub fn tenant_filter(&self) -> Option<Uuid> {
        if self.is_admin() {
            None
        } else {
            self.company_id
        }
    }

    /// Whether a row owned by `company_id` is visible to this caller
    pub fn can_access(&self, company_id: Uuid) -> bool {
        self.is_admin() || self.company_id == Some(company_id)
    }

    /// Company a write should land in. Admins must name one explicitly; other
    /// roles always write into their own company.
    pub fn target_company(&self, requested: Option<Uuid>) -> Result<Uuid, ServiceError> {
        if self.is_admin() {
            return requested
                .ok_or_else(|| ServiceError::ValidationError("company_id is required".into()));
        }
        let own = self.require_company()?;
        match requested {
            Some(other) if other != own => Err(ServiceError::Forbidden(
                "Cannot act on behalf of another company".into(),
            )),
            _ => Ok(own),
        }
    }

    /// The caller's own company; platform admins have none
    pub fn require_company(&self) -> Result<Uuid, ServiceError> {
        self.company_id
            .ok_or_else(|| ServiceError::Forbidden("User is not attached to a company".into()))
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
    pub refresh_token_expiration: Duration,
    pub failed_login_threshold: u64,
    pub lockout_window: ChronoDuration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        jwt_audience: String,
        jwt_issuer: String,
        access_token_expiration: Duration,
        refresh_token_expiration: Duration,
    ) -> Self {
        Self {
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            access_token_expiration,
            refresh_token_expiration,
            failed_login_threshold: 5,
            lockout_window: ChronoDuration::minutes(15),
        }
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_audience: cfg.auth_audience.clone(),
            jwt_issuer: cfg.auth_issuer.clone(),
            access_token_expiration: Duration::from_secs(cfg.jwt_expiration as u64),
            refresh_token_expiration: Duration::from_secs(cfg.refresh_token_expiration as u64),
            failed_login_threshold: cfg.security_failed_login_threshold,
            lockout_window: ChronoDuration::minutes(cfg.security_window_minutes),
        }
    }
}

/// Authentication service that handles accounts, token issuance and validation
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    pub db: Arc<DatabaseConnection>,
    password_policy: PasswordPolicy,
    blacklisted_tokens: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

/// Fields needed to create a user account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub company_id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: UserRole,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self {
            config,
            db,
            password_policy: PasswordPolicy::default(),
            blacklisted_tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validates, hashes and inserts a user on the given connection
    pub async fn insert_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        new_user: NewUser,
    ) -> Result<user::Model, ServiceError> {
        self.password_policy
            .validate(&new_user.password)
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let email = new_user.email.trim().to_lowercase();
        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(conn)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A user with email {} already exists",
                email
            )));
        }

        let password_hash = hash_password(&new_user.password)
            .map_err(|e| ServiceError::HashError(e.to_string()))?;
        let now = Utc::now();
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(new_user.company_id),
            email: Set(email),
            password_hash: Set(password_hash),
            name: Set(new_user.name.trim().to_string()),
            role: Set(new_user.role.to_string()),
            is_active: Set(true),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        info!(user_id = %model.id, role = %model.role, "user created");
        Ok(model)
    }

    /// Self-service registration creates a company with its first manager.
    /// An admin caller may instead attach staff to an existing company.
    #[instrument(skip(self, request, caller), fields(email = %request.email))]
    pub async fn register(
        &self,
        request: RegisterRequest,
        caller: Option<&AuthUser>,
    ) -> Result<RegisterResponse, ServiceError> {
        request.validate()?;

        if let Some(company_id) = request.company_id {
            let admin = caller.filter(|c| c.is_admin()).ok_or_else(|| {
                ServiceError::Forbidden("Only administrators can register staff".into())
            })?;
            company::Entity::find_by_id(company_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Company", company_id))?;

            let role = match request.role.as_deref() {
                Some(r) => r
                    .parse::<UserRole>()
                    .map_err(|_| ServiceError::ValidationError(format!("Unknown role {}", r)))?,
                None => UserRole::Technician,
            };
            let created = self
                .insert_user(
                    &*self.db,
                    NewUser {
                        company_id: Some(company_id),
                        email: request.email,
                        name: request.name,
                        password: request.password,
                        role,
                    },
                )
                .await?;
            debug!(admin = %admin.user_id, "staff registered by administrator");
            return Ok(RegisterResponse {
                user: UserProfile::from(created),
                tokens: None,
            });
        }

        let company_name = request
            .company_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ServiceError::ValidationError("company_name is required".into()))?
            .to_string();

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let company = company::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(company_name),
            contact_email: Set(request.email.trim().to_lowercase()),
            contact_phone: Set(request.contact_phone.clone()),
            address: Set(None),
            subscription_tier: Set(company::SubscriptionTier::None.to_string()),
            subscription_expires_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let manager = self
            .insert_user(
                &txn,
                NewUser {
                    company_id: Some(company.id),
                    email: request.email,
                    name: request.name,
                    password: request.password,
                    role: UserRole::Manager,
                },
            )
            .await?;
        txn.commit().await?;

        info!(company_id = %company.id, "company registered");
        let tokens = self.issue_tokens(&manager).await?;
        Ok(RegisterResponse {
            user: UserProfile::from(manager),
            tokens: Some(tokens),
        })
    }

    /// Verifies credentials and issues a token pair. Every attempt is recorded.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(
        &self,
        credentials: &LoginCredentials,
        ip_address: Option<String>,
    ) -> Result<LoginResponse, ServiceError> {
        let email = credentials.email.trim().to_lowercase();

        if self.recent_failures(&email).await? >= self.config.failed_login_threshold {
            self.record_attempt(&email, ip_address, false).await?;
            SECURITY_METRICS.login_locked_out.inc();
            warn!("login refused, too many recent failures");
            return Err(ServiceError::RateLimitExceeded);
        }

        let found = user::Entity::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(&*self.db)
            .await?;

        let verified = found
            .filter(|u| u.is_active && verify_password(&credentials.password, &u.password_hash));

        self.record_attempt(&email, ip_address, verified.is_some())
            .await?;

        let Some(user) = verified else {
            SECURITY_METRICS.login_failure.inc();
            return Err(AuthError::InvalidCredentials.into());
        };
        SECURITY_METRICS.login_success.inc();

        let now = Utc::now();
        let mut active: user::ActiveModel = user.clone().into();
        active.last_login_at = Set(Some(now));
        active.updated_at = Set(now);
        let user = active.update(&*self.db).await?;

        let tokens = self.issue_tokens(&user).await?;
        Ok(LoginResponse {
            tokens,
            user: UserProfile::from(user),
        })
    }

    /// Failed attempts for `email` inside the lockout window since the last success
    async fn recent_failures(&self, email: &str) -> Result<u64, ServiceError> {
        let window_start = Utc::now() - self.config.lockout_window;
        let last_success = login_attempt::Entity::find()
            .filter(login_attempt::Column::Email.eq(email))
            .filter(login_attempt::Column::Success.eq(true))
            .filter(login_attempt::Column::CreatedAt.gte(window_start))
            .order_by_desc(login_attempt::Column::CreatedAt)
            .one(&*self.db)
            .await?;
        let since = last_success.map_or(window_start, |a| a.created_at.max(window_start));

        Ok(login_attempt::Entity::find()
            .filter(login_attempt::Column::Email.eq(email))
            .filter(login_attempt::Column::Success.eq(false))
            .filter(login_attempt::Column::CreatedAt.gt(since))
            .count(&*self.db)
            .await?)
    }

    async fn record_attempt(
        &self,
        email: &str,
        ip_address: Option<String>,
        success: bool,
    ) -> Result<(), ServiceError> {
        login_attempt::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            ip_address: Set(ip_address),
            success: Set(success),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;
        Ok(())
    }

    /// Generate an access/refresh pair and persist the refresh token id
    pub async fn issue_tokens(&self, user: &user::Model) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access_exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;
        let refresh_exp = now
            + ChronoDuration::from_std(self.config.refresh_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let tenant_id = user.company_id.map(|id| id.to_string());
        let access_claims = Claims {
            sub: user.id.to_string(),
            name: Some(user.name.clone()),
            email: Some(user.email.clone()),
            role: user.role.clone(),
            permissions: permissions_for_role(&user.role),
            tenant_id: tenant_id.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            token_type: ACCESS_TOKEN.to_string(),
        };

        // Refresh tokens carry no permissions; they are re-derived on rotation
        let refresh_jti = Uuid::new_v4().to_string();
        let refresh_claims = Claims {
            sub: user.id.to_string(),
            name: None,
            email: None,
            role: user.role.clone(),
            permissions: vec![],
            tenant_id,
            jti: refresh_jti.clone(),
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            token_type: REFRESH_TOKEN.to_string(),
        };

        let access_token = self.encode(&access_claims)?;
        let refresh_token = self.encode(&refresh_claims)?;

        refresh_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.id),
            jti: Set(refresh_jti),
            expires_at: Set(refresh_exp),
            revoked: Set(false),
            created_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.as_secs() as i64,
            refresh_expires_in: self.config.refresh_token_expiration.as_secs() as i64,
        })
    }

    fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.validate_nbf = true;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Validate an access token and extract the claims
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.decode(token)?;
        if claims.token_type != ACCESS_TOKEN {
            return Err(AuthError::InvalidToken);
        }
        if self.is_token_blacklisted(&claims.jti).await {
            return Err(AuthError::RevokedToken);
        }
        Ok(claims)
    }

    /// Exchange a refresh token for a new pair; the presented token is revoked
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh: &str) -> Result<TokenPair, AuthError> {
        let claims = self.decode(refresh)?;
        if claims.token_type != REFRESH_TOKEN {
            return Err(AuthError::InvalidToken);
        }
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        let stored = refresh_token::Entity::find()
            .filter(refresh_token::Column::Jti.eq(claims.jti.clone()))
            .filter(refresh_token::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::InvalidToken)?;
        if stored.revoked {
            return Err(AuthError::RevokedToken);
        }
        if stored.expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }

        let user = user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .filter(|u| u.is_active)
            .ok_or(AuthError::UserNotFound)?;

        // only the request that flips `revoked` may rotate the token
        let rotated = refresh_token::Entity::update_many()
            .col_expr(refresh_token::Column::Revoked, Expr::value(true))
            .filter(refresh_token::Column::Id.eq(stored.id))
            .filter(refresh_token::Column::Revoked.eq(false))
            .exec(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        if rotated.rows_affected != 1 {
            warn!(user_id = %user_id, "refresh token reused during rotation");
            return Err(AuthError::RevokedToken);
        }

        SECURITY_METRICS.token_refresh.inc();
        self.issue_tokens(&user).await
    }

    /// Blacklist the access token and revoke every refresh token of the user
    pub async fn logout(&self, auth_user: &AuthUser) -> Result<(), AuthError> {
        let expiry = Utc::now()
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;
        {
            let mut blacklist = self.blacklisted_tokens.write().await;
            blacklist.insert(auth_user.token_id.clone(), expiry);
            let now = Utc::now();
            blacklist.retain(|_, exp| *exp > now);
        }

        refresh_token::Entity::update_many()
            .col_expr(refresh_token::Column::Revoked, Expr::value(true))
            .filter(refresh_token::Column::UserId.eq(auth_user.user_id))
            .filter(refresh_token::Column::Revoked.eq(false))
            .exec(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        info!(user_id = %auth_user.user_id, "user logged out");
        Ok(())
    }

    async fn is_token_blacklisted(&self, token_id: &str) -> bool {
        let blacklist = self.blacklisted_tokens.read().await;
        blacklist.contains_key(token_id)
    }

    /// Resolve the bearer token in `headers`, if any
    pub async fn authenticate_headers(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingAuth)?;
        let claims = self.validate_token(token).await?;
        AuthUser::try_from(claims)
    }

    pub async fn current_user(&self, auth_user: &AuthUser) -> Result<UserProfile, ServiceError> {
        user::Entity::find_by_id(auth_user.user_id)
            .one(&*self.db)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| ServiceError::not_found("User", auth_user.user_id))
    }
}

impl TryFrom<Claims> for AuthUser {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let company_id = claims
            .tenant_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthUser {
            user_id,
            name: claims.name,
            email: claims.email,
            role: claims.role,
            permissions: claims.permissions,
            company_id,
            token_id: claims.jti,
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Token pair response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

/// Login credentials
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginCredentials {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 255))]
    pub password: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Name of the new company for self-service registration
    #[validate(length(max = 255))]
    pub company_name: Option<String>,
    pub contact_phone: Option<String>,
    /// Existing company to join; administrators only
    pub company_id: Option<Uuid>,
    /// Role for staff registered by an administrator
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub user: UserProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenPair>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserProfile,
}

/// Refresh token request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Public view of a user account
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserProfile {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            company_id: u.company_id,
            email: u.email,
            name: u.name,
            role: u.role,
            is_active: u.is_active,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
        }
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_CREDENTIALS",
                "Invalid credentials".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::RevokedToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REVOKED_TOKEN",
                "Authentication token has been revoked".to_string(),
            ),
            Self::UserNotFound => (
                StatusCode::UNAUTHORIZED,
                "AUTH_USER_NOT_FOUND",
                "User no longer exists or is disabled".to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::TokenCreation(_) | Self::DatabaseError(_) | Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self, "authentication failure");
        }
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(msg) | AuthError::InternalError(msg) => {
                ServiceError::InternalError(msg)
            }
            AuthError::DatabaseError(msg) => ServiceError::InternalError(msg),
            AuthError::InvalidToken | AuthError::TokenExpired | AuthError::RevokedToken => {
                ServiceError::JwtError(err.to_string())
            }
            AuthError::MissingAuth | AuthError::InvalidCredentials | AuthError::UserNotFound => {
                ServiceError::Unauthorized(err.to_string())
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Permission middleware to check if a user has the required permission
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    // Admins have all permissions
    if user.is_admin() || user.has_permission(&required_permission) {
        return Ok(next.run(request).await);
    }

    SECURITY_METRICS.permission_denied.inc();
    debug!(
        user_id = %user.user_id,
        permission = %required_permission,
        "permission denied"
    );
    Err(AuthError::InsufficientPermissions)
}

/// Role middleware to check if a user has the required role
pub async fn role_middleware(
    State(required_role): State<UserRole>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_role(required_role) && !user.is_admin() {
        SECURITY_METRICS.permission_denied.inc();
        return Err(AuthError::InsufficientPermissions);
    }
    Ok(next.run(request).await)
}

/// Authentication middleware that extracts and validates bearer tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return AuthError::InternalError("Authentication service not available".into())
                .into_response();
        }
    };

    match auth_service.authenticate_headers(request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
    fn with_role(self, role: UserRole) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }

    fn with_role(self, role: UserRole) -> Self {
        self.layer(axum::middleware::from_fn_with_state(role, role_middleware))
            .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: &str, tenant: Option<Uuid>) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: Uuid::new_v4().to_string(),
            name: Some("Ada".into()),
            email: Some("ada@fleet.example".into()),
            role: role.into(),
            permissions: permissions_for_role(role),
            tenant_id: tenant.map(|t| t.to_string()),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + 60,
            nbf: now,
            iss: "sms-api".into(),
            aud: "sms-clients".into(),
            token_type: ACCESS_TOKEN.into(),
        }
    }

    #[test]
    fn auth_user_company_scoping() {
        let company = Uuid::new_v4();
        let manager = AuthUser::try_from(claims("manager", Some(company))).unwrap();
        assert_eq!(manager.tenant_filter(), Some(company));
        assert!(manager.can_access(company));
        assert!(!manager.can_access(Uuid::new_v4()));
        assert_eq!(manager.target_company(None).unwrap(), company);
        assert!(manager.target_company(Some(Uuid::new_v4())).is_err());

        let admin = AuthUser::try_from(claims("admin", None)).unwrap();
        assert_eq!(admin.tenant_filter(), None);
        assert!(admin.can_access(company));
        assert!(admin.target_company(None).is_err());
        assert_eq!(admin.target_company(Some(company)).unwrap(), company);
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn auth_errors_map_to_service_errors() {
        assert_eq!(
            ServiceError::from(AuthError::InvalidCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::from(AuthError::InsufficientPermissions).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AuthError::TokenExpired.parts().1, "AUTH_TOKEN_EXPIRED");
    }
}
