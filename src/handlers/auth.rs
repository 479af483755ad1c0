use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;

use crate::{
    auth::{AuthUser, LoginCredentials, RefreshTokenRequest, RegisterRequest},
    errors::{ApiError, ServiceError},
    handlers::common::{
        created_response, map_service_error, no_content_response, success_response, ApiJson,
    },
    AppState,
};

/// Client address for login auditing; the first `x-forwarded-for` hop wins
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|p| p.ip().to_string()))
}

/// Public authentication routes; `/logout` and `/me` check the bearer token
/// themselves
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh_token))
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = crate::auth::RegisterResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // staff registration carries an admin token; self-service has none
    let caller = state.auth.authenticate_headers(&headers).await.ok();
    let response = state
        .auth
        .register(payload, caller.as_ref())
        .await
        .map_err(map_service_error)?;
    Ok(created_response(response))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginCredentials,
    responses(
        (status = 200, description = "Logged in", body = crate::auth::LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
        (status = 429, description = "Too many failed attempts", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<LoginCredentials>,
) -> Result<impl IntoResponse, ApiError> {
    validator::Validate::validate(&payload).map_err(ServiceError::from)?;
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let response = state
        .auth
        .login(&payload, ip)
        .await
        .map_err(map_service_error)?;
    info!(user_id = %response.user.id, "user logged in");
    Ok(success_response(response))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Token pair rotated", body = crate::auth::TokenPair),
        (status = 401, description = "Invalid, expired or revoked refresh token", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "Refresh token is required".to_string(),
        ));
    }
    let tokens = state
        .auth
        .refresh(payload.refresh_token.trim())
        .await
        .map_err(ServiceError::from)?;
    Ok(success_response(tokens))
}

async fn authenticated(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
    state
        .auth
        .authenticate_headers(headers)
        .await
        .map_err(|e| ApiError::ServiceError(e.into()))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Tokens revoked"),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticated(&state, &headers).await?;
    state.auth.logout(&user).await.map_err(ServiceError::from)?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = crate::auth::UserProfile),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticated(&state, &headers).await?;
    let profile = state
        .auth
        .current_user(&user)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        assert_eq!(
            client_ip(&headers, Some(peer)).as_deref(),
            Some("203.0.113.7")
        );
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(peer)).as_deref(),
            Some("127.0.0.1")
        );
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
