use axum::{extract::State, response::IntoResponse, routing::get, Router};

use super::common::{map_service_error, success_response};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    AppState,
};

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .with_permission(perm::DASHBOARD_READ)
}

/// Shape depends on the caller's role; see the `role` tag in the body
#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses((status = 200, description = "Role-specific dashboard", body = crate::services::dashboard::Dashboard)),
    security(("bearer_auth" = [])),
    tag = "dashboard"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let dashboard = state
        .services
        .dashboard
        .for_user(&user)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(dashboard))
}
