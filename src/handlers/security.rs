use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{
    map_service_error, success_response, ApiPath, ApiQuery, PaginatedResponse, PaginationParams,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SecurityAlertQuery {
    pub acknowledged: Option<bool>,
}

pub fn security_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/security/alerts", get(list_security_alerts))
        .with_permission(perm::SECURITY_READ);
    let manage = Router::new()
        .route("/security/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/security/scan", post(run_monitor))
        .with_permission(perm::SECURITY_MANAGE);
    read.merge(manage)
}

#[utoipa::path(
    get,
    path = "/api/v1/security/alerts",
    params(PaginationParams, SecurityAlertQuery),
    responses((status = 200, description = "Security alerts, newest first")),
    security(("bearer_auth" = [])),
    tag = "security"
)]
pub async fn list_security_alerts(
    State(state): State<AppState>,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(query): ApiQuery<SecurityAlertQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let alerts = state
        .services
        .security
        .list(query.acknowledged, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        alerts, page, per_page,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/security/alerts/{id}/acknowledge",
    params(("id" = Uuid, Path, description = "Security alert ID")),
    responses(
        (status = 200, description = "Alert acknowledged", body = crate::entities::security_alert::Model),
        (status = 404, description = "Alert not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "security"
)]
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let alert = state
        .services
        .security
        .acknowledge(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(alert))
}

/// Runs the failed-login scan outside its schedule
#[utoipa::path(
    post,
    path = "/api/v1/security/scan",
    responses((status = 200, description = "Scan result", body = crate::services::security::MonitorReport)),
    security(("bearer_auth" = [])),
    tag = "security"
)]
pub async fn run_monitor(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .services
        .security
        .monitor()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(report))
}
