use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;
use uuid::Uuid;

use super::common::{
    created_response, map_service_error, success_response, ApiPath, ApiQuery, PaginatedResponse,
    PaginationParams,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::alerts::AlertFilter,
    AppState,
};

pub fn alert_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/alerts", get(list_alerts))
        .route("/alerts/:id", get(get_alert))
        .with_permission(perm::ALERTS_READ);
    let manage = Router::new()
        .route("/alerts/check", post(check_stock))
        .route("/alerts/:id/resolve", post(resolve_alert))
        .with_permission(perm::ALERTS_MANAGE);
    let order = Router::new()
        .route("/alerts/:id/purchase-order", post(order_from_alert))
        .with_permission(perm::PURCHASE_ORDERS_CREATE);
    read.merge(manage).merge(order)
}

#[utoipa::path(
    get,
    path = "/api/v1/alerts",
    params(
        PaginationParams,
        ("vessel_id" = Option<Uuid>, Query, description = "Vessel filter"),
        ("status" = Option<String>, Query, description = "open | admin_notified | vessel_notified | ordered | resolved"),
        ("open" = Option<bool>, Query, description = "Only unresolved alerts")
    ),
    responses((status = 200, description = "Low-stock alerts")),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(filter): ApiQuery<AlertFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let alerts = state
        .services
        .alerts
        .list(&user, filter, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        alerts, page, per_page,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/alerts/{id}",
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Low-stock alert", body = crate::entities::low_stock_alert::Model),
        (status = 404, description = "Alert not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn get_alert(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let alert = state
        .services
        .alerts
        .get(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(alert))
}

#[utoipa::path(
    post,
    path = "/api/v1/alerts/{id}/resolve",
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Alert resolved", body = crate::entities::low_stock_alert::Model),
        (status = 404, description = "Alert not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn resolve_alert(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let alert = state
        .services
        .alerts
        .resolve(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(alert))
}

/// Runs the periodic stock scan on demand
#[utoipa::path(
    post,
    path = "/api/v1/alerts/check",
    responses((status = 200, description = "Scan result", body = crate::services::alerts::StockCheckReport)),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn check_stock(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .services
        .alerts
        .check_stock()
        .await
        .map_err(map_service_error)?;
    info!(
        below_minimum = report.parts_below_minimum,
        opened = report.alerts_opened,
        "manual stock check"
    );
    Ok(success_response(report))
}

#[utoipa::path(
    post,
    path = "/api/v1/alerts/{id}/purchase-order",
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 201, description = "Draft purchase order for the reorder quantity", body = crate::services::purchase_orders::PurchaseOrderDetail),
        (status = 409, description = "Alert already ordered or resolved", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn order_from_alert(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .purchase_orders
        .create_from_alert(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(order))
}
