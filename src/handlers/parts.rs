use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

use super::{
    common::{
        created_response, map_service_error, no_content_response, success_response, ApiJson,
        ApiPath, ApiQuery, ListResponse, PaginatedResponse, PaginationParams,
    },
    equipment::VesselScope,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::inventory::{AdjustStockRequest, CreatePartRequest, PartFilter, UpdatePartRequest},
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ValuationQuery {
    /// Administrators only
    pub company_id: Option<Uuid>,
}

pub fn part_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/parts", get(list_parts))
        .route("/parts/:id", get(get_part))
        .route("/inventory/low-stock", get(low_stock))
        .route("/inventory/valuation", get(valuation))
        .with_permission(perm::PARTS_READ);
    let manage = Router::new()
        .route("/parts", post(create_part))
        .route("/parts/:id", axum::routing::put(update_part).delete(delete_part))
        .with_permission(perm::PARTS_MANAGE);
    let adjust = Router::new()
        .route("/parts/:id/adjust", post(adjust_stock))
        .with_permission(perm::PARTS_ADJUST);
    read.merge(manage).merge(adjust)
}

#[utoipa::path(
    get,
    path = "/api/v1/parts",
    params(
        PaginationParams,
        ("vessel_id" = Option<Uuid>, Query, description = "Vessel filter"),
        ("equipment_id" = Option<Uuid>, Query, description = "Equipment filter"),
        ("search" = Option<String>, Query, description = "Name or part number fragment")
    ),
    responses((status = 200, description = "Spare parts with stock status")),
    security(("bearer_auth" = [])),
    tag = "parts"
)]
pub async fn list_parts(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(filter): ApiQuery<PartFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let parts = state
        .services
        .inventory
        .list(&user, filter, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        parts, page, per_page,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/parts",
    request_body = CreatePartRequest,
    responses(
        (status = 201, description = "Part created", body = crate::services::inventory::PartView),
        (status = 404, description = "Vessel or equipment not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "parts"
)]
pub async fn create_part(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CreatePartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let part = state
        .services
        .inventory
        .create(&user, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(part))
}

#[utoipa::path(
    get,
    path = "/api/v1/parts/{id}",
    params(("id" = Uuid, Path, description = "Part ID")),
    responses(
        (status = 200, description = "Part", body = crate::services::inventory::PartView),
        (status = 404, description = "Part not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "parts"
)]
pub async fn get_part(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let part = state
        .services
        .inventory
        .get(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(part))
}

#[utoipa::path(
    put,
    path = "/api/v1/parts/{id}",
    params(("id" = Uuid, Path, description = "Part ID")),
    request_body = UpdatePartRequest,
    responses(
        (status = 200, description = "Part updated", body = crate::services::inventory::PartView),
        (status = 404, description = "Part not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "parts"
)]
pub async fn update_part(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdatePartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let part = state
        .services
        .inventory
        .update(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(part))
}

#[utoipa::path(
    delete,
    path = "/api/v1/parts/{id}",
    params(("id" = Uuid, Path, description = "Part ID")),
    responses(
        (status = 204, description = "Part deleted"),
        (status = 404, description = "Part not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "parts"
)]
pub async fn delete_part(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .inventory
        .delete(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Consumption or restock; may open a low-stock alert
#[utoipa::path(
    post,
    path = "/api/v1/parts/{id}/adjust",
    params(("id" = Uuid, Path, description = "Part ID")),
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Stock adjusted", body = crate::services::inventory::AdjustmentResult),
        (status = 400, description = "Quantity would go negative", body = crate::errors::ErrorResponse),
        (status = 404, description = "Part not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "parts"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AdjustStockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .inventory
        .adjust(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    if let Some(alert) = &result.alert {
        info!(part_id = %id, alert_id = %alert.id, "adjustment opened low-stock alert");
    }
    Ok(success_response(result))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/low-stock",
    params(VesselScope),
    responses((status = 200, description = "Parts at or below their minimum quantity")),
    security(("bearer_auth" = [])),
    tag = "parts"
)]
pub async fn low_stock(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(scope): ApiQuery<VesselScope>,
) -> Result<impl IntoResponse, ApiError> {
    let parts = state
        .services
        .inventory
        .low_stock(&user, scope.vessel_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ListResponse::from(parts)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/valuation",
    params(ValuationQuery),
    responses((status = 200, description = "Stock value per vessel", body = crate::reports::InventoryValuation)),
    security(("bearer_auth" = [])),
    tag = "parts"
)]
pub async fn valuation(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ValuationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let valuation = state
        .services
        .inventory
        .valuation(&user, query.company_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(valuation))
}
