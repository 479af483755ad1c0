use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::{
    common::{
        created_response, map_service_error, no_content_response, success_response, ApiJson,
        ApiPath, ApiQuery, PaginatedResponse, PaginationParams,
    },
    equipment::VesselScope,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::hse::{CreateHseRequest, HseFilter, UpdateHseRequest},
    AppState,
};

/// Certificates, drills, incidents and inspections
pub fn hse_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/hse", get(list_hse))
        .route("/hse/board", get(hse_board))
        .route("/hse/:id", get(get_hse))
        .with_permission(perm::HSE_READ);
    let manage = Router::new()
        .route("/hse", post(create_hse))
        .route("/hse/:id", axum::routing::put(update_hse).delete(delete_hse))
        .route("/hse/:id/complete", post(complete_drill))
        .route("/hse/:id/close", post(close_incident))
        .with_permission(perm::HSE_MANAGE);
    read.merge(manage)
}

#[utoipa::path(
    get,
    path = "/api/v1/hse",
    params(
        PaginationParams,
        ("vessel_id" = Option<Uuid>, Query, description = "Vessel filter"),
        ("category" = Option<String>, Query, description = "certificate | drill | incident | inspection"),
        ("attention" = Option<bool>, Query, description = "Only items needing attention")
    ),
    responses((status = 200, description = "HSE items with compliance status")),
    security(("bearer_auth" = [])),
    tag = "hse"
)]
pub async fn list_hse(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(filter): ApiQuery<HseFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let items = state
        .services
        .hse
        .list(&user, filter, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        items, page, per_page,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/hse",
    request_body = CreateHseRequest,
    responses(
        (status = 201, description = "HSE item recorded", body = crate::services::hse::HseItemView),
        (status = 400, description = "Invalid dates for the category", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "hse"
)]
pub async fn create_hse(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CreateHseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .hse
        .create(&user, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(item))
}

#[utoipa::path(
    get,
    path = "/api/v1/hse/{id}",
    params(("id" = Uuid, Path, description = "HSE item ID")),
    responses(
        (status = 200, description = "HSE item", body = crate::services::hse::HseItemView),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "hse"
)]
pub async fn get_hse(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .hse
        .get(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

#[utoipa::path(
    put,
    path = "/api/v1/hse/{id}",
    params(("id" = Uuid, Path, description = "HSE item ID")),
    request_body = UpdateHseRequest,
    responses(
        (status = 200, description = "HSE item updated", body = crate::services::hse::HseItemView),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "hse"
)]
pub async fn update_hse(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateHseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .hse
        .update(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

#[utoipa::path(
    delete,
    path = "/api/v1/hse/{id}",
    params(("id" = Uuid, Path, description = "HSE item ID")),
    responses(
        (status = 204, description = "HSE item deleted"),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "hse"
)]
pub async fn delete_hse(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .hse
        .delete(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/hse/{id}/complete",
    params(("id" = Uuid, Path, description = "Drill ID")),
    responses(
        (status = 200, description = "Drill completed", body = crate::services::hse::HseItemView),
        (status = 400, description = "Item is not a drill", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "hse"
)]
pub async fn complete_drill(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .hse
        .complete(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

#[utoipa::path(
    post,
    path = "/api/v1/hse/{id}/close",
    params(("id" = Uuid, Path, description = "Incident ID")),
    responses(
        (status = 200, description = "Incident closed", body = crate::services::hse::HseItemView),
        (status = 400, description = "Item is not an incident", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "hse"
)]
pub async fn close_incident(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .hse
        .close(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

/// Compliance counts per vessel and category, plus items needing attention
#[utoipa::path(
    get,
    path = "/api/v1/hse/board",
    params(VesselScope),
    responses((status = 200, description = "Compliance board", body = crate::services::hse::HseBoard)),
    security(("bearer_auth" = [])),
    tag = "hse"
)]
pub async fn hse_board(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(scope): ApiQuery<VesselScope>,
) -> Result<impl IntoResponse, ApiError> {
    let board = state
        .services
        .hse
        .board(&user, scope.vessel_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(board))
}
