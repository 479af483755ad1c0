use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;
use uuid::Uuid;

use super::common::{
    created_response, map_service_error, no_content_response, success_response, ApiJson, ApiPath,
    ApiQuery, PaginatedResponse, PaginationParams,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::vessels::{CreateVesselRequest, OnboardVesselRequest, UpdateVesselRequest, VesselFilter},
    AppState,
};

pub fn vessel_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/vessels", get(list_vessels))
        .route("/vessels/:id", get(get_vessel))
        .route("/vessels/:id/summary", get(vessel_summary))
        .with_permission(perm::VESSELS_READ);
    let manage = Router::new()
        .route("/vessels", post(create_vessel))
        .route("/vessels/onboard", post(onboard_vessel))
        .route(
            "/vessels/:id",
            axum::routing::put(update_vessel).delete(delete_vessel),
        )
        .with_permission(perm::VESSELS_MANAGE);
    read.merge(manage)
}

#[utoipa::path(
    get,
    path = "/api/v1/vessels",
    params(
        PaginationParams,
        ("company_id" = Option<Uuid>, Query, description = "Administrators only"),
        ("status" = Option<String>, Query, description = "pending | active | inactive"),
        ("search" = Option<String>, Query, description = "Name or IMO number fragment")
    ),
    responses((status = 200, description = "Vessels")),
    security(("bearer_auth" = [])),
    tag = "vessels"
)]
pub async fn list_vessels(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(filter): ApiQuery<VesselFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let vessels = state
        .services
        .vessels
        .list(&user, filter, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        vessels, page, per_page,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/vessels",
    request_body = CreateVesselRequest,
    responses(
        (status = 201, description = "Vessel registered", body = crate::entities::vessel::Model),
        (status = 403, description = "Subscription does not allow another vessel", body = crate::errors::ErrorResponse),
        (status = 409, description = "IMO number already registered", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "vessels"
)]
pub async fn create_vessel(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CreateVesselRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let vessel = state
        .services
        .vessels
        .create(&user, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(vessel))
}

/// Vessel, equipment and spare parts in one transaction
#[utoipa::path(
    post,
    path = "/api/v1/vessels/onboard",
    request_body = OnboardVesselRequest,
    responses(
        (status = 201, description = "Vessel onboarded", body = crate::services::vessels::OnboardedVessel),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Subscription does not allow another vessel", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "vessels"
)]
pub async fn onboard_vessel(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<OnboardVesselRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let onboarded = state
        .services
        .vessels
        .onboard(&user, payload)
        .await
        .map_err(map_service_error)?;
    info!(
        vessel_id = %onboarded.vessel.id,
        equipment = onboarded.equipment.len(),
        parts = onboarded.parts.len(),
        "vessel onboarded"
    );
    Ok(created_response(onboarded))
}

#[utoipa::path(
    get,
    path = "/api/v1/vessels/{id}",
    params(("id" = Uuid, Path, description = "Vessel ID")),
    responses(
        (status = 200, description = "Vessel", body = crate::entities::vessel::Model),
        (status = 404, description = "Vessel not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "vessels"
)]
pub async fn get_vessel(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let vessel = state
        .services
        .vessels
        .get(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(vessel))
}

#[utoipa::path(
    put,
    path = "/api/v1/vessels/{id}",
    params(("id" = Uuid, Path, description = "Vessel ID")),
    request_body = UpdateVesselRequest,
    responses(
        (status = 200, description = "Vessel updated", body = crate::entities::vessel::Model),
        (status = 404, description = "Vessel not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "vessels"
)]
pub async fn update_vessel(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateVesselRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let vessel = state
        .services
        .vessels
        .update(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(vessel))
}

#[utoipa::path(
    delete,
    path = "/api/v1/vessels/{id}",
    params(("id" = Uuid, Path, description = "Vessel ID")),
    responses(
        (status = 204, description = "Vessel deleted"),
        (status = 409, description = "Vessel has purchase orders", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "vessels"
)]
pub async fn delete_vessel(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .vessels
        .delete(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/vessels/{id}/summary",
    params(("id" = Uuid, Path, description = "Vessel ID")),
    responses(
        (status = 200, description = "Counts for the vessel overview", body = crate::services::vessels::VesselSummary),
        (status = 404, description = "Vessel not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "vessels"
)]
pub async fn vessel_summary(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .services
        .vessels
        .summary(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(summary))
}
