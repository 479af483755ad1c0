use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::common::{
    created_response, map_service_error, success_response, ApiJson, ApiPath, ApiQuery,
    PaginatedResponse, PaginationParams,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::faults::{AssignFaultRequest, FaultFilter, ReportFaultRequest, UpdateFaultStatusRequest},
    AppState,
};

pub fn fault_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/faults", get(list_faults))
        .route("/faults/:id", get(get_fault))
        .with_permission(perm::FAULTS_READ);
    let report = Router::new()
        .route("/faults", post(report_fault))
        .with_permission(perm::FAULTS_CREATE);
    let update = Router::new()
        .route("/faults/:id/status", post(update_fault_status))
        .with_permission(perm::FAULTS_UPDATE);
    let assign = Router::new()
        .route("/faults/:id/assign", post(assign_fault))
        .with_permission(perm::FAULTS_ASSIGN);
    read.merge(report).merge(update).merge(assign)
}

#[utoipa::path(
    get,
    path = "/api/v1/faults",
    params(
        PaginationParams,
        ("vessel_id" = Option<Uuid>, Query, description = "Vessel filter"),
        ("status" = Option<String>, Query, description = "open | in_progress | resolved | closed"),
        ("severity" = Option<String>, Query, description = "low | medium | high | critical"),
        ("assigned_to" = Option<Uuid>, Query, description = "Assignee filter")
    ),
    responses((status = 200, description = "Fault reports")),
    security(("bearer_auth" = [])),
    tag = "faults"
)]
pub async fn list_faults(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(filter): ApiQuery<FaultFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let faults = state
        .services
        .faults
        .list(&user, filter, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        faults, page, per_page,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/faults",
    request_body = ReportFaultRequest,
    responses(
        (status = 201, description = "Fault reported", body = crate::entities::fault::Model),
        (status = 404, description = "Vessel or equipment not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "faults"
)]
pub async fn report_fault(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<ReportFaultRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fault = state
        .services
        .faults
        .report(&user, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(fault))
}

#[utoipa::path(
    get,
    path = "/api/v1/faults/{id}",
    params(("id" = Uuid, Path, description = "Fault ID")),
    responses(
        (status = 200, description = "Fault report", body = crate::entities::fault::Model),
        (status = 404, description = "Fault not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "faults"
)]
pub async fn get_fault(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let fault = state
        .services
        .faults
        .get(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(fault))
}

#[utoipa::path(
    post,
    path = "/api/v1/faults/{id}/status",
    params(("id" = Uuid, Path, description = "Fault ID")),
    request_body = UpdateFaultStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = crate::entities::fault::Model),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "faults"
)]
pub async fn update_fault_status(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateFaultStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fault = state
        .services
        .faults
        .update_status(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(fault))
}

#[utoipa::path(
    post,
    path = "/api/v1/faults/{id}/assign",
    params(("id" = Uuid, Path, description = "Fault ID")),
    request_body = AssignFaultRequest,
    responses(
        (status = 200, description = "Assignee changed", body = crate::entities::fault::Model),
        (status = 404, description = "Fault or assignee not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "faults"
)]
pub async fn assign_fault(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AssignFaultRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fault = state
        .services
        .faults
        .assign(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(fault))
}
