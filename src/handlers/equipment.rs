use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{
    created_response, map_service_error, no_content_response, success_response, ApiJson, ApiPath,
    ApiQuery, ListResponse, PaginatedResponse, PaginationParams,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::equipment::{
        CreateEquipmentRequest, EquipmentFilter, MaintenanceLogRequest, RecordHoursRequest,
        UpdateEquipmentRequest,
    },
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VesselScope {
    pub vessel_id: Option<Uuid>,
}

pub fn equipment_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/equipment", get(list_equipment))
        .route("/equipment/maintenance-due", get(maintenance_due))
        .route("/equipment/:id", get(get_equipment))
        .with_permission(perm::EQUIPMENT_READ);
    let manage = Router::new()
        .route("/equipment", post(create_equipment))
        .route(
            "/equipment/:id",
            axum::routing::put(update_equipment).delete(delete_equipment),
        )
        .with_permission(perm::EQUIPMENT_MANAGE);
    let log = Router::new()
        .route("/equipment/:id/hours", post(record_hours))
        .route("/equipment/:id/maintenance", post(log_maintenance))
        .with_permission(perm::EQUIPMENT_LOG);
    read.merge(manage).merge(log)
}

#[utoipa::path(
    get,
    path = "/api/v1/equipment",
    params(
        PaginationParams,
        ("vessel_id" = Option<Uuid>, Query, description = "Vessel filter"),
        ("status" = Option<String>, Query, description = "operational | maintenance | faulty | decommissioned")
    ),
    responses((status = 200, description = "Equipment")),
    security(("bearer_auth" = [])),
    tag = "equipment"
)]
pub async fn list_equipment(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(filter): ApiQuery<EquipmentFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let items = state
        .services
        .equipment
        .list(&user, filter, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        items, page, per_page,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/equipment",
    request_body = CreateEquipmentRequest,
    responses(
        (status = 201, description = "Equipment registered", body = crate::entities::equipment::Model),
        (status = 404, description = "Vessel not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "equipment"
)]
pub async fn create_equipment(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CreateEquipmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .services
        .equipment
        .create(&user, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/equipment/{id}",
    params(("id" = Uuid, Path, description = "Equipment ID")),
    responses(
        (status = 200, description = "Equipment", body = crate::entities::equipment::Model),
        (status = 404, description = "Equipment not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "equipment"
)]
pub async fn get_equipment(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .equipment
        .get(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

#[utoipa::path(
    put,
    path = "/api/v1/equipment/{id}",
    params(("id" = Uuid, Path, description = "Equipment ID")),
    request_body = UpdateEquipmentRequest,
    responses(
        (status = 200, description = "Equipment updated", body = crate::entities::equipment::Model),
        (status = 404, description = "Equipment not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "equipment"
)]
pub async fn update_equipment(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateEquipmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .equipment
        .update(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

#[utoipa::path(
    delete,
    path = "/api/v1/equipment/{id}",
    params(("id" = Uuid, Path, description = "Equipment ID")),
    responses(
        (status = 204, description = "Equipment deleted"),
        (status = 404, description = "Equipment not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "equipment"
)]
pub async fn delete_equipment(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .equipment
        .delete(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/equipment/{id}/hours",
    params(("id" = Uuid, Path, description = "Equipment ID")),
    request_body = RecordHoursRequest,
    responses(
        (status = 200, description = "Reading recorded", body = crate::entities::equipment::Model),
        (status = 400, description = "Reading lower than the current counter", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "equipment"
)]
pub async fn record_hours(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<RecordHoursRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .equipment
        .record_hours(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

#[utoipa::path(
    post,
    path = "/api/v1/equipment/{id}/maintenance",
    params(("id" = Uuid, Path, description = "Equipment ID")),
    request_body = MaintenanceLogRequest,
    responses(
        (status = 200, description = "Maintenance logged", body = crate::entities::equipment::Model),
        (status = 404, description = "Equipment not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "equipment"
)]
pub async fn log_maintenance(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    payload: Option<Json<MaintenanceLogRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let item = state
        .services
        .equipment
        .log_maintenance(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

#[utoipa::path(
    get,
    path = "/api/v1/equipment/maintenance-due",
    params(VesselScope),
    responses((status = 200, description = "Equipment at or past its service interval")),
    security(("bearer_auth" = [])),
    tag = "equipment"
)]
pub async fn maintenance_due(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(scope): ApiQuery<VesselScope>,
) -> Result<impl IntoResponse, ApiError> {
    let due = state
        .services
        .equipment
        .maintenance_due(&user, scope.vessel_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ListResponse::from(due)))
}
