use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::common::{
    created_response, map_service_error, no_content_response, success_response, ApiJson, ApiPath,
    ApiQuery, ListResponse,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::files::{FileFilter, UploadFileRequest},
    AppState,
};

/// Attachments on vessels, equipment, faults, HSE items and purchase orders
pub fn file_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/files", get(list_files))
        .route("/files/:id", get(download_file))
        .route("/files/:id/metadata", get(file_metadata))
        .with_permission(perm::FILES_READ);
    let write = Router::new()
        .route("/files", post(upload_file))
        .route("/files/:id", axum::routing::delete(delete_file))
        .with_permission(perm::FILES_WRITE);
    read.merge(write)
}

#[utoipa::path(
    post,
    path = "/api/v1/files",
    request_body = UploadFileRequest,
    responses(
        (status = 201, description = "File stored", body = crate::entities::file_attachment::Model),
        (status = 400, description = "Invalid content or too large", body = crate::errors::ErrorResponse),
        (status = 404, description = "Target entity not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<UploadFileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let file = state
        .services
        .files
        .upload(&user, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(file))
}

#[utoipa::path(
    get,
    path = "/api/v1/files",
    params(
        ("entity_type" = String, Query, description = "vessel | equipment | fault | hse_update | purchase_order"),
        ("entity_id" = Uuid, Query, description = "Entity the files are attached to")
    ),
    responses((status = 200, description = "Attachments of the entity")),
    security(("bearer_auth" = [])),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(filter): ApiQuery<FileFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let files = state
        .services
        .files
        .list(&user, filter)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ListResponse::from(files)))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "File content with its stored content type"),
        (status = 404, description = "File not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (file, bytes) = state
        .services
        .files
        .download(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", file.file_name),
            ),
        ],
        bytes,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}/metadata",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "File metadata", body = crate::entities::file_attachment::Model),
        (status = 404, description = "File not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "files"
)]
pub async fn file_metadata(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let file = state
        .services
        .files
        .metadata(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(file))
}

#[utoipa::path(
    delete,
    path = "/api/v1/files/{id}",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 204, description = "File deleted"),
        (status = 404, description = "File not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .files
        .delete(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
