use axum::{extract::State, response::IntoResponse, routing::post, Router};
use tracing::info;

use super::common::{map_service_error, success_response, ApiJson};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::sync::SyncRequest,
    AppState,
};

pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync", post(apply_batch))
        .with_permission(perm::SYNC_WRITE)
}

/// Replays operations queued while the vessel was offline. Each operation is
/// applied at most once per `client_op_id`.
#[utoipa::path(
    post,
    path = "/api/v1/sync",
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Per-operation results", body = crate::services::sync::SyncResponse),
        (status = 400, description = "Batch empty or too large", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "sync"
)]
pub async fn apply_batch(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<SyncRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .services
        .sync
        .apply_batch(&user, payload)
        .await
        .map_err(map_service_error)?;
    info!(
        user_id = %user.user_id,
        applied = response.applied,
        duplicates = response.duplicates,
        failed = response.failed,
        "offline batch synced"
    );
    Ok(success_response(response))
}
