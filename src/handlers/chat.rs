use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};

use super::common::{
    created_response, map_service_error, success_response, ApiJson, ApiQuery, ListResponse,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::chat::{ChatQuery, PostMessageRequest},
    AppState,
};

/// Company and vessel channels; clients poll with `since`
pub fn chat_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/chat/messages", get(list_messages))
        .with_permission(perm::CHAT_READ);
    let write = Router::new()
        .route("/chat/messages", axum::routing::post(post_message))
        .with_permission(perm::CHAT_WRITE);
    read.merge(write)
}

#[utoipa::path(
    get,
    path = "/api/v1/chat/messages",
    params(ChatQuery),
    responses((status = 200, description = "Messages in ascending order")),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ChatQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .services
        .chat
        .list(&user, query)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ListResponse::from(messages)))
}

#[utoipa::path(
    post,
    path = "/api/v1/chat/messages",
    request_body = PostMessageRequest,
    responses(
        (status = 201, description = "Message posted", body = crate::entities::chat_message::Model),
        (status = 400, description = "Empty message", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn post_message(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .services
        .chat
        .post(&user, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(message))
}
