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

use super::common::{
    created_response, map_service_error, success_response, ApiJson, ApiPath, ApiQuery, ListResponse,
    PaginatedResponse, PaginationParams,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    entities::activation_code::ActivationCodeStatus,
    errors::ApiError,
    services::companies::{GenerateCodesRequest, RedeemCodeRequest},
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CodeFilter {
    pub status: Option<ActivationCodeStatus>,
}

/// Activation codes: issued by administrators, redeemed by managers
pub fn token_routes() -> Router<AppState> {
    let manage = Router::new()
        .route("/tokens", get(list_codes).post(generate_codes))
        .route("/tokens/:id/revoke", post(revoke_code))
        .with_permission(perm::TOKENS_MANAGE);
    let redeem = Router::new()
        .route("/tokens/redeem", post(redeem_code))
        .with_permission(perm::TOKENS_REDEEM);
    manage.merge(redeem)
}

#[utoipa::path(
    post,
    path = "/api/v1/tokens",
    request_body = GenerateCodesRequest,
    responses(
        (status = 201, description = "Batch of activation codes"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "tokens"
)]
pub async fn generate_codes(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<GenerateCodesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let codes = state
        .services
        .companies
        .generate_codes(&user, payload)
        .await
        .map_err(map_service_error)?;
    info!(count = codes.len(), "activation codes generated");
    Ok(created_response(ListResponse::from(codes)))
}

#[utoipa::path(
    get,
    path = "/api/v1/tokens",
    params(PaginationParams, CodeFilter),
    responses((status = 200, description = "Activation codes")),
    security(("bearer_auth" = [])),
    tag = "tokens"
)]
pub async fn list_codes(
    State(state): State<AppState>,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(filter): ApiQuery<CodeFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let codes = state
        .services
        .companies
        .list_codes(filter.status, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        codes, page, per_page,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/tokens/{id}/revoke",
    params(("id" = Uuid, Path, description = "Activation code ID")),
    responses(
        (status = 200, description = "Code revoked", body = crate::entities::activation_code::Model),
        (status = 409, description = "Code already redeemed or revoked", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "tokens"
)]
pub async fn revoke_code(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let code = state
        .services
        .companies
        .revoke_code(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(code))
}

#[utoipa::path(
    post,
    path = "/api/v1/tokens/redeem",
    request_body = RedeemCodeRequest,
    responses(
        (status = 200, description = "Subscription extended", body = crate::services::companies::SubscriptionInfo),
        (status = 404, description = "Unknown code", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already used", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "tokens"
)]
pub async fn redeem_code(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<RedeemCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .services
        .companies
        .redeem(&user, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(subscription))
}
