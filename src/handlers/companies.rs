use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{
    map_service_error, success_response, ApiJson, ApiPath, ApiQuery, PaginatedResponse,
    PaginationParams,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser, UserRole},
    errors::ApiError,
    services::companies::UpdateCompanyRequest,
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CompanySearch {
    /// Case-sensitive substring of the company name
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubscriptionQuery {
    /// Administrators name the company; others see their own
    pub company_id: Option<Uuid>,
}

pub fn company_routes() -> Router<AppState> {
    let listing = Router::new()
        .route("/companies", get(list_companies))
        .with_permission(perm::COMPANIES_MANAGE);
    let read = Router::new()
        .route("/companies/:id", get(get_company))
        .route("/subscription", get(get_subscription))
        .with_permission(perm::COMPANIES_READ);
    let update = Router::new()
        .route("/companies/:id", axum::routing::put(update_company))
        .with_role(UserRole::Manager);
    listing.merge(read).merge(update)
}

#[utoipa::path(
    get,
    path = "/api/v1/companies",
    params(PaginationParams, CompanySearch),
    responses(
        (status = 200, description = "Companies on the platform"),
        (status = 403, description = "Administrators only", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "companies"
)]
pub async fn list_companies(
    State(state): State<AppState>,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(query): ApiQuery<CompanySearch>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let companies = state
        .services
        .companies
        .list_companies(query.search, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        companies, page, per_page,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/companies/{id}",
    params(("id" = Uuid, Path, description = "Company ID")),
    responses(
        (status = 200, description = "Company", body = crate::entities::company::Model),
        (status = 404, description = "Company not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "companies"
)]
pub async fn get_company(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let company = state
        .services
        .companies
        .get_company(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(company))
}

#[utoipa::path(
    put,
    path = "/api/v1/companies/{id}",
    params(("id" = Uuid, Path, description = "Company ID")),
    request_body = UpdateCompanyRequest,
    responses(
        (status = 200, description = "Company updated", body = crate::entities::company::Model),
        (status = 404, description = "Company not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "companies"
)]
pub async fn update_company(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateCompanyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let company = state
        .services
        .companies
        .update_company(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(company))
}

#[utoipa::path(
    get,
    path = "/api/v1/subscription",
    params(SubscriptionQuery),
    responses(
        (status = 200, description = "Subscription tier, expiry and vessel usage", body = crate::services::companies::SubscriptionInfo)
    ),
    security(("bearer_auth" = [])),
    tag = "companies"
)]
pub async fn get_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<SubscriptionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let info = state
        .services
        .companies
        .subscription(&user, query.company_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(info))
}
