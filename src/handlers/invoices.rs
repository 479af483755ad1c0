use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{
    map_service_error, success_response, ApiPath, ApiQuery, PaginatedResponse, PaginationParams,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::invoices::{InvoiceFilter, MarkPaidRequest},
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RevenueQuery {
    pub company_id: Option<Uuid>,
}

pub fn invoice_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/invoices", get(list_invoices))
        .route("/invoices/:id", get(get_invoice))
        .route("/invoices/:id/pdf", get(download_pdf))
        .with_permission(perm::INVOICES_READ);
    let manage = Router::new()
        .route("/invoices/revenue", get(revenue))
        .route("/invoices/:id/mark-paid", post(mark_paid))
        .route("/invoices/:id/void", post(void_invoice))
        .with_permission(perm::INVOICES_MANAGE);
    read.merge(manage)
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    params(
        PaginationParams,
        ("company_id" = Option<Uuid>, Query, description = "Administrators only"),
        ("status" = Option<String>, Query, description = "issued | paid | overdue | void")
    ),
    responses((status = 200, description = "Invoices")),
    security(("bearer_auth" = [])),
    tag = "invoices"
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(filter): ApiQuery<InvoiceFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let invoices = state
        .services
        .invoices
        .list(&user, filter, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        invoices, page, per_page,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice", body = crate::entities::invoice::Model),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "invoices"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice = state
        .services
        .invoices
        .get(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(invoice))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}/pdf",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice document", content_type = "application/pdf"),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "invoices"
)]
pub async fn download_pdf(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (file_name, bytes) = state
        .services
        .invoices
        .pdf(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/mark-paid",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = MarkPaidRequest,
    responses(
        (status = 200, description = "Invoice paid", body = crate::entities::invoice::Model),
        (status = 409, description = "Invoice void or already paid", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "invoices"
)]
pub async fn mark_paid(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    payload: Option<Json<MarkPaidRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let invoice = state
        .services
        .invoices
        .mark_paid(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(invoice))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/void",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice voided", body = crate::entities::invoice::Model),
        (status = 409, description = "Paid invoices cannot be voided", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "invoices"
)]
pub async fn void_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice = state
        .services
        .invoices
        .void(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(invoice))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/revenue",
    params(RevenueQuery),
    responses((status = 200, description = "Markup revenue on paid invoices", body = crate::reports::RevenueReport)),
    security(("bearer_auth" = [])),
    tag = "invoices"
)]
pub async fn revenue(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RevenueQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .services
        .invoices
        .revenue(query.company_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(report))
}
