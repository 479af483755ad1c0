use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;
use uuid::Uuid;

use super::common::{
    created_response, map_service_error, success_response, ApiJson, ApiPath, ApiQuery,
    PaginatedResponse, PaginationParams,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::purchase_orders::{CreatePurchaseOrderRequest, PurchaseOrderFilter},
    AppState,
};

/// Purchase order lifecycle: draft, submitted, approved, invoiced, received
pub fn purchase_order_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/purchase-orders", get(list_purchase_orders))
        .route("/purchase-orders/:id", get(get_purchase_order))
        .with_permission(perm::PURCHASE_ORDERS_READ);
    let create = Router::new()
        .route("/purchase-orders", post(create_purchase_order))
        .route("/purchase-orders/:id/submit", post(submit_purchase_order))
        .with_permission(perm::PURCHASE_ORDERS_CREATE);
    let approve = Router::new()
        .route("/purchase-orders/:id/approve", post(approve_purchase_order))
        .with_permission(perm::PURCHASE_ORDERS_APPROVE);
    let cancel = Router::new()
        .route("/purchase-orders/:id/cancel", post(cancel_purchase_order))
        .with_permission(perm::PURCHASE_ORDERS_CANCEL);
    let receive = Router::new()
        .route("/purchase-orders/:id/receive", post(receive_purchase_order))
        .with_permission(perm::PURCHASE_ORDERS_RECEIVE);
    let invoice = Router::new()
        .route("/purchase-orders/:id/invoice", post(issue_invoice))
        .with_permission(perm::INVOICES_MANAGE);
    read.merge(create)
        .merge(approve)
        .merge(cancel)
        .merge(receive)
        .merge(invoice)
}

#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders",
    params(
        PaginationParams,
        ("vessel_id" = Option<Uuid>, Query, description = "Vessel filter"),
        ("company_id" = Option<Uuid>, Query, description = "Administrators only"),
        ("status" = Option<String>, Query, description = "draft | submitted | approved | invoiced | received | cancelled")
    ),
    responses((status = 200, description = "Purchase orders")),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(filter): ApiQuery<PurchaseOrderFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let orders = state
        .services
        .purchase_orders
        .list(&user, filter, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        orders, page, per_page,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders",
    request_body = CreatePurchaseOrderRequest,
    responses(
        (status = 201, description = "Draft purchase order with markup applied", body = crate::services::purchase_orders::PurchaseOrderDetail),
        (status = 400, description = "Invalid items", body = crate::errors::ErrorResponse),
        (status = 404, description = "Vessel or part not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn create_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CreatePurchaseOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .services
        .purchase_orders
        .create(&user, payload)
        .await
        .map_err(map_service_error)?;
    info!(
        po_number = %detail.order.po_number,
        total = %detail.order.total,
        "purchase order drafted"
    );
    Ok(created_response(detail))
}

#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order with its items", body = crate::services::purchase_orders::PurchaseOrderDetail),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .services
        .purchase_orders
        .get(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(detail))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/submit",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Submitted for approval", body = crate::entities::purchase_order::Model),
        (status = 409, description = "Not a draft", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn submit_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .purchase_orders
        .submit(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/approve",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Approved", body = crate::entities::purchase_order::Model),
        (status = 409, description = "Not submitted", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn approve_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .purchase_orders
        .approve(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Cancelled", body = crate::entities::purchase_order::Model),
        (status = 409, description = "Already invoiced, received or cancelled", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .purchase_orders
        .cancel(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

/// Books the ordered quantities into stock
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/receive",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Received", body = crate::services::purchase_orders::PurchaseOrderDetail),
        (status = 409, description = "Not approved or invoiced", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn receive_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .services
        .purchase_orders
        .receive(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(detail))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/invoice",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 201, description = "Invoice issued and emailed", body = crate::entities::invoice::Model),
        (status = 409, description = "Order not approved or already invoiced", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn issue_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice = state
        .services
        .invoices
        .issue(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(invoice))
}
