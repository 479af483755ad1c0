use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

use super::common::{
    created_response, map_service_error, no_content_response, success_response, ApiJson, ApiPath,
    ApiQuery, PaginatedResponse, PaginationParams,
};
use crate::{
    auth::{consts as perm, AuthRouterExt, AuthUser},
    errors::ApiError,
    services::users::{CreateUserRequest, UpdateUserRequest, UserFilter},
    AppState,
};

pub fn user_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user))
        .with_permission(perm::USERS_READ);
    let manage = Router::new()
        .route("/users", axum::routing::post(create_user))
        .route(
            "/users/:id",
            axum::routing::put(update_user).delete(deactivate_user),
        )
        .with_permission(perm::USERS_MANAGE);
    read.merge(manage)
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(
        PaginationParams,
        ("company_id" = Option<Uuid>, Query, description = "Administrators only"),
        ("role" = Option<String>, Query, description = "admin | manager | technician | hse_officer")
    ),
    responses((status = 200, description = "Users of the caller's company")),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
    ApiQuery(filter): ApiQuery<UserFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.normalized();
    let users = state
        .services
        .users
        .list(&user, filter, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::from_page(
        users, page, per_page,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = crate::auth::UserProfile),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .services
        .users
        .get(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(profile))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = crate::auth::UserProfile),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .services
        .users
        .create(&user, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(created))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = crate::auth::UserProfile),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .services
        .users
        .update(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deactivated"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .users
        .deactivate(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
