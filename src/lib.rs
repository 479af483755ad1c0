//! SMS API library
//!
//! Multi-tenant backend for vessel onboarding, planned maintenance, spare-part
//! stock, procurement with platform markup, HSE compliance and crew chat.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod reports;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{
    extract::{DefaultBodyLimit, Extension},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::{path::PathBuf, sync::Arc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use utoipa::ToSchema;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::notifications::SharedMailer;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub services: handlers::AppServices,
    pub event_sender: events::EventSender,
    pub mailer: SharedMailer,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: events::EventSender,
        mailer: SharedMailer,
    ) -> Self {
        let auth = Arc::new(AuthService::new(
            auth::AuthConfig::from(config.as_ref()),
            db.clone(),
        ));
        let services = handlers::AppServices::new(
            db.clone(),
            config.clone(),
            auth.clone(),
            event_sender.clone(),
        );
        Self {
            db,
            config,
            auth,
            services,
            event_sender,
            mailer,
        }
    }
}

/// Envelope for the few endpoints outside the resource API
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        assert!(!response.success);
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
    }
}

/// Every resource router, mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .merge(handlers::companies::company_routes())
        .merge(handlers::tokens::token_routes())
        .merge(handlers::users::user_routes())
        .merge(handlers::vessels::vessel_routes())
        .merge(handlers::equipment::equipment_routes())
        .merge(handlers::parts::part_routes())
        .merge(handlers::alerts::alert_routes())
        .merge(handlers::purchase_orders::purchase_order_routes())
        .merge(handlers::invoices::invoice_routes())
        .merge(handlers::webhooks::webhook_routes())
        .merge(handlers::faults::fault_routes())
        .merge(handlers::hse::hse_routes())
        .merge(handlers::chat::chat_routes())
        .merge(handlers::notifications::notification_routes())
        .merge(handlers::files::file_routes())
        .merge(handlers::sync::sync_routes())
        .merge(handlers::security::security_routes())
        .merge(handlers::dashboard::dashboard_routes())
}

fn cors_layer(cfg: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(cfg.cors_allow_credentials)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!("using permissive CORS; no explicit origins configured");
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("no CORS origins configured; cross-origin requests will be refused");
        CorsLayer::new()
    }
}

/// Full HTTP surface: API, auth, health, metrics and API docs.
///
/// `spawn_health_checker` starts the periodic component probe; tests leave it off.
pub fn build_router(state: AppState, spawn_health_checker: bool) -> Router {
    let health_state = Arc::new(health::HealthState::new(
        state.db.clone(),
        PathBuf::from(&state.config.storage_dir),
    ));
    let auth_service = state.auth.clone();
    let cors = cors_layer(&state.config);
    let body_limit = state.config.max_body_size;

    Router::new()
        .route("/", get(|| async { "sms-api up" }))
        .nest("/api/v1", api_v1_routes())
        .nest("/auth", handlers::auth::auth_router())
        .with_state(state)
        .nest("/health", health::health_routes(health_state, spawn_health_checker))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/metrics/json", get(metrics::metrics_json_handler))
        .merge(openapi::swagger_ui())
        .fallback(not_found)
        .layer(axum::middleware::from_fn(metrics::http_metrics_middleware))
        .layer(Extension(auth_service))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}

async fn api_status() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "status": "ok",
        "service": "sms-api",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("Route not found".to_string())),
    )
}
