/*!
 * # Health Check Module
 *
 * Public probes for the SMS API:
 *
 * - `/health` - cached up/down status
 * - `/health/ready` - re-checks the database and storage before answering
 * - `/health/live` - process liveness and uptime
 * - `/health/version` - build information
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

impl HealthStatus {
    fn http_status(self) -> StatusCode {
        match self {
            HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: BTreeMap<String, HealthDetail>,
}

#[derive(Clone)]
pub struct HealthState {
    pub db: Arc<DatabaseConnection>,
    pub storage_dir: PathBuf,
    pub health_cache: Arc<RwLock<HealthInfo>>,
    pub start_time: SystemTime,
}

impl HealthState {
    pub fn new(db: Arc<DatabaseConnection>, storage_dir: PathBuf) -> Self {
        Self {
            db,
            storage_dir,
            health_cache: Arc::new(RwLock::new(HealthInfo {
                status: HealthStatus::Up,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                uptime_seconds: 0,
                details: BTreeMap::new(),
            })),
            start_time: SystemTime::now(),
        }
    }

    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    async fn check_database(&self) -> HealthDetail {
        let (status, message) = match self.db.ping().await {
            Ok(()) => (HealthStatus::Up, None),
            Err(e) => {
                error!("Database health check failed: {}", e);
                (HealthStatus::Down, Some("database unreachable".to_string()))
            }
        };
        HealthDetail {
            status,
            message,
            timestamp: Utc::now(),
        }
    }

    /// Invoice PDFs and uploads need a writable storage directory; losing it
    /// degrades the service without taking it down
    async fn check_storage(&self) -> HealthDetail {
        let (status, message) = match tokio::fs::create_dir_all(&self.storage_dir).await {
            Ok(()) => match tokio::fs::metadata(&self.storage_dir).await {
                Ok(meta) if !meta.permissions().readonly() => (HealthStatus::Up, None),
                Ok(_) => (
                    HealthStatus::Degraded,
                    Some("storage directory is read-only".to_string()),
                ),
                Err(e) => (HealthStatus::Degraded, Some(e.to_string())),
            },
            Err(e) => {
                warn!(dir = %self.storage_dir.display(), "storage check failed: {}", e);
                (HealthStatus::Degraded, Some(e.to_string()))
            }
        };
        HealthDetail {
            status,
            message,
            timestamp: Utc::now(),
        }
    }

    pub async fn update_health(&self) {
        let database = self.check_database().await;
        let storage = self.check_storage().await;

        let mut health = self.health_cache.write().await;
        health.timestamp = Utc::now();
        health.uptime_seconds = self.uptime();
        health.details.insert("database".to_string(), database);
        health.details.insert("storage".to_string(), storage);
        health.status = overall(health.details.values().map(|d| d.status));
    }
}

fn overall(statuses: impl Iterator<Item = HealthStatus>) -> HealthStatus {
    statuses.fold(HealthStatus::Up, |acc, s| match (acc, s) {
        (HealthStatus::Down, _) | (_, HealthStatus::Down) => HealthStatus::Down,
        (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
        _ => HealthStatus::Up,
    })
}

pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "service": "sms-api",
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
    }))
}

pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    debug!("health check");
    let health = state.health_cache.read().await;
    (
        health.status.http_status(),
        Json(json!({
            "status": health.status,
            "version": health.version,
            "timestamp": health.timestamp,
        })),
    )
}

pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    state.update_health().await;
    let health = state.health_cache.read().await;
    (
        health.status.http_status(),
        Json(json!({
            "ready": health.status != HealthStatus::Down,
            "status": health.status,
            "checks": health.details,
            "timestamp": health.timestamp,
        })),
    )
}

pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "uptime_seconds": state.uptime(),
            "timestamp": Utc::now(),
        })),
    )
}

/// Refreshes the cached status every 30 seconds
pub async fn run_health_checker(state: Arc<HealthState>) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        state.update_health().await;

        let health = state.health_cache.read().await;
        if health.status != HealthStatus::Up {
            for (name, detail) in &health.details {
                if detail.status != HealthStatus::Up {
                    warn!("Component {name} is not healthy: {:?}", detail.status);
                }
            }
        }
    }
}

/// Health routes, mounted under `/health`. The background checker is only
/// spawned when `spawn_checker` is set so tests stay deterministic.
pub fn health_routes(state: Arc<HealthState>, spawn_checker: bool) -> Router {
    if spawn_checker {
        tokio::spawn(run_health_checker(state.clone()));
    }
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/version", get(version_info))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_status_takes_the_worst_component() {
        use HealthStatus::*;
        assert_eq!(overall([Up, Up].into_iter()), Up);
        assert_eq!(overall([Up, Degraded].into_iter()), Degraded);
        assert_eq!(overall([Degraded, Down, Up].into_iter()), Down);
        assert_eq!(overall(std::iter::empty()), Up);
    }
}
