/*!
 * # Metrics Module
 *
 * In-process metrics registry for the SMS API, exported in Prometheus text
 * format at `/metrics` and as JSON at `/metrics/json`.
 *
 * - HTTP request counts, latency and status classes
 * - Domain counters (alerts, purchase orders, invoices, notifications)
 * - Security counters (login failures, lockouts, alerts raised)
 * - Background job ticks and failures
 */

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge holding an `f64` as raw bits
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    bits: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Histogram {
    sum_bits: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, value: f64) {
        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    pub fn get_or_create_gauge(&self, name: &str) -> Gauge {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(Gauge::new)
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::new)
            .clone()
    }

    /// Prometheus text exposition, sorted by metric name
    pub fn export_metrics(&self) -> String {
        let mut output = String::new();

        let mut counters: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        counters.sort();
        for (name, value) in counters {
            output.push_str(&format!("# TYPE {} counter\n{} {}\n", name, name, value));
        }

        let mut gauges: Vec<(String, f64)> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        gauges.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in gauges {
            output.push_str(&format!("# TYPE {} gauge\n{} {}\n", name, name, value));
        }

        let mut histograms: Vec<(String, u64, f64)> = self
            .histograms
            .iter()
            .map(|e| (e.key().clone(), e.value().get_count(), e.value().get_sum()))
            .collect();
        histograms.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, count, sum) in histograms {
            output.push_str(&format!(
                "# TYPE {} summary\n{}_count {}\n{}_sum {}\n",
                name, name, count, name, sum
            ));
        }

        output
    }

    pub fn export_metrics_json(&self) -> serde_json::Value {
        let counters: serde_json::Map<String, serde_json::Value> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), json!(e.value().get())))
            .collect();
        let gauges: serde_json::Map<String, serde_json::Value> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), json!(e.value().get())))
            .collect();
        let histograms: serde_json::Map<String, serde_json::Value> = self
            .histograms
            .iter()
            .map(|e| {
                (
                    e.key().clone(),
                    json!({ "count": e.value().get_count(), "sum": e.value().get_sum() }),
                )
            })
            .collect();

        json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }
}

lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

pub fn increment_counter(name: &str) {
    METRICS.get_or_create_counter(name).inc();
}

pub fn increment_counter_by(name: &str, value: u64) {
    METRICS.get_or_create_counter(name).inc_by(value);
}

pub fn set_gauge(name: &str, value: f64) {
    METRICS.get_or_create_gauge(name).set(value);
}

pub fn observe_histogram(name: &str, value: f64) {
    METRICS.get_or_create_histogram(name).observe(value);
}

/// Business counters for the maintenance and procurement pipeline
pub struct DomainMetrics {
    pub vessels_onboarded: Counter,
    pub faults_reported: Counter,
    pub low_stock_alerts_opened: Counter,
    pub purchase_orders_created: Counter,
    pub invoices_issued: Counter,
    pub invoices_paid: Counter,
    pub invoices_overdue: Counter,
    pub notifications_delivered: Counter,
    pub notifications_failed: Counter,
    pub activation_codes_redeemed: Counter,
    pub sync_operations_applied: Counter,
}

impl DomainMetrics {
    fn new() -> Self {
        Self {
            vessels_onboarded: METRICS.get_or_create_counter("sms_vessels_onboarded_total"),
            faults_reported: METRICS.get_or_create_counter("sms_faults_reported_total"),
            low_stock_alerts_opened: METRICS
                .get_or_create_counter("sms_low_stock_alerts_opened_total"),
            purchase_orders_created: METRICS
                .get_or_create_counter("sms_purchase_orders_created_total"),
            invoices_issued: METRICS.get_or_create_counter("sms_invoices_issued_total"),
            invoices_paid: METRICS.get_or_create_counter("sms_invoices_paid_total"),
            invoices_overdue: METRICS.get_or_create_counter("sms_invoices_overdue_total"),
            notifications_delivered: METRICS
                .get_or_create_counter("sms_notifications_delivered_total"),
            notifications_failed: METRICS.get_or_create_counter("sms_notifications_failed_total"),
            activation_codes_redeemed: METRICS
                .get_or_create_counter("sms_activation_codes_redeemed_total"),
            sync_operations_applied: METRICS
                .get_or_create_counter("sms_sync_operations_applied_total"),
        }
    }
}

pub struct SecurityMetrics {
    pub login_success: Counter,
    pub login_failure: Counter,
    pub login_locked_out: Counter,
    pub token_refresh: Counter,
    pub permission_denied: Counter,
    pub alerts_raised: Counter,
    pub webhook_signature_rejected: Counter,
}

impl SecurityMetrics {
    fn new() -> Self {
        Self {
            login_success: METRICS.get_or_create_counter("sms_auth_login_success_total"),
            login_failure: METRICS.get_or_create_counter("sms_auth_login_failure_total"),
            login_locked_out: METRICS.get_or_create_counter("sms_auth_login_locked_total"),
            token_refresh: METRICS.get_or_create_counter("sms_auth_token_refresh_total"),
            permission_denied: METRICS.get_or_create_counter("sms_auth_permission_denied_total"),
            alerts_raised: METRICS.get_or_create_counter("sms_security_alerts_raised_total"),
            webhook_signature_rejected: METRICS
                .get_or_create_counter("sms_webhook_signature_rejected_total"),
        }
    }
}

pub struct EndpointMetrics {
    pub requests_total: Counter,
    pub latency_seconds: Histogram,
    pub status_2xx: Counter,
    pub status_4xx: Counter,
    pub status_5xx: Counter,
}

impl EndpointMetrics {
    fn new() -> Self {
        Self {
            requests_total: METRICS.get_or_create_counter("http_requests_total"),
            latency_seconds: METRICS.get_or_create_histogram("http_request_duration_seconds"),
            status_2xx: METRICS.get_or_create_counter("http_status_2xx_total"),
            status_4xx: METRICS.get_or_create_counter("http_status_4xx_total"),
            status_5xx: METRICS.get_or_create_counter("http_status_5xx_total"),
        }
    }

    pub fn record_request(&self, duration: Duration, status_code: u16) {
        self.requests_total.inc();
        self.latency_seconds.observe(duration.as_secs_f64());

        match status_code {
            200..=299 => self.status_2xx.inc(),
            400..=499 => self.status_4xx.inc(),
            500..=599 => self.status_5xx.inc(),
            _ => {}
        }
    }
}

lazy_static::lazy_static! {
    pub static ref DOMAIN_METRICS: DomainMetrics = DomainMetrics::new();
    pub static ref SECURITY_METRICS: SecurityMetrics = SecurityMetrics::new();
    pub static ref ENDPOINT_METRICS: EndpointMetrics = EndpointMetrics::new();
}

/// Job tick bookkeeping shared by the background loops
pub fn record_job_run(job: &str, duration: Duration, ok: bool) {
    increment_counter(&format!("sms_job_{}_runs_total", job));
    observe_histogram(&format!("sms_job_{}_duration_seconds", job), duration.as_secs_f64());
    if !ok {
        increment_counter(&format!("sms_job_{}_failures_total", job));
    }
}

/// Records request count, latency and status class for every response
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    ENDPOINT_METRICS.record_request(start.elapsed(), response.status().as_u16());
    response
}

pub async fn metrics_handler() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_metrics(),
    )
        .into_response()
}

pub async fn metrics_json_handler() -> Json<serde_json::Value> {
    Json(METRICS.export_metrics_json())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_keeps_fractional_values() {
        let g = Gauge::new();
        g.set(12.75);
        assert_eq!(g.get(), 12.75);
    }

    #[test]
    fn histogram_accumulates_sum_and_count() {
        let h = Histogram::new();
        h.observe(0.25);
        h.observe(0.5);
        assert_eq!(h.get_count(), 2);
        assert!((h.get_sum() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn export_contains_registered_metrics() {
        let registry = MetricsRegistry::new();
        registry.get_or_create_counter("b_total").inc_by(3);
        registry.get_or_create_counter("a_total").inc();
        registry.get_or_create_gauge("queue_depth").set(4.0);

        let text = registry.export_metrics();
        assert!(text.contains("a_total 1\n"));
        assert!(text.contains("b_total 3\n"));
        assert!(text.contains("queue_depth 4\n"));
        assert!(text.find("a_total").unwrap() < text.find("b_total").unwrap());

        let json = registry.export_metrics_json();
        assert_eq!(json["counters"]["b_total"], 3);
    }

    #[test]
    fn job_runs_count_failures_separately() {
        record_job_run("unit_probe", Duration::from_millis(5), false);
        record_job_run("unit_probe", Duration::from_millis(5), true);
        assert_eq!(
            METRICS
                .get_or_create_counter("sms_job_unit_probe_runs_total")
                .get(),
            2
        );
        assert_eq!(
            METRICS
                .get_or_create_counter("sms_job_unit_probe_failures_total")
                .get(),
            1
        );
    }
}
