use axum::{body::Bytes, extract::State, http::HeaderMap, response::IntoResponse, routing::post, Router};
use tracing::info;

use super::common::{map_service_error, success_response};
use crate::{errors::ApiError, AppState};

const STRIPE_SIGNATURE: &str = "stripe-signature";
const PAYPAL_TIMESTAMP: &str = "x-timestamp";
const PAYPAL_SIGNATURE: &str = "x-signature";

/// Payment provider callbacks. Unauthenticated; the signature headers carry
/// the proof of origin.
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks/stripe", post(stripe_webhook))
        .route("/webhooks/paypal", post(paypal_webhook))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/stripe",
    request_body(content = String, content_type = "application/json"),
    params(("Stripe-Signature" = String, Header, description = "t=<unix>,v1=<hex hmac>")),
    responses(
        (status = 200, description = "Event accepted", body = crate::services::payments::WebhookOutcome),
        (status = 401, description = "Signature invalid or stale", body = crate::errors::ErrorResponse)
    ),
    tag = "webhooks"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .payments
        .handle_stripe(header_str(&headers, STRIPE_SIGNATURE), &body)
        .await
        .map_err(map_service_error)?;
    info!(event_id = %outcome.event_id, status = ?outcome.status, "stripe webhook");
    Ok(success_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/paypal",
    request_body(content = String, content_type = "application/json"),
    params(
        ("X-Timestamp" = String, Header, description = "Unix seconds"),
        ("X-Signature" = String, Header, description = "Hex HMAC-SHA256 of timestamp.body")
    ),
    responses(
        (status = 200, description = "Event accepted", body = crate::services::payments::WebhookOutcome),
        (status = 401, description = "Signature invalid or stale", body = crate::errors::ErrorResponse)
    ),
    tag = "webhooks"
)]
pub async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .payments
        .handle_paypal(
            header_str(&headers, PAYPAL_TIMESTAMP),
            header_str(&headers, PAYPAL_SIGNATURE),
            &body,
        )
        .await
        .map_err(map_service_error)?;
    info!(event_id = %outcome.event_id, status = ?outcome.status, "paypal webhook");
    Ok(success_response(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Signature", HeaderValue::from_static("t=1,v1=ab"));
        assert_eq!(header_str(&headers, STRIPE_SIGNATURE), Some("t=1,v1=ab"));
        assert_eq!(header_str(&headers, PAYPAL_SIGNATURE), None);
    }
}
