use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::invoices::InvoiceService;
use super::is_unique_violation;
use crate::config::AppConfig;
use crate::entities::invoice::{self, InvoiceStatus};
use crate::entities::payment_event;
use crate::errors::ServiceError;
use crate::metrics::SECURITY_METRICS;
use crate::webhooks::{verify_hmac_signature, verify_stripe_signature, SignatureError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentProvider {
    Stripe,
    Paypal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    /// Payment applied to the invoice
    Processed,
    /// Event id seen before; nothing changed
    Duplicate,
    /// Event type not relevant or invoice not payable
    Ignored,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookOutcome {
    pub status: WebhookStatus,
    pub event_id: String,
    pub invoice_id: Option<Uuid>,
}

/// Provider-neutral view of a webhook payload
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentNotice {
    pub event_id: String,
    pub event_type: String,
    /// Set only for event types that confirm a payment
    pub invoice_id: Option<Uuid>,
    pub reference: Option<String>,
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// `checkout.session.completed` and `payment_intent.succeeded` carry the
/// invoice id in `data.object.metadata.invoice_id`
pub fn parse_stripe_event(payload: &[u8]) -> Result<PaymentNotice, ServiceError> {
    let json: Value = serde_json::from_slice(payload)
        .map_err(|e| ServiceError::BadRequest(format!("invalid json: {}", e)))?;
    let event_id = str_at(&json, "/id")
        .ok_or_else(|| ServiceError::BadRequest("event id missing".into()))?
        .to_string();
    let event_type = str_at(&json, "/type").unwrap_or_default().to_string();
    let paid = matches!(
        event_type.as_str(),
        "checkout.session.completed" | "payment_intent.succeeded"
    );
    let invoice_id = if paid {
        str_at(&json, "/data/object/metadata/invoice_id").and_then(|s| Uuid::parse_str(s).ok())
    } else {
        None
    };
    let reference = str_at(&json, "/data/object/payment_intent")
        .or_else(|| str_at(&json, "/data/object/id"))
        .map(str::to_string);
    Ok(PaymentNotice {
        event_id,
        event_type,
        invoice_id,
        reference,
    })
}

/// `PAYMENT.CAPTURE.COMPLETED` carries the invoice id in `resource.custom_id`
pub fn parse_paypal_event(payload: &[u8]) -> Result<PaymentNotice, ServiceError> {
    let json: Value = serde_json::from_slice(payload)
        .map_err(|e| ServiceError::BadRequest(format!("invalid json: {}", e)))?;
    let event_id = str_at(&json, "/id")
        .ok_or_else(|| ServiceError::BadRequest("event id missing".into()))?
        .to_string();
    let event_type = str_at(&json, "/event_type").unwrap_or_default().to_string();
    let invoice_id = if event_type == "PAYMENT.CAPTURE.COMPLETED" {
        str_at(&json, "/resource/custom_id").and_then(|s| Uuid::parse_str(s).ok())
    } else {
        None
    };
    Ok(PaymentNotice {
        event_id,
        event_type,
        invoice_id,
        reference: str_at(&json, "/resource/id").map(str::to_string),
    })
}

/// Inbound payment provider webhooks
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    invoices: Arc<InvoiceService>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        invoices: Arc<InvoiceService>,
    ) -> Self {
        Self {
            db,
            config,
            invoices,
        }
    }

    /// An unconfigured secret skips verification outside production
    fn check_signature(
        &self,
        provider: PaymentProvider,
        secret: Option<&String>,
        verify: impl FnOnce(&str) -> Result<(), SignatureError>,
    ) -> Result<(), ServiceError> {
        match secret {
            Some(secret) => verify(secret).map_err(|e| {
                SECURITY_METRICS.webhook_signature_rejected.inc();
                warn!(%provider, error = %e, "webhook signature rejected");
                ServiceError::Unauthorized("invalid webhook signature".into())
            }),
            None if self.config.is_production() => {
                warn!(%provider, "webhook received but no secret is configured");
                Err(ServiceError::Unauthorized("webhook secret not configured".into()))
            }
            None => {
                warn!(%provider, "webhook signature not verified: no secret configured");
                Ok(())
            }
        }
    }

    #[instrument(skip(self, signature, payload))]
    pub async fn handle_stripe(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookOutcome, ServiceError> {
        let tolerance = self.config.webhook_tolerance_secs;
        self.check_signature(
            PaymentProvider::Stripe,
            self.config.stripe_webhook_secret.as_ref(),
            |secret| {
                let header = signature.ok_or(SignatureError::Malformed)?;
                verify_stripe_signature(header, payload, secret, tolerance, Utc::now().timestamp())
            },
        )?;
        let notice = parse_stripe_event(payload)?;
        self.apply(PaymentProvider::Stripe, notice).await
    }

    #[instrument(skip(self, timestamp, signature, payload))]
    pub async fn handle_paypal(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookOutcome, ServiceError> {
        let tolerance = self.config.webhook_tolerance_secs;
        self.check_signature(
            PaymentProvider::Paypal,
            self.config.paypal_webhook_secret.as_ref(),
            |secret| {
                let (ts, sig) = timestamp.zip(signature).ok_or(SignatureError::Malformed)?;
                verify_hmac_signature(ts, sig, payload, secret, tolerance, Utc::now().timestamp())
            },
        )?;
        let notice = parse_paypal_event(payload)?;
        self.apply(PaymentProvider::Paypal, notice).await
    }

    /// Records the provider event and marks the invoice paid. A replayed event
    /// id is acknowledged without touching the invoice.
    async fn apply(
        &self,
        provider: PaymentProvider,
        notice: PaymentNotice,
    ) -> Result<WebhookOutcome, ServiceError> {
        let outcome = |status| WebhookOutcome {
            status,
            event_id: notice.event_id.clone(),
            invoice_id: notice.invoice_id,
        };

        let txn = self.db.begin().await?;
        let seen = payment_event::Entity::find()
            .filter(payment_event::Column::Provider.eq(provider.to_string()))
            .filter(payment_event::Column::EventId.eq(notice.event_id.clone()))
            .one(&txn)
            .await?
            .is_some();
        if seen {
            info!(%provider, event_id = %notice.event_id, "webhook event already processed");
            return Ok(outcome(WebhookStatus::Duplicate));
        }

        let mut status = WebhookStatus::Ignored;
        let mut paid_invoice = None;
        if let Some(invoice_id) = notice.invoice_id {
            match invoice::Entity::find_by_id(invoice_id).one(&txn).await? {
                Some(inv) if inv.status().is_some_and(InvoiceStatus::is_payable) => {
                    match InvoiceService::apply_payment(
                        &txn,
                        inv,
                        Some(provider.to_string()),
                        notice.reference.clone(),
                    )
                    .await
                    {
                        Ok(updated) => {
                            paid_invoice = Some(updated);
                            status = WebhookStatus::Processed;
                        }
                        Err(ServiceError::Conflict(msg) | ServiceError::InvalidStatus(msg)) => {
                            warn!(%invoice_id, reason = %msg, "invoice settled concurrently, payment ignored");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some(inv) => {
                    warn!(%invoice_id, status = %inv.status, "payment for an invoice that is not payable");
                }
                None => warn!(%invoice_id, "payment references an unknown invoice"),
            }
        }

        let recorded = payment_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            provider: Set(provider.to_string()),
            event_id: Set(notice.event_id.clone()),
            event_type: Set(notice.event_type.clone()),
            invoice_id: Set(notice.invoice_id),
            processed_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await;
        match recorded {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Ok(outcome(WebhookStatus::Duplicate));
            }
            Err(e) => return Err(e.into()),
        }
        txn.commit().await?;

        if let Some(inv) = &paid_invoice {
            self.invoices.paid(inv);
        }
        Ok(outcome(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stripe_checkout_completion() {
        let invoice_id = Uuid::new_v4();
        let body = serde_json::json!({
            "id": "evt_123",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_1", "payment_intent": "pi_9", "metadata": {"invoice_id": invoice_id.to_string()}}}
        });
        let notice = parse_stripe_event(body.to_string().as_bytes()).unwrap();
        assert_eq!(notice.event_id, "evt_123");
        assert_eq!(notice.invoice_id, Some(invoice_id));
        assert_eq!(notice.reference.as_deref(), Some("pi_9"));
    }

    #[test]
    fn stripe_events_other_than_payment_carry_no_invoice() {
        let body = serde_json::json!({
            "id": "evt_2",
            "type": "charge.refunded",
            "data": {"object": {"metadata": {"invoice_id": Uuid::new_v4().to_string()}}}
        });
        let notice = parse_stripe_event(body.to_string().as_bytes()).unwrap();
        assert_eq!(notice.invoice_id, None);
    }

    #[test]
    fn parses_paypal_capture() {
        let invoice_id = Uuid::new_v4();
        let body = serde_json::json!({
            "id": "WH-1",
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {"id": "CAP-7", "custom_id": invoice_id.to_string()}
        });
        let notice = parse_paypal_event(body.to_string().as_bytes()).unwrap();
        assert_eq!(notice.invoice_id, Some(invoice_id));
        assert_eq!(notice.reference.as_deref(), Some("CAP-7"));
    }

    #[test]
    fn rejects_payloads_without_event_id() {
        assert!(parse_paypal_event(br#"{"event_type":"X"}"#).is_err());
        assert!(parse_stripe_event(b"not json").is_err());
    }
}
