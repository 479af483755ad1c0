//! Durable outbound notifications.
//!
//! Rows in `scheduled_notifications` are written in the same transaction as
//! the change that caused them and delivered by [`Dispatcher::drain_once`]
//! once `deliver_after` has passed. Failed deliveries are retried with
//! exponential backoff until [`MAX_ATTEMPTS`] is reached.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::invoice;
use crate::entities::low_stock_alert::{self, AlertStatus};
use crate::entities::scheduled_notification::{self, DeliveryStatus, ScheduledKind};
use crate::errors::ServiceError;
use crate::metrics::DOMAIN_METRICS;
use crate::notifications::{Attachment, EmailMessage, MailError, SharedMailer};

pub const MAX_ATTEMPTS: i32 = 5;
const BASE_BACKOFF_SECS: i64 = 30;
/// How long a claimed row stays out of the due set while it is being sent
pub const CLAIM_LEASE_SECS: i64 = 300;

/// An outbound message waiting to be written to the queue
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub kind: ScheduledKind,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub related_id: Option<Uuid>,
    pub deliver_after: DateTime<Utc>,
}

impl OutboundMessage {
    /// Plain email due now
    pub fn email(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind: ScheduledKind::Email,
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            related_id: None,
            deliver_after: Utc::now(),
        }
    }

    pub fn related_to(mut self, id: Uuid) -> Self {
        self.related_id = Some(id);
        self
    }

    pub fn of_kind(mut self, kind: ScheduledKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn deliver_after(mut self, at: DateTime<Utc>) -> Self {
        self.deliver_after = at;
        self
    }
}

/// Enqueue a message. Use inside the same transaction as the triggering write.
pub async fn enqueue<C: ConnectionTrait>(
    conn: &C,
    message: OutboundMessage,
) -> Result<scheduled_notification::Model, ServiceError> {
    let now = Utc::now();
    let row = scheduled_notification::ActiveModel {
        id: Set(Uuid::new_v4()),
        kind: Set(message.kind.to_string()),
        recipient: Set(message.recipient),
        subject: Set(message.subject),
        body: Set(message.body),
        related_id: Set(message.related_id),
        deliver_after: Set(message.deliver_after),
        status: Set(DeliveryStatus::Pending.to_string()),
        attempts: Set(0),
        last_error: Set(None),
        sent_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    debug!(
        id = %row.id,
        kind = %row.kind,
        deliver_after = %row.deliver_after,
        "enqueued outbound notification"
    );
    Ok(row)
}

/// Delay before the next attempt after `attempts` failures
pub fn backoff_after(attempts: i32) -> Duration {
    let exponent = (attempts.max(1) - 1).min(10) as u32;
    Duration::seconds(BASE_BACKOFF_SECS * 2_i64.pow(exponent))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Delivers due rows from `scheduled_notifications` through the mailer
#[derive(Clone)]
pub struct Dispatcher {
    db: Arc<DatabaseConnection>,
    mailer: SharedMailer,
    mail_from: String,
    batch_size: u64,
}

impl Dispatcher {
    pub fn new(db: Arc<DatabaseConnection>, mailer: SharedMailer, mail_from: String) -> Self {
        Self {
            db,
            mailer,
            mail_from,
            batch_size: 50,
        }
    }

    #[instrument(skip(self))]
    pub async fn drain_once(&self) -> Result<DispatchReport, ServiceError> {
        let now = Utc::now();
        let due = scheduled_notification::Entity::find()
            .filter(scheduled_notification::Column::Status.eq(DeliveryStatus::Pending.to_string()))
            .filter(scheduled_notification::Column::DeliverAfter.lte(now))
            .order_by_asc(scheduled_notification::Column::DeliverAfter)
            .limit(self.batch_size)
            .all(&*self.db)
            .await?;

        let mut report = DispatchReport::default();
        for row in due {
            if !self.claim(&row).await? {
                debug!(id = %row.id, "notification claimed elsewhere");
                continue;
            }
            let attempts = row.attempts + 1;
            match self.deliver(&row).await {
                Ok(()) => {
                    self.mark_sent(&row, attempts).await?;
                    report.sent += 1;
                }
                Err(e) if attempts >= MAX_ATTEMPTS => {
                    error!(id = %row.id, attempts, "notification delivery failed permanently: {}", e);
                    self.mark_failed(&row, attempts, &e.to_string()).await?;
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(id = %row.id, attempts, "notification delivery failed, will retry: {}", e);
                    self.schedule_retry(&row, attempts, &e.to_string()).await?;
                    report.retried += 1;
                }
            }
        }

        if report != DispatchReport::default() {
            info!(
                sent = report.sent,
                retried = report.retried,
                failed = report.failed,
                "notification dispatch finished"
            );
        }
        Ok(report)
    }

    /// Optimistic claim: only one dispatcher bumps `attempts` from its observed
    /// value, and the claim pushes `deliver_after` out by the lease so the row
    /// leaves the due set. A dispatcher that dies mid-send releases it when the
    /// lease runs out.
    async fn claim(&self, row: &scheduled_notification::Model) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let result = scheduled_notification::Entity::update_many()
            .col_expr(
                scheduled_notification::Column::Attempts,
                Expr::value(row.attempts + 1),
            )
            .col_expr(
                scheduled_notification::Column::DeliverAfter,
                Expr::value(now + Duration::seconds(CLAIM_LEASE_SECS)),
            )
            .col_expr(scheduled_notification::Column::UpdatedAt, Expr::value(now))
            .filter(scheduled_notification::Column::Id.eq(row.id))
            .filter(scheduled_notification::Column::Attempts.eq(row.attempts))
            .filter(scheduled_notification::Column::Status.eq(DeliveryStatus::Pending.to_string()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn deliver(&self, row: &scheduled_notification::Model) -> Result<(), MailError> {
        let kind: ScheduledKind = row
            .kind
            .parse()
            .map_err(|_| MailError::InvalidMessage(format!("unknown kind {}", row.kind)))?;

        let mut message = EmailMessage {
            from: self.mail_from.clone(),
            to: row.recipient.clone(),
            subject: row.subject.clone(),
            text: row.body.clone(),
            attachments: vec![],
        };
        if kind == ScheduledKind::InvoiceEmail {
            if let Some(attachment) = self.invoice_attachment(row.related_id).await? {
                message.attachments.push(attachment);
            }
        }
        self.mailer.send(&message).await
    }

    async fn invoice_attachment(
        &self,
        invoice_id: Option<Uuid>,
    ) -> Result<Option<Attachment>, MailError> {
        let Some(invoice_id) = invoice_id else {
            return Ok(None);
        };
        let invoice = invoice::Entity::find_by_id(invoice_id)
            .one(&*self.db)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        let Some(path) = invoice.as_ref().and_then(|i| i.pdf_path.clone()) else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| MailError::InvalidMessage(format!("invoice pdf unreadable: {}", e)))?;
        let number = invoice.map(|i| i.invoice_number).unwrap_or_default();
        Ok(Some(Attachment::from_bytes(
            format!("{}.pdf", number),
            "application/pdf",
            &bytes,
        )))
    }

    async fn mark_sent(
        &self,
        row: &scheduled_notification::Model,
        attempts: i32,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let mut active: scheduled_notification::ActiveModel = row.clone().into();
        active.status = Set(DeliveryStatus::Sent.to_string());
        active.attempts = Set(attempts);
        active.sent_at = Set(Some(now));
        active.last_error = Set(None);
        active.updated_at = Set(now);
        active.update(&*self.db).await?;
        DOMAIN_METRICS.notifications_delivered.inc();

        if row.kind == ScheduledKind::LowStockVessel.to_string() {
            if let Some(alert_id) = row.related_id {
                self.mark_vessel_notified(alert_id).await?;
            }
        }
        Ok(())
    }

    /// Advances the alert only from `admin_notified`; later states keep their status
    async fn mark_vessel_notified(&self, alert_id: Uuid) -> Result<(), ServiceError> {
        let Some(alert) = low_stock_alert::Entity::find_by_id(alert_id)
            .one(&*self.db)
            .await?
        else {
            warn!(%alert_id, "vessel notification sent for missing alert");
            return Ok(());
        };
        let now = Utc::now();
        let advance = alert.status() == Some(AlertStatus::AdminNotified);
        let mut active: low_stock_alert::ActiveModel = alert.into();
        if advance {
            active.status = Set(AlertStatus::VesselNotified.to_string());
        }
        active.vessel_notified_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&*self.db).await?;
        info!(%alert_id, "vessel notified of low stock");
        Ok(())
    }

    async fn mark_failed(
        &self,
        row: &scheduled_notification::Model,
        attempts: i32,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let mut active: scheduled_notification::ActiveModel = row.clone().into();
        active.status = Set(DeliveryStatus::Failed.to_string());
        active.attempts = Set(attempts);
        active.last_error = Set(Some(reason.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        DOMAIN_METRICS.notifications_failed.inc();
        Ok(())
    }

    async fn schedule_retry(
        &self,
        row: &scheduled_notification::Model,
        attempts: i32,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let mut active: scheduled_notification::ActiveModel = row.clone().into();
        active.attempts = Set(attempts);
        active.deliver_after = Set(now + backoff_after(attempts));
        active.last_error = Set(Some(reason.to_string()));
        active.updated_at = Set(now);
        active.update(&*self.db).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_after(1), Duration::seconds(30));
        assert_eq!(backoff_after(2), Duration::seconds(60));
        assert_eq!(backoff_after(4), Duration::seconds(240));
        assert_eq!(backoff_after(0), Duration::seconds(30));
    }

    #[test]
    fn builder_sets_fields() {
        let id = Uuid::new_v4();
        let at = Utc::now() + Duration::minutes(30);
        let msg = OutboundMessage::email("bridge@vessel.example", "Low stock", "body")
            .of_kind(ScheduledKind::LowStockVessel)
            .related_to(id)
            .deliver_after(at);
        assert_eq!(msg.kind, ScheduledKind::LowStockVessel);
        assert_eq!(msg.related_id, Some(id));
        assert_eq!(msg.deliver_after, at);
    }
}
