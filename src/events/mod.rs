use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::{DOMAIN_METRICS, SECURITY_METRICS};

pub mod outbox;

/// Sending half of the in-process domain event channel
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiver to hand to [`process_events`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Fire-and-forget emission used on request paths; a full or closed
    /// channel drops the event with a warning.
    pub fn emit(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("domain event dropped: {}", e);
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Fleet events
    VesselOnboarded {
        vessel_id: Uuid,
        company_id: Uuid,
        equipment_count: usize,
        part_count: usize,
    },
    FaultReported {
        fault_id: Uuid,
        vessel_id: Uuid,
        severity: String,
    },
    FaultStatusChanged {
        fault_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Inventory events
    PartAdjusted {
        part_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
    },
    LowStockAlertOpened {
        alert_id: Uuid,
        part_id: Uuid,
        quantity: i32,
    },
    LowStockAlertResolved(Uuid),

    // Procurement events
    PurchaseOrderCreated {
        purchase_order_id: Uuid,
        total: Decimal,
    },
    PurchaseOrderStatusChanged {
        purchase_order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    InvoiceIssued {
        invoice_id: Uuid,
        total: Decimal,
        due_at: DateTime<Utc>,
    },
    InvoicePaid {
        invoice_id: Uuid,
        provider: Option<String>,
    },
    InvoiceOverdue(Uuid),
    InvoiceVoided(Uuid),

    // Licensing & security
    ActivationCodeRedeemed {
        company_id: Uuid,
        tier: String,
        expires_at: DateTime<Utc>,
    },
    SecurityAlertRaised {
        alert_id: Uuid,
        kind: String,
        subject: String,
    },
}

/// Drains the event channel, logging each event and updating domain metrics
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processing loop started");
    while let Some(event) = receiver.recv().await {
        handle_event(&event);
    }
    warn!("Event processing loop has ended");
}

fn handle_event(event: &Event) {
    match event {
        Event::VesselOnboarded {
            vessel_id,
            equipment_count,
            part_count,
            ..
        } => {
            DOMAIN_METRICS.vessels_onboarded.inc();
            info!(%vessel_id, equipment_count, part_count, "vessel onboarded");
        }
        Event::FaultReported {
            fault_id,
            vessel_id,
            severity,
        } => {
            DOMAIN_METRICS.faults_reported.inc();
            info!(%fault_id, %vessel_id, %severity, "fault reported");
        }
        Event::LowStockAlertOpened {
            alert_id,
            part_id,
            quantity,
        } => {
            DOMAIN_METRICS.low_stock_alerts_opened.inc();
            warn!(%alert_id, %part_id, quantity, "low stock alert opened");
        }
        Event::PurchaseOrderCreated {
            purchase_order_id,
            total,
        } => {
            DOMAIN_METRICS.purchase_orders_created.inc();
            info!(%purchase_order_id, %total, "purchase order created");
        }
        Event::InvoiceIssued {
            invoice_id, total, ..
        } => {
            DOMAIN_METRICS.invoices_issued.inc();
            info!(%invoice_id, %total, "invoice issued");
        }
        Event::InvoicePaid {
            invoice_id,
            provider,
        } => {
            DOMAIN_METRICS.invoices_paid.inc();
            info!(%invoice_id, provider = provider.as_deref().unwrap_or("manual"), "invoice paid");
        }
        Event::InvoiceOverdue(invoice_id) => {
            DOMAIN_METRICS.invoices_overdue.inc();
            warn!(%invoice_id, "invoice overdue");
        }
        Event::ActivationCodeRedeemed {
            company_id, tier, ..
        } => {
            DOMAIN_METRICS.activation_codes_redeemed.inc();
            info!(%company_id, %tier, "activation code redeemed");
        }
        Event::SecurityAlertRaised {
            alert_id,
            kind,
            subject,
        } => {
            SECURITY_METRICS.alerts_raised.inc();
            warn!(%alert_id, %kind, %subject, "security alert raised");
        }
        other => {
            info!("event: {:?}", other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn processor_consumes_until_senders_drop() {
        let (sender, rx) = EventSender::channel(8);
        let before = DOMAIN_METRICS.invoices_overdue.get();
        sender.emit(Event::InvoiceOverdue(Uuid::new_v4()));
        sender
            .send(Event::LowStockAlertResolved(Uuid::new_v4()))
            .await
            .unwrap();
        drop(sender);

        process_events(rx).await;
        assert!(DOMAIN_METRICS.invoices_overdue.get() > before);
    }

    #[test]
    fn emit_on_closed_channel_does_not_panic() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);
        sender.emit(Event::InvoiceVoided(Uuid::new_v4()));
    }
}
