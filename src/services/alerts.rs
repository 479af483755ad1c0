use chrono::{Duration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::notifications::{NewNotification, NotificationService};
use super::{fetch_page, is_unique_violation, Page};
use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::entities::low_stock_alert::{self, AlertStatus};
use crate::entities::scheduled_notification::ScheduledKind;
use crate::entities::{company, part, vessel};
use crate::errors::ServiceError;
use crate::events::outbox::{self, OutboundMessage};
use crate::events::{Event, EventSender};

#[derive(Debug, Default, Deserialize)]
pub struct AlertFilter {
    pub vessel_id: Option<Uuid>,
    pub status: Option<AlertStatus>,
    /// Only alerts that are not yet resolved
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Default, Clone, Copy, Serialize, ToSchema)]
pub struct StockCheckReport {
    pub parts_below_minimum: usize,
    pub alerts_opened: usize,
}

/// Low-stock alert pipeline: open, notify admin, schedule the vessel
/// notification, track ordering and resolution
#[derive(Clone)]
pub struct AlertService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    notifications: Arc<NotificationService>,
    event_sender: EventSender,
}

impl AlertService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        notifications: Arc<NotificationService>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            config,
            notifications,
            event_sender,
        }
    }

    pub async fn find_unresolved_for_part<C: ConnectionTrait>(
        conn: &C,
        part_id: Uuid,
    ) -> Result<Option<low_stock_alert::Model>, ServiceError> {
        Ok(low_stock_alert::Entity::find()
            .filter(low_stock_alert::Column::PartId.eq(part_id))
            .filter(low_stock_alert::Column::Status.is_in(AlertStatus::unresolved_values()))
            .one(conn)
            .await?)
    }

    /// Scheduled scan: every part at or below its minimum gets an alert unless
    /// one is already open
    #[instrument(skip(self))]
    pub async fn check_stock(&self) -> Result<StockCheckReport, ServiceError> {
        let low_parts = part::Entity::find()
            .filter(Expr::col(part::Column::Quantity).lte(Expr::col(part::Column::MinimumQuantity)))
            .all(&*self.db)
            .await?;
        let mut report = StockCheckReport {
            parts_below_minimum: low_parts.len(),
            ..Default::default()
        };
        for p in &low_parts {
            match self.open_if_needed(p).await {
                Ok(Some(_)) => report.alerts_opened += 1,
                Ok(None) => {}
                Err(e) => warn!(part_id = %p.id, error = %e, "failed to open low-stock alert"),
            }
        }
        if report.alerts_opened > 0 {
            info!(
                parts = report.parts_below_minimum,
                opened = report.alerts_opened,
                "stock check opened alerts"
            );
        }
        Ok(report)
    }

    /// Opens an alert for `part` when it is low and has no unresolved alert.
    /// The admin is notified at once; the vessel notification is queued for
    /// delivery after the configured delay.
    #[instrument(skip(self, part), fields(part_id = %part.id))]
    pub async fn open_if_needed(
        &self,
        part: &part::Model,
    ) -> Result<Option<low_stock_alert::Model>, ServiceError> {
        if !part.is_low() {
            return Ok(None);
        }
        let txn = self.db.begin().await?;
        if Self::find_unresolved_for_part(&txn, part.id).await?.is_some() {
            debug!("unresolved alert already exists");
            return Ok(None);
        }
        let vessel = vessel::Entity::find_by_id(part.vessel_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Vessel", part.vessel_id))?;
        let company = company::Entity::find_by_id(part.company_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Company", part.company_id))?;

        let now = Utc::now();
        let alert = low_stock_alert::ActiveModel {
            id: Set(Uuid::new_v4()),
            part_id: Set(part.id),
            vessel_id: Set(part.vessel_id),
            company_id: Set(part.company_id),
            quantity_at_alert: Set(part.quantity),
            minimum_quantity: Set(part.minimum_quantity),
            status: Set(AlertStatus::Open.to_string()),
            purchase_order_id: Set(None),
            admin_notified_at: Set(None),
            vessel_notified_at: Set(None),
            resolved_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await;
        let alert = match alert {
            Ok(alert) => alert,
            Err(e) if is_unique_violation(&e) => {
                debug!("alert opened concurrently for this part");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let summary = format!(
            "{} ({}) aboard {} is at {} unit(s); minimum is {}. Suggested reorder: {}.",
            part.name,
            part.part_number,
            vessel.name,
            part.quantity,
            part.minimum_quantity,
            part.reorder_quantity()
        );
        self.notifications
            .notify_admins(
                &txn,
                NewNotification::new(
                    "low_stock",
                    format!("Low stock: {} on {}", part.name, vessel.name),
                    format!("{} Company: {}.", summary, company.name),
                )
                .about("low_stock_alert", alert.id),
            )
            .await?;

        let recipient = vessel
            .contact_email
            .clone()
            .unwrap_or_else(|| company.contact_email.clone());
        let delay = Duration::seconds(self.config.vessel_notification_delay_secs as i64);
        outbox::enqueue(
            &txn,
            OutboundMessage::email(
                recipient,
                format!("Low stock aboard {}: {}", vessel.name, part.name),
                format!(
                    "{}\n\nThe SMS team has been notified and will follow up with a purchase order.",
                    summary
                ),
            )
            .of_kind(ScheduledKind::LowStockVessel)
            .related_to(alert.id)
            .deliver_after(now + delay),
        )
        .await?;

        let mut active: low_stock_alert::ActiveModel = alert.into();
        active.status = Set(AlertStatus::AdminNotified.to_string());
        active.admin_notified_at = Set(Some(now));
        active.updated_at = Set(now);
        let alert = active.update(&txn).await?;
        txn.commit().await?;

        info!(alert_id = %alert.id, quantity = part.quantity, "low-stock alert opened");
        self.event_sender.emit(Event::LowStockAlertOpened {
            alert_id: alert.id,
            part_id: part.id,
            quantity: part.quantity,
        });
        Ok(Some(alert))
    }

    pub async fn get(
        &self,
        user: &AuthUser,
        id: Uuid,
    ) -> Result<low_stock_alert::Model, ServiceError> {
        low_stock_alert::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|a| user.can_access(a.company_id))
            .ok_or_else(|| ServiceError::not_found("Low-stock alert", id))
    }

    pub async fn list(
        &self,
        user: &AuthUser,
        filter: AlertFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<low_stock_alert::Model>, ServiceError> {
        let mut query = low_stock_alert::Entity::find();
        if let Some(company_id) = user.tenant_filter() {
            query = query.filter(low_stock_alert::Column::CompanyId.eq(company_id));
        }
        if let Some(vessel_id) = filter.vessel_id {
            query = query.filter(low_stock_alert::Column::VesselId.eq(vessel_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(low_stock_alert::Column::Status.eq(status.to_string()));
        } else if filter.open {
            query = query
                .filter(low_stock_alert::Column::Status.is_in(AlertStatus::unresolved_values()));
        }
        fetch_page(
            &self.db,
            query.order_by_desc(low_stock_alert::Column::CreatedAt),
            page,
            per_page,
        )
        .await
    }

    /// Resolving an already resolved alert is a no-op
    #[instrument(skip(self, user))]
    pub async fn resolve(
        &self,
        user: &AuthUser,
        id: Uuid,
    ) -> Result<low_stock_alert::Model, ServiceError> {
        let alert = self.get(user, id).await?;
        if alert.is_resolved() {
            return Ok(alert);
        }
        let resolved = Self::mark_resolved(&*self.db, alert).await?;
        self.event_sender
            .emit(Event::LowStockAlertResolved(resolved.id));
        Ok(resolved)
    }

    pub(crate) async fn mark_resolved<C: ConnectionTrait>(
        conn: &C,
        alert: low_stock_alert::Model,
    ) -> Result<low_stock_alert::Model, ServiceError> {
        let now = Utc::now();
        let mut active: low_stock_alert::ActiveModel = alert.into();
        active.status = Set(AlertStatus::Resolved.to_string());
        active.resolved_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(active.update(conn).await?)
    }

    /// Links the alert to the purchase order that restocks it
    pub(crate) async fn mark_ordered<C: ConnectionTrait>(
        conn: &C,
        alert: low_stock_alert::Model,
        purchase_order_id: Uuid,
    ) -> Result<low_stock_alert::Model, ServiceError> {
        let mut active: low_stock_alert::ActiveModel = alert.into();
        active.status = Set(AlertStatus::Ordered.to_string());
        active.purchase_order_id = Set(Some(purchase_order_id));
        active.updated_at = Set(Utc::now());
        Ok(active.update(conn).await?)
    }

    /// Resolves an unresolved alert that no order is waiting on once the part is
    /// back above its minimum
    pub(crate) async fn resolve_if_restocked<C: ConnectionTrait>(
        conn: &C,
        part: &part::Model,
    ) -> Result<Option<low_stock_alert::Model>, ServiceError> {
        if part.is_low() {
            return Ok(None);
        }
        match Self::find_unresolved_for_part(conn, part.id).await? {
            Some(alert) if alert.status() != Some(AlertStatus::Ordered) => {
                Ok(Some(Self::mark_resolved(conn, alert).await?))
            }
            _ => Ok(None),
        }
    }
}
