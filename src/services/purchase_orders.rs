use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::alerts::AlertService;
use super::notifications::{NewNotification, NotificationService};
use super::vessels::VesselService;
use super::{fetch_page, random_code, Page};
use crate::auth::{AuthUser, UserRole};
use crate::config::AppConfig;
use crate::entities::low_stock_alert::{self, AlertStatus};
use crate::entities::purchase_order::{self, PurchaseOrderStatus};
use crate::entities::part::{self, MAX_STOCK_QUANTITY};
use crate::entities::{purchase_order_item, vessel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

const PO_SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `PO-YYYYMMDD-XXXXXX`
pub fn generate_po_number(at: DateTime<Utc>) -> String {
    format!(
        "PO-{}-{}",
        at.format("%Y%m%d"),
        random_code(PO_SUFFIX_ALPHABET, 6)
    )
}

/// Money totals of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub markup_amount: Decimal,
    pub total: Decimal,
}

/// Largest quantity accepted on one order line
pub const MAX_LINE_QUANTITY: i32 = 1_000_000;
/// Largest unit price accepted on one order line
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

fn amount_too_large() -> ServiceError {
    ServiceError::ValidationError("Order amount is too large".into())
}

pub fn line_total(quantity: i32, unit_price: Decimal) -> Result<Decimal, ServiceError> {
    Decimal::from(quantity)
        .checked_mul(unit_price)
        .map(|total| total.round_dp(2))
        .ok_or_else(amount_too_large)
}

/// `total = round2(subtotal × (1 + markup))`, `markup_amount = total − subtotal`
pub fn compute_totals(lines: &[(i32, Decimal)], markup_rate: Decimal) -> Result<Totals, ServiceError> {
    let mut subtotal = Decimal::ZERO;
    for (qty, price) in lines {
        subtotal = subtotal
            .checked_add(line_total(*qty, *price)?)
            .ok_or_else(amount_too_large)?;
    }
    let subtotal = subtotal.round_dp(2);
    let total = (Decimal::ONE + markup_rate)
        .checked_mul(subtotal)
        .ok_or_else(amount_too_large)?
        .round_dp(2);
    Ok(Totals {
        subtotal,
        markup_amount: total - subtotal,
        total,
    })
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PurchaseOrderItemRequest {
    /// Inventory part being restocked
    pub part_id: Option<Uuid>,
    /// Free-text line; defaults to the part name
    #[validate(length(min = 1, max = 500))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 1_000_000))]
    pub quantity: i32,
    /// Supplier unit price; defaults to the part's unit cost
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePurchaseOrderRequest {
    pub vessel_id: Uuid,
    #[validate]
    pub items: Vec<PurchaseOrderItemRequest>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PurchaseOrderFilter {
    pub vessel_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub status: Option<PurchaseOrderStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub order: purchase_order::Model,
    pub items: Vec<purchase_order_item::Model>,
}

struct ResolvedLine {
    part_id: Option<Uuid>,
    description: String,
    quantity: i32,
    unit_price: Decimal,
}

#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    notifications: Arc<NotificationService>,
    event_sender: EventSender,
}

impl PurchaseOrderService {
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

    pub async fn find_scoped<C: ConnectionTrait>(
        conn: &C,
        user: &AuthUser,
        id: Uuid,
    ) -> Result<purchase_order::Model, ServiceError> {
        purchase_order::Entity::find_by_id(id)
            .one(conn)
            .await?
            .filter(|po| user.can_access(po.company_id))
            .ok_or_else(|| ServiceError::not_found("Purchase order", id))
    }

    async fn items<C: ConnectionTrait>(
        conn: &C,
        po_id: Uuid,
    ) -> Result<Vec<purchase_order_item::Model>, ServiceError> {
        Ok(purchase_order_item::Entity::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(po_id))
            .order_by_asc(purchase_order_item::Column::Description)
            .all(conn)
            .await?)
    }

    async fn unique_po_number<C: ConnectionTrait>(conn: &C) -> Result<String, ServiceError> {
        for _ in 0..8 {
            let candidate = generate_po_number(Utc::now());
            let taken = purchase_order::Entity::find()
                .filter(purchase_order::Column::PoNumber.eq(candidate.clone()))
                .one(conn)
                .await?
                .is_some();
            if !taken {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "could not allocate a purchase order number".into(),
        ))
    }

    /// Writes the order and its lines with totals computed from the configured markup
    async fn insert_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        user: &AuthUser,
        vessel: &vessel::Model,
        lines: Vec<ResolvedLine>,
        notes: Option<String>,
        alert_id: Option<Uuid>,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let markup_rate = self.config.markup_rate;
        let pairs: Vec<(i32, Decimal)> = lines.iter().map(|l| (l.quantity, l.unit_price)).collect();
        let totals = compute_totals(&pairs, markup_rate)?;
        let now = Utc::now();

        let order = purchase_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            po_number: Set(Self::unique_po_number(conn).await?),
            company_id: Set(vessel.company_id),
            vessel_id: Set(vessel.id),
            alert_id: Set(alert_id),
            status: Set(PurchaseOrderStatus::Draft.to_string()),
            subtotal: Set(totals.subtotal),
            markup_rate: Set(markup_rate),
            markup_amount: Set(totals.markup_amount),
            total: Set(totals.total),
            currency: Set(self.config.currency.clone()),
            notes: Set(notes),
            created_by: Set(user.user_id),
            approved_by: Set(None),
            submitted_at: Set(None),
            approved_at: Set(None),
            received_at: Set(None),
            cancelled_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let item = purchase_order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(order.id),
                part_id: Set(line.part_id),
                description: Set(line.description),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                line_total: Set(line_total(line.quantity, line.unit_price)?),
            }
            .insert(conn)
            .await?;
            items.push(item);
        }
        Ok(PurchaseOrderDetail { order, items })
    }

    #[instrument(skip(self, user, req), fields(vessel_id = %req.vessel_id, lines = req.items.len()))]
    pub async fn create(
        &self,
        user: &AuthUser,
        req: CreatePurchaseOrderRequest,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        req.validate()?;
        if req.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "A purchase order needs at least one item".into(),
            ));
        }
        let txn = self.db.begin().await?;
        let vessel = VesselService::find_scoped(&txn, user, req.vessel_id).await?;

        let mut lines = Vec::with_capacity(req.items.len());
        for (i, item) in req.items.into_iter().enumerate() {
            let part = match item.part_id {
                Some(part_id) => Some(
                    part::Entity::find_by_id(part_id)
                        .one(&txn)
                        .await?
                        .filter(|p| p.vessel_id == vessel.id)
                        .ok_or_else(|| {
                            ServiceError::ValidationError(format!(
                                "items[{}].part_id is not a part of this vessel",
                                i
                            ))
                        })?,
                ),
                None => None,
            };
            let unit_price = match (item.unit_price, &part) {
                (Some(price), _) => price,
                (None, Some(p)) => p.unit_cost,
                (None, None) => {
                    return Err(ServiceError::ValidationError(format!(
                        "items[{}].unit_price is required for free-text lines",
                        i
                    )))
                }
            };
            if unit_price.is_sign_negative() {
                return Err(ServiceError::ValidationError(format!(
                    "items[{}].unit_price must not be negative",
                    i
                )));
            }
            if unit_price > MAX_UNIT_PRICE {
                return Err(ServiceError::ValidationError(format!(
                    "items[{}].unit_price must not exceed {}",
                    i, MAX_UNIT_PRICE
                )));
            }
            let description = match (item.description, &part) {
                (Some(d), _) => d,
                (None, Some(p)) => format!("{} ({})", p.name, p.part_number),
                (None, None) => {
                    return Err(ServiceError::ValidationError(format!(
                        "items[{}] needs a part_id or a description",
                        i
                    )))
                }
            };
            lines.push(ResolvedLine {
                part_id: part.map(|p| p.id),
                description,
                quantity: item.quantity,
                unit_price: unit_price.round_dp(2),
            });
        }

        let detail = self
            .insert_order(&txn, user, &vessel, lines, req.notes, None)
            .await?;
        txn.commit().await?;
        self.created(&detail.order);
        Ok(detail)
    }

    /// One-line order restocking the alert's part to twice its minimum
    #[instrument(skip(self, user))]
    pub async fn create_from_alert(
        &self,
        user: &AuthUser,
        alert_id: Uuid,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let alert = low_stock_alert::Entity::find_by_id(alert_id)
            .one(&txn)
            .await?
            .filter(|a| user.can_access(a.company_id))
            .ok_or_else(|| ServiceError::not_found("Low-stock alert", alert_id))?;
        match alert.status() {
            Some(AlertStatus::Resolved) => {
                return Err(ServiceError::InvalidOperation(
                    "Alert is already resolved".into(),
                ))
            }
            Some(AlertStatus::Ordered) => {
                return Err(ServiceError::Conflict(
                    "A purchase order already exists for this alert".into(),
                ))
            }
            _ => {}
        }
        let part = part::Entity::find_by_id(alert.part_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Part", alert.part_id))?;
        let vessel = vessel::Entity::find_by_id(part.vessel_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Vessel", part.vessel_id))?;

        let line = ResolvedLine {
            part_id: Some(part.id),
            description: format!("{} ({})", part.name, part.part_number),
            quantity: part.reorder_quantity(),
            unit_price: part.unit_cost.round_dp(2),
        };
        let detail = self
            .insert_order(
                &txn,
                user,
                &vessel,
                vec![line],
                Some(format!("Restock for low-stock alert {}", alert.id)),
                Some(alert.id),
            )
            .await?;
        AlertService::mark_ordered(&txn, alert, detail.order.id).await?;
        txn.commit().await?;
        self.created(&detail.order);
        Ok(detail)
    }

    fn created(&self, order: &purchase_order::Model) {
        info!(po_number = %order.po_number, total = %order.total, "purchase order created");
        self.event_sender.emit(Event::PurchaseOrderCreated {
            purchase_order_id: order.id,
            total: order.total,
        });
    }

    pub async fn get(&self, user: &AuthUser, id: Uuid) -> Result<PurchaseOrderDetail, ServiceError> {
        let order = Self::find_scoped(&*self.db, user, id).await?;
        let items = Self::items(&*self.db, order.id).await?;
        Ok(PurchaseOrderDetail { order, items })
    }

    pub async fn list(
        &self,
        user: &AuthUser,
        filter: PurchaseOrderFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<purchase_order::Model>, ServiceError> {
        let mut query = purchase_order::Entity::find();
        match user.tenant_filter() {
            Some(company_id) => query = query.filter(purchase_order::Column::CompanyId.eq(company_id)),
            None => {
                if let Some(company_id) = filter.company_id {
                    query = query.filter(purchase_order::Column::CompanyId.eq(company_id));
                }
            }
        }
        if let Some(vessel_id) = filter.vessel_id {
            query = query.filter(purchase_order::Column::VesselId.eq(vessel_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(purchase_order::Column::Status.eq(status.to_string()));
        }
        fetch_page(
            &self.db,
            query.order_by_desc(purchase_order::Column::CreatedAt),
            page,
            per_page,
        )
        .await
    }

    /// Validates and applies a status change, stamping the matching timestamp
    pub(crate) async fn transition<C: ConnectionTrait>(
        conn: &C,
        order: purchase_order::Model,
        next: PurchaseOrderStatus,
        actor: Option<Uuid>,
    ) -> Result<purchase_order::Model, ServiceError> {
        let current = order.status().ok_or_else(|| {
            ServiceError::InternalError(format!("unknown purchase order status {}", order.status))
        })?;
        if !current.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot move purchase order {} from {} to {}",
                order.po_number, current, next
            )));
        }
        let now = Utc::now();
        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(next.to_string());
        match next {
            PurchaseOrderStatus::Submitted => active.submitted_at = Set(Some(now)),
            PurchaseOrderStatus::Approved => {
                active.approved_at = Set(Some(now));
                active.approved_by = Set(actor);
            }
            PurchaseOrderStatus::Received => active.received_at = Set(Some(now)),
            PurchaseOrderStatus::Cancelled => active.cancelled_at = Set(Some(now)),
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Invoiced => {}
        }
        active.updated_at = Set(now);
        Ok(active.update(conn).await?)
    }

    fn status_changed(&self, order: &purchase_order::Model, old: PurchaseOrderStatus) {
        info!(po_number = %order.po_number, from = %old, to = %order.status, "purchase order status changed");
        self.event_sender.emit(Event::PurchaseOrderStatusChanged {
            purchase_order_id: order.id,
            old_status: old.to_string(),
            new_status: order.status.clone(),
        });
    }

    /// Sends a draft to the SMS team for approval
    #[instrument(skip(self, user))]
    pub async fn submit(&self, user: &AuthUser, id: Uuid) -> Result<purchase_order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = Self::find_scoped(&txn, user, id).await?;
        let updated = Self::transition(&txn, order, PurchaseOrderStatus::Submitted, Some(user.user_id)).await?;
        self.notifications
            .notify_admins(
                &txn,
                NewNotification::new(
                    "purchase_order_submitted",
                    format!("Purchase order {} awaiting approval", updated.po_number),
                    format!(
                        "Purchase order {} totalling {} {} was submitted by {}.",
                        updated.po_number, updated.total, updated.currency, user.display_name()
                    ),
                )
                .about("purchase_order", updated.id),
            )
            .await?;
        txn.commit().await?;
        self.status_changed(&updated, PurchaseOrderStatus::Draft);
        Ok(updated)
    }

    #[instrument(skip(self, admin))]
    pub async fn approve(&self, admin: &AuthUser, id: Uuid) -> Result<purchase_order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = Self::find_scoped(&txn, admin, id).await?;
        let updated = Self::transition(&txn, order, PurchaseOrderStatus::Approved, Some(admin.user_id)).await?;
        self.notifications
            .notify_company_roles(
                &txn,
                updated.company_id,
                &[UserRole::Manager],
                NewNotification::new(
                    "purchase_order_approved",
                    format!("Purchase order {} approved", updated.po_number),
                    "The order has been approved and will be invoiced shortly.",
                )
                .about("purchase_order", updated.id),
            )
            .await?;
        txn.commit().await?;
        self.status_changed(&updated, PurchaseOrderStatus::Submitted);
        Ok(updated)
    }

    /// Cancels an open order. A linked alert goes back to waiting for an order.
    #[instrument(skip(self, user))]
    pub async fn cancel(&self, user: &AuthUser, id: Uuid) -> Result<purchase_order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = Self::find_scoped(&txn, user, id).await?;
        let old = order.status().unwrap_or(PurchaseOrderStatus::Draft);
        let updated = Self::transition(&txn, order, PurchaseOrderStatus::Cancelled, Some(user.user_id)).await?;
        if let Some(alert_id) = updated.alert_id {
            let alert = low_stock_alert::Entity::find_by_id(alert_id)
                .one(&txn)
                .await?
                .filter(|a| a.status() == Some(AlertStatus::Ordered));
            if let Some(alert) = alert {
                let previous = if alert.vessel_notified_at.is_some() {
                    AlertStatus::VesselNotified
                } else {
                    AlertStatus::AdminNotified
                };
                let mut active: low_stock_alert::ActiveModel = alert.into();
                active.status = Set(previous.to_string());
                active.purchase_order_id = Set(None);
                active.updated_at = Set(Utc::now());
                active.update(&txn).await?;
            }
        }
        txn.commit().await?;
        self.status_changed(&updated, old);
        Ok(updated)
    }

    /// Goods arrived aboard: line quantities are added to their parts and the
    /// originating alert is resolved
    #[instrument(skip(self, user))]
    pub async fn receive(&self, user: &AuthUser, id: Uuid) -> Result<PurchaseOrderDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let order = Self::find_scoped(&txn, user, id).await?;
        let old = order.status().unwrap_or(PurchaseOrderStatus::Draft);
        let updated = Self::transition(&txn, order, PurchaseOrderStatus::Received, Some(user.user_id)).await?;
        let items = Self::items(&txn, updated.id).await?;
        let now = Utc::now();
        for item in &items {
            if let Some(part_id) = item.part_id {
                let result = part::Entity::update_many()
                    .col_expr(
                        part::Column::Quantity,
                        Expr::col(part::Column::Quantity).add(item.quantity),
                    )
                    .col_expr(part::Column::UpdatedAt, Expr::value(now))
                    .filter(part::Column::Id.eq(part_id))
                    .filter(
                        Expr::expr(Expr::col(part::Column::Quantity).add(item.quantity))
                            .lte(MAX_STOCK_QUANTITY),
                    )
                    .exec(&txn)
                    .await?;
                // a deleted part is skipped; an existing one would overflow its limit
                if result.rows_affected == 0
                    && part::Entity::find_by_id(part_id).one(&txn).await?.is_some()
                {
                    return Err(ServiceError::ValidationError(format!(
                        "receiving {} x {} would exceed the stock limit of {} units",
                        item.quantity, item.description, MAX_STOCK_QUANTITY
                    )));
                }
            }
        }
        let mut resolved_alert = None;
        if let Some(alert_id) = updated.alert_id {
            if let Some(alert) = low_stock_alert::Entity::find_by_id(alert_id).one(&txn).await? {
                if !alert.is_resolved() {
                    resolved_alert = Some(AlertService::mark_resolved(&txn, alert).await?.id);
                }
            }
        }
        txn.commit().await?;
        self.status_changed(&updated, old);
        if let Some(alert_id) = resolved_alert {
            self.event_sender.emit(Event::LowStockAlertResolved(alert_id));
        }
        Ok(PurchaseOrderDetail {
            order: updated,
            items,
        })
    }

    pub(crate) async fn load_with_items<C: ConnectionTrait>(
        conn: &C,
        user: &AuthUser,
        id: Uuid,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let order = Self::find_scoped(conn, user, id).await?;
        let items = Self::items(conn, order.id).await?;
        Ok(PurchaseOrderDetail { order, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn markup_totals() {
        let totals = compute_totals(&[(3, dec!(45.50)), (1, dec!(120.00))], dec!(0.20)).unwrap();
        assert_eq!(totals.subtotal, dec!(256.50));
        assert_eq!(totals.total, dec!(307.80));
        assert_eq!(totals.markup_amount, dec!(51.30));
    }

    #[test]
    fn totals_round_to_cents() {
        let totals = compute_totals(&[(1, dec!(0.99))], dec!(0.20)).unwrap();
        assert_eq!(totals.total, dec!(1.19));
        assert_eq!(totals.markup_amount, dec!(0.20));
    }

    #[test]
    fn oversized_lines_are_rejected_instead_of_overflowing() {
        assert!(matches!(
            line_total(MAX_LINE_QUANTITY, Decimal::MAX),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            compute_totals(&[(1, Decimal::MAX), (1, Decimal::MAX)], dec!(0.20)),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(compute_totals(&[(MAX_LINE_QUANTITY, MAX_UNIT_PRICE)], dec!(0.20)).is_ok());
    }

    #[test]
    fn po_numbers_carry_the_date() {
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 3, 9, 12, 0, 0).unwrap();
        let number = generate_po_number(at);
        assert!(number.starts_with("PO-20240309-"), "{number}");
        assert_eq!(number.len(), "PO-20240309-".len() + 6);
    }

    proptest! {
        #[test]
        fn markup_invariant_holds(
            lines in prop::collection::vec((1i32..500, 0i64..1_000_000), 1..10),
            rate_bp in 0i64..5000,
        ) {
            let lines: Vec<(i32, Decimal)> = lines
                .into_iter()
                .map(|(q, cents)| (q, Decimal::new(cents, 2)))
                .collect();
            let rate = Decimal::new(rate_bp, 4);
            let t = compute_totals(&lines, rate).unwrap();
            prop_assert_eq!(t.total, (t.subtotal * (Decimal::ONE + rate)).round_dp(2));
            prop_assert_eq!(t.markup_amount, t.total - t.subtotal);
            prop_assert!(t.markup_amount >= Decimal::ZERO);
        }
    }
}
