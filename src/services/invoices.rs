use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::notifications::{NewNotification, NotificationService};
use super::purchase_orders::{PurchaseOrderDetail, PurchaseOrderService};
use super::{fetch_page, is_unique_violation, Page};
use crate::auth::{AuthUser, UserRole};
use crate::config::AppConfig;
use crate::entities::invoice::{self, InvoiceStatus};
use crate::entities::purchase_order::PurchaseOrderStatus;
use crate::entities::scheduled_notification::ScheduledKind;
use crate::entities::{company, vessel};
use crate::errors::ServiceError;
use crate::events::outbox::{self, OutboundMessage};
use crate::events::{Event, EventSender};
use crate::reports::invoice_pdf::{render_invoice_pdf, InvoiceDocument, InvoiceLine};
use crate::reports::RevenueReport;

/// `INV-YYYY-NNNNNN`
pub fn format_invoice_number(year: i32, sequence: u32) -> String {
    format!("INV-{}-{:06}", year, sequence)
}

fn payable_statuses() -> [String; 2] {
    [InvoiceStatus::Issued.to_string(), InvoiceStatus::Overdue.to_string()]
}

/// Error for a change the invoice's current status does not allow
fn transition_refused(invoice: &invoice::Model, action: &str) -> ServiceError {
    match invoice.status() {
        Some(InvoiceStatus::Paid) if action == "paid" => ServiceError::Conflict(format!(
            "Invoice {} is already paid",
            invoice.invoice_number
        )),
        _ => ServiceError::InvalidStatus(format!(
            "Invoice {} is {} and cannot be {}",
            invoice.invoice_number, invoice.status, action
        )),
    }
}

fn sequence_of(number: &str, prefix: &str) -> Option<u32> {
    number.strip_prefix(prefix)?.parse().ok()
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceFilter {
    pub company_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct MarkPaidRequest {
    pub provider: Option<String>,
    pub reference: Option<String>,
}

/// Summary of one overdue sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OverdueReport {
    pub marked_overdue: usize,
}

#[derive(Clone)]
pub struct InvoiceService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    notifications: Arc<NotificationService>,
    event_sender: EventSender,
}

impl InvoiceService {
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

    async fn next_invoice_number<C: ConnectionTrait>(
        conn: &C,
        at: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        let prefix = format!("INV-{}-", at.year());
        let last = invoice::Entity::find()
            .filter(invoice::Column::InvoiceNumber.starts_with(&prefix))
            .all(conn)
            .await?
            .iter()
            .filter_map(|i| sequence_of(&i.invoice_number, &prefix))
            .max()
            .unwrap_or(0);
        Ok(format_invoice_number(at.year(), last + 1))
    }

    fn pdf_path(&self, invoice_number: &str) -> PathBuf {
        self.config
            .invoices_dir()
            .join(format!("{}.pdf", invoice_number))
    }

    async fn document<C: ConnectionTrait>(
        conn: &C,
        invoice_number: &str,
        issued_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
        detail: &PurchaseOrderDetail,
    ) -> Result<InvoiceDocument, ServiceError> {
        let order = &detail.order;
        let company = company::Entity::find_by_id(order.company_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Company", order.company_id))?;
        let vessel_name = vessel::Entity::find_by_id(order.vessel_id)
            .one(conn)
            .await?
            .map(|v| v.name)
            .unwrap_or_default();
        Ok(InvoiceDocument {
            invoice_number: invoice_number.to_string(),
            po_number: order.po_number.clone(),
            issued_at,
            due_at,
            company_name: company.name,
            company_address: company.address,
            vessel_name,
            currency: order.currency.clone(),
            lines: detail
                .items
                .iter()
                .map(|i| InvoiceLine {
                    description: i.description.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    line_total: i.line_total,
                })
                .collect(),
            subtotal: order.subtotal,
            markup_rate: order.markup_rate,
            markup_amount: order.markup_amount,
            total: order.total,
        })
    }

    async fn write_pdf(&self, invoice_number: &str, bytes: &[u8]) -> Result<PathBuf, ServiceError> {
        let dir = self.config.invoices_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ServiceError::StorageError(format!("{}: {}", dir.display(), e)))?;
        let path = self.pdf_path(invoice_number);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ServiceError::StorageError(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }

    /// Invoices an approved purchase order: renders the PDF, queues the email
    /// to the company and moves the order to `invoiced`
    #[instrument(skip(self, admin))]
    pub async fn issue(&self, admin: &AuthUser, purchase_order_id: Uuid) -> Result<invoice::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let detail = PurchaseOrderService::load_with_items(&txn, admin, purchase_order_id).await?;
        let existing = invoice::Entity::find()
            .filter(invoice::Column::PurchaseOrderId.eq(purchase_order_id))
            .one(&txn)
            .await?;
        if let Some(existing) = existing {
            return Err(ServiceError::Conflict(format!(
                "Purchase order {} is already invoiced as {}",
                detail.order.po_number, existing.invoice_number
            )));
        }
        if detail.order.status() != Some(PurchaseOrderStatus::Approved) {
            return Err(ServiceError::InvalidStatus(format!(
                "Only approved purchase orders can be invoiced (status is {})",
                detail.order.status
            )));
        }

        let issued_at = Utc::now();
        let due_at = issued_at + Duration::days(self.config.invoice_due_days);
        let number = Self::next_invoice_number(&txn, issued_at).await?;
        let doc = Self::document(&txn, &number, issued_at, due_at, &detail).await?;
        let pdf = render_invoice_pdf(&doc);
        let path = self.pdf_path(&number);

        let order = &detail.order;
        let created = invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_number: Set(number.clone()),
            purchase_order_id: Set(order.id),
            company_id: Set(order.company_id),
            subtotal: Set(order.subtotal),
            markup_amount: Set(order.markup_amount),
            total: Set(order.total),
            currency: Set(order.currency.clone()),
            status: Set(InvoiceStatus::Issued.to_string()),
            issued_at: Set(issued_at),
            due_at: Set(due_at),
            paid_at: Set(None),
            payment_provider: Set(None),
            payment_reference: Set(None),
            pdf_path: Set(Some(path.to_string_lossy().into_owned())),
            overdue_notified_at: Set(None),
            created_at: Set(issued_at),
            updated_at: Set(issued_at),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Invoice already exists for this purchase order".into())
            } else {
                ServiceError::db_error(e)
            }
        })?;

        PurchaseOrderService::transition(&txn, detail.order.clone(), PurchaseOrderStatus::Invoiced, Some(admin.user_id))
            .await?;

        let company = company::Entity::find_by_id(order.company_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Company", order.company_id))?;
        outbox::enqueue(
            &txn,
            OutboundMessage::email(
                company.contact_email.clone(),
                format!("Invoice {} for purchase order {}", number, order.po_number),
                format!(
                    "Dear {},\n\nPlease find attached invoice {} for {} {}, due on {}.\n\nSMS - Smart Maintenance System",
                    company.name,
                    number,
                    created.total,
                    created.currency,
                    due_at.format("%Y-%m-%d")
                ),
            )
            .of_kind(ScheduledKind::InvoiceEmail)
            .related_to(created.id),
        )
        .await?;
        self.notifications
            .notify_company_roles(
                &txn,
                order.company_id,
                &[UserRole::Manager],
                NewNotification::new(
                    "invoice_issued",
                    format!("Invoice {} issued", number),
                    format!("{} {} due on {}", created.total, created.currency, due_at.format("%Y-%m-%d")),
                )
                .about("invoice", created.id),
            )
            .await?;
        txn.commit().await?;

        // the file follows the committed row; a failed write is regenerated on download
        if let Err(e) = self.write_pdf(&number, &pdf).await {
            warn!(invoice_number = %number, error = %e, "could not store invoice PDF");
        }

        info!(invoice_number = %created.invoice_number, total = %created.total, "invoice issued");
        self.event_sender.emit(Event::InvoiceIssued {
            invoice_id: created.id,
            total: created.total,
            due_at,
        });
        Ok(created)
    }

    pub async fn get(&self, user: &AuthUser, id: Uuid) -> Result<invoice::Model, ServiceError> {
        invoice::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|i| user.can_access(i.company_id))
            .ok_or_else(|| ServiceError::not_found("Invoice", id))
    }

    pub async fn list(
        &self,
        user: &AuthUser,
        filter: InvoiceFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<invoice::Model>, ServiceError> {
        let mut query = invoice::Entity::find();
        match user.tenant_filter() {
            Some(company_id) => query = query.filter(invoice::Column::CompanyId.eq(company_id)),
            None => {
                if let Some(company_id) = filter.company_id {
                    query = query.filter(invoice::Column::CompanyId.eq(company_id));
                }
            }
        }
        if let Some(status) = filter.status {
            query = query.filter(invoice::Column::Status.eq(status.to_string()));
        }
        fetch_page(
            &self.db,
            query.order_by_desc(invoice::Column::IssuedAt),
            page,
            per_page,
        )
        .await
    }

    /// Returns `(file name, bytes)`. A missing file is rendered again from the
    /// stored invoice and written back.
    pub async fn pdf(&self, user: &AuthUser, id: Uuid) -> Result<(String, Vec<u8>), ServiceError> {
        let invoice = self.get(user, id).await?;
        let file_name = format!("{}.pdf", invoice.invoice_number);
        if let Some(path) = &invoice.pdf_path {
            match tokio::fs::read(path).await {
                Ok(bytes) => return Ok((file_name, bytes)),
                Err(e) => warn!(path = %path, error = %e, "invoice PDF missing, regenerating"),
            }
        }
        let detail =
            PurchaseOrderService::load_with_items(&*self.db, user, invoice.purchase_order_id).await?;
        let mut doc = Self::document(
            &*self.db,
            &invoice.invoice_number,
            invoice.issued_at,
            invoice.due_at,
            &detail,
        )
        .await?;
        doc.subtotal = invoice.subtotal;
        doc.markup_amount = invoice.markup_amount;
        doc.total = invoice.total;
        let bytes = render_invoice_pdf(&doc);
        let path = self.write_pdf(&invoice.invoice_number, &bytes).await?;
        let mut active: invoice::ActiveModel = invoice.into();
        active.pdf_path = Set(Some(path.to_string_lossy().into_owned()));
        active.update(&*self.db).await?;
        Ok((file_name, bytes))
    }

    /// Records a payment on an issued or overdue invoice. The status guard
    /// sits in the UPDATE itself, so a concurrent void or payment wins cleanly.
    pub(crate) async fn apply_payment<C: ConnectionTrait>(
        conn: &C,
        invoice: invoice::Model,
        provider: Option<String>,
        reference: Option<String>,
    ) -> Result<invoice::Model, ServiceError> {
        let now = Utc::now();
        let result = invoice::Entity::update_many()
            .col_expr(invoice::Column::Status, Expr::value(InvoiceStatus::Paid.to_string()))
            .col_expr(invoice::Column::PaidAt, Expr::value(Some(now)))
            .col_expr(invoice::Column::PaymentProvider, Expr::value(provider))
            .col_expr(invoice::Column::PaymentReference, Expr::value(reference))
            .col_expr(invoice::Column::UpdatedAt, Expr::value(now))
            .filter(invoice::Column::Id.eq(invoice.id))
            .filter(invoice::Column::Status.is_in(payable_statuses()))
            .exec(conn)
            .await?;
        Self::reload_after(conn, invoice.id, result.rows_affected, "paid").await
    }

    /// Current row after a guarded update; no affected row means the status
    /// had already moved on
    async fn reload_after<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
        rows_affected: u64,
        action: &str,
    ) -> Result<invoice::Model, ServiceError> {
        let current = invoice::Entity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Invoice", id))?;
        if rows_affected == 1 {
            Ok(current)
        } else {
            Err(transition_refused(&current, action))
        }
    }

    /// Flags one invoice overdue if it is still `issued`. Returns false when
    /// it was paid or voided in the meantime.
    pub async fn mark_overdue<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let result = invoice::Entity::update_many()
            .col_expr(invoice::Column::Status, Expr::value(InvoiceStatus::Overdue.to_string()))
            .col_expr(invoice::Column::OverdueNotifiedAt, Expr::value(Some(now)))
            .col_expr(invoice::Column::UpdatedAt, Expr::value(now))
            .filter(invoice::Column::Id.eq(id))
            .filter(invoice::Column::Status.eq(InvoiceStatus::Issued.to_string()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub(crate) fn paid(&self, invoice: &invoice::Model) {
        info!(invoice_number = %invoice.invoice_number, provider = ?invoice.payment_provider, "invoice paid");
        self.event_sender.emit(Event::InvoicePaid {
            invoice_id: invoice.id,
            provider: invoice.payment_provider.clone(),
        });
    }

    #[instrument(skip(self, admin, req))]
    pub async fn mark_paid(
        &self,
        admin: &AuthUser,
        id: Uuid,
        req: MarkPaidRequest,
    ) -> Result<invoice::Model, ServiceError> {
        let invoice = self.get(admin, id).await?;
        let provider = req.provider.or_else(|| Some("manual".to_string()));
        let updated = Self::apply_payment(&*self.db, invoice, provider, req.reference).await?;
        self.paid(&updated);
        Ok(updated)
    }

    #[instrument(skip(self, admin))]
    pub async fn void(&self, admin: &AuthUser, id: Uuid) -> Result<invoice::Model, ServiceError> {
        let invoice = self.get(admin, id).await?;
        let result = invoice::Entity::update_many()
            .col_expr(invoice::Column::Status, Expr::value(InvoiceStatus::Void.to_string()))
            .col_expr(invoice::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(invoice::Column::Id.eq(invoice.id))
            .filter(invoice::Column::Status.is_in(payable_statuses()))
            .exec(&*self.db)
            .await?;
        let updated = Self::reload_after(&*self.db, invoice.id, result.rows_affected, "voided").await?;
        self.event_sender.emit(Event::InvoiceVoided(updated.id));
        Ok(updated)
    }

    /// Marks issued invoices past their due date overdue and notifies the
    /// company contact and the SMS admin, once per invoice
    #[instrument(skip(self))]
    pub async fn sweep_overdue(&self) -> Result<OverdueReport, ServiceError> {
        let now = Utc::now();
        let due = invoice::Entity::find()
            .filter(invoice::Column::Status.eq(InvoiceStatus::Issued.to_string()))
            .filter(invoice::Column::DueAt.lt(now))
            .all(&*self.db)
            .await?;
        let mut report = OverdueReport::default();
        for inv in due {
            let txn = self.db.begin().await?;
            let company = company::Entity::find_by_id(inv.company_id).one(&txn).await?;
            let first_notice = inv.overdue_notified_at.is_none();
            let id = inv.id;
            let number = inv.invoice_number.clone();
            let total = inv.total;
            let currency = inv.currency.clone();
            let due_at = inv.due_at;

            if !Self::mark_overdue(&txn, id, now).await? {
                debug!(invoice_number = %number, "invoice settled before the overdue sweep reached it");
                continue;
            }

            if first_notice {
                let body = format!(
                    "Invoice {} for {} {} was due on {} and remains unpaid.",
                    number,
                    total,
                    currency,
                    due_at.format("%Y-%m-%d")
                );
                if let Some(company) = &company {
                    outbox::enqueue(
                        &txn,
                        OutboundMessage::email(
                            company.contact_email.clone(),
                            format!("Invoice {} is overdue", number),
                            body.clone(),
                        )
                        .related_to(id),
                    )
                    .await?;
                }
                self.notifications
                    .notify_admins(
                        &txn,
                        NewNotification::new(
                            "invoice_overdue",
                            format!("Invoice {} overdue", number),
                            format!(
                                "{} Company: {}.",
                                body,
                                company.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown")
                            ),
                        )
                        .about("invoice", id),
                    )
                    .await?;
            }
            txn.commit().await?;
            report.marked_overdue += 1;
            self.event_sender.emit(Event::InvoiceOverdue(id));
        }
        if report.marked_overdue > 0 {
            info!(count = report.marked_overdue, "invoices marked overdue");
        }
        Ok(report)
    }

    /// Platform revenue is the markup collected on paid invoices
    pub async fn revenue(&self, company_id: Option<Uuid>) -> Result<RevenueReport, ServiceError> {
        let mut query = invoice::Entity::find();
        if let Some(company_id) = company_id {
            query = query.filter(invoice::Column::CompanyId.eq(company_id));
        }
        let invoices = query.all(&*self.db).await?;
        let mut report = RevenueReport {
            currency: self.config.currency.clone(),
            paid_invoices: 0,
            gross_billed: Decimal::ZERO,
            supplier_cost: Decimal::ZERO,
            markup_revenue: Decimal::ZERO,
            outstanding_total: Decimal::ZERO,
        };
        for inv in &invoices {
            match inv.status() {
                Some(InvoiceStatus::Paid) => {
                    report.paid_invoices += 1;
                    report.gross_billed += inv.total;
                    report.supplier_cost += inv.subtotal;
                    report.markup_revenue += inv.markup_amount;
                }
                Some(InvoiceStatus::Issued) | Some(InvoiceStatus::Overdue) => {
                    report.outstanding_total += inv.total;
                }
                _ => {}
            }
        }
        report.gross_billed = report.gross_billed.round_dp(2);
        report.supplier_cost = report.supplier_cost.round_dp(2);
        report.markup_revenue = report.markup_revenue.round_dp(2);
        report.outstanding_total = report.outstanding_total.round_dp(2);
        Ok(report)
    }

    /// Unpaid invoices of a company, used by the dashboard
    pub async fn unpaid_for_company(&self, company_id: Uuid) -> Result<Vec<invoice::Model>, ServiceError> {
        Ok(invoice::Entity::find()
            .filter(invoice::Column::CompanyId.eq(company_id))
            .filter(invoice::Column::Status.is_in([
                InvoiceStatus::Issued.to_string(),
                InvoiceStatus::Overdue.to_string(),
            ]))
            .order_by_asc(invoice::Column::DueAt)
            .all(&*self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_numbers_are_zero_padded_per_year() {
        assert_eq!(format_invoice_number(2024, 1), "INV-2024-000001");
        assert_eq!(format_invoice_number(2025, 123456), "INV-2025-123456");
    }

    #[test]
    fn parses_sequence_from_number() {
        assert_eq!(sequence_of("INV-2024-000042", "INV-2024-"), Some(42));
        assert_eq!(sequence_of("INV-2023-000042", "INV-2024-"), None);
        assert_eq!(sequence_of("INV-2024-abc", "INV-2024-"), None);
    }
}
