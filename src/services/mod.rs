use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, Select};

use crate::errors::ServiceError;

// Tenancy & licensing
pub mod companies;
pub mod users;

// Fleet
pub mod equipment;
pub mod vessels;

// Inventory & procurement pipeline
pub mod alerts;
pub mod inventory;
pub mod invoices;
pub mod payments;
pub mod purchase_orders;

// Operations
pub mod chat;
pub mod faults;
pub mod files;
pub mod hse;
pub mod sync;

// Messaging, monitoring & reporting
pub mod dashboard;
pub mod notifications;
pub mod security;

/// One page of a list query
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// Runs `select` as a 1-based page of `per_page` rows
pub async fn fetch_page<E>(
    db: &DatabaseConnection,
    select: Select<E>,
    page: u64,
    per_page: u64,
) -> Result<Page<E::Model>, ServiceError>
where
    E: EntityTrait,
    E::Model: Sync,
{
    let paginator = select.paginate(db, per_page.max(1));
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page.saturating_sub(1)).await?;
    Ok(Page { items, total })
}

/// Random code drawn from `alphabet`
pub(crate) fn random_code(alphabet: &[u8], len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

pub(crate) fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    )
}
