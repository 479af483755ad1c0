//! Outbox delivery: exclusive claims and the retry ladder.

mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use common::TestApp;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};
use sms_api::{
    entities::scheduled_notification,
    events::outbox::{self, DispatchReport, Dispatcher, OutboundMessage, MAX_ATTEMPTS},
    notifications::{EmailMessage, MailError, Mailer},
};

/// Takes its time so a second dispatcher can run while a send is in flight
#[derive(Default)]
struct SlowMailer {
    sends: AtomicUsize,
}

#[async_trait]
impl Mailer for SlowMailer {
    async fn send(&self, _message: &EmailMessage) -> Result<(), MailError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(400)).await;
        Ok(())
    }
}

#[derive(Default)]
struct DownMailer {
    attempts: AtomicUsize,
}

#[async_trait]
impl Mailer for DownMailer {
    async fn send(&self, _message: &EmailMessage) -> Result<(), MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(MailError::Rejected {
            status: 503,
            body: "relay down".to_string(),
        })
    }
}

async fn enqueue_one(app: &TestApp) -> scheduled_notification::Model {
    outbox::enqueue(
        &*app.state.db,
        OutboundMessage::email("master.9074729@fleet.test", "Low stock", "Fuel filters"),
    )
    .await
    .expect("enqueue notification")
}

#[tokio::test]
async fn a_claimed_row_is_sent_by_one_dispatcher() {
    let app = TestApp::new().await;
    enqueue_one(&app).await;

    let mailer = Arc::new(SlowMailer::default());
    let first = Dispatcher::new(app.state.db.clone(), mailer.clone(), "sms@sms.test".to_string());
    let second = first.clone();
    let late = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        second.drain_once().await
    };

    let (early, late) = tokio::join!(first.drain_once(), late);
    let sent = early.expect("first drain").sent + late.expect("second drain").sent;
    assert_eq!(sent, 1);
    assert_eq!(mailer.sends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn delivery_gives_up_after_max_attempts() {
    let app = TestApp::new().await;
    let row = enqueue_one(&app).await;

    let mailer = Arc::new(DownMailer::default());
    let dispatcher = Dispatcher::new(app.state.db.clone(), mailer.clone(), "sms@sms.test".to_string());

    for attempt in 1..=MAX_ATTEMPTS {
        let report = dispatcher.drain_once().await.expect("drain");
        if attempt < MAX_ATTEMPTS {
            assert_eq!(report.retried, 1, "attempt {}", attempt);
        } else {
            assert_eq!(report.failed, 1);
        }
        // skip the backoff so the next drain sees the row as due
        scheduled_notification::Entity::update_many()
            .col_expr(
                scheduled_notification::Column::DeliverAfter,
                Expr::value(Utc::now() - chrono::Duration::seconds(1)),
            )
            .filter(scheduled_notification::Column::Id.eq(row.id))
            .exec(&*app.state.db)
            .await
            .expect("rewind deliver_after");
    }

    let stored = scheduled_notification::Entity::find_by_id(row.id)
        .one(&*app.state.db)
        .await
        .expect("load notification")
        .expect("notification row");
    assert_eq!(stored.status, "failed");
    assert_eq!(stored.attempts, MAX_ATTEMPTS);
    assert!(stored.last_error.is_some());

    // a failed row is never picked up again
    let report = dispatcher.drain_once().await.expect("drain");
    assert_eq!(report, DispatchReport::default());
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), MAX_ATTEMPTS as usize);
}
