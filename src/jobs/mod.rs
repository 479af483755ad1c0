//! Periodic background work: stock scan, overdue sweep, notification
//! dispatch and the failed-login monitor.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, error, info};

use crate::{
    errors::ServiceError, events::outbox::Dispatcher, metrics::record_job_run, AppState,
};

/// Runs `tick` every `period` until the task is aborted. A failed tick is
/// logged and counted; the loop carries on.
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, tick: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(job = name, period_secs = period.as_secs(), "background job started");
        loop {
            interval.tick().await;
            let started = Instant::now();
            let result = tick().await;
            let ok = result.is_ok();
            if let Err(e) = result {
                error!(job = name, error = %e, "background job tick failed");
            }
            record_job_run(name, started.elapsed(), ok);
        }
    })
}

/// Starts every background job; the handles let the caller abort them on shutdown
pub fn spawn_all(state: &AppState) -> Vec<JoinHandle<()>> {
    let cfg = state.config.clone();
    let mut handles = Vec::with_capacity(4);

    let alerts = state.services.alerts.clone();
    handles.push(spawn_periodic(
        "stock_check",
        Duration::from_secs(cfg.low_stock_check_interval_secs),
        move || {
            let alerts = alerts.clone();
            async move {
                let report = alerts.check_stock().await?;
                if report.alerts_opened > 0 {
                    info!(
                        below_minimum = report.parts_below_minimum,
                        opened = report.alerts_opened,
                        "stock check opened alerts"
                    );
                }
                Ok(())
            }
        },
    ));

    let invoices = state.services.invoices.clone();
    handles.push(spawn_periodic(
        "overdue_sweep",
        Duration::from_secs(cfg.overdue_sweep_interval_secs),
        move || {
            let invoices = invoices.clone();
            async move {
                let report = invoices.sweep_overdue().await?;
                debug!(marked = report.marked_overdue, "overdue sweep finished");
                Ok(())
            }
        },
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        state.db.clone(),
        state.mailer.clone(),
        cfg.mail_from.clone(),
    ));
    handles.push(spawn_periodic(
        "notification_dispatch",
        Duration::from_secs(cfg.notification_dispatch_interval_secs),
        move || {
            let dispatcher = dispatcher.clone();
            async move {
                let report = dispatcher.drain_once().await?;
                if report.sent + report.retried + report.failed > 0 {
                    info!(
                        sent = report.sent,
                        retried = report.retried,
                        failed = report.failed,
                        "scheduled notifications dispatched"
                    );
                }
                Ok(())
            }
        },
    ));

    let security = state.services.security.clone();
    handles.push(spawn_periodic(
        "security_monitor",
        Duration::from_secs(cfg.security_monitor_interval_secs),
        move || {
            let security = security.clone();
            async move {
                let report = security.monitor().await?;
                debug!(
                    failed_attempts = report.failed_attempts,
                    alerts = report.alerts_raised,
                    "security monitor pass"
                );
                Ok(())
            }
        },
    ));

    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn failing_tick_does_not_stop_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = spawn_periodic("test_job", Duration::from_secs(5), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(ServiceError::InternalError("first tick fails".into()))
                } else {
                    Ok(())
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(12)).await;
        handle.abort();
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }
}
