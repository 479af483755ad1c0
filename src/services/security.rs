use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::notifications::{NewNotification, NotificationService};
use super::{fetch_page, Page};
use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::entities::login_attempt;
use crate::entities::security_alert::{self, SecurityAlertKind};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct MonitorReport {
    pub failed_attempts: usize,
    pub alerts_raised: usize,
}

/// Failure counts per subject, keeping only those at or above `threshold`
pub fn offenders<'a>(
    subjects: impl Iterator<Item = &'a str>,
    threshold: u64,
) -> Vec<(String, u64)> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for subject in subjects {
        *counts.entry(subject).or_default() += 1;
    }
    let mut over: Vec<(String, u64)> = counts
        .into_iter()
        .filter(|(_, n)| *n >= threshold)
        .map(|(s, n)| (s.to_string(), n))
        .collect();
    over.sort();
    over
}

/// Watches `login_attempts` for brute-force patterns
#[derive(Clone)]
pub struct SecurityService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    notifications: Arc<NotificationService>,
    event_sender: EventSender,
}

impl SecurityService {
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

    /// One pass of the monitor. A subject is alerted at most once per window.
    #[instrument(skip(self))]
    pub async fn monitor(&self) -> Result<MonitorReport, ServiceError> {
        let window_start = Utc::now() - Duration::minutes(self.config.security_window_minutes);
        let threshold = self.config.security_failed_login_threshold.max(1);

        let failures = login_attempt::Entity::find()
            .filter(login_attempt::Column::Success.eq(false))
            .filter(login_attempt::Column::CreatedAt.gte(window_start))
            .all(&*self.db)
            .await?;

        let mut report = MonitorReport {
            failed_attempts: failures.len(),
            alerts_raised: 0,
        };
        let by_email = offenders(failures.iter().map(|a| a.email.as_str()), threshold);
        let by_ip = offenders(
            failures.iter().filter_map(|a| a.ip_address.as_deref()),
            threshold,
        );

        let candidates = by_email
            .into_iter()
            .map(|(s, n)| (SecurityAlertKind::FailedLoginEmail, s, n))
            .chain(
                by_ip
                    .into_iter()
                    .map(|(s, n)| (SecurityAlertKind::FailedLoginIp, s, n)),
            );
        for (kind, subject, count) in candidates {
            if self.raise(kind, &subject, count, window_start).await? {
                report.alerts_raised += 1;
            }
        }
        if report.alerts_raised > 0 {
            warn!(alerts = report.alerts_raised, "security alerts raised");
        }
        Ok(report)
    }

    async fn raise(
        &self,
        kind: SecurityAlertKind,
        subject: &str,
        count: u64,
        window_start: chrono::DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let recent = security_alert::Entity::find()
            .filter(security_alert::Column::Kind.eq(kind.to_string()))
            .filter(security_alert::Column::Subject.eq(subject))
            .filter(security_alert::Column::CreatedAt.gte(window_start))
            .one(&*self.db)
            .await?;
        if recent.is_some() {
            return Ok(false);
        }

        let alert = security_alert::ActiveModel {
            id: Set(Uuid::new_v4()),
            kind: Set(kind.to_string()),
            subject: Set(subject.to_string()),
            attempt_count: Set(i32::try_from(count).unwrap_or(i32::MAX)),
            acknowledged: Set(false),
            acknowledged_by: Set(None),
            acknowledged_at: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        let what = match kind {
            SecurityAlertKind::FailedLoginEmail => "account",
            SecurityAlertKind::FailedLoginIp => "address",
        };
        self.notifications
            .notify_admins(
                &*self.db,
                NewNotification::new(
                    "security_alert",
                    format!("Repeated failed logins for {} {}", what, subject),
                    format!(
                        "{} failed login attempts in the last {} minutes.",
                        count, self.config.security_window_minutes
                    ),
                )
                .about("security_alert", alert.id),
            )
            .await?;

        info!(alert_id = %alert.id, kind = %kind, subject, count, "security alert recorded");
        self.event_sender.emit(Event::SecurityAlertRaised {
            alert_id: alert.id,
            kind: alert.kind,
            subject: alert.subject,
        });
        Ok(true)
    }

    pub async fn list(
        &self,
        acknowledged: Option<bool>,
        page: u64,
        per_page: u64,
    ) -> Result<Page<security_alert::Model>, ServiceError> {
        let mut query = security_alert::Entity::find();
        if let Some(ack) = acknowledged {
            query = query.filter(security_alert::Column::Acknowledged.eq(ack));
        }
        fetch_page(
            &self.db,
            query.order_by_desc(security_alert::Column::CreatedAt),
            page,
            per_page,
        )
        .await
    }

    pub async fn acknowledge(
        &self,
        admin: &AuthUser,
        id: Uuid,
    ) -> Result<security_alert::Model, ServiceError> {
        let alert = security_alert::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Security alert", id))?;
        if alert.acknowledged {
            return Ok(alert);
        }
        let mut active: security_alert::ActiveModel = alert.into();
        active.acknowledged = Set(true);
        active.acknowledged_by = Set(Some(admin.user_id));
        active.acknowledged_at = Set(Some(Utc::now()));
        Ok(active.update(&*self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offenders_respect_threshold() {
        let attempts = [
            "a@x.io", "b@x.io", "a@x.io", "a@x.io", "c@x.io", "b@x.io",
        ];
        let over = offenders(attempts.iter().copied(), 2);
        assert_eq!(
            over,
            vec![("a@x.io".to_string(), 3), ("b@x.io".to_string(), 2)]
        );
        assert!(offenders(attempts.iter().copied(), 4).is_empty());
    }
}
