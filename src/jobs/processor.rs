use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use super::EmailJob;
use super::email::{self, Mailer, OutgoingEmail, OverdueReminder};
use crate::error::AppError;
use crate::lifecycle::{Clock, Datastore};
use crate::models::{NewNotification, NotificationStatus, NotificationType, OverdueDedupKey};

/// Window in which an overdue reminder for the same checkout is not repeated.
pub const OVERDUE_DEDUP_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Sent { notification_log_id: Uuid },
    Skipped { reason: &'static str },
}

/// Renders and sends the email behind a job, keeping its notification log in step.
pub struct EmailProcessor {
    store: Arc<dyn Datastore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
}

impl EmailProcessor {
    pub fn new(store: Arc<dyn Datastore>, mailer: Arc<dyn Mailer>, clock: Arc<dyn Clock>) -> Self {
        Self { store, mailer, clock }
    }

    /// An `Err` means the attempt failed and the job should be retried.
    pub async fn process(&self, job: &EmailJob) -> Result<JobOutcome, AppError> {
        match job {
            EmailJob::SendNotification { notification_log_id } => self.send_notification(*notification_log_id).await,
            EmailJob::OverdueNotification { checkout_id } => self.send_overdue(*checkout_id).await,
        }
    }

    async fn send_notification(&self, id: Uuid) -> Result<JobOutcome, AppError> {
        let Some(log) = self.store.notification(id).await? else {
            tracing::warn!("Notification {} not found, dropping job", id);
            return Ok(JobOutcome::Skipped { reason: "notification not found" });
        };

        if log.status == NotificationStatus::Sent {
            tracing::debug!("Notification {} already sent", id);
            return Ok(JobOutcome::Skipped { reason: "already sent" });
        }

        let email = email::from_stored(&log.recipient_email, &log.subject, &log.body);
        self.deliver(log.id, &email).await
    }

    async fn send_overdue(&self, checkout_id: Uuid) -> Result<JobOutcome, AppError> {
        let detail = match self.store.checkout_detail(checkout_id).await? {
            Some(detail) if detail.checkout.is_active() => detail,
            _ => {
                tracing::warn!("Checkout {} not found or not active", checkout_id);
                return Ok(JobOutcome::Skipped { reason: "checkout not active" });
            }
        };

        let now = self.clock.now();
        let email = email::overdue_reminder(
            &OverdueReminder {
                user_email: &detail.user.email,
                user_name: &detail.user.name,
                laptop_unique_id: &detail.laptop.unique_id,
                make: &detail.laptop.make,
                model: &detail.laptop.model,
                checked_out_at: detail.checkout.checked_out_at,
            },
            now,
        );

        let key = OverdueDedupKey {
            recipient_user_id: detail.user.id,
            checkout_id,
        };
        let since = now - Duration::hours(OVERDUE_DEDUP_WINDOW_HOURS);

        // a redelivered job reuses the log its first attempt wrote
        let log = match self.store.recent_overdue_notification(&key, since).await? {
            Some(log) if log.status == NotificationStatus::Sent => {
                return Ok(JobOutcome::Skipped { reason: "already reminded" });
            }
            Some(log) => log,
            None => {
                self.store
                    .insert_notification(NewNotification {
                        notification_type: NotificationType::Overdue,
                        recipient_email: detail.user.email.clone(),
                        recipient_user_id: Some(detail.user.id),
                        subject: email.subject.clone(),
                        body: email.text.clone(),
                        related_entity_type: Some(OverdueDedupKey::ENTITY_TYPE.to_string()),
                        related_entity_id: Some(checkout_id),
                        created_at: now,
                    })
                    .await?
            }
        };

        self.deliver(log.id, &email).await
    }

    async fn deliver(&self, log_id: Uuid, email: &OutgoingEmail) -> Result<JobOutcome, AppError> {
        match self.mailer.send(email).await {
            Ok(()) => {
                self.store.mark_notification_sent(log_id, self.clock.now()).await?;
                Ok(JobOutcome::Sent { notification_log_id: log_id })
            }
            Err(e) => {
                tracing::error!("Failed to send notification {}: {}", log_id, e);
                self.store
                    .mark_notification_failed(log_id, &e.to_string(), self.clock.now())
                    .await?;
                Err(e)
            }
        }
    }
}
