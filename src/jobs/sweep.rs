use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::processor::OVERDUE_DEDUP_WINDOW_HOURS;
use super::{EmailJob, TaskQueue};
use crate::error::AppError;
use crate::lifecycle::{CheckoutFilter, CheckoutOrder, Clock, Datastore};
use crate::models::OverdueDedupKey;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Active checkouts past the threshold, reminded or not
    pub overdue_count: usize,
    pub queued: usize,
    /// Checkouts a reminder was queued for, oldest first
    #[serde(skip)]
    pub queued_checkouts: Vec<Uuid>,
}

/// Periodically queues one overdue reminder per active checkout past the threshold.
pub struct OverdueSweep {
    store: Arc<dyn Datastore>,
    tasks: Arc<dyn TaskQueue>,
    clock: Arc<dyn Clock>,
    threshold_minutes: i64,
}

impl OverdueSweep {
    pub fn new(store: Arc<dyn Datastore>, tasks: Arc<dyn TaskQueue>, clock: Arc<dyn Clock>, threshold_minutes: i64) -> Self {
        Self {
            store,
            tasks,
            clock,
            threshold_minutes,
        }
    }

    pub async fn run_once(&self) -> Result<SweepReport, AppError> {
        let now = self.clock.now();
        let overdue = self
            .store
            .list_checkouts(&CheckoutFilter {
                active_only: true,
                checked_out_before: Some(now - Duration::minutes(self.threshold_minutes)),
                order: CheckoutOrder::OldestFirst,
                ..Default::default()
            })
            .await?;

        let since = now - Duration::hours(OVERDUE_DEDUP_WINDOW_HOURS);
        let mut report = SweepReport {
            overdue_count: overdue.len(),
            ..Default::default()
        };

        for detail in overdue {
            let key = OverdueDedupKey {
                recipient_user_id: detail.checkout.user_id,
                checkout_id: detail.checkout.id,
            };
            if self.store.recent_overdue_notification(&key, since).await?.is_some() {
                tracing::debug!("Checkout {} already reminded in the last 24h", detail.checkout.id);
                continue;
            }

            self.tasks
                .submit(EmailJob::OverdueNotification {
                    checkout_id: detail.checkout.id,
                })
                .await?;
            report.queued += 1;
            report.queued_checkouts.push(detail.checkout.id);
        }

        tracing::info!(
            "Overdue sweep found {} checkouts, queued {} reminders",
            report.overdue_count,
            report.queued
        );
        Ok(report)
    }

    pub fn spawn(self: Arc<Self>, every: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!("Overdue sweep failed: {}", e);
                }
            }
        })
    }
}
