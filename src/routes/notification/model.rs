use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::jobs::EmailJob;
use crate::models::{NotificationLog, NotificationStatus, NotificationType};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 500;
pub const LOST_FOUND_BATCH: i64 = 50;
pub const RETRY_BATCH: i64 = 20;
pub const MAX_MANUAL_RETRIES: i32 = 3;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationHistoryQuery {
    pub user_id: Option<Uuid>,
    pub notification_type: Option<NotificationType>,
    pub status: Option<NotificationStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl NotificationHistoryQuery {
    pub fn page(&self) -> Result<(i64, i64)> {
        let limit = self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let offset = self.offset.unwrap_or(0);
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(AppError::validation(format!("limit must be between 1 and {MAX_HISTORY_LIMIT}")));
        }
        if offset < 0 {
            return Err(AppError::validation("offset must not be negative"));
        }
        Ok((limit, offset))
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationHistory {
    pub notifications: Vec<NotificationLog>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStats {
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
    pub pending: i64,
    pub by_type: BTreeMap<String, i64>,
}

impl NotificationStats {
    /// Folds `(status, type, count)` groups. `total` covers pending, sent and failed only.
    pub fn from_groups(groups: impl IntoIterator<Item = (NotificationStatus, NotificationType, i64)>) -> Self {
        let mut stats = NotificationStats::default();
        for (status, notification_type, count) in groups {
            match status {
                NotificationStatus::Sent => stats.sent += count,
                NotificationStatus::Failed => stats.failed += count,
                NotificationStatus::Pending => stats.pending += count,
                NotificationStatus::Bounced => {}
            }
            *stats.by_type.entry(notification_type.as_str().to_string()).or_default() += count;
        }
        stats.total = stats.sent + stats.failed + stats.pending;
        stats
    }
}

/// The job that redelivers a stored log. Overdue reminders are re-derived from their checkout.
pub fn redelivery_job(log: &NotificationLog) -> EmailJob {
    match (log.notification_type, log.related_entity_id) {
        (NotificationType::Overdue, Some(checkout_id)) => EmailJob::OverdueNotification { checkout_id },
        _ => EmailJob::SendNotification {
            notification_log_id: log.id,
        },
    }
}

impl NotificationLog {
    pub async fn history(pool: &PgPool, query: &NotificationHistoryQuery, limit: i64, offset: i64) -> Result<(Vec<Self>, i64)> {
        const FILTER: &str = r#"
            WHERE ($1::uuid IS NULL OR recipient_user_id = $1)
              AND ($2::notification_type IS NULL OR notification_type = $2)
              AND ($3::notification_status IS NULL OR status = $3)
        "#;

        let notifications = sqlx::query_as::<_, NotificationLog>(&format!(
            "SELECT * FROM notification_logs {FILTER} ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(query.user_id)
        .bind(query.notification_type)
        .bind(query.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM notification_logs {FILTER}"))
            .bind(query.user_id)
            .bind(query.notification_type)
            .bind(query.status)
            .fetch_one(pool)
            .await?;

        Ok((notifications, total))
    }

    pub async fn stats(pool: &PgPool) -> Result<NotificationStats> {
        let groups: Vec<(NotificationStatus, NotificationType, i64)> = sqlx::query_as(
            r#"
            SELECT status, notification_type, COUNT(*)
            FROM notification_logs
            GROUP BY status, notification_type
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(NotificationStats::from_groups(groups))
    }

    pub async fn pending_lost_found(pool: &PgPool) -> Result<Vec<Self>> {
        let logs = sqlx::query_as::<_, NotificationLog>(
            r#"
            SELECT * FROM notification_logs
            WHERE notification_type = 'lost_found' AND status = 'pending'
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(LOST_FOUND_BATCH)
        .fetch_all(pool)
        .await?;

        Ok(logs)
    }

    /// Moves a batch of retryable failures back to `pending` and returns them.
    pub async fn reset_failed(pool: &PgPool) -> Result<Vec<Self>> {
        let logs = sqlx::query_as::<_, NotificationLog>(
            r#"
            UPDATE notification_logs
            SET status = 'pending', error_message = NULL
            WHERE id IN (
                SELECT id FROM notification_logs
                WHERE status = 'failed' AND retry_count < $1
                ORDER BY created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(MAX_MANUAL_RETRIES)
        .bind(RETRY_BATCH)
        .fetch_all(pool)
        .await?;

        Ok(logs)
    }
}
