use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::Result;
use crate::lifecycle::DEFAULT_OVERDUE_THRESHOLD_MINUTES;
use crate::models::LaptopStatus;

pub const LOST_FOUND_WINDOW_DAYS: i64 = 30;
pub const LOST_FOUND_LIMIT: i64 = 10;

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_laptops: i64,
    pub available_laptops: i64,
    pub checked_out_laptops: i64,
    pub maintenance_laptops: i64,
    pub overdue_laptops: i64,
}

impl DashboardSummary {
    pub fn from_counts(by_status: impl IntoIterator<Item = (LaptopStatus, i64)>, overdue: i64) -> Self {
        let mut summary = DashboardSummary {
            overdue_laptops: overdue,
            ..Default::default()
        };
        for (status, count) in by_status {
            summary.total_laptops += count;
            match status {
                LaptopStatus::Available => summary.available_laptops += count,
                LaptopStatus::CheckedOut => summary.checked_out_laptops += count,
                LaptopStatus::Maintenance => summary.maintenance_laptops += count,
                LaptopStatus::Retired => {}
            }
        }
        summary
    }

    pub async fn load(pool: &PgPool, now: DateTime<Utc>) -> Result<Self> {
        let by_status: Vec<(LaptopStatus, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) FROM laptops
            WHERE deleted_at IS NULL
            GROUP BY status
            "#,
        )
        .fetch_all(pool)
        .await?;

        let overdue: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM checkouts
            WHERE status = 'active' AND checked_out_at < $1
            "#,
        )
        .bind(now - Duration::minutes(DEFAULT_OVERDUE_THRESHOLD_MINUTES))
        .fetch_one(pool)
        .await?;

        Ok(Self::from_counts(by_status, overdue))
    }
}
