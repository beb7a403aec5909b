use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::{Laptop, UserSummary};

/// Written once when a lost laptop is reported found. Never updated.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LostFoundEvent {
    pub id: Uuid,
    pub laptop_id: Uuid,
    pub checkout_id: Uuid,
    pub original_user_id: Uuid,
    pub finder_user_id: Uuid,
    pub event_timestamp: DateTime<Utc>,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct NewLostFoundEvent {
    pub laptop_id: Uuid,
    pub checkout_id: Uuid,
    pub original_user_id: Uuid,
    pub finder_user_id: Uuid,
    pub event_timestamp: DateTime<Utc>,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LostFoundEventDetail {
    #[serde(flatten)]
    pub event: LostFoundEvent,
    pub laptop: Laptop,
    pub original_user: UserSummary,
    pub finder_user: UserSummary,
}
