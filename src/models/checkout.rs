use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Laptop, UserSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "checkout_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    pub id: Uuid,
    pub laptop_id: Uuid,
    pub user_id: Uuid,
    pub checked_out_at: DateTime<Utc>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub status: CheckoutStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkout {
    pub fn is_active(&self) -> bool {
        self.status == CheckoutStatus::Active
    }
}

/// A checkout with its laptop and holder embedded, as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDetail {
    #[serde(flatten)]
    pub checkout: Checkout,
    pub laptop: Laptop,
    pub user: UserSummary,
}
