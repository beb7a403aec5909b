use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "laptop_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LaptopStatus {
    Available,
    CheckedOut,
    Maintenance,
    Retired,
}

impl LaptopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaptopStatus::Available => "available",
            LaptopStatus::CheckedOut => "checked_out",
            LaptopStatus::Maintenance => "maintenance",
            LaptopStatus::Retired => "retired",
        }
    }
}

impl std::fmt::Display for LaptopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Laptop {
    pub id: Uuid,
    /// `LAP-` followed by 16 hex characters, encoded into the scan URL. Never changes.
    pub unique_id: String,
    pub serial_number: String,
    pub make: String,
    pub model: String,
    pub status: LaptopStatus,
    pub qr_code_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}
