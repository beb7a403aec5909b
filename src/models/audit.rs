use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Checkout,
    Checkin,
    ReportLost,
    ReportFound,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Checkout => "checkout",
            AuditAction::Checkin => "checkin",
            AuditAction::ReportLost => "report_lost",
            AuditAction::ReportFound => "report_found",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub details: Json<Value>,
    pub created_at: DateTime<Utc>,
}

/// Audit entries always describe a laptop.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub user_id: Uuid,
    pub action: AuditAction,
    pub laptop_id: Uuid,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl NewAuditLog {
    pub const ENTITY_TYPE: &'static str = "laptop";
}
