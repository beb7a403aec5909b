use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::utils::{Validate, validation::require_non_empty};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub laptop_unique_id: String,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinRequest {
    pub laptop_unique_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLostRequest {
    pub laptop_unique_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFoundRequest {
    pub laptop_unique_id: String,
    pub finder_user_id: Uuid,
}

impl Validate for CheckoutRequest {
    fn validate(&self) -> Result<(), AppError> {
        require_non_empty("laptopUniqueId", &self.laptop_unique_id)
    }
}

impl Validate for CheckinRequest {
    fn validate(&self) -> Result<(), AppError> {
        require_non_empty("laptopUniqueId", &self.laptop_unique_id)
    }
}

impl Validate for ReportLostRequest {
    fn validate(&self) -> Result<(), AppError> {
        require_non_empty("laptopUniqueId", &self.laptop_unique_id)
    }
}

impl Validate for ReportFoundRequest {
    fn validate(&self) -> Result<(), AppError> {
        require_non_empty("laptopUniqueId", &self.laptop_unique_id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub user_id: Option<Uuid>,
    pub laptop_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct OverdueQuery {
    /// Minutes
    pub threshold: Option<i64>,
}
