use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::User;
use crate::utils::{
    Validate,
    validation::{require_email, require_non_empty},
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<()> {
        require_email("email", &self.email)?;
        require_non_empty("password", &self.password)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

impl Validate for RefreshTokenRequest {
    fn validate(&self) -> Result<()> {
        require_non_empty("refreshToken", &self.refresh_token)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}
