use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::utils::error_codes;

#[derive(Debug, Error)]
pub enum AppError {
    /// Laptop, user or checkout absent (or soft-deleted)
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// Laptop status precondition violated
    #[error("{message}")]
    InvalidState { code: &'static str, message: String },

    /// Business rule collision, e.g. a user already holding a laptop
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// Identity mismatch or missing role
    #[error("{message}")]
    Forbidden { code: &'static str, message: String },

    #[error("{message}")]
    Unauthorized { code: &'static str, message: String },

    /// Request body or query failed schema checks
    #[error("{message}")]
    Validation { message: String, details: Value },

    #[error("{message}")]
    RateLimited { message: String },

    #[error("Failed to {operation}")]
    Internal { code: &'static str, operation: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        AppError::NotFound { code, message: message.into() }
    }

    pub fn invalid_state(code: &'static str, message: impl Into<String>) -> Self {
        AppError::InvalidState { code, message: message.into() }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Conflict { code, message: message.into() }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Forbidden { code, message: message.into() }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Unauthorized { code, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation { message: message.into(), details: Value::Object(Default::default()) }
    }

    pub fn internal(operation: impl Into<String>) -> Self {
        AppError::Internal { code: error_codes::SRV_INTERNAL_ERROR, operation: operation.into() }
    }

    /// Turns a unique-constraint violation into a `Conflict`, anything else stays a database error.
    pub fn conflict_on_unique(err: sqlx::Error, code: &'static str, message: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::conflict(code, message),
            _ => AppError::Database(err),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { code, .. }
            | AppError::InvalidState { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Unauthorized { code, .. }
            | AppError::Internal { code, .. } => code,
            AppError::Validation { .. } => error_codes::VAL_INVALID_INPUT,
            AppError::RateLimited { .. } => error_codes::RATE_LIMITED,
            AppError::Database(_) | AppError::Redis(_) => error_codes::SRV_INTERNAL_ERROR,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::InvalidState { .. } | AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal { .. } | AppError::Database(_) | AppError::Redis(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to callers. Internal failures are not described.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Internal { code, .. } if *code == error_codes::SRV_QR_GENERATION_FAILED => {
                "Failed to generate QR code".to_string()
            }
            AppError::Internal { .. } | AppError::Database(_) | AppError::Redis(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    fn details(&self) -> Value {
        match self {
            AppError::Validation { details, .. } => details.clone(),
            _ => Value::Object(Default::default()),
        }
    }
}

/// The `error` member of a failure envelope. Attached to the response extensions
/// so the envelope middleware can stamp the request path onto it.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(error: ErrorBody) -> Self {
        Self { success: false, error }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal { .. } | AppError::Database(_) | AppError::Redis(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            AppError::Unauthorized { .. } | AppError::Forbidden { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            AppError::Conflict { .. } | AppError::InvalidState { .. } => {
                tracing::warn!("Rejected state change: {}", self);
            }
            AppError::NotFound { .. } | AppError::Validation { .. } | AppError::RateLimited { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.user_message(),
            details: self.details(),
            timestamp: Utc::now(),
            path: None,
        };

        let mut response = (self.status_code(), Json(ErrorEnvelope::new(body.clone()))).into_response();
        response.extensions_mut().insert(body);
        response
    }
}
