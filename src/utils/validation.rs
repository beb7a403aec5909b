use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Query, Request,
        rejection::{JsonRejection, QueryRejection},
    },
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::AppError;

/// Schema checks a request body must pass before it reaches a handler.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

/// JSON body extractor that reports malformed bodies and failed checks as `Validation` errors.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::Validation {
                message: rejection.body_text(),
                details: json!({ "status": rejection.status().as_u16() }),
            })?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

/// Query string extractor reporting unparsable parameters as `Validation` errors.
pub struct ValidQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| AppError::Validation {
                message: rejection.body_text(),
                details: json!({ "query": parts.uri.query().unwrap_or_default() }),
            })?;
        Ok(ValidQuery(value))
    }
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(field_error(field, format!("{field} must not be empty")));
    }
    Ok(())
}

pub fn require_email(field: &str, value: &str) -> Result<(), AppError> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(field_error(field, format!("{field} must be a valid email address")));
    }
    Ok(())
}

pub fn require_min_len(field: &str, value: &str, min: usize) -> Result<(), AppError> {
    if value.chars().count() < min {
        return Err(field_error(field, format!("{field} must be at least {min} characters long")));
    }
    Ok(())
}

fn field_error(field: &str, message: String) -> AppError {
    AppError::Validation {
        details: json!({ "field": field }),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(require_email("email", "jane@example.com").is_ok());
        assert!(require_email("email", "jane@example").is_err());
        assert!(require_email("email", "@example.com").is_err());
        assert!(require_email("email", "jane doe@example.com").is_err());
        assert!(require_email("email", "jane.example.com").is_err());
    }

    #[test]
    fn empty_and_short_values() {
        assert!(require_non_empty("laptopUniqueId", "  ").is_err());
        assert!(require_non_empty("laptopUniqueId", "LAP-1").is_ok());
        assert!(require_min_len("password", "short", 8).is_err());
        assert!(require_min_len("password", "long enough", 8).is_ok());
    }

    #[test]
    fn field_name_is_reported() {
        match require_min_len("password", "x", 8).unwrap_err() {
            AppError::Validation { details, message } => {
                assert_eq!(details["field"], "password");
                assert!(message.contains("8 characters"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
