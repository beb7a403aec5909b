use axum::{Json, http::StatusCode};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Role, User};
use crate::result::ApiResponse;

pub mod qr;
pub mod validation;

pub use validation::{ValidJson, ValidQuery, Validate};

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user id
    pub email: String,
    pub role: Role,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn issue_token(user: &User, kind: TokenKind, config: &Config) -> Result<String, jsonwebtoken::errors::Error> {
    let (secret, lifetime) = match kind {
        TokenKind::Access => (&config.jwt_secret, config.jwt_expiration_secs),
        TokenKind::Refresh => (&config.jwt_refresh_secret, config.jwt_refresh_expiration_secs),
    };
    let now = Utc::now();
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        kind,
        exp: (now + Duration::seconds(lifetime as i64)).timestamp(),
        iat: now.timestamp(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

pub fn generate_token_pair(user: &User, config: &Config) -> Result<TokenPair, jsonwebtoken::errors::Error> {
    Ok(TokenPair {
        access_token: issue_token(user, TokenKind::Access, config)?,
        refresh_token: issue_token(user, TokenKind::Refresh, config)?,
    })
}

fn verify_token(token: &str, kind: TokenKind, config: &Config) -> Result<Claims, AppError> {
    let secret = match kind {
        TokenKind::Access => &config.jwt_secret,
        TokenKind::Refresh => &config.jwt_refresh_secret,
    };
    let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map_err(|e| {
            tracing::debug!("Token rejected: {}", e);
            AppError::unauthorized(error_codes::AUTH_INVALID_TOKEN, "Invalid or expired token")
        })?
        .claims;

    // an access token must not be accepted where a refresh token is expected, and vice versa
    if claims.kind != kind {
        return Err(AppError::unauthorized(error_codes::AUTH_INVALID_TOKEN, "Invalid or expired token"));
    }
    Ok(claims)
}

pub fn verify_access_token(token: &str, config: &Config) -> Result<Claims, AppError> {
    verify_token(token, TokenKind::Access, config)
}

pub fn verify_refresh_token(token: &str, config: &Config) -> Result<Claims, AppError> {
    verify_token(token, TokenKind::Refresh, config)
}

/// `LAP-` followed by 8 random bytes as uppercase hex.
pub fn generate_laptop_unique_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
    format!("LAP-{}", hex)
}

pub fn success_to_api_response<T: Serialize>(
    status: StatusCode,
    data: T,
    message: &str,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (status, Json(ApiResponse::success(data, message)))
}

pub fn message_to_api_response(message: &str) -> (StatusCode, Json<ApiResponse<()>>) {
    (StatusCode::OK, Json(ApiResponse::message(message)))
}

pub mod error_codes {
    pub const NOT_FOUND_LAPTOP: &str = "NOT_FOUND_LAPTOP";
    pub const NOT_FOUND_USER: &str = "NOT_FOUND_USER";
    pub const NOT_FOUND_CHECKOUT: &str = "NOT_FOUND_CHECKOUT";
    pub const NOT_FOUND_NOTIFICATION: &str = "NOT_FOUND_NOTIFICATION";
    pub const VAL_LAPTOP_NOT_AVAILABLE: &str = "VAL_LAPTOP_NOT_AVAILABLE";
    pub const VAL_LAPTOP_NOT_CHECKED_OUT: &str = "VAL_LAPTOP_NOT_CHECKED_OUT";
    pub const VAL_INVALID_INPUT: &str = "VAL_INVALID_INPUT";
    pub const BIZ_USER_HAS_ACTIVE_CHECKOUT: &str = "BIZ_USER_HAS_ACTIVE_CHECKOUT";
    pub const BIZ_EMAIL_ALREADY_EXISTS: &str = "BIZ_EMAIL_ALREADY_EXISTS";
    pub const PERM_UNAUTHORIZED_CHECKIN: &str = "PERM_UNAUTHORIZED_CHECKIN";
    pub const PERM_UNAUTHORIZED_ACTION: &str = "PERM_UNAUTHORIZED_ACTION";
    pub const PERM_ADMIN_REQUIRED: &str = "PERM_ADMIN_REQUIRED";
    pub const AUTH_INVALID_CREDENTIALS: &str = "AUTH_INVALID_CREDENTIALS";
    pub const AUTH_INVALID_TOKEN: &str = "AUTH_INVALID_TOKEN";
    pub const AUTH_USER_NOT_FOUND: &str = "AUTH_USER_NOT_FOUND";
    pub const SRV_QR_GENERATION_FAILED: &str = "SRV_QR_GENERATION_FAILED";
    pub const SRV_INTERNAL_ERROR: &str = "SRV_INTERNAL_ERROR";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "admin@example.com".into(),
            password_hash: String::new(),
            name: "Admin".into(),
            role,
            group_name: None,
            team: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn unique_id_has_expected_shape() {
        let id = generate_laptop_unique_id();
        assert_eq!(id.len(), 20);
        assert!(id.starts_with("LAP-"));
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(id, generate_laptop_unique_id());
    }

    #[test]
    fn access_token_round_trip() {
        let config = Config::with_defaults("postgres://localhost/laptops", "redis://127.0.0.1/", "test-secret");
        let admin = user(Role::Admin);
        let pair = generate_token_pair(&admin, &config).unwrap();

        let claims = verify_access_token(&pair.access_token, &config).unwrap();
        assert_eq!(claims.sub, admin.id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let config = Config::with_defaults("postgres://localhost/laptops", "redis://127.0.0.1/", "test-secret");
        let pair = generate_token_pair(&user(Role::Interviewer), &config).unwrap();

        assert!(verify_access_token(&pair.refresh_token, &config).is_err());
        assert!(verify_refresh_token(&pair.access_token, &config).is_err());
        assert!(verify_refresh_token(&pair.refresh_token, &config).is_ok());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let config = Config::with_defaults("postgres://localhost/laptops", "redis://127.0.0.1/", "test-secret");
        let pair = generate_token_pair(&user(Role::Interviewer), &config).unwrap();
        let err = verify_access_token(&format!("{}x", pair.access_token), &config).unwrap_err();
        assert_eq!(err.code(), error_codes::AUTH_INVALID_TOKEN);
    }

    #[test]
    fn password_hash_verifies() {
        let hashed = hash_password("Correct-Horse-1").unwrap();
        assert!(verify_password("Correct-Horse-1", &hashed).unwrap());
        assert!(!verify_password("wrong", &hashed).unwrap());
    }
}
