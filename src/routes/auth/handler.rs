use axum::{Extension, extract::State, http::StatusCode, response::IntoResponse};

use crate::{
    AppState,
    error::{AppError, Result},
    middleware::CurrentUser,
    utils::{
        ValidJson, error_codes, generate_token_pair, message_to_api_response, success_to_api_response,
        verify_password, verify_refresh_token,
    },
};

use super::model::{LoginRequest, LoginResponse, RefreshTokenRequest};

fn invalid_credentials() -> AppError {
    AppError::unauthorized(error_codes::AUTH_INVALID_CREDENTIALS, "Invalid email or password")
}

fn token_error(e: jsonwebtoken::errors::Error) -> AppError {
    AppError::internal(format!("sign token: {e}"))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    // unknown email and wrong password are indistinguishable to the caller
    let user = state
        .store
        .user_by_email(&req.email)
        .await?
        .ok_or_else(invalid_credentials)?;

    let valid = verify_password(&req.password, &user.password_hash).map_err(|e| {
        tracing::warn!("Stored password hash for {} is unreadable: {}", user.id, e);
        invalid_credentials()
    })?;
    if !valid {
        return Err(invalid_credentials());
    }

    let tokens = generate_token_pair(&user, &state.config).map_err(token_error)?;
    tracing::info!("User {} logged in", user.id);

    Ok(success_to_api_response(
        StatusCode::OK,
        LoginResponse {
            user,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        },
        "Login successful",
    ))
}

#[axum::debug_handler]
pub async fn refresh_token(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RefreshTokenRequest>,
) -> Result<impl IntoResponse> {
    let claims = verify_refresh_token(&req.refresh_token, &state.config)?;
    let user = state
        .store
        .user_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized(error_codes::AUTH_USER_NOT_FOUND, "User not found"))?;

    let tokens = generate_token_pair(&user, &state.config).map_err(token_error)?;
    Ok(success_to_api_response(StatusCode::OK, tokens, "Token refreshed successfully"))
}

#[axum::debug_handler]
pub async fn me(Extension(user): Extension<CurrentUser>) -> Result<impl IntoResponse> {
    Ok(success_to_api_response(StatusCode::OK, user, "User retrieved successfully"))
}

/// Tokens are stateless; the client discards them.
#[axum::debug_handler]
pub async fn logout(Extension(user): Extension<CurrentUser>) -> Result<impl IntoResponse> {
    tracing::info!("User {} logged out", user.id);
    Ok(message_to_api_response("Logout successful"))
}
