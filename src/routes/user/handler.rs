use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::Result,
    jobs::EmailJob,
    middleware::CurrentUser,
    models::User,
    utils::{ValidJson, message_to_api_response, success_to_api_response},
};

use super::model::{CreateUserRequest, UpdateProfileRequest, UpdateUserRequest};

#[axum::debug_handler]
pub async fn create_user(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CreateUserRequest>,
) -> Result<impl IntoResponse> {
    let (user, invitation) = User::create(&state.pool, req, &state.config.app_url).await?;

    // the account exists either way; a lost invitation can be retried from the notification routes
    if let Err(e) = state
        .tasks
        .submit(EmailJob::SendNotification { notification_log_id: invitation.id })
        .await
    {
        tracing::error!("Failed to queue invitation for user {}: {}", user.id, e);
    }

    Ok(success_to_api_response(StatusCode::CREATED, user, "User created successfully"))
}

#[axum::debug_handler]
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let users = User::list(&state.pool).await?;
    Ok(success_to_api_response(StatusCode::OK, users, "Users retrieved successfully"))
}

#[axum::debug_handler]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse> {
    let user = User::find_by_id(&state.pool, current.id).await?;
    Ok(success_to_api_response(StatusCode::OK, user, "User retrieved successfully"))
}

#[axum::debug_handler]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse> {
    let user = User::update_profile(&state.pool, current.id, req).await?;
    Ok(success_to_api_response(StatusCode::OK, user, "Profile updated successfully"))
}

#[axum::debug_handler]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    let user = User::find_by_id(&state.pool, id).await?;
    Ok(success_to_api_response(StatusCode::OK, user, "User retrieved successfully"))
}

#[axum::debug_handler]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateUserRequest>,
) -> Result<impl IntoResponse> {
    let user = User::update(&state.pool, id, req).await?;
    Ok(success_to_api_response(StatusCode::OK, user, "User updated successfully"))
}

#[axum::debug_handler]
pub async fn delete_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    User::soft_delete(&state.pool, id).await?;
    Ok(message_to_api_response("User deleted successfully"))
}
