use axum::{extract::State, http::StatusCode, response::IntoResponse};
use chrono::Duration;

use crate::{
    AppState,
    error::Result,
    lifecycle::DEFAULT_OVERDUE_THRESHOLD_MINUTES,
    utils::success_to_api_response,
};

use super::model::{DashboardSummary, LOST_FOUND_LIMIT, LOST_FOUND_WINDOW_DAYS};

#[axum::debug_handler]
pub async fn summary(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let now = state.lifecycle.clock().now();
    let summary = DashboardSummary::load(&state.pool, now).await?;
    Ok(success_to_api_response(StatusCode::OK, summary, "Dashboard summary retrieved successfully"))
}

#[axum::debug_handler]
pub async fn active_checkouts(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let checkouts = state.lifecycle.active_checkouts(None).await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        checkouts,
        "Active checkouts retrieved successfully",
    ))
}

#[axum::debug_handler]
pub async fn overdue(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let checkouts = state
        .lifecycle
        .overdue_checkouts(DEFAULT_OVERDUE_THRESHOLD_MINUTES)
        .await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        checkouts,
        "Overdue checkouts retrieved successfully",
    ))
}

#[axum::debug_handler]
pub async fn lost_found(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let since = state.lifecycle.clock().now() - Duration::days(LOST_FOUND_WINDOW_DAYS);
    let events = state
        .store
        .list_lost_found_events(Some(since), Some(LOST_FOUND_LIMIT))
        .await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        events,
        "Lost/found events retrieved successfully",
    ))
}
