use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::{
    AppState,
    error::Result,
    models::NotificationLog,
    utils::{ValidQuery, success_to_api_response},
};

use super::model::{NotificationHistory, NotificationHistoryQuery, redelivery_job};

#[axum::debug_handler]
pub async fn notification_history(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<NotificationHistoryQuery>,
) -> Result<impl IntoResponse> {
    let (limit, offset) = query.page()?;
    let (notifications, total) = NotificationLog::history(&state.pool, &query, limit, offset).await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        NotificationHistory {
            notifications,
            total,
            limit,
            offset,
        },
        "Notification history retrieved successfully",
    ))
}

#[axum::debug_handler]
pub async fn notification_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = NotificationLog::stats(&state.pool).await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        stats,
        "Notification statistics retrieved successfully",
    ))
}

#[axum::debug_handler]
pub async fn check_overdue(State(state): State<AppState>) -> Result<impl IntoResponse> {
    tracing::info!("Overdue check triggered manually");
    let report = state.sweep.run_once().await?;
    Ok(success_to_api_response(StatusCode::OK, report, "Overdue check completed"))
}

#[axum::debug_handler]
pub async fn process_lost_found(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let pending = NotificationLog::pending_lost_found(&state.pool).await?;
    tracing::info!("Found {} pending lost/found notifications", pending.len());

    for log in &pending {
        state.tasks.submit(redelivery_job(log)).await?;
    }

    Ok(success_to_api_response(
        StatusCode::OK,
        json!({ "processed": pending.len() }),
        "Pending lost/found notifications queued",
    ))
}

#[axum::debug_handler]
pub async fn retry_failed(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let reset = NotificationLog::reset_failed(&state.pool).await?;
    tracing::info!("Retrying {} failed notifications", reset.len());

    for log in &reset {
        state.tasks.submit(redelivery_job(log)).await?;
    }

    Ok(success_to_api_response(
        StatusCode::OK,
        json!({ "retried": reset.len() }),
        "Failed notifications queued for retry",
    ))
}
