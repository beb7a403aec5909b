use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::{AppError, Result},
    lifecycle::DEFAULT_OVERDUE_THRESHOLD_MINUTES,
    middleware::CurrentUser,
    utils::{ValidJson, ValidQuery, success_to_api_response},
};

use super::model::{
    ActiveQuery, CheckinRequest, CheckoutRequest, HistoryQuery, OverdueQuery, ReportFoundRequest, ReportLostRequest,
};

#[axum::debug_handler]
pub async fn checkout(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CheckoutRequest>,
) -> Result<impl IntoResponse> {
    let checkout = state.lifecycle.checkout(&req.laptop_unique_id, req.user_id).await?;
    Ok(success_to_api_response(
        StatusCode::CREATED,
        checkout,
        "Laptop checked out successfully",
    ))
}

#[axum::debug_handler]
pub async fn checkin(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ValidJson(req): ValidJson<CheckinRequest>,
) -> Result<impl IntoResponse> {
    let checkout = state.lifecycle.checkin(&req.laptop_unique_id, user.id).await?;
    Ok(success_to_api_response(StatusCode::OK, checkout, "Laptop checked in successfully"))
}

#[axum::debug_handler]
pub async fn report_lost(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ValidJson(req): ValidJson<ReportLostRequest>,
) -> Result<impl IntoResponse> {
    let outcome = state.lifecycle.report_lost(&req.laptop_unique_id, user.id).await?;
    let message = outcome.message.clone();
    Ok(success_to_api_response(StatusCode::OK, outcome, &message))
}

#[axum::debug_handler]
pub async fn report_found(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ReportFoundRequest>,
) -> Result<impl IntoResponse> {
    let event = state
        .lifecycle
        .report_found(&req.laptop_unique_id, req.finder_user_id)
        .await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        event,
        "Laptop marked as found and returned successfully",
    ))
}

#[axum::debug_handler]
pub async fn active_checkouts(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ActiveQuery>,
) -> Result<impl IntoResponse> {
    let checkouts = state.lifecycle.active_checkouts(query.user_id).await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        checkouts,
        "Active checkouts retrieved successfully",
    ))
}

#[axum::debug_handler]
pub async fn checkout_history(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<HistoryQuery>,
) -> Result<impl IntoResponse> {
    let checkouts = state
        .lifecycle
        .checkout_history(query.user_id, query.laptop_id)
        .await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        checkouts,
        "Checkout history retrieved successfully",
    ))
}

#[axum::debug_handler]
pub async fn overdue_checkouts(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<OverdueQuery>,
) -> Result<impl IntoResponse> {
    let threshold = query.threshold.unwrap_or(DEFAULT_OVERDUE_THRESHOLD_MINUTES);
    if threshold < 0 {
        return Err(AppError::validation("threshold must not be negative"));
    }

    let checkouts = state.lifecycle.overdue_checkouts(threshold).await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        checkouts,
        "Overdue checkouts retrieved successfully",
    ))
}

#[axum::debug_handler]
pub async fn lost_found_events(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let events = state.lifecycle.lost_found_events().await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        events,
        "Lost/found events retrieved successfully",
    ))
}

#[axum::debug_handler]
pub async fn checkout_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(laptop_unique_id): Path<String>,
) -> Result<impl IntoResponse> {
    let status = state.lifecycle.checkout_status(&laptop_unique_id, user.id).await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        status,
        "Checkout status retrieved successfully",
    ))
}

#[axum::debug_handler]
pub async fn my_current_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse> {
    let checkout = state.lifecycle.current_checkout(user.id).await?;
    let message = if checkout.is_some() {
        "Current checkout retrieved successfully"
    } else {
        "No active checkout"
    };
    Ok(success_to_api_response(StatusCode::OK, checkout, message))
}
