use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, Result},
    models::Laptop,
    utils::{ValidJson, ValidQuery, error_codes, message_to_api_response, qr, success_to_api_response},
};

use super::model::{CreateLaptopRequest, LaptopHistory, ListLaptopsQuery, UpdateLaptopRequest};

#[axum::debug_handler]
pub async fn create_laptop(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CreateLaptopRequest>,
) -> Result<impl IntoResponse> {
    let laptop = Laptop::create(&state.pool, req, &state.config.app_url).await?;
    Ok(success_to_api_response(StatusCode::CREATED, laptop, "Laptop created successfully"))
}

#[axum::debug_handler]
pub async fn list_laptops(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ListLaptopsQuery>,
) -> Result<impl IntoResponse> {
    let laptops = Laptop::list(&state.pool, query.include_retired).await?;
    Ok(success_to_api_response(StatusCode::OK, laptops, "Laptops retrieved successfully"))
}

#[axum::debug_handler]
pub async fn get_laptop(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    let laptop = Laptop::find_by_id(&state.pool, id).await?;
    Ok(success_to_api_response(StatusCode::OK, laptop, "Laptop retrieved successfully"))
}

#[axum::debug_handler]
pub async fn get_laptop_by_unique_id(
    State(state): State<AppState>,
    Path(unique_id): Path<String>,
) -> Result<impl IntoResponse> {
    let laptop = state.store.laptop_by_unique_id(&unique_id).await?.ok_or_else(|| {
        AppError::not_found(
            error_codes::NOT_FOUND_LAPTOP,
            format!("Laptop with unique ID {unique_id} not found"),
        )
    })?;
    Ok(success_to_api_response(StatusCode::OK, laptop, "Laptop retrieved successfully"))
}

#[axum::debug_handler]
pub async fn update_laptop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateLaptopRequest>,
) -> Result<impl IntoResponse> {
    let laptop = Laptop::update(&state.pool, id, req).await?;
    Ok(success_to_api_response(StatusCode::OK, laptop, "Laptop updated successfully"))
}

#[axum::debug_handler]
pub async fn delete_laptop(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    Laptop::soft_delete(&state.pool, id).await?;
    Ok(message_to_api_response("Laptop deleted successfully"))
}

#[axum::debug_handler]
pub async fn laptop_history(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    let laptop = Laptop::find_by_id(&state.pool, id).await?;
    let checkouts = state.lifecycle.checkout_history(None, Some(laptop.id)).await?;
    Ok(success_to_api_response(
        StatusCode::OK,
        LaptopHistory { laptop, checkouts },
        "Laptop history retrieved successfully",
    ))
}

/// The scan QR code as a standalone SVG, for printing labels.
#[axum::debug_handler]
pub async fn laptop_qr_code(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    let laptop = Laptop::find_by_id(&state.pool, id).await?;
    let svg = qr::render_svg(&qr::scan_url(&state.config.app_url, &laptop.unique_id))?;
    let disposition = format!("inline; filename=\"{}.svg\"", laptop.unique_id);

    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        svg,
    ))
}
