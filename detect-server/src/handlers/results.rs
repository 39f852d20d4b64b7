//! Result lookup handler

use axum::extract::{Path, State};
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::inference::Detector;
use crate::models::ProcessedImage;
use crate::AppState;

/// GET /api/results/:id - fetch a previously processed image
pub async fn get<D: Detector>(
    State(state): State<AppState<D>>,
    Path(id): Path<String>,
) -> AppResult<Json<ProcessedImage>> {
    let image = state
        .cache
        .get(&id)
        .ok_or_else(|| AppError::NotFound("Result not found".to_string()))?;

    Ok(Json(image))
}
