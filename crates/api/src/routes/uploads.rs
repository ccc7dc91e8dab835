//! Upload Routes

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<String>,
}

/// Register local image paths for the next classification run.
///
/// The whole request is rejected if any path is missing or has an
/// unsupported extension.
pub async fn upload_images(
    State(state): State<SharedState>,
    Json(paths): Json<Vec<String>>,
) -> Result<Json<UploadResponse>, ApiError> {
    let accepted = state.uploads.add_all(&paths)?;
    state
        .events
        .record(format!("Received {} images for processing.", accepted.len()));

    Ok(Json(UploadResponse {
        message: format!("Received {} images.", accepted.len()),
        files: accepted.iter().map(|p| p.display().to_string()).collect(),
    }))
}
