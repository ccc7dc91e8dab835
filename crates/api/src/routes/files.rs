//! Uploaded file listing

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub total_files: usize,
    pub files: Vec<String>,
}

pub async fn list_files(State(state): State<SharedState>) -> Result<Json<FilesResponse>, ApiError> {
    let files = state.uploads.list();
    if files.is_empty() {
        return Err(ApiError::NotFound("No uploaded image files found".to_string()));
    }

    state
        .events
        .record(format!("Returning {} uploaded images.", files.len()));

    Ok(Json(FilesResponse {
        total_files: files.len(),
        files: files.iter().map(|p| p.display().to_string()).collect(),
    }))
}
