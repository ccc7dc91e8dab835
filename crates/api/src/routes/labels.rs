//! Label Routes

use axum::{
    extract::{Form, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::SharedState;

/// Form body for adding a label
#[derive(Debug, Deserialize)]
pub struct LabelForm {
    pub label: String,
}

/// Query parameters for removing a label
#[derive(Debug, Deserialize)]
pub struct LabelQuery {
    pub label: String,
}

#[derive(Debug, Serialize)]
pub struct LabelsResponse {
    pub labels: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LabelChangeResponse {
    pub message: String,
    pub labels: Vec<String>,
}

/// List labels in insertion order
pub async fn list_labels(State(state): State<SharedState>) -> Json<LabelsResponse> {
    Json(LabelsResponse {
        labels: state.labels.list(),
    })
}

pub async fn add_label(
    State(state): State<SharedState>,
    Form(form): Form<LabelForm>,
) -> Result<Json<LabelChangeResponse>, ApiError> {
    let labels = state.labels.add(&form.label)?;
    Ok(Json(LabelChangeResponse {
        message: format!("Added label: {}", form.label),
        labels,
    }))
}

pub async fn remove_label(
    State(state): State<SharedState>,
    Query(query): Query<LabelQuery>,
) -> Result<Json<LabelChangeResponse>, ApiError> {
    let labels = state.labels.remove(&query.label)?;
    Ok(Json(LabelChangeResponse {
        message: format!("Removed label: {}", query.label),
        labels,
    }))
}
