//! Health, model status and metrics routes

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::health::HealthReport;
use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct ModelStatusResponse {
    pub loaded: bool,
    pub state: &'static str,
    pub error: Option<String>,
}

pub async fn health_check(State(state): State<SharedState>) -> Json<HealthReport> {
    Json(state.health.report())
}

pub async fn model_status(State(state): State<SharedState>) -> Json<ModelStatusResponse> {
    Json(ModelStatusResponse {
        loaded: state.model.is_loaded(),
        state: state.model.state().as_str(),
        error: state.model.error(),
    })
}

/// Prometheus exposition, when a recorder is installed
pub async fn metrics(State(state): State<SharedState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
