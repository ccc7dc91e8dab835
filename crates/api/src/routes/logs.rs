//! Event log routes

use axum::{extract::State, Json};
use event_log::LogEntry;
use serde::Serialize;
use serde_json::{json, Value};

use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
}

pub async fn get_logs(State(state): State<SharedState>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: state.events.entries(),
    })
}

/// Clear the in-memory log; the mirror file keeps its history
pub async fn clear_logs(State(state): State<SharedState>) -> Json<Value> {
    state.events.clear();
    Json(json!({ "message": "Logs cleared." }))
}
