//! Classification WebSocket
//!
//! A client connects to `/classify/`, receives `{"progress": N}` frames while
//! batches complete, then a single completion (or error) frame. After a
//! successful run the labels and uploads it used are removed from the stores.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use inference_engine::{ClassificationPipeline, ClassificationResult, InferenceError};
use metrics::counter;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::SharedState;

pub const NO_LABELS: &str = "No labels defined for classification.";
pub const NO_IMAGES: &str = "No images found for classification.";
pub const MODEL_NOT_LOADED: &str = "Model is not loaded yet.";
pub const ALREADY_RUNNING: &str = "Classification already in progress.";
pub const COMPLETED: &str = "Classification completed.";

#[derive(Debug, Serialize)]
struct ProgressFrame {
    progress: u8,
}

#[derive(Debug, Serialize)]
struct CompletedFrame<'a> {
    message: &'a str,
    results: &'a [ClassificationResult],
}

#[derive(Debug, Serialize)]
struct ErrorFrame {
    error: String,
}

pub async fn classify_socket(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| run_classification(socket, state))
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, frame: &T) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).map_err(axum::Error::new)?;
    socket.send(Message::Text(text)).await
}

/// Send an error frame and close
async fn reject(socket: &mut WebSocket, message: impl Into<String>) {
    let frame = ErrorFrame {
        error: message.into(),
    };
    if let Err(e) = send_json(socket, &frame).await {
        debug!("Could not deliver error frame: {}", e);
    }
    let _ = socket.send(Message::Close(None)).await;
}

async fn run_classification(mut socket: WebSocket, state: SharedState) {
    // The checks and the run share one copy of each store
    let labels = state.labels.list();
    let paths = state.uploads.list();

    if labels.is_empty() {
        return reject(&mut socket, NO_LABELS).await;
    }
    if paths.is_empty() {
        return reject(&mut socket, NO_IMAGES).await;
    }
    let Some(scorer) = state.model.scorer() else {
        return reject(&mut socket, MODEL_NOT_LOADED).await;
    };
    // Held until cleanup finishes so a new run cannot see half-cleared stores
    let Ok(_running) = state.classify_gate.try_lock() else {
        return reject(&mut socket, ALREADY_RUNNING).await;
    };

    let run_id = Uuid::new_v4();
    info!(%run_id, images = paths.len(), labels = labels.len(), "Classification started");
    state
        .events
        .record(format!("Starting classification for {} images.", paths.len()));
    counter!("classifier_runs_total").increment(1);

    let taken_labels = labels.clone();
    let taken_paths = paths.clone();
    let pipeline = ClassificationPipeline::new(scorer, Arc::clone(&state.events))
        .with_bounds(state.settings.batch_bounds());
    let (tx, mut rx) = mpsc::channel::<u8>(16);
    let task = tokio::spawn(async move { pipeline.run(paths, labels, Some(&tx)).await });

    let mut connected = true;
    while let Some(progress) = rx.recv().await {
        if send_json(&mut socket, &ProgressFrame { progress }).await.is_err() {
            connected = false;
            break;
        }
    }
    // The pipeline notices the dropped receiver on its next progress report
    drop(rx);

    let outcome = match task.await {
        Ok(result) => result,
        Err(e) => Err(InferenceError::TaskFailed(e.to_string())),
    };

    match outcome {
        Ok(results) if connected => {
            let frame = CompletedFrame {
                message: COMPLETED,
                results: &results,
            };
            if let Err(e) = send_json(&mut socket, &frame).await {
                warn!(%run_id, "Could not deliver results: {}", e);
            }
            state.events.record(COMPLETED);
            info!(%run_id, results = results.len(), "Classification completed");

            tokio::time::sleep(state.settings.cleanup_delay()).await;
            clear_session(&state, &taken_labels, &taken_paths);
            let _ = socket.send(Message::Close(None)).await;
        }
        Ok(_) | Err(InferenceError::Cancelled) => {
            warn!(%run_id, "Client disconnected during classification");
            state
                .events
                .record("Classification cancelled: client disconnected.");
        }
        Err(e) => {
            state.events.record(format!("WebSocket Error: {}", e));
            reject(&mut socket, format!("Failed to process images: {}", e)).await;
        }
    }
}

/// Forget the labels and uploads this run consumed. Entries added while it
/// was running stay for the next run. Files on disk are left alone.
fn clear_session(state: &SharedState, labels: &[String], paths: &[PathBuf]) {
    state.labels.discard(labels);
    state.events.record("Cleared all labels.");
    state.uploads.discard(paths);
    state.events.record("Cleared all uploaded images.");
}
