//! CLIP Image Classifier API Server
//!
//! REST API for managing labels and uploaded image paths, plus a WebSocket
//! endpoint that runs zero-shot classification with progress updates.

use axum::{
    routing::{get, post},
    Router,
};
use event_log::EventLog;
use inference_engine::{ArtifactStatus, ClipEngine, ModelHandle, ZeroShotScorer};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::io::ErrorKind;
use std::sync::Arc;
use storage::{LabelStore, UploadStore};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod error;
pub mod health;
mod routes;

pub use crate::config::{LoggingSettings, Settings};
pub use crate::error::ApiError;
pub use health::{HealthReport, HealthReporter};
pub use routes::classify::{ALREADY_RUNNING, COMPLETED, MODEL_NOT_LOADED, NO_IMAGES, NO_LABELS};

/// Application state shared across handlers
pub struct AppState {
    pub settings: Settings,
    /// Candidate labels for the next run
    pub labels: LabelStore,
    /// Image paths for the next run
    pub uploads: UploadStore,
    /// User-visible event log
    pub events: Arc<EventLog>,
    /// Shared model, loaded in the background
    pub model: Arc<ModelHandle>,
    pub health: HealthReporter,
    /// Prometheus handle when the recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Held for the duration of a classification run
    pub classify_gate: tokio::sync::Mutex<()>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Create new application state
    pub fn new(settings: Settings, events: Arc<EventLog>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            settings,
            labels: LabelStore::new(),
            uploads: UploadStore::new(),
            events,
            model: Arc::new(ModelHandle::new()),
            health: HealthReporter::new(),
            metrics,
            classify_gate: tokio::sync::Mutex::new(()),
        }
    }
}

/// Create the application router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/labels/",
            get(routes::labels::list_labels)
                .post(routes::labels::add_label)
                .delete(routes::labels::remove_label),
        )
        .route("/uploads/", post(routes::uploads::upload_images))
        .route("/files/", get(routes::files::list_files))
        .route(
            "/logs/",
            get(routes::logs::get_logs).delete(routes::logs::clear_logs),
        )
        .route("/health/", get(routes::health::health_check))
        .route("/model-status", get(routes::health::model_status))
        .route("/metrics", get(routes::health::metrics))
        .route("/classify/", get(routes::classify::classify_socket))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Initialize logging. `RUST_LOG` overrides the configured level.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!(e))
}

/// Install the Prometheus recorder; metrics are disabled if that fails
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    }
}

/// Bind `host:port`, falling back to an OS-assigned port if it is taken
pub async fn bind_listener(host: &str, port: u16) -> std::io::Result<TcpListener> {
    match TcpListener::bind((host, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            warn!("Port {} is in use. Finding a free port...", port);
            TcpListener::bind((host, 0)).await
        }
        Err(e) => Err(e),
    }
}

/// Make sure the model file exists, then load it in the background.
///
/// A missing model is only fatal when `model.require_at_startup` is set;
/// otherwise the load fails on its own and classification is refused.
pub fn start_model_loading(state: &SharedState) -> anyhow::Result<()> {
    match state.settings.artifact().ensure_present() {
        Ok(ArtifactStatus::AlreadyPresent) => {}
        Ok(ArtifactStatus::Reassembled(parts)) => {
            state
                .events
                .record(format!("Model reassembled from {} parts.", parts));
        }
        Err(e) => {
            error!("Model unavailable: {}", e);
            state.events.record(format!("ERROR: {}", e));
            if state.settings.model.require_at_startup {
                return Err(e.into());
            }
        }
    }

    let config = state.settings.engine_config();
    state.model.spawn_load(move || {
        ClipEngine::load(&config).map(|engine| Arc::new(engine) as Arc<dyn ZeroShotScorer>)
    });
    Ok(())
}

/// Serve the router on an already-bound listener
pub async fn serve(listener: TcpListener, state: SharedState) -> std::io::Result<()> {
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down...");
    } else {
        // No signal handler available; serve until the process is killed
        std::future::pending::<()>().await;
    }
}

/// Run the server
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let events = match &settings.logging.file {
        Some(path) => Arc::new(EventLog::with_file(path)?),
        None => Arc::new(EventLog::in_memory()),
    };
    let state = Arc::new(AppState::new(settings, events, init_metrics()));

    start_model_loading(&state)?;

    let listener = bind_listener(&state.settings.server.host, state.settings.server.port).await?;
    let addr = listener.local_addr()?;
    info!("Starting API server on {}", addr);
    state
        .events
        .record(format!("Server starting on port {}", addr.port()));

    serve(listener, state).await?;
    Ok(())
}
