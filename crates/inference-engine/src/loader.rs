//! Background model loading
//!
//! The engine is built once on the blocking pool while the server is already
//! accepting requests. Readiness is published through a `watch` channel so
//! handlers can poll it and tests can await it.

use crate::engine::ZeroShotScorer;
use crate::InferenceError;
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Lifecycle of the shared model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    NotStarted,
    Loading,
    Ready,
    Failed,
}

impl ModelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelState::NotStarted => "not_started",
            ModelState::Loading => "loading",
            ModelState::Ready => "ready",
            ModelState::Failed => "failed",
        }
    }
}

/// Shared handle to the (possibly not yet loaded) model
pub struct ModelHandle {
    state: watch::Sender<ModelState>,
    scorer: RwLock<Option<Arc<dyn ZeroShotScorer>>>,
    error: Mutex<Option<String>>,
}

impl ModelHandle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ModelState::NotStarted);
        Self {
            state,
            scorer: RwLock::new(None),
            error: Mutex::new(None),
        }
    }

    /// Start loading on the blocking pool.
    ///
    /// Returns `None` without doing anything if a load is already running or
    /// has completed; only a fresh or failed handle starts a new load.
    pub fn spawn_load<F>(self: &Arc<Self>, loader: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce() -> Result<Arc<dyn ZeroShotScorer>, InferenceError> + Send + 'static,
    {
        let started = self.state.send_if_modified(|state| {
            if matches!(state, ModelState::NotStarted | ModelState::Failed) {
                *state = ModelState::Loading;
                true
            } else {
                false
            }
        });

        if !started {
            debug!("Model load already {}; ignoring request", self.state().as_str());
            return None;
        }

        info!("Loading model in background");
        let handle = Arc::clone(self);
        Some(tokio::spawn(async move {
            match tokio::task::spawn_blocking(loader).await {
                Ok(Ok(scorer)) => handle.install(scorer),
                Ok(Err(e)) => handle.fail(e.to_string()),
                Err(e) => handle.fail(format!("loader task failed: {}", e)),
            }
        }))
    }

    /// Publish a ready scorer
    pub fn install(&self, scorer: Arc<dyn ZeroShotScorer>) {
        if let Ok(mut slot) = self.scorer.write() {
            *slot = Some(scorer);
        }
        if let Ok(mut err) = self.error.lock() {
            *err = None;
        }
        self.state.send_replace(ModelState::Ready);
        info!("Model ready");
    }

    fn fail(&self, message: String) {
        error!("Model load failed: {}", message);
        if let Ok(mut err) = self.error.lock() {
            *err = Some(message);
        }
        self.state.send_replace(ModelState::Failed);
    }

    pub fn state(&self) -> ModelState {
        *self.state.borrow()
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == ModelState::Ready
    }

    /// Message of the last failed load
    pub fn error(&self) -> Option<String> {
        self.error.lock().ok().and_then(|e| e.clone())
    }

    /// The scorer, once ready
    pub fn scorer(&self) -> Option<Arc<dyn ZeroShotScorer>> {
        self.scorer.read().ok().and_then(|s| s.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<ModelState> {
        self.state.subscribe()
    }

    /// Wait until loading settles
    pub async fn wait_ready(&self) -> Result<(), InferenceError> {
        let mut rx = self.subscribe();
        let settled = *rx
            .wait_for(|s| matches!(s, ModelState::Ready | ModelState::Failed))
            .await
            .map_err(|e| InferenceError::TaskFailed(e.to_string()))?;

        match settled {
            ModelState::Ready => Ok(()),
            _ => Err(InferenceError::ModelLoadError(
                self.error().unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

impl Default for ModelHandle {
    fn default() -> Self {
        Self::new()
    }
}
