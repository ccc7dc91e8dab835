#![allow(dead_code)]

use api::{serve, AppState, Settings, SharedState};
use event_log::EventLog;
use image::{Rgb, RgbImage};
use inference_engine::{InferenceError, ZeroShotScorer};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// A running server on an ephemeral port
pub struct TestApp {
    pub base: String,
    pub ws: String,
    pub state: SharedState,
    pub dir: PathBuf,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn install_scorer(&self, scorer: impl ZeroShotScorer + 'static) {
        self.state.model.install(Arc::new(scorer));
    }

    pub fn image(&self, name: &str, rgb: [u8; 3]) -> PathBuf {
        let path = self.dir.join(name);
        RgbImage::from_pixel(16, 16, Rgb(rgb)).save(&path).unwrap();
        path
    }

    /// Poll until labels and uploads are both empty
    pub async fn wait_for_cleared_session(&self) {
        for _ in 0..100 {
            if self.state.labels.is_empty() && self.state.uploads.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("session was never cleared");
    }
}

pub async fn spawn_app() -> TestApp {
    let mut settings = Settings::default();
    settings.logging.file = None;
    settings.classify.cleanup_delay_ms = 0;
    spawn_app_with(settings).await
}

pub async fn spawn_app_with(settings: Settings) -> TestApp {
    let state = Arc::new(AppState::new(settings, Arc::new(EventLog::in_memory()), None));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_state = Arc::clone(&state);
    tokio::spawn(async move { serve(listener, server_state).await });

    let dir = std::env::temp_dir().join(format!("api-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();

    TestApp {
        base: format!("http://{}", addr),
        ws: format!("ws://{}/classify/", addr),
        state,
        dir,
    }
}

pub fn path_string(path: &Path) -> String {
    path.display().to_string()
}

/// Scores label 0 by mean red and label 1 by mean blue
pub struct ColorScorer;

impl ZeroShotScorer for ColorScorer {
    fn logits(&self, images: &[RgbImage], labels: &[String]) -> Result<Array2<f32>, InferenceError> {
        let mut out = Array2::zeros((images.len(), labels.len()));
        for (i, image) in images.iter().enumerate() {
            let n = (image.width() * image.height()) as f32;
            out[[i, 0]] = image.pixels().map(|p| p[0] as f32).sum::<f32>() / n / 10.0;
            out[[i, 1]] = image.pixels().map(|p| p[2] as f32).sum::<f32>() / n / 10.0;
        }
        Ok(out)
    }
}

pub struct BrokenScorer;

impl ZeroShotScorer for BrokenScorer {
    fn logits(&self, _: &[RgbImage], _: &[String]) -> Result<Array2<f32>, InferenceError> {
        Err(InferenceError::InferenceFailed("onnx session crashed".to_string()))
    }
}
