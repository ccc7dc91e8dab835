//! Server Configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! (`classifier.toml`, or the path in `CLASSIFIER_CONFIG`), then
//! `CLASSIFIER__SECTION__KEY` environment variables, then `PORT`.

use config::{Config, ConfigError, Environment, File};
use inference_engine::{BatchBounds, ClipEngineConfig, ModelArtifact};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "classifier.toml";

/// Environment variable naming an alternative configuration file
pub const CONFIG_FILE_ENV: &str = "CLASSIFIER_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub classify: ClassifySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Where the model, its split parts and the tokenizer live
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub dir: PathBuf,
    pub file_name: String,
    pub split_prefix: String,
    pub chunk_size_bytes: u64,
    pub tokenizer_file: String,
    pub image_size: u32,
    pub intra_threads: usize,
    /// Refuse to start when the model is neither present nor reassemblable
    pub require_at_startup: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            file_name: "clip_model_quantized.onnx".to_string(),
            split_prefix: "clip_model_part_".to_string(),
            chunk_size_bytes: inference_engine::DEFAULT_CHUNK_SIZE,
            tokenizer_file: "tokenizer.json".to_string(),
            image_size: inference_engine::THUMBNAIL_SIZE,
            intra_threads: 4,
            require_at_startup: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifySettings {
    pub min_batch: usize,
    pub max_batch: usize,
    /// Pause between the completion message and clearing the stores
    pub cleanup_delay_ms: u64,
}

impl Default for ClassifySettings {
    fn default() -> Self {
        Self {
            min_batch: 8,
            max_batch: 128,
            cleanup_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// Event log mirror; `None` keeps events in memory only
    pub file: Option<PathBuf>,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("app.log")),
            json: false,
        }
    }
}

impl Settings {
    /// Load from `CLASSIFIER_CONFIG` (or `classifier.toml`) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(Some(path.as_path()))
    }

    /// Load with an explicit (optional) configuration file
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .add_source(
                Environment::with_prefix("CLASSIFIER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .build()?
            .try_deserialize()
    }

    pub fn model_path(&self) -> PathBuf {
        self.model.dir.join(&self.model.file_name)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model.dir.join(&self.model.tokenizer_file)
    }

    /// The on-disk model and its split parts
    pub fn artifact(&self) -> ModelArtifact {
        ModelArtifact::new(self.model_path(), self.model.dir.join(&self.model.split_prefix))
            .with_chunk_size(self.model.chunk_size_bytes)
    }

    pub fn engine_config(&self) -> ClipEngineConfig {
        ClipEngineConfig {
            model_path: self.model_path(),
            tokenizer_path: self.tokenizer_path(),
            image_size: self.model.image_size,
            intra_threads: self.model.intra_threads,
        }
    }

    pub fn batch_bounds(&self) -> BatchBounds {
        BatchBounds {
            min: self.classify.min_batch,
            max: self.classify.max_batch,
        }
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.classify.cleanup_delay_ms)
    }
}
