//! Server Configuration
//!
//! Loaded once from TOML at startup. Every section has defaults, so an empty
//! file serves the default dense model on `0.0.0.0:8080`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{EmbeddingError, EmbeddingResult, ModelConfig, TokenizerConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_body_size() -> usize {
    5242880
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_body_size: default_max_body_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// GPU index; the `GPU_ID` environment variable takes precedence
    #[serde(default)]
    pub gpu_id: Option<u32>,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    /// Path to the ONNX Runtime shared library (load-dynamic builds)
    #[serde(default)]
    pub onnx_runtime_path: Option<PathBuf>,
}

fn default_num_threads() -> usize {
    4
}

/// Variable ONNX Runtime reads when it loads its shared library
pub const ORT_DYLIB_ENV: &str = "ORT_DYLIB_PATH";

impl DeviceConfig {
    /// Environment entry pointing ONNX Runtime at the configured library.
    /// Must be applied before any other thread is started.
    pub fn runtime_library_env(&self) -> Option<(&'static str, &Path)> {
        self.onnx_runtime_path
            .as_deref()
            .map(|path| (ORT_DYLIB_ENV, path))
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            gpu_id: None,
            num_threads: default_num_threads(),
            onnx_runtime_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log per-request timings at info instead of debug
    #[serde(default)]
    pub log_timings: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_timings: false,
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> EmbeddingResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> EmbeddingResult<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EmbeddingResult<()> {
        if self.model.model_id().trim().is_empty() {
            return Err(EmbeddingError::ConfigError {
                message: "model.model_id cannot be empty".to_string(),
            });
        }
        if self.device.num_threads == 0 {
            return Err(EmbeddingError::ConfigError {
                message: "device.num_threads must be greater than zero".to_string(),
            });
        }
        if self.network.max_body_size == 0 {
            return Err(EmbeddingError::ConfigError {
                message: "network.max_body_size must be greater than zero".to_string(),
            });
        }
        self.tokenizer.validate()
    }
}
