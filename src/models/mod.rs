//! Model-side types shared by every handler
//!
//! Holds the error taxonomy, the encoder seam and the model/tokenizer
//! configuration sections.

pub mod config;
pub mod device;
pub mod encoder;

// Re-exports
pub use config::{HandlerVariant, ModelConfig, PaddingStrategyConfig, TokenizerConfig, TruncationStrategyConfig};
pub use device::Device;
pub use encoder::{Encoder, LoadEncoder, LoadOptions, SparseVector};

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Result type for handler and encoder operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Errors that can occur while loading a model or serving a batch
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Model not found: {model_name}")]
    ModelNotFound { model_name: String },

    #[error("Model load failed: {error}")]
    ModelLoadFailed { error: String },

    #[error("Handler used before initialize()")]
    NotInitialized,

    #[error("Invalid request #{index}: {message}")]
    InvalidRequest { index: usize, message: String },

    #[error("Inference failed: {model_name} - {error}")]
    InferenceError { model_name: String, error: String },

    #[error("Embedding failed: {error}")]
    EmbeddingFailed { error: String },

    #[error("Batch mismatch: {outputs} outputs for group sizes summing to {expected}")]
    BatchMismatch { outputs: usize, expected: usize },

    #[error("IO error: {error}")]
    IoError { error: std::io::Error },

    #[error("TOML parsing error: {error}")]
    TomlError { error: toml::de::Error },

    #[error("JSON error: {error}")]
    JsonError { error: serde_json::Error },
}

impl EmbeddingError {
    /// Whether the failure was caused by the caller's input rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, EmbeddingError::InvalidRequest { .. })
    }

    pub(crate) fn invalid_request(index: usize, message: impl Into<String>) -> Self {
        EmbeddingError::InvalidRequest {
            index,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for EmbeddingError {
    fn from(error: std::io::Error) -> Self {
        EmbeddingError::IoError { error }
    }
}

impl From<toml::de::Error> for EmbeddingError {
    fn from(error: toml::de::Error) -> Self {
        EmbeddingError::TomlError { error }
    }
}

impl From<serde_json::Error> for EmbeddingError {
    fn from(error: serde_json::Error) -> Self {
        EmbeddingError::JsonError { error }
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for EmbeddingError {
    fn from(error: ort::Error) -> Self {
        EmbeddingError::ModelLoadFailed { error: error.to_string() }
    }
}
