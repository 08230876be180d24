//! The encoder seam
//!
//! Handlers only know that an encoder turns a flat batch of texts into one
//! output per text, in order. The ONNX engines implement this for real
//! models; tests plug in a deterministic stub.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::config::{ModelConfig, TokenizerConfig};
use crate::models::{Device, EmbeddingResult};

/// Token -> weight map produced by the sparse encoder
pub type SparseVector = BTreeMap<String, f32>;

/// A pretrained text encoder
///
/// `encode` must return exactly one output per input text, in input order.
/// It is called synchronously and may block for the duration of the
/// forward pass.
pub trait Encoder: Send + Sync + 'static {
    /// Per-text output (dense vector, sparse map, ...)
    type Output: Serialize + Send + 'static;

    /// Model identifier, used in logs and error messages
    fn name(&self) -> &str;

    fn encode(&self, texts: &[String]) -> EmbeddingResult<Vec<Self::Output>>;

    /// Device the encoder actually runs on
    fn device(&self) -> Device {
        Device::Cpu
    }
}

/// Everything an encoder needs to load itself
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub model: ModelConfig,
    pub tokenizer: TokenizerConfig,
    pub device: Device,
    pub num_threads: usize,
}

/// Encoders that can be constructed from configuration during `initialize`
pub trait LoadEncoder: Encoder + Sized {
    fn load(options: &LoadOptions) -> EmbeddingResult<Self>;
}
