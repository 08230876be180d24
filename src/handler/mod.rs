//! Serving handlers
//!
//! A handler follows the host's fixed lifecycle: `initialize` once, then
//! `preprocess` → `inference` → `postprocess` per batch, with `handle`
//! chaining the three. Handlers are read-only after initialization.

pub mod batch;
pub mod embedding;
pub mod record;
pub mod request;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::models::encoder::LoadOptions;
use crate::models::{Device, EmbeddingResult, HandlerVariant, ModelConfig, TokenizerConfig};
use crate::server::config::ServerConfig;

pub use batch::{regroup, FlatBatch};
pub use embedding::EncodingHandler;
pub use record::{EmbeddingRecord, RecordHandler};
pub use request::{Request, RequestBody, TextInput};

/// What the host knows about the model archive
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub model_id: String,
    pub variant: HandlerVariant,
}

/// Process-level properties provided by the host
#[derive(Debug, Clone, Serialize)]
pub struct SystemProperties {
    pub gpu_id: Option<u32>,
    pub num_threads: usize,
}

/// Handler context, built once at startup
#[derive(Debug, Clone)]
pub struct Context {
    pub manifest: Manifest,
    pub system_properties: SystemProperties,
    pub model: ModelConfig,
    pub tokenizer: TokenizerConfig,
}

impl Context {
    pub fn new(model: ModelConfig, tokenizer: TokenizerConfig) -> Self {
        Self {
            manifest: Manifest {
                model_id: model.model_id().to_string(),
                variant: model.variant,
            },
            system_properties: SystemProperties {
                gpu_id: None,
                num_threads: 4,
            },
            model,
            tokenizer,
        }
    }

    /// Build the context from the server config; `GPU_ID` overrides `device.gpu_id`
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut context = Self::new(config.model.clone(), config.tokenizer.clone());
        context.system_properties = SystemProperties {
            gpu_id: Device::gpu_id_from_env().or(config.device.gpu_id),
            num_threads: config.device.num_threads,
        };
        context
    }

    /// Resolve the device and bundle everything an encoder needs to load
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            model: self.model.clone(),
            tokenizer: self.tokenizer.clone(),
            device: Device::detect(self.system_properties.gpu_id),
            num_threads: self.system_properties.num_threads,
        }
    }
}

/// Flat encoder outputs with the group sizes needed to split them again
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction<T> {
    pub outputs: Vec<T>,
    pub group_sizes: Vec<usize>,
}

/// Lifecycle hooks invoked by the serving host
#[async_trait]
pub trait ServingHandler: Send + Sync {
    /// Per-text encoder output
    type Item: Send;
    /// Per-request response
    type Output: Serialize + Send;

    /// Load model, tokenizer and device. Failure is fatal to the process.
    async fn initialize(&mut self, context: &Context) -> EmbeddingResult<()>;

    fn is_initialized(&self) -> bool;

    /// Device resolved at initialization, `None` before it
    fn device(&self) -> Option<Device>;

    fn preprocess(&self, requests: &[Request]) -> EmbeddingResult<FlatBatch>;

    fn inference(&self, batch: FlatBatch) -> EmbeddingResult<Prediction<Self::Item>>;

    /// One output per request, in request order
    fn postprocess(&self, prediction: Prediction<Self::Item>) -> EmbeddingResult<Vec<Self::Output>>;

    fn handle(&self, requests: &[Request], _context: &Context) -> EmbeddingResult<Vec<Self::Output>> {
        let batch = self.preprocess(requests)?;
        let prediction = self.inference(batch)?;
        self.postprocess(prediction)
    }
}

/// Object-safe view of a handler, used by the HTTP host
pub trait JsonHandler: Send + Sync {
    fn is_ready(&self) -> bool;

    fn device(&self) -> Option<Device>;

    fn handle_json(&self, requests: &[Request], context: &Context) -> EmbeddingResult<Vec<serde_json::Value>>;
}

impl<H: ServingHandler> JsonHandler for H {
    fn is_ready(&self) -> bool {
        self.is_initialized()
    }

    fn device(&self) -> Option<Device> {
        ServingHandler::device(self)
    }

    fn handle_json(&self, requests: &[Request], context: &Context) -> EmbeddingResult<Vec<serde_json::Value>> {
        self.handle(requests, context)?
            .into_iter()
            .map(|output| serde_json::to_value(output).map_err(Into::into))
            .collect()
    }
}

/// Dense text-embedding handler returning raw vector groups
#[cfg(feature = "onnx")]
pub type TextEmbeddingHandler = EncodingHandler<crate::onnx::OnnxEmbeddingEngine>;

/// Dense handler returning one `sentence_embedding` record per request
#[cfg(feature = "onnx")]
pub type SentenceRecordHandler = RecordHandler<crate::onnx::OnnxEmbeddingEngine>;

/// Neural sparse handler returning token-weight maps
#[cfg(feature = "onnx")]
pub type SparseEncodingHandler = EncodingHandler<crate::onnx::OnnxSparseEngine>;

/// Instantiate and initialize the handler named by the context's variant
#[cfg(feature = "onnx")]
pub async fn load_handler(context: &Context) -> EmbeddingResult<Arc<dyn JsonHandler>> {
    info!(
        "Loading {} handler for model {}",
        context.manifest.variant.as_str(),
        context.manifest.model_id
    );

    let handler: Arc<dyn JsonHandler> = match context.manifest.variant {
        HandlerVariant::Embedding => {
            let mut handler = TextEmbeddingHandler::new();
            handler.initialize(context).await?;
            Arc::new(handler)
        }
        HandlerVariant::Record => {
            let mut handler = SentenceRecordHandler::new();
            handler.initialize(context).await?;
            Arc::new(handler)
        }
        HandlerVariant::Sparse => {
            let mut handler = SparseEncodingHandler::new();
            handler.initialize(context).await?;
            Arc::new(handler)
        }
    };

    Ok(handler)
}
