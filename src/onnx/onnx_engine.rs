//! # ONNX Embedding Engine
//!
//! Runs a pretrained transformer encoder through ONNX Runtime and returns the
//! first-position (`[CLS]`) hidden state of every input as its embedding.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = OnnxEmbeddingEngine::load(&options)?;
//! let embeddings = engine.encode(&["Hello world".to_string()])?;
//! ```
//!
//! The whole flat batch is tokenized together (padded to the longest item,
//! truncated to `max_length`) and sent through the model in one `run`.

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info, instrument};

use crate::models::encoder::LoadOptions;
use crate::models::{Device, Embedding, EmbeddingError, EmbeddingResult, Encoder, LoadEncoder};
use crate::onnx::pooling::{cls_pooling, view3};
use crate::onnx::tokenize::{configure_tokenizer, tokenize_batch, TokenizedBatch};

/// Session, tokenizer and input settings shared by the dense and sparse engines
#[derive(Debug)]
pub struct OnnxRuntime {
    /// `Session::run` needs `&mut`, the rest of the runtime is read-only
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model_name: String,
    output_name: String,
    device: Device,
    add_special_tokens: bool,
    feed_token_type_ids: bool,
}

impl OnnxRuntime {
    /// Load model and tokenizer from the artifact directory named by `options`
    pub fn load(options: &LoadOptions) -> EmbeddingResult<Self> {
        let (model_path, tokenizer_path) = options.model.resolve()?;
        let model_name = options.model.model_id().to_string();

        info!(
            "Initializing ONNX runtime for {} on {} ({})",
            model_name,
            options.device,
            model_path.display()
        );

        let session = build_session(&model_path, options.device, options.num_threads)?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| EmbeddingError::ModelLoadFailed {
            error: format!("Failed to load tokenizer: {}", e),
        })?;
        configure_tokenizer(&mut tokenizer, &options.tokenizer, options.model.variant)?;

        info!(
            "ONNX runtime ready: inputs {:?}, outputs {:?}",
            session.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            session.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model_name,
            output_name: options.model.output_name().to_string(),
            device: options.device,
            add_special_tokens: options.tokenizer.add_special_tokens,
            feed_token_type_ids: options.tokenizer.return_token_type_ids,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn tokenize(&self, texts: &[String]) -> EmbeddingResult<TokenizedBatch> {
        tokenize_batch(&self.tokenizer, texts, self.add_special_tokens)
    }

    /// Run one forward pass and copy out the configured output tensor
    pub fn run(&self, batch: &TokenizedBatch) -> EmbeddingResult<(Vec<usize>, Vec<f32>)> {
        let shape = batch.shape();
        let mut inputs = vec![
            ("input_ids", self.tensor(shape, batch.input_ids.clone())?),
            ("attention_mask", self.tensor(shape, batch.attention_mask.clone())?),
        ];
        if self.feed_token_type_ids {
            inputs.push(("token_type_ids", self.tensor(shape, batch.token_type_ids.clone())?));
        }

        let mut session = self.session.lock().map_err(|_| self.inference_error("session lock poisoned"))?;
        let outputs = session
            .run(inputs)
            .map_err(|e| self.inference_error(format!("ONNX inference failed: {}", e)))?;

        let (dims, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| self.inference_error(format!("Failed to extract {}: {}", self.output_name, e)))?;

        Ok((dims.iter().map(|&d| d as usize).collect(), data.to_vec()))
    }

    fn tensor(&self, shape: [i64; 2], data: Vec<i64>) -> EmbeddingResult<Tensor<i64>> {
        Tensor::from_array((shape, data)).map_err(|e| self.inference_error(format!("Failed to create input tensor: {}", e)))
    }

    pub(crate) fn inference_error(&self, error: impl Into<String>) -> EmbeddingError {
        EmbeddingError::InferenceError {
            model_name: self.model_name.clone(),
            error: error.into(),
        }
    }
}

fn build_session(model_path: &Path, device: Device, num_threads: usize) -> EmbeddingResult<Session> {
    let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    let builder = match device {
        #[cfg(feature = "cuda")]
        Device::Cuda(id) => {
            use ort::execution_providers::CUDAExecutionProvider;

            builder
                .with_execution_providers([CUDAExecutionProvider::default().with_device_id(id as i32).build()])?
                .with_intra_threads(1)?
        }
        _ => builder.with_intra_threads(num_threads)?,
    };

    builder
        .commit_from_file(model_path)
        .map_err(|e| EmbeddingError::ModelLoadFailed {
            error: format!("Failed to load ONNX model: {}", e),
        })
}

/// Dense sentence encoder: one `[CLS]` vector per text
#[derive(Debug)]
pub struct OnnxEmbeddingEngine {
    runtime: OnnxRuntime,
}

impl OnnxEmbeddingEngine {
    pub fn new(runtime: OnnxRuntime) -> Self {
        Self { runtime }
    }
}

impl Encoder for OnnxEmbeddingEngine {
    type Output = Embedding;

    fn name(&self) -> &str {
        self.runtime.model_name()
    }

    fn device(&self) -> Device {
        self.runtime.device()
    }

    #[instrument(skip(self, texts), fields(text_count = texts.len()))]
    fn encode(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch = self.runtime.tokenize(texts)?;
        let (dims, data) = self.runtime.run(&batch)?;
        let embeddings = cls_pooling(view3(&dims, &data)?)?;

        debug!(
            "Generated {} embeddings of dimension {}",
            embeddings.len(),
            embeddings.first().map(Vec::len).unwrap_or(0)
        );
        Ok(embeddings)
    }
}

impl LoadEncoder for OnnxEmbeddingEngine {
    fn load(options: &LoadOptions) -> EmbeddingResult<Self> {
        OnnxRuntime::load(options).map(Self::new)
    }
}
