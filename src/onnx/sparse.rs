//! Neural sparse encoder
//!
//! A masked-LM backbone whose logits are max-pooled over positions and
//! squashed with `ln(1 + relu(x))`. Special tokens are removed and the
//! remaining non-zero entries are returned as `token -> weight` maps.

use ndarray::ArrayView2;
use tracing::{debug, info, instrument};

use crate::models::encoder::LoadOptions;
use crate::models::{Device, EmbeddingError, EmbeddingResult, Encoder, LoadEncoder, SparseVector};
use crate::onnx::onnx_engine::OnnxRuntime;
use crate::onnx::pooling::{sparse_pooling, view3};
use crate::onnx::tokenize::{sparse_vector, vocabulary};

#[derive(Debug)]
pub struct OnnxSparseEngine {
    runtime: OnnxRuntime,
    /// Indexed by token id
    id_to_token: Vec<String>,
    special_ids: Vec<u32>,
}

impl OnnxSparseEngine {
    pub fn new(runtime: OnnxRuntime) -> Self {
        let (id_to_token, special_ids) = vocabulary(runtime.tokenizer());

        info!(
            "Sparse encoder vocabulary: {} tokens, {} special",
            id_to_token.len(),
            special_ids.len()
        );

        Self {
            runtime,
            id_to_token,
            special_ids,
        }
    }
}

impl Encoder for OnnxSparseEngine {
    type Output = SparseVector;

    fn name(&self) -> &str {
        self.runtime.model_name()
    }

    fn device(&self) -> Device {
        self.runtime.device()
    }

    #[instrument(skip(self, texts), fields(text_count = texts.len()))]
    fn encode(&self, texts: &[String]) -> EmbeddingResult<Vec<SparseVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch = self.runtime.tokenize(texts)?;
        let (dims, data) = self.runtime.run(&batch)?;
        let logits = view3(&dims, &data)?;
        let mask = ArrayView2::from_shape((batch.batch_size, batch.seq_len), &batch.attention_mask).map_err(|e| {
            EmbeddingError::EmbeddingFailed {
                error: format!("Failed to view attention mask: {:?}", e),
            }
        })?;

        let vectors: Vec<SparseVector> = sparse_pooling(logits, mask, &self.special_ids)?
            .into_iter()
            .map(|weights| sparse_vector(&self.id_to_token, weights))
            .collect();

        debug!(
            "Generated {} sparse vectors, {} terms total",
            vectors.len(),
            vectors.iter().map(|v| v.len()).sum::<usize>()
        );
        Ok(vectors)
    }
}

impl LoadEncoder for OnnxSparseEngine {
    fn load(options: &LoadOptions) -> EmbeddingResult<Self> {
        OnnxRuntime::load(options).map(Self::new)
    }
}
