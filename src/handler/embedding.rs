//! Generic encoding handler
//!
//! Flattens the batch, runs the encoder once over all texts and hands each
//! request back its own slice of outputs. With the dense ONNX engine this is
//! the text-embedding handler; with the sparse engine, the sparse handler.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::handler::batch::{regroup, FlatBatch};
use crate::handler::request::Request;
use crate::handler::{Context, Prediction, ServingHandler};
use crate::models::{Device, EmbeddingError, EmbeddingResult, Encoder, LoadEncoder};

pub struct EncodingHandler<E> {
    encoder: Option<Arc<E>>,
}

impl<E> EncodingHandler<E> {
    /// Uninitialized handler; the host calls `initialize` before any batch
    pub fn new() -> Self {
        Self { encoder: None }
    }

    /// Handler around an already loaded encoder
    pub fn with_encoder(encoder: E) -> Self {
        Self {
            encoder: Some(Arc::new(encoder)),
        }
    }

    pub(crate) fn encoder(&self) -> EmbeddingResult<&E> {
        self.encoder.as_deref().ok_or(EmbeddingError::NotInitialized)
    }
}

impl<E> Default for EncodingHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: LoadEncoder> ServingHandler for EncodingHandler<E> {
    type Item = E::Output;
    type Output = Vec<E::Output>;

    async fn initialize(&mut self, context: &Context) -> EmbeddingResult<()> {
        let started = Instant::now();
        let options = context.load_options();

        // Model loading blocks on file IO and session construction
        let encoder = tokio::task::spawn_blocking(move || E::load(&options))
            .await
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("model loader task failed: {}", e),
            })??;

        info!("Loaded encoder {} in {:?}", encoder.name(), started.elapsed());
        self.encoder = Some(Arc::new(encoder));
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.encoder.is_some()
    }

    fn device(&self) -> Option<Device> {
        self.encoder.as_deref().map(Encoder::device)
    }

    fn preprocess(&self, requests: &[Request]) -> EmbeddingResult<FlatBatch> {
        self.encoder()?;
        let batch = FlatBatch::flatten(requests)?;
        debug!(
            requests = batch.request_count(),
            items = batch.len(),
            group_sizes = ?batch.group_sizes,
            "Flattened batch"
        );
        Ok(batch)
    }

    fn inference(&self, batch: FlatBatch) -> EmbeddingResult<Prediction<E::Output>> {
        let encoder = self.encoder()?;

        let outputs = if batch.is_empty() {
            Vec::new()
        } else {
            let started = Instant::now();
            let outputs = encoder.encode(&batch.texts)?;
            debug!("Encoded {} texts with {} in {:?}", batch.len(), encoder.name(), started.elapsed());
            outputs
        };

        if outputs.len() != batch.len() {
            return Err(EmbeddingError::InferenceError {
                model_name: encoder.name().to_string(),
                error: format!("encoder returned {} outputs for {} texts", outputs.len(), batch.len()),
            });
        }

        Ok(Prediction {
            outputs,
            group_sizes: batch.group_sizes,
        })
    }

    fn postprocess(&self, prediction: Prediction<E::Output>) -> EmbeddingResult<Vec<Vec<E::Output>>> {
        regroup(prediction.outputs, &prediction.group_sizes)
    }
}
