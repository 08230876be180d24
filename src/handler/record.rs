//! Record-formatting handler
//!
//! Same batching as [`EncodingHandler`], but every request's vectors are
//! wrapped in a `sentence_embedding` record.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::handler::batch::FlatBatch;
use crate::handler::embedding::EncodingHandler;
use crate::handler::request::Request;
use crate::handler::{Context, Prediction, ServingHandler};
use crate::models::{Device, Embedding, EmbeddingResult, LoadEncoder};

pub const RECORD_NAME: &str = "sentence_embedding";
pub const RECORD_DATA_TYPE: &str = "FLOAT32";

/// Structured output for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub name: String,
    pub data_type: String,
    /// Number of entries in `data`
    pub shape: usize,
    pub data: Vec<Embedding>,
}

impl EmbeddingRecord {
    pub fn new(data: Vec<Embedding>) -> Self {
        Self {
            name: RECORD_NAME.to_string(),
            data_type: RECORD_DATA_TYPE.to_string(),
            shape: data.len(),
            data,
        }
    }
}

pub struct RecordHandler<E> {
    inner: EncodingHandler<E>,
}

impl<E> RecordHandler<E> {
    pub fn new() -> Self {
        Self {
            inner: EncodingHandler::new(),
        }
    }

    pub fn with_encoder(encoder: E) -> Self {
        Self {
            inner: EncodingHandler::with_encoder(encoder),
        }
    }
}

impl<E> Default for RecordHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> ServingHandler for RecordHandler<E>
where
    E: LoadEncoder<Output = Embedding>,
{
    type Item = Embedding;
    type Output = EmbeddingRecord;

    async fn initialize(&mut self, context: &Context) -> EmbeddingResult<()> {
        self.inner.initialize(context).await
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    fn device(&self) -> Option<Device> {
        self.inner.device()
    }

    fn preprocess(&self, requests: &[Request]) -> EmbeddingResult<FlatBatch> {
        self.inner.preprocess(requests)
    }

    fn inference(&self, batch: FlatBatch) -> EmbeddingResult<Prediction<Embedding>> {
        self.inner.inference(batch)
    }

    fn postprocess(&self, prediction: Prediction<Embedding>) -> EmbeddingResult<Vec<EmbeddingRecord>> {
        Ok(self
            .inner
            .postprocess(prediction)?
            .into_iter()
            .map(EmbeddingRecord::new)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::encoder::stub::StubEncoder;
    use crate::models::{ModelConfig, TokenizerConfig};
    use serde_json::json;

    #[test]
    fn test_record_fields() {
        let record = EmbeddingRecord::new(vec![vec![0.5, 0.25], vec![1.0, 0.0]]);
        assert_eq!(record.name, "sentence_embedding");
        assert_eq!(record.data_type, "FLOAT32");
        assert_eq!(record.shape, 2);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "sentence_embedding",
                "data_type": "FLOAT32",
                "shape": 2,
                "data": [[0.5, 0.25], [1.0, 0.0]]
            })
        );
    }

    #[test]
    fn test_one_record_per_request() {
        let handler = RecordHandler::with_encoder(StubEncoder::default());
        let context = Context::new(ModelConfig::default(), TokenizerConfig::default());
        let requests = vec![
            Request::from_json(json!("hello world")),
            Request::from_json(json!([])),
            Request::from_json(json!(["a", "b", "c"])),
        ];

        let records = handler.handle(&requests, &context).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].data, vec![StubEncoder::vector_for("hello world")]);
        assert_eq!(records[1].shape, 0);
        assert!(records[1].data.is_empty());
        assert_eq!(records[2].shape, 3);
        assert_eq!(records[2].data[2], StubEncoder::vector_for("c"));
    }
}
