//! Sentence Embedding Handler Library
//!
//! Serving handlers for pretrained sentence encoders: flatten a batch of
//! requests, encode every sentence in one pass, regroup the outputs per
//! request.

pub mod handler;
pub mod models;
pub mod onnx;
pub mod protocol;
pub mod server;

// Re-exports
pub use handler::{Context, EncodingHandler, FlatBatch, JsonHandler, RecordHandler, Request, ServingHandler};
pub use models::{Embedding, EmbeddingError, EmbeddingResult, Encoder};
pub use server::{start_hyper_http_server, ServerConfig, ServerState};
