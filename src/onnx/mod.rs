//! ONNX-backed encoders
//!
//! Tokenization and pooling are plain functions over `tokenizers` and
//! `ndarray`; the engines that own an ONNX Runtime session need the `onnx`
//! feature.

#[cfg(feature = "onnx")]
pub mod onnx_engine;
pub mod pooling;
#[cfg(feature = "onnx")]
pub mod sparse;
pub mod tokenize;

#[cfg(feature = "onnx")]
pub use onnx_engine::{OnnxEmbeddingEngine, OnnxRuntime};
#[cfg(feature = "onnx")]
pub use sparse::OnnxSparseEngine;
pub use tokenize::TokenizedBatch;
