//! Serving requests and body decoding

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{EmbeddingError, EmbeddingResult};

/// Body of one serving call as handed over by the host
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Raw UTF-8 JSON bytes
    Bytes(Vec<u8>),
    /// JSON the host has already decoded
    Json(Value),
}

/// One incoming serving call
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub body: RequestBody,
}

impl Request {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            body: RequestBody::Bytes(bytes.into()),
        }
    }

    pub fn from_json(value: Value) -> Self {
        Self {
            body: RequestBody::Json(value),
        }
    }

    /// Decode the body into text items; `index` is this request's position in the batch
    pub fn decode(&self, index: usize) -> EmbeddingResult<TextInput> {
        match &self.body {
            RequestBody::Bytes(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    EmbeddingError::invalid_request(index, format!("body is not valid UTF-8: {}", e))
                })?;
                let value: Value = serde_json::from_str(text).map_err(|e| {
                    EmbeddingError::invalid_request(index, format!("body is not valid JSON: {}", e))
                })?;
                TextInput::from_value(&value, index)
            }
            RequestBody::Json(value) => TextInput::from_value(value, index),
        }
    }
}

/// Decoded request body: one sentence or a list of sentences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextInput {
    Single(String),
    Batch(Vec<String>),
}

impl TextInput {
    pub fn from_value(value: &Value, index: usize) -> EmbeddingResult<Self> {
        match value {
            Value::String(text) => Ok(TextInput::Single(text.clone())),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(position, item)| match item {
                    Value::String(text) => Ok(text.clone()),
                    other => Err(EmbeddingError::invalid_request(
                        index,
                        format!("item {} must be a string, got {}", position, json_kind(other)),
                    )),
                })
                .collect::<EmbeddingResult<Vec<_>>>()
                .map(TextInput::Batch),
            other => Err(EmbeddingError::invalid_request(
                index,
                format!("body must be a string or a list of strings, got {}", json_kind(other)),
            )),
        }
    }

    /// Number of text items this request contributes
    pub fn len(&self) -> usize {
        match self {
            TextInput::Single(_) => 1,
            TextInput::Batch(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_texts(self) -> Vec<String> {
        match self {
            TextInput::Single(text) => vec![text],
            TextInput::Batch(items) => items,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
