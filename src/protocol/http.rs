//! HTTP Protocol
//!
//! Request/response bodies of the serving endpoints:
//! - `POST /predictions`: body is one request body, response is its output
//! - `POST /batch`: body is a JSON array of request bodies, response is the
//!   array of outputs in the same order
//! - `GET /ping`: `{"status": "Healthy"}`

use serde::{Deserialize, Serialize};

use crate::handler::Request;
use crate::models::EmbeddingError;

/// Split a `/batch` body into one serving request per array element
pub fn parse_batch_body(body: &[u8]) -> Result<Vec<Request>, HttpErrorResponse> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| HttpErrorResponse::invalid_json().with_details(e.to_string()))?;

    match value {
        serde_json::Value::Array(items) => Ok(items.into_iter().map(Request::from_json).collect()),
        _ => Err(HttpErrorResponse::new("Batch body must be a JSON array of request bodies")
            .with_code("INVALID_BATCH")),
    }
}

/// HTTP Error Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    /// Error message
    pub error: String,

    /// Error code (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Additional details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HttpErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            details: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn invalid_json() -> Self {
        Self::new("Invalid JSON").with_code("INVALID_JSON")
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(format!("Request body exceeds the maximum of {} bytes", limit)).with_code("PAYLOAD_TOO_LARGE")
    }

    pub fn model_not_ready() -> Self {
        Self::new("Model is not loaded").with_code("MODEL_NOT_READY")
    }

    pub fn not_found() -> Self {
        Self::new("Not Found").with_code("NOT_FOUND")
    }

    pub fn internal_error(details: impl Into<String>) -> Self {
        Self::new("Internal server error occurred during inference")
            .with_code("INTERNAL_ERROR")
            .with_details(details)
    }

    /// Map a handler failure to the body sent to the client
    pub fn from_embedding_error(error: &EmbeddingError) -> Self {
        match error {
            EmbeddingError::InvalidRequest { index, message } => Self::new("Invalid request body")
                .with_code("INVALID_REQUEST")
                .with_details(format!("request {}: {}", index, message)),
            EmbeddingError::NotInitialized => Self::model_not_ready(),
            other => Self::internal_error(other.to_string()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy(model: impl Into<String>) -> Self {
        Self {
            status: "Healthy".to_string(),
            model: model.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RequestBody;
    use serde_json::json;

    #[test]
    fn test_parse_batch_body() {
        let requests = parse_batch_body(br#"["x", ["a", "b"], []]"#).unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].body, RequestBody::Json(json!(["a", "b"])));
    }

    #[test]
    fn test_parse_batch_body_rejects_non_array() {
        let err = parse_batch_body(br#""x""#).unwrap_err();
        assert_eq!(err.code.as_deref(), Some("INVALID_BATCH"));

        let err = parse_batch_body(b"[").unwrap_err();
        assert_eq!(err.code.as_deref(), Some("INVALID_JSON"));
        assert!(err.details.is_some());
    }

    #[test]
    fn test_error_response() {
        let err = HttpErrorResponse::new("Test error")
            .with_code("TEST_ERROR")
            .with_details("Additional details");

        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, Some("TEST_ERROR".to_string()));
        assert_eq!(err.details, Some("Additional details".to_string()));
    }

    #[test]
    fn test_from_embedding_error() {
        let err = HttpErrorResponse::from_embedding_error(&EmbeddingError::InvalidRequest {
            index: 2,
            message: "body is not valid JSON".to_string(),
        });
        assert_eq!(err.code.as_deref(), Some("INVALID_REQUEST"));
        assert_eq!(err.details.as_deref(), Some("request 2: body is not valid JSON"));

        let err = HttpErrorResponse::from_embedding_error(&EmbeddingError::BatchMismatch { outputs: 1, expected: 2 });
        assert_eq!(err.code.as_deref(), Some("INTERNAL_ERROR"));
    }

    #[test]
    fn test_error_serialization_skips_empty_fields() {
        let body = serde_json::to_value(HttpErrorResponse::new("boom")).unwrap();
        assert_eq!(body, json!({"error": "boom"}));
    }
}
