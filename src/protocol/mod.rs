//! Wire types of the HTTP host

pub mod http;

pub use http::{parse_batch_body, HealthResponse, HttpErrorResponse};
