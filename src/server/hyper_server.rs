//! Hyper-based HTTP host
//!
//! Stands in for the model-serving process: accepts calls, hands them to the
//! loaded handler as a batch and writes back one output per request.

use hyper::body::HttpBody;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpSocket;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::handler::{Context, JsonHandler, Request as ServingRequest};
use crate::protocol::http::{parse_batch_body, HealthResponse, HttpErrorResponse};
use crate::server::config::ServerConfig;

/// Shared state for Hyper server
#[derive(Clone)]
pub struct ServerState {
    handler: Arc<dyn JsonHandler>,
    context: Arc<Context>,
    config: Arc<ServerConfig>,
}

impl ServerState {
    pub fn new(handler: Arc<dyn JsonHandler>, context: Arc<Context>, config: Arc<ServerConfig>) -> Self {
        Self {
            handler,
            context,
            config,
        }
    }
}

/// Bind the configured address and serve until the process is stopped
pub async fn start_hyper_http_server(state: ServerState) -> Result<(), Box<dyn std::error::Error>> {
    let bind_address = state.config.network.bind_address.clone();

    info!("Starting HTTP host on {}", bind_address);

    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = state.clone();
                handle_request(req, state)
            }))
        }
    });

    let addr: std::net::SocketAddr = bind_address.parse()?;

    let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
    // Small JSON responses; Nagle would hold them back
    socket.set_nodelay(true)?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;

    let server = Server::from_tcp(listener.into_std()?)?
        .http1_keepalive(true)
        .tcp_nodelay(true)
        .tcp_sleep_on_accept_errors(true)
        .serve(make_svc);

    info!("HTTP host listening on {}", bind_address);
    info!("   POST /predictions  - Encode one request");
    info!("   POST /batch        - Encode a batch of requests");
    info!("   GET  /ping         - Health check");
    info!("   GET  /             - Server info");

    server.await?;

    Ok(())
}

/// Route one call and decorate the response with CORS and request-id headers
pub async fn handle_request(req: Request<Body>, state: ServerState) -> Result<Response<Body>, Infallible> {
    let request_id = Uuid::new_v4();
    let origin = req
        .headers()
        .get("origin")
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!(%request_id, %method, %path, "Incoming call");

    let mut response = match (&method, path.as_str()) {
        (&Method::POST, "/batch") => handle_batch(req, state, request_id).await,
        (&Method::POST, p) if p == "/predictions" || p.starts_with("/predictions/") => {
            handle_predictions(req, state, request_id).await
        }
        (&Method::GET, "/ping") => handle_ping(&state),
        (&Method::GET, "/") => handle_root(&state),
        (&Method::OPTIONS, _) => handle_options(),
        _ => error_response(StatusCode::NOT_FOUND, HttpErrorResponse::not_found()),
    };

    let headers = response.headers_mut();
    headers.insert("access-control-allow-origin", origin);
    headers.insert("access-control-allow-methods", HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert("access-control-allow-headers", HeaderValue::from_static("content-type"));
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        headers.insert("x-request-id", value);
    }

    Ok(response)
}

/// OPTIONS handler for CORS preflight
fn handle_options() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// Root endpoint - server info
fn handle_root(state: &ServerState) -> Response<Body> {
    let info = serde_json::json!({
        "name": "Sentence Embedding Handler",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.context.manifest.model_id,
        "variant": state.context.manifest.variant,
        "gpu_id": state.context.system_properties.gpu_id,
        "device": state.handler.device().map(|device| device.to_string()),
        "endpoints": {
            "predictions": { "method": "POST", "path": "/predictions" },
            "batch": { "method": "POST", "path": "/batch" },
            "ping": { "method": "GET", "path": "/ping" }
        }
    });
    json_response(StatusCode::OK, info.to_string())
}

/// Health check endpoint
fn handle_ping(state: &ServerState) -> Response<Body> {
    if !state.handler.is_ready() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, HttpErrorResponse::model_not_ready());
    }
    let health = HealthResponse::healthy(&state.context.manifest.model_id);
    match serde_json::to_string(&health) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, HttpErrorResponse::internal_error(e.to_string())),
    }
}

/// Single request: the raw body is the request body
async fn handle_predictions(req: Request<Body>, state: ServerState, request_id: Uuid) -> Response<Body> {
    let body = match read_body(req, state.config.network.max_body_size).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    match run_batch(&state, vec![ServingRequest::from_bytes(body)], request_id).await {
        Ok(mut outputs) => match outputs.pop() {
            Some(output) => json_response(StatusCode::OK, output.to_string()),
            None => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                HttpErrorResponse::internal_error("handler returned no output"),
            ),
        },
        Err(response) => response,
    }
}

/// Batch: a JSON array whose elements are the request bodies
async fn handle_batch(req: Request<Body>, state: ServerState, request_id: Uuid) -> Response<Body> {
    let body = match read_body(req, state.config.network.max_body_size).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    let requests = match parse_batch_body(&body) {
        Ok(requests) => requests,
        Err(error) => return error_response(StatusCode::BAD_REQUEST, error),
    };

    match run_batch(&state, requests, request_id).await {
        Ok(outputs) => json_response(StatusCode::OK, serde_json::Value::Array(outputs).to_string()),
        Err(response) => response,
    }
}

async fn read_body(req: Request<Body>, limit: usize) -> Result<Vec<u8>, Response<Body>> {
    let declared = req
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.map_or(false, |len| len > limit) {
        return Err(error_response(StatusCode::PAYLOAD_TOO_LARGE, HttpErrorResponse::payload_too_large(limit)));
    }

    // Stop reading as soon as the limit is crossed; chunked bodies carry no length
    let mut body = req.into_body();
    let mut bytes = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|e| {
            error_response(
                StatusCode::BAD_REQUEST,
                HttpErrorResponse::new("Failed to read request body").with_details(e.to_string()),
            )
        })?;
        if bytes.len() + chunk.len() > limit {
            return Err(error_response(StatusCode::PAYLOAD_TOO_LARGE, HttpErrorResponse::payload_too_large(limit)));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Run the blocking handler off the async workers
async fn run_batch(
    state: &ServerState,
    requests: Vec<ServingRequest>,
    request_id: Uuid,
) -> Result<Vec<serde_json::Value>, Response<Body>> {
    let started = Instant::now();
    let count = requests.len();
    let handler = Arc::clone(&state.handler);
    let context = Arc::clone(&state.context);

    let result = tokio::task::spawn_blocking(move || handler.handle_json(&requests, &context)).await;

    let outputs = match result {
        Ok(Ok(outputs)) => outputs,
        Ok(Err(e)) if e.is_client_error() => {
            warn!(%request_id, "Rejected batch: {}", e);
            return Err(error_response(StatusCode::BAD_REQUEST, HttpErrorResponse::from_embedding_error(&e)));
        }
        Ok(Err(e)) => {
            error!(%request_id, "Inference failed: {:?}", e);
            let status = if state.handler.is_ready() {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            return Err(error_response(status, HttpErrorResponse::from_embedding_error(&e)));
        }
        Err(e) => {
            error!(%request_id, "Handler task failed: {}", e);
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                HttpErrorResponse::internal_error(e.to_string()),
            ));
        }
    };

    if state.config.monitoring.log_timings {
        info!(%request_id, requests = count, "Handled batch in {:?}", started.elapsed());
    } else {
        debug!(%request_id, requests = count, "Handled batch in {:?}", started.elapsed());
    }
    Ok(outputs)
}

fn json_response(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Helper to create error responses
fn error_response(status: StatusCode, error: HttpErrorResponse) -> Response<Body> {
    let body = serde_json::to_string(&error).unwrap_or_else(|_| r#"{"error":"Internal Server Error"}"#.to_string());
    json_response(status, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EncodingHandler, RecordHandler};
    use crate::models::encoder::stub::StubEncoder;
    use crate::models::{Device, ModelConfig, TokenizerConfig};
    use hyper::body::{to_bytes, Bytes};
    use serde_json::{json, Value};

    fn state_with(handler: Arc<dyn JsonHandler>) -> ServerState {
        let mut config = ServerConfig::default();
        config.network.max_body_size = 256;
        ServerState::new(
            handler,
            Arc::new(Context::new(ModelConfig::default(), TokenizerConfig::default())),
            Arc::new(config),
        )
    }

    fn stub_state() -> ServerState {
        state_with(Arc::new(EncodingHandler::with_encoder(StubEncoder::default())))
    }

    fn post(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(req: Request<Body>, state: ServerState) -> (StatusCode, Value) {
        let response = handle_request(req, state).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// Vectors travel as f64 text; compare them back at f32 precision
    fn assert_vectors(actual: &Value, expected: &[Vec<f32>]) {
        let actual: Vec<Vec<f32>> = serde_json::from_value(actual.clone()).unwrap();
        assert_eq!(actual.len(), expected.len());
        for (got, want) in actual.iter().zip(expected) {
            assert_eq!(got.len(), want.len());
            for (g, w) in got.iter().zip(want) {
                assert!((g - w).abs() <= f32::EPSILON, "{} != {}", g, w);
            }
        }
    }

    #[tokio::test]
    async fn test_predictions_single_string() {
        let (status, body) = call(post("/predictions", r#""hello world""#), stub_state()).await;

        assert_eq!(status, StatusCode::OK);
        assert_vectors(&body, &[StubEncoder::vector_for("hello world")]);
    }

    #[tokio::test]
    async fn test_predictions_with_model_path() {
        let (status, body) = call(post("/predictions/my-model", r#"["a","b"]"#), stub_state()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_regroups_per_request() {
        let (status, body) = call(post("/batch", r#"["hello world", ["a","b","c"], []]"#), stub_state()).await;

        assert_eq!(status, StatusCode::OK);
        let groups = body.as_array().unwrap();
        assert_eq!(groups.len(), 3);
        assert_vectors(&groups[0], &[StubEncoder::vector_for("hello world")]);
        assert_vectors(
            &groups[1],
            &[StubEncoder::vector_for("a"), StubEncoder::vector_for("b"), StubEncoder::vector_for("c")],
        );
        assert_eq!(groups[2], json!([]));
    }

    #[tokio::test]
    async fn test_record_handler_output() {
        let state = state_with(Arc::new(RecordHandler::with_encoder(StubEncoder::default())));
        let (status, body) = call(post("/predictions", r#"["x","y"]"#), state).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "sentence_embedding");
        assert_eq!(body["data_type"], "FLOAT32");
        assert_eq!(body["shape"], 2);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (status, body) = call(post("/predictions", "not json"), stub_state()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_non_string_items_are_bad_request() {
        let (status, body) = call(post("/batch", r#"["ok", [1, 2]]"#), stub_state()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"].as_str().unwrap().starts_with("request 1"));
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let big = format!("\"{}\"", "x".repeat(300));
        let (status, body) = call(post("/predictions", &big), stub_state()).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_streamed_body_stops_at_limit() {
        const TOTAL: usize = 8 * 1024 * 1024;
        let (mut sender, body) = Body::channel();
        let feeder = tokio::spawn(async move {
            let chunk = Bytes::from(vec![b'x'; 1024]);
            let mut sent = 0;
            while sent < TOTAL {
                if sender.send_data(chunk.clone()).await.is_err() {
                    break;
                }
                sent += chunk.len();
            }
            sent
        });

        let req = Request::builder()
            .method(Method::POST)
            .uri("/predictions")
            .body(body)
            .unwrap();
        let (status, body) = call(req, stub_state()).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
        let sent = feeder.await.unwrap();
        assert!(sent < TOTAL, "server consumed {} bytes", sent);
    }

    #[tokio::test]
    async fn test_ping() {
        let (status, body) = call(Request::get("/ping").body(Body::empty()).unwrap(), stub_state()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Healthy");

        let unloaded = state_with(Arc::new(EncodingHandler::<StubEncoder>::new()));
        let (status, _) = call(Request::get("/ping").body(Body::empty()).unwrap(), unloaded).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unloaded_handler_rejects_predictions() {
        let unloaded = state_with(Arc::new(EncodingHandler::<StubEncoder>::new()));
        let (status, body) = call(post("/predictions", r#""x""#), unloaded).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "MODEL_NOT_READY");
    }

    #[tokio::test]
    async fn test_root_and_not_found() {
        let (status, body) = call(Request::get("/").body(Body::empty()).unwrap(), stub_state()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["variant"], "embedding");
        assert_eq!(body["device"], "cpu");

        let unloaded = state_with(Arc::new(EncodingHandler::<StubEncoder>::new()));
        let (_, body) = call(Request::get("/").body(Body::empty()).unwrap(), unloaded).await;
        assert_eq!(body["device"], Value::Null);

        let (status, _) = call(Request::get("/nope").body(Body::empty()).unwrap(), stub_state()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_root_reports_resolved_device() {
        let mut context = Context::new(ModelConfig::default(), TokenizerConfig::default());
        // Requested GPU, but the encoder fell back to CPU
        context.system_properties.gpu_id = Some(0);
        let state = ServerState::new(
            Arc::new(EncodingHandler::with_encoder(StubEncoder::on_device(Device::Cpu))),
            Arc::new(context),
            Arc::new(ServerConfig::default()),
        );

        let (_, body) = call(Request::get("/").body(Body::empty()).unwrap(), state).await;
        assert_eq!(body["gpu_id"], 0);
        assert_eq!(body["device"], "cpu");

        let state = state_with(Arc::new(EncodingHandler::with_encoder(StubEncoder::on_device(Device::Cuda(0)))));
        let (_, body) = call(Request::get("/").body(Body::empty()).unwrap(), state).await;
        assert_eq!(body["device"], "cuda:0");
    }

    #[tokio::test]
    async fn test_cors_and_request_id_headers() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/predictions")
            .header("origin", "http://example.com")
            .body(Body::empty())
            .unwrap();
        let response = handle_request(req, stub_state()).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["access-control-allow-origin"], "http://example.com");
        assert!(response.headers().contains_key("x-request-id"));
    }
}
