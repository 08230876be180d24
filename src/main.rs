//! Sentence Embedding Handler Main
//!
//! Loads the configured handler once and serves it over HTTP

use std::sync::Arc;

use sentence_embedding_handler::handler::load_handler;
use sentence_embedding_handler::{start_hyper_http_server, Context, ServerConfig, ServerState};
use tracing::{debug, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = ServerConfig::from_file(&config_path)?;

    // Initialize tracing
    let log_level = match config.monitoring.log_level.to_lowercase().as_str() {
        "trace" => "sentence_embedding_handler=trace,info".to_string(),
        "debug" => "sentence_embedding_handler=debug,info".to_string(),
        "warn" => "sentence_embedding_handler=warn,warn".to_string(),
        "error" => "sentence_embedding_handler=error,error".to_string(),
        _ => "sentence_embedding_handler=info,info".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into())
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .init();

    info!("Configuration loaded from {}", config_path);

    // Still single-threaded here: the runtime below spawns the workers
    if let Some((key, library)) = config.device.runtime_library_env() {
        std::env::set_var(key, library);
        debug!("Set {} to: {}", key, library.display());
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(config))
}

async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let context = Context::from_config(&config);
    info!(
        "Model {} ({} handler), gpu_id {:?}",
        context.manifest.model_id,
        context.manifest.variant.as_str(),
        context.system_properties.gpu_id
    );

    // Model load failure is fatal: nothing is served without it
    let handler = load_handler(&context).await?;
    info!("Handler initialized");

    let state = ServerState::new(handler, Arc::new(context), Arc::new(config));
    start_hyper_http_server(state).await?;

    Ok(())
}
