//! QA Server - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use qa_server::{
    DocumentExtractor, IdleEvictor, ModelRegistry, QaService, api, config::ServerConfig, device,
    metrics, models::OnnxLoader,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "qa-server")]
#[command(about = "Extractive question answering API", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override API port
    #[arg(long)]
    port: Option<u16>,

    /// Override the default model id
    #[arg(long)]
    default_model: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "json")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .json()
                .init();
        }
    }

    tracing::info!("Starting QA server");

    // Load configuration
    let mut config = ServerConfig::load(cli.config)?;

    // CLI overrides
    if let Some(port) = cli.port {
        config.api_port = port;
    }
    if let Some(model) = cli.default_model {
        config.default_model = model;
    }

    config.validate()?;

    tracing::info!(
        api_port = config.api_port,
        default_model = %config.default_model,
        models = config.models.len(),
        idle_eviction_secs = ?config.idle_eviction_secs,
        "Configuration loaded"
    );

    let prometheus_handle = metrics::setup_metrics()?;

    let device = device::preferred(config.use_gpu);
    let loader = Arc::new(OnnxLoader::new(
        config.model_cache_dir.clone(),
        config.inference.clone(),
    ));
    let registry = Arc::new(ModelRegistry::new(&config, loader, device)?);

    if config.preload_default_model {
        let default_model = registry.default_model().to_string();
        tracing::info!(model_id = %default_model, "Preloading default model");
        // The server still starts; the next request retries the load
        if let Err(e) = registry.ensure_loaded(&default_model).await {
            tracing::error!(model_id = %default_model, error = %e, "Failed to preload default model");
        }
    }

    let evictor_handle = config.idle_eviction_secs.map(|idle_secs| {
        let evictor = Arc::new(IdleEvictor::new(
            registry.clone(),
            idle_secs,
            config.eviction_interval_secs,
        ));
        tokio::spawn(evictor.run())
    });

    let extractor = Arc::new(DocumentExtractor::new(config.extraction.clone()));
    tracing::info!(ocr_available = extractor.ocr_available(), "Document extractor ready");

    let app_state = api::AppState {
        registry: registry.clone(),
        qa: QaService::new(registry.clone()),
        extractor,
        prometheus_handle,
        max_upload_bytes: config.max_upload_bytes,
        cors_origins: config.cors_origins.clone(),
    };

    let app = api::create_router(app_state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("Shutting down...");

    if let Some(handle) = evictor_handle {
        handle.abort();
    }

    registry.shutdown().await;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
