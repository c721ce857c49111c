//! Tomato Disease Classifier server binary
//!
//! Builds the network, applies the weight container best-effort, and serves
//! the HTTP API. The container is fully read and closed before the listener
//! binds; a missing or broken container only degrades accuracy, never
//! startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use tomato_classifier::model::cnn::TomatoClassifier;
use tomato_classifier::model::weights::load_weights_best_effort;
use tomato_classifier::server::{app, AppState};
use tomato_classifier::utils::logging::{init_logging, LogConfig, LogLevel};

/// Tomato Disease Classifier API server
#[derive(Parser, Debug)]
#[command(name = "tomato-classifier")]
#[command(version)]
#[command(about = "HTTP API for tomato leaf disease classification")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Path to the HDF5 weight container
    #[arg(short, long, env = "TOMATO_WEIGHTS", default_value = "best_tomato_model.h5")]
    weights: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig {
        level: LogLevel::from_str(&cli.log_level),
        ..LogConfig::default()
    };
    init_logging(&log_config).map_err(|e| anyhow::anyhow!(e))?;

    info!("Tomato Disease Classifier v{}", tomato_classifier::VERSION);
    info!("Building model architecture");
    let mut model = TomatoClassifier::new();

    info!("Loading weights from {:?}", cli.weights);
    let report = load_weights_best_effort(&mut model, &cli.weights);
    if report.fully_loaded() {
        info!(
            "Model ready: {} layers loaded, {} parameters",
            report.layers_loaded(),
            model.num_params()
        );
    } else {
        warn!(
            "Model degraded: {}/{} weighted layers loaded; serving anyway",
            report.layers_loaded(),
            report.weighted_layers()
        );
    }

    let model_source = cli
        .weights
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("best_tomato_model.h5")
        .to_string();
    let state = Arc::new(AppState::new(Arc::new(model), report, model_source));

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
