//! registry-gate - Request gatekeeper for a package registry
//!
//! This is the main entry point for the registry-gate service.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use registry_gate::auth::TokenIssuer;
use registry_gate::config::Config;
use registry_gate::credentials::{resolve_signing_secret, EnvCredentialSource};
use registry_gate::ratelimit::RateLimiter;
use registry_gate::server::{AppState, Server};
use registry_gate::store::SqliteTokenStore;

/// registry-gate - Request gatekeeper for a package registry
#[derive(Parser, Debug)]
#[command(name = "registry-gate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "REGISTRY_GATE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Clamp out-of-range values after logging is up so the warnings land
    let config = config.validate();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        "Starting registry-gate"
    );

    // Resolve the signing secret; production refuses to start without one
    let credentials = Arc::new(EnvCredentialSource);
    let signing_secret = resolve_signing_secret(credentials.as_ref(), config.environment).await?;

    // Initialize the token store
    let store = Arc::new(SqliteTokenStore::new(&config.store.path).await?);
    info!(path = %config.store.path, "Token store initialized");

    // Initialize the gatekeeper pair
    let issuer = Arc::new(TokenIssuer::new(
        Arc::clone(&store),
        credentials,
        config.environment,
        signing_secret,
        &config.auth,
    ));
    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    info!(
        rate_limit_enabled = config.rate_limit.enabled,
        limit = config.rate_limit.limit,
        window_secs = config.rate_limit.window_secs,
        "Gatekeeper initialized"
    );

    // Create application state and start the HTTP server
    let state = AppState {
        issuer,
        limiter,
        store,
    };
    let server = Server::new(config.server.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    server.run(shutdown_signal()).await?;

    info!("registry-gate shutdown complete");
    Ok(())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Ok(Config::from_env())
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
