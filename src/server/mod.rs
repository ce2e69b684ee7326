//! HTTP server components for registry-gate
//!
//! This module provides the server infrastructure:
//! - Router configuration and the gatekeeper middleware pipeline
//! - Server lifecycle management with graceful shutdown
//! - The periodic maintenance task (rate-state eviction, expired-token purge)

pub mod router;

pub use router::{build_router, into_service, AppState, HealthResponse};

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::store::TokenStore;

/// Interval between maintenance passes
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// HTTP server for registry-gate
///
/// Manages the axum server lifecycle, including:
/// - Binding to the configured address
/// - Applying middleware layers in gatekeeper order
/// - Graceful shutdown handling
/// - Background maintenance so limiter and store memory stay bounded
pub struct Server<S: TokenStore + 'static> {
    config: ServerConfig,
    state: AppState<S>,
}

impl<S: TokenStore + 'static> Server<S> {
    /// Create a new server instance
    pub fn new(config: ServerConfig, state: AppState<S>) -> Self {
        Self { config, state }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.config.host.parse().unwrap_or([0, 0, 0, 0].into()),
            self.config.port,
        )
    }

    /// Run the server until the shutdown future resolves
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.bind_addr();

        let maintenance = tokio::spawn(maintenance_loop(self.state.clone()));

        let app = build_router(self.state)
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .into_make_service_with_connect_info::<SocketAddr>();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!("Server listening on {}", addr);

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()));

        maintenance.abort();

        tracing::info!("Server shutdown complete");
        result
    }
}

/// Periodically reclaim memory for idle clients and expired tokens
async fn maintenance_loop<S: TokenStore>(state: AppState<S>) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    interval.tick().await; // first tick fires immediately

    loop {
        interval.tick().await;

        let evicted = state.limiter.cleanup();
        if evicted > 0 {
            debug!(evicted, "Evicted idle rate-limit clients");
        }

        match state.store.purge_expired().await {
            Ok(purged) if purged > 0 => debug!(purged, "Purged expired tokens"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Expired-token purge failed"),
        }
    }
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Failed to serve requests
    #[error("Server error: {0}")]
    Serve(String),
}
