//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use registry_gate::auth::TokenIssuer;
use registry_gate::config::{AuthConfig, Environment, RateLimitConfig};
use registry_gate::credentials::{AdminCredentials, CredentialSource, StaticCredentialSource};
use registry_gate::error::CredentialError;
use registry_gate::models::{LoginRequest, LoginResponse};
use registry_gate::ratelimit::RateLimiter;
use registry_gate::server::AppState;
use registry_gate::store::MemoryTokenStore;

/// Signing secret used by all integration servers
pub const TEST_SECRET: &str = "integration-test-secret";

/// Admin credentials served by the static credential source
pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "integration-admin-password";

/// Credential source that always fails, as an unreachable secret manager would
pub struct FailingCredentialSource;

#[async_trait]
impl CredentialSource for FailingCredentialSource {
    async fn admin_credentials(&self) -> Result<AdminCredentials, CredentialError> {
        Err(CredentialError::Unreachable("secret service down".into()))
    }

    async fn signing_secret(&self) -> Result<String, CredentialError> {
        Err(CredentialError::Unreachable("secret service down".into()))
    }
}

/// Rate-limit configuration generous enough to stay out of auth tests' way
pub fn open_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        enabled: true,
        limit: 5_000,
        window_secs: 60,
        idle_timeout_secs: 600,
    }
}

/// Create a test state with the given knobs
pub fn create_state(
    rate_limit: RateLimitConfig,
    auth: AuthConfig,
    environment: Environment,
    source: Arc<dyn CredentialSource>,
) -> AppState<MemoryTokenStore> {
    let store = Arc::new(MemoryTokenStore::new());
    let issuer = Arc::new(TokenIssuer::new(
        Arc::clone(&store),
        source,
        environment,
        TEST_SECRET,
        &auth,
    ));
    let limiter = Arc::new(RateLimiter::new(&rate_limit));

    AppState {
        issuer,
        limiter,
        store,
    }
}

/// Create a test state with default auth knobs and an open rate limit
pub fn create_test_state() -> AppState<MemoryTokenStore> {
    create_state(
        open_rate_limit(),
        AuthConfig::default(),
        Environment::Development,
        static_source(),
    )
}

/// Static credential source with the test admin credentials
pub fn static_source() -> Arc<dyn CredentialSource> {
    Arc::new(StaticCredentialSource::new(ADMIN_USERNAME, ADMIN_PASSWORD, TEST_SECRET).unwrap())
}

/// Run a test server in the background and return its address
///
/// The server shuts down when the returned sender is dropped or sent.
pub async fn run_test_server(
    state: AppState<MemoryTokenStore>,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = registry_gate::server::into_service(state);

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    (addr, shutdown_tx)
}

/// Log in through the issuance endpoint and return the response body
pub async fn login(
    client: &reqwest::Client,
    addr: SocketAddr,
    username: &str,
    password: &str,
) -> reqwest::Response {
    client
        .post(format!("http://{}/auth/token", addr))
        .json(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })
        .send()
        .await
        .expect("Login request failed")
}

/// Log in with the test admin credentials, expecting success
pub async fn login_ok(client: &reqwest::Client, addr: SocketAddr) -> LoginResponse {
    let response = login(client, addr, ADMIN_USERNAME, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), 200, "Expected login to succeed");
    response.json().await.expect("Invalid login response body")
}
