//! Rate limiter integration tests
//!
//! Tests the gatekeeper's rate limiting stage end-to-end:
//! - Window fill, rejection, and reset
//! - Ordering ahead of authentication
//! - Eviction of idle clients
//! - The disable override

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use common::*;
use registry_gate::config::{AuthConfig, Environment, RateLimitConfig};
use registry_gate::models::AuthSubject;
use registry_gate::store::TokenStore;

fn tight_rate_limit(limit: u32, window_secs: u64) -> RateLimitConfig {
    RateLimitConfig {
        enabled: true,
        limit,
        window_secs,
        idle_timeout_secs: 600,
    }
}

fn limited_state(limit: u32, window_secs: u64) -> registry_gate::server::AppState<registry_gate::store::MemoryTokenStore> {
    create_state(
        tight_rate_limit(limit, window_secs),
        AuthConfig::default(),
        Environment::Development,
        static_source(),
    )
}

/// Test 1: A client gets `limit` requests per window, then 429
#[tokio::test]
async fn test_limit_then_reject() {
    let state = limited_state(3, 60);
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
}

/// Test 2: Requests succeed again once the window elapses
#[tokio::test]
async fn test_window_elapses() {
    let state = limited_state(2, 1);
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);

    tokio::time::sleep(StdDuration::from_millis(1100)).await;

    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

/// Test 3: Rate limiting runs before authentication and uses a distinct status
#[tokio::test]
async fn test_rate_limit_before_auth() {
    let state = limited_state(1, 60);
    let issuer = Arc::clone(&state.issuer);
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let issued = issuer
        .issue(&AuthSubject::new("u-1", "alice"), Duration::hours(1), 10)
        .await
        .unwrap();

    // First request passes both gates
    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .header("Authorization", format!("Bearer {}", issued.token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Second is throttled: 429, not 401, even with a valid token
    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .header("Authorization", format!("Bearer {}", issued.token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);

    // And an over-limit request without any token is also 429: the limiter
    // answers before authentication gets a look
    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
}

/// Test 4: A throttled request does not consume a token use
#[tokio::test]
async fn test_throttled_request_consumes_nothing() {
    let state = limited_state(1, 60);
    let issuer = Arc::clone(&state.issuer);
    let store = Arc::clone(&state.store);
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let issued = issuer
        .issue(&AuthSubject::new("u-1", "alice"), Duration::hours(1), 10)
        .await
        .unwrap();

    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .header("Authorization", format!("Bearer {}", issued.token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    for _ in 0..3 {
        let response = client
            .get(format!("http://{}/api/v1/me", addr))
            .header("Authorization", format!("Bearer {}", issued.token))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 429);
    }

    // Exactly one use spent
    let record = store.get(&issued.id).await.unwrap().unwrap();
    assert_eq!(record.remaining_uses, 9);
}

/// Test 5: The disable override lets everything through
#[tokio::test]
async fn test_disabled_limiter() {
    let state = create_state(
        RateLimitConfig {
            enabled: false,
            limit: 1,
            window_secs: 60,
            idle_timeout_secs: 600,
        },
        AuthConfig::default(),
        Environment::Development,
        static_source(),
    );
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    for _ in 0..20 {
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}

/// Test 6: An evicted idle client starts over with a fresh window
#[tokio::test]
async fn test_eviction_resets_window() {
    let state = create_state(
        RateLimitConfig {
            enabled: true,
            limit: 2,
            window_secs: 3600,
            idle_timeout_secs: 1,
        },
        AuthConfig::default(),
        Environment::Development,
        static_source(),
    );
    let limiter = Arc::clone(&state.limiter);
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
    assert_eq!(limiter.tracked_clients(), 1);

    // Let the client go stale, then run the maintenance pass
    tokio::time::sleep(StdDuration::from_millis(1200)).await;
    assert_eq!(limiter.cleanup(), 1);
    assert_eq!(limiter.tracked_clients(), 0);

    // Fresh window: the long-lived window_start is gone with the entry
    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

/// Test 7: Auth rejections and throttle rejections are distinguishable
#[tokio::test]
async fn test_status_codes_distinct() {
    let state = limited_state(1, 60);
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    // Within budget, no token: authentication answers
    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Over budget: the limiter answers
    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
}
