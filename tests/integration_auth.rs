//! Authentication flow integration tests
//!
//! Tests the gatekeeper's authentication stage end-to-end:
//! - Token issuance and bounded-use consumption
//! - Revocation and expiration
//! - Header handling and rejection shape
//! - Credential-source degradation per environment

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::*;
use registry_gate::config::{AuthConfig, Environment};
use registry_gate::models::{AuthIdentity, AuthSubject};
use registry_gate::store::TokenStore;

fn test_subject() -> AuthSubject {
    AuthSubject::new("u-1", "alice").with_roles(vec!["uploader".to_string()])
}

/// Test 1: Login issues a token that opens protected routes
#[tokio::test]
async fn test_login_and_protected_access() {
    let state = create_test_state();
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let issued = login_ok(&client, addr).await;
    assert!(!issued.token.is_empty());
    assert!(!issued.id.is_empty());

    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .header("Authorization", format!("Bearer {}", issued.token))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let identity: AuthIdentity = response.json().await.unwrap();
    assert_eq!(identity.subject.username, ADMIN_USERNAME);
    assert_eq!(identity.token_id, issued.id);
}

/// Test 2: Login failure is terse and identical for bad username and password
#[tokio::test]
async fn test_login_failure_uniform() {
    let state = create_test_state();
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let bad_password = login(&client, addr, ADMIN_USERNAME, "wrong").await;
    let bad_username = login(&client, addr, "root", ADMIN_PASSWORD).await;

    assert_eq!(bad_password.status(), 401);
    assert_eq!(bad_username.status(), 401);

    let body1 = bad_password.text().await.unwrap();
    let body2 = bad_username.text().await.unwrap();
    assert_eq!(body1, body2);
}

/// Test 3: Missing token on a protected path is rejected with the bearer scheme
#[tokio::test]
async fn test_missing_token_rejected() {
    let state = create_test_state();
    let (addr, _shutdown) = run_test_server(state).await;

    let response = reqwest::get(format!("http://{}/api/v1/me", addr))
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(
        response.headers().get("www-authenticate").unwrap(),
        "Bearer"
    );
}

/// Test 4: A garbage token is rejected without consuming any use
#[tokio::test]
async fn test_garbage_token_consumes_nothing() {
    let state = create_test_state();
    let store = Arc::clone(&state.store);
    let issuer = Arc::clone(&state.issuer);
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let issued = issuer
        .issue(&test_subject(), Duration::hours(1), 5)
        .await
        .unwrap();

    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .header("Authorization", "Bearer not.a.token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // The stored budget is untouched
    let record = store.get(&issued.id).await.unwrap().unwrap();
    assert_eq!(record.remaining_uses, 5);
}

/// Test 5: A token with max_uses = 2 authorizes exactly two requests
#[tokio::test]
async fn test_use_budget_exhaustion() {
    let state = create_test_state();
    let issuer = Arc::clone(&state.issuer);
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let issued = issuer
        .issue(&test_subject(), Duration::hours(1), 2)
        .await
        .unwrap();

    for expected_remaining in [1u32, 0] {
        let response = client
            .get(format!("http://{}/api/v1/me", addr))
            .header("Authorization", format!("Bearer {}", issued.token))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let identity: AuthIdentity = response.json().await.unwrap();
        assert_eq!(identity.remaining_uses, expected_remaining);
    }

    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .header("Authorization", format!("Bearer {}", issued.token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

/// Test 6: No more than N of N+k concurrent requests succeed
#[tokio::test]
async fn test_concurrent_use_budget() {
    let state = create_test_state();
    let issuer = Arc::clone(&state.issuer);
    let (addr, _shutdown) = run_test_server(state).await;

    let issued = issuer
        .issue(&test_subject(), Duration::hours(1), 3)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let token = issued.token.clone();
        handles.push(tokio::spawn(async move {
            let client = reqwest::Client::new();
            client
                .get(format!("http://{}/api/v1/me", addr))
                .header("Authorization", format!("Bearer {}", token))
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }));
    }

    let mut ok = 0;
    let mut unauthorized = 0;
    for handle in handles {
        match handle.await.unwrap() {
            200 => ok += 1,
            401 => unauthorized += 1,
            other => panic!("Unexpected status {}", other),
        }
    }

    assert_eq!(ok, 3);
    assert_eq!(unauthorized, 7);
}

/// Test 7: Revocation takes effect on the very next request
#[tokio::test]
async fn test_revocation_immediate() {
    let state = create_test_state();
    let issuer = Arc::clone(&state.issuer);
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let admin = login_ok(&client, addr).await;
    let victim = issuer
        .issue(&test_subject(), Duration::hours(1), 100)
        .await
        .unwrap();

    let response = client
        .delete(format!("http://{}/auth/token/{}", addr, victim.id))
        .header("Authorization", format!("Bearer {}", admin.token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .header("Authorization", format!("Bearer {}", victim.token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

/// Test 8: An expired token is rejected even with uses left
#[tokio::test]
async fn test_expired_token_rejected() {
    let state = create_test_state();
    let issuer = Arc::clone(&state.issuer);
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let issued = issuer
        .issue(&test_subject(), Duration::hours(-1), 100)
        .await
        .unwrap();

    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .header("Authorization", format!("Bearer {}", issued.token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

/// Test 9: The legacy header is accepted alongside the primary one
#[tokio::test]
async fn test_legacy_header_accepted() {
    let state = create_test_state();
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let issued = login_ok(&client, addr).await;

    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .header("X-Authorization", format!("Bearer {}", issued.token))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

/// Test 10: Health stays open while protected routes stay closed
#[tokio::test]
async fn test_exempt_vs_protected() {
    let state = create_test_state();
    let (addr, _shutdown) = run_test_server(state).await;

    let health = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(health.status(), 200);

    let me = reqwest::get(format!("http://{}/api/v1/me", addr)).await.unwrap();
    assert_eq!(me.status(), 401);
}

/// Test 11: Production rejects login when the credential source is down
#[tokio::test]
async fn test_credential_source_down_production() {
    let state = create_state(
        open_rate_limit(),
        AuthConfig::default(),
        Environment::Production,
        Arc::new(FailingCredentialSource),
    );
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let response = login(&client, addr, ADMIN_USERNAME, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), 500);
}

/// Test 12: Development degrades to a generated fallback credential
#[tokio::test]
async fn test_credential_source_down_development() {
    let state = create_state(
        open_rate_limit(),
        AuthConfig::default(),
        Environment::Development,
        Arc::new(FailingCredentialSource),
    );
    let issuer = Arc::clone(&state.issuer);
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    // A first attempt provokes fallback generation; a guess still fails
    let response = login(&client, addr, ADMIN_USERNAME, "guess").await;
    assert_eq!(response.status(), 401);

    // The generated credentials do work
    let (username, password) = issuer.generated_fallback().unwrap();
    let response = login(&client, addr, &username, &password).await;
    assert_eq!(response.status(), 200);
}
