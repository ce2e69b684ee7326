//! HTTP router for registry-gate
//!
//! This module defines the axum router and the small set of handlers the
//! gatekeeper itself owns:
//! - Health check (exempt from both gates)
//! - Token issuance and revocation
//! - Caller profile (protected; consumes a use like every protected request)
//!
//! The registry's business endpoints mount behind the same middleware pair.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

use crate::auth::{auth_middleware, TokenIssuer};
use crate::error::AuthError;
use crate::models::{AuthIdentity, LoginRequest, LoginResponse};
use crate::ratelimit::{rate_limit_middleware, RateLimiter};
use crate::store::TokenStore;

/// Shared application state
pub struct AppState<S: TokenStore> {
    /// Token issuer and consumer
    pub issuer: Arc<TokenIssuer<S>>,

    /// Per-client rate limiter
    pub limiter: Arc<RateLimiter>,

    /// Token store
    pub store: Arc<S>,
}

impl<S: TokenStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            issuer: Arc::clone(&self.issuer),
            limiter: Arc::clone(&self.limiter),
            store: Arc::clone(&self.store),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Build the main application router
///
/// The middleware pipeline is composed here, ordered rate limiter, then
/// authentication, then handler: the limiter layer is added last so it wraps
/// the authentication layer and runs first on every request.
pub fn build_router<S: TokenStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/token", post(login_handler::<S>))
        .route("/auth/token/:id", delete(revoke_handler::<S>))
        .route("/api/v1/me", get(me_handler))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.issuer),
            auth_middleware::<S>,
        ))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.limiter),
            rate_limit_middleware,
        ))
        .with_state(state)
}

/// Convenience wrapper producing the connect-info service tests and `main` use
pub fn into_service<S: TokenStore + 'static>(
    state: AppState<S>,
) -> axum::extract::connect_info::IntoMakeServiceWithConnectInfo<Router, SocketAddr> {
    build_router(state).into_make_service_with_connect_info::<SocketAddr>()
}

/// Health check endpoint handler
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Token issuance endpoint handler
///
/// Exempt from authentication (the caller has no token yet); performs its own
/// credential check against the credential source.
async fn login_handler<S: TokenStore + 'static>(
    State(state): State<AppState<S>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let issued = state
        .issuer
        .login(&request.username, &request.password)
        .await?;

    Ok(Json(LoginResponse {
        id: issued.id,
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}

/// Token revocation endpoint handler
async fn revoke_handler<S: TokenStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.issuer.revoke(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Caller profile endpoint handler
///
/// Echoes the identity the authentication middleware attached, including the
/// uses left after this request.
async fn me_handler(identity: Option<Extension<AuthIdentity>>) -> Result<Json<AuthIdentity>, ApiError> {
    match identity {
        Some(Extension(identity)) => Ok(Json(identity)),
        // Only reachable if the route is wired outside the auth layer
        None => Err(ApiError::internal("identity missing from request")),
    }
}

/// Error response for the gatekeeper's own handlers
///
/// Terse and uniform: invalid logins never reveal which of username/password
/// was wrong, and internal failures carry no detail.
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    fn internal(context: &str) -> Self {
        error!(context, "Internal error in handler");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error",
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => Self {
                status: StatusCode::UNAUTHORIZED,
                message: "Invalid credentials",
            },
            AuthError::CredentialSource(e) => {
                error!(error = %e, "Credential source failure");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal server error",
                }
            }
            AuthError::Store(e) => {
                error!(error = %e, "Token store failure");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal server error",
                }
            }
            _ => Self {
                status: StatusCode::UNAUTHORIZED,
                message: "Invalid or missing token",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message }).to_string();
        (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
