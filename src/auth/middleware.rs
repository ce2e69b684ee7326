//! Authentication middleware
//!
//! Runs after the rate limiter and in front of every protected handler:
//! exempt-path check, bearer extraction, signature/expiry verification, then
//! use-consumption against the token store. The resolved identity is attached
//! to the request extensions for downstream handlers.
//!
//! Every protected request goes through consumption, including ones that
//! merely read the caller's own profile; otherwise the use budget would not
//! actually be enforced.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::error::AuthError;
use crate::store::TokenStore;

use super::issuer::TokenIssuer;

/// Paths that bypass authentication
///
/// Health checks, the issuance endpoint (it has no token yet and performs its
/// own credential check), and public documentation.
pub const EXEMPT_PATHS: &[&str] = &["/health", "/auth/token", "/docs"];

/// Alternate header name some registry clients send the token under
pub const LEGACY_AUTH_HEADER: &str = "x-authorization";

/// Check whether a path is exempt from authentication
///
/// Exemptions match exactly, except documentation which is a subtree. In
/// particular `/auth/token/{id}` (revocation) is NOT exempt; only the
/// issuance endpoint itself is.
pub fn is_exempt(path: &str) -> bool {
    if EXEMPT_PATHS.contains(&path) {
        return true;
    }
    path.starts_with("/docs/")
}

/// Extract a bearer token from the primary or legacy header
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .or_else(|| headers.get(LEGACY_AUTH_HEADER))?
        .to_str()
        .ok()?;

    value.strip_prefix("Bearer ").map(str::trim)
}

/// Authentication middleware function
///
/// This middleware:
/// 1. Lets exempt paths through untouched
/// 2. Extracts the bearer token from either accepted header
/// 3. Verifies signature and expiration, then consumes one use
/// 4. Attaches the resolved identity to the request extensions
pub async fn auth_middleware<S: TokenStore + 'static>(
    State(issuer): State<Arc<TokenIssuer<S>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    if is_exempt(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let Some(raw) = extract_bearer(request.headers()) else {
        return Err(AuthRejection::from_error(AuthError::MissingCredential));
    };

    let identity = issuer
        .verify_and_consume(raw)
        .await
        .map_err(AuthRejection::from_error)?;

    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

/// Rejection response produced by the authentication middleware
///
/// Unauthorized responses advertise the bearer scheme so well-behaved clients
/// can self-correct; beyond that the body is terse and uniform, never saying
/// whether the token was missing, malformed, expired, exhausted, or revoked in
/// a way that distinguishes store state.
pub struct AuthRejection {
    status: StatusCode,
    message: &'static str,
}

impl AuthRejection {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Invalid or missing token",
        }
    }

    fn server_error() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error",
        }
    }

    fn from_error(error: AuthError) -> Self {
        match error {
            AuthError::MissingCredential
            | AuthError::MalformedOrUnverifiable
            | AuthError::Expired
            | AuthError::Exhausted
            | AuthError::InvalidCredentials => Self::unauthorized(),
            AuthError::Store(e) => {
                // Fail closed, but as a server error: the token's state is
                // unknown, not invalid
                error!(error = %e, "Token store failure during authentication");
                Self::server_error()
            }
            AuthError::CredentialSource(e) => {
                error!(error = %e, "Credential source failure during authentication");
                Self::server_error()
            }
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message }).to_string();
        let mut response = (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response();

        if self.status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }

        response
    }
}
