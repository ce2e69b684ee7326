//! Signed token claims
//!
//! Tokens are HS256-signed JWTs. The claims carry the token id (`jti`), the
//! subject's identity, and the expiration; the store remains the source of
//! truth for remaining uses, so the signature alone never grants reuse.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::models::AuthSubject;

/// Length of a token id in random bytes
const TOKEN_ID_BYTES: usize = 16;

/// Claims embedded in a signed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Token identifier; primary key into the token store
    pub jti: String,

    /// Subject's user id
    pub sub: String,

    /// Subject's login name
    pub name: String,

    /// Subject's roles
    pub roles: Vec<String>,

    /// Subject's groups
    pub groups: Vec<String>,

    /// Issued-at, unix seconds
    pub iat: i64,

    /// Expiration, unix seconds
    pub exp: i64,
}

impl Claims {
    /// Build claims for a subject, expiring `ttl` from now
    pub fn new(jti: impl Into<String>, subject: &AuthSubject, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            jti: jti.into(),
            sub: subject.user_id.clone(),
            name: subject.username.clone(),
            roles: subject.roles.clone(),
            groups: subject.groups.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    /// Reconstruct the subject carried in the claims
    pub fn subject(&self) -> AuthSubject {
        AuthSubject {
            user_id: self.sub.clone(),
            username: self.name.clone(),
            roles: self.roles.clone(),
            groups: self.groups.clone(),
        }
    }
}

/// Generate a unique token id (16 bytes of OS entropy, URL-safe Base64)
pub fn generate_token_id() -> String {
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Sign claims into a token string
pub fn encode_token(claims: &Claims, secret: &str) -> Result<String, AuthError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::MalformedOrUnverifiable)
}

/// Verify a token's signature and expiration, returning its claims
///
/// Expiration is checked with zero leeway; anything past `exp` is rejected.
pub fn decode_token(raw: &str, secret: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    jsonwebtoken::decode::<Claims>(
        raw,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::MalformedOrUnverifiable,
    })
}
