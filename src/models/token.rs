//! Token-related domain models
//!
//! This module defines the bounded-use token record kept in the token store,
//! the identity attached to authenticated requests, and the issuance DTOs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identity a token is issued to
///
/// Opaque to the gatekeeper beyond being copied into the request context for
/// downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSubject {
    /// Stable user identifier
    pub user_id: String,

    /// Login name
    pub username: String,

    /// Role names
    pub roles: Vec<String>,

    /// Group names
    pub groups: Vec<String>,
}

impl AuthSubject {
    /// Create a subject with no roles or groups
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            roles: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Set roles
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Set groups
    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }
}

/// Bounded-use token record stored in the token store
///
/// A token is usable iff `now < expires_at`, `remaining_uses > 0`, and the
/// record still exists. The store deletes the record in the same atomic step
/// that brings `remaining_uses` to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Token identifier (the JWT `jti` claim); primary key in the store
    pub id: String,

    /// Identity the token was issued to
    pub subject: AuthSubject,

    /// When the token was issued
    pub issued_at: DateTime<Utc>,

    /// When the token expires
    pub expires_at: DateTime<Utc>,

    /// Authentications left on this token
    pub remaining_uses: u32,
}

impl TokenRecord {
    /// Create a record expiring `ttl` from now with a fresh use budget
    pub fn new(id: impl Into<String>, subject: AuthSubject, ttl: Duration, max_uses: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            subject,
            issued_at: now,
            expires_at: now + ttl,
            remaining_uses: max_uses,
        }
    }

    /// Check whether the record is past its expiration
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Identity attached to a request after both gatekeeper stages pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
    /// Token identifier the request authenticated with
    pub token_id: String,

    /// Identity from the token record
    pub subject: AuthSubject,

    /// Uses left after this request
    pub remaining_uses: u32,
}

/// Body of the token issuance endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response of the token issuance endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Token identifier (for later revocation)
    pub id: String,

    /// Signed bearer token
    pub token: String,

    /// When the token expires
    pub expires_at: DateTime<Utc>,
}
