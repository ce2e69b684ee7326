//! Application error types for registry-gate
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Authentication-related errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// No token presented on a protected path
    #[error("Missing authorization header")]
    MissingCredential,

    /// Token signature or structure could not be verified
    #[error("Invalid token")]
    MalformedOrUnverifiable,

    /// Token past its expiration claim
    #[error("Invalid token")]
    Expired,

    /// Token record absent from the store (exhausted, revoked, or never issued)
    #[error("Invalid token")]
    Exhausted,

    /// Invalid credentials on the issuance endpoint
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Credential source could not be reached during issuance
    #[error("Credential source unavailable")]
    CredentialSource(#[from] CredentialError),

    /// Token store failed in an unexpected way
    #[error("Token store error")]
    Store(#[from] StoreError),
}

/// Credential source errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CredentialError {
    /// Requested credential is not configured
    #[error("Credential not configured: {0}")]
    Missing(String),

    /// Backing secret service could not be reached
    #[error("Credential source unreachable: {0}")]
    Unreachable(String),

    /// Hashing or verification of a credential failed
    #[error("Credential hashing failed: {0}")]
    Hash(String),
}

/// Token store errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// Record absent: never issued, expired, exhausted, or revoked
    #[error("Token record not found")]
    NotFound,

    /// Underlying SQLite failure
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Record could not be encoded/decoded for storage
    #[error("Store serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Application-level error type
///
/// Aggregates the domain-specific error types for callers that need a single
/// error surface (startup wiring, CLI).
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Credential source error
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Token store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
