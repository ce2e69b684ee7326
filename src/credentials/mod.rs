//! Credential source for registry-gate
//!
//! The deployment's secret manager is an external collaborator; this module
//! defines the trait the gatekeeper consumes and an environment-variable
//! implementation standing in for it.
//!
//! Failure behavior depends on the deployment environment: production fails
//! closed (the caller gets an error, never a well-known default), development
//! falls back to a generated credential with a logged warning.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::warn;

use crate::config::Environment;
use crate::error::CredentialError;

/// Environment variable holding the token signing secret
pub const SIGNING_SECRET_VAR: &str = "REGISTRY_GATE_SIGNING_SECRET";

/// Environment variable holding the administrator username
pub const ADMIN_USERNAME_VAR: &str = "REGISTRY_GATE_ADMIN_USERNAME";

/// Environment variable holding the administrator password
pub const ADMIN_PASSWORD_VAR: &str = "REGISTRY_GATE_ADMIN_PASSWORD";

/// Administrator credentials as retrieved from the source
///
/// The password is carried as an argon2id hash; the plaintext never leaves the
/// retrieval path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub password_hash: String,
}

impl AdminCredentials {
    /// Check a login attempt against these credentials
    pub fn matches(&self, username: &str, password: &str) -> bool {
        // Both halves always checked so the failure is uniform
        let name_ok = self.username == username;
        let password_ok = verify_password(password, &self.password_hash);
        name_ok && password_ok
    }
}

/// Source of administrator credentials and the signing secret
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Retrieve the administrator credentials
    async fn admin_credentials(&self) -> Result<AdminCredentials, CredentialError>;

    /// Retrieve the token signing secret
    async fn signing_secret(&self) -> Result<String, CredentialError>;
}

/// Credential source holding fixed credentials
///
/// Useful when credentials come from a config file or a test harness rather
/// than the deployment's secret manager.
pub struct StaticCredentialSource {
    credentials: AdminCredentials,
    secret: String,
}

impl StaticCredentialSource {
    /// Build a source from plaintext credentials and a signing secret
    pub fn new(
        username: impl Into<String>,
        password: &str,
        secret: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        Ok(Self {
            credentials: AdminCredentials {
                username: username.into(),
                password_hash: hash_password(password)?,
            },
            secret: secret.into(),
        })
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn admin_credentials(&self) -> Result<AdminCredentials, CredentialError> {
        Ok(self.credentials.clone())
    }

    async fn signing_secret(&self) -> Result<String, CredentialError> {
        Ok(self.secret.clone())
    }
}

/// Credential source backed by environment variables
pub struct EnvCredentialSource;

#[async_trait]
impl CredentialSource for EnvCredentialSource {
    async fn admin_credentials(&self) -> Result<AdminCredentials, CredentialError> {
        let username = std::env::var(ADMIN_USERNAME_VAR)
            .map_err(|_| CredentialError::Missing(ADMIN_USERNAME_VAR.to_string()))?;
        let password = std::env::var(ADMIN_PASSWORD_VAR)
            .map_err(|_| CredentialError::Missing(ADMIN_PASSWORD_VAR.to_string()))?;

        Ok(AdminCredentials {
            username,
            password_hash: hash_password(&password)?,
        })
    }

    async fn signing_secret(&self) -> Result<String, CredentialError> {
        std::env::var(SIGNING_SECRET_VAR)
            .map_err(|_| CredentialError::Missing(SIGNING_SECRET_VAR.to_string()))
    }
}

/// Resolve the signing secret once at startup
///
/// Production propagates the failure so startup aborts; development generates
/// a random secret and logs a warning.
pub async fn resolve_signing_secret(
    source: &dyn CredentialSource,
    environment: Environment,
) -> Result<String, CredentialError> {
    match source.signing_secret().await {
        Ok(secret) => Ok(secret),
        Err(e) if environment.is_production() => Err(e),
        Err(e) => {
            warn!(error = %e, "Signing secret unavailable, generating an ephemeral one");
            Ok(generate_secret())
        }
    }
}

/// Generate a random URL-safe secret (32 bytes of OS entropy)
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Verify a password against a stored Argon2id hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
