//! Token issuer
//!
//! Mints bounded-use signed tokens, validates login credentials against the
//! credential source, and consumes uses during authentication. All verbs the
//! authentication middleware and the issuance endpoint need live here.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{AuthConfig, Environment};
use crate::credentials::{generate_secret, hash_password, AdminCredentials, CredentialSource};
use crate::error::{AuthError, StoreError};
use crate::models::{AuthIdentity, AuthSubject, TokenRecord};
use crate::store::TokenStore;

use super::claims::{decode_token, encode_token, generate_token_id, Claims};

/// A freshly minted token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Token identifier (for later revocation)
    pub id: String,

    /// Signed bearer token
    pub token: String,

    /// When the token expires
    pub expires_at: DateTime<Utc>,
}

/// Token issuer and consumer
///
/// Owns the signing secret and the issuance defaults; the store remains the
/// source of truth for remaining uses.
pub struct TokenIssuer<S: TokenStore> {
    store: Arc<S>,
    credentials: Arc<dyn CredentialSource>,
    environment: Environment,
    signing_secret: String,
    token_ttl: Duration,
    token_max_uses: u32,
    // Development-only generated admin credentials, created at most once
    fallback: Mutex<Option<(AdminCredentials, String)>>,
}

impl<S: TokenStore> TokenIssuer<S> {
    /// Create a new issuer
    pub fn new(
        store: Arc<S>,
        credentials: Arc<dyn CredentialSource>,
        environment: Environment,
        signing_secret: impl Into<String>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            environment,
            signing_secret: signing_secret.into(),
            token_ttl: Duration::seconds(config.token_ttl_secs as i64),
            token_max_uses: config.token_max_uses,
            fallback: Mutex::new(None),
        }
    }

    /// Mint a signed token for a subject
    ///
    /// Persists the record before returning the token, so the token is usable
    /// the moment the caller sees it.
    pub async fn issue(
        &self,
        subject: &AuthSubject,
        ttl: Duration,
        max_uses: u32,
    ) -> Result<IssuedToken, AuthError> {
        let id = generate_token_id();
        let record = TokenRecord::new(id.as_str(), subject.clone(), ttl, max_uses);
        let claims = Claims::new(id.as_str(), subject, ttl);
        let token = encode_token(&claims, &self.signing_secret)?;

        self.store.insert(&record).await?;

        info!(
            token_id = %id,
            username = %subject.username,
            max_uses,
            "Issued token"
        );

        Ok(IssuedToken {
            id,
            token,
            expires_at: record.expires_at,
        })
    }

    /// Mint a token with the configured default TTL and use budget
    pub async fn issue_default(&self, subject: &AuthSubject) -> Result<IssuedToken, AuthError> {
        self.issue(subject, self.token_ttl, self.token_max_uses).await
    }

    /// Validate login credentials and mint a token
    ///
    /// The failure is uniform: callers cannot tell which of username/password
    /// was wrong.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let admin = self.admin_credentials().await?;

        if !admin.matches(username, password) {
            return Err(AuthError::InvalidCredentials);
        }

        let subject = AuthSubject::new(admin.username.clone(), admin.username.clone())
            .with_roles(vec!["admin".to_string()]);

        self.issue_default(&subject).await
    }

    /// Verify a bearer token and consume one use
    ///
    /// Signature and expiration are checked before the store is touched: a
    /// syntactically invalid token never consumes a use. A missing record
    /// (exhausted, revoked, expired) is indistinguishable from the caller's
    /// perspective.
    pub async fn verify_and_consume(&self, raw: &str) -> Result<AuthIdentity, AuthError> {
        let claims = decode_token(raw, &self.signing_secret)?;

        let record = self
            .store
            .consume(&claims.jti)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthError::Exhausted,
                other => AuthError::Store(other),
            })?;

        Ok(AuthIdentity {
            token_id: record.id,
            subject: record.subject,
            remaining_uses: record.remaining_uses,
        })
    }

    /// Revoke a token by id; idempotent
    pub async fn revoke(&self, token_id: &str) -> Result<(), AuthError> {
        self.store.revoke(token_id).await?;
        info!(%token_id, "Revoked token");
        Ok(())
    }

    /// Generated development credentials, if the credential source has failed
    ///
    /// Returns (username, password). Always `None` in production.
    pub fn generated_fallback(&self) -> Option<(String, String)> {
        self.fallback
            .lock()
            .unwrap()
            .as_ref()
            .map(|(creds, password)| (creds.username.clone(), password.clone()))
    }

    /// Fetch admin credentials, degrading per environment
    ///
    /// Production propagates the failure (the login request gets a server
    /// error); development generates a one-time fallback and logs it.
    async fn admin_credentials(&self) -> Result<AdminCredentials, AuthError> {
        match self.credentials.admin_credentials().await {
            Ok(creds) => Ok(creds),
            Err(e) if self.environment.is_production() => {
                error!(error = %e, "Credential source unavailable in production, rejecting login");
                Err(AuthError::CredentialSource(e))
            }
            Err(e) => {
                let mut guard = self.fallback.lock().unwrap();
                match guard.as_ref() {
                    Some((creds, _)) => Ok(creds.clone()),
                    None => {
                        let password = generate_secret();
                        warn!(
                            error = %e,
                            username = "admin",
                            %password,
                            "Credential source unavailable, using generated development credentials"
                        );
                        let creds = AdminCredentials {
                            username: "admin".to_string(),
                            password_hash: hash_password(&password)?,
                        };
                        *guard = Some((creds.clone(), password));
                        Ok(creds)
                    }
                }
            }
        }
    }
}
