//! Configuration management for registry-gate
//!
//! This module handles loading, parsing, and validating application
//! configuration from YAML files and `REGISTRY_GATE_*` environment variables.
//!
//! Configuration is resolved once at startup into an immutable [`Config`] and
//! passed explicitly into the gatekeeper constructors. Out-of-range values are
//! replaced by safe defaults with a logged warning rather than crashing the
//! service.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Upper bound on the per-window request limit
pub const MAX_RATE_LIMIT: u32 = 10_000;

/// Upper bound on the rate-limit window length in seconds
pub const MAX_WINDOW_SECS: u64 = 3_600;

/// Upper bound on a token's use budget
pub const MAX_TOKEN_USES: u32 = 100_000;

/// Upper bound on a token's time-to-live in seconds (7 days)
pub const MAX_TOKEN_TTL_SECS: u64 = 604_800;

/// Deployment environment
///
/// Controls how credential-source failures degrade: production fails closed,
/// development falls back to generated credentials with a warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Token issuance configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Rate limiter configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Token store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix REGISTRY_GATE_
    ///
    /// Unparseable numeric values fall back to the field default with a logged
    /// warning; they never abort startup.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(env) = std::env::var("REGISTRY_GATE_ENVIRONMENT") {
            config.environment = match env.to_ascii_lowercase().as_str() {
                "production" | "prod" => Environment::Production,
                _ => Environment::Development,
            };
        }

        if let Ok(host) = std::env::var("REGISTRY_GATE_SERVER_HOST") {
            config.server.host = host;
        }
        config.server.port = env_parsed("REGISTRY_GATE_SERVER_PORT", config.server.port);

        config.auth.token_ttl_secs =
            env_parsed("REGISTRY_GATE_TOKEN_TTL_SECS", config.auth.token_ttl_secs);
        config.auth.token_max_uses =
            env_parsed("REGISTRY_GATE_TOKEN_MAX_USES", config.auth.token_max_uses);

        config.rate_limit.enabled =
            env_parsed("REGISTRY_GATE_RATE_LIMIT_ENABLED", config.rate_limit.enabled);
        config.rate_limit.limit = env_parsed("REGISTRY_GATE_RATE_LIMIT", config.rate_limit.limit);
        config.rate_limit.window_secs = env_parsed(
            "REGISTRY_GATE_RATE_WINDOW_SECS",
            config.rate_limit.window_secs,
        );
        config.rate_limit.idle_timeout_secs = env_parsed(
            "REGISTRY_GATE_RATE_IDLE_TIMEOUT_SECS",
            config.rate_limit.idle_timeout_secs,
        );

        if let Ok(path) = std::env::var("REGISTRY_GATE_STORE_PATH") {
            config.store.path = path;
        }
        if let Ok(level) = std::env::var("REGISTRY_GATE_LOG_LEVEL") {
            config.logging.level = level;
        }

        config
    }

    /// Clamp out-of-range values to safe defaults, logging a warning for each
    ///
    /// The upper bounds on the rate limiter prevent a fat-fingered value from
    /// disabling protection; the explicit `enabled` switch is the only way to
    /// turn the limiter off.
    pub fn validate(mut self) -> Self {
        if self.rate_limit.limit == 0 || self.rate_limit.limit > MAX_RATE_LIMIT {
            warn!(
                limit = self.rate_limit.limit,
                default = default_rate_limit(),
                "Rate limit out of range, falling back to default"
            );
            self.rate_limit.limit = default_rate_limit();
        }
        if self.rate_limit.window_secs == 0 || self.rate_limit.window_secs > MAX_WINDOW_SECS {
            warn!(
                window_secs = self.rate_limit.window_secs,
                default = default_window_secs(),
                "Rate limit window out of range, falling back to default"
            );
            self.rate_limit.window_secs = default_window_secs();
        }
        if self.auth.token_max_uses == 0 || self.auth.token_max_uses > MAX_TOKEN_USES {
            warn!(
                max_uses = self.auth.token_max_uses,
                default = default_token_max_uses(),
                "Token use budget out of range, falling back to default"
            );
            self.auth.token_max_uses = default_token_max_uses();
        }
        if self.auth.token_ttl_secs == 0 || self.auth.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            warn!(
                ttl_secs = self.auth.token_ttl_secs,
                default = default_token_ttl_secs(),
                "Token TTL out of range, falling back to default"
            );
            self.auth.token_ttl_secs = default_token_ttl_secs();
        }
        self
    }
}

/// Parse an environment variable, falling back to `current` with a warning
fn env_parsed<T: std::str::FromStr + std::fmt::Display>(key: &str, current: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(%key, value = %raw, fallback = %current, "Unparseable value, using fallback");
                current
            }
        },
        Err(_) => current,
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Token issuance configuration
///
/// The signing secret and admin credentials come from the credential source,
/// not from this file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Default token time-to-live in seconds
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    /// Default per-token use budget
    #[serde(default = "default_token_max_uses")]
    pub token_max_uses: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl_secs(),
            token_max_uses: default_token_max_uses(),
        }
    }
}

fn default_token_ttl_secs() -> u64 {
    36_000 // 10 hours
}

fn default_token_max_uses() -> u32 {
    1_000
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Whether the limiter is enabled at all
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,

    /// Maximum requests per client per window
    #[serde(default = "default_rate_limit")]
    pub limit: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Seconds of inactivity after which a client's state is evicted
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            limit: default_rate_limit(),
            window_secs: default_window_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_rate_limit() -> u32 {
    300
}

fn default_window_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    600
}

/// Token store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Path to the SQLite database file (`:memory:` for ephemeral)
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "/data/db/registry-gate.db".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}
