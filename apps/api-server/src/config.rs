//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("sqlite") {
            Self::Sqlite
        } else {
            Self::Memory
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path (when using sqlite storage)
    #[allow(dead_code)] // Read by the sqlite adapter via DB_PATH
    pub db_path: Option<PathBuf>,
    /// Log format for the local subscriber
    pub log_format: LogFormat,
    /// Custom shortlink domain for generated URLs
    pub shortlink_domain: Option<String>,
    /// Remote log collector endpoint; unset disables remote delivery
    pub log_endpoint: Option<String>,
    /// Delivery attempts per log event
    pub log_max_attempts: u32,
    /// Base delay unit of the linear backoff between attempts
    pub log_base_delay: Duration,
    /// Whether log events are mirrored onto the local subscriber
    pub log_mirror: bool,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Port
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3001);

        // CORS allow origin
        let cors_origin_str = env::var("CORS_ALLOW_ORIGIN").unwrap_or_else(|_| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Storage provider
        let storage_provider = StorageProvider::from_str(
            &env::var("STORAGE_PROVIDER").unwrap_or_else(|_| "sqlite".into()),
        );

        // DB path (for sqlite)
        let db_path = env::var("DB_PATH").ok().map(PathBuf::from);

        // Log format
        let log_format =
            LogFormat::from_str(&env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".into()));

        // Shortlink domain
        let shortlink_domain = env::var("SHORTLINK_DOMAIN").ok().filter(|s| !s.is_empty());

        // Remote log collector
        let log_endpoint = env::var("LOG_ENDPOINT").ok().filter(|s| !s.is_empty());

        let log_max_attempts = match env::var("LOG_MAX_ATTEMPTS") {
            Ok(s) => {
                let n: u32 = s.parse().map_err(|_| ConfigError {
                    field: "LOG_MAX_ATTEMPTS",
                    message: format!("Expected a positive integer, got '{}'", s),
                })?;
                if n == 0 {
                    return Err(ConfigError {
                        field: "LOG_MAX_ATTEMPTS",
                        message: "Must be at least 1".into(),
                    });
                }
                n
            }
            Err(_) => log_dispatch::DEFAULT_MAX_ATTEMPTS,
        };

        let log_base_delay = match env::var("LOG_BASE_DELAY_MS") {
            Ok(s) => {
                let ms: u64 = s.parse().map_err(|_| ConfigError {
                    field: "LOG_BASE_DELAY_MS",
                    message: format!("Expected milliseconds as an integer, got '{}'", s),
                })?;
                Duration::from_millis(ms)
            }
            Err(_) => log_dispatch::DEFAULT_BASE_DELAY,
        };

        let mirror_str = env::var("LOG_MIRROR").unwrap_or_default();
        let log_mirror = !matches!(mirror_str.to_lowercase().as_str(), "0" | "false" | "no");

        Ok(Self {
            port,
            cors_allow_origin,
            storage_provider,
            db_path,
            log_format,
            shortlink_domain,
            log_endpoint,
            log_max_attempts,
            log_base_delay,
            log_mirror,
        })
    }

    /// Log warnings about degraded configuration.
    pub fn warn_if_degraded(&self) {
        if self.log_endpoint.is_none() {
            tracing::warn!(
                "LOG_ENDPOINT not set: remote log delivery is disabled. \
                 Events are mirrored to the local subscriber only."
            );
        }
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!(
                "STORAGE_PROVIDER=memory: short URLs are lost on restart. \
                 Set STORAGE_PROVIDER=sqlite for file-backed storage."
            );
        }
    }
}
