//! Configuration management for Kibo
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }
}

impl Environment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Current environment
    pub environment: Environment,

    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Database connection URL; in-memory stores are used when absent
    pub database_url: Option<String>,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Rate limit: requests per second per caller
    pub rate_limit_rps: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// Directory uploaded images are written to
    pub upload_dir: String,

    /// Base URL used when building links to stored images
    pub public_base_url: String,

    /// Peer-market listing API used for quotes
    pub quote_api_url: String,

    /// Timeout for quote requests in seconds
    pub quote_timeout_secs: u64,

    /// Maximum AVAILABLE orders a user may have at once
    pub max_active_orders: i64,

    /// Time a new order has to be paid in before the sweeper cancels it
    pub pending_payment_ttl_secs: i64,

    /// Time an order stays claimable after payment is confirmed
    pub availability_window_secs: i64,

    /// Time an ally has to upload proof after taking an order
    pub completion_window_secs: i64,

    /// Interval between expiry sweeps
    pub sweep_interval_secs: u64,

    /// Interval between SSE keep-alive comments
    pub sse_keep_alive_secs: u64,

    /// Maximum lifetime of a single SSE connection
    pub sse_max_lifetime_secs: u64,

    /// Per-connection buffer of pending SSE updates
    pub sse_buffer_size: usize,

    /// Capacity of the change feed broadcast channel
    pub change_feed_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| s.parse::<Environment>())
            .unwrap_or(Ok(Environment::Development))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        if database_url.is_none() && environment.is_production() {
            return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
        }

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        Ok(Config {
            environment,
            host,
            port,
            database_url,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 5),
            rate_limit_rps: parse_or("RATE_LIMIT_RPS", 100),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok(),
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            public_base_url,
            quote_api_url: env::var("QUOTE_API_URL")
                .unwrap_or_else(|_| "https://p2p.binance.com".to_string()),
            quote_timeout_secs: parse_or("QUOTE_TIMEOUT_SECS", 10),
            max_active_orders: parse_or("MAX_ACTIVE_ORDERS", 3),
            pending_payment_ttl_secs: parse_or("PENDING_PAYMENT_TTL_SECS", 1800),
            availability_window_secs: parse_or("AVAILABILITY_WINDOW_SECS", 3600),
            completion_window_secs: parse_or("COMPLETION_WINDOW_SECS", 300),
            sweep_interval_secs: parse_or("SWEEP_INTERVAL_SECS", 60),
            sse_keep_alive_secs: parse_or("SSE_KEEP_ALIVE_SECS", 15),
            sse_max_lifetime_secs: parse_or("SSE_MAX_LIFETIME_SECS", 3600),
            sse_buffer_size: parse_or("SSE_BUFFER_SIZE", 64),
            change_feed_capacity: parse_or("CHANGE_FEED_CAPACITY", 256),
        })
    }

    /// Get database URL with the password masked, for logging
    pub fn database_url_masked(&self) -> Option<String> {
        let url = self.database_url.as_ref()?;
        if let Some(at_pos) = url.find('@') {
            if let Some(colon_pos) = url[..at_pos].rfind(':') {
                let prefix = &url[..colon_pos + 1];
                let suffix = &url[at_pos..];
                return Some(format!("{}****{}", prefix, suffix));
            }
        }
        Some(url.clone())
    }

    pub fn quote_timeout(&self) -> Duration {
        Duration::from_secs(self.quote_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset or malformed
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Development defaults with no database; the in-memory stores are used
impl Default for Config {
    fn default() -> Self {
        Config {
            environment: Environment::Development,
            host: "127.0.0.1".to_string(),
            port: 3001,
            database_url: None,
            db_max_connections: 5,
            rate_limit_rps: 100,
            cors_allowed_origins: None,
            log_level: "info".to_string(),
            upload_dir: "./uploads".to_string(),
            public_base_url: "http://127.0.0.1:3001".to_string(),
            quote_api_url: "https://p2p.binance.com".to_string(),
            quote_timeout_secs: 10,
            max_active_orders: 3,
            pending_payment_ttl_secs: 1800,
            availability_window_secs: 3600,
            completion_window_secs: 300,
            sweep_interval_secs: 60,
            sse_keep_alive_secs: 15,
            sse_max_lifetime_secs: 3600,
            sse_buffer_size: 64,
            change_feed_capacity: 256,
        }
    }
}
