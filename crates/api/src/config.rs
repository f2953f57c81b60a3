//! Application configuration loaded from environment variables.

use std::time::Duration;

use inventory::RetryPolicy;
use thiserror::Error;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// A configuration variable held a value that could not be used.
#[derive(Debug, Error)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `plain` or `json` (default: `plain`)
/// - `DATABASE_URL`: PostgreSQL URL; without it the in-memory store is used
/// - `LEDGER_MAX_ATTEMPTS`: commit attempts per movement (default: `5`)
/// - `LEDGER_RETRY_BACKOFF_MS`: linear backoff step (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_format = match get("LOG_FORMAT") {
            None => defaults.log_format,
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "plain" | "text" | "pretty" => LogFormat::Plain,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError {
                        key: "LOG_FORMAT",
                        value: v,
                    });
                }
            },
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(get("PORT"), "PORT", defaults.port)?,
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: get("DATABASE_URL"),
            max_attempts: parse(
                get("LEDGER_MAX_ATTEMPTS"),
                "LEDGER_MAX_ATTEMPTS",
                defaults.max_attempts,
            )?,
            retry_backoff_ms: parse(
                get("LEDGER_RETRY_BACKOFF_MS"),
                "LEDGER_RETRY_BACKOFF_MS",
                defaults.retry_backoff_ms,
            )?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}

fn parse<T: std::str::FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError { key, value: v }),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            database_url: None,
            max_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: RetryPolicy::DEFAULT_BACKOFF.as_millis() as u64,
        }
    }
}
