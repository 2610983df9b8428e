//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tradex_ws::RegistryConfig;

/// Deribit testnet endpoint used by `deribit connect`.
pub const DERIBIT_TESTNET_URI: &str = "wss://test.deribit.com/ws/api/v2";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Endpoint for `deribit connect`.
    #[serde(default = "default_uri")]
    pub default_uri: String,

    /// How long a request waits for its reply (ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Entries kept in each connection's message log.
    #[serde(default = "default_message_log_capacity")]
    pub message_log_capacity: usize,

    /// Close code used by `close` when none is given.
    #[serde(default = "default_close_code")]
    pub close_code: u16,

    /// Depth used by `orderbook` when none is given.
    #[serde(default = "default_orderbook_depth")]
    pub orderbook_default_depth: u32,
}

fn default_uri() -> String {
    DERIBIT_TESTNET_URI.to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_message_log_capacity() -> usize {
    1000
}

fn default_close_code() -> u16 {
    1000
}

fn default_orderbook_depth() -> u32 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_uri: default_uri(),
            request_timeout_ms: default_request_timeout_ms(),
            message_log_capacity: default_message_log_capacity(),
            close_code: default_close_code(),
            orderbook_default_depth: default_orderbook_depth(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise fall back to defaults.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.message_log_capacity == 0 {
            return Err(AppError::Config(
                "message_log_capacity must be positive".to_string(),
            ));
        }
        if !(1..=100).contains(&self.orderbook_default_depth) {
            return Err(AppError::Config(
                "orderbook_default_depth must be within 1..=100".to_string(),
            ));
        }
        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            log_capacity: self.message_log_capacity,
        }
    }
}
