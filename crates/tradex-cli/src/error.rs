//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tradex_ws::WsError),

    #[error("API error: {0}")]
    Api(#[from] tradex_api::ApiError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tradex_telemetry::TelemetryError),

    #[error("{0}")]
    Usage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
