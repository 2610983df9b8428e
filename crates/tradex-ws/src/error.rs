//! WebSocket error types.

use crate::connection::ConnectionStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Message parse error: {0}")]
    ParseError(String),

    #[error("No connection found with id {0}")]
    UnknownConnection(u64),

    #[error("Connection {id} is not open (status: {status})")]
    NotConnected { id: u64, status: ConnectionStatus },

    #[error("Request {method} timed out after {timeout_ms} ms")]
    RequestTimeout { method: String, timeout_ms: u64 },

    #[error("Connection {id} already has request {method} in flight")]
    RequestInFlight { id: u64, method: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Connection lost while waiting for reply: {0}")]
    ConnectionLost(String),

    #[error("Streaming mode is already active")]
    StreamingActive,

    #[error("Subscription rejected: {0}")]
    SubscribeRejected(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;
