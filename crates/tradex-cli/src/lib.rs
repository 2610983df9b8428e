//! tradex: interactive Deribit client over JSON-RPC/WebSocket.

pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod render;

pub use app::{App, Step};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
