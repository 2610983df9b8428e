//! API error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not authenticated: run `authorize` first")]
    NotAuthenticated,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("A positive price is required for {0} orders")]
    PriceRequired(String),

    #[error("Time in force {time_in_force} is not allowed for {order_type} orders")]
    TimeInForceNotAllowed {
        order_type: String,
        time_in_force: String,
    },

    #[error("Unknown order type: {0}")]
    UnknownOrderType(String),

    #[error("Unknown time in force: {0}")]
    UnknownTimeInForce(String),

    #[error("Unsupported currency: {0}")]
    InvalidCurrency(String),

    #[error("Unsupported instrument kind: {0}")]
    InvalidKind(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;
