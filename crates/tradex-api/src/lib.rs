//! Deribit API layer for tradex.
//!
//! - Request builders for auth, orders, cancels, queries and subscriptions
//! - Order parameter validation
//! - Session token storage and the local subscription list
//! - Message log summaries

pub mod error;
pub mod order;
pub mod requests;
pub mod subscriptions;
pub mod summary;
pub mod token;

pub use error::{ApiError, ApiResult};
pub use order::{
    is_known_currency, is_valid_instrument_name, CancelScope, EditRequest, OpenOrdersQuery,
    OrderRequest, OrderType, PositionsQuery, Quantity, Side, TimeInForce,
};
pub use requests::{normalize_depth, RequestBuilder, RpcRequest};
pub use subscriptions::{price_index_channel, SubscriptionSet};
pub use summary::{format_summary, redact_secrets, summarize};
pub use token::TokenHolder;
