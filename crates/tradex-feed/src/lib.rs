//! Price-index feed handling for tradex.
//!
//! Parses `subscription` push notifications into typed price updates and
//! folds them into a rolling-window ticker that derives trend and
//! volatility indicators.

pub mod error;
pub mod parser;
pub mod ticker;

pub use error::{FeedError, FeedResult};
pub use parser::{
    is_notification, parse_notification, NotificationParams, PriceData, PriceUpdate,
    NOTIFICATION_METHOD,
};
pub use ticker::{StreamingTicker, TickerSnapshot, TickerState, Trend, VolatilityLevel};
