//! Push notification parsing.
//!
//! Notifications arrive as
//! `{"method":"subscription","params":{"data":{"price":..,"timestamp":..,"index_name":..}}}`.
//! Deribit also sends `params.channel`; when it is missing the channel is
//! derived from `index_name`. Only price-index payloads are understood;
//! anything else is reported as [`FeedError::InvalidData`].

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

/// Method name carried by every push notification.
pub const NOTIFICATION_METHOD: &str = "subscription";

const PRICE_INDEX_PREFIX: &str = "deribit_price_index.";

/// `params` object of a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub channel: Option<String>,
    pub data: PriceData,
}

/// Price-index payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceData {
    pub price: f64,
    /// Exchange timestamp in milliseconds.
    pub timestamp: i64,
    pub index_name: String,
}

/// A single price observation extracted from a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub channel: String,
    pub instrument: String,
    pub price: f64,
    pub timestamp_ms: i64,
}

impl PriceUpdate {
    /// Exchange timestamp as UTC, if in range.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms)
    }
}

/// Whether a parsed frame is a push notification.
pub fn is_notification(frame: &Value) -> bool {
    frame.get("method").and_then(Value::as_str) == Some(NOTIFICATION_METHOD)
}

/// Extract a price update from a parsed frame.
pub fn parse_notification(frame: &Value) -> FeedResult<PriceUpdate> {
    if !is_notification(frame) {
        return Err(FeedError::NotNotification(
            frame
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("<none>")
                .to_string(),
        ));
    }

    let params = frame
        .get("params")
        .ok_or_else(|| FeedError::InvalidData("missing params".to_string()))?;
    let params = NotificationParams::deserialize(params)
        .map_err(|e| FeedError::InvalidData(e.to_string()))?;

    let channel = params
        .channel
        .unwrap_or_else(|| format!("{PRICE_INDEX_PREFIX}{}", params.data.index_name));
    if !params.data.price.is_finite() {
        return Err(FeedError::InvalidData(format!(
            "non-finite price on {channel}"
        )));
    }

    trace!(%channel, price = params.data.price, "Parsed price notification");

    Ok(PriceUpdate {
        channel,
        instrument: params.data.index_name,
        price: params.data.price,
        timestamp_ms: params.data.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(price: f64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "subscription",
            "params": {
                "channel": "deribit_price_index.btc_usd",
                "data": {
                    "price": price,
                    "timestamp": 1_700_000_000_000_i64,
                    "index_name": "btc_usd"
                }
            }
        })
    }

    #[test]
    fn test_parse_price_index_notification() {
        let update = parse_notification(&notification(42_000.5)).unwrap();
        assert_eq!(update.instrument, "btc_usd");
        assert_eq!(update.channel, "deribit_price_index.btc_usd");
        assert_eq!(update.price, 42_000.5);
        assert_eq!(update.timestamp_ms, 1_700_000_000_000);
        assert!(update.timestamp().is_some());
    }

    #[test]
    fn test_notification_without_channel() {
        let frame = json!({
            "method": "subscription",
            "params": {
                "data": {
                    "price": 100.0,
                    "timestamp": 1_700_000_000_000_i64,
                    "index_name": "btc_usd"
                }
            }
        });
        let update = parse_notification(&frame).unwrap();
        assert_eq!(update.channel, "deribit_price_index.btc_usd");
        assert_eq!(update.instrument, "btc_usd");
        assert_eq!(update.price, 100.0);
    }

    #[test]
    fn test_reply_is_not_notification() {
        let reply = json!({"jsonrpc": "2.0", "id": 7, "result": {}});
        assert!(!is_notification(&reply));
        assert!(matches!(
            parse_notification(&reply),
            Err(FeedError::NotNotification(_))
        ));
    }

    #[test]
    fn test_missing_data_fields_rejected() {
        let frame = json!({
            "method": "subscription",
            "params": {"channel": "book.BTC-PERPETUAL.100ms", "data": {"bids": []}}
        });
        assert!(matches!(
            parse_notification(&frame),
            Err(FeedError::InvalidData(_))
        ));
    }
}
