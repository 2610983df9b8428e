//! JSON-RPC 2.0 wire types.
//!
//! Outbound frames are [`OutboundEnvelope`]s. Inbound frames are first
//! parsed as generic JSON and then classified by [`classify`]:
//! - a *reply* carries `id` together with `result` or `error`
//! - a *notification* carries `"method":"subscription"`
//! - anything else is kept as an opaque frame

use crate::error::WsResult;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tradex_feed::is_notification;

/// JSON-RPC protocol version stamped on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Default depth for order book queries.
pub const DEFAULT_ORDERBOOK_DEPTH: u32 = 10;

pub const METHOD_GET_ORDER_BOOK: &str = "public/get_order_book";
pub const METHOD_GET_POSITIONS: &str = "private/get_positions";
pub const METHOD_GET_OPEN_ORDERS: &str = "private/get_open_orders";
pub const METHOD_SUBSCRIBE: &str = "private/subscribe";
pub const METHOD_UNSUBSCRIBE_ALL: &str = "private/unsubscribe_all";

/// Outbound request envelope.
///
/// Ids are random per envelope and are not guaranteed unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl OutboundEnvelope {
    /// Build an envelope with a fresh random id.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        let id = u64::from(rand::thread_rng().gen::<u32>());
        Self::with_id(id, method, params)
    }

    pub fn with_id(id: u64, method: impl Into<String>, params: Value) -> Self {
        let params = if params.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            params
        };
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    pub fn to_json(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> WsResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Error object of a failed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Result or error carried by a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    Result(Value),
    Error(RpcError),
}

/// How a reply should be rendered, decided when the request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    OrderBook { instrument: String, depth: u32 },
    Positions,
    OpenOrders,
    /// No dedicated renderer.
    Plain,
}

impl ReplyKind {
    /// Pick the renderer for an outbound request.
    pub fn for_request(method: &str, params: &Value) -> Self {
        if method == METHOD_GET_ORDER_BOOK {
            let instrument = params
                .get("instrument_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let depth = params
                .get("depth")
                .and_then(Value::as_u64)
                .and_then(|d| u32::try_from(d).ok())
                .unwrap_or(DEFAULT_ORDERBOOK_DEPTH);
            Self::OrderBook { instrument, depth }
        } else if method == METHOD_GET_POSITIONS {
            Self::Positions
        } else if method.starts_with(METHOD_GET_OPEN_ORDERS) {
            // also covers the _by_instrument/_by_currency/_by_label variants
            Self::OpenOrders
        } else {
            Self::Plain
        }
    }
}

/// A completed request round-trip.
#[derive(Debug, Clone)]
pub struct Reply {
    pub request_id: u64,
    pub method: String,
    pub kind: ReplyKind,
    pub outcome: ReplyOutcome,
    /// Raw reply text as received.
    pub raw: String,
    pub round_trip: Duration,
}

impl Reply {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ReplyOutcome::Error(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            ReplyOutcome::Result(v) => Some(v),
            ReplyOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&RpcError> {
        match &self.outcome {
            ReplyOutcome::Error(e) => Some(e),
            ReplyOutcome::Result(_) => None,
        }
    }
}

/// Classification of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Reply { id: u64, outcome: ReplyOutcome },
    Notification,
    Other,
}

/// Classify a parsed inbound frame.
pub fn classify(frame: &Value) -> InboundFrame {
    if is_notification(frame) {
        return InboundFrame::Notification;
    }

    let Some(id) = frame.get("id").and_then(Value::as_u64) else {
        return InboundFrame::Other;
    };

    if let Some(result) = frame.get("result") {
        return InboundFrame::Reply {
            id,
            outcome: ReplyOutcome::Result(result.clone()),
        };
    }

    if let Some(error) = frame.get("error") {
        let outcome = match RpcError::deserialize(error) {
            Ok(err) => ReplyOutcome::Error(err),
            Err(_) => ReplyOutcome::Error(RpcError {
                code: 0,
                message: error.to_string(),
                data: None,
            }),
        };
        return InboundFrame::Reply { id, outcome };
    }

    InboundFrame::Other
}
