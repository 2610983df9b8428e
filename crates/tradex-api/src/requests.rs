//! Deribit API v2 request builders.
//!
//! Each builder validates its inputs and returns an [`RpcRequest`] ready to
//! hand to the connection registry. Private methods need a token in the
//! shared [`TokenHolder`] and carry it as `access_token`. Order builders
//! are timed under `OrderExecution`, data queries under
//! `MarketDataHandling`.

use crate::error::{ApiError, ApiResult};
use crate::order::{
    is_valid_instrument_name, CancelScope, EditRequest, OpenOrdersQuery, OrderRequest,
    PositionsQuery, Quantity, Side,
};
use crate::token::TokenHolder;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use tradex_telemetry::{MeasurementType, PerformanceMonitor};
use tradex_ws::message::{METHOD_GET_ORDER_BOOK, METHOD_GET_POSITIONS, METHOD_UNSUBSCRIBE_ALL};
use tradex_ws::DEFAULT_ORDERBOOK_DEPTH;

pub const METHOD_AUTH: &str = "public/auth";
pub const METHOD_EDIT: &str = "private/edit";
pub const METHOD_CANCEL: &str = "private/cancel";

const NONCE_LEN: usize = 10;
const MAX_ORDERBOOK_DEPTH: i64 = 100;

/// A method and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    fn new(method: &str, params: Map<String, Value>) -> Self {
        Self {
            method: method.to_string(),
            params: Value::Object(params),
        }
    }
}

/// Clamp a requested order book depth: 1..=100, otherwise the default.
pub fn normalize_depth(depth: Option<i64>) -> u32 {
    match depth {
        Some(d) if (1..=MAX_ORDERBOOK_DEPTH).contains(&d) => d as u32,
        _ => DEFAULT_ORDERBOOK_DEPTH,
    }
}

fn random_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    tokens: Arc<TokenHolder>,
    monitor: Arc<PerformanceMonitor>,
}

impl RequestBuilder {
    pub fn new(tokens: Arc<TokenHolder>, monitor: Arc<PerformanceMonitor>) -> Self {
        Self { tokens, monitor }
    }

    pub fn tokens(&self) -> &Arc<TokenHolder> {
        &self.tokens
    }

    fn timed<T>(&self, kind: MeasurementType, build: impl FnOnce() -> T) -> T {
        self.monitor.start_measurement(kind, "");
        let out = build();
        self.monitor.stop_measurement(kind, "");
        out
    }

    fn private_params(&self) -> ApiResult<Map<String, Value>> {
        let token = self.tokens.get().ok_or(ApiError::NotAuthenticated)?;
        let mut params = Map::new();
        params.insert("access_token".to_string(), Value::String(token));
        Ok(params)
    }

    /// `public/auth` with client credentials.
    pub fn auth(&self, client_id: &str, client_secret: &str) -> ApiResult<RpcRequest> {
        if client_id.is_empty() {
            return Err(ApiError::MissingField("client_id"));
        }
        if client_secret.is_empty() {
            return Err(ApiError::MissingField("client_secret"));
        }
        let mut params = Map::new();
        params.insert("grant_type".into(), json!("client_credentials"));
        params.insert("client_id".into(), json!(client_id));
        params.insert("client_secret".into(), json!(client_secret));
        params.insert(
            "timestamp".into(),
            json!(chrono::Utc::now().timestamp_millis()),
        );
        params.insert("nonce".into(), json!(random_nonce()));
        params.insert("scope".into(), json!("session:name"));
        debug!(client_id, "Built auth request");
        Ok(RpcRequest::new(METHOD_AUTH, params))
    }

    /// `private/buy` or `private/sell`.
    pub fn order(&self, side: Side, order: &OrderRequest) -> ApiResult<RpcRequest> {
        self.timed(MeasurementType::OrderExecution, || -> ApiResult<RpcRequest> {
            order.validate()?;
            let mut params = self.private_params()?;
            params.insert("instrument_name".into(), json!(order.instrument));
            match order.quantity {
                Quantity::Contracts(n) => params.insert("contracts".into(), json!(n)),
                Quantity::Amount(x) => params.insert("amount".into(), json!(x)),
            };
            if let Some(price) = order.positive_price() {
                params.insert("price".into(), json!(price));
            }
            params.insert("type".into(), json!(order.order_type.as_str()));
            params.insert("label".into(), json!(order.label));
            params.insert("time_in_force".into(), json!(order.time_in_force.as_str()));
            Ok(RpcRequest::new(side.method(), params))
        })
    }

    /// `private/edit`.
    pub fn edit(&self, edit: &EditRequest) -> ApiResult<RpcRequest> {
        self.timed(MeasurementType::OrderExecution, || -> ApiResult<RpcRequest> {
            if edit.order_id.is_empty() {
                return Err(ApiError::MissingField("order_id"));
            }
            let mut params = self.private_params()?;
            params.insert("order_id".into(), json!(edit.order_id));
            if let Some(amount) = edit.amount.filter(|a| *a > 0.0) {
                params.insert("amount".into(), json!(amount));
            }
            if let Some(price) = edit.price.filter(|p| *p > 0.0) {
                params.insert("price".into(), json!(price));
            }
            Ok(RpcRequest::new(METHOD_EDIT, params))
        })
    }

    /// `private/cancel`.
    pub fn cancel(&self, order_id: &str) -> ApiResult<RpcRequest> {
        self.timed(MeasurementType::OrderExecution, || -> ApiResult<RpcRequest> {
            if order_id.is_empty() {
                return Err(ApiError::MissingField("order_id"));
            }
            let mut params = self.private_params()?;
            params.insert("order_id".into(), json!(order_id));
            Ok(RpcRequest::new(METHOD_CANCEL, params))
        })
    }

    /// The cancel-all family.
    pub fn cancel_all(&self, scope: &CancelScope) -> ApiResult<RpcRequest> {
        self.timed(MeasurementType::OrderExecution, || -> ApiResult<RpcRequest> {
            let mut params = self.private_params()?;
            match scope {
                CancelScope::All => {}
                CancelScope::Instrument(instrument) => {
                    params.insert("instrument_name".into(), json!(instrument));
                }
                CancelScope::Currency(currency) => {
                    params.insert("currency".into(), json!(currency));
                }
                CancelScope::Label(label) => {
                    params.insert("label".into(), json!(label));
                }
            }
            Ok(RpcRequest::new(scope.method(), params))
        })
    }

    /// The open-orders family.
    pub fn open_orders(&self, query: &OpenOrdersQuery) -> ApiResult<RpcRequest> {
        self.timed(MeasurementType::MarketDataHandling, || -> ApiResult<RpcRequest> {
            let mut params = self.private_params()?;
            match query {
                OpenOrdersQuery::All => {}
                OpenOrdersQuery::Instrument(instrument) => {
                    params.insert("instrument_name".into(), json!(instrument));
                }
                OpenOrdersQuery::Currency(currency) => {
                    params.insert("currency".into(), json!(currency));
                }
                OpenOrdersQuery::Label { currency, label } => {
                    params.insert("currency".into(), json!(currency));
                    params.insert("label".into(), json!(label));
                }
            }
            Ok(RpcRequest::new(query.method(), params))
        })
    }

    /// `private/get_positions`.
    pub fn positions(&self, query: &PositionsQuery) -> ApiResult<RpcRequest> {
        self.timed(MeasurementType::MarketDataHandling, || -> ApiResult<RpcRequest> {
            let mut params = self.private_params()?;
            if let Some(currency) = &query.currency {
                params.insert("currency".into(), json!(currency));
            }
            if let Some(kind) = &query.kind {
                params.insert("kind".into(), json!(kind));
            }
            Ok(RpcRequest::new(METHOD_GET_POSITIONS, params))
        })
    }

    /// `public/get_order_book`. Out-of-range depths fall back to the default.
    pub fn orderbook(&self, instrument: &str, depth: Option<i64>) -> ApiResult<RpcRequest> {
        self.timed(MeasurementType::MarketDataHandling, || -> ApiResult<RpcRequest> {
            if instrument.is_empty() {
                return Err(ApiError::MissingField("instrument_name"));
            }
            if !is_valid_instrument_name(instrument) {
                warn!(instrument, "Instrument name does not look like a future");
            }
            let mut params = Map::new();
            params.insert("instrument_name".into(), json!(instrument));
            params.insert("depth".into(), json!(normalize_depth(depth)));
            Ok(RpcRequest::new(METHOD_GET_ORDER_BOOK, params))
        })
    }

    pub fn unsubscribe_all(&self) -> RpcRequest {
        RpcRequest::new(METHOD_UNSUBSCRIBE_ALL, Map::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderType, TimeInForce};

    fn builder(token: Option<&str>) -> RequestBuilder {
        let tokens = Arc::new(TokenHolder::new());
        if let Some(token) = token {
            tokens.set(token);
        }
        RequestBuilder::new(tokens, Arc::new(PerformanceMonitor::new()))
    }

    fn market_buy() -> OrderRequest {
        OrderRequest {
            instrument: "BTC-PERPETUAL".to_string(),
            quantity: Quantity::Amount(0.5),
            order_type: OrderType::Market,
            time_in_force: TimeInForce::ImmediateOrCancel,
            price: None,
            label: "scalp".to_string(),
        }
    }

    #[test]
    fn test_auth_params() {
        let request = builder(None).auth("client", "secret").unwrap();
        assert_eq!(request.method, METHOD_AUTH);
        assert_eq!(request.params["grant_type"], "client_credentials");
        assert_eq!(request.params["client_id"], "client");
        assert_eq!(request.params["scope"], "session:name");
        assert_eq!(request.params["nonce"].as_str().unwrap().len(), NONCE_LEN);
        assert!(request.params["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_private_builders_need_token() {
        let b = builder(None);
        assert!(matches!(
            b.order(Side::Buy, &market_buy()),
            Err(ApiError::NotAuthenticated)
        ));
        assert!(matches!(b.cancel("ETH-1"), Err(ApiError::NotAuthenticated)));
        assert!(matches!(
            b.positions(&PositionsQuery::default()),
            Err(ApiError::NotAuthenticated)
        ));
        assert!(b.orderbook("BTC-PERPETUAL", None).is_ok());
    }

    #[test]
    fn test_order_params() {
        let request = builder(Some("tok")).order(Side::Buy, &market_buy()).unwrap();
        assert_eq!(request.method, "private/buy");
        assert_eq!(
            request.params,
            json!({
                "access_token": "tok",
                "instrument_name": "BTC-PERPETUAL",
                "amount": 0.5,
                "type": "market",
                "label": "scalp",
                "time_in_force": "immediate_or_cancel"
            })
        );
    }

    #[test]
    fn test_limit_sell_carries_price_and_contracts() {
        let order = OrderRequest {
            quantity: Quantity::Contracts(3),
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::GoodTilCancelled,
            price: Some(61_000.0),
            ..market_buy()
        };
        let request = builder(Some("tok")).order(Side::Sell, &order).unwrap();
        assert_eq!(request.method, "private/sell");
        assert_eq!(request.params["contracts"], 3);
        assert_eq!(request.params["price"], 61_000.0);
        assert!(request.params.get("amount").is_none());
    }

    #[test]
    fn test_order_builders_are_timed() {
        let b = builder(Some("tok"));
        b.order(Side::Buy, &market_buy()).unwrap();
        // failures still complete the measurement
        let _ = b.cancel("");
        let stats = b.monitor.stats();
        assert_eq!(stats[&MeasurementType::OrderExecution].count, 2);
    }

    #[test]
    fn test_edit_skips_non_positive_fields() {
        let edit = EditRequest {
            order_id: "ETH-42".to_string(),
            amount: Some(-1.0),
            price: Some(2_500.0),
        };
        let request = builder(Some("tok")).edit(&edit).unwrap();
        assert_eq!(request.method, METHOD_EDIT);
        assert!(request.params.get("amount").is_none());
        assert_eq!(request.params["price"], 2_500.0);
    }

    #[test]
    fn test_cancel_all_family() {
        let b = builder(Some("tok"));
        let request = b.cancel_all(&CancelScope::All).unwrap();
        assert_eq!(request.method, "private/cancel_all");
        assert_eq!(request.params, json!({"access_token": "tok"}));

        let request = b
            .cancel_all(&CancelScope::Currency("BTC".to_string()))
            .unwrap();
        assert_eq!(request.method, "private/cancel_all_by_currency");
        assert_eq!(request.params["currency"], "BTC");
    }

    #[test]
    fn test_open_orders_by_label() {
        let query = OpenOrdersQuery::Label {
            currency: "ETH".to_string(),
            label: "grid".to_string(),
        };
        let request = builder(Some("tok")).open_orders(&query).unwrap();
        assert_eq!(request.method, "private/get_open_orders_by_label");
        assert_eq!(request.params["currency"], "ETH");
        assert_eq!(request.params["label"], "grid");
    }

    #[test]
    fn test_orderbook_depth_normalization() {
        assert_eq!(normalize_depth(None), 10);
        assert_eq!(normalize_depth(Some(0)), 10);
        assert_eq!(normalize_depth(Some(101)), 10);
        assert_eq!(normalize_depth(Some(1)), 1);
        assert_eq!(normalize_depth(Some(100)), 100);

        let request = builder(None).orderbook("ETH-PERPETUAL", Some(25)).unwrap();
        assert_eq!(
            request.params,
            json!({"instrument_name": "ETH-PERPETUAL", "depth": 25})
        );
        assert!(matches!(
            builder(None).orderbook("", None),
            Err(ApiError::MissingField("instrument_name"))
        ));
    }

    #[test]
    fn test_unsubscribe_all_needs_no_token() {
        let request = builder(None).unsubscribe_all();
        assert_eq!(request.method, "private/unsubscribe_all");
        assert_eq!(request.params, json!({}));
    }
}
