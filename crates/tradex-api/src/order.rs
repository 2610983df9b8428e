//! Order and query parameter types with validation.

use crate::error::{ApiError, ApiResult};
use std::fmt;
use std::str::FromStr;

/// Currencies recognized when deciding whether an argument names a currency
/// or an instrument.
pub const AVAILABLE_CURRENCIES: &[&str] = &[
    "BTC", "ETH", "SOL", "XRP", "MATIC", "USDC", "USDT", "JPY", "CAD", "AUD", "GBP", "EUR",
    "USD", "CHF", "BRL", "MXN", "COP", "CLP", "PEN", "ECS", "ARS",
];

/// Currencies accepted by `private/get_positions`.
pub const POSITION_CURRENCIES: &[&str] = &["BTC", "ETH", "USDC", "USDT", "EURR"];

/// Instrument kinds accepted by `private/get_positions`.
pub const POSITION_KINDS: &[&str] = &["future", "option", "spot", "future_combo", "option_combo"];

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn method(self) -> &'static str {
        match self {
            Self::Buy => "private/buy",
            Self::Sell => "private/sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("BUY"),
            Self::Sell => f.write_str("SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    StopLimit,
    TakeLimit,
    Market,
    StopMarket,
    TakeMarket,
    MarketLimit,
    TrailingStop,
}

impl OrderType {
    pub const ALL: [OrderType; 8] = [
        Self::Limit,
        Self::StopLimit,
        Self::TakeLimit,
        Self::Market,
        Self::StopMarket,
        Self::TakeMarket,
        Self::MarketLimit,
        Self::TrailingStop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::StopLimit => "stop_limit",
            Self::TakeLimit => "take_limit",
            Self::Market => "market",
            Self::StopMarket => "stop_market",
            Self::TakeMarket => "take_market",
            Self::MarketLimit => "market_limit",
            Self::TrailingStop => "trailing_stop",
        }
    }

    /// Limit-style orders must carry a positive price.
    pub fn requires_price(self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit | Self::TakeLimit)
    }

    pub fn allowed_time_in_force(self) -> &'static [TimeInForce] {
        match self {
            Self::TrailingStop => &[TimeInForce::GoodTilCancelled],
            _ => &TimeInForce::ALL,
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ApiError::UnknownOrderType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    GoodTilCancelled,
    GoodTilDay,
    FillOrKill,
    ImmediateOrCancel,
}

impl TimeInForce {
    pub const ALL: [TimeInForce; 4] = [
        Self::GoodTilCancelled,
        Self::GoodTilDay,
        Self::FillOrKill,
        Self::ImmediateOrCancel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GoodTilCancelled => "good_til_cancelled",
            Self::GoodTilDay => "good_til_day",
            Self::FillOrKill => "fill_or_kill",
            Self::ImmediateOrCancel => "immediate_or_cancel",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeInForce {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ApiError::UnknownTimeInForce(s.to_string()))
    }
}

/// Order size, either in contracts or in currency amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quantity {
    Contracts(u64),
    Amount(f64),
}

impl Quantity {
    pub fn is_positive(self) -> bool {
        match self {
            Self::Contracts(n) => n > 0,
            Self::Amount(x) => x > 0.0 && x.is_finite(),
        }
    }
}

/// A buy or sell order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub instrument: String,
    pub quantity: Quantity,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    /// Required for limit-style orders; otherwise sent only if positive.
    pub price: Option<f64>,
    pub label: String,
}

impl OrderRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if self.instrument.is_empty() {
            return Err(ApiError::MissingField("instrument_name"));
        }
        if !self.quantity.is_positive() {
            return Err(ApiError::InvalidQuantity);
        }
        if !self
            .order_type
            .allowed_time_in_force()
            .contains(&self.time_in_force)
        {
            return Err(ApiError::TimeInForceNotAllowed {
                order_type: self.order_type.to_string(),
                time_in_force: self.time_in_force.to_string(),
            });
        }
        if self.order_type.requires_price() && self.positive_price().is_none() {
            return Err(ApiError::PriceRequired(self.order_type.to_string()));
        }
        Ok(())
    }

    pub fn positive_price(&self) -> Option<f64> {
        self.price.filter(|p| *p > 0.0 && p.is_finite())
    }
}

/// Changes to an existing order. Non-positive values are left unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub order_id: String,
    pub amount: Option<f64>,
    pub price: Option<f64>,
}

/// Which orders `cancel_all` targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelScope {
    All,
    Instrument(String),
    Currency(String),
    Label(String),
}

impl CancelScope {
    /// Interpret CLI arguments: none, `-s <label>`, a known currency, or an
    /// instrument name.
    pub fn from_args(option: Option<&str>, label: Option<&str>) -> ApiResult<Self> {
        match option {
            None => Ok(Self::All),
            Some("-s") => label
                .filter(|l| !l.is_empty())
                .map(|l| Self::Label(l.to_string()))
                .ok_or(ApiError::MissingField("label")),
            Some(opt) if is_known_currency(opt) => Ok(Self::Currency(opt.to_string())),
            Some(opt) => Ok(Self::Instrument(opt.to_string())),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::All => "private/cancel_all",
            Self::Instrument(_) => "private/cancel_all_by_instrument",
            Self::Currency(_) => "private/cancel_all_by_currency",
            Self::Label(_) => "private/cancel_by_label",
        }
    }
}

/// Which open orders to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOrdersQuery {
    All,
    Instrument(String),
    Currency(String),
    Label { currency: String, label: String },
}

impl OpenOrdersQuery {
    pub fn from_args(first: Option<&str>, second: Option<&str>) -> Self {
        match (first, second) {
            (None, _) => Self::All,
            (Some(opt), _) if !is_known_currency(opt) => Self::Instrument(opt.to_string()),
            (Some(currency), None) => Self::Currency(currency.to_string()),
            (Some(currency), Some(label)) => Self::Label {
                currency: currency.to_string(),
                label: label.to_string(),
            },
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::All => "private/get_open_orders",
            Self::Instrument(_) => "private/get_open_orders_by_instrument",
            Self::Currency(_) => "private/get_open_orders_by_currency",
            Self::Label { .. } => "private/get_open_orders_by_label",
        }
    }
}

/// Filters for `private/get_positions`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionsQuery {
    pub currency: Option<String>,
    pub kind: Option<String>,
}

impl PositionsQuery {
    pub fn new(currency: Option<&str>, kind: Option<&str>) -> ApiResult<Self> {
        if let Some(c) = currency {
            if !POSITION_CURRENCIES.contains(&c) {
                return Err(ApiError::InvalidCurrency(c.to_string()));
            }
        }
        if let Some(k) = kind {
            if !POSITION_KINDS.contains(&k) {
                return Err(ApiError::InvalidKind(k.to_string()));
            }
        }
        Ok(Self {
            currency: currency.map(str::to_string),
            kind: kind.map(str::to_string),
        })
    }
}

pub fn is_known_currency(s: &str) -> bool {
    AVAILABLE_CURRENCIES.contains(&s)
}

/// Whether `name` looks like a futures instrument: `BTC-PERPETUAL` or
/// `ETH-27DEC24`.
pub fn is_valid_instrument_name(name: &str) -> bool {
    let Some((base, suffix)) = name.split_once('-') else {
        return false;
    };
    if !(3..=4).contains(&base.len()) || !base.bytes().all(|b| b.is_ascii_uppercase()) {
        return false;
    }
    if suffix == "PERPETUAL" {
        return true;
    }
    let b = suffix.as_bytes();
    b.len() == 7
        && b[..2].iter().all(u8::is_ascii_digit)
        && b[2..5].iter().all(u8::is_ascii_uppercase)
        && b[5..].iter().all(u8::is_ascii_digit)
}
