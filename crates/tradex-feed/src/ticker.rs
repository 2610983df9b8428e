//! Rolling-window ticker analytics.
//!
//! One [`TickerState`] is tracked at a time. The first update for a new
//! instrument reinitializes it; otherwise each update extends the window
//! (capped at [`WINDOW_CAPACITY`] prices) and produces a [`TickerSnapshot`].

use crate::parser::PriceUpdate;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

/// Maximum number of prices kept in the rolling window.
pub const WINDOW_CAPACITY: usize = 30;
/// Samples needed for a trend reading.
pub const TREND_SAMPLES: usize = 5;
/// Samples needed for a volatility reading.
pub const VOLATILITY_SAMPLES: usize = 10;

const LOW_VOLATILITY_RATIO: f64 = 0.0001;
const MEDIUM_VOLATILITY_RATIO: f64 = 0.001;

/// Short-term direction over the last [`TREND_SAMPLES`] prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Waiting,
    Bullish,
    Bearish,
    Sideways,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Waiting => "WAITING",
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
            Self::Sideways => "SIDEWAYS",
        };
        f.write_str(s)
    }
}

/// Mean absolute tick change relative to price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatilityLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for VolatilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Per-instrument running state.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerState {
    pub instrument: String,
    pub window: VecDeque<f64>,
    pub previous_price: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub update_count: u64,
}

impl TickerState {
    fn new(instrument: &str, price: f64) -> Self {
        Self {
            instrument: instrument.to_string(),
            window: VecDeque::with_capacity(WINDOW_CAPACITY),
            previous_price: price,
            open_price: price,
            high_price: price,
            low_price: price,
            update_count: 0,
        }
    }

    fn trend(&self) -> Trend {
        if self.window.len() < TREND_SAMPLES {
            return Trend::Waiting;
        }
        let recent: Vec<f64> = self
            .window
            .iter()
            .skip(self.window.len() - TREND_SAMPLES)
            .copied()
            .collect();

        let (mut ups, mut downs) = (0usize, 0usize);
        for pair in recent.windows(2) {
            if pair[1] > pair[0] {
                ups += 1;
            } else if pair[1] < pair[0] {
                downs += 1;
            }
        }

        match ups.cmp(&downs) {
            std::cmp::Ordering::Greater => Trend::Bullish,
            std::cmp::Ordering::Less => Trend::Bearish,
            std::cmp::Ordering::Equal => Trend::Sideways,
        }
    }

    /// Mean absolute delta over the last [`VOLATILITY_SAMPLES`] prices.
    fn mean_abs_change(&self) -> Option<f64> {
        if self.window.len() < VOLATILITY_SAMPLES {
            return None;
        }
        let recent: Vec<f64> = self
            .window
            .iter()
            .skip(self.window.len() - VOLATILITY_SAMPLES)
            .copied()
            .collect();
        let sum: f64 = recent.windows(2).map(|p| (p[1] - p[0]).abs()).sum();
        Some(sum / (VOLATILITY_SAMPLES - 1) as f64)
    }
}

/// Indicators derived from one update.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSnapshot {
    pub instrument: String,
    pub price: f64,
    pub timestamp_ms: i64,
    /// `timestamp_ms` as UTC, if in range.
    pub time: Option<DateTime<Utc>>,
    pub price_change: f64,
    pub percent_change: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub update_count: u64,
    pub trend: Trend,
    /// Absent until the window holds [`VOLATILITY_SAMPLES`] prices.
    pub volatility: Option<VolatilityLevel>,
    /// Mean absolute change backing `volatility`.
    pub mean_abs_change: Option<f64>,
    pub session_change: f64,
    pub session_percent: f64,
}

/// Analytics engine over a stream of [`PriceUpdate`]s.
#[derive(Debug, Default)]
pub struct StreamingTicker {
    state: Option<TickerState>,
}

impl StreamingTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state, if any update has been processed.
    pub fn state(&self) -> Option<&TickerState> {
        self.state.as_ref()
    }

    /// Drop all tracked state.
    pub fn reset(&mut self) {
        self.state = None;
    }

    /// Fold one update into the state and return the derived snapshot.
    pub fn update(&mut self, update: &PriceUpdate) -> TickerSnapshot {
        let price = update.price;

        let needs_reset = self
            .state
            .as_ref()
            .map_or(true, |s| s.instrument != update.instrument);
        if needs_reset {
            debug!(instrument = %update.instrument, price, "Ticker reset for instrument");
            self.state = None;
        }
        let state = self
            .state
            .get_or_insert_with(|| TickerState::new(&update.instrument, price));

        state.update_count += 1;
        state.high_price = state.high_price.max(price);
        state.low_price = state.low_price.min(price);

        state.window.push_back(price);
        while state.window.len() > WINDOW_CAPACITY {
            state.window.pop_front();
        }

        let price_change = price - state.previous_price;
        let percent_change = ratio_percent(price_change, state.previous_price);

        let trend = state.trend();
        let mean_abs_change = state.mean_abs_change();
        let volatility = mean_abs_change.map(|v| classify_volatility(v, price));

        let session_change = price - state.open_price;
        let session_percent = ratio_percent(session_change, state.open_price);

        let snapshot = TickerSnapshot {
            instrument: state.instrument.clone(),
            price,
            timestamp_ms: update.timestamp_ms,
            time: update.timestamp(),
            price_change,
            percent_change,
            open: state.open_price,
            high: state.high_price,
            low: state.low_price,
            update_count: state.update_count,
            trend,
            volatility,
            mean_abs_change,
            session_change,
            session_percent,
        };

        state.previous_price = price;
        snapshot
    }
}

fn ratio_percent(change: f64, base: f64) -> f64 {
    if base == 0.0 {
        0.0
    } else {
        change / base * 100.0
    }
}

fn classify_volatility(mean_abs_change: f64, price: f64) -> VolatilityLevel {
    if mean_abs_change < LOW_VOLATILITY_RATIO * price {
        VolatilityLevel::Low
    } else if mean_abs_change < MEDIUM_VOLATILITY_RATIO * price {
        VolatilityLevel::Medium
    } else {
        VolatilityLevel::High
    }
}
