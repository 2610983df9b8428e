//! Prometheus metrics for the tradex client.
//!
//! Covers:
//! - Connection lifecycle
//! - Request round-trips and timeouts
//! - Inbound frame handling
//! - Price stream updates
//! - Completed latency samples from `PerformanceMonitor`
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a programming error that should crash on
//! first use rather than silently drop observations.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_gauge_vec,
    CounterVec, Encoder, HistogramVec, IntCounter, IntGaugeVec, TextEncoder,
};

/// Connections per lifecycle status.
/// Labels: status (connecting/connected/closed/error)
pub static CONNECTIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "tradex_connections",
        "Number of connections per lifecycle status",
        &["status"]
    )
    .unwrap()
});

/// WebSocket frames by direction.
/// Labels: direction (sent/received)
pub static WS_FRAMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tradex_ws_frames_total",
        "Total WebSocket text frames by direction",
        &["direction"]
    )
    .unwrap()
});

/// Inbound frames that failed JSON parsing.
pub static WS_PARSE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tradex_ws_parse_errors_total",
        "Inbound frames discarded because they were not valid JSON"
    )
    .unwrap()
});

/// Request outcomes.
/// Labels: method, outcome (ok/rpc_error/timeout/connection_lost)
pub static REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tradex_requests_total",
        "Total JSON-RPC requests by method and outcome",
        &["method", "outcome"]
    )
    .unwrap()
});

/// Request round-trip time in milliseconds.
pub static REQUEST_RTT_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tradex_request_rtt_ms",
        "JSON-RPC request round-trip time in milliseconds",
        &["method"],
        vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Replies that arrived with no matching pending request.
pub static UNSOLICITED_REPLIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tradex_unsolicited_replies_total",
        "Replies received after their request timed out or with an unknown id"
    )
    .unwrap()
});

/// Price stream updates processed by the ticker.
pub static TICKER_UPDATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tradex_ticker_updates_total",
        "Price index notifications processed while streaming",
        &["instrument"]
    )
    .unwrap()
});

/// Completed latency samples in microseconds.
/// Labels: measurement (order_execution/market_data_handling/...)
pub static LATENCY_US: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tradex_latency_us",
        "Completed PerformanceMonitor samples in microseconds",
        &["measurement"],
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0, 100000.0, 1000000.0]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a connection entering a status.
    pub fn connection_entered(status: &str) {
        CONNECTIONS.with_label_values(&[status]).inc();
    }

    /// Record a connection moving from one status to another.
    pub fn connection_transition(from: &str, to: &str) {
        CONNECTIONS.with_label_values(&[from]).dec();
        CONNECTIONS.with_label_values(&[to]).inc();
    }

    /// Record an outbound frame.
    pub fn frame_sent() {
        WS_FRAMES_TOTAL.with_label_values(&["sent"]).inc();
    }

    /// Record an inbound frame.
    pub fn frame_received() {
        WS_FRAMES_TOTAL.with_label_values(&["received"]).inc();
    }

    /// Record an inbound frame discarded as malformed.
    pub fn parse_error() {
        WS_PARSE_ERRORS_TOTAL.inc();
    }

    /// Record a request outcome.
    pub fn request_outcome(method: &str, outcome: &str) {
        REQUESTS_TOTAL.with_label_values(&[method, outcome]).inc();
    }

    /// Record a request round-trip.
    pub fn request_rtt(method: &str, rtt_ms: f64) {
        REQUEST_RTT_MS.with_label_values(&[method]).observe(rtt_ms);
    }

    /// Record a reply nobody was waiting for.
    pub fn unsolicited_reply() {
        UNSOLICITED_REPLIES_TOTAL.inc();
    }

    /// Record a ticker update.
    pub fn ticker_update(instrument: &str) {
        TICKER_UPDATES_TOTAL.with_label_values(&[instrument]).inc();
    }

    /// Record a completed latency sample.
    pub fn latency_sample(measurement: &str, micros: f64) {
        LATENCY_US.with_label_values(&[measurement]).observe(micros);
    }

    /// Render the default registry in Prometheus text exposition format.
    pub fn gather_text() -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_text_output() {
        Metrics::request_outcome("public/test", "ok");
        Metrics::frame_sent();

        let text = Metrics::gather_text();
        assert!(text.contains("tradex_requests_total"));
        assert!(text.contains("tradex_ws_frames_total"));
    }

    #[test]
    fn test_connection_transition_moves_gauge() {
        Metrics::connection_entered("connecting");
        let before = CONNECTIONS.with_label_values(&["connected"]).get();
        Metrics::connection_transition("connecting", "connected");
        let after = CONNECTIONS.with_label_values(&["connected"]).get();
        assert_eq!(after, before + 1);
    }
}
