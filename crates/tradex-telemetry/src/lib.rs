//! Latency monitoring, Prometheus metrics and structured logging for tradex.
//!
//! - `PerformanceMonitor` for tagged and untagged timing samples with
//!   percentile reports
//! - Prometheus metrics for connections, requests and the price stream
//! - Structured logging with tracing

pub mod error;
pub mod latency;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use latency::{LatencyStats, MeasurementType, PerformanceMonitor, TimingSample};
pub use logging::init_logging;
pub use metrics::Metrics;
