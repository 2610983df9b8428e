//! Latency measurement with percentile reporting.
//!
//! Samples are grouped by [`MeasurementType`]. Untagged measurements are
//! matched first-open-first-closed within their type; tagged measurements
//! are held in an in-flight map until stopped, so overlapping operations of
//! the same type can be timed independently.
//!
//! Percentiles use `index = floor(n * p)` over the sorted completed
//! durations, clamped to `n - 1`.

use crate::metrics::Metrics;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tracing::debug;

const REPORT_WIDTH: usize = 80;
const TYPE_COLUMN_WIDTH: usize = 30;

/// Category of a timed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MeasurementType {
    /// Building and validating order requests.
    OrderExecution,
    /// Building data queries and processing streamed prices.
    MarketDataHandling,
    /// Handling one inbound WebSocket frame.
    WebSocketCommunication,
    /// Full request round-trip, send to reply.
    TradingCycleFull,
}

impl MeasurementType {
    /// All measurement types in report order.
    pub const ALL: [MeasurementType; 4] = [
        Self::OrderExecution,
        Self::MarketDataHandling,
        Self::WebSocketCommunication,
        Self::TradingCycleFull,
    ];

    /// Human-readable name used in reports.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::OrderExecution => "Order Execution",
            Self::MarketDataHandling => "Market Data Handling",
            Self::WebSocketCommunication => "WebSocket Communication",
            Self::TradingCycleFull => "Trading Cycle Full",
        }
    }

    /// Metric label value.
    pub fn metric_label(self) -> &'static str {
        match self {
            Self::OrderExecution => "order_execution",
            Self::MarketDataHandling => "market_data_handling",
            Self::WebSocketCommunication => "websocket_communication",
            Self::TradingCycleFull => "trading_cycle_full",
        }
    }
}

/// A single timing sample.
#[derive(Debug, Clone, Copy)]
pub struct TimingSample {
    /// When the measurement started.
    pub start: Instant,
    /// When the measurement stopped (None while open).
    pub end: Option<Instant>,
    /// Elapsed time (zero while open).
    pub duration: Duration,
    /// Whether the measurement has been stopped.
    pub complete: bool,
}

impl TimingSample {
    fn open(start: Instant) -> Self {
        Self {
            start,
            end: None,
            duration: Duration::ZERO,
            complete: false,
        }
    }

    fn finish(&mut self, end: Instant) -> Duration {
        self.end = Some(end);
        self.duration = end.saturating_duration_since(self.start);
        self.complete = true;
        self.duration
    }
}

/// Summary statistics over completed samples of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: usize,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
}

impl LatencyStats {
    /// Compute statistics. Returns `None` for an empty input.
    pub fn from_durations(mut durations: Vec<Duration>) -> Option<Self> {
        if durations.is_empty() {
            return None;
        }
        durations.sort_unstable();

        let n = durations.len();
        let total_nanos: u128 = durations.iter().map(Duration::as_nanos).sum();
        let mean_nanos = total_nanos / n as u128;
        let mean = Duration::from_nanos(u64::try_from(mean_nanos).unwrap_or(u64::MAX));

        Some(Self {
            count: n,
            mean,
            min: durations[0],
            max: durations[n - 1],
            p50: durations[percentile_index(n, 0.50)],
            p90: durations[percentile_index(n, 0.90)],
            p99: durations[percentile_index(n, 0.99)],
        })
    }
}

/// Index of the p-th percentile in a sorted slice of length `n` (n > 0).
pub fn percentile_index(n: usize, p: f64) -> usize {
    let raw = (n as f64 * p).floor() as usize;
    raw.min(n.saturating_sub(1))
}

#[derive(Debug, Default)]
struct MonitorState {
    samples: BTreeMap<MeasurementType, Vec<TimingSample>>,
    in_flight: HashMap<String, TimingSample>,
}

/// Thread-safe timing instrumentation.
///
/// All operations are serialized by a single lock.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    state: Mutex<MonitorState>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a measurement.
    ///
    /// An empty `tag` opens a new sample on the type's list; a non-empty tag
    /// stores the open sample under that tag, replacing any earlier sample
    /// still open under the same tag.
    pub fn start_measurement(&self, kind: MeasurementType, tag: &str) {
        let sample = TimingSample::open(Instant::now());
        let mut state = self.state.lock();
        if tag.is_empty() {
            state.samples.entry(kind).or_default().push(sample);
        } else {
            state.in_flight.insert(tag.to_string(), sample);
        }
    }

    /// Stop a measurement, returning its duration if one was completed.
    ///
    /// An empty `tag` completes the first still-open sample of the type. A
    /// non-empty tag moves the matching in-flight sample into the type's
    /// list; an unknown tag is a no-op.
    pub fn stop_measurement(&self, kind: MeasurementType, tag: &str) -> Option<Duration> {
        let end = Instant::now();
        let completed = {
            let mut state = self.state.lock();
            if tag.is_empty() {
                state
                    .samples
                    .get_mut(&kind)
                    .and_then(|list| list.iter_mut().find(|s| !s.complete))
                    .map(|sample| sample.finish(end))
            } else {
                match state.in_flight.remove(tag) {
                    Some(mut sample) => {
                        let elapsed = sample.finish(end);
                        state.samples.entry(kind).or_default().push(sample);
                        Some(elapsed)
                    }
                    None => None,
                }
            }
        };

        if let Some(elapsed) = completed {
            Metrics::latency_sample(kind.metric_label(), elapsed.as_secs_f64() * 1_000_000.0);
        }
        completed
    }

    /// Record an already-measured duration as a completed sample.
    pub fn record(&self, kind: MeasurementType, duration: Duration) {
        let end = Instant::now();
        let start = end.checked_sub(duration).unwrap_or(end);
        let sample = TimingSample {
            start,
            end: Some(end),
            duration,
            complete: true,
        };
        self.state.lock().samples.entry(kind).or_default().push(sample);
        Metrics::latency_sample(kind.metric_label(), duration.as_secs_f64() * 1_000_000.0);
    }

    /// Statistics per type with at least one completed sample.
    pub fn stats(&self) -> BTreeMap<MeasurementType, LatencyStats> {
        let state = self.state.lock();
        state
            .samples
            .iter()
            .filter_map(|(kind, samples)| {
                let durations = completed_durations(samples);
                LatencyStats::from_durations(durations).map(|stats| (*kind, stats))
            })
            .collect()
    }

    /// Snapshot copy of all recorded samples grouped by type.
    pub fn raw_metrics(&self) -> BTreeMap<MeasurementType, Vec<TimingSample>> {
        self.state.lock().samples.clone()
    }

    /// Number of tagged measurements still open.
    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Clear all recorded and in-flight samples.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.samples.clear();
        state.in_flight.clear();
        debug!("Performance metrics reset");
    }

    /// Render a text report of the current statistics.
    pub fn generate_report(&self) -> String {
        let state = self.state.lock();
        let mut report = String::new();

        let header = " Performance Benchmarking Report ";
        let padding = "=".repeat(REPORT_WIDTH.saturating_sub(header.len()) / 2);
        let _ = writeln!(report, "{padding}{header}{padding}\n");

        let mut any = false;
        for kind in MeasurementType::ALL {
            let Some(samples) = state.samples.get(&kind) else {
                continue;
            };
            if samples.is_empty() {
                continue;
            }
            any = true;

            let Some(stats) = LatencyStats::from_durations(completed_durations(samples)) else {
                let _ = writeln!(
                    report,
                    "{} Latency: No completed measurements\n",
                    kind.display_name()
                );
                continue;
            };

            let indent = " ".repeat(TYPE_COLUMN_WIDTH);
            let _ = writeln!(
                report,
                "{:<width$}  Meas: {:>6}  Mean: {:>10.3} µs",
                kind.display_name(),
                stats.count,
                micros(stats.mean),
                width = TYPE_COLUMN_WIDTH
            );
            let _ = writeln!(
                report,
                "{indent}  Min:  {:>10.3} µs  Max:  {:>10.3} µs",
                micros(stats.min),
                micros(stats.max)
            );
            let _ = writeln!(
                report,
                "{indent}  50th: {:>10.3} µs  90th: {:>10.3} µs  99th: {:>10.3} µs\n",
                micros(stats.p50),
                micros(stats.p90),
                micros(stats.p99)
            );
        }

        if !any {
            let _ = writeln!(report, "No measurements recorded\n");
        }
        let _ = writeln!(report, "{}", "=".repeat(REPORT_WIDTH));
        report
    }
}

fn completed_durations(samples: &[TimingSample]) -> Vec<Duration> {
    samples
        .iter()
        .filter(|s| s.complete)
        .map(|s| s.duration)
        .collect()
}

fn micros(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000_000.0
}
