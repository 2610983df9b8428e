//! Session-wide streaming state.
//!
//! The registry owns one [`Session`]. While the streaming flag is set,
//! inbound price notifications on any connection are folded into the
//! shared ticker and the resulting snapshots are forwarded to the sink
//! installed by [`Session::enter_streaming`].

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tradex_feed::{parse_notification, StreamingTicker, TickerSnapshot};
use tradex_telemetry::{MeasurementType, Metrics, PerformanceMonitor};

pub struct Session {
    streaming: AtomicBool,
    ticker: Mutex<StreamingTicker>,
    snapshot_tx: Mutex<Option<mpsc::UnboundedSender<TickerSnapshot>>>,
    monitor: Arc<PerformanceMonitor>,
}

impl Session {
    pub fn new(monitor: Arc<PerformanceMonitor>) -> Self {
        Self {
            streaming: AtomicBool::new(false),
            ticker: Mutex::new(StreamingTicker::new()),
            snapshot_tx: Mutex::new(None),
            monitor,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Enter streaming mode.
    ///
    /// Returns `None` if streaming is already active. Streaming ends when the
    /// returned guard is dropped.
    pub fn enter_streaming(
        self: &Arc<Self>,
        snapshot_tx: mpsc::UnboundedSender<TickerSnapshot>,
    ) -> Option<StreamingGuard> {
        if self
            .streaming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        self.ticker.lock().reset();
        *self.snapshot_tx.lock() = Some(snapshot_tx);
        debug!("Streaming mode entered");
        Some(StreamingGuard {
            session: Arc::clone(self),
        })
    }

    fn exit_streaming(&self) {
        *self.snapshot_tx.lock() = None;
        self.ticker.lock().reset();
        self.streaming.store(false, Ordering::Release);
        debug!("Streaming mode exited");
    }

    /// Feed one notification frame to the ticker, whichever connection it
    /// came from.
    pub(crate) fn handle_notification(&self, conn_id: u64, frame: &Value) {
        let update = match parse_notification(frame) {
            Ok(update) => update,
            Err(e) => {
                warn!(conn_id, error = %e, "Ignoring unrecognized notification");
                return;
            }
        };

        let tag = format!("ticker_{conn_id}");
        self.monitor
            .start_measurement(MeasurementType::MarketDataHandling, &tag);
        let snapshot = self.ticker.lock().update(&update);
        self.monitor
            .stop_measurement(MeasurementType::MarketDataHandling, &tag);
        Metrics::ticker_update(&update.instrument);

        if let Some(tx) = self.snapshot_tx.lock().as_ref() {
            if tx.send(snapshot).is_err() {
                debug!(conn_id, "Snapshot receiver dropped");
            }
        }
    }
}

/// Keeps streaming mode active; dropping it clears the flag and ticker.
pub struct StreamingGuard {
    session: Arc<Session>,
}

impl Drop for StreamingGuard {
    fn drop(&mut self) {
        self.session.exit_streaming();
    }
}
