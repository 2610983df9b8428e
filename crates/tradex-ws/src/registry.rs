//! Connection registry.
//!
//! Entry point for callers: allocates connection ids, owns every
//! [`Connection`] and the shared [`Session`], and runs streaming mode.
//! Ids start at 0 and are never reused, even after a connection is closed
//! or removed.

use crate::connection::{Connection, ConnectionSnapshot, ConnectionStatus};
use crate::error::{WsError, WsResult};
use crate::message::{Reply, ReplyOutcome, METHOD_SUBSCRIBE, METHOD_UNSUBSCRIBE_ALL};
use crate::session::Session;
use crate::transport::{TransportFactory, TungsteniteFactory};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tradex_feed::TickerSnapshot;
use tradex_telemetry::PerformanceMonitor;

/// Close code used when the registry is torn down.
pub const GOING_AWAY_CODE: u16 = 1001;

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a request waits for its reply.
    pub request_timeout: Duration,
    /// Message log entries retained per connection.
    pub log_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            log_capacity: 1000,
        }
    }
}

/// Outcome of a finished streaming session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub updates: u64,
    pub reason: StreamEnd,
}

/// Why streaming stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Cancelled,
    ConnectionEnded,
}

/// Owns all connections keyed by id.
pub struct ConnectionRegistry {
    connections: RwLock<BTreeMap<u64, Arc<Connection>>>,
    next_id: AtomicU64,
    factory: Arc<dyn TransportFactory>,
    session: Arc<Session>,
    monitor: Arc<PerformanceMonitor>,
    config: RegistryConfig,
}

impl ConnectionRegistry {
    /// Registry using the tungstenite transport.
    pub fn new(config: RegistryConfig, monitor: Arc<PerformanceMonitor>) -> Self {
        Self::with_transport(config, monitor, Arc::new(TungsteniteFactory))
    }

    pub fn with_transport(
        config: RegistryConfig,
        monitor: Arc<PerformanceMonitor>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            connections: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
            factory,
            session: Arc::new(Session::new(monitor.clone())),
            monitor,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// Open a connection to `uri` and return its id.
    ///
    /// Returns before the handshake completes; failures surface later as a
    /// transition to `Error`.
    pub fn connect(&self, uri: &str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let transport = self.factory.create(uri);
        let connection = Connection::open(
            id,
            uri,
            transport,
            self.session.clone(),
            self.monitor.clone(),
            self.config.request_timeout,
            self.config.log_capacity,
        );
        self.connections.write().insert(id, Arc::new(connection));
        info!(conn_id = id, uri = %uri, "Connection created");
        id
    }

    pub fn get(&self, id: u64) -> Option<Arc<Connection>> {
        self.connections.read().get(&id).cloned()
    }

    fn require(&self, id: u64) -> WsResult<Arc<Connection>> {
        self.get(id).ok_or(WsError::UnknownConnection(id))
    }

    pub fn status(&self, id: u64) -> Option<ConnectionSnapshot> {
        self.get(id).map(|conn| conn.snapshot())
    }

    /// Snapshots of every connection, ordered by id.
    pub fn list(&self) -> Vec<ConnectionSnapshot> {
        self.connections
            .read()
            .values()
            .map(|conn| conn.snapshot())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Transmit a raw payload on a connected connection.
    pub fn send(&self, id: u64, payload: &str) -> WsResult<()> {
        self.require(id)?.send(payload)
    }

    /// Send a request and wait for its reply.
    pub async fn request(&self, id: u64, method: &str, params: Value) -> WsResult<Reply> {
        let conn = self.require(id)?;
        conn.request(method, params).await
    }

    /// Close a connection with the given code and reason.
    pub fn close(&self, id: u64, code: u16, reason: &str) -> WsResult<()> {
        match self.get(id) {
            Some(conn) => conn.close(code, reason),
            None => {
                warn!(conn_id = id, "Close requested for unknown connection");
                Err(WsError::UnknownConnection(id))
            }
        }
    }

    /// Drop a connection from the registry. Its id is not reused.
    pub fn remove(&self, id: u64) -> Option<Arc<Connection>> {
        let removed = self.connections.write().remove(&id);
        if removed.is_some() {
            debug!(conn_id = id, "Connection removed");
        }
        removed
    }

    /// Close every connected connection. Closed and failed ones are skipped.
    pub fn shutdown(&self) {
        let connections: Vec<Arc<Connection>> =
            self.connections.read().values().cloned().collect();
        for conn in connections {
            if conn.status() != ConnectionStatus::Connected {
                continue;
            }
            if let Err(e) = conn.close(GOING_AWAY_CODE, "Client shutting down") {
                warn!(conn_id = conn.id(), error = %e, "Failed to close connection");
            }
        }
    }

    /// Subscribe to `channels` and deliver ticker snapshots until cancelled.
    ///
    /// Streaming mode is session-wide: while it is active, notifications
    /// arriving on any connection feed the same ticker, not only `id`.
    /// It is left on every exit path. When the connection is still open
    /// afterwards, `private/unsubscribe_all` is sent.
    pub async fn stream<F>(
        &self,
        id: u64,
        channels: Vec<String>,
        cancel: CancellationToken,
        mut on_snapshot: F,
    ) -> WsResult<StreamSummary>
    where
        F: FnMut(TickerSnapshot),
    {
        if channels.is_empty() {
            return Err(WsError::InvalidRequest("no channels to subscribe".to_string()));
        }
        let conn = self.require(id)?;

        let (snapshot_tx, mut snapshot_rx) = mpsc::unbounded_channel();
        let guard = self
            .session
            .enter_streaming(snapshot_tx)
            .ok_or(WsError::StreamingActive)?;

        let reply = conn
            .request(METHOD_SUBSCRIBE, json!({ "channels": channels }))
            .await?;
        if let ReplyOutcome::Error(err) = &reply.outcome {
            return Err(WsError::SubscribeRejected(err.to_string()));
        }
        info!(conn_id = id, channels = ?channels, "Streaming started");

        let mut updates = 0u64;
        let mut poll = tokio::time::interval(STATUS_POLL_INTERVAL);
        let reason = loop {
            tokio::select! {
                () = cancel.cancelled() => break StreamEnd::Cancelled,
                snapshot = snapshot_rx.recv() => match snapshot {
                    Some(snapshot) => {
                        updates += 1;
                        on_snapshot(snapshot);
                    }
                    None => break StreamEnd::ConnectionEnded,
                },
                _ = poll.tick() => {
                    if conn.status().is_terminal() {
                        break StreamEnd::ConnectionEnded;
                    }
                }
            }
        };
        drop(guard);
        info!(conn_id = id, updates, reason = ?reason, "Streaming stopped");

        if conn.status() == ConnectionStatus::Connected {
            match conn.request(METHOD_UNSUBSCRIBE_ALL, json!({})).await {
                Ok(reply) if reply.is_error() => {
                    warn!(conn_id = id, raw = %reply.raw, "Unsubscribe rejected");
                }
                Ok(_) => debug!(conn_id = id, "Unsubscribed from all channels"),
                Err(e) => warn!(conn_id = id, error = %e, "Unsubscribe failed"),
            }
        }

        Ok(StreamSummary { updates, reason })
    }

    pub fn latency_report(&self) -> String {
        self.monitor.generate_report()
    }

    pub fn reset_latency_metrics(&self) {
        self.monitor.reset();
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
