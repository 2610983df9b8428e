//! A single JSON-RPC connection.
//!
//! Owns one transport, the lifecycle status, a bounded message log and the
//! pending-request slot. The transport's delivery task drives
//! [`ConnectionCore`] through [`EventSink`]; the caller drives
//! [`Connection::request`], which blocks (asynchronously) until the reply
//! with the matching id arrives or the request timeout elapses.
//!
//! Status transitions:
//! `Connecting -> Connected -> {Closed | Error}`, and
//! `Connecting -> {Closed | Error}` on handshake failure.
//! `Closed` and `Error` are terminal.

use crate::error::{WsError, WsResult};
use crate::message::{classify, InboundFrame, OutboundEnvelope, Reply, ReplyKind, ReplyOutcome};
use crate::session::Session;
use crate::transport::{EventSink, Transport, TransportEvent};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tradex_telemetry::{MeasurementType, Metrics, PerformanceMonitor};

/// Connection lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Closed,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }

    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, next),
            (Connecting, Connected) | (Connecting, Closed) | (Connecting, Error)
                | (Connected, Closed)
                | (Connected, Error)
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a logged frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => f.write_str("SENT"),
            Self::Received => f.write_str("RECEIVED"),
        }
    }
}

/// One message log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub direction: Direction,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.direction, self.payload)
    }
}

/// Ring buffer of log entries with a running total.
#[derive(Debug)]
struct MessageLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    total: u64,
}

impl MessageLog {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total: 0,
        }
    }

    fn push(&mut self, direction: Direction, payload: String) {
        self.total += 1;
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            direction,
            payload,
            timestamp: Utc::now(),
        });
    }
}

#[derive(Debug)]
enum Completion {
    Reply { outcome: ReplyOutcome, raw: String },
    Lost(String),
}

#[derive(Debug)]
struct PendingRequest {
    request_id: u64,
    method: String,
    kind: ReplyKind,
    created_at: Instant,
    tx: oneshot::Sender<Completion>,
}

/// State guarded by the per-connection lock.
#[derive(Debug)]
struct Exchange {
    log: MessageLog,
    pending: Option<PendingRequest>,
    /// A reply was delivered and not yet consumed by the waiter.
    ready: bool,
}

#[derive(Debug, Clone)]
struct Lifecycle {
    status: ConnectionStatus,
    server_info: Option<String>,
    error_message: Option<String>,
    close_code: Option<u16>,
    close_reason: Option<String>,
}

/// Point-in-time view of a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    pub id: u64,
    pub uri: String,
    pub status: ConnectionStatus,
    pub server_info: Option<String>,
    pub error_message: Option<String>,
    pub close_code: Option<u16>,
    pub close_reason: Option<String>,
    /// Entries ever logged, including evicted ones.
    pub messages_total: u64,
    pub messages_retained: usize,
    /// Method of the request currently awaiting a reply.
    pub awaiting: Option<String>,
    /// How long that request has been waiting.
    pub awaiting_for: Option<Duration>,
}

/// Shared state driven by the transport's delivery task.
pub(crate) struct ConnectionCore {
    id: u64,
    uri: String,
    lifecycle: RwLock<Lifecycle>,
    exchange: Mutex<Exchange>,
    session: Arc<Session>,
    monitor: Arc<PerformanceMonitor>,
}

impl ConnectionCore {
    fn status(&self) -> ConnectionStatus {
        self.lifecycle.read().status
    }

    fn transition(&self, next: ConnectionStatus, update: impl FnOnce(&mut Lifecycle)) -> bool {
        let from = {
            let mut lifecycle = self.lifecycle.write();
            let from = lifecycle.status;
            if !from.can_transition_to(next) {
                debug!(conn_id = self.id, from = %from, to = %next, "Ignoring status transition");
                return false;
            }
            lifecycle.status = next;
            update(&mut lifecycle);
            from
        };
        Metrics::connection_transition(from.as_str(), next.as_str());
        info!(conn_id = self.id, uri = %self.uri, from = %from, to = %next, "Connection status changed");
        true
    }

    fn fail_pending(&self, reason: String) {
        let pending = self.exchange.lock().pending.take();
        if let Some(pending) = pending {
            warn!(
                conn_id = self.id,
                request_id = pending.request_id,
                method = %pending.method,
                %reason,
                "Failing pending request"
            );
            let _ = pending.tx.send(Completion::Lost(reason));
        }
    }

    /// Record a local transport failure.
    fn record_error(&self, message: String) {
        self.transition(ConnectionStatus::Error, |l| {
            l.error_message = Some(message.clone());
        });
        self.fail_pending(message);
    }

    fn handle_text(&self, text: String) {
        Metrics::frame_received();
        let tag = format!("websocket_message_{}", self.id);
        self.monitor
            .start_measurement(MeasurementType::WebSocketCommunication, &tag);
        self.process_text(text);
        self.monitor
            .stop_measurement(MeasurementType::WebSocketCommunication, &tag);
    }

    fn process_text(&self, text: String) {
        let frame: Value = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn_id = self.id, error = %e, "Discarding malformed frame");
                Metrics::parse_error();
                return;
            }
        };

        let classified = classify(&frame);
        if matches!(classified, InboundFrame::Notification) && self.session.is_streaming() {
            self.session.handle_notification(self.id, &frame);
            return;
        }

        let mut exchange = self.exchange.lock();
        exchange.log.push(Direction::Received, text.clone());

        let InboundFrame::Reply { id, outcome } = classified else {
            return;
        };

        let matched = exchange
            .pending
            .as_ref()
            .is_some_and(|pending| pending.request_id == id);
        if !matched {
            drop(exchange);
            warn!(conn_id = self.id, reply_id = id, "Reply with no matching pending request");
            Metrics::unsolicited_reply();
            return;
        }

        let pending = exchange.pending.take();
        exchange.ready = pending.is_some();
        drop(exchange);

        if let Some(pending) = pending {
            debug!(
                conn_id = self.id,
                request_id = id,
                method = %pending.method,
                kind = ?pending.kind,
                "Reply matched pending request"
            );
            if pending.tx.send(Completion::Reply { outcome, raw: text }).is_err() {
                debug!(conn_id = self.id, request_id = id, "Waiter already gone");
            }
        }
    }
}

impl EventSink for ConnectionCore {
    fn on_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Open { server } => {
                self.transition(ConnectionStatus::Connected, |l| l.server_info = server);
            }
            TransportEvent::Message(text) => self.handle_text(text),
            TransportEvent::Closed { code, reason } => {
                let summary = format!("closed: code={code}, reason={reason}");
                self.transition(ConnectionStatus::Closed, |l| {
                    l.close_code = Some(code);
                    l.close_reason = Some(reason);
                });
                self.fail_pending(summary);
            }
            TransportEvent::Error(message) => {
                warn!(conn_id = self.id, error = %message, "Transport error");
                self.record_error(message);
            }
        }
    }
}

fn is_sendable_close_code(code: u16) -> bool {
    matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
}

/// One connection and its transport.
pub struct Connection {
    core: Arc<ConnectionCore>,
    transport: Box<dyn Transport>,
    request_timeout: Duration,
}

impl Connection {
    /// Build the connection and start its transport.
    pub(crate) fn open(
        id: u64,
        uri: &str,
        transport: Box<dyn Transport>,
        session: Arc<Session>,
        monitor: Arc<PerformanceMonitor>,
        request_timeout: Duration,
        log_capacity: usize,
    ) -> Self {
        let core = Arc::new(ConnectionCore {
            id,
            uri: uri.to_string(),
            lifecycle: RwLock::new(Lifecycle {
                status: ConnectionStatus::Connecting,
                server_info: None,
                error_message: None,
                close_code: None,
                close_reason: None,
            }),
            exchange: Mutex::new(Exchange {
                log: MessageLog::new(log_capacity),
                pending: None,
                ready: false,
            }),
            session,
            monitor,
        });
        Metrics::connection_entered(ConnectionStatus::Connecting.as_str());

        let sink: Arc<dyn EventSink> = core.clone();
        transport.start(sink);

        Self {
            core,
            transport,
            request_timeout,
        }
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn uri(&self) -> &str {
        &self.core.uri
    }

    pub fn status(&self) -> ConnectionStatus {
        self.core.status()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let lifecycle = self.core.lifecycle.read().clone();
        let exchange = self.core.exchange.lock();
        ConnectionSnapshot {
            id: self.core.id,
            uri: self.core.uri.clone(),
            status: lifecycle.status,
            server_info: lifecycle.server_info,
            error_message: lifecycle.error_message,
            close_code: lifecycle.close_code,
            close_reason: lifecycle.close_reason,
            messages_total: exchange.log.total,
            messages_retained: exchange.log.entries.len(),
            awaiting: exchange.pending.as_ref().map(|p| p.method.clone()),
            awaiting_for: exchange.pending.as_ref().map(|p| p.created_at.elapsed()),
        }
    }

    /// Copy of the retained message log, oldest first.
    pub fn messages(&self) -> Vec<LogEntry> {
        self.core.exchange.lock().log.entries.iter().cloned().collect()
    }

    /// Whether a reply has been delivered but not yet consumed.
    pub fn is_ready(&self) -> bool {
        self.core.exchange.lock().ready
    }

    /// Whether a request is waiting for its reply.
    pub fn has_pending(&self) -> bool {
        self.core.exchange.lock().pending.is_some()
    }

    fn ensure_connected(&self) -> WsResult<()> {
        match self.status() {
            ConnectionStatus::Connected => Ok(()),
            status => Err(WsError::NotConnected {
                id: self.core.id,
                status,
            }),
        }
    }

    fn transmit(&self, text: String) -> WsResult<()> {
        self.transport.send(text).map_err(|e| {
            self.core.record_error(e.to_string());
            e
        })
    }

    /// Send a raw payload without waiting for a reply.
    pub fn send(&self, payload: &str) -> WsResult<()> {
        self.ensure_connected()?;
        self.core
            .exchange
            .lock()
            .log
            .push(Direction::Sent, payload.to_string());
        self.transmit(payload.to_string())?;
        debug!(conn_id = self.core.id, bytes = payload.len(), "Payload sent");
        Ok(())
    }

    /// Send a request and wait for its reply.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if the connection is not open
    /// - `RequestInFlight` if another request is still waiting
    /// - `RequestTimeout` if no reply arrives within the request timeout
    /// - `ConnectionLost` if the connection closes or fails first
    pub async fn request(&self, method: &str, params: Value) -> WsResult<Reply> {
        self.ensure_connected()?;

        let envelope = OutboundEnvelope::new(method, params);
        let text = envelope.to_json()?;
        let request_id = envelope.id;
        let kind = ReplyKind::for_request(method, &envelope.params);
        let (tx, rx) = oneshot::channel();
        let created_at = Instant::now();

        {
            let mut exchange = self.core.exchange.lock();
            if let Some(pending) = &exchange.pending {
                return Err(WsError::RequestInFlight {
                    id: self.core.id,
                    method: pending.method.clone(),
                });
            }
            exchange.ready = false;
            exchange.pending = Some(PendingRequest {
                request_id,
                method: method.to_string(),
                kind: kind.clone(),
                created_at,
                tx,
            });
            exchange.log.push(Direction::Sent, text.clone());
        }

        if let Err(e) = self.transmit(text) {
            self.clear_pending(request_id);
            Metrics::request_outcome(method, "send_failed");
            return Err(e);
        }
        debug!(conn_id = self.core.id, request_id, method, "Request sent");

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(Completion::Reply { outcome, raw })) => {
                self.core.exchange.lock().ready = false;
                let round_trip = created_at.elapsed();
                self.core
                    .monitor
                    .record(MeasurementType::TradingCycleFull, round_trip);
                Metrics::request_rtt(method, round_trip.as_secs_f64() * 1000.0);
                let label = match outcome {
                    ReplyOutcome::Result(_) => "ok",
                    ReplyOutcome::Error(_) => "rpc_error",
                };
                Metrics::request_outcome(method, label);
                Ok(Reply {
                    request_id,
                    method: method.to_string(),
                    kind,
                    outcome,
                    raw,
                    round_trip,
                })
            }
            Ok(Ok(Completion::Lost(reason))) => {
                Metrics::request_outcome(method, "connection_lost");
                Err(WsError::ConnectionLost(reason))
            }
            Ok(Err(_)) => {
                Metrics::request_outcome(method, "connection_lost");
                Err(WsError::ConnectionLost("reply channel dropped".to_string()))
            }
            Err(_) => {
                self.clear_pending(request_id);
                let timeout_ms = u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(conn_id = self.core.id, request_id, method, timeout_ms, "Request timed out");
                Metrics::request_outcome(method, "timeout");
                Err(WsError::RequestTimeout {
                    method: method.to_string(),
                    timeout_ms,
                })
            }
        }
    }

    fn clear_pending(&self, request_id: u64) {
        let mut exchange = self.core.exchange.lock();
        if exchange
            .pending
            .as_ref()
            .is_some_and(|p| p.request_id == request_id)
        {
            exchange.pending = None;
        }
        exchange.ready = false;
    }

    /// Ask the transport to close with `code` and `reason`.
    ///
    /// The status moves to `Closed` once the transport reports the close.
    pub fn close(&self, code: u16, reason: &str) -> WsResult<()> {
        let status = self.status();
        if status.is_terminal() {
            return Err(WsError::NotConnected {
                id: self.core.id,
                status,
            });
        }
        if !is_sendable_close_code(code) {
            return Err(WsError::InvalidRequest(format!(
                "close code {code} may not be sent"
            )));
        }
        info!(conn_id = self.core.id, code, reason, "Closing connection");
        self.transport.close(code, reason)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.transport.shutdown();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.core.id)
            .field("uri", &self.core.uri)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::MockTransport;
    use serde_json::json;

    fn open_with(transport: &MockTransport, timeout: Duration, capacity: usize) -> Arc<Connection> {
        let monitor = Arc::new(PerformanceMonitor::new());
        let session = Arc::new(Session::new(monitor.clone()));
        Arc::new(Connection::open(
            0,
            "wss://example.invalid/ws",
            Box::new(transport.clone()),
            session,
            monitor,
            timeout,
            capacity,
        ))
    }

    fn connected(transport: &MockTransport) -> Arc<Connection> {
        let conn = open_with(transport, Duration::from_secs(5), 100);
        transport.emit(TransportEvent::Open {
            server: Some("mock".to_string()),
        });
        conn
    }

    async fn next_sent(transport: &MockTransport, count: usize) -> OutboundEnvelope {
        for _ in 0..200 {
            let sent = transport.sent();
            if sent.len() >= count {
                return OutboundEnvelope::from_json(&sent[count - 1]).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("request was never sent");
    }

    #[test]
    fn test_status_transitions() {
        use ConnectionStatus::*;
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Error));
        assert!(Connecting.can_transition_to(Closed));
        assert!(Connected.can_transition_to(Closed));
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Closed.can_transition_to(Connected));
        assert!(!Closed.can_transition_to(Error));
        assert!(!Error.can_transition_to(Closed));
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let transport = MockTransport::default();
        let conn = connected(&transport);
        assert_eq!(conn.status(), ConnectionStatus::Connected);
        assert_eq!(conn.snapshot().server_info.as_deref(), Some("mock"));

        transport.emit(TransportEvent::Closed {
            code: 1000,
            reason: "bye".to_string(),
        });
        transport.emit(TransportEvent::Error("late failure".to_string()));
        transport.emit(TransportEvent::Open { server: None });

        let snapshot = conn.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Closed);
        assert_eq!(snapshot.close_code, Some(1000));
        assert!(snapshot.error_message.is_none());
    }

    #[test]
    fn test_handshake_failure_goes_to_error() {
        let transport = MockTransport::default();
        let conn = open_with(&transport, Duration::from_secs(1), 10);
        transport.emit(TransportEvent::Error("connection refused".to_string()));

        let snapshot = conn.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Error);
        assert_eq!(snapshot.error_message.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_send_requires_connected() {
        let transport = MockTransport::default();
        let conn = open_with(&transport, Duration::from_secs(1), 10);
        let err = conn.send("{}").unwrap_err();
        assert!(matches!(
            err,
            WsError::NotConnected {
                status: ConnectionStatus::Connecting,
                ..
            }
        ));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_send_logs_entry() {
        let transport = MockTransport::default();
        let conn = connected(&transport);
        conn.send(r#"{"method":"public/test"}"#).unwrap();

        let messages = conn.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to_string(), r#"SENT: {"method":"public/test"}"#);
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_send_failure_records_error() {
        let transport = MockTransport::default();
        let conn = connected(&transport);
        transport.state.lock().fail_sends = true;

        assert!(matches!(conn.send("{}"), Err(WsError::SendFailed(_))));
        assert_eq!(conn.status(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn test_request_reply_round_trip() {
        let transport = MockTransport::default();
        let conn = connected(&transport);

        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move {
                conn.request("public/get_order_book", json!({"instrument_name": "BTC-PERPETUAL", "depth": 5}))
                    .await
            })
        };

        let sent = next_sent(&transport, 1).await;
        assert_eq!(sent.method, "public/get_order_book");
        assert!(conn.has_pending());
        let pending = conn.snapshot();
        assert_eq!(pending.awaiting.as_deref(), Some("public/get_order_book"));
        assert!(pending.awaiting_for.is_some());

        let reply = json!({"jsonrpc": "2.0", "id": sent.id, "result": {"bids": [], "asks": []}});
        transport.emit(TransportEvent::Message(reply.to_string()));

        let reply = waiter.await.unwrap().unwrap();
        assert_eq!(reply.request_id, sent.id);
        assert_eq!(
            reply.kind,
            ReplyKind::OrderBook {
                instrument: "BTC-PERPETUAL".to_string(),
                depth: 5
            }
        );
        assert!(reply.result().is_some());
        assert!(!conn.has_pending());
        assert!(!conn.is_ready());
        assert!(conn.snapshot().awaiting_for.is_none());

        let messages = conn.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].direction, Direction::Sent);
        assert_eq!(messages[1].direction, Direction::Received);
    }

    #[tokio::test]
    async fn test_error_reply_completes_request() {
        let transport = MockTransport::default();
        let conn = connected(&transport);

        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.request("private/buy", json!({})).await })
        };
        let sent = next_sent(&transport, 1).await;
        let reply = json!({
            "jsonrpc": "2.0",
            "id": sent.id,
            "error": {"code": 13009, "message": "unauthorized"}
        });
        transport.emit(TransportEvent::Message(reply.to_string()));

        let reply = waiter.await.unwrap().unwrap();
        assert!(reply.is_error());
        assert_eq!(reply.error().unwrap().code, 13009);
    }

    #[tokio::test]
    async fn test_request_timeout_leaves_not_ready() {
        let transport = MockTransport::default();
        let conn = open_with(&transport, Duration::from_millis(30), 10);
        transport.emit(TransportEvent::Open { server: None });

        let err = conn.request("public/test", json!({})).await.unwrap_err();
        assert!(matches!(err, WsError::RequestTimeout { timeout_ms: 30, .. }));
        assert!(!conn.is_ready());
        assert!(!conn.has_pending());

        // late reply is logged but nothing waits for it
        let sent = OutboundEnvelope::from_json(&transport.sent()[0]).unwrap();
        let late = json!({"jsonrpc": "2.0", "id": sent.id, "result": "late"});
        transport.emit(TransportEvent::Message(late.to_string()));

        let messages = conn.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].direction, Direction::Received);
        assert!(!conn.is_ready());
        assert_eq!(conn.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_second_request_rejected_while_pending() {
        let transport = MockTransport::default();
        let conn = connected(&transport);

        let first = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.request("public/get_time", json!({})).await })
        };
        let sent = next_sent(&transport, 1).await;

        let err = conn.request("public/test", json!({})).await.unwrap_err();
        assert!(matches!(err, WsError::RequestInFlight { ref method, .. } if method == "public/get_time"));

        transport.emit(TransportEvent::Message(
            json!({"jsonrpc": "2.0", "id": sent.id, "result": 1}).to_string(),
        ));
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_close_fails_pending_request() {
        let transport = MockTransport::default();
        let conn = connected(&transport);

        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.request("public/test", json!({})).await })
        };
        next_sent(&transport, 1).await;
        transport.emit(TransportEvent::Closed {
            code: 1001,
            reason: "going away".to_string(),
        });

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, WsError::ConnectionLost(_)));
    }

    #[test]
    fn test_malformed_frame_is_not_logged() {
        let transport = MockTransport::default();
        let conn = connected(&transport);
        transport.emit(TransportEvent::Message("not json".to_string()));
        assert!(conn.messages().is_empty());
    }

    #[test]
    fn test_notifications_logged_only_outside_streaming() {
        let transport = MockTransport::default();
        let monitor = Arc::new(PerformanceMonitor::new());
        let session = Arc::new(Session::new(monitor.clone()));
        let conn = Connection::open(
            3,
            "wss://example.invalid/ws",
            Box::new(transport.clone()),
            session.clone(),
            monitor,
            Duration::from_secs(1),
            10,
        );
        transport.emit(TransportEvent::Open { server: None });

        let notification = json!({
            "method": "subscription",
            "params": {
                "channel": "deribit_price_index.btc_usd",
                "data": {"price": 1.0, "timestamp": 1, "index_name": "btc_usd"}
            }
        })
        .to_string();

        transport.emit(TransportEvent::Message(notification.clone()));
        assert_eq!(conn.messages().len(), 1);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _guard = session.enter_streaming(tx).unwrap();
        transport.emit(TransportEvent::Message(notification));
        assert_eq!(conn.messages().len(), 1);
        assert_eq!(rx.try_recv().unwrap().instrument, "btc_usd");
    }

    #[test]
    fn test_log_is_bounded() {
        let transport = MockTransport::default();
        let conn = open_with(&transport, Duration::from_secs(1), 3);
        transport.emit(TransportEvent::Open { server: None });
        for i in 0..5 {
            conn.send(&format!("{{\"n\":{i}}}")).unwrap();
        }

        let messages = conn.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].payload, r#"{"n":2}"#);
        let snapshot = conn.snapshot();
        assert_eq!(snapshot.messages_total, 5);
        assert_eq!(snapshot.messages_retained, 3);
    }

    #[test]
    fn test_close_validation() {
        let transport = MockTransport::default();
        let conn = connected(&transport);
        assert!(matches!(conn.close(1005, ""), Err(WsError::InvalidRequest(_))));
        conn.close(1000, "done").unwrap();
        assert_eq!(transport.state.lock().closes, vec![(1000, "done".to_string())]);

        transport.emit(TransportEvent::Closed {
            code: 1000,
            reason: "done".to_string(),
        });
        assert!(matches!(conn.close(1000, ""), Err(WsError::NotConnected { .. })));
    }
}
