//! Transport abstraction and the tungstenite implementation.
//!
//! A [`Transport`] opens one full-duplex socket and reports everything that
//! happens on it to an [`EventSink`] from its own delivery task. The
//! connection layer never touches the socket directly.

use crate::error::{WsError, WsResult};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tradex_telemetry::Metrics;

/// Close code reported when the peer vanished without a close frame.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Something that happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed. Carries the `Server` response header if present.
    Open { server: Option<String> },
    /// Inbound text frame.
    Message(String),
    /// Socket closed, by either side.
    Closed { code: u16, reason: String },
    /// Handshake or I/O failure.
    Error(String),
}

/// Receiver of transport events.
///
/// Called from the transport's delivery task; implementations must not
/// block for long.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: TransportEvent);
}

/// Asynchronous full-duplex socket.
pub trait Transport: Send + Sync {
    /// Begin connecting. Returns before the handshake completes.
    fn start(&self, sink: Arc<dyn EventSink>);

    /// Queue an outbound text frame.
    fn send(&self, text: String) -> WsResult<()>;

    /// Queue a close frame with the given code and reason.
    fn close(&self, code: u16, reason: &str) -> WsResult<()>;

    /// Stop the delivery task without waiting for the peer.
    fn shutdown(&self);
}

/// Builds a transport for a URI.
pub trait TransportFactory: Send + Sync {
    fn create(&self, uri: &str) -> Box<dyn Transport>;
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Transport backed by `tokio-tungstenite`.
pub struct TungsteniteTransport {
    uri: String,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    shutdown_token: CancellationToken,
}

impl TungsteniteTransport {
    pub fn new(uri: impl Into<String>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            uri: uri.into(),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown_token: CancellationToken::new(),
        }
    }
}

impl Transport for TungsteniteTransport {
    fn start(&self, sink: Arc<dyn EventSink>) {
        let Some(outbound_rx) = self.outbound_rx.lock().take() else {
            warn!(uri = %self.uri, "Transport already started");
            return;
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                sink.on_event(TransportEvent::Error(format!("no async runtime: {e}")));
                return;
            }
        };

        let uri = self.uri.clone();
        let token = self.shutdown_token.clone();
        handle.spawn(async move {
            run_socket(uri, sink, outbound_rx, token).await;
        });
    }

    fn send(&self, text: String) -> WsResult<()> {
        self.outbound_tx
            .send(Outbound::Text(text))
            .map_err(|_| WsError::SendFailed("transport task has stopped".to_string()))
    }

    fn close(&self, code: u16, reason: &str) -> WsResult<()> {
        self.outbound_tx
            .send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .map_err(|_| WsError::SendFailed("transport task has stopped".to_string()))
    }

    fn shutdown(&self) {
        self.shutdown_token.cancel();
    }
}

impl Drop for TungsteniteTransport {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

/// Factory producing [`TungsteniteTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteFactory;

impl TransportFactory for TungsteniteFactory {
    fn create(&self, uri: &str) -> Box<dyn Transport> {
        Box::new(TungsteniteTransport::new(uri))
    }
}

async fn run_socket(
    uri: String,
    sink: Arc<dyn EventSink>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    token: CancellationToken,
) {
    info!(uri = %uri, "Connecting to WebSocket");

    // TCP_NODELAY on
    let connect = connect_async_tls_with_config(uri.as_str(), None, true, None);
    let (ws_stream, response) = tokio::select! {
        () = token.cancelled() => {
            debug!(uri = %uri, "Shutdown before handshake completed");
            sink.on_event(TransportEvent::Closed {
                code: u16::from(CloseCode::Away),
                reason: "shutdown before open".to_string(),
            });
            return;
        }
        result = connect => match result {
            Ok(pair) => pair,
            Err(e) => {
                error!(uri = %uri, error = %e, "WebSocket handshake failed");
                sink.on_event(TransportEvent::Error(e.to_string()));
                return;
            }
        }
    };

    let server = response
        .headers()
        .get("server")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    sink.on_event(TransportEvent::Open { server });

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            () = token.cancelled() => {
                debug!(uri = %uri, "Transport shutdown");
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(error = %e, "Failed to send Close frame during shutdown");
                }
                return;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        sink.on_event(TransportEvent::Message(text));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            sink.on_event(TransportEvent::Error(e.to_string()));
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((u16::from(CloseCode::Normal), String::new()));
                        info!(uri = %uri, code, %reason, "WebSocket closed");
                        // flush the queued close reply
                        let _ = write.close().await;
                        sink.on_event(TransportEvent::Closed { code, reason });
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(uri = %uri, error = %e, "WebSocket read error");
                        sink.on_event(TransportEvent::Error(e.to_string()));
                        return;
                    }
                    None => {
                        warn!(uri = %uri, "WebSocket stream ended");
                        sink.on_event(TransportEvent::Closed {
                            code: ABNORMAL_CLOSE_CODE,
                            reason: "stream ended".to_string(),
                        });
                        return;
                    }
                }
            }

            outbound = outbound_rx.recv() => {
                let Some(outbound) = outbound else {
                    // sender side dropped with the transport
                    return;
                };
                let (frame, is_text) = match outbound {
                    Outbound::Text(text) => (Message::Text(text), true),
                    Outbound::Close { code, reason } => {
                        debug!(uri = %uri, code, %reason, "Sending Close frame");
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: Cow::Owned(reason),
                        };
                        (Message::Close(Some(frame)), false)
                    }
                };
                if let Err(e) = write.send(frame).await {
                    error!(uri = %uri, error = %e, "WebSocket write error");
                    sink.on_event(TransportEvent::Error(e.to_string()));
                    return;
                }
                if is_text {
                    Metrics::frame_sent();
                }
            }
        }
    }
}
