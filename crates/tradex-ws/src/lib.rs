//! JSON-RPC over WebSocket connections for tradex.
//!
//! Provides:
//! - A transport abstraction with a `tokio-tungstenite` implementation
//! - Connections with lifecycle tracking and a bounded message log
//! - Blocking request/reply correlation with a timeout
//! - A registry owning every connection and the streaming session

pub mod connection;
pub mod error;
pub mod message;
pub mod registry;
pub mod session;
pub mod transport;

pub use connection::{Connection, ConnectionSnapshot, ConnectionStatus, Direction, LogEntry};
pub use error::{WsError, WsResult};
pub use message::{
    classify, InboundFrame, OutboundEnvelope, Reply, ReplyKind, ReplyOutcome, RpcError,
    DEFAULT_ORDERBOOK_DEPTH,
};
pub use registry::{ConnectionRegistry, RegistryConfig, StreamEnd, StreamSummary};
pub use session::{Session, StreamingGuard};
pub use transport::{
    EventSink, Transport, TransportEvent, TransportFactory, TungsteniteFactory,
    TungsteniteTransport,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
