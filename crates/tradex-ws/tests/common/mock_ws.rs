//! Mock JSON-RPC WebSocket server for integration tests.
//!
//! Behaviour per request method:
//! - `public/silent`: never replied to
//! - `public/fail`: error reply with code 10001
//! - `private/subscribe`: result reply, then `price_updates` notifications
//!   carrying only `params.data`
//! - anything else: `{"echo": <method>}` result reply

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// A mock JSON-RPC server.
pub struct MockRpcServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockRpcServer {
    /// Start on an ephemeral port, sending `price_updates` prices after
    /// each subscribe.
    pub async fn start(price_updates: Vec<f64>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let prices = Arc::new(price_updates);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            messages_clone.clone(),
                            connections_clone.clone(),
                            prices.clone(),
                        ));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            messages,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// Methods of every request received, in order.
    pub async fn received_methods(&self) -> Vec<String> {
        self.messages
            .lock()
            .await
            .iter()
            .filter_map(|text| serde_json::from_str::<Value>(text).ok())
            .filter_map(|v| v.get("method").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
    prices: Arc<Vec<f64>>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    *connections.lock().await += 1;

    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                messages.lock().await.push(text.clone());

                let Ok(request) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                let id = request.get("id").cloned().unwrap_or(Value::Null);
                let method = request
                    .get("method")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                let replies = match method.as_str() {
                    "public/silent" => Vec::new(),
                    "public/fail" => vec![json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": 10001, "message": "mock failure"}
                    })],
                    "private/subscribe" => {
                        let channels = request["params"]["channels"].clone();
                        let mut out = vec![json!({"jsonrpc": "2.0", "id": id, "result": channels})];
                        for (i, price) in prices.iter().enumerate() {
                            out.push(json!({
                                "jsonrpc": "2.0",
                                "method": "subscription",
                                "params": {
                                    "data": {
                                        "price": price,
                                        "timestamp": 1_700_000_000_000_i64 + i as i64,
                                        "index_name": "btc_usd"
                                    }
                                }
                            }));
                        }
                        out
                    }
                    other => vec![json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {"echo": other}
                    })],
                };

                for reply in replies {
                    if write.send(Message::Text(reply.to_string())).await.is_err() {
                        return;
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }
}
