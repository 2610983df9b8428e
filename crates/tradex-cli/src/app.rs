//! Interactive session.
//!
//! Reads commands line by line, drives the connection registry and the
//! request builders, and prints rendered results to stdout. Logs go to
//! stderr.

use crate::commands::{DeribitAction, DeribitCommand, OrderArgs, ReplCommand};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::render;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tradex_api::{
    CancelScope, EditRequest, OpenOrdersQuery, OrderRequest, PositionsQuery, Quantity,
    RequestBuilder, RpcRequest, Side, SubscriptionSet, TokenHolder,
};
use tradex_telemetry::{Metrics, PerformanceMonitor};
use tradex_ws::{ConnectionRegistry, ConnectionStatus, ReplyOutcome, StreamEnd};

const PROMPT: &str = "tradex> ";

/// Time given to close frames to leave before the runtime stops.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

const CLIENT_ID_ENV: &str = "DERIBIT_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "DERIBIT_CLIENT_SECRET";

/// What the REPL does after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Output(String),
    Stream { id: u64 },
    Quit,
}

pub struct App {
    config: AppConfig,
    registry: ConnectionRegistry,
    builder: RequestBuilder,
    subscriptions: SubscriptionSet,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let monitor = Arc::new(PerformanceMonitor::new());
        let registry = ConnectionRegistry::new(config.registry_config(), monitor.clone());
        let builder = RequestBuilder::new(Arc::new(TokenHolder::new()), monitor);
        Self {
            config,
            registry,
            builder,
            subscriptions: SubscriptionSet::new(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn tokens(&self) -> &Arc<TokenHolder> {
        self.builder.tokens()
    }

    /// Run the REPL on stdin until `quit` or end of input.
    pub async fn run(&mut self) -> AppResult<()> {
        println!("{}", render::help());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("{PROMPT}");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match self.handle_line(line).await {
                Ok(Step::Output(text)) => print!("{text}"),
                Ok(Step::Stream { id }) => match self.stream(id, &mut lines).await {
                    Ok(text) => print!("{text}"),
                    Err(e) => println!("> Error: {e}"),
                },
                Ok(Step::Quit) => break,
                Err(e) => println!("> Error: {e}"),
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Close every open connection and give the close frames time to leave.
    pub async fn shutdown(&self) {
        let open = self
            .registry
            .list()
            .iter()
            .any(|s| s.status == ConnectionStatus::Connected);
        self.registry.shutdown();
        if open {
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        }
        info!("Session ended");
    }

    /// Execute one command line.
    pub async fn handle_line(&mut self, line: &str) -> AppResult<Step> {
        let command = match ReplCommand::parse_line(line) {
            Ok(command) => command,
            Err(e) => {
                return Ok(Step::Output(format!(
                    "> Unrecognized command. Enter 'help' for the command list.\n{e}"
                )))
            }
        };

        let output = match command {
            ReplCommand::Help => render::help(),
            ReplCommand::Quit => return Ok(Step::Quit),
            ReplCommand::Connect { uri } => self.connect(&uri),
            ReplCommand::Show { id } => match self.registry.status(id) {
                Some(snapshot) => render::connection_details(&snapshot),
                None => format!("> Unknown connection id {id}\n"),
            },
            ReplCommand::List => render::connection_list(&self.registry.list()),
            ReplCommand::ShowMessages { id } => match self.registry.get(id) {
                Some(conn) => render::message_log(id, &conn.messages()),
                None => format!("> Unknown connection id {id}\n"),
            },
            ReplCommand::Send { id, payload } => {
                self.registry.send(id, &payload.join(" "))?;
                format!("> Sent to connection {id}; use 'show_messages {id}' for replies\n")
            }
            ReplCommand::Close { id, code, reason } => {
                let code = code.unwrap_or(self.config.close_code);
                self.registry.close(id, code, &reason.join(" "))?;
                format!("> Closing connection {id} with code {code}\n")
            }
            ReplCommand::ShowLatencyReport => self.registry.latency_report(),
            ReplCommand::ResetReport => {
                self.registry.reset_latency_metrics();
                "> Latency measurements cleared\n".to_string()
            }
            ReplCommand::ShowMetrics => Metrics::gather_text(),
            ReplCommand::ViewSubscriptions => render::subscriptions(&self.subscriptions),
            ReplCommand::ViewStream { id } => return self.prepare_stream(id),
            ReplCommand::Deribit { args } => match DeribitCommand::parse(&args)? {
                DeribitCommand::Connect => {
                    let uri = self.config.default_uri.clone();
                    self.connect(&uri)
                }
                DeribitCommand::Action { id, action } => self.deribit(id, action).await?,
            },
        };
        Ok(Step::Output(output))
    }

    fn connect(&self, uri: &str) -> String {
        let id = self.registry.connect(uri);
        let status = self
            .registry
            .status(id)
            .map(|s| s.status.to_string())
            .unwrap_or_default();
        format!(
            "> Created connection to {uri}\n> Connection ID: {id}\n> Status: {status}\n\
             > Use 'show {id}' to check the status\n"
        )
    }

    fn prepare_stream(&self, id: Option<u64>) -> AppResult<Step> {
        if self.subscriptions.is_empty() {
            return Ok(Step::Output(
                "> No subscriptions. Use 'deribit <id> subscribe <index>' first.\n".to_string(),
            ));
        }
        let id = match id {
            Some(id) => id,
            None => self
                .registry
                .list()
                .into_iter()
                .find(|s| s.status == ConnectionStatus::Connected)
                .map(|s| s.id)
                .ok_or_else(|| AppError::Usage("No open connection to stream on".to_string()))?,
        };
        Ok(Step::Stream { id })
    }

    /// Stream ticker snapshots until `q` + Enter, Ctrl-C, or the connection
    /// ends.
    pub async fn stream<R>(&self, id: u64, input: &mut Lines<R>) -> AppResult<String>
    where
        R: AsyncBufRead + Unpin,
    {
        println!(
            "> Streaming {} channel(s) on connection {id}. Press q + Enter to stop.",
            self.subscriptions.len()
        );
        let cancel = CancellationToken::new();
        let stream = self.registry.stream(
            id,
            self.subscriptions.channels().to_vec(),
            cancel.clone(),
            |snapshot| print!("{}", render::ticker(&snapshot)),
        );
        tokio::pin!(stream);

        let mut input_open = true;
        let summary = loop {
            tokio::select! {
                summary = &mut stream => break summary?,
                line = input.next_line(), if input_open => match line {
                    Ok(Some(line)) if line.trim().eq_ignore_ascii_case("q") => cancel.cancel(),
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => {
                        input_open = false;
                        cancel.cancel();
                    }
                },
                _ = tokio::signal::ctrl_c() => cancel.cancel(),
            }
        };

        Ok(match summary.reason {
            StreamEnd::Cancelled => {
                format!("> Streaming stopped after {} update(s)\n", summary.updates)
            }
            StreamEnd::ConnectionEnded => format!(
                "> Connection {id} ended the stream after {} update(s)\n",
                summary.updates
            ),
        })
    }

    async fn deribit(&mut self, id: u64, action: DeribitAction) -> AppResult<String> {
        let request = match action {
            DeribitAction::Authorize {
                client_id,
                client_secret,
            } => {
                let client_id = credential(client_id, CLIENT_ID_ENV, "client_id")?;
                let secret = credential(client_secret, CLIENT_SECRET_ENV, "client_secret")?;
                self.builder.auth(&client_id, &secret)?
            }
            DeribitAction::Buy(order) => self.builder.order(Side::Buy, &order_request(order))?,
            DeribitAction::Sell(order) => self.builder.order(Side::Sell, &order_request(order))?,
            DeribitAction::Modify {
                order_id,
                amount,
                price,
            } => self.builder.edit(&EditRequest {
                order_id,
                amount,
                price,
            })?,
            DeribitAction::Cancel { order_id } => self.builder.cancel(&order_id)?,
            DeribitAction::CancelAll { args } => {
                let scope = CancelScope::from_args(
                    args.first().map(String::as_str),
                    args.get(1).map(String::as_str),
                )?;
                self.builder.cancel_all(&scope)?
            }
            DeribitAction::GetOpenOrders { first, second } => {
                let query = OpenOrdersQuery::from_args(first.as_deref(), second.as_deref());
                self.builder.open_orders(&query)?
            }
            DeribitAction::Positions { currency, kind } => {
                let query = PositionsQuery::new(currency.as_deref(), kind.as_deref())?;
                self.builder.positions(&query)?
            }
            DeribitAction::Orderbook { instrument, depth } => {
                let depth = match depth {
                    Some(d) => d.parse::<i64>().ok(),
                    None => Some(i64::from(self.config.orderbook_default_depth)),
                };
                self.builder.orderbook(&instrument, depth)?
            }
            DeribitAction::Subscribe { index } => {
                return Ok(if self.subscriptions.register(&index) {
                    format!("> Registered {}\n", tradex_api::price_index_channel(&index))
                } else {
                    format!("> Already registered: {index}\n")
                });
            }
            DeribitAction::Unsubscribe { index } => {
                return Ok(if self.subscriptions.remove(&index) {
                    format!("> Removed {index}\n")
                } else {
                    format!("> Not subscribed to {index}\n")
                });
            }
            DeribitAction::UnsubscribeAll => return self.unsubscribe_all(id).await,
        };
        self.execute(id, request).await
    }

    async fn execute(&self, id: u64, request: RpcRequest) -> AppResult<String> {
        let is_auth = request.method == tradex_api::requests::METHOD_AUTH;
        let reply = self
            .registry
            .request(id, &request.method, request.params)
            .await?;

        if is_auth {
            if let ReplyOutcome::Result(result) = &reply.outcome {
                if self.tokens().store_from_auth_result(result) {
                    info!(conn_id = id, "Session authenticated");
                    return Ok(format!(
                        "> Authenticated (scope: {}, expires in {} s)\n",
                        result.get("scope").and_then(|v| v.as_str()).unwrap_or("-"),
                        result
                            .get("expires_in")
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "-".to_string())
                    ));
                }
                warn!(conn_id = id, "Auth reply carried no access token");
            }
        }
        Ok(render::reply(&reply))
    }

    async fn unsubscribe_all(&mut self, id: u64) -> AppResult<String> {
        let cleared = self.subscriptions.clear();
        let mut out = if cleared == 0 {
            "> No active subscriptions to remove\n".to_string()
        } else {
            format!("> Removed {cleared} subscription(s)\n")
        };
        if self.registry.status(id).map(|s| s.status) == Some(ConnectionStatus::Connected) {
            let request = self.builder.unsubscribe_all();
            match self.registry.request(id, &request.method, request.params).await {
                Ok(reply) if reply.is_error() => out.push_str(&render::reply(&reply)),
                Ok(_) => out.push_str("> Server-side subscriptions cleared\n"),
                Err(e) => warn!(conn_id = id, error = %e, "Unsubscribe request failed"),
            }
        }
        Ok(out)
    }
}

fn credential(arg: Option<String>, env: &str, field: &'static str) -> AppResult<String> {
    arg.or_else(|| std::env::var(env).ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Usage(format!("Missing {field}: pass it or set {env}")))
}

fn order_request(args: OrderArgs) -> OrderRequest {
    let quantity = match (args.contracts, args.amount) {
        (Some(n), _) => Quantity::Contracts(n),
        (None, Some(x)) => Quantity::Amount(x),
        (None, None) => Quantity::Contracts(0),
    };
    OrderRequest {
        instrument: args.instrument,
        quantity,
        order_type: args.order_type,
        time_in_force: args.time_in_force,
        price: args.price,
        label: args.label,
    }
}
