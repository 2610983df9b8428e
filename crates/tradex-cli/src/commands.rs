//! REPL command grammar.
//!
//! Each input line is split on whitespace and parsed with clap. `deribit`
//! lines are parsed in two steps: `deribit connect`, or a connection id
//! followed by a [`DeribitAction`].

use crate::error::{AppError, AppResult};
use clap::{Args, Parser, Subcommand};
use tradex_api::{OrderType, TimeInForce};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_subcommand = true)]
struct ReplLine {
    #[command(subcommand)]
    command: ReplCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// Show the command reference
    #[command(alias = "main")]
    Help,
    /// Leave the client
    #[command(alias = "exit")]
    Quit,
    /// Open a WebSocket connection
    Connect { uri: String },
    /// Show connection details
    Show { id: u64 },
    /// List every known connection
    List,
    /// Print a connection's message log
    #[command(name = "show_messages")]
    ShowMessages { id: u64 },
    /// Send a raw payload
    Send {
        id: u64,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        payload: Vec<String>,
    },
    /// Close a connection
    Close {
        id: u64,
        code: Option<u16>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        reason: Vec<String>,
    },
    #[command(name = "show_latency_report")]
    ShowLatencyReport,
    #[command(name = "reset_report")]
    ResetReport,
    /// Print Prometheus metrics
    #[command(name = "show_metrics")]
    ShowMetrics,
    #[command(name = "view_subscriptions")]
    ViewSubscriptions,
    /// Stream ticker updates for the registered channels
    #[command(name = "view_stream")]
    ViewStream { id: Option<u64> },
    /// Deribit API commands
    #[command(alias = "Deribit")]
    Deribit {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl ReplCommand {
    pub fn parse_line(line: &str) -> Result<Self, clap::Error> {
        ReplLine::try_parse_from(line.split_whitespace()).map(|l| l.command)
    }
}

/// A parsed `deribit ...` line.
#[derive(Debug, Clone, PartialEq)]
pub enum DeribitCommand {
    Connect,
    Action { id: u64, action: DeribitAction },
}

impl DeribitCommand {
    pub fn parse(args: &[String]) -> AppResult<Self> {
        match args {
            [] => Err(AppError::Usage("Usage: deribit <id> <action> ...".to_string())),
            [only] if only == "connect" => Ok(Self::Connect),
            [id, rest @ ..] => {
                let id = id
                    .parse::<u64>()
                    .map_err(|_| AppError::Usage(format!("Invalid connection id: {id}")))?;
                let action = DeribitLine::try_parse_from(rest)
                    .map_err(|e| AppError::Usage(e.to_string()))?
                    .action;
                Ok(Self::Action { id, action })
            }
        }
    }
}

#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_subcommand = true)]
struct DeribitLine {
    #[command(subcommand)]
    action: DeribitAction,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum DeribitAction {
    /// Authenticate with client credentials
    Authorize {
        client_id: Option<String>,
        client_secret: Option<String>,
    },
    /// Place a buy order
    Buy(OrderArgs),
    /// Place a sell order
    Sell(OrderArgs),
    /// Change the amount or price of an order
    Modify {
        order_id: String,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        price: Option<f64>,
    },
    /// Cancel one order
    Cancel { order_id: String },
    /// Cancel all, by instrument, by currency, or by label with `-s <label>`
    #[command(name = "cancel_all")]
    CancelAll {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// List open orders: [instrument | currency [label]]
    #[command(name = "get_open_orders")]
    GetOpenOrders {
        first: Option<String>,
        second: Option<String>,
    },
    /// List positions: [currency] [kind]
    Positions {
        currency: Option<String>,
        kind: Option<String>,
    },
    /// Show the order book for an instrument
    Orderbook {
        instrument: String,
        #[arg(allow_hyphen_values = true)]
        depth: Option<String>,
    },
    /// Register a price index for streaming
    Subscribe { index: String },
    /// Remove a registered price index
    Unsubscribe { index: String },
    /// Remove every registered price index
    #[command(name = "unsubscribe_all")]
    UnsubscribeAll,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct OrderArgs {
    pub instrument: String,
    /// Size in contracts
    #[arg(long, conflicts_with = "amount", required_unless_present = "amount")]
    pub contracts: Option<u64>,
    /// Size in currency
    #[arg(long)]
    pub amount: Option<f64>,
    #[arg(long = "type", default_value = "market")]
    pub order_type: OrderType,
    #[arg(long = "tif", default_value = "good_til_cancelled")]
    pub time_in_force: TimeInForce,
    #[arg(long)]
    pub price: Option<f64>,
    #[arg(long, default_value = "")]
    pub label: String,
}
