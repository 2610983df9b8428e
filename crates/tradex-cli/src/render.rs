//! Text rendering for REPL output.
//!
//! Every renderer returns a `String`; the REPL decides where it goes.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt::Write;
use tradex_api::{format_summary, redact_secrets, summarize, SubscriptionSet};
use tradex_feed::TickerSnapshot;
use tradex_ws::{ConnectionSnapshot, LogEntry, Reply, ReplyKind, ReplyOutcome, RpcError};

const RULE_WIDTH: usize = 80;

fn rule(ch: char) -> String {
    std::iter::repeat(ch).take(RULE_WIDTH).collect()
}

fn title(text: &str) -> String {
    format!("\n{}\n{text:^RULE_WIDTH$}\n{}\n", rule('='), rule('='))
}

/// Cell text for a JSON number or string.
fn cell(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "N/A".to_string(),
    }
}

fn format_time(time: Option<DateTime<Utc>>, ms: i64) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn format_millis(ms: i64) -> String {
    format_time(DateTime::<Utc>::from_timestamp_millis(ms), ms)
}

pub fn help() -> String {
    let general = [
        ("help", "Show this reference"),
        ("quit | exit", "Leave the client"),
        ("connect <uri>", "Open a WebSocket connection"),
        ("close <id> [code] [reason]", "Close a connection"),
        ("show <id>", "Show connection details"),
        ("list", "List connections"),
        ("show_messages <id>", "Print the message log with summaries"),
        ("send <id> <payload>", "Send a raw payload"),
        ("view_subscriptions", "List registered price indices"),
        ("view_stream [id]", "Stream ticker updates (q + Enter or Ctrl-C to stop)"),
        ("show_latency_report", "Print the latency report"),
        ("reset_report", "Clear latency measurements"),
        ("show_metrics", "Print Prometheus metrics"),
    ];
    let deribit = [
        ("deribit connect", "Connect to the Deribit testnet"),
        ("deribit <id> authorize [client_id] [secret]", "Authenticate with client credentials"),
        (
            "deribit <id> buy|sell <instrument> --contracts N | --amount X",
            "[--type T] [--tif F] [--price P] [--label L]",
        ),
        ("deribit <id> modify <order_id> [--amount X] [--price P]", "Edit an order"),
        ("deribit <id> cancel <order_id>", "Cancel one order"),
        ("deribit <id> cancel_all [instrument | currency | -s label]", "Cancel many orders"),
        ("deribit <id> get_open_orders [instrument | currency [label]]", "List open orders"),
        ("deribit <id> positions [currency] [kind]", "List positions"),
        ("deribit <id> orderbook <instrument> [depth]", "Show the order book"),
        ("deribit <id> subscribe|unsubscribe <index>", "Edit the streaming set"),
        ("deribit <id> unsubscribe_all", "Clear the streaming set"),
    ];

    let mut out = title("COMMAND REFERENCE");
    out.push_str("GENERAL\n");
    for (cmd, text) in general {
        let _ = writeln!(out, "  {cmd:<30} : {text}");
    }
    out.push_str("\nDERIBIT\n");
    for (cmd, text) in deribit {
        let _ = writeln!(out, "  {cmd:<62} : {text}");
    }
    out
}

pub fn connection_details(snapshot: &ConnectionSnapshot) -> String {
    let mut out = String::from("\n=== Connection Details ===\n");
    let _ = writeln!(out, "Connection ID: {}", snapshot.id);
    let _ = writeln!(out, "Status: {}", snapshot.status);
    let _ = writeln!(out, "URI: {}", snapshot.uri);
    let _ = writeln!(
        out,
        "Server: {}",
        snapshot.server_info.as_deref().unwrap_or("None Specified")
    );
    let _ = writeln!(
        out,
        "Messages: {} ({} retained)",
        snapshot.messages_total, snapshot.messages_retained
    );
    if let Some(method) = &snapshot.awaiting {
        match snapshot.awaiting_for {
            Some(age) => {
                let _ = writeln!(out, "Awaiting reply: {method} ({} ms)", age.as_millis());
            }
            None => {
                let _ = writeln!(out, "Awaiting reply: {method}");
            }
        }
    }
    if let Some(code) = snapshot.close_code {
        let _ = writeln!(
            out,
            "Closed: {code} {}",
            snapshot.close_reason.as_deref().unwrap_or("")
        );
    }
    if let Some(err) = &snapshot.error_message {
        let _ = writeln!(out, "Error: {err}");
    }
    out
}

pub fn connection_list(snapshots: &[ConnectionSnapshot]) -> String {
    if snapshots.is_empty() {
        return "> No connections\n".to_string();
    }
    let mut out = format!("{:<6} {:<12} {}\n", "ID", "STATUS", "URI");
    for s in snapshots {
        let _ = writeln!(out, "{:<6} {:<12} {}", s.id, s.status, s.uri);
    }
    out
}

/// Log entries with credentials masked, each followed by its summary.
pub fn message_log(id: u64, entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return format!("> No messages for connection {id}\n");
    }
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "[{}] {}: {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            entry.direction,
            redact_secrets(&entry.payload)
        );
        let summary = summarize(entry.direction, &entry.payload);
        if !summary.is_empty() {
            let _ = writeln!(out, "{}", format_summary(entry.direction, &summary));
        }
        out.push('\n');
    }
    out
}

pub fn rpc_error(err: &RpcError) -> String {
    let mut out = String::from("\n=== REQUEST FAILED ===\n");
    let _ = writeln!(out, "{:<10} : {}", "Code", err.code);
    let _ = writeln!(out, "{:<10} : {}", "Message", err.message);
    if let Some(data) = &err.data {
        let _ = writeln!(out, "{:<10} : {data}", "Data");
    }
    out
}

/// Render a reply with the renderer chosen when the request was sent.
pub fn reply(reply: &Reply) -> String {
    let result = match &reply.outcome {
        ReplyOutcome::Error(err) => return rpc_error(err),
        ReplyOutcome::Result(result) => result,
    };
    let mut out = match &reply.kind {
        ReplyKind::OrderBook { instrument, depth } => orderbook(instrument, *depth, result),
        ReplyKind::Positions => positions(result),
        ReplyKind::OpenOrders => open_orders(result),
        ReplyKind::Plain if reply.method.starts_with("private/buy")
            || reply.method.starts_with("private/sell") =>
        {
            order_confirmation(result)
        }
        ReplyKind::Plain => {
            serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string()) + "\n"
        }
    };
    let _ = writeln!(
        out,
        "> {} answered in {:.3} ms",
        reply.method,
        reply.round_trip.as_secs_f64() * 1000.0
    );
    out
}

pub fn orderbook(instrument: &str, depth: u32, result: &Value) -> String {
    let mut out = title(&format!("ORDERBOOK: {instrument}"));
    if let Some(ts) = result.get("timestamp").and_then(Value::as_i64) {
        let _ = writeln!(out, "Time: {}\n", format_millis(ts));
    }
    let (Some(bids), Some(asks)) = (
        result.get("bids").and_then(Value::as_array),
        result.get("asks").and_then(Value::as_array),
    ) else {
        out.push_str("Invalid orderbook format or empty orderbook\n");
        return out;
    };

    let depth = depth as usize;
    let _ = writeln!(
        out,
        "{:^18} | {:^18} | {:^18} | {:^18}",
        "BID AMOUNT", "BID PRICE", "ASK PRICE", "ASK AMOUNT"
    );
    out.push_str(&rule('-'));
    out.push('\n');
    let rows = bids.len().min(depth).max(asks.len().min(depth));
    for i in 0..rows {
        let side = |levels: &[Value]| {
            levels
                .get(i)
                .map(|l| (cell(l.get(0)), cell(l.get(1))))
                .unwrap_or_default()
        };
        let (bid_price, bid_amount) = side(bids.as_slice());
        let (ask_price, ask_amount) = side(asks.as_slice());
        let _ = writeln!(
            out,
            "{bid_amount:^18} | {bid_price:^18} | {ask_price:^18} | {ask_amount:^18}"
        );
    }
    out
}

pub fn positions(result: &Value) -> String {
    let mut out = title("POSITIONS SUMMARY");
    let Some(positions) = result.as_array() else {
        out.push_str("Invalid positions data\n");
        return out;
    };
    if positions.is_empty() {
        out.push_str("No open positions\n");
        return out;
    }
    let _ = writeln!(
        out,
        "{:<25} {:<10} {:<12} {:<15} {:<15} {:<15}",
        "INSTRUMENT", "DIRECTION", "SIZE", "ENTRY", "MARK", "PNL"
    );
    for pos in positions {
        let _ = writeln!(
            out,
            "{:<25} {:<10} {:<12} {:<15} {:<15} {:<15}",
            cell(pos.get("instrument_name")),
            cell(pos.get("direction")),
            cell(pos.get("size")),
            cell(pos.get("average_price")),
            cell(pos.get("mark_price")),
            cell(pos.get("floating_profit_loss")),
        );
    }
    out
}

pub fn open_orders(result: &Value) -> String {
    let mut out = title("OPEN ORDERS");
    let Some(orders) = result.as_array() else {
        out.push_str("Invalid orders data\n");
        return out;
    };
    if orders.is_empty() {
        out.push_str("No open orders\n");
        return out;
    }
    let _ = writeln!(
        out,
        "{:<12} {:<25} {:<10} {:<12} {:<12} {:<12} {:<15}",
        "ORDER ID", "INSTRUMENT", "DIRECTION", "AMOUNT", "FILLED", "PRICE", "ORDER TYPE"
    );
    for order in orders {
        let mut order_id = cell(order.get("order_id"));
        if order_id.chars().count() > 10 {
            order_id = order_id.chars().take(8).collect::<String>() + "..";
        }
        let _ = writeln!(
            out,
            "{:<12} {:<25} {:<10} {:<12} {:<12} {:<12} {:<15}",
            order_id,
            cell(order.get("instrument_name")),
            cell(order.get("direction")),
            cell(order.get("amount")),
            cell(order.get("filled_amount")),
            cell(order.get("price")),
            cell(order.get("order_type")),
        );
    }
    out
}

pub fn order_confirmation(result: &Value) -> String {
    let mut out = title("ORDER ACCEPTED");
    let order = result.get("order").unwrap_or(result);
    for (label, key) in [
        ("Order ID", "order_id"),
        ("Instrument", "instrument_name"),
        ("Direction", "direction"),
        ("Price", "price"),
        ("Amount", "amount"),
        ("Order Type", "order_type"),
        ("State", "order_state"),
    ] {
        let _ = writeln!(out, "{label:<15} : {}", cell(order.get(key)));
    }
    if let Some(trades) = result.get("trades").and_then(Value::as_array) {
        for (n, trade) in trades.iter().enumerate() {
            let _ = writeln!(
                out,
                "Trade #{} {} @ {} x {} (fee {} {})",
                n + 1,
                cell(trade.get("trade_id")),
                cell(trade.get("price")),
                cell(trade.get("amount")),
                cell(trade.get("fee")),
                cell(trade.get("fee_currency")),
            );
        }
    }
    out
}

fn signed(x: f64, decimals: usize) -> String {
    if x >= 0.0 {
        format!("+{x:.decimals$}")
    } else {
        format!("{x:.decimals$}")
    }
}

pub fn ticker(s: &TickerSnapshot) -> String {
    let mut out = format!("\n{}\n", rule('-'));
    let _ = writeln!(out, "{}  {}", s.instrument, format_time(s.time, s.timestamp_ms));
    let _ = writeln!(
        out,
        "Price: ${:.2}  {} ({}%)",
        s.price,
        signed(s.price_change, 2),
        signed(s.percent_change, 4)
    );
    let _ = writeln!(
        out,
        "Open: ${:.2}  High: ${:.2}  Low: ${:.2}  Updates: {}",
        s.open, s.high, s.low, s.update_count
    );
    let _ = writeln!(out, "Trend: {}", s.trend);
    if let (Some(level), Some(mean)) = (s.volatility, s.mean_abs_change) {
        let _ = writeln!(out, "Volatility: {level} (${mean:.6} avg change)");
    }
    let _ = writeln!(
        out,
        "Session: {} ({}%)  Range: ${:.2} - ${:.2} (${:.2})",
        signed(s.session_change, 2),
        signed(s.session_percent, 4),
        s.low,
        s.high,
        s.high - s.low
    );
    out
}

pub fn subscriptions(set: &SubscriptionSet) -> String {
    if set.is_empty() {
        return "\n=== No Active Subscriptions ===\n\
                Use 'deribit <id> subscribe <index>' to add a subscription.\n"
            .to_string();
    }
    let mut out = String::from("\n=== Active Market Subscriptions ===\n");
    for (n, index) in set.indices().iter().enumerate() {
        let _ = writeln!(out, "[{}] {index}", n + 1);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tradex_feed::Trend;
    use tradex_ws::ConnectionStatus;

    fn snapshot() -> ConnectionSnapshot {
        ConnectionSnapshot {
            id: 4,
            uri: "ws://localhost:9000".to_string(),
            status: ConnectionStatus::Error,
            server_info: None,
            error_message: Some("connection refused".to_string()),
            close_code: None,
            close_reason: None,
            messages_total: 0,
            messages_retained: 0,
            awaiting: None,
            awaiting_for: None,
        }
    }

    #[test]
    fn test_connection_details() {
        let text = connection_details(&snapshot());
        assert!(text.contains("Connection ID: 4"));
        assert!(text.contains("Server: None Specified"));
        assert!(text.contains("Error: connection refused"));
        assert!(!text.contains("Awaiting reply"));
    }

    #[test]
    fn test_connection_details_pending_request() {
        let pending = ConnectionSnapshot {
            status: ConnectionStatus::Connected,
            error_message: None,
            awaiting: Some("private/get_positions".to_string()),
            awaiting_for: Some(Duration::from_millis(1500)),
            ..snapshot()
        };
        let text = connection_details(&pending);
        assert!(text.contains("Awaiting reply: private/get_positions (1500 ms)"));
    }

    #[test]
    fn test_orderbook_respects_depth() {
        let result = json!({
            "timestamp": 1_700_000_000_000_i64,
            "bids": [[100.5, 10.0], [100.0, 5.0], [99.5, 1.0]],
            "asks": [[101.0, 2.0]]
        });
        let text = orderbook("BTC-PERPETUAL", 2, &result);
        assert!(text.contains("ORDERBOOK: BTC-PERPETUAL"));
        assert!(text.contains("100.5"));
        assert!(text.contains("101.0"));
        assert!(!text.contains("99.5"));
        assert!(text.contains("2023-11-14"));
    }

    #[test]
    fn test_orderbook_invalid() {
        let text = orderbook("ETH-PERPETUAL", 10, &json!({"bids": []}));
        assert!(text.contains("Invalid orderbook format"));
    }

    #[test]
    fn test_positions_and_open_orders() {
        assert!(positions(&json!([])).contains("No open positions"));
        let text = positions(&json!([{
            "instrument_name": "BTC-PERPETUAL", "direction": "buy", "size": 10,
            "average_price": 60000.0, "mark_price": 60100.0, "floating_profit_loss": 0.0016
        }]));
        assert!(text.contains("BTC-PERPETUAL"));
        assert!(text.contains("0.0016"));

        let text = open_orders(&json!([{
            "order_id": "ETH-123456789012", "instrument_name": "ETH-PERPETUAL",
            "direction": "sell", "amount": 1, "filled_amount": 0, "price": 2500,
            "order_type": "limit"
        }]));
        assert!(text.contains("ETH-1234.."));
        assert!(!text.contains("ETH-123456789012"));
    }

    #[test]
    fn test_error_reply() {
        let reply = Reply {
            request_id: 1,
            method: "private/buy".to_string(),
            kind: ReplyKind::Plain,
            outcome: ReplyOutcome::Error(RpcError {
                code: 13009,
                message: "unauthorized".to_string(),
                data: None,
            }),
            raw: String::new(),
            round_trip: Duration::from_millis(5),
        };
        let text = super::reply(&reply);
        assert!(text.contains("13009"));
        assert!(text.contains("unauthorized"));
    }

    #[test]
    fn test_ticker_snapshot() {
        let s = TickerSnapshot {
            instrument: "btc_usd".to_string(),
            price: 103.0,
            timestamp_ms: 1_700_000_000_000,
            time: DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000),
            price_change: 1.0,
            percent_change: 0.98,
            open: 100.0,
            high: 103.0,
            low: 99.0,
            update_count: 5,
            trend: Trend::Bullish,
            volatility: None,
            mean_abs_change: None,
            session_change: 3.0,
            session_percent: 3.0,
        };
        let text = ticker(&s);
        assert!(text.contains("Price: $103.00  +1.00"));
        assert!(text.contains("Trend: BULLISH"));
        assert!(text.contains("2023-11-14 22:13:20.000 UTC"));
        assert!(!text.contains("Volatility"));
    }

    #[test]
    fn test_subscriptions() {
        let mut set = SubscriptionSet::new();
        assert!(subscriptions(&set).contains("No Active Subscriptions"));
        set.register("btc_usd");
        assert!(subscriptions(&set).contains("[1] btc_usd"));
    }
}
