//! Short key/value summaries of logged frames.

use serde_json::Value;
use tradex_ws::Direction;

/// Params copied into a summary per method, as `(param, label)`.
/// Nothing in [`SECRET_PARAMS`] is listed.
const SUMMARY_FIELDS: &[(&str, &[(&str, &str)])] = &[
    (
        "public/auth",
        &[
            ("grant_type", "grant_type"),
            ("client_id", "client_id"),
            ("timestamp", "timestamp"),
            ("nonce", "nonce"),
            ("scope", "scope"),
        ],
    ),
    ("private/buy", ORDER_FIELDS),
    ("private/sell", ORDER_FIELDS),
    (
        "private/edit",
        &[("order_id", "order_id"), ("amount", "new_amount"), ("price", "new_price")],
    ),
    ("private/cancel", &[("order_id", "order_id")]),
    ("private/cancel_all", &[]),
    ("private/cancel_all_by_instrument", &[("instrument_name", "instrument")]),
    ("private/cancel_all_by_currency", &[("currency", "currency")]),
    ("private/cancel_by_label", &[("label", "label")]),
    ("private/get_open_orders", &[]),
    ("private/get_open_orders_by_instrument", &[("instrument_name", "instrument")]),
    ("private/get_open_orders_by_currency", &[("currency", "currency")]),
    (
        "private/get_open_orders_by_label",
        &[("currency", "currency"), ("label", "label")],
    ),
    ("private/get_positions", &[("currency", "currency"), ("kind", "kind")]),
    (
        "public/get_order_book",
        &[("instrument_name", "instrument_name"), ("depth", "depth")],
    ),
];

const ORDER_FIELDS: &[(&str, &str)] = &[
    ("instrument_name", "instrument_name"),
    ("amount", "amount"),
    ("contracts", "contracts"),
    ("type", "order_type"),
    ("label", "label"),
    ("time_in_force", "time_in_force"),
    ("price", "price"),
];

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Summarize one logged frame. Returns an empty list for unparseable text.
pub fn summarize(direction: Direction, payload: &str) -> Vec<(String, String)> {
    let Ok(mut frame) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };
    mask_secrets(frame.get_mut("result"));
    let mut out = Vec::new();

    let Some(method) = frame.get("method").and_then(Value::as_str) else {
        if let Some(result) = frame.get("result") {
            out.push(("result".to_string(), result.to_string()));
        } else if let Some(error) = frame.get("error") {
            out.push(("error message".to_string(), error.to_string()));
        } else if let Some(id) = frame.get("id") {
            out.push(("id".to_string(), render(id)));
        }
        return out;
    };

    match SUMMARY_FIELDS.iter().find(|(m, _)| *m == method) {
        Some((_, fields)) => {
            out.push(("method".to_string(), method.to_string()));
            let params = frame.get("params");
            for (param, label) in fields.iter() {
                if let Some(value) = params.and_then(|p| p.get(*param)) {
                    out.push((label.to_string(), render(value)));
                }
            }
        }
        None => {
            if let Some(id) = frame.get("id") {
                out.push(("id".to_string(), render(id)));
            }
            if direction == Direction::Sent {
                out.push(("method".to_string(), method.to_string()));
            }
        }
    }
    out
}

/// Keys never shown in summaries or redacted payloads.
pub const SECRET_PARAMS: &[&str] = &["client_secret", "access_token"];

fn mask_secrets(object: Option<&mut Value>) -> bool {
    let Some(object) = object.and_then(Value::as_object_mut) else {
        return false;
    };
    let mut masked = false;
    for key in SECRET_PARAMS {
        if let Some(value) = object.get_mut(*key) {
            *value = Value::String("***".to_string());
            masked = true;
        }
    }
    masked
}

/// Mask credentials in a logged payload, both in request params and in
/// reply results. Non-JSON text is returned unchanged.
pub fn redact_secrets(payload: &str) -> String {
    let Ok(mut frame) = serde_json::from_str::<Value>(payload) else {
        return payload.to_string();
    };
    let in_params = mask_secrets(frame.get_mut("params"));
    let in_result = mask_secrets(frame.get_mut("result"));
    if in_params || in_result {
        frame.to_string()
    } else {
        payload.to_string()
    }
}

/// Render a summary as indented `key: value` lines.
pub fn format_summary(direction: Direction, summary: &[(String, String)]) -> String {
    let mut text = format!("{direction} :");
    for (key, value) in summary {
        text.push_str(&format!("\n  {key}: {value}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(summary: &[(String, String)]) -> Vec<&str> {
        summary.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_auth_summary_omits_secret() {
        let frame = json!({
            "jsonrpc": "2.0", "id": 7, "method": "public/auth",
            "params": {
                "grant_type": "client_credentials", "client_id": "abc",
                "client_secret": "hunter2", "timestamp": 1_700_000_000_000_i64,
                "nonce": "n0nce", "scope": "session:name"
            }
        });
        let summary = summarize(Direction::Sent, &frame.to_string());
        assert_eq!(
            keys(&summary),
            ["method", "grant_type", "client_id", "timestamp", "nonce", "scope"]
        );
        assert!(summary.iter().all(|(_, v)| v != "hunter2"));
        assert_eq!(summary[3].1, "1700000000000");
    }

    #[test]
    fn test_order_summary_omits_token() {
        let frame = json!({
            "id": 1, "method": "private/buy",
            "params": {
                "access_token": "tok", "instrument_name": "BTC-PERPETUAL",
                "contracts": 5, "type": "limit", "label": "", "price": 60000.5,
                "time_in_force": "good_til_cancelled"
            }
        });
        let summary = summarize(Direction::Sent, &frame.to_string());
        assert!(summary.iter().all(|(k, v)| k != "access_token" && v != "tok"));
        assert!(summary.contains(&("order_type".to_string(), "limit".to_string())));
        assert!(summary.contains(&("price".to_string(), "60000.5".to_string())));
        assert!(!keys(&summary).contains(&"amount"));
    }

    #[test]
    fn test_edit_labels() {
        let frame = json!({
            "id": 1, "method": "private/edit",
            "params": {"access_token": "tok", "order_id": "ETH-9", "amount": 2.0}
        });
        let summary = summarize(Direction::Sent, &frame.to_string());
        assert_eq!(keys(&summary), ["method", "order_id", "new_amount"]);
    }

    #[test]
    fn test_received_result_and_error() {
        let ok = summarize(Direction::Received, r#"{"id":1,"result":{"x":1}}"#);
        assert_eq!(ok, vec![("result".to_string(), r#"{"x":1}"#.to_string())]);

        let err = summarize(
            Direction::Received,
            r#"{"id":1,"error":{"code":13009,"message":"unauthorized"}}"#,
        );
        assert_eq!(err[0].0, "error message");
        assert!(err[0].1.contains("13009"));
    }

    #[test]
    fn test_unknown_method() {
        let payload = r#"{"id":42,"method":"public/test","params":{}}"#;
        assert_eq!(
            summarize(Direction::Sent, payload),
            vec![
                ("id".to_string(), "42".to_string()),
                ("method".to_string(), "public/test".to_string())
            ]
        );
        assert_eq!(
            summarize(Direction::Received, payload),
            vec![("id".to_string(), "42".to_string())]
        );
    }

    #[test]
    fn test_garbage_is_empty() {
        assert!(summarize(Direction::Received, "not json").is_empty());
    }

    #[test]
    fn test_redact_secrets() {
        let payload = r#"{"id":1,"method":"public/auth","params":{"client_id":"abc","client_secret":"hunter2"}}"#;
        let redacted = redact_secrets(payload);
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.contains(r#""client_secret":"***""#));
        assert!(redacted.contains(r#""client_id":"abc""#));

        let reply = r#"{"id":1,"result":{"access_token":"tok","expires_in":900}}"#;
        assert!(!redact_secrets(reply).contains("tok\""));
        let summary = summarize(Direction::Received, reply);
        assert_eq!(summary[0].1, r#"{"access_token":"***","expires_in":900}"#);

        let plain = r#"{"id":1,"result":{}}"#;
        assert_eq!(redact_secrets(plain), plain);
        assert_eq!(redact_secrets("not json"), "not json");
    }

    #[test]
    fn test_format_summary() {
        let summary = vec![("method".to_string(), "private/cancel".to_string())];
        assert_eq!(
            format_summary(Direction::Sent, &summary),
            "SENT :\n  method: private/cancel"
        );
    }
}
