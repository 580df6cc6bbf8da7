//! IPC command handlers invoked by the webview via `invoke()`.
//!
//! Every handler takes a loosely-typed `arg0` payload and parses it into a
//! typed DTO (camelCase with snake_case aliases). The parsers are plain
//! functions so they are tested without a running app.

pub mod analytics;
pub mod ledger;
pub mod menu;
pub mod orders;
pub mod sync;

use serde_json::Value;

/// Treat a missing payload as an empty object.
pub(crate) fn object_payload(arg0: Option<Value>) -> Value {
    match arg0 {
        Some(Value::Null) | None => serde_json::json!({}),
        Some(v) => v,
    }
}

/// Accept either a bare id string or an object carrying it under one of
/// `keys`.
pub(crate) fn parse_id_payload(
    arg0: Option<Value>,
    keys: &[&str],
    what: &str,
) -> Result<String, String> {
    let id = match &arg0 {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(obj @ Value::Object(_)) => crate::value_str(obj, keys),
        _ => None,
    };
    id.filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing {what}"))
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn parse_id_payload_supports_string_and_object() {
        let keys = ["orderId", "order_id", "id"];
        assert_eq!(
            parse_id_payload(Some(serde_json::json!(" o-1 ")), &keys, "order id").unwrap(),
            "o-1"
        );
        assert_eq!(
            parse_id_payload(Some(serde_json::json!({ "order_id": "o-2" })), &keys, "order id")
                .unwrap(),
            "o-2"
        );
        let err = parse_id_payload(Some(serde_json::json!({})), &keys, "order id").unwrap_err();
        assert_eq!(err, "Missing order id");
        assert!(parse_id_payload(None, &keys, "order id").is_err());
    }

    #[test]
    fn object_payload_defaults_to_empty_object() {
        assert_eq!(object_payload(None), serde_json::json!({}));
        assert_eq!(object_payload(Some(Value::Null)), serde_json::json!({}));
    }
}
