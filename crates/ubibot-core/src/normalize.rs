//! Flattens the vendor channel envelope into a [`NormalizedSnapshot`].
//!
//! Every field is decoded on its own. A malformed `last_values` or `status`
//! string, or a non-numeric reading, only affects the keys derived from it.

use chrono::DateTime;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::snapshot::{NormalizedSnapshot, SnapshotValue, UNKNOWN};

pub const MEASUREMENT_FIELDS: [&str; 7] = [
    "field1", "field2", "field3", "field4", "field5", "field6", "field7",
];

#[derive(Debug, Error, PartialEq)]
pub(crate) enum FieldDecodeError {
    #[error("{0} is not valid json: {1}")]
    NotJson(&'static str, String),
    #[error("{0} is not numeric")]
    NotNumeric(String),
    #[error("{0} is missing")]
    Missing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    /// Float, 0 when absent or malformed.
    Counter,
    /// Free text, "Unknown" when absent.
    Text,
    /// ISO-8601 with offset; unparseable input is kept as text.
    Timestamp,
    /// Byte counter reported in kilobytes.
    Kilobytes,
}

struct ChannelField {
    key: &'static str,
    /// Source keys in order of preference.
    sources: &'static [&'static str],
    rule: Rule,
}

const CHANNEL_FIELDS: &[ChannelField] = &[
    ChannelField { key: "traffic_out", sources: &["traffic_out"], rule: Rule::Counter },
    ChannelField { key: "traffic_in", sources: &["traffic_in"], rule: Rule::Counter },
    ChannelField { key: "mac_address", sources: &["mac_address"], rule: Rule::Text },
    ChannelField { key: "last_entry_date", sources: &["last_entry_date"], rule: Rule::Timestamp },
    ChannelField { key: "activated_at", sources: &["activated_at"], rule: Rule::Timestamp },
    ChannelField { key: "firmware", sources: &["firmware"], rule: Rule::Text },
    ChannelField { key: "device_id", sources: &["device_id"], rule: Rule::Text },
    ChannelField { key: "serial", sources: &["full_serial", "serial"], rule: Rule::Text },
    ChannelField { key: "last_ip", sources: &["last_ip"], rule: Rule::Text },
    ChannelField { key: "plan_code", sources: &["plan_code"], rule: Rule::Text },
    ChannelField { key: "usage", sources: &["usage"], rule: Rule::Kilobytes },
    ChannelField { key: "last_entry_id", sources: &["last_entry_id"], rule: Rule::Text },
];

pub fn normalize(raw: &Value) -> NormalizedSnapshot {
    let empty = Map::new();
    let channel = match raw.get("channel") {
        Some(Value::Object(channel)) => channel,
        Some(other) => {
            warn!(kind = json_kind(other), "channel is not an object, using defaults");
            &empty
        }
        None => {
            debug!("payload has no channel object, using defaults");
            &empty
        }
    };

    let mut snapshot = NormalizedSnapshot::new();

    let last_values = embedded_object(channel, "last_values").unwrap_or_else(|err| {
        warn!(error = %err, "ignoring last_values");
        Map::new()
    });
    for key in MEASUREMENT_FIELDS {
        match measurement(&last_values, key) {
            Ok(value) => snapshot.insert(key, SnapshotValue::Number(value)),
            Err(FieldDecodeError::Missing(_)) => {}
            Err(err) => warn!(field = key, error = %err, "dropping measurement"),
        }
    }

    for field in CHANNEL_FIELDS {
        let source = field
            .sources
            .iter()
            .find_map(|name| channel.get(*name).filter(|v| !v.is_null()));
        snapshot.insert(field.key, apply_rule(field.rule, field.key, source));
    }

    let (ssid, usb_powered) = match embedded_object(channel, "status") {
        Ok(status) => (
            status
                .get("ssid")
                .and_then(Value::as_str)
                .map_or_else(SnapshotValue::unknown, |s| SnapshotValue::Text(s.to_string())),
            status.get("usb").and_then(Value::as_str) == Some("1"),
        ),
        Err(err) => {
            warn!(error = %err, "ignoring status");
            (SnapshotValue::unknown(), false)
        }
    };
    snapshot.insert("wifi_ssid", ssid);
    snapshot.insert("usb_powered", SnapshotValue::Flag(usb_powered));

    snapshot
}

/// Decodes a JSON object that the vendor ships as an encoded string.
/// An absent key decodes to an empty object.
fn embedded_object(
    channel: &Map<String, Value>,
    key: &'static str,
) -> Result<Map<String, Value>, FieldDecodeError> {
    let decoded = match channel.get(key) {
        None | Some(Value::Null) => return Ok(Map::new()),
        Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded)
            .map_err(|err| FieldDecodeError::NotJson(key, err.to_string()))?,
        Some(other) => other.clone(),
    };
    match decoded {
        Value::Object(map) => Ok(map),
        other => Err(FieldDecodeError::NotJson(
            key,
            format!("expected an object, found {}", json_kind(&other)),
        )),
    }
}

fn measurement(last_values: &Map<String, Value>, key: &str) -> Result<f64, FieldDecodeError> {
    let reading = last_values
        .get(key)
        .ok_or_else(|| FieldDecodeError::Missing(key.to_string()))?;
    let value = reading
        .get("value")
        .ok_or_else(|| FieldDecodeError::NotNumeric(key.to_string()))?;
    coerce_f64(value)
        .map(round2)
        .filter(|v| v.is_finite())
        .ok_or_else(|| FieldDecodeError::NotNumeric(key.to_string()))
}

fn apply_rule(rule: Rule, key: &str, source: Option<&Value>) -> SnapshotValue {
    match rule {
        Rule::Counter => SnapshotValue::Number(counter(key, source)),
        Rule::Kilobytes => SnapshotValue::Number(round2(counter(key, source) / 1024.0)),
        Rule::Text => source
            .and_then(text)
            .map_or_else(SnapshotValue::unknown, SnapshotValue::Text),
        Rule::Timestamp => match source.and_then(text) {
            Some(raw) => timestamp(raw),
            None => SnapshotValue::unknown(),
        },
    }
}

fn counter(key: &str, source: Option<&Value>) -> f64 {
    let Some(value) = source else {
        return 0.0;
    };
    coerce_f64(value).unwrap_or_else(|| {
        warn!(field = key, "counter is not numeric, using 0");
        0.0
    })
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn timestamp(raw: String) -> SnapshotValue {
    if raw == UNKNOWN {
        return SnapshotValue::unknown();
    }
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(parsed) => SnapshotValue::Timestamp(parsed),
        Err(err) => {
            debug!(value = %raw, error = %err, "keeping unparsed timestamp as text");
            SnapshotValue::Text(raw)
        }
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn full_payload() -> Value {
        json!({
            "result": "success",
            "channel": {
                "channel_id": "12345",
                "last_values": "{\"field1\":{\"value\":21.5,\"created_at\":\"2024-01-01T00:00:00Z\"},\"field2\":{\"value\":\"48\"},\"field5\":{\"value\":-61.456}}",
                "status": "{\"ssid\":\"home-net\",\"usb\":\"1\",\"power\":\"0\"}",
                "traffic_out": 1234,
                "traffic_in": "99.5",
                "mac_address": "AA:BB:CC:DD:EE:FF",
                "last_entry_date": "2024-01-01T00:00:00Z",
                "activated_at": "2023-06-15T08:30:00+02:00",
                "firmware": "1.9.2",
                "device_id": "ws1-abc",
                "serial": "SHORT",
                "full_serial": "FULL-SERIAL-001",
                "last_ip": "10.0.0.5",
                "plan_code": "ubibot_free",
                "usage": 10240,
                "last_entry_id": 4821
            }
        })
    }

    #[test]
    fn full_payload_is_flattened() {
        let snapshot = normalize(&full_payload());

        assert_eq!(snapshot.number("field1"), Some(21.5));
        assert_eq!(snapshot.number("field2"), Some(48.0));
        assert_eq!(snapshot.number("field5"), Some(-61.46));
        assert!(!snapshot.contains("field3"));
        assert_eq!(snapshot.number("traffic_out"), Some(1234.0));
        assert_eq!(snapshot.number("traffic_in"), Some(99.5));
        assert_eq!(snapshot.text("mac_address"), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(snapshot.text("serial"), Some("FULL-SERIAL-001"));
        assert_eq!(snapshot.text("last_entry_id"), Some("4821"));
        assert_eq!(snapshot.text("plan_code"), Some("ubibot_free"));
        assert_eq!(snapshot.number("usage"), Some(10.0));
        assert_eq!(snapshot.text("wifi_ssid"), Some("home-net"));
        assert_eq!(snapshot.flag("usb_powered"), Some(true));
        assert_eq!(
            snapshot.timestamp("activated_at").map(|ts| ts.to_rfc3339()),
            Some("2023-06-15T08:30:00+02:00".to_string())
        );
    }

    #[test]
    fn zulu_timestamp_gets_explicit_offset() {
        let snapshot = normalize(&full_payload());
        let ts = snapshot.timestamp("last_entry_date").expect("parsed");
        assert_eq!(ts.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn garbage_timestamp_passes_through() {
        let snapshot = normalize(&json!({"channel": {"last_entry_date": "garbage"}}));
        assert_eq!(snapshot.text("last_entry_date"), Some("garbage"));
        assert_eq!(snapshot.text("activated_at"), Some(UNKNOWN));
    }

    #[test]
    fn missing_last_values_drops_measurements_only() {
        let snapshot = normalize(&json!({"channel": {"mac_address": "x"}}));
        for key in MEASUREMENT_FIELDS {
            assert!(!snapshot.contains(key), "{key} should be absent");
        }
        assert_eq!(snapshot.number("traffic_out"), Some(0.0));
        assert_eq!(snapshot.number("traffic_in"), Some(0.0));
        assert_eq!(snapshot.text("mac_address"), Some("x"));
    }

    #[test]
    fn malformed_last_values_is_isolated() {
        let snapshot = normalize(&json!({
            "channel": {"last_values": "{not json", "firmware": "2.0", "usage": 2048}
        }));
        assert!(!snapshot.contains("field1"));
        assert_eq!(snapshot.text("firmware"), Some("2.0"));
        assert_eq!(snapshot.number("usage"), Some(2.0));
    }

    #[test]
    fn malformed_status_defaults_ssid_and_usb() {
        let mut payload = full_payload();
        payload["channel"]["status"] = json!("ssid=home;usb=1");
        let snapshot = normalize(&payload);

        assert_eq!(snapshot.text("wifi_ssid"), Some(UNKNOWN));
        assert_eq!(snapshot.flag("usb_powered"), Some(false));
        assert_eq!(snapshot.number("field1"), Some(21.5));
        assert_eq!(snapshot.text("serial"), Some("FULL-SERIAL-001"));
    }

    #[test]
    fn non_numeric_measurement_is_omitted() {
        let snapshot = normalize(&json!({
            "channel": {
                "last_values": "{\"field1\":{\"value\":\"n/a\"},\"field2\":{\"value\":\"NaN\"},\"field3\":{},\"field4\":{\"value\":3.14159}}"
            }
        }));
        assert!(!snapshot.contains("field1"));
        assert!(!snapshot.contains("field2"));
        assert!(!snapshot.contains("field3"));
        assert_eq!(snapshot.number("field4"), Some(3.14));
    }

    #[test]
    fn reading_that_overflows_rounding_is_omitted() {
        let snapshot = normalize(&json!({
            "channel": {"last_values": "{\"field1\":{\"value\":\"1.7e308\"},\"field2\":{\"value\":-1.7e308}}"}
        }));
        assert!(!snapshot.contains("field1"));
        assert!(!snapshot.contains("field2"));

        let rendered = serde_json::to_string(&snapshot).expect("serialize");
        assert!(!rendered.contains("null"), "{rendered}");
    }

    #[test]
    fn string_measurement_round_trips() {
        let snapshot = normalize(&json!({
            "channel": {"last_values": "{\"field1\":{\"value\":\"21.5\"}}"}
        }));
        assert_eq!(snapshot.number("field1"), Some(21.5));
    }

    #[test]
    fn usage_is_reported_in_kilobytes() {
        let snapshot = normalize(&json!({"channel": {"usage": 10240}}));
        assert_eq!(snapshot.number("usage"), Some(10.0));

        let snapshot = normalize(&json!({"channel": {"usage": "1500"}}));
        assert_eq!(snapshot.number("usage"), Some(1.46));

        let snapshot = normalize(&json!({"channel": {"usage": {"bytes": 1}}}));
        assert_eq!(snapshot.number("usage"), Some(0.0));
    }

    #[test]
    fn serial_falls_back_to_short_serial() {
        let snapshot = normalize(&json!({"channel": {"serial": "SHORT"}}));
        assert_eq!(snapshot.text("serial"), Some("SHORT"));
    }

    #[test]
    fn metadata_defaults_to_unknown() {
        let snapshot = normalize(&json!({"channel": {"firmware": null, "last_ip": ["1.2.3.4"]}}));
        for key in ["mac_address", "firmware", "device_id", "serial", "last_ip", "plan_code", "last_entry_id"] {
            assert_eq!(snapshot.text(key), Some(UNKNOWN), "{key}");
        }
    }

    #[test]
    fn unexpected_shapes_never_panic() {
        for payload in [
            json!(null),
            json!([]),
            json!("channel"),
            json!({"channel": 5}),
            json!({"channel": {"last_values": 7, "status": "[1,2]"}}),
            json!({"channel": {"last_values": "{\"field1\": 3}", "status": {"usb": 1}}}),
        ] {
            let snapshot = normalize(&payload);
            assert!(!snapshot.contains("field1"));
            assert_eq!(snapshot.text("wifi_ssid"), Some(UNKNOWN));
            assert_eq!(snapshot.flag("usb_powered"), Some(false));
            assert_eq!(snapshot.number("traffic_in"), Some(0.0));
        }
    }

    #[test]
    fn already_decoded_last_values_are_accepted() {
        let snapshot = normalize(&json!({
            "channel": {"last_values": {"field7": {"value": 4}}}
        }));
        assert_eq!(snapshot.number("field7"), Some(4.0));
    }

    #[test]
    fn embedded_object_reports_typed_error() {
        let mut channel = Map::new();
        channel.insert("status".into(), json!("{oops"));
        assert!(matches!(
            embedded_object(&channel, "status"),
            Err(FieldDecodeError::NotJson("status", _))
        ));
        assert_eq!(embedded_object(&channel, "last_values"), Ok(Map::new()));
    }

    #[test]
    fn rules_apply_defaults() {
        assert_eq!(apply_rule(Rule::Counter, "t", None), SnapshotValue::Number(0.0));
        assert_eq!(apply_rule(Rule::Text, "t", Some(&json!(""))), SnapshotValue::unknown());
        assert_eq!(
            apply_rule(Rule::Timestamp, "t", Some(&json!("Unknown"))),
            SnapshotValue::unknown()
        );
        assert_eq!(
            apply_rule(Rule::Kilobytes, "t", Some(&json!(512))),
            SnapshotValue::Number(0.5)
        );
    }
}
