//! Payload decoding and numeric rounding

use serde_json::{Map, Value};

/// Decode raw payload bytes into a JSON value
///
/// Bytes are decoded as UTF-8 (invalid sequences replaced) and trimmed. An
/// empty payload is `null`; text that is not valid JSON is kept verbatim as a
/// string.
pub fn decode_payload(bytes: &[u8]) -> Value {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// Round to `precision` decimal places
pub fn round_float(value: f64, precision: u32) -> f64 {
    let formatted = format!("{:.*}", precision as usize, value);
    formatted.parse().unwrap_or(value)
}

/// Round a top-level float; every other value passes through unchanged
pub fn round_value(value: Value, precision: u32) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map(|f| Value::from(round_float(f, precision)))
            .unwrap_or(Value::Number(n)),
        other => other,
    }
}

/// Round each top-level float of an object payload
pub fn round_object(map: Map<String, Value>, precision: u32) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| (key, round_value(value, precision)))
        .collect()
}
