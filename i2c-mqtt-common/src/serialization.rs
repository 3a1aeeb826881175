use std::collections::HashMap;

use serde_json::Value;
use serde_json::value::RawValue;

use crate::error::{Error, Result};
use crate::telemetry::Reading;

/// Encode a reading as `{"addr": int, "value": int, "ts": float}`.
pub fn encode_reading(reading: &Reading) -> Result<Vec<u8>> {
    serde_json::to_vec(reading).map_err(Error::from)
}

/// Decode the raw (unmasked) value carried by an actuator payload.
///
/// The payload is a JSON object whose `value` defaults to 0 when absent.
/// Accepted values are integers, floats (truncated toward zero), integer
/// strings and booleans. Integers that do not fit an `i64` are reduced to
/// their low byte, which is all a write keeps anyway.
pub fn decode_command_payload(payload: &[u8]) -> Result<i64> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| Error::Payload(format!("payload is not UTF-8: {}", e)))?;

    // Raw values keep integer literals exact past the u64 range.
    let fields: HashMap<String, &RawValue> = serde_json::from_str(text)
        .map_err(|e| Error::Payload(format!("malformed actuator payload: {}", e)))?;

    match fields.get("value") {
        Some(raw) => decode_value(raw.get()),
        None => Ok(0),
    }
}

fn decode_value(raw: &str) -> Result<i64> {
    if let Some(value) = parse_integer(raw) {
        return Ok(value);
    }

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::Payload(format!("malformed value {}: {}", raw, e)))?;

    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(truncate)
            .ok_or_else(|| Error::Payload(format!("value {} is not finite", n))),
        Value::String(s) => parse_integer(s.trim())
            .ok_or_else(|| Error::Payload(format!("value '{}' is not an integer", s))),
        Value::Bool(b) => Ok(i64::from(b)),
        other => Err(Error::Payload(format!("value {} is not a number", other))),
    }
}

/// Parse a signed decimal integer.
///
/// Magnitudes beyond `i64` yield a value with the same low byte.
fn parse_integer(text: &str) -> Option<i64> {
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }

    let low = digits
        .bytes()
        .fold(0i64, |acc, b| (acc * 10 + i64::from(b - b'0')) % 256);
    Some(if negative { (256 - low) % 256 } else { low })
}

fn truncate(f: f64) -> i64 {
    let whole = f.trunc();
    // i64::MAX as f64 rounds up to 2^63
    if whole >= i64::MIN as f64 && whole < i64::MAX as f64 {
        whole as i64
    } else {
        whole.rem_euclid(256.0) as i64
    }
}
