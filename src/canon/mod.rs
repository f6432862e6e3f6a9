//! Canonical JSON bytes for facet hashing.
//!
//! Every digest in the crate is computed over the output of
//! [`canonical_json_bytes`]. Rules:
//!
//! 1. Object keys are sorted by byte order.
//! 2. Compact form, no whitespace.
//! 3. Strings are escaped per RFC 8259 §7.
//! 4. Integers are written as integers. Floats that hold an integral value
//!    inside ±2^53 are written in integer form, `-0.0` becomes `0`, any other
//!    finite float uses the shortest decimal that round-trips, never an
//!    exponent.
//! 5. NaN and ±Infinity have no canonical form and are rejected.

use std::io::Write;
use thiserror::Error;
use crate::error::ModelSealError;

const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanonError {
    #[error("non-finite number has no canonical form: {0}")]
    NonFinite(f64),

    #[error("facet is not valid JSON: {0}")]
    InvalidJson(String),
}

impl From<CanonError> for ModelSealError {
    fn from(err: CanonError) -> Self {
        ModelSealError::Serialization(err.to_string())
    }
}

pub fn canonical_json_bytes(value: &serde_json::Value) -> Result<Vec<u8>, CanonError> {
    let mut buf = Vec::new();
    write_value(&mut buf, value)?;
    Ok(buf)
}

pub fn canonical_json_string(value: &serde_json::Value) -> Result<String, CanonError> {
    let bytes = canonical_json_bytes(value)?;
    // Writer only emits UTF-8.
    String::from_utf8(bytes).map_err(|e| CanonError::InvalidJson(e.to_string()))
}

/// Parse facet text and canonicalize it. Python-style `NaN`/`Infinity`
/// literals are not JSON and fail here.
pub fn canonicalize_str(text: &str) -> Result<Vec<u8>, CanonError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| CanonError::InvalidJson(e.to_string()))?;
    canonical_json_bytes(&value)
}

/// Convert a float into a JSON value, rejecting values with no canonical form.
pub fn finite_number(value: f64) -> Result<serde_json::Value, CanonError> {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .ok_or(CanonError::NonFinite(value))
}

fn write_value(buf: &mut Vec<u8>, value: &serde_json::Value) -> Result<(), CanonError> {
    match value {
        serde_json::Value::Null => buf.extend_from_slice(b"null"),
        serde_json::Value::Bool(true) => buf.extend_from_slice(b"true"),
        serde_json::Value::Bool(false) => buf.extend_from_slice(b"false"),
        serde_json::Value::Number(n) => write_number(buf, n)?,
        serde_json::Value::String(s) => write_string(buf, s),
        serde_json::Value::Array(arr) => {
            buf.push(b'[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_value(buf, item)?;
            }
            buf.push(b']');
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            buf.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_string(buf, key);
                buf.push(b':');
                write_value(buf, &map[*key])?;
            }
            buf.push(b'}');
        }
    }
    Ok(())
}

fn write_number(buf: &mut Vec<u8>, n: &serde_json::Number) -> Result<(), CanonError> {
    if let Some(i) = n.as_i64() {
        let _ = write!(buf, "{i}");
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        let _ = write!(buf, "{u}");
        return Ok(());
    }

    let f = n.as_f64().ok_or(CanonError::NonFinite(f64::NAN))?;
    if !f.is_finite() {
        return Err(CanonError::NonFinite(f));
    }

    if f == 0.0 {
        buf.push(b'0');
    } else if f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER {
        let _ = write!(buf, "{}", f as i64);
    } else {
        // Display for f64 is the shortest round-trip form without exponent.
        let _ = write!(buf, "{f}");
    }
    Ok(())
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for ch in s.chars() {
        match ch {
            '"' => buf.extend_from_slice(b"\\\""),
            '\\' => buf.extend_from_slice(b"\\\\"),
            '\n' => buf.extend_from_slice(b"\\n"),
            '\r' => buf.extend_from_slice(b"\\r"),
            '\t' => buf.extend_from_slice(b"\\t"),
            c if c < '\u{0020}' => {
                let _ = write!(buf, "\\u{:04x}", c as u32);
            }
            c => {
                let mut utf8_buf = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut utf8_buf).as_bytes());
            }
        }
    }
    buf.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sorted_keys() {
        let v = json!({"loss": 0.01, "epochs": 250});
        assert_eq!(canonical_json_bytes(&v).unwrap(), b"{\"epochs\":250,\"loss\":0.01}");
    }

    #[test]
    fn test_nested_sorted_keys() {
        let v = json!({"b": {"d": 1, "c": 2}, "a": 3});
        assert_eq!(canonical_json_bytes(&v).unwrap(), b"{\"a\":3,\"b\":{\"c\":2,\"d\":1}}");
    }

    #[test]
    fn test_whitespace_invariance() {
        let compact = canonicalize_str(r#"[[1.0,2.0],[3.0]]"#).unwrap();
        let spaced = canonicalize_str("[ [1.0, 2.0],\n [3.0] ]").unwrap();
        assert_eq!(compact, spaced);
    }

    #[test]
    fn test_integral_float_matches_integer() {
        let from_float = canonical_json_bytes(&json!([1.0, 2.0, 3.0])).unwrap();
        let from_int = canonical_json_bytes(&json!([1, 2, 3])).unwrap();
        assert_eq!(from_float, from_int);
        assert_eq!(from_float, b"[1,2,3]");
    }

    #[test]
    fn test_negative_zero_is_zero() {
        assert_eq!(canonical_json_bytes(&json!(-0.0)).unwrap(), b"0");
    }

    #[test]
    fn test_fraction_shortest_form() {
        assert_eq!(canonical_json_bytes(&json!(0.01)).unwrap(), b"0.01");
        assert_eq!(canonical_json_bytes(&json!(1.01)).unwrap(), b"1.01");
        assert_eq!(canonical_json_bytes(&json!(-2.5)).unwrap(), b"-2.5");
    }

    #[test]
    fn test_exponent_input_is_expanded() {
        let a = canonicalize_str("[1e-7]").unwrap();
        let b = canonicalize_str("[0.0000001]").unwrap();
        assert_eq!(a, b);
        assert!(!String::from_utf8(a).unwrap().contains('e'));
    }

    #[test]
    fn test_rejects_nan_literal() {
        let err = canonicalize_str("[NaN]").unwrap_err();
        assert!(matches!(err, CanonError::InvalidJson(_)));
    }

    #[test]
    fn test_finite_number_rejects_infinity() {
        assert_eq!(finite_number(f64::INFINITY).unwrap_err(), CanonError::NonFinite(f64::INFINITY));
        assert!(finite_number(f64::NAN).is_err());
        assert!(finite_number(0.5).is_ok());
    }

    #[test]
    fn test_string_escaping() {
        let v = json!({"a": "line1\nline2\ttab\\slash\"quote"});
        assert_eq!(
            canonical_json_bytes(&v).unwrap(),
            b"{\"a\":\"line1\\nline2\\ttab\\\\slash\\\"quote\"}"
        );
    }

    #[test]
    fn test_control_char_escaping() {
        let v = json!({"a": "\u{0001}"});
        assert_eq!(canonical_json_bytes(&v).unwrap(), b"{\"a\":\"\\u0001\"}");
    }

    #[test]
    fn test_large_u64() {
        let v = json!({"a": u64::MAX});
        let expected = format!("{{\"a\":{}}}", u64::MAX);
        assert_eq!(canonical_json_bytes(&v).unwrap(), expected.as_bytes());
    }

    #[test]
    fn test_canonical_error_converts_to_serialization() {
        let err: ModelSealError = CanonError::NonFinite(f64::INFINITY).into();
        assert!(matches!(err, ModelSealError::Serialization(_)));
    }
}
