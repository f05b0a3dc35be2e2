//! SafeParse: tolerant conversion of loosely typed configuration values.
//!
//! The configuration store hands over values that were typed by hand in admin
//! screens: numbers stored as strings ("1,000", " 60 "), nested objects stored
//! as JSON text, single values where an array is expected. The helpers here
//! turn those into typed primitives with explicit fallbacks and never fail.
//!
//! The `de` submodule wraps the same rules as `#[serde(deserialize_with = ..)]`
//! functions so typed records can accept the loose shapes directly.

use serde_json::{Map, Value};

/// If `v` is a string holding a JSON object or array, parse and return it;
/// otherwise return a clone of `v` unchanged.
pub fn json_or_value(v: &Value) -> Value {
    if let Value::String(s) = v {
        let t = s.trim();
        if t.starts_with('{') || t.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Value>(t) {
                return parsed;
            }
        }
    }
    v.clone()
}

/// Numeric view of a loose value. Accepts JSON numbers and numeric strings
/// (surrounding whitespace and thousands separators are ignored).
/// Non-finite results are rejected.
pub fn to_f64(v: &Value) -> Option<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_number_text(s)?,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => return None,
    };
    x.is_finite().then_some(x)
}

/// `to_f64` with a fallback.
pub fn to_f64_or(v: &Value, fallback: f64) -> f64 {
    to_f64(v).unwrap_or(fallback)
}

/// Small unsigned integer view (grades, counts). Accepts "3", 3, 3.0 and
/// strings with a trailing unit such as "3등급".
pub fn to_u8(v: &Value) -> Option<u8> {
    match v {
        Value::Number(n) => {
            let x = n.as_f64()?;
            if x.is_finite() && x >= 0.0 && x <= u8::MAX as f64 {
                Some(x.round() as u8)
            } else {
                None
            }
        }
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

/// Array view: arrays pass through, JSON-array strings are parsed, null is
/// empty, and any other scalar becomes a one-element array.
pub fn to_array(v: &Value) -> Vec<Value> {
    match json_or_value(v) {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => vec![other],
    }
}

/// Object view: objects pass through, JSON-object strings are parsed,
/// everything else is an empty map.
pub fn to_object(v: &Value) -> Map<String, Value> {
    match json_or_value(v) {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

/// String view: strings are trimmed, numbers keep their JSON rendering,
/// null is `None`.
pub fn to_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Parse numeric text such as "1,000", " 7.5 ", "+3".
pub fn parse_number_text(s: &str) -> Option<f64> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// serde adapters for loose fields.
pub mod de {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Number or numeric string; null/unparseable falls back to 0.
    pub fn loose_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(super::to_f64_or(&v, 0.0))
    }

    /// Number or numeric string; null/unparseable is `None`.
    pub fn loose_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(super::to_f64(&v))
    }

    /// Grade-like small integer; null/unparseable is `None`.
    pub fn loose_opt_u8<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(super::to_u8(&v))
    }

    /// Count-like small integer; null/unparseable falls back to 0.
    pub fn loose_u8<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(super::to_u8(&v).unwrap_or(0))
    }

    /// Boolean given as bool, number, or "Y"/"true"/"1"-style text.
    pub fn loose_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(match &v {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|x| x != 0.0).unwrap_or(false),
            Value::String(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "y" | "yes" | "true" | "1" | "o"
            ),
            _ => false,
        })
    }

    /// Scalar rendered as text (numbers become their decimal form).
    pub fn loose_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(super::to_text(&v).unwrap_or_default())
    }

    /// Scalar rendered as text; null or blank is `None`.
    pub fn loose_opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(super::to_text(&v).filter(|s| !s.is_empty()))
    }

    /// A nested record that may arrive either inline or as JSON text.
    /// Null decodes as the type's default.
    pub fn embedded<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let v = Value::deserialize(d)?;
        let v = super::json_or_value(&v);
        if v.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(v).map_err(D::Error::custom)
    }

    /// A list that may arrive inline, as JSON text, as a single element, or null.
    pub fn embedded_vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let v = Value::deserialize(d)?;
        super::to_array(&v)
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(D::Error::custom))
            .collect()
    }
}
