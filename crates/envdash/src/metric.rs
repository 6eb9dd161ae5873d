//! Normalized metric values and the MISSING sentinel.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Text published in place of an unavailable number.
pub const MISSING_TEXT: &str = "--";

/// A numeric metric slot: either a finite number or the MISSING sentinel.
///
/// Every published metric has a `Reading`, so consumers never branch on key
/// presence. Serializes as a JSON number or as `"--"`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Reading {
    Value(f64),
    #[default]
    Missing,
}

impl Reading {
    /// Strict extraction: only a finite JSON number counts.
    pub fn from_json(value: &Value) -> Self {
        match value.as_f64() {
            Some(v) => Self::from_f64(v),
            None => Reading::Missing,
        }
    }

    /// Lenient extraction for device payloads, which report numbers either
    /// as JSON numbers or as display strings such as `"21.3 °C"`.
    pub fn lenient(value: &Value) -> Self {
        match value {
            Value::Number(_) => Self::from_json(value),
            Value::String(s) => parse_leading_number(s).map_or(Reading::Missing, Self::from_f64),
            _ => Reading::Missing,
        }
    }

    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            Reading::Value(value)
        } else {
            Reading::Missing
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::Missing => None,
        }
    }

    pub fn is_missing(self) -> bool {
        matches!(self, Reading::Missing)
    }

    /// Format with a fixed number of decimals at publication time.
    pub fn fixed(self, decimals: usize) -> Fixed {
        Fixed {
            reading: self,
            decimals,
        }
    }
}

impl From<Option<f64>> for Reading {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Reading::Missing, Reading::from_f64)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(v) => write!(f, "{}", v),
            Reading::Missing => f.write_str(MISSING_TEXT),
        }
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Reading::Value(v) => serializer.serialize_f64(*v),
            Reading::Missing => serializer.serialize_str(MISSING_TEXT),
        }
    }
}

/// A reading rendered as a fixed-decimal string, e.g. `"21.4"` or `"1013"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fixed {
    reading: Reading,
    decimals: usize,
}

impl Fixed {
    pub fn reading(&self) -> Reading {
        self.reading
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reading {
            Reading::Value(v) => write!(f, "{:.*}", self.decimals, v),
            Reading::Missing => f.write_str(MISSING_TEXT),
        }
    }
}

impl Serialize for Fixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A named metric slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMetric {
    pub name: String,
    pub value: Reading,
}

impl NormalizedMetric {
    pub fn new(name: impl Into<String>, value: Reading) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Parse the longest numeric prefix of `s`, ignoring leading whitespace.
fn parse_leading_number(s: &str) -> Option<f64> {
    let trimmed = s.trim_start();
    let run = trimmed
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        .last()
        .map(|(i, c)| i + c.len_utf8())?;
    (1..=run)
        .rev()
        .find_map(|end| trimmed[..end].parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_accepts_only_numbers() {
        assert_eq!(Reading::from_json(&json!(42)), Reading::Value(42.0));
        assert_eq!(Reading::from_json(&json!(1.5)), Reading::Value(1.5));
        assert_eq!(Reading::from_json(&json!("42")), Reading::Missing);
        assert_eq!(Reading::from_json(&Value::Null), Reading::Missing);
        assert_eq!(Reading::from_json(&json!({"value": 1})), Reading::Missing);
    }

    #[test]
    fn test_lenient_parses_display_strings() {
        assert_eq!(Reading::lenient(&json!("21.3 °C")), Reading::Value(21.3));
        assert_eq!(Reading::lenient(&json!("45 %")), Reading::Value(45.0));
        assert_eq!(Reading::lenient(&json!(" -4.5")), Reading::Value(-4.5));
        assert_eq!(Reading::lenient(&json!("--")), Reading::Missing);
        assert_eq!(Reading::lenient(&json!("N/A")), Reading::Missing);
        assert_eq!(Reading::lenient(&json!(19.0)), Reading::Value(19.0));
        assert_eq!(Reading::lenient(&json!(true)), Reading::Missing);
    }

    #[test]
    fn test_non_finite_is_missing() {
        assert_eq!(Reading::from_f64(f64::NAN), Reading::Missing);
        assert_eq!(Reading::from_f64(f64::INFINITY), Reading::Missing);
        assert_eq!(Reading::from(None), Reading::Missing);
    }

    #[test]
    fn test_fixed_formatting() {
        assert_eq!(Reading::Value(21.44).fixed(1).to_string(), "21.4");
        assert_eq!(Reading::Value(1013.25).fixed(0).to_string(), "1013");
        assert_eq!(Reading::Value(7.0).fixed(1).to_string(), "7.0");
        assert_eq!(Reading::Missing.fixed(1).to_string(), "--");
    }

    #[test]
    fn test_serialization() {
        let metric = NormalizedMetric::new("pm10", Reading::Missing);
        assert_eq!(
            serde_json::to_value(&metric).unwrap(),
            json!({"name": "pm10", "value": "--"})
        );
        assert_eq!(
            serde_json::to_value(Reading::Value(3.5)).unwrap(),
            json!(3.5)
        );
        assert_eq!(
            serde_json::to_value(Reading::Value(55.55).fixed(0)).unwrap(),
            json!("56")
        );
    }
}
