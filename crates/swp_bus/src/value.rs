//! Scalar values and the flat string-keyed maps built from them.
//!
//! `State`, `Parameters`, and bus `Message` payloads are all instances of
//! [`Fields`] — a `BTreeMap<String, ScalarValue>`. `BTreeMap` is used rather
//! than `HashMap` so iteration order is deterministic, which the harness's
//! byte-identical-reruns property depends on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A scalar carried in state, parameters, or a message payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// A floating-point scalar.
    Float(f64),
    /// A small integer scalar.
    Int(i64),
}

impl ScalarValue {
    /// Returns this value as `f64`, widening integers.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            ScalarValue::Float(v) => v,
            ScalarValue::Int(v) => v as f64,
        }
    }

    /// Returns this value as `i64`, truncating floats.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            ScalarValue::Float(v) => v as i64,
            ScalarValue::Int(v) => v,
        }
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

/// A flat, string-keyed map of [`ScalarValue`]s.
///
/// Used as-is for `State`, `Parameters`, and message payloads. Readers
/// obtain copies — `Fields` is `Clone` and every accessor returns owned
/// values, never references into a shared store.
pub type Fields = BTreeMap<String, ScalarValue>;

/// Convenience trait for reading a named scalar out of a [`Fields`] map with
/// a default, recording the miss is the caller's responsibility (components
/// use this to implement the "missing key treated as zero" contract).
pub trait FieldsExt {
    /// Returns the named field as `f64`, or `default` if absent.
    fn get_f64_or(&self, key: &str, default: f64) -> f64;
}

impl FieldsExt for Fields {
    fn get_f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).map_or(default, |v| v.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_as_f64() {
        let v = ScalarValue::Float(3.5);
        assert!((v.as_f64() - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_int_as_f64() {
        let v = ScalarValue::Int(4);
        assert!((v.as_f64() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fields_get_f64_or_default() {
        let fields: Fields = Fields::new();
        assert_eq!(fields.get_f64_or("inflow", 0.0), 0.0);
    }

    #[test]
    fn test_fields_get_f64_or_present() {
        let mut fields: Fields = Fields::new();
        fields.insert("inflow".to_string(), ScalarValue::Float(12.5));
        assert_eq!(fields.get_f64_or("inflow", 0.0), 12.5);
    }
}
