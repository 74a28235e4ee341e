//! Conversion strategies
//!
//! A [`Converter`] is consulted at two points: before a scalar is stored
//! ([`Converter::normalize`]) and when a stored value does not decode
//! directly as the type a caller asked for ([`Converter::alternatives`]).

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Number, Value as JsonValue};

use crate::error::ConversionError;

/// Swappable scalar conversion strategy
pub trait Converter: Send + Sync + Debug {
    /// Strategy name, used in diagnostics
    fn name(&self) -> &'static str;

    /// Prepare an outbound value for storage
    ///
    /// # Errors
    /// Returns [`ConversionError::Unstorable`] when the strategy refuses the value
    fn normalize(&self, value: JsonValue) -> Result<JsonValue, ConversionError> {
        Ok(value)
    }

    /// Candidate reshapings tried, in order, after a direct decode fails
    fn alternatives(&self, value: &JsonValue) -> Vec<JsonValue>;
}

/// Converter that coerces between strings, numbers, booleans and
/// single-element lists
#[derive(Debug, Clone, Copy, Default)]
pub struct LenientConverter;

impl LenientConverter {
    /// Create lenient converter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Converter for LenientConverter {
    fn name(&self) -> &'static str {
        "lenient"
    }

    fn alternatives(&self, value: &JsonValue) -> Vec<JsonValue> {
        let mut out = scalar_alternatives(value);
        match value {
            JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::String(_) => {
                out.push(JsonValue::Array(vec![value.clone()]));
            }
            JsonValue::Array(items) if items.len() == 1 => {
                out.push(items[0].clone());
                out.extend(scalar_alternatives(&items[0]));
            }
            _ => {}
        }
        out
    }
}

/// Converter that only accepts values already in the requested shape
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictConverter;

impl StrictConverter {
    /// Create strict converter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Converter for StrictConverter {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn alternatives(&self, _value: &JsonValue) -> Vec<JsonValue> {
        Vec::new()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn scalar_alternatives(value: &JsonValue) -> Vec<JsonValue> {
    match value {
        JsonValue::String(text) => {
            let text = text.trim();
            let mut out = Vec::new();
            match text {
                "true" => out.push(JsonValue::Bool(true)),
                "false" => out.push(JsonValue::Bool(false)),
                _ => {}
            }
            if let Ok(int) = text.parse::<i64>() {
                out.push(JsonValue::Number(int.into()));
            } else if let Ok(uint) = text.parse::<u64>() {
                out.push(JsonValue::Number(uint.into()));
            } else if let Some(float) = text.parse::<f64>().ok().and_then(Number::from_f64) {
                out.push(JsonValue::Number(float));
            }
            out
        }
        JsonValue::Number(number) => {
            let mut out = Vec::new();
            if let Some(float) = number.as_f64() {
                // 3.0 decodes as an integer; the cast is exact once fract() is zero
                if number.is_f64() && float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
                    out.push(JsonValue::Number((float as i64).into()));
                }
            }
            out.push(JsonValue::String(number.to_string()));
            out
        }
        JsonValue::Bool(flag) => vec![JsonValue::String(flag.to_string())],
        _ => Vec::new(),
    }
}

/// Decode `value` as `T`, falling back to the strategy's alternatives
///
/// # Errors
/// Returns [`ConversionError::Unconvertible`] if neither the value nor any
/// alternative decodes as `T`
pub fn convert<T: DeserializeOwned>(
    converter: &dyn Converter,
    value: JsonValue,
) -> Result<T, ConversionError> {
    let direct = match T::deserialize(&value) {
        Ok(decoded) => return Ok(decoded),
        Err(e) => e,
    };

    for candidate in converter.alternatives(&value) {
        if let Ok(decoded) = T::deserialize(&candidate) {
            return Ok(decoded);
        }
    }

    Err(ConversionError::unconvertible::<T>(&value, direct.to_string()))
}

/// Serialize `value` into plain data and normalize it for storage
///
/// # Errors
/// Returns [`ConversionError::Serialization`] if the value cannot be
/// serialized, or whatever the strategy's normalization rejects
pub fn to_storable<T: Serialize + ?Sized>(
    converter: &dyn Converter,
    value: &T,
) -> Result<JsonValue, ConversionError> {
    let plain = serde_json::to_value(value)?;
    converter.normalize(plain)
}
