// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Significant digits used when a float is shown in a text cell.
pub const FLOAT_DISPLAY_DIGITS: usize = 5;

/// Values reported by the device for one lane, keyed by column key.
pub type LaneValues = BTreeMap<String, CellValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn display(&self) -> String {
        match self {
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => format_significant(*value, FLOAT_DISPLAY_DIGITS),
            Self::Text(value) => value.clone(),
        }
    }

    /// Permissive truth test used by checkbox-like editors: non-zero numbers
    /// and the strings `true`/`1` (any case) are true, everything else false.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::Text(value) => {
                let trimmed = value.trim();
                trimmed.eq_ignore_ascii_case("true") || trimmed == "1"
            }
        }
    }

    pub fn coerce(&self, target: ValueType) -> Result<Self, CoercionError> {
        let invalid = || CoercionError::Invalid {
            input: self.display(),
            expected: target,
        };
        match (target, self) {
            (ValueType::Int, Self::Int(_)) => Ok(self.clone()),
            (ValueType::Int, Self::Bool(value)) => Ok(Self::Int(i64::from(*value))),
            (ValueType::Int, Self::Float(value)) => {
                if value.is_finite() && value.fract() == 0.0 && fits_i64(*value) {
                    Ok(Self::Int(*value as i64))
                } else {
                    Err(invalid())
                }
            }
            (ValueType::Int, Self::Text(value)) => parse_text(value, ValueType::Int),
            (ValueType::Float, Self::Int(value)) => Ok(Self::Float(*value as f64)),
            (ValueType::Float, Self::Float(_)) => Ok(self.clone()),
            (ValueType::Float, Self::Bool(_)) => Err(invalid()),
            (ValueType::Float, Self::Text(value)) => parse_text(value, ValueType::Float),
            (ValueType::Str, _) => Ok(Self::Text(self.display())),
            (ValueType::Boolean, Self::Bool(_)) => Ok(self.clone()),
            (ValueType::Boolean, Self::Int(_) | Self::Float(_)) => Ok(Self::Bool(self.truthy())),
            (ValueType::Boolean, Self::Text(value)) => parse_text(value, ValueType::Boolean),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Int,
    Float,
    Str,
    Boolean,
}

impl ValueType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Boolean => "boolean",
        }
    }

    /// Operator prompt shown when typed input does not parse.
    pub fn hint(self) -> String {
        format!("Please enter a valid {}", self.noun())
    }

    pub const fn noun(self) -> &'static str {
        match self {
            Self::Int => "integer",
            Self::Float => "number",
            Self::Str => "text value",
            Self::Boolean => "boolean (true/false)",
        }
    }

    /// Type of an existing value, used to pick the coercion target for
    /// dependency checks.
    pub const fn of(value: &CellValue) -> Self {
        match value {
            CellValue::Bool(_) => Self::Boolean,
            CellValue::Int(_) => Self::Int,
            CellValue::Float(_) => Self::Float,
            CellValue::Text(_) => Self::Str,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoercionError {
    #[error("empty value")]
    Empty,
    #[error("{input:?} is not a valid {expected}")]
    Invalid { input: String, expected: ValueType },
}

/// Parses operator text into a typed value. Empty input is always an error.
pub fn parse_text(input: &str, target: ValueType) -> Result<CellValue, CoercionError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoercionError::Empty);
    }
    let invalid = || CoercionError::Invalid {
        input: input.to_owned(),
        expected: target,
    };

    match target {
        ValueType::Int => trimmed.parse::<i64>().map(CellValue::Int).map_err(|_| invalid()),
        ValueType::Float => trimmed
            .parse::<f64>()
            .map(CellValue::Float)
            .map_err(|_| invalid()),
        ValueType::Str => Ok(CellValue::Text(input.to_owned())),
        ValueType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(CellValue::Bool(true)),
            "false" | "0" | "off" | "no" => Ok(CellValue::Bool(false)),
            _ => Err(invalid()),
        },
    }
}

/// `%g`-style formatting with `digits` significant digits.
pub fn format_significant(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_owned();
    }

    let precision = digits.max(1) - 1;
    let scientific = format!("{value:.precision$e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if exponent < -4 || exponent >= digits as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.unsigned_abs());
    }

    let decimals = (precision as i32 - exponent).max(0) as usize;
    trim_fraction(&format!("{value:.decimals$}")).to_owned()
}

// i64::MAX as f64 rounds up to 2^63, which is already out of range.
fn fits_i64(value: f64) -> bool {
    value >= i64::MIN as f64 && value < i64::MAX as f64
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
