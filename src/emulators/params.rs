//! Hyperparameter values

use crate::error::{Result, SurrogateError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    None,
}

impl ParamValue {
    /// Get as float (integers are widened)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int (floats with no fractional part are accepted)
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ParamValue::None)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Str(v) => write!(f, "{}", v),
            ParamValue::None => write!(f, "None"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::None)
    }
}

/// Named hyperparameter configuration, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperParams(BTreeMap<String, ParamValue>);

impl HyperParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay another configuration on top of this one
    pub fn merge(&mut self, other: &HyperParams) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl FromIterator<(String, ParamValue)> for HyperParams {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============ Typed readers used by set_params ============

pub(crate) fn invalid(estimator: &str, name: &str, reason: impl Into<String>) -> SurrogateError {
    SurrogateError::InvalidParameter {
        name: name.to_string(),
        estimator: estimator.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn unknown(estimator: &str, name: &str) -> SurrogateError {
    invalid(estimator, name, "unknown parameter")
}

pub(crate) fn read_float(estimator: &str, name: &str, value: &ParamValue) -> Result<f64> {
    value
        .as_float()
        .ok_or_else(|| invalid(estimator, name, format!("expected a number, got {}", value)))
}

pub(crate) fn read_positive(estimator: &str, name: &str, value: &ParamValue) -> Result<f64> {
    let v = read_float(estimator, name, value)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(invalid(estimator, name, format!("must be positive, got {}", v)))
    }
}

pub(crate) fn read_non_negative(estimator: &str, name: &str, value: &ParamValue) -> Result<f64> {
    let v = read_float(estimator, name, value)?;
    if v >= 0.0 {
        Ok(v)
    } else {
        Err(invalid(estimator, name, format!("must be non-negative, got {}", v)))
    }
}

pub(crate) fn read_usize(estimator: &str, name: &str, value: &ParamValue) -> Result<usize> {
    match value.as_int() {
        Some(v) if v >= 0 => Ok(v as usize),
        _ => Err(invalid(
            estimator,
            name,
            format!("expected a non-negative integer, got {}", value),
        )),
    }
}

pub(crate) fn read_opt_usize(estimator: &str, name: &str, value: &ParamValue) -> Result<Option<usize>> {
    if value.is_none() {
        Ok(None)
    } else {
        read_usize(estimator, name, value).map(Some)
    }
}

pub(crate) fn read_opt_u64(estimator: &str, name: &str, value: &ParamValue) -> Result<Option<u64>> {
    read_opt_usize(estimator, name, value).map(|v| v.map(|s| s as u64))
}

pub(crate) fn read_bool(estimator: &str, name: &str, value: &ParamValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| invalid(estimator, name, format!("expected a boolean, got {}", value)))
}

pub(crate) fn read_choice(
    estimator: &str,
    name: &str,
    value: &ParamValue,
    allowed: &[&str],
) -> Result<String> {
    match value.as_str() {
        Some(s) if allowed.contains(&s) => Ok(s.to_string()),
        _ => Err(invalid(
            estimator,
            name,
            format!("expected one of [{}], got {}", allowed.join(", "), value),
        )),
    }
}
