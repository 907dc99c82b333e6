//! Typed access to capability keyword arguments.

use crate::traits::{CapabilityError, Parameters};

pub fn required_str<'a>(params: &'a Parameters, key: &str) -> Result<&'a str, CapabilityError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| CapabilityError::InvalidParameters(format!("'{key}' must be a string")))
}

pub fn optional_str<'a>(params: &'a Parameters, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

pub fn required_i64(params: &Parameters, key: &str) -> Result<i64, CapabilityError> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| CapabilityError::InvalidParameters(format!("'{key}' must be an integer")))
}

/// A boolean, `default` when absent.
pub fn optional_bool(params: &Parameters, key: &str, default: bool) -> Result<bool, CapabilityError> {
    match params.get(key) {
        None => Ok(default),
        Some(value) => value
            .as_bool()
            .ok_or_else(|| CapabilityError::InvalidParameters(format!("'{key}' must be a boolean"))),
    }
}

/// A non-negative integer, `default` when absent.
pub fn optional_u64(params: &Parameters, key: &str, default: u64) -> Result<u64, CapabilityError> {
    match params.get(key) {
        None => Ok(default),
        Some(value) => value.as_u64().ok_or_else(|| {
            CapabilityError::InvalidParameters(format!("'{key}' must be a non-negative integer"))
        }),
    }
}

/// A list of strings; absent means empty.
pub fn string_list(params: &Parameters, key: &str) -> Result<Vec<String>, CapabilityError> {
    match params.get(key) {
        None => Ok(Vec::new()),
        Some(value) => value
            .as_array()
            .ok_or_else(|| CapabilityError::InvalidParameters(format!("'{key}' must be a list")))?
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    CapabilityError::InvalidParameters(format!("'{key}' must contain strings"))
                })
            })
            .collect(),
    }
}
