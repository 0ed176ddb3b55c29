//! Environment-variable lookups shared by the configuration structs.
//!
//! Lookups go through a closure so tests can feed a plain map instead of
//! mutating the process environment.

use std::str::FromStr;

use crate::error::CoreError;

/// Read from the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// String value or `default` when unset or blank.
pub fn string_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parsed value or `default` when unset. A value that fails to parse is a
/// [`CoreError::Validation`].
pub fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} has invalid value '{v}'"))),
    }
}

/// Boolean flag: `1/true/yes/on` or `0/false/no/off`.
pub fn flag_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, CoreError> {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(CoreError::Validation(format!(
                "{key} must be a boolean, got '{v}'"
            ))),
        },
    }
}
