//! Environment lookups shared by the per-integration `Settings::from_env`.

use crate::utils::error::{IntegrationError, Result};
use std::env;
use std::str::FromStr;

pub fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| IntegrationError::config(format!("{} environment variable is required", name)))
}

pub fn optional(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e: T::Err| {
            IntegrationError::InvalidConfigValueError {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }
        }),
        _ => Ok(default),
    }
}

pub fn parse_required<T>(name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = required(name)?;
    raw.trim().parse().map_err(|e: T::Err| IntegrationError::InvalidConfigValueError {
        field: name.to_string(),
        value: raw.clone(),
        reason: e.to_string(),
    })
}

/// `yes`, `true` and `1` (any case) are truthy.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "yes" | "true" | "1")
}

pub fn flag(name: &str) -> bool {
    env::var(name).map(|v| is_truthy(&v)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("yes"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("1"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn test_parse_or() {
        env::set_var("ENV_TEST_CHUNK_SIZE", "250");
        assert_eq!(parse_or::<usize>("ENV_TEST_CHUNK_SIZE", 10).unwrap(), 250);
        assert_eq!(parse_or::<usize>("ENV_TEST_UNSET_VALUE", 10).unwrap(), 10);

        env::set_var("ENV_TEST_BAD_SIZE", "many");
        assert!(parse_or::<usize>("ENV_TEST_BAD_SIZE", 10).is_err());
    }

    #[test]
    fn test_required_missing() {
        let err = required("ENV_TEST_DEFINITELY_MISSING").unwrap_err();
        assert!(err.to_string().contains("ENV_TEST_DEFINITELY_MISSING"));
    }
}
