//! Environment variable parsing utilities
//!
//! Safe, ergonomic parsing of env vars with sensible defaults, eliminating
//! the need for `unwrap()` calls scattered across every service's config.

use std::str::FromStr;

/// Parse an environment variable with a default fallback.
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse an environment variable, returning `None` if missing or invalid.
pub fn parse_env_optional<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Parse a required environment variable, returning `Err` if missing or invalid.
pub fn parse_env_required<T: FromStr>(key: &str) -> Result<T, String> {
    std::env::var(key)
        .map_err(|_| format!("environment variable {} not found", key))?
        .parse()
        .map_err(|_| format!("failed to parse environment variable {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_default_falls_back_when_unset() {
        std::env::remove_var("DBPOOL_TEST_UNSET");
        let result: u32 = parse_env_with_default("DBPOOL_TEST_UNSET", 42);
        assert_eq!(result, 42);
    }

    #[test]
    fn with_default_uses_env_when_set() {
        std::env::set_var("DBPOOL_TEST_PORT", "8080");
        let result: u16 = parse_env_with_default("DBPOOL_TEST_PORT", 3000);
        assert_eq!(result, 8080);
        std::env::remove_var("DBPOOL_TEST_PORT");
    }

    #[test]
    fn optional_returns_none_when_unset() {
        std::env::remove_var("DBPOOL_TEST_OPT");
        assert_eq!(parse_env_optional::<u32>("DBPOOL_TEST_OPT"), None);
    }

    #[test]
    fn required_errors_when_unset() {
        std::env::remove_var("DBPOOL_TEST_REQ");
        assert!(parse_env_required::<u32>("DBPOOL_TEST_REQ").is_err());
    }
}
