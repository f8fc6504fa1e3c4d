//! Immutable configuration assembled once at startup (§9 "Global
//! configuration"): no module-level singletons.

fn parse_env_with_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub struct AppConfig {
    pub http_bind_addr: String,
    /// Bernoulli success probability for the simulated work (§4.6 step 3).
    pub processing_success_rate: f64,
    /// Minimum simulated processing delay.
    pub processing_min_delay_ms: u64,
    /// Maximum simulated processing delay.
    pub processing_max_delay_ms: u64,
    /// PROCESSING rows older than this are swept back to PENDING at
    /// startup (§9 open question: crashed in-flight recovery).
    pub processing_stale_grace_period_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            http_bind_addr: std::env::var("HTTP_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".to_string()),
            processing_success_rate: parse_env_with_default("PROCESSING_SUCCESS_RATE", 0.9),
            processing_min_delay_ms: parse_env_with_default("PROCESSING_MIN_DELAY_MS", 50),
            processing_max_delay_ms: parse_env_with_default("PROCESSING_MAX_DELAY_MS", 500),
            processing_stale_grace_period_secs: parse_env_with_default(
                "PROCESSING_STALE_GRACE_PERIOD_SECS",
                300,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_with_default_falls_back() {
        std::env::remove_var("DOES_NOT_EXIST_KEY");
        let value: u64 = parse_env_with_default("DOES_NOT_EXIST_KEY", 42);
        assert_eq!(value, 42);
    }
}
