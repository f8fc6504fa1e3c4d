//! Immutable configuration assembled once at startup and passed by
//! reference into the broker client, the outbox publisher, and the
//! use-cases (§9 "Global configuration" — no module-level singletons).

use std::time::Duration;

fn parse_env_with_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub struct AppConfig {
    pub http_bind_addr: String,
    pub outbox_batch_size: i64,
    pub outbox_poll_interval: Duration,
    pub outbox_max_retries: i32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            http_bind_addr: std::env::var("HTTP_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            outbox_batch_size: parse_env_with_default("OUTBOX_BATCH_SIZE", 100),
            outbox_poll_interval: Duration::from_secs_f64(parse_env_with_default(
                "OUTBOX_POLL_INTERVAL",
                5.0,
            )),
            outbox_max_retries: parse_env_with_default("OUTBOX_MAX_RETRIES", 5),
        }
    }
}
