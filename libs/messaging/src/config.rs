//! Broker configuration, loaded from environment by the owning service.
//!
//! Per the design notes (§9 "Global configuration"), this is a plain
//! immutable record passed into the broker client at construction — no
//! process-wide singleton.

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub amqp_url: String,
    pub service_name: String,

    pub order_created_exchange: String,
    pub order_created_routing_key: String,
    pub order_processed_exchange: String,
    pub order_processed_routing_key: String,

    pub dlx_name: String,
    pub dlq_name: String,

    pub max_retry_attempts: u32,
    pub retry_delay_base_seconds: u64,
}

impl BrokerConfig {
    pub fn from_env(service_name: &str) -> Result<Self, String> {
        let amqp_url =
            std::env::var("AMQP_URL").map_err(|_| "AMQP_URL environment variable not set".to_string())?;

        Ok(Self {
            amqp_url,
            service_name: service_name.to_string(),
            order_created_exchange: std::env::var("ORDER_CREATED_EXCHANGE")
                .unwrap_or_else(|_| "order.created".to_string()),
            order_created_routing_key: std::env::var("ORDER_CREATED_ROUTING_KEY")
                .unwrap_or_else(|_| "order.created".to_string()),
            order_processed_exchange: std::env::var("ORDER_PROCESSED_EXCHANGE")
                .unwrap_or_else(|_| "order.processed".to_string()),
            order_processed_routing_key: std::env::var("ORDER_PROCESSED_ROUTING_KEY")
                .unwrap_or_else(|_| "order.processed".to_string()),
            dlx_name: std::env::var("DLX_NAME").unwrap_or_else(|_| "dlx".to_string()),
            dlq_name: std::env::var("DLQ_NAME").unwrap_or_else(|_| "dlq".to_string()),
            max_retry_attempts: crate::parse_env_with_default("MAX_RETRY_ATTEMPTS", 3),
            retry_delay_base_seconds: crate::parse_env_with_default("RETRY_DELAY_BASE_SECONDS", 1),
        })
    }

    /// TTL in milliseconds for the retry queue at `retry_count`, capped at 300s (§4.4.1).
    pub fn backoff_ms(&self, retry_count: u32) -> u64 {
        const MAX_BACKOFF_SECS: u64 = 300;
        let secs = self
            .retry_delay_base_seconds
            .saturating_mul(2u64.saturating_pow(retry_count))
            .min(MAX_BACKOFF_SECS);
        secs * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps_at_300s() {
        let config = BrokerConfig {
            amqp_url: "amqp://localhost".to_string(),
            service_name: "orders-service".to_string(),
            order_created_exchange: "order.created".to_string(),
            order_created_routing_key: "order.created".to_string(),
            order_processed_exchange: "order.processed".to_string(),
            order_processed_routing_key: "order.processed".to_string(),
            dlx_name: "dlx".to_string(),
            dlq_name: "dlq".to_string(),
            max_retry_attempts: 3,
            retry_delay_base_seconds: 1,
        };

        assert_eq!(config.backoff_ms(0), 1_000);
        assert_eq!(config.backoff_ms(1), 2_000);
        assert_eq!(config.backoff_ms(2), 4_000);
        assert_eq!(config.backoff_ms(10), 300_000);
    }
}
