//! Resilience primitives shared by both services: circuit breaker, retry
//! with backoff, and timeouts, plus a few preset configurations tuned for
//! this workspace's dependencies (Postgres, the AMQP broker).

pub mod circuit_breaker;
pub mod presets;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use presets::ServiceConfig;
pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutConfig, TimeoutError};
