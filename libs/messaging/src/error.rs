//! Error types for the broker client.

use thiserror::Error;
use uuid::Uuid;

pub type MessagingResult<T> = Result<T, MessagingError>;

/// Errors raised by the broker client and the consumer loop.
///
/// Transport errors are always wrapped here rather than leaked raw, so
/// callers can match on kind without depending on `lapin`.
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("failed to connect to broker: {0}")]
    ConnectionError(#[source] anyhow::Error),

    #[error("failed to subscribe to queue {queue}: {source}")]
    SubscriptionError {
        queue: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to publish order.created/order.processed event for order {order_id}: {source}")]
    MessagePublishError {
        order_id: Uuid,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to consume message: {0}")]
    MessageConsumeError(#[source] anyhow::Error),

    /// Raised by the processing use-case after best-effort state
    /// persistence and outcome publish, so the broker's retry/DLQ
    /// machinery fires on a known-bad state (§4.6 step 5).
    #[error("processing failed: {0}")]
    ProcessingError(#[source] anyhow::Error),
}
