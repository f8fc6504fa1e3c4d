//! The `OutboxMessage` row shape shared between the outbox repository and
//! the use-cases that create rows inside a unit-of-work transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A row in the `outbox_messages` table (§3).
///
/// Rows are only ever constructed inside the same database transaction that
/// persists the state change they announce; publication is the exclusive
/// job of `transactional-outbox::OutboxProcessor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub event_type: String,
    pub exchange: String,
    pub routing_key: String,
    /// Opaque payload bytes, JSON-encoded by convention.
    pub payload: Vec<u8>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    /// Build a new, unpublished row ready for insertion within a UoW.
    pub fn new(
        event_type: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            payload,
            published: false,
            published_at: None,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_row_is_unpublished_with_zero_retries() {
        let row = OutboxMessage::new("order.created", "orders.exchange", "order.created", vec![1, 2, 3]);
        assert!(!row.published);
        assert_eq!(row.retry_count, 0);
        assert!(row.published_at.is_none());
    }
}
