//! Wire schemas shared by the orders and processor services.
//!
//! Every event exchanged between the two services crosses the broker as
//! UTF-8 JSON. These types are the single source of truth for that wire
//! shape on both sides, so a change to one service's serialization can't
//! silently drift from what the other deserializes.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod outbox;

pub use outbox::OutboxMessage;

/// A single line item on an order, as carried on the wire.
///
/// The source accepts product entries as either structured records or loose
/// maps; this schema only accepts the structured shape and rejects anything
/// else at deserialization time, per the source's ambiguity being resolved
/// in favor of a single, statically-typed wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductItem {
    pub product_id: String,
    pub quantity: u32,
}

/// Published by the orders service when a new order is durably created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub user_id: String,
    pub products: Vec<ProductItem>,
    pub amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

/// The terminal (or in-flight) outcome reported by the processor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessedStatus {
    Success,
    Failed,
    Processing,
}

impl ProcessedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessedStatus::Success => "SUCCESS",
            ProcessedStatus::Failed => "FAILED",
            ProcessedStatus::Processing => "PROCESSING",
        }
    }
}

/// Published by the processor service once processing reaches a terminal
/// (or, transiently, an in-flight) outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderProcessedEvent {
    pub order_id: Uuid,
    pub status: ProcessedStatus,
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_item_rejects_missing_quantity() {
        let raw = serde_json::json!({"product_id": "p1"});
        let result: Result<ProductItem, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }

    #[test]
    fn order_created_event_round_trips() {
        let event = OrderCreatedEvent {
            order_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            products: vec![ProductItem {
                product_id: "p1".to_string(),
                quantity: 2,
            }],
            amount: "10.00".parse().unwrap(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: OrderCreatedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.order_id, event.order_id);
        assert_eq!(back.products, event.products);
    }

    #[test]
    fn processed_status_serializes_uppercase() {
        let json = serde_json::to_string(&ProcessedStatus::Success).unwrap();
        assert_eq!(json, "\"SUCCESS\"");
    }
}
