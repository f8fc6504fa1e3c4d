//! The `Order` aggregate (§3): a CREATED order moves monotonically toward a
//! terminal status, accumulating the `OrderItem`s it was created with.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Created,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Cancelled)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(OrderStatus::Created),
            "IN_PROGRESS" => Ok(OrderStatus::InProgress),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "FAILED" => Ok(OrderStatus::Failed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: i32,
    pub price: BigDecimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub amount: BigDecimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// Map the processor's terminal status onto this service's order status
/// (§4.5 `UpdateOrderStatusFromEvent`): anything other than SUCCESS/FAILED
/// (i.e. the transient PROCESSING acknowledgement) maps to IN_PROGRESS.
pub fn status_from_processed_event(external_status: &str) -> OrderStatus {
    match external_status {
        "SUCCESS" => OrderStatus::Completed,
        "FAILED" => OrderStatus::Failed,
        _ => OrderStatus::InProgress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_success_and_failed_and_defaults_to_in_progress() {
        assert_eq!(status_from_processed_event("SUCCESS"), OrderStatus::Completed);
        assert_eq!(status_from_processed_event("FAILED"), OrderStatus::Failed);
        assert_eq!(status_from_processed_event("PROCESSING"), OrderStatus::InProgress);
        assert_eq!(status_from_processed_event("whatever"), OrderStatus::InProgress);
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Created.is_terminal());
        assert!(!OrderStatus::InProgress.is_terminal());
    }
}
