//! Subscribes to `order.processed` and feeds it into
//! `OrderUseCase::update_order_status_from_event` (§4.5, §4.7).

use std::sync::Arc;

use event_schema::OrderProcessedEvent;
use messaging::{BrokerClient, MessagingError, ProcessOutcome};
use tokio_util::sync::CancellationToken;
use transactional_outbox::OutboxRepository;

use crate::repository::OrderRepository;
use crate::usecase::OrderUseCase;

pub async fn start<OR, OB>(
    broker: Arc<BrokerClient>,
    usecase: Arc<OrderUseCase<OR, OB>>,
    cancel: CancellationToken,
) -> Result<(), MessagingError>
where
    OR: OrderRepository + 'static,
    OB: OutboxRepository + 'static,
{
    let config = broker.config().clone();
    let exchange = config.order_processed_exchange.clone();
    let routing_key = config.order_processed_routing_key.clone();

    broker
        .consume(
            "orders-service_order_processed",
            exchange,
            routing_key,
            "order_processed",
            move |payload| {
                let usecase = usecase.clone();
                async move { handle(usecase, payload).await }
            },
            cancel,
        )
        .await
}

/// A malformed payload (bad JSON, or an `order_id` that isn't a UUID) fails
/// typed deserialization and is routed to the decode/DLX path below before
/// the use-case ever runs. Errors the use-case itself returns are classified
/// by `ServiceError::status_code()`: a 400 is a validation error (logged,
/// acked, never retried), anything else (404/500) is transient/retry-eligible,
/// per §7's dispatch policy.
async fn handle<OR, OB>(usecase: Arc<OrderUseCase<OR, OB>>, payload: Vec<u8>) -> Result<(), ProcessOutcome>
where
    OR: OrderRepository + 'static,
    OB: OutboxRepository + 'static,
{
    let event: OrderProcessedEvent = serde_json::from_slice(&payload)
        .map_err(|e| ProcessOutcome::Decode(format!("malformed order.processed payload: {e}")))?;

    usecase
        .update_order_status_from_event(event.order_id, event.status.as_str())
        .await
        .map_err(|e| {
            if e.status_code() == 400 {
                ProcessOutcome::Validation(e.into())
            } else {
                ProcessOutcome::Transient(e.into())
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_processed_event_round_trips_through_serde() {
        let event = OrderProcessedEvent {
            order_id: uuid::Uuid::new_v4(),
            status: event_schema::ProcessedStatus::Success,
            error_message: None,
            processed_at: chrono::Utc::now(),
        };
        let bytes = serde_json::to_vec(&event).unwrap();
        let decoded: OrderProcessedEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded.order_id, event.order_id);
    }
}
