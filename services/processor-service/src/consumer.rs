//! Subscribes to `order.created` and runs each delivery through
//! `ProcessingUseCase::process` (§4.6, §4.7).

use std::sync::Arc;

use event_schema::OrderCreatedEvent;
use messaging::{BrokerClient, MessagingError, ProcessOutcome};
use tokio_util::sync::CancellationToken;

use crate::error::ProcessingError;
use crate::repository::ProcessingRepository;
use crate::usecase::ProcessingUseCase;

pub async fn start<R>(
    broker: Arc<BrokerClient>,
    usecase: Arc<ProcessingUseCase<R>>,
    cancel: CancellationToken,
) -> Result<(), MessagingError>
where
    R: ProcessingRepository + 'static,
{
    let config = broker.config().clone();
    let exchange = config.order_created_exchange.clone();
    let routing_key = config.order_created_routing_key.clone();

    broker
        .consume(
            "processor-service_order_created",
            exchange,
            routing_key,
            "order_created",
            move |payload| {
                let usecase = usecase.clone();
                async move { handle(usecase, payload).await }
            },
            cancel,
        )
        .await
}

/// Every non-decode failure is routed to the transient/retry path: a
/// `ProcessingError` here means either infrastructure flaked (genuinely
/// transient) or the outcome publish failed after our own state was
/// already committed, which the broker's retry ladder exists to cover
/// (§4.6 step 5, §7).
async fn handle<R>(usecase: Arc<ProcessingUseCase<R>>, payload: Vec<u8>) -> Result<(), ProcessOutcome>
where
    R: ProcessingRepository + 'static,
{
    let event: OrderCreatedEvent = serde_json::from_slice(&payload)
        .map_err(|e| ProcessOutcome::Decode(format!("malformed order.created payload: {e}")))?;

    usecase.process(event).await.map_err(|e| {
        if matches!(&e, ProcessingError::CorruptState(_)) {
            ProcessOutcome::Validation(e.into())
        } else {
            ProcessOutcome::Transient(e.into())
        }
    })
}
