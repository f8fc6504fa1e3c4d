//! Typed publish helpers (§4.4.2). Serialize the event to JSON, publish with
//! persistent delivery mode, and wrap transport failures into
//! `MessagingError::MessagePublishError` carrying the affected `order_id`.

use crate::config::BrokerConfig;
use crate::error::{MessagingError, MessagingResult};
use anyhow::Context;
use event_schema::{OrderCreatedEvent, OrderProcessedEvent};
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel};

pub async fn publish_order_created(
    channel: &Channel,
    config: &BrokerConfig,
    event: &OrderCreatedEvent,
) -> MessagingResult<()> {
    let payload = serde_json::to_vec(event)
        .context("serializing order.created event")
        .map_err(|e| MessagingError::MessagePublishError {
            order_id: event.order_id,
            source: e,
        })?;

    publish_raw(
        channel,
        &config.order_created_exchange,
        &config.order_created_routing_key,
        &payload,
    )
    .await
    .map_err(|e| MessagingError::MessagePublishError {
        order_id: event.order_id,
        source: e,
    })
}

pub async fn publish_order_processed(
    channel: &Channel,
    config: &BrokerConfig,
    event: &OrderProcessedEvent,
) -> MessagingResult<()> {
    let payload = serde_json::to_vec(event)
        .context("serializing order.processed event")
        .map_err(|e| MessagingError::MessagePublishError {
            order_id: event.order_id,
            source: e,
        })?;

    publish_raw(
        channel,
        &config.order_processed_exchange,
        &config.order_processed_routing_key,
        &payload,
    )
    .await
    .map_err(|e| MessagingError::MessagePublishError {
        order_id: event.order_id,
        source: e,
    })
}

/// Publish an already-serialized payload, used by the outbox publisher
/// which only knows about opaque bytes (§4.3).
pub async fn publish_raw(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    let properties = BasicProperties::default().with_delivery_mode(2);

    channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            payload,
            properties,
        )
        .await
        .context("publishing message")?
        .await
        .context("awaiting publish confirmation")?;

    Ok(())
}
