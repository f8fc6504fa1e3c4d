//! Publisher trait for draining outbox rows onto the broker (§4.3/§4.4.2).
//!
//! The outbox row itself carries the target exchange and routing key
//! (§3), so — unlike a topic-inference scheme — the publisher needs no
//! mapping table: it just forwards the opaque payload to where the row
//! says it should go.

use crate::error::{OutboxError, OutboxResult};
use async_trait::async_trait;
use event_schema::OutboxMessage;
use messaging::BrokerClient;
use std::sync::Arc;

#[async_trait]
pub trait OutboxPublisher: Send + Sync {
    async fn publish(&self, row: &OutboxMessage) -> OutboxResult<()>;
}

pub struct AmqpOutboxPublisher {
    broker: Arc<BrokerClient>,
}

impl AmqpOutboxPublisher {
    pub fn new(broker: Arc<BrokerClient>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl OutboxPublisher for AmqpOutboxPublisher {
    async fn publish(&self, row: &OutboxMessage) -> OutboxResult<()> {
        self.broker
            .publish_raw(&row.exchange, &row.routing_key, &row.payload)
            .await
            .map_err(|e| OutboxError::PublishFailed(e.to_string()))
    }
}
