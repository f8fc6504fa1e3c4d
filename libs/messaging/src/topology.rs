//! Broker topology declaration (§4.4): durable topic exchanges for the two
//! event streams plus a single dead-letter exchange/queue pair.

use crate::config::BrokerConfig;
use crate::error::{MessagingError, MessagingResult};
use anyhow::Context;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};
use tracing::info;

/// Declare the exchanges and the DLX/DLQ pair. Consumer queues are declared
/// lazily by `consume()` since they depend on the stream being subscribed to.
pub async fn declare(channel: &Channel, config: &BrokerConfig) -> MessagingResult<()> {
    for exchange in [&config.order_created_exchange, &config.order_processed_exchange] {
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("declaring topic exchange")
            .map_err(MessagingError::ConnectionError)?;
    }

    channel
        .exchange_declare(
            &config.dlx_name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("declaring dead-letter exchange")
        .map_err(MessagingError::ConnectionError)?;

    channel
        .queue_declare(
            &config.dlq_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("declaring dead-letter queue")
        .map_err(MessagingError::ConnectionError)?;

    channel
        .queue_bind(
            &config.dlq_name,
            &config.dlx_name,
            "#",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("binding dead-letter queue to dead-letter exchange")
        .map_err(MessagingError::ConnectionError)?;

    info!(
        dlx = %config.dlx_name,
        dlq = %config.dlq_name,
        "broker topology declared"
    );

    Ok(())
}
