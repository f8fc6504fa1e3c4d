//! Consumer-side retry/DLQ state machine (§4.4.1).
//!
//! Redelivery is implemented entirely with broker-native primitives: a
//! failing message is republished to a lazily-declared, TTL-bound "retry
//! queue" that dead-letters back to the original exchange/routing key once
//! the TTL expires. The consumer therefore always sees retried messages on
//! the same queue it originally subscribed to.

use crate::config::BrokerConfig;
use crate::error::{MessagingError, MessagingResult};
use anyhow::Context;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of running the handler against one delivered message.
pub enum ProcessOutcome {
    /// Payload could not be parsed (non-UTF-8 / malformed JSON). Poison
    /// message: routed straight to the DLX, never retried.
    Decode(String),
    /// Domain or transient failure: eligible for the retry/DLQ ladder.
    Transient(anyhow::Error),
    /// Validation / programmer error: logged and acked, no retry, no DLQ.
    Validation(anyhow::Error),
}

pub type HandlerResult = Result<(), ProcessOutcome>;

const RETRY_COUNT_HEADER: &str = "x-retry-count";
const ORIGINAL_ROUTING_KEY_HEADER: &str = "x-original-routing-key";
const FAILURE_REASON_HEADER: &str = "x-failure-reason";

fn retry_count_of(properties: &BasicProperties) -> u32 {
    properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get(RETRY_COUNT_HEADER))
        .and_then(|value| match value {
            AMQPValue::LongInt(v) => Some(*v as u32),
            AMQPValue::LongLongInt(v) => Some(*v as u32),
            AMQPValue::ShortInt(v) => Some(*v as u32),
            _ => None,
        })
        .unwrap_or(0)
}

/// Subscribe `channel` to `exchange`/`routing_key` via a durable queue named
/// `queue_name`, running `handler` for every delivery until `cancel` fires.
#[allow(clippy::too_many_arguments)]
pub async fn consume<F, Fut>(
    channel: Arc<Channel>,
    config: Arc<BrokerConfig>,
    queue_name: String,
    exchange: String,
    routing_key: String,
    stream: String,
    handler: F,
    cancel: CancellationToken,
) -> MessagingResult<()>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send,
{
    use futures::StreamExt;

    let mut queue_args = FieldTable::default();
    queue_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(config.dlx_name.clone().into()),
    );

    channel
        .queue_declare(
            &queue_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            queue_args,
        )
        .await
        .context("declaring consumer queue")
        .map_err(|e| MessagingError::SubscriptionError {
            queue: queue_name.clone(),
            source: e,
        })?;

    channel
        .queue_bind(
            &queue_name,
            &exchange,
            &routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("binding consumer queue")
        .map_err(|e| MessagingError::SubscriptionError {
            queue: queue_name.clone(),
            source: e,
        })?;

    let mut consumer = channel
        .basic_consume(
            &queue_name,
            &format!("{}-consumer", config.service_name),
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("starting consumer")
        .map_err(|e| MessagingError::SubscriptionError {
            queue: queue_name.clone(),
            source: e,
        })?;

    info!(queue = %queue_name, "consumer subscribed");

    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => {
                info!(queue = %queue_name, "consumer cancellation requested, stopping");
                return Ok(());
            }
            next = consumer.next() => next,
        };

        let Some(delivery) = delivery else {
            info!(queue = %queue_name, "consumer stream closed");
            return Ok(());
        };

        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(queue = %queue_name, error = %e, "error receiving delivery");
                continue;
            }
        };

        let retry_count = retry_count_of(&delivery.properties);
        let payload = delivery.data.clone();

        let outcome = handler(payload).await;

        match outcome {
            Ok(()) => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!(queue = %queue_name, error = %e, "failed to ack successfully processed message");
                }
            }
            Err(ProcessOutcome::Decode(reason)) => {
                warn!(queue = %queue_name, reason = %reason, "poison message, routing to DLX");
                if let Err(e) =
                    publish_to_dlx(&channel, &config, &routing_key, &delivery.data, &reason).await
                {
                    error!(queue = %queue_name, error = %e, "failed to publish poison message to DLX");
                }
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!(queue = %queue_name, error = %e, "failed to ack poison message");
                }
            }
            Err(ProcessOutcome::Validation(err)) => {
                warn!(queue = %queue_name, error = %err, "validation error, dropping (no retry, no DLQ)");
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!(queue = %queue_name, error = %e, "failed to ack validation-error message");
                }
            }
            Err(ProcessOutcome::Transient(err)) => {
                if retry_count < config.max_retry_attempts {
                    let next_retry = retry_count + 1;
                    warn!(
                        queue = %queue_name,
                        retry_count = retry_count,
                        next_retry = next_retry,
                        error = %err,
                        "transient error, routing to retry queue"
                    );
                    if let Err(e) = publish_to_retry_queue(
                        &channel,
                        &config,
                        &stream,
                        &exchange,
                        &routing_key,
                        next_retry,
                        &delivery.data,
                    )
                    .await
                    {
                        error!(queue = %queue_name, error = %e, "failed to route message to retry queue");
                    }
                } else {
                    warn!(
                        queue = %queue_name,
                        retry_count = retry_count,
                        max = config.max_retry_attempts,
                        error = %err,
                        "retry ceiling reached, routing to DLX"
                    );
                    if let Err(e) = publish_to_dlx(
                        &channel,
                        &config,
                        &routing_key,
                        &delivery.data,
                        &err.to_string(),
                    )
                    .await
                    {
                        error!(queue = %queue_name, error = %e, "failed to publish exhausted message to DLX");
                    }
                }
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!(queue = %queue_name, error = %e, "failed to ack transient-error message");
                }
            }
        }
    }
}

async fn publish_to_dlx(
    channel: &Channel,
    config: &BrokerConfig,
    original_routing_key: &str,
    payload: &[u8],
    failure_reason: &str,
) -> anyhow::Result<()> {
    let mut headers = FieldTable::default();
    headers.insert(
        ORIGINAL_ROUTING_KEY_HEADER.into(),
        AMQPValue::LongString(original_routing_key.to_string().into()),
    );
    headers.insert(
        FAILURE_REASON_HEADER.into(),
        AMQPValue::LongString(failure_reason.to_string().into()),
    );

    let properties = BasicProperties::default()
        .with_delivery_mode(2)
        .with_headers(headers);

    channel
        .basic_publish(
            &config.dlx_name,
            original_routing_key,
            BasicPublishOptions::default(),
            payload,
            properties,
        )
        .await
        .context("publishing to DLX")?
        .await
        .context("awaiting DLX publish confirmation")?;

    Ok(())
}

/// Declare (idempotently) and publish into the per-level retry queue,
/// named `<service>_<stream>_retry_<n>` per §4.4.1.
async fn publish_to_retry_queue(
    channel: &Channel,
    config: &BrokerConfig,
    stream: &str,
    original_exchange: &str,
    original_routing_key: &str,
    next_retry: u32,
    payload: &[u8],
) -> anyhow::Result<()> {
    let retry_queue = format!("{}_{}_retry_{}", config.service_name, stream, next_retry);
    let ttl_ms = config.backoff_ms(next_retry - 1);

    let mut args = FieldTable::default();
    args.insert("x-message-ttl".into(), AMQPValue::LongInt(ttl_ms as i32));
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(original_exchange.to_string().into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(original_routing_key.to_string().into()),
    );

    channel
        .queue_declare(
            &retry_queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            args,
        )
        .await
        .context("declaring retry queue")?;

    let mut headers = FieldTable::default();
    headers.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongInt(next_retry as i32));

    let properties = BasicProperties::default()
        .with_delivery_mode(2)
        .with_headers(headers);

    channel
        .basic_publish(
            "",
            &retry_queue,
            BasicPublishOptions::default(),
            payload,
            properties,
        )
        .await
        .context("publishing to retry queue")?
        .await
        .context("awaiting retry queue publish confirmation")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_queue_name_matches_convention() {
        let service = "processor-service";
        let stream = "order_created";
        let next_retry = 2;
        let name = format!("{}_{}_retry_{}", service, stream, next_retry);
        assert_eq!(name, "processor-service_order_created_retry_2");
    }
}
