//! AMQP broker client: topology declaration, typed publishers, and the
//! consumer-side retry/DLQ state machine (§4.4).
//!
//! The broker connection is "robust" per §4.4: `connect()` retries with
//! exponential backoff so a transient connect failure at startup is not
//! fatal. `lapin` itself does not auto-reconnect a dropped connection —
//! unlike `aio_pika.connect_robust` in the original source — so `consume()`
//! supervises its own subscription: when the delivery stream ends for a
//! reason other than `cancel` firing, that means the connection (not just
//! the consumer) is gone, and `BrokerClient` reconnects and re-subscribes
//! rather than letting the consumer task exit silently.

pub mod config;
pub mod consumer;
mod error;
pub mod publisher;
mod topology;

pub use config::BrokerConfig;
pub use consumer::{HandlerResult, ProcessOutcome};
pub use error::{MessagingError, MessagingResult};

use anyhow::Context;
use event_schema::{OrderCreatedEvent, OrderProcessedEvent};
use lapin::{Channel, Connection, ConnectionProperties};
use resilience::{retry::with_retry, RetryError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct Session {
    connection: Connection,
    channel: Arc<Channel>,
}

/// Owns the AMQP connection/channel and exposes the operations the rest of
/// the system needs: typed publish, generic publish (for the outbox), and
/// subscribe-with-retry-semantics. The session is held behind a lock so
/// `consume()` can swap in a freshly reconnected connection/channel without
/// callers needing to know reconnection happened.
pub struct BrokerClient {
    session: RwLock<Session>,
    config: Arc<BrokerConfig>,
}

impl BrokerClient {
    /// Connect, retrying with backoff, declare the shared topology, and
    /// return a ready-to-use client.
    pub async fn connect(config: BrokerConfig) -> MessagingResult<Self> {
        let config = Arc::new(config);
        let session = Self::establish(&config).await?;

        info!(service = %config.service_name, "broker client connected");

        Ok(Self {
            session: RwLock::new(session),
            config,
        })
    }

    async fn establish(config: &BrokerConfig) -> MessagingResult<Session> {
        let retry_config = resilience::presets::broker_connect_config().retry.unwrap();

        let url = config.amqp_url.clone();
        let connection = with_retry(retry_config, || {
            let url = url.clone();
            async move {
                Connection::connect(&url, ConnectionProperties::default())
                    .await
                    .context("connecting to AMQP broker")
            }
        })
        .await
        .map_err(|e| match e {
            RetryError::MaxRetriesExceeded { attempts, source } => {
                MessagingError::ConnectionError(source.context(format!("exhausted {attempts} connection retries")))
            }
        })?;

        let channel = connection
            .create_channel()
            .await
            .context("opening AMQP channel")
            .map_err(MessagingError::ConnectionError)?;

        topology::declare(&channel, config).await?;

        Ok(Session {
            connection,
            channel: Arc::new(channel),
        })
    }

    /// Tear down the current session (best-effort) and establish a new one,
    /// redeclaring topology. Called by `consume()` when the delivery stream
    /// closes outside of a requested cancellation.
    async fn reconnect(&self) -> MessagingResult<()> {
        warn!(service = %self.config.service_name, "broker connection lost, reconnecting");

        let new_session = Self::establish(&self.config).await?;

        let mut session = self.session.write().await;
        if let Err(e) = session.channel.close(200, "reconnecting").await {
            warn!(error = %e, "error closing stale channel during reconnect");
        }
        if let Err(e) = session.connection.close(200, "reconnecting").await {
            warn!(error = %e, "error closing stale connection during reconnect");
        }
        *session = new_session;

        info!(service = %self.config.service_name, "broker reconnected and topology redeclared");
        Ok(())
    }

    async fn channel(&self) -> Arc<Channel> {
        self.session.read().await.channel.clone()
    }

    pub async fn publish_order_created(&self, event: &OrderCreatedEvent) -> MessagingResult<()> {
        let channel = self.channel().await;
        publisher::publish_order_created(&channel, &self.config, event).await
    }

    pub async fn publish_order_processed(&self, event: &OrderProcessedEvent) -> MessagingResult<()> {
        let channel = self.channel().await;
        publisher::publish_order_processed(&channel, &self.config, event).await
    }

    /// Publish an opaque, already-serialized payload to an arbitrary
    /// exchange/routing key. Used by the outbox publisher, which dispatches
    /// by `event_type` but otherwise treats the payload as bytes (§4.3).
    pub async fn publish_raw(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> anyhow::Result<()> {
        let channel = self.channel().await;
        publisher::publish_raw(&channel, exchange, routing_key, payload).await
    }

    /// Subscribe `queue_name` to `exchange`/`routing_key`, running `handler`
    /// for each delivery and routing failures through the retry/DLQ ladder
    /// until `cancel` fires. If the underlying connection drops mid-stream,
    /// reconnects and re-subscribes instead of returning — the caller only
    /// sees this method return once `cancel` fires or reconnection itself
    /// fails.
    pub async fn consume<F, Fut>(
        &self,
        queue_name: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        stream: impl Into<String>,
        handler: F,
        cancel: CancellationToken,
    ) -> MessagingResult<()>
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = HandlerResult> + Send,
    {
        let queue_name = queue_name.into();
        let exchange = exchange.into();
        let routing_key = routing_key.into();
        let stream = stream.into();

        loop {
            let channel = self.channel().await;
            consumer::consume(
                channel,
                self.config.clone(),
                queue_name.clone(),
                exchange.clone(),
                routing_key.clone(),
                stream.clone(),
                handler.clone(),
                cancel.clone(),
            )
            .await?;

            if cancel.is_cancelled() {
                return Ok(());
            }

            self.reconnect().await?;
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Gracefully disconnect, per the lifecycle's shutdown order (§4.7).
    pub async fn disconnect(self) -> MessagingResult<()> {
        let session = self.session.into_inner();
        session
            .channel
            .close(200, "shutting down")
            .await
            .context("closing AMQP channel")
            .map_err(MessagingError::ConnectionError)?;
        session
            .connection
            .close(200, "shutting down")
            .await
            .context("closing AMQP connection")
            .map_err(MessagingError::ConnectionError)?;
        Ok(())
    }
}

pub(crate) fn parse_env_with_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
