//! The idempotence kernel (§4.6): turns at-least-once delivery of
//! `order.created` into an effectively-once state transition plus a
//! published `order.processed` outcome.

use std::sync::Arc;

use event_schema::{OrderCreatedEvent, OrderProcessedEvent, ProcessedStatus};
use messaging::BrokerClient;
use rand::Rng;
use tracing::{info, warn};
use unit_of_work::UnitOfWork;

use crate::domain::{ProcessingDecision, ProcessingStatus};
use crate::error::ProcessingError;
use crate::repository::ProcessingRepository;

pub struct ProcessingUseCaseConfig {
    pub success_rate: f64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

pub struct ProcessingUseCase<R: ProcessingRepository> {
    uow: Arc<UnitOfWork>,
    processing: Arc<R>,
    broker: Arc<BrokerClient>,
    config: ProcessingUseCaseConfig,
}

impl<R: ProcessingRepository + 'static> ProcessingUseCase<R> {
    pub fn new(
        uow: Arc<UnitOfWork>,
        processing: Arc<R>,
        broker: Arc<BrokerClient>,
        config: ProcessingUseCaseConfig,
    ) -> Self {
        Self {
            uow,
            processing,
            broker,
            config,
        }
    }

    /// `Process(OrderCreatedEvent)` (§4.6). Called once per delivered
    /// message; safe to call any number of times for the same `order_id`.
    pub async fn process(&self, event: OrderCreatedEvent) -> Result<(), ProcessingError> {
        let order_id = event.order_id;

        let processing = self.processing.clone();
        let decision = self
            .uow
            .execute(move |tx| async move { processing.begin_processing(tx, order_id).await.map_err(Into::into) })
            .await?;

        match decision {
            ProcessingDecision::AlreadyTerminal => {
                info!(order_id = %order_id, "order already processed to a terminal state, skipping");
                return Ok(());
            }
            ProcessingDecision::AlreadyInFlight => {
                // begin_processing already logged the duplicate warning.
                return Ok(());
            }
            ProcessingDecision::Started(_) => {}
        }

        let success = simulate_work(self.config.success_rate, self.config.min_delay_ms, self.config.max_delay_ms).await;

        let (status, error_message) = if success {
            (ProcessingStatus::Success, None)
        } else {
            (ProcessingStatus::Failed, Some("Simulated processing failure".to_string()))
        };

        {
            let processing = self.processing.clone();
            let error_message = error_message.clone();
            self.uow
                .execute(move |tx| async move {
                    processing
                        .finish_processing(tx, order_id, status, error_message)
                        .await
                        .map_err(Into::into)
                })
                .await?;
        }

        let processed_status = match status {
            ProcessingStatus::Success => ProcessedStatus::Success,
            _ => ProcessedStatus::Failed,
        };
        let outcome = OrderProcessedEvent {
            order_id,
            status: processed_status,
            error_message: error_message.clone(),
            processed_at: chrono::Utc::now(),
        };

        if let Err(publish_err) = self.broker.publish_order_processed(&outcome).await {
            warn!(order_id = %order_id, error = %publish_err, "failed to publish order.processed, marking FAILED");

            let failure_message = format!("publish failed: {publish_err}");
            let processing = self.processing.clone();
            let retry_result = self
                .uow
                .execute(move |tx| async move {
                    processing
                        .finish_processing(tx, order_id, ProcessingStatus::Failed, Some(failure_message))
                        .await
                        .map_err(Into::into)
                })
                .await;
            if let Err(e) = retry_result {
                warn!(order_id = %order_id, error = %e, "failed to mark order FAILED after publish failure");
            }

            // Best-effort failure publish; swallow a second broker error (§4.6 step 5).
            let failure_outcome = OrderProcessedEvent {
                order_id,
                status: ProcessedStatus::Failed,
                error_message: Some("processing outcome publish failed".to_string()),
                processed_at: chrono::Utc::now(),
            };
            if let Err(e) = self.broker.publish_order_processed(&failure_outcome).await {
                warn!(order_id = %order_id, error = %e, "best-effort failure publish also failed, swallowing");
            }

            return Err(ProcessingError::PublishFailed {
                order_id,
                source: publish_err.into(),
            });
        }

        info!(order_id = %order_id, status = processed_status.as_str(), "order processed");
        Ok(())
    }

    /// Sweep PROCESSING rows older than the configured grace period back to
    /// PENDING (§9 open question), run once before the consumer subscribes.
    pub async fn recover_stale_processing(&self, grace_period_secs: i64) -> Result<u64, ProcessingError> {
        let reset = self
            .processing
            .reset_stale_processing(chrono::Duration::seconds(grace_period_secs))
            .await?;
        if reset > 0 {
            warn!(count = reset, "reset stale PROCESSING rows back to PENDING at startup");
        }
        Ok(reset)
    }
}

async fn simulate_work(success_rate: f64, min_delay_ms: u64, max_delay_ms: u64) -> bool {
    let delay_ms = if max_delay_ms > min_delay_ms {
        rand::thread_rng().gen_range(min_delay_ms..=max_delay_ms)
    } else {
        min_delay_ms
    };
    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
    rand::thread_rng().gen_bool(success_rate.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulate_work_always_succeeds_at_rate_one() {
        assert!(simulate_work(1.0, 1, 2).await);
    }

    #[tokio::test]
    async fn simulate_work_always_fails_at_rate_zero() {
        assert!(!simulate_work(0.0, 1, 2).await);
    }
}
