//! Background outbox publisher (§4.3).
//!
//! Runs one polling loop per service instance (concurrency note, §4.3: a
//! second replica is a configuration error this design does not
//! coordinate against — document the single-replica expectation at
//! deploy time). `Start` is idempotent; `Stop` cancels the sleep promptly
//! but lets an in-flight publish finish first.

use crate::metrics::OutboxMetrics;
use crate::publisher::OutboxPublisher;
use crate::repository::OutboxRepository;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct OutboxProcessor<R: OutboxRepository, P: OutboxPublisher> {
    repository: Arc<R>,
    publisher: Arc<P>,
    batch_size: i64,
    poll_interval: Duration,
    max_retries: i32,
    metrics: Option<OutboxMetrics>,

    running: AtomicBool,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R: OutboxRepository + 'static, P: OutboxPublisher + 'static> OutboxProcessor<R, P> {
    pub fn new(
        repository: Arc<R>,
        publisher: Arc<P>,
        batch_size: i64,
        poll_interval: Duration,
        max_retries: i32,
    ) -> Self {
        Self {
            repository,
            publisher,
            batch_size,
            poll_interval,
            max_retries,
            metrics: None,
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn with_metrics(mut self, metrics: OutboxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start the background loop. A second call while already running logs
    /// a warning and returns without spawning a duplicate task.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("outbox processor already running, ignoring duplicate start");
            return;
        }

        info!(
            batch_size = self.batch_size,
            poll_interval_secs = self.poll_interval.as_secs(),
            max_retries = self.max_retries,
            "outbox processor starting"
        );

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_loop().await });

        *self.handle.lock().await = Some(handle);
    }

    /// Cancel the loop and await its completion. Cancellation during sleep
    /// breaks the loop promptly; cancellation mid-publish lets the current
    /// message finish to avoid losing a half-acked publish (§4.3).
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "outbox processor task panicked");
            }
        }
        info!("outbox processor stopped");
    }

    async fn run_loop(&self) {
        loop {
            match self.process_batch().await {
                Ok(count) if count > 0 => info!(published_count = count, "published outbox rows"),
                Ok(_) => debug!("no outbox rows to publish"),
                Err(e) => error!(error = %e, "outbox processor tick failed"),
            }

            if let Some(metrics) = &self.metrics {
                if let Ok((pending, age)) = self.repository.pending_stats().await {
                    metrics.pending.set(pending);
                    metrics.oldest_pending_age_seconds.set(age);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("outbox processor sleep interrupted by cancellation");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// One tick: select unpublished rows, dispatch each to the broker,
    /// commit progress row-by-row so a crash mid-batch loses nothing
    /// already marked.
    async fn process_batch(&self) -> anyhow::Result<i32> {
        let rows = match self.repository.unpublished(self.batch_size, self.max_retries).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "failed to fetch unpublished outbox rows");
                return Ok(0);
            }
        };

        let mut published_count = 0;

        for row in rows {
            match self.publisher.publish(&row).await {
                Ok(()) => match self.repository.mark_published(row.id).await {
                    Ok(()) => {
                        published_count += 1;
                        if let Some(metrics) = &self.metrics {
                            metrics.published.inc();
                        }
                    }
                    Err(e) => error!(
                        outbox_id = %row.id,
                        error = %e,
                        "published to broker but failed to mark row published; will republish on next tick"
                    ),
                },
                Err(e) => {
                    warn!(
                        outbox_id = %row.id,
                        event_type = %row.event_type,
                        retry_count = row.retry_count,
                        error = %e,
                        "failed to publish outbox row"
                    );
                    if let Err(inc_err) = self.repository.increment_retry(row.id).await {
                        error!(outbox_id = %row.id, error = %inc_err, "failed to increment retry count");
                    }
                }
            }
        }

        Ok(published_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OutboxResult;
    use async_trait::async_trait;
    use event_schema::OutboxMessage;
    use sqlx::{Postgres, Transaction};
    use tokio::sync::Mutex as TokioMutex;
    use uuid::Uuid;

    struct FakeRepo {
        rows: TokioMutex<Vec<OutboxMessage>>,
        published: TokioMutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl OutboxRepository for FakeRepo {
        async fn create(
            &self,
            _tx: &mut Transaction<'_, Postgres>,
            _event_type: &str,
            _exchange: &str,
            _routing_key: &str,
            _payload: &[u8],
        ) -> OutboxResult<OutboxMessage> {
            unimplemented!("not exercised by this test")
        }

        async fn unpublished(&self, limit: i64, _max_retries: i32) -> OutboxResult<Vec<OutboxMessage>> {
            let rows = self.rows.lock().await;
            Ok(rows.iter().take(limit as usize).cloned().collect())
        }

        async fn mark_published(&self, id: Uuid) -> OutboxResult<()> {
            self.published.lock().await.push(id);
            self.rows.lock().await.retain(|r| r.id != id);
            Ok(())
        }

        async fn increment_retry(&self, id: Uuid) -> OutboxResult<()> {
            let mut rows = self.rows.lock().await;
            if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
                row.retry_count += 1;
            }
            Ok(())
        }

        async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
            Ok((self.rows.lock().await.len() as i64, 0))
        }
    }

    struct AlwaysSucceedsPublisher;

    #[async_trait]
    impl OutboxPublisher for AlwaysSucceedsPublisher {
        async fn publish(&self, _row: &OutboxMessage) -> OutboxResult<()> {
            Ok(())
        }
    }

    struct AlwaysFailsPublisher;

    #[async_trait]
    impl OutboxPublisher for AlwaysFailsPublisher {
        async fn publish(&self, _row: &OutboxMessage) -> OutboxResult<()> {
            Err(crate::error::OutboxError::PublishFailed("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn process_batch_marks_successful_rows_published() {
        let row = OutboxMessage::new(
            "order.created".to_string(),
            "order.created".to_string(),
            "order.created".to_string(),
            b"{}".to_vec(),
        );
        let row_id = row.id;
        let repo = Arc::new(FakeRepo {
            rows: TokioMutex::new(vec![row]),
            published: TokioMutex::new(vec![]),
        });
        let publisher = Arc::new(AlwaysSucceedsPublisher);
        let processor = OutboxProcessor::new(repo.clone(), publisher, 10, Duration::from_secs(1), 5);

        let count = processor.process_batch().await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(*repo.published.lock().await, vec![row_id]);
        assert!(repo.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn process_batch_increments_retry_on_publish_failure() {
        let row = OutboxMessage::new(
            "order.created".to_string(),
            "order.created".to_string(),
            "order.created".to_string(),
            b"{}".to_vec(),
        );
        let row_id = row.id;
        let repo = Arc::new(FakeRepo {
            rows: TokioMutex::new(vec![row]),
            published: TokioMutex::new(vec![]),
        });
        let publisher = Arc::new(AlwaysFailsPublisher);
        let processor = OutboxProcessor::new(repo.clone(), publisher, 10, Duration::from_secs(1), 5);

        let count = processor.process_batch().await.unwrap();

        assert_eq!(count, 0);
        let rows = repo.rows.lock().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, row_id);
        assert_eq!(rows[0].retry_count, 1);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let repo = Arc::new(FakeRepo {
            rows: TokioMutex::new(vec![]),
            published: TokioMutex::new(vec![]),
        });
        let publisher = Arc::new(AlwaysSucceedsPublisher);
        let processor = Arc::new(OutboxProcessor::new(
            repo,
            publisher,
            10,
            Duration::from_millis(10),
            5,
        ));

        processor.start().await;
        processor.start().await; // should warn and return, not spawn a second loop

        processor.stop().await;
    }
}
