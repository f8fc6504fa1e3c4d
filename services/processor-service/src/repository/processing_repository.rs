//! Persistence for `OrderProcessing` (§3, §4.6). `begin_processing` and
//! `finish_processing` must run inside a UoW-managed transaction;
//! `reset_stale_processing` runs against the pool directly at startup.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use error_handling::RepositoryError;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::warn;
use uuid::Uuid;

use crate::domain::{OrderProcessing, ProcessingDecision, ProcessingStatus};
use crate::error::ProcessingError;

#[async_trait]
pub trait ProcessingRepository: Send + Sync {
    /// Locks (or creates) the row for `order_id` and applies §4.6 step 2's
    /// decision: no-op on a terminal or in-flight record, else transition
    /// to PROCESSING and return the fresh record.
    async fn begin_processing(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> Result<ProcessingDecision, ProcessingError>;

    /// Transition `order_id` to a terminal status (§4.6 step 4/5).
    async fn finish_processing(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        status: ProcessingStatus,
        error_message: Option<String>,
    ) -> Result<(), ProcessingError>;

    /// Reset PROCESSING rows older than `grace_period` back to PENDING
    /// (§9's open question: recovery of crashed in-flight records), run
    /// once at startup before subscribing. Returns the number reset.
    async fn reset_stale_processing(&self, grace_period: Duration) -> Result<u64, ProcessingError>;
}

pub struct SqlxProcessingRepository {
    pool: PgPool,
}

impl SqlxProcessingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_processing(
    order_id: Uuid,
    status: String,
    error_message: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> Result<OrderProcessing, ProcessingError> {
    let status = status
        .parse::<ProcessingStatus>()
        .map_err(ProcessingError::CorruptState)?;
    Ok(OrderProcessing {
        order_id,
        status,
        error_message,
        processed_at,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl ProcessingRepository for SqlxProcessingRepository {
    async fn begin_processing(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> Result<ProcessingDecision, ProcessingError> {
        let existing = sqlx::query(
            "SELECT status FROM order_processing WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(RepositoryError::Database)?;

        let current_status = match existing {
            Some(row) => {
                let status: String = row.try_get("status").map_err(RepositoryError::Database)?;
                Some(status.parse::<ProcessingStatus>().map_err(ProcessingError::CorruptState)?)
            }
            None => None,
        };

        match current_status {
            Some(status) if status.is_terminal() => Ok(ProcessingDecision::AlreadyTerminal),
            Some(ProcessingStatus::Processing) => {
                warn!(order_id = %order_id, "possible duplicate delivery: order already PROCESSING");
                Ok(ProcessingDecision::AlreadyInFlight)
            }
            Some(ProcessingStatus::Pending) => {
                let now = Utc::now();
                let row = sqlx::query(
                    r#"
                    UPDATE order_processing
                    SET status = $2, updated_at = $3
                    WHERE order_id = $1
                    RETURNING order_id, status, error_message, processed_at, created_at, updated_at
                    "#,
                )
                .bind(order_id)
                .bind(ProcessingStatus::Processing.as_str())
                .bind(now)
                .fetch_one(&mut **tx)
                .await
                .map_err(RepositoryError::Database)?;

                let record = row_to_processing(
                    row.try_get("order_id").map_err(RepositoryError::Database)?,
                    row.try_get("status").map_err(RepositoryError::Database)?,
                    row.try_get("error_message").map_err(RepositoryError::Database)?,
                    row.try_get("processed_at").map_err(RepositoryError::Database)?,
                    row.try_get("created_at").map_err(RepositoryError::Database)?,
                    row.try_get("updated_at").map_err(RepositoryError::Database)?,
                )?;
                Ok(ProcessingDecision::Started(record))
            }
            None => {
                let now = Utc::now();
                let row = sqlx::query(
                    r#"
                    INSERT INTO order_processing (order_id, status, created_at, updated_at)
                    VALUES ($1, $2, $3, $3)
                    RETURNING order_id, status, error_message, processed_at, created_at, updated_at
                    "#,
                )
                .bind(order_id)
                .bind(ProcessingStatus::Processing.as_str())
                .bind(now)
                .fetch_one(&mut **tx)
                .await
                .map_err(RepositoryError::Database)?;

                let record = row_to_processing(
                    row.try_get("order_id").map_err(RepositoryError::Database)?,
                    row.try_get("status").map_err(RepositoryError::Database)?,
                    row.try_get("error_message").map_err(RepositoryError::Database)?,
                    row.try_get("processed_at").map_err(RepositoryError::Database)?,
                    row.try_get("created_at").map_err(RepositoryError::Database)?,
                    row.try_get("updated_at").map_err(RepositoryError::Database)?,
                )?;
                Ok(ProcessingDecision::Started(record))
            }
        }
    }

    async fn finish_processing(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        status: ProcessingStatus,
        error_message: Option<String>,
    ) -> Result<(), ProcessingError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE order_processing
            SET status = $2, error_message = $3, processed_at = $4, updated_at = $4
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(status.as_str())
        .bind(&error_message)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(RepositoryError::Database)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("order_processing for {order_id}")).into());
        }
        Ok(())
    }

    async fn reset_stale_processing(&self, grace_period: Duration) -> Result<u64, ProcessingError> {
        let cutoff = Utc::now() - grace_period;
        let result = sqlx::query(
            r#"
            UPDATE order_processing
            SET status = $2, updated_at = NOW()
            WHERE status = $1 AND updated_at < $3
            "#,
        )
        .bind(ProcessingStatus::Processing.as_str())
        .bind(ProcessingStatus::Pending.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::Database)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_does_not_connect() {
        let pool = PgPool::connect_lazy("postgres://localhost/test").unwrap();
        let _repo = SqlxProcessingRepository::new(pool);
    }
}
