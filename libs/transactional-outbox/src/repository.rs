//! Outbox repository (§4.2): CRUD over outbox rows, claim-and-mark semantics.

use crate::error::{OutboxError, OutboxResult};
use async_trait::async_trait;
use chrono::Utc;
use event_schema::OutboxMessage;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert a new unpublished row. Must be called within the same
    /// transaction as the business-logic write it announces (§4.5).
    async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_type: &str,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> OutboxResult<OutboxMessage>;

    /// Rows where `published = false AND retry_count < max_retries`,
    /// oldest `created_at` first, capped at `limit`.
    async fn unpublished(&self, limit: i64, max_retries: i32) -> OutboxResult<Vec<OutboxMessage>>;

    async fn mark_published(&self, id: Uuid) -> OutboxResult<()>;

    async fn increment_retry(&self, id: Uuid) -> OutboxResult<()>;

    /// Pending count and age in seconds of the oldest pending row (0 if none).
    async fn pending_stats(&self) -> OutboxResult<(i64, i64)>;
}

pub struct SqlxOutboxRepository {
    pool: PgPool,
}

impl SqlxOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
    async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_type: &str,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> OutboxResult<OutboxMessage> {
        let row = OutboxMessage::new(
            event_type.to_string(),
            exchange.to_string(),
            routing_key.to_string(),
            payload.to_vec(),
        );

        sqlx::query(
            r#"
            INSERT INTO outbox_messages (
                id, event_type, exchange, routing_key, payload,
                published, published_at, retry_count, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(row.id)
        .bind(&row.event_type)
        .bind(&row.exchange)
        .bind(&row.routing_key)
        .bind(&row.payload)
        .bind(row.published)
        .bind(row.published_at)
        .bind(row.retry_count)
        .bind(row.created_at)
        .execute(&mut **tx)
        .await?;

        debug!(outbox_id = %row.id, event_type = %row.event_type, "outbox row inserted");

        Ok(row)
    }

    async fn unpublished(&self, limit: i64, max_retries: i32) -> OutboxResult<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, exchange, routing_key, payload,
                   published, published_at, retry_count, created_at
            FROM outbox_messages
            WHERE published = false AND retry_count < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(max_retries)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OutboxMessage {
                    id: row.try_get("id")?,
                    event_type: row.try_get("event_type")?,
                    exchange: row.try_get("exchange")?,
                    routing_key: row.try_get("routing_key")?,
                    payload: row.try_get("payload")?,
                    published: row.try_get("published")?,
                    published_at: row.try_get("published_at")?,
                    retry_count: row.try_get("retry_count")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(OutboxError::from)
    }

    async fn mark_published(&self, id: Uuid) -> OutboxResult<()> {
        let result = sqlx::query(
            "UPDATE outbox_messages SET published = true, published_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::RowNotFound(id));
        }
        Ok(())
    }

    async fn increment_retry(&self, id: Uuid) -> OutboxResult<()> {
        let result = sqlx::query("UPDATE outbox_messages SET retry_count = retry_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::RowNotFound(id));
        }
        Ok(())
    }

    async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        let rec = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS pending,
                COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(created_at)))::BIGINT, 0) AS age_seconds
            FROM outbox_messages
            WHERE published = false
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let pending: i64 = rec.try_get("pending")?;
        let age: i64 = rec.try_get("age_seconds")?;
        Ok((pending, age))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_does_not_connect() {
        let pool = PgPool::connect_lazy("postgres://localhost/test").unwrap();
        let _repo = SqlxOutboxRepository::new(pool);
    }
}
