//! Error types for the transactional outbox library.

use thiserror::Error;
use uuid::Uuid;

pub type OutboxResult<T> = Result<T, OutboxError>;

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("outbox row not found: {0}")]
    RowNotFound(Uuid),

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("outbox error: {0}")]
    Other(#[from] anyhow::Error),
}
