//! Processor-specific error kinds (§7: `ProcessingError` alongside the
//! shared `RepositoryError`/`UnitOfWorkError` from `error-handling`).

use error_handling::{RepositoryError, UnitOfWorkError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),

    /// Publishing `order.processed` failed after the terminal state was
    /// already committed (§4.6 step 5) — the broker's own retry/DLQ ladder
    /// must pick this up, since our own state is already correct.
    #[error("failed to publish order.processed for order {order_id}: {source}")]
    PublishFailed {
        order_id: Uuid,
        #[source]
        source: anyhow::Error,
    },

    #[error("corrupt processing status in storage: {0}")]
    CorruptState(String),
}
