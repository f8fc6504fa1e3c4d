//! Scoped-transaction primitive (§4.1).
//!
//! `UnitOfWork` is the only place application code opens a database
//! transaction. Repositories handed a `&mut Transaction` inside the closure
//! share that connection and never commit on their own — commit/rollback is
//! always driven by `UnitOfWork::execute`, on every exit path.

use error_handling::UnitOfWorkError;
use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;

/// Wraps a Postgres pool and runs closures inside a single transaction.
#[derive(Clone)]
pub struct UnitOfWork {
    pool: PgPool,
}

impl UnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run `f` against a freshly-opened transaction. Commits on `Ok`, rolls
    /// back on `Err` and propagates the closure's own error unchanged.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, UnitOfWorkError>
    where
        F: FnOnce(&mut Transaction<'static, Postgres>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut tx = self.pool.begin().await.map_err(UnitOfWorkError::Begin)?;

        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await.map_err(UnitOfWorkError::Commit)?;
                Ok(value)
            }
            Err(domain_err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback failed after domain error, connection likely poisoned");
                    return Err(UnitOfWorkError::Rollback(rollback_err));
                }
                Err(UnitOfWorkError::Domain(domain_err))
            }
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_does_not_connect() {
        // connect_lazy defers the actual connection, so this never touches
        // the network — it only verifies the DSN parses.
        let pool = PgPool::connect_lazy("postgres://localhost/test").unwrap();
        let _uow = UnitOfWork::new(pool);
    }
}
