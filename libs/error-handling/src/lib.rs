//! Shared error taxonomy for the order-processing services
//!
//! Provides the domain error kinds referenced across the orders and
//! processor services plus a uniform HTTP-facing response shape. Crates
//! closer to a single concern (the outbox, the broker client) define their
//! own narrower error enums and convert into `ServiceError` at the
//! use-case boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Standard error response body returned by both services' HTTP surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub code: String,
    pub timestamp: String,
}

/// Errors raised by repository implementations (§7: `RepositoryError`).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("row not found: {0}")]
    NotFound(String),
}

/// Errors raised by the unit-of-work primitive (§7: `UnitOfWorkError`).
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] sqlx::Error),

    #[error("failed to commit transaction: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("failed to roll back transaction: {0}")]
    Rollback(#[source] sqlx::Error),

    /// The closure's own error, propagated unchanged after rollback.
    #[error(transparent)]
    Domain(#[from] anyhow::Error),
}

/// Top-level domain error used by the order use-case and HTTP handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("order creation failed: {0}")]
    OrderCreation(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::OrderNotFound(_) => 404,
            ServiceError::OrderCreation(_) => 400,
            ServiceError::Repository(_) | ServiceError::UnitOfWork(_) | ServiceError::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            ServiceError::OrderCreation(_) => "ORDER_CREATION_ERROR",
            ServiceError::Repository(_) => "REPOSITORY_ERROR",
            ServiceError::UnitOfWork(_) => "UNIT_OF_WORK_ERROR",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            status: self.status_code(),
            code: self.code().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => {
                ServiceError::Repository(RepositoryError::NotFound("row not found".to_string()))
            }
            other => ServiceError::Repository(RepositoryError::Database(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_not_found_maps_to_404() {
        let err = ServiceError::OrderNotFound(Uuid::nil());
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.code(), "ORDER_NOT_FOUND");
    }

    #[test]
    fn order_creation_maps_to_400() {
        let err = ServiceError::OrderCreation("empty product list".to_string());
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn repository_error_maps_to_500() {
        let err: ServiceError =
            RepositoryError::NotFound("outbox row".to_string()).into();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn to_response_carries_code_and_status() {
        let err = ServiceError::OrderNotFound(Uuid::nil());
        let resp = err.to_response();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.code, "ORDER_NOT_FOUND");
    }
}
