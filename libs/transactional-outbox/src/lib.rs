//! # Transactional Outbox
//!
//! Guarantees at-least-once delivery of domain events across the
//! non-transactional boundary between the database and the message broker
//! (§4.3). A business-logic write and its outbox row are inserted in the
//! same database transaction; a background [`OutboxProcessor`] later drains
//! unpublished rows onto the broker and marks them published.
//!
//! This does not by itself guarantee exactly-once delivery to the broker —
//! the processor service's own `ProcessingRepository` is what turns
//! at-least-once delivery into effectively-once processing on the
//! consumer side (§4.6).

mod error;
pub mod metrics;
pub mod processor;
pub mod publisher;
pub mod repository;

pub use error::{OutboxError, OutboxResult};
pub use metrics::OutboxMetrics;
pub use processor::OutboxProcessor;
pub use publisher::{AmqpOutboxPublisher, OutboxPublisher};
pub use repository::{OutboxRepository, SqlxOutboxRepository};
