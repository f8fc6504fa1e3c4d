mod processing_repository;

pub use processing_repository::{ProcessingRepository, SqlxProcessingRepository};
