pub mod config;
pub mod consumer;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod repository;
pub mod usecase;
