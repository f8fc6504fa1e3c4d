mod processing;

pub use processing::{OrderProcessing, ProcessingDecision, ProcessingStatus};
