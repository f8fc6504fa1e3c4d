mod processing_usecase;

pub use processing_usecase::{ProcessingUseCase, ProcessingUseCaseConfig};
