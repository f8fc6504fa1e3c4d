mod order_usecase;

pub use order_usecase::{OrderUseCase, OrderUseCaseConfig};
