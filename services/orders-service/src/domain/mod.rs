mod order;

pub use order::{status_from_processed_event, Order, OrderItem, OrderStatus};
