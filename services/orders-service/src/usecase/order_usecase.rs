//! Order use-case (§4.5): the write path and the status-update-from-event
//! read path.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use error_handling::ServiceError;
use event_schema::{OrderCreatedEvent, ProductItem};
use tracing::info;
use transactional_outbox::OutboxRepository;
use unit_of_work::UnitOfWork;
use uuid::Uuid;

use crate::domain::{status_from_processed_event, Order, OrderItem, OrderStatus};
use crate::repository::OrderRepository;

/// Target exchange/routing key for `order.created`, injected from config
/// rather than hard-coded (§9 "Global configuration").
pub struct OrderUseCaseConfig {
    pub order_created_exchange: String,
    pub order_created_routing_key: String,
}

pub struct OrderUseCase<OR: OrderRepository, OB: OutboxRepository> {
    uow: Arc<UnitOfWork>,
    orders: Arc<OR>,
    outbox: Arc<OB>,
    config: OrderUseCaseConfig,
}

impl<OR: OrderRepository + 'static, OB: OutboxRepository + 'static> OrderUseCase<OR, OB> {
    pub fn new(uow: Arc<UnitOfWork>, orders: Arc<OR>, outbox: Arc<OB>, config: OrderUseCaseConfig) -> Self {
        Self {
            uow,
            orders,
            outbox,
            config,
        }
    }

    /// `CreateOrder(payload) -> Order` (§4.5). Validation (non-empty product
    /// list, per §9) happens before the UoW is opened, so a 400 is returned
    /// without ever touching the database.
    pub async fn create_order(
        &self,
        customer_id: String,
        products: Vec<ProductItem>,
        amount: BigDecimal,
    ) -> Result<Order, ServiceError> {
        if products.is_empty() {
            return Err(ServiceError::OrderCreation(
                "order must contain at least one product".to_string(),
            ));
        }

        let items: Vec<OrderItem> = products
            .iter()
            .map(|p| OrderItem {
                product_id: p.product_id.clone(),
                quantity: p.quantity as i32,
                price: BigDecimal::from(0), // price is not part of the wire request; §3 models it as owned by the order line, populated here as zero pending a pricing service this spec does not define.
            })
            .collect();

        let orders = self.orders.clone();
        let outbox = self.outbox.clone();
        let exchange = self.config.order_created_exchange.clone();
        let routing_key = self.config.order_created_routing_key.clone();

        let order = self
            .uow
            .execute(move |tx| {
                async move {
                    let order = orders.insert(tx, &customer_id, amount, &items).await?;

                    let event = OrderCreatedEvent {
                        order_id: order.id,
                        user_id: customer_id,
                        products: products_from_items(&order.items),
                        amount: order.amount.clone(),
                        created_at: order.created_at,
                    };
                    let payload = serde_json::to_vec(&event)?;

                    outbox
                        .create(tx, "order.created", &exchange, &routing_key, &payload)
                        .await?;

                    Ok(order)
                }
            })
            .await?;

        info!(order_id = %order.id, "order created");
        Ok(order)
    }

    /// `GetOrderStatus(id) -> Order` (§4.5): read-through the repository.
    pub async fn get_order_status(&self, id: Uuid) -> Result<Order, ServiceError> {
        self.orders.find_by_id(id).await
    }

    /// `UpdateOrderStatusFromEvent` (§4.5): maps the processor's terminal
    /// status onto this service's `OrderStatus` and persists inside a UoW.
    pub async fn update_order_status_from_event(
        &self,
        order_id: Uuid,
        external_status: &str,
    ) -> Result<(), ServiceError> {
        let new_status = status_from_processed_event(external_status);
        let orders = self.orders.clone();

        self.uow
            .execute(move |tx| {
                let orders = orders.clone();
                async move { orders.update_status(tx, order_id, new_status).await.map_err(Into::into) }
            })
            .await?;

        Ok(())
    }
}

fn products_from_items(items: &[OrderItem]) -> Vec<ProductItem> {
    items
        .iter()
        .map(|item| ProductItem {
            product_id: item.product_id.clone(),
            quantity: item.quantity as u32,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn products_from_items_round_trips_quantity() {
        let items = vec![OrderItem {
            product_id: "p1".to_string(),
            quantity: 2,
            price: BigDecimal::from(0),
        }];
        let products = products_from_items(&items);
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product_id, "p1");
        assert_eq!(products[0].quantity, 2);
    }
}
