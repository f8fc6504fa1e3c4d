//! Persistence for the `Order` aggregate (§3, §4.1).
//!
//! `insert` must be called from inside a UoW-managed transaction alongside
//! the outbox row it accompanies (§4.5); `find_by_id` and `update_status`
//! may run against the pool directly.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use error_handling::{RepositoryError, ServiceError};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::{Order, OrderItem, OrderStatus};

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        customer_id: &str,
        amount: BigDecimal,
        items: &[OrderItem],
    ) -> Result<Order, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Order, ServiceError>;

    async fn update_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<(), ServiceError>;
}

pub struct SqlxOrderRepository {
    pool: PgPool,
}

impl SqlxOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for SqlxOrderRepository {
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        customer_id: &str,
        amount: BigDecimal,
        items: &[OrderItem],
    ) -> Result<Order, ServiceError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let status = OrderStatus::Created;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(customer_id)
        .bind(&amount)
        .bind(status.as_str())
        .bind(created_at)
        .execute(&mut **tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, price)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(id)
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(&item.price)
            .execute(&mut **tx)
            .await?;
        }

        Ok(Order {
            id,
            customer_id: customer_id.to_string(),
            amount,
            status,
            created_at,
            items: items.to_vec(),
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Order, ServiceError> {
        let order_row = sqlx::query(
            "SELECT id, customer_id, amount, status, created_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(order_row) = order_row else {
            return Err(ServiceError::OrderNotFound(id));
        };

        let item_rows = sqlx::query("SELECT product_id, quantity, price FROM order_items WHERE order_id = $1")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        let items = item_rows
            .into_iter()
            .map(|row| {
                Ok(OrderItem {
                    product_id: row.try_get("product_id")?,
                    quantity: row.try_get("quantity")?,
                    price: row.try_get("price")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let status_str: String = order_row.try_get("status")?;
        let status = status_str
            .parse::<OrderStatus>()
            .map_err(|e| ServiceError::Internal(format!("corrupt order status in storage: {e}")))?;

        Ok(Order {
            id: order_row.try_get("id")?,
            customer_id: order_row.try_get("customer_id")?,
            amount: order_row.try_get("amount")?,
            status,
            created_at: order_row.try_get("created_at")?,
            items,
        })
    }

    async fn update_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut **tx)
            .await
            .map_err(RepositoryError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::OrderNotFound(id));
        }
        Ok(())
    }
}
