//! HTTP surface (§6): `POST /api/v1/orders/new/` and
//! `GET /api/v1/orders/{uuid}/status`.

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use bigdecimal::BigDecimal;
use error_handling::ServiceError;
use event_schema::ProductItem;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use transactional_outbox::OutboxRepository;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::repository::OrderRepository;
use crate::usecase::OrderUseCase;

#[derive(Debug, Deserialize, Validate)]
pub struct NewOrderProductRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewOrderRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    #[validate(nested)]
    pub products: Vec<NewOrderProductRequest>,
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub status: String,
    pub created_at: String,
}

pub async fn create_order<OR, OB>(
    usecase: web::Data<Arc<OrderUseCase<OR, OB>>>,
    body: web::Json<NewOrderRequest>,
) -> Result<HttpResponse, AppError>
where
    OR: OrderRepository + 'static,
    OB: OutboxRepository + 'static,
{
    body.validate()
        .map_err(|e| ServiceError::OrderCreation(e.to_string()))?;

    let amount = BigDecimal::from_str(&body.amount)
        .map_err(|e| ServiceError::OrderCreation(format!("invalid amount: {e}")))?;

    let products: Vec<ProductItem> = body
        .products
        .iter()
        .map(|p| ProductItem {
            product_id: p.product_id.clone(),
            quantity: p.quantity,
        })
        .collect();

    let order = usecase
        .create_order(body.user_id.clone(), products, amount)
        .await?;

    Ok(HttpResponse::Created().json(OrderResponse {
        id: order.id,
        status: order.status.as_str().to_string(),
        created_at: order.created_at.to_rfc3339(),
    }))
}

pub async fn get_order_status<OR, OB>(
    usecase: web::Data<Arc<OrderUseCase<OR, OB>>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError>
where
    OR: OrderRepository + 'static,
    OB: OutboxRepository + 'static,
{
    let order = usecase.get_order_status(path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(OrderResponse {
        id: order.id,
        status: order.status.as_str().to_string(),
        created_at: order.created_at.to_rfc3339(),
    }))
}
