use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use db_pool::DbConfig;
use messaging::BrokerClient;
use orders_service::repository::{OrderRepository, SqlxOrderRepository};
use orders_service::usecase::{OrderUseCase, OrderUseCaseConfig};
use orders_service::{config, consumer, handlers, metrics};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use transactional_outbox::{AmqpOutboxPublisher, OutboxMetrics, OutboxProcessor, SqlxOutboxRepository};
use unit_of_work::UnitOfWork;

const SERVICE_NAME: &str = "orders-service";

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok", "service": SERVICE_NAME}))
}

/// Startup and shutdown follow §4.7's fixed order: DB, broker, outbox
/// publisher, consumer subscription, then HTTP — torn down in reverse.
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let app_config = config::AppConfig::from_env();

    let db_config = DbConfig::from_env(SERVICE_NAME).map_err(|e| anyhow::anyhow!(e))?;
    db_config.log_config();
    let pool: PgPool = db_pool::create_pool(db_config).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    let broker_config = messaging::BrokerConfig::from_env(SERVICE_NAME).map_err(|e| anyhow::anyhow!(e))?;
    let broker = Arc::new(BrokerClient::connect(broker_config).await?);
    tracing::info!("broker connected and topology declared");

    let uow = Arc::new(UnitOfWork::new(pool.clone()));
    let orders = Arc::new(SqlxOrderRepository::new(pool.clone()));
    let outbox_repo = Arc::new(SqlxOutboxRepository::new(pool.clone()));

    let usecase_config = OrderUseCaseConfig {
        order_created_exchange: broker.config().order_created_exchange.clone(),
        order_created_routing_key: broker.config().order_created_routing_key.clone(),
    };
    let usecase = Arc::new(OrderUseCase::new(
        uow.clone(),
        orders.clone(),
        outbox_repo.clone(),
        usecase_config,
    ));

    let outbox_publisher = Arc::new(AmqpOutboxPublisher::new(broker.clone()));
    let outbox_metrics = OutboxMetrics::new(SERVICE_NAME);
    let outbox_processor = Arc::new(
        OutboxProcessor::new(
            outbox_repo,
            outbox_publisher,
            app_config.outbox_batch_size,
            app_config.outbox_poll_interval,
            app_config.outbox_max_retries,
        )
        .with_metrics(outbox_metrics),
    );
    outbox_processor.start().await;
    tracing::info!("outbox processor started");

    let consumer_cancel = CancellationToken::new();
    let consumer_handle = tokio::spawn({
        let broker = broker.clone();
        let usecase = usecase.clone();
        let cancel = consumer_cancel.clone();
        async move {
            if let Err(e) = consumer::start(broker, usecase, cancel).await {
                tracing::error!(error = %e, "order.processed consumer exited with an error");
            }
        }
    });
    tracing::info!("order.processed consumer subscribed");

    let bind_addr = app_config.http_bind_addr.clone();
    let http_usecase = usecase.clone();
    let http_server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(http_usecase.clone()))
            .route("/api/v1/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .route(
                "/api/v1/orders/new/",
                web::post().to(handlers::orders::create_order::<SqlxOrderRepository, SqlxOutboxRepository>),
            )
            .route(
                "/api/v1/orders/{order_id}/status",
                web::get().to(handlers::orders::get_order_status::<SqlxOrderRepository, SqlxOutboxRepository>),
            )
    })
    .bind(&bind_addr)?
    .run();

    tracing::info!(addr = %bind_addr, "http server listening");

    let result = tokio::select! {
        res = http_server => res.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    tracing::info!("shutting down: stopping consumer");
    consumer_cancel.cancel();
    let _ = consumer_handle.await;

    tracing::info!("shutting down: stopping outbox processor");
    outbox_processor.stop().await;

    tracing::info!("shutting down: disconnecting broker");
    drop(outbox_processor);
    match Arc::try_unwrap(broker) {
        Ok(broker) => {
            if let Err(e) = broker.disconnect().await {
                tracing::warn!(error = %e, "error closing broker connection");
            }
        }
        Err(_) => {
            tracing::warn!("broker client still has outstanding references, relying on drop to close the connection");
        }
    }

    pool.close().await;
    tracing::info!("database pool closed, shutdown complete");

    result
}
