use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use db_pool::DbConfig;
use messaging::BrokerClient;
use processor_service::repository::SqlxProcessingRepository;
use processor_service::usecase::{ProcessingUseCase, ProcessingUseCaseConfig};
use processor_service::{config, consumer, metrics};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SERVICE_NAME: &str = "processor-service";

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok", "service": SERVICE_NAME}))
}

/// Startup: DB → broker → sweep stale PROCESSING rows (§9) → consumer
/// subscription → accept HTTP (metrics/health only). Shutdown reverses it.
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

    let uow = Arc::new(unit_of_work::UnitOfWork::new(pool.clone()));
    let processing = Arc::new(SqlxProcessingRepository::new(pool.clone()));

    let usecase = Arc::new(ProcessingUseCase::new(
        uow,
        processing,
        broker.clone(),
        ProcessingUseCaseConfig {
            success_rate: app_config.processing_success_rate,
            min_delay_ms: app_config.processing_min_delay_ms,
            max_delay_ms: app_config.processing_max_delay_ms,
        },
    ));

    let reset = usecase
        .recover_stale_processing(app_config.processing_stale_grace_period_secs)
        .await?;
    tracing::info!(reset_count = reset, "startup stale-PROCESSING sweep complete");

    let consumer_cancel = CancellationToken::new();
    let consumer_handle = tokio::spawn({
        let broker = broker.clone();
        let usecase = usecase.clone();
        let cancel = consumer_cancel.clone();
        async move {
            if let Err(e) = consumer::start(broker, usecase, cancel).await {
                tracing::error!(error = %e, "order.created consumer exited with an error");
            }
        }
    });
    tracing::info!("order.created consumer subscribed");

    let bind_addr = app_config.http_bind_addr.clone();
    let http_server = HttpServer::new(|| {
        App::new()
            .wrap(Logger::default())
            .route("/api/v1/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics::serve_metrics))
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

    tracing::info!("shutting down: disconnecting broker");
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
