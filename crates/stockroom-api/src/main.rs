//! Stockroom API server entry point.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use stockroom_api::config::ApiConfig;
use stockroom_api::error::AppError;
use stockroom_api::state::AppState;
use stockroom_api::telemetry;
use stockroom_cache::{RedisCache, RedisInvoiceQueue};
use stockroom_catalog::breaker::{BreakerSettings, CircuitBreaker};
use stockroom_catalog::checkout::CheckoutService;
use stockroom_catalog::repository::ProductRepository;
use stockroom_core::clock::{Clock, SystemClock};
use stockroom_core::event::{CHECKOUT_EVENTS_TOPIC, PRODUCT_EVENTS_TOPIC};
use stockroom_core::invoice::{InvoiceBackend, InvoiceDispatcher};
use stockroom_core::publisher::EventPublisher;
use stockroom_store::pg_product_store::PgProductStore;
use stockroom_stream::{JetStreamPublisher, TopicInvoiceDispatcher};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Local development reads a .env file when present.
    let _ = dotenvy::dotenv();

    let config = ApiConfig::from_env()?;
    let telemetry_guard = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting Stockroom API server");

    // Primary store.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    stockroom_store::MIGRATOR.run(&pool).await?;
    let store = Arc::new(PgProductStore::new(pool));

    // Cache.
    let redis = stockroom_cache::connect(&config.redis_url)
        .await
        .map_err(|e| AppError::Cache(e.to_string()))?;
    let cache = Arc::new(RedisCache::new(redis.clone()));

    // Event stream.
    let nats = async_nats::connect(&config.nats_url)
        .await
        .map_err(|e| AppError::Broker(format!("connect to {}: {e}", config.nats_url)))?;
    let jetstream = JetStreamPublisher::new(async_nats::jetstream::new(nats))
        .with_partitions(config.partitions);
    for topic in [PRODUCT_EVENTS_TOPIC, CHECKOUT_EVENTS_TOPIC] {
        jetstream
            .ensure_topic(topic)
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?;
    }
    let publisher: Arc<dyn EventPublisher> = Arc::new(jetstream);

    let dispatcher: Arc<dyn InvoiceDispatcher> = match config.invoice_backend {
        InvoiceBackend::Queue => Arc::new(RedisInvoiceQueue::new(redis)),
        InvoiceBackend::Stream => Arc::new(TopicInvoiceDispatcher::new(publisher.clone())),
    };

    // Build application state.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let breaker = Arc::new(CircuitBreaker::new(BreakerSettings::default(), clock.clone()));
    let repository = ProductRepository::new(
        store.clone(),
        cache.clone(),
        breaker,
        publisher.clone(),
        clock.clone(),
    )
    .with_query_timeout(config.query_timeout);
    let checkout = CheckoutService::new(store, cache, publisher, dispatcher, clock);
    let app_state = AppState::new(Arc::new(repository), Arc::new(checkout));

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = stockroom_api::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server.
    let addr = config.bind_addr()?;
    tracing::info!(
        %addr,
        invoice_backend = %config.invoice_backend,
        partitions = config.partitions,
        "Listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Stockroom API server stopped");
    telemetry_guard.shutdown();
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
