//! Stockroom worker entry point.

use std::sync::Arc;

use stockroom_cache::RedisInvoiceQueue;
use stockroom_core::clock::SystemClock;
use stockroom_core::error::DomainError;
use stockroom_core::event::{CHECKOUT_EVENTS_TOPIC, PRODUCT_EVENTS_TOPIC};
use stockroom_core::invoice::InvoiceBackend;
use stockroom_search::ElasticsearchIndex;
use stockroom_stream::{ConsumeStats, JetStreamConsumerGroup};
use stockroom_worker::config::WorkerConfig;
use stockroom_worker::error::WorkerError;
use stockroom_worker::invoice::{InvoiceTopicHandler, InvoiceWorker, Mailer, SimulatedMailer};
use stockroom_worker::sync::IndexSynchronizer;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    // Local development reads a .env file when present.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Stockroom worker");

    let config = WorkerConfig::from_env()?;

    // Elasticsearch must answer before any event is consumed.
    let index = ElasticsearchIndex::new(&config.elasticsearch_url)?;
    index.ping().await?;

    let client = async_nats::connect(&config.nats_url)
        .await
        .map_err(|e| WorkerError::Broker(format!("connect to {}: {e}", config.nats_url)))?;
    let jetstream = async_nats::jetstream::new(client);

    let cancel = CancellationToken::new();
    let mut consumers: JoinSet<Result<ConsumeStats, DomainError>> = JoinSet::new();

    let synchronizer = Arc::new(IndexSynchronizer::new(
        Arc::new(index),
        Arc::new(SystemClock),
    ));
    JetStreamConsumerGroup::new(
        jetstream.clone(),
        config.consumer_group.clone(),
        PRODUCT_EVENTS_TOPIC,
    )
    .with_partitions(config.partitions)
    .spawn(synchronizer, &cancel, &mut consumers)
    .await?;

    let mailer: Arc<dyn Mailer> = Arc::new(
        SimulatedMailer::new(config.invoice_failure_rate)
            .with_send_delay(config.invoice_send_delay),
    );
    let invoice_worker = match config.invoice_backend {
        InvoiceBackend::Queue => {
            let connection = stockroom_cache::connect(&config.redis_url).await?;
            let queue = Arc::new(RedisInvoiceQueue::new(connection));
            let worker = InvoiceWorker::new(queue, mailer);
            Some(tokio::spawn(worker.run(cancel.child_token())))
        }
        InvoiceBackend::Stream => {
            let handler = Arc::new(InvoiceTopicHandler::new(mailer));
            JetStreamConsumerGroup::new(
                jetstream,
                config.consumer_group.clone(),
                CHECKOUT_EVENTS_TOPIC,
            )
            .with_partitions(config.partitions)
            .spawn(handler, &cancel, &mut consumers)
            .await?;
            None
        }
    };
    tracing::info!(
        backend = %config.invoice_backend,
        partitions = config.partitions,
        group = %config.consumer_group,
        "worker running"
    );

    shutdown_signal().await;
    tracing::info!("shutdown requested, draining consumers");
    cancel.cancel();

    while let Some(joined) = consumers.join_next().await {
        match joined {
            Ok(Ok(stats)) => tracing::info!(
                acked = stats.acked,
                redelivered = stats.redelivered,
                poisoned = stats.poisoned,
                "partition consumer finished"
            ),
            Ok(Err(e)) => tracing::error!(error = %e, "partition consumer failed"),
            Err(e) => tracing::error!(error = %e, "partition consumer panicked"),
        }
    }
    if let Some(handle) = invoice_worker {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "invoice worker panicked");
        }
    }

    tracing::info!("Stockroom worker stopped");
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
}
