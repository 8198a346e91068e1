//! Build Worker (C9): consumes build envelopes off C7, drives the Selection
//! Engine against C1, re-grids and encodes onto C2, and keeps the `requests`
//! row in lockstep (spec §4.9). Structured the way the teacher's `main.rs`
//! builds one `PgPool`/client set and hands it to a long-lived background
//! loop, generalized from an in-process `tokio::spawn(run_poller(...))` to a
//! standalone consumer binary reading off a durable queue.

mod adapters;
mod blobs;
mod build;
mod cache;
mod config;
mod encode;
mod regrid;
mod requests;

use std::time::Duration;

use adapters::LiveCatalogLookup;
use config::WorkerConfig;
use futures::StreamExt;
use metget_bus::MessageBus;
use metget_catalog::CatalogStore;
use metget_storage::BlobStore;
use regrid::StubRegridder;
use requests::PgRequestGate;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DB_POOL_MAX_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metget_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .connect(&config.common.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("../api/migrations")
        .run(&pool)
        .await
        .expect("failed to run database migrations");

    let catalog = LiveCatalogLookup(CatalogStore::new(pool.clone()));
    let requests_gate = PgRequestGate::new(pool, config.visibility_timeout_secs);
    let blob_store = BlobStore::new(&config.common.s3_bucket, &config.common.s3_endpoint)
        .expect("failed to build object store client");
    let regridder = StubRegridder;

    let bus = MessageBus::connect(&config.common.amqp_url, &config.amqp_exchange, &config.amqp_queue)
        .await
        .expect("failed to connect to message bus");

    tracing::info!(max_tries = config.max_tries, "build worker starting");

    let mut deliveries = Box::pin(
        bus.consume("metget-worker")
            .await
            .expect("failed to start consuming build queue"),
    );
    let mut cache = cache::BlobCache::new(config.blob_cache_capacity);
    let soft_deadline = Duration::from_secs(config.soft_deadline_secs);

    while let Some(delivery) = deliveries.next().await {
        let Some(envelope) = delivery.envelope() else {
            tracing::warn!("dropping malformed build envelope");
            let _ = delivery.nack(false).await;
            continue;
        };

        let request_id = envelope.request_id;
        let spec_json = envelope.spec_json.clone();

        let outcome = build::process(
            request_id,
            &spec_json,
            &requests_gate,
            &catalog,
            &blob_store,
            &mut cache,
            &regridder,
            config.max_tries,
            soft_deadline,
        )
        .await;

        match outcome {
            Ok(result) => {
                tracing::info!(request_id = %request_id, status = result.status, "build finished");
                match result.disposition {
                    build::Disposition::Ack => {
                        if let Err(e) = delivery.ack().await {
                            tracing::warn!(request_id = %request_id, error = %e, "ack failed");
                        }
                    }
                    build::Disposition::Requeue => {
                        if let Err(e) = delivery.nack(true).await {
                            tracing::warn!(request_id = %request_id, error = %e, "nack failed");
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "build process failed unexpectedly");
                let _ = delivery.nack(true).await;
            }
        }
    }
}
