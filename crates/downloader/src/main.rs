//! Downloader Loop (C5): periodically drives every registered Source
//! Adapter through discover → dedupe → fetch → put → upsert (spec §4.5).
//! Structured the way the teacher's `main.rs` bootstraps a `PgPool` and
//! hands it to a background loop, generalized from one `YrClient` over N
//! checkpoints to a `SourceRegistry` over N upstream feeds.

mod adapters;
mod config;
mod loop_runner;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use config::DownloaderConfig;
use metget_catalog::CatalogStore;
use metget_core::model::ModelFamily;
use metget_sources::{
    EnsembleGlobalAdapter, GlobalAdapter, RegionalAdapter, SourceRegistry,
    TropicalDeterministicAdapter, TropicalEnsembleAdapter,
};
use metget_storage::BlobStore;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DB_POOL_MAX_CONNECTIONS: u32 = 5;

fn build_registry(config: &DownloaderConfig) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(GlobalAdapter::new(config.global_url.clone())));

    if !config.regional_url.is_empty() {
        registry.register(Arc::new(RegionalAdapter::new(
            config.regional_url.clone(),
            ModelFamily::Regional,
        )));
    }
    if !config.regional_alaska_url.is_empty() {
        registry.register(Arc::new(RegionalAdapter::new(
            config.regional_alaska_url.clone(),
            ModelFamily::RegionalAlaska,
        )));
    }
    if !config.precipitation_url.is_empty() {
        registry.register(Arc::new(RegionalAdapter::new(
            config.precipitation_url.clone(),
            ModelFamily::Precipitation,
        )));
    }
    if !config.ensemble_global_url.is_empty() {
        registry.register(Arc::new(EnsembleGlobalAdapter::new(config.ensemble_global_url.clone())));
    }
    if !config.tropical_deterministic_url.is_empty() {
        registry.register(Arc::new(TropicalDeterministicAdapter::new(
            config.tropical_deterministic_url.clone(),
            ModelFamily::TropicalDeterministic,
        )));
    }
    if !config.tropical_analysis_url.is_empty() {
        registry.register(Arc::new(TropicalDeterministicAdapter::new(
            config.tropical_analysis_url.clone(),
            ModelFamily::TropicalAnalysis,
        )));
    }
    if !config.tropical_ensemble_url.is_empty() {
        registry.register(Arc::new(TropicalEnsembleAdapter::new(config.tropical_ensemble_url.clone())));
    }

    registry
}

async fn run_sweep(registry: &SourceRegistry, catalog: &CatalogStore, blobs: &BlobStore, config: &DownloaderConfig) {
    let since = Utc::now() - chrono::Duration::hours(config.lookback_hours);
    let timeout = Duration::from_secs(config.candidate_timeout_secs);

    for adapter in registry.iter() {
        let summary = loop_runner::run_once(adapter.as_ref(), catalog, blobs, since, timeout).await;
        tracing::info!(
            service = summary.service,
            discovered = summary.discovered,
            already_cataloged = summary.already_cataloged,
            fetched = summary.fetched,
            failed = summary.failed,
            "downloader sweep complete for source"
        );
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metget_downloader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DownloaderConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .connect(&config.common.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("../api/migrations")
        .run(&pool)
        .await
        .expect("failed to run database migrations");

    let catalog = CatalogStore::new(pool);
    let blobs = BlobStore::new(&config.common.s3_bucket, &config.common.s3_endpoint)
        .expect("failed to build object store client");
    let registry = build_registry(&config);

    tracing::info!(sources = registry.len(), interval_secs = config.interval_secs, "downloader starting");

    loop {
        run_sweep(&registry, &catalog, &blobs, &config).await;
        tokio::time::sleep(Duration::from_secs(config.interval_secs)).await;
    }
}
