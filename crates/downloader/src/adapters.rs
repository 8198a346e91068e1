//! Wires the live `metget-catalog`/`metget-storage` types into the
//! `CatalogGate`/`BlobSink` capabilities `run_once` depends on.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use metget_catalog::CatalogStore;
use metget_core::model::{CatalogEntry, Identity, ModelFamily};
use metget_core::MetGetError;
use metget_storage::BlobStore;

use crate::loop_runner::{BlobSink, CatalogGate};

#[async_trait]
impl CatalogGate for CatalogStore {
    async fn contains(
        &self,
        family: ModelFamily,
        forecast_cycle: DateTime<Utc>,
        valid_time: DateTime<Utc>,
        identity: &Identity,
    ) -> Result<bool, MetGetError> {
        Ok(self
            .find_exact(family, forecast_cycle, valid_time, identity)
            .await?
            .is_some())
    }

    async fn upsert(&self, entry: CatalogEntry) -> Result<(), MetGetError> {
        self.upsert(&entry).await.map(|_| ())
    }
}

#[async_trait]
impl BlobSink for BlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), MetGetError> {
        self.put(key, bytes).await
    }
}
