//! Wires the live `metget-catalog`/`metget-storage` types into the
//! `CatalogLookup`/`BlobSource` capabilities the build state machine
//! depends on.
//!
//! `CatalogLookup` (from `metget-selection`) and `CatalogStore` (from
//! `metget-catalog`) are both foreign to this crate, so the impl has to go
//! through a local newtype rather than directly on `CatalogStore` (spec
//! §4.8: "`metget-worker` is the only caller that wires live catalog rows
//! into `metget-selection`'s pure types").

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use metget_catalog::CatalogStore;
use metget_core::model::{CatalogEntry, ModelFamily, SelectionConstraints};
use metget_core::MetGetError;
use metget_selection::CatalogLookup;
use metget_storage::BlobStore;

use crate::blobs::BlobSource;

pub struct LiveCatalogLookup(pub CatalogStore);

#[async_trait]
impl CatalogLookup for LiveCatalogLookup {
    async fn find_covering(
        &self,
        family: ModelFamily,
        valid_time: DateTime<Utc>,
        constraints: &SelectionConstraints,
    ) -> Result<Vec<CatalogEntry>, MetGetError> {
        self.0.find_covering(family, valid_time, constraints).await
    }
}

#[async_trait]
impl BlobSource for BlobStore {
    async fn get(&self, key: &str) -> Result<Bytes, MetGetError> {
        self.get(key).await
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), MetGetError> {
        self.put(key, bytes).await
    }
}
