//! The worker's view of C2: read source payloads, write the finished
//! artifact. A capability trait rather than `metget_storage::BlobStore`
//! directly, so `build.rs` is testable without a real object store.

use async_trait::async_trait;
use bytes::Bytes;
use metget_core::MetGetError;

#[async_trait]
pub trait BlobSource: Send + Sync {
    async fn get(&self, key: &str) -> Result<Bytes, MetGetError>;
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), MetGetError>;
}
