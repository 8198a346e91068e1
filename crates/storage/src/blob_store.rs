use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metget_core::MetGetError;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ObjectStore as ObjectStoreTrait, PutPayload};

use crate::retry::{is_retryable, retry_with_backoff, RetryPolicy};

/// Object Store Adapter (C2). Wraps an `object_store`-backed S3 bucket;
/// puts are overwrite-safe (idempotent for a given key, spec §4.2) since
/// `put` always replaces the object at `key` wholesale.
#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ObjectStoreTrait>,
    signer: AmazonS3,
    retry_policy: RetryPolicy,
}

impl BlobStore {
    /// Build a `BlobStore` from bucket + optional endpoint override
    /// (MinIO/S3-compatible), following the teacher's `AppConfig`-driven
    /// construction of long-lived clients at process start.
    pub fn new(bucket: &str, endpoint: &str) -> Result<Self, MetGetError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if !endpoint.is_empty() {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        let s3 = builder
            .build()
            .map_err(|e| MetGetError::Internal(format!("failed to build object store client: {e}")))?;
        Ok(Self {
            store: Arc::new(s3.clone()),
            signer: s3,
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Idempotent for a given `key`: a retry after a prior successful put
    /// overwrites with identical bytes (spec §4.2).
    pub async fn put(&self, key: &str, bytes: Bytes) -> Result<(), MetGetError> {
        let path = ObjectPath::from(key);
        retry_with_backoff(self.retry_policy, is_retryable, || {
            let store = self.store.clone();
            let path = path.clone();
            let payload = PutPayload::from_bytes(bytes.clone());
            async move { store.put(&path, payload).await.map(|_| ()) }
        })
        .await
        .map_err(|e| MetGetError::UpstreamUnavailable(format!("put {key} failed: {e}")))
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, MetGetError> {
        let path = ObjectPath::from(key);
        retry_with_backoff(self.retry_policy, is_retryable, || {
            let store = self.store.clone();
            let path = path.clone();
            async move {
                let result = store.get(&path).await?;
                result.bytes().await
            }
        })
        .await
        .map_err(|e| MetGetError::UpstreamUnavailable(format!("get {key} failed: {e}")))
    }

    pub async fn delete(&self, key: &str) -> Result<(), MetGetError> {
        let path = ObjectPath::from(key);
        retry_with_backoff(self.retry_policy, is_retryable, || {
            let store = self.store.clone();
            let path = path.clone();
            async move { store.delete(&path).await }
        })
        .await
        .map_err(|e| MetGetError::UpstreamUnavailable(format!("delete {key} failed: {e}")))
    }

    /// Time-limited public GET URL for `key` (spec §4.2, §6). Used both for
    /// the `request_url` returned at intake (future path, before the worker
    /// has written anything) and for status/debug tooling.
    pub async fn presign(&self, key: &str, ttl: Duration) -> Result<String, MetGetError> {
        let path = ObjectPath::from(key);
        let url = self
            .signer
            .signed_url(http::Method::GET, &path, ttl)
            .await
            .map_err(|e| MetGetError::Internal(format!("presign {key} failed: {e}")))?;
        Ok(url.to_string())
    }
}
