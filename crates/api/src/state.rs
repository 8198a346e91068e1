use std::sync::Arc;
use std::time::Duration;

use metget_bus::MessageBus;
use metget_catalog::CatalogStore;
use metget_credit::CreditLedger;
use metget_storage::BlobStore;
use sqlx::PgPool;

/// Everything a route handler needs, shared across the `axum::Router`
/// exactly as the teacher's `AppState` shares one `PgPool`/`YrClient` pair.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub catalog: CatalogStore,
    pub credit: CreditLedger,
    pub bus: Arc<MessageBus>,
    pub blobs: BlobStore,
    pub enforce_credit_limits: bool,
    pub presign_ttl: Duration,
}
