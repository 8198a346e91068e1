use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metget_core::model::{CatalogEntry, ModelFamily, SelectionConstraints};
use metget_core::MetGetError;

/// The one capability the Selection Engine needs from the Catalog (spec
/// §4.1 `find_covering`). A trait rather than a direct dependency on
/// `metget-catalog` so the algorithm is unit-testable against an in-memory
/// fixture, with `metget-worker` supplying the live, Postgres-backed
/// implementation.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn find_covering(
        &self,
        family: ModelFamily,
        valid_time: DateTime<Utc>,
        constraints: &SelectionConstraints,
    ) -> Result<Vec<CatalogEntry>, MetGetError>;
}
