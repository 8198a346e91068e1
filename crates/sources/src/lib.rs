//! Source Adapters (C4): each adapter declares an identity schema, enumerates
//! unseen upstream data via `discover()`, and pulls bytes via `fetch()`
//! (spec §4.4). Adapters are stateless; all state lives in the Catalog (C1).

mod adapters;
mod candidate;
mod registry;

pub use adapters::{
    EnsembleGlobalAdapter, GlobalAdapter, RegionalAdapter, TropicalDeterministicAdapter,
    TropicalEnsembleAdapter,
};
pub use candidate::Candidate;
pub use registry::SourceRegistry;

use async_trait::async_trait;
use bytes::Bytes;
use metget_core::model::ModelFamily;
use metget_core::MetGetError;

/// Capability interface every upstream feed implements (spec §9: "dynamic
/// dispatch across source adapters").
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Name used to key the `SourceRegistry` and tag log lines/envelopes.
    fn service_name(&self) -> &'static str;

    /// Catalog family this adapter populates.
    fn family_tag(&self) -> ModelFamily;

    /// List candidate identities not yet known to be in the catalog. The
    /// downloader loop (C5) is responsible for filtering against C1; a
    /// conforming adapter may over-report (cheaper to skip than to miss).
    async fn discover(&self, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<Candidate>, MetGetError>;

    /// Fetch the raw bytes for one candidate previously returned by
    /// `discover`.
    async fn fetch(&self, candidate: &Candidate) -> Result<Bytes, MetGetError>;

    /// Stable storage key this candidate's bytes should be written under in
    /// C2 — `f(family, identity)` from spec §4.5 step 3.
    fn catalog_key(&self, candidate: &Candidate) -> String {
        format!(
            "{}/{}",
            self.family_tag().tag(),
            candidate.key_fragment()
        )
    }
}
