use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use metget_core::model::{Identity, ModelFamily};
use metget_core::MetGetError;

use super::common::{build_client, fetch_bytes, fetch_index};
use crate::{Candidate, SourceAdapter};

/// Deterministic regional model feed (NAM-class). Same wire shape as
/// `GlobalAdapter`; the only difference is which `ModelFamily` table the
/// downloader upserts into, so identity handling is identical.
#[derive(Debug, Clone)]
pub struct RegionalAdapter {
    client: reqwest::Client,
    base_url: String,
    family: ModelFamily,
}

impl RegionalAdapter {
    /// `family` must be `Regional`, `RegionalAlaska`, or `Precipitation` —
    /// the three deterministic-regional-shaped families in the catalog.
    pub fn new(base_url: impl Into<String>, family: ModelFamily) -> Self {
        Self {
            client: build_client("metget-downloader/0.1 (+regional)"),
            base_url: base_url.into(),
            family,
        }
    }
}

#[async_trait]
impl SourceAdapter for RegionalAdapter {
    fn service_name(&self) -> &'static str {
        match self.family {
            ModelFamily::RegionalAlaska => "regional_alaska",
            ModelFamily::Precipitation => "precipitation",
            _ => "regional",
        }
    }

    fn family_tag(&self) -> ModelFamily {
        self.family
    }

    async fn discover(&self, since: DateTime<Utc>) -> Result<Vec<Candidate>, MetGetError> {
        let index_url = format!("{}/index.json?since={}", self.base_url, since.to_rfc3339());
        let entries = fetch_index(&self.client, &index_url).await?;
        Ok(entries
            .into_iter()
            .map(|e| Candidate {
                forecast_cycle: e.forecast_cycle,
                valid_time: e.valid_time,
                tau: e.tau,
                identity: Identity::Deterministic,
                source_ref: e.source_ref,
            })
            .collect())
    }

    async fn fetch(&self, candidate: &Candidate) -> Result<Bytes, MetGetError> {
        let url = format!("{}/{}", self.base_url, candidate.source_ref);
        fetch_bytes(&self.client, &url).await
    }
}
