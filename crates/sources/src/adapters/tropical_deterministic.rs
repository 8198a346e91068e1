use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use metget_core::model::{Identity, ModelFamily};
use metget_core::MetGetError;

use super::common::{build_client, fetch_bytes, fetch_index};
use crate::{Candidate, SourceAdapter};

/// Tropical cyclone track feed (NHC-class: one deterministic track per
/// advisory). `family` distinguishes the plain deterministic track from the
/// analysis variant; both share the same storm-identity wire shape and
/// differ only in which catalog table the downloader writes into.
#[derive(Debug, Clone)]
pub struct TropicalDeterministicAdapter {
    client: reqwest::Client,
    base_url: String,
    family: ModelFamily,
}

impl TropicalDeterministicAdapter {
    /// `family` must be `TropicalDeterministic` or `TropicalAnalysis`.
    pub fn new(base_url: impl Into<String>, family: ModelFamily) -> Self {
        Self {
            client: build_client("metget-downloader/0.1 (+tropical)"),
            base_url: base_url.into(),
            family,
        }
    }
}

#[async_trait]
impl SourceAdapter for TropicalDeterministicAdapter {
    fn service_name(&self) -> &'static str {
        match self.family {
            ModelFamily::TropicalAnalysis => "tropical_analysis",
            _ => "tropical_deterministic",
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
            .filter_map(|e| {
                let identity = Identity::Tropical {
                    storm_name: e.storm_name?,
                    basin: e.basin?,
                    storm_year: e.storm_year?,
                    storm_number: e.storm_number?,
                    advisory: e.advisory?,
                    ensemble_member: None,
                };
                Some(Candidate {
                    forecast_cycle: e.forecast_cycle,
                    valid_time: e.valid_time,
                    tau: e.tau,
                    identity,
                    source_ref: e.source_ref,
                })
            })
            .collect())
    }

    async fn fetch(&self, candidate: &Candidate) -> Result<Bytes, MetGetError> {
        let url = format!("{}/{}", self.base_url, candidate.source_ref);
        fetch_bytes(&self.client, &url).await
    }
}
