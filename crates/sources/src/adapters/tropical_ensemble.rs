use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use metget_core::model::{Identity, ModelFamily};
use metget_core::MetGetError;

use super::common::{build_client, fetch_bytes, fetch_index};
use crate::{Candidate, SourceAdapter};

/// Tropical cyclone ensemble feed: storm identity combined with an
/// ensemble member, e.g. a perturbed NHC-class track ensemble.
#[derive(Debug, Clone)]
pub struct TropicalEnsembleAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl TropicalEnsembleAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_client("metget-downloader/0.1 (+tropical-ensemble)"),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for TropicalEnsembleAdapter {
    fn service_name(&self) -> &'static str {
        "tropical_ensemble"
    }

    fn family_tag(&self) -> ModelFamily {
        ModelFamily::TropicalEnsemble
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
                    ensemble_member: Some(e.ensemble_member?),
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
