use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use metget_core::model::{Identity, ModelFamily};
use metget_core::MetGetError;

use super::common::{build_client, fetch_bytes, fetch_index};
use crate::{Candidate, SourceAdapter};

/// Ensemble global model feed (GEFS-class: N members per cycle). Each index
/// entry must carry `ensemble_member`; entries missing it are dropped with a
/// warning rather than failing the whole `discover()` call, since a single
/// malformed upstream row should not blind the downloader to every other
/// member.
#[derive(Debug, Clone)]
pub struct EnsembleGlobalAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl EnsembleGlobalAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_client("metget-downloader/0.1 (+ensemble)"),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for EnsembleGlobalAdapter {
    fn service_name(&self) -> &'static str {
        "ensemble_global"
    }

    fn family_tag(&self) -> ModelFamily {
        ModelFamily::EnsembleGlobal
    }

    async fn discover(&self, since: DateTime<Utc>) -> Result<Vec<Candidate>, MetGetError> {
        let index_url = format!("{}/index.json?since={}", self.base_url, since.to_rfc3339());
        let entries = fetch_index(&self.client, &index_url).await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| {
                let member = e.ensemble_member?;
                Some(Candidate {
                    forecast_cycle: e.forecast_cycle,
                    valid_time: e.valid_time,
                    tau: e.tau,
                    identity: Identity::Ensemble { member },
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
