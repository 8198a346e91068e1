use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use metget_core::model::{Identity, ModelFamily};
use metget_core::MetGetError;

use super::common::{build_client, fetch_bytes, fetch_index};
use crate::{Candidate, SourceAdapter};

/// Deterministic global model feed (GFS-class: one member per cycle, no
/// storm identity). Generalizes the teacher's `YrClient` shape — a long-
/// lived `reqwest::Client` plus a fixed `user_agent` — from a single
/// forecast-point API to an upstream index-of-grids API.
#[derive(Debug, Clone)]
pub struct GlobalAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl GlobalAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_client("metget-downloader/0.1 (+global)"),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for GlobalAdapter {
    fn service_name(&self) -> &'static str {
        "global"
    }

    fn family_tag(&self) -> ModelFamily {
        ModelFamily::Global
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn discover_parses_index_into_deterministic_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "forecast_cycle": "2024-01-01T00:00:00Z",
                    "valid_time": "2024-01-01T03:00:00Z",
                    "tau": 3,
                    "ref": "gfs.2024010100/f003.grb2",
                }
            ])))
            .mount(&server)
            .await;

        let adapter = GlobalAdapter::new(server.uri());
        let candidates = adapter
            .discover("2024-01-01T00:00:00Z".parse().unwrap())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].tau, 3);
        assert!(matches!(candidates[0].identity, Identity::Deterministic));
    }

    #[tokio::test]
    async fn fetch_rejects_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.grb2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let adapter = GlobalAdapter::new(server.uri());
        let candidate = Candidate {
            forecast_cycle: "2024-01-01T00:00:00Z".parse().unwrap(),
            valid_time: "2024-01-01T03:00:00Z".parse().unwrap(),
            tau: 3,
            identity: Identity::Deterministic,
            source_ref: "missing.grb2".into(),
        };

        let result = adapter.fetch(&candidate).await;
        assert!(result.is_err());
    }
}
