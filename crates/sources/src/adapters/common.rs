use chrono::{DateTime, Utc};
use metget_core::MetGetError;
use serde::Deserialize;

/// Timeout applied to every adapter HTTP call. Upstream model-data servers
/// are typically slower than a JSON API; generous but bounded so a hung
/// connection doesn't stall an entire downloader invocation.
pub(crate) const ADAPTER_HTTP_TIMEOUT_SECS: u64 = 60;

pub(crate) fn build_client(user_agent: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(user_agent.to_string())
        .timeout(std::time::Duration::from_secs(ADAPTER_HTTP_TIMEOUT_SECS))
        .build()
        .expect("static TLS/proxy config, cannot fail at runtime")
}

/// One row of an upstream index listing. Adapters share this wire shape and
/// project the fields they need into an `Identity`; fields irrelevant to a
/// given family are simply left `None` by the upstream index.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IndexEntry {
    pub forecast_cycle: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    pub tau: i32,
    #[serde(rename = "ref")]
    pub source_ref: String,
    #[serde(default)]
    pub ensemble_member: Option<String>,
    #[serde(default)]
    pub storm_name: Option<String>,
    #[serde(default)]
    pub basin: Option<String>,
    #[serde(default)]
    pub storm_year: Option<i32>,
    #[serde(default)]
    pub storm_number: Option<i32>,
    #[serde(default)]
    pub advisory: Option<i32>,
}

pub(crate) async fn fetch_index(client: &reqwest::Client, index_url: &str) -> Result<Vec<IndexEntry>, MetGetError> {
    let resp = client
        .get(index_url)
        .send()
        .await
        .map_err(|e| MetGetError::UpstreamUnavailable(format!("index request to {index_url} failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(MetGetError::UpstreamUnavailable(format!(
            "index request to {index_url} returned {}",
            resp.status()
        )));
    }

    resp.json::<Vec<IndexEntry>>()
        .await
        .map_err(|e| MetGetError::UpstreamUnavailable(format!("index body from {index_url} unparseable: {e}")))
}

pub(crate) async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<bytes::Bytes, MetGetError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| MetGetError::UpstreamUnavailable(format!("fetch {url} failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(MetGetError::UpstreamUnavailable(format!(
            "fetch {url} returned {}",
            resp.status()
        )));
    }

    resp.bytes()
        .await
        .map_err(|e| MetGetError::UpstreamUnavailable(format!("fetch {url} body read failed: {e}")))
}
