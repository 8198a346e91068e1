//! `DownloaderConfig`: process-start immutable configuration for
//! `metget-downloader`, following the teacher's `AppConfig::from_env`
//! convention (required vars panic with a descriptive message; optional
//! ones fall back to a documented default).

use metget_core::config::{required_var, var_or, var_parse_or, CommonConfig};

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub common: CommonConfig,
    /// Sleep between invocations of the full adapter sweep (spec §2: "external
    /// trigger" normally drives this via Argo/k8s cron; this loop fills that
    /// role when run as a long-lived process rather than a one-shot cron job).
    pub interval_secs: u64,
    /// How far back `discover(since)` looks for candidates each invocation.
    pub lookback_hours: i64,
    /// Per-candidate fetch timeout (spec §5: "Downloader per-candidate
    /// timeout: bounded, failure is logged and skipped").
    pub candidate_timeout_secs: u64,
    pub global_url: String,
    pub regional_url: String,
    pub regional_alaska_url: String,
    pub precipitation_url: String,
    pub ensemble_global_url: String,
    pub tropical_deterministic_url: String,
    pub tropical_analysis_url: String,
    pub tropical_ensemble_url: String,
}

impl DownloaderConfig {
    pub fn from_env() -> Self {
        Self {
            common: CommonConfig::from_env(),
            interval_secs: var_parse_or("DOWNLOADER_INTERVAL_SECS", 900u64),
            lookback_hours: var_parse_or("DOWNLOADER_LOOKBACK_HOURS", 48i64),
            candidate_timeout_secs: var_parse_or("DOWNLOADER_CANDIDATE_TIMEOUT_SECS", 120u64),
            global_url: required_var("GLOBAL_SOURCE_URL"),
            regional_url: var_or("REGIONAL_SOURCE_URL", ""),
            regional_alaska_url: var_or("REGIONAL_ALASKA_SOURCE_URL", ""),
            precipitation_url: var_or("PRECIPITATION_SOURCE_URL", ""),
            ensemble_global_url: var_or("ENSEMBLE_GLOBAL_SOURCE_URL", ""),
            tropical_deterministic_url: var_or("TROPICAL_DETERMINISTIC_SOURCE_URL", ""),
            tropical_analysis_url: var_or("TROPICAL_ANALYSIS_SOURCE_URL", ""),
            tropical_ensemble_url: var_or("TROPICAL_ENSEMBLE_SOURCE_URL", ""),
        }
    }
}
