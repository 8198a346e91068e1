//! `WorkerConfig`: process-start immutable configuration for
//! `metget-worker`, following the same `from_env()` convention as
//! `metget-downloader`'s `DownloaderConfig`.

use metget_core::config::{var_or, var_parse_or, CommonConfig};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub common: CommonConfig,
    /// Durable fanout exchange build requests are published to (spec §4.7).
    pub amqp_exchange: String,
    /// Durable work queue this worker consumes (spec §4.7).
    pub amqp_queue: String,
    /// Retry bound: beyond this many `try`s, a transient failure becomes
    /// terminal (spec §4.9 "Worker bounded to try ≤ N (default 3)").
    pub max_tries: i32,
    /// Per-request soft deadline; exceeding it transitions the request to
    /// `error` (spec §5 "Worker per-request soft deadline: configurable").
    pub soft_deadline_secs: u64,
    /// Bound on the in-process LRU blob cache (spec §4.9 "LRU blob cache
    /// within the worker"), counted in cached blobs, not bytes.
    pub blob_cache_capacity: usize,
    /// TTL for the presigned GET URL written back onto the completed row.
    pub presign_ttl_secs: u64,
    /// A `running` row older than this is considered abandoned by a crashed
    /// worker and eligible for pickup again (spec §5: "queued → running uses
    /// conditional update ... or an expired `last_date` older than the
    /// visibility timeout").
    pub visibility_timeout_secs: i64,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            common: CommonConfig::from_env(),
            amqp_exchange: var_or("AMQP_BUILD_EXCHANGE", "metget.build"),
            amqp_queue: var_or("AMQP_BUILD_QUEUE", "metget.build.worker"),
            max_tries: var_parse_or("WORKER_MAX_TRIES", 3i32),
            soft_deadline_secs: var_parse_or("WORKER_SOFT_DEADLINE_SECS", 600u64),
            blob_cache_capacity: var_parse_or("WORKER_BLOB_CACHE_CAPACITY", 64usize),
            presign_ttl_secs: var_parse_or("WORKER_PRESIGN_TTL_SECS", 86_400u64),
            visibility_timeout_secs: var_parse_or("WORKER_VISIBILITY_TIMEOUT_SECS", 1800i64),
        }
    }
}
