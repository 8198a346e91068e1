//! Build Worker state machine (spec §4.9): `received -> running ->
//! {completed | error | requeued}`. Expressed against the `CatalogLookup`
//! (from `metget-selection`), `BlobSource`, and `RequestGate` capabilities so
//! the whole state machine is unit-testable without Postgres, S3, or a real
//! re-gridder — mirroring `metget-downloader::loop_runner`'s testability
//! seam.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use metget_core::model::RequestSpec;
use metget_core::MetGetError;
use metget_selection::{plan, CatalogLookup};
use uuid::Uuid;

use crate::blobs::BlobSource;
use crate::cache::BlobCache;
use crate::encode::{encode_output, TimestepFields};
use crate::regrid::Regridder;
use crate::requests::{BeginOutcome, RequestGate};

/// What the caller should do with the inbound envelope once `process`
/// returns.
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Ack: request completed, errored terminally, or was a duplicate of an
    /// already-terminal request.
    Ack,
    /// Nack with `requeue=true`: a transient failure under the retry bound.
    Requeue,
}

/// Outcome of one `process` call, logged by the caller.
#[derive(Debug, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub disposition: Disposition,
    pub status: &'static str,
}

/// Drive one envelope through the full build contract (spec §4.9 steps 1-6).
pub async fn process(
    request_id: Uuid,
    spec_json: &serde_json::Value,
    requests: &dyn RequestGate,
    lookup: &dyn CatalogLookup,
    blobs: &dyn BlobSource,
    cache: &mut BlobCache,
    regridder: &dyn Regridder,
    max_tries: i32,
    soft_deadline: Duration,
) -> Result<ProcessOutcome, MetGetError> {
    // Step 1: claim the row, or recognize a duplicate/terminal delivery.
    let try_count = match requests.begin(request_id).await? {
        BeginOutcome::Claimed(n) => n,
        BeginOutcome::Terminal => {
            return Ok(ProcessOutcome {
                disposition: Disposition::Ack,
                status: "duplicate",
            });
        }
        // Work is already in flight under this row; it must not be ack'd
        // away here, or a crash of the worker holding it would leave the
        // request stuck in `running` forever (spec §8 "Crash recovery").
        // Requeue so the envelope stays on the bus until the visibility
        // timeout lets a later delivery reclaim the row.
        BeginOutcome::RunningFresh => {
            return Ok(ProcessOutcome {
                disposition: Disposition::Requeue,
                status: "running_fresh",
            });
        }
    };

    let spec: RequestSpec = match serde_json::from_value(spec_json.clone()) {
        Ok(s) => s,
        Err(e) => {
            requests
                .fail(request_id, serde_json::json!({"error": format!("malformed request spec: {e}")}))
                .await?;
            return Ok(ProcessOutcome {
                disposition: Disposition::Ack,
                status: "error",
            });
        }
    };

    if let Err(e) = spec.validate() {
        requests
            .fail(request_id, serde_json::json!({"error": e.to_string()}))
            .await?;
        return Ok(ProcessOutcome {
            disposition: Disposition::Ack,
            status: "error",
        });
    }

    let deadline = Instant::now() + soft_deadline;

    // Step 2: selection.
    let selection = match plan(&spec, lookup).await {
        Ok(p) => p,
        Err(e) => return terminal_or_requeue(requests, request_id, try_count, max_tries, e).await,
    };

    if selection.has_unfillable_hole() {
        let message = selection
            .describe_first_hole()
            .unwrap_or_else(|| "coverage gap".to_string());
        requests
            .fail(request_id, serde_json::json!({"error": format!("coverage gap: {message}")}))
            .await?;
        return Ok(ProcessOutcome {
            disposition: Disposition::Ack,
            status: "error",
        });
    }

    // Step 3-4: pull bytes (through the cache), re-grid, compose the stack.
    // `level` is assumed unique per domain (one domain occupies one stack
    // position), so this map recovers each cell's target geometry.
    let geometry_by_level: HashMap<u32, &metget_core::model::DomainGeometry> =
        spec.domains.iter().map(|d| (d.level, &d.geometry)).collect();

    let mut coverage_summary: HashMap<String, usize> = HashMap::new();
    let mut fields = Vec::with_capacity(selection.timesteps.len());

    for ts in &selection.timesteps {
        if Instant::now() >= deadline {
            requests
                .fail(request_id, serde_json::json!({"error": "soft deadline exceeded"}))
                .await?;
            return Ok(ProcessOutcome {
                disposition: Disposition::Ack,
                status: "error",
            });
        }

        let mut domain_fields = Vec::with_capacity(ts.domains.len());
        for domain_cell in &ts.domains {
            let resolved = match domain_cell.cell.resolved() {
                Some(r) => r,
                None => continue, // already rejected above if any hole remains
            };
            let bytes = match fetch_cached(cache, blobs, &resolved.storage_key).await {
                Ok(b) => b,
                Err(e) => return terminal_or_requeue(requests, request_id, try_count, max_tries, e).await,
            };
            let geometry = match geometry_by_level.get(&domain_cell.level) {
                Some(g) => *g,
                None => continue,
            };
            let field = match regridder.regrid(&bytes, geometry).await {
                Ok(f) => f,
                Err(e) => return terminal_or_requeue(requests, request_id, try_count, max_tries, e).await,
            };
            *coverage_summary
                .entry(format!("level_{}", domain_cell.level))
                .or_insert(0) += 1;
            domain_fields.push((domain_cell.level, field));
        }
        fields.push(TimestepFields {
            valid_time: ts.valid_time,
            domains: domain_fields,
        });
    }

    // Step 5: encode and write the artifact (idempotent: overwrite-safe key).
    // Object-store key layout (spec §6): `{request_id}/{filename}.{ext}`.
    let output_key = format!("{request_id}/{}.{}", spec.filename, spec.format.extension());
    let encoded = encode_output(&spec, fields);
    if let Err(e) = blobs.put(&output_key, encoded).await {
        return terminal_or_requeue(requests, request_id, try_count, max_tries, e).await;
    }

    // Step 6: mark complete.
    requests
        .complete(
            request_id,
            serde_json::json!({
                "timesteps": selection.timesteps.len(),
                "coverage": coverage_summary,
            }),
        )
        .await?;

    Ok(ProcessOutcome {
        disposition: Disposition::Ack,
        status: "completed",
    })
}

async fn fetch_cached(cache: &mut BlobCache, blobs: &dyn BlobSource, key: &str) -> Result<bytes::Bytes, MetGetError> {
    if let Some(bytes) = cache.get(key) {
        return Ok(bytes);
    }
    let bytes = blobs.get(key).await?;
    cache.insert(key.to_string(), bytes.clone());
    Ok(bytes)
}

/// A transient failure (spec §5 "Transient ... do not ack; message
/// redelivered; worker bounded to try <= N") requeues until the bound is
/// exhausted, after which it becomes a terminal error.
async fn terminal_or_requeue(
    requests: &dyn RequestGate,
    request_id: Uuid,
    try_count: i32,
    max_tries: i32,
    error: MetGetError,
) -> Result<ProcessOutcome, MetGetError> {
    if error.is_transient() && try_count < max_tries {
        return Ok(ProcessOutcome {
            disposition: Disposition::Requeue,
            status: "requeued",
        });
    }
    requests
        .fail(request_id, serde_json::json!({"error": error.to_string(), "try_count": try_count}))
        .await?;
    Ok(ProcessOutcome {
        disposition: Disposition::Ack,
        status: "error",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use metget_core::model::{CatalogEntry, Domain, DomainGeometry, Identity, ModelFamily, OutputFormat, SelectionConstraints};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCatalog {
        rows: Mutex<StdHashMap<(ModelFamily, DateTime<Utc>), Vec<CatalogEntry>>>,
    }

    impl FakeCatalog {
        fn insert(&self, entry: CatalogEntry) {
            self.rows
                .lock()
                .unwrap()
                .entry((entry.family, entry.valid_time))
                .or_default()
                .push(entry);
        }
    }

    #[async_trait]
    impl CatalogLookup for FakeCatalog {
        async fn find_covering(
            &self,
            family: ModelFamily,
            valid_time: DateTime<Utc>,
            _constraints: &SelectionConstraints,
        ) -> Result<Vec<CatalogEntry>, MetGetError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&(family, valid_time))
                .cloned()
                .unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct FakeBlobs {
        puts: Mutex<Vec<(String, bytes::Bytes)>>,
        fail_get: Mutex<bool>,
    }

    #[async_trait]
    impl BlobSource for FakeBlobs {
        async fn get(&self, _key: &str) -> Result<bytes::Bytes, MetGetError> {
            if *self.fail_get.lock().unwrap() {
                Err(MetGetError::UpstreamUnavailable("synthetic".into()))
            } else {
                Ok(bytes::Bytes::from_static(b"grib"))
            }
        }
        async fn put(&self, key: &str, bytes: bytes::Bytes) -> Result<(), MetGetError> {
            self.puts.lock().unwrap().push((key.to_string(), bytes));
            Ok(())
        }
    }

    struct StubRegridder;

    #[async_trait]
    impl Regridder for StubRegridder {
        async fn regrid(
            &self,
            _bytes: &[u8],
            target: &metget_core::model::DomainGeometry,
        ) -> Result<crate::regrid::GriddedField, MetGetError> {
            let (ni, nj) = match target {
                DomainGeometry::Corner { ni, nj, .. } => (*ni, *nj),
                _ => (1, 1),
            };
            Ok(crate::regrid::GriddedField::filled(ni, nj, 1.0))
        }
    }

    #[derive(Default)]
    struct FakeRequests {
        tries: Mutex<StdHashMap<Uuid, i32>>,
        terminal: Mutex<std::collections::HashSet<Uuid>>,
        running_fresh: Mutex<std::collections::HashSet<Uuid>>,
        completions: Mutex<Vec<Uuid>>,
        failures: Mutex<Vec<(Uuid, serde_json::Value)>>,
    }

    #[async_trait]
    impl RequestGate for FakeRequests {
        async fn begin(&self, request_id: Uuid) -> Result<BeginOutcome, MetGetError> {
            if self.terminal.lock().unwrap().contains(&request_id) {
                return Ok(BeginOutcome::Terminal);
            }
            if self.running_fresh.lock().unwrap().contains(&request_id) {
                return Ok(BeginOutcome::RunningFresh);
            }
            let mut tries = self.tries.lock().unwrap();
            let entry = tries.entry(request_id).or_insert(0);
            *entry += 1;
            Ok(BeginOutcome::Claimed(*entry))
        }
        async fn complete(&self, request_id: Uuid, _message: serde_json::Value) -> Result<(), MetGetError> {
            self.terminal.lock().unwrap().insert(request_id);
            self.completions.lock().unwrap().push(request_id);
            Ok(())
        }
        async fn fail(&self, request_id: Uuid, message: serde_json::Value) -> Result<(), MetGetError> {
            self.terminal.lock().unwrap().insert(request_id);
            self.failures.lock().unwrap().push((request_id, message));
            Ok(())
        }
    }

    fn sample_spec() -> RequestSpec {
        RequestSpec {
            start_date: "2024-01-01T00:00:00Z".parse().unwrap(),
            end_date: "2024-01-01T03:00:00Z".parse().unwrap(),
            time_step: 3600,
            format: OutputFormat::OwiAscii,
            nowcast: false,
            multiple_forecasts: false,
            backfill: false,
            background_pressure: None,
            null_value: -999.0,
            epsg: 4326,
            filename: "out".into(),
            domains: vec![Domain {
                geometry: DomainGeometry::Corner {
                    corner_x: -100.0,
                    corner_y: 20.0,
                    delta_x: 0.25,
                    delta_y: 0.25,
                    ni: 4,
                    nj: 4,
                },
                service: "global".into(),
                level: 0,
                ensemble_member: None,
                storm_name: None,
                basin: None,
                storm_year: None,
                storm_number: None,
                advisory: None,
            }],
        }
    }

    fn full_catalog() -> FakeCatalog {
        let catalog = FakeCatalog::default();
        for tau in 0..=3 {
            let cycle: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
            catalog.insert(CatalogEntry {
                family: ModelFamily::Global,
                identity: Identity::Deterministic,
                forecast_cycle: cycle,
                valid_time: cycle + chrono::Duration::hours(tau),
                tau,
                storage_key: format!("global/{tau:03}.bin"),
                accessed: cycle,
                payload_meta: serde_json::json!({}),
            });
        }
        catalog
    }

    #[tokio::test]
    async fn successful_build_completes_and_writes_artifact() {
        let requests = FakeRequests::default();
        let catalog = full_catalog();
        let blobs = FakeBlobs::default();
        let mut cache = BlobCache::new(8);
        let request_id = Uuid::new_v4();

        let spec_json = serde_json::to_value(sample_spec()).unwrap();
        let outcome = process(
            request_id,
            &spec_json,
            &requests,
            &catalog,
            &blobs,
            &mut cache,
            &StubRegridder,
            3,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, "completed");
        assert_eq!(outcome.disposition, Disposition::Ack);
        assert_eq!(requests.completions.lock().unwrap().len(), 1);
        assert_eq!(blobs.puts.lock().unwrap().len(), 1);
    }

    /// A duplicate delivery of an already-terminal request is ack'd without
    /// re-running the build (spec §4.9 step 1).
    #[tokio::test]
    async fn duplicate_delivery_of_terminal_request_is_ignored() {
        let requests = FakeRequests::default();
        let request_id = Uuid::new_v4();
        requests.terminal.lock().unwrap().insert(request_id);

        let catalog = full_catalog();
        let blobs = FakeBlobs::default();
        let mut cache = BlobCache::new(8);
        let spec_json = serde_json::to_value(sample_spec()).unwrap();

        let outcome = process(
            request_id,
            &spec_json,
            &requests,
            &catalog,
            &blobs,
            &mut cache,
            &StubRegridder,
            3,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, "duplicate");
        assert!(blobs.puts.lock().unwrap().is_empty());
    }

    /// Spec §8 scenario 6 / §5 "Crash recovery": a redelivery that lands
    /// while the prior attempt's `running` row is still inside its
    /// visibility window must NOT be ack'd away as a duplicate — that
    /// would drop the only copy of the work if the prior attempt had
    /// crashed. It requeues instead, leaving the row for a later delivery
    /// to reclaim once the timeout elapses.
    #[tokio::test]
    async fn redelivery_within_visibility_window_requeues_instead_of_acking() {
        let requests = FakeRequests::default();
        let request_id = Uuid::new_v4();
        requests.running_fresh.lock().unwrap().insert(request_id);

        let catalog = full_catalog();
        let blobs = FakeBlobs::default();
        let mut cache = BlobCache::new(8);
        let spec_json = serde_json::to_value(sample_spec()).unwrap();

        let outcome = process(
            request_id,
            &spec_json,
            &requests,
            &catalog,
            &blobs,
            &mut cache,
            &StubRegridder,
            3,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(outcome.disposition, Disposition::Requeue);
        assert!(blobs.puts.lock().unwrap().is_empty());
        assert!(requests.completions.lock().unwrap().is_empty());
        assert!(requests.failures.lock().unwrap().is_empty());
    }

    /// Spec §8 scenario 3: a coverage gap with `backfill=false` fails the
    /// request terminally (not a retry).
    #[tokio::test]
    async fn coverage_gap_fails_terminally_without_retry() {
        let requests = FakeRequests::default();
        let catalog = FakeCatalog::default(); // empty: everything is a hole
        let blobs = FakeBlobs::default();
        let mut cache = BlobCache::new(8);
        let request_id = Uuid::new_v4();
        let spec_json = serde_json::to_value(sample_spec()).unwrap();

        let outcome = process(
            request_id,
            &spec_json,
            &requests,
            &catalog,
            &blobs,
            &mut cache,
            &StubRegridder,
            3,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, "error");
        assert_eq!(outcome.disposition, Disposition::Ack);
        assert_eq!(requests.failures.lock().unwrap().len(), 1);
    }

    /// Spec §5: a transient C2 failure under the retry bound requeues
    /// instead of terminally failing.
    #[tokio::test]
    async fn transient_blob_failure_requeues_under_retry_bound() {
        let requests = FakeRequests::default();
        let catalog = full_catalog();
        let blobs = FakeBlobs::default();
        *blobs.fail_get.lock().unwrap() = true;
        let mut cache = BlobCache::new(8);
        let request_id = Uuid::new_v4();
        let spec_json = serde_json::to_value(sample_spec()).unwrap();

        let outcome = process(
            request_id,
            &spec_json,
            &requests,
            &catalog,
            &blobs,
            &mut cache,
            &StubRegridder,
            3,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(outcome.disposition, Disposition::Requeue);
        assert!(requests.failures.lock().unwrap().is_empty());
    }

    /// Beyond the retry bound, a transient failure becomes terminal (spec
    /// §4.9 "Beyond bound, set status=error, ack").
    #[tokio::test]
    async fn transient_failure_becomes_terminal_past_retry_bound() {
        let requests = FakeRequests::default();
        requests.tries.lock().unwrap().insert(Uuid::nil(), 0);
        let catalog = full_catalog();
        let blobs = FakeBlobs::default();
        *blobs.fail_get.lock().unwrap() = true;
        let mut cache = BlobCache::new(8);
        let request_id = Uuid::nil();
        let spec_json = serde_json::to_value(sample_spec()).unwrap();

        // max_tries=1: the single `begin()` call already reaches the bound.
        let outcome = process(
            request_id,
            &spec_json,
            &requests,
            &catalog,
            &blobs,
            &mut cache,
            &StubRegridder,
            1,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(outcome.disposition, Disposition::Ack);
        assert_eq!(outcome.status, "error");
        assert_eq!(requests.failures.lock().unwrap().len(), 1);
    }
}
