//! The core selection algorithm (spec §4.8): enumerate timesteps, resolve
//! each domain against the catalog, then walk the domain stack applying
//! backfill. Pure with respect to I/O beyond the `CatalogLookup` capability.

use chrono::{DateTime, Utc};
use metget_core::model::{CatalogEntry, Identity, ModelFamily, RequestSpec, SelectionConstraints};
use metget_core::MetGetError;
use std::collections::HashSet;

use crate::lookup::CatalogLookup;
use crate::timesteps::enumerate_timesteps;

/// A catalog row resolved for one `(timestep, domain)` cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCell {
    pub family: ModelFamily,
    pub identity: Identity,
    pub forecast_cycle: DateTime<Utc>,
    pub tau: i64,
    pub storage_key: String,
}

impl From<CatalogEntry> for ResolvedCell {
    fn from(e: CatalogEntry) -> Self {
        ResolvedCell {
            family: e.family,
            identity: e.identity,
            forecast_cycle: e.forecast_cycle,
            tau: e.tau,
            storage_key: e.storage_key,
        }
    }
}

/// Per-domain, per-timestep outcome after stack resolution (spec §4.8 step
/// 4). `Backfilled` carries the lower-level domain's row that fills the
/// hole; `Hole` is unfillable (backfill disabled, or nothing lower covers
/// it) and is what `metget-worker` checks to decide `CoverageGap`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanCell {
    Resolved(ResolvedCell),
    Backfilled(ResolvedCell),
    Hole,
}

impl PlanCell {
    pub fn is_hole(&self) -> bool {
        matches!(self, PlanCell::Hole)
    }

    pub fn resolved(&self) -> Option<&ResolvedCell> {
        match self {
            PlanCell::Resolved(c) | PlanCell::Backfilled(c) => Some(c),
            PlanCell::Hole => None,
        }
    }
}

/// One domain's resolved cell at one timestep, carrying the domain's
/// `level` so callers can reconstruct the ascending-level stack order
/// without re-deriving it from the request spec.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainCell {
    pub level: u32,
    pub cell: PlanCell,
}

/// All domains' cells for one output timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestepPlan {
    pub valid_time: DateTime<Utc>,
    /// Ascending by `level` (spec §4.8 step 4: "walk domains in ascending level").
    pub domains: Vec<DomainCell>,
}

/// The full plan: one `TimestepPlan` per output timestep (spec §4.8
/// "Output").
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionPlan {
    pub timesteps: Vec<TimestepPlan>,
}

impl SelectionPlan {
    /// `true` if any cell, after backfill resolution, remains a `Hole`
    /// (spec §4.9 step 2: "plan has any unfillable hole with backfill=false").
    pub fn has_unfillable_hole(&self) -> bool {
        self.timesteps
            .iter()
            .any(|ts| ts.domains.iter().any(|d| d.cell.is_hole()))
    }

    /// Human-readable description of the first unfillable hole, for the
    /// `CoverageGap` error message (spec §8 scenario 3).
    pub fn describe_first_hole(&self) -> Option<String> {
        for ts in &self.timesteps {
            for d in &ts.domains {
                if d.cell.is_hole() {
                    return Some(format!(
                        "no coverage for domain level {} at valid_time {}",
                        d.level, ts.valid_time
                    ));
                }
            }
        }
        None
    }
}

fn constraints_for(spec: &RequestSpec, domain: &metget_core::model::Domain) -> SelectionConstraints {
    SelectionConstraints {
        nowcast: spec.nowcast,
        ensemble_member: domain.effective_ensemble_member(),
        storm_name: domain.storm_name.clone(),
        basin: domain.basin.clone(),
        storm_year: domain.storm_year,
    }
}

/// Rows sorted by `find_covering`'s contract (forecast_cycle desc, tau asc,
/// storage_key asc); the first entry is the tie-break winner (spec §4.8
/// step 3e).
fn best_row(rows: &[CatalogEntry]) -> Option<CatalogEntry> {
    rows.first().cloned()
}

/// Resolve one domain across every timestep, honoring `multiple_forecasts`
/// (spec §4.8 steps 3c/3d).
async fn resolve_domain(
    spec: &RequestSpec,
    domain: &metget_core::model::Domain,
    timesteps: &[DateTime<Utc>],
    lookup: &dyn CatalogLookup,
) -> Result<Vec<PlanCell>, MetGetError> {
    let family = ModelFamily::from_tag(&domain.service).ok_or_else(|| {
        MetGetError::Validation(format!("domain service '{}' has no known family", domain.service))
    })?;
    let constraints = constraints_for(spec, domain);

    if spec.multiple_forecasts {
        let mut cells = Vec::with_capacity(timesteps.len());
        for t in timesteps {
            let rows = lookup.find_covering(family, *t, &constraints).await?;
            cells.push(match best_row(&rows) {
                Some(row) => PlanCell::Resolved(row.into()),
                None => PlanCell::Hole,
            });
        }
        Ok(cells)
    } else {
        // Step 3c: the single cycle such that every t has coverage; the
        // latest such cycle wins.
        let mut rows_per_t = Vec::with_capacity(timesteps.len());
        for t in timesteps {
            rows_per_t.push(lookup.find_covering(family, *t, &constraints).await?);
        }

        let mut common_cycles: Option<HashSet<DateTime<Utc>>> = None;
        for rows in &rows_per_t {
            let cycles: HashSet<DateTime<Utc>> = rows.iter().map(|r| r.forecast_cycle).collect();
            common_cycles = Some(match common_cycles {
                None => cycles,
                Some(acc) => acc.intersection(&cycles).copied().collect(),
            });
        }
        let chosen_cycle = common_cycles.unwrap_or_default().into_iter().max();

        match chosen_cycle {
            None => Ok(vec![PlanCell::Hole; timesteps.len()]),
            Some(cycle) => Ok(rows_per_t
                .into_iter()
                .map(|rows| {
                    rows.into_iter()
                        .filter(|r| r.forecast_cycle == cycle)
                        .min_by(|a, b| a.tau.cmp(&b.tau).then_with(|| a.storage_key.cmp(&b.storage_key)))
                        .map(|r| PlanCell::Resolved(r.into()))
                        .unwrap_or(PlanCell::Hole)
                })
                .collect()),
        }
    }
}

/// Apply backfill to one timestep's per-domain cells, ascending by level
/// (spec §4.8 step 4). Domains must already be sorted ascending by level.
fn apply_backfill(mut domains: Vec<DomainCell>, backfill: bool) -> Vec<DomainCell> {
    for i in 0..domains.len() {
        if !domains[i].cell.is_hole() {
            continue;
        }
        if !backfill {
            continue;
        }
        let fill = domains[..i]
            .iter()
            .rev()
            .find_map(|d| d.cell.resolved().cloned());
        if let Some(resolved) = fill {
            domains[i].cell = PlanCell::Backfilled(resolved);
        }
    }
    domains
}

/// Translate a validated request spec into a selection plan (spec §4.8).
/// Callers must have already run `RequestSpec::validate()`.
pub async fn plan(spec: &RequestSpec, lookup: &dyn CatalogLookup) -> Result<SelectionPlan, MetGetError> {
    let timesteps = enumerate_timesteps(spec);

    let mut sorted_domains = spec.domains.iter().collect::<Vec<_>>();
    sorted_domains.sort_by_key(|d| d.level);

    let mut per_domain_cells = Vec::with_capacity(sorted_domains.len());
    for domain in &sorted_domains {
        per_domain_cells.push(resolve_domain(spec, domain, &timesteps, lookup).await?);
    }

    let mut out = Vec::with_capacity(timesteps.len());
    for (i, t) in timesteps.into_iter().enumerate() {
        let domains: Vec<DomainCell> = sorted_domains
            .iter()
            .zip(per_domain_cells.iter())
            .map(|(d, cells)| DomainCell {
                level: d.level,
                cell: cells[i].clone(),
            })
            .collect();
        out.push(TimestepPlan {
            valid_time: t,
            domains: apply_backfill(domains, spec.backfill),
        });
    }

    Ok(SelectionPlan { timesteps: out })
}

#[cfg(test)]
mod tests {
    use super::*;
    use metget_core::model::{Domain, DomainGeometry, OutputFormat};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory `CatalogLookup` fixture keyed by `(family, valid_time)`,
    /// mirroring `CatalogStore::find_covering`'s contract: callers get back
    /// rows pre-sorted by forecast_cycle desc, tau asc, storage_key asc.
    #[derive(Default)]
    struct FakeCatalog {
        rows: Mutex<HashMap<(ModelFamily, DateTime<Utc>), Vec<CatalogEntry>>>,
    }

    impl FakeCatalog {
        fn insert(&self, entry: CatalogEntry) {
            let mut rows = self.rows.lock().unwrap();
            rows.entry((entry.family, entry.valid_time)).or_default().push(entry);
        }
    }

    #[async_trait::async_trait]
    impl CatalogLookup for FakeCatalog {
        async fn find_covering(
            &self,
            family: ModelFamily,
            valid_time: DateTime<Utc>,
            constraints: &SelectionConstraints,
        ) -> Result<Vec<CatalogEntry>, MetGetError> {
            let rows = self.rows.lock().unwrap();
            let mut matches: Vec<CatalogEntry> = rows
                .get(&(family, valid_time))
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|r| !constraints.nowcast || r.tau == 0)
                .collect();
            matches.sort_by(|a, b| {
                b.forecast_cycle
                    .cmp(&a.forecast_cycle)
                    .then_with(|| a.tau.cmp(&b.tau))
                    .then_with(|| a.storage_key.cmp(&b.storage_key))
            });
            Ok(matches)
        }
    }

    fn entry(family: ModelFamily, cycle: &str, tau: i64, key: &str) -> CatalogEntry {
        let cycle: DateTime<Utc> = cycle.parse().unwrap();
        CatalogEntry {
            family,
            identity: Identity::Deterministic,
            forecast_cycle: cycle,
            valid_time: cycle + chrono::Duration::hours(tau),
            tau,
            storage_key: key.into(),
            accessed: cycle,
            payload_meta: serde_json::json!({}),
        }
    }

    fn domain(service: &str, level: u32) -> Domain {
        Domain {
            geometry: DomainGeometry::Corner {
                corner_x: -100.0,
                corner_y: 20.0,
                delta_x: 0.25,
                delta_y: 0.25,
                ni: 10,
                nj: 10,
            },
            service: service.into(),
            level,
            ensemble_member: None,
            storm_name: None,
            basin: None,
            storm_year: None,
            storm_number: None,
            advisory: None,
        }
    }

    fn base_spec(domains: Vec<Domain>) -> RequestSpec {
        RequestSpec {
            start_date: "2024-01-01T00:00:00Z".parse().unwrap(),
            end_date: "2024-01-02T00:00:00Z".parse().unwrap(),
            time_step: 3600,
            format: OutputFormat::OwiAscii,
            nowcast: false,
            multiple_forecasts: false,
            backfill: false,
            background_pressure: None,
            null_value: -999.0,
            epsg: 4326,
            filename: "out".into(),
            domains,
        }
    }

    /// Scenario 1 (spec §8): single cycle, full hourly coverage, one domain.
    #[tokio::test]
    async fn happy_path_resolves_every_timestep() {
        let catalog = FakeCatalog::default();
        for tau in 0..=24 {
            catalog.insert(entry(
                ModelFamily::Global,
                "2024-01-01T00:00:00Z",
                tau,
                &format!("global/{tau:03}.bin"),
            ));
        }
        let spec = base_spec(vec![domain("global", 0)]);
        let result = plan(&spec, &catalog).await.unwrap();

        assert_eq!(result.timesteps.len(), 25);
        assert!(!result.has_unfillable_hole());
        for ts in &result.timesteps {
            assert_eq!(ts.domains.len(), 1);
            assert!(matches!(ts.domains[0].cell, PlanCell::Resolved(_)));
        }
    }

    /// Scenario 2: two overlapping cycles, `multiple_forecasts=true`; the
    /// newer cycle wins at `t=12` where both cover.
    #[tokio::test]
    async fn multiple_forecasts_prefers_newer_cycle_at_overlap() {
        let catalog = FakeCatalog::default();
        for tau in 0..=12 {
            catalog.insert(entry(
                ModelFamily::Global,
                "2024-01-01T00:00:00Z",
                tau,
                &format!("global/00z/{tau:03}.bin"),
            ));
        }
        for tau in 0..=12 {
            catalog.insert(entry(
                ModelFamily::Global,
                "2024-01-01T12:00:00Z",
                tau,
                &format!("global/12z/{tau:03}.bin"),
            ));
        }

        let mut spec = base_spec(vec![domain("global", 0)]);
        spec.multiple_forecasts = true;

        let result = plan(&spec, &catalog).await.unwrap();
        assert!(!result.has_unfillable_hole());

        let at_12 = &result.timesteps[12];
        let resolved = at_12.domains[0].cell.resolved().unwrap();
        assert_eq!(resolved.forecast_cycle, "2024-01-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap());

        let at_11 = &result.timesteps[11];
        let resolved11 = at_11.domains[0].cell.resolved().unwrap();
        assert_eq!(resolved11.forecast_cycle, "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    /// Scenario 3: a hole at `12:00` with `backfill=false` stays unfillable.
    #[tokio::test]
    async fn coverage_gap_without_backfill_is_unfillable() {
        let catalog = FakeCatalog::default();
        for tau in 0..=24 {
            if tau == 12 {
                continue;
            }
            catalog.insert(entry(
                ModelFamily::Global,
                "2024-01-01T00:00:00Z",
                tau,
                &format!("global/{tau:03}.bin"),
            ));
        }
        let spec = base_spec(vec![domain("global", 0)]);
        let result = plan(&spec, &catalog).await.unwrap();
        assert!(result.has_unfillable_hole());
        assert!(result.describe_first_hole().unwrap().contains("12:00"));
    }

    /// Scenario 4: fine domain (level 1) missing `12:00`, coarse domain
    /// (level 0) covers it; `backfill=true` fills the hole with coarse data
    /// while every other timestep still uses fine data.
    ///
    /// Needs `multiple_forecasts=true`: under the default per-request
    /// single-cycle rule (step 3c), one missing `t` empties the whole
    /// cycle intersection for a domain, turning it into a hole at *every*
    /// timestep rather than just `12:00` — which would mask the
    /// fine-everywhere-but-one-hole behavior this scenario is about.
    #[tokio::test]
    async fn backfill_fills_hole_from_lower_level() {
        let catalog = FakeCatalog::default();
        for tau in 0..=24 {
            catalog.insert(entry(
                ModelFamily::Global,
                "2024-01-01T00:00:00Z",
                tau,
                &format!("coarse/{tau:03}.bin"),
            ));
        }
        for tau in 0..=24 {
            if tau == 12 {
                continue;
            }
            catalog.insert(entry(
                ModelFamily::Regional,
                "2024-01-01T00:00:00Z",
                tau,
                &format!("fine/{tau:03}.bin"),
            ));
        }

        let mut spec = base_spec(vec![domain("global", 0), domain("regional", 1)]);
        spec.backfill = true;
        spec.multiple_forecasts = true;

        let result = plan(&spec, &catalog).await.unwrap();
        assert!(!result.has_unfillable_hole());

        let at_12 = &result.timesteps[12];
        assert!(matches!(at_12.domains[1].cell, PlanCell::Backfilled(_)));
        assert_eq!(at_12.domains[1].cell.resolved().unwrap().storage_key, "coarse/012.bin");

        for (i, ts) in result.timesteps.iter().enumerate() {
            if i == 12 {
                continue;
            }
            assert!(
                matches!(ts.domains[1].cell, PlanCell::Resolved(_)),
                "timestep {i} should use fine data directly, not backfill"
            );
            assert_eq!(
                ts.domains[1].cell.resolved().unwrap().storage_key,
                format!("fine/{i:03}.bin")
            );
        }
    }

    #[test]
    fn apply_backfill_leaves_base_level_hole_unfilled() {
        let domains = vec![DomainCell { level: 0, cell: PlanCell::Hole }];
        let result = apply_backfill(domains, true);
        assert!(result[0].cell.is_hole());
    }
}
