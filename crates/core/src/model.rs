//! Domain types shared by the catalog, selection engine, API, and workers
//! (spec §3). Catalog polymorphism across families is modelled as a sum type
//! (`Identity`) with a common `uniqueness_key()` capability rather than one
//! monolithic row type with many nullable columns (design note §9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the upstream model families a `CatalogEntry` can belong to
/// (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Global,
    Regional,
    RegionalAlaska,
    Precipitation,
    EnsembleGlobal,
    TropicalDeterministic,
    TropicalEnsemble,
    TropicalAnalysis,
}

impl ModelFamily {
    /// All known families, used to build per-family catalog tables and
    /// downloader schedules.
    pub const ALL: [ModelFamily; 8] = [
        ModelFamily::Global,
        ModelFamily::Regional,
        ModelFamily::RegionalAlaska,
        ModelFamily::Precipitation,
        ModelFamily::EnsembleGlobal,
        ModelFamily::TropicalDeterministic,
        ModelFamily::TropicalEnsemble,
        ModelFamily::TropicalAnalysis,
    ];

    /// Stable lowercase tag used as the Postgres table suffix, object-store
    /// key component, and wire identifier.
    pub fn tag(self) -> &'static str {
        match self {
            ModelFamily::Global => "global",
            ModelFamily::Regional => "regional",
            ModelFamily::RegionalAlaska => "regional_alaska",
            ModelFamily::Precipitation => "precipitation",
            ModelFamily::EnsembleGlobal => "ensemble_global",
            ModelFamily::TropicalDeterministic => "tropical_deterministic",
            ModelFamily::TropicalEnsemble => "tropical_ensemble",
            ModelFamily::TropicalAnalysis => "tropical_analysis",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        ModelFamily::ALL.into_iter().find(|f| f.tag() == tag)
    }

    /// Families whose rows require an `ensemble_member` identity component.
    pub fn is_ensemble(self) -> bool {
        matches!(self, ModelFamily::EnsembleGlobal | ModelFamily::TropicalEnsemble)
    }

    /// Families whose rows require a tropical storm identity component.
    pub fn is_tropical(self) -> bool {
        matches!(
            self,
            ModelFamily::TropicalDeterministic
                | ModelFamily::TropicalEnsemble
                | ModelFamily::TropicalAnalysis
        )
    }

    /// "A family declaring analysis rather than forecast treats every row as
    /// tau=0" (spec §4.8 edge-case policy).
    pub fn is_analysis(self) -> bool {
        matches!(self, ModelFamily::TropicalAnalysis)
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// The identity sub-key that, together with `forecast_cycle`/`valid_time`,
/// makes a `CatalogEntry` unique within its family (spec §3 invariants).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    /// Deterministic families: uniqueness is `(forecast_cycle, valid_time)`.
    Deterministic,
    /// Ensemble families: adds `ensemble_member`.
    Ensemble { member: String },
    /// Tropical families: storm identity + advisory. `ensemble_member` is
    /// `Some` only for `TropicalEnsemble`, which additively needs both the
    /// storm identity *and* the member (spec §3: "for ensemble add
    /// ensemble_member; for tropical add storm identity + advisory").
    Tropical {
        storm_name: String,
        basin: String,
        storm_year: i32,
        storm_number: i32,
        advisory: i32,
        ensemble_member: Option<String>,
    },
}

impl Identity {
    pub fn ensemble_member(&self) -> Option<&str> {
        match self {
            Identity::Ensemble { member } => Some(member),
            Identity::Tropical { ensemble_member, .. } => ensemble_member.as_deref(),
            Identity::Deterministic => None,
        }
    }

    pub fn storm_name(&self) -> Option<&str> {
        match self {
            Identity::Tropical { storm_name, .. } => Some(storm_name),
            _ => None,
        }
    }

    /// A stable string suitable as part of a composite uniqueness key or
    /// object-store path segment.
    pub fn key_fragment(&self) -> String {
        match self {
            Identity::Deterministic => String::new(),
            Identity::Ensemble { member } => member.clone(),
            Identity::Tropical {
                storm_name,
                basin,
                storm_year,
                storm_number,
                advisory,
                ensemble_member,
            } => {
                let base = format!("{basin}{storm_number:02}{storm_year}/{storm_name}/adv{advisory:03}");
                match ensemble_member {
                    Some(m) => format!("{base}/{m}"),
                    None => base,
                }
            }
        }
    }
}

/// One row of the catalog: a concrete binary field available at a given
/// `(family, identity, valid_time)` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub family: ModelFamily,
    pub identity: Identity,
    pub forecast_cycle: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    /// Lead time in hours. Always `valid_time - forecast_cycle`; for
    /// analysis families this is forced to 0 (spec §4.8).
    pub tau: i64,
    pub storage_key: String,
    pub accessed: DateTime<Utc>,
    pub payload_meta: serde_json::Value,
}

impl CatalogEntry {
    /// The uniqueness key spec §3 mandates per family: `(forecast_cycle,
    /// valid_time[, ensemble_member | storm identity + advisory])`.
    pub fn uniqueness_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.family.tag(),
            self.forecast_cycle.to_rfc3339(),
            self.valid_time.to_rfc3339(),
            self.identity.key_fragment(),
        )
    }

    /// `tau >= 0 && forecast_cycle + tau·h == valid_time` (spec §3 invariant).
    pub fn tau_is_consistent(&self) -> bool {
        if self.tau < 0 {
            return false;
        }
        self.forecast_cycle + chrono::Duration::hours(self.tau) == self.valid_time
    }
}

/// Filters applied when resolving catalog coverage for a single timestep
/// (spec §4.1 `find_covering`, §4.8 step 3b-3c).
#[derive(Debug, Clone, Default)]
pub struct SelectionConstraints {
    pub nowcast: bool,
    pub ensemble_member: Option<String>,
    pub storm_name: Option<String>,
    pub basin: Option<String>,
    pub storm_year: Option<i32>,
}

/// Lifecycle state of a `Request` row (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Queued,
    Running,
    Error,
    Completed,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Error | RequestStatus::Completed)
    }

    pub fn tag(self) -> &'static str {
        match self {
            RequestStatus::Queued => "queued",
            RequestStatus::Running => "running",
            RequestStatus::Error => "error",
            RequestStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One row per client build request (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub try_count: i32,
    pub start_date: DateTime<Utc>,
    pub last_date: DateTime<Utc>,
    pub api_key: String,
    pub source_ip: String,
    pub credit_usage: i64,
    pub input_data: serde_json::Value,
    pub message: serde_json::Value,
}

/// An API key row (spec §3). `credit_limit = -1` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub username: String,
    pub credit_limit: i64,
    pub credit_used: i64,
    pub enabled: bool,
    pub expiration: Option<DateTime<Utc>>,
    /// Per-source allow-list, e.g. `{"allow": ["gfs", "nhc"]}`.
    pub permissions: serde_json::Value,
}

impl ApiKey {
    pub fn is_unlimited(&self) -> bool {
        self.credit_limit < 0
    }

    pub fn remaining(&self) -> i64 {
        if self.is_unlimited() {
            i64::MAX
        } else {
            (self.credit_limit - self.credit_used).max(0)
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|exp| now >= exp)
    }

    /// Whether this key's permission allow-list covers `service`. An empty
    /// or missing `allow` list means "allow everything" (matches a freshly
    /// provisioned key with no restrictions configured).
    pub fn allows_service(&self, service: &str) -> bool {
        match self.permissions.get("allow").and_then(|v| v.as_array()) {
            None => true,
            Some(list) if list.is_empty() => true,
            Some(list) => list.iter().any(|v| v.as_str() == Some(service)),
        }
    }
}

/// Output encoding requested for a build (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    OwiAscii,
    OwiNetcdf,
    RasNetcdf,
    Delft3d,
}

impl OutputFormat {
    /// File extension for the object-store key layout (spec §6:
    /// `{request_id}/{filename}.{ext}`).
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::OwiAscii => "owi",
            OutputFormat::OwiNetcdf => "nc",
            OutputFormat::RasNetcdf => "nc",
            OutputFormat::Delft3d => "d3d",
        }
    }
}

/// Geometry of one output domain (spec §3: corner+δ, origin+δ+ni+nj+rotation,
/// or a named preset).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainGeometry {
    Corner {
        corner_x: f64,
        corner_y: f64,
        delta_x: f64,
        delta_y: f64,
        ni: u32,
        nj: u32,
    },
    Origin {
        x_init: f64,
        y_init: f64,
        di: f64,
        dj: f64,
        ni: u32,
        nj: u32,
        rotation: f64,
    },
    Preset {
        name: String,
    },
}

/// Preset domain dimensions. The real tariff/geometry table lives upstream
/// of this crate (open question, `DESIGN.md`); this registry documents the
/// handful of presets exercised by tests and is the seam a production
/// deployment replaces with its full catalog of named domains.
pub fn preset_dims(name: &str) -> Option<(u32, u32)> {
    match name {
        "conus" => Some((1200, 700)),
        "gulf" => Some((400, 300)),
        "atlantic_basin" => Some((900, 900)),
        _ => None,
    }
}

impl DomainGeometry {
    /// Total cell count, used for the credit-usage formula (spec §4.6 step
    /// 3, open question in `DESIGN.md`).
    pub fn cell_count(&self) -> Option<u64> {
        match self {
            DomainGeometry::Corner { ni, nj, .. } => Some(*ni as u64 * *nj as u64),
            DomainGeometry::Origin { ni, nj, .. } => Some(*ni as u64 * *nj as u64),
            DomainGeometry::Preset { name } => {
                preset_dims(name).map(|(ni, nj)| ni as u64 * nj as u64)
            }
        }
    }
}

/// One domain in a request's domain stack (spec §3). `service` selects the
/// `ModelFamily` (selection engine resolves it via `ModelFamily::from_tag`,
/// since every `SourceAdapter::service_name` equals its family's tag); the
/// identity fields scope that family to a specific ensemble member or
/// tropical storm when the family requires one (spec §4.8 edge cases:
/// "ensemble families require `ensemble_member`"; "storm-scoped families
/// require `storm_name` + year").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub geometry: DomainGeometry,
    /// Selects which `SourceAdapter`/`ModelFamily` feeds this domain.
    pub service: String,
    /// Stacking priority; 0 = base (highest priority, spec §4.8 step 4).
    pub level: u32,
    /// Required for ensemble families; unspecified defaults to the
    /// `"mean"` member (DESIGN.md: ensemble default-member open question).
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

impl Domain {
    /// Ensemble member to select for this domain: the explicit value, or
    /// `"mean"` when the family is ensemble-shaped and none was given
    /// (spec §4.8: "otherwise default 'mean' ... per adapter policy").
    pub fn effective_ensemble_member(&self) -> Option<String> {
        self.ensemble_member.clone().or_else(|| {
            ModelFamily::from_tag(&self.service)
                .filter(|f| f.is_ensemble())
                .map(|_| "mean".to_string())
        })
    }
}

/// The validated build request submitted to `POST /build` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSpec {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Output cadence, seconds.
    pub time_step: i64,
    pub format: OutputFormat,
    pub nowcast: bool,
    pub multiple_forecasts: bool,
    pub backfill: bool,
    pub background_pressure: Option<f64>,
    pub null_value: f64,
    pub epsg: i32,
    pub filename: String,
    pub domains: Vec<Domain>,
}

impl RequestSpec {
    /// Canonicalized JSON used as `Request.input_data` and for the
    /// idempotency-key dedup window (spec §4.6). Serialization is already
    /// deterministic (struct field order), so this just re-serializes via
    /// `serde_json` rather than hand-rolling key sorting.
    pub fn canonical_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Validation per spec §4.6 step 2: `start < end`, `time_step > 0`,
    /// domain geometry closed (positive cell counts / resolvable presets).
    pub fn validate(&self) -> Result<(), crate::MetGetError> {
        if self.start_date >= self.end_date {
            return Err(crate::MetGetError::Validation(
                "start_date must be before end_date".into(),
            ));
        }
        if self.time_step <= 0 {
            return Err(crate::MetGetError::Validation(
                "time_step must be positive".into(),
            ));
        }
        if self.domains.is_empty() {
            return Err(crate::MetGetError::Validation(
                "at least one domain is required".into(),
            ));
        }
        for d in &self.domains {
            match d.geometry.cell_count() {
                Some(0) | None => {
                    return Err(crate::MetGetError::Validation(format!(
                        "domain for service '{}' has unresolvable or empty geometry",
                        d.service
                    )));
                }
                Some(_) => {}
            }

            match ModelFamily::from_tag(&d.service) {
                None => {
                    return Err(crate::MetGetError::Validation(format!(
                        "domain service '{}' does not match a known model family",
                        d.service
                    )));
                }
                Some(family) if family.is_tropical() => {
                    if d.storm_name.is_none() || d.storm_year.is_none() {
                        return Err(crate::MetGetError::Validation(format!(
                            "domain for storm-scoped service '{}' is missing storm_name/storm_year",
                            d.service
                        )));
                    }
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Number of output timesteps in `[start_date, end_date]` inclusive,
    /// stepping by `time_step` seconds.
    pub fn timestep_count(&self) -> i64 {
        let span = (self.end_date - self.start_date).num_seconds();
        span / self.time_step + 1
    }

    /// `Σ over timesteps of Σ over domains of (domain_cells)` (spec §4.6
    /// step 3). The per-format tariff multiplier is documented in
    /// `DESIGN.md` (open question: exact constants not present in the
    /// retrieved source) and applied by `metget-core::tariff`.
    pub fn raw_cell_usage(&self) -> u64 {
        let per_timestep: u64 = self
            .domains
            .iter()
            .filter_map(|d| d.geometry.cell_count())
            .sum();
        per_timestep * self.timestep_count().max(0) as u64
    }
}
