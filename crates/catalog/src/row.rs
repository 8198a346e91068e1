//! Row shape shared by all eight `catalog_*` tables, and the mapping
//! to/from `metget_core::model::CatalogEntry`.

use chrono::{DateTime, Utc};
use metget_core::model::{CatalogEntry, Identity, ModelFamily};

/// The table backing a given family. Every `catalog_*` table has the
/// identical column list declared in `0001_catalog_tables.sql`.
pub fn table_name(family: ModelFamily) -> String {
    format!("catalog_{}", family.tag())
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CatalogRow {
    pub forecast_cycle: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    pub tau: i32,
    pub ensemble_member: Option<String>,
    pub storm_name: Option<String>,
    pub basin: Option<String>,
    pub storm_year: Option<i32>,
    pub storm_number: Option<i32>,
    pub advisory: Option<i32>,
    pub storage_key: String,
    pub accessed: DateTime<Utc>,
    pub payload_meta: serde_json::Value,
}

/// Column list shared by every catalog table (kept in sync with the
/// migration's `CREATE TABLE` column order, teacher's `FORECAST_COLS`
/// convention).
pub const CATALOG_COLS: &str = "\
    forecast_cycle, valid_time, tau, ensemble_member, storm_name, basin, \
    storm_year, storm_number, advisory, storage_key, accessed, payload_meta";

impl CatalogRow {
    pub fn into_entry(self, family: ModelFamily) -> CatalogEntry {
        let identity = if family.is_tropical() {
            Identity::Tropical {
                storm_name: self.storm_name.unwrap_or_default(),
                basin: self.basin.unwrap_or_default(),
                storm_year: self.storm_year.unwrap_or_default(),
                storm_number: self.storm_number.unwrap_or_default(),
                advisory: self.advisory.unwrap_or_default(),
                ensemble_member: self.ensemble_member,
            }
        } else if family.is_ensemble() {
            Identity::Ensemble {
                member: self.ensemble_member.unwrap_or_default(),
            }
        } else {
            Identity::Deterministic
        };

        CatalogEntry {
            family,
            identity,
            forecast_cycle: self.forecast_cycle,
            valid_time: self.valid_time,
            tau: self.tau as i64,
            storage_key: self.storage_key,
            accessed: self.accessed,
            payload_meta: self.payload_meta,
        }
    }
}

/// Identity components broken out for binding, since each family uses a
/// different subset of the shared columns.
pub struct IdentityCols<'a> {
    pub ensemble_member: Option<&'a str>,
    pub storm_name: Option<&'a str>,
    pub basin: Option<&'a str>,
    pub storm_year: Option<i32>,
    pub storm_number: Option<i32>,
    pub advisory: Option<i32>,
}

impl<'a> IdentityCols<'a> {
    pub fn from_identity(identity: &'a Identity) -> Self {
        match identity {
            Identity::Deterministic => IdentityCols {
                ensemble_member: None,
                storm_name: None,
                basin: None,
                storm_year: None,
                storm_number: None,
                advisory: None,
            },
            Identity::Ensemble { member } => IdentityCols {
                ensemble_member: Some(member),
                storm_name: None,
                basin: None,
                storm_year: None,
                storm_number: None,
                advisory: None,
            },
            Identity::Tropical {
                storm_name,
                basin,
                storm_year,
                storm_number,
                advisory,
                ensemble_member,
            } => IdentityCols {
                ensemble_member: ensemble_member.as_deref(),
                storm_name: Some(storm_name),
                basin: Some(basin),
                storm_year: Some(*storm_year),
                storm_number: Some(*storm_number),
                advisory: Some(*advisory),
            },
        }
    }
}
