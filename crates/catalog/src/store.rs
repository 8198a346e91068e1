use chrono::{DateTime, Utc};
use metget_core::model::{CatalogEntry, ModelFamily, SelectionConstraints};
use metget_core::MetGetError;
use sqlx::PgPool;

use crate::row::{table_name, CatalogRow, IdentityCols, CATALOG_COLS};

/// Outcome of a single `upsert` call (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Catalog (C1) — one `CatalogStore` per process, wrapping a shared
/// `PgPool` exactly as the teacher's route handlers share one `PgPool`.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    pool: PgPool,
}

impl CatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Atomic on the family's uniqueness key; conflict updates
    /// `storage_key`/`accessed` only (spec §4.1).
    pub async fn upsert(&self, entry: &CatalogEntry) -> Result<UpsertOutcome, MetGetError> {
        let table = table_name(entry.family);
        let ids = IdentityCols::from_identity(&entry.identity);
        let conflict_cols = conflict_columns(entry.family);

        let sql = format!(
            "INSERT INTO {table} ({CATALOG_COLS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT ({conflict_cols}) DO UPDATE SET
                 storage_key = EXCLUDED.storage_key,
                 accessed = EXCLUDED.accessed
             RETURNING (xmax = 0) AS inserted",
        );

        let row: (bool,) = sqlx::query_as(&sql)
            .bind(entry.forecast_cycle)
            .bind(entry.valid_time)
            .bind(entry.tau as i32)
            .bind(ids.ensemble_member)
            .bind(ids.storm_name)
            .bind(ids.basin)
            .bind(ids.storm_year)
            .bind(ids.storm_number)
            .bind(ids.advisory)
            .bind(&entry.storage_key)
            .bind(entry.accessed)
            .bind(&entry.payload_meta)
            .fetch_one(&self.pool)
            .await?;

        Ok(if row.0 {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    /// Exact lookup by family + identity + forecast_cycle + valid_time.
    pub async fn find_exact(
        &self,
        family: ModelFamily,
        forecast_cycle: DateTime<Utc>,
        valid_time: DateTime<Utc>,
        identity: &metget_core::model::Identity,
    ) -> Result<Option<CatalogEntry>, MetGetError> {
        let table = table_name(family);
        let ids = IdentityCols::from_identity(identity);
        let mut sql = format!(
            "SELECT {CATALOG_COLS} FROM {table} WHERE forecast_cycle = $1 AND valid_time = $2"
        );
        let mut idx = 3;
        if ids.ensemble_member.is_some() {
            sql.push_str(&format!(" AND ensemble_member = ${idx}"));
            idx += 1;
        }
        if ids.storm_name.is_some() {
            sql.push_str(&format!(
                " AND storm_name = ${idx} AND basin = ${} AND storm_year = ${} AND storm_number = ${} AND advisory = ${}",
                idx + 1,
                idx + 2,
                idx + 3,
                idx + 4,
            ));
        }

        let mut query = sqlx::query_as::<_, CatalogRow>(&sql)
            .bind(forecast_cycle)
            .bind(valid_time);
        if let Some(m) = ids.ensemble_member {
            query = query.bind(m);
        }
        if let Some(name) = ids.storm_name {
            query = query
                .bind(name)
                .bind(ids.basin)
                .bind(ids.storm_year)
                .bind(ids.storm_number)
                .bind(ids.advisory);
        }

        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.into_entry(family)))
    }

    /// Candidate rows whose `valid_time == t`, ordered by closeness of
    /// `forecast_cycle` to `t` (newer preferred) then `tau` ascending on
    /// ties, filtered by `constraints` (spec §4.1).
    pub async fn find_covering(
        &self,
        family: ModelFamily,
        valid_time: DateTime<Utc>,
        constraints: &SelectionConstraints,
    ) -> Result<Vec<CatalogEntry>, MetGetError> {
        let table = table_name(family);
        let mut sql = format!("SELECT {CATALOG_COLS} FROM {table} WHERE valid_time = $1");
        let mut binds: Vec<String> = Vec::new();
        let mut idx = 2;

        if constraints.nowcast {
            sql.push_str(" AND tau = 0");
        }
        if let Some(m) = &constraints.ensemble_member {
            sql.push_str(&format!(" AND ensemble_member = ${idx}"));
            binds.push(m.clone());
            idx += 1;
        }
        if let Some(name) = &constraints.storm_name {
            sql.push_str(&format!(" AND storm_name = ${idx}"));
            binds.push(name.clone());
            idx += 1;
        }
        if let Some(basin) = &constraints.basin {
            sql.push_str(&format!(" AND basin = ${idx}"));
            binds.push(basin.clone());
            idx += 1;
        }
        if let Some(year) = constraints.storm_year {
            sql.push_str(&format!(" AND storm_year = ${idx}"));
            binds.push(year.to_string());
            idx += 1;
        }
        let _ = idx;
        sql.push_str(" ORDER BY forecast_cycle DESC, tau ASC, storage_key ASC");

        let mut query = sqlx::query_as::<_, CatalogRow>(&sql).bind(valid_time);
        for b in &binds {
            query = query.bind(b);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.into_entry(family)).collect())
    }

    /// Distinct forecast cycles present for `family`, descending, for the
    /// `/status` endpoint (spec §4.1, §6).
    pub async fn list_cycles(&self, family: ModelFamily) -> Result<Vec<DateTime<Utc>>, MetGetError> {
        let table = table_name(family);
        let sql = format!(
            "SELECT DISTINCT forecast_cycle FROM {table} ORDER BY forecast_cycle DESC"
        );
        let rows: Vec<(DateTime<Utc>,)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

/// The conflict target matching each family's partial unique index
/// (`0001_catalog_tables.sql`).
fn conflict_columns(family: ModelFamily) -> &'static str {
    if family.is_tropical() {
        if family.is_ensemble() {
            "forecast_cycle, valid_time, storm_name, basin, storm_year, storm_number, advisory, ensemble_member"
        } else {
            "forecast_cycle, valid_time, storm_name, basin, storm_year, storm_number, advisory"
        }
    } else if family.is_ensemble() {
        "forecast_cycle, valid_time, ensemble_member"
    } else {
        "forecast_cycle, valid_time"
    }
}
