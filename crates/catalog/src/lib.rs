//! Catalog (C1): the authoritative index of available forecast fields.
//!
//! Enforces uniqueness of `(model, cycle, valid_time[, member/storm])` and
//! answers the `find_covering` queries the Selection Engine depends on
//! (spec §4.1). Each `ModelFamily` is backed by its own Postgres table
//! (spec §6); `row::table_name` is the one place that turns a family into a
//! SQL identifier, via `format!` the same way the teacher's
//! `db::queries::get_latest_forecast` interpolates its tolerance-window SQL
//! fragment — safe here too, because the identifier set is the closed,
//! compile-time-known `ModelFamily::ALL`, never user input.

mod row;
mod store;

pub use store::{CatalogStore, UpsertOutcome};
