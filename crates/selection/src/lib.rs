//! Selection Engine (C8): translates a validated request spec into an
//! ordered, time-bucketed plan of catalog rows per domain (spec §4.8). Pure
//! with respect to I/O — it depends only on a `CatalogLookup` capability the
//! caller supplies, so the full algorithm is unit-testable against an
//! in-memory fake without a database.

mod lookup;
mod plan;
mod timesteps;

pub use lookup::CatalogLookup;
pub use plan::{plan, DomainCell, PlanCell, ResolvedCell, SelectionPlan, TimestepPlan};
pub use timesteps::enumerate_timesteps;
