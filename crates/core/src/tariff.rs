//! Credit-usage tariff table (spec §4.6 step 3, open question in
//! `DESIGN.md`: the exact per-format constants live in the original
//! source's tariff table, which was not present in the retrieved corpus).
//!
//! The formula is `Σ(cells) × Σ(timesteps) × format_factor`, where
//! `format_factor` approximates the relative cost of each output encoding
//! (NetCDF carries more metadata/compression work than flat ASCII; Delft3D's
//! multi-file layout is the most expensive to assemble).

use crate::model::{OutputFormat, RequestSpec};

fn format_factor(format: OutputFormat) -> f64 {
    match format {
        OutputFormat::OwiAscii => 1.0,
        OutputFormat::OwiNetcdf => 1.2,
        OutputFormat::RasNetcdf => 1.2,
        OutputFormat::Delft3d => 1.5,
    }
}

/// Final credit cost charged for `spec`, rounded up to the nearest whole
/// credit so that any non-zero usage debits at least 1.
pub fn credit_usage(spec: &RequestSpec) -> i64 {
    let raw = spec.raw_cell_usage() as f64 * format_factor(spec.format);
    raw.ceil() as i64
}
