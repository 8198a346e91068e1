//! Output encoding (spec §4.9 step 5: "encode to requested `format`").
//!
//! The legacy OWI-ASCII/OWI-NetCDF/RAS-NetCDF/Delft3D writers are a large
//! ported subsystem in their own right and are out of scope here. This emits
//! a deterministic JSON document carrying the same per-timestep, per-domain
//! structure a real writer would consume, so the rest of the pipeline
//! (presign, artifact write, completion) is fully exercised; a production
//! deployment swaps this module for the real format encoders.

use metget_core::model::{OutputFormat, RequestSpec};
use serde::Serialize;

use crate::regrid::GriddedField;

#[derive(Debug, Serialize)]
struct EncodedDomain {
    level: u32,
    ni: u32,
    nj: u32,
    values: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct EncodedTimestep {
    valid_time: chrono::DateTime<chrono::Utc>,
    domains: Vec<EncodedDomain>,
}

#[derive(Debug, Serialize)]
struct EncodedStack {
    format: OutputFormat,
    null_value: f64,
    epsg: i32,
    timesteps: Vec<EncodedTimestep>,
}

/// One resolved field per (timestep, domain), in the same order as the
/// `SelectionPlan` the caller built the fields from.
pub struct TimestepFields {
    pub valid_time: chrono::DateTime<chrono::Utc>,
    pub domains: Vec<(u32, GriddedField)>,
}

pub fn encode_output(spec: &RequestSpec, timesteps: Vec<TimestepFields>) -> bytes::Bytes {
    let stack = EncodedStack {
        format: spec.format,
        null_value: spec.null_value,
        epsg: spec.epsg,
        timesteps: timesteps
            .into_iter()
            .map(|ts| EncodedTimestep {
                valid_time: ts.valid_time,
                domains: ts
                    .domains
                    .into_iter()
                    .map(|(level, field)| EncodedDomain {
                        level,
                        ni: field.ni,
                        nj: field.nj,
                        values: field.values,
                    })
                    .collect(),
            })
            .collect(),
    };
    bytes::Bytes::from(serde_json::to_vec(&stack).unwrap_or_default())
}
