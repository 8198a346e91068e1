use chrono::{DateTime, Utc};
use metget_core::model::RequestSpec;

/// `[start, end]` stepping by `time_step` seconds, inclusive of both ends
/// (spec §4.8 step 1). Matches `RequestSpec::timestep_count`.
pub fn enumerate_timesteps(spec: &RequestSpec) -> Vec<DateTime<Utc>> {
    let mut out = Vec::with_capacity(spec.timestep_count().max(0) as usize);
    let mut t = spec.start_date;
    let step = chrono::Duration::seconds(spec.time_step);
    while t <= spec.end_date {
        out.push(t);
        t += step;
    }
    out
}
