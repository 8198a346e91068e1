use chrono::{DateTime, Utc};
use metget_core::model::Identity;

/// One upstream-reported `(cycle, valid_time, identity)` tuple, returned by
/// `SourceAdapter::discover` before it has been written anywhere (spec
/// §4.4/§4.5). The downloader consults C1 to see whether it already has a
/// row for this tuple before calling `fetch`.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub forecast_cycle: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    pub tau: i32,
    pub identity: Identity,
    /// Upstream locator (URL path, index entry, etc.) the adapter needs to
    /// fetch bytes — opaque to everything except the adapter that produced it.
    pub source_ref: String,
}

impl Candidate {
    /// `cycle-ISO-day/cycle-hour/{identity-parts}/valid_time-ISO` path
    /// fragment used to build a C2 storage key.
    pub fn key_fragment(&self) -> String {
        let day = self.forecast_cycle.format("%Y-%m-%d");
        let hour = self.forecast_cycle.format("%H");
        let ident = self.identity.key_fragment();
        let valid = self.valid_time.to_rfc3339();
        if ident.is_empty() {
            format!("{day}/{hour}/{valid}")
        } else {
            format!("{day}/{hour}/{ident}/{valid}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_fragment_omits_empty_identity_segment() {
        let c = Candidate {
            forecast_cycle: "2024-01-01T00:00:00Z".parse().unwrap(),
            valid_time: "2024-01-01T03:00:00Z".parse().unwrap(),
            tau: 3,
            identity: Identity::Deterministic,
            source_ref: "idx/0003".into(),
        };
        assert_eq!(c.key_fragment(), "2024-01-01/00/2024-01-01T03:00:00+00:00");
    }

    #[test]
    fn key_fragment_includes_ensemble_member() {
        let c = Candidate {
            forecast_cycle: "2024-01-01T00:00:00Z".parse().unwrap(),
            valid_time: "2024-01-01T03:00:00Z".parse().unwrap(),
            tau: 3,
            identity: Identity::Ensemble { member: "p03".into() },
            source_ref: "idx/0003".into(),
        };
        assert!(c.key_fragment().contains("p03"));
    }
}
