//! The re-gridding collaborator (spec §4.9: "Hand (bytes, target-domain)
//! pairs to the external re-gridding collaborator; it returns gridded arrays
//! per variable"). GRIB decode and barycentric interpolation are out of
//! scope; `Regridder` is the seam a real implementation plugs into, the same
//! way `metget-sources` treats upstream GRIB bytes as opaque payloads.

use async_trait::async_trait;
use metget_core::model::DomainGeometry;
use metget_core::MetGetError;

/// One regridded field: a flat row-major array over `ni * nj` cells.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedField {
    pub ni: u32,
    pub nj: u32,
    pub values: Vec<f64>,
}

impl GriddedField {
    pub fn filled(ni: u32, nj: u32, value: f64) -> Self {
        Self {
            ni,
            nj,
            values: vec![value; (ni as usize) * (nj as usize)],
        }
    }
}

#[async_trait]
pub trait Regridder: Send + Sync {
    /// Decode `bytes` (an opaque catalog payload) and interpolate onto
    /// `target`. Implementations own whatever decode format the source
    /// family produces; this crate never inspects `bytes` itself.
    async fn regrid(&self, bytes: &[u8], target: &DomainGeometry) -> Result<GriddedField, MetGetError>;
}

/// Deterministic stand-in used by tests and until a real collaborator is
/// wired in: every cell gets the payload's length, so distinct inputs
/// produce distinguishable (if physically meaningless) output.
pub struct StubRegridder;

#[async_trait]
impl Regridder for StubRegridder {
    async fn regrid(&self, bytes: &[u8], target: &DomainGeometry) -> Result<GriddedField, MetGetError> {
        let (ni, nj) = target.cell_count().map(|_| dims(target)).ok_or_else(|| {
            MetGetError::Internal("target domain geometry has no resolvable dimensions".into())
        })?;
        Ok(GriddedField::filled(ni, nj, bytes.len() as f64))
    }
}

fn dims(geometry: &DomainGeometry) -> (u32, u32) {
    match geometry {
        DomainGeometry::Corner { ni, nj, .. } => (*ni, *nj),
        DomainGeometry::Origin { ni, nj, .. } => (*ni, *nj),
        DomainGeometry::Preset { name } => {
            metget_core::model::preset_dims(name).unwrap_or((0, 0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_regridder_fills_target_dimensions() {
        let target = DomainGeometry::Corner {
            corner_x: 0.0,
            corner_y: 0.0,
            delta_x: 1.0,
            delta_y: 1.0,
            ni: 4,
            nj: 3,
        };
        let field = StubRegridder.regrid(b"abcdef", &target).await.unwrap();
        assert_eq!(field.ni, 4);
        assert_eq!(field.nj, 3);
        assert_eq!(field.values.len(), 12);
        assert!(field.values.iter().all(|v| *v == 6.0));
    }
}
