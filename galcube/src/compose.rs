//! Multi-galaxy composition.
//!
//! Galaxies are summed linearly on the shared grid in galaxy order. The same
//! pass turns each galaxy's flux bookkeeping into numerical warnings.

use ndarray::Array3;

use crate::error::NumericalWarning;
use crate::rasterize::GalaxyRaster;

/// Lost-flux share above which a warning is raised
pub const WARNING_LOSS_FRACTION: f64 = 0.01;

/// Summed cube of a system plus the warnings its galaxies raised
#[derive(Debug, Clone)]
pub struct Composite {
    pub cube: Array3<f64>,
    pub warnings: Vec<NumericalWarning>,
}

/// Warnings for the galaxy at `index`
pub fn raster_warnings(index: usize, raster: &GalaxyRaster) -> Vec<NumericalWarning> {
    let mut warnings = Vec::new();

    if raster.truncated_fraction > WARNING_LOSS_FRACTION {
        warnings.push(NumericalWarning::ProfileTruncation {
            galaxy: index,
            lost_fraction: raster.truncated_fraction,
        });
    }

    let stats = &raster.stats;
    if index > 0 && stats.deposited == 0.0 && stats.discarded > 0.0 {
        warnings.push(NumericalWarning::SatelliteOutsideField { galaxy: index });
    } else if stats.lost_fraction() > WARNING_LOSS_FRACTION {
        warnings.push(NumericalWarning::FluxOutsideCube {
            galaxy: index,
            lost_fraction: stats.lost_fraction(),
        });
    }

    warnings
}

/// Sum per-galaxy cubes of identical shape
pub fn composite(
    shape: (usize, usize, usize),
    rasters: &[GalaxyRaster],
) -> Result<Composite, String> {
    let mut cube = Array3::zeros(shape);
    let mut warnings = Vec::new();

    for (index, raster) in rasters.iter().enumerate() {
        if raster.cube.dim() != shape {
            return Err(format!(
                "galaxy {index} cube has shape {:?}, expected {:?}",
                raster.cube.dim(),
                shape
            ));
        }
        cube += &raster.cube;
        warnings.extend(raster_warnings(index, raster));
    }

    Ok(Composite { cube, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rasterize::RasterStats;
    use approx::assert_relative_eq;

    fn raster(value: f64, deposited: f64, discarded: f64) -> GalaxyRaster {
        GalaxyRaster {
            cube: Array3::from_elem((2, 3, 3), value),
            stats: RasterStats {
                deposited,
                discarded,
                samples: 10,
            },
            center: (0.0, 0.0),
            truncated_fraction: 0.002,
        }
    }

    #[test]
    fn test_composite_is_linear_sum() {
        let rasters = vec![raster(1.0, 18.0, 0.0), raster(0.5, 9.0, 0.0)];
        let composite = composite((2, 3, 3), &rasters).unwrap();
        assert_relative_eq!(composite.cube.sum(), 27.0);
        assert!(composite.cube.iter().all(|&v| v == 1.5));
        assert!(composite.warnings.is_empty());
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let rasters = vec![raster(1.0, 18.0, 0.0)];
        assert!(composite((2, 4, 4), &rasters).is_err());
    }

    #[test]
    fn test_warnings() {
        let outside = raster(0.0, 0.0, 5.0);
        assert_eq!(
            raster_warnings(2, &outside),
            vec![NumericalWarning::SatelliteOutsideField { galaxy: 2 }]
        );

        let clipped = raster(1.0, 90.0, 10.0);
        assert_eq!(
            raster_warnings(0, &clipped),
            vec![NumericalWarning::FluxOutsideCube {
                galaxy: 0,
                lost_fraction: 0.1
            }]
        );

        let mut steep = raster(1.0, 18.0, 0.0);
        steep.truncated_fraction = 0.016;
        assert!(matches!(
            raster_warnings(1, &steep)[..],
            [NumericalWarning::ProfileTruncation { galaxy: 1, .. }]
        ));
    }
}
