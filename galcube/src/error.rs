//! Error and warning types for cube generation
//!
//! Configuration and validation errors are raised before any numerical work
//! starts. Generation errors identify the cube, galaxy and pipeline stage that
//! failed. Numerical warnings are collected alongside the results and never
//! abort generation.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Structurally invalid grid, spectral axis, beam or batch settings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("at least one galaxy per system is required")]
    NoGalaxies,
    #[error("at least one cube must be requested")]
    NoCubes,
    #[error("grid size must be a positive number of pixels, got {0}")]
    InvalidGridSize(usize),
    #[error("pixel scale must be positive and finite, got {0}")]
    InvalidPixelScale(f64),
    #[error("number of spectral channels must be positive")]
    NoChannels,
    #[error("channel width must be positive and finite, got {0}")]
    InvalidChannelWidth(f64),
    #[error("reference velocity must be finite, got {0}")]
    InvalidReferenceVelocity(f64),
    #[error("invalid beam (bmin={bmin}, bmaj={bmaj}, bpa={bpa}): {reason}")]
    InvalidBeam {
        bmin: f64,
        bmaj: f64,
        bpa: f64,
        reason: &'static str,
    },
    #[error("beam kernel spans {kernel_px} pixels but the grid is only {grid_px} pixels wide")]
    BeamExceedsGrid { kernel_px: usize, grid_px: usize },
    #[error("sampling range for {name} is empty or invalid: [{lo}, {hi}]")]
    InvalidRange {
        name: &'static str,
        lo: f64,
        hi: f64,
    },
    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },
}

/// Per-galaxy parameter arrays or values that violate their invariants
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} has {found} entries but {expected} galaxies were requested")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("galaxy {galaxy}: {field} must be positive, got {value}")]
    NonPositive {
        galaxy: usize,
        field: &'static str,
        value: f64,
    },
    #[error("galaxy {galaxy}: {field} must be non-negative, got {value}")]
    Negative {
        galaxy: usize,
        field: &'static str,
        value: f64,
    },
    #[error("galaxy {galaxy}: {field} is not finite")]
    NonFinite { galaxy: usize, field: &'static str },
    #[error("the primary galaxy cannot be offset (distance {distance})")]
    OffsetPrimary { distance: f64 },
}

/// Pipeline stage at which a cube failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sampling,
    Rasterization,
    Composition,
    Convolution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Sampling => write!(f, "parameter sampling"),
            Stage::Rasterization => write!(f, "rasterization"),
            Stage::Composition => write!(f, "composition"),
            Stage::Convolution => write!(f, "beam convolution"),
        }
    }
}

/// Unexpected failure while generating one cube of a batch
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cube {cube}{}: {stage} failed: {reason}", galaxy_suffix(.galaxy))]
pub struct GenerationError {
    pub cube: usize,
    pub galaxy: Option<usize>,
    pub stage: Stage,
    pub reason: String,
}

fn galaxy_suffix(galaxy: &Option<usize>) -> String {
    galaxy.map(|g| format!(", galaxy {g}")).unwrap_or_default()
}

impl GenerationError {
    pub fn new(cube: usize, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            cube,
            galaxy: None,
            stage,
            reason: reason.into(),
        }
    }

    pub fn for_galaxy(mut self, galaxy: usize) -> Self {
        self.galaxy = Some(galaxy);
        self
    }
}

/// Top-level error returned by the generator entry points
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CubeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("generation cancelled before cube {next_cube} of {requested}")]
    Cancelled { next_cube: usize, requested: usize },
}

/// Non-fatal numerical conditions worth surfacing to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NumericalWarning {
    /// The profile truncation radius discards a noticeable share of the flux
    ProfileTruncation { galaxy: usize, lost_fraction: f64 },
    /// The beam minor axis is narrower than two pixels
    BeamUndersampled { minor_fwhm_pixels: f64 },
    /// Flux fell outside the field of view or velocity range and was discarded
    FluxOutsideCube { galaxy: usize, lost_fraction: f64 },
    /// A satellite lies entirely outside the field but was still rasterized
    SatelliteOutsideField { galaxy: usize },
}

impl fmt::Display for NumericalWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericalWarning::ProfileTruncation {
                galaxy,
                lost_fraction,
            } => write!(
                f,
                "galaxy {galaxy}: profile truncation discards {:.2}% of the flux",
                lost_fraction * 100.0
            ),
            NumericalWarning::BeamUndersampled { minor_fwhm_pixels } => write!(
                f,
                "beam minor FWHM of {minor_fwhm_pixels:.2} px is undersampled by the grid"
            ),
            NumericalWarning::FluxOutsideCube {
                galaxy,
                lost_fraction,
            } => write!(
                f,
                "galaxy {galaxy}: {:.2}% of the flux fell outside the cube",
                lost_fraction * 100.0
            ),
            NumericalWarning::SatelliteOutsideField { galaxy } => {
                write!(f, "galaxy {galaxy} lies entirely outside the field of view")
            }
        }
    }
}
