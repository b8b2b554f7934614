//! System configuration: spatial grid, spectral axis, beam and seed.
//!
//! Spatial lengths share one unit throughout a configuration. In population
//! mode that unit is the pixel (`pixel_scale = 1`); in physical mode it is
//! whatever the caller's galaxy records use (typically kpc) and
//! `pixel_scale` converts it to pixels.

use galcube_shared::image_proc::gaussian_kernel_size;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::profile::VerticalProfileKind;

/// Conversion from a Gaussian FWHM to its standard deviation, 1 / (2 √(2 ln 2))
pub const FWHM_TO_SIGMA: f64 = 0.424_660_900_144_009_5;

/// Elliptical Gaussian beam described by its FWHM axes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamInfo {
    /// Minor-axis FWHM (spatial units)
    pub bmin: f64,
    /// Major-axis FWHM (spatial units)
    pub bmaj: f64,
    /// Major-axis position angle, degrees counter-clockwise from +y
    pub bpa: f64,
}

impl BeamInfo {
    pub fn new(bmin: f64, bmaj: f64, bpa: f64) -> Self {
        Self { bmin, bmaj, bpa }
    }

    /// The zero beam: cubes are left unconvolved
    pub fn none() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn is_none(&self) -> bool {
        self.bmin == 0.0 && self.bmaj == 0.0
    }

    /// Standard deviations (major, minor) in pixels
    pub fn sigma_pixels(&self, pixel_scale: f64) -> (f64, f64) {
        (
            self.bmaj * FWHM_TO_SIGMA / pixel_scale,
            self.bmin * FWHM_TO_SIGMA / pixel_scale,
        )
    }

    pub fn minor_fwhm_pixels(&self, pixel_scale: f64) -> f64 {
        self.bmin / pixel_scale
    }

    /// Side length of the beam kernel on a grid with this pixel scale
    pub fn kernel_size(&self, pixel_scale: f64) -> Option<usize> {
        if self.is_none() {
            return None;
        }
        let (sigma_major, _) = self.sigma_pixels(pixel_scale);
        Some(gaussian_kernel_size(sigma_major))
    }

    /// Check the beam shape on its own, without reference to a grid
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason| ConfigurationError::InvalidBeam {
            bmin: self.bmin,
            bmaj: self.bmaj,
            bpa: self.bpa,
            reason,
        };

        if !(self.bmin.is_finite() && self.bmaj.is_finite() && self.bpa.is_finite()) {
            return Err(invalid("beam parameters must be finite"));
        }
        if self.bmin < 0.0 || self.bmaj < 0.0 {
            return Err(invalid("beam widths must be non-negative"));
        }
        if self.bmin > self.bmaj {
            return Err(invalid("minor axis exceeds major axis"));
        }
        if self.bmin == 0.0 && self.bmaj > 0.0 {
            return Err(invalid("a non-zero beam needs a positive minor axis"));
        }
        Ok(())
    }
}

impl Default for BeamInfo {
    fn default() -> Self {
        Self::new(4.0, 4.0, 0.0)
    }
}

/// Square spatial grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialGrid {
    /// Pixels per side
    pub size: usize,
    /// Spatial units per pixel
    pub pixel_scale: f64,
}

impl SpatialGrid {
    pub fn new(size: usize, pixel_scale: f64) -> Self {
        Self { size, pixel_scale }
    }

    /// Field of view along one side, in spatial units
    pub fn field_of_view(&self) -> f64 {
        self.size as f64 * self.pixel_scale
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(125, 1.0)
    }
}

/// Velocity axis layout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralAxis {
    pub n_channels: usize,
    /// Channel width (km/s)
    pub channel_width: f64,
    /// Velocity at the centre of the axis; `None` uses the primary's systemic velocity
    pub reference_velocity: Option<f64>,
}

impl SpectralAxis {
    pub fn new(n_channels: usize, channel_width: f64) -> Self {
        Self {
            n_channels,
            channel_width,
            reference_velocity: None,
        }
    }

    pub fn with_reference_velocity(mut self, velocity: f64) -> Self {
        self.reference_velocity = Some(velocity);
        self
    }

    /// Resolve the axis against the primary's systemic velocity
    pub fn resolve(&self, primary_velocity: f64) -> ChannelGrid {
        ChannelGrid {
            n_channels: self.n_channels,
            channel_width: self.channel_width,
            reference_velocity: self.reference_velocity.unwrap_or(primary_velocity),
        }
    }
}

impl Default for SpectralAxis {
    fn default() -> Self {
        Self::new(40, 20.0)
    }
}

/// Concrete velocity channels of one cube
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelGrid {
    pub n_channels: usize,
    pub channel_width: f64,
    /// Velocity at the centre of the axis (km/s)
    pub reference_velocity: f64,
}

impl ChannelGrid {
    /// Velocity at the centre of channel `k`
    pub fn velocity_of(&self, k: usize) -> f64 {
        let centre = (self.n_channels as f64 - 1.0) / 2.0;
        self.reference_velocity + (k as f64 - centre) * self.channel_width
    }

    /// Lower edge of the first channel
    pub fn lower_edge(&self) -> f64 {
        self.reference_velocity - 0.5 * self.n_channels as f64 * self.channel_width
    }

    pub fn upper_edge(&self) -> f64 {
        self.reference_velocity + 0.5 * self.n_channels as f64 * self.channel_width
    }

    /// Channel containing velocity `v`, or `None` outside the axis
    pub fn channel_of(&self, v: f64) -> Option<usize> {
        let position = ((v - self.lower_edge()) / self.channel_width).floor();
        if position >= 0.0 && position < self.n_channels as f64 {
            Some(position as usize)
        } else {
            None
        }
    }

    /// All channel-centre velocities in order
    pub fn velocities(&self) -> Vec<f64> {
        (0..self.n_channels).map(|k| self.velocity_of(k)).collect()
    }
}

/// Full cube geometry in pixel units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubeGrid {
    pub size: usize,
    pub pixel_scale: f64,
    pub channels: ChannelGrid,
}

impl CubeGrid {
    /// Array shape `(channel, y, x)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.channels.n_channels, self.size, self.size)
    }

    /// Index coordinate of the field centre along either spatial axis
    pub fn center(&self) -> f64 {
        (self.size as f64 - 1.0) / 2.0
    }

    /// Pixel index for a coordinate measured in pixels from the field centre
    pub fn pixel_of(&self, coord: f64) -> Option<usize> {
        let index = (coord + self.center() + 0.5).floor();
        if index >= 0.0 && index < self.size as f64 {
            Some(index as usize)
        } else {
            None
        }
    }
}

/// Everything that is shared by all galaxies of a system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemConfiguration {
    /// Galaxies per system, primary included
    pub n_gals: usize,
    pub grid: SpatialGrid,
    pub spectral: SpectralAxis,
    pub beam: BeamInfo,
    #[serde(default)]
    pub vertical: VerticalProfileKind,
    /// Batch seed; `None` draws fresh entropy on every generation
    pub seed: Option<u64>,
}

impl Default for SystemConfiguration {
    fn default() -> Self {
        Self {
            n_gals: 1,
            grid: SpatialGrid::default(),
            spectral: SpectralAxis::default(),
            beam: BeamInfo::default(),
            vertical: VerticalProfileKind::default(),
            seed: None,
        }
    }
}

impl SystemConfiguration {
    /// Reject structurally invalid settings before any work starts
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.n_gals == 0 {
            return Err(ConfigurationError::NoGalaxies);
        }
        if self.grid.size == 0 {
            return Err(ConfigurationError::InvalidGridSize(self.grid.size));
        }
        if !(self.grid.pixel_scale.is_finite() && self.grid.pixel_scale > 0.0) {
            return Err(ConfigurationError::InvalidPixelScale(self.grid.pixel_scale));
        }
        if self.spectral.n_channels == 0 {
            return Err(ConfigurationError::NoChannels);
        }
        if !(self.spectral.channel_width.is_finite() && self.spectral.channel_width > 0.0) {
            return Err(ConfigurationError::InvalidChannelWidth(
                self.spectral.channel_width,
            ));
        }
        if let Some(v) = self.spectral.reference_velocity {
            if !v.is_finite() {
                return Err(ConfigurationError::InvalidReferenceVelocity(v));
            }
        }

        self.beam.validate()?;
        if let Some(kernel_px) = self.beam.kernel_size(self.grid.pixel_scale) {
            if kernel_px > self.grid.size {
                return Err(ConfigurationError::BeamExceedsGrid {
                    kernel_px,
                    grid_px: self.grid.size,
                });
            }
        }

        Ok(())
    }

    /// Cube geometry for a system whose primary has the given systemic velocity
    pub fn cube_grid(&self, primary_velocity: f64) -> CubeGrid {
        CubeGrid {
            size: self.grid.size,
            pixel_scale: self.grid.pixel_scale,
            channels: self.spectral.resolve(primary_velocity),
        }
    }
}
