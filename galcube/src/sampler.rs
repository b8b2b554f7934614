//! Galaxy parameter sources.
//!
//! A system's galaxy records either come straight from the caller
//! ([`ParameterSource::Physical`]) or are drawn from uniform ranges
//! ([`ParameterSource::Population`]). Both produce the same
//! `Vec<GalaxyParameters>` with the primary first.
//!
//! All randomness flows through the `Rng` handed in by the caller, and draws
//! happen in a fixed order, so a seeded generator always yields the same
//! system.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::SystemConfiguration;
use crate::error::{ConfigurationError, CubeError, ValidationError};
use crate::galaxy::{validate_all, GalaxyParameters, Offset};

/// Closed interval for a uniform draw
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lo: f64,
    pub hi: f64,
}

impl Bounds {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Degenerate interval that always yields `value`
    pub fn fixed(value: f64) -> Self {
        Self::new(value, value)
    }

    /// Uniform draw; a degenerate interval returns `lo` without consuming randomness
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.hi <= self.lo {
            self.lo
        } else {
            rng.gen_range(self.lo..self.hi)
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value <= self.hi
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigurationError> {
        if self.lo.is_finite() && self.hi.is_finite() && self.lo <= self.hi {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidRange {
                name,
                lo: self.lo,
                hi: self.hi,
            })
        }
    }

    fn validate_positive(&self, name: &'static str) -> Result<(), ConfigurationError> {
        self.validate(name)?;
        if self.lo > 0.0 {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidRange {
                name,
                lo: self.lo,
                hi: self.hi,
            })
        }
    }

    fn validate_non_negative(&self, name: &'static str) -> Result<(), ConfigurationError> {
        self.validate(name)?;
        if self.lo >= 0.0 {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidRange {
                name,
                lo: self.lo,
                hi: self.hi,
            })
        }
    }
}

/// Uniform sampling ranges for population mode
///
/// Primary lengths are in the configuration's spatial unit. Satellite sizes
/// and brightnesses are drawn as fractions of the primary's values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationRanges {
    pub effective_radius: Bounds,
    pub sersic_index: Bounds,
    pub scale_height: Bounds,
    pub effective_brightness: Bounds,
    /// Degrees
    pub inclination: Bounds,
    /// Degrees
    pub position_angle: Bounds,
    /// km/s
    pub systemic_velocity: Bounds,
    /// km/s
    pub velocity_dispersion: Bounds,
    /// km/s
    pub max_velocity: Bounds,
    /// Turnover radius as a fraction of the effective radius
    pub turnover_fraction: Bounds,
    /// Satellite Re, hz and Se as a fraction of the primary's
    pub satellite_fraction: Bounds,
    /// Half-width of the satellite systemic-velocity window around the primary (km/s)
    pub satellite_velocity_window: f64,
    /// Satellite separation as a fraction of `offset_gals × Re_primary`
    pub satellite_offset_fraction: Bounds,
}

impl Default for PopulationRanges {
    fn default() -> Self {
        Self {
            effective_radius: Bounds::new(3.0, 8.0),
            sersic_index: Bounds::new(0.5, 1.5),
            scale_height: Bounds::new(0.5, 2.0),
            effective_brightness: Bounds::new(0.05, 0.2),
            inclination: Bounds::new(0.0, 360.0),
            position_angle: Bounds::new(0.0, 360.0),
            systemic_velocity: Bounds::new(150.0, 250.0),
            velocity_dispersion: Bounds::new(30.0, 60.0),
            max_velocity: Bounds::new(100.0, 250.0),
            turnover_fraction: Bounds::new(0.2, 0.5),
            satellite_fraction: Bounds::new(1.0 / 3.0, 0.5),
            satellite_velocity_window: 60.0,
            satellite_offset_fraction: Bounds::new(0.5, 1.0),
        }
    }
}

impl PopulationRanges {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.effective_radius.validate_positive("effective_radius")?;
        self.sersic_index.validate_positive("sersic_index")?;
        self.scale_height.validate_positive("scale_height")?;
        self.effective_brightness
            .validate_positive("effective_brightness")?;
        self.inclination.validate("inclination")?;
        self.position_angle.validate("position_angle")?;
        self.systemic_velocity.validate("systemic_velocity")?;
        self.velocity_dispersion
            .validate_non_negative("velocity_dispersion")?;
        self.max_velocity.validate_non_negative("max_velocity")?;
        self.turnover_fraction.validate_positive("turnover_fraction")?;
        self.satellite_fraction
            .validate_positive("satellite_fraction")?;
        self.satellite_offset_fraction
            .validate_non_negative("satellite_offset_fraction")?;
        if !(self.satellite_velocity_window.is_finite() && self.satellite_velocity_window >= 0.0) {
            return Err(ConfigurationError::NonPositive {
                name: "satellite_velocity_window",
                value: self.satellite_velocity_window,
            });
        }
        Ok(())
    }
}

/// Restriction of the primary's size relative to the beam
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// No restriction
    #[default]
    All,
    /// Primary Re at least the beam major-axis FWHM
    Resolved,
    /// Primary Re at most the beam major-axis FWHM
    Unresolved,
}

impl Resolution {
    /// Primary Re range after applying the restriction
    pub fn restrict(&self, range: Bounds, beam_major: f64) -> Bounds {
        match self {
            Resolution::All => range,
            Resolution::Resolved => Bounds::new(range.lo.max(beam_major), range.hi),
            Resolution::Unresolved => Bounds::new(range.lo, range.hi.min(beam_major)),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Resolution::All),
            "resolved" => Ok(Resolution::Resolved),
            "unresolved" => Ok(Resolution::Unresolved),
            other => Err(format!(
                "unknown resolution '{other}', expected all, resolved or unresolved"
            )),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resolution::All => "all",
            Resolution::Resolved => "resolved",
            Resolution::Unresolved => "unresolved",
        };
        write!(f, "{name}")
    }
}

/// Settings for drawing random galaxy systems
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationSampling {
    pub ranges: PopulationRanges,
    pub resolution: Resolution,
    /// Fixed Sérsic index for every galaxy, overriding the range
    pub n_sersic: Option<f64>,
    /// Satellite separation scale in units of the primary's Re
    pub offset_gals: f64,
}

impl Default for PopulationSampling {
    fn default() -> Self {
        Self {
            ranges: PopulationRanges::default(),
            resolution: Resolution::All,
            n_sersic: None,
            offset_gals: 5.0,
        }
    }
}

impl PopulationSampling {
    fn sersic_range(&self) -> Bounds {
        self.n_sersic
            .map(Bounds::fixed)
            .unwrap_or(self.ranges.sersic_index)
    }

    fn primary_radius_range(&self, config: &SystemConfiguration) -> Bounds {
        self.resolution
            .restrict(self.ranges.effective_radius, config.beam.bmaj)
    }

    pub fn validate(&self, config: &SystemConfiguration) -> Result<(), ConfigurationError> {
        self.ranges.validate()?;
        if let Some(n) = self.n_sersic {
            if !(n.is_finite() && n > 0.0) {
                return Err(ConfigurationError::NonPositive {
                    name: "n_sersic",
                    value: n,
                });
            }
        }
        if !(self.offset_gals.is_finite() && self.offset_gals >= 0.0) {
            return Err(ConfigurationError::NonPositive {
                name: "offset_gals",
                value: self.offset_gals,
            });
        }
        self.primary_radius_range(config)
            .validate_positive("effective_radius (after resolution restriction)")
    }

    /// Draw one system: the primary, then `n_gals - 1` satellites
    pub fn sample<R: Rng + ?Sized>(
        &self,
        config: &SystemConfiguration,
        rng: &mut R,
    ) -> Vec<GalaxyParameters> {
        let ranges = &self.ranges;
        let sersic = self.sersic_range();

        let effective_radius = self.primary_radius_range(config).sample(rng);
        let sersic_index = sersic.sample(rng);
        let scale_height = ranges.scale_height.sample(rng);
        let effective_brightness = ranges.effective_brightness.sample(rng);
        let inclination = ranges.inclination.sample(rng);
        let position_angle = ranges.position_angle.sample(rng);
        let systemic_velocity = ranges.systemic_velocity.sample(rng);
        let velocity_dispersion = ranges.velocity_dispersion.sample(rng);
        let max_velocity = ranges.max_velocity.sample(rng);
        let turnover = ranges.turnover_fraction.sample(rng) * effective_radius;

        let primary = GalaxyParameters::disk(
            effective_radius,
            sersic_index,
            scale_height,
            effective_brightness,
        )
        .with_orientation(inclination, position_angle)
        .with_systemic_velocity(systemic_velocity)
        .with_dispersion(velocity_dispersion)
        .with_rotation(max_velocity, turnover);

        let window = Bounds::new(
            systemic_velocity - ranges.satellite_velocity_window,
            systemic_velocity + ranges.satellite_velocity_window,
        );
        let separation = self.offset_gals * effective_radius;

        let mut galaxies = Vec::with_capacity(config.n_gals);
        galaxies.push(primary);
        for _ in 1..config.n_gals {
            let re = ranges.satellite_fraction.sample(rng) * effective_radius;
            let hz = ranges.satellite_fraction.sample(rng) * scale_height;
            let se = ranges.satellite_fraction.sample(rng) * effective_brightness;
            let n = sersic.sample(rng);
            let inclination = ranges.inclination.sample(rng);
            let position_angle = ranges.position_angle.sample(rng);
            let v0 = window.sample(rng);
            let sigma = ranges.velocity_dispersion.sample(rng);
            let v_max = ranges.max_velocity.sample(rng);
            let turnover = ranges.turnover_fraction.sample(rng) * re;
            let distance = ranges.satellite_offset_fraction.sample(rng) * separation;
            let direction = rng.gen_range(0.0..360.0);

            galaxies.push(
                GalaxyParameters::disk(re, n, hz, se)
                    .with_orientation(inclination, position_angle)
                    .with_systemic_velocity(v0)
                    .with_dispersion(sigma)
                    .with_rotation(v_max, turnover)
                    .with_offset(Offset::new(distance, direction)),
            );
        }
        galaxies
    }
}

/// Caller-supplied galaxy values, one entry per galaxy, primary first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalGalaxies {
    pub effective_radius: Vec<f64>,
    pub sersic_index: Vec<f64>,
    pub scale_height: Vec<f64>,
    pub effective_brightness: Vec<f64>,
    pub inclination: Vec<f64>,
    pub position_angle: Vec<f64>,
    pub systemic_velocity: Vec<f64>,
    pub velocity_dispersion: Vec<f64>,
    pub max_velocity: Vec<f64>,
    pub turnover_radius: Vec<f64>,
    pub offset_distance: Vec<f64>,
    pub offset_direction: Vec<f64>,
}

impl PhysicalGalaxies {
    /// Split a list of records into per-field arrays
    pub fn from_records(records: &[GalaxyParameters]) -> Self {
        let field = |f: fn(&GalaxyParameters) -> f64| records.iter().map(f).collect::<Vec<_>>();
        Self {
            effective_radius: field(|g| g.effective_radius),
            sersic_index: field(|g| g.sersic_index),
            scale_height: field(|g| g.scale_height),
            effective_brightness: field(|g| g.effective_brightness),
            inclination: field(|g| g.inclination),
            position_angle: field(|g| g.position_angle),
            systemic_velocity: field(|g| g.systemic_velocity),
            velocity_dispersion: field(|g| g.velocity_dispersion),
            max_velocity: field(|g| g.max_velocity),
            turnover_radius: field(|g| g.turnover_radius),
            offset_distance: field(|g| g.offset.distance),
            offset_direction: field(|g| g.offset.direction),
        }
    }

    /// Assemble validated records for a system of `n_gals` galaxies
    pub fn to_records(&self, n_gals: usize) -> Result<Vec<GalaxyParameters>, ValidationError> {
        let columns: [(&'static str, &Vec<f64>); 12] = [
            ("effective_radius", &self.effective_radius),
            ("sersic_index", &self.sersic_index),
            ("scale_height", &self.scale_height),
            ("effective_brightness", &self.effective_brightness),
            ("inclination", &self.inclination),
            ("position_angle", &self.position_angle),
            ("systemic_velocity", &self.systemic_velocity),
            ("velocity_dispersion", &self.velocity_dispersion),
            ("max_velocity", &self.max_velocity),
            ("turnover_radius", &self.turnover_radius),
            ("offset_distance", &self.offset_distance),
            ("offset_direction", &self.offset_direction),
        ];
        for (field, values) in columns {
            if values.len() != n_gals {
                return Err(ValidationError::LengthMismatch {
                    field,
                    expected: n_gals,
                    found: values.len(),
                });
            }
        }

        let records: Vec<GalaxyParameters> = (0..n_gals)
            .map(|i| {
                GalaxyParameters {
                    effective_radius: self.effective_radius[i],
                    sersic_index: self.sersic_index[i],
                    scale_height: self.scale_height[i],
                    effective_brightness: self.effective_brightness[i],
                    inclination: self.inclination[i],
                    position_angle: self.position_angle[i],
                    systemic_velocity: self.systemic_velocity[i],
                    velocity_dispersion: self.velocity_dispersion[i],
                    max_velocity: self.max_velocity[i],
                    turnover_radius: self.turnover_radius[i],
                    offset: Offset {
                        distance: self.offset_distance[i],
                        direction: self.offset_direction[i],
                    },
                }
                .normalized()
            })
            .collect();

        validate_all(&records)?;
        Ok(records)
    }
}

/// Where a generator gets its galaxy records from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ParameterSource {
    /// Fixed caller values; no randomness
    Physical(PhysicalGalaxies),
    /// Uniform draws per cube
    Population(PopulationSampling),
}

impl ParameterSource {
    /// Check the source against a configuration before any cube is built
    pub fn validate(&self, config: &SystemConfiguration) -> Result<(), CubeError> {
        match self {
            ParameterSource::Physical(galaxies) => {
                galaxies.to_records(config.n_gals)?;
            }
            ParameterSource::Population(sampling) => sampling.validate(config)?,
        }
        Ok(())
    }

    /// Galaxy records for one system
    pub fn sample<R: Rng + ?Sized>(
        &self,
        config: &SystemConfiguration,
        rng: &mut R,
    ) -> Result<Vec<GalaxyParameters>, CubeError> {
        match self {
            ParameterSource::Physical(galaxies) => Ok(galaxies.to_records(config.n_gals)?),
            ParameterSource::Population(sampling) => {
                let galaxies = sampling.sample(config, rng);
                validate_all(&galaxies)?;
                Ok(galaxies)
            }
        }
    }
}

/// Derive satellites around one explicit primary.
///
/// Sizes, heights and brightnesses are drawn in [1/3, 1/2] of the primary's,
/// the Sérsic index in [0.5, 1.5] unless `n_sersic` fixes it, and both
/// orientation angles uniformly. The
/// satellites share the primary's kinematics and sit at a random direction,
/// `offset` primary effective radii (scaled by [0.5, 1]) from the centre.
pub fn satellites_from_primary<R: Rng + ?Sized>(
    primary: &GalaxyParameters,
    n_satellites: usize,
    offset: f64,
    n_sersic: Option<f64>,
    rng: &mut R,
) -> Vec<GalaxyParameters> {
    let ranges = PopulationRanges::default();
    let fraction = ranges.satellite_fraction;
    let sersic = n_sersic.map(Bounds::fixed).unwrap_or(ranges.sersic_index);
    let turnover_fraction = primary.turnover_radius / primary.effective_radius;

    (0..n_satellites)
        .map(|_| {
            let re = fraction.sample(rng) * primary.effective_radius;
            let hz = fraction.sample(rng) * primary.scale_height;
            let se = fraction.sample(rng) * primary.effective_brightness;
            let n = sersic.sample(rng);
            let inclination = rng.gen_range(-180.0..180.0);
            let position_angle = rng.gen_range(-180.0..180.0);
            let distance =
                ranges.satellite_offset_fraction.sample(rng) * offset * primary.effective_radius;
            let direction = rng.gen_range(0.0..360.0);

            GalaxyParameters::disk(re, n, hz, se)
                .with_orientation(inclination, position_angle)
                .with_systemic_velocity(primary.systemic_velocity)
                .with_dispersion(primary.velocity_dispersion)
                .with_rotation(primary.max_velocity, turnover_fraction * re)
                .with_offset(Offset::new(distance, direction))
        })
        .collect()
}
