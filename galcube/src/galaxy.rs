//! Per-galaxy physical parameters.
//!
//! Lengths (effective radius, scale height, turnover radius, offset distance)
//! share the spatial unit of the owning [`SystemConfiguration`]: pixels in
//! population mode, physical units such as kpc in physical mode. Velocities
//! are in km/s and angles in degrees.
//!
//! [`SystemConfiguration`]: crate::config::SystemConfiguration

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Systemic velocity used when none is given (km/s)
pub const DEFAULT_SYSTEMIC_VELOCITY: f64 = 200.0;

/// Velocity dispersion used when none is given (km/s)
pub const DEFAULT_VELOCITY_DISPERSION: f64 = 40.0;

/// Asymptotic rotation speed used when none is given (km/s)
pub const DEFAULT_MAX_VELOCITY: f64 = 200.0;

/// Rotation-curve turnover radius as a fraction of the effective radius
pub const DEFAULT_TURNOVER_FRACTION: f64 = 0.3;

/// Wrap an angle in degrees into [0, 360)
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Displacement of a satellite from the primary's centre on the sky
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    /// Projected separation (spatial units)
    pub distance: f64,
    /// Direction in degrees, counter-clockwise from +x
    pub direction: f64,
}

impl Offset {
    pub fn new(distance: f64, direction: f64) -> Self {
        Self {
            distance,
            direction: normalize_degrees(direction),
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Cartesian (dx, dy) displacement in the offset's spatial unit
    pub fn components(&self) -> (f64, f64) {
        let (sin, cos) = self.direction.to_radians().sin_cos();
        (self.distance * cos, self.distance * sin)
    }
}

/// Physical description of one galaxy within a system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GalaxyParameters {
    /// Half-light radius `Re`
    pub effective_radius: f64,
    /// Sérsic index `n`
    pub sersic_index: f64,
    /// Vertical scale height `hz`
    pub scale_height: f64,
    /// Surface brightness at `Re`, flux per square spatial unit
    pub effective_brightness: f64,
    /// Inclination `θx` in degrees (0 face-on, 90 edge-on)
    pub inclination: f64,
    /// Position angle `φy` in degrees, rotation within the sky plane
    pub position_angle: f64,
    /// Systemic velocity `v0` (km/s)
    pub systemic_velocity: f64,
    /// Velocity dispersion `σv` (km/s)
    pub velocity_dispersion: f64,
    /// Asymptotic rotation speed (km/s)
    pub max_velocity: f64,
    /// Rotation-curve turnover radius
    pub turnover_radius: f64,
    /// Offset from the primary (zero for the primary itself)
    pub offset: Offset,
}

impl GalaxyParameters {
    /// A face-on, centred disk with default kinematics
    pub fn disk(
        effective_radius: f64,
        sersic_index: f64,
        scale_height: f64,
        effective_brightness: f64,
    ) -> Self {
        Self {
            effective_radius,
            sersic_index,
            scale_height,
            effective_brightness,
            inclination: 0.0,
            position_angle: 0.0,
            systemic_velocity: DEFAULT_SYSTEMIC_VELOCITY,
            velocity_dispersion: DEFAULT_VELOCITY_DISPERSION,
            max_velocity: DEFAULT_MAX_VELOCITY,
            turnover_radius: DEFAULT_TURNOVER_FRACTION * effective_radius,
            offset: Offset::zero(),
        }
    }

    pub fn with_orientation(mut self, inclination: f64, position_angle: f64) -> Self {
        self.inclination = normalize_degrees(inclination);
        self.position_angle = normalize_degrees(position_angle);
        self
    }

    pub fn with_systemic_velocity(mut self, systemic_velocity: f64) -> Self {
        self.systemic_velocity = systemic_velocity;
        self
    }

    pub fn with_dispersion(mut self, velocity_dispersion: f64) -> Self {
        self.velocity_dispersion = velocity_dispersion;
        self
    }

    pub fn with_rotation(mut self, max_velocity: f64, turnover_radius: f64) -> Self {
        self.max_velocity = max_velocity;
        self.turnover_radius = turnover_radius;
        self
    }

    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }

    /// True when the galaxy sits on the field centre, as the primary must
    pub fn is_primary(&self) -> bool {
        self.offset.distance == 0.0
    }

    /// Copy with both angles (and the offset direction) wrapped into [0, 360)
    pub fn normalized(mut self) -> Self {
        self.inclination = normalize_degrees(self.inclination);
        self.position_angle = normalize_degrees(self.position_angle);
        self.offset.direction = normalize_degrees(self.offset.direction);
        self
    }

    /// Check the invariants for the galaxy at position `index` in its system
    pub fn validate(&self, index: usize) -> Result<(), ValidationError> {
        let finite = [
            ("effective_radius", self.effective_radius),
            ("sersic_index", self.sersic_index),
            ("scale_height", self.scale_height),
            ("effective_brightness", self.effective_brightness),
            ("inclination", self.inclination),
            ("position_angle", self.position_angle),
            ("systemic_velocity", self.systemic_velocity),
            ("velocity_dispersion", self.velocity_dispersion),
            ("max_velocity", self.max_velocity),
            ("turnover_radius", self.turnover_radius),
            ("offset.distance", self.offset.distance),
            ("offset.direction", self.offset.direction),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite {
                    galaxy: index,
                    field,
                });
            }
        }

        let positive = [
            ("effective_radius", self.effective_radius),
            ("sersic_index", self.sersic_index),
            ("scale_height", self.scale_height),
            ("effective_brightness", self.effective_brightness),
            ("turnover_radius", self.turnover_radius),
        ];
        for (field, value) in positive {
            if value <= 0.0 {
                return Err(ValidationError::NonPositive {
                    galaxy: index,
                    field,
                    value,
                });
            }
        }

        let non_negative = [
            ("velocity_dispersion", self.velocity_dispersion),
            ("max_velocity", self.max_velocity),
            ("offset.distance", self.offset.distance),
        ];
        for (field, value) in non_negative {
            if value < 0.0 {
                return Err(ValidationError::Negative {
                    galaxy: index,
                    field,
                    value,
                });
            }
        }

        if index == 0 && self.offset.distance != 0.0 {
            return Err(ValidationError::OffsetPrimary {
                distance: self.offset.distance,
            });
        }

        Ok(())
    }
}

/// Validate a whole system's galaxies in order
pub fn validate_all(galaxies: &[GalaxyParameters]) -> Result<(), ValidationError> {
    galaxies
        .iter()
        .enumerate()
        .try_for_each(|(index, galaxy)| galaxy.validate(index))
}
