//! Intrinsic-to-sky projection of a galaxy.
//!
//! Intrinsic frame: disk in the x-y plane, z along the rotation axis.
//! Sky frame: x to the right, y up, z along the line of sight pointing away
//! from the observer. All lengths are in pixels.
//!
//! The rotation is `R = Rz(φy) · Rx(θx)`: the disk is first tilted about the
//! sky x axis by the inclination, then turned within the sky plane by the
//! position angle. `θx = 0` is face-on and `θx = 90°` edge-on. After
//! rotating, the galaxy is translated by its offset from the field centre.

use nalgebra::{Matrix3, Vector3};

use crate::galaxy::GalaxyParameters;

/// Rigid transform from a galaxy's intrinsic frame to the sky frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

/// Rotation about the x axis by `angle` radians
fn rotation_x(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

/// Rotation about the z axis by `angle` radians
fn rotation_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

impl Projection {
    /// Build a projection from angles in degrees and a sky offset in pixels
    pub fn new(inclination: f64, position_angle: f64, offset_x: f64, offset_y: f64) -> Self {
        let rotation =
            rotation_z(position_angle.to_radians()) * rotation_x(inclination.to_radians());
        Self {
            rotation,
            translation: Vector3::new(offset_x, offset_y, 0.0),
        }
    }

    /// Projection for a galaxy on a grid with the given pixel scale
    pub fn from_parameters(params: &GalaxyParameters, pixel_scale: f64) -> Self {
        let (dx, dy) = params.offset.components();
        Self::new(
            params.inclination,
            params.position_angle,
            dx / pixel_scale,
            dy / pixel_scale,
        )
    }

    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    /// Sky-plane position of the galaxy centre, in pixels from the field centre
    pub fn center(&self) -> (f64, f64) {
        (self.translation.x, self.translation.y)
    }

    /// Map an intrinsic position to the sky frame
    pub fn to_sky(&self, intrinsic: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * intrinsic + self.translation
    }

    /// Exact inverse of [`Projection::to_sky`]
    pub fn to_intrinsic(&self, sky: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.transpose() * (sky - self.translation)
    }

    /// Rotate a direction (e.g. a velocity) without translating it
    pub fn rotate_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }
}
