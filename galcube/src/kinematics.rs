//! Disk kinematics: rotation curve, projected line-of-sight velocity and
//! random dispersion.

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::FRAC_2_PI;

use crate::galaxy::GalaxyParameters;
use crate::projection::Projection;

/// Arctangent rotation curve `v(R) = v_max · (2/π) · atan(R / R_t)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationCurve {
    /// Asymptotic speed (km/s)
    pub max_velocity: f64,
    /// Turnover radius (pixels)
    pub turnover_radius: f64,
}

impl RotationCurve {
    pub fn new(max_velocity: f64, turnover_radius: f64) -> Self {
        Self {
            max_velocity,
            turnover_radius,
        }
    }

    /// Circular speed at cylindrical radius `r`
    pub fn velocity(&self, r: f64) -> f64 {
        self.max_velocity * FRAC_2_PI * (r / self.turnover_radius).atan()
    }
}

/// Line-of-sight velocity model of one projected galaxy
#[derive(Debug, Clone, Copy)]
pub struct KinematicModel {
    pub curve: RotationCurve,
    pub projection: Projection,
    pub systemic_velocity: f64,
    velocity_dispersion: f64,
    dispersion: Option<Normal<f64>>,
}

impl KinematicModel {
    pub fn new(
        curve: RotationCurve,
        projection: Projection,
        systemic_velocity: f64,
        velocity_dispersion: f64,
    ) -> Self {
        let dispersion = if velocity_dispersion > 0.0 {
            Normal::new(0.0, velocity_dispersion).ok()
        } else {
            None
        };
        Self {
            curve,
            projection,
            systemic_velocity,
            velocity_dispersion,
            dispersion,
        }
    }

    /// Model for a galaxy, converting the turnover radius to pixels
    pub fn from_parameters(
        params: &GalaxyParameters,
        projection: Projection,
        pixel_scale: f64,
    ) -> Self {
        Self::new(
            RotationCurve::new(params.max_velocity, params.turnover_radius / pixel_scale),
            projection,
            params.systemic_velocity,
            params.velocity_dispersion,
        )
    }

    /// Velocity dispersion in km/s
    pub fn dispersion(&self) -> f64 {
        self.velocity_dispersion
    }

    /// Projected circular velocity at intrinsic disk position (x, y)
    pub fn rotation_velocity(&self, x: f64, y: f64) -> f64 {
        let r = x.hypot(y);
        if r == 0.0 {
            return 0.0;
        }
        let speed = self.curve.velocity(r);
        let circular = Vector3::new(-y / r * speed, x / r * speed, 0.0);
        self.projection.rotate_vector(&circular).z
    }

    /// Mean line-of-sight velocity at (x, y), systemic velocity included
    pub fn mean_velocity(&self, x: f64, y: f64) -> f64 {
        self.systemic_velocity + self.rotation_velocity(x, y)
    }

    /// Mean velocity plus one Gaussian dispersion draw
    pub fn sample_velocity<R: Rng + ?Sized>(&self, x: f64, y: f64, rng: &mut R) -> f64 {
        let mean = self.mean_velocity(x, y);
        match &self.dispersion {
            Some(normal) => mean + normal.sample(rng),
            None => mean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_rotation_curve_shape() {
        let curve = RotationCurve::new(200.0, 2.0);
        assert_eq!(curve.velocity(0.0), 0.0);
        assert_relative_eq!(curve.velocity(2.0), 100.0, epsilon = 1e-10);
        assert!(curve.velocity(1e6) < 200.0);
        assert_relative_eq!(curve.velocity(1e6), 200.0, epsilon = 1e-3);
        assert!(curve.velocity(4.0) > curve.velocity(2.0));
    }

    #[test]
    fn test_face_on_has_no_rotation_signal() {
        let model = KinematicModel::new(
            RotationCurve::new(200.0, 1.0),
            Projection::new(0.0, 0.0, 0.0, 0.0),
            150.0,
            0.0,
        );
        assert_relative_eq!(model.mean_velocity(3.0, 4.0), 150.0, epsilon = 1e-12);
    }

    #[test]
    fn test_edge_on_line_of_sight_component() {
        let model = KinematicModel::new(
            RotationCurve::new(200.0, 1.0),
            Projection::new(90.0, 0.0, 0.0, 0.0),
            0.0,
            0.0,
        );
        let speed = model.curve.velocity(5.0);

        // v_los = v(R) sin(i) cos(azimuth)
        assert_relative_eq!(model.rotation_velocity(5.0, 0.0), speed, epsilon = 1e-10);
        assert_relative_eq!(model.rotation_velocity(-5.0, 0.0), -speed, epsilon = 1e-10);
        assert_relative_eq!(model.rotation_velocity(0.0, 5.0), 0.0, epsilon = 1e-10);

        let inclined = KinematicModel::new(
            RotationCurve::new(200.0, 1.0),
            Projection::new(30.0, 70.0, 0.0, 0.0),
            0.0,
            0.0,
        );
        let (x, y) = (3.0_f64, 4.0_f64);
        let azimuth = y.atan2(x);
        assert_relative_eq!(
            inclined.rotation_velocity(x, y),
            speed * 30.0_f64.to_radians().sin() * azimuth.cos(),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_dispersion_draws() {
        let model = KinematicModel::new(
            RotationCurve::new(200.0, 1.0),
            Projection::identity(),
            100.0,
            40.0,
        );
        assert_relative_eq!(model.dispersion(), 40.0);

        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| model.sample_velocity(1.0, 1.0, &mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        assert_relative_eq!(mean, 100.0, epsilon = 1.5);
        assert_relative_eq!(var.sqrt(), 40.0, epsilon = 1.5);

        let cold = KinematicModel::new(
            RotationCurve::new(200.0, 1.0),
            Projection::identity(),
            100.0,
            0.0,
        );
        assert_eq!(cold.sample_velocity(1.0, 1.0, &mut rng), 100.0);
    }
}
