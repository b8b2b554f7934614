//! Galaxy light profile model.
//!
//! A galaxy's intrinsic (face-on, centred) light distribution is the product
//! of a Sérsic radial surface-brightness law and a normalized vertical
//! density, so the disk has real thickness before it is projected.
//!
//! # Sérsic law
//!
//! ```text
//! I(r) = Se * exp(-b_n * ((r / Re)^(1/n) - 1))
//! ```
//!
//! `b_n` is chosen so that `Re` encloses half of the (untruncated) light,
//! i.e. it solves `P(2n, b_n) = 1/2` with `P` the regularized lower incomplete
//! gamma function. The root is found numerically for any `n > 0`;
//! [`ciotti_bertin_bn`] gives the usual asymptotic series for comparison.
//!
//! # Truncation
//!
//! The radial profile is cut at [`TRUNCATION_EFFECTIVE_RADII`] × `Re` and the
//! vertical profile at [`VERTICAL_TRUNCATION_SCALE_HEIGHTS`] × `hz`. Beyond
//! those the light is exactly zero. [`SersicProfile::total_flux`] integrates
//! the truncated profile, which is the total a rasterized cube should
//! reproduce; [`SersicProfile::truncated_fraction`] reports what the cut
//! discards (about 0.2% for n = 1, 1.6% for n = 1.5).

use serde::{Deserialize, Serialize};
use statrs::function::gamma::{gamma, gamma_lr};
use std::f64::consts::PI;

use crate::galaxy::GalaxyParameters;

/// Radial truncation of the Sérsic profile, in effective radii
pub const TRUNCATION_EFFECTIVE_RADII: f64 = 5.0;

/// Vertical truncation of the disk, in scale heights
pub const VERTICAL_TRUNCATION_SCALE_HEIGHTS: f64 = 5.0;

/// Sérsic normalization `b_n`, exact to ~1e-12 relative.
///
/// Solves `P(2n, b) = 1/2` by bisection. `P(a, x)` rises monotonically in `x`
/// and its median lies below `a`, so `[0, 2n + 2]` always brackets the root.
pub fn sersic_bn(n: f64) -> f64 {
    let a = 2.0 * n;
    let mut lo = 0.0;
    let mut hi = a + 2.0;

    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if gamma_lr(a, mid) < 0.5 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-14 * hi {
            break;
        }
    }

    0.5 * (lo + hi)
}

/// Ciotti & Bertin (1999) asymptotic expansion of `b_n`, accurate for n > 0.36
pub fn ciotti_bertin_bn(n: f64) -> f64 {
    2.0 * n - 1.0 / 3.0 + 4.0 / (405.0 * n) + 46.0 / (25515.0 * n.powi(2))
        + 131.0 / (1_148_175.0 * n.powi(3))
        - 2_194_697.0 / (30_690_717_750.0 * n.powi(4))
}

/// Truncated Sérsic surface-brightness profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SersicProfile {
    /// Half-light radius (pixels)
    pub effective_radius: f64,
    /// Shape index n
    pub sersic_index: f64,
    /// Surface brightness at the effective radius (flux per square pixel)
    pub effective_brightness: f64,
    b_n: f64,
}

impl SersicProfile {
    pub fn new(effective_radius: f64, sersic_index: f64, effective_brightness: f64) -> Self {
        Self {
            effective_radius,
            sersic_index,
            effective_brightness,
            b_n: sersic_bn(sersic_index),
        }
    }

    /// The normalization constant in use
    pub fn b_n(&self) -> f64 {
        self.b_n
    }

    /// Radius beyond which the profile is zero
    pub fn truncation_radius(&self) -> f64 {
        TRUNCATION_EFFECTIVE_RADII * self.effective_radius
    }

    /// Surface brightness at radius `r`
    pub fn intensity(&self, r: f64) -> f64 {
        if r > self.truncation_radius() {
            return 0.0;
        }
        let scaled = (r / self.effective_radius).powf(1.0 / self.sersic_index);
        self.effective_brightness * (-self.b_n * (scaled - 1.0)).exp()
    }

    /// Analytic flux inside radius `r`, ignoring the truncation
    pub fn enclosed_flux(&self, r: f64) -> f64 {
        if r <= 0.0 {
            return 0.0;
        }
        let a = 2.0 * self.sersic_index;
        let x = self.b_n * (r / self.effective_radius).powf(1.0 / self.sersic_index);
        self.untruncated_flux() * gamma_lr(a, x)
    }

    /// Total flux of the profile extended to infinity
    pub fn untruncated_flux(&self) -> f64 {
        let n = self.sersic_index;
        let re = self.effective_radius;
        2.0 * PI * n * re * re * self.effective_brightness * self.b_n.exp()
            / self.b_n.powf(2.0 * n)
            * gamma(2.0 * n)
    }

    /// Total flux of the truncated profile
    pub fn total_flux(&self) -> f64 {
        self.enclosed_flux(self.truncation_radius())
    }

    /// Share of the untruncated flux lost beyond the truncation radius
    pub fn truncated_fraction(&self) -> f64 {
        1.0 - self.total_flux() / self.untruncated_flux()
    }
}

/// Functional form of the vertical disk density
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalProfileKind {
    /// `exp(-|z| / hz)`
    #[default]
    Exponential,
    /// `sech²(z / hz)`
    Sech2,
}

/// Vertical density along the disk's minor axis, normalized to unit integral
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalProfile {
    pub kind: VerticalProfileKind,
    /// Scale height (pixels)
    pub scale_height: f64,
}

impl VerticalProfile {
    pub fn new(kind: VerticalProfileKind, scale_height: f64) -> Self {
        Self { kind, scale_height }
    }

    /// Height beyond which the density is zero
    pub fn truncation_height(&self) -> f64 {
        VERTICAL_TRUNCATION_SCALE_HEIGHTS * self.scale_height
    }

    /// Density at height `z` above the mid-plane
    pub fn density(&self, z: f64) -> f64 {
        if z.abs() > self.truncation_height() {
            return 0.0;
        }
        let h = self.scale_height;
        match self.kind {
            VerticalProfileKind::Exponential => (-z.abs() / h).exp() / (2.0 * h),
            VerticalProfileKind::Sech2 => {
                let sech = 1.0 / (z / h).cosh();
                sech * sech / (2.0 * h)
            }
        }
    }

    /// Midpoint quadrature nodes `(z, weight)` across the truncated disk.
    ///
    /// Weights are renormalized to sum to exactly 1 so that collapsing the
    /// disk along z reproduces the radial profile without loss.
    pub fn nodes(&self, count: usize) -> Vec<(f64, f64)> {
        let count = count.max(1);
        let z_max = self.truncation_height();
        let dz = 2.0 * z_max / count as f64;

        let mut nodes: Vec<(f64, f64)> = (0..count)
            .map(|k| {
                let z = -z_max + (k as f64 + 0.5) * dz;
                (z, self.density(z) * dz)
            })
            .collect();

        let total: f64 = nodes.iter().map(|(_, w)| w).sum();
        for node in nodes.iter_mut() {
            node.1 /= total;
        }
        nodes
    }
}

/// Intrinsic-frame light model of one galaxy, in pixel units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GalaxyLightModel {
    pub sersic: SersicProfile,
    pub vertical: VerticalProfile,
}

impl GalaxyLightModel {
    /// Build the model for a galaxy, converting lengths and areas to pixels
    pub fn from_parameters(
        params: &GalaxyParameters,
        pixel_scale: f64,
        kind: VerticalProfileKind,
    ) -> Self {
        Self {
            sersic: SersicProfile::new(
                params.effective_radius / pixel_scale,
                params.sersic_index,
                params.effective_brightness * pixel_scale * pixel_scale,
            ),
            vertical: VerticalProfile::new(kind, params.scale_height / pixel_scale),
        }
    }

    /// Face-on surface brightness at intrinsic disk-plane position (x, y)
    pub fn surface_brightness(&self, x: f64, y: f64) -> f64 {
        self.sersic.intensity(x.hypot(y))
    }

    /// Volume emissivity at intrinsic position (x, y, z)
    pub fn emissivity(&self, x: f64, y: f64, z: f64) -> f64 {
        self.surface_brightness(x, y) * self.vertical.density(z)
    }
}
