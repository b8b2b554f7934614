//! Instrumental beam convolution.
//!
//! Each velocity channel is convolved independently with the same
//! normalized elliptical Gaussian, so the spectral axis is never mixed.

use galcube_shared::image_proc::{convolve2d, elliptical_gaussian_kernel, ConvolveOptions};
use ndarray::{Array2, Array3, ArrayView2, ArrayViewMut2, Axis};
use rayon::prelude::*;

use crate::config::BeamInfo;
use crate::error::NumericalWarning;

/// Sub-samples per pixel side when integrating the kernel
pub const BEAM_OVERSAMPLE: usize = 5;

/// Minor-axis FWHM, in pixels, below which the beam is undersampled
pub const UNDERSAMPLED_FWHM_PIXELS: f64 = 2.0;

/// Pixelized beam ready for convolution
#[derive(Debug, Clone, PartialEq)]
pub struct BeamKernel {
    pub beam: BeamInfo,
    kernel: Array2<f64>,
}

impl BeamKernel {
    /// Kernel for `beam` on a grid of the given pixel scale, `None` for the zero beam
    pub fn from_beam(beam: &BeamInfo, pixel_scale: f64) -> Option<Self> {
        if beam.is_none() {
            return None;
        }
        let (sigma_major, sigma_minor) = beam.sigma_pixels(pixel_scale);
        let kernel = elliptical_gaussian_kernel(
            sigma_major,
            sigma_minor,
            beam.bpa.to_radians(),
            BEAM_OVERSAMPLE,
        );
        Some(Self {
            beam: *beam,
            kernel,
        })
    }

    pub fn kernel(&self) -> &Array2<f64> {
        &self.kernel
    }

    /// Side length in pixels
    pub fn size(&self) -> usize {
        self.kernel.nrows()
    }
}

/// Warnings about how well the grid samples the beam
pub fn beam_warnings(beam: &BeamInfo, pixel_scale: f64) -> Vec<NumericalWarning> {
    if beam.is_none() {
        return Vec::new();
    }
    let minor_fwhm_pixels = beam.minor_fwhm_pixels(pixel_scale);
    if minor_fwhm_pixels < UNDERSAMPLED_FWHM_PIXELS {
        vec![NumericalWarning::BeamUndersampled { minor_fwhm_pixels }]
    } else {
        Vec::new()
    }
}

/// Convolve every channel of `cube` with the beam
///
/// Channels are spread over the rayon pool when `parallel` is set; each
/// channel's convolution itself runs sequentially.
pub fn convolve_cube(cube: &Array3<f64>, beam: &BeamKernel, parallel: bool) -> Array3<f64> {
    let mut output = Array3::zeros(cube.dim());
    let options = ConvolveOptions { parallel: false };

    let convolve_channel = |(mut out, plane): (ArrayViewMut2<f64>, ArrayView2<f64>)| {
        out.assign(&convolve2d(&plane.to_owned(), beam.kernel(), options));
    };

    if parallel {
        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(cube.axis_iter(Axis(0)).into_par_iter())
            .for_each(convolve_channel);
    } else {
        output
            .axis_iter_mut(Axis(0))
            .zip(cube.axis_iter(Axis(0)))
            .for_each(convolve_channel);
    }

    output
}
