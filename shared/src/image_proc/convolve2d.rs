//! 2D convolution operations for ndarray
//!
//! This module provides 2D convolution of image planes with small kernels,
//! with optional parallel processing using rayon, and the elliptical Gaussian
//! kernels used to emulate an instrumental beam.
//!
//! Pixels outside the input are treated as zero, so flux that the kernel
//! spreads past the image boundary is lost rather than folded back in.

use ndarray::{Array2, Zip};
use std::ops::{Add, Mul};

/// Half-width of Gaussian kernels, in standard deviations of the major axis
pub const KERNEL_HALF_WIDTH_SIGMAS: f64 = 4.0;

/// Side length in pixels of the kernel built for a given major-axis sigma
///
/// Saturates at `usize::MAX` for sigmas too large to address.
pub fn gaussian_kernel_size(sigma_major: f64) -> usize {
    kernel_radius(sigma_major)
        .saturating_mul(2)
        .saturating_add(1)
}

fn kernel_radius(sigma_major: f64) -> usize {
    (KERNEL_HALF_WIDTH_SIGMAS * sigma_major).ceil().max(1.0) as usize
}

/// Options for controlling the convolution operation
#[derive(Debug, Clone, Copy)]
pub struct ConvolveOptions {
    /// Whether to use parallel processing with rayon
    pub parallel: bool,
}

impl Default for ConvolveOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Convolve a 2D array with a kernel
///
/// The kernel is applied as a correlation centred on its middle element, which
/// equals a true convolution for point-symmetric kernels such as Gaussians.
/// The output has the same shape as the input.
///
/// # Arguments
///
/// * `input` - Input 2D array
/// * `kernel` - Convolution kernel with odd dimensions
/// * `options` - Convolution options
///
/// # Returns
///
/// A new Array2 containing the convolution result
pub fn convolve2d<T>(input: &Array2<T>, kernel: &Array2<T>, options: ConvolveOptions) -> Array2<T>
where
    T: Copy + Add<Output = T> + Mul<Output = T> + Send + Sync + num_traits::Zero,
{
    let (input_rows, input_cols) = input.dim();

    let mut output = Array2::zeros((input_rows, input_cols));

    if options.parallel {
        Zip::indexed(&mut output).par_for_each(|(i, j), out| {
            *out = correlate_at(input, kernel, i, j);
        });
    } else {
        Zip::indexed(&mut output).for_each(|(i, j), out| {
            *out = correlate_at(input, kernel, i, j);
        });
    }

    output
}

// Weighted sum of the kernel footprint centred on (i, j), zero outside the input
fn correlate_at<T>(input: &Array2<T>, kernel: &Array2<T>, i: usize, j: usize) -> T
where
    T: Copy + Add<Output = T> + Mul<Output = T> + num_traits::Zero,
{
    let (input_rows, input_cols) = input.dim();
    let (kernel_rows, kernel_cols) = kernel.dim();
    let kr = (kernel_rows / 2) as isize;
    let kc = (kernel_cols / 2) as isize;

    let mut sum = T::zero();
    for ki in 0..kernel_rows {
        let ii = i as isize + ki as isize - kr;
        if ii < 0 || ii >= input_rows as isize {
            continue;
        }
        for kj in 0..kernel_cols {
            let jj = j as isize + kj as isize - kc;
            if jj < 0 || jj >= input_cols as isize {
                continue;
            }
            sum = sum + input[[ii as usize, jj as usize]] * kernel[[ki, kj]];
        }
    }
    sum
}

/// Create a normalized elliptical Gaussian kernel
///
/// The kernel is indexed `[row, col]` = `[y, x]`. The major axis points along
/// +y when `position_angle` is zero and turns counter-clockwise (towards -x)
/// as the angle grows. Each kernel pixel is integrated by averaging
/// `oversample × oversample` sub-pixel samples, so narrow kernels keep the
/// right centroid and width, and the result is normalized to sum to 1.
///
/// # Arguments
///
/// * `sigma_major` - Standard deviation along the major axis, in pixels
/// * `sigma_minor` - Standard deviation along the minor axis, in pixels
/// * `position_angle` - Major axis angle in radians, counter-clockwise from +y
/// * `oversample` - Sub-samples per pixel side (at least 1)
///
/// # Returns
///
/// A square kernel of side [`gaussian_kernel_size`]`(sigma_major)`
pub fn elliptical_gaussian_kernel(
    sigma_major: f64,
    sigma_minor: f64,
    position_angle: f64,
    oversample: usize,
) -> Array2<f64> {
    assert!(
        sigma_major > 0.0 && sigma_minor > 0.0,
        "Gaussian widths must be positive"
    );

    let radius = kernel_radius(sigma_major);
    let size = 2 * radius + 1;
    let oversample = oversample.max(1);
    let sub_step = 1.0 / oversample as f64;

    let (sin_pa, cos_pa) = position_angle.sin_cos();
    let inv_var_major = 1.0 / (sigma_major * sigma_major);
    let inv_var_minor = 1.0 / (sigma_minor * sigma_minor);

    let mut kernel = Array2::from_shape_fn((size, size), |(row, col)| {
        let y0 = row as f64 - radius as f64;
        let x0 = col as f64 - radius as f64;

        let mut acc = 0.0;
        for sy in 0..oversample {
            let dy = y0 - 0.5 + (sy as f64 + 0.5) * sub_step;
            for sx in 0..oversample {
                let dx = x0 - 0.5 + (sx as f64 + 0.5) * sub_step;
                // Coordinates along the major and minor axes
                let u = -dx * sin_pa + dy * cos_pa;
                let w = dx * cos_pa + dy * sin_pa;
                acc += (-0.5 * (u * u * inv_var_major + w * w * inv_var_minor)).exp();
            }
        }
        acc
    });

    let sum = kernel.sum();
    kernel.mapv_inplace(|v| v / sum);

    kernel
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    fn sequential() -> ConvolveOptions {
        ConvolveOptions { parallel: false }
    }

    #[test]
    fn test_convolution_identity() {
        let input = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        let kernel = arr2(&[[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);

        let output = convolve2d(&input, &kernel, ConvolveOptions::default());

        for ((i, j), &value) in output.indexed_iter() {
            assert_relative_eq!(value, input[[i, j]], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_padding_shift() {
        let input = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        // Picks up the right-hand neighbour, zero past the edge
        let kernel = arr2(&[[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]]);

        let output = convolve2d(&input, &kernel, sequential());

        assert_relative_eq!(output[[0, 0]], 2.0);
        assert_relative_eq!(output[[0, 1]], 3.0);
        assert_relative_eq!(output[[0, 2]], 0.0);
        assert_relative_eq!(output[[1, 1]], 6.0);
        assert_relative_eq!(output[[2, 2]], 0.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let input = Array2::from_shape_fn((17, 23), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let kernel = elliptical_gaussian_kernel(2.0, 1.0, 0.3, 3);

        let seq_output = convolve2d(&input, &kernel, sequential());
        let par_output = convolve2d(&input, &kernel, ConvolveOptions { parallel: true });

        for (a, b) in seq_output.iter().zip(par_output.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_kernel_size_saturates_for_huge_sigma() {
        assert_eq!(gaussian_kernel_size(0.1), 3);
        assert_eq!(gaussian_kernel_size(2.0), 17);
        assert_eq!(gaussian_kernel_size(1e20), usize::MAX);
        assert_eq!(gaussian_kernel_size(f64::INFINITY), usize::MAX);
    }

    #[test]
    fn test_kernel_normalized_and_odd() {
        for (major, minor) in [(0.3, 0.3), (1.0, 0.5), (3.5, 2.0)] {
            let kernel = elliptical_gaussian_kernel(major, minor, 0.7, 4);
            let (rows, cols) = kernel.dim();
            assert_eq!(rows, cols);
            assert_eq!(rows % 2, 1);
            assert_relative_eq!(kernel.sum(), 1.0, epsilon = 1e-12);
            assert!(kernel.iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn test_kernel_orientation() {
        // Zero position angle: major axis along rows (y)
        let kernel = elliptical_gaussian_kernel(3.0, 1.0, 0.0, 1);
        let c = kernel.dim().0 / 2;
        assert!(kernel[[c + 3, c]] > kernel[[c, c + 3]]);

        // Quarter turn: major axis along columns (x)
        let turned = elliptical_gaussian_kernel(3.0, 1.0, std::f64::consts::FRAC_PI_2, 1);
        assert!(turned[[c, c + 3]] > turned[[c + 3, c]]);
        assert_relative_eq!(turned[[c, c + 3]], kernel[[c + 3, c]], epsilon = 1e-9);
    }

    #[test]
    fn test_interior_flux_is_conserved() {
        let mut input = Array2::<f64>::zeros((41, 41));
        input[[20, 20]] = 100.0;
        input[[18, 23]] = 50.0;

        let kernel = elliptical_gaussian_kernel(2.0, 1.5, 1.1, 3);
        let output = convolve2d(&input, &kernel, ConvolveOptions::default());

        assert_relative_eq!(output.sum(), 150.0, epsilon = 1e-9);
    }
}
