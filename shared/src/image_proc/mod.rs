//! Image plane processing primitives.
//!
//! - **convolve2d**: 2D convolution with elliptical Gaussian kernels for beam application

pub mod convolve2d;

pub use convolve2d::{
    convolve2d, elliptical_gaussian_kernel, gaussian_kernel_size, ConvolveOptions,
    KERNEL_HALF_WIDTH_SIGMAS,
};
