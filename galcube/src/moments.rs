//! Cube summaries for inspection and plotting front-ends.
//!
//! Moment maps follow the usual radio conventions: moment 0 is the flux
//! summed over channels, moment 1 the flux-weighted mean velocity and
//! moment 2 the flux-weighted velocity dispersion. Pixels without flux get
//! `NaN` in the velocity moments.

use ndarray::{Array1, Array2, Array3, ArrayView2, Axis, Zip};

use crate::config::ChannelGrid;

/// Velocity of every channel centre
pub fn velocity_axis(channels: &ChannelGrid) -> Array1<f64> {
    Array1::from(channels.velocities())
}

/// Flux summed along the velocity axis
pub fn moment0(cube: &Array3<f64>) -> Array2<f64> {
    cube.sum_axis(Axis(0))
}

/// Flux-weighted mean velocity per pixel
pub fn moment1(cube: &Array3<f64>, channels: &ChannelGrid) -> Array2<f64> {
    let velocities = velocity_axis(channels);
    let total = moment0(cube);
    let mut weighted = Array2::<f64>::zeros(total.dim());
    for (plane, &v) in cube.axis_iter(Axis(0)).zip(velocities.iter()) {
        weighted.scaled_add(v, &plane);
    }
    Zip::from(&mut weighted).and(&total).for_each(|w, &t| {
        *w = if t > 0.0 { *w / t } else { f64::NAN };
    });
    weighted
}

/// Flux-weighted velocity dispersion per pixel
pub fn moment2(cube: &Array3<f64>, channels: &ChannelGrid) -> Array2<f64> {
    let velocities = velocity_axis(channels);
    let total = moment0(cube);
    let mean = moment1(cube, channels);
    let mut spread = Array2::<f64>::zeros(total.dim());
    for (plane, &v) in cube.axis_iter(Axis(0)).zip(velocities.iter()) {
        Zip::from(&mut spread)
            .and(&plane)
            .and(&mean)
            .for_each(|s, &flux, &m| {
                if flux > 0.0 {
                    *s += flux * (v - m) * (v - m);
                }
            });
    }
    Zip::from(&mut spread).and(&total).for_each(|s, &t| {
        *s = if t > 0.0 { (*s / t).sqrt() } else { f64::NAN };
    });
    spread
}

/// Spatially integrated spectrum, one value per channel
pub fn integrated_spectrum(cube: &Array3<f64>) -> Array1<f64> {
    cube.sum_axis(Axis(2)).sum_axis(Axis(1))
}

/// View of one channel, `None` past the last channel
pub fn channel_slice(cube: &Array3<f64>, channel: usize) -> Option<ArrayView2<'_, f64>> {
    (channel < cube.len_of(Axis(0))).then(|| cube.index_axis(Axis(0), channel))
}

/// Brightest cell as `(channel, y, x)`, `None` for an empty cube
pub fn peak_position(cube: &Array3<f64>) -> Option<(usize, usize, usize)> {
    cube.indexed_iter()
        .filter(|(_, v)| **v > 0.0)
        .fold(None, |best: Option<((usize, usize, usize), f64)>, (index, &v)| match best {
            Some((_, peak)) if peak >= v => best,
            _ => Some((index, v)),
        })
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpectralAxis;
    use approx::assert_relative_eq;

    fn channels() -> ChannelGrid {
        SpectralAxis::new(4, 10.0).with_reference_velocity(0.0).resolve(0.0)
    }

    fn cube() -> Array3<f64> {
        let mut cube = Array3::zeros((4, 2, 2));
        // Pixel (0, 0): equal flux at -15 and +5 km/s
        cube[[0, 0, 0]] = 1.0;
        cube[[2, 0, 0]] = 1.0;
        // Pixel (1, 1): single channel at +15 km/s
        cube[[3, 1, 1]] = 3.0;
        cube
    }

    #[test]
    fn test_velocity_axis() {
        assert_eq!(velocity_axis(&channels()).to_vec(), vec![-15.0, -5.0, 5.0, 15.0]);
    }

    #[test]
    fn test_moments() {
        let cube = cube();
        let m0 = moment0(&cube);
        assert_relative_eq!(m0[[0, 0]], 2.0);
        assert_relative_eq!(m0[[1, 1]], 3.0);
        assert_eq!(m0[[0, 1]], 0.0);

        let m1 = moment1(&cube, &channels());
        assert_relative_eq!(m1[[0, 0]], -5.0);
        assert_relative_eq!(m1[[1, 1]], 15.0);
        assert!(m1[[0, 1]].is_nan());

        let m2 = moment2(&cube, &channels());
        assert_relative_eq!(m2[[0, 0]], 10.0);
        assert_relative_eq!(m2[[1, 1]], 0.0);
        assert!(m2[[1, 0]].is_nan());
    }

    #[test]
    fn test_spectrum_and_slices() {
        let cube = cube();
        assert_eq!(integrated_spectrum(&cube).to_vec(), vec![1.0, 0.0, 1.0, 3.0]);
        assert_eq!(channel_slice(&cube, 3).map(|s| s.sum()), Some(3.0));
        assert!(channel_slice(&cube, 4).is_none());
    }

    #[test]
    fn test_peak_position() {
        assert_eq!(peak_position(&cube()), Some((3, 1, 1)));
        assert_eq!(peak_position(&Array3::zeros((2, 2, 2))), None);
    }
}
