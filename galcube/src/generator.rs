//! Batch cube generation.
//!
//! A [`Generator`] pairs a validated [`SystemConfiguration`] with a
//! [`ParameterSource`] and produces any number of cubes. Every cube gets its
//! own seed derived from the batch seed, so cubes are independent of each
//! other and of how rayon schedules them: a serial run and a parallel run
//! with the same seed give identical results.
//!
//! Pipeline per cube:
//! 1. Draw the galaxy records (population mode) or take the caller's.
//! 2. Rasterize each galaxy into its own cube with its own seeded RNG.
//! 3. Sum the galaxies on the shared grid.
//! 4. Convolve each channel with the beam.

use galcube_shared::algo::{derive_seed, map_seeded};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::beam::{beam_warnings, convolve_cube, BeamKernel};
use crate::compose::{composite, Composite};
use crate::config::{BeamInfo, ChannelGrid, SpatialGrid, SpectralAxis, SystemConfiguration};
use crate::error::{ConfigurationError, CubeError, GenerationError, NumericalWarning, Stage};
use crate::galaxy::GalaxyParameters;
use crate::moments;
use crate::profile::VerticalProfileKind;
use crate::rasterize::{rasterize_galaxy, GalaxyRaster};
use crate::sampler::{
    satellites_from_primary, ParameterSource, PhysicalGalaxies, PopulationRanges,
    PopulationSampling, Resolution,
};

/// Velocity span covered by default in physical mode (km/s)
pub const PHYSICAL_VELOCITY_SPAN: f64 = 800.0;

/// Cooperative cancellation flag shared between a caller and a running batch
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the batch to stop before its next cube
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a batch is executed
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Spread cubes, galaxies and channels over the rayon pool
    pub parallel: bool,
    pub cancel: CancelToken,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            cancel: CancelToken::new(),
        }
    }
}

/// Everything needed to interpret one cube
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Position of the cube in its batch
    pub index: usize,
    /// Seed the cube was generated from
    pub seed: u64,
    pub grid_size: usize,
    pub pixel_scale: f64,
    pub channel_width: f64,
    /// Velocity at the centre of the spectral axis
    pub reference_velocity: f64,
    pub beam: BeamInfo,
    pub vertical: VerticalProfileKind,
    pub galaxies: Vec<GalaxyParameters>,
    pub config: SystemConfiguration,
    pub warnings: Vec<NumericalWarning>,
    pub flux_before_beam: f64,
    pub flux_after_beam: f64,
}

impl Metadata {
    /// Channel layout of the cube
    pub fn channels(&self) -> ChannelGrid {
        ChannelGrid {
            n_channels: self.config.spectral.n_channels,
            channel_width: self.channel_width,
            reference_velocity: self.reference_velocity,
        }
    }
}

/// One generated cube, indexed `(channel, y, x)`, and its metadata
#[derive(Debug, Clone)]
pub struct CubeResult {
    pub cube: Array3<f64>,
    pub metadata: Metadata,
}

impl CubeResult {
    pub fn moment0(&self) -> Array2<f64> {
        moments::moment0(&self.cube)
    }

    pub fn moment1(&self) -> Array2<f64> {
        moments::moment1(&self.cube, &self.metadata.channels())
    }

    pub fn moment2(&self) -> Array2<f64> {
        moments::moment2(&self.cube, &self.metadata.channels())
    }

    pub fn integrated_spectrum(&self) -> Array1<f64> {
        moments::integrated_spectrum(&self.cube)
    }

    pub fn velocity_axis(&self) -> Array1<f64> {
        moments::velocity_axis(&self.metadata.channels())
    }

    pub fn total_flux(&self) -> f64 {
        self.cube.sum()
    }
}

/// Cubes of one batch in generation order
#[derive(Debug, Clone, Default)]
pub struct Results {
    cubes: Vec<CubeResult>,
}

impl Results {
    pub fn len(&self) -> usize {
        self.cubes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cubes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CubeResult> {
        self.cubes.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CubeResult> {
        self.cubes.iter()
    }

    /// Metadata of every cube, in order
    pub fn metadata(&self) -> Vec<&Metadata> {
        self.cubes.iter().map(|c| &c.metadata).collect()
    }
}

impl IntoIterator for Results {
    type Item = CubeResult;
    type IntoIter = std::vec::IntoIter<CubeResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.cubes.into_iter()
    }
}

impl<'a> IntoIterator for &'a Results {
    type Item = &'a CubeResult;
    type IntoIter = std::slice::Iter<'a, CubeResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.cubes.iter()
    }
}

/// Validated batch of cubes waiting to be generated
#[derive(Debug, Clone)]
pub struct Generator {
    config: SystemConfiguration,
    n_cubes: usize,
    source: ParameterSource,
}

impl Generator {
    /// Validate everything up front; no cube is built on error
    pub fn new(
        config: SystemConfiguration,
        n_cubes: usize,
        source: ParameterSource,
    ) -> Result<Self, CubeError> {
        config.validate()?;
        if n_cubes == 0 {
            return Err(ConfigurationError::NoCubes.into());
        }
        source.validate(&config)?;

        Ok(Self {
            config,
            n_cubes,
            source,
        })
    }

    pub fn config(&self) -> &SystemConfiguration {
        &self.config
    }

    pub fn n_cubes(&self) -> usize {
        self.n_cubes
    }

    pub fn source(&self) -> &ParameterSource {
        &self.source
    }

    /// Generate the whole batch in parallel
    pub fn generate(&self) -> Result<Results, CubeError> {
        self.generate_with(&GenerateOptions::default(), |_| {})
    }

    /// Generate the batch, calling `progress` with each finished cube's index
    pub fn generate_with<P>(
        &self,
        options: &GenerateOptions,
        progress: P,
    ) -> Result<Results, CubeError>
    where
        P: Fn(usize) + Sync,
    {
        let base_seed = self
            .config
            .seed
            .unwrap_or_else(|| StdRng::from_entropy().next_u64());
        info!(
            "Generating {} cube(s) of {} galaxies (batch seed {}, {})",
            self.n_cubes,
            self.config.n_gals,
            base_seed,
            if options.parallel { "parallel" } else { "serial" }
        );

        let run = |index: usize| -> Result<CubeResult, CubeError> {
            if options.cancel.is_cancelled() {
                return Err(CubeError::Cancelled {
                    next_cube: index,
                    requested: self.n_cubes,
                });
            }
            let seed = derive_seed(base_seed, index as u64);
            let result = self.generate_cube(index, seed, options.parallel)?;
            progress(index);
            Ok(result)
        };

        let cubes = if options.parallel {
            (0..self.n_cubes)
                .into_par_iter()
                .map(run)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            (0..self.n_cubes)
                .map(run)
                .collect::<Result<Vec<_>, _>>()?
        };

        info!("Generated {} cube(s)", cubes.len());
        Ok(Results { cubes })
    }

    /// Build a single cube from its own seed
    pub fn generate_cube(
        &self,
        index: usize,
        seed: u64,
        parallel: bool,
    ) -> Result<CubeResult, GenerationError> {
        let mut rng = StdRng::seed_from_u64(seed);

        let galaxies = self
            .source
            .sample(&self.config, &mut rng)
            .map_err(|e| GenerationError::new(index, Stage::Sampling, e.to_string()))?;
        let primary = galaxies
            .first()
            .ok_or_else(|| GenerationError::new(index, Stage::Sampling, "no galaxies sampled"))?;
        let grid = self.config.cube_grid(primary.systemic_velocity);

        let galaxy_seed: u64 = rng.gen();
        let rasters = map_seeded(&galaxies, galaxy_seed, parallel, |g, params, rng| {
            debug!("cube {index}: rasterizing galaxy {g} ({params:?})");
            rasterize_galaxy(params, &grid, self.config.vertical, rng).map_err(|e| {
                GenerationError::new(index, Stage::Rasterization, e.to_string()).for_galaxy(g)
            })
        })
        .into_iter()
        .collect::<Result<Vec<GalaxyRaster>, _>>()?;

        let Composite { cube, mut warnings } = composite(grid.shape(), &rasters)
            .map_err(|reason| GenerationError::new(index, Stage::Composition, reason))?;
        let flux_before_beam = cube.sum();

        warnings.extend(beam_warnings(&self.config.beam, grid.pixel_scale));
        let cube = match BeamKernel::from_beam(&self.config.beam, grid.pixel_scale) {
            Some(kernel) => convolve_cube(&cube, &kernel, parallel),
            None => cube,
        };
        let flux_after_beam = cube.sum();
        if !flux_after_beam.is_finite() {
            return Err(GenerationError::new(
                index,
                Stage::Convolution,
                "convolved cube contains non-finite values",
            ));
        }

        for warning in &warnings {
            warn!("cube {index}: {warning}");
        }
        debug!(
            "cube {index}: flux {flux_before_beam:.4} before beam, {flux_after_beam:.4} after"
        );

        Ok(CubeResult {
            cube,
            metadata: Metadata {
                index,
                seed,
                grid_size: grid.size,
                pixel_scale: grid.pixel_scale,
                channel_width: grid.channels.channel_width,
                reference_velocity: grid.channels.reference_velocity,
                beam: self.config.beam,
                vertical: self.config.vertical,
                galaxies,
                config: self.config,
                warnings,
                flux_before_beam,
                flux_after_beam,
            },
        })
    }
}

/// Settings for randomly drawn systems on a pixel grid
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationOptions {
    pub n_gals: usize,
    pub n_cubes: usize,
    pub resolution: Resolution,
    /// Satellite separation scale, in primary effective radii
    pub offset_gals: f64,
    /// Beam FWHM and position angle in pixels and degrees
    pub beam: BeamInfo,
    pub grid_size: usize,
    pub n_spectral_slices: usize,
    /// km/s
    pub channel_width: f64,
    pub n_sersic: Option<f64>,
    pub ranges: PopulationRanges,
    pub vertical: VerticalProfileKind,
    pub seed: Option<u64>,
}

impl Default for PopulationOptions {
    fn default() -> Self {
        Self {
            n_gals: 1,
            n_cubes: 1,
            resolution: Resolution::All,
            offset_gals: 5.0,
            beam: BeamInfo::new(4.0, 4.0, 0.0),
            grid_size: 125,
            n_spectral_slices: 40,
            channel_width: 20.0,
            n_sersic: None,
            ranges: PopulationRanges::default(),
            vertical: VerticalProfileKind::Exponential,
            seed: None,
        }
    }
}

/// Generator drawing systems from uniform ranges, lengths in pixels
pub fn create_population_generator(options: PopulationOptions) -> Result<Generator, CubeError> {
    let config = SystemConfiguration {
        n_gals: options.n_gals,
        grid: SpatialGrid::new(options.grid_size, 1.0),
        spectral: SpectralAxis::new(options.n_spectral_slices, options.channel_width),
        beam: options.beam,
        vertical: options.vertical,
        seed: options.seed,
    };
    let source = ParameterSource::Population(PopulationSampling {
        ranges: options.ranges,
        resolution: options.resolution,
        n_sersic: options.n_sersic,
        offset_gals: options.offset_gals,
    });
    Generator::new(config, options.n_cubes, source)
}

/// Settings for explicit systems in physical units
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalOptions {
    /// Galaxy records, primary first, lengths in the same unit as the resolution
    pub galaxies: Vec<GalaxyParameters>,
    pub n_cubes: usize,
    /// Spatial units per pixel
    pub spatial_resolution: f64,
    /// Channel width (km/s)
    pub spectral_resolution: f64,
    /// Channel count; defaults to covering [`PHYSICAL_VELOCITY_SPAN`]
    pub n_spectral_slices: Option<usize>,
    pub reference_velocity: Option<f64>,
    /// Satellite separation scale used by [`PhysicalOptions::with_primary`]
    pub offset_gals: f64,
    /// Fixed Sérsic index for derived satellites; drawn when `None`
    pub n_sersic: Option<f64>,
    /// Beam FWHM in spatial units and position angle in degrees
    pub beam: BeamInfo,
    /// Field of view along one side, in spatial units
    pub fov: f64,
    pub vertical: VerticalProfileKind,
    pub seed: Option<u64>,
}

impl Default for PhysicalOptions {
    fn default() -> Self {
        Self {
            galaxies: Vec::new(),
            n_cubes: 1,
            spatial_resolution: 4.5,
            spectral_resolution: 10.0,
            n_spectral_slices: None,
            reference_velocity: None,
            offset_gals: 20.0,
            n_sersic: None,
            beam: BeamInfo::new(18.0, 18.0, 0.0),
            fov: 125.0,
            vertical: VerticalProfileKind::Exponential,
            seed: None,
        }
    }
}

impl PhysicalOptions {
    /// Replace the galaxies with `primary` plus derived satellites
    pub fn with_primary<R: Rng + ?Sized>(
        mut self,
        primary: GalaxyParameters,
        n_gals: usize,
        rng: &mut R,
    ) -> Self {
        let n_satellites = n_gals.saturating_sub(1);
        let mut galaxies = Vec::with_capacity(n_gals.max(1));
        galaxies.push(primary);
        galaxies.extend(satellites_from_primary(
            &primary,
            n_satellites,
            self.offset_gals,
            self.n_sersic,
            rng,
        ));
        self.galaxies = galaxies;
        self
    }

    /// Pixels per side covering the field of view
    pub fn grid_size(&self) -> usize {
        (self.fov / self.spatial_resolution).ceil().max(0.0) as usize
    }

    pub fn n_channels(&self) -> usize {
        self.n_spectral_slices.unwrap_or_else(|| {
            (PHYSICAL_VELOCITY_SPAN / self.spectral_resolution)
                .ceil()
                .max(0.0) as usize
        })
    }
}

/// Generator for caller-supplied galaxies in physical units
pub fn create_physical_generator(options: PhysicalOptions) -> Result<Generator, CubeError> {
    if !(options.spatial_resolution.is_finite() && options.spatial_resolution > 0.0) {
        return Err(ConfigurationError::InvalidPixelScale(options.spatial_resolution).into());
    }
    if !(options.spectral_resolution.is_finite() && options.spectral_resolution > 0.0) {
        return Err(ConfigurationError::InvalidChannelWidth(options.spectral_resolution).into());
    }
    if let Some(n) = options.n_sersic {
        if !(n.is_finite() && n > 0.0) {
            return Err(ConfigurationError::NonPositive {
                name: "n_sersic",
                value: n,
            }
            .into());
        }
    }
    if !(options.fov.is_finite() && options.fov > 0.0) {
        return Err(ConfigurationError::NonPositive {
            name: "fov",
            value: options.fov,
        }
        .into());
    }

    let mut spectral = SpectralAxis::new(options.n_channels(), options.spectral_resolution);
    spectral.reference_velocity = options.reference_velocity;

    let config = SystemConfiguration {
        n_gals: options.galaxies.len(),
        grid: SpatialGrid::new(options.grid_size(), options.spatial_resolution),
        spectral,
        beam: options.beam,
        vertical: options.vertical,
        seed: options.seed,
    };
    let source = ParameterSource::Physical(PhysicalGalaxies::from_records(&options.galaxies));
    Generator::new(config, options.n_cubes, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_population(seed: Option<u64>) -> PopulationOptions {
        PopulationOptions {
            n_gals: 2,
            n_cubes: 3,
            grid_size: 64,
            n_spectral_slices: 24,
            channel_width: 30.0,
            ranges: PopulationRanges {
                effective_radius: crate::sampler::Bounds::new(3.0, 4.0),
                ..Default::default()
            },
            offset_gals: 3.0,
            seed,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let population = PopulationOptions::default();
        assert_eq!(population.grid_size, 125);
        assert_eq!(population.n_spectral_slices, 40);
        assert_eq!(population.beam, BeamInfo::new(4.0, 4.0, 0.0));
        assert_relative_eq!(population.offset_gals, 5.0);

        let physical = PhysicalOptions::default();
        assert_relative_eq!(physical.spatial_resolution, 4.5);
        assert_relative_eq!(physical.spectral_resolution, 10.0);
        assert_relative_eq!(physical.offset_gals, 20.0);
        assert_eq!(physical.beam, BeamInfo::new(18.0, 18.0, 0.0));
        assert_eq!(physical.grid_size(), 28);
        assert_eq!(physical.n_channels(), 80);
    }

    #[test]
    fn test_validation_happens_before_generation() {
        let err = create_population_generator(PopulationOptions {
            n_cubes: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, CubeError::Configuration(ConfigurationError::NoCubes));

        let err = create_physical_generator(PhysicalOptions::default()).unwrap_err();
        assert_eq!(err, CubeError::Configuration(ConfigurationError::NoGalaxies));
    }

    #[test]
    fn test_serial_and_parallel_agree() {
        let generator = create_population_generator(small_population(Some(7))).unwrap();
        let serial = generator
            .generate_with(
                &GenerateOptions {
                    parallel: false,
                    ..Default::default()
                },
                |_| {},
            )
            .unwrap();
        let parallel = generator.generate().unwrap();

        assert_eq!(serial.len(), 3);
        for (a, b) in serial.iter().zip(parallel.iter()) {
            assert_eq!(a.metadata, b.metadata);
            assert_eq!(a.cube, b.cube);
        }
        let indices: Vec<usize> = parallel.iter().map(|c| c.metadata.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_cubes_in_a_batch_differ() {
        let results = create_population_generator(small_population(Some(3)))
            .unwrap()
            .generate()
            .unwrap();
        let first = results.get(0).unwrap();
        let second = results.get(1).unwrap();
        assert_ne!(first.metadata.seed, second.metadata.seed);
        assert_ne!(first.metadata.galaxies, second.metadata.galaxies);
    }

    #[test]
    fn test_progress_reports_every_cube() {
        let generator = create_population_generator(small_population(Some(1))).unwrap();
        let seen = std::sync::Mutex::new(Vec::new());
        generator
            .generate_with(&GenerateOptions::default(), |i| seen.lock().unwrap().push(i))
            .unwrap();
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_cancel_before_first_cube() {
        let generator = create_population_generator(small_population(Some(1))).unwrap();
        let options = GenerateOptions {
            parallel: false,
            ..Default::default()
        };
        options.cancel.cancel();
        assert_eq!(
            generator.generate_with(&options, |_| {}).unwrap_err(),
            CubeError::Cancelled {
                next_cube: 0,
                requested: 3
            }
        );
    }

    #[test]
    fn test_metadata_records_the_system() {
        let results = create_population_generator(small_population(Some(11)))
            .unwrap()
            .generate()
            .unwrap();
        for result in &results {
            let metadata = &result.metadata;
            assert_eq!(metadata.galaxies.len(), 2);
            assert_eq!(metadata.grid_size, 64);
            assert_eq!(result.cube.dim(), (24, 64, 64));
            assert_relative_eq!(
                metadata.reference_velocity,
                metadata.galaxies[0].systemic_velocity
            );
            assert_relative_eq!(result.total_flux(), metadata.flux_after_beam);
            assert!(result.cube.iter().all(|&v| v >= 0.0));
            assert_eq!(result.velocity_axis().len(), 24);
        }

        let json = serde_json::to_string(&results.get(0).unwrap().metadata).unwrap();
        assert!(json.contains("\"galaxies\""));
    }

    #[test]
    fn test_physical_with_primary() {
        let primary = GalaxyParameters::disk(6.0, 1.0, 1.0, 0.1);
        let mut rng = StdRng::seed_from_u64(2);
        let options = PhysicalOptions {
            seed: Some(5),
            ..Default::default()
        }
        .with_primary(primary, 3, &mut rng);
        assert_eq!(options.galaxies.len(), 3);
        assert_eq!(options.galaxies[0], primary);

        let results = create_physical_generator(options).unwrap().generate().unwrap();
        let result = results.get(0).unwrap();
        assert_eq!(result.cube.dim(), (80, 28, 28));
        assert!(result.total_flux() > 0.0);
    }

    #[test]
    fn test_physical_n_sersic_fixes_satellite_index() {
        let primary = GalaxyParameters::disk(6.0, 1.0, 1.0, 0.1);
        let mut rng = StdRng::seed_from_u64(2);
        let options = PhysicalOptions {
            n_sersic: Some(2.0),
            seed: Some(5),
            ..Default::default()
        }
        .with_primary(primary, 3, &mut rng);

        assert_eq!(options.galaxies[0].sersic_index, 1.0);
        assert!(options.galaxies[1..]
            .iter()
            .all(|satellite| satellite.sersic_index == 2.0));

        let results = create_physical_generator(options).unwrap().generate().unwrap();
        let galaxies = &results.get(0).unwrap().metadata.galaxies;
        assert!(galaxies[1..].iter().all(|g| g.sersic_index == 2.0));
    }

    #[test]
    fn test_physical_rejects_non_positive_n_sersic() {
        let options = PhysicalOptions {
            galaxies: vec![GalaxyParameters::disk(6.0, 1.0, 1.0, 0.1)],
            n_sersic: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            create_physical_generator(options),
            Err(CubeError::Configuration(ConfigurationError::NonPositive {
                name: "n_sersic",
                ..
            }))
        ));
    }
}
