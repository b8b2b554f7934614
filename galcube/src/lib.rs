//! Mock spectral cube synthesis for idealized galaxies
//!
//! This crate builds three-dimensional data cubes (two sky axes plus a
//! line-of-sight velocity axis) of one or more thick rotating disks. A
//! system is a primary galaxy plus optional satellites, described either by
//! explicit values or by uniform draws, and every cube is reproducible from
//! its seed.

pub mod beam;
pub mod compose;
pub mod config;
pub mod error;
pub mod galaxy;
pub mod generator;
pub mod kinematics;
pub mod moments;
pub mod profile;
pub mod projection;
pub mod rasterize;
pub mod sampler;
pub mod shared_args;

// Re-exports for easier access
pub use config::{BeamInfo, SpatialGrid, SpectralAxis, SystemConfiguration};
pub use error::{
    ConfigurationError, CubeError, GenerationError, NumericalWarning, Stage, ValidationError,
};
pub use galaxy::{GalaxyParameters, Offset};
pub use generator::{
    create_physical_generator, create_population_generator, CancelToken, CubeResult,
    GenerateOptions, Generator, Metadata, PhysicalOptions, PopulationOptions, Results,
};
pub use profile::{sersic_bn, SersicProfile, VerticalProfileKind};
pub use sampler::{
    satellites_from_primary, Bounds, ParameterSource, PhysicalGalaxies, PopulationRanges,
    PopulationSampling, Resolution,
};
