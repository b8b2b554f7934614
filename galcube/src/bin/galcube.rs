//! Mock galaxy spectral cube generator
//!
//! Generates batches of spectral cubes either from randomly drawn galaxy
//! systems (`population`) or from explicit galaxies in physical units
//! (`physical`), and reports per-cube flux, peak and warnings.
//!
//! Usage:
//! ```
//! cargo run --release --bin galcube -- population --n-gals 3 --n-cubes 10 --seed 42
//! cargo run --release --bin galcube -- physical --re 6 --n-gals 2 --summary-json cubes.json
//! ```
//!
//! See --help for detailed options.

use clap::{Parser, Subcommand};
use galcube::generator::Generator;
use galcube::moments::peak_position;
use galcube::shared_args::SharedCubeArgs;
use galcube::{
    create_physical_generator, create_population_generator, Bounds, GalaxyParameters,
    PhysicalOptions, PopulationOptions, PopulationRanges, Resolution, Results,
};
use galcube_shared::range_arg::BoundsArg;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(
    name = "galcube",
    about = "Synthesizes mock spectral cubes of idealized galaxy systems",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Randomly drawn systems on a pixel grid
    Population {
        #[command(flatten)]
        shared: SharedCubeArgs,

        /// Restrict the primary's size relative to the beam (all, resolved, unresolved)
        #[arg(long, default_value = "all")]
        resolution: Resolution,

        /// Satellite separation scale, in primary effective radii
        #[arg(long, default_value_t = 5.0)]
        offset_gals: f64,

        /// Pixels per side
        #[arg(long, default_value_t = 125)]
        grid_size: usize,

        /// Number of velocity channels
        #[arg(long, default_value_t = 40)]
        n_spectral_slices: usize,

        /// Channel width in km/s
        #[arg(long, default_value_t = 20.0)]
        channel_width: f64,

        /// Fix the Sérsic index of every galaxy
        #[arg(long)]
        n_sersic: Option<f64>,

        /// Primary effective radius range in pixels (format: "lo:hi")
        #[arg(long)]
        re_range: Option<BoundsArg>,

        /// Primary scale height range in pixels (format: "lo:hi")
        #[arg(long)]
        hz_range: Option<BoundsArg>,

        /// Primary surface brightness range (format: "lo:hi")
        #[arg(long)]
        se_range: Option<BoundsArg>,

        /// Systemic velocity range in km/s (format: "lo:hi")
        #[arg(long)]
        v0_range: Option<BoundsArg>,

        /// Velocity dispersion range in km/s (format: "lo:hi")
        #[arg(long)]
        sigma_range: Option<BoundsArg>,
    },

    /// Explicit galaxies in physical units
    Physical {
        #[command(flatten)]
        shared: SharedCubeArgs,

        /// JSON file holding a list of galaxy records, primary first
        #[arg(long, conflicts_with = "re")]
        galaxies: Option<PathBuf>,

        /// Primary effective radius (spatial units)
        #[arg(long, default_value_t = 5.0)]
        re: f64,

        /// Primary Sérsic index
        #[arg(long, default_value_t = 1.0)]
        n: f64,

        /// Primary scale height (spatial units)
        #[arg(long, default_value_t = 0.8)]
        hz: f64,

        /// Primary surface brightness at Re
        #[arg(long, default_value_t = 0.1)]
        se: f64,

        /// Primary inclination in degrees
        #[arg(long, default_value_t = 0.0)]
        inclination: f64,

        /// Primary position angle in degrees
        #[arg(long, default_value_t = 0.0)]
        position_angle: f64,

        /// Primary systemic velocity in km/s
        #[arg(long, default_value_t = 200.0)]
        v0: f64,

        /// Primary velocity dispersion in km/s
        #[arg(long, default_value_t = 40.0)]
        sigma: f64,

        /// Spatial units per pixel
        #[arg(long, default_value_t = 4.5)]
        spatial_resolution: f64,

        /// Channel width in km/s
        #[arg(long, default_value_t = 10.0)]
        spectral_resolution: f64,

        /// Number of velocity channels (default covers 800 km/s)
        #[arg(long)]
        n_spectral_slices: Option<usize>,

        /// Field of view per side (spatial units)
        #[arg(long, default_value_t = 125.0)]
        fov: f64,

        /// Satellite separation scale, in primary effective radii
        #[arg(long, default_value_t = 20.0)]
        offset_gals: f64,

        /// Fix the Sérsic index of derived satellites
        #[arg(long)]
        n_sersic: Option<f64>,
    },
}

fn override_range(range: &mut Bounds, arg: Option<BoundsArg>) {
    if let Some(arg) = arg {
        *range = Bounds::new(arg.lo(), arg.hi());
    }
}

fn run(
    generator: &Generator,
    shared: &SharedCubeArgs,
) -> Result<Results, Box<dyn std::error::Error>> {
    let progress_style = ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
        .progress_chars("█▉▊▋▌▍▎▏ ");
    let pb = ProgressBar::new(generator.n_cubes() as u64);
    pb.set_style(progress_style);
    pb.set_message("Generating cubes");

    let results = generator.generate_with(&shared.generate_options(), |_| pb.inc(1))?;
    pb.finish_with_message("Cubes complete!");
    Ok(results)
}

fn report(results: &Results, shared: &SharedCubeArgs) -> Result<(), Box<dyn std::error::Error>> {
    for result in results {
        let metadata = &result.metadata;
        let peak = peak_position(&result.cube)
            .map(|(k, y, x)| format!("channel {k}, pixel ({x}, {y})"))
            .unwrap_or_else(|| "none".to_string());
        println!(
            "cube {:>3}: seed {:>20}  galaxies {}  flux {:.4} -> {:.4}  peak {}  warnings {}",
            metadata.index,
            metadata.seed,
            metadata.galaxies.len(),
            metadata.flux_before_beam,
            metadata.flux_after_beam,
            peak,
            metadata.warnings.len()
        );
    }

    if let Some(path) = &shared.summary_json {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &results.metadata())?;
        info!("Wrote metadata for {} cube(s) to {}", results.len(), path.display());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging from environment variables
    env_logger::init();

    let cli = Cli::parse();
    let wallclock_start = Instant::now();

    let (generator, shared) = match cli.command {
        Commands::Population {
            shared,
            resolution,
            offset_gals,
            grid_size,
            n_spectral_slices,
            channel_width,
            n_sersic,
            re_range,
            hz_range,
            se_range,
            v0_range,
            sigma_range,
        } => {
            let mut ranges = PopulationRanges::default();
            override_range(&mut ranges.effective_radius, re_range);
            override_range(&mut ranges.scale_height, hz_range);
            override_range(&mut ranges.effective_brightness, se_range);
            override_range(&mut ranges.systemic_velocity, v0_range);
            override_range(&mut ranges.velocity_dispersion, sigma_range);

            let defaults = PopulationOptions::default();
            let options = PopulationOptions {
                n_gals: shared.n_gals,
                n_cubes: shared.n_cubes,
                resolution,
                offset_gals,
                beam: shared.beam.unwrap_or(defaults.beam),
                grid_size,
                n_spectral_slices,
                channel_width,
                n_sersic,
                ranges,
                vertical: shared.vertical,
                seed: shared.seed,
            };
            (create_population_generator(options)?, shared)
        }
        Commands::Physical {
            shared,
            galaxies,
            re,
            n,
            hz,
            se,
            inclination,
            position_angle,
            v0,
            sigma,
            spatial_resolution,
            spectral_resolution,
            n_spectral_slices,
            fov,
            offset_gals,
            n_sersic,
        } => {
            let defaults = PhysicalOptions::default();
            let options = PhysicalOptions {
                n_cubes: shared.n_cubes,
                spatial_resolution,
                spectral_resolution,
                n_spectral_slices,
                offset_gals,
                n_sersic,
                beam: shared.beam.unwrap_or(defaults.beam),
                fov,
                vertical: shared.vertical,
                seed: shared.seed,
                ..defaults
            };

            let options = match galaxies {
                Some(path) => {
                    let records: Vec<GalaxyParameters> =
                        serde_json::from_reader(File::open(&path)?)?;
                    info!("Loaded {} galaxies from {}", records.len(), path.display());
                    PhysicalOptions {
                        galaxies: records,
                        ..options
                    }
                }
                None => {
                    let primary = GalaxyParameters::disk(re, n, hz, se)
                        .with_orientation(inclination, position_angle)
                        .with_systemic_velocity(v0)
                        .with_dispersion(sigma);
                    let mut rng = shared
                        .seed
                        .map(StdRng::seed_from_u64)
                        .unwrap_or_else(StdRng::from_entropy);
                    options.with_primary(primary, shared.n_gals, &mut rng)
                }
            };
            (create_physical_generator(options)?, shared)
        }
    };

    let results = run(&generator, &shared)?;
    report(&results, &shared)?;

    info!(
        "Generated {} cube(s) in {:.2?}",
        results.len(),
        wallclock_start.elapsed()
    );
    Ok(())
}
