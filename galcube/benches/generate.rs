use criterion::{black_box, criterion_group, criterion_main, Criterion};
use galcube::beam::{convolve_cube, BeamKernel};
use galcube::config::SystemConfiguration;
use galcube::profile::VerticalProfileKind;
use galcube::rasterize::rasterize_galaxy;
use galcube::{create_population_generator, BeamInfo, GalaxyParameters, PopulationOptions};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

fn bench_rasterize_galaxy(c: &mut Criterion) {
    let grid = SystemConfiguration::default().cube_grid(200.0);
    let face_on = GalaxyParameters::disk(5.0, 1.0, 0.8, 0.1);
    let inclined = face_on.with_orientation(60.0, 30.0);

    let mut group = c.benchmark_group("rasterize_galaxy");
    group.bench_function("re5_face_on_125x125x40", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(42);
            rasterize_galaxy(
                black_box(&face_on),
                black_box(&grid),
                VerticalProfileKind::Exponential,
                &mut rng,
            )
        })
    });
    group.bench_function("re5_inclined_125x125x40", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(42);
            rasterize_galaxy(
                black_box(&inclined),
                black_box(&grid),
                VerticalProfileKind::Exponential,
                &mut rng,
            )
        })
    });
    group.finish();
}

fn bench_convolve_cube(c: &mut Criterion) {
    let grid = SystemConfiguration::default().cube_grid(200.0);
    let mut rng = StdRng::seed_from_u64(7);
    let cube = rasterize_galaxy(
        &GalaxyParameters::disk(5.0, 1.0, 0.8, 0.1),
        &grid,
        VerticalProfileKind::Exponential,
        &mut rng,
    )
    .map(|raster| raster.cube)
    .unwrap_or_else(|_| ndarray::Array3::zeros(grid.shape()));

    let mut group = c.benchmark_group("convolve_cube");
    for (name, beam) in [
        ("beam4_125x125x40", BeamInfo::new(4.0, 4.0, 0.0)),
        ("beam8x4_125x125x40", BeamInfo::new(4.0, 8.0, 30.0)),
    ] {
        if let Some(kernel) = BeamKernel::from_beam(&beam, 1.0) {
            group.bench_function(format!("{name}_parallel"), |b| {
                b.iter(|| convolve_cube(black_box(&cube), &kernel, true))
            });
            group.bench_function(format!("{name}_serial"), |b| {
                b.iter(|| convolve_cube(black_box(&cube), &kernel, false))
            });
        }
    }
    group.finish();
}

fn bench_generate_batch(c: &mut Criterion) {
    let generator = create_population_generator(PopulationOptions {
        n_gals: 3,
        n_cubes: 8,
        seed: Some(42),
        ..Default::default()
    });

    let mut group = c.benchmark_group("generate_batch");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(20));
    if let Ok(generator) = generator {
        group.bench_function("population_3gal_8cubes", |b| b.iter(|| generator.generate()));
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_rasterize_galaxy,
    bench_convolve_cube,
    bench_generate_batch
);
criterion_main!(benches);
