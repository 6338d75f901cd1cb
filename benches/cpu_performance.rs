use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand::rngs::StdRng;

use liquidglow::kernels::{self, Fragment, Inputs, Sampler};
use liquidglow::backend::ParamBlock;
use liquidglow::{CpuBackend, FluidConfiguration, FluidService, KeywordSet, ProgramKind};

fn bench_config(sim_resolution: u32) -> FluidConfiguration {
    FluidConfiguration {
        sim_resolution,
        dye_resolution: sim_resolution * 2,
        bloom_resolution: 64,
        sunrays_resolution: 64,
        ..FluidConfiguration::default()
    }
}

fn seeded_service(config: FluidConfiguration) -> FluidService<CpuBackend> {
    let mut service = FluidService::new(config);
    service
        .bind(CpuBackend::new(256, 192))
        .expect("CPU backend binds");
    service
        .multiple_splats_with(&mut StdRng::seed_from_u64(1), 5)
        .expect("splats on a bound service");
    service
}

fn benchmark_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation_step");

    // Test different grid sizes
    for size in [32u32, 64, 128].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut service = seeded_service(bench_config(size));
            b.iter(|| {
                black_box(service.step(1.0 / 60.0)).ok();
            });
        });
    }
    group.finish();
}

fn benchmark_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    for (name, bloom, sunrays) in [("plain", false, false), ("bloom", true, false), ("full", true, true)] {
        group.bench_function(name, |b| {
            let mut service = seeded_service(FluidConfiguration {
                bloom,
                sunrays,
                ..bench_config(64)
            });
            b.iter(|| {
                black_box(service.render(None)).ok();
            });
        });
    }
    group.finish();
}

fn benchmark_full_scenario(c: &mut Criterion) {
    c.bench_function("full_64_20ticks", |b| {
        b.iter(|| {
            let mut service = seeded_service(bench_config(64));
            for _ in 0..20 {
                black_box(service.step(1.0 / 60.0)).ok();
                black_box(service.render(None)).ok();
            }
        });
    });
}

fn benchmark_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernels");
    let texels = vec![[0.25, 0.5, 0.75, 1.0]; 64 * 64];
    let size = liquidglow::Dimensions::new(64, 64);
    let sampler = Sampler::new(
        &texels,
        size,
        liquidglow::backend::FilterMode::Linear,
        liquidglow::backend::AddressMode::ClampToEdge,
    );

    let mut params = ParamBlock::default();
    params.slots[0] = [1.0 / 64.0, 1.0 / 64.0, 0.0, 0.0];
    params.slots[1] = [1.0 / 60.0, 0.0, 0.0, 0.0];
    params.slots[2] = [1.0, 0.0, 0.0, 0.0];

    for kind in [ProgramKind::Advection, ProgramKind::Pressure, ProgramKind::Display] {
        group.bench_function(kind.name(), |b| {
            let inputs = Inputs {
                params: &params,
                textures: [sampler, sampler, sampler, sampler],
                keywords: KeywordSet::from_flags(true, true, true),
            };
            let texel = glam::Vec2::new(1.0 / 64.0, 1.0 / 64.0);
            b.iter(|| {
                let frag = Fragment::new(kind, glam::Vec2::new(0.4, 0.6), texel);
                black_box(kernels::shade(kind, &frag, &inputs));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_step, benchmark_render, benchmark_full_scenario, benchmark_kernels);
criterion_main!(benches);
