//! Automated tests for the wgpu backend. Skipped when no adapter is present.
#![cfg(feature = "gpu")]

use liquidglow::{
    Dimensions, FluidConfiguration, FluidService, ProgramKind, RenderBackend, Rgb, WgpuBackend,
};
use liquidglow::program::{KeywordSet, compile_source};

async fn backend(width: u32, height: u32) -> Option<WgpuBackend> {
    match WgpuBackend::new(width, height).await {
        Ok(backend) => Some(backend),
        Err(err) => {
            eprintln!("skipping GPU test: {}", err);
            None
        }
    }
}

fn small_config() -> FluidConfiguration {
    FluidConfiguration {
        sim_resolution: 16,
        dye_resolution: 32,
        bloom_resolution: 16,
        sunrays_resolution: 16,
        splat_radius: 0.5,
        ..FluidConfiguration::default()
    }
}

#[tokio::test]
async fn test_gpu_backend_creation() {
    let Some(backend) = backend(50, 40).await else {
        return;
    };
    assert_eq!(backend.drawing_buffer_size(), Dimensions::new(50, 40));
}

#[tokio::test]
async fn test_gpu_compiles_every_program() {
    let Some(mut backend) = backend(8, 8).await else {
        return;
    };
    for kind in ProgramKind::ALL {
        let result = backend.compile(&compile_source(kind, KeywordSet::EMPTY));
        assert!(result.is_ok(), "{} should compile: {:?}", kind, result.err());
    }
    let display = compile_source(ProgramKind::Display, KeywordSet::from_flags(true, true, true));
    assert!(backend.compile(&display).is_ok());
}

#[tokio::test]
async fn test_gpu_service_renders_splat() {
    let Some(backend) = backend(32, 24).await else {
        return;
    };
    let mut service = FluidService::new(FluidConfiguration {
        bloom: false,
        sunrays: false,
        shading: false,
        ..small_config()
    });
    service.bind(backend).expect("GPU bind should succeed");

    service
        .splat(0.5, 0.5, 0.0, 0.0, Rgb::new(0.0, 1.0, 0.0))
        .unwrap();
    service.render(None).unwrap();

    let surface = service.backend().unwrap().read_surface().await.unwrap();
    assert_eq!(surface.len(), 32 * 24);
    let centre = surface[12 * 32 + 16];
    assert!(centre[1] > 0.5, "centre should be green, got {:?}", centre);
    assert!(surface[0][1] < 0.01, "corner should stay dark");
}

#[tokio::test]
async fn test_gpu_step_keeps_fields_finite() {
    let Some(backend) = backend(32, 24).await else {
        return;
    };
    let mut service = FluidService::new(small_config());
    service.bind(backend).unwrap();
    service.splat(0.5, 0.5, 200.0, 0.0, Rgb::new(1.0, 0.5, 0.0)).unwrap();
    for _ in 0..5 {
        service.step(1.0 / 60.0).unwrap();
    }
    service.render(None).unwrap();

    let texture = service.fields().unwrap().velocity().read().texture();
    let velocity = service
        .backend_mut()
        .unwrap()
        .read_texture(texture)
        .await
        .unwrap();
    assert!(velocity.iter().all(|t| t[0].is_finite() && t[1].is_finite()));
    assert!(velocity.iter().any(|t| t[0] != 0.0), "splat should leave motion behind");
}
