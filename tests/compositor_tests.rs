use liquidglow::{
    CpuBackend, Dimensions, FluidConfiguration, FluidService, KeywordSet, ProgramKind, Rgb, rgb,
};

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

fn bound_service(config: FluidConfiguration) -> FluidService<CpuBackend> {
    let mut service = FluidService::new(config);
    service.bind(CpuBackend::new(32, 24)).unwrap();
    service
}

#[test]
fn test_full_pipeline_draw_counts() {
    let mut service = bound_service(small_config());
    service.render(None).unwrap();

    let compositor = service.compositor().unwrap();
    assert_eq!(compositor.bloom().unwrap().mips().len(), 3);

    let backend = service.backend().unwrap();
    assert_eq!(backend.draw_count(ProgramKind::BloomPrefilter), 1);
    assert_eq!(backend.draw_count(ProgramKind::BloomBlur), 5, "3 down and 2 up");
    assert_eq!(backend.draw_count(ProgramKind::BloomFinal), 1);
    assert_eq!(backend.draw_count(ProgramKind::SunraysMask), 1);
    assert_eq!(backend.draw_count(ProgramKind::Sunrays), 1);
    assert_eq!(backend.draw_count(ProgramKind::Blur), 2);
    assert_eq!(backend.draw_count(ProgramKind::Display), 1);
    assert_eq!(backend.draw_count(ProgramKind::Color), 0, "transparent frames skip the background");
}

#[test]
fn test_short_bloom_chain_is_skipped() {
    let mut service = bound_service(FluidConfiguration {
        bloom_iterations: 1,
        ..small_config()
    });
    service.render(None).unwrap();

    assert_eq!(service.compositor().unwrap().bloom().unwrap().mips().len(), 1);
    let backend = service.backend().unwrap();
    assert_eq!(backend.draw_count(ProgramKind::BloomPrefilter), 0);
    assert_eq!(backend.draw_count(ProgramKind::BloomBlur), 0);
    assert_eq!(backend.draw_count(ProgramKind::Display), 1);
}

#[test]
fn test_display_variant_follows_effects() {
    let service = bound_service(small_config());
    let material = service.material().unwrap();
    assert_eq!(material.active(), Some(KeywordSet::from_flags(true, true, true)));
    assert!(material.has_uniform("uBloom"));
    assert!(material.has_uniform("uSunrays"));

    let service = bound_service(FluidConfiguration {
        shading: false,
        bloom: false,
        sunrays: false,
        ..small_config()
    });
    let material = service.material().unwrap();
    assert_eq!(material.active(), Some(KeywordSet::EMPTY));
    assert!(!material.has_uniform("uBloom"));
    assert!(!material.has_uniform("uSunrays"));
    assert!(material.has_uniform("uTexture"));
}

#[test]
fn test_repeated_frames_reuse_display_variant() {
    let mut service = bound_service(small_config());
    for _ in 0..3 {
        service.tick().unwrap();
    }

    assert_eq!(service.material().unwrap().uniform_fetches(), 1);
    assert_eq!(service.programs().unwrap().variants_of(ProgramKind::Display), 1);
}

#[test]
fn test_transparent_empty_frame_is_clear() {
    let mut service = bound_service(FluidConfiguration {
        bloom: false,
        sunrays: false,
        ..small_config()
    });
    service.render(None).unwrap();

    let surface = service.backend().unwrap().read_surface();
    assert!(surface.iter().all(|texel| *texel == [0.0; 4]));
}

#[test]
fn test_opaque_background_shows_through_empty_dye() {
    let mut service = bound_service(FluidConfiguration {
        transparent: false,
        back_color: rgb(0, 0, 255),
        bloom: false,
        sunrays: false,
        ..small_config()
    });
    service.render(None).unwrap();

    let backend = service.backend().unwrap();
    assert_eq!(backend.draw_count(ProgramKind::Color), 1);
    assert!(backend.read_surface().iter().all(|texel| *texel == [0.0, 0.0, 1.0, 1.0]));
}

#[test]
fn test_dye_is_visible_on_surface() {
    let mut service = bound_service(FluidConfiguration {
        bloom: false,
        sunrays: false,
        shading: false,
        ..small_config()
    });
    service.splat(0.5, 0.5, 0.0, 0.0, Rgb::new(0.0, 1.0, 0.0)).unwrap();
    service.render(None).unwrap();

    let surface = service.backend().unwrap().read_surface();
    let centre = surface[12 * 32 + 16];
    assert!(centre[1] > 0.5, "centre should be green, got {:?}", centre);
    assert_eq!(centre[0], 0.0);
    assert_eq!(centre[1], centre[3], "alpha is the brightest channel");
}

#[test]
fn test_render_into_offscreen_target() {
    let mut service = bound_service(small_config());
    service.splat(0.5, 0.5, 0.0, 0.0, Rgb::new(1.0, 1.0, 1.0)).unwrap();

    let target = service.create_target(Dimensions::new(16, 16)).unwrap();
    service.render(Some(&target)).unwrap();

    let backend = service.backend().unwrap();
    let texels = backend.read_texture(target.texture()).unwrap();
    assert!(texels.iter().any(|texel| texel[0] > 0.0), "dye should reach the target");
    assert!(
        backend.read_surface().iter().all(|texel| *texel == [0.0; 4]),
        "the drawing buffer is untouched"
    );

    let live = service.pool().unwrap().live();
    service.release_target(target).unwrap();
    assert_eq!(service.pool().unwrap().live(), live - 1);
}
