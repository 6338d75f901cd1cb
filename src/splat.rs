//! Gaussian impulses written into the velocity and dye fields.

use rand::Rng;

use crate::backend::{BlendMode, RenderBackend};
use crate::color::{self, Rgb};
use crate::config::FluidConfiguration;
use crate::error::Result;
use crate::pointer::TexMovement;
use crate::program::{ProgramCache, ProgramKind};
use crate::resolution::Dimensions;
use crate::step::SimulationFields;

/// One impulse: where, how hard, and which dye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatEvent {
    /// Texture-space position, origin bottom-left.
    pub x: f32,
    pub y: f32,
    /// Velocity added at the centre.
    pub dx: f32,
    pub dy: f32,
    pub color: Rgb,
}

impl SplatEvent {
    pub fn new(x: f32, y: f32, dx: f32, dy: f32, color: Rgb) -> Self {
        Self { x, y, dx, dy, color }
    }

    /// A pointer movement scaled by `splat_force`.
    pub fn from_movement(movement: &TexMovement, splat_force: f32, color: Rgb) -> Self {
        Self::new(
            movement.x,
            movement.y,
            movement.delta_x * splat_force,
            movement.delta_y * splat_force,
            color,
        )
    }

    /// Random position, a push of up to 500 per axis and a bright random color.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let color = color::random_color(rng, color::DEFAULT_DIM).scaled(10.0);
        let x = rng.gen_range(0.0..1.0);
        let y = rng.gen_range(0.0..1.0);
        let dx = 1000.0 * (rng.gen_range(0.0..1.0) - 0.5);
        let dy = 1000.0 * (rng.gen_range(0.0..1.0) - 0.5);
        Self::new(x, y, dx, dy, color)
    }
}

/// Widens the radius on landscape surfaces so splats stay round.
pub fn correct_radius(radius: f32, surface: Dimensions) -> f32 {
    let aspect_ratio = surface.aspect_ratio();
    if aspect_ratio > 1.0 {
        radius * aspect_ratio
    } else {
        radius
    }
}

#[derive(Debug, Default)]
pub struct SplatInjector {
    injected: u64,
}

impl SplatInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        programs: &ProgramCache,
        fields: &mut SimulationFields,
        config: &FluidConfiguration,
        event: &SplatEvent,
    ) -> Result<()> {
        let surface = backend.drawing_buffer_size();
        let aspect_ratio = surface.aspect_ratio();
        let radius = correct_radius(config.splat_radius / 100.0, surface);
        let splat = programs.program(ProgramKind::Splat)?;

        let velocity = fields.velocity_mut();
        splat
            .pass()
            .vec2("texelSize", velocity.texel_size())
            .texture("uTarget", velocity.read().texture())
            .float("aspectRatio", aspect_ratio)
            .vec2("point", [event.x, event.y])
            .vec3("color", [event.dx, event.dy, 0.0])
            .float("radius", radius)
            .draw(backend, Some(velocity.write()), BlendMode::Replace)?;
        velocity.swap();

        let dye = fields.dye_mut();
        splat
            .pass()
            .vec2("texelSize", dye.texel_size())
            .texture("uTarget", dye.read().texture())
            .float("aspectRatio", aspect_ratio)
            .vec2("point", [event.x, event.y])
            .vec3("color", event.color.to_array())
            .float("radius", radius)
            .draw(backend, Some(dye.write()), BlendMode::Replace)?;
        dye.swap();

        self.injected += 1;
        Ok(())
    }

    pub fn injected(&self) -> u64 {
        self.injected
    }
}
