//! One fluid instance bound to one rendering surface.

use std::time::Instant;

use rand::Rng;

use crate::backend::{FilterMode, RenderBackend};
use crate::color::Rgb;
use crate::compositor::{self, Compositor};
use crate::config::FluidConfiguration;
use crate::error::{FluidError, Result};
use crate::format::{self, ExternalFormat, TextureChannels};
use crate::pointer::TexMovement;
use crate::program::{Material, ProgramCache};
use crate::resolution::{Dimensions, ResolutionPlanner};
use crate::splat::{SplatEvent, SplatInjector};
use crate::step::{FrameClock, SimulationFields, SimulationStepper};
use crate::target::{RenderTarget, RenderTargetPool};

/// Grid sizes derived from the drawing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSizes {
    pub sim: Dimensions,
    pub dye: Dimensions,
    pub bloom: Dimensions,
    pub sunrays: Dimensions,
}

struct Bound<B> {
    backend: B,
    surface: Dimensions,
    formats: ExternalFormat,
    planner: ResolutionPlanner,
    programs: ProgramCache,
    pool: RenderTargetPool,
    fields: Option<SimulationFields>,
    compositor: Compositor,
    stepper: SimulationStepper,
    injector: SplatInjector,
    clock: FrameClock,
}

impl<B: RenderBackend> Bound<B> {
    fn grid_sizes(&mut self, config: &FluidConfiguration) -> GridSizes {
        let surface = self.backend.drawing_buffer_size();
        GridSizes {
            sim: self.planner.resolve(surface, config.sim_resolution),
            dye: self.planner.resolve(surface, config.dye_resolution),
            bloom: self.planner.resolve(surface, config.bloom_resolution),
            sunrays: self.planner.resolve(surface, config.sunrays_resolution),
        }
    }

    /// Reallocates for the current drawing buffer, keeping dye and velocity.
    fn reinitialize(&mut self, config: &FluidConfiguration) -> Result<()> {
        let sizes = self.grid_sizes(config);
        log::info!(
            "reinitializing framebuffers for {}x{}: sim {}x{}, dye {}x{}",
            self.surface.width,
            self.surface.height,
            sizes.sim.width,
            sizes.sim.height,
            sizes.dye.width,
            sizes.dye.height
        );

        if let Some(fields) = self.fields.take() {
            self.fields = Some(fields.resize(
                &mut self.backend,
                &mut self.pool,
                &self.programs,
                sizes.sim,
                sizes.dye,
            )?);
        }
        self.compositor.allocate_targets(
            &mut self.backend,
            &mut self.pool,
            &self.formats,
            config,
            sizes.bloom,
            sizes.sunrays,
        )
    }
}

/// Owns the configuration and, once bound, every GPU resource of one
/// simulation.
///
/// `bind` hands the service a backend; from then on the host calls
/// [`tick`](Self::tick) once per frame and may inject splats between ticks.
pub struct FluidService<B: RenderBackend> {
    config: FluidConfiguration,
    state: Option<Bound<B>>,
}

impl<B: RenderBackend> FluidService<B> {
    pub fn new(config: FluidConfiguration) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &FluidConfiguration {
        &self.config
    }

    pub fn is_bound(&self) -> bool {
        self.state.is_some()
    }

    /// Negotiates formats, compiles programs and allocates every target for
    /// `surface`. Nothing is kept if any of it fails.
    pub fn bind(&mut self, surface: B) -> Result<()> {
        self.bind_at(surface, Instant::now())
    }

    pub fn bind_at(&mut self, mut backend: B, now: Instant) -> Result<()> {
        if self.state.is_some() {
            return Err(FluidError::PreconditionViolation(
                "fluid service is already bound to a surface",
            ));
        }
        let surface = backend.drawing_buffer_size();
        if surface.is_empty() {
            return Err(FluidError::PreconditionViolation(
                "surface has no drawable area",
            ));
        }

        let formats = format::negotiate(&mut backend);
        let mut programs = ProgramCache::new();
        programs.compile_all(&mut backend)?;

        let mut planner = ResolutionPlanner::new();
        let config = &self.config;
        let sizes = GridSizes {
            sim: planner.resolve(surface, config.sim_resolution),
            dye: planner.resolve(surface, config.dye_resolution),
            bloom: planner.resolve(surface, config.bloom_resolution),
            sunrays: planner.resolve(surface, config.sunrays_resolution),
        };

        let mut pool = RenderTargetPool::new();
        let fields = match SimulationFields::allocate(
            &mut backend,
            &mut pool,
            &formats,
            sizes.sim,
            sizes.dye,
        ) {
            Ok(fields) => Some(fields),
            Err(FluidError::DisabledFeature(channels)) => {
                log::warn!(
                    "simulation disabled: no renderable {} texture format",
                    channels
                );
                None
            }
            Err(err) => return Err(err),
        };
        let mut compositor = Compositor::new(
            &mut backend,
            &mut pool,
            &formats,
            config,
            sizes.bloom,
            sizes.sunrays,
        )?;
        compositor.prepare_material(&mut backend, &mut programs, config)?;

        log::info!(
            "bound to {}x{} surface: sim {}x{}, dye {}x{}, {} programs",
            surface.width,
            surface.height,
            sizes.sim.width,
            sizes.sim.height,
            sizes.dye.width,
            sizes.dye.height,
            programs.len()
        );

        self.state = Some(Bound {
            backend,
            surface,
            formats,
            planner,
            programs,
            pool,
            fields,
            compositor,
            stepper: SimulationStepper::new(),
            injector: SplatInjector::new(),
            clock: FrameClock::new(now),
        });
        Ok(())
    }

    fn bound(&mut self) -> Result<&mut Bound<B>> {
        self.state
            .as_mut()
            .ok_or(FluidError::PreconditionViolation("fluid service is not bound"))
    }

    /// Resize check, one step with the wall-clock delta, then a render to
    /// the drawing buffer.
    pub fn tick(&mut self) -> Result<()> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Result<()> {
        let dt = self.bound()?.clock.delta(now);
        self.resize_if_needed()?;
        self.step(dt)?;
        self.render(None)
    }

    /// Reallocates targets when the drawing buffer changed size. Returns
    /// whether it did.
    pub fn resize_if_needed(&mut self) -> Result<bool> {
        let config = &self.config;
        let Some(bound) = self.state.as_mut() else {
            return Err(FluidError::PreconditionViolation("fluid service is not bound"));
        };

        let surface = bound.backend.drawing_buffer_size();
        if surface == bound.surface || surface.is_empty() {
            return Ok(false);
        }
        bound.surface = surface;
        bound.reinitialize(config)?;
        Ok(true)
    }

    /// Advances the fields by `dt` seconds. A no-op when the simulation is
    /// disabled for lack of texture formats.
    pub fn step(&mut self, dt: f32) -> Result<()> {
        let config = &self.config;
        let Some(bound) = self.state.as_mut() else {
            return Err(FluidError::PreconditionViolation("fluid service is not bound"));
        };
        let Some(fields) = bound.fields.as_mut() else {
            return Ok(());
        };
        bound
            .stepper
            .step(&mut bound.backend, &bound.programs, fields, config, dt)
    }

    /// Composites into `target`, or into the drawing buffer when `None`.
    pub fn render(&mut self, target: Option<&RenderTarget>) -> Result<()> {
        let config = &self.config;
        let Some(bound) = self.state.as_mut() else {
            return Err(FluidError::PreconditionViolation("fluid service is not bound"));
        };

        match bound.fields.as_ref() {
            Some(fields) => bound.compositor.render(
                &mut bound.backend,
                &mut bound.programs,
                fields,
                config,
                target,
            ),
            None => {
                compositor::begin_frame(&mut bound.backend, &bound.programs, config, target)?;
                Ok(())
            }
        }
    }

    pub fn splat(&mut self, x: f32, y: f32, dx: f32, dy: f32, color: Rgb) -> Result<()> {
        self.inject(&SplatEvent::new(x, y, dx, dy, color))
    }

    /// Splats at the movement's position with its delta times `splatForce`.
    pub fn splat_movement(&mut self, movement: &TexMovement, color: Rgb) -> Result<()> {
        let event = SplatEvent::from_movement(movement, self.config.splat_force, color);
        self.inject(&event)
    }

    pub fn multiple_splats(&mut self, amount: usize) -> Result<()> {
        self.multiple_splats_with(&mut rand::thread_rng(), amount)
    }

    pub fn multiple_splats_with<R: Rng + ?Sized>(&mut self, rng: &mut R, amount: usize) -> Result<()> {
        for _ in 0..amount {
            self.inject(&SplatEvent::random(rng))?;
        }
        Ok(())
    }

    pub fn inject(&mut self, event: &SplatEvent) -> Result<()> {
        let config = &self.config;
        let Some(bound) = self.state.as_mut() else {
            return Err(FluidError::PreconditionViolation("fluid service is not bound"));
        };
        let Some(fields) = bound.fields.as_mut() else {
            return Ok(());
        };
        bound
            .injector
            .inject(&mut bound.backend, &bound.programs, fields, config, event)
    }

    /// An offscreen RGBA target the size of `size`, for [`render`](Self::render).
    pub fn create_target(&mut self, size: Dimensions) -> Result<RenderTarget> {
        let bound = self.bound()?;
        let format = bound.formats.require(TextureChannels::Rgba)?;
        bound
            .pool
            .allocate(&mut bound.backend, "offscreen", size, format, FilterMode::Linear)
    }

    pub fn release_target(&mut self, target: RenderTarget) -> Result<()> {
        let bound = self.bound()?;
        bound.pool.release(&mut bound.backend, target);
        Ok(())
    }

    /// Releases every target and returns the backend.
    pub fn unbind(&mut self) -> Option<B> {
        let mut bound = self.state.take()?;
        if let Some(fields) = bound.fields.take() {
            fields.release(&mut bound.backend, &mut bound.pool);
        }
        bound.compositor.release(&mut bound.backend, &mut bound.pool);
        log::info!("unbound, {} targets still live", bound.pool.live());
        Some(bound.backend)
    }

    pub fn backend(&self) -> Option<&B> {
        self.state.as_ref().map(|bound| &bound.backend)
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.state.as_mut().map(|bound| &mut bound.backend)
    }

    pub fn fields(&self) -> Option<&SimulationFields> {
        self.state.as_ref().and_then(|bound| bound.fields.as_ref())
    }

    pub fn compositor(&self) -> Option<&Compositor> {
        self.state.as_ref().map(|bound| &bound.compositor)
    }

    pub fn material(&self) -> Option<&Material> {
        self.compositor().map(Compositor::material)
    }

    pub fn formats(&self) -> Option<&ExternalFormat> {
        self.state.as_ref().map(|bound| &bound.formats)
    }

    pub fn programs(&self) -> Option<&ProgramCache> {
        self.state.as_ref().map(|bound| &bound.programs)
    }

    pub fn pool(&self) -> Option<&RenderTargetPool> {
        self.state.as_ref().map(|bound| &bound.pool)
    }

    pub fn last_delta_time(&self) -> Option<f32> {
        self.state
            .as_ref()
            .and_then(|bound| bound.stepper.last_delta_time())
    }

    /// Simulation steps run since `bind`.
    pub fn step_count(&self) -> u64 {
        self.state
            .as_ref()
            .map_or(0, |bound| bound.stepper.steps())
    }

    /// Splats injected since `bind`.
    pub fn splat_count(&self) -> u64 {
        self.state
            .as_ref()
            .map_or(0, |bound| bound.injector.injected())
    }

    pub fn grid_sizes(&mut self) -> Option<GridSizes> {
        let config = &self.config;
        self.state.as_mut().map(|bound| bound.grid_sizes(config))
    }
}

impl<B: RenderBackend> Default for FluidService<B> {
    fn default() -> Self {
        Self::new(FluidConfiguration::default())
    }
}
