//! The physics fields and the fixed pass sequence that advances them.

use std::time::{Duration, Instant};

use crate::backend::{BlendMode, FilterMode, RenderBackend};
use crate::config::FluidConfiguration;
use crate::error::Result;
use crate::format::{ExternalFormat, TextureChannels};
use crate::program::{ProgramCache, ProgramKind};
use crate::resolution::Dimensions;
use crate::target::{DoubleRenderTarget, RenderTarget, RenderTargetPool};

/// Upper bound on the time step, whatever the wall clock says.
pub const MAX_DELTA_TIME: f32 = 1.0 / 60.0;

/// Wall-clock time between ticks, clamped to `[0, MAX_DELTA_TIME]`.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    pub fn new(now: Instant) -> Self {
        Self { last: now }
    }

    pub fn delta(&mut self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        clamp_delta(elapsed)
    }
}

pub fn clamp_delta(elapsed: Duration) -> f32 {
    elapsed.as_secs_f32().clamp(0.0, MAX_DELTA_TIME)
}

/// Velocity, dye and the scratch grids the projection needs.
#[derive(Debug)]
pub struct SimulationFields {
    dye: DoubleRenderTarget,
    velocity: DoubleRenderTarget,
    divergence: RenderTarget,
    curl: RenderTarget,
    pressure: DoubleRenderTarget,
}

impl SimulationFields {
    pub fn allocate<B: RenderBackend + ?Sized>(
        backend: &mut B,
        pool: &mut RenderTargetPool,
        formats: &ExternalFormat,
        sim: Dimensions,
        dye: Dimensions,
    ) -> Result<Self> {
        let rgba = formats.require(TextureChannels::Rgba)?;
        let rg = formats.require(TextureChannels::Rg)?;
        let r = formats.require(TextureChannels::R)?;

        Ok(Self {
            dye: pool.allocate_double(backend, "dye", dye, rgba, FilterMode::Linear)?,
            velocity: pool.allocate_double(backend, "velocity", sim, rg, FilterMode::Linear)?,
            divergence: pool.allocate(backend, "divergence", sim, r, FilterMode::Nearest)?,
            curl: pool.allocate(backend, "curl", sim, r, FilterMode::Nearest)?,
            pressure: pool.allocate_double(backend, "pressure", sim, r, FilterMode::Nearest)?,
        })
    }

    /// Carries dye and velocity over to the new grid sizes. The scratch grids
    /// are replaced with cleared ones when the simulation size changes.
    pub fn resize<B: RenderBackend + ?Sized>(
        self,
        backend: &mut B,
        pool: &mut RenderTargetPool,
        programs: &ProgramCache,
        sim: Dimensions,
        dye: Dimensions,
    ) -> Result<Self> {
        let Self {
            dye: dye_target,
            velocity,
            mut divergence,
            mut curl,
            mut pressure,
        } = self;

        let dye_target = pool.resize_double(backend, programs, dye_target, dye)?;
        let velocity = pool.resize_double(backend, programs, velocity, sim)?;

        if divergence.size() != sim {
            let fresh = pool.allocate(backend, "divergence", sim, divergence.format(), divergence.filter())?;
            pool.release(backend, std::mem::replace(&mut divergence, fresh));

            let fresh = pool.allocate(backend, "curl", sim, curl.format(), curl.filter())?;
            pool.release(backend, std::mem::replace(&mut curl, fresh));

            let format = pressure.read().format();
            let fresh = pool.allocate_double(backend, "pressure", sim, format, FilterMode::Nearest)?;
            pool.release_double(backend, std::mem::replace(&mut pressure, fresh));
        }

        Ok(Self {
            dye: dye_target,
            velocity,
            divergence,
            curl,
            pressure,
        })
    }

    pub fn release<B: RenderBackend + ?Sized>(self, backend: &mut B, pool: &mut RenderTargetPool) {
        pool.release_double(backend, self.dye);
        pool.release_double(backend, self.velocity);
        pool.release(backend, self.divergence);
        pool.release(backend, self.curl);
        pool.release_double(backend, self.pressure);
    }

    pub fn dye(&self) -> &DoubleRenderTarget {
        &self.dye
    }

    pub fn velocity(&self) -> &DoubleRenderTarget {
        &self.velocity
    }

    pub fn divergence(&self) -> &RenderTarget {
        &self.divergence
    }

    pub fn curl(&self) -> &RenderTarget {
        &self.curl
    }

    pub fn pressure(&self) -> &DoubleRenderTarget {
        &self.pressure
    }

    pub(crate) fn dye_mut(&mut self) -> &mut DoubleRenderTarget {
        &mut self.dye
    }

    pub(crate) fn velocity_mut(&mut self) -> &mut DoubleRenderTarget {
        &mut self.velocity
    }
}

/// Runs curl, vorticity, divergence, pressure clear, the Jacobi solve,
/// gradient subtraction and both advections, in that order.
#[derive(Debug, Default)]
pub struct SimulationStepper {
    last_delta_time: Option<f32>,
    steps: u64,
}

impl SimulationStepper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        programs: &ProgramCache,
        fields: &mut SimulationFields,
        config: &FluidConfiguration,
        dt: f32,
    ) -> Result<()> {
        let dt = dt.clamp(0.0, MAX_DELTA_TIME);
        let texel = fields.velocity.texel_size();

        programs
            .program(ProgramKind::Curl)?
            .pass()
            .vec2("texelSize", texel)
            .texture("uVelocity", fields.velocity.read().texture())
            .draw(backend, Some(&fields.curl), BlendMode::Replace)?;

        programs
            .program(ProgramKind::Vorticity)?
            .pass()
            .vec2("texelSize", texel)
            .texture("uVelocity", fields.velocity.read().texture())
            .texture("uCurl", fields.curl.texture())
            .float("curl", config.curl)
            .float("dt", dt)
            .draw(backend, Some(fields.velocity.write()), BlendMode::Replace)?;
        fields.velocity.swap();

        programs
            .program(ProgramKind::Divergence)?
            .pass()
            .vec2("texelSize", texel)
            .texture("uVelocity", fields.velocity.read().texture())
            .draw(backend, Some(&fields.divergence), BlendMode::Replace)?;

        programs
            .program(ProgramKind::Clear)?
            .pass()
            .vec2("texelSize", texel)
            .texture("uTexture", fields.pressure.read().texture())
            .float("value", config.pressure)
            .draw(backend, Some(fields.pressure.write()), BlendMode::Replace)?;
        fields.pressure.swap();

        let pressure = programs.program(ProgramKind::Pressure)?;
        for _ in 0..config.pressure_iterations {
            pressure
                .pass()
                .vec2("texelSize", texel)
                .texture("uDivergence", fields.divergence.texture())
                .texture("uPressure", fields.pressure.read().texture())
                .draw(backend, Some(fields.pressure.write()), BlendMode::Replace)?;
            fields.pressure.swap();
        }

        programs
            .program(ProgramKind::GradientSubtract)?
            .pass()
            .vec2("texelSize", texel)
            .texture("uPressure", fields.pressure.read().texture())
            .texture("uVelocity", fields.velocity.read().texture())
            .draw(backend, Some(fields.velocity.write()), BlendMode::Replace)?;
        fields.velocity.swap();

        let advection = programs.program(ProgramKind::Advection)?;
        advection
            .pass()
            .vec2("texelSize", texel)
            .texture("uVelocity", fields.velocity.read().texture())
            .texture("uSource", fields.velocity.read().texture())
            .float("dt", dt)
            .float("dissipation", config.velocity_dissipation)
            .draw(backend, Some(fields.velocity.write()), BlendMode::Replace)?;
        fields.velocity.swap();

        advection
            .pass()
            .vec2("texelSize", texel)
            .texture("uVelocity", fields.velocity.read().texture())
            .texture("uSource", fields.dye.read().texture())
            .float("dt", dt)
            .float("dissipation", config.density_dissipation)
            .draw(backend, Some(fields.dye.write()), BlendMode::Replace)?;
        fields.dye.swap();

        self.last_delta_time = Some(dt);
        self.steps += 1;
        Ok(())
    }

    /// Time step of the most recent [`step`](Self::step).
    pub fn last_delta_time(&self) -> Option<f32> {
        self.last_delta_time
    }

    /// Completed steps since the fields were bound.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_clamped_to_a_sixtieth() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        let dt = clock.delta(start + Duration::from_secs(1));
        assert!(dt <= MAX_DELTA_TIME);
        assert_eq!(dt, MAX_DELTA_TIME);
    }

    #[test]
    fn short_frames_pass_through() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        let dt = clock.delta(start + Duration::from_millis(5));
        assert!((dt - 0.005).abs() < 1e-6);
    }

    #[test]
    fn clock_going_backwards_yields_zero() {
        let start = Instant::now() + Duration::from_secs(1);
        let mut clock = FrameClock::new(start);
        assert_eq!(clock.delta(start - Duration::from_millis(500)), 0.0);
    }
}
