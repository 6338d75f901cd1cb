//! Bloom, sunrays and the final display pass.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::{
    AddressMode, BlendMode, FilterMode, RenderBackend, TextureDescriptor, TextureFormat,
};
use crate::color::Rgb;
use crate::config::FluidConfiguration;
use crate::error::Result;
use crate::format::{ExternalFormat, TextureChannels};
use crate::program::{Keyword, KeywordSet, Material, ProgramCache, ProgramKind};
use crate::resolution::Dimensions;
use crate::step::SimulationFields;
use crate::target::{RenderTarget, RenderTargetPool};

pub const DITHERING_SIZE: u32 = 64;
const DITHERING_SEED: u64 = 0x6c69_7175_6964;

/// The bloom accumulation target and its downsample chain.
#[derive(Debug)]
pub struct BloomTargets {
    bloom: RenderTarget,
    mips: Vec<RenderTarget>,
}

impl BloomTargets {
    pub fn allocate<B: RenderBackend + ?Sized>(
        backend: &mut B,
        pool: &mut RenderTargetPool,
        format: TextureFormat,
        size: Dimensions,
        iterations: u32,
    ) -> Result<Self> {
        let bloom = pool.allocate(backend, "bloom", size, format, FilterMode::Nearest)?;
        let mut mips = Vec::new();
        for level in 1..=iterations {
            let mip = size.shifted_down(level);
            if mip.width < 2 || mip.height < 2 {
                break;
            }
            mips.push(pool.allocate(backend, "bloom mip", mip, format, FilterMode::Nearest)?);
        }
        Ok(Self { bloom, mips })
    }

    pub fn release<B: RenderBackend + ?Sized>(self, backend: &mut B, pool: &mut RenderTargetPool) {
        pool.release(backend, self.bloom);
        for mip in self.mips {
            pool.release(backend, mip);
        }
    }

    pub fn target(&self) -> &RenderTarget {
        &self.bloom
    }

    pub fn mips(&self) -> &[RenderTarget] {
        &self.mips
    }
}

#[derive(Debug)]
pub struct SunraysTargets {
    sunrays: RenderTarget,
    temp: RenderTarget,
}

impl SunraysTargets {
    pub fn allocate<B: RenderBackend + ?Sized>(
        backend: &mut B,
        pool: &mut RenderTargetPool,
        format: TextureFormat,
        size: Dimensions,
    ) -> Result<Self> {
        Ok(Self {
            sunrays: pool.allocate(backend, "sunrays", size, format, FilterMode::Nearest)?,
            temp: pool.allocate(backend, "sunrays temp", size, format, FilterMode::Nearest)?,
        })
    }

    pub fn release<B: RenderBackend + ?Sized>(self, backend: &mut B, pool: &mut RenderTargetPool) {
        pool.release(backend, self.sunrays);
        pool.release(backend, self.temp);
    }

    pub fn target(&self) -> &RenderTarget {
        &self.sunrays
    }
}

/// Tiling noise added to bloom before gamma correction to hide banding.
pub fn dithering_noise(size: u32) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(DITHERING_SEED);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for _ in 0..size * size {
        let value: u8 = rng.gen_range(0..=255);
        pixels.extend_from_slice(&[value, value, value, 255]);
    }
    pixels
}

#[derive(Debug)]
pub struct Compositor {
    bloom: Option<BloomTargets>,
    sunrays: Option<SunraysTargets>,
    dithering: RenderTarget,
    material: Material,
}

impl Compositor {
    pub fn new<B: RenderBackend + ?Sized>(
        backend: &mut B,
        pool: &mut RenderTargetPool,
        formats: &ExternalFormat,
        config: &FluidConfiguration,
        bloom_size: Dimensions,
        sunrays_size: Dimensions,
    ) -> Result<Self> {
        let dithering = pool.allocate_with(
            backend,
            &TextureDescriptor {
                label: "dithering",
                size: Dimensions::new(DITHERING_SIZE, DITHERING_SIZE),
                format: TextureFormat::Rgba8Unorm,
                filter: FilterMode::Linear,
                address: AddressMode::Repeat,
            },
        )?;
        backend.upload_texture(dithering.texture(), &dithering_noise(DITHERING_SIZE))?;

        let mut compositor = Self {
            bloom: None,
            sunrays: None,
            dithering,
            material: Material::new(),
        };
        compositor.allocate_targets(backend, pool, formats, config, bloom_size, sunrays_size)?;
        Ok(compositor)
    }

    /// (Re)creates the bloom and sunrays targets for new sizes. Targets whose
    /// size is unchanged are kept.
    pub fn allocate_targets<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        pool: &mut RenderTargetPool,
        formats: &ExternalFormat,
        config: &FluidConfiguration,
        bloom_size: Dimensions,
        sunrays_size: Dimensions,
    ) -> Result<()> {
        let bloom_stale = self
            .bloom
            .as_ref()
            .is_none_or(|bloom| bloom.bloom.size() != bloom_size);
        if bloom_stale {
            if let Some(old) = self.bloom.take() {
                old.release(backend, pool);
            }
            self.bloom = match formats.require(TextureChannels::Rgba) {
                Ok(format) => Some(BloomTargets::allocate(
                    backend,
                    pool,
                    format,
                    bloom_size,
                    config.bloom_iterations,
                )?),
                Err(err) => {
                    log::warn!("bloom disabled: {}", err);
                    None
                }
            };
        }

        let sunrays_stale = self
            .sunrays
            .as_ref()
            .is_none_or(|sunrays| sunrays.sunrays.size() != sunrays_size);
        if sunrays_stale {
            if let Some(old) = self.sunrays.take() {
                old.release(backend, pool);
            }
            self.sunrays = match formats.require(TextureChannels::R) {
                Ok(format) => Some(SunraysTargets::allocate(backend, pool, format, sunrays_size)?),
                Err(err) => {
                    log::warn!("sunrays disabled: {}", err);
                    None
                }
            };
        }
        Ok(())
    }

    /// Display keywords for `config`, minus effects without targets.
    pub fn keywords(&self, config: &FluidConfiguration) -> KeywordSet {
        KeywordSet::from_flags(
            config.shading,
            config.bloom && self.bloom.is_some(),
            config.sunrays && self.sunrays.is_some(),
        )
    }

    pub fn prepare_material<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        programs: &mut ProgramCache,
        config: &FluidConfiguration,
    ) -> Result<()> {
        let keywords = self.keywords(config);
        self.material.set_keywords(programs, backend, keywords)
    }

    /// Composites the dye into `target`, or into the drawing buffer.
    pub fn render<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        programs: &mut ProgramCache,
        fields: &SimulationFields,
        config: &FluidConfiguration,
        target: Option<&RenderTarget>,
    ) -> Result<()> {
        self.prepare_material(backend, programs, config)?;
        let keywords = self.keywords(config);

        if let Some(bloom) = self.bloom.as_ref().filter(|_| config.bloom) {
            apply_bloom(backend, programs, fields.dye().read(), bloom, config)?;
        }
        if let Some(sunrays) = self.sunrays.as_ref().filter(|_| config.sunrays) {
            apply_sunrays(backend, programs, fields, sunrays, config)?;
        }

        let blend = begin_frame(backend, programs, config, target)?;

        let viewport = target
            .map(RenderTarget::size)
            .unwrap_or_else(|| backend.drawing_buffer_size());
        let mut pass = self
            .material
            .bind(programs)?
            .pass()
            .vec2(
                "texelSize",
                [1.0 / viewport.width as f32, 1.0 / viewport.height as f32],
            )
            .texture("uTexture", fields.dye().read().texture());
        let bloom = self.bloom.as_ref().filter(|_| keywords.contains(Keyword::Bloom));
        if let Some(bloom) = bloom {
            let dithering = self.dithering.size();
            pass = pass
                .texture("uBloom", bloom.bloom.texture())
                .texture("uDithering", self.dithering.texture())
                .vec2(
                    "ditherScale",
                    [
                        viewport.width as f32 / dithering.width as f32,
                        viewport.height as f32 / dithering.height as f32,
                    ],
                );
        }
        let sunrays = self.sunrays.as_ref().filter(|_| keywords.contains(Keyword::Sunrays));
        if let Some(sunrays) = sunrays {
            pass = pass.texture("uSunrays", sunrays.sunrays.texture());
        }
        pass.draw(backend, target, blend)
    }

    pub fn release<B: RenderBackend + ?Sized>(self, backend: &mut B, pool: &mut RenderTargetPool) {
        if let Some(bloom) = self.bloom {
            bloom.release(backend, pool);
        }
        if let Some(sunrays) = self.sunrays {
            sunrays.release(backend, pool);
        }
        pool.release(backend, self.dithering);
    }

    pub fn bloom(&self) -> Option<&BloomTargets> {
        self.bloom.as_ref()
    }

    pub fn sunrays(&self) -> Option<&SunraysTargets> {
        self.sunrays.as_ref()
    }

    pub fn dithering(&self) -> &RenderTarget {
        &self.dithering
    }

    pub fn material(&self) -> &Material {
        &self.material
    }
}

/// Clears the drawing buffer when it is the destination, and paints the
/// background color for opaque configurations. Returns the blend mode the
/// display pass should use.
pub fn begin_frame<B: RenderBackend + ?Sized>(
    backend: &mut B,
    programs: &ProgramCache,
    config: &FluidConfiguration,
    target: Option<&RenderTarget>,
) -> Result<BlendMode> {
    if target.is_none() {
        backend.clear(None, [0.0; 4]);
    }

    let blend = if target.is_none() || !config.transparent {
        BlendMode::PremultipliedOver
    } else {
        BlendMode::Replace
    };

    if !config.transparent {
        draw_color(backend, programs, target, config.back_color.normalized(), blend)?;
    }
    Ok(blend)
}

fn draw_color<B: RenderBackend + ?Sized>(
    backend: &mut B,
    programs: &ProgramCache,
    target: Option<&RenderTarget>,
    color: Rgb,
    blend: BlendMode,
) -> Result<()> {
    programs
        .program(ProgramKind::Color)?
        .pass()
        .vec4("color", [color.r, color.g, color.b, 1.0])
        .draw(backend, target, blend)
}

/// Prefilter curve `(threshold - knee, 2 * knee, 0.25 / knee)`.
pub fn soft_knee_curve(threshold: f32, soft_knee: f32) -> [f32; 3] {
    let knee = threshold * soft_knee + 0.0001;
    [threshold - knee, knee * 2.0, 0.25 / knee]
}

fn apply_bloom<B: RenderBackend + ?Sized>(
    backend: &mut B,
    programs: &ProgramCache,
    source: &RenderTarget,
    targets: &BloomTargets,
    config: &FluidConfiguration,
) -> Result<()> {
    if targets.mips.len() < 2 {
        return Ok(());
    }

    let curve = soft_knee_curve(config.bloom_threshold, config.bloom_soft_knee);
    programs
        .program(ProgramKind::BloomPrefilter)?
        .pass()
        .vec2("texelSize", source.texel_size())
        .vec3("curve", curve)
        .float("threshold", config.bloom_threshold)
        .texture("uTexture", source.texture())
        .draw(backend, Some(&targets.bloom), BlendMode::Replace)?;

    let blur = programs.program(ProgramKind::BloomBlur)?;
    let mut last = &targets.bloom;
    for mip in &targets.mips {
        blur.pass()
            .vec2("texelSize", last.texel_size())
            .texture("uTexture", last.texture())
            .draw(backend, Some(mip), BlendMode::Replace)?;
        last = mip;
    }

    for mip in targets.mips.iter().rev().skip(1) {
        blur.pass()
            .vec2("texelSize", last.texel_size())
            .texture("uTexture", last.texture())
            .draw(backend, Some(mip), BlendMode::Additive)?;
        last = mip;
    }

    programs
        .program(ProgramKind::BloomFinal)?
        .pass()
        .vec2("texelSize", last.texel_size())
        .texture("uTexture", last.texture())
        .float("intensity", config.bloom_intensity)
        .draw(backend, Some(&targets.bloom), BlendMode::Replace)?;
    Ok(())
}

/// Masks the dye into `dye.write`, casts rays into the sunrays target and
/// softens them with one separable blur.
fn apply_sunrays<B: RenderBackend + ?Sized>(
    backend: &mut B,
    programs: &ProgramCache,
    fields: &SimulationFields,
    targets: &SunraysTargets,
    config: &FluidConfiguration,
) -> Result<()> {
    let dye = fields.dye();
    let mask = dye.write();

    programs
        .program(ProgramKind::SunraysMask)?
        .pass()
        .vec2("texelSize", mask.texel_size())
        .texture("uTexture", dye.read().texture())
        .draw(backend, Some(mask), BlendMode::Replace)?;

    programs
        .program(ProgramKind::Sunrays)?
        .pass()
        .vec2("texelSize", targets.sunrays.texel_size())
        .float("weight", config.sunrays_weight)
        .texture("uTexture", mask.texture())
        .draw(backend, Some(&targets.sunrays), BlendMode::Replace)?;

    blur(backend, programs, &targets.sunrays, &targets.temp, 1)
}

fn blur<B: RenderBackend + ?Sized>(
    backend: &mut B,
    programs: &ProgramCache,
    target: &RenderTarget,
    temp: &RenderTarget,
    iterations: u32,
) -> Result<()> {
    let program = programs.program(ProgramKind::Blur)?;
    let [texel_x, texel_y] = target.texel_size();
    for _ in 0..iterations {
        program
            .pass()
            .vec2("texelSize", [texel_x, 0.0])
            .texture("uTexture", target.texture())
            .draw(backend, Some(temp), BlendMode::Replace)?;
        program
            .pass()
            .vec2("texelSize", [0.0, texel_y])
            .texture("uTexture", temp.texture())
            .draw(backend, Some(target), BlendMode::Replace)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dithering_is_deterministic_and_opaque() {
        let first = dithering_noise(DITHERING_SIZE);
        let second = dithering_noise(DITHERING_SIZE);
        assert_eq!(first, second);
        assert_eq!(first.len(), (DITHERING_SIZE * DITHERING_SIZE * 4) as usize);
        assert!(first.chunks_exact(4).all(|px| px[3] == 255 && px[0] == px[1]));
    }

    #[test]
    fn soft_knee_with_zero_threshold() {
        let [x, y, z] = soft_knee_curve(0.0, 0.7);
        assert!((x + 0.0001).abs() < 1e-9);
        assert!((y - 0.0002).abs() < 1e-9);
        assert!((z - 2500.0).abs() < 1e-2);
    }

    #[test]
    fn soft_knee_scales_with_threshold() {
        let [x, y, _] = soft_knee_curve(0.6, 0.7);
        assert!((x - 0.1799).abs() < 1e-6);
        assert!((y - 0.8402).abs() < 1e-6);
    }
}
