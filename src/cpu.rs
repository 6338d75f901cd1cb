//! Software render backend.
//!
//! Runs every fragment program on the CPU, one rayon task per row. The
//! drawing buffer is an RGBA float image clamped to `[0, 1]` like an 8-bit
//! surface would be.

use std::collections::{HashMap, HashSet};
use std::mem;

use glam::Vec2;
#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

use crate::backend::{
    AddressMode, BlendMode, DrawCall, FilterMode, FormatProbe, ProgramHandle, RenderBackend,
    TextureDescriptor, TextureFormat, TextureId,
};
use crate::error::{FluidError, Result};
use crate::kernels::{self, Fragment, Inputs, Sampler};
use crate::program::{KeywordSet, ProgramKind, ShaderSource};
use crate::resolution::Dimensions;

struct CpuTexture {
    desc: TextureDescriptor,
    texels: Vec<[f32; 4]>,
}

impl CpuTexture {
    fn sampler(&self) -> Sampler<'_> {
        Sampler::new(
            &self.texels,
            self.desc.size,
            self.desc.filter,
            self.desc.address,
        )
    }
}

/// Stores `value` the way a texture of `format` keeps it.
fn store(format: TextureFormat, value: [f32; 4]) -> [f32; 4] {
    match format {
        TextureFormat::R16Float => [value[0], 0.0, 0.0, 1.0],
        TextureFormat::Rg16Float => [value[0], value[1], 0.0, 1.0],
        TextureFormat::Rgba16Float => value,
        TextureFormat::Rgba8Unorm => value.map(|c| c.clamp(0.0, 1.0)),
    }
}

pub struct CpuBackend {
    size: Dimensions,
    surface: Vec<[f32; 4]>,
    textures: HashMap<TextureId, CpuTexture>,
    next_texture: u32,
    programs: Vec<(ProgramKind, KeywordSet)>,
    unsupported: HashSet<TextureFormat>,
    textures_created: usize,
    draws: HashMap<ProgramKind, usize>,
}

impl CpuBackend {
    pub fn new(width: u32, height: u32) -> Self {
        let size = Dimensions::new(width, height);
        Self {
            size,
            surface: vec![[0.0; 4]; size.texel_count()],
            textures: HashMap::new(),
            next_texture: 0,
            programs: Vec::new(),
            unsupported: HashSet::new(),
            textures_created: 0,
            draws: HashMap::new(),
        }
    }

    /// Makes format probes fail for `formats`, to emulate limited hardware.
    pub fn with_unsupported_formats(
        mut self,
        formats: impl IntoIterator<Item = TextureFormat>,
    ) -> Self {
        self.unsupported.extend(formats);
        self
    }

    /// Resizes the drawing buffer; the next tick reallocates the fields.
    pub fn set_drawing_buffer_size(&mut self, width: u32, height: u32) {
        let size = Dimensions::new(width, height);
        if size != self.size {
            self.size = size;
            self.surface = vec![[0.0; 4]; size.texel_count()];
        }
    }

    /// Drawing buffer contents, rows top-down.
    pub fn read_surface(&self) -> &[[f32; 4]] {
        &self.surface
    }

    pub fn read_surface_rgba8(&self) -> Vec<u8> {
        self.surface
            .iter()
            .flat_map(|texel| texel.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }

    /// Texture contents, rows top-down.
    pub fn read_texture(&self, texture: TextureId) -> Option<&[[f32; 4]]> {
        self.textures.get(&texture).map(|t| t.texels.as_slice())
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<Dimensions> {
        self.textures.get(&texture).map(|t| t.desc.size)
    }

    pub fn textures_created(&self) -> usize {
        self.textures_created
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn draw_count(&self, kind: ProgramKind) -> usize {
        self.draws.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_draws(&self) -> usize {
        self.draws.values().sum()
    }
}

impl FormatProbe for CpuBackend {
    fn supports_render_format(&mut self, format: TextureFormat) -> bool {
        !self.unsupported.contains(&format)
    }
}

impl RenderBackend for CpuBackend {
    fn drawing_buffer_size(&self) -> Dimensions {
        self.size
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureId> {
        if desc.size.is_empty() {
            return Err(FluidError::Backend(format!(
                "cannot create zero-sized texture {}",
                desc.label
            )));
        }

        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures_created += 1;
        self.textures.insert(
            id,
            CpuTexture {
                desc: *desc,
                texels: vec![[0.0; 4]; desc.size.texel_count()],
            },
        );
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, rgba8: &[u8]) -> Result<()> {
        let target = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| FluidError::Backend(format!("unknown texture {:?}", texture)))?;
        if target.desc.format != TextureFormat::Rgba8Unorm
            || rgba8.len() != target.desc.size.texel_count() * 4
        {
            return Err(FluidError::Backend(format!(
                "upload does not match {} ({:?})",
                target.desc.label, target.desc.format
            )));
        }

        for (texel, bytes) in target.texels.iter_mut().zip(rgba8.chunks_exact(4)) {
            *texel = [
                bytes[0] as f32 / 255.0,
                bytes[1] as f32 / 255.0,
                bytes[2] as f32 / 255.0,
                bytes[3] as f32 / 255.0,
            ];
        }
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            log::warn!("destroying unknown texture {:?}", texture);
        }
    }

    fn clear(&mut self, target: Option<TextureId>, color: [f32; 4]) {
        match target {
            Some(id) => {
                if let Some(texture) = self.textures.get_mut(&id) {
                    texture.texels.fill(store(texture.desc.format, color));
                }
            }
            None => self.surface.fill(store(TextureFormat::Rgba8Unorm, color)),
        }
    }

    fn compile(&mut self, source: &ShaderSource) -> Result<ProgramHandle> {
        if !source.wgsl.contains("fn fs_main") {
            return Err(FluidError::Compile {
                program: source.kind,
                message: "missing fragment entry point fs_main".to_string(),
            });
        }

        self.programs.push((source.kind, source.keywords));
        Ok(ProgramHandle(self.programs.len() as u32 - 1))
    }

    fn draw(&mut self, call: &DrawCall) -> Result<()> {
        let Some(&(kind, keywords)) = self.programs.get(call.program.0 as usize) else {
            return Err(FluidError::Backend(format!(
                "draw with unknown program {:?}",
                call.program
            )));
        };

        let (mut texels, size, format) = match call.target {
            Some(id) => match self.textures.get_mut(&id) {
                Some(texture) => (
                    mem::take(&mut texture.texels),
                    texture.desc.size,
                    texture.desc.format,
                ),
                None => {
                    return Err(FluidError::Backend(format!(
                        "{} pass targets unknown texture {:?}",
                        kind, id
                    )));
                }
            },
            None => (
                mem::take(&mut self.surface),
                self.size,
                TextureFormat::Rgba8Unorm,
            ),
        };
        debug_assert_eq!(size, call.viewport);

        if !size.is_empty() {
            let inputs = Inputs {
                params: &call.params,
                textures: call.textures.map(|slot| {
                    slot.and_then(|id| self.textures.get(&id))
                        .map(CpuTexture::sampler)
                        .unwrap_or(Sampler::EMPTY)
                }),
                keywords,
            };
            let texel = Vec2::from(call.params.vec2(0));
            let width = size.width as usize;
            let shade_row = |(row, line): (usize, &mut [[f32; 4]])| {
                let v = 1.0 - (row as f32 + 0.5) / size.height as f32;
                for (col, out) in line.iter_mut().enumerate() {
                    let uv = Vec2::new((col as f32 + 0.5) / size.width as f32, v);
                    let frag = Fragment::new(kind, uv, texel);
                    let color = kernels::shade(kind, &frag, &inputs).to_array();
                    *out = store(format, call.blend.apply(color, *out));
                }
            };

            #[cfg(not(target_arch = "wasm32"))]
            texels.par_chunks_mut(width).enumerate().for_each(shade_row);
            #[cfg(target_arch = "wasm32")]
            texels.chunks_mut(width).enumerate().for_each(shade_row);
        }

        match call.target {
            Some(id) => {
                if let Some(texture) = self.textures.get_mut(&id) {
                    texture.texels = texels;
                }
            }
            None => self.surface = texels,
        }
        *self.draws.entry(kind).or_default() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DrawCall, ParamBlock};
    use crate::program::compile_source;

    fn texture(backend: &mut CpuBackend, format: TextureFormat) -> TextureId {
        backend
            .create_texture(&TextureDescriptor {
                label: "test",
                size: Dimensions::new(4, 4),
                format,
                filter: FilterMode::Nearest,
                address: AddressMode::ClampToEdge,
            })
            .unwrap()
    }

    #[test]
    fn narrow_formats_keep_only_their_channels() {
        let mut backend = CpuBackend::new(4, 4);
        let r = texture(&mut backend, TextureFormat::R16Float);
        let rg = texture(&mut backend, TextureFormat::Rg16Float);
        backend.clear(Some(r), [0.5, 0.25, 0.125, 0.0]);
        backend.clear(Some(rg), [0.5, 0.25, 0.125, 0.0]);

        assert_eq!(backend.read_texture(r).unwrap()[0], [0.5, 0.0, 0.0, 1.0]);
        assert_eq!(backend.read_texture(rg).unwrap()[0], [0.5, 0.25, 0.0, 1.0]);
    }

    #[test]
    fn additive_blend_accumulates() {
        let mut backend = CpuBackend::new(4, 4);
        let program = backend
            .compile(&compile_source(ProgramKind::Color, KeywordSet::EMPTY))
            .unwrap();
        let target = texture(&mut backend, TextureFormat::Rgba16Float);

        let mut params = ParamBlock::default();
        params.slots[1] = [0.25, 0.5, 1.0, 1.0];
        let call = DrawCall {
            program,
            kind: ProgramKind::Color,
            params,
            textures: [None; 4],
            target: Some(target),
            viewport: Dimensions::new(4, 4),
            blend: BlendMode::Additive,
        };
        backend.draw(&call).unwrap();
        backend.draw(&call).unwrap();

        assert_eq!(backend.read_texture(target).unwrap()[5], [0.5, 1.0, 2.0, 2.0]);
        assert_eq!(backend.draw_count(ProgramKind::Color), 2);
    }

    #[test]
    fn surface_clamps_to_unit_range() {
        let mut backend = CpuBackend::new(2, 2);
        backend.clear(None, [2.0, -1.0, 0.5, 1.0]);
        assert_eq!(backend.read_surface()[0], [1.0, 0.0, 0.5, 1.0]);
        assert_eq!(&backend.read_surface_rgba8()[..4], &[255, 0, 128, 255]);
    }

    #[test]
    fn upload_requires_rgba8_payload() {
        let mut backend = CpuBackend::new(4, 4);
        let half = texture(&mut backend, TextureFormat::Rgba16Float);
        assert!(backend.upload_texture(half, &[0; 64]).is_err());

        let bytes = texture(&mut backend, TextureFormat::Rgba8Unorm);
        assert!(backend.upload_texture(bytes, &[0; 63]).is_err());
        backend.upload_texture(bytes, &[255; 64]).unwrap();
        assert_eq!(backend.read_texture(bytes).unwrap()[15], [1.0; 4]);
    }

    #[test]
    fn unsupported_formats_fail_probe() {
        let mut backend = CpuBackend::new(4, 4).with_unsupported_formats([TextureFormat::R16Float]);
        assert!(!backend.supports_render_format(TextureFormat::R16Float));
        assert!(backend.supports_render_format(TextureFormat::Rg16Float));
    }
}
