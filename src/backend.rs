//! The seam between the fluid pipeline and whatever executes its passes.
//!
//! Every pass the simulation issues is a full-target fragment draw: one
//! program, a small block of uniforms, up to four sampled textures and a
//! destination. Backends only need to know how to allocate textures,
//! compile the WGSL programs produced by [`crate::program::compile_source`]
//! and run such a draw.

use bytemuck::{Pod, Zeroable};

use crate::error::Result;
use crate::program::{ProgramKind, ShaderSource};
use crate::resolution::Dimensions;

pub const PARAM_SLOTS: usize = 8;
pub const TEXTURE_SLOTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u32);

/// Storage formats the pipeline asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R16Float,
    Rg16Float,
    Rgba16Float,
    Rgba8Unorm,
}

impl TextureFormat {
    pub fn channels(self) -> usize {
        match self {
            TextureFormat::R16Float => 1,
            TextureFormat::Rg16Float => 2,
            TextureFormat::Rgba16Float | TextureFormat::Rgba8Unorm => 4,
        }
    }

    /// Next wider half-float format to try when this one cannot be rendered to.
    pub fn fallback(self) -> Option<TextureFormat> {
        match self {
            TextureFormat::R16Float => Some(TextureFormat::Rg16Float),
            TextureFormat::Rg16Float => Some(TextureFormat::Rgba16Float),
            TextureFormat::Rgba16Float | TextureFormat::Rgba8Unorm => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Linear,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Overwrite the destination.
    Replace,
    /// `src + dst`, used when upsampling the bloom chain.
    Additive,
    /// `src + dst * (1 - src.a)`, used by the display pass.
    PremultipliedOver,
}

impl BlendMode {
    pub fn apply(self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        match self {
            BlendMode::Replace => src,
            BlendMode::Additive => [
                src[0] + dst[0],
                src[1] + dst[1],
                src[2] + dst[2],
                src[3] + dst[3],
            ],
            BlendMode::PremultipliedOver => {
                let keep = 1.0 - src[3];
                [
                    src[0] + dst[0] * keep,
                    src[1] + dst[1] * keep,
                    src[2] + dst[2] * keep,
                    src[3] + dst[3] * keep,
                ]
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureDescriptor {
    pub label: &'static str,
    pub size: Dimensions,
    pub format: TextureFormat,
    pub filter: FilterMode,
    pub address: AddressMode,
}

/// Uniform storage shared by every program: eight `vec4<f32>` slots.
///
/// Slot 0 always carries `texelSize`, which the vertex stage uses to build
/// the neighbour coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ParamBlock {
    pub slots: [[f32; 4]; PARAM_SLOTS],
}

impl ParamBlock {
    pub fn slot(&self, index: usize) -> [f32; 4] {
        self.slots[index]
    }

    pub fn scalar(&self, index: usize) -> f32 {
        self.slots[index][0]
    }

    pub fn vec2(&self, index: usize) -> [f32; 2] {
        [self.slots[index][0], self.slots[index][1]]
    }

    pub fn vec3(&self, index: usize) -> [f32; 3] {
        [self.slots[index][0], self.slots[index][1], self.slots[index][2]]
    }
}

/// One full-viewport fragment pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub kind: ProgramKind,
    pub params: ParamBlock,
    pub textures: [Option<TextureId>; TEXTURE_SLOTS],
    /// `None` draws into the visible surface.
    pub target: Option<TextureId>,
    pub viewport: Dimensions,
    pub blend: BlendMode,
}

/// Render-to-texture completeness check used by format negotiation.
pub trait FormatProbe {
    fn supports_render_format(&mut self, format: TextureFormat) -> bool;
}

pub trait RenderBackend: FormatProbe {
    /// Pixel size of the visible surface.
    fn drawing_buffer_size(&self) -> Dimensions;

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureId>;

    /// Replaces the contents of an `Rgba8Unorm` texture with tightly packed rows.
    fn upload_texture(&mut self, texture: TextureId, rgba8: &[u8]) -> Result<()>;

    fn destroy_texture(&mut self, texture: TextureId);

    /// Fills a texture, or the visible surface when `target` is `None`.
    fn clear(&mut self, target: Option<TextureId>, color: [f32; 4]);

    fn compile(&mut self, source: &ShaderSource) -> Result<ProgramHandle>;

    /// Fails with [`FluidError::Compile`](crate::FluidError::Compile) when the
    /// program cannot be linked for the destination.
    fn draw(&mut self, call: &DrawCall) -> Result<()>;
}
