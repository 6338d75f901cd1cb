//! Shader programs, their uniform tables and the variant cache.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use crate::backend::{
    BlendMode, DrawCall, ParamBlock, ProgramHandle, RenderBackend, TextureId, TEXTURE_SLOTS,
};
use crate::error::{FluidError, Result};
use crate::target::RenderTarget;

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramKind {
    Copy,
    Clear,
    Color,
    Blur,
    BloomPrefilter,
    BloomBlur,
    BloomFinal,
    SunraysMask,
    Sunrays,
    Splat,
    Advection,
    Divergence,
    Curl,
    Vorticity,
    Pressure,
    GradientSubtract,
    Display,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 17] = [
        ProgramKind::Copy,
        ProgramKind::Clear,
        ProgramKind::Color,
        ProgramKind::Blur,
        ProgramKind::BloomPrefilter,
        ProgramKind::BloomBlur,
        ProgramKind::BloomFinal,
        ProgramKind::SunraysMask,
        ProgramKind::Sunrays,
        ProgramKind::Splat,
        ProgramKind::Advection,
        ProgramKind::Divergence,
        ProgramKind::Curl,
        ProgramKind::Vorticity,
        ProgramKind::Pressure,
        ProgramKind::GradientSubtract,
        ProgramKind::Display,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProgramKind::Copy => "copy",
            ProgramKind::Clear => "clear",
            ProgramKind::Color => "color",
            ProgramKind::Blur => "blur",
            ProgramKind::BloomPrefilter => "bloom prefilter",
            ProgramKind::BloomBlur => "bloom blur",
            ProgramKind::BloomFinal => "bloom final",
            ProgramKind::SunraysMask => "sunrays mask",
            ProgramKind::Sunrays => "sunrays",
            ProgramKind::Splat => "splat",
            ProgramKind::Advection => "advection",
            ProgramKind::Divergence => "divergence",
            ProgramKind::Curl => "curl",
            ProgramKind::Vorticity => "vorticity",
            ProgramKind::Pressure => "pressure",
            ProgramKind::GradientSubtract => "gradient subtract",
            ProgramKind::Display => "display",
        }
    }

    /// Vertex entry point in `common.wgsl`.
    pub fn vertex_entry(self) -> &'static str {
        match self {
            ProgramKind::Blur => "vs_blur",
            _ => "vs_main",
        }
    }

    fn fragment_source(self) -> &'static str {
        match self {
            ProgramKind::Copy => include_str!("shaders/copy.wgsl"),
            ProgramKind::Clear => include_str!("shaders/clear.wgsl"),
            ProgramKind::Color => include_str!("shaders/color.wgsl"),
            ProgramKind::Blur => include_str!("shaders/blur.wgsl"),
            ProgramKind::BloomPrefilter => include_str!("shaders/bloom_prefilter.wgsl"),
            ProgramKind::BloomBlur => include_str!("shaders/bloom_blur.wgsl"),
            ProgramKind::BloomFinal => include_str!("shaders/bloom_final.wgsl"),
            ProgramKind::SunraysMask => include_str!("shaders/sunrays_mask.wgsl"),
            ProgramKind::Sunrays => include_str!("shaders/sunrays.wgsl"),
            ProgramKind::Splat => include_str!("shaders/splat.wgsl"),
            ProgramKind::Advection => include_str!("shaders/advection.wgsl"),
            ProgramKind::Divergence => include_str!("shaders/divergence.wgsl"),
            ProgramKind::Curl => include_str!("shaders/curl.wgsl"),
            ProgramKind::Vorticity => include_str!("shaders/vorticity.wgsl"),
            ProgramKind::Pressure => include_str!("shaders/pressure.wgsl"),
            ProgramKind::GradientSubtract => include_str!("shaders/gradient_subtract.wgsl"),
            ProgramKind::Display => include_str!("shaders/display.wgsl"),
        }
    }

    /// Uniforms the linked program exposes. Display drops the uniforms of
    /// disabled keywords, the way a GLSL linker strips inactive uniforms.
    pub fn uniform_table(self, keywords: KeywordSet) -> Vec<(&'static str, UniformLocation)> {
        use UniformLocation::{Slot, Texture};

        let mut table = vec![("texelSize", Slot(0))];
        match self {
            ProgramKind::Copy
            | ProgramKind::Blur
            | ProgramKind::BloomBlur
            | ProgramKind::SunraysMask => table.push(("uTexture", Texture(0))),
            ProgramKind::Clear => table.extend([("uTexture", Texture(0)), ("value", Slot(1))]),
            ProgramKind::Color => table.push(("color", Slot(1))),
            ProgramKind::BloomPrefilter => table.extend([
                ("uTexture", Texture(0)),
                ("curve", Slot(1)),
                ("threshold", Slot(2)),
            ]),
            ProgramKind::BloomFinal => {
                table.extend([("uTexture", Texture(0)), ("intensity", Slot(1))])
            }
            ProgramKind::Sunrays => table.extend([("uTexture", Texture(0)), ("weight", Slot(1))]),
            ProgramKind::Splat => table.extend([
                ("uTarget", Texture(0)),
                ("aspectRatio", Slot(1)),
                ("point", Slot(2)),
                ("color", Slot(3)),
                ("radius", Slot(4)),
            ]),
            ProgramKind::Advection => table.extend([
                ("uVelocity", Texture(0)),
                ("uSource", Texture(1)),
                ("dt", Slot(1)),
                ("dissipation", Slot(2)),
            ]),
            ProgramKind::Divergence | ProgramKind::Curl => table.push(("uVelocity", Texture(0))),
            ProgramKind::Vorticity => table.extend([
                ("uVelocity", Texture(0)),
                ("uCurl", Texture(1)),
                ("dt", Slot(1)),
                ("curl", Slot(2)),
            ]),
            ProgramKind::Pressure => {
                table.extend([("uPressure", Texture(0)), ("uDivergence", Texture(1))])
            }
            ProgramKind::GradientSubtract => {
                table.extend([("uPressure", Texture(0)), ("uVelocity", Texture(1))])
            }
            ProgramKind::Display => {
                table.push(("uTexture", Texture(0)));
                if keywords.contains(Keyword::Bloom) {
                    table.extend([
                        ("uBloom", Texture(1)),
                        ("uDithering", Texture(3)),
                        ("ditherScale", Slot(1)),
                    ]);
                }
                if keywords.contains(Keyword::Sunrays) {
                    table.push(("uSunrays", Texture(2)));
                }
            }
        }
        table
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Feature switches of the display program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Shading,
    Bloom,
    Sunrays,
}

impl Keyword {
    pub const ALL: [Keyword; 3] = [Keyword::Shading, Keyword::Bloom, Keyword::Sunrays];

    pub fn name(self) -> &'static str {
        match self {
            Keyword::Shading => "SHADING",
            Keyword::Bloom => "BLOOM",
            Keyword::Sunrays => "SUNRAYS",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Keyword::Shading => 1,
            Keyword::Bloom => 1 << 1,
            Keyword::Sunrays => 1 << 2,
        }
    }
}

/// Exact set of active keywords, used directly as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct KeywordSet(u8);

impl KeywordSet {
    pub const EMPTY: KeywordSet = KeywordSet(0);

    pub fn from_flags(shading: bool, bloom: bool, sunrays: bool) -> Self {
        let mut set = Self::EMPTY;
        if shading {
            set.insert(Keyword::Shading);
        }
        if bloom {
            set.insert(Keyword::Bloom);
        }
        if sunrays {
            set.insert(Keyword::Sunrays);
        }
        set
    }

    pub fn with(mut self, keyword: Keyword) -> Self {
        self.insert(keyword);
        self
    }

    pub fn insert(&mut self, keyword: Keyword) {
        self.0 |= keyword.bit();
    }

    pub fn contains(&self, keyword: Keyword) -> bool {
        self.0 & keyword.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Keyword> {
        Keyword::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformLocation {
    /// Index into [`ParamBlock::slots`].
    Slot(usize),
    /// Texture binding index.
    Texture(usize),
}

/// WGSL ready for a backend: keyword constants, the shared vertex stage and
/// one fragment stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSource {
    pub kind: ProgramKind,
    pub keywords: KeywordSet,
    pub wgsl: String,
}

pub fn compile_source(kind: ProgramKind, keywords: KeywordSet) -> ShaderSource {
    let mut wgsl = String::new();
    for keyword in Keyword::ALL {
        wgsl.push_str(&format!(
            "const {}: bool = {};\n",
            keyword.name(),
            keywords.contains(keyword)
        ));
    }
    wgsl.push_str(COMMON_WGSL);
    wgsl.push('\n');
    wgsl.push_str(kind.fragment_source());

    ShaderSource {
        kind,
        keywords,
        wgsl,
    }
}

/// A compiled program and its uniform-name -> location table.
#[derive(Debug, Clone)]
pub struct ProgramVariant {
    handle: ProgramHandle,
    kind: ProgramKind,
    keywords: KeywordSet,
    uniforms: HashMap<&'static str, UniformLocation>,
}

impl ProgramVariant {
    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    pub fn keywords(&self) -> KeywordSet {
        self.keywords
    }

    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    pub fn uniforms(&self) -> &HashMap<&'static str, UniformLocation> {
        &self.uniforms
    }

    pub fn pass(&self) -> Pass<'_> {
        Pass::new(self)
    }
}

/// Lazily compiled programs keyed by `(kind, keyword set)`.
///
/// A variant is compiled at most once per instance and never replaced.
#[derive(Debug, Default)]
pub struct ProgramCache {
    variants: HashMap<(ProgramKind, KeywordSet), ProgramVariant>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variant<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        kind: ProgramKind,
        keywords: KeywordSet,
    ) -> Result<&ProgramVariant> {
        match self.variants.entry((kind, keywords)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let source = compile_source(kind, keywords);
                let handle = backend.compile(&source).inspect_err(|err| {
                    log::error!("{}", err);
                })?;
                log::debug!(
                    "compiled {} program {:?} with keywords {:?}",
                    kind,
                    handle,
                    keywords.iter().map(Keyword::name).collect::<Vec<_>>()
                );

                Ok(entry.insert(ProgramVariant {
                    handle,
                    kind,
                    keywords,
                    uniforms: kind.uniform_table(keywords).into_iter().collect(),
                }))
            }
        }
    }

    /// Compiles every keyword-free program.
    pub fn compile_all<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        for kind in ProgramKind::ALL {
            if kind != ProgramKind::Display {
                self.variant(backend, kind, KeywordSet::EMPTY)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, kind: ProgramKind, keywords: KeywordSet) -> Result<&ProgramVariant> {
        self.variants
            .get(&(kind, keywords))
            .ok_or(FluidError::PreconditionViolation(
                "program used before it was compiled",
            ))
    }

    pub fn program(&self, kind: ProgramKind) -> Result<&ProgramVariant> {
        self.get(kind, KeywordSet::EMPTY)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn variants_of(&self, kind: ProgramKind) -> usize {
        self.variants.keys().filter(|(k, _)| *k == kind).count()
    }
}

/// The display program, bound under whichever keyword set is active.
#[derive(Debug, Default)]
pub struct Material {
    active: Option<KeywordSet>,
    uniforms: HashMap<&'static str, UniformLocation>,
    uniform_fetches: usize,
}

impl Material {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to the variant for `keywords`, compiling it on first use.
    /// Re-selecting the active variant does nothing.
    pub fn set_keywords<B: RenderBackend + ?Sized>(
        &mut self,
        programs: &mut ProgramCache,
        backend: &mut B,
        keywords: KeywordSet,
    ) -> Result<()> {
        let variant = programs.variant(backend, ProgramKind::Display, keywords)?;
        if self.active == Some(keywords) {
            return Ok(());
        }

        self.uniforms = variant.uniforms().clone();
        self.active = Some(keywords);
        self.uniform_fetches += 1;
        log::debug!("display material switched to {:?}", keywords);
        Ok(())
    }

    pub fn active(&self) -> Option<KeywordSet> {
        self.active
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    pub fn uniform_fetches(&self) -> usize {
        self.uniform_fetches
    }

    pub fn bind<'a>(&self, programs: &'a ProgramCache) -> Result<&'a ProgramVariant> {
        let keywords = self.active.ok_or(FluidError::PreconditionViolation(
            "display material has no keywords set",
        ))?;
        programs.get(ProgramKind::Display, keywords)
    }
}

/// Uniform values for one draw of a program.
///
/// Names the program does not expose are ignored, as a GL uniform call with
/// a null location would be.
#[derive(Debug, Clone, Copy)]
pub struct Pass<'a> {
    variant: &'a ProgramVariant,
    params: ParamBlock,
    textures: [Option<TextureId>; TEXTURE_SLOTS],
}

impl<'a> Pass<'a> {
    pub fn new(variant: &'a ProgramVariant) -> Self {
        Self {
            variant,
            params: ParamBlock::default(),
            textures: [None; TEXTURE_SLOTS],
        }
    }

    fn set(mut self, name: &str, value: [f32; 4]) -> Self {
        match self.variant.uniform(name) {
            Some(UniformLocation::Slot(slot)) => self.params.slots[slot] = value,
            _ => log::trace!("{} has no uniform {}", self.variant.kind(), name),
        }
        self
    }

    pub fn float(self, name: &str, value: f32) -> Self {
        self.set(name, [value, 0.0, 0.0, 0.0])
    }

    pub fn vec2(self, name: &str, value: [f32; 2]) -> Self {
        self.set(name, [value[0], value[1], 0.0, 0.0])
    }

    pub fn vec3(self, name: &str, value: [f32; 3]) -> Self {
        self.set(name, [value[0], value[1], value[2], 0.0])
    }

    pub fn vec4(self, name: &str, value: [f32; 4]) -> Self {
        self.set(name, value)
    }

    pub fn texture(mut self, name: &str, texture: TextureId) -> Self {
        match self.variant.uniform(name) {
            Some(UniformLocation::Texture(slot)) => self.textures[slot] = Some(texture),
            _ => log::trace!("{} has no sampler {}", self.variant.kind(), name),
        }
        self
    }

    pub fn params(&self) -> &ParamBlock {
        &self.params
    }

    /// Draws into `target`, or into the visible surface when `None`.
    pub fn draw<B: RenderBackend + ?Sized>(
        self,
        backend: &mut B,
        target: Option<&RenderTarget>,
        blend: BlendMode,
    ) -> Result<()> {
        let viewport = target
            .map(RenderTarget::size)
            .unwrap_or_else(|| backend.drawing_buffer_size());
        let target = target.map(RenderTarget::texture);
        debug_assert!(
            target.is_none() || !self.textures.contains(&target),
            "{} pass samples the texture it writes",
            self.variant.kind()
        );

        backend.draw(&DrawCall {
            program: self.variant.handle(),
            kind: self.variant.kind(),
            params: self.params,
            textures: self.textures,
            target,
            viewport,
            blend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_sets_are_exact() {
        let shading_bloom = KeywordSet::from_flags(true, true, false);
        let bloom_shading = KeywordSet::EMPTY
            .with(Keyword::Bloom)
            .with(Keyword::Shading);
        assert_eq!(shading_bloom, bloom_shading);
        assert_ne!(shading_bloom, KeywordSet::from_flags(true, true, true));
        assert_ne!(
            KeywordSet::from_flags(true, false, false),
            KeywordSet::from_flags(false, true, false)
        );
    }

    #[test]
    fn every_combination_is_a_distinct_key() {
        let mut keys = Vec::new();
        for bits in 0..8u8 {
            keys.push(KeywordSet::from_flags(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0));
        }
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 8);
    }

    #[test]
    fn source_declares_every_keyword() {
        let source = compile_source(
            ProgramKind::Display,
            KeywordSet::EMPTY.with(Keyword::Sunrays),
        );
        assert!(source.wgsl.starts_with("const SHADING: bool = false;\n"));
        assert!(source.wgsl.contains("const BLOOM: bool = false;"));
        assert!(source.wgsl.contains("const SUNRAYS: bool = true;"));
        assert!(source.wgsl.contains("fn vs_main"));
        assert!(source.wgsl.contains("fn fs_main"));
    }

    #[test]
    fn display_table_follows_keywords() {
        let plain = ProgramKind::Display.uniform_table(KeywordSet::EMPTY);
        assert!(!plain.iter().any(|(name, _)| *name == "uBloom"));

        let bloom = ProgramKind::Display.uniform_table(KeywordSet::EMPTY.with(Keyword::Bloom));
        assert!(bloom.contains(&("uBloom", UniformLocation::Texture(1))));
        assert!(bloom.contains(&("ditherScale", UniformLocation::Slot(1))));
    }

    #[test]
    fn uniform_tables_do_not_overlap() {
        let all = KeywordSet::from_flags(true, true, true);
        for kind in ProgramKind::ALL {
            let table = kind.uniform_table(all);
            let mut locations: Vec<_> = table.iter().map(|(_, location)| *location).collect();
            let total = locations.len();
            locations.sort_by_key(|location| match location {
                UniformLocation::Slot(i) => *i,
                UniformLocation::Texture(i) => 100 + *i,
            });
            locations.dedup();
            assert_eq!(locations.len(), total, "{} reuses a location", kind);
        }
    }
}
