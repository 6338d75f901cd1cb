//! Software versions of the fragment programs in `shaders/`.
//!
//! Each function mirrors its WGSL counterpart line for line so the CPU and
//! wgpu backends produce the same fields.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::backend::{AddressMode, FilterMode, ParamBlock, TEXTURE_SLOTS};
use crate::program::{Keyword, KeywordSet, ProgramKind};
use crate::resolution::Dimensions;

const SUNRAYS_ITERATIONS: usize = 16;
const SUNRAYS_DENSITY: f32 = 0.3;
const SUNRAYS_DECAY: f32 = 0.95;
const SUNRAYS_EXPOSURE: f32 = 0.7;

/// Read-only view of a texture, sampled the way a GPU sampler would.
///
/// Rows are stored top-down; `v = 0` is the bottom row.
#[derive(Debug, Clone, Copy)]
pub struct Sampler<'a> {
    texels: &'a [[f32; 4]],
    size: Dimensions,
    filter: FilterMode,
    address: AddressMode,
}

impl<'a> Sampler<'a> {
    /// Stands in for an unbound texture slot.
    pub const EMPTY: Sampler<'static> = Sampler {
        texels: &[],
        size: Dimensions::new(0, 0),
        filter: FilterMode::Nearest,
        address: AddressMode::ClampToEdge,
    };

    pub fn new(
        texels: &'a [[f32; 4]],
        size: Dimensions,
        filter: FilterMode,
        address: AddressMode,
    ) -> Self {
        debug_assert_eq!(texels.len(), size.texel_count());
        Self {
            texels,
            size,
            filter,
            address,
        }
    }

    fn wrap(&self, index: i64, extent: u32) -> usize {
        let extent = extent as i64;
        match self.address {
            AddressMode::ClampToEdge => index.clamp(0, extent - 1) as usize,
            AddressMode::Repeat => index.rem_euclid(extent) as usize,
        }
    }

    fn fetch(&self, x: i64, y: i64) -> Vec4 {
        let x = self.wrap(x, self.size.width);
        let y = self.wrap(y, self.size.height);
        Vec4::from(self.texels[y * self.size.width as usize + x])
    }

    pub fn sample(&self, uv: Vec2) -> Vec4 {
        if self.size.is_empty() {
            return Vec4::ZERO;
        }

        let x = f64::from(uv.x) * f64::from(self.size.width);
        let y = (1.0 - f64::from(uv.y)) * f64::from(self.size.height);

        match self.filter {
            FilterMode::Nearest => self.fetch(x.floor() as i64, y.floor() as i64),
            FilterMode::Linear => {
                let x = snap_to_texel(x - 0.5, self.size.width);
                let y = snap_to_texel(y - 0.5, self.size.height);
                let x0 = x.floor();
                let y0 = y.floor();
                let fx = (x - x0) as f32;
                let fy = (y - y0) as f32;
                let (x0, y0) = (x0 as i64, y0 as i64);

                let top = self.fetch(x0, y0).lerp(self.fetch(x0 + 1, y0), fx);
                let bottom = self.fetch(x0, y0 + 1).lerp(self.fetch(x0 + 1, y0 + 1), fx);
                top.lerp(bottom, fy)
            }
        }
    }
}

/// Rounds `coord` to the nearest texel centre when it lies within the f32
/// rounding error of a texture coordinate scaled up to `extent` texels.
fn snap_to_texel(coord: f64, extent: u32) -> f64 {
    let nearest = coord.round();
    let tolerance = 4.0 * f64::from(f32::EPSILON) * f64::from(extent.max(1));
    if (coord - nearest).abs() <= tolerance {
        nearest
    } else {
        coord
    }
}

/// Interpolated vertex outputs for one fragment.
#[derive(Debug, Clone, Copy)]
pub struct Fragment {
    pub uv: Vec2,
    pub l: Vec2,
    pub r: Vec2,
    pub t: Vec2,
    pub b: Vec2,
}

impl Fragment {
    /// Vertex stage: `vs_blur` for the blur program, `vs_main` otherwise.
    pub fn new(kind: ProgramKind, uv: Vec2, texel: Vec2) -> Self {
        if kind == ProgramKind::Blur {
            let offset = texel * 1.333_333_3;
            return Self {
                uv,
                l: uv - offset,
                r: uv + offset,
                t: uv,
                b: uv,
            };
        }

        Self {
            uv,
            l: uv - Vec2::new(texel.x, 0.0),
            r: uv + Vec2::new(texel.x, 0.0),
            t: uv + Vec2::new(0.0, texel.y),
            b: uv - Vec2::new(0.0, texel.y),
        }
    }
}

pub struct Inputs<'a> {
    pub params: &'a ParamBlock,
    pub textures: [Sampler<'a>; TEXTURE_SLOTS],
    pub keywords: KeywordSet,
}

impl Inputs<'_> {
    fn slot(&self, index: usize) -> Vec4 {
        Vec4::from(self.params.slot(index))
    }

    fn scalar(&self, index: usize) -> f32 {
        self.params.scalar(index)
    }
}

pub fn shade(kind: ProgramKind, frag: &Fragment, inputs: &Inputs<'_>) -> Vec4 {
    let [t0, t1, t2, t3] = &inputs.textures;
    match kind {
        ProgramKind::Copy => t0.sample(frag.uv),
        ProgramKind::Clear => t0.sample(frag.uv) * inputs.scalar(1),
        ProgramKind::Color => inputs.slot(1),
        ProgramKind::Blur => {
            t0.sample(frag.uv) * 0.294_117_64
                + t0.sample(frag.l) * 0.352_941_17
                + t0.sample(frag.r) * 0.352_941_17
        }
        ProgramKind::BloomPrefilter => bloom_prefilter(frag, t0, inputs),
        ProgramKind::BloomBlur => four_tap(frag, t0) * 0.25,
        ProgramKind::BloomFinal => four_tap(frag, t0) * 0.25 * inputs.scalar(1),
        ProgramKind::SunraysMask => {
            let mut c = t0.sample(frag.uv);
            let br = c.x.max(c.y).max(c.z);
            c.w = 1.0 - (br * 20.0).max(0.0).min(0.8);
            c
        }
        ProgramKind::Sunrays => sunrays(frag, t0, inputs.scalar(1)),
        ProgramKind::Splat => splat(frag, t0, inputs),
        ProgramKind::Advection => {
            let texel = inputs.slot(0).xy();
            let dt = inputs.scalar(1);
            let dissipation = inputs.scalar(2);
            let coord = frag.uv - dt * t0.sample(frag.uv).xy() * texel;
            t1.sample(coord) / (1.0 + dissipation * dt)
        }
        ProgramKind::Divergence => divergence(frag, t0),
        ProgramKind::Curl => {
            let l = t0.sample(frag.l).y;
            let r = t0.sample(frag.r).y;
            let t = t0.sample(frag.t).x;
            let b = t0.sample(frag.b).x;
            Vec4::new(0.5 * (r - l - t + b), 0.0, 0.0, 1.0)
        }
        ProgramKind::Vorticity => vorticity(frag, t0, t1, inputs),
        ProgramKind::Pressure => {
            let l = t0.sample(frag.l).x;
            let r = t0.sample(frag.r).x;
            let t = t0.sample(frag.t).x;
            let b = t0.sample(frag.b).x;
            let divergence = t1.sample(frag.uv).x;
            Vec4::new((l + r + b + t - divergence) * 0.25, 0.0, 0.0, 1.0)
        }
        ProgramKind::GradientSubtract => {
            let l = t0.sample(frag.l).x;
            let r = t0.sample(frag.r).x;
            let t = t0.sample(frag.t).x;
            let b = t0.sample(frag.b).x;
            let velocity = t1.sample(frag.uv).xy() - Vec2::new(r - l, t - b);
            velocity.extend(0.0).extend(1.0)
        }
        ProgramKind::Display => display(frag, [t0, t1, t2, t3], inputs),
    }
}

fn four_tap(frag: &Fragment, texture: &Sampler<'_>) -> Vec4 {
    texture.sample(frag.l) + texture.sample(frag.r) + texture.sample(frag.t) + texture.sample(frag.b)
}

fn bloom_prefilter(frag: &Fragment, texture: &Sampler<'_>, inputs: &Inputs<'_>) -> Vec4 {
    let curve = inputs.slot(1).xyz();
    let threshold = inputs.scalar(2);

    let c = texture.sample(frag.uv).xyz();
    let br = c.max_element();
    let rq = (br - curve.x).clamp(0.0, curve.y);
    let rq = curve.z * rq * rq;
    (c * (rq.max(br - threshold) / br.max(0.0001))).extend(0.0)
}

fn sunrays(frag: &Fragment, texture: &Sampler<'_>, weight: f32) -> Vec4 {
    let dir = (frag.uv - Vec2::splat(0.5))
        * (1.0 / SUNRAYS_ITERATIONS as f32 * SUNRAYS_DENSITY);
    let mut coord = frag.uv;
    let mut illumination_decay = 1.0;
    let mut color = texture.sample(frag.uv).w;

    for _ in 0..SUNRAYS_ITERATIONS {
        coord -= dir;
        color += texture.sample(coord).w * illumination_decay * weight;
        illumination_decay *= SUNRAYS_DECAY;
    }

    Vec4::new(color * SUNRAYS_EXPOSURE, 0.0, 0.0, 1.0)
}

fn splat(frag: &Fragment, target: &Sampler<'_>, inputs: &Inputs<'_>) -> Vec4 {
    let aspect_ratio = inputs.scalar(1);
    let point = inputs.slot(2).xy();
    let color = inputs.slot(3).xyz();
    let radius = inputs.scalar(4);

    let mut p = frag.uv - point;
    p.x *= aspect_ratio;
    let splat = (-p.dot(p) / radius).exp() * color;
    (target.sample(frag.uv).xyz() + splat).extend(1.0)
}

fn divergence(frag: &Fragment, velocity: &Sampler<'_>) -> Vec4 {
    let mut l = velocity.sample(frag.l).x;
    let mut r = velocity.sample(frag.r).x;
    let mut t = velocity.sample(frag.t).y;
    let mut b = velocity.sample(frag.b).y;

    let c = velocity.sample(frag.uv).xy();
    if frag.l.x < 0.0 {
        l = -c.x;
    }
    if frag.r.x > 1.0 {
        r = -c.x;
    }
    if frag.t.y > 1.0 {
        t = -c.y;
    }
    if frag.b.y < 0.0 {
        b = -c.y;
    }

    Vec4::new(0.5 * (r - l + t - b), 0.0, 0.0, 1.0)
}

fn vorticity(
    frag: &Fragment,
    velocity: &Sampler<'_>,
    curl: &Sampler<'_>,
    inputs: &Inputs<'_>,
) -> Vec4 {
    let dt = inputs.scalar(1);
    let strength = inputs.scalar(2);

    let l = curl.sample(frag.l).x;
    let r = curl.sample(frag.r).x;
    let t = curl.sample(frag.t).x;
    let b = curl.sample(frag.b).x;
    let c = curl.sample(frag.uv).x;

    let mut force = 0.5 * Vec2::new(t.abs() - b.abs(), r.abs() - l.abs());
    force /= force.length() + 0.0001;
    force *= strength * c;
    force.y *= -1.0;

    let velocity = (velocity.sample(frag.uv).xy() + force * dt).clamp(
        Vec2::splat(-1000.0),
        Vec2::splat(1000.0),
    );
    velocity.extend(0.0).extend(1.0)
}

fn linear_to_gamma(color: Vec3) -> Vec3 {
    let c = color.max(Vec3::ZERO);
    (1.055 * c.powf(0.416_666_67) - Vec3::splat(0.055)).max(Vec3::ZERO)
}

fn display(frag: &Fragment, textures: [&Sampler<'_>; TEXTURE_SLOTS], inputs: &Inputs<'_>) -> Vec4 {
    let [dye, bloom_texture, sunrays_texture, dithering] = textures;
    let keywords = inputs.keywords;
    let mut c = dye.sample(frag.uv).xyz();

    if keywords.contains(Keyword::Shading) {
        let lc = dye.sample(frag.l).xyz();
        let rc = dye.sample(frag.r).xyz();
        let tc = dye.sample(frag.t).xyz();
        let bc = dye.sample(frag.b).xyz();

        let dx = rc.length() - lc.length();
        let dy = tc.length() - bc.length();

        let n = Vec3::new(dx, dy, inputs.slot(0).xy().length()).normalize_or_zero();
        let diffuse = (n.dot(Vec3::Z) + 0.7).clamp(0.7, 1.0);
        c *= diffuse;
    }

    let mut bloom = Vec3::ZERO;
    if keywords.contains(Keyword::Bloom) {
        bloom = bloom_texture.sample(frag.uv).xyz();
    }

    if keywords.contains(Keyword::Sunrays) {
        let sunrays = sunrays_texture.sample(frag.uv).x;
        c *= sunrays;
        bloom *= sunrays;
    }

    if keywords.contains(Keyword::Bloom) {
        let scale = inputs.slot(1).xy();
        let noise = dithering.sample(frag.uv * scale).x * 2.0 - 1.0;
        bloom += Vec3::splat(noise / 255.0);
        c += linear_to_gamma(bloom);
    }

    c.extend(c.max_element())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(width: u32, height: u32, f: impl Fn(u32, u32) -> [f32; 4]) -> Vec<[f32; 4]> {
        let mut texels = Vec::new();
        for row in 0..height {
            for col in 0..width {
                texels.push(f(col, row));
            }
        }
        texels
    }

    #[test]
    fn nearest_sampling_maps_v_to_rows_bottom_up() {
        let texels = texture(1, 2, |_, row| [row as f32, 0.0, 0.0, 1.0]);
        let sampler = Sampler::new(
            &texels,
            Dimensions::new(1, 2),
            FilterMode::Nearest,
            AddressMode::ClampToEdge,
        );
        assert_eq!(sampler.sample(Vec2::new(0.5, 0.25)).x, 1.0, "bottom row");
        assert_eq!(sampler.sample(Vec2::new(0.5, 0.75)).x, 0.0, "top row");
    }

    #[test]
    fn linear_sampling_at_texel_centres_is_exact() {
        for (width, height) in [(32, 24), (37, 53), (1920, 1080)] {
            let texels = texture(width, height, |col, row| {
                [(row * width + col) as f32, col as f32, row as f32, 1.0]
            });
            let size = Dimensions::new(width, height);
            let sampler = Sampler::new(&texels, size, FilterMode::Linear, AddressMode::ClampToEdge);

            let rows = (0..height).step_by((height as usize / 40).max(1));
            for row in rows {
                let v = 1.0 - (row as f32 + 0.5) / height as f32;
                for col in (0..width).step_by((width as usize / 40).max(1)) {
                    let uv = Vec2::new((col as f32 + 0.5) / width as f32, v);
                    let expected = Vec4::from(texels[(row * width + col) as usize]);
                    assert_eq!(
                        sampler.sample(uv),
                        expected,
                        "texel ({}, {}) of {}x{}",
                        col,
                        row,
                        width,
                        height
                    );
                }
            }
        }
    }

    #[test]
    fn linear_sampling_interpolates_between_centres() {
        let texels = texture(2, 1, |col, _| [col as f32, 0.0, 0.0, 1.0]);
        let sampler = Sampler::new(
            &texels,
            Dimensions::new(2, 1),
            FilterMode::Linear,
            AddressMode::ClampToEdge,
        );
        assert!((sampler.sample(Vec2::new(0.5, 0.5)).x - 0.5).abs() < 1e-6);
        assert_eq!(sampler.sample(Vec2::new(0.0, 0.5)).x, 0.0);
        assert_eq!(sampler.sample(Vec2::new(1.0, 0.5)).x, 1.0);
    }

    #[test]
    fn repeat_addressing_wraps() {
        let texels = texture(2, 1, |col, _| [col as f32, 0.0, 0.0, 1.0]);
        let sampler = Sampler::new(
            &texels,
            Dimensions::new(2, 1),
            FilterMode::Nearest,
            AddressMode::Repeat,
        );
        assert_eq!(sampler.sample(Vec2::new(1.25, 0.5)).x, 0.0);
        assert_eq!(sampler.sample(Vec2::new(1.75, 0.5)).x, 1.0);
    }

    #[test]
    fn unbound_slot_reads_zero() {
        assert_eq!(Sampler::EMPTY.sample(Vec2::new(0.3, 0.3)), Vec4::ZERO);
    }

    #[test]
    fn advection_divides_by_dissipation() {
        let texels = texture(4, 4, |_, _| [0.0, 0.0, 0.0, 0.0]);
        let source = texture(4, 4, |_, _| [2.0, 2.0, 2.0, 2.0]);
        let size = Dimensions::new(4, 4);
        let mut params = ParamBlock::default();
        params.slots[0] = [0.25, 0.25, 0.0, 0.0];
        params.slots[1][0] = 0.5;
        params.slots[2][0] = 2.0;

        let inputs = Inputs {
            params: &params,
            textures: [
                Sampler::new(&texels, size, FilterMode::Linear, AddressMode::ClampToEdge),
                Sampler::new(&source, size, FilterMode::Linear, AddressMode::ClampToEdge),
                Sampler::EMPTY,
                Sampler::EMPTY,
            ],
            keywords: KeywordSet::EMPTY,
        };
        let frag = Fragment::new(ProgramKind::Advection, Vec2::splat(0.5), Vec2::splat(0.25));
        let out = shade(ProgramKind::Advection, &frag, &inputs);
        assert!((out.x - 1.0).abs() < 1e-6, "2 / (1 + 2 * 0.5) = 1, got {}", out.x);
    }

    #[test]
    fn splat_peaks_at_point() {
        let base = texture(8, 8, |_, _| [0.0; 4]);
        let size = Dimensions::new(8, 8);
        let mut params = ParamBlock::default();
        params.slots[1][0] = 1.0;
        params.slots[2] = [0.5, 0.5, 0.0, 0.0];
        params.slots[3] = [3.0, -2.0, 0.0, 0.0];
        params.slots[4][0] = 0.001;

        let inputs = Inputs {
            params: &params,
            textures: [
                Sampler::new(&base, size, FilterMode::Linear, AddressMode::ClampToEdge),
                Sampler::EMPTY,
                Sampler::EMPTY,
                Sampler::EMPTY,
            ],
            keywords: KeywordSet::EMPTY,
        };
        let at = |uv: Vec2| {
            shade(
                ProgramKind::Splat,
                &Fragment::new(ProgramKind::Splat, uv, Vec2::splat(0.125)),
                &inputs,
            )
        };
        let centre = at(Vec2::splat(0.5));
        assert!((centre.x - 3.0).abs() < 1e-5);
        assert!((centre.y + 2.0).abs() < 1e-5);
        assert!(at(Vec2::new(0.9, 0.9)).x.abs() < 1e-6);
    }

    #[test]
    fn display_alpha_is_brightest_channel() {
        let dye = texture(2, 2, |_, _| [0.2, 0.6, 0.1, 1.0]);
        let size = Dimensions::new(2, 2);
        let params = ParamBlock::default();
        let inputs = Inputs {
            params: &params,
            textures: [
                Sampler::new(&dye, size, FilterMode::Linear, AddressMode::ClampToEdge),
                Sampler::EMPTY,
                Sampler::EMPTY,
                Sampler::EMPTY,
            ],
            keywords: KeywordSet::EMPTY,
        };
        let frag = Fragment::new(ProgramKind::Display, Vec2::splat(0.5), Vec2::splat(0.5));
        let out = shade(ProgramKind::Display, &frag, &inputs);
        assert!((out.w - 0.6).abs() < 1e-6);
    }
}
