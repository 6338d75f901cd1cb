use rand::Rng;
use serde::{Deserialize, Serialize};

/// Linear RGB color. Dye colors are in `[0, 1]` before scaling; the
/// configured background color is kept in 0-255 units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.r * factor, self.g * factor, self.b * factor)
    }

    /// Maps 0-255 components onto `[0, 1]`.
    pub fn normalized(self) -> Self {
        Self::new(self.r / 255.0, self.g / 255.0, self.b / 255.0)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

/// Color from 0-255 components.
pub fn rgb(r: u8, g: u8, b: u8) -> Rgb {
    Rgb::new(r as f32, g as f32, b as f32).normalized()
}

/// A fully saturated color of random hue, dimmed by `dim`.
pub fn random_color<R: Rng + ?Sized>(rng: &mut R, dim: f32) -> Rgb {
    hsv_to_rgb(rng.gen_range(0.0..1.0), 1.0, 1.0).scaled(dim)
}

pub const DEFAULT_DIM: f32 = 0.15;

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    match (i as i32).rem_euclid(6) {
        0 => Rgb::new(v, t, p),
        1 => Rgb::new(q, v, p),
        2 => Rgb::new(p, v, t),
        3 => Rgb::new(p, q, v),
        4 => Rgb::new(t, p, v),
        _ => Rgb::new(v, p, q),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn rgb_normalizes_bytes() {
        assert_eq!(rgb(255, 0, 51), Rgb::new(1.0, 0.0, 0.2));
    }

    #[test]
    fn hsv_primary_hues() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb::new(1.0, 0.0, 0.0));
        let green = hsv_to_rgb(1.0 / 3.0, 1.0, 1.0);
        assert!(green.g > 0.999 && green.r < 1e-5 && green.b < 1e-5);
        assert_eq!(hsv_to_rgb(1.0, 1.0, 1.0), Rgb::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn random_color_is_dimmed_and_saturated() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let color = random_color(&mut rng, DEFAULT_DIM);
            let max = color.r.max(color.g).max(color.b);
            let min = color.r.min(color.g).min(color.b);
            assert!((max - DEFAULT_DIM).abs() < 1e-6, "brightest channel is dim");
            assert!(min.abs() < 1e-6, "full saturation keeps one channel at zero");
        }
    }
}
