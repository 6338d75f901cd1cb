use image::{ImageBuffer, Rgba, RgbaImage};

use crate::export::FieldData;

/// Turns float texel grids into 8-bit images, resampling to the output size.
pub struct Renderer {
    width: u32,
    height: u32,
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl Renderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn texel_at(&self, field: &impl FieldData, x: u32, y: u32) -> Option<[f32; 4]> {
        let field_x = (x as f32 / self.width as f32 * field.width() as f32) as usize;
        let field_y = (y as f32 / self.height as f32 * field.height() as f32) as usize;
        (field_x < field.width() && field_y < field.height())
            .then(|| field.texels()[field_y * field.width() + field_x])
    }

    /// Color image of an RGBA field such as the dye or the drawing buffer.
    pub fn render_to_image(&self, field: &impl FieldData) -> RgbaImage {
        let mut img = ImageBuffer::new(self.width, self.height);

        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = match self.texel_at(field, x, y) {
                Some([r, g, b, a]) => Rgba([to_byte(r), to_byte(g), to_byte(b), to_byte(a)]),
                None => Rgba([0, 0, 0, 0]),
            };
        }

        img
    }

    /// Velocity magnitude per axis: red for x, green for y, scaled by `scale`.
    pub fn render_velocity_field(&self, field: &impl FieldData, scale: f32) -> RgbaImage {
        let mut img = ImageBuffer::new(self.width, self.height);

        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = match self.texel_at(field, x, y) {
                Some([vel_x, vel_y, _, _]) => Rgba([
                    to_byte(vel_x.abs() * scale),
                    to_byte(vel_y.abs() * scale),
                    128,
                    255,
                ]),
                None => Rgba([0, 0, 0, 255]),
            };
        }

        img
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::Snapshot;
    use crate::resolution::Dimensions;

    #[test]
    fn upscales_with_nearest_texel() {
        let snapshot = Snapshot::new(
            Dimensions::new(2, 1),
            vec![[1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0]],
        );
        let img = Renderer::new(4, 2).render_to_image(&snapshot);
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(1, 1), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(3, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn velocity_uses_absolute_components() {
        let snapshot = Snapshot::new(Dimensions::new(1, 1), vec![[-0.5, 2.0, 0.0, 1.0]]);
        let img = Renderer::new(1, 1).render_velocity_field(&snapshot, 1.0);
        assert_eq!(img.get_pixel(0, 0), &Rgba([128, 255, 128, 255]));
    }
}
