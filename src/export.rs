use std::path::Path;

use crate::error::Result;
use crate::render::Renderer;
use crate::resolution::Dimensions;

/// A float RGBA grid, rows top-down.
pub trait FieldData {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn texels(&self) -> &[[f32; 4]];
}

/// Owned copy of a texture or of the drawing buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    size: Dimensions,
    texels: Vec<[f32; 4]>,
}

impl Snapshot {
    pub fn new(size: Dimensions, texels: Vec<[f32; 4]>) -> Self {
        debug_assert_eq!(texels.len(), size.texel_count());
        Self { size, texels }
    }

    pub fn size(&self) -> Dimensions {
        self.size
    }
}

impl FieldData for Snapshot {
    fn width(&self) -> usize {
        self.size.width as usize
    }

    fn height(&self) -> usize {
        self.size.height as usize
    }

    fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }
}

#[cfg(all(feature = "cpu", not(target_arch = "wasm32")))]
mod cpu_snapshots {
    use super::Snapshot;
    use crate::cpu::CpuBackend;
    use crate::target::RenderTarget;

    impl Snapshot {
        pub fn surface(backend: &CpuBackend) -> Self {
            use crate::backend::RenderBackend;
            Self::new(backend.drawing_buffer_size(), backend.read_surface().to_vec())
        }

        pub fn target(backend: &CpuBackend, target: &RenderTarget) -> Option<Self> {
            backend
                .read_texture(target.texture())
                .map(|texels| Self::new(target.size(), texels.to_vec()))
        }
    }
}

pub struct ImageExporter {
    renderer: Renderer,
}

impl ImageExporter {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            renderer: Renderer::new(width, height),
        }
    }

    pub fn export_png(&self, field: &impl FieldData, path: &Path) -> Result<()> {
        let img = self.renderer.render_to_image(field);
        img.save(path)?;
        Ok(())
    }

    pub fn export_velocity_png(&self, field: &impl FieldData, path: &Path, scale: f32) -> Result<()> {
        let img = self.renderer.render_velocity_field(field, scale);
        img.save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_png_of_requested_size() {
        let snapshot = Snapshot::new(Dimensions::new(2, 2), vec![[0.5, 0.25, 1.0, 1.0]; 4]);
        let path = std::env::temp_dir().join("liquidglow_export_test.png");
        ImageExporter::new(8, 6).export_png(&snapshot, &path).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (8, 6));
        assert_eq!(img.get_pixel(3, 3).0, [128, 64, 255, 255]);
        let _ = std::fs::remove_file(&path);
    }
}
