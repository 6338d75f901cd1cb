//! Render targets and the pool that allocates and resizes them.

use std::mem;

use crate::backend::{
    AddressMode, BlendMode, FilterMode, RenderBackend, TextureDescriptor, TextureFormat, TextureId,
};
use crate::error::Result;
use crate::program::{ProgramCache, ProgramKind};
use crate::resolution::Dimensions;

/// A texture that passes can draw into.
///
/// Targets are owned by exactly one slot (a field, a bloom level, a caller)
/// and are handed back to [`RenderTargetPool::release`] when replaced.
#[derive(Debug, PartialEq)]
pub struct RenderTarget {
    label: &'static str,
    texture: TextureId,
    size: Dimensions,
    format: TextureFormat,
    filter: FilterMode,
    texel_size: [f32; 2],
}

impl RenderTarget {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn size(&self) -> Dimensions {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    /// `(1 / width, 1 / height)`.
    pub fn texel_size(&self) -> [f32; 2] {
        self.texel_size
    }
}

/// A read/write pair for passes that feed on their own output.
#[derive(Debug)]
pub struct DoubleRenderTarget {
    read: RenderTarget,
    write: RenderTarget,
    swaps: u64,
}

impl DoubleRenderTarget {
    fn new(read: RenderTarget, write: RenderTarget) -> Self {
        debug_assert_ne!(read.texture, write.texture);
        debug_assert_eq!(read.size, write.size);
        Self {
            read,
            write,
            swaps: 0,
        }
    }

    pub fn read(&self) -> &RenderTarget {
        &self.read
    }

    pub fn write(&self) -> &RenderTarget {
        &self.write
    }

    pub fn swap(&mut self) {
        mem::swap(&mut self.read, &mut self.write);
        self.swaps += 1;
    }

    /// Swaps since allocation.
    pub fn swap_count(&self) -> u64 {
        self.swaps
    }

    pub fn size(&self) -> Dimensions {
        self.read.size
    }

    pub fn texel_size(&self) -> [f32; 2] {
        self.read.texel_size
    }
}

#[derive(Debug, Default)]
pub struct RenderTargetPool {
    allocations: usize,
    releases: usize,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cleared, clamp-to-edge target.
    pub fn allocate<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        label: &'static str,
        size: Dimensions,
        format: TextureFormat,
        filter: FilterMode,
    ) -> Result<RenderTarget> {
        self.allocate_with(
            backend,
            &TextureDescriptor {
                label,
                size,
                format,
                filter,
                address: AddressMode::ClampToEdge,
            },
        )
    }

    pub fn allocate_with<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        desc: &TextureDescriptor,
    ) -> Result<RenderTarget> {
        let texture = backend.create_texture(desc)?;
        backend.clear(Some(texture), [0.0; 4]);
        self.allocations += 1;

        Ok(RenderTarget {
            label: desc.label,
            texture,
            size: desc.size,
            format: desc.format,
            filter: desc.filter,
            texel_size: [
                1.0 / desc.size.width as f32,
                1.0 / desc.size.height as f32,
            ],
        })
    }

    pub fn allocate_double<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        label: &'static str,
        size: Dimensions,
        format: TextureFormat,
        filter: FilterMode,
    ) -> Result<DoubleRenderTarget> {
        let read = self.allocate(backend, label, size, format, filter)?;
        let write = self.allocate(backend, label, size, format, filter)?;
        Ok(DoubleRenderTarget::new(read, write))
    }

    /// Moves `target` to `size`, carrying its contents over with the copy
    /// program. Returns `target` itself when the size is unchanged.
    pub fn resize<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        programs: &ProgramCache,
        target: RenderTarget,
        size: Dimensions,
    ) -> Result<RenderTarget> {
        if target.size == size {
            return Ok(target);
        }

        let copy = programs.program(ProgramKind::Copy)?;
        let resized = self.allocate(backend, target.label, size, target.format, target.filter)?;
        let copied = copy
            .pass()
            .vec2("texelSize", resized.texel_size)
            .texture("uTexture", target.texture)
            .draw(backend, Some(&resized), BlendMode::Replace);
        if let Err(err) = copied {
            self.release(backend, resized);
            return Err(err);
        }
        log::debug!(
            "resized {} from {}x{} to {}x{}",
            target.label,
            target.width(),
            target.height(),
            size.width,
            size.height
        );

        self.release(backend, target);
        Ok(resized)
    }

    /// Resizes `read` content-preservingly and gives the pair a fresh `write`.
    pub fn resize_double<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        programs: &ProgramCache,
        target: DoubleRenderTarget,
        size: Dimensions,
    ) -> Result<DoubleRenderTarget> {
        if target.size() == size {
            return Ok(target);
        }

        let DoubleRenderTarget { read, write, swaps } = target;
        let read = self.resize(backend, programs, read, size)?;
        let fresh = self.allocate(backend, write.label, size, write.format, write.filter)?;
        self.release(backend, write);

        Ok(DoubleRenderTarget {
            read,
            write: fresh,
            swaps,
        })
    }

    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, target: RenderTarget) {
        backend.destroy_texture(target.texture);
        self.releases += 1;
    }

    pub fn release_double<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        target: DoubleRenderTarget,
    ) {
        self.release(backend, target.read);
        self.release(backend, target.write);
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn releases(&self) -> usize {
        self.releases
    }

    /// Targets allocated and not yet released.
    pub fn live(&self) -> usize {
        self.allocations - self.releases
    }
}

#[cfg(all(test, feature = "cpu", not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;

    fn setup() -> (CpuBackend, ProgramCache, RenderTargetPool) {
        let mut backend = CpuBackend::new(64, 64);
        let mut programs = ProgramCache::new();
        programs
            .compile_all(&mut backend)
            .expect("CPU programs always compile");
        (backend, programs, RenderTargetPool::new())
    }

    #[test]
    fn swap_exchanges_read_and_write() {
        let (mut backend, _, mut pool) = setup();
        let mut target = pool
            .allocate_double(
                &mut backend,
                "pair",
                Dimensions::new(8, 8),
                TextureFormat::Rgba16Float,
                FilterMode::Nearest,
            )
            .unwrap();

        let read = target.read().texture();
        let write = target.write().texture();
        assert_ne!(read, write);

        target.swap();
        assert_eq!(target.read().texture(), write);
        assert_eq!(target.write().texture(), read);
        assert_eq!(target.swap_count(), 1);
        assert_eq!(pool.allocations(), 2, "swap must not allocate");
    }

    #[test]
    fn resize_to_same_size_is_identity() {
        let (mut backend, programs, mut pool) = setup();
        let target = pool
            .allocate(
                &mut backend,
                "single",
                Dimensions::new(16, 9),
                TextureFormat::Rgba16Float,
                FilterMode::Linear,
            )
            .unwrap();
        let texture = target.texture();
        let created = backend.textures_created();

        let target = pool
            .resize(&mut backend, &programs, target, Dimensions::new(16, 9))
            .unwrap();
        assert_eq!(target.texture(), texture);
        assert_eq!(backend.textures_created(), created);
        assert_eq!(pool.allocations(), 1);
    }

    #[test]
    fn resize_preserves_contents() {
        let (mut backend, programs, mut pool) = setup();
        let target = pool
            .allocate(
                &mut backend,
                "single",
                Dimensions::new(4, 4),
                TextureFormat::Rgba16Float,
                FilterMode::Linear,
            )
            .unwrap();
        backend.clear(Some(target.texture()), [0.25, 0.5, 0.75, 1.0]);

        let resized = pool
            .resize(&mut backend, &programs, target, Dimensions::new(8, 2))
            .unwrap();
        assert_eq!(resized.size(), Dimensions::new(8, 2));
        for texel in backend.read_texture(resized.texture()).unwrap() {
            assert!((texel[0] - 0.25).abs() < 1e-6);
            assert!((texel[2] - 0.75).abs() < 1e-6);
        }
        assert_eq!(pool.releases(), 1);
        assert_eq!(backend.live_textures(), 1);
    }

    #[test]
    fn resize_double_gets_fresh_write() {
        let (mut backend, programs, mut pool) = setup();
        let mut pair = pool
            .allocate_double(
                &mut backend,
                "pair",
                Dimensions::new(4, 4),
                TextureFormat::Rg16Float,
                FilterMode::Linear,
            )
            .unwrap();
        backend.clear(Some(pair.read().texture()), [1.0, -1.0, 0.0, 1.0]);
        backend.clear(Some(pair.write().texture()), [9.0, 9.0, 0.0, 1.0]);
        pair.swap();
        pair.swap();

        let pair = pool
            .resize_double(&mut backend, &programs, pair, Dimensions::new(6, 6))
            .unwrap();
        assert_eq!(pair.size(), Dimensions::new(6, 6));
        assert_eq!(pair.swap_count(), 2);
        assert!(
            backend
                .read_texture(pair.read().texture())
                .unwrap()
                .iter()
                .all(|t| t[0] == 1.0 && t[1] == -1.0)
        );
        assert!(
            backend
                .read_texture(pair.write().texture())
                .unwrap()
                .iter()
                .all(|t| t[0] == 0.0),
            "write side starts cleared"
        );
        assert_eq!(pool.live(), 2);
    }
}
