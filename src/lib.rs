//! Real-time stable-fluids simulation with a bloom and sunrays compositor.
//!
//! A [`FluidService`] owns one simulation bound to one drawing surface. The
//! passes it issues go through the [`RenderBackend`] trait, implemented on
//! the CPU by [`CpuBackend`] and on the GPU by `WgpuBackend` (feature `gpu`).

pub mod analysis;
pub mod backend;
pub mod color;
pub mod compositor;
pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod kernels;
pub mod pointer;
pub mod program;
pub mod render;
pub mod resolution;
pub mod service;
pub mod splat;
pub mod step;
pub mod target;

#[cfg(all(feature = "cpu", not(target_arch = "wasm32")))]
pub mod cpu;

#[cfg(all(feature = "cpu", not(target_arch = "wasm32")))]
pub mod desktop;

#[cfg(feature = "gpu")]
pub mod gpu_backend;

// Feature-based backend selection
#[cfg(all(feature = "cpu", not(target_arch = "wasm32")))]
pub type DefaultBackend = cpu::CpuBackend;

#[cfg(all(feature = "gpu", not(all(feature = "cpu", not(target_arch = "wasm32")))))]
pub type DefaultBackend = gpu_backend::WgpuBackend;

pub use analysis::{AnalysisRecorder, FieldMetrics};
pub use backend::{BlendMode, RenderBackend, TextureFormat};
pub use color::{Rgb, rgb};
pub use config::FluidConfiguration;
pub use error::{FluidError, Result};
pub use export::{FieldData, ImageExporter, Snapshot};
pub use pointer::{PointerTracker, TexMovement};
pub use program::{Keyword, KeywordSet, ProgramKind};
pub use render::Renderer;
pub use resolution::Dimensions;
pub use service::{FluidService, GridSizes};
pub use splat::SplatEvent;

#[cfg(all(feature = "cpu", not(target_arch = "wasm32")))]
pub use cpu::CpuBackend;

#[cfg(all(feature = "cpu", not(target_arch = "wasm32")))]
pub use desktop::FluidApp;

#[cfg(feature = "gpu")]
pub use gpu_backend::WgpuBackend;
