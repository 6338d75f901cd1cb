//! wgpu render backend.
//!
//! Every pass is a fullscreen triangle pair drawn into an offscreen texture.
//! The drawing buffer is an `Rgba8Unorm` texture of its own, read back on
//! demand.

use std::borrow::Cow;
use std::collections::HashMap;

use tokio::sync::oneshot;
use wgpu::util::DeviceExt;
use wgpu::{BindGroupLayout, Device, Queue, RenderPipeline, Sampler, ShaderModule, Texture, TextureView};

use crate::backend::{
    AddressMode, BlendMode, DrawCall, FilterMode, FormatProbe, ParamBlock, ProgramHandle,
    RenderBackend, TextureDescriptor, TextureFormat, TextureId, TEXTURE_SLOTS,
};
use crate::error::{FluidError, Result};
use crate::program::{compile_source, KeywordSet, ProgramKind, ShaderSource};
use crate::resolution::Dimensions;

const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const READBACK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
        TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn wgpu_blend(blend: BlendMode) -> Option<wgpu::BlendState> {
    let additive = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    };
    match blend {
        BlendMode::Replace => None,
        BlendMode::Additive => Some(wgpu::BlendState {
            color: additive,
            alpha: additive,
        }),
        BlendMode::PremultipliedOver => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
    }
}

fn texture_usage() -> wgpu::TextureUsages {
    wgpu::TextureUsages::TEXTURE_BINDING
        | wgpu::TextureUsages::RENDER_ATTACHMENT
        | wgpu::TextureUsages::COPY_SRC
        | wgpu::TextureUsages::COPY_DST
}

fn extent(size: Dimensions) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.width,
        height: size.height,
        depth_or_array_layers: 1,
    }
}

/// Row pitch of a texture-to-buffer copy.
fn padded_bytes_per_row(width: u32, bytes_per_texel: u32) -> u32 {
    let unpadded = width * bytes_per_texel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

struct GpuTexture {
    desc: TextureDescriptor,
    texture: Texture,
    view: TextureView,
}

struct GpuProgram {
    kind: ProgramKind,
    module: ShaderModule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    format: wgpu::TextureFormat,
    blend: BlendMode,
}

pub struct WgpuBackend {
    adapter: wgpu::Adapter,
    device: Device,
    queue: Queue,
    size: Dimensions,
    surface: Texture,
    surface_view: TextureView,
    bind_group_layout: BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    placeholder: TextureView,
    samplers: HashMap<(FilterMode, AddressMode), Sampler>,
    pipelines: HashMap<PipelineKey, RenderPipeline>,
    programs: Vec<GpuProgram>,
    textures: HashMap<TextureId, GpuTexture>,
    next_texture: u32,
    copy_program: Option<ProgramHandle>,
}

impl WgpuBackend {
    pub async fn new(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| FluidError::Backend("no GPU adapter found".to_string()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("liquidglow device"),
                    required_features: adapter.features()
                        & wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES,
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|err| FluidError::Backend(err.to_string()))?;

        log::info!("using adapter {:?}", adapter.get_info().name);

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<ParamBlock>() as u64),
            },
            count: None,
        }];
        for slot in 0..TEXTURE_SLOTS as u32 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        for slot in 0..TEXTURE_SLOTS as u32 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + TEXTURE_SLOTS as u32 + slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pass layout"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pass pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let placeholder = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("placeholder"),
                size: extent(Dimensions::new(1, 1)),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        let size = Dimensions::new(width.max(1), height.max(1));
        let (surface, surface_view) = Self::create_surface(&device, size);

        Ok(Self {
            adapter,
            device,
            queue,
            size,
            surface,
            surface_view,
            bind_group_layout,
            pipeline_layout,
            placeholder,
            samplers: HashMap::new(),
            pipelines: HashMap::new(),
            programs: Vec::new(),
            textures: HashMap::new(),
            next_texture: 0,
            copy_program: None,
        })
    }

    fn create_surface(device: &Device, size: Dimensions) -> (Texture, TextureView) {
        let surface = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("drawing buffer"),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SURFACE_FORMAT,
            usage: texture_usage(),
            view_formats: &[],
        });
        let view = surface.create_view(&wgpu::TextureViewDescriptor::default());
        (surface, view)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Resizes the drawing buffer; the next tick reallocates the fields.
    pub fn set_drawing_buffer_size(&mut self, width: u32, height: u32) {
        let size = Dimensions::new(width, height);
        if size == self.size || size.is_empty() {
            return;
        }
        let (surface, view) = Self::create_surface(&self.device, size);
        self.size = size;
        self.surface = surface;
        self.surface_view = view;
    }

    fn sampler(&mut self, filter: FilterMode, address: AddressMode) -> &Sampler {
        let device = &self.device;
        self.samplers.entry((filter, address)).or_insert_with(|| {
            let filter_mode = match filter {
                FilterMode::Linear => wgpu::FilterMode::Linear,
                FilterMode::Nearest => wgpu::FilterMode::Nearest,
            };
            let address_mode = match address {
                AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
                AddressMode::Repeat => wgpu::AddressMode::Repeat,
            };
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("pass sampler"),
                address_mode_u: address_mode,
                address_mode_v: address_mode,
                mag_filter: filter_mode,
                min_filter: filter_mode,
                ..Default::default()
            })
        })
    }

    /// Links `key.program` for its destination format and blend on first use.
    fn pipeline(&mut self, key: PipelineKey) -> Result<&RenderPipeline> {
        if !self.pipelines.contains_key(&key) {
            let program = self.programs.get(key.program.0 as usize).ok_or_else(|| {
                FluidError::Backend(format!("draw with unknown program {:?}", key.program))
            })?;

            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = self
                .device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(program.kind.name()),
                    layout: Some(&self.pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &program.module,
                        entry_point: program.kind.vertex_entry(),
                        buffers: &[],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &program.module,
                        entry_point: "fs_main",
                        targets: &[Some(wgpu::ColorTargetState {
                            format: key.format,
                            blend: wgpu_blend(key.blend),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                });
            if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
                log::error!("{} pipeline for {:?} failed: {}", program.kind, key.format, err);
                return Err(FluidError::Compile {
                    program: program.kind,
                    message: err.to_string(),
                });
            }
            self.pipelines.insert(key, pipeline);
        }
        self.pipelines.get(&key).ok_or_else(|| {
            FluidError::Backend(format!("pipeline for {:?} was not cached", key.program))
        })
    }

    fn target_view(&self, target: Option<TextureId>) -> Option<(&TextureView, wgpu::TextureFormat)> {
        match target {
            Some(id) => self
                .textures
                .get(&id)
                .map(|t| (&t.view, wgpu_format(t.desc.format))),
            None => Some((&self.surface_view, SURFACE_FORMAT)),
        }
    }

    /// Builds the pipeline and samplers `call` needs.
    fn prepare(&mut self, call: &DrawCall, format: wgpu::TextureFormat) -> Result<PipelineKey> {
        let key = PipelineKey {
            program: call.program,
            format,
            blend: call.blend,
        };
        self.pipeline(key)?;

        let sampling: Vec<(FilterMode, AddressMode)> = call
            .textures
            .iter()
            .map(|slot| self.sampling(*slot))
            .collect();
        for (filter, address) in sampling {
            self.sampler(filter, address);
        }
        Ok(key)
    }

    fn sampling(&self, slot: Option<TextureId>) -> (FilterMode, AddressMode) {
        slot.and_then(|id| self.textures.get(&id))
            .map(|t| (t.desc.filter, t.desc.address))
            .unwrap_or((FilterMode::Nearest, AddressMode::ClampToEdge))
    }

    fn record(&self, call: &DrawCall, key: PipelineKey, view: &TextureView) {
        let Some(pipeline) = self.pipelines.get(&key) else {
            return;
        };

        let uniforms = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("pass params"),
                contents: bytemuck::cast_slice(&[call.params]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniforms.as_entire_binding(),
        }];
        for (slot, texture) in call.textures.iter().enumerate() {
            let view = texture
                .and_then(|id| self.textures.get(&id))
                .map(|t| &t.view)
                .unwrap_or(&self.placeholder);
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + slot as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        for (slot, texture) in call.textures.iter().enumerate() {
            let Some(sampler) = self.samplers.get(&self.sampling(*texture)) else {
                return;
            };
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + (TEXTURE_SLOTS + slot) as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pass bindings"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(call.kind.name()),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(call.kind.name()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(
                0.0,
                0.0,
                call.viewport.width as f32,
                call.viewport.height as f32,
                0.0,
                1.0,
            );
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..6, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
    }

    async fn read_back(&self, texture: &Texture, size: Dimensions, bytes_per_texel: u32) -> Result<Vec<u8>> {
        let padded = padded_bytes_per_row(size.width, bytes_per_texel);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: (padded * size.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size.height),
                },
            },
            extent(size),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .await
            .map_err(|err| FluidError::Backend(err.to_string()))?
            .map_err(|err| FluidError::Backend(err.to_string()))?;

        let row_bytes = (size.width * bytes_per_texel) as usize;
        let data = slice.get_mapped_range();
        let mut bytes = Vec::with_capacity(row_bytes * size.height as usize);
        for row in data.chunks(padded as usize) {
            bytes.extend_from_slice(&row[..row_bytes]);
        }
        drop(data);
        buffer.unmap();
        Ok(bytes)
    }

    /// Drawing buffer contents as RGBA8, rows top-down.
    pub async fn read_surface_rgba8(&self) -> Result<Vec<u8>> {
        self.read_back(&self.surface, self.size, 4).await
    }

    pub async fn read_surface(&self) -> Result<Vec<[f32; 4]>> {
        let bytes = self.read_surface_rgba8().await?;
        Ok(bytes
            .chunks_exact(4)
            .map(|px| [px[0], px[1], px[2], px[3]].map(|c| c as f32 / 255.0))
            .collect())
    }

    /// Texture contents widened to RGBA float, rows top-down.
    ///
    /// The texture is first copied into an `Rgba32Float` scratch target so
    /// half-float data need not be decoded on the CPU.
    pub async fn read_texture(&mut self, texture: TextureId) -> Result<Vec<[f32; 4]>> {
        let size = self
            .textures
            .get(&texture)
            .map(|t| t.desc.size)
            .ok_or_else(|| FluidError::Backend(format!("unknown texture {:?}", texture)))?;

        let program = match self.copy_program {
            Some(program) => program,
            None => {
                let program = self.compile(&compile_source(ProgramKind::Copy, KeywordSet::EMPTY))?;
                self.copy_program = Some(program);
                program
            }
        };

        let scratch = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("readback scratch"),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: READBACK_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = scratch.create_view(&wgpu::TextureViewDescriptor::default());

        let mut params = ParamBlock::default();
        params.slots[0] = [1.0 / size.width as f32, 1.0 / size.height as f32, 0.0, 0.0];
        let call = DrawCall {
            program,
            kind: ProgramKind::Copy,
            params,
            textures: [Some(texture), None, None, None],
            target: None,
            viewport: size,
            blend: BlendMode::Replace,
        };
        if let Some(key) = self.prepare(&call, READBACK_FORMAT) {
            self.record(&call, key, &view);
        }

        let bytes = self.read_back(&scratch, size, 16).await?;
        scratch.destroy();
        Ok(bytes
            .chunks_exact(16)
            .map(|texel| {
                let channel =
                    |i: usize| f32::from_le_bytes([texel[i], texel[i + 1], texel[i + 2], texel[i + 3]]);
                [channel(0), channel(4), channel(8), channel(12)]
            })
            .collect())
    }
}

impl FormatProbe for WgpuBackend {
    fn supports_render_format(&mut self, format: TextureFormat) -> bool {
        let format = wgpu_format(format);
        let features = self.adapter.get_texture_format_features(format);
        if !features
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
            || !features
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
        {
            return false;
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let probe = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("format probe"),
            size: extent(Dimensions::new(4, 4)),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: texture_usage(),
            view_formats: &[],
        });
        let failed = pollster::block_on(self.device.pop_error_scope()).is_some();
        probe.destroy();
        !failed
    }
}

impl RenderBackend for WgpuBackend {
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

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: extent(desc.size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(desc.format),
            usage: texture_usage(),
            view_formats: &[],
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(FluidError::Backend(format!("{}: {}", desc.label, err)));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(
            id,
            GpuTexture {
                desc: *desc,
                texture,
                view,
            },
        );
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, rgba8: &[u8]) -> Result<()> {
        let target = self
            .textures
            .get(&texture)
            .ok_or_else(|| FluidError::Backend(format!("unknown texture {:?}", texture)))?;
        let size = target.desc.size;
        if target.desc.format != TextureFormat::Rgba8Unorm || rgba8.len() != size.texel_count() * 4 {
            return Err(FluidError::Backend(format!(
                "upload does not match {} ({:?})",
                target.desc.label, target.desc.format
            )));
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba8,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: Some(size.height),
            },
            extent(size),
        );
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        match self.textures.remove(&texture) {
            Some(gpu) => gpu.texture.destroy(),
            None => log::warn!("destroying unknown texture {:?}", texture),
        }
    }

    fn clear(&mut self, target: Option<TextureId>, color: [f32; 4]) {
        let Some((view, _)) = self.target_view(target) else {
            log::warn!("clearing unknown texture {:?}", target);
            return;
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("clear") });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: color[0] as f64,
                        g: color[1] as f64,
                        b: color[2] as f64,
                        a: color[3] as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.queue.submit(Some(encoder.finish()));
    }

    fn compile(&mut self, source: &ShaderSource) -> Result<ProgramHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(source.kind.name()),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source.wgsl.as_str())),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(FluidError::Compile {
                program: source.kind,
                message: err.to_string(),
            });
        }

        self.programs.push(GpuProgram {
            kind: source.kind,
            module,
        });
        Ok(ProgramHandle(self.programs.len() as u32 - 1))
    }

    fn draw(&mut self, call: &DrawCall) -> Result<()> {
        if call.viewport.is_empty() {
            return Ok(());
        }
        let unknown_target = || {
            FluidError::Backend(format!(
                "{} pass targets unknown texture {:?}",
                call.kind, call.target
            ))
        };
        let (_, format) = self.target_view(call.target).ok_or_else(unknown_target)?;
        let key = self.prepare(call, format)?;
        let (view, _) = self.target_view(call.target).ok_or_else(unknown_target)?;
        self.record(call, key, view);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1, 4), 256);
        assert_eq!(padded_bytes_per_row(64, 4), 256);
        assert_eq!(padded_bytes_per_row(65, 4), 512);
        assert_eq!(padded_bytes_per_row(16, 16), 256);
    }

    #[test]
    fn blend_modes_map_to_wgpu_states() {
        assert_eq!(wgpu_blend(BlendMode::Replace), None);
        assert_eq!(
            wgpu_blend(BlendMode::PremultipliedOver),
            Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING)
        );
        let additive = wgpu_blend(BlendMode::Additive).unwrap();
        assert_eq!(additive.color.dst_factor, wgpu::BlendFactor::One);
    }
}
