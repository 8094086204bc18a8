//! [`TerrainBackend`] on a wgpu device.
//!
//! wgpu has no bind state, so the backend remembers which framebuffer is
//! bound and opens a render pass on it for every clear or draw. All passes of
//! a frame are recorded into one command encoder that
//! [`WgpuBackend::submit`] hands to the queue.

use std::collections::HashMap;
use std::num::NonZeroU64;

use relief_dem::ElevationLevel;
use wgpu::util::DeviceExt;

use crate::backend::{DepthFunc, FramebufferId, Program, RenderState, TerrainBackend, TextureId};
use crate::error::BackendError;
use crate::shaders::{
    MIPMAP_BLIT_SHADER_SOURCE, TERRAIN_PREPARE_SHADER_SOURCE, TERRAIN_SHADER_SOURCE,
};
use crate::uniforms::{PrepareUniforms, ShadeUniforms};

/// Format of offscreen render targets and the main color target.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Format of the main target's depth buffer.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const ELEVATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Unit square as a triangle strip.
const QUAD_VERTICES: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

/// Number of mip levels in a full chain for the given dimensions.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    width.max(height).max(1).ilog2() + 1
}

/// Request a device and queue with no surface attached.
pub fn create_headless_device() -> Result<(wgpu::Device, wgpu::Queue), BackendError> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| BackendError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("relief-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok((device, queue))
    })
}

/// Create a test GPU device and queue. Returns `None` if no GPU is available.
#[cfg(test)]
pub(crate) fn create_test_device_queue() -> Option<(wgpu::Device, wgpu::Queue)> {
    create_headless_device().ok()
}

/// The main color and depth target, standing in for the default framebuffer.
pub struct FrameTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

impl FrameTarget {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };

        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frame-color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frame-depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        Self {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
        }
    }

    pub fn width(&self) -> u32 {
        self.color.width()
    }

    pub fn height(&self) -> u32 {
        self.color.height()
    }

    pub fn color_texture(&self) -> &wgpu::Texture {
        &self.color
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    sample_view: wgpu::TextureView,
    /// Mip 0 only; `None` for textures that are never drawn into.
    attachment_view: Option<wgpu::TextureView>,
}

struct ProgramLayout {
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

impl ProgramLayout {
    fn new(
        device: &wgpu::Device,
        label: &str,
        source: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        Self {
            module,
            bind_group_layout,
            pipeline_layout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: Program,
    state: RenderState,
    depth: bool,
}

fn uniform_entry(binding: u32, size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(size),
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn compare_function(func: DepthFunc) -> wgpu::CompareFunction {
    match func {
        DepthFunc::Never => wgpu::CompareFunction::Never,
        DepthFunc::Less => wgpu::CompareFunction::Less,
        DepthFunc::Equal => wgpu::CompareFunction::Equal,
        DepthFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        DepthFunc::Greater => wgpu::CompareFunction::Greater,
        DepthFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        DepthFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        DepthFunc::Always => wgpu::CompareFunction::Always,
    }
}

fn quad_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
        offset: 0,
        shader_location: 0,
        format: wgpu::VertexFormat::Float32x2,
    }];

    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

fn create_program_pipeline(
    device: &wgpu::Device,
    layout: &ProgramLayout,
    key: PipelineKey,
) -> wgpu::RenderPipeline {
    // Without a depth attachment depth testing has nothing to test against.
    let depth_stencil = key.depth.then(|| wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: key.state.depth_test && key.state.depth_write,
        depth_compare: if key.state.depth_test {
            compare_function(key.state.depth_func)
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    });

    let blend = match key.program {
        Program::TerrainPrepare => None,
        Program::Terrain => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(key.program.name()),
        layout: Some(&layout.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &layout.module,
            entry_point: Some("vs_main"),
            buffers: &[quad_layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &layout.module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

fn create_blit_pipeline(device: &wgpu::Device, layout: &ProgramLayout) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("mipmap-pipeline"),
        layout: Some(&layout.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &layout.module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &layout.module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

/// Resolve the color and optional depth view of whatever is bound.
fn bound_views<'a>(
    bound: Option<FramebufferId>,
    framebuffers: &HashMap<FramebufferId, Option<TextureId>>,
    textures: &'a HashMap<TextureId, GpuTexture>,
    frame: Option<&'a FrameTarget>,
) -> Option<(&'a wgpu::TextureView, Option<&'a wgpu::TextureView>)> {
    match bound {
        Some(framebuffer) => {
            let texture = framebuffers.get(&framebuffer).copied().flatten()?;
            let view = textures.get(&texture)?.attachment_view.as_ref()?;
            Some((view, None))
        }
        None => frame.map(|f| (&f.color_view, Some(&f.depth_view))),
    }
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    color: &wgpu::TextureView,
    depth: Option<&wgpu::TextureView>,
    color_load: wgpu::LoadOp<wgpu::Color>,
    depth_load: wgpu::LoadOp<f32>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color,
            resolve_target: None,
            ops: wgpu::Operations {
                load: color_load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: depth.map(|view| wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: depth_load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    })
}

/// Copy one mip level of an RGBA8 texture back to the CPU, tightly packed.
///
/// Submits `encoder` (or an empty one) first so pending work lands before the
/// copy.
fn read_back(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    encoder: Option<wgpu::CommandEncoder>,
    texture: &wgpu::Texture,
    mip_level: u32,
) -> Result<Vec<u8>, BackendError> {
    let width = (texture.width() >> mip_level).max(1);
    let height = (texture.height() >> mip_level).max(1);
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("terrain-readback"),
        size: u64::from(padded * height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = encoder.unwrap_or_else(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("terrain-readback-encoder"),
        })
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    });
    rx.recv().map_err(|_| BackendError::MapChannelClosed)??;

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((unpadded * height) as usize);
    for row in mapped.chunks_exact(padded as usize) {
        pixels.extend_from_slice(&row[..unpadded as usize]);
    }
    drop(mapped);
    buffer.unmap();

    Ok(pixels)
}

/// Terrain command backend recording into wgpu command encoders.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    encoder: Option<wgpu::CommandEncoder>,
    textures: HashMap<TextureId, GpuTexture>,
    framebuffers: HashMap<FramebufferId, Option<TextureId>>,
    bound: Option<FramebufferId>,
    frame: Option<FrameTarget>,
    state: RenderState,
    next_texture: u32,
    next_framebuffer: u32,
    quad: wgpu::Buffer,
    target_sampler: wgpu::Sampler,
    blit_sampler: wgpu::Sampler,
    prepare: ProgramLayout,
    shade: ProgramLayout,
    blit: ProgramLayout,
    blit_pipeline: wgpu::RenderPipeline,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("terrain-quad"),
            contents: bytemuck::cast_slice(QUAD_VERTICES.as_slice()),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let target_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("terrain-target-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let blit_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("blit-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let prepare = ProgramLayout::new(
            &device,
            Program::TerrainPrepare.name(),
            TERRAIN_PREPARE_SHADER_SOURCE,
            &[
                uniform_entry(0, std::mem::size_of::<PrepareUniforms>() as u64),
                texture_entry(1),
            ],
        );
        let shade = ProgramLayout::new(
            &device,
            Program::Terrain.name(),
            TERRAIN_SHADER_SOURCE,
            &[
                uniform_entry(0, std::mem::size_of::<ShadeUniforms>() as u64),
                texture_entry(1),
                sampler_entry(2),
            ],
        );
        let blit = ProgramLayout::new(
            &device,
            "mipmap-blit",
            MIPMAP_BLIT_SHADER_SOURCE,
            &[texture_entry(0), sampler_entry(1)],
        );
        let blit_pipeline = create_blit_pipeline(&device, &blit);

        Self {
            device,
            queue,
            encoder: None,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            bound: None,
            frame: None,
            state: RenderState::default(),
            next_texture: 0,
            next_framebuffer: 0,
            quad,
            target_sampler,
            blit_sampler,
            prepare,
            shade,
            blit,
            blit_pipeline,
            pipelines: HashMap::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Use `target` as the default framebuffer.
    pub fn set_frame_target(&mut self, target: FrameTarget) {
        self.frame = Some(target);
    }

    pub fn frame_target(&self) -> Option<&FrameTarget> {
        self.frame.as_ref()
    }

    /// Number of live textures, targets and elevation alike.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// `(width, height, mip_level_count)` of a live texture.
    pub fn texture_info(&self, texture: TextureId) -> Option<(u32, u32, u32)> {
        self.textures.get(&texture).map(|t| {
            (
                t.texture.width(),
                t.texture.height(),
                t.texture.mip_level_count(),
            )
        })
    }

    /// Submit everything recorded since the last submit.
    pub fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Submit pending work and read the main color target back as RGBA8 rows.
    pub fn read_frame(&mut self) -> Result<Vec<u8>, BackendError> {
        let frame = self.frame.as_ref().ok_or(BackendError::NoFrameTarget)?;
        let encoder = self.encoder.take();
        read_back(&self.device, &self.queue, encoder, &frame.color, 0)
    }

    /// Submit pending work and read one mip level of a render target back.
    pub fn read_texture(
        &mut self,
        texture: TextureId,
        mip_level: u32,
    ) -> Result<Vec<u8>, BackendError> {
        let gpu = self
            .textures
            .get(&texture)
            .ok_or(BackendError::UnknownTexture(texture))?;
        let encoder = self.encoder.take();
        read_back(&self.device, &self.queue, encoder, &gpu.texture, mip_level)
    }

    fn alloc_texture_id(&mut self) -> TextureId {
        self.next_texture += 1;
        TextureId(self.next_texture)
    }

    fn ensure_encoder(&mut self) {
        if self.encoder.is_none() {
            self.encoder = Some(self.device.create_command_encoder(
                &wgpu::CommandEncoderDescriptor {
                    label: Some("terrain-frame-encoder"),
                },
            ));
        }
    }

    fn draw(&mut self, program: Program, texture: TextureId, uniforms: &[u8]) {
        self.ensure_encoder();

        let Some((color, depth)) =
            bound_views(self.bound, &self.framebuffers, &self.textures, self.frame.as_ref())
        else {
            log::warn!("Dropping {} draw: nothing bound to draw into", program.name());
            return;
        };
        let Some(source) = self.textures.get(&texture) else {
            log::warn!("Dropping {} draw: unknown texture {texture:?}", program.name());
            return;
        };

        let layout = match program {
            Program::TerrainPrepare => &self.prepare,
            Program::Terrain => &self.shade,
        };
        let key = PipelineKey {
            program,
            state: self.state,
            depth: depth.is_some(),
        };
        let device = &self.device;
        let pipeline = self
            .pipelines
            .entry(key)
            .or_insert_with(|| create_program_pipeline(device, layout, key));

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("terrain-uniforms"),
            contents: uniforms,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&source.sample_view),
            },
        ];
        if program == Program::Terrain {
            entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&self.target_sampler),
            });
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.name()),
            layout: &layout.bind_group_layout,
            entries: &entries,
        });

        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let mut pass = begin_pass(
            encoder,
            program.name(),
            color,
            depth,
            wgpu::LoadOp::Load,
            wgpu::LoadOp::Load,
        );
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, self.quad.slice(..));
        pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
    }
}

impl TerrainBackend for WgpuBackend {
    fn create_texture(&mut self, width: u32, height: u32) -> TextureId {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("terrain-target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_level_count(width, height),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let attachment_view = texture.create_view(&wgpu::TextureViewDescriptor {
            base_mip_level: 0,
            mip_level_count: Some(1),
            ..Default::default()
        });

        let id = self.alloc_texture_id();
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                sample_view,
                attachment_view: Some(attachment_view),
            },
        );
        id
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        self.next_framebuffer += 1;
        let id = FramebufferId(self.next_framebuffer);
        self.framebuffers.insert(id, None);
        id
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId) {
        if !self.framebuffers.contains_key(&framebuffer) {
            log::warn!("Binding unknown framebuffer {framebuffer:?}");
        }
        self.bound = Some(framebuffer);
    }

    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId) {
        match self.framebuffers.get_mut(&framebuffer) {
            Some(slot) => *slot = Some(texture),
            None => log::warn!("Attaching {texture:?} to unknown framebuffer {framebuffer:?}"),
        }
    }

    fn bind_default_framebuffer(&mut self) {
        self.bound = None;
    }

    fn upload_elevation(&mut self, levels: &[ElevationLevel]) -> TextureId {
        let (width, height) = levels
            .first()
            .map_or((1, 1), |base| (base.width(), base.height()));
        let mip_count = (levels.len() as u32).clamp(1, mip_level_count(width, height));

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("terrain-elevation"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ELEVATION_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (mip, level) in levels.iter().enumerate().take(mip_count as usize) {
            let mip = mip as u32;
            let expected = ((width >> mip).max(1), (height >> mip).max(1));
            if (level.width(), level.height()) != expected {
                log::warn!(
                    "Elevation level {mip} is {}x{}, expected {}x{}; leaving it empty",
                    level.width(),
                    level.height(),
                    expected.0,
                    expected.1
                );
                continue;
            }

            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: mip,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                level.data(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(level.width() * 4),
                    rows_per_image: Some(level.height()),
                },
                wgpu::Extent3d {
                    width: level.width(),
                    height: level.height(),
                    depth_or_array_layers: 1,
                },
            );
        }

        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.alloc_texture_id();
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                sample_view,
                attachment_view: None,
            },
        );
        log::debug!("Uploaded {width}x{height} elevation texture ({mip_count} mips)");
        id
    }

    fn apply_render_state(&mut self, state: RenderState) {
        self.state = state;
    }

    fn clear(&mut self, color: [f32; 4], depth: f32) {
        self.ensure_encoder();
        let Some((color_view, depth_view)) =
            bound_views(self.bound, &self.framebuffers, &self.textures, self.frame.as_ref())
        else {
            log::warn!("Dropping clear: nothing bound");
            return;
        };
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };

        let clear_color = wgpu::Color {
            r: f64::from(color[0]),
            g: f64::from(color[1]),
            b: f64::from(color[2]),
            a: f64::from(color[3]),
        };
        let _pass = begin_pass(
            encoder,
            "terrain-clear",
            color_view,
            depth_view,
            wgpu::LoadOp::Clear(clear_color),
            wgpu::LoadOp::Clear(depth),
        );
    }

    fn draw_prepare(&mut self, elevation: TextureId, uniforms: &PrepareUniforms) {
        self.draw(Program::TerrainPrepare, elevation, bytemuck::bytes_of(uniforms));
    }

    fn generate_mipmaps(&mut self, texture: TextureId) {
        self.ensure_encoder();
        let Some(target) = self.textures.get(&texture) else {
            log::warn!("Cannot build mips for unknown texture {texture:?}");
            return;
        };
        if target.attachment_view.is_none() {
            log::warn!("Cannot build mips for non-renderable texture {texture:?}");
            return;
        }
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };

        for level in 1..target.texture.mip_level_count() {
            let src_view = target.texture.create_view(&wgpu::TextureViewDescriptor {
                base_mip_level: level - 1,
                mip_level_count: Some(1),
                ..Default::default()
            });
            let dst_view = target.texture.create_view(&wgpu::TextureViewDescriptor {
                base_mip_level: level,
                mip_level_count: Some(1),
                ..Default::default()
            });

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("mipmap-bind-group"),
                layout: &self.blit.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&src_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.blit_sampler),
                    },
                ],
            });

            let mut pass = begin_pass(
                encoder,
                "mipmap-pass",
                &dst_view,
                None,
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                wgpu::LoadOp::Load,
            );
            pass.set_pipeline(&self.blit_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
    }

    fn draw_shade(&mut self, image: TextureId, uniforms: &ShadeUniforms) {
        self.draw(Program::Terrain, image, bytemuck::bytes_of(uniforms));
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            log::warn!("Deleting unknown texture {texture:?}");
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        if self.bound == Some(framebuffer) {
            self.bound = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{RenderPass, TerrainLayer, TerrainPaint, TerrainRenderer};
    use crate::tile::{TerrainBucket, TerrainTile, TerrainTileCache};
    use glam::{Mat4, Vec3};
    use relief_dem::{TERRAIN_TILE_SIZE, TileCoord, decode_levels, pack_elevation};

    const FRAME_SIZE: u32 = 64;

    fn create_test_backend() -> Option<WgpuBackend> {
        let (device, queue) = create_test_device_queue()?;
        let mut backend = WgpuBackend::new(device, queue);
        let frame = FrameTarget::new(backend.device(), FRAME_SIZE, FRAME_SIZE);
        backend.set_frame_target(frame);
        Some(backend)
    }

    fn bucket_from(height: impl Fn(usize, usize) -> f32) -> TerrainBucket {
        let side = (TERRAIN_TILE_SIZE * 2) as usize;
        let grid: Vec<f32> = (0..side * side).map(|i| height(i % side, i / side)).collect();
        TerrainBucket::new(pack_elevation(&grid, TERRAIN_TILE_SIZE).expect("valid grid"))
    }

    fn full_screen(_: &TileCoord) -> Mat4 {
        Mat4::from_translation(Vec3::new(-1.0, -1.0, 0.0))
            * Mat4::from_scale(Vec3::new(2.0, 2.0, 1.0))
    }

    fn render_one(backend: WgpuBackend, bucket: TerrainBucket) -> (WgpuBackend, Vec<u8>) {
        let coord = TileCoord::new(12, 0, 0);
        let mut cache = TerrainTileCache::new();
        cache.insert(TerrainTile::new(coord).with_bucket("terrain", bucket));
        let layer = TerrainLayer::new("terrain", TerrainPaint::default());

        let mut renderer = TerrainRenderer::new(backend);
        let stats = renderer.draw_terrain(
            &mut cache,
            &layer,
            &[coord],
            &full_screen,
            RenderPass::Translucent,
        );
        assert_eq!(stats.drawn, 1);

        let mut backend = renderer.into_backend();
        let pixels = backend.read_frame().expect("readback");
        (backend, pixels)
    }

    #[test]
    fn test_mip_level_count_calculation() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(512, 512), 10);
        assert_eq!(mip_level_count(512, 256), 10);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_compare_function_mapping() {
        assert_eq!(compare_function(DepthFunc::Less), wgpu::CompareFunction::Less);
        assert_eq!(compare_function(DepthFunc::Always), wgpu::CompareFunction::Always);
    }

    #[test]
    fn test_upload_elevation_builds_full_chain() {
        let Some(mut backend) = create_test_backend() else {
            return;
        };
        let bucket = bucket_from(|_, _| 0.0);
        let levels = decode_levels(bucket.terrain_array()).expect("decodes");

        let id = backend.upload_elevation(&levels);
        assert_eq!(backend.texture_info(id), Some((512, 512, 10)));
    }

    #[test]
    fn test_flat_tile_shades_to_transparent() {
        let Some(backend) = create_test_backend() else {
            return;
        };
        let (_, pixels) = render_one(backend, bucket_from(|_, _| 250.0));

        // 8-bit storage of a zero derivative leaves a hint of slope.
        assert_eq!(pixels.len(), (FRAME_SIZE * FRAME_SIZE * 4) as usize);
        assert!(pixels.chunks_exact(4).all(|px| px[3] <= 4));
    }

    #[test]
    fn test_sloped_tile_produces_shading() {
        let Some(backend) = create_test_backend() else {
            return;
        };
        let (_, pixels) = render_one(backend, bucket_from(|x, _| x as f32 * 10.0));

        assert!(pixels.chunks_exact(4).any(|px| px[3] > 32));
    }

    #[test]
    fn test_prepared_target_has_mip_chain() {
        let Some(backend) = create_test_backend() else {
            return;
        };
        let mut renderer = TerrainRenderer::new(backend);
        let coord = TileCoord::new(12, 0, 0);
        let mut cache = TerrainTileCache::new();
        cache.insert(TerrainTile::new(coord).with_bucket("terrain", bucket_from(|_, _| 0.0)));
        let layer = TerrainLayer::new("terrain", TerrainPaint::default());
        renderer.draw_terrain(
            &mut cache,
            &layer,
            &[coord],
            &full_screen,
            RenderPass::Translucent,
        );

        let target = renderer.pool().viewport_texture().expect("target released");
        let backend = renderer.backend_mut();
        assert_eq!(backend.texture_info(target), Some((256, 256, 9)));

        // Flat ground has zero derivative, encoded as 0.5 in RG.
        let smallest = backend.read_texture(target, 8).expect("readback");
        assert_eq!(smallest.len(), 4);
        assert!((i32::from(smallest[0]) - 128).abs() <= 1);
        assert!((i32::from(smallest[1]) - 128).abs() <= 1);
    }

    #[test]
    fn test_read_unknown_texture_fails() {
        let Some(mut backend) = create_test_backend() else {
            return;
        };
        assert!(matches!(
            backend.read_texture(TextureId(999), 0),
            Err(BackendError::UnknownTexture(TextureId(999)))
        ));
    }
}
