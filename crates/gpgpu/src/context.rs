//! GPU context and device management.

use crate::config::ComputeConfig;
use crate::device::{DrawCall, FramebufferStatus, ProgramInterface, RasterDevice};
use crate::pipeline::{QuadVertex, FULL_SCREEN_QUAD};
use crate::shaders::{FIRST_TEXTURE_BINDING, FRAGMENT_ENTRY, SAMPLER_BINDING, UNIFORM_BINDING, VERTEX_ENTRY};
use crate::texture::{data_sampler, wgpu_format, GpuTexture, RenderTarget};
use common::{GpgpuError, GpgpuResult, ShaderStage, TexelFormat, TextureShape};
use futures::executor::block_on;
use once_cell::sync::OnceCell;
use thiserror::Error;
use wgpu::util::DeviceExt;
use wgpu::{Adapter, Device, Instance, Queue};

/// Errors that can occur while acquiring a device.
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to request device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

impl From<GpuError> for GpgpuError {
    fn from(err: GpuError) -> Self {
        GpgpuError::device(err.to_string())
    }
}

/// Headless GPU context holding all wgpu resources.
pub struct GpuContext {
    /// wgpu instance.
    pub instance: Instance,
    /// GPU adapter.
    pub adapter: Adapter,
    /// GPU device.
    pub device: Device,
    /// Command queue.
    pub queue: Queue,
    max_texture_dimension: u32,
    sampler: OnceCell<wgpu::Sampler>,
    quad: OnceCell<wgpu::Buffer>,
}

/// A compiled WGSL stage.
pub struct WgpuShader {
    pub module: wgpu::ShaderModule,
    pub stage: ShaderStage,
}

/// A linked kernel program: render pipeline plus the layout of its
/// uniform, sampler and input bindings.
///
/// `pipeline` is `None` when the adapter cannot render into the target
/// format. Such a program can never be drawn; the output framebuffer check
/// rejects the dispatch first.
pub struct WgpuProgram {
    pub pipeline: Option<wgpu::RenderPipeline>,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub input_count: usize,
}

impl GpuContext {
    /// Create a new GPU context with default settings.
    pub async fn new() -> Result<Self, GpuError> {
        GpuContextBuilder::new().build().await
    }

    /// Create a context as described by `config`.
    pub async fn from_config(config: &ComputeConfig) -> Result<Self, GpuError> {
        GpuContextBuilder::from_config(config).build().await
    }

    /// Create a command encoder.
    pub fn create_command_encoder(&self) -> wgpu::CommandEncoder {
        self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Kernel Command Encoder"),
        })
    }

    /// Submit commands to the queue.
    pub fn submit(&self, commands: impl IntoIterator<Item = wgpu::CommandBuffer>) {
        self.queue.submit(commands);
    }

    /// Get device limits.
    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Get adapter info.
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Poll the device for completed operations.
    pub fn poll(&self, maintain: wgpu::Maintain) -> bool {
        self.device.poll(maintain).is_queue_empty()
    }

    /// Whether the adapter can use textures of `format` as color attachments.
    pub fn renders_to(&self, format: TexelFormat) -> bool {
        self.adapter
            .get_texture_format_features(wgpu_format(format))
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
    }

    fn sampler(&self) -> &wgpu::Sampler {
        self.sampler.get_or_init(|| data_sampler(self))
    }

    fn quad_buffer(&self) -> &wgpu::Buffer {
        self.quad.get_or_init(|| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Full Screen Quad"),
                contents: bytemuck::cast_slice(&FULL_SCREEN_QUAD),
                usage: wgpu::BufferUsages::VERTEX,
            })
        })
    }

    /// Run `f` and return the first validation error it raised.
    fn validated<T>(&self, f: impl FnOnce() -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        match block_on(self.device.pop_error_scope()) {
            Some(error) => Err(error.to_string()),
            None => Ok(value),
        }
    }
}

impl RasterDevice for GpuContext {
    type Texture = GpuTexture;
    type Shader = WgpuShader;
    type Program = WgpuProgram;
    type Framebuffer = RenderTarget;

    fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    fn create_texture(
        &self,
        shape: TextureShape,
        format: TexelFormat,
        texels: &[u8],
    ) -> GpgpuResult<GpuTexture> {
        self.validated(|| GpuTexture::new(self, shape, format, texels))
            .map_err(GpgpuError::device)
    }

    fn write_texture(&self, texture: &GpuTexture, texels: &[u8]) -> GpgpuResult<()> {
        self.validated(|| texture.write(self, texels))
            .map_err(GpgpuError::device)
    }

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<WgpuShader, String> {
        let label = match stage {
            ShaderStage::Vertex => "Kernel Vertex Shader",
            ShaderStage::Fragment => "Kernel Fragment Shader",
        };

        let module = self.validated(|| {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })?;

        Ok(WgpuShader { module, stage })
    }

    fn link_program(
        &self,
        vertex: &WgpuShader,
        fragment: &WgpuShader,
        interface: &ProgramInterface,
    ) -> Result<WgpuProgram, String> {
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err(format!(
                "expected vertex and fragment stages, got {} and {}",
                vertex.stage, fragment.stage
            ));
        }

        self.validated(|| {
            let mut entries = vec![
                wgpu::BindGroupLayoutEntry {
                    binding: UNIFORM_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: SAMPLER_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ];
            entries.extend((0..interface.input_count).map(|index| wgpu::BindGroupLayoutEntry {
                binding: FIRST_TEXTURE_BINDING + index as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }));

            let bind_group_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Kernel Bind Group Layout"),
                entries: &entries,
            });

            let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Kernel Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            if !self.renders_to(interface.target_format) {
                tracing::debug!(
                    "{:?} is not renderable on this adapter, skipping pipeline creation",
                    interface.target_format
                );
                return WgpuProgram {
                    pipeline: None,
                    bind_group_layout,
                    input_count: interface.input_count,
                };
            }

            let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Kernel Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: VERTEX_ENTRY,
                    buffers: &[QuadVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment.module,
                    entry_point: FRAGMENT_ENTRY,
                    targets: &[Some(wgpu::ColorTargetState {
                        format: wgpu_format(interface.target_format),
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

            WgpuProgram {
                pipeline: Some(pipeline),
                bind_group_layout,
                input_count: interface.input_count,
            }
        })
    }

    fn create_framebuffer(&self, color: &GpuTexture) -> RenderTarget {
        RenderTarget::new(color)
    }

    fn framebuffer_status(&self, framebuffer: &RenderTarget) -> FramebufferStatus {
        if !self.renders_to(framebuffer.format) {
            return FramebufferStatus::Unsupported;
        }
        if framebuffer.shape.area() == 0
            || !framebuffer.texture.usage().contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        {
            return FramebufferStatus::IncompleteAttachment;
        }

        FramebufferStatus::Complete
    }

    fn draw(&self, call: &DrawCall<'_, Self>) -> GpgpuResult<()> {
        let pipeline = call
            .program
            .pipeline
            .as_ref()
            .ok_or(GpgpuError::IncompleteFramebuffer)?;
        if call.units.len() != call.program.input_count {
            return Err(GpgpuError::device(format!(
                "program expects {} inputs, {} bound",
                call.program.input_count,
                call.units.len()
            )));
        }

        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Kernel Uniforms"),
            contents: bytemuck::bytes_of(&call.uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: UNIFORM_BINDING,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: SAMPLER_BINDING,
                resource: wgpu::BindingResource::Sampler(self.sampler()),
            },
        ];
        for unit in &call.units {
            tracing::trace!("Binding {} to texture unit {}", unit.sampler, unit.unit);
            entries.push(wgpu::BindGroupEntry {
                binding: FIRST_TEXTURE_BINDING + unit.unit,
                resource: wgpu::BindingResource::TextureView(&unit.texture.view),
            });
        }

        let shape = call.viewport;
        self.validated(|| {
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Kernel Bind Group"),
                layout: &call.program.bind_group_layout,
                entries: &entries,
            });

            let mut encoder = self.create_command_encoder();
            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Kernel Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &call.framebuffer.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });

                render_pass.set_viewport(0.0, 0.0, shape.width as f32, shape.height as f32, 0.0, 1.0);
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.quad_buffer().slice(..));
                render_pass.draw(0..FULL_SCREEN_QUAD.len() as u32, 0..1);
            }

            self.submit(std::iter::once(encoder.finish()));
        })
        .map_err(GpgpuError::device)
    }

    fn read_pixels(&self, framebuffer: &RenderTarget) -> GpgpuResult<Vec<f32>> {
        let shape = framebuffer.shape;
        let unpadded_bytes_per_row = shape.width * framebuffer.format.bytes_per_texel() as u32;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size: padded_bytes_per_row as u64 * shape.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.create_command_encoder();
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &framebuffer.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(shape.height),
                },
            },
            wgpu::Extent3d {
                width: shape.width,
                height: shape.height,
                depth_or_array_layers: 1,
            },
        );
        self.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.poll(wgpu::Maintain::Wait);

        block_on(receiver)
            .map_err(|_| GpgpuError::device("readback mapping was cancelled"))?
            .map_err(|err| GpgpuError::device(err.to_string()))?;

        let mut texels = Vec::with_capacity(unpadded_bytes_per_row as usize * shape.height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded_bytes_per_row as usize) {
                texels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
            }
        }
        staging.unmap();

        Ok(framebuffer.format.decode(&texels))
    }
}

/// Builder for GPU context configuration.
pub struct GpuContextBuilder {
    backends: wgpu::Backends,
    power_preference: wgpu::PowerPreference,
    limits: Option<wgpu::Limits>,
    max_texture_dimension: Option<u32>,
}

impl GpuContextBuilder {
    pub fn new() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            limits: None,
            max_texture_dimension: None,
        }
    }

    pub fn from_config(config: &ComputeConfig) -> Self {
        let mut builder = Self::new()
            .backends(config.backend.backends())
            .power_preference(config.power_preference());
        builder.max_texture_dimension = config.max_texture_dimension;
        builder
    }

    /// Set the backends to use.
    pub fn backends(mut self, backends: wgpu::Backends) -> Self {
        self.backends = backends;
        self
    }

    /// Set power preference.
    pub fn power_preference(mut self, preference: wgpu::PowerPreference) -> Self {
        self.power_preference = preference;
        self
    }

    /// Set device limits. Defaults to everything the adapter supports.
    pub fn limits(mut self, limits: wgpu::Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Lay buffers out as if textures could be at most `max` texels wide
    /// or tall.
    pub fn max_texture_dimension(mut self, max: u32) -> Self {
        self.max_texture_dimension = Some(max);
        self
    }

    /// Build the GPU context.
    pub async fn build(self) -> Result<GpuContext, GpuError> {
        let instance = Instance::new(wgpu::InstanceDescriptor {
            backends: self.backends,
            dx12_shader_compiler: Default::default(),
            flags: wgpu::InstanceFlags::default(),
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: self.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let limits = self.limits.unwrap_or_else(|| adapter.limits());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Kernel Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let device_max = device.limits().max_texture_dimension_2d;
        let max_texture_dimension = self
            .max_texture_dimension
            .map_or(device_max, |cap| cap.min(device_max));

        let info = adapter.get_info();
        tracing::info!(
            "Using {} ({:?}), max texture dimension {}",
            info.name,
            info.backend,
            max_texture_dimension
        );

        Ok(GpuContext {
            instance,
            adapter,
            device,
            queue,
            max_texture_dimension,
            sampler: OnceCell::new(),
            quad: OnceCell::new(),
        })
    }
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
