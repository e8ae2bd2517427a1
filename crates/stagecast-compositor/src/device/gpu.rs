use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::math::ColumnMajor;

use super::context::{
    BufferId, GraphicsContext, ProgramId, ProgramLayout, QuadDraw, ShaderId, ShaderStage,
    SharedTextureExt, TextureDesc, TextureFilter, TextureId, TextureWrap, Uniform,
};
use super::init::WgpuInit;
use super::share::{RegistryShare, SharedTextureRegistry};
use super::surface::{choose_surface_format, map_surface_error, SurfaceErrorAction};

/// Camera uniform shared by the fixed quad shaders (`Camera` in `quad_vs.wgsl`).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct CameraUniform {
    projection: [f32; 16],
    view: [f32; 16],
}

const CAMERA_UNIFORM_SIZE: u64 = std::mem::size_of::<CameraUniform>() as u64;
const SHARED_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct QuadProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    camera: CameraUniform,
    camera_ubo: wgpu::Buffer,
    /// One bind group per sampled texture; evicted when the texture is deleted.
    bind_groups: HashMap<TextureId, wgpu::BindGroup>,
}

struct QuadTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

/// wgpu implementation of [`GraphicsContext`], presenting into a winit window.
///
/// Shaders are WGSL. Bindings are fixed: camera uniform at binding 0, texture at
/// binding 1, sampler at binding 2 of group 0.
pub struct WgpuContext {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    clear: wgpu::Color,

    next_id: u32,
    shaders: HashMap<ShaderId, wgpu::ShaderModule>,
    programs: HashMap<ProgramId, QuadProgram>,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    textures: HashMap<TextureId, QuadTexture>,
    share: RegistryShare,
}

impl WgpuContext {
    /// Creates a device and swapchain bound to `window`.
    pub async fn new(
        window: Arc<Window>,
        init: &WgpuInit,
        registry: SharedTextureRegistry,
    ) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("stagecast device"),
                required_features: wgpu::Features::empty(),
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps, init.prefer_srgb)
            .context("no supported surface formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: init.present_mode,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };

        // A minimized window has no drawable; configuration waits for set_viewport.
        if size.width > 0 && size.height > 0 {
            surface.configure(&device, &config);
        }

        log::debug!(
            "wgpu context ready: {:?} {}x{} ({:?})",
            adapter.get_info().backend,
            config.width,
            config.height,
            format
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            clear: wgpu::Color::BLACK,
            next_id: 1,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            share: RegistryShare::new(registry),
        })
    }

    fn alloc(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn acquire_frame(&mut self) -> Option<wgpu::SurfaceTexture> {
        match self.surface.get_current_texture() {
            Ok(frame) => Some(frame),
            Err(err) => {
                match map_surface_error(&err) {
                    SurfaceErrorAction::Reconfigure => {
                        if self.config.width > 0 && self.config.height > 0 {
                            self.surface.configure(&self.device, &self.config);
                        }
                    }
                    SurfaceErrorAction::SkipFrame => log::debug!("frame skipped: {err}"),
                    SurfaceErrorAction::Fatal => log::error!("swapchain failure: {err}"),
                }
                None
            }
        }
    }

    fn ensure_bind_group(&mut self, program: ProgramId, texture: TextureId) {
        let Some(tex) = self.textures.get(&texture) else { return };
        let Some(program) = self.programs.get_mut(&program) else { return };
        if program.bind_groups.contains_key(&texture) {
            return;
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stagecast quad bind group"),
            layout: &program.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: program.camera_ubo.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&tex.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&tex.sampler),
                },
            ],
        });
        program.bind_groups.insert(texture, bind_group);
    }

    fn create_program(
        &self,
        vs: &wgpu::ShaderModule,
        fs: &wgpu::ShaderModule,
        layout: &ProgramLayout,
    ) -> QuadProgram {
        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("stagecast quad bgl"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::VERTEX,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: wgpu::BufferSize::new(CAMERA_UNIFORM_SIZE),
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ],
                });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("stagecast quad pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let position_attrs = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 0,
            shader_location: layout.position_location,
        }];
        let uv_attrs = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 0,
            shader_location: layout.uv_location,
        }];
        let buffers = [
            wgpu::VertexBufferLayout {
                array_stride: 3 * std::mem::size_of::<f32>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &position_attrs,
            },
            wgpu::VertexBufferLayout {
                array_stride: 2 * std::mem::size_of::<f32>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &uv_attrs,
            },
        ];

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("stagecast quad pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vs,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: fs,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
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
                multiview_mask: None,
                cache: None,
            });

        let camera = CameraUniform::zeroed();
        let camera_ubo = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("stagecast camera ubo"),
                contents: bytemuck::bytes_of(&camera),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        QuadProgram {
            pipeline,
            bind_group_layout,
            camera,
            camera_ubo,
            bind_groups: HashMap::new(),
        }
    }

    fn vertex_buffer(&self, data: &[f32]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("stagecast quad vbo"),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            })
    }
}

impl GraphicsContext for WgpuContext {
    /// Reconfigures the swapchain. A 0x0 size is recorded but configuration is
    /// deferred, since wgpu cannot configure an empty surface.
    fn set_viewport(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = wgpu::Color {
            r: f64::from(rgba[0]),
            g: f64::from(rgba[1]),
            b: f64::from(rgba[2]),
            a: f64::from(rgba[3]),
        };
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(match stage {
                    ShaderStage::Vertex => "stagecast quad vs",
                    ShaderStage::Fragment => "stagecast quad fs",
                }),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| m.message_type == wgpu::CompilationMessageType::Error)
            .map(|m| m.message.clone())
            .collect();
        if !errors.is_empty() {
            return Err(errors.join("\n"));
        }

        let id = ShaderId(self.alloc());
        self.shaders.insert(id, module);
        Ok(id)
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &ProgramLayout,
    ) -> Result<ProgramId, String> {
        if layout.sampler_unit != 0 {
            return Err(format!(
                "wgpu backend samples from unit 0 only (asked for {})",
                layout.sampler_unit
            ));
        }
        let vs = self
            .shaders
            .get(&vertex)
            .ok_or_else(|| format!("unknown vertex shader {vertex:?}"))?;
        let fs = self
            .shaders
            .get(&fragment)
            .ok_or_else(|| format!("unknown fragment shader {fragment:?}"))?;

        let program = self.create_program(vs, fs, layout);
        let id = ProgramId(self.alloc());
        self.programs.insert(id, program);
        Ok(id)
    }

    fn set_uniform_matrix(&mut self, program: ProgramId, uniform: Uniform, value: &ColumnMajor) {
        let Some(program) = self.programs.get_mut(&program) else { return };
        match uniform {
            Uniform::Projection => program.camera.projection = *value,
            Uniform::View => program.camera.view = *value,
        }
        self.queue
            .write_buffer(&program.camera_ubo, 0, bytemuck::bytes_of(&program.camera));
    }

    fn create_buffer(&mut self, data: &[f32]) -> BufferId {
        let buffer = self.vertex_buffer(data);
        let id = BufferId(self.alloc());
        self.buffers.insert(id, buffer);
        id
    }

    fn update_buffer(&mut self, buffer: BufferId, data: &[f32]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        match self.buffers.get(&buffer) {
            Some(existing) if existing.size() == bytes.len() as u64 => {
                self.queue.write_buffer(existing, 0, bytes);
            }
            Some(_) => {
                let replacement = self.vertex_buffer(data);
                if let Some(old) = self.buffers.insert(buffer, replacement) {
                    old.destroy();
                }
            }
            None => log::debug!("update of unknown buffer {buffer:?} ignored"),
        }
    }

    fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn create_texture(&mut self, desc: &TextureDesc, rgba: &[u8]) -> Result<TextureId, String> {
        let max = self.max_texture_size();
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(format!(
                "{}x{} is outside the supported texture size (max {max})",
                desc.width, desc.height
            ));
        }
        if rgba.len() != desc.width as usize * desc.height as usize * 4 {
            return Err(format!("{} bytes do not fill {}x{}", rgba.len(), desc.width, desc.height));
        }

        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("stagecast shared texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHARED_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * 4),
                rows_per_image: Some(desc.height),
            },
            size,
        );

        let filter = match desc.filter {
            TextureFilter::Nearest => wgpu::FilterMode::Nearest,
            TextureFilter::Linear => wgpu::FilterMode::Linear,
        };
        let address = match desc.wrap {
            TextureWrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            TextureWrap::Repeat => wgpu::AddressMode::Repeat,
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("stagecast shared sampler"),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let id = TextureId(self.alloc());
        if self.share.share_next {
            let handle = self.share.registry.register(
                texture.clone(),
                self.queue.clone(),
                desc.width,
                desc.height,
            );
            self.share.handles.insert(id, handle);
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(
            id,
            QuadTexture {
                texture,
                view,
                sampler,
            },
        );
        Ok(id)
    }

    fn draw_quad(&mut self, draw: &QuadDraw) {
        self.ensure_bind_group(draw.program, draw.texture);
        let Some(frame) = self.acquire_frame() else { return };

        let (Some(program), Some(positions), Some(uvs)) = (
            self.programs.get(&draw.program),
            self.buffers.get(&draw.positions),
            self.buffers.get(&draw.uvs),
        ) else {
            log::debug!("quad draw references released objects; skipped");
            return;
        };
        let Some(bind_group) = program.bind_groups.get(&draw.texture) else { return };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("stagecast quad encoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("stagecast quad pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            rpass.set_pipeline(&program.pipeline);
            rpass.set_bind_group(0, bind_group, &[]);
            rpass.set_vertex_buffer(0, positions.slice(..));
            rpass.set_vertex_buffer(1, uvs.slice(..));
            rpass.draw(0..draw.vertex_count, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.share.forget(texture);
        for program in self.programs.values_mut() {
            program.bind_groups.remove(&texture);
        }
        if let Some(tex) = self.textures.remove(&texture) {
            tex.texture.destroy();
        }
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(program) = self.programs.remove(&program) {
            program.camera_ubo.destroy();
        }
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn sharing(&mut self) -> Option<&mut dyn SharedTextureExt> {
        Some(&mut self.share)
    }
}
