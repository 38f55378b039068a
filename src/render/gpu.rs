use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::bytes_of;
use half::f16;
use log::{debug, info, warn};
use wgpu::util::DeviceExt;
use winit::window::{Window, WindowId};

use super::shaders;
use super::uniforms::{GlobalUniform, MaterialUniform, MeshUniform, ObjectTransform};
use super::FrameTarget;
use crate::environment::EnvironmentMap;
use crate::geometry::{Geometry, VERTEX_STRIDE};
use crate::materials::{Material, TextureImage};
use crate::scene::{MeshInstance, NodeId, SceneGraph};
use crate::ui::UiFrame;
use crate::viewport::{clamp_pixel_ratio, drawing_buffer_size, effective_pixel_ratio};

/// wgpu renderer drawing the environment background, the scene meshes and
/// the debug overlay into a window surface.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    logical_size: (u32, u32),
    pixel_ratio: f64,
    encode_srgb: bool,
    depth: DepthBuffer,
    background_pipeline: wgpu::RenderPipeline,
    mesh_pipeline: wgpu::RenderPipeline,
    global_layout: wgpu::BindGroupLayout,
    mesh_layout: wgpu::BindGroupLayout,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    bound_cubes: (usize, usize),
    environment_sampler: wgpu::Sampler,
    material_sampler: wgpu::Sampler,
    fallback_cube: CubeTexture,
    white_texture: wgpu::TextureView,
    cubes: HashMap<usize, (Arc<EnvironmentMap>, CubeTexture)>,
    geometries: HashMap<usize, (Arc<Geometry>, MeshBuffers)>,
    textures: HashMap<usize, (Arc<TextureImage>, wgpu::TextureView)>,
    meshes: HashMap<NodeId, MeshBinding>,
    overlay: egui_wgpu::Renderer,
}

/// Key of the fallback cube in `bound_cubes`.
const NO_CUBE: usize = 0;

impl Renderer {
    /// Creates the surface, device and pipelines for `window`.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let physical = window.inner_size();
        let pixel_ratio = clamp_pixel_ratio(window.scale_factor());
        let logical = physical.to_logical::<f64>(window.scale_factor());
        let logical_size = (
            (logical.width.round() as u32).max(1),
            (logical.height.round() as u32).max(1),
        );

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("using GPU adapter {:?}", adapter.get_info().name);

        let base_limits = if cfg!(target_arch = "wasm32") {
            wgpu::Limits::downlevel_webgl2_defaults()
        } else {
            wgpu::Limits::downlevel_defaults()
        };
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("viewer-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: base_limits.using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        let encode_srgb = !surface_format.is_srgb();
        let (width, height) = surface_extent(&window, logical_size, pixel_ratio);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);
        let depth = DepthBuffer::create(&device, config.width, config.height);

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global-bind-layout"),
            entries: &[
                uniform_entry(0, std::mem::size_of::<GlobalUniform>()),
                texture_entry(1, wgpu::TextureViewDimension::Cube),
                texture_entry(2, wgpu::TextureViewDimension::Cube),
                sampler_entry(3),
            ],
        });
        let mesh_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mesh-bind-layout"),
            entries: &[
                uniform_entry(0, std::mem::size_of::<MeshUniform>()),
                texture_entry(1, wgpu::TextureViewDimension::D2),
                texture_entry(2, wgpu::TextureViewDimension::D2),
                sampler_entry(3),
            ],
        });

        let background_pipeline = create_background_pipeline(&device, &global_layout, surface_format);
        let mesh_pipeline =
            create_mesh_pipeline(&device, &global_layout, &mesh_layout, surface_format);

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let environment_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("environment-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let fallback_cube = CubeTexture::black(&device, &queue);
        let white_texture = upload_texture(
            &device,
            &queue,
            &TextureImage {
                width: 1,
                height: 1,
                rgba: vec![255; 4],
                srgb: false,
            },
            "white-texture",
        );
        let global_bind_group = create_global_bind_group(
            &device,
            &global_layout,
            &global_buffer,
            &fallback_cube.view,
            &fallback_cube.view,
            &environment_sampler,
        );

        let overlay = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            logical_size,
            pixel_ratio,
            encode_srgb,
            depth,
            background_pipeline,
            mesh_pipeline,
            global_layout,
            mesh_layout,
            global_buffer,
            global_bind_group,
            bound_cubes: (NO_CUBE, NO_CUBE),
            environment_sampler,
            material_sampler,
            fallback_cube,
            white_texture,
            cubes: HashMap::new(),
            geometries: HashMap::new(),
            textures: HashMap::new(),
            meshes: HashMap::new(),
            overlay,
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    fn reconfigure(&mut self) {
        let (width, height) = surface_extent(&self.window, self.logical_size, self.pixel_ratio);
        if (width, height) == (self.config.width, self.config.height) {
            return;
        }
        debug!("configuring surface at {width}x{height}");
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, width, height);
    }

    /// Uploads the environment cubes the scene points at and rebinds them when
    /// they change. Cubes no longer referenced are released.
    fn sync_environment(&mut self, scene: &SceneGraph) {
        let environment = self.ensure_cube(scene.environment.as_ref());
        let background = self.ensure_cube(scene.background.as_ref());
        if (environment, background) == self.bound_cubes {
            return;
        }
        let view = |key: usize| {
            self.cubes
                .get(&key)
                .map_or(&self.fallback_cube.view, |(_, cube)| &cube.view)
        };
        self.global_bind_group = create_global_bind_group(
            &self.device,
            &self.global_layout,
            &self.global_buffer,
            view(environment),
            view(background),
            &self.environment_sampler,
        );
        self.bound_cubes = (environment, background);
        self.cubes
            .retain(|key, _| *key == environment || *key == background);
    }

    fn ensure_cube(&mut self, map: Option<&Arc<EnvironmentMap>>) -> usize {
        let Some(map) = map else {
            return NO_CUBE;
        };
        let key = Arc::as_ptr(map) as usize;
        if !self.cubes.contains_key(&key) {
            let cube = CubeTexture::upload(&self.device, &self.queue, map);
            self.cubes.insert(key, (Arc::clone(map), cube));
        }
        key
    }

    fn ensure_texture(&mut self, image: &Arc<TextureImage>) -> usize {
        let key = Arc::as_ptr(image) as usize;
        if !self.textures.contains_key(&key) {
            let view = upload_texture(&self.device, &self.queue, image, "material-texture");
            self.textures.insert(key, (Arc::clone(image), view));
        }
        key
    }

    /// Uploads geometry and textures on first sight and refreshes the mesh
    /// uniform. The material block is only rewritten when flagged.
    fn prepare_mesh(&mut self, instance: &MeshInstance<'_>) {
        let geometry = &instance.mesh.geometry;
        if geometry.indices.is_empty() {
            return;
        }
        let geometry_key = Arc::as_ptr(geometry) as usize;
        if !self.geometries.contains_key(&geometry_key) {
            let buffers = MeshBuffers::from_geometry(&self.device, geometry);
            self.geometries
                .insert(geometry_key, (Arc::clone(geometry), buffers));
        }

        let (base_color, metallic_roughness) = match &instance.mesh.material {
            Material::Standard(material) => (
                material.base_color_texture.as_ref(),
                material.metallic_roughness_texture.as_ref(),
            ),
            Material::Basic(_) => (None, None),
        };
        let texture_keys = (
            base_color.map(|image| self.ensure_texture(image)),
            metallic_roughness.map(|image| self.ensure_texture(image)),
        );

        let transform = ObjectTransform::new(instance.world);
        if let Some(binding) = self.meshes.get(&instance.id) {
            if binding.geometry_key == geometry_key && binding.texture_keys == texture_keys {
                self.queue
                    .write_buffer(&binding.uniform, 0, bytes_of(&transform));
                if instance.mesh.material.needs_update() {
                    let material = MaterialUniform::new(&instance.mesh.material);
                    self.queue.write_buffer(
                        &binding.uniform,
                        MeshUniform::MATERIAL_OFFSET,
                        bytes_of(&material),
                    );
                }
                return;
            }
        }

        let uniform = MeshUniform {
            transform,
            material: MaterialUniform::new(&instance.mesh.material),
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh-uniform"),
                contents: bytes_of(&uniform),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let texture_view = |key: Option<usize>| {
            key.and_then(|key| self.textures.get(&key))
                .map_or(&self.white_texture, |(_, view)| view)
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mesh-bind-group"),
            layout: &self.mesh_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(texture_view(texture_keys.0)),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(texture_view(texture_keys.1)),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.material_sampler),
                },
            ],
        });
        self.meshes.insert(
            instance.id,
            MeshBinding {
                uniform: buffer,
                bind_group,
                geometry_key,
                texture_keys,
            },
        );
    }

    fn draw_overlay(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        frame: &UiFrame,
    ) -> Vec<wgpu::CommandBuffer> {
        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: frame.pixels_per_point,
        };
        for (id, delta) in &frame.textures_delta.set {
            self.overlay
                .update_texture(&self.device, &self.queue, *id, delta);
        }
        let commands = self.overlay.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &frame.primitives,
            &screen,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("overlay-pass"),
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
                })
                .forget_lifetime();
            self.overlay.render(&mut pass, &frame.primitives, &screen);
        }
        for id in &frame.textures_delta.free {
            self.overlay.free_texture(id);
        }
        commands
    }
}

impl FrameTarget for Renderer {
    fn set_size(&mut self, width: u32, height: u32) {
        self.logical_size = (width.max(1), height.max(1));
        self.reconfigure();
    }

    fn set_pixel_ratio(&mut self, ratio: f64) {
        self.pixel_ratio = ratio;
        self.reconfigure();
    }

    fn size(&self) -> (u32, u32) {
        self.logical_size
    }

    /// Ratio the surface is actually configured with. Natively this is the
    /// window's scale factor even above the cap.
    fn pixel_ratio(&self) -> f64 {
        effective_pixel_ratio(self.config.width, self.logical_size.0)
    }

    fn render(&mut self, scene: &SceneGraph, overlay: Option<&UiFrame>) -> Result<()> {
        self.sync_environment(scene);
        let globals = GlobalUniform::from_scene(scene, self.encode_srgb);
        self.queue
            .write_buffer(&self.global_buffer, 0, bytes_of(&globals));
        let instances = scene.mesh_instances();
        for instance in &instances {
            self.prepare_mesh(instance);
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(anyhow!("GPU is out of memory"));
            }
            Err(err) => {
                warn!("skipping frame: {err}");
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_bind_group(0, &self.global_bind_group, &[]);
            pass.set_pipeline(&self.background_pipeline);
            pass.draw(0..3, 0..1);

            pass.set_pipeline(&self.mesh_pipeline);
            for instance in &instances {
                let Some(binding) = self.meshes.get(&instance.id) else {
                    continue;
                };
                let Some((_, buffers)) = self.geometries.get(&binding.geometry_key) else {
                    continue;
                };
                pass.set_bind_group(1, &binding.bind_group, &[]);
                pass.set_vertex_buffer(0, buffers.vertex.slice(..));
                pass.set_index_buffer(buffers.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..buffers.index_count, 0, 0..1);
            }
        }

        let overlay_commands = match overlay {
            Some(frame) => self.draw_overlay(&mut encoder, &view, frame),
            None => Vec::new(),
        };
        self.queue.submit(
            overlay_commands
                .into_iter()
                .chain(std::iter::once(encoder.finish())),
        );
        output.present();
        Ok(())
    }
}

/// Drawing-buffer size for the surface. Native swapchains must match the
/// window, so above the pixel-ratio cap the window's physical size wins.
fn surface_extent(window: &Window, logical: (u32, u32), pixel_ratio: f64) -> (u32, u32) {
    let wanted = drawing_buffer_size(logical.0, logical.1, pixel_ratio);
    if cfg!(target_arch = "wasm32") {
        return wanted;
    }
    let physical = window.inner_size();
    if physical.width == 0 || physical.height == 0 {
        return wanted;
    }
    (physical.width, physical.height)
}

fn uniform_entry(binding: u32, size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size as u64),
        },
        count: None,
    }
}

fn texture_entry(binding: u32, dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: dimension,
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

fn create_global_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    environment: &wgpu::TextureView,
    background: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("global-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(environment),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(background),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_background_pipeline(
    device: &wgpu::Device,
    global_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("background-shader"),
        source: wgpu::ShaderSource::Wgsl(shaders::background_source().into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("background-pipeline-layout"),
        bind_group_layouts: &[global_layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("background-pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_background"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DepthBuffer::FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_background"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

fn create_mesh_pipeline(
    device: &wgpu::Device,
    global_layout: &wgpu::BindGroupLayout,
    mesh_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("mesh-shader"),
        source: wgpu::ShaderSource::Wgsl(shaders::mesh_source().into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("mesh-pipeline-layout"),
        bind_group_layouts: &[global_layout, mesh_layout],
        push_constant_ranges: &[],
    });
    let float = std::mem::size_of::<f32>() as u64;
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("mesh-pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_mesh"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: VERTEX_STRIDE as u64 * float,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    },
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 3 * float,
                        shader_location: 1,
                    },
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x2,
                        offset: 6 * float,
                        shader_location: 2,
                    },
                ],
            }],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DepthBuffer::FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_mesh"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: &TextureImage,
    label: &str,
) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width: image.width.max(1),
        height: image.height.max(1),
        depth_or_array_layers: 1,
    };
    let format = if image.srgb {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &image.rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * size.width),
            rows_per_image: Some(size.height),
        },
        size,
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

/// Environment uploaded as a half-float cube with its full mip chain.
struct CubeTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl CubeTexture {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

    fn upload(device: &wgpu::Device, queue: &wgpu::Queue, map: &EnvironmentMap) -> Self {
        let levels: Vec<(u32, Vec<&[f32]>)> = map
            .levels()
            .iter()
            .map(|level| (level.size, level.faces.iter().map(Vec::as_slice).collect()))
            .collect();
        debug!(
            "uploading {}px environment cube with {} mips",
            map.face_size(),
            levels.len()
        );
        Self::from_levels(device, queue, &levels, "environment-cube")
    }

    fn black(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let texel = [0.0f32, 0.0, 0.0, 1.0];
        Self::from_levels(device, queue, &[(1, vec![&texel[..]; 6])], "fallback-cube")
    }

    fn from_levels(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        levels: &[(u32, Vec<&[f32]>)],
        label: &str,
    ) -> Self {
        let size = levels.first().map_or(1, |(size, _)| *size).max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: levels.len().max(1) as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for (mip, (level_size, faces)) in levels.iter().enumerate() {
            for (layer, pixels) in faces.iter().enumerate() {
                let halves: Vec<u16> = pixels
                    .iter()
                    .map(|value| f16::from_f32(*value).to_bits())
                    .collect();
                queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &texture,
                        mip_level: mip as u32,
                        origin: wgpu::Origin3d {
                            x: 0,
                            y: 0,
                            z: layer as u32,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    bytemuck::cast_slice(&halves),
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(level_size * 8),
                        rows_per_image: Some(*level_size),
                    },
                    wgpu::Extent3d {
                        width: *level_size,
                        height: *level_size,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Self {
            _texture: texture,
            view,
        }
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_geometry(device: &wgpu::Device, geometry: &Geometry) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-vertices"),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-indices"),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: geometry.indices.len() as u32,
        }
    }
}

struct MeshBinding {
    uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    geometry_key: usize,
    texture_keys: (Option<usize>, Option<usize>),
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
