//! Rendering system with wgpu pipelines for the backdrop and the cluster.
//!
//! The backdrop is a fullscreen triangle sampling the equirectangular theme
//! image. Cluster objects are drawn with either the physical or the
//! refraction fragment entry point, chosen by each object's material.
//! The particle shell and the field rings share one layer shader.

use std::path::Path;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use image::{Rgba, RgbaImage};
use thiserror::Error;
use wgpu::util::DeviceExt;

use crate::audio::AudioBands;
use crate::params::{RenderConfig, SimulationParameters};
use crate::visual::atmosphere::{FieldRing, PARTICLE_OPACITY, PARTICLE_SIZE};
use crate::visual::{
    CameraPose, FieldRings, FusionCluster, MaterialUniforms, Mesh, ParticleField, RenderMode, SceneLights,
};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("failed to request device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Vertex data for cluster meshes (position + normal)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

pub fn mesh_vertices(mesh: &Mesh) -> Vec<Vertex> {
    mesh.positions
        .iter()
        .zip(&mesh.normals)
        .map(|(p, n)| Vertex {
            position: p.to_array(),
            normal: n.to_array(),
        })
        .collect()
}

/// Per-frame scene block shared by every pipeline.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SceneUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    /// Camera position (xyz) and elapsed time
    pub camera_pos: [f32; 4],
    /// Ambient color (rgb) and theme flag (1 when an image is loaded)
    pub ambient: [f32; 4],
    /// Key light direction (xyz) and intensity
    pub key_dir: [f32; 4],
    pub key_color: [f32; 4],
    pub rim_dir: [f32; 4],
    pub rim_color: [f32; 4],
    /// Point light positions (xyz) and intensities
    pub point_pos: [[f32; 4]; 4],
    pub point_color: [[f32; 4]; 4],
}

impl SceneUniforms {
    pub fn new(
        pose: &CameraPose,
        render_config: &RenderConfig,
        lights: &SceneLights,
        time_s: f32,
        has_theme: bool,
    ) -> Self {
        let view_proj = pose.view_proj(render_config);
        let dir = |v: Vec3, w: f32| [v.x, v.y, v.z, w];

        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            camera_pos: dir(pose.eye, time_s),
            ambient: dir(lights.ambient, if has_theme { 1.0 } else { 0.0 }),
            key_dir: dir(lights.key.direction, lights.key.intensity),
            key_color: dir(lights.key.color, 1.0),
            rim_dir: dir(lights.rim.direction, lights.rim.intensity),
            rim_color: dir(lights.rim.color, 1.0),
            point_pos: lights.points.map(|l| dir(l.position, l.intensity)),
            point_color: lights.points.map(|l| dir(l.color, 1.0)),
        }
    }
}

/// Per-object block: model transform plus material.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model: [[f32; 4]; 4],
    pub material: MaterialUniforms,
}

/// Transform and tint of a scene layer (particle shell or one ring).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LayerUniforms {
    pub model: [[f32; 4]; 4],
    /// rgb tint, opacity
    pub color: [f32; 4],
    /// x: billboard size
    pub params: [f32; 4],
}

impl LayerUniforms {
    pub fn particles(time_s: f32) -> Self {
        Self {
            model: ParticleField::model_matrix(time_s).to_cols_array_2d(),
            color: [1.0, 1.0, 1.0, PARTICLE_OPACITY],
            params: [PARTICLE_SIZE, 0.0, 0.0, 0.0],
        }
    }

    pub fn ring(ring: &FieldRing) -> Self {
        Self {
            model: ring.model_matrix().to_cols_array_2d(),
            color: [ring.color.x, ring.color.y, ring.color.z, ring.opacity],
            params: [0.0; 4],
        }
    }
}

/// Per-instance particle data.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ParticleInstance {
    pub center: [f32; 3],
    pub color: [f32; 3],
}

pub fn particle_instances(field: &ParticleField) -> Vec<ParticleInstance> {
    field
        .particles()
        .iter()
        .map(|p| ParticleInstance {
            center: p.position.to_array(),
            color: p.color.to_array(),
        })
        .collect()
}

/// Equirectangular theme image plus whether it came from disk.
pub struct ThemeImage {
    pub image: RgbaImage,
    pub loaded: bool,
}

impl ThemeImage {
    /// Load `path`, falling back to the procedural backdrop on any failure.
    pub fn load_or_fallback(path: Option<&Path>, params: &SimulationParameters, width: u32) -> Self {
        if let Some(path) = path {
            match image::open(path) {
                Ok(img) => {
                    let image = img.to_rgba8();
                    log::info!(
                        "Theme image loaded: {} ({}x{})",
                        path.display(),
                        image.width(),
                        image.height()
                    );
                    return Self { image, loaded: true };
                }
                Err(e) => {
                    log::warn!(
                        "Theme image {} unavailable ({}), using procedural backdrop",
                        path.display(),
                        e
                    );
                }
            }
        }
        Self {
            image: procedural_backdrop(width, params),
            loaded: false,
        }
    }
}

/// Shrink `image` so neither side exceeds `max_dim`, keeping the aspect ratio.
pub fn fit_texture_limit(image: RgbaImage, max_dim: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    let max_dim = max_dim.max(1);
    if width <= max_dim && height <= max_dim {
        return image;
    }
    let scale = max_dim as f64 / width.max(height) as f64;
    let fit = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, max_dim);
    let (new_width, new_height) = (fit(width), fit(height));
    log::warn!(
        "Theme image {}x{} exceeds the {} texel limit, downscaling to {}x{}",
        width,
        height,
        max_dim,
        new_width,
        new_height
    );
    image::imageops::resize(&image, new_width, new_height, image::imageops::FilterType::Triangle)
}

/// Flat palette gradient (2:1 equirectangular) used when no theme image exists.
pub fn procedural_backdrop(width: u32, params: &SimulationParameters) -> RgbaImage {
    let width = width.max(2);
    let height = (width / 2).max(1);
    let top = params.secondary_color() * 0.25;
    let horizon = params.accent_color() * 0.35;
    let bottom = Vec3::new(5.0, 5.0, 16.0) / 255.0;

    RgbaImage::from_fn(width, height, |_, y| {
        let v = (y as f32 + 0.5) / height as f32;
        let c = if v < 0.5 {
            top.lerp(horizon, v * 2.0)
        } else {
            horizon.lerp(bottom, (v - 0.5) * 2.0)
        };
        let byte = |x: f32| (x.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([byte(c.x), byte(c.y), byte(c.z), 255])
    })
}

/// GPU resources for one cluster object.
struct GpuObject {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    mode: RenderMode,
}

impl GpuObject {
    fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        self.uniform_buffer.destroy();
    }
}

/// GPU resources for the particle shell or one ring.
struct GpuLayer {
    vertex_buffer: wgpu::Buffer,
    index_buffer: Option<wgpu::Buffer>,
    /// Index count for rings, instance count for particles
    count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl GpuLayer {
    fn destroy(&self) {
        self.vertex_buffer.destroy();
        if let Some(index_buffer) = &self.index_buffer {
            index_buffer.destroy();
        }
        self.uniform_buffer.destroy();
    }
}

/// Rendering system managing wgpu device, pipelines, and buffers
pub struct RenderSystem {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    clear_color: wgpu::Color,
    backdrop_pipeline: wgpu::RenderPipeline,
    physical_pipeline: wgpu::RenderPipeline,
    refraction_pipeline: wgpu::RenderPipeline,
    particle_pipeline: wgpu::RenderPipeline,
    ring_pipeline: wgpu::RenderPipeline,
    object_layout: wgpu::BindGroupLayout,
    scene_buffer: wgpu::Buffer,
    scene_bind_group: wgpu::BindGroup,
    theme_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    objects: Vec<GpuObject>,
    particles: Option<GpuLayer>,
    rings: Vec<GpuLayer>,
}

impl RenderSystem {
    /// Create new rendering system
    pub async fn new(
        window: Arc<winit::window::Window>,
        render_config: &RenderConfig,
        theme: &RgbaImage,
    ) -> Result<Self, RenderError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // Window must have 'static lifetime via Arc
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Main Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(RenderError::NoSurfaceFormat)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let backdrop_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Backdrop Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("backdrop.wgsl").into()),
        });

        let cluster_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cluster Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("cluster.wgsl").into()),
        });

        let atmosphere_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Atmosphere Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("atmosphere.wgsl").into()),
        });

        // Group 0: scene uniforms + theme texture, shared by every pipeline
        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
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

        // Group 1: per-object model + material, or per-layer model + tint
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Object Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let scene_uniforms = SceneUniforms::zeroed();
        let scene_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Uniform Buffer"),
            contents: bytemuck::cast_slice(&[scene_uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Theme Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let theme_texture = create_theme_texture(&device, &queue, theme);
        let scene_bind_group =
            create_scene_bind_group(&device, &scene_layout, &scene_buffer, &theme_texture, &sampler);

        let backdrop_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Backdrop Pipeline Layout"),
            bind_group_layouts: &[&scene_layout],
            push_constant_ranges: &[],
        });

        let backdrop_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Backdrop Pipeline"),
            layout: Some(&backdrop_layout),
            vertex: wgpu::VertexState {
                module: &backdrop_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &backdrop_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            // Backdrop sits at the far plane and never writes depth
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let cluster_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cluster Pipeline Layout"),
            bind_group_layouts: &[&scene_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let physical_pipeline = create_cluster_pipeline(
            &device,
            &cluster_layout,
            &cluster_shader,
            config.format,
            "fs_physical",
            None,
            true,
        );
        let refraction_pipeline = create_cluster_pipeline(
            &device,
            &cluster_layout,
            &cluster_shader,
            config.format,
            "fs_refraction",
            Some(wgpu::BlendState::ALPHA_BLENDING),
            false,
        );

        // Layers share the object layout: one uniform block at binding 0
        let particle_pipeline = create_layer_pipeline(
            &device,
            &cluster_layout,
            &atmosphere_shader,
            config.format,
            "particle",
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<ParticleInstance>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &VEC3_PAIR_ATTRIBUTES,
            },
            wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
        );
        let ring_pipeline = create_layer_pipeline(
            &device,
            &cluster_layout,
            &atmosphere_shader,
            config.format,
            "ring",
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &VEC3_PAIR_ATTRIBUTES,
            },
            wgpu::BlendState::ALPHA_BLENDING,
        );

        let depth_view = create_depth_view(&device, config.width, config.height);
        let [r, g, b] = render_config.clear_color;

        Ok(Self {
            surface,
            device,
            queue,
            config,
            clear_color: wgpu::Color { r, g, b, a: 1.0 },
            backdrop_pipeline,
            physical_pipeline,
            refraction_pipeline,
            particle_pipeline,
            ring_pipeline,
            object_layout,
            scene_buffer,
            scene_bind_group,
            theme_texture,
            depth_view,
            objects: Vec::new(),
            particles: None,
            rings: Vec::new(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_view(&self.device, width, height);
    }

    /// Release GPU buffers of the current cluster and its scene layers.
    pub fn release_cluster(&mut self) {
        for object in self.objects.drain(..) {
            object.destroy();
        }
        if let Some(particles) = self.particles.take() {
            particles.destroy();
        }
        for ring in self.rings.drain(..) {
            ring.destroy();
        }
    }

    fn create_layer(
        &self,
        label: &str,
        vertices: &[u8],
        indices: Option<&[u32]>,
        count: u32,
        uniforms: LayerUniforms,
    ) -> GpuLayer {
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: vertices,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = indices.map(|indices| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Layer Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Layer Bind Group"),
            layout: &self.object_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        GpuLayer {
            vertex_buffer,
            index_buffer,
            count,
            uniform_buffer,
            bind_group,
        }
    }

    /// Upload the particle shell and field rings built alongside the cluster.
    pub fn upload_atmosphere(&mut self, field: &ParticleField, rings: &FieldRings) {
        if let Some(previous) = self.particles.take() {
            previous.destroy();
        }
        for ring in self.rings.drain(..) {
            ring.destroy();
        }

        let instances = particle_instances(field);
        self.particles = Some(self.create_layer(
            "Particle Instance Buffer",
            bytemuck::cast_slice(&instances),
            None,
            instances.len() as u32,
            LayerUniforms::particles(0.0),
        ));
        self.rings = rings
            .rings()
            .iter()
            .map(|ring| {
                self.create_layer(
                    "Ring Buffer",
                    bytemuck::cast_slice(&mesh_vertices(&ring.mesh)),
                    Some(&ring.mesh.indices),
                    ring.mesh.indices.len() as u32,
                    LayerUniforms::ring(ring),
                )
            })
            .collect();
        log::debug!("Uploaded {} particles and {} rings", instances.len(), self.rings.len());
    }

    /// Write this frame's shell transform and ring orientations.
    pub fn update_atmosphere(&self, rings: &FieldRings, time_s: f32) {
        if let Some(particles) = &self.particles {
            self.queue.write_buffer(
                &particles.uniform_buffer,
                0,
                bytemuck::cast_slice(&[LayerUniforms::particles(time_s)]),
            );
        }
        for (gpu, ring) in self.rings.iter().zip(rings.rings()) {
            self.queue
                .write_buffer(&gpu.uniform_buffer, 0, bytemuck::cast_slice(&[LayerUniforms::ring(ring)]));
        }
    }

    /// Upload a freshly built cluster, releasing the previous one first.
    pub fn upload_cluster(&mut self, cluster: &FusionCluster) {
        self.release_cluster();

        for (i, object) in cluster.objects().iter().enumerate() {
            let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Cluster Vertex Buffer"),
                contents: bytemuck::cast_slice(&mesh_vertices(&object.mesh)),
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
            let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Cluster Index Buffer"),
                contents: bytemuck::cast_slice(&object.mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            let uniforms = ObjectUniforms {
                model: object.model_matrix(cluster.rotation_y()).to_cols_array_2d(),
                material: object.material.uniforms(0.0, AudioBands::SILENT, 0.0),
            };
            let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Object Uniform Buffer"),
                contents: bytemuck::cast_slice(&[uniforms]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Object Bind Group"),
                layout: &self.object_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

            log::debug!("Uploaded object {} ({} triangles)", i, object.mesh.triangle_count());
            self.objects.push(GpuObject {
                vertex_buffer,
                index_buffer,
                index_count: object.mesh.indices.len() as u32,
                uniform_buffer,
                bind_group,
                mode: object.material.mode(),
            });
        }
    }

    /// Write this frame's deformed vertices and object uniforms.
    pub fn update_cluster(&self, cluster: &FusionCluster, time_s: f32, bands: AudioBands) {
        for (gpu, object) in self.objects.iter().zip(cluster.objects()) {
            self.queue.write_buffer(
                &gpu.vertex_buffer,
                0,
                bytemuck::cast_slice(&mesh_vertices(&object.mesh)),
            );
            let uniforms = ObjectUniforms {
                model: object.model_matrix(cluster.rotation_y()).to_cols_array_2d(),
                material: object
                    .material
                    .uniforms(time_s, bands, cluster.iridescence_phase()),
            };
            self.queue
                .write_buffer(&gpu.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
        }
    }

    /// Update scene uniforms
    pub fn update_scene(&self, uniforms: &SceneUniforms) {
        self.queue
            .write_buffer(&self.scene_buffer, 0, bytemuck::cast_slice(&[*uniforms]));
    }

    /// Render a frame
    pub fn render(&self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.scene_bind_group, &[]);

            // Opaque objects first, translucent refraction objects last
            for pass_mode in [RenderMode::Physical, RenderMode::Refraction] {
                let pipeline = match pass_mode {
                    RenderMode::Physical => &self.physical_pipeline,
                    RenderMode::Refraction => &self.refraction_pipeline,
                };
                render_pass.set_pipeline(pipeline);
                for object in self.objects.iter().filter(|o| o.mode == pass_mode) {
                    render_pass.set_bind_group(1, &object.bind_group, &[]);
                    render_pass.set_vertex_buffer(0, object.vertex_buffer.slice(..));
                    render_pass
                        .set_index_buffer(object.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..object.index_count, 0, 0..1);
                }

                if pass_mode == RenderMode::Physical {
                    // Backdrop fills whatever the opaque pass left uncovered
                    render_pass.set_pipeline(&self.backdrop_pipeline);
                    render_pass.draw(0..3, 0..1);

                    render_pass.set_pipeline(&self.ring_pipeline);
                    for ring in &self.rings {
                        render_pass.set_bind_group(1, &ring.bind_group, &[]);
                        render_pass.set_vertex_buffer(0, ring.vertex_buffer.slice(..));
                        if let Some(index_buffer) = &ring.index_buffer {
                            render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                            render_pass.draw_indexed(0..ring.count, 0, 0..1);
                        }
                    }
                }
            }

            // Additive dust over everything, depth-tested but never written
            if let Some(particles) = &self.particles {
                render_pass.set_pipeline(&self.particle_pipeline);
                render_pass.set_bind_group(1, &particles.bind_group, &[]);
                render_pass.set_vertex_buffer(0, particles.vertex_buffer.slice(..));
                render_pass.draw(0..6, 0..particles.count);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

impl Drop for RenderSystem {
    fn drop(&mut self) {
        self.release_cluster();
        self.theme_texture.destroy();
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_theme_texture(device: &wgpu::Device, queue: &wgpu::Queue, theme: &RgbaImage) -> wgpu::Texture {
    let max_dim = device.limits().max_texture_dimension_2d;
    let fitted;
    let theme = if theme.width() > max_dim || theme.height() > max_dim {
        fitted = fit_texture_limit(theme.clone(), max_dim);
        &fitted
    } else {
        theme
    };
    let size = wgpu::Extent3d {
        width: theme.width().max(1),
        height: theme.height().max(1),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Theme Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    if theme.width() > 0 && theme.height() > 0 {
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            theme.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * theme.width()),
                rows_per_image: Some(theme.height()),
            },
            size,
        );
    }
    texture
}

fn create_scene_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    texture: &wgpu::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Scene Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

/// Two vec3 attributes: position + normal, or particle center + color.
const VEC3_PAIR_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

fn create_layer_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    name: &str,
    buffer: wgpu::VertexBufferLayout<'_>,
    blend: wgpu::BlendState,
) -> wgpu::RenderPipeline {
    let vs_entry = format!("vs_{}", name);
    let fs_entry = format!("fs_{}", name);
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(fs_entry.as_str()),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some(vs_entry.as_str()),
            buffers: &[buffer],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fs_entry.as_str()),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn create_cluster_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    fragment_entry: &str,
    blend: Option<wgpu::BlendState>,
    depth_write: bool,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(fragment_entry),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &VEC3_PAIR_ATTRIBUTES,
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Double-sided, like the open props and the pixel grid need
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: depth_write,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{CameraDrift, CameraMode, LightRig};
    use crate::visual::camera::scene_lights;
    use crate::visual::CameraRig;

    #[test]
    fn test_uniform_layouts_are_vec4_aligned() {
        assert_eq!(std::mem::size_of::<SceneUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<ObjectUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<MaterialUniforms>(), 7 * 16);
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
    }

    #[test]
    fn test_scene_uniforms_finite() {
        let params = SimulationParameters::default();
        let rig = CameraRig::new(CameraMode::Orbit, CameraDrift::default(), 2);
        let pose = rig.pose(3.0, AudioBands::SILENT, 45.0);
        let lights = scene_lights(&LightRig::default(), &params, 3.0, AudioBands::SILENT);
        let uniforms = SceneUniforms::new(&pose, &RenderConfig::default(), &lights, 3.0, false);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&uniforms));
        assert!(floats.iter().all(|f| f.is_finite()));
        assert_eq!(uniforms.camera_pos[3], 3.0);
        assert_eq!(uniforms.ambient[3], 0.0);
    }

    #[test]
    fn test_missing_theme_falls_back() {
        let params = SimulationParameters::default();
        let theme = ThemeImage::load_or_fallback(
            Some(Path::new("/definitely/not/here.png")),
            &params,
            64,
        );
        assert!(!theme.loaded);
        assert_eq!(theme.image.dimensions(), (64, 32));

        let none = ThemeImage::load_or_fallback(None, &params, 64);
        assert!(!none.loaded);
    }

    #[test]
    fn test_oversized_theme_fits_texture_limit() {
        let wide = RgbaImage::from_pixel(9000, 16, Rgba([40, 80, 120, 255]));
        let fitted = fit_texture_limit(wide, 8192);
        assert_eq!(fitted.width(), 8192);
        assert_eq!(fitted.height(), 15);
        let px = fitted.get_pixel(100, 7);
        assert!(px[0].abs_diff(40) <= 1 && px[2].abs_diff(120) <= 1);

        let tall = fit_texture_limit(RgbaImage::new(64, 20_000), 8192);
        assert_eq!(tall.dimensions(), (26, 8192));

        let small = fit_texture_limit(RgbaImage::new(512, 256), 8192);
        assert_eq!(small.dimensions(), (512, 256));
    }

    #[test]
    fn test_procedural_backdrop_gradient() {
        let params = SimulationParameters {
            color_palette: vec!["#ffffff".into(), "#ff0000".into(), "#00ff00".into()],
            ..Default::default()
        };
        let img = procedural_backdrop(32, &params);
        let top = img.get_pixel(0, 0);
        let bottom = img.get_pixel(0, 15);
        // Secondary (red) dominates the zenith, near-black at the nadir
        assert!(top[0] > top[1]);
        assert!(bottom[0] < 20 && bottom[1] < 20);
        assert!(img.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_layer_uniforms_follow_the_shell() {
        assert_eq!(std::mem::size_of::<LayerUniforms>(), 6 * 16);
        assert_eq!(std::mem::size_of::<ParticleInstance>(), 24);

        let t = 9.0;
        let uniforms = LayerUniforms::particles(t);
        assert_eq!(uniforms.model, ParticleField::model_matrix(t).to_cols_array_2d());
        assert_eq!(uniforms.color[3], PARTICLE_OPACITY);
        assert_eq!(uniforms.params[0], PARTICLE_SIZE);

        let rings = FieldRings::new();
        let outer = LayerUniforms::ring(&rings.rings()[2]);
        assert!((outer.color[3] - 0.09).abs() < 1e-6);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&outer));
        assert!(floats.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn test_particle_instances_match_field() {
        use rand::SeedableRng;
        let field = ParticleField::generate(&mut rand::rngs::StdRng::seed_from_u64(3));
        let instances = particle_instances(&field);
        assert_eq!(instances.len(), field.particles().len());
        assert_eq!(instances[10].center, field.particles()[10].position.to_array());
        assert_eq!(instances[10].color, field.particles()[10].color.to_array());
    }

    #[test]
    fn test_mesh_vertices_interleave() {
        let mesh = crate::visual::geometry::icosahedron(1.0, 0);
        let verts = mesh_vertices(&mesh);
        assert_eq!(verts.len(), 12);
        assert_eq!(verts[3].position, mesh.positions[3].to_array());
        assert_eq!(verts[3].normal, mesh.normals[3].to_array());
    }
}
