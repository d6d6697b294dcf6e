//! Geometry passes. [`FramePlan`] decides what the glow, base and overlay
//! passes draw from the layer masks; [`ScenePass`] owns the pipelines and
//! buffers that draw it.

use super::gpu::GpuContext;
use super::pick::LIGHT_HELPER_RADIUS;
use super::post::{self, PostChain, DEPTH_FORMAT, HDR_FORMAT};
use super::shading::{LightRig, MaterialCache, ShadeParams};
use super::{Background, FrameInputs, FrameStats, DEFAULT_CLEAR_COLOR};
use crate::assets::EnvironmentMap;
use crate::scene::{HelperKind, LightKind, MeshData, NodeId, NodeKind, RenderLayers, SceneGraph};
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use wgpu::util::DeviceExt;

pub const MAX_LIGHTS: usize = 16;
const HELPER_COLOR: Vec3 = Vec3::new(1.0, 0.85, 0.2);
const INITIAL_DRAW_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawStyle {
    Shaded,
    /// Depth-only stand-in: drawn flat black so it hides glow behind it.
    Occluder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawItem {
    pub node: NodeId,
    pub style: DrawStyle,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

/// Per-pass draw lists for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramePlan {
    /// Bloom-layer meshes shaded, other scene meshes as black occluders.
    pub glow: Vec<DrawItem>,
    pub base: Vec<DrawItem>,
    /// Drawn over the base pass after its depth is cleared.
    pub overlay: Vec<DrawItem>,
    pub lines: Vec<LineVertex>,
    pub stats: FrameStats,
}

impl FramePlan {
    pub fn build(scene: &SceneGraph, show_helpers: bool) -> Self {
        let mut plan = FramePlan::default();
        for id in scene.mesh_ids() {
            if !scene.is_effectively_visible(id) {
                continue;
            }
            let Some(node) = scene.get(id) else {
                continue;
            };
            let triangles = node.as_mesh().map_or(0, |mesh| mesh.mesh.triangle_count());
            let in_scene = node.layers.contains(RenderLayers::SCENE);
            let glowing = node.layers.contains(RenderLayers::BLOOM);

            if glowing {
                plan.stats.glow_nodes += 1;
                plan.glow.push(DrawItem {
                    node: id,
                    style: DrawStyle::Shaded,
                });
            } else if in_scene {
                plan.glow.push(DrawItem {
                    node: id,
                    style: DrawStyle::Occluder,
                });
            }

            if in_scene || glowing {
                plan.stats.scene_nodes += 1;
                plan.stats.triangles += triangles;
                plan.base.push(DrawItem {
                    node: id,
                    style: DrawStyle::Shaded,
                });
            } else if node.layers.contains(RenderLayers::OVERLAY) {
                plan.stats.overlay_nodes += 1;
                plan.overlay.push(DrawItem {
                    node: id,
                    style: DrawStyle::Shaded,
                });
            }
        }
        if show_helpers {
            plan.lines = helper_lines(scene);
        }
        plan
    }
}

fn helper_lines(scene: &SceneGraph) -> Vec<LineVertex> {
    let mut lines = Vec::new();
    let mut push = |a: Vec3, b: Vec3, color: Vec3| {
        for position in [a, b] {
            lines.push(LineVertex {
                position: position.to_array(),
                color: color.to_array(),
            });
        }
    };
    for (id, _) in scene.walk() {
        if !scene.is_effectively_visible(id) {
            continue;
        }
        let Some(NodeKind::Helper(kind)) = scene.get(id).map(|node| &node.kind) else {
            continue;
        };
        let world = scene.world_matrix(id);
        let origin = world.transform_point3(Vec3::ZERO);
        match kind {
            HelperKind::Axes => {
                for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
                    push(origin, world.transform_point3(axis), axis);
                }
            }
            HelperKind::Light { light } => {
                for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
                    let arm = axis * LIGHT_HELPER_RADIUS;
                    push(origin - arm, origin + arm, HELPER_COLOR);
                }
                let aim = scene
                    .get(*light)
                    .and_then(|node| node.as_light())
                    .and_then(|light| light.target)
                    .filter(|target| scene.contains(*target));
                if let Some(aim) = aim {
                    push(origin, scene.world_position(aim), HELPER_COLOR);
                }
            }
            HelperKind::GizmoRoot => {}
        }
    }
    lines
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LightUniform {
    position: [f32; 4],
    direction: [f32; 4],
    radiance: [f32; 4],
    cone: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FrameUniform {
    view_proj: [[f32; 4]; 4],
    inv_view_proj: [[f32; 4]; 4],
    camera: [f32; 4],
    ambient: [f32; 4],
    background: [f32; 4],
    counts: [u32; 4],
    lights: [LightUniform; MAX_LIGHTS],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DrawUniform {
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
    diffuse: [f32; 4],
    specular: [f32; 4],
    emission: [f32; 4],
    params: [f32; 4],
}

impl DrawUniform {
    fn new(world: Mat4, params: Option<&ShadeParams>) -> Self {
        let normal_matrix = Mat4::from_mat3(Mat3::from_mat4(world).inverse().transpose());
        let mut uniform = Self {
            model: world.to_cols_array_2d(),
            normal_matrix: normal_matrix.to_cols_array_2d(),
            diffuse: [0.0; 4],
            specular: [0.0; 4],
            emission: [0.0; 4],
            params: [0.0, 1.0, 0.0, 0.0],
        };
        if let Some(params) = params {
            let unlit = if params.unlit { 1.0 } else { 0.0 };
            uniform.diffuse = params.diffuse.extend(unlit).to_array();
            uniform.specular = params.specular.extend(params.shininess).to_array();
            uniform.emission = params.emission.extend(params.env_map_intensity).to_array();
            uniform.params = [params.glossiness, 0.0, 0.0, 0.0];
        }
        uniform
    }
}

fn light_uniforms(rig: &LightRig) -> ([LightUniform; MAX_LIGHTS], u32) {
    let mut lights = [LightUniform::zeroed(); MAX_LIGHTS];
    if rig.lights.len() > MAX_LIGHTS {
        log::debug!("{} lights in scene, shading the first {}", rig.lights.len(), MAX_LIGHTS);
    }
    let mut count = 0;
    for (slot, light) in lights.iter_mut().zip(&rig.lights) {
        let (kind, distance, decay, angle, penumbra) = match light.kind {
            LightKind::Ambient => continue,
            LightKind::Directional => (0.0, 0.0, 0.0, 0.0, 0.0),
            LightKind::Point { distance, decay } => (1.0, distance, decay, 0.0, 0.0),
            LightKind::Spot {
                distance,
                decay,
                angle,
                penumbra,
            } => (2.0, distance, decay, angle, penumbra),
        };
        *slot = LightUniform {
            position: light.position.extend(kind).to_array(),
            direction: light.direction.extend(distance).to_array(),
            radiance: light.radiance.extend(decay).to_array(),
            cone: [angle, penumbra, 0.0, 0.0],
        };
        count += 1;
    }
    (lights, count)
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MeshVertex {
    position: [f32; 3],
    normal: [f32; 3],
}

struct GpuMesh {
    // Held so the pointer key stays unique while cached.
    _source: Arc<MeshData>,
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
    used: bool,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, mesh: &Arc<MeshData>) -> Self {
        let vertices: Vec<MeshVertex> = mesh
            .positions
            .iter()
            .enumerate()
            .map(|(i, position)| MeshVertex {
                position: position.to_array(),
                normal: mesh.normals.get(i).copied().unwrap_or(Vec3::Y).to_array(),
            })
            .collect();
        let count = mesh.positions.len() as u32;
        let indices: Vec<u32> = mesh
            .indices
            .chunks_exact(3)
            .filter(|tri| tri.iter().all(|index| *index < count))
            .flatten()
            .copied()
            .collect();
        Self {
            _source: Arc::clone(mesh),
            vertices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            indices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_indices"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
            index_count: indices.len() as u32,
            used: true,
        }
    }
}

/// One recorded draw: which pass, which mesh and where its uniforms live.
struct PreparedDraw {
    pass: PassKind,
    mesh: usize,
    offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Glow,
    Base,
    Overlay,
}

fn mesh_key(mesh: &Arc<MeshData>) -> usize {
    Arc::as_ptr(mesh) as usize
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Pipelines, uniforms and the per-mesh buffer cache for the geometry passes.
pub struct ScenePass {
    frame_layout: wgpu::BindGroupLayout,
    draw_layout: wgpu::BindGroupLayout,
    mesh_pipeline: wgpu::RenderPipeline,
    backdrop_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    frame_buffer: wgpu::Buffer,
    frame_group: wgpu::BindGroup,
    draw_buffer: wgpu::Buffer,
    draw_group: wgpu::BindGroup,
    draw_stride: u64,
    draw_capacity: usize,
    line_buffer: Option<(wgpu::Buffer, usize)>,
    environment: Option<(String, (u32, u32))>,
    environment_view: wgpu::TextureView,
    meshes: HashMap<usize, GpuMesh>,
    cache: MaterialCache,
}

impl ScenePass {
    pub fn new(device: &wgpu::Device) -> Self {
        let vertex_fragment = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene_frame_layout"),
            entries: &[
                post::uniform_entry(0, vertex_fragment),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene_draw_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: vertex_fragment,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<DrawUniform>() as u64),
                },
                count: None,
            }],
        });

        let module = post::shader(device, "scene_shader", include_str!("shaders/scene.wgsl"));
        let frame_only = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene_frame_pipeline_layout"),
            bind_group_layouts: &[&frame_layout],
            push_constant_ranges: &[],
        });
        let with_draw = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene_mesh_pipeline_layout"),
            bind_group_layouts: &[&frame_layout, &draw_layout],
            push_constant_ranges: &[],
        });

        const MESH_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &MESH_ATTRIBUTES,
        };
        let line_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &MESH_ATTRIBUTES,
        };

        let pipeline = |label: &str,
                        layout: &wgpu::PipelineLayout,
                        entry: (&str, &str),
                        buffers: &[wgpu::VertexBufferLayout<'_>],
                        topology: wgpu::PrimitiveTopology,
                        depth_test: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(entry.0),
                    compilation_options: Default::default(),
                    buffers,
                },
                primitive: wgpu::PrimitiveState {
                    topology,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: depth_test,
                    depth_compare: if depth_test {
                        wgpu::CompareFunction::Less
                    } else {
                        wgpu::CompareFunction::Always
                    },
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(entry.1),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: HDR_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        };
        let mesh_pipeline = pipeline(
            "scene_mesh_pipeline",
            &with_draw,
            ("vs_mesh", "fs_mesh"),
            &[vertex_layout],
            wgpu::PrimitiveTopology::TriangleList,
            true,
        );
        let backdrop_pipeline = pipeline(
            "scene_backdrop_pipeline",
            &frame_only,
            ("vs_backdrop", "fs_backdrop"),
            &[],
            wgpu::PrimitiveTopology::TriangleList,
            false,
        );
        let line_pipeline = pipeline(
            "scene_line_pipeline",
            &frame_only,
            ("vs_line", "fs_line"),
            &[line_layout],
            wgpu::PrimitiveTopology::LineList,
            false,
        );

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene_frame_uniforms"),
            size: std::mem::size_of::<FrameUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let environment_view = Self::placeholder_environment(device);
        let frame_group =
            Self::frame_group(device, &frame_layout, &frame_buffer, &environment_view);

        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let draw_stride = align_to(std::mem::size_of::<DrawUniform>() as u64, alignment);
        let (draw_buffer, draw_group) =
            Self::draw_storage(device, &draw_layout, draw_stride, INITIAL_DRAW_CAPACITY);

        Self {
            frame_layout,
            draw_layout,
            mesh_pipeline,
            backdrop_pipeline,
            line_pipeline,
            frame_buffer,
            frame_group,
            draw_buffer,
            draw_group,
            draw_stride,
            draw_capacity: INITIAL_DRAW_CAPACITY,
            line_buffer: None,
            environment: None,
            environment_view,
            meshes: HashMap::new(),
            cache: MaterialCache::default(),
        }
    }

    fn placeholder_environment(device: &wgpu::Device) -> wgpu::TextureView {
        post::create_target(
            device,
            "environment_placeholder",
            (1, 1),
            wgpu::TextureFormat::Rgba32Float,
            wgpu::TextureUsages::TEXTURE_BINDING,
        )
        .1
    }

    fn frame_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
        environment: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene_frame_group"),
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
            ],
        })
    }

    fn draw_storage(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        capacity: usize,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene_draw_uniforms"),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene_draw_group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(std::mem::size_of::<DrawUniform>() as u64),
                }),
            }],
        });
        (buffer, group)
    }

    /// Upload the panorama when it changed since the last frame.
    fn sync_environment(&mut self, gpu: &GpuContext, environment: Option<&EnvironmentMap>) {
        let key = environment.map(|env| (env.name.clone(), env.size()));
        if key == self.environment {
            return;
        }
        let device = &gpu.device;
        self.environment_view = match environment {
            Some(env) => {
                let (width, height) = env.size();
                let max = device.limits().max_texture_dimension_2d;
                if width > max || height > max {
                    log::warn!(
                        "Environment {} is {}x{}, over the device limit of {}",
                        env.name,
                        width,
                        height,
                        max
                    );
                    Self::placeholder_environment(device)
                } else {
                    let (texture, view) = post::create_target(
                        device,
                        "environment",
                        (width, height),
                        wgpu::TextureFormat::Rgba32Float,
                        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    );
                    gpu.queue.write_texture(
                        wgpu::TexelCopyTextureInfo {
                            texture: &texture,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        bytemuck::cast_slice(&env.rgba_texels()),
                        wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(width * 16),
                            rows_per_image: Some(height),
                        },
                        texture.size(),
                    );
                    log::debug!("Environment {} uploaded ({}x{})", env.name, width, height);
                    view
                }
            }
            None => Self::placeholder_environment(device),
        };
        self.frame_group = Self::frame_group(
            device,
            &self.frame_layout,
            &self.frame_buffer,
            &self.environment_view,
        );
        self.environment = key;
    }

    fn write_frame_uniform(
        &self,
        queue: &wgpu::Queue,
        inputs: &FrameInputs<'_>,
        background: Background,
        aspect: f32,
    ) {
        let rig = LightRig::gather(inputs.scene);
        let (lights, count) = light_uniforms(&rig);
        let view_proj = inputs.camera.view_projection(aspect);
        let has_environment = self.environment.is_some();
        let background = match background {
            Background::Solid(color) => color.extend(0.0),
            Background::Environment => DEFAULT_CLEAR_COLOR.extend(1.0),
        };
        let uniform = FrameUniform {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            camera: inputs.camera.position.extend(1.0).to_array(),
            ambient: rig
                .ambient
                .extend(if has_environment { 1.0 } else { 0.0 })
                .to_array(),
            background: background.to_array(),
            counts: [count, 0, 0, 0],
            lights,
        };
        queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    /// Resolve draw items to cached meshes and uniform slots. Items with an
    /// unknown material are skipped.
    fn prepare(
        &mut self,
        gpu: &GpuContext,
        inputs: &FrameInputs<'_>,
        plan: &FramePlan,
    ) -> Vec<PreparedDraw> {
        for mesh in self.meshes.values_mut() {
            mesh.used = false;
        }
        let passes = [
            (PassKind::Glow, &plan.glow),
            (PassKind::Base, &plan.base),
            (PassKind::Overlay, &plan.overlay),
        ];
        let mut uniforms = Vec::new();
        let mut draws = Vec::new();
        for (pass, items) in passes {
            for item in items.iter() {
                let Some(mesh) = inputs.scene.get(item.node).and_then(|node| node.as_mesh()) else {
                    continue;
                };
                let params = match item.style {
                    DrawStyle::Shaded => match self.cache.params(inputs.materials, mesh.material) {
                        Some(params) => Some(params),
                        None => {
                            log::warn!(
                                "Node {} references unknown material {:?}",
                                item.node,
                                mesh.material
                            );
                            continue;
                        }
                    },
                    DrawStyle::Occluder => None,
                };
                let key = mesh_key(&mesh.mesh);
                let cached = self
                    .meshes
                    .entry(key)
                    .or_insert_with(|| GpuMesh::upload(&gpu.device, &mesh.mesh));
                cached.used = true;
                if cached.index_count == 0 {
                    continue;
                }
                let world = inputs.scene.world_matrix(item.node);
                draws.push(PreparedDraw {
                    pass,
                    mesh: key,
                    offset: (uniforms.len() as u64 * self.draw_stride) as u32,
                });
                uniforms.push(DrawUniform::new(world, params.as_ref()));
            }
        }
        self.meshes.retain(|_, mesh| mesh.used);

        if uniforms.len() > self.draw_capacity {
            let capacity = uniforms.len().next_power_of_two();
            let (buffer, group) =
                Self::draw_storage(&gpu.device, &self.draw_layout, self.draw_stride, capacity);
            self.draw_buffer = buffer;
            self.draw_group = group;
            self.draw_capacity = capacity;
        }
        let stride = self.draw_stride as usize;
        let mut bytes = vec![0u8; uniforms.len() * stride];
        for (chunk, uniform) in bytes.chunks_exact_mut(stride).zip(&uniforms) {
            let bytes = bytemuck::bytes_of(uniform);
            chunk[..bytes.len()].copy_from_slice(bytes);
        }
        if !bytes.is_empty() {
            gpu.queue.write_buffer(&self.draw_buffer, 0, &bytes);
        }
        draws
    }

    fn upload_lines(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, lines: &[LineVertex]) {
        if lines.is_empty() {
            return;
        }
        let fits = matches!(&self.line_buffer, Some((_, capacity)) if *capacity >= lines.len());
        if !fits {
            let capacity = lines.len().next_power_of_two();
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("helper_lines"),
                size: (capacity * std::mem::size_of::<LineVertex>()) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.line_buffer = Some((buffer, capacity));
        }
        if let Some((buffer, _)) = &self.line_buffer {
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(lines));
        }
    }

    /// Record the glow, base and overlay passes into the post chain's targets.
    #[allow(clippy::too_many_arguments)]
    pub fn encode(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        targets: &PostChain,
        plan: &FramePlan,
        inputs: &FrameInputs<'_>,
        background: Background,
        aspect: f32,
    ) {
        self.sync_environment(gpu, inputs.environment);
        self.write_frame_uniform(&gpu.queue, inputs, background, aspect);
        let draws = self.prepare(gpu, inputs, plan);
        self.upload_lines(&gpu.device, &gpu.queue, &plan.lines);

        let color = |view, load| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })
        };
        let depth = || {
            Some(wgpu::RenderPassDepthStencilAttachment {
                view: targets.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            })
        };
        let clear = wgpu::LoadOp::Clear(wgpu::Color::BLACK);

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glow_pass"),
                color_attachments: &[color(targets.glow_source_view(), clear)],
                depth_stencil_attachment: depth(),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.draw_meshes(&mut pass, &draws, PassKind::Glow);
        }
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("base_pass"),
                color_attachments: &[color(targets.base_view(), clear)],
                depth_stencil_attachment: depth(),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.backdrop_pipeline);
            pass.set_bind_group(0, &self.frame_group, &[]);
            pass.draw(0..3, 0..1);
            self.draw_meshes(&mut pass, &draws, PassKind::Base);
        }
        if !plan.overlay.is_empty() || !plan.lines.is_empty() {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay_pass"),
                color_attachments: &[color(targets.base_view(), wgpu::LoadOp::Load)],
                depth_stencil_attachment: depth(),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.draw_meshes(&mut pass, &draws, PassKind::Overlay);
            let lines = self.line_buffer.as_ref().filter(|_| !plan.lines.is_empty());
            if let Some((buffer, _)) = lines {
                pass.set_pipeline(&self.line_pipeline);
                pass.set_bind_group(0, &self.frame_group, &[]);
                pass.set_vertex_buffer(0, buffer.slice(..));
                pass.draw(0..plan.lines.len() as u32, 0..1);
            }
        }
    }

    fn draw_meshes(&self, pass: &mut wgpu::RenderPass<'_>, draws: &[PreparedDraw], kind: PassKind) {
        pass.set_pipeline(&self.mesh_pipeline);
        pass.set_bind_group(0, &self.frame_group, &[]);
        for draw in draws.iter().filter(|draw| draw.pass == kind) {
            let Some(mesh) = self.meshes.get(&draw.mesh) else {
                continue;
            };
            pass.set_bind_group(1, &self.draw_group, &[draw.offset]);
            pass.set_vertex_buffer(0, mesh.vertices.slice(..));
            pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }

    /// Meshes with buffers resident on the GPU.
    pub fn cached_meshes(&self) -> usize {
        self.meshes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::shading::WorldLight;
    use crate::scene::{LightNode, MeshNode};
    use crate::scene::{Material, MaterialRegistry};

    fn quad() -> Arc<MeshData> {
        Arc::new(MeshData {
            positions: vec![
                Vec3::new(-0.5, -0.5, 0.0),
                Vec3::new(0.5, -0.5, 0.0),
                Vec3::new(0.5, 0.5, 0.0),
                Vec3::new(-0.5, 0.5, 0.0),
            ],
            normals: vec![Vec3::Z; 4],
            indices: vec![0, 1, 2, 0, 2, 3],
        })
    }

    fn mesh_node(scene: &mut SceneGraph, materials: &mut MaterialRegistry, name: &str) -> NodeId {
        let material = materials.insert(Material::standard(name, Vec3::ONE));
        scene.add(
            None,
            name,
            NodeKind::Mesh(MeshNode {
                mesh: quad(),
                material,
            }),
        )
    }

    #[test]
    fn glow_pass_shades_bloom_nodes_and_blacks_out_the_rest() {
        let mut scene = SceneGraph::new();
        let mut materials = MaterialRegistry::new();
        let pattern = mesh_node(&mut scene, &mut materials, "Star_Pattern");
        scene.get_mut(pattern).unwrap().layers = RenderLayers::SCENE.with(RenderLayers::BLOOM);
        let body = mesh_node(&mut scene, &mut materials, "Base");

        let plan = FramePlan::build(&scene, false);
        assert_eq!(
            plan.glow,
            vec![
                DrawItem { node: pattern, style: DrawStyle::Shaded },
                DrawItem { node: body, style: DrawStyle::Occluder },
            ]
        );
        assert_eq!(plan.base.len(), 2);
        assert!(plan.base.iter().all(|item| item.style == DrawStyle::Shaded));
        assert_eq!(plan.stats.glow_nodes, 1);
        assert_eq!(plan.stats.scene_nodes, 2);
        assert_eq!(plan.stats.triangles, 4);
    }

    #[test]
    fn hidden_glow_nodes_leave_the_glow_pass() {
        let mut scene = SceneGraph::new();
        let mut materials = MaterialRegistry::new();
        let pattern = mesh_node(&mut scene, &mut materials, "Moon_Pattern");
        scene.get_mut(pattern).unwrap().layers = RenderLayers::SCENE.with(RenderLayers::BLOOM);
        scene.get_mut(pattern).unwrap().visible = false;

        let plan = FramePlan::build(&scene, false);
        assert_eq!(plan.stats.glow_nodes, 0);
        assert!(plan.glow.is_empty());
        assert!(plan.base.is_empty());
    }

    #[test]
    fn overlay_nodes_stay_out_of_scene_passes() {
        let mut scene = SceneGraph::new();
        let mut materials = MaterialRegistry::new();
        let handle = mesh_node(&mut scene, &mut materials, "X");
        scene.get_mut(handle).unwrap().layers = RenderLayers::OVERLAY;

        let plan = FramePlan::build(&scene, false);
        assert!(plan.glow.is_empty());
        assert!(plan.base.is_empty());
        assert_eq!(plan.overlay, vec![DrawItem { node: handle, style: DrawStyle::Shaded }]);
        assert_eq!(plan.stats.overlay_nodes, 1);
    }

    #[test]
    fn helper_lines_follow_the_toggle() {
        let mut scene = SceneGraph::new();
        let light = scene.add(
            None,
            "Key",
            NodeKind::Light(LightNode::new(
                LightKind::Point {
                    distance: 0.0,
                    decay: 2.0,
                },
                Vec3::ONE,
                1.0,
            )),
        );
        scene.add(None, "Key helper", NodeKind::Helper(HelperKind::Light { light }));
        scene.add(None, "Axes", NodeKind::Helper(HelperKind::Axes));

        assert!(FramePlan::build(&scene, false).lines.is_empty());
        let lines = FramePlan::build(&scene, true).lines;
        // Three arms for the light marker, three axes; two vertices each.
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[0].color, HELPER_COLOR.to_array());
    }

    #[test]
    fn light_slots_encode_kind_and_cap_at_limit() {
        let spot = WorldLight {
            kind: LightKind::Spot {
                distance: 5.0,
                decay: 2.0,
                angle: 0.4,
                penumbra: 0.2,
            },
            radiance: Vec3::ONE,
            position: Vec3::Y,
            direction: Vec3::NEG_Y,
        };
        let rig = LightRig {
            ambient: Vec3::ZERO,
            lights: vec![spot; MAX_LIGHTS + 3],
        };
        let (lights, count) = light_uniforms(&rig);
        assert_eq!(count as usize, MAX_LIGHTS);
        assert_eq!(lights[0].position, [0.0, 1.0, 0.0, 2.0]);
        assert_eq!(lights[0].direction[3], 5.0);
        assert_eq!(lights[0].cone, [0.4, 0.2, 0.0, 0.0]);
    }

    #[test]
    fn occluder_uniform_is_flagged() {
        let uniform = DrawUniform::new(Mat4::IDENTITY, None);
        assert_eq!(uniform.params[1], 1.0);
        let params = ShadeParams::from_material(&Material::basic("flat", Vec3::X));
        let shaded = DrawUniform::new(Mat4::IDENTITY, Some(&params));
        assert_eq!(shaded.params[1], 0.0);
        assert_eq!(shaded.diffuse, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn uniform_blocks_match_shader_layout() {
        assert_eq!(std::mem::size_of::<DrawUniform>(), 192);
        assert_eq!(std::mem::size_of::<FrameUniform>(), 192 + 64 * MAX_LIGHTS);
        assert_eq!(align_to(192, 256), 256);
    }
}
