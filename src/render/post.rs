//! Full-screen passes: bloom, composite, tone mapping and FXAA.
//!
//! Bloom runs as compute dispatches over a half-resolution mip chain: a
//! thresholded bright pass, box downsamples, a separable Gaussian blur per
//! mip and a weighted combine back to full resolution. Composite, tone
//! mapping and FXAA are full-screen fragment passes ending in an 8-bit
//! target that can be read back or presented.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use std::borrow::Cow;
use wgpu::util::DeviceExt;

pub const BLOOM_MIPS: usize = 5;
const BLOOM_KERNEL_RADII: [u32; BLOOM_MIPS] = [3, 5, 7, 9, 11];
const BLOOM_FACTORS: [f32; BLOOM_MIPS] = [1.0, 0.8, 0.6, 0.4, 0.2];
const SOFT_KNEE: f32 = 0.1;
const WORKGROUP: u32 = 8;

pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Mip-chain bloom in the style of an "unreal" bloom pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomPass {
    pub strength: f32,
    pub radius: f32,
    pub threshold: f32,
}

impl BloomPass {
    /// Per-mip weight: the radius pulls weights toward their mirror, widening
    /// the glow.
    pub fn mip_factors(&self) -> [f32; BLOOM_MIPS] {
        let mut factors = [0.0; BLOOM_MIPS];
        for (i, factor) in factors.iter_mut().enumerate() {
            let base = BLOOM_FACTORS[i];
            let mirror = 1.2 - base;
            *factor = self.strength * (base + (mirror - base) * self.radius);
        }
        factors
    }
}

/// Fast approximate anti-aliasing. `inv_resolution` is the size of one texel
/// in UV units and has to follow every resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fxaa {
    pub inv_resolution: Vec2,
}

impl Fxaa {
    pub fn for_size(width: u32, height: u32) -> Self {
        Self {
            inv_resolution: Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32),
        }
    }
}

/// Half resolution first, halving again per level.
pub fn mip_sizes(width: u32, height: u32) -> [(u32, u32); BLOOM_MIPS] {
    let mut sizes = [(1, 1); BLOOM_MIPS];
    let (mut w, mut h) = (width, height);
    for size in sizes.iter_mut() {
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        *size = (w, h);
    }
    sizes
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BloomParams {
    threshold: f32,
    knee: f32,
    radius: f32,
    _pad0: f32,
    direction: [i32; 2],
    _pad1: [i32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CombineParams {
    factors: [f32; 8],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ToneParams {
    exposure: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FxaaParams {
    inv_resolution: [f32; 2],
    _pad: [f32; 2],
}

pub(crate) fn create_target(
    device: &wgpu::Device,
    label: &str,
    (width, height): (u32, u32),
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn texture_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    filterable: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: HDR_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

pub(crate) fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn sampler_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

pub(crate) fn linear_clamp_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

pub(crate) fn shader(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
    })
}

fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Full-screen triangle pipeline writing one color target.
pub(crate) fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    fragment_entry: &str,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_fullscreen"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(fragment_entry),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

fn workgroups(size: (u32, u32)) -> (u32, u32) {
    (size.0.div_ceil(WORKGROUP), size.1.div_ceil(WORKGROUP))
}

/// Textures and bind groups that depend on the drawing-buffer size.
struct PostTargets {
    size: (u32, u32),
    glow_source: wgpu::TextureView,
    base: wgpu::TextureView,
    depth: wgpu::TextureView,
    ldr: wgpu::TextureView,
    output: wgpu::Texture,
    output_view: wgpu::TextureView,
    mip_sizes: [(u32, u32); BLOOM_MIPS],
    bright: wgpu::BindGroup,
    downsample: Vec<wgpu::BindGroup>,
    blur_h: Vec<wgpu::BindGroup>,
    blur_v: Vec<wgpu::BindGroup>,
    combine: wgpu::BindGroup,
    composite: wgpu::BindGroup,
    fxaa: wgpu::BindGroup,
}

/// Size-independent pipelines, layouts and parameter buffers.
struct PostResources {
    io_layout: wgpu::BindGroupLayout,
    combine_layout: wgpu::BindGroupLayout,
    composite_layout: wgpu::BindGroupLayout,
    fxaa_layout: wgpu::BindGroupLayout,
    bright_pipeline: wgpu::ComputePipeline,
    downsample_pipeline: wgpu::ComputePipeline,
    blur_pipeline: wgpu::ComputePipeline,
    combine_pipeline: wgpu::ComputePipeline,
    composite_pipeline: wgpu::RenderPipeline,
    fxaa_pipeline: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    bright_params: wgpu::Buffer,
    blur_params: Vec<(wgpu::Buffer, wgpu::Buffer)>,
    combine_params: wgpu::Buffer,
    tone_params: wgpu::Buffer,
    fxaa_params: wgpu::Buffer,
}

/// GPU resources for everything after the scene passes.
pub struct PostChain {
    resources: PostResources,
    targets: PostTargets,
}

impl PostResources {
    fn new(device: &wgpu::Device) -> Self {
        let compute = wgpu::ShaderStages::COMPUTE;
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let io_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bloom_io_layout"),
            entries: &[
                texture_entry(0, compute, false),
                storage_entry(1),
                uniform_entry(2, compute),
            ],
        });
        let combine_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bloom_combine_layout"),
            entries: &[
                texture_entry(0, compute, true),
                texture_entry(1, compute, true),
                texture_entry(2, compute, true),
                texture_entry(3, compute, true),
                texture_entry(4, compute, true),
                sampler_entry(5, compute),
                storage_entry(6),
                uniform_entry(7, compute),
            ],
        });
        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite_layout"),
            entries: &[
                texture_entry(0, fragment, false),
                texture_entry(1, fragment, false),
                uniform_entry(2, fragment),
            ],
        });
        let fxaa_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fxaa_layout"),
            entries: &[
                texture_entry(0, fragment, true),
                sampler_entry(1, fragment),
                uniform_entry(2, fragment),
            ],
        });

        let layout = |label: &str, group: &wgpu::BindGroupLayout| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[group],
                push_constant_ranges: &[],
            })
        };
        let io_pipeline_layout = layout("bloom_io_pipeline_layout", &io_layout);
        let combine_pipeline_layout = layout("bloom_combine_pipeline_layout", &combine_layout);
        let composite_pipeline_layout = layout("composite_pipeline_layout", &composite_layout);
        let fxaa_pipeline_layout = layout("fxaa_pipeline_layout", &fxaa_layout);

        let bloom_shader = shader(device, "bloom_shader", include_str!("shaders/bloom.wgsl"));
        let combine_shader = shader(
            device,
            "bloom_combine_shader",
            include_str!("shaders/bloom_combine.wgsl"),
        );
        let composite_shader = shader(
            device,
            "composite_shader",
            include_str!("shaders/composite.wgsl"),
        );
        let fxaa_shader = shader(device, "fxaa_shader", include_str!("shaders/fxaa.wgsl"));

        let blur_params = BLOOM_KERNEL_RADII
            .iter()
            .map(|radius| {
                let params = |direction: [i32; 2]| BloomParams {
                    threshold: 0.0,
                    knee: SOFT_KNEE,
                    radius: *radius as f32,
                    _pad0: 0.0,
                    direction,
                    _pad1: [0; 2],
                };
                let buffer = |label: &str, params: BloomParams| {
                    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(label),
                        contents: bytemuck::bytes_of(&params),
                        usage: wgpu::BufferUsages::UNIFORM,
                    })
                };
                (
                    buffer("bloom_blur_h_params", params([1, 0])),
                    buffer("bloom_blur_v_params", params([0, 1])),
                )
            })
            .collect();
        let uniform = |label: &str, size: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let bright_params = uniform("bloom_bright_params", std::mem::size_of::<BloomParams>());
        let combine_params = uniform("bloom_combine_params", std::mem::size_of::<CombineParams>());
        let tone_params = uniform("tone_params", std::mem::size_of::<ToneParams>());
        let fxaa_params = uniform("fxaa_params", std::mem::size_of::<FxaaParams>());
        let sampler = linear_clamp_sampler(device, "post_sampler");

        Self {
            bright_pipeline: compute_pipeline(
                device,
                "bloom_bright_pipeline",
                &io_pipeline_layout,
                &bloom_shader,
                "bright_pass",
            ),
            downsample_pipeline: compute_pipeline(
                device,
                "bloom_downsample_pipeline",
                &io_pipeline_layout,
                &bloom_shader,
                "downsample",
            ),
            blur_pipeline: compute_pipeline(
                device,
                "bloom_blur_pipeline",
                &io_pipeline_layout,
                &bloom_shader,
                "blur",
            ),
            combine_pipeline: compute_pipeline(
                device,
                "bloom_combine_pipeline",
                &combine_pipeline_layout,
                &combine_shader,
                "combine",
            ),
            composite_pipeline: fullscreen_pipeline(
                device,
                "composite_pipeline",
                &composite_pipeline_layout,
                &composite_shader,
                "fs_composite",
                OUTPUT_FORMAT,
            ),
            fxaa_pipeline: fullscreen_pipeline(
                device,
                "fxaa_pipeline",
                &fxaa_pipeline_layout,
                &fxaa_shader,
                "fs_fxaa",
                OUTPUT_FORMAT,
            ),
            io_layout,
            combine_layout,
            composite_layout,
            fxaa_layout,
            sampler,
            bright_params,
            blur_params,
            combine_params,
            tone_params,
            fxaa_params,
        }
    }

    fn targets(&self, device: &wgpu::Device, size: (u32, u32)) -> PostTargets {
        let attachment =
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let storage = wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING;
        let (_, glow_source) = create_target(device, "glow_source", size, HDR_FORMAT, attachment);
        let (_, base) = create_target(device, "base_color", size, HDR_FORMAT, attachment);
        let (_, depth) = create_target(
            device,
            "scene_depth",
            size,
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        let (_, glow) = create_target(device, "bloom_glow", size, HDR_FORMAT, storage);
        let (_, ldr) = create_target(device, "tone_mapped", size, OUTPUT_FORMAT, attachment);
        let (output, output_view) = create_target(
            device,
            "frame_output",
            size,
            OUTPUT_FORMAT,
            attachment | wgpu::TextureUsages::COPY_SRC,
        );

        let sizes = mip_sizes(size.0, size.1);
        let mips: Vec<wgpu::TextureView> = sizes
            .iter()
            .map(|mip| create_target(device, "bloom_mip", *mip, HDR_FORMAT, storage).1)
            .collect();
        let scratch: Vec<wgpu::TextureView> = sizes
            .iter()
            .map(|mip| create_target(device, "bloom_scratch", *mip, HDR_FORMAT, storage).1)
            .collect();

        let io_group = |label: &str,
                        src: &wgpu::TextureView,
                        dst: &wgpu::TextureView,
                        params: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.io_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(src),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(dst),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };
        let bright = io_group("bloom_bright_group", &glow_source, &mips[0], &self.bright_params);
        let downsample = (1..BLOOM_MIPS)
            .map(|i| {
                io_group("bloom_downsample_group", &mips[i - 1], &mips[i], &self.bright_params)
            })
            .collect();
        let blur_h = (0..BLOOM_MIPS)
            .map(|i| io_group("bloom_blur_h_group", &mips[i], &scratch[i], &self.blur_params[i].0))
            .collect();
        let blur_v = (0..BLOOM_MIPS)
            .map(|i| io_group("bloom_blur_v_group", &scratch[i], &mips[i], &self.blur_params[i].1))
            .collect();

        let mut combine_entries: Vec<wgpu::BindGroupEntry> = mips
            .iter()
            .enumerate()
            .map(|(i, view)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        combine_entries.extend([
            wgpu::BindGroupEntry {
                binding: 5,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 6,
                resource: wgpu::BindingResource::TextureView(&glow),
            },
            wgpu::BindGroupEntry {
                binding: 7,
                resource: self.combine_params.as_entire_binding(),
            },
        ]);
        let combine = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bloom_combine_group"),
            layout: &self.combine_layout,
            entries: &combine_entries,
        });
        let composite = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite_group"),
            layout: &self.composite_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&base),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&glow),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.tone_params.as_entire_binding(),
                },
            ],
        });
        let fxaa = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fxaa_group"),
            layout: &self.fxaa_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&ldr),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.fxaa_params.as_entire_binding(),
                },
            ],
        });

        PostTargets {
            size,
            glow_source,
            base,
            depth,
            ldr,
            output,
            output_view,
            mip_sizes: sizes,
            bright,
            downsample,
            blur_h,
            blur_v,
            combine,
            composite,
            fxaa,
        }
    }
}

impl PostChain {
    pub fn new(device: &wgpu::Device, size: (u32, u32)) -> Self {
        let resources = PostResources::new(device);
        let targets = resources.targets(device, size);
        Self { resources, targets }
    }

    pub fn size(&self) -> (u32, u32) {
        self.targets.size
    }

    pub fn glow_source_view(&self) -> &wgpu::TextureView {
        &self.targets.glow_source
    }

    pub fn base_view(&self) -> &wgpu::TextureView {
        &self.targets.base
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.targets.depth
    }

    /// Final 8-bit frame after FXAA.
    pub fn output(&self) -> &wgpu::Texture {
        &self.targets.output
    }

    pub fn output_view(&self) -> &wgpu::TextureView {
        &self.targets.output_view
    }

    /// Recreate every size-dependent texture and bind group.
    pub fn resize(&mut self, device: &wgpu::Device, size: (u32, u32)) {
        if self.targets.size != size {
            self.targets = self.resources.targets(device, size);
        }
    }

    /// Record bloom, composite and FXAA. The scene passes must already have
    /// filled the glow source and base targets.
    pub fn encode(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        bloom: &BloomPass,
        exposure: f32,
        fxaa: Fxaa,
    ) {
        let res = &self.resources;
        let factors = bloom.mip_factors();
        let mut packed = [0.0; 8];
        packed[..BLOOM_MIPS].copy_from_slice(&factors);
        queue.write_buffer(
            &res.bright_params,
            0,
            bytemuck::bytes_of(&BloomParams {
                threshold: bloom.threshold,
                knee: SOFT_KNEE,
                radius: 0.0,
                _pad0: 0.0,
                direction: [0; 2],
                _pad1: [0; 2],
            }),
        );
        queue.write_buffer(
            &res.combine_params,
            0,
            bytemuck::bytes_of(&CombineParams { factors: packed }),
        );
        queue.write_buffer(
            &res.tone_params,
            0,
            bytemuck::bytes_of(&ToneParams {
                exposure,
                _pad: [0.0; 3],
            }),
        );
        queue.write_buffer(
            &res.fxaa_params,
            0,
            bytemuck::bytes_of(&FxaaParams {
                inv_resolution: fxaa.inv_resolution.to_array(),
                _pad: [0.0; 2],
            }),
        );

        let targets = &self.targets;
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("bloom_pass"),
                timestamp_writes: None,
            });
            let dispatch = |pass: &mut wgpu::ComputePass<'_>, size: (u32, u32)| {
                let (x, y) = workgroups(size);
                pass.dispatch_workgroups(x, y, 1);
            };
            pass.set_pipeline(&res.bright_pipeline);
            pass.set_bind_group(0, &targets.bright, &[]);
            dispatch(&mut pass, targets.mip_sizes[0]);

            pass.set_pipeline(&res.downsample_pipeline);
            for (group, size) in targets.downsample.iter().zip(&targets.mip_sizes[1..]) {
                pass.set_bind_group(0, group, &[]);
                dispatch(&mut pass, *size);
            }

            pass.set_pipeline(&res.blur_pipeline);
            for mip in 0..BLOOM_MIPS {
                pass.set_bind_group(0, &targets.blur_h[mip], &[]);
                dispatch(&mut pass, targets.mip_sizes[mip]);
                pass.set_bind_group(0, &targets.blur_v[mip], &[]);
                dispatch(&mut pass, targets.mip_sizes[mip]);
            }

            pass.set_pipeline(&res.combine_pipeline);
            pass.set_bind_group(0, &targets.combine, &[]);
            dispatch(&mut pass, targets.size);
        }

        let ldr_pass = |encoder: &mut wgpu::CommandEncoder,
                        label: &str,
                        view: &wgpu::TextureView,
                        pipeline: &wgpu::RenderPipeline,
                        group: &wgpu::BindGroup| {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, group, &[]);
            pass.draw(0..3, 0..1);
        };
        ldr_pass(
            encoder,
            "composite_pass",
            &targets.ldr,
            &res.composite_pipeline,
            &targets.composite,
        );
        ldr_pass(
            encoder,
            "fxaa_pass",
            &targets.output_view,
            &res.fxaa_pipeline,
            &targets.fxaa,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_moves_weight_to_wide_mips() {
        let narrow = BloomPass { strength: 1.0, radius: 0.0, threshold: 0.0 }.mip_factors();
        let wide = BloomPass { strength: 1.0, radius: 1.0, threshold: 0.0 }.mip_factors();
        assert_eq!(narrow, BLOOM_FACTORS);
        assert!(wide[4] > narrow[4]);
        assert!(wide[0] < narrow[0]);
    }

    #[test]
    fn zero_strength_weights_every_mip_to_zero() {
        let factors = BloomPass { strength: 0.0, radius: 0.7, threshold: 1.0 }.mip_factors();
        assert!(factors.iter().all(|f| *f == 0.0));
    }

    #[test]
    fn mip_chain_halves_down_to_one_texel() {
        assert_eq!(
            mip_sizes(64, 20),
            [(32, 10), (16, 5), (8, 2), (4, 1), (2, 1)]
        );
        assert_eq!(mip_sizes(1, 1), [(1, 1); BLOOM_MIPS]);
    }

    #[test]
    fn fxaa_texel_follows_size() {
        assert_eq!(Fxaa::for_size(200, 100).inv_resolution, Vec2::new(0.005, 0.01));
        assert_eq!(Fxaa::for_size(0, 0).inv_resolution, Vec2::ONE);
    }

    #[test]
    fn uniform_blocks_match_shader_layout() {
        assert_eq!(std::mem::size_of::<BloomParams>(), 32);
        assert_eq!(std::mem::size_of::<CombineParams>(), 32);
        assert_eq!(std::mem::size_of::<ToneParams>(), 16);
        assert_eq!(std::mem::size_of::<FxaaParams>(), 16);
    }
}
