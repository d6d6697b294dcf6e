//! Frame rendering on wgpu.
//!
//! A frame is a glow pass over bloom-layer geometry, a base pass over the
//! whole scene with overlay geometry on top, then the bloom, composite, tone
//! mapping and FXAA chain from [`post`]. [`BloomRenderer`] records into an
//! encoder for the window or reads the frame back for PNG output.

pub mod camera;
pub mod gpu;
pub mod pick;
pub mod post;
pub mod present;
pub mod scene_pass;
pub mod shading;

pub use camera::{CameraController, OrbitControls};
pub use gpu::GpuContext;
pub use pick::{pick, PickHit, PickKind, Ray};

use crate::assets::EnvironmentMap;
use crate::scene::{GlobalSettings, MaterialRegistry, SceneGraph};
use glam::Vec3;
use image::RgbaImage;
use post::{BloomPass, Fxaa, PostChain};
use scene_pass::{FramePlan, ScenePass};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to write frame {path}: {source}")]
    WriteFrame {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to open GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("failed to create window surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("window surface reports no usable format")]
    UnsupportedSurface,
    #[error("surface lost: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("frame readback failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("frame readback returned no data")]
    ReadbackLost,
}

pub const DEFAULT_CLEAR_COLOR: Vec3 = Vec3::new(0.1, 0.1, 0.2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Background {
    Solid(Vec3),
    /// Show the environment panorama when one is loaded.
    Environment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub glow_nodes: usize,
    pub scene_nodes: usize,
    pub overlay_nodes: usize,
    pub triangles: usize,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    pub stats: FrameStats,
}

impl Frame {
    pub fn save_png(&self, path: &Path) -> Result<(), RenderError> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|source| RenderError::WriteFrame {
                path: path.display().to_string(),
                source,
            })
    }
}

/// Everything a frame reads besides the renderer's own state.
pub struct FrameInputs<'a> {
    pub scene: &'a SceneGraph,
    pub materials: &'a MaterialRegistry,
    pub camera: &'a CameraController,
    pub environment: Option<&'a EnvironmentMap>,
}

/// Drawing-buffer size for a CSS-pixel size and pixel ratio. Bad ratios fall
/// back to 1.
pub fn scaled_size(width: u32, height: u32, pixel_ratio: f32) -> (u32, u32, f32) {
    let pixel_ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
        pixel_ratio
    } else {
        1.0
    };
    let scale = |value: u32| ((value.max(1) as f32 * pixel_ratio).round() as u32).max(1);
    (scale(width), scale(height), pixel_ratio)
}

/// Two-pass renderer: a glow pass over bloom-layer geometry, a base pass over
/// the full scene, then additive composite, tone mapping and FXAA.
///
/// Layer masks pick what each pass draws; material handles are never
/// touched.
pub struct BloomRenderer {
    gpu: Arc<GpuContext>,
    width: u32,
    height: u32,
    pixel_ratio: f32,
    target_width: u32,
    target_height: u32,
    fxaa: Fxaa,
    pub bloom: BloomPass,
    pub exposure: f32,
    pub background: Background,
    pub show_helpers: bool,
    scene_pass: ScenePass,
    post: PostChain,
}

impl BloomRenderer {
    pub fn new(gpu: Arc<GpuContext>, width: u32, height: u32, pixel_ratio: f32) -> Self {
        let settings = GlobalSettings::default();
        let (target_width, target_height, pixel_ratio) = scaled_size(width, height, pixel_ratio);
        let scene_pass = ScenePass::new(&gpu.device);
        let post = PostChain::new(&gpu.device, (target_width, target_height));
        Self {
            width: width.max(1),
            height: height.max(1),
            pixel_ratio,
            target_width,
            target_height,
            fxaa: Fxaa::for_size(target_width, target_height),
            bloom: BloomPass {
                strength: settings.bloom_strength,
                radius: settings.bloom_radius,
                threshold: settings.bloom_threshold,
            },
            exposure: settings.exposure,
            background: Background::Solid(DEFAULT_CLEAR_COLOR),
            show_helpers: settings.debug_helpers,
            scene_pass,
            post,
            gpu,
        }
    }

    /// Recompute target sizes and the FXAA texel size, rebuilding the render
    /// targets when the drawing-buffer size moved.
    pub fn resize(&mut self, width: u32, height: u32, pixel_ratio: f32) {
        let (target_width, target_height, pixel_ratio) = scaled_size(width, height, pixel_ratio);
        self.width = width.max(1);
        self.height = height.max(1);
        self.pixel_ratio = pixel_ratio;
        self.target_width = target_width;
        self.target_height = target_height;
        self.fxaa = Fxaa::for_size(target_width, target_height);
        self.post.resize(&self.gpu.device, (target_width, target_height));
        log::debug!(
            "Render targets resized to {}x{} (pixel ratio {})",
            target_width,
            target_height,
            pixel_ratio
        );
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn fxaa(&self) -> Fxaa {
        self.fxaa
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    /// The tone-mapped, anti-aliased frame as last encoded.
    pub fn output_view(&self) -> &wgpu::TextureView {
        self.post.output_view()
    }

    pub fn apply_settings(&mut self, settings: &GlobalSettings) {
        self.exposure = settings.exposure;
        self.bloom = BloomPass {
            strength: settings.bloom_strength,
            radius: settings.bloom_radius,
            threshold: settings.bloom_threshold,
        };
        self.show_helpers = settings.debug_helpers;
    }

    /// Record one frame: glow pass, base pass, bloom, composite, tone map
    /// and FXAA.
    pub fn encode(
        &mut self,
        inputs: &FrameInputs<'_>,
        encoder: &mut wgpu::CommandEncoder,
    ) -> FrameStats {
        let plan = FramePlan::build(inputs.scene, self.show_helpers);
        let aspect = self.target_width as f32 / self.target_height as f32;
        self.scene_pass.encode(
            &self.gpu,
            encoder,
            &self.post,
            &plan,
            inputs,
            self.background,
            aspect,
        );
        self.post
            .encode(&self.gpu.queue, encoder, &self.bloom, self.exposure, self.fxaa);
        log::trace!(
            "Frame {}x{}: {} scene nodes, {} glowing, {} triangles",
            self.target_width,
            self.target_height,
            plan.stats.scene_nodes,
            plan.stats.glow_nodes,
            plan.stats.triangles
        );
        plan.stats
    }

    /// Render one frame offscreen and read it back.
    pub fn render(&mut self, inputs: &FrameInputs<'_>) -> Result<Frame, RenderError> {
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        let stats = self.encode(inputs, &mut encoder);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        let image = gpu::read_rgba8(&self.gpu, self.post.output())?;
        Ok(Frame { image, stats })
    }

    /// Meshes with buffers resident on the GPU.
    pub fn cached_meshes(&self) -> usize {
        self.scene_pass.cached_meshes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{LightKind, LightNode, Material, MeshData, MeshNode, NodeId, NodeKind};
    use crate::scene::{RenderLayers, ShadingModel};

    fn quad(size: f32) -> Arc<MeshData> {
        let h = size / 2.0;
        Arc::new(MeshData {
            positions: vec![
                Vec3::new(-h, -h, 0.0),
                Vec3::new(h, -h, 0.0),
                Vec3::new(h, h, 0.0),
                Vec3::new(-h, h, 0.0),
            ],
            normals: vec![Vec3::Z; 4],
            indices: vec![0, 1, 2, 0, 2, 3],
        })
    }

    struct Fixture {
        scene: SceneGraph,
        materials: MaterialRegistry,
    }

    fn fixture() -> Fixture {
        let mut scene = SceneGraph::new();
        let mut materials = MaterialRegistry::new();
        let mut glowing = Material::standard("Pattern", Vec3::ONE);
        glowing.emissive = Vec3::ONE;
        glowing.emissive_intensity = 4.0;
        let glow_material = materials.insert(glowing);
        let body_material = materials.insert(Material::standard("Body", Vec3::splat(0.9)));

        let glow = scene.add(
            None,
            "Star_Pattern",
            NodeKind::Mesh(MeshNode {
                mesh: quad(0.6),
                material: glow_material,
            }),
        );
        scene.get_mut(glow).unwrap().layers = RenderLayers::SCENE.with(RenderLayers::BLOOM);
        let body = scene.add(
            None,
            "Base",
            NodeKind::Mesh(MeshNode {
                mesh: quad(2.0),
                material: body_material,
            }),
        );
        scene.get_mut(body).unwrap().transform.translation = Vec3::new(1.5, 0.0, -0.5);
        scene.add(
            None,
            "Sun",
            NodeKind::Light(LightNode::new(LightKind::Directional, Vec3::ONE, 3.0)),
        );
        Fixture { scene, materials }
    }

    fn handles(scene: &SceneGraph) -> Vec<(NodeId, crate::scene::MaterialHandle)> {
        scene
            .mesh_ids()
            .into_iter()
            .map(|id| (id, scene.get(id).unwrap().as_mesh().unwrap().material))
            .collect()
    }

    fn gpu() -> Option<Arc<GpuContext>> {
        match GpuContext::headless() {
            Ok(gpu) => Some(Arc::new(gpu)),
            Err(err) => {
                eprintln!("Skipping GPU test: {}", err);
                None
            }
        }
    }

    #[test]
    fn scaled_size_applies_pixel_ratio() {
        assert_eq!(scaled_size(100, 50, 2.0), (200, 100, 2.0));
        assert_eq!(scaled_size(40, 30, 1.5), (60, 45, 1.5));
        assert_eq!(scaled_size(0, 0, f32::NAN), (1, 1, 1.0));
    }

    #[test]
    fn resize_updates_targets_and_fxaa() {
        let Some(gpu) = gpu() else { return };
        let mut renderer = BloomRenderer::new(gpu, 64, 32, 1.0);
        assert_eq!(renderer.target_size(), (64, 32));
        renderer.resize(100, 50, 2.0);
        assert_eq!(renderer.target_size(), (200, 100));
        assert_eq!(renderer.fxaa().inv_resolution, glam::Vec2::new(1.0 / 200.0, 1.0 / 100.0));
    }

    #[test]
    fn frame_matches_target_size() {
        let Some(gpu) = gpu() else { return };
        let fixture = fixture();
        let mut renderer = BloomRenderer::new(gpu, 40, 30, 1.5);
        let camera = CameraController::default();
        let frame = renderer
            .render(&FrameInputs {
                scene: &fixture.scene,
                materials: &fixture.materials,
                camera: &camera,
                environment: None,
            })
            .unwrap();
        assert_eq!(frame.image.dimensions(), (60, 45));
        assert_eq!(frame.stats.glow_nodes, 1);
        assert_eq!(frame.stats.scene_nodes, 2);
        assert_eq!(renderer.cached_meshes(), 2);
    }

    #[test]
    fn rendering_never_changes_material_handles() {
        let Some(gpu) = gpu() else { return };
        let fixture = fixture();
        let before = handles(&fixture.scene);
        let mut renderer = BloomRenderer::new(gpu, 24, 24, 1.0);
        let camera = CameraController::default();
        for _ in 0..2 {
            renderer
                .render(&FrameInputs {
                    scene: &fixture.scene,
                    materials: &fixture.materials,
                    camera: &camera,
                    environment: None,
                })
                .unwrap();
        }
        assert_eq!(handles(&fixture.scene), before);
    }

    #[test]
    fn bloom_brightens_around_glowing_geometry() {
        let Some(gpu) = gpu() else { return };
        let fixture = fixture();
        let camera = CameraController::default();
        let inputs = FrameInputs {
            scene: &fixture.scene,
            materials: &fixture.materials,
            camera: &camera,
            environment: None,
        };
        let mut without = BloomRenderer::new(Arc::clone(&gpu), 48, 48, 1.0);
        without.bloom.strength = 0.0;
        without.background = Background::Solid(Vec3::ZERO);
        let mut with = BloomRenderer::new(gpu, 48, 48, 1.0);
        with.bloom.strength = 1.5;
        with.background = Background::Solid(Vec3::ZERO);

        // Just above the glowing quad, over empty background.
        let (x, y) = (24, 16);
        let dark = without.render(&inputs).unwrap().image.get_pixel(x, y)[0];
        let bright = with.render(&inputs).unwrap().image.get_pixel(x, y)[0];
        assert!(bright > dark, "{} <= {}", bright, dark);
    }

    #[test]
    fn unlit_overlay_is_drawn_over_scene() {
        let Some(gpu) = gpu() else { return };
        let mut fixture = fixture();
        let gizmo_material = fixture
            .materials
            .insert(Material::basic("Gizmo", Vec3::new(0.0, 1.0, 0.0)));
        assert_eq!(
            fixture.materials.get(gizmo_material).unwrap().model,
            ShadingModel::Basic
        );
        let handle = fixture.scene.add(
            None,
            "X",
            NodeKind::Mesh(MeshNode {
                mesh: quad(1.0),
                material: gizmo_material,
            }),
        );
        {
            let node = fixture.scene.get_mut(handle).unwrap();
            node.layers = RenderLayers::OVERLAY;
            node.transform.translation = Vec3::new(0.0, 0.0, -1.0);
        }
        let mut renderer = BloomRenderer::new(gpu, 32, 32, 1.0);
        renderer.bloom.strength = 0.0;
        let camera = CameraController::default();
        let frame = renderer
            .render(&FrameInputs {
                scene: &fixture.scene,
                materials: &fixture.materials,
                camera: &camera,
                environment: None,
            })
            .unwrap();
        assert_eq!(frame.stats.overlay_nodes, 1);
        let center = frame.image.get_pixel(16, 16);
        assert!(center[1] > 200 && center[0] < 50, "{:?}", center);
    }
}
