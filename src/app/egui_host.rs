//! egui on a winit window: input through egui-winit, painting through
//! egui-wgpu on top of the presented frame.

use winit::event::WindowEvent;
use winit::window::Window;

pub struct EguiFrame {
    primitives: Vec<egui::ClippedPrimitive>,
    textures: egui::TexturesDelta,
    screen: egui_wgpu::ScreenDescriptor,
}

pub struct EguiHost {
    context: egui::Context,
    winit_state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
}

impl EguiHost {
    pub fn new(window: &Window, device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let context = egui::Context::default();
        let winit_state = egui_winit::State::new(
            context.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        Self {
            context,
            winit_state,
            renderer: egui_wgpu::Renderer::new(device, format, None, 1, false),
        }
    }

    /// True when egui wants the event for itself.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.winit_state.on_window_event(window, event).consumed
    }

    pub fn wants_pointer(&self) -> bool {
        self.context.wants_pointer_input()
    }

    pub fn run_ui(&mut self, window: &Window, run_ui: impl FnMut(&egui::Context)) -> EguiFrame {
        let raw_input = self.winit_state.take_egui_input(window);
        let output = self.context.run(raw_input, run_ui);
        self.winit_state
            .handle_platform_output(window, output.platform_output);
        let pixels_per_point = output.pixels_per_point;
        let size = window.inner_size();
        EguiFrame {
            primitives: self.context.tessellate(output.shapes, pixels_per_point),
            textures: output.textures_delta,
            screen: egui_wgpu::ScreenDescriptor {
                size_in_pixels: [size.width.max(1), size.height.max(1)],
                pixels_per_point,
            },
        }
    }

    /// Record the UI over `target`. Returns extra command buffers egui-wgpu
    /// asked for; submit them before `encoder`.
    pub fn paint(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        frame: EguiFrame,
    ) -> Vec<wgpu::CommandBuffer> {
        for (id, delta) in &frame.textures.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        let extra = self.renderer.update_buffers(
            device,
            queue,
            encoder,
            &frame.primitives,
            &frame.screen,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
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
            self.renderer
                .render(&mut pass, &frame.primitives, &frame.screen);
        }
        for id in &frame.textures.free {
            self.renderer.free_texture(id);
        }
        extra
    }
}
