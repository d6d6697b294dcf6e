//! Interactive window: winit event loop, wgpu surface and the egui overlay.

use super::egui_host::EguiHost;
use super::input::InputState;
use super::timing::FrameTiming;
use super::{AppError, Session, ViewArgs};
use crate::render::present::Presenter;
use crate::render::{BloomRenderer, GpuContext, RenderError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

/// Surface and renderers, created once the window exists.
struct WindowGpu {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    renderer: BloomRenderer,
    presenter: Presenter,
    egui: EguiHost,
}

impl WindowGpu {
    fn new(window: &Arc<Window>) -> Result<Self, RenderError> {
        let instance = GpuContext::new_instance();
        let surface = instance.create_surface(Arc::clone(window))?;
        let gpu = Arc::new(GpuContext::for_surface(instance, &surface)?);

        let caps = surface.get_capabilities(&gpu.adapter);
        // The post chain already encodes sRGB.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or(RenderError::UnsupportedSurface)?;
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);
        log::info!("Surface {:?} {}x{}", format, config.width, config.height);

        let scale = window.scale_factor();
        let logical: LogicalSize<u32> = size.to_logical(scale);
        let renderer = BloomRenderer::new(
            Arc::clone(&gpu),
            logical.width,
            logical.height,
            scale as f32,
        );
        let mut presenter = Presenter::new(&gpu.device, format);
        presenter.bind(&gpu.device, renderer.output_view());
        let egui = EguiHost::new(window, &gpu.device, format);
        Ok(Self {
            surface,
            config,
            renderer,
            presenter,
            egui,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>, scale: f64) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        let device = &self.renderer.gpu().device;
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(device, &self.config);
        let logical: LogicalSize<u32> = size.to_logical(scale);
        self.renderer.resize(logical.width, logical.height, scale as f32);
        let device = &self.renderer.gpu().device;
        self.presenter.bind(device, self.renderer.output_view());
    }
}

struct WindowApp<'a, S: Session> {
    session: &'a mut S,
    view: &'a ViewArgs,
    window: Option<Arc<Window>>,
    gpu: Option<WindowGpu>,
    input: InputState,
    timing: FrameTiming,
    target_frame_duration: Duration,
    next_frame_time: Instant,
    error: Option<AppError>,
}

impl<'a, S: Session> WindowApp<'a, S> {
    fn new(session: &'a mut S, view: &'a ViewArgs) -> Self {
        let label = session.title().to_string();
        Self {
            session,
            view,
            window: None,
            gpu: None,
            input: InputState::default(),
            timing: FrameTiming::new(label),
            target_frame_duration: Duration::from_millis(16),
            next_frame_time: Instant::now(),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: AppError) {
        log::error!("{}", err);
        self.error = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<(), RenderError> {
        let (Some(window), Some(gpu)) = (self.window.as_ref(), self.gpu.as_mut()) else {
            return Ok(());
        };
        let frame_start = Instant::now();
        self.session.poll_loads();
        let session = &mut *self.session;
        let ui = gpu.egui.run_ui(window, |ctx| session.ui(ctx));
        self.session.update();
        gpu.renderer.apply_settings(self.session.settings());
        gpu.renderer.background = self.session.background();

        let surface_texture = match gpu.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface out of date, reconfiguring");
                gpu.surface.configure(&gpu.renderer.gpu().device, &gpu.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface timed out, skipping frame");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let target = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let context = Arc::clone(gpu.renderer.gpu());
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("window_frame_encoder"),
            });
        let render_start = Instant::now();
        gpu.renderer.encode(&self.session.frame_inputs(), &mut encoder);
        gpu.presenter.encode(&mut encoder, &target);
        let extra = gpu
            .egui
            .paint(&context.device, &context.queue, &mut encoder, &target, ui);
        context
            .queue
            .submit(extra.into_iter().chain(std::iter::once(encoder.finish())));
        window.pre_present_notify();
        surface_texture.present();

        self.timing
            .set_render_ms(render_start.elapsed().as_secs_f32() * 1000.0);
        self.timing.update(frame_start);
        Ok(())
    }

    fn viewport(&self) -> (u32, u32) {
        self.window
            .as_ref()
            .map(|window| {
                let size = window.inner_size();
                (size.width.max(1), size.height.max(1))
            })
            .unwrap_or((1, 1))
    }
}

impl<S: Session> ApplicationHandler for WindowApp<'_, S> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = WindowAttributes::default()
            .with_title(self.session.title())
            .with_inner_size(LogicalSize::new(self.view.width, self.view.height))
            .with_resizable(true);
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => return self.fail(event_loop, AppError::Window(err.to_string())),
        };
        match WindowGpu::new(&window) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(err) => return self.fail(event_loop, err.into()),
        }
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };
        let consumed = self
            .gpu
            .as_mut()
            .map(|gpu| gpu.egui.on_window_event(&window, &event))
            .unwrap_or(false);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.resize(size, window.scale_factor());
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.resize(window.inner_size(), scale_factor);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err.into());
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    event_loop.exit();
                    return;
                }
                if consumed {
                    return;
                }
                let pressed = event.state.is_pressed();
                if let Some(input) = self.input.handle_key(event.physical_key, pressed) {
                    let viewport = self.viewport();
                    self.session.input(input, viewport);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let moved = self.input.cursor_moved(position.x as f32, position.y as f32);
                if let Some(input) = moved {
                    let viewport = self.viewport();
                    self.session.input(input, viewport);
                }
            }
            WindowEvent::CursorLeft { .. } => self.input.cursor_left(),
            WindowEvent::MouseInput { state, button, .. } => {
                // Presses over a panel stay with egui; releases always reach
                // the session so drags end.
                if consumed && state.is_pressed() {
                    return;
                }
                if let Some(input) = self.input.mouse_button(button, state) {
                    let viewport = self.viewport();
                    self.session.input(input, viewport);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let over_ui = self.gpu.as_ref().is_some_and(|gpu| gpu.egui.wants_pointer());
                if !consumed && !over_ui {
                    let input = self.input.wheel(delta);
                    let viewport = self.viewport();
                    self.session.input(input, viewport);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_frame_time {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
            self.next_frame_time = now + self.target_frame_duration;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame_time));
    }
}

/// Run `session` in a window until it is closed.
pub fn run<S: Session>(session: &mut S, view: &ViewArgs) -> Result<(), AppError> {
    let event_loop = EventLoop::new().map_err(|err| AppError::Window(err.to_string()))?;
    event_loop.set_control_flow(ControlFlow::Wait);
    let mut app = WindowApp::new(session, view);
    event_loop
        .run_app(&mut app)
        .map_err(|err| AppError::Window(err.to_string()))?;
    log::info!("Window closed after {} frames", app.timing.total_frames());
    match app.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
