mod cli;
mod egui_host;
mod input;
mod loader;
mod timing;
mod window;

pub use cli::{parse, AddItem, CliError, Command, ViewArgs, USAGE};
pub use input::{KeyCommand, SessionInput};
pub use loader::{AssetLoader, LoadKind, LoadPayload, LoadResult, LoadingProgress};

use crate::assets::{all_image_paths, resolve_material_names};
use crate::config::{ConfigAction, ConfigField, Configuration};
use crate::configurator::Configurator;
use crate::editor::{Editor, EditorError};
use crate::render::{
    Background, BloomRenderer, CameraController, Frame, FrameInputs, GpuContext, Ray,
    RenderError, DEFAULT_CLEAR_COLOR,
};
use crate::scene::serialization::{
    load_settings_from_file, save_settings_to_file, SerializationError,
};
use crate::scene::GlobalSettings;
use crate::ui::{UiRequest, UiState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use timing::FrameTiming;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Cli(#[from] CliError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error("settings: {0}")]
    Settings(#[from] SerializationError),
    #[error("window: {0}")]
    Window(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// One of the two front ends over the shared stage. The window host and the
/// offscreen driver both run a session the same way: poll loads, build the
/// UI, apply its work, then draw [`Session::frame_inputs`].
pub trait Session {
    fn title(&self) -> &str;
    fn loader(&mut self) -> &mut AssetLoader;
    fn handle_load(&mut self, loaded: LoadResult);
    fn ui(&mut self, ctx: &egui::Context);
    /// Work queued by the UI, run after it.
    fn update(&mut self);
    fn settings(&self) -> &GlobalSettings;
    fn frame_inputs(&self) -> FrameInputs<'_>;

    /// Viewport input that egui did not take, in physical pixels of a
    /// `viewport`-sized window. Returns true when the scene or camera changed.
    fn input(&mut self, input: SessionInput, viewport: (u32, u32)) -> bool;

    fn background(&self) -> Background {
        Background::Solid(DEFAULT_CLEAR_COLOR)
    }

    fn poll_loads(&mut self) {
        for loaded in self.loader().poll() {
            self.handle_load(loaded);
        }
    }
}

fn pointer_ray(camera: &CameraController, x: f32, y: f32, viewport: (u32, u32)) -> Ray {
    let (origin, direction) = camera.ray_through_pixel(x, y, viewport.0, viewport.1);
    Ray::new(origin, direction)
}

/// Offscreen driver: UI context and frame pacing while loads settle, then a
/// single GPU frame.
struct Viewer {
    timing: FrameTiming,
    egui: egui::Context,
    screen: egui::Rect,
    target_frame_duration: Duration,
    next_frame_time: Instant,
}

impl Viewer {
    fn new(view: &ViewArgs, label: &str) -> Self {
        log::info!(
            "{}: {}x{} @ {}x",
            label,
            view.width,
            view.height,
            view.pixel_ratio
        );
        Self {
            timing: FrameTiming::new(label.to_string()),
            egui: egui::Context::default(),
            screen: egui::Rect::from_min_size(
                egui::Pos2::ZERO,
                egui::vec2(view.width as f32, view.height as f32),
            ),
            target_frame_duration: Duration::from_millis(16),
            next_frame_time: Instant::now(),
        }
    }

    fn raw_input(&self) -> egui::RawInput {
        egui::RawInput {
            screen_rect: Some(self.screen),
            ..Default::default()
        }
    }

    /// Run frames until every requested asset has arrived or failed, or the
    /// frame budget is spent. Returns the number of frames run.
    fn settle<S: Session>(&mut self, session: &mut S, max_frames: u32) -> u32 {
        let mut frames = 0;
        loop {
            let frame_start = Instant::now();
            session.poll_loads();
            let raw_input = self.raw_input();
            let _ = self.egui.run(raw_input, |ctx| session.ui(ctx));
            session.update();
            self.end_frame(frame_start);
            frames += 1;
            if session.loader().is_idle() || frames >= max_frames {
                return frames;
            }
        }
    }

    fn render<S: Session>(&mut self, session: &S, view: &ViewArgs) -> Result<Frame> {
        let gpu = Arc::new(GpuContext::headless()?);
        let mut renderer = BloomRenderer::new(gpu, view.width, view.height, view.pixel_ratio);
        renderer.apply_settings(session.settings());
        renderer.background = session.background();
        let start = Instant::now();
        let frame = renderer.render(&session.frame_inputs())?;
        self.timing
            .set_render_ms(start.elapsed().as_secs_f32() * 1000.0);
        Ok(frame)
    }

    fn finish<S: Session>(&self, session: &mut S) {
        let loader = session.loader();
        if !loader.is_idle() {
            log::warn!(
                "Frame budget spent with loads at {:.0}%",
                loader.progress().percent()
            );
        }
        if let Some(err) = loader.progress().last_error() {
            log::warn!(
                "{} of {} loads failed, last: {}",
                loader.progress().failed(),
                loader.progress().requested(),
                err
            );
        }
        log::info!("Settled after {} frames", self.timing.total_frames());
    }

    fn end_frame(&mut self, frame_start: Instant) {
        self.timing.update(frame_start);
        let now = Instant::now();
        if self.next_frame_time > now {
            std::thread::sleep(self.next_frame_time - now);
        }
        self.next_frame_time = (self.next_frame_time + self.target_frame_duration).max(now);
    }
}

/// Drive `session` in a window when asked to, otherwise offscreen. Only the
/// offscreen path produces a frame.
fn drive<S: Session>(session: &mut S, view: &ViewArgs) -> Result<Option<Frame>> {
    if view.window {
        if view.output.is_some() {
            log::warn!("--out is ignored in window mode");
        }
        window::run(session, view)?;
        return Ok(None);
    }
    let mut viewer = Viewer::new(view, session.title());
    viewer.settle(session, view.max_frames);
    viewer.finish(session);
    viewer.render(session, view).map(Some)
}

fn save_frame(frame: &Frame, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        frame.save_png(path)?;
        log::info!("Wrote {}", path.display());
    }
    Ok(())
}

/// Storefront: the configuration store drives finishes on the staged lamp.
struct Storefront {
    stage: Editor,
    configurator: Configurator,
    loader: AssetLoader,
    ui: UiState,
}

impl Storefront {
    fn new(config: Configuration, view: &ViewArgs) -> Self {
        let settings = GlobalSettings {
            debug_helpers: false,
            ..GlobalSettings::default()
        };
        let configurator = Configurator::new(config);
        log::info!("{} -> {}", config.title(), configurator.image_path());
        let mut loader = AssetLoader::new();
        if let Some(source) = &view.model {
            loader.request(LoadKind::Model, source.clone());
        }
        if let Some(source) = &view.environment {
            loader.request(LoadKind::Environment, source.clone());
        }
        Self {
            stage: Editor::new(settings),
            configurator,
            loader,
            ui: UiState::new(),
        }
    }
}

impl Session for Storefront {
    fn title(&self) -> &str {
        "lampviz storefront"
    }

    fn loader(&mut self) -> &mut AssetLoader {
        &mut self.loader
    }

    fn handle_load(&mut self, loaded: LoadResult) {
        match loaded.result {
            Ok(LoadPayload::Model(model)) => {
                self.stage.set_model(&model);
                if let Some(roles) = self.stage.model_roles() {
                    self.configurator.attach(roles.clone());
                }
            }
            Ok(LoadPayload::Environment(environment)) => self.stage.set_environment(environment),
            Err(err) => {
                let source = loaded.source.describe();
                log::warn!("Storefront continues without {}: {}", source, err);
                self.ui.set_status(format!("Failed to load {}: {}", source, err));
            }
        }
    }

    fn ui(&mut self, ctx: &egui::Context) {
        if self.ui.storefront_ui(ctx, &mut self.configurator) {
            log::debug!("Configuration changed to {}", self.configurator.state().title());
        }
    }

    fn update(&mut self) {
        let (scene, materials) = self.stage.stage_mut();
        if let Some(report) = self.configurator.sync(scene, materials) {
            log::debug!(
                "Applied {}: {} materials touched, {} fallbacks",
                self.configurator.state().title(),
                report.touched.len(),
                report.fallbacks.len()
            );
        }
    }

    fn settings(&self) -> &GlobalSettings {
        self.stage.settings()
    }

    fn frame_inputs(&self) -> FrameInputs<'_> {
        self.stage.frame_inputs()
    }

    fn input(&mut self, input: SessionInput, _viewport: (u32, u32)) -> bool {
        let step = match input {
            SessionInput::PointerMove {
                dx, dy, dragging, ..
            } => return dragging && self.stage.orbit(dx, dy),
            SessionInput::Zoom(amount) => return self.stage.zoom(amount),
            SessionInput::Key(KeyCommand::Next) => 1,
            SessionInput::Key(KeyCommand::Previous) => -1,
            _ => return false,
        };
        self.configurator.dispatch(ConfigAction::Cycle {
            field: ConfigField::Pattern,
            step,
        })
    }
}

/// Editor: the scene editor shell, scripted from the command line or driven
/// from the window.
struct EditorSession {
    editor: Editor,
    loader: AssetLoader,
    ui: UiState,
    pending: Vec<UiRequest>,
}

impl EditorSession {
    fn new(settings: Option<&Path>, view: &ViewArgs) -> Result<Self> {
        let settings = match settings {
            Some(path) => {
                let settings = load_settings_from_file(path)?;
                log::info!("Global settings read from {}", path.display());
                settings
            }
            None => GlobalSettings::default(),
        };
        let mut session = Self {
            editor: Editor::new(settings),
            loader: AssetLoader::new(),
            ui: UiState::new(),
            pending: Vec::new(),
        };
        if let Some(source) = &view.model {
            session.loader.request(LoadKind::Model, source.clone());
        }
        if let Some(source) = &view.environment {
            let path = source.describe();
            if let Some(request) = session.ui.environment_request(&path) {
                session.submit(request);
            }
        }
        Ok(session)
    }

    /// Toolbar actions given on the command line.
    fn script(&mut self, imports: &[String], additions: &[AddItem]) {
        for path in imports {
            if let Some(request) = self.ui.import_request(path) {
                self.submit(request);
            }
        }
        for item in additions {
            match item {
                AddItem::Light => {
                    self.editor.add_light();
                }
                AddItem::Primitive(shape) => {
                    self.editor.add_primitive(*shape);
                }
            }
        }
    }

    fn submit(&mut self, request: UiRequest) {
        match request {
            UiRequest::ImportModel(source) => {
                self.loader.request(LoadKind::Import, source);
            }
            UiRequest::LoadEnvironment(source) => {
                self.loader.request(LoadKind::Environment, source);
            }
            UiRequest::PickModel => {
                let picked = rfd::FileDialog::new()
                    .set_title("Import Model")
                    .add_filter("glTF", &["gltf", "glb"])
                    .pick_file();
                self.open_picked(picked, false);
            }
            UiRequest::PickEnvironment => {
                let picked = rfd::FileDialog::new()
                    .set_title("Load Environment")
                    .add_filter("Environment", &["hdr", "jpg", "jpeg", "png"])
                    .pick_file();
                self.open_picked(picked, true);
            }
        }
    }

    /// A path from the file dialog goes through the same checks as a typed
    /// one.
    fn open_picked(&mut self, picked: Option<PathBuf>, environment: bool) {
        let Some(path) = picked else {
            log::debug!("File dialog closed without a selection");
            return;
        };
        let path = path.display().to_string();
        let request = if environment {
            self.ui.environment_request(&path)
        } else {
            self.ui.import_request(&path)
        };
        if let Some(request) = request {
            self.submit(request);
        }
    }

    fn export(&mut self, export: Option<&Path>) -> Result<()> {
        if let Some(path) = export {
            self.editor.export_settings()?;
            save_settings_to_file(self.editor.settings(), path)?;
            log::info!("Global settings written to {}", path.display());
        }
        if !self.ui.status().is_empty() {
            log::info!("Status: {}", self.ui.status());
        }
        Ok(())
    }
}

impl Session for EditorSession {
    fn title(&self) -> &str {
        "lampviz editor"
    }

    fn loader(&mut self) -> &mut AssetLoader {
        &mut self.loader
    }

    fn handle_load(&mut self, loaded: LoadResult) {
        match loaded.result {
            Ok(LoadPayload::Model(model)) => {
                if loaded.kind == LoadKind::Import {
                    self.editor.insert_import(&model);
                } else {
                    self.editor.set_model(&model);
                }
                self.ui.set_status(format!("Loaded {}", loaded.source.describe()));
            }
            Ok(LoadPayload::Environment(environment)) => {
                self.ui.set_status(format!("Environment {}", environment.name));
                self.editor.set_environment(environment);
            }
            Err(err) => {
                let source = loaded.source.describe();
                log::warn!("Editor could not load {}: {}", source, err);
                self.ui.set_status(format!("Failed to load {}: {}", source, err));
            }
        }
    }

    fn ui(&mut self, ctx: &egui::Context) {
        let requests = self.ui.editor_ui(ctx, &mut self.editor);
        self.pending.extend(requests);
    }

    fn update(&mut self) {
        for request in std::mem::take(&mut self.pending) {
            self.submit(request);
        }
    }

    fn settings(&self) -> &GlobalSettings {
        self.editor.settings()
    }

    fn frame_inputs(&self) -> FrameInputs<'_> {
        self.editor.frame_inputs()
    }

    fn input(&mut self, input: SessionInput, viewport: (u32, u32)) -> bool {
        match input {
            SessionInput::PointerDown { x, y } => {
                let ray = pointer_ray(self.editor.camera(), x, y, viewport);
                self.editor.pointer_down(&ray)
            }
            SessionInput::PointerMove {
                x,
                y,
                dx,
                dy,
                dragging,
            } => {
                if !dragging {
                    return false;
                }
                let ray = pointer_ray(self.editor.camera(), x, y, viewport);
                self.editor.pointer_move(&ray) || self.editor.orbit(dx, dy)
            }
            SessionInput::PointerUp => self.editor.pointer_up(),
            SessionInput::Zoom(amount) => self.editor.zoom(amount),
            SessionInput::Key(KeyCommand::DeleteSelected) => self.editor.delete_selected(),
            SessionInput::Key(KeyCommand::ToggleGizmoMode) => {
                let mode = self.editor.toggle_gizmo_mode();
                self.ui.set_status(format!("Mode: {}", mode.label()));
                true
            }
            SessionInput::Key(_) => false,
        }
    }

    fn background(&self) -> Background {
        Background::Environment
    }
}

fn resolve(config: Configuration, all: bool) {
    if all {
        for path in all_image_paths() {
            println!("{}", path);
        }
        return;
    }
    let configurator = Configurator::new(config);
    let names = resolve_material_names(&config);
    println!("{}", config.title());
    println!("image:   {}", configurator.image_path());
    println!("alt:     {}", configurator.alt_text());
    println!("base:    {}", names.base_mesh_material);
    println!("rim:     {}", names.rim_mesh_material);
    println!("screen:  {}", names.screen_mesh_material);
    println!("pattern: {}", names.visible_pattern_mesh);
}

pub fn run_with_args(args: &[String]) -> Result<()> {
    match parse(args)? {
        Command::Help => println!("{}", USAGE),
        Command::Resolve { config, all } => resolve(config, all),
        Command::Render { config, view } => {
            let mut session = Storefront::new(config, &view);
            if let Some(frame) = drive(&mut session, &view)? {
                save_frame(&frame, view.output.as_deref())?;
            }
        }
        Command::Edit {
            settings,
            imports,
            additions,
            export,
            view,
        } => {
            let mut session = EditorSession::new(settings.as_deref(), &view)?;
            session.script(&imports, &additions);
            let frame = drive(&mut session, &view)?;
            session.export(export.as_deref())?;
            if let Some(frame) = frame {
                save_frame(&frame, view.output.as_deref())?;
            }
        }
    }
    Ok(())
}

pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("lampviz {}", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(err) = run_with_args(&args) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
