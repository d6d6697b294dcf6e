//! egui panels for the editor (toolbar, hierarchy, inspector) and the
//! storefront (finish pickers plus the resolved render path).

use crate::assets::ModelSource;
use crate::config::{BaseFinish, ConfigAction, ConfigField, PatternMotif, RimFinish};
use crate::configurator::Configurator;
use crate::editor::primitives::PrimitiveShape;
use crate::editor::{
    Axis, Editor, Inspector, LightField, MaterialField, NodeEdit, NodeInspector, SelectionTarget,
    TransformRow,
};
use crate::scene::settings::GlobalField;
use crate::scene::GlobalSettings;
use egui::{Color32, RichText};
use glam::Vec3;

const TITLE_COLOR: Color32 = Color32::from_rgb(0xff, 0xa5, 0x00);
const DELETE_COLOR: Color32 = Color32::from_rgb(0xd3, 0x2f, 0x2f);

/// Work the UI cannot finish inside a frame; the app hands these to the
/// background loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiRequest {
    ImportModel(ModelSource),
    LoadEnvironment(ModelSource),
    /// Open a native file dialog for a model to import.
    PickModel,
    PickEnvironment,
}

pub struct UiState {
    status: String,
    model_path: String,
    environment_path: String,
}

impl UiState {
    pub fn new() -> Self {
        Self {
            status: String::new(),
            model_path: String::new(),
            environment_path: String::new(),
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Validate a model path typed into the toolbar. Unsupported formats
    /// only produce a status message.
    pub fn import_request(&mut self, path: &str) -> Option<UiRequest> {
        let source = ModelSource::parse(path.trim());
        match Editor::validate_import(&source) {
            Ok(()) => {
                self.status = format!("Loading {}", source.describe());
                Some(UiRequest::ImportModel(source))
            }
            Err(err) => {
                log::warn!("{}", err);
                self.status = err.to_string();
                None
            }
        }
    }

    pub fn environment_request(&mut self, path: &str) -> Option<UiRequest> {
        let source = ModelSource::parse(path.trim());
        match Editor::validate_environment(&source) {
            Ok(()) => {
                self.status = format!("Loading {}", source.describe());
                Some(UiRequest::LoadEnvironment(source))
            }
            Err(err) => {
                log::warn!("{}", err);
                self.status = err.to_string();
                None
            }
        }
    }

    pub fn editor_ui(&mut self, ctx: &egui::Context, editor: &mut Editor) -> Vec<UiRequest> {
        let mut requests = Vec::new();

        egui::TopBottomPanel::top("editor_toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Add Light").clicked() {
                    editor.add_light();
                }
                ui.menu_button("Add Primitive", |ui| {
                    for shape in PrimitiveShape::ALL {
                        if ui.button(shape.label()).clicked() {
                            editor.add_primitive(shape);
                            ui.close_menu();
                        }
                    }
                });
                if ui.button(format!("Mode: {}", editor.gizmo_mode().label())).clicked() {
                    editor.toggle_gizmo_mode();
                }
                if ui.button("Save Config").clicked() {
                    self.status = match editor.export_settings() {
                        Ok(_) => "Global Config saved to log".to_string(),
                        Err(err) => err.to_string(),
                    };
                }
            });
            ui.horizontal(|ui| {
                ui.text_edit_singleline(&mut self.model_path);
                if ui.button("Import Model").clicked() {
                    let path = self.model_path.clone();
                    requests.extend(self.import_request(&path));
                }
                if ui.button("Browse...").clicked() {
                    requests.push(UiRequest::PickModel);
                }
                ui.text_edit_singleline(&mut self.environment_path);
                if ui.button("Load Env").clicked() {
                    let path = self.environment_path.clone();
                    requests.extend(self.environment_request(&path));
                }
                if ui.button("Browse Env...").clicked() {
                    requests.push(UiRequest::PickEnvironment);
                }
            });
        });

        egui::TopBottomPanel::bottom("editor_status").show(ctx, |ui| {
            ui.label(&self.status);
        });

        egui::SidePanel::left("hierarchy_panel")
            .default_width(220.0)
            .show(ctx, |ui| {
                ui.heading("Hierarchy");
                ui.separator();
                egui::ScrollArea::vertical().show(ui, |ui| hierarchy_ui(ui, editor));
            });

        egui::SidePanel::right("inspector_panel")
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.heading("Inspector");
                ui.separator();
                match editor.inspector() {
                    Inspector::Empty => {
                        ui.label(RichText::new("Select an object").italics().weak());
                    }
                    Inspector::Global(settings) => global_ui(ui, editor, settings),
                    Inspector::Node(view) => {
                        if let Err(err) = node_ui(ui, editor, view) {
                            self.status = err.to_string();
                        }
                    }
                }
            });

        requests
    }

    /// Finish pickers. Arrow keys step through the section under the pointer.
    /// Returns true when the configuration changed.
    pub fn storefront_ui(
        &mut self,
        ctx: &egui::Context,
        configurator: &mut Configurator,
    ) -> bool {
        let config = configurator.state();
        let mut actions = Vec::new();
        let step = ctx.input(|input| {
            if input.key_pressed(egui::Key::ArrowRight) {
                1
            } else if input.key_pressed(egui::Key::ArrowLeft) {
                -1
            } else {
                0
            }
        });

        egui::SidePanel::left("storefront_controls")
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.heading(config.title());
                ui.separator();

                let section = ui.group(|ui| {
                    ui.label("Base");
                    ui.horizontal_wrapped(|ui| {
                        for base in BaseFinish::ALL {
                            let label = egui::SelectableLabel::new(
                                config.base == base,
                                base.display_name(),
                            );
                            if ui.add_enabled(config.rim.permits(base), label).clicked() {
                                actions.push(ConfigAction::SelectBase(base));
                            }
                        }
                    });
                });
                if step != 0 && section.response.contains_pointer() {
                    actions.push(ConfigAction::Cycle {
                        field: ConfigField::Base,
                        step,
                    });
                }

                let section = ui.group(|ui| {
                    ui.label("Rim");
                    ui.horizontal_wrapped(|ui| {
                        for rim in RimFinish::ALL {
                            if ui.selectable_label(config.rim == rim, rim.key()).clicked() {
                                actions.push(ConfigAction::SelectRim(rim));
                            }
                        }
                    });
                });
                if step != 0 && section.response.contains_pointer() {
                    actions.push(ConfigAction::Cycle {
                        field: ConfigField::Rim,
                        step,
                    });
                }

                let section = ui.group(|ui| {
                    ui.label("Pattern");
                    ui.horizontal_wrapped(|ui| {
                        for pattern in PatternMotif::ALL {
                            let selected = config.pattern == pattern;
                            if ui.selectable_label(selected, pattern.key()).clicked() {
                                actions.push(ConfigAction::SelectPattern(pattern));
                            }
                        }
                    });
                });
                if step != 0 && section.response.contains_pointer() {
                    actions.push(ConfigAction::Cycle {
                        field: ConfigField::Pattern,
                        step,
                    });
                }

                ui.separator();
                ui.label(RichText::new(configurator.image_path()).monospace());
                if !self.status.is_empty() {
                    ui.label(RichText::new(&self.status).weak());
                }
            });

        let mut changed = false;
        for action in actions {
            changed |= configurator.dispatch(action);
        }
        changed
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}

fn hierarchy_ui(ui: &mut egui::Ui, editor: &mut Editor) {
    let selection = editor.selection();
    let mut clicked = None;
    for entry in editor.hierarchy() {
        ui.horizontal(|ui| {
            ui.add_space(entry.depth as f32 * 10.0);
            let text = if entry.bold {
                RichText::new(&entry.label).strong()
            } else {
                RichText::new(&entry.label)
            };
            if ui.selectable_label(selection == Some(entry.target), text).clicked() {
                clicked = Some(entry.target);
            }
        });
    }
    if let Some(target) = clicked {
        editor.select(target);
    }
}

fn header(ui: &mut egui::Ui, text: &str) {
    ui.add_space(6.0);
    ui.label(RichText::new(text).strong());
    ui.separator();
}

/// Labelled number field; returns the new value when it was edited.
fn number_row(ui: &mut egui::Ui, label: &str, value: f32) -> Option<f32> {
    let mut value = value;
    let changed = ui
        .horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(&mut value).speed(0.1).max_decimals(3))
                .changed()
        })
        .inner;
    changed.then_some(value)
}

fn color_row(ui: &mut egui::Ui, color: Vec3) -> Option<Vec3> {
    let mut rgb = color.to_array();
    let changed = ui
        .horizontal(|ui| {
            ui.label("Color");
            ui.color_edit_button_rgb(&mut rgb).changed()
        })
        .inner;
    changed.then(|| Vec3::from_array(rgb))
}

fn global_ui(ui: &mut egui::Ui, editor: &mut Editor, settings: GlobalSettings) {
    header(ui, "Global Settings");
    for field in GlobalField::LIGHTING {
        if let Some(value) = number_row(ui, field.label(), settings.get(field)) {
            editor.set_global(field, value);
        }
    }
    header(ui, "Bloom Settings");
    for field in GlobalField::BLOOM {
        if let Some(value) = number_row(ui, field.label(), settings.get(field)) {
            editor.set_global(field, value);
        }
    }
}

fn node_ui(
    ui: &mut egui::Ui,
    editor: &mut Editor,
    view: NodeInspector,
) -> crate::editor::Result<()> {
    ui.label(RichText::new(&view.name).color(TITLE_COLOR).strong());
    ui.label(RichText::new(view.id.to_string()).small().weak());

    let delete = egui::Button::new(RichText::new("DELETE OBJECT").color(Color32::WHITE).strong())
        .fill(DELETE_COLOR);
    if ui.add_sized([ui.available_width(), 24.0], delete).clicked() {
        editor.delete(SelectionTarget::Node(view.id));
        return Ok(());
    }

    let mut edits = Vec::new();
    header(ui, "Transform");
    for row in TransformRow::ALL {
        let current = row.get(&view.transform);
        for axis in Axis::ALL {
            let label = format!("{} {}", row.label(), axis.label());
            if let Some(value) = number_row(ui, &label, current[axis.index()]) {
                edits.push(NodeEdit::Transform { row, axis, value });
            }
        }
    }

    if let Some(light) = &view.light {
        header(ui, "Light Config");
        for field in LightField::ALL {
            let Some(current) = field.get(light) else {
                continue;
            };
            if let Some(value) = number_row(ui, field.label(), current) {
                edits.push(NodeEdit::Light(field, value));
            }
        }
        if let Some(color) = color_row(ui, light.color) {
            edits.push(NodeEdit::LightColor(color));
        }
    }

    if let Some(material) = &view.material {
        header(ui, "Material");
        ui.label(RichText::new(&material.name).weak());
        let values = [material.metalness, material.roughness, material.env_map_intensity];
        for (field, current) in MaterialField::ALL.into_iter().zip(values) {
            if let Some(value) = number_row(ui, field.label(), current) {
                edits.push(NodeEdit::Material(field, value));
            }
        }
        if let Some(color) = color_row(ui, material.color) {
            edits.push(NodeEdit::MaterialColor(color));
        }
    }

    for edit in edits {
        editor.edit_selected(edit)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frame(mut body: impl FnMut(&egui::Context)) {
        let ctx = egui::Context::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| body(ctx));
    }

    #[test]
    fn editor_panels_build_for_every_inspector_kind() {
        let mut state = UiState::new();
        let mut editor = Editor::default();
        run_frame(|ctx| {
            assert!(state.editor_ui(ctx, &mut editor).is_empty());
        });

        editor.select(SelectionTarget::Global);
        run_frame(|ctx| {
            state.editor_ui(ctx, &mut editor);
        });

        let light = editor.lights().logo;
        editor.select(SelectionTarget::Node(light));
        run_frame(|ctx| {
            state.editor_ui(ctx, &mut editor);
        });

        editor.add_primitive(PrimitiveShape::Sphere);
        run_frame(|ctx| {
            state.editor_ui(ctx, &mut editor);
        });
        assert!(state.status().is_empty());
    }

    #[test]
    fn unsupported_import_reports_status_only() {
        let mut state = UiState::new();
        assert_eq!(state.import_request("models/chair.fbx"), None);
        assert_eq!(state.status(), "Format not supported by basic loader: fbx");

        let request = state.import_request(" models/chair.glb ");
        assert_eq!(
            request,
            Some(UiRequest::ImportModel(ModelSource::parse("models/chair.glb")))
        );
        assert!(state.status().starts_with("Loading"));
    }

    #[test]
    fn environment_request_accepts_panoramas() {
        let mut state = UiState::new();
        assert!(matches!(
            state.environment_request("env/studio_small_08_1k.hdr"),
            Some(UiRequest::LoadEnvironment(_))
        ));
        assert_eq!(state.environment_request("env/studio.exr"), None);
    }

    #[test]
    fn storefront_without_input_changes_nothing() {
        let mut state = UiState::new();
        let mut configurator = Configurator::default();
        let before = configurator.state();
        let mut changed = true;
        run_frame(|ctx| {
            changed = state.storefront_ui(ctx, &mut configurator);
        });
        assert!(!changed);
        assert_eq!(configurator.state(), before);
    }
}
