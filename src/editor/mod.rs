//! Scene editor: pick, select, drag, inspect and edit the live scene graph.
//!
//! The editor owns its scene, material registry and global settings. Its
//! selection moves through `Idle -> Selected -> Dragging` and back; the
//! transform gizmo lives in the same graph on the overlay layer and follows
//! the selected node.

pub mod gizmo;
pub mod primitives;

use crate::assets::environment::is_environment_path;
use crate::assets::{load_model, AssetError, EnvironmentMap, LoadedModel, ModelSource};
use crate::render::{pick, CameraController, FrameInputs, OrbitControls, PickHit, PickKind, Ray};
use crate::scene::serialization::{export_settings_json, SerializationError};
use crate::scene::settings::GlobalField;
use crate::scene::{
    AssetRoles, GlobalSettings, HelperKind, LightKind, LightNode, Material, MaterialHandle,
    MaterialRegistry, MeshNode, NodeId, NodeKind, SceneGraph, Transform,
};
use gizmo::{is_handle_name, GizmoAxis, GizmoDrag, GizmoMode, TransformGizmo};
use glam::Vec3;
use primitives::PrimitiveShape;
use std::sync::Arc;

pub const GLOBAL_LABEL: &str = "Scene (Global Settings)";
pub const MODEL_NAME: &str = "Majesty Lamp";
pub const NEW_LIGHT_NAME: &str = "New PointLight";

const PRIMITIVE_COLOR: u32 = 0x888888;

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("Format not supported by basic loader: {extension}")]
    UnsupportedFormat { extension: String },
    #[error("nothing is selected")]
    NothingSelected,
    #[error("node {0} no longer exists")]
    MissingNode(NodeId),
    #[error("node {id} is not a {expected}")]
    WrongKind { id: NodeId, expected: &'static str },
    #[error("{field} does not apply to this light")]
    FieldNotApplicable { field: &'static str },
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

pub type Result<T> = std::result::Result<T, EditorError>;

/// What the hierarchy and inspector point at. `Global` stands for the
/// scene-wide settings and has no node behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTarget {
    Global,
    Node(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorState {
    Idle,
    Selected(SelectionTarget),
    Dragging(GizmoDrag),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyEntry {
    pub target: SelectionTarget,
    pub label: String,
    pub depth: usize,
    pub bold: bool,
}

/// Depth-first listing for the hierarchy panel: the global root first, then
/// every node except gizmo internals and helpers.
pub fn hierarchy(scene: &SceneGraph) -> Vec<HierarchyEntry> {
    fn visit(scene: &SceneGraph, id: NodeId, depth: usize, out: &mut Vec<HierarchyEntry>) {
        let Some(node) = scene.get(id) else {
            return;
        };
        if is_handle_name(&node.name) || matches!(node.kind, NodeKind::Helper(_)) {
            return;
        }
        out.push(HierarchyEntry {
            target: SelectionTarget::Node(id),
            label: node.display_name(),
            depth,
            bold: false,
        });
        for child in node.children() {
            visit(scene, *child, depth + 1, out);
        }
    }

    let mut out = vec![HierarchyEntry {
        target: SelectionTarget::Global,
        label: GLOBAL_LABEL.to_string(),
        depth: 0,
        bold: true,
    }];
    for root in scene.roots() {
        let skip = scene
            .get(*root)
            .map(|node| node.name.contains("Helper"))
            .unwrap_or(true);
        if !skip {
            visit(scene, *root, 1, &mut out);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformRow {
    Position,
    Rotation,
    Scale,
}

impl TransformRow {
    pub const ALL: [TransformRow; 3] =
        [TransformRow::Position, TransformRow::Rotation, TransformRow::Scale];

    pub fn label(self) -> &'static str {
        match self {
            TransformRow::Position => "Pos",
            TransformRow::Rotation => "Rot",
            TransformRow::Scale => "Scale",
        }
    }

    pub fn get(self, transform: &Transform) -> Vec3 {
        match self {
            TransformRow::Position => transform.translation,
            TransformRow::Rotation => transform.rotation,
            TransformRow::Scale => transform.scale,
        }
    }

    fn slot(self, transform: &mut Transform) -> &mut Vec3 {
        match self {
            TransformRow::Position => &mut transform.translation,
            TransformRow::Rotation => &mut transform.rotation,
            TransformRow::Scale => &mut transform.scale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightField {
    Intensity,
    Distance,
    Decay,
    Angle,
    Penumbra,
}

impl LightField {
    pub const ALL: [LightField; 5] = [
        LightField::Intensity,
        LightField::Distance,
        LightField::Decay,
        LightField::Angle,
        LightField::Penumbra,
    ];

    pub fn label(self) -> &'static str {
        match self {
            LightField::Intensity => "Intensity",
            LightField::Distance => "Distance",
            LightField::Decay => "Decay",
            LightField::Angle => "Angle",
            LightField::Penumbra => "Penumbra",
        }
    }

    /// Current value, or `None` when the light kind has no such parameter.
    pub fn get(self, light: &LightNode) -> Option<f32> {
        match (self, light.kind) {
            (LightField::Intensity, _) => Some(light.intensity),
            (LightField::Distance, LightKind::Point { distance, .. })
            | (LightField::Distance, LightKind::Spot { distance, .. }) => Some(distance),
            (LightField::Decay, LightKind::Point { decay, .. })
            | (LightField::Decay, LightKind::Spot { decay, .. }) => Some(decay),
            (LightField::Angle, LightKind::Spot { angle, .. }) => Some(angle),
            (LightField::Penumbra, LightKind::Spot { penumbra, .. }) => Some(penumbra),
            _ => None,
        }
    }

    fn set(self, light: &mut LightNode, value: f32) -> bool {
        let slot = match (self, &mut light.kind) {
            (LightField::Intensity, _) => &mut light.intensity,
            (LightField::Distance, LightKind::Point { distance, .. })
            | (LightField::Distance, LightKind::Spot { distance, .. }) => distance,
            (LightField::Decay, LightKind::Point { decay, .. })
            | (LightField::Decay, LightKind::Spot { decay, .. }) => decay,
            (LightField::Angle, LightKind::Spot { angle, .. }) => angle,
            (LightField::Penumbra, LightKind::Spot { penumbra, .. }) => penumbra,
            _ => return false,
        };
        *slot = value;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialField {
    Metalness,
    Roughness,
    EnvMapIntensity,
}

impl MaterialField {
    pub const ALL: [MaterialField; 3] = [
        MaterialField::Metalness,
        MaterialField::Roughness,
        MaterialField::EnvMapIntensity,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MaterialField::Metalness => "Metalness",
            MaterialField::Roughness => "Roughness",
            MaterialField::EnvMapIntensity => "EnvMap Int.",
        }
    }

    pub fn get(self, material: &Material) -> f32 {
        match self {
            MaterialField::Metalness => material.metalness,
            MaterialField::Roughness => material.roughness,
            MaterialField::EnvMapIntensity => material.env_map_intensity,
        }
    }

    fn set(self, material: &mut Material, value: f32) {
        match self {
            MaterialField::Metalness => material.metalness = value,
            MaterialField::Roughness => material.roughness = value,
            MaterialField::EnvMapIntensity => material.env_map_intensity = value,
        }
    }
}

/// A single inspector write against the selected node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeEdit {
    Transform { row: TransformRow, axis: Axis, value: f32 },
    Light(LightField, f32),
    LightColor(Vec3),
    Material(MaterialField, f32),
    MaterialColor(Vec3),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRows {
    pub handle: MaterialHandle,
    pub name: String,
    pub metalness: f32,
    pub roughness: f32,
    pub env_map_intensity: f32,
    pub color: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeInspector {
    pub id: NodeId,
    pub name: String,
    pub transform: Transform,
    pub light: Option<LightNode>,
    pub material: Option<MaterialRows>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inspector {
    Empty,
    Global(GlobalSettings),
    Node(NodeInspector),
}

/// Fixed lights and helpers created with every editor scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneLights {
    pub ambient: NodeId,
    pub main: NodeId,
    pub rim: NodeId,
    pub logo: NodeId,
    pub logo_target: NodeId,
    pub logo_helper: NodeId,
    pub axes: NodeId,
}

impl SceneLights {
    fn build(scene: &mut SceneGraph, settings: &GlobalSettings) -> Self {
        let mut place = |name: &str, kind: NodeKind, at: Vec3| {
            let id = scene.add(None, name, kind);
            if let Some(node) = scene.get_mut(id) {
                node.transform.translation = at;
            }
            id
        };
        let ambient = place(
            "Ambient Light",
            NodeKind::Light(LightNode::new(
                LightKind::Ambient,
                Vec3::ONE,
                settings.ambient_intensity,
            )),
            Vec3::ZERO,
        );
        let main = place(
            "Main Directional",
            NodeKind::Light(LightNode::new(
                LightKind::Directional,
                Vec3::ONE,
                settings.main_light_intensity,
            )),
            Vec3::new(5.0, 5.0, 5.0),
        );
        let rim = place(
            "Rim Light",
            NodeKind::Light(LightNode::new(
                LightKind::Point {
                    distance: 0.0,
                    decay: 2.0,
                },
                Vec3::ONE,
                settings.rim_light_intensity,
            )),
            Vec3::new(-5.0, 3.0, -5.0),
        );
        let logo_target = place(
            "Logo SpotLight Target",
            NodeKind::Group,
            Vec3::new(
                settings.logo_light_target_x,
                settings.logo_light_target_y,
                settings.logo_light_target_z,
            ),
        );
        let mut spot = LightNode::new(
            LightKind::Spot {
                distance: settings.logo_light_distance,
                decay: settings.logo_light_decay,
                angle: settings.logo_light_angle,
                penumbra: settings.logo_light_penumbra,
            },
            Vec3::ONE,
            settings.logo_light_intensity,
        );
        spot.target = Some(logo_target);
        let logo = place(
            "Logo SpotLight",
            NodeKind::Light(spot),
            Vec3::new(settings.logo_light_x, settings.logo_light_y, settings.logo_light_z),
        );
        let logo_helper = scene.add(
            Some(logo),
            "Helper (Logo)",
            NodeKind::Helper(HelperKind::Light { light: logo }),
        );
        let axes = scene.add(None, "Axes Helper", NodeKind::Helper(HelperKind::Axes));
        for helper in [logo_helper, axes] {
            if let Some(node) = scene.get_mut(helper) {
                node.visible = settings.debug_helpers;
            }
        }
        if let Some(node) = scene.get_mut(axes) {
            node.transform.scale = Vec3::splat(2.0);
        }

        Self {
            ambient,
            main,
            rim,
            logo,
            logo_target,
            logo_helper,
            axes,
        }
    }
}

pub struct Editor {
    scene: SceneGraph,
    materials: MaterialRegistry,
    settings: GlobalSettings,
    environment: Option<EnvironmentMap>,
    lights: SceneLights,
    gizmo: TransformGizmo,
    state: EditorState,
    camera: CameraController,
    orbit: OrbitControls,
    model: Option<NodeId>,
    roles: Option<AssetRoles>,
}

impl Editor {
    pub fn new(settings: GlobalSettings) -> Self {
        let mut scene = SceneGraph::new();
        let mut materials = MaterialRegistry::new();
        let lights = SceneLights::build(&mut scene, &settings);
        let gizmo = TransformGizmo::spawn(&mut scene, &mut materials);
        Self {
            scene,
            materials,
            settings,
            environment: None,
            lights,
            gizmo,
            state: EditorState::Idle,
            camera: CameraController::default(),
            orbit: OrbitControls::default(),
            model: None,
            roles: None,
        }
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn lights(&self) -> SceneLights {
        self.lights
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn orbit_enabled(&self) -> bool {
        self.orbit.enabled
    }

    pub fn gizmo_mode(&self) -> GizmoMode {
        self.gizmo.mode()
    }

    pub fn gizmo_target(&self) -> Option<NodeId> {
        self.gizmo.attached()
    }

    pub fn environment(&self) -> Option<&EnvironmentMap> {
        self.environment.as_ref()
    }

    pub fn model(&self) -> Option<NodeId> {
        self.model
    }

    /// Roles resolved for the current main model.
    pub fn model_roles(&self) -> Option<&AssetRoles> {
        self.roles.as_ref()
    }

    /// Scene and materials for restyling the model in place.
    pub fn stage_mut(&mut self) -> (&mut SceneGraph, &mut MaterialRegistry) {
        (&mut self.scene, &mut self.materials)
    }

    pub fn frame_inputs(&self) -> FrameInputs<'_> {
        FrameInputs {
            scene: &self.scene,
            materials: &self.materials,
            camera: &self.camera,
            environment: self.environment.as_ref(),
        }
    }

    pub fn selection(&self) -> Option<SelectionTarget> {
        match &self.state {
            EditorState::Idle => None,
            EditorState::Selected(target) => Some(*target),
            EditorState::Dragging(drag) => Some(SelectionTarget::Node(drag.node())),
        }
    }

    pub fn selected_node(&self) -> Option<NodeId> {
        match self.selection() {
            Some(SelectionTarget::Node(id)) => Some(id),
            _ => None,
        }
    }

    pub fn hierarchy(&self) -> Vec<HierarchyEntry> {
        hierarchy(&self.scene)
    }

    /// Select a hierarchy entry. Global detaches the gizmo; nodes get it
    /// attached. Returns false for gizmo internals and unknown nodes.
    pub fn select(&mut self, target: SelectionTarget) -> bool {
        match target {
            SelectionTarget::Global => self.gizmo.detach(&mut self.scene),
            SelectionTarget::Node(id) => {
                if !self.scene.contains(id) || self.gizmo.owns(&self.scene, id) {
                    return false;
                }
                self.gizmo.attach(&mut self.scene, id);
            }
        }
        self.orbit.enabled = true;
        self.state = EditorState::Selected(target);
        true
    }

    fn clear_selection(&mut self) {
        self.gizmo.detach(&mut self.scene);
        self.orbit.enabled = true;
        self.state = EditorState::Idle;
    }

    /// Node a pick hit would select, or `None` when the hit is filtered out.
    fn selectable(&self, hit: &PickHit) -> Option<NodeId> {
        match hit.kind {
            PickKind::GizmoHandle => None,
            PickKind::LightHelper => match self.scene.get(hit.node)?.kind {
                NodeKind::Helper(HelperKind::Light { light }) => {
                    self.scene.contains(light).then_some(light)
                }
                _ => None,
            },
            PickKind::SceneMesh => {
                let node = self.scene.get(hit.node)?;
                if is_handle_name(&node.name) || self.gizmo.owns(&self.scene, hit.node) {
                    return None;
                }
                let in_helper = self.scene.ancestors(hit.node).into_iter().any(|ancestor| {
                    matches!(
                        self.scene.get(ancestor).map(|node| &node.kind),
                        Some(NodeKind::Helper(_))
                    )
                });
                (!in_helper).then_some(hit.node)
            }
        }
    }

    /// Pointer pressed along `ray`. A gizmo handle under the pointer starts
    /// a drag; otherwise the nearest selectable hit is selected. A miss
    /// changes nothing.
    pub fn pointer_down(&mut self, ray: &Ray) -> bool {
        let hits = pick(&self.scene, ray);

        if let Some(node) = self.selected_node() {
            let axis = hits
                .iter()
                .filter(|hit| hit.kind == PickKind::GizmoHandle)
                .find_map(|hit| {
                    self.scene
                        .get(hit.node)
                        .and_then(|handle| GizmoAxis::from_handle_name(&handle.name))
                });
            if let Some(axis) = axis {
                let mode = self.gizmo.mode();
                if let Some(drag) = GizmoDrag::begin(&self.scene, node, axis, mode, ray) {
                    log::debug!("Dragging {} along {:?}", node, axis);
                    self.orbit.enabled = false;
                    self.state = EditorState::Dragging(drag);
                    return true;
                }
            }
        }

        match hits.iter().find_map(|hit| self.selectable(hit)) {
            Some(id) => self.select(SelectionTarget::Node(id)),
            None => false,
        }
    }

    pub fn pointer_move(&mut self, ray: &Ray) -> bool {
        let EditorState::Dragging(drag) = &self.state else {
            return false;
        };
        let moved = drag.update(&mut self.scene, ray);
        if moved {
            self.gizmo.follow(&mut self.scene);
        }
        moved
    }

    pub fn pointer_up(&mut self) -> bool {
        let EditorState::Dragging(drag) = &self.state else {
            return false;
        };
        let node = drag.node();
        self.state = EditorState::Selected(SelectionTarget::Node(node));
        self.orbit.enabled = true;
        true
    }

    /// Orbit the camera by a pointer delta. Ignored while dragging.
    pub fn orbit(&mut self, dx: f32, dy: f32) -> bool {
        self.orbit.rotate(&mut self.camera, dx, dy)
    }

    pub fn zoom(&mut self, amount: f32) -> bool {
        self.orbit.zoom(&mut self.camera, amount)
    }

    /// Remove a node and its subtree. Deleting `Global` or gizmo parts does
    /// nothing. If the selection went with it, the gizmo detaches and the
    /// inspector clears.
    pub fn delete(&mut self, target: SelectionTarget) -> bool {
        let SelectionTarget::Node(id) = target else {
            return false;
        };
        if self.gizmo.owns(&self.scene, id) {
            return false;
        }
        let Some(removed) = self.scene.remove(id) else {
            return false;
        };
        log::info!("Deleted {}", removed.display_name());

        if self.selected_node().is_some_and(|selected| !self.scene.contains(selected)) {
            self.clear_selection();
        }
        if self.model.is_some_and(|model| !self.scene.contains(model)) {
            self.model = None;
        }
        true
    }

    pub fn delete_selected(&mut self) -> bool {
        match self.selection() {
            Some(target) => self.delete(target),
            None => false,
        }
    }

    pub fn inspector(&self) -> Inspector {
        match self.selection() {
            None => Inspector::Empty,
            Some(SelectionTarget::Global) => Inspector::Global(self.settings),
            Some(SelectionTarget::Node(id)) => match self.scene.get(id) {
                None => Inspector::Empty,
                Some(node) => {
                    let mut view = NodeInspector {
                        id,
                        name: node.display_name(),
                        transform: node.transform,
                        light: None,
                        material: None,
                    };
                    match &node.kind {
                        NodeKind::Light(light) => view.light = Some(light.clone()),
                        NodeKind::Mesh(mesh) => {
                            let rows = |material: &Material| MaterialRows {
                                handle: mesh.material,
                                name: material.name.clone(),
                                metalness: material.metalness,
                                roughness: material.roughness,
                                env_map_intensity: material.env_map_intensity,
                                color: material.color,
                            };
                            view.material = self.materials.get(mesh.material).map(rows);
                        }
                        NodeKind::Group | NodeKind::Helper(_) => {}
                    }
                    Inspector::Node(view)
                }
            },
        }
    }

    pub fn edit_selected(&mut self, edit: NodeEdit) -> Result<()> {
        let id = self.selected_node().ok_or(EditorError::NothingSelected)?;
        let node = self.scene.get_mut(id).ok_or(EditorError::MissingNode(id))?;
        match edit {
            NodeEdit::Transform { row, axis, value } => {
                row.slot(&mut node.transform)[axis.index()] = value;
            }
            NodeEdit::Light(field, value) => {
                let light = node.as_light_mut().ok_or(EditorError::WrongKind {
                    id,
                    expected: "light",
                })?;
                if !field.set(light, value) {
                    return Err(EditorError::FieldNotApplicable { field: field.label() });
                }
            }
            NodeEdit::LightColor(color) => {
                node.as_light_mut()
                    .ok_or(EditorError::WrongKind {
                        id,
                        expected: "light",
                    })?
                    .color = color;
            }
            NodeEdit::Material(_, _) | NodeEdit::MaterialColor(_) => {
                let handle = node
                    .as_mesh()
                    .ok_or(EditorError::WrongKind { id, expected: "mesh" })?
                    .material;
                let material = self
                    .materials
                    .get_mut(handle)
                    .ok_or(EditorError::MissingNode(id))?;
                match edit {
                    NodeEdit::Material(field, value) => field.set(material, value),
                    NodeEdit::MaterialColor(color) => material.color = color,
                    _ => {}
                }
                material.mark_dirty();
            }
        }
        self.gizmo.follow(&mut self.scene);
        Ok(())
    }

    /// Write one global setting and push it into the fixed lights. Bloom and
    /// exposure are read by the renderer from [`Editor::settings`].
    pub fn set_global(&mut self, field: GlobalField, value: f32) {
        self.settings.set(field, value);
        let light = match field {
            GlobalField::AmbientIntensity => Some(self.lights.ambient),
            GlobalField::MainLightIntensity => Some(self.lights.main),
            GlobalField::RimLightIntensity => Some(self.lights.rim),
            _ => None,
        };
        if let Some(light) = light
            .and_then(|id| self.scene.get_mut(id))
            .and_then(|node| node.as_light_mut())
        {
            light.intensity = value;
        }
    }

    pub fn add_light(&mut self) -> NodeId {
        let id = self.scene.add(
            None,
            NEW_LIGHT_NAME,
            NodeKind::Light(LightNode::new(
                LightKind::Point {
                    distance: 0.0,
                    decay: 2.0,
                },
                Vec3::ONE,
                1.0,
            )),
        );
        if let Some(node) = self.scene.get_mut(id) {
            node.transform.translation = Vec3::new(0.0, 2.0, 0.0);
        }
        self.select(SelectionTarget::Node(id));
        id
    }

    pub fn add_primitive(&mut self, shape: PrimitiveShape) -> NodeId {
        let name = format!("New {}", shape.label());
        let grey = (PRIMITIVE_COLOR & 0xff) as f32 / 255.0;
        let mut material = Material::standard(name.clone(), Vec3::splat(grey));
        material.metalness = 0.0;
        material.roughness = 0.5;
        let material = self.materials.insert(material);
        let id = self.scene.add(
            None,
            name,
            NodeKind::Mesh(MeshNode {
                mesh: Arc::new(shape.mesh()),
                material,
            }),
        );
        if let Some(node) = self.scene.get_mut(id) {
            node.transform.translation = Vec3::new(0.0, 1.0, 0.0);
            if shape == PrimitiveShape::Plane {
                node.transform.rotation.x = -std::f32::consts::FRAC_PI_2;
            }
        }
        self.select(SelectionTarget::Node(id));
        id
    }

    pub fn toggle_gizmo_mode(&mut self) -> GizmoMode {
        let mode = self.gizmo.cycle_mode();
        log::info!("Gizmo mode: {}", mode.label());
        mode
    }

    /// Install the main lamp model, replacing the previous one. The model is
    /// centered on the origin and its pattern meshes are tagged for bloom.
    pub fn set_model(&mut self, model: &LoadedModel) -> NodeId {
        if let Some(previous) = self.model.take() {
            self.delete(SelectionTarget::Node(previous));
        }
        let instance = model.instantiate(&mut self.scene, &mut self.materials, None);
        let root = instance.root;
        if let Some((min, max)) = self.scene.subtree_bounds(root) {
            let center = (min + max) * 0.5;
            if let Some(node) = self.scene.get_mut(root) {
                node.name = MODEL_NAME.to_string();
                node.transform.translation -= center;
            }
        } else if let Some(node) = self.scene.get_mut(root) {
            node.name = MODEL_NAME.to_string();
        }
        self.roles = Some(AssetRoles::resolve(
            &mut self.scene,
            &self.materials,
            Some(root),
            &instance.materials,
        ));
        log::info!("Loaded {} ({} nodes)", model.name, self.scene.len());
        self.model = Some(root);
        root
    }

    pub fn validate_import(source: &ModelSource) -> Result<()> {
        match source.extension() {
            Some(ext) if ext == "glb" || ext == "gltf" => Ok(()),
            other => Err(EditorError::UnsupportedFormat {
                extension: other.unwrap_or_default(),
            }),
        }
    }

    /// Add an already loaded model under a group named after its file and
    /// select it.
    pub fn insert_import(&mut self, model: &LoadedModel) -> NodeId {
        let root = model.instantiate(&mut self.scene, &mut self.materials, None).root;
        log::info!("Imported {}", model.name);
        self.select(SelectionTarget::Node(root));
        root
    }

    pub fn import_model(&mut self, source: &ModelSource) -> Result<NodeId> {
        Self::validate_import(source)?;
        let model = load_model(source)?;
        Ok(self.insert_import(&model))
    }

    pub fn validate_environment(source: &ModelSource) -> Result<()> {
        if is_environment_path(&source.file_name()) {
            Ok(())
        } else {
            Err(EditorError::UnsupportedFormat {
                extension: source.extension().unwrap_or_default(),
            })
        }
    }

    pub fn set_environment(&mut self, environment: EnvironmentMap) {
        log::debug!("Using environment {}", environment.name);
        self.environment = Some(environment);
    }

    /// Pretty JSON of the global settings, also written to the log.
    pub fn export_settings(&self) -> Result<String> {
        let json = export_settings_json(&self.settings)?;
        log::info!("--- EDITOR EXPORT ---\n{}", json);
        Ok(json)
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(GlobalSettings::default())
    }
}
