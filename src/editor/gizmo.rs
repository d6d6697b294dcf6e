//! Transform gizmo: a hidden group of handle meshes that follows the
//! selected node, plus the drag math for each handle.

use super::primitives::cuboid;
use crate::render::Ray;
use crate::scene::{
    HelperKind, Material, MaterialRegistry, MeshNode, NodeId, NodeKind, RenderLayers, SceneGraph,
    Transform,
};
use glam::{EulerRot, Mat4, Quat, Vec3};
use std::sync::Arc;

/// Names used by gizmo internals. Nodes carrying them are never selectable
/// and never listed in the hierarchy.
pub const HANDLE_NAMES: [&str; 13] = [
    "X", "Y", "Z", "XY", "YZ", "XZ", "XYZE", "E", "START", "END", "DELTA", "AXIS", "invisible",
];

pub const GIZMO_NAME: &str = "TransformControls";

const MIN_SCALE: f32 = 1e-3;

pub fn is_handle_name(name: &str) -> bool {
    HANDLE_NAMES.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GizmoMode {
    #[default]
    Translate,
    Rotate,
    Scale,
}

impl GizmoMode {
    pub fn next(self) -> Self {
        match self {
            GizmoMode::Translate => GizmoMode::Rotate,
            GizmoMode::Rotate => GizmoMode::Scale,
            GizmoMode::Scale => GizmoMode::Translate,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GizmoMode::Translate => "Translate",
            GizmoMode::Rotate => "Rotate",
            GizmoMode::Scale => "Scale",
        }
    }
}

/// Constraint carried by a grabbed handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GizmoAxis {
    X,
    Y,
    Z,
    XY,
    YZ,
    XZ,
    Free,
}

impl GizmoAxis {
    pub fn from_handle_name(name: &str) -> Option<Self> {
        match name {
            "X" => Some(GizmoAxis::X),
            "Y" => Some(GizmoAxis::Y),
            "Z" => Some(GizmoAxis::Z),
            "XY" => Some(GizmoAxis::XY),
            "YZ" => Some(GizmoAxis::YZ),
            "XZ" => Some(GizmoAxis::XZ),
            "XYZE" | "E" => Some(GizmoAxis::Free),
            _ => None,
        }
    }

    pub fn handle_name(self) -> &'static str {
        match self {
            GizmoAxis::X => "X",
            GizmoAxis::Y => "Y",
            GizmoAxis::Z => "Z",
            GizmoAxis::XY => "XY",
            GizmoAxis::YZ => "YZ",
            GizmoAxis::XZ => "XZ",
            GizmoAxis::Free => "XYZE",
        }
    }

    /// Components a translate or scale drag may change.
    pub fn mask(self) -> Vec3 {
        match self {
            GizmoAxis::X => Vec3::X,
            GizmoAxis::Y => Vec3::Y,
            GizmoAxis::Z => Vec3::Z,
            GizmoAxis::XY => Vec3::new(1.0, 1.0, 0.0),
            GizmoAxis::YZ => Vec3::new(0.0, 1.0, 1.0),
            GizmoAxis::XZ => Vec3::new(1.0, 0.0, 1.0),
            GizmoAxis::Free => Vec3::ONE,
        }
    }

    fn line(self) -> Option<Vec3> {
        match self {
            GizmoAxis::X => Some(Vec3::X),
            GizmoAxis::Y => Some(Vec3::Y),
            GizmoAxis::Z => Some(Vec3::Z),
            _ => None,
        }
    }

    /// Normal of the plane a drag slides on.
    fn drag_plane_normal(self, mode: GizmoMode, view: Vec3) -> Vec3 {
        let facing = -view;
        match (mode, self) {
            (GizmoMode::Rotate, GizmoAxis::X | GizmoAxis::YZ) => Vec3::X,
            (GizmoMode::Rotate, GizmoAxis::Y | GizmoAxis::XZ) => Vec3::Y,
            (GizmoMode::Rotate, GizmoAxis::Z | GizmoAxis::XY) => Vec3::Z,
            (_, GizmoAxis::XY) => Vec3::Z,
            (_, GizmoAxis::YZ) => Vec3::X,
            (_, GizmoAxis::XZ) => Vec3::Y,
            (_, GizmoAxis::Free) => facing,
            (_, axis) => {
                // Plane through the axis that faces the viewer as much as possible.
                let line = axis.line().unwrap_or(Vec3::X);
                line.cross(facing.cross(line)).try_normalize().unwrap_or(facing)
            }
        }
    }
}

fn intersect_plane(ray: &Ray, point: Vec3, normal: Vec3) -> Option<Vec3> {
    let denom = normal.dot(ray.direction);
    if denom.abs() < 1e-6 {
        return None;
    }
    let t = normal.dot(point - ray.origin) / denom;
    (t >= 0.0).then(|| ray.at(t))
}

/// Gizmo root plus its handles, living in the scene graph on the overlay
/// layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformGizmo {
    root: NodeId,
    mode: GizmoMode,
    attached: Option<NodeId>,
}

impl TransformGizmo {
    pub fn spawn(scene: &mut SceneGraph, materials: &mut MaterialRegistry) -> Self {
        let root = scene.add(None, GIZMO_NAME, NodeKind::Helper(HelperKind::GizmoRoot));
        if let Some(node) = scene.get_mut(root) {
            node.visible = false;
        }

        // (axis, size, offset, color)
        let handles = [
            (GizmoAxis::X, [1.0, 0.04, 0.04], [0.5, 0.0, 0.0], [1.0, 0.2, 0.2]),
            (GizmoAxis::Y, [0.04, 1.0, 0.04], [0.0, 0.5, 0.0], [0.2, 1.0, 0.2]),
            (GizmoAxis::Z, [0.04, 0.04, 1.0], [0.0, 0.0, 0.5], [0.2, 0.2, 1.0]),
            (GizmoAxis::XY, [0.2, 0.2, 0.01], [0.2, 0.2, 0.0], [1.0, 1.0, 0.2]),
            (GizmoAxis::YZ, [0.01, 0.2, 0.2], [0.0, 0.2, 0.2], [0.2, 1.0, 1.0]),
            (GizmoAxis::XZ, [0.2, 0.01, 0.2], [0.2, 0.0, 0.2], [1.0, 0.2, 1.0]),
            (GizmoAxis::Free, [0.12; 3], [0.0; 3], [0.9; 3]),
        ];
        for (axis, size, offset, color) in handles {
            let (size, offset, color) =
                (Vec3::from_array(size), Vec3::from_array(offset), Vec3::from_array(color));
            let name = axis.handle_name();
            let material = materials.insert(Material::basic(format!("Gizmo {}", name), color));
            let id = scene.add(
                Some(root),
                name,
                NodeKind::Mesh(MeshNode {
                    mesh: Arc::new(cuboid(size)),
                    material,
                }),
            );
            if let Some(node) = scene.get_mut(id) {
                node.transform = Transform::from_translation(offset);
                node.layers = RenderLayers::OVERLAY;
            }
        }

        Self {
            root,
            mode: GizmoMode::default(),
            attached: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn mode(&self) -> GizmoMode {
        self.mode
    }

    pub fn cycle_mode(&mut self) -> GizmoMode {
        self.mode = self.mode.next();
        self.mode
    }

    pub fn attached(&self) -> Option<NodeId> {
        self.attached
    }

    pub fn attach(&mut self, scene: &mut SceneGraph, node: NodeId) {
        self.attached = Some(node);
        self.follow(scene);
    }

    pub fn detach(&mut self, scene: &mut SceneGraph) {
        self.attached = None;
        self.follow(scene);
    }

    /// Whether `id` is the gizmo root or one of its handles.
    pub fn owns(&self, scene: &SceneGraph, id: NodeId) -> bool {
        id == self.root || scene.has_ancestor(id, self.root)
    }

    /// Move the gizmo onto the attached node, or hide it.
    pub fn follow(&mut self, scene: &mut SceneGraph) {
        if let Some(node) = self.attached.filter(|node| !scene.contains(*node)) {
            log::debug!("Gizmo target {} is gone, detaching", node);
            self.attached = None;
        }
        let position = self.attached.map(|node| scene.world_position(node));
        if let Some(root) = scene.get_mut(self.root) {
            root.visible = position.is_some();
            if let Some(position) = position {
                root.transform.translation = position;
            }
        }
    }
}

/// An in-progress handle drag. Offsets are measured against the state at
/// grab time so the node never drifts.
#[derive(Debug, Clone, PartialEq)]
pub struct GizmoDrag {
    node: NodeId,
    axis: GizmoAxis,
    mode: GizmoMode,
    origin: Vec3,
    plane_normal: Vec3,
    grab_point: Vec3,
    start: Transform,
    parent_inverse: Mat4,
}

impl GizmoDrag {
    pub fn begin(
        scene: &SceneGraph,
        node: NodeId,
        axis: GizmoAxis,
        mode: GizmoMode,
        ray: &Ray,
    ) -> Option<Self> {
        let target = scene.get(node)?;
        let origin = scene.world_position(node);
        let plane_normal = axis.drag_plane_normal(mode, ray.direction);
        let grab_point = intersect_plane(ray, origin, plane_normal)?;
        let parent_inverse = target
            .parent()
            .map(|parent| scene.world_matrix(parent).inverse())
            .unwrap_or(Mat4::IDENTITY);
        Some(Self {
            node,
            axis,
            mode,
            origin,
            plane_normal,
            grab_point,
            start: target.transform,
            parent_inverse,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn axis(&self) -> GizmoAxis {
        self.axis
    }

    /// Apply the drag for the current pointer ray. Returns false when the
    /// ray misses the drag plane or the node is gone.
    pub fn update(&self, scene: &mut SceneGraph, ray: &Ray) -> bool {
        let Some(point) = intersect_plane(ray, self.origin, self.plane_normal) else {
            return false;
        };
        let transform = match self.mode {
            GizmoMode::Translate => self.translated(point),
            GizmoMode::Rotate => self.rotated(point),
            GizmoMode::Scale => self.scaled(point),
        };
        match scene.get_mut(self.node) {
            Some(node) => {
                node.transform = transform;
                true
            }
            None => false,
        }
    }

    fn translated(&self, point: Vec3) -> Transform {
        let offset = (point - self.grab_point) * self.axis.mask();
        Transform {
            translation: self.start.translation + self.parent_inverse.transform_vector3(offset),
            ..self.start
        }
    }

    fn rotated(&self, point: Vec3) -> Transform {
        let from = self.grab_point - self.origin;
        let to = point - self.origin;
        let angle = self.plane_normal.dot(from.cross(to)).atan2(from.dot(to));
        let axis = self
            .parent_inverse
            .transform_vector3(self.plane_normal)
            .try_normalize()
            .unwrap_or(self.plane_normal);
        let rotation = Quat::from_axis_angle(axis, angle) * self.start.quat();
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        Transform {
            rotation: Vec3::new(x, y, z),
            ..self.start
        }
    }

    fn scaled(&self, point: Vec3) -> Transform {
        let factor = match self.axis {
            GizmoAxis::Free => {
                let from = (self.grab_point - self.origin).length();
                let to = (point - self.origin).length();
                Vec3::splat(if from > 1e-6 { to / from } else { 1.0 })
            }
            axis => Vec3::ONE + (point - self.grab_point) * axis.mask(),
        };
        Transform {
            scale: (self.start.scale * factor).max(Vec3::splat(MIN_SCALE)),
            ..self.start
        }
    }
}
