pub mod material;
pub mod roles;
pub mod serialization;
pub mod settings;

pub use material::{Material, MaterialHandle, MaterialRegistry, ShadingModel};
pub use roles::{AssetRoles, MeshRole};
pub use settings::GlobalSettings;

use glam::{EulerRot, Mat4, Quat, Vec3};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{:06}", self.0)
    }
}

/// Bitmask deciding which passes draw a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderLayers(u8);

impl RenderLayers {
    pub const SCENE: Self = Self(0x01);
    pub const BLOOM: Self = Self(0x02);
    pub const OVERLAY: Self = Self(0x04);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for RenderLayers {
    fn default() -> Self {
        Self::SCENE
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    /// Euler angles in radians, XYZ order.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        Self {
            translation,
            rotation: Vec3::new(x, y, z),
            scale,
        }
    }

    pub fn quat(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quat(), self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Indexed triangle list in node-local space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p))),
        )
    }

    /// Fill in face-averaged normals when the source had none.
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            if a >= normals.len() || b >= normals.len() || c >= normals.len() {
                continue;
            }
            let face = (self.positions[b] - self.positions[a])
                .cross(self.positions[c] - self.positions[a]);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        self.normals = normals
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
            .collect();
    }
}

#[derive(Debug, Clone)]
pub struct MeshNode {
    pub mesh: Arc<MeshData>,
    pub material: MaterialHandle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Ambient,
    Directional,
    Point { distance: f32, decay: f32 },
    Spot {
        distance: f32,
        decay: f32,
        angle: f32,
        penumbra: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightNode {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    /// Aim point for directional and spot lights; the origin when unset.
    pub target: Option<NodeId>,
}

impl LightNode {
    pub fn new(kind: LightKind, color: Vec3, intensity: f32) -> Self {
        Self {
            kind,
            color,
            intensity,
            target: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperKind {
    /// Internal grouping of the transform gizmo's handles.
    GizmoRoot,
    Axes,
    Light { light: NodeId },
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Mesh(MeshNode),
    Light(LightNode),
    Group,
    Helper(HelperKind),
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Mesh(_) => "Mesh",
            NodeKind::Light(_) => "Light",
            NodeKind::Group => "Group",
            NodeKind::Helper(_) => "Helper",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub transform: Transform,
    pub visible: bool,
    pub layers: RenderLayers,
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn as_mesh(&self) -> Option<&MeshNode> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_mesh_mut(&mut self) -> Option<&mut MeshNode> {
        match &mut self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_light(&self) -> Option<&LightNode> {
        match &self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn as_light_mut(&mut self) -> Option<&mut LightNode> {
        match &mut self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("Unnamed {}", self.kind.type_name())
        } else {
            self.name.clone()
        }
    }
}

/// Owns every node; callers refer to nodes by [`NodeId`].
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: HashMap<NodeId, Node>,
    roots: Vec<NodeId>,
    next_id: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        let parent = parent.filter(|parent| self.nodes.contains_key(parent));
        let layers = match kind {
            NodeKind::Helper(_) => RenderLayers::OVERLAY,
            _ => RenderLayers::SCENE,
        };
        self.nodes.insert(
            id,
            Node {
                id,
                name: name.into(),
                transform: Transform::IDENTITY,
                visible: true,
                layers,
                kind,
                parent,
                children: Vec::new(),
            },
        );
        match parent {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    parent.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Detach `id` from its parent and drop it with its whole subtree.
    /// Returns the removed node.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let parent = self.nodes.get(&id)?.parent;
        match parent {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    parent.children.retain(|child| *child != id);
                }
            }
            None => self.roots.retain(|root| *root != id),
        }
        let mut pending = vec![id];
        let mut removed = None;
        while let Some(next) = pending.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                pending.extend(node.children.iter().copied());
                if next == id {
                    removed = Some(node);
                }
            }
        }
        removed
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(&id).and_then(|node| node.parent);
        while let Some(parent) = current {
            out.push(parent);
            current = self.nodes.get(&parent).and_then(|node| node.parent);
        }
        out
    }

    pub fn has_ancestor(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Visible itself and through every ancestor.
    pub fn is_effectively_visible(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        node.visible
            && self
                .ancestors(id)
                .iter()
                .all(|parent| self.nodes.get(parent).map(|p| p.visible).unwrap_or(false))
    }

    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.nodes.get(&node_id) else {
                break;
            };
            matrix = node.transform.matrix() * matrix;
            current = node.parent;
        }
        matrix
    }

    pub fn world_position(&self, id: NodeId) -> Vec3 {
        self.world_matrix(id).transform_point3(Vec3::ZERO)
    }

    /// Depth-first pre-order walk of the whole graph as `(id, depth)`.
    pub fn walk(&self) -> Vec<(NodeId, usize)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(NodeId, usize)> = self.roots.iter().rev().map(|id| (*id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push((id, depth));
            stack.extend(node.children.iter().rev().map(|child| (*child, depth + 1)));
        }
        out
    }

    pub fn mesh_ids(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|(id, _)| matches!(self.nodes[id].kind, NodeKind::Mesh(_)))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.walk()
            .into_iter()
            .map(|(id, _)| id)
            .find(|id| self.nodes[id].name == name)
    }

    /// World-space bounds of every mesh under (and including) `id`.
    pub fn subtree_bounds(&self, id: NodeId) -> Option<(Vec3, Vec3)> {
        let mut pending = vec![id];
        let mut bounds: Option<(Vec3, Vec3)> = None;
        while let Some(next) = pending.pop() {
            let Some(node) = self.nodes.get(&next) else {
                continue;
            };
            pending.extend(node.children.iter().copied());
            let Some(mesh) = node.as_mesh() else {
                continue;
            };
            let world = self.world_matrix(next);
            for p in &mesh.mesh.positions {
                let p = world.transform_point3(*p);
                bounds = Some(match bounds {
                    Some((min, max)) => (min.min(p), max.max(p)),
                    None => (p, p),
                });
            }
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_kind() -> NodeKind {
        NodeKind::Mesh(MeshNode {
            mesh: Arc::new(MeshData {
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                normals: vec![Vec3::Z; 3],
                indices: vec![0, 1, 2],
            }),
            material: MaterialRegistry::new().insert(Material::standard("m", Vec3::ONE)),
        })
    }

    #[test]
    fn remove_drops_subtree_and_detaches() {
        let mut scene = SceneGraph::new();
        let root = scene.add(None, "Root", NodeKind::Group);
        let child = scene.add(Some(root), "Child", NodeKind::Group);
        let grandchild = scene.add(Some(child), "Grandchild", mesh_kind());

        let removed = scene.remove(child).expect("child exists");
        assert_eq!(removed.name, "Child");
        assert!(!scene.contains(grandchild));
        assert!(scene.get(root).unwrap().children().is_empty());
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn walk_is_depth_first_in_child_order() {
        let mut scene = SceneGraph::new();
        let a = scene.add(None, "A", NodeKind::Group);
        let a1 = scene.add(Some(a), "A1", NodeKind::Group);
        let a2 = scene.add(Some(a), "A2", NodeKind::Group);
        let b = scene.add(None, "B", NodeKind::Group);
        let order: Vec<(NodeId, usize)> = scene.walk();
        assert_eq!(order, vec![(a, 0), (a1, 1), (a2, 1), (b, 0)]);
    }

    #[test]
    fn hidden_parent_hides_descendants() {
        let mut scene = SceneGraph::new();
        let parent = scene.add(None, "Parent", NodeKind::Group);
        let child = scene.add(Some(parent), "Child", mesh_kind());
        assert!(scene.is_effectively_visible(child));
        scene.get_mut(parent).unwrap().visible = false;
        assert!(!scene.is_effectively_visible(child));
    }

    #[test]
    fn world_matrix_composes_parents() {
        let mut scene = SceneGraph::new();
        let parent = scene.add(None, "Parent", NodeKind::Group);
        scene.get_mut(parent).unwrap().transform =
            Transform::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let child = scene.add(Some(parent), "Child", NodeKind::Group);
        scene.get_mut(child).unwrap().transform.translation = Vec3::new(0.0, 2.0, 0.0);
        let p = scene.world_position(child);
        assert!((p - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-5);
        assert!(scene.has_ancestor(child, parent));
    }

    #[test]
    fn helper_nodes_default_to_overlay_layer() {
        let mut scene = SceneGraph::new();
        let helper = scene.add(None, "Axes Helper", NodeKind::Helper(HelperKind::Axes));
        let layers = scene.get(helper).unwrap().layers;
        assert!(layers.contains(RenderLayers::OVERLAY));
        assert!(!layers.contains(RenderLayers::SCENE));
    }

    #[test]
    fn subtree_bounds_cover_meshes() {
        let mut scene = SceneGraph::new();
        let root = scene.add(None, "Root", NodeKind::Group);
        let mesh = scene.add(Some(root), "Tri", mesh_kind());
        scene.get_mut(mesh).unwrap().transform.translation = Vec3::new(0.0, 0.0, 3.0);
        let (min, max) = scene.subtree_bounds(root).unwrap();
        assert_eq!(min, Vec3::new(0.0, 0.0, 3.0));
        assert_eq!(max, Vec3::new(1.0, 1.0, 3.0));
    }
}
