//! Ray picking against the scene graph.
//!
//! Every effectively visible mesh is tested triangle by triangle in world
//! space; light helpers are tested as small spheres around their light.
//! Hits come back sorted nearest first so callers can apply their own
//! filtering and take the first survivor.

use crate::scene::{HelperKind, NodeId, NodeKind, SceneGraph};
use glam::Vec3;

pub const LIGHT_HELPER_RADIUS: f32 = 0.15;

/// Classification of a pickable element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PickKind {
    SceneMesh,
    GizmoHandle,
    LightHelper,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    pub node: NodeId,
    pub kind: PickKind,
    pub distance: f32,
    pub point: Vec3,
}

/// Möller–Trumbore, double sided. Returns the ray distance.
pub fn ray_triangle(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<f32> {
    const EPSILON: f32 = 1e-7;

    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);
    if a.abs() < EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    (t > EPSILON).then_some(t)
}

pub fn ray_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let sqrt = discriminant.sqrt();
    [-b - sqrt, -b + sqrt].into_iter().find(|t| *t > 0.0)
}

fn is_gizmo_part(scene: &SceneGraph, id: NodeId) -> bool {
    scene.ancestors(id).into_iter().any(|ancestor| {
        matches!(
            scene.get(ancestor).map(|node| &node.kind),
            Some(NodeKind::Helper(HelperKind::GizmoRoot))
        )
    })
}

/// All hits along `ray`, nearest first.
pub fn pick(scene: &SceneGraph, ray: &Ray) -> Vec<PickHit> {
    let mut hits = Vec::new();
    for (id, _) in scene.walk() {
        if !scene.is_effectively_visible(id) {
            continue;
        }
        let Some(node) = scene.get(id) else {
            continue;
        };
        match &node.kind {
            NodeKind::Mesh(mesh) => {
                let world = scene.world_matrix(id);
                let positions: Vec<Vec3> = mesh
                    .mesh
                    .positions
                    .iter()
                    .map(|p| world.transform_point3(*p))
                    .collect();
                let nearest = mesh
                    .mesh
                    .indices
                    .chunks_exact(3)
                    .filter_map(|tri| {
                        let v0 = *positions.get(tri[0] as usize)?;
                        let v1 = *positions.get(tri[1] as usize)?;
                        let v2 = *positions.get(tri[2] as usize)?;
                        ray_triangle(ray, v0, v1, v2)
                    })
                    .fold(None, |best: Option<f32>, t| Some(best.map_or(t, |b| b.min(t))));
                if let Some(distance) = nearest {
                    let kind = if is_gizmo_part(scene, id) {
                        PickKind::GizmoHandle
                    } else {
                        PickKind::SceneMesh
                    };
                    hits.push(PickHit {
                        node: id,
                        kind,
                        distance,
                        point: ray.at(distance),
                    });
                }
            }
            NodeKind::Helper(HelperKind::Light { .. }) => {
                let center = scene.world_position(id);
                if let Some(distance) = ray_sphere(ray, center, LIGHT_HELPER_RADIUS) {
                    hits.push(PickHit {
                        node: id,
                        kind: PickKind::LightHelper,
                        distance,
                        point: ray.at(distance),
                    });
                }
            }
            _ => {}
        }
    }
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}
