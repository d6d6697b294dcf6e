use crate::scene::MeshData;
use glam::Vec3;
use std::f32::consts::PI;

pub const SPHERE_SEGMENTS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveShape {
    Box,
    Sphere,
    Plane,
}

impl PrimitiveShape {
    pub const ALL: [PrimitiveShape; 3] =
        [PrimitiveShape::Box, PrimitiveShape::Sphere, PrimitiveShape::Plane];

    pub fn label(self) -> &'static str {
        match self {
            PrimitiveShape::Box => "Box",
            PrimitiveShape::Sphere => "Sphere",
            PrimitiveShape::Plane => "Plane",
        }
    }

    pub fn mesh(self) -> MeshData {
        match self {
            PrimitiveShape::Box => cuboid(Vec3::ONE),
            PrimitiveShape::Sphere => uv_sphere(0.5, SPHERE_SEGMENTS, SPHERE_SEGMENTS),
            PrimitiveShape::Plane => plane(2.0, 2.0),
        }
    }
}

/// Axis-aligned box centered on the origin, four vertices per face so
/// normals stay flat.
pub fn cuboid(size: Vec3) -> MeshData {
    let h = size * 0.5;
    let mut mesh = MeshData::default();
    for normal in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
        let (u, v) = face_axes(normal);
        let base = mesh.positions.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            mesh.positions.push((normal + u * su + v * sv) * h);
            mesh.normals.push(normal);
        }
        mesh.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// Tangent pair for a face so that `u x v == normal`.
fn face_axes(normal: Vec3) -> (Vec3, Vec3) {
    let up = if normal.y.abs() > 0.5 { Vec3::Z } else { Vec3::Y };
    let u = up.cross(normal);
    (u, normal.cross(u))
}

pub fn uv_sphere(radius: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let width_segments = width_segments.max(3);
    let height_segments = height_segments.max(2);
    let mut mesh = MeshData::default();
    for y in 0..=height_segments {
        let theta = y as f32 / height_segments as f32 * PI;
        for x in 0..=width_segments {
            let phi = x as f32 / width_segments as f32 * PI * 2.0;
            let normal = Vec3::new(-phi.cos() * theta.sin(), theta.cos(), phi.sin() * theta.sin());
            mesh.positions.push(normal * radius);
            mesh.normals.push(normal);
        }
    }
    let stride = width_segments + 1;
    for y in 0..height_segments {
        for x in 0..width_segments {
            let a = y * stride + x + 1;
            let b = y * stride + x;
            let c = (y + 1) * stride + x;
            let d = (y + 1) * stride + x + 1;
            if y != 0 {
                mesh.indices.extend_from_slice(&[a, b, d]);
            }
            if y != height_segments - 1 {
                mesh.indices.extend_from_slice(&[b, c, d]);
            }
        }
    }
    mesh
}

/// Plane in the XY plane facing +Z.
pub fn plane(width: f32, height: f32) -> MeshData {
    let (w, h) = (width * 0.5, height * 0.5);
    MeshData {
        positions: vec![
            Vec3::new(-w, -h, 0.0),
            Vec3::new(w, -h, 0.0),
            Vec3::new(w, h, 0.0),
            Vec3::new(-w, h, 0.0),
        ],
        normals: vec![Vec3::Z; 4],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_is_unit_sized_with_outward_normals() {
        let mesh = PrimitiveShape::Box.mesh();
        assert_eq!(mesh.positions.len(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Vec3::splat(-0.5));
        assert_eq!(max, Vec3::splat(0.5));
        for (position, normal) in mesh.positions.iter().zip(&mesh.normals) {
            assert!(position.dot(*normal) > 0.0);
        }
    }

    #[test]
    fn box_faces_wind_counter_clockwise_from_outside() {
        let mesh = cuboid(Vec3::ONE);
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| mesh.positions[i as usize]);
            let face = (b - a).cross(c - a);
            assert!(face.dot(mesh.normals[tri[0] as usize]) > 0.0);
        }
    }

    #[test]
    fn sphere_vertices_sit_on_radius() {
        let mesh = PrimitiveShape::Sphere.mesh();
        assert!(mesh
            .positions
            .iter()
            .all(|p| (p.length() - 0.5).abs() < 1e-5));
        assert_eq!(mesh.positions.len(), 33 * 33);
        assert!(mesh.indices.iter().all(|i| (*i as usize) < mesh.positions.len()));
    }

    #[test]
    fn plane_is_two_by_two() {
        let (min, max) = PrimitiveShape::Plane.mesh().bounds().unwrap();
        assert_eq!(max - min, Vec3::new(2.0, 2.0, 0.0));
    }
}
