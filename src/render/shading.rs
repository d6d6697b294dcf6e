use crate::scene::{LightKind, Material, MaterialHandle, MaterialRegistry, SceneGraph, ShadingModel};
use glam::Vec3;
use std::collections::HashMap;

/// A light resolved to world space for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldLight {
    pub kind: LightKind,
    pub radiance: Vec3,
    pub position: Vec3,
    /// Unit vector the light points along.
    pub direction: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightRig {
    pub ambient: Vec3,
    pub lights: Vec<WorldLight>,
}

impl LightRig {
    /// Collect every effectively visible light in the graph.
    pub fn gather(scene: &SceneGraph) -> Self {
        let mut rig = LightRig::default();
        for (id, _) in scene.walk() {
            let Some(light) = scene.get(id).and_then(|node| node.as_light()) else {
                continue;
            };
            if !scene.is_effectively_visible(id) {
                continue;
            }
            let radiance = light.color * light.intensity;
            if light.kind == LightKind::Ambient {
                rig.ambient += radiance;
                continue;
            }
            let position = scene.world_position(id);
            let target = light
                .target
                .filter(|target| scene.contains(*target))
                .map(|target| scene.world_position(target))
                .unwrap_or(Vec3::ZERO);
            rig.lights.push(WorldLight {
                kind: light.kind,
                radiance,
                position,
                direction: (target - position).try_normalize().unwrap_or(Vec3::NEG_Y),
            });
        }
        rig
    }
}

/// Per-material values the mesh shader reads, derived once per material version.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadeParams {
    pub unlit: bool,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub shininess: f32,
    pub glossiness: f32,
    pub emission: Vec3,
    pub env_map_intensity: f32,
}

impl ShadeParams {
    pub fn from_material(material: &Material) -> Self {
        let metalness = material.metalness.clamp(0.0, 1.0);
        let roughness = material.roughness.clamp(0.04, 1.0);
        let alpha = roughness * roughness;
        Self {
            unlit: material.model == ShadingModel::Basic,
            diffuse: material.color * (1.0 - metalness),
            specular: Vec3::splat(0.04).lerp(material.color, metalness),
            shininess: (2.0 / (alpha * alpha) - 2.0).clamp(1.0, 2048.0),
            glossiness: 1.0 - roughness,
            emission: material.emissive * material.emissive_intensity,
            env_map_intensity: material.env_map_intensity,
        }
    }
}

/// Shading parameters keyed by material handle, rebuilt when a material's
/// version moves.
#[derive(Debug, Default)]
pub struct MaterialCache {
    entries: HashMap<MaterialHandle, (u64, ShadeParams)>,
}

impl MaterialCache {
    pub fn params(
        &mut self,
        materials: &MaterialRegistry,
        handle: MaterialHandle,
    ) -> Option<ShadeParams> {
        let material = materials.get(handle)?;
        if let Some((version, params)) = self.entries.get(&handle) {
            if *version == material.version() {
                return Some(*params);
            }
        }
        let params = ShadeParams::from_material(material);
        log::trace!("Refreshing shading for '{}' v{}", material.name, material.version());
        self.entries.insert(handle, (material.version(), params));
        Some(params)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{LightNode, NodeKind};

    #[test]
    fn basic_materials_are_unlit() {
        let params = ShadeParams::from_material(&Material::basic("flat", Vec3::new(0.2, 0.4, 0.6)));
        assert!(params.unlit);
        assert_eq!(params.diffuse, Vec3::new(0.2, 0.4, 0.6));
    }

    #[test]
    fn metals_move_color_into_specular() {
        let mut material = Material::standard("gold", Vec3::new(1.0, 0.8, 0.3));
        material.metalness = 1.0;
        let params = ShadeParams::from_material(&material);
        assert_eq!(params.diffuse, Vec3::ZERO);
        assert_eq!(params.specular, Vec3::new(1.0, 0.8, 0.3));
    }

    #[test]
    fn emission_scales_with_intensity() {
        let mut material = Material::standard("glow", Vec3::ZERO);
        material.emissive = Vec3::new(1.0, 0.5, 0.0);
        material.emissive_intensity = 2.0;
        let params = ShadeParams::from_material(&material);
        assert_eq!(params.emission, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn gather_aims_lights_at_their_target() {
        let mut scene = SceneGraph::new();
        let target = scene.add(None, "Target", NodeKind::Group);
        scene.get_mut(target).unwrap().transform.translation = Vec3::new(0.0, -1.0, 0.0);
        let mut light = LightNode::new(LightKind::Directional, Vec3::ONE, 2.0);
        light.target = Some(target);
        let id = scene.add(None, "Sun", NodeKind::Light(light));
        scene.get_mut(id).unwrap().transform.translation = Vec3::new(0.0, 4.0, 0.0);
        scene.add(
            None,
            "Ambient",
            NodeKind::Light(LightNode::new(LightKind::Ambient, Vec3::ONE, 0.5)),
        );

        let rig = LightRig::gather(&scene);
        assert_eq!(rig.ambient, Vec3::splat(0.5));
        assert_eq!(rig.lights.len(), 1);
        assert!((rig.lights[0].direction - Vec3::NEG_Y).length() < 1e-5);
        assert_eq!(rig.lights[0].radiance, Vec3::splat(2.0));
    }

    #[test]
    fn cache_refreshes_on_version_bump() {
        let mut registry = MaterialRegistry::new();
        let handle = registry.insert(Material::standard("m", Vec3::ONE));
        let mut cache = MaterialCache::default();
        let before = cache.params(&registry, handle).unwrap();

        let material = registry.get_mut(handle).unwrap();
        material.color = Vec3::ZERO;
        assert_eq!(cache.params(&registry, handle).unwrap(), before);

        registry.get_mut(handle).unwrap().mark_dirty();
        assert_eq!(cache.params(&registry, handle).unwrap().diffuse, Vec3::ZERO);
        assert_eq!(cache.len(), 1);
    }
}
