//! Typed handles for the named parts of the lamp asset.
//!
//! Name lookups happen once, when an asset is loaded. Everything downstream
//! works with [`NodeId`]s and [`MaterialHandle`]s, and names the asset did not
//! ship are recorded in [`AssetRoles::missing`] instead of being silently
//! ignored.

use crate::assets::{
    base_material_name, pattern_mesh_name, rim_material_name, screen_material_name,
    HELPER_MESHES, MESH_BASE, MESH_SCREEN, RIM_GROUP_MESHES,
};
use crate::config::{BaseFinish, PatternMotif, RimFinish};
use crate::scene::{MaterialHandle, MaterialRegistry, NodeId, RenderLayers, SceneGraph};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshRole {
    Base,
    Rim,
    Screen,
    Pattern(PatternMotif),
    Helper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialRole {
    Base(BaseFinish),
    Rim(RimFinish),
    Screen(RimFinish),
}

impl MaterialRole {
    pub fn asset_name(self) -> &'static str {
        match self {
            MaterialRole::Base(base) => base_material_name(base),
            MaterialRole::Rim(rim) => rim_material_name(rim),
            MaterialRole::Screen(rim) => screen_material_name(rim),
        }
    }

    fn all() -> impl Iterator<Item = MaterialRole> {
        BaseFinish::ALL
            .into_iter()
            .map(MaterialRole::Base)
            .chain(RimFinish::ALL.into_iter().map(MaterialRole::Rim))
            .chain(RimFinish::ALL.into_iter().map(MaterialRole::Screen))
    }
}

fn classify(name: &str) -> Option<MeshRole> {
    if name == MESH_BASE {
        return Some(MeshRole::Base);
    }
    if name == MESH_SCREEN {
        return Some(MeshRole::Screen);
    }
    if RIM_GROUP_MESHES.contains(&name) {
        return Some(MeshRole::Rim);
    }
    if HELPER_MESHES.contains(&name) {
        return Some(MeshRole::Helper);
    }
    PatternMotif::ALL
        .into_iter()
        .find(|pattern| pattern_mesh_name(*pattern) == name)
        .map(MeshRole::Pattern)
}

#[derive(Debug, Default, Clone)]
pub struct AssetRoles {
    meshes: HashMap<NodeId, MeshRole>,
    materials: HashMap<MaterialRole, MaterialHandle>,
    missing: Vec<String>,
}

impl AssetRoles {
    /// Classify the meshes under `root` (or the whole graph) and look up the
    /// role materials among `asset_materials`, the handles the asset itself
    /// registered. Pattern meshes are tagged for the bloom layer.
    pub fn resolve(
        scene: &mut SceneGraph,
        materials: &MaterialRegistry,
        root: Option<NodeId>,
        asset_materials: &[MaterialHandle],
    ) -> Self {
        let mut roles = AssetRoles::default();
        let candidates: Vec<NodeId> = scene
            .mesh_ids()
            .into_iter()
            .filter(|id| root.map_or(true, |root| *id == root || scene.has_ancestor(*id, root)))
            .collect();

        for id in candidates {
            let Some(node) = scene.get_mut(id) else {
                continue;
            };
            let Some(role) = classify(&node.name) else {
                continue;
            };
            if matches!(role, MeshRole::Pattern(_)) {
                node.layers = node.layers.with(RenderLayers::BLOOM);
            }
            roles.meshes.insert(id, role);
        }

        let mut expected: Vec<&str> = vec![MESH_BASE, MESH_SCREEN];
        expected.extend(RIM_GROUP_MESHES);
        expected.extend(PatternMotif::ALL.into_iter().map(pattern_mesh_name));
        for name in expected {
            let present = roles
                .meshes
                .keys()
                .any(|id| scene.get(*id).map(|node| node.name == name).unwrap_or(false));
            if !present {
                roles.missing.push(format!("mesh '{}'", name));
            }
        }

        for role in MaterialRole::all() {
            match materials.find_among(asset_materials, role.asset_name()) {
                Some(handle) => {
                    roles.materials.insert(role, handle);
                }
                None => roles.missing.push(format!("material '{}'", role.asset_name())),
            }
        }

        if !roles.missing.is_empty() {
            log::warn!(
                "Asset is missing {} named parts, fallbacks will apply: {}",
                roles.missing.len(),
                roles.missing.join(", ")
            );
        }
        roles
    }

    pub fn mesh_role(&self, id: NodeId) -> Option<MeshRole> {
        self.meshes.get(&id).copied()
    }

    pub fn material(&self, role: MaterialRole) -> Option<MaterialHandle> {
        self.materials.get(&role).copied()
    }

    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn pattern_nodes(&self) -> impl Iterator<Item = (NodeId, PatternMotif)> + '_ {
        self.meshes.iter().filter_map(|(id, role)| match role {
            MeshRole::Pattern(pattern) => Some((*id, *pattern)),
            _ => None,
        })
    }

    /// True when no contract meshes were classified.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::model::{fixtures::lamp_glb, parse_model};
    use crate::assets::ModelInstance;

    fn lamp() -> (SceneGraph, MaterialRegistry, ModelInstance) {
        let model = parse_model(&lamp_glb(), "lamp.glb").unwrap();
        let mut scene = SceneGraph::new();
        let mut materials = MaterialRegistry::new();
        let instance = model.instantiate(&mut scene, &mut materials, None);
        (scene, materials, instance)
    }

    fn resolve(
        scene: &mut SceneGraph,
        materials: &MaterialRegistry,
        lamp: &ModelInstance,
    ) -> AssetRoles {
        AssetRoles::resolve(scene, materials, Some(lamp.root), &lamp.materials)
    }

    #[test]
    fn classifies_contract_meshes() {
        let (mut scene, materials, instance) = lamp();
        let roles = resolve(&mut scene, &materials, &instance);

        let base = scene.find_by_name("Base").unwrap();
        assert_eq!(roles.mesh_role(base), Some(MeshRole::Base));
        let star = scene.find_by_name("Star_Pattern").unwrap();
        assert_eq!(roles.mesh_role(star), Some(MeshRole::Pattern(PatternMotif::Star)));
        let helper = scene.find_by_name("Screen_Copper").unwrap();
        assert_eq!(roles.mesh_role(helper), Some(MeshRole::Helper));
        assert_eq!(roles.pattern_nodes().count(), 3);
    }

    #[test]
    fn pattern_meshes_join_bloom_layer() {
        let (mut scene, materials, instance) = lamp();
        resolve(&mut scene, &materials, &instance);
        let triangle = scene.find_by_name("Triangle_Pattern").unwrap();
        assert!(scene.get(triangle).unwrap().layers.contains(RenderLayers::BLOOM));
        let base = scene.find_by_name("Base").unwrap();
        assert!(!scene.get(base).unwrap().layers.contains(RenderLayers::BLOOM));
    }

    #[test]
    fn absent_materials_are_recorded_not_fatal() {
        let (mut scene, materials, instance) = lamp();
        let roles = resolve(&mut scene, &materials, &instance);
        assert!(roles.material(MaterialRole::Rim(RimFinish::GoldenRing)).is_some());
        assert!(roles.material(MaterialRole::Rim(RimFinish::CopperRing)).is_none());
        assert!(roles.missing().iter().any(|name| name == "material 'Cooper Cap'"));
        assert!(roles.missing().iter().any(|name| name == "material 'White'"));
        assert!(!roles.missing().iter().any(|name| name.starts_with("mesh")));
    }

    #[test]
    fn materials_from_other_assets_are_ignored() {
        let (mut scene, materials, instance) = lamp();
        let roles = AssetRoles::resolve(&mut scene, &materials, Some(instance.root), &[]);
        assert!(roles.material(MaterialRole::Rim(RimFinish::GoldenRing)).is_none());
        assert!(roles.missing().iter().any(|name| name == "material 'Gold Cap'"));
    }

    #[test]
    fn empty_scene_reports_every_mesh_missing() {
        let mut scene = SceneGraph::new();
        let roles = AssetRoles::resolve(&mut scene, &MaterialRegistry::new(), None, &[]);
        assert!(roles.is_empty());
        assert!(roles.missing().iter().any(|name| name == "mesh 'Base'"));
    }
}
