//! Applies a [`Configuration`] to the loaded lamp scene.
//!
//! [`apply`] walks the mesh nodes once, toggles pattern and helper visibility
//! and writes finish parameters into the role materials. A role material the
//! asset did not ship degrades to a flat color on the node's current material.

pub mod tables;

use crate::assets::{image_alt_text, resolve_image_path};
use crate::config::{ConfigAction, ConfigStore, Configuration};
use crate::scene::roles::MaterialRole;
use crate::scene::{AssetRoles, MaterialHandle, MaterialRegistry, MeshRole, NodeId, SceneGraph};
use glam::Vec3;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;
use tables::{
    base_fallback_color, base_finish, pattern_glow, rim_fallback_color, rim_finish, screen_finish,
    FinishParams,
};

/// What a single [`apply`] pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub visible_pattern: Option<NodeId>,
    pub hidden_helpers: usize,
    /// Materials whose version was bumped.
    pub touched: BTreeSet<MaterialHandle>,
    /// Pattern nodes that received a new emissive-capable material.
    pub replaced: Vec<NodeId>,
    /// Role material names that were missing and fell back to a flat color.
    pub fallbacks: Vec<&'static str>,
}

pub fn apply(
    roles: &AssetRoles,
    scene: &mut SceneGraph,
    materials: &mut MaterialRegistry,
    config: &Configuration,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for id in scene.mesh_ids() {
        let Some(role) = roles.mesh_role(id) else {
            continue;
        };
        match role {
            MeshRole::Helper => {
                if let Some(node) = scene.get_mut(id) {
                    node.visible = false;
                    report.hidden_helpers += 1;
                }
            }
            MeshRole::Pattern(pattern) => {
                let visible = pattern == config.pattern;
                let Some(node) = scene.get_mut(id) else {
                    continue;
                };
                node.visible = visible;
                if !visible {
                    continue;
                }
                report.visible_pattern = Some(id);
                let Some(mesh) = node.as_mesh_mut() else {
                    continue;
                };
                let Some(current) = materials.get(mesh.material) else {
                    continue;
                };
                if !current.supports_emissive() {
                    let variant = current.emissive_variant();
                    log::debug!("Upgrading '{}' to an emissive material", current.name);
                    mesh.material = materials.insert(variant);
                    report.replaced.push(id);
                }
                let glow = pattern_glow(pattern);
                if let Some(material) = materials.get_mut(mesh.material) {
                    material.emissive = glow.color;
                    material.emissive_intensity = glow.intensity;
                    report.touched.insert(mesh.material);
                }
            }
            MeshRole::Base => apply_finish(
                roles,
                scene,
                materials,
                id,
                MaterialRole::Base(config.base),
                base_finish(config.base),
                base_fallback_color(config.base),
                &mut report,
            ),
            MeshRole::Rim => apply_finish(
                roles,
                scene,
                materials,
                id,
                MaterialRole::Rim(config.rim),
                rim_finish(config.rim),
                rim_fallback_color(config.rim),
                &mut report,
            ),
            MeshRole::Screen => apply_finish(
                roles,
                scene,
                materials,
                id,
                MaterialRole::Screen(config.rim),
                screen_finish(config.rim),
                rim_fallback_color(config.rim),
                &mut report,
            ),
        }
    }

    for handle in &report.touched {
        if let Some(material) = materials.get_mut(*handle) {
            material.mark_dirty();
        }
    }
    if !report.fallbacks.is_empty() {
        log::warn!(
            "Materials not found, using fallback colors: {}",
            report.fallbacks.join(", ")
        );
    }
    report
}

#[allow(clippy::too_many_arguments)]
fn apply_finish(
    roles: &AssetRoles,
    scene: &mut SceneGraph,
    materials: &mut MaterialRegistry,
    id: NodeId,
    role: MaterialRole,
    params: FinishParams,
    fallback: Vec3,
    report: &mut ApplyReport,
) {
    let Some(mesh) = scene.get_mut(id).and_then(|node| node.as_mesh_mut()) else {
        return;
    };
    match roles.material(role) {
        Some(handle) => {
            mesh.material = handle;
            if let Some(material) = materials.get_mut(handle) {
                material.color = params.color;
                material.metalness = params.metalness;
                material.roughness = params.roughness;
                material.env_map_intensity = params.env_map_intensity;
                report.touched.insert(handle);
            }
        }
        None => {
            if let Some(material) = materials.get_mut(mesh.material) {
                material.color = fallback;
                report.touched.insert(mesh.material);
            }
            if !report.fallbacks.contains(&role.asset_name()) {
                report.fallbacks.push(role.asset_name());
            }
        }
    }
}

/// Storefront session: the configuration store plus the scene it drives.
///
/// Dispatches go through the store; subscribers flag the scene as stale and
/// [`Configurator::sync`] re-applies the configuration once per frame.
pub struct Configurator {
    store: ConfigStore,
    stale: Rc<Cell<bool>>,
    roles: Option<AssetRoles>,
}

impl Configurator {
    pub fn new(initial: Configuration) -> Self {
        let mut store = ConfigStore::new(initial);
        let stale = Rc::new(Cell::new(true));
        let flag = Rc::clone(&stale);
        store.subscribe(move |_| flag.set(true));
        store.subscribe(|config| log::info!("Selected render: {}", resolve_image_path(config)));
        Self {
            store,
            stale,
            roles: None,
        }
    }

    pub fn state(&self) -> Configuration {
        self.store.state()
    }

    pub fn dispatch(&mut self, action: ConfigAction) -> bool {
        self.store.dispatch(action)
    }

    pub fn image_path(&self) -> String {
        resolve_image_path(&self.state())
    }

    pub fn alt_text(&self) -> String {
        image_alt_text(&self.state())
    }

    /// Start driving a freshly loaded asset.
    pub fn attach(&mut self, roles: AssetRoles) {
        self.roles = Some(roles);
        self.stale.set(true);
    }

    /// Apply the current configuration if it changed since the last sync.
    pub fn sync(
        &mut self,
        scene: &mut SceneGraph,
        materials: &mut MaterialRegistry,
    ) -> Option<ApplyReport> {
        if !self.stale.get() {
            return None;
        }
        let roles = self.roles.as_ref()?;
        self.stale.set(false);
        Some(apply(roles, scene, materials, &self.store.state()))
    }
}

impl Default for Configurator {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::model::{fixtures::lamp_glb, parse_model};
    use crate::config::{BaseFinish, PatternMotif, RimFinish};
    use crate::scene::ShadingModel;

    struct Lamp {
        scene: SceneGraph,
        materials: MaterialRegistry,
        roles: AssetRoles,
    }

    fn lamp() -> Lamp {
        let model = parse_model(&lamp_glb(), "lamp.glb").unwrap();
        let mut scene = SceneGraph::new();
        let mut materials = MaterialRegistry::new();
        let instance = model.instantiate(&mut scene, &mut materials, None);
        let roles =
            AssetRoles::resolve(&mut scene, &materials, Some(instance.root), &instance.materials);
        Lamp {
            scene,
            materials,
            roles,
        }
    }

    // `BaseRim` names both the split group and its first primitive.
    fn node_material<'a>(lamp: &'a Lamp, name: &str) -> &'a crate::scene::Material {
        let id = lamp
            .scene
            .mesh_ids()
            .into_iter()
            .find(|id| lamp.scene.get(*id).unwrap().name == name)
            .unwrap();
        let handle = lamp.scene.get(id).unwrap().as_mesh().unwrap().material;
        lamp.materials.get(handle).unwrap()
    }

    fn visible(lamp: &Lamp, name: &str) -> bool {
        let id = lamp.scene.find_by_name(name).unwrap();
        lamp.scene.get(id).unwrap().visible
    }

    #[test]
    fn exactly_one_pattern_is_visible() {
        let mut lamp = lamp();
        for pattern in PatternMotif::ALL {
            let config = Configuration::new(BaseFinish::Black, RimFinish::SilverRing, pattern);
            apply(&lamp.roles, &mut lamp.scene, &mut lamp.materials, &config);
            let shown: Vec<&str> = ["Triangle_Pattern", "Star_Pattern", "Arabic_Pattern"]
                .into_iter()
                .filter(|name| visible(&lamp, name))
                .collect();
            assert_eq!(shown, vec![crate::assets::pattern_mesh_name(pattern)]);
        }
    }

    #[test]
    fn helpers_are_always_hidden() {
        let mut lamp = lamp();
        let report = apply(
            &lamp.roles,
            &mut lamp.scene,
            &mut lamp.materials,
            &Configuration::default(),
        );
        assert_eq!(report.hidden_helpers, 3);
        for name in ["Patterns", "Screen_Copper", "Screen_Silver"] {
            assert!(!visible(&lamp, name), "{} visible", name);
        }
    }

    #[test]
    fn basic_pattern_material_is_upgraded_once() {
        let mut lamp = lamp();
        let config = Configuration::default();
        let first = apply(&lamp.roles, &mut lamp.scene, &mut lamp.materials, &config);
        assert_eq!(first.replaced.len(), 1);
        let material = node_material(&lamp, "Triangle_Pattern");
        assert_eq!(material.model, ShadingModel::Standard);
        assert_eq!(material.emissive, tables::pattern_glow(PatternMotif::Triangle).color);

        let second = apply(&lamp.roles, &mut lamp.scene, &mut lamp.materials, &config);
        assert!(second.replaced.is_empty());
    }

    #[test]
    fn shipped_materials_receive_finish_parameters() {
        let mut lamp = lamp();
        let config =
            Configuration::new(BaseFinish::Black, RimFinish::SilverRing, PatternMotif::Star);
        let report = apply(&lamp.roles, &mut lamp.scene, &mut lamp.materials, &config);

        let base = node_material(&lamp, "Base");
        assert_eq!(base.name, "Black");
        assert_eq!(base.roughness, tables::base_finish(BaseFinish::Black).roughness);
        assert!(base.version() > 0);

        for name in ["Rim", "Ring", "BaseRim", "BaseRim_1", "Logo"] {
            assert_eq!(node_material(&lamp, name).name, "Silver Cap", "{}", name);
        }
        assert_eq!(node_material(&lamp, "Screen_Main_(Gold)").name, "Screen Silver");
        assert!(report.fallbacks.is_empty());
    }

    #[test]
    fn missing_material_falls_back_to_flat_color() {
        let mut lamp = lamp();
        let before = node_material(&lamp, "Base").clone();
        let config =
            Configuration::new(BaseFinish::White, RimFinish::CopperRing, PatternMotif::Arabic);
        let report = apply(&lamp.roles, &mut lamp.scene, &mut lamp.materials, &config);

        assert!(report.fallbacks.contains(&"White"));
        assert!(report.fallbacks.contains(&"Cooper Cap"));
        assert!(report.fallbacks.contains(&"Screen Copper"));

        let base = node_material(&lamp, "Base");
        assert_eq!(base.name, before.name);
        assert_eq!(base.color, Vec3::ONE);
        assert_eq!(base.roughness, before.roughness);
        assert_eq!(base.metalness, before.metalness);
    }

    #[test]
    fn shared_materials_are_dirtied_once_per_pass() {
        let mut lamp = lamp();
        let handle = lamp
            .roles
            .material(MaterialRole::Rim(RimFinish::GoldenRing))
            .unwrap();
        apply(
            &lamp.roles,
            &mut lamp.scene,
            &mut lamp.materials,
            &Configuration::default(),
        );
        assert_eq!(lamp.materials.get(handle).unwrap().version(), 1);
    }

    #[test]
    fn configurator_syncs_only_after_changes() {
        let mut lamp = lamp();
        let mut configurator = Configurator::default();
        assert!(configurator.sync(&mut lamp.scene, &mut lamp.materials).is_none());

        configurator.attach(lamp.roles.clone());
        assert!(configurator.sync(&mut lamp.scene, &mut lamp.materials).is_some());
        assert!(configurator.sync(&mut lamp.scene, &mut lamp.materials).is_none());

        assert!(configurator.dispatch(ConfigAction::SelectPattern(PatternMotif::Arabic)));
        let report = configurator.sync(&mut lamp.scene, &mut lamp.materials).unwrap();
        let arabic = lamp.scene.find_by_name("Arabic_Pattern").unwrap();
        assert_eq!(report.visible_pattern, Some(arabic));
        assert_eq!(
            configurator.image_path(),
            "renders/Golden Ring/Red - Golden Ring/Arabic - Red.webp"
        );
    }
}
