use glam::Vec3;

/// Stable index into a [`MaterialRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(u32);

impl MaterialHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadingModel {
    /// Metal/rough PBR with emissive support.
    Standard,
    /// Flat color, no lighting and no emissive channel.
    Basic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub model: ShadingModel,
    pub color: Vec3,
    pub metalness: f32,
    pub roughness: f32,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
    pub env_map_intensity: f32,
    version: u64,
}

impl Material {
    pub fn standard(name: impl Into<String>, color: Vec3) -> Self {
        Self {
            name: name.into(),
            model: ShadingModel::Standard,
            color,
            metalness: 0.0,
            roughness: 1.0,
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
            env_map_intensity: 1.0,
            version: 0,
        }
    }

    pub fn basic(name: impl Into<String>, color: Vec3) -> Self {
        Self {
            model: ShadingModel::Basic,
            ..Self::standard(name, color)
        }
    }

    pub fn supports_emissive(&self) -> bool {
        self.model == ShadingModel::Standard
    }

    /// Standard copy of this material that keeps its color.
    pub fn emissive_variant(&self) -> Material {
        Material {
            name: format!("{} (Emissive)", self.name),
            model: ShadingModel::Standard,
            version: 0,
            ..self.clone()
        }
    }

    /// Bumped whenever parameters are written; renderers cache by it.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn mark_dirty(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

#[derive(Debug, Default)]
pub struct MaterialRegistry {
    materials: Vec<Material>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a material. Names need not be unique; every insert gets its
    /// own handle.
    pub fn insert(&mut self, material: Material) -> MaterialHandle {
        let handle = MaterialHandle(self.materials.len() as u32);
        self.materials.push(material);
        handle
    }

    /// First of `handles` whose material is called `name`.
    pub fn find_among(&self, handles: &[MaterialHandle], name: &str) -> Option<MaterialHandle> {
        handles
            .iter()
            .copied()
            .find(|handle| self.get(*handle).is_some_and(|material| material.name == name))
    }

    pub fn get(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle.index())
    }

    pub fn get_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.materials.get_mut(handle.index())
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_scoped_to_the_given_handles() {
        let mut registry = MaterialRegistry::new();
        let first = registry.insert(Material::standard("Gold Cap", Vec3::ONE));
        let second = registry.insert(Material::standard("Gold Cap", Vec3::ZERO));
        assert_ne!(first, second);
        assert_eq!(registry.find_among(&[first, second], "Gold Cap"), Some(first));
        assert_eq!(registry.find_among(&[second], "Gold Cap"), Some(second));
        assert_eq!(registry.find_among(&[], "Gold Cap"), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn emissive_variant_upgrades_basic() {
        let basic = Material::basic("Pattern", Vec3::new(0.2, 0.3, 0.4));
        assert!(!basic.supports_emissive());
        let variant = basic.emissive_variant();
        assert!(variant.supports_emissive());
        assert_eq!(variant.color, basic.color);
        assert_eq!(variant.name, "Pattern (Emissive)");
    }

    #[test]
    fn mark_dirty_bumps_version() {
        let mut material = Material::standard("Screen Gold", Vec3::ONE);
        let before = material.version();
        material.mark_dirty();
        assert_eq!(material.version(), before + 1);
    }
}
