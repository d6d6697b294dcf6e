//! Asset naming contract and loaders.
//!
//! The resolver functions here are pure: they turn a [`Configuration`] into
//! the render image path and the material / mesh names the 3D asset ships.

pub mod environment;
pub mod model;

use crate::config::{BaseFinish, Configuration, PatternMotif, RimFinish};

pub use self::environment::EnvironmentMap;
pub use self::model::{load_model, LoadedModel, ModelInstance, ModelSource};

pub const RENDERS_ROOT: &str = "renders";
pub const IMAGE_EXTENSION: &str = "webp";

pub const MESH_BASE: &str = "Base";
pub const MESH_SCREEN: &str = "Screen_Main_(Gold)";
pub const RIM_GROUP_MESHES: [&str; 5] = ["Rim", "Ring", "BaseRim", "BaseRim_1", "Logo"];
/// Alternate-finish placeholders baked into the asset; never shown.
pub const HELPER_MESHES: [&str; 3] = ["Patterns", "Screen_Copper", "Screen_Silver"];

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("failed to parse glTF {path}: {source}")]
    ParseGltf {
        path: String,
        #[source]
        source: gltf::Error,
    },
    #[error("glTF {path} has no scene")]
    NoScene { path: String },
    #[error("primitive without positions in mesh '{mesh}'")]
    MissingPositions { mesh: String },
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Names inside the 3D asset selected by a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialNames {
    pub base_mesh_material: &'static str,
    pub rim_mesh_material: &'static str,
    pub screen_mesh_material: &'static str,
    pub visible_pattern_mesh: &'static str,
}

pub fn base_material_name(base: BaseFinish) -> &'static str {
    base.display_name()
}

pub fn rim_material_name(rim: RimFinish) -> &'static str {
    match rim {
        RimFinish::GoldenRing => "Gold Cap",
        RimFinish::SilverRing => "Silver Cap",
        // Spelled this way in the shipped asset.
        RimFinish::CopperRing => "Cooper Cap",
    }
}

pub fn screen_material_name(rim: RimFinish) -> &'static str {
    match rim {
        RimFinish::GoldenRing => "Screen Gold",
        RimFinish::SilverRing => "Screen Silver",
        RimFinish::CopperRing => "Screen Copper",
    }
}

pub fn pattern_mesh_name(pattern: PatternMotif) -> &'static str {
    match pattern {
        PatternMotif::Triangle => "Triangle_Pattern",
        PatternMotif::Star => "Star_Pattern",
        PatternMotif::Arabic => "Arabic_Pattern",
    }
}

pub fn resolve_material_names(config: &Configuration) -> MaterialNames {
    MaterialNames {
        base_mesh_material: base_material_name(config.base),
        rim_mesh_material: rim_material_name(config.rim),
        screen_mesh_material: screen_material_name(config.rim),
        visible_pattern_mesh: pattern_mesh_name(config.pattern),
    }
}

/// Prefix in front of the pattern in the file name. Golden Ring renders were
/// produced first and never got one.
fn rim_prefix(rim: RimFinish) -> String {
    match rim {
        RimFinish::GoldenRing => String::new(),
        other => format!("{} - ", other.key()),
    }
}

/// `renders/{rim}/{base} - {rim}/{rim-prefix}{pattern} - {base}.webp`
pub fn resolve_image_path(config: &Configuration) -> String {
    let rim = config.rim.key();
    let base = config.base.key();
    format!(
        "{RENDERS_ROOT}/{rim}/{base} - {rim}/{}{} - {base}.{IMAGE_EXTENSION}",
        rim_prefix(config.rim),
        config.pattern.key(),
    )
}

/// Inverse of [`resolve_image_path`]; `None` for anything off-template.
pub fn parse_image_path(path: &str) -> Option<Configuration> {
    let mut parts = path.split('/');
    if parts.next()? != RENDERS_ROOT {
        return None;
    }
    let rim: RimFinish = parts.next()?.parse().ok()?;
    let directory = parts.next()?;
    let file = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let base_key = directory.strip_suffix(&format!(" - {}", rim.key()))?;
    let base: BaseFinish = BaseFinish::ALL
        .into_iter()
        .find(|base| base.key() == base_key)?;

    let stem = file.strip_suffix(&format!(".{IMAGE_EXTENSION}"))?;
    let stem = stem.strip_prefix(rim_prefix(rim).as_str())?;
    let pattern_key = stem.strip_suffix(&format!(" - {}", base.key()))?;
    let pattern: PatternMotif = pattern_key.parse().ok()?;

    Some(Configuration { base, rim, pattern })
}

/// Shown in place of a render that failed to load.
pub fn image_alt_text(config: &Configuration) -> String {
    format!(
        "Image not found: {} - {} with {}",
        config.pattern.key(),
        config.base.key(),
        config.rim.key()
    )
}

fn all_configurations() -> impl Iterator<Item = Configuration> {
    RimFinish::ALL.into_iter().flat_map(|rim| {
        rim.permitted_bases().flat_map(move |base| {
            PatternMotif::ALL
                .into_iter()
                .map(move |pattern| Configuration { base, rim, pattern })
        })
    })
}

/// Every image path the storefront can ask for.
pub fn all_image_paths() -> Vec<String> {
    all_configurations()
        .map(|config| resolve_image_path(&config))
        .collect()
}
