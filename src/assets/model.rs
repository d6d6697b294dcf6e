use crate::assets::AssetError;
use crate::scene::{
    LightKind, LightNode, Material, MaterialHandle, MaterialRegistry, MeshData, MeshNode,
    NodeId, NodeKind, SceneGraph, ShadingModel, Transform,
};
use glam::{Quat, Vec3};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a model comes from: local disk or an HTTP(S) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Path(PathBuf),
    Url(String),
}

impl ModelSource {
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            Self::Url(value.to_string())
        } else {
            Self::Path(PathBuf::from(value))
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .and_then(|value| value.to_str())
                .unwrap_or("gltf")
                .to_string(),
            Self::Url(url) => url
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .unwrap_or("gltf")
                .to_string(),
        }
    }

    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        let (_, ext) = name.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelMaterial {
    pub name: String,
    pub model: ShadingModel,
    pub color: Vec3,
    pub metalness: f32,
    pub roughness: f32,
    pub emissive: Vec3,
}

impl ModelMaterial {
    fn to_material(&self) -> Material {
        let mut material = match self.model {
            ShadingModel::Standard => Material::standard(self.name.clone(), self.color),
            ShadingModel::Basic => Material::basic(self.name.clone(), self.color),
        };
        material.metalness = self.metalness;
        material.roughness = self.roughness;
        material.emissive = self.emissive;
        material
    }
}

#[derive(Debug, Clone)]
pub struct ModelPrimitive {
    pub mesh: Arc<MeshData>,
    pub material: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum ModelContent {
    Empty,
    Mesh(Vec<ModelPrimitive>),
    Light(LightNode),
}

#[derive(Debug, Clone)]
pub struct ModelNode {
    pub name: String,
    pub transform: Transform,
    pub content: ModelContent,
    pub children: Vec<ModelNode>,
}

/// Parsed model, independent of any scene graph so it can cross threads.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub name: String,
    pub materials: Vec<ModelMaterial>,
    pub roots: Vec<ModelNode>,
}

pub fn fetch_bytes(source: &ModelSource) -> Result<Vec<u8>, AssetError> {
    match source {
        ModelSource::Path(path) => std::fs::read(path).map_err(|source| AssetError::Read {
            path: path.display().to_string(),
            source,
        }),
        ModelSource::Url(url) => {
            log::info!("Fetching {}", url);
            let response = ureq::get(url).call().map_err(|err| AssetError::Fetch {
                url: url.clone(),
                message: err.to_string(),
            })?;
            let mut bytes = Vec::new();
            response
                .into_reader()
                .read_to_end(&mut bytes)
                .map_err(|err| AssetError::Fetch {
                    url: url.clone(),
                    message: err.to_string(),
                })?;
            Ok(bytes)
        }
    }
}

pub fn load_model(source: &ModelSource) -> Result<LoadedModel, AssetError> {
    let label = source.describe();
    let (document, buffers, _images) = match source {
        // External buffer URIs resolve relative to the file, so let gltf read from disk.
        ModelSource::Path(path) => gltf::import(path).map_err(|err| match err {
            gltf::Error::Io(io) => AssetError::Read {
                path: label.clone(),
                source: io,
            },
            other => AssetError::ParseGltf {
                path: label.clone(),
                source: other,
            },
        })?,
        ModelSource::Url(_) => {
            let bytes = fetch_bytes(source)?;
            gltf::import_slice(&bytes).map_err(|source| AssetError::ParseGltf {
                path: label.clone(),
                source,
            })?
        }
    };
    build_model(&document, &buffers, source.file_name(), &label)
}

pub fn parse_model(bytes: &[u8], name: &str) -> Result<LoadedModel, AssetError> {
    let (document, buffers, _images) =
        gltf::import_slice(bytes).map_err(|source| AssetError::ParseGltf {
            path: name.to_string(),
            source,
        })?;
    build_model(&document, &buffers, name.to_string(), name)
}

fn build_model(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    name: String,
    label: &str,
) -> Result<LoadedModel, AssetError> {
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| AssetError::NoScene {
            path: label.to_string(),
        })?;

    let materials = document.materials().map(|material| read_material(&material)).collect();
    let roots = scene
        .nodes()
        .map(|node| read_node(&node, buffers))
        .collect::<Result<Vec<_>, _>>()?;

    log::info!(
        "Parsed model '{}' ({} root nodes, {} materials)",
        name,
        roots.len(),
        document.materials().len()
    );
    Ok(LoadedModel {
        name,
        materials,
        roots,
    })
}

fn read_material(material: &gltf::Material<'_>) -> ModelMaterial {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, _a] = pbr.base_color_factor();
    ModelMaterial {
        name: material.name().unwrap_or("").to_string(),
        model: if material.unlit() {
            ShadingModel::Basic
        } else {
            ShadingModel::Standard
        },
        color: Vec3::new(r, g, b),
        metalness: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        emissive: Vec3::from_array(material.emissive_factor()),
    }
}

fn read_node(
    node: &gltf::Node<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<ModelNode, AssetError> {
    let (translation, rotation, scale) = node.transform().decomposed();
    let transform = Transform::from_trs(
        Vec3::from_array(translation),
        Quat::from_array(rotation),
        Vec3::from_array(scale),
    );
    let name = node.name().unwrap_or("").to_string();

    let content = if let Some(mesh) = node.mesh() {
        ModelContent::Mesh(read_primitives(&mesh, buffers)?)
    } else if let Some(light) = node.light() {
        ModelContent::Light(read_light(&light))
    } else {
        ModelContent::Empty
    };

    let children = node
        .children()
        .map(|child| read_node(&child, buffers))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ModelNode {
        name,
        transform,
        content,
        children,
    })
}

fn read_primitives(
    mesh: &gltf::Mesh<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<Vec<ModelPrimitive>, AssetError> {
    let mut primitives = Vec::new();
    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::debug!("Skipping non-triangle primitive in mesh {:?}", mesh.name());
            continue;
        }
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
        let positions: Vec<Vec3> = reader
            .read_positions()
            .ok_or_else(|| AssetError::MissingPositions {
                mesh: mesh.name().unwrap_or("").to_string(),
            })?
            .map(Vec3::from_array)
            .collect();
        let indices: Vec<u32> = reader
            .read_indices()
            .map(|indices| indices.into_u32().collect())
            .unwrap_or_else(|| (0..positions.len() as u32).collect());
        let normals: Option<Vec<Vec3>> = reader
            .read_normals()
            .map(|normals| normals.map(Vec3::from_array).collect());

        let mut data = MeshData {
            positions,
            normals: normals.unwrap_or_default(),
            indices,
        };
        if data.normals.len() != data.positions.len() {
            data.compute_normals();
        }
        primitives.push(ModelPrimitive {
            mesh: Arc::new(data),
            material: primitive.material().index(),
        });
    }
    Ok(primitives)
}

fn read_light(light: &gltf::khr_lights_punctual::Light<'_>) -> LightNode {
    use gltf::khr_lights_punctual::Kind;
    let distance = light.range().unwrap_or(0.0);
    let kind = match light.kind() {
        Kind::Directional => LightKind::Directional,
        Kind::Point => LightKind::Point {
            distance,
            decay: 2.0,
        },
        Kind::Spot {
            inner_cone_angle,
            outer_cone_angle,
        } => LightKind::Spot {
            distance,
            decay: 2.0,
            angle: outer_cone_angle,
            penumbra: if outer_cone_angle > 0.0 {
                (1.0 - inner_cone_angle / outer_cone_angle).clamp(0.0, 1.0)
            } else {
                0.0
            },
        },
    };
    LightNode::new(kind, Vec3::from_array(light.color()), light.intensity())
}

/// Where an instantiated model landed: its group node and the handles of the
/// materials it registered, in asset order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInstance {
    pub root: NodeId,
    pub materials: Vec<MaterialHandle>,
}

impl LoadedModel {
    /// Insert the model under a new group node named after it. Materials are
    /// registered fresh, in asset order, so an earlier model's materials are
    /// never reused.
    pub fn instantiate(
        &self,
        scene: &mut SceneGraph,
        materials: &mut MaterialRegistry,
        parent: Option<NodeId>,
    ) -> ModelInstance {
        let handles: Vec<MaterialHandle> = self
            .materials
            .iter()
            .map(|material| materials.insert(material.to_material()))
            .collect();
        let mut default_material = None;

        let root = scene.add(parent, self.name.clone(), NodeKind::Group);
        for node in &self.roots {
            insert_node(
                node,
                scene,
                materials,
                &handles,
                &mut default_material,
                root,
            );
        }
        ModelInstance {
            root,
            materials: handles,
        }
    }
}

fn insert_node(
    node: &ModelNode,
    scene: &mut SceneGraph,
    materials: &mut MaterialRegistry,
    handles: &[MaterialHandle],
    default_material: &mut Option<MaterialHandle>,
    parent: NodeId,
) {
    let mut resolve = |index: Option<usize>, materials: &mut MaterialRegistry| -> MaterialHandle {
        match index.and_then(|index| handles.get(index)) {
            Some(handle) => *handle,
            None => *default_material.get_or_insert_with(|| {
                materials.insert(Material::standard("Default", Vec3::ONE))
            }),
        }
    };

    let id = match &node.content {
        ModelContent::Mesh(primitives) if primitives.len() == 1 => {
            let material = resolve(primitives[0].material, materials);
            scene.add(
                Some(parent),
                node.name.clone(),
                NodeKind::Mesh(MeshNode {
                    mesh: Arc::clone(&primitives[0].mesh),
                    material,
                }),
            )
        }
        ModelContent::Mesh(primitives) => {
            // Multi-primitive meshes become a group of single-material meshes:
            // `Name`, `Name_1`, `Name_2`, ...
            let group = scene.add(Some(parent), node.name.clone(), NodeKind::Group);
            for (index, primitive) in primitives.iter().enumerate() {
                let material = resolve(primitive.material, materials);
                let name = if index == 0 {
                    node.name.clone()
                } else {
                    format!("{}_{}", node.name, index)
                };
                scene.add(
                    Some(group),
                    name,
                    NodeKind::Mesh(MeshNode {
                        mesh: Arc::clone(&primitive.mesh),
                        material,
                    }),
                );
            }
            group
        }
        ModelContent::Light(light) => {
            scene.add(Some(parent), node.name.clone(), NodeKind::Light(light.clone()))
        }
        ModelContent::Empty => scene.add(Some(parent), node.name.clone(), NodeKind::Group),
    };
    if let Some(inserted) = scene.get_mut(id) {
        inserted.transform = node.transform;
    }
    for child in &node.children {
        insert_node(child, scene, materials, handles, default_material, id);
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! In-memory GLB files for tests.

    use serde_json::json;

    pub struct FixtureMaterial {
        pub name: &'static str,
        pub color: [f32; 4],
        pub metallic: f32,
        pub roughness: f32,
        pub unlit: bool,
    }

    pub struct FixtureNode {
        pub name: &'static str,
        pub material: Option<usize>,
        pub translation: [f32; 3],
        /// Number of primitives sharing the quad geometry.
        pub primitives: usize,
    }

    impl FixtureNode {
        pub fn quad(name: &'static str, material: Option<usize>, translation: [f32; 3]) -> Self {
            Self {
                name,
                material,
                translation,
                primitives: 1,
            }
        }
    }

    fn quad_buffer() -> Vec<u8> {
        let positions: [[f32; 3]; 4] = [
            [-0.5, -0.5, 0.0],
            [0.5, -0.5, 0.0],
            [0.5, 0.5, 0.0],
            [-0.5, 0.5, 0.0],
        ];
        let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
        let mut bytes = Vec::new();
        for p in positions {
            for c in p {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        for i in indices {
            bytes.extend_from_slice(&i.to_le_bytes());
        }
        bytes
    }

    pub fn build_glb(nodes: &[FixtureNode], materials: &[FixtureMaterial]) -> Vec<u8> {
        let bin = quad_buffer();
        let meshes: Vec<serde_json::Value> = nodes
            .iter()
            .map(|node| {
                let mut primitive = json!({
                    "attributes": { "POSITION": 0 },
                    "indices": 1
                });
                if let Some(material) = node.material {
                    primitive["material"] = json!(material);
                }
                let primitives: Vec<serde_json::Value> =
                    (0..node.primitives.max(1)).map(|_| primitive.clone()).collect();
                json!({ "name": node.name, "primitives": primitives })
            })
            .collect();
        let gltf_nodes: Vec<serde_json::Value> = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                json!({ "name": node.name, "mesh": index, "translation": node.translation })
            })
            .collect();
        let gltf_materials: Vec<serde_json::Value> = materials
            .iter()
            .map(|material| {
                let mut value = json!({
                    "name": material.name,
                    "pbrMetallicRoughness": {
                        "baseColorFactor": material.color,
                        "metallicFactor": material.metallic,
                        "roughnessFactor": material.roughness
                    }
                });
                if material.unlit {
                    value["extensions"] = json!({ "KHR_materials_unlit": {} });
                }
                value
            })
            .collect();

        let scene_nodes: Vec<usize> = (0..nodes.len()).collect();
        let mut document = json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": scene_nodes }],
            "nodes": gltf_nodes,
            "meshes": meshes,
            "buffers": [{ "byteLength": bin.len() }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 48, "target": 34962 },
                { "buffer": 0, "byteOffset": 48, "byteLength": 12, "target": 34963 }
            ],
            "accessors": [
                {
                    "bufferView": 0, "componentType": 5126, "count": 4, "type": "VEC3",
                    "min": [-0.5, -0.5, 0.0], "max": [0.5, 0.5, 0.0]
                },
                { "bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR" }
            ]
        });
        if !gltf_materials.is_empty() {
            document["materials"] = json!(gltf_materials);
        }
        if materials.iter().any(|material| material.unlit) {
            document["extensionsUsed"] = json!(["KHR_materials_unlit"]);
        }

        let mut json_bytes = serde_json::to_vec(&document).unwrap();
        while json_bytes.len() % 4 != 0 {
            json_bytes.push(b' ');
        }
        let mut bin_bytes = bin;
        while bin_bytes.len() % 4 != 0 {
            bin_bytes.push(0);
        }

        let total = 12 + 8 + json_bytes.len() + 8 + bin_bytes.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json_bytes);
        glb.extend_from_slice(&(bin_bytes.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin_bytes);
        glb
    }

    /// Lamp layout with every contract mesh. Ships only part of the material
    /// set so fallback paths are exercised: no copper cap/screen, no white base.
    pub fn lamp_glb() -> Vec<u8> {
        let material = |name, color: [f32; 3], metallic, roughness, unlit| FixtureMaterial {
            name,
            color: [color[0], color[1], color[2], 1.0],
            metallic,
            roughness,
            unlit,
        };
        let materials = vec![
            material("Red", [0.6, 0.05, 0.05], 0.0, 0.5, false),
            material("Black", [0.02, 0.02, 0.02], 0.0, 0.4, false),
            material("Gold Cap", [1.0, 0.77, 0.34], 1.0, 0.3, false),
            material("Silver Cap", [0.9, 0.9, 0.92], 1.0, 0.25, false),
            material("Screen Gold", [1.0, 0.8, 0.4], 0.8, 0.35, false),
            material("Screen Silver", [0.85, 0.85, 0.9], 0.8, 0.35, false),
            material("Pattern Glow", [1.0, 1.0, 1.0], 0.0, 1.0, true),
        ];
        let nodes = vec![
            FixtureNode::quad("Base", Some(0), [0.0, -0.6, 0.0]),
            FixtureNode::quad("Rim", Some(2), [0.0, 0.6, 0.0]),
            FixtureNode::quad("Ring", Some(2), [0.0, 0.8, 0.0]),
            FixtureNode {
                name: "BaseRim",
                material: Some(2),
                translation: [0.0, -1.0, 0.0],
                primitives: 2,
            },
            FixtureNode::quad("Logo", Some(2), [0.0, -0.6, 0.05]),
            FixtureNode::quad("Screen_Main_(Gold)", Some(4), [0.0, 0.0, -0.1]),
            FixtureNode::quad("Triangle_Pattern", Some(6), [0.0, 0.0, 0.2]),
            FixtureNode::quad("Star_Pattern", Some(6), [0.0, 0.0, 0.2]),
            FixtureNode::quad("Arabic_Pattern", Some(6), [0.0, 0.0, 0.2]),
            FixtureNode::quad("Patterns", Some(6), [0.0, 0.0, 0.3]),
            FixtureNode::quad("Screen_Copper", None, [0.0, 0.0, -0.1]),
            FixtureNode::quad("Screen_Silver", Some(5), [0.0, 0.0, -0.1]),
        ];
        build_glb(&nodes, &materials)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{build_glb, lamp_glb, FixtureMaterial, FixtureNode};
    use super::*;

    #[test]
    fn parses_lamp_fixture() {
        let model = parse_model(&lamp_glb(), "lamp.glb").unwrap();
        assert_eq!(model.roots.len(), 12);
        assert_eq!(model.materials.len(), 7);
        let glow = model
            .materials
            .iter()
            .find(|material| material.name == "Pattern Glow")
            .unwrap();
        assert_eq!(glow.model, ShadingModel::Basic);
        let gold = model
            .materials
            .iter()
            .find(|material| material.name == "Gold Cap")
            .unwrap();
        assert_eq!(gold.model, ShadingModel::Standard);
        assert_eq!(gold.metalness, 1.0);
    }

    #[test]
    fn instantiate_splits_multi_primitive_meshes() {
        let model = parse_model(&lamp_glb(), "lamp.glb").unwrap();
        let mut scene = SceneGraph::new();
        let mut materials = MaterialRegistry::new();
        let instance = model.instantiate(&mut scene, &mut materials, None);

        assert_eq!(scene.get(instance.root).unwrap().name, "lamp.glb");
        assert_eq!(instance.materials.len(), model.materials.len());
        let base_rim = scene.find_by_name("BaseRim_1").expect("second primitive");
        assert!(scene.get(base_rim).unwrap().as_mesh().is_some());
        let group = scene.get(base_rim).unwrap().parent().unwrap();
        assert_eq!(scene.get(group).unwrap().name, "BaseRim");
        assert!(matches!(scene.get(group).unwrap().kind, NodeKind::Group));
    }

    #[test]
    fn primitive_without_material_gets_default() {
        let model = parse_model(&lamp_glb(), "lamp.glb").unwrap();
        let mut scene = SceneGraph::new();
        let mut materials = MaterialRegistry::new();
        model.instantiate(&mut scene, &mut materials, None);
        let node = scene.find_by_name("Screen_Copper").unwrap();
        let handle = scene.get(node).unwrap().as_mesh().unwrap().material;
        assert_eq!(materials.get(handle).unwrap().name, "Default");
    }

    #[test]
    fn normals_are_generated_when_missing() {
        let model = parse_model(&lamp_glb(), "lamp.glb").unwrap();
        let ModelContent::Mesh(primitives) = &model.roots[0].content else {
            panic!("expected mesh");
        };
        let mesh = &primitives[0].mesh;
        assert_eq!(mesh.normals.len(), mesh.positions.len());
        assert!(mesh.normals.iter().all(|n| (*n - Vec3::Z).length() < 1e-5));
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn translations_survive_loading() {
        let bytes = build_glb(
            &[FixtureNode::quad("Moved", Some(0), [1.0, 2.0, 3.0])],
            &[FixtureMaterial {
                name: "Plain",
                color: [0.5, 0.5, 0.5, 1.0],
                metallic: 0.0,
                roughness: 1.0,
                unlit: false,
            }],
        );
        let model = parse_model(&bytes, "moved.glb").unwrap();
        assert_eq!(model.roots[0].transform.translation, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let err = parse_model(b"not a model", "broken.glb").unwrap_err();
        assert!(matches!(err, AssetError::ParseGltf { .. }));
    }

    #[test]
    fn missing_file_reports_read_error() {
        let source = ModelSource::Path(std::env::temp_dir().join("lampviz_missing_model.glb"));
        assert!(load_model(&source).is_err());
    }

    #[test]
    fn source_parsing_and_extensions() {
        let url = ModelSource::parse("https://cdn.example.com/models/MajestyGLB.glb");
        assert!(matches!(url, ModelSource::Url(_)));
        assert_eq!(url.file_name(), "MajestyGLB.glb");
        assert_eq!(url.extension().as_deref(), Some("glb"));

        let path = ModelSource::parse("assets/Lamp.GLTF");
        assert!(matches!(path, ModelSource::Path(_)));
        assert_eq!(path.extension().as_deref(), Some("gltf"));
    }
}
