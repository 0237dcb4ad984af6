//! Staging of parsed model documents into the ECS. Parsing itself (glTF,
//! STL) lives outside the core; this crate takes the parser's output as a
//! plain data model and produces the entity graph the renderer consumes:
//! materials, meshes with stream masks and bounds, node transforms with
//! hierarchy, skins, objects, and animation clips.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use helio_ecs::{
    AnimationChannel, AnimationData, AnimationFlags, AnimationInterpolation, AnimationPath,
    AnimationSampler, BlendMode, ComponentLibrary, Entity, MaterialFlags, VertexStreamMask,
    TEXTURE_SLOT_COUNT,
};
use helio_gpu::TextureHandle;

#[derive(Clone, Debug, Default)]
pub struct TextureSource {
    pub texture: Option<TextureHandle>,
    pub uv_set: u32,
}

#[derive(Clone, Debug)]
pub struct MaterialSource {
    pub name: String,
    pub base_color: Vec4,
    pub emissive: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub alpha_cutoff: f32,
    pub blend_mode: BlendMode,
    pub double_sided: bool,
    /// Indexed by [`TextureSlot`].
    pub textures: [TextureSource; TEXTURE_SLOT_COUNT],
}

impl Default for MaterialSource {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: Vec4::ONE,
            emissive: Vec3::ZERO,
            metallic: 1.0,
            roughness: 1.0,
            alpha_cutoff: 0.5,
            blend_mode: BlendMode::Opaque,
            double_sided: false,
            textures: Default::default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MeshSource {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub colors: [Vec<Vec4>; 2],
    pub uvs: [Vec<Vec2>; 8],
    pub joints: [Vec<Vec4>; 2],
    pub weights: [Vec<Vec4>; 2],
    pub indices: Vec<u32>,
    pub material: Option<usize>,
}

impl MeshSource {
    /// Builds a mesh from a raw triangle soup, the shape an STL parser
    /// produces. Normals are taken per-face when not supplied.
    pub fn from_triangles(name: impl Into<String>, positions: Vec<Vec3>) -> Self {
        let mut normals = Vec::with_capacity(positions.len());
        for triangle in positions.chunks_exact(3) {
            let normal = (triangle[1] - triangle[0])
                .cross(triangle[2] - triangle[0])
                .normalize_or_zero();
            normals.extend([normal; 3]);
        }
        let indices = (0..positions.len() as u32).collect();
        Self {
            name: name.into(),
            positions,
            normals,
            indices,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeSource {
    pub name: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    pub children: Vec<usize>,
}

impl Default for NodeSource {
    fn default() -> Self {
        Self {
            name: String::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            mesh: None,
            skin: None,
            children: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SkinSource {
    pub name: String,
    /// Node indices.
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

#[derive(Clone, Debug)]
pub struct SamplerSource {
    pub key_times: Vec<f32>,
    pub key_values: Vec<f32>,
    pub interpolation: AnimationInterpolation,
}

#[derive(Clone, Debug)]
pub struct ChannelSource {
    pub node: usize,
    pub path: AnimationPath,
    pub sampler: usize,
}

#[derive(Clone, Debug, Default)]
pub struct AnimationSource {
    pub name: String,
    pub channels: Vec<ChannelSource>,
    pub samplers: Vec<SamplerSource>,
}

/// A parsed model, decoupled from any file format. glTF maps onto it
/// directly; STL becomes one node with one triangle-soup mesh.
#[derive(Clone, Debug, Default)]
pub struct ModelDocument {
    pub name: String,
    pub materials: Vec<MaterialSource>,
    pub meshes: Vec<MeshSource>,
    pub skins: Vec<SkinSource>,
    pub nodes: Vec<NodeSource>,
    /// Indices of root nodes.
    pub roots: Vec<usize>,
    pub animations: Vec<AnimationSource>,
}

/// Entities produced by [`load_model`].
#[derive(Clone, Debug, Default)]
pub struct LoadedModel {
    pub root: Entity,
    pub materials: Vec<Entity>,
    pub meshes: Vec<Entity>,
    pub nodes: Vec<Entity>,
    /// Drawable object entities, one per node that referenced a mesh.
    pub objects: Vec<Entity>,
    pub animations: Vec<Entity>,
}

/// Instantiates a parsed document into the library. The returned root
/// entity parents every root node so the whole model moves as one.
pub fn load_model(library: &mut ComponentLibrary, document: &ModelDocument) -> LoadedModel {
    let keys = *library.keys();
    let mut loaded = LoadedModel {
        root: library.create_transform(Some(&document.name)),
        ..Default::default()
    };

    for source in &document.materials {
        let entity = library.create_material(Some(&source.name));
        if let Some(material) = library.get_component_mut(keys.material, entity) {
            material.base_color = source.base_color;
            material.emissive = source.emissive;
            material.metallic = source.metallic;
            material.roughness = source.roughness;
            material.alpha_cutoff = source.alpha_cutoff;
            material.blend_mode = source.blend_mode;
            if source.double_sided {
                material.flags |= MaterialFlags::DOUBLE_SIDED;
            }
            for slot in 0..TEXTURE_SLOT_COUNT {
                material.texture_maps[slot].texture = source.textures[slot].texture;
                material.texture_maps[slot].uv_set = source.textures[slot].uv_set;
            }
        }
        loaded.materials.push(entity);
    }

    for source in &document.meshes {
        let entity = library.create_mesh(Some(&source.name));
        if let Some(mesh) = library.get_component_mut(keys.mesh, entity) {
            mesh.positions = source.positions.clone();
            mesh.normals = source.normals.clone();
            mesh.tangents = source.tangents.clone();
            mesh.colors = source.colors.clone();
            mesh.uvs = source.uvs.clone();
            mesh.joints = source.joints.clone();
            mesh.weights = source.weights.clone();
            mesh.indices = source.indices.clone();
            mesh.vertex_stream_mask = stream_mask(source);
            mesh.compute_aabb();
        }
        if let Some(material_index) = source.material {
            let material = loaded.materials.get(material_index).copied();
            if let (Some(material), Some(mesh)) =
                (material, library.get_component_mut(keys.mesh, entity))
            {
                mesh.material = material;
            }
        }
        loaded.meshes.push(entity);
    }

    // nodes first, so hierarchy and skin joints can reference forward
    for source in &document.nodes {
        let entity = library.create_transform(Some(&source.name));
        if let Some(transform) = library.get_component_mut(keys.transform, entity) {
            transform.translation = source.translation;
            transform.rotation = source.rotation;
            transform.scale = source.scale;
        }
        loaded.nodes.push(entity);
    }
    for (index, source) in document.nodes.iter().enumerate() {
        for child in &source.children {
            if let Some(child_entity) = loaded.nodes.get(*child).copied() {
                library.attach_component(child_entity, loaded.nodes[index]);
            }
        }
    }
    for root in &document.roots {
        if let Some(root_entity) = loaded.nodes.get(*root).copied() {
            library.attach_component(root_entity, loaded.root);
        }
    }

    let mut skin_entities = Vec::with_capacity(document.skins.len());
    for source in &document.skins {
        let entity = library.create_entity(Some(&source.name));
        if let Some(skin) = library.add_component(keys.skin, entity) {
            skin.joints = source
                .joints
                .iter()
                .filter_map(|node| loaded.nodes.get(*node).copied())
                .collect();
            skin.inverse_bind_matrices = source.inverse_bind_matrices.clone();
        }
        skin_entities.push(entity);
    }

    for (index, source) in document.nodes.iter().enumerate() {
        let Some(mesh_index) = source.mesh else {
            continue;
        };
        let Some(mesh_entity) = loaded.meshes.get(mesh_index).copied() else {
            tracing::warn!(
                "model '{}': node '{}' references missing mesh {mesh_index}",
                document.name,
                source.name
            );
            continue;
        };
        if let Some(skin_index) = source.skin {
            if let Some(skin_entity) = skin_entities.get(skin_index).copied() {
                if let Some(mesh) = library.get_component_mut(keys.mesh, mesh_entity) {
                    mesh.skin = skin_entity;
                }
            }
        }
        let node_entity = loaded.nodes[index];
        if let Some(object) = library.add_component(keys.object, node_entity) {
            object.mesh = mesh_entity;
            object.transform = node_entity;
        }
        loaded.objects.push(node_entity);
    }

    for source in &document.animations {
        let entity = library.create_entity(Some(&source.name));
        let mut sampler_entities = Vec::with_capacity(source.samplers.len());
        for (i, sampler) in source.samplers.iter().enumerate() {
            let data_entity =
                library.create_entity(Some(&format!("{}.sampler{i}", source.name)));
            if let Some(data) = library.add_component(keys.animation_data, data_entity) {
                data.key_times = sampler.key_times.clone();
                data.key_values = sampler.key_values.clone();
            }
            sampler_entities.push((data_entity, sampler.interpolation));
        }
        let mut end = 0.0f32;
        for sampler in &source.samplers {
            if let Some(last) = sampler.key_times.last() {
                end = end.max(*last);
            }
        }
        if let Some(animation) = library.add_component(keys.animation, entity) {
            animation.samplers = sampler_entities
                .iter()
                .map(|(data, interpolation)| AnimationSampler {
                    data: *data,
                    interpolation: *interpolation,
                })
                .collect();
            animation.channels = source
                .channels
                .iter()
                .filter_map(|channel| {
                    Some(AnimationChannel {
                        target: loaded.nodes.get(channel.node).copied()?,
                        path: channel.path,
                        sampler: channel.sampler as u32,
                    })
                })
                .collect();
            animation.end = end;
            animation.speed = 1.0;
            animation.flags = AnimationFlags::empty();
        }
        loaded.animations.push(entity);
    }

    tracing::debug!(
        "loaded model '{}': {} nodes, {} meshes, {} materials, {} objects",
        document.name,
        loaded.nodes.len(),
        loaded.meshes.len(),
        loaded.materials.len(),
        loaded.objects.len()
    );
    loaded
}

fn stream_mask(source: &MeshSource) -> VertexStreamMask {
    let mut mask = VertexStreamMask::empty();
    if !source.positions.is_empty() {
        mask |= VertexStreamMask::POSITION;
    }
    if !source.normals.is_empty() {
        mask |= VertexStreamMask::NORMAL;
    }
    if !source.tangents.is_empty() {
        mask |= VertexStreamMask::TANGENT;
    }
    // uv sets pack in pairs, so presence is tracked per even set
    const UV_FLAGS: [VertexStreamMask; 4] = [
        VertexStreamMask::TEXCOORD_0,
        VertexStreamMask::TEXCOORD_1,
        VertexStreamMask::TEXCOORD_2,
        VertexStreamMask::TEXCOORD_3,
    ];
    for pair in 0..4 {
        if !source.uvs[pair * 2].is_empty() {
            mask |= UV_FLAGS[pair];
        }
    }
    if !source.colors[0].is_empty() {
        mask |= VertexStreamMask::COLOR_0;
    }
    if !source.colors[1].is_empty() {
        mask |= VertexStreamMask::COLOR_1;
    }
    if !source.joints[0].is_empty() {
        mask |= VertexStreamMask::JOINTS_0;
    }
    if !source.joints[1].is_empty() {
        mask |= VertexStreamMask::JOINTS_1;
    }
    if !source.weights[0].is_empty() {
        mask |= VertexStreamMask::WEIGHTS_0;
    }
    if !source.weights[1].is_empty() {
        mask |= VertexStreamMask::WEIGHTS_1;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;
    use helio_ecs::EcsContext;

    fn library() -> ComponentLibrary {
        let mut ctx = EcsContext::new();
        ctx.finalize();
        match ctx.create_library() {
            Ok(lib) => lib,
            Err(e) => panic!("{e}"),
        }
    }

    fn quad_mesh(material: Option<usize>) -> MeshSource {
        MeshSource {
            name: "quad".into(),
            positions: vec![
                vec3(-1.0, -1.0, 0.0),
                vec3(1.0, -1.0, 0.0),
                vec3(1.0, 1.0, 0.0),
                vec3(-1.0, 1.0, 0.0),
            ],
            normals: vec![vec3(0.0, 0.0, 1.0); 4],
            uvs: {
                let mut uvs: [Vec<Vec2>; 8] = Default::default();
                uvs[0] = vec![Vec2::ZERO; 4];
                uvs
            },
            indices: vec![0, 1, 2, 0, 2, 3],
            material,
            ..Default::default()
        }
    }

    #[test]
    fn document_instantiates_nodes_meshes_and_objects() {
        let mut lib = library();
        let document = ModelDocument {
            name: "scene".into(),
            materials: vec![MaterialSource {
                name: "red".into(),
                base_color: Vec4::new(1.0, 0.0, 0.0, 1.0),
                ..Default::default()
            }],
            meshes: vec![quad_mesh(Some(0))],
            nodes: vec![
                NodeSource {
                    name: "parent".into(),
                    children: vec![1],
                    ..Default::default()
                },
                NodeSource {
                    name: "drawable".into(),
                    mesh: Some(0),
                    translation: vec3(0.0, 2.0, 0.0),
                    ..Default::default()
                },
            ],
            roots: vec![0],
            ..Default::default()
        };

        let loaded = load_model(&mut lib, &document);
        let keys = *lib.keys();

        assert_eq!(loaded.objects.len(), 1);
        let object = lib
            .get_component(keys.object, loaded.objects[0])
            .expect("object attached");
        assert_eq!(object.mesh, loaded.meshes[0]);
        assert_eq!(object.transform, loaded.objects[0]);

        let mesh = lib.get_component(keys.mesh, loaded.meshes[0]).expect("mesh");
        assert_eq!(mesh.material, loaded.materials[0]);
        assert!(mesh
            .vertex_stream_mask
            .contains(VertexStreamMask::POSITION | VertexStreamMask::NORMAL));
        assert!(mesh.vertex_stream_mask.contains(VertexStreamMask::TEXCOORD_0));
        assert_eq!(mesh.aabb.min, vec3(-1.0, -1.0, 0.0));

        // hierarchy: drawable under parent under the model root
        let hierarchy = lib
            .get_component(keys.hierarchy, loaded.nodes[1])
            .expect("hierarchy");
        assert_eq!(hierarchy.parent, loaded.nodes[0]);
        let parent_hierarchy = lib
            .get_component(keys.hierarchy, loaded.nodes[0])
            .expect("hierarchy");
        assert_eq!(parent_hierarchy.parent, loaded.root);
    }

    #[test]
    fn triangle_soup_gets_face_normals() {
        let mesh = MeshSource::from_triangles(
            "tri",
            vec![vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)],
        );
        assert_eq!(mesh.normals.len(), 3);
        assert_eq!(mesh.normals[0], vec3(0.0, 0.0, 1.0));
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn skinned_node_links_mesh_to_skin() {
        let mut lib = library();
        let mut mesh = quad_mesh(None);
        mesh.joints[0] = vec![Vec4::ZERO; 4];
        mesh.weights[0] = vec![Vec4::X; 4];
        let document = ModelDocument {
            name: "rig".into(),
            meshes: vec![mesh],
            skins: vec![SkinSource {
                name: "skin".into(),
                joints: vec![1, 2],
                inverse_bind_matrices: vec![Mat4::IDENTITY; 2],
            }],
            nodes: vec![
                NodeSource {
                    name: "body".into(),
                    mesh: Some(0),
                    skin: Some(0),
                    ..Default::default()
                },
                NodeSource {
                    name: "bone0".into(),
                    ..Default::default()
                },
                NodeSource {
                    name: "bone1".into(),
                    ..Default::default()
                },
            ],
            roots: vec![0],
            ..Default::default()
        };

        let loaded = load_model(&mut lib, &document);
        let keys = *lib.keys();
        let mesh = lib.get_component(keys.mesh, loaded.meshes[0]).expect("mesh");
        assert!(!mesh.skin.is_null());
        let skin = lib.get_component(keys.skin, mesh.skin).expect("skin");
        assert_eq!(skin.joints, vec![loaded.nodes[1], loaded.nodes[2]]);
        assert!(mesh
            .vertex_stream_mask
            .contains(VertexStreamMask::JOINTS_0 | VertexStreamMask::WEIGHTS_0));
    }
}
