use bitflags::bitflags;
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use helio_gpu::TextureHandle;

use crate::aabb::Aabb;
use crate::entity::Entity;

pub const MAX_SHADOW_CASCADES: usize = 4;

/// Name component every entity carries. Names are also indexed in the
/// library's name -> entity map.
#[derive(Clone, Debug)]
pub struct Tag {
    pub name: String,
}

impl Default for Tag {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
        }
    }
}

/// Visibility layer mask plus the mask children inherit.
#[derive(Clone, Copy, Debug)]
pub struct Layer {
    pub mask: u32,
    pub propagation_mask: u32,
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            mask: u32::MAX,
            propagation_mask: 0,
        }
    }
}

bitflags! {
    pub struct TransformFlags: u32 {
        const DIRTY = 1 << 0;
    }
}

#[derive(Clone, Debug)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Cached world matrix, valid once the transform update ran.
    pub world: Mat4,
    pub flags: TransformFlags,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            world: Mat4::IDENTITY,
            flags: TransformFlags::DIRTY,
        }
    }
}

impl Transform {
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Hierarchy {
    pub parent: Entity,
}

bitflags! {
    #[derive(Default)]
    pub struct ScriptFlags: u32 {
        const PLAYING = 1 << 0;
        const PLAY_ONCE = 1 << 1;
        const RELOADABLE = 1 << 2;
    }
}

pub type ScriptRunFn = fn(&mut crate::ComponentLibrary, Entity);

/// Resolved script interface, published by a script extension.
#[derive(Clone, Copy)]
pub struct ScriptApi {
    pub run: ScriptRunFn,
}

impl std::fmt::Debug for ScriptApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptApi").finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Script {
    pub file: String,
    pub flags: ScriptFlags,
    pub api: Option<ScriptApi>,
}

bitflags! {
    pub struct ObjectFlags: u32 {
        const RENDERABLE = 1 << 0;
        const CAST_SHADOW = 1 << 1;
        const DYNAMIC = 1 << 2;
        const FOREGROUND = 1 << 3;
        /// Render in the forward pass regardless of material blend mode.
        const FORWARD = 1 << 4;
    }
}

/// A drawable: pairs a mesh entity with a transform entity and carries the
/// world-space bounds the culling and BVH passes consume.
#[derive(Clone, Debug)]
pub struct Object {
    pub mesh: Entity,
    pub transform: Entity,
    pub world_aabb: Aabb,
    pub flags: ObjectFlags,
}

impl Default for Object {
    fn default() -> Self {
        Self {
            mesh: Entity::NULL,
            transform: Entity::NULL,
            world_aabb: Aabb::EMPTY,
            flags: ObjectFlags::RENDERABLE | ObjectFlags::CAST_SHADOW | ObjectFlags::DYNAMIC,
        }
    }
}

bitflags! {
    /// Which per-vertex streams a mesh carries. The popcount of the
    /// attribute flags (everything but POSITION) is the packed storage
    /// stride in vec4 slots.
    #[derive(Default)]
    pub struct VertexStreamMask: u64 {
        const POSITION = 1 << 0;
        const NORMAL = 1 << 1;
        const TANGENT = 1 << 2;
        const TEXCOORD_0 = 1 << 3;
        const TEXCOORD_1 = 1 << 4;
        const TEXCOORD_2 = 1 << 5;
        const TEXCOORD_3 = 1 << 6;
        const COLOR_0 = 1 << 7;
        const COLOR_1 = 1 << 8;
        const JOINTS_0 = 1 << 9;
        const JOINTS_1 = 1 << 10;
        const WEIGHTS_0 = 1 << 11;
        const WEIGHTS_1 = 1 << 12;
    }
}

#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub colors: [Vec<Vec4>; 2],
    pub uvs: [Vec<Vec2>; 8],
    pub joints: [Vec<Vec4>; 2],
    pub weights: [Vec<Vec4>; 2],
    pub indices: Vec<u32>,
    pub aabb: Aabb,
    pub material: Entity,
    pub skin: Entity,
    pub vertex_stream_mask: VertexStreamMask,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn compute_aabb(&mut self) {
        self.aabb = Aabb::EMPTY;
        for position in &self.positions {
            self.aabb.merge_point(*position);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum BlendMode {
    Opaque,
    Alpha,
    Premultiplied,
    Additive,
    Multiply,
    ClipMask,
}

bitflags! {
    pub struct MaterialFlags: u32 {
        const CAST_SHADOW = 1 << 0;
        const RECEIVE_SHADOW = 1 << 1;
        const DOUBLE_SIDED = 1 << 2;
        const OUTLINE = 1 << 3;
    }
}

/// Texture slot order. Matches the five `uv_set`/`texture` index pairs in
/// the GPU material layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum TextureSlot {
    BaseColor = 0,
    Normal = 1,
    Emissive = 2,
    MetalRoughness = 3,
    Occlusion = 4,
}

pub const TEXTURE_SLOT_COUNT: usize = 5;

#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialTextureMap {
    pub texture: Option<TextureHandle>,
    pub uv_set: u32,
}

#[derive(Clone, Debug)]
pub struct Material {
    pub blend_mode: BlendMode,
    pub flags: MaterialFlags,
    pub base_color: Vec4,
    pub emissive: Vec3,
    pub emissive_strength: f32,
    pub metallic: f32,
    pub roughness: f32,
    pub normal_strength: f32,
    pub occlusion_strength: f32,
    pub alpha_cutoff: f32,
    pub texture_maps: [MaterialTextureMap; TEXTURE_SLOT_COUNT],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::Opaque,
            flags: MaterialFlags::CAST_SHADOW | MaterialFlags::RECEIVE_SHADOW,
            base_color: Vec4::ONE,
            emissive: Vec3::ZERO,
            emissive_strength: 1.0,
            metallic: 1.0,
            roughness: 1.0,
            normal_strength: 1.0,
            occlusion_strength: 1.0,
            alpha_cutoff: 0.5,
            texture_maps: [MaterialTextureMap::default(); TEXTURE_SLOT_COUNT],
        }
    }
}

impl Material {
    pub fn map(&self, slot: TextureSlot) -> &MaterialTextureMap {
        &self.texture_maps[slot as usize]
    }

    pub fn map_mut(&mut self, slot: TextureSlot) -> &mut MaterialTextureMap {
        &mut self.texture_maps[slot as usize]
    }
}

/// Skinning data. `texture_data` holds `(joint_matrix, normal_matrix)` pairs
/// laid out for upload into the joint texture; the skin update system fills
/// it every frame.
#[derive(Clone, Debug, Default)]
pub struct Skin {
    pub joints: Vec<Entity>,
    pub inverse_bind_matrices: Vec<Mat4>,
    pub texture_data: Vec<Mat4>,
    pub aabb: Aabb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

bitflags! {
    #[derive(Default)]
    pub struct LightFlags: u32 {
        const CAST_SHADOW = 1 << 0;
        const VISUALIZER = 1 << 1;
    }
}

#[derive(Clone, Debug)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub radius: f32,
    pub position: Vec3,
    pub direction: Vec3,
    pub inner_cone_angle: f32,
    pub outer_cone_angle: f32,
    pub cascade_count: u32,
    pub cascade_splits: [f32; MAX_SHADOW_CASCADES],
    pub shadow_resolution: u32,
    pub flags: LightFlags,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightKind::Directional,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 5.0,
            radius: 0.025,
            position: Vec3::ZERO,
            direction: Vec3::new(0.0, -1.0, 0.0),
            inner_cone_angle: 0.0,
            outer_cone_angle: std::f32::consts::FRAC_PI_8,
            cascade_count: 0,
            cascade_splits: [0.0; MAX_SHADOW_CASCADES],
            shadow_resolution: 1024,
            flags: LightFlags::empty(),
        }
    }
}

bitflags! {
    pub struct ProbeFlags: u32 {
        /// Capture once, then clear.
        const DIRTY = 1 << 0;
        /// Re-capture every `interval` frames.
        const REALTIME = 1 << 1;
        const PARALLAX_CORRECTION = 1 << 2;
        const INCLUDE_SKY = 1 << 3;
    }
}

#[derive(Clone, Debug)]
pub struct EnvironmentProbe {
    pub range: f32,
    pub resolution: u32,
    pub samples: u32,
    pub interval: u32,
    pub flags: ProbeFlags,
}

impl Default for EnvironmentProbe {
    fn default() -> Self {
        Self {
            range: 10.0,
            resolution: 128,
            samples: 128,
            interval: 1,
            flags: ProbeFlags::DIRTY,
        }
    }
}

/// Named bone slots a humanoid rig resolves to entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum HumanoidBone {
    Hips = 0,
    Spine,
    Chest,
    Neck,
    Head,
    LeftShoulder,
    LeftUpperArm,
    LeftLowerArm,
    LeftHand,
    RightShoulder,
    RightUpperArm,
    RightLowerArm,
    RightHand,
    LeftUpperLeg,
    LeftLowerLeg,
    LeftFoot,
    LeftToes,
    RightUpperLeg,
    RightLowerLeg,
    RightFoot,
    RightToes,
}

pub const HUMANOID_BONE_COUNT: usize = 21;

#[derive(Clone, Debug)]
pub struct Humanoid {
    pub bones: [Entity; HUMANOID_BONE_COUNT],
}

impl Default for Humanoid {
    fn default() -> Self {
        Self {
            bones: [Entity::NULL; HUMANOID_BONE_COUNT],
        }
    }
}

impl Humanoid {
    pub fn bone(&self, bone: HumanoidBone) -> Entity {
        self.bones[bone as usize]
    }

    pub fn set_bone(&mut self, bone: HumanoidBone, entity: Entity) {
        self.bones[bone as usize] = entity;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum AnimationPath {
    Translation,
    Rotation,
    Scale,
    Weights,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum AnimationInterpolation {
    Linear,
    Step,
    CubicSpline,
}

#[derive(Clone, Copy, Debug)]
pub struct AnimationChannel {
    pub target: Entity,
    pub path: AnimationPath,
    pub sampler: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct AnimationSampler {
    /// Entity carrying the [`AnimationData`] key streams.
    pub data: Entity,
    pub interpolation: AnimationInterpolation,
}

bitflags! {
    #[derive(Default)]
    pub struct AnimationFlags: u32 {
        const PLAYING = 1 << 0;
        const LOOPED = 1 << 1;
    }
}

#[derive(Clone, Debug, Default)]
pub struct Animation {
    pub channels: Vec<AnimationChannel>,
    pub samplers: Vec<AnimationSampler>,
    pub start: f32,
    pub end: f32,
    pub timer: f32,
    pub speed: f32,
    pub flags: AnimationFlags,
}

#[derive(Clone, Debug, Default)]
pub struct AnimationData {
    pub key_times: Vec<f32>,
    pub key_values: Vec<f32>,
}
