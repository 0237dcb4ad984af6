//! Retained scene state: staged drawables, the packed geometry buffers,
//! the material and bindless tables, lights and their shadow rects, probe
//! slots, the BVH, and the views rendering the scene.

use std::sync::Arc;

use glam::Vec4;
use helio_ecs::{
    Aabb, BlendMode, ComponentLibrary, Entity, LightFlags, LightKind, MaterialFlags, ObjectFlags,
};
use helio_gpu::{
    BindGroupDesc, BindGroupHandle, BindGroupLayoutDesc, BindGroupUpdate, BufferBinding,
    BufferBindingKind, BufferDesc, BufferHandle, BufferMemory, BufferUsage, BufferWrite, Device,
    Format, ShaderStages, ShaderVariantCache, TextureBinding, TextureBindingKind, TextureDesc,
    TextureHandle, TextureUsage,
};

use crate::bindless::{BindlessTables, MaterialTable, BINDLESS_CUBE_BINDING, BINDLESS_TEXTURE_BINDING};
use crate::bvh::Bvh;
use crate::gpu_types::{gpu_mat4, GpuLight, GpuMat4, GpuOmniShadowData};
use crate::probes::ProbeSlot;
use crate::shadow_atlas::PackedRect;
use crate::skinning::SkinData;
use crate::staging::{append_mesh_geometry, append_skin_source};
use crate::view::View;
use crate::RendererError;
use helio_gpu::RenderPassHandle;

/// Scene bind group (group 0) buffer slots.
pub const SCENE_VERTEX_DATA_SLOT: u32 = 0;
pub const SCENE_MATERIAL_SLOT: u32 = 1;
pub const SCENE_TRANSFORM_SLOT: u32 = 2;
pub const SCENE_LIGHT_SLOT: u32 = 3;

#[derive(Clone, Debug)]
pub struct SceneDesc {
    pub shadow_atlas_resolution: u32,
}

impl Default for SceneDesc {
    fn default() -> Self {
        Self {
            shadow_atlas_resolution: 8192,
        }
    }
}

/// One retained drawable. Instances of the same mesh coalesce into a
/// single drawable with `instance_count > 1`.
#[derive(Clone, Copy, Debug)]
pub struct Drawable {
    pub entity: Entity,
    pub mesh: Entity,
    pub index_offset: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub data_offset: u32,
    pub material_slot: u32,
    /// First instance's slot in the transform buffer.
    pub transform_index: u32,
    pub instance_count: u32,
    /// Index into the scene's skin table, or -1.
    pub skin_index: i32,
    /// Forward (translucent) rather than deferred.
    pub forward: bool,
    pub cast_shadow: bool,
    pub double_sided: bool,
}

pub struct Scene {
    pub library: ComponentLibrary,
    device: Arc<dyn Device>,
    desc: SceneDesc,

    staged: Vec<Entity>,
    drawables: Vec<Drawable>,

    // CPU geometry, uploaded at finalize
    vertex_positions: Vec<Vec4>,
    vertex_data: Vec<Vec4>,
    indices: Vec<u32>,
    skin_vertex_data: Vec<Vec4>,
    transforms: Vec<GpuMat4>,
    drawable_aabbs: Vec<Aabb>,

    pub(crate) materials: MaterialTable,
    pub(crate) bindless: BindlessTables,
    global_bind_group: BindGroupHandle,

    // GPU buffers
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    data_buffer: BufferHandle,
    skin_buffer: BufferHandle,
    material_buffer: BufferHandle,
    transform_buffers: Vec<BufferHandle>,
    light_buffers: Vec<BufferHandle>,
    point_shadow_buffers: Vec<BufferHandle>,

    pub(crate) lights_gpu: Vec<GpuLight>,
    pub(crate) light_entities: Vec<Entity>,
    pub(crate) shadow_rects: Vec<PackedRect>,
    shadow_atlas_texture: TextureHandle,
    shadow_atlas_slot: i32,
    pub(crate) point_shadow_data: Vec<GpuOmniShadowData>,

    pub(crate) skins: Vec<SkinData>,
    pub(crate) skin_joint_groups: Vec<Vec<BindGroupHandle>>,
    pub(crate) skin_io_bind_group: BindGroupHandle,
    pub(crate) shadow_pass: RenderPassHandle,
    pub(crate) skybox_cube: Option<TextureHandle>,
    pub(crate) probes: Vec<ProbeSlot>,
    pub views: Vec<View>,
    pub(crate) bvh: Bvh,

    finalized: bool,
}

impl Scene {
    pub fn new(
        device: Arc<dyn Device>,
        library: ComponentLibrary,
        desc: SceneDesc,
    ) -> Result<Self, RendererError> {
        let limits = device.limits();
        let layout = device.create_bind_group_layout(&BindGroupLayoutDesc {
            buffers: vec![
                BufferBinding {
                    slot: SCENE_VERTEX_DATA_SLOT,
                    kind: BufferBindingKind::Storage,
                    stages: ShaderStages::ALL,
                },
                BufferBinding {
                    slot: SCENE_MATERIAL_SLOT,
                    kind: BufferBindingKind::Storage,
                    stages: ShaderStages::ALL,
                },
                BufferBinding {
                    slot: SCENE_TRANSFORM_SLOT,
                    kind: BufferBindingKind::Storage,
                    stages: ShaderStages::VERTEX | ShaderStages::COMPUTE,
                },
                BufferBinding {
                    slot: SCENE_LIGHT_SLOT,
                    kind: BufferBindingKind::Storage,
                    stages: ShaderStages::FRAGMENT,
                },
            ],
            textures: vec![
                TextureBinding {
                    slot: BINDLESS_TEXTURE_BINDING,
                    kind: TextureBindingKind::Sampled,
                    count: limits.max_bindless_textures,
                    stages: ShaderStages::ALL,
                },
                TextureBinding {
                    slot: BINDLESS_CUBE_BINDING,
                    kind: TextureBindingKind::Sampled,
                    count: limits.max_bindless_cube_textures,
                    stages: ShaderStages::ALL,
                },
            ],
            samplers: Vec::new(),
            label: Some("Scene.global_layout"),
        })?;
        let global_bind_group = device.create_bind_group(&BindGroupDesc {
            layout,
            label: Some("Scene.global_bind_group"),
        })?;
        let bindless = BindlessTables::new(
            limits.max_bindless_textures,
            limits.max_bindless_cube_textures,
            global_bind_group,
        );

        Ok(Self {
            library,
            device,
            desc,
            staged: Vec::new(),
            drawables: Vec::new(),
            vertex_positions: Vec::new(),
            vertex_data: Vec::new(),
            indices: Vec::new(),
            skin_vertex_data: Vec::new(),
            transforms: Vec::new(),
            drawable_aabbs: Vec::new(),
            materials: MaterialTable::new(),
            bindless,
            global_bind_group,
            vertex_buffer: BufferHandle::NULL,
            index_buffer: BufferHandle::NULL,
            data_buffer: BufferHandle::NULL,
            skin_buffer: BufferHandle::NULL,
            material_buffer: BufferHandle::NULL,
            transform_buffers: Vec::new(),
            light_buffers: Vec::new(),
            point_shadow_buffers: Vec::new(),
            lights_gpu: Vec::new(),
            light_entities: Vec::new(),
            shadow_rects: Vec::new(),
            shadow_atlas_texture: TextureHandle::NULL,
            shadow_atlas_slot: -1,
            point_shadow_data: Vec::new(),
            skins: Vec::new(),
            skin_joint_groups: Vec::new(),
            skin_io_bind_group: BindGroupHandle::NULL,
            shadow_pass: RenderPassHandle::NULL,
            skybox_cube: None,
            probes: Vec::new(),
            views: Vec::new(),
            bvh: Bvh::new(),
            finalized: false,
        })
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn desc(&self) -> &SceneDesc {
        &self.desc
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }

    pub fn drawable_aabbs(&self) -> &[Aabb] {
        &self.drawable_aabbs
    }

    pub fn shadow_rects(&self) -> &[PackedRect] {
        &self.shadow_rects
    }

    pub fn global_bind_group(&self) -> BindGroupHandle {
        self.global_bind_group
    }

    pub fn geometry_buffers(&self) -> (BufferHandle, BufferHandle, BufferHandle, BufferHandle) {
        (
            self.vertex_buffer,
            self.index_buffer,
            self.data_buffer,
            self.skin_buffer,
        )
    }

    pub fn shadow_atlas(&self) -> (TextureHandle, u32, i32) {
        (
            self.shadow_atlas_texture,
            self.desc.shadow_atlas_resolution,
            self.shadow_atlas_slot,
        )
    }

    pub fn material_slot(&self, material: Entity) -> Option<u32> {
        self.materials.slot_of(material)
    }

    pub fn light_buffer(&self, frame_index: u32) -> BufferHandle {
        self.light_buffers
            .get(frame_index as usize)
            .copied()
            .unwrap_or(BufferHandle::NULL)
    }

    pub fn point_shadow_buffer(&self, frame_index: u32) -> BufferHandle {
        self.point_shadow_buffers
            .get(frame_index as usize)
            .copied()
            .unwrap_or(BufferHandle::NULL)
    }

    pub fn transform_buffer(&self, frame_index: u32) -> BufferHandle {
        self.transform_buffers
            .get(frame_index as usize)
            .copied()
            .unwrap_or(BufferHandle::NULL)
    }

    /// Appends drawable object entities to the staging list. Entries
    /// sharing a mesh are bubbled together so they become one instanced
    /// drawable when the scene is finalized.
    #[profiling::function]
    pub fn add_drawable_objects(&mut self, entities: &[Entity]) {
        let start = self.staged.len();
        self.staged.extend_from_slice(entities);

        let object_key = self.library.keys().object;
        let mesh_of = |library: &ComponentLibrary, entity: Entity| -> u32 {
            library
                .get_component(object_key, entity)
                .map(|object| object.mesh.index)
                .unwrap_or(u32::MAX)
        };

        // bubble sort the new tail by mesh index; stable, and the tail is
        // usually nearly sorted already (models stage mesh by mesh)
        let staged = &mut self.staged[start..];
        let mut n = staged.len();
        while n > 1 {
            let mut swapped = false;
            for i in 1..n {
                if mesh_of(&self.library, staged[i - 1]) > mesh_of(&self.library, staged[i]) {
                    staged.swap(i - 1, i);
                    swapped = true;
                }
            }
            if !swapped {
                break;
            }
            n -= 1;
        }
    }

    /// Turns the staging list into retained drawables: appends geometry to
    /// the scene-global buffers, fills the material table, creates skinning
    /// data, uploads everything, and creates the shadow atlas and probe
    /// resources. Calling it again with an empty staging list is a no-op.
    #[profiling::function]
    pub fn finalize(&mut self, variants: &mut ShaderVariantCache) -> Result<(), RendererError> {
        let staged = std::mem::take(&mut self.staged);
        let keys = *self.library.keys();
        let device = self.device.clone();

        let mut i = 0usize;
        while i < staged.len() {
            let entity = staged[i];
            let Some(object) = self.library.get_component(keys.object, entity).cloned() else {
                tracing::warn!("staged entity {entity:?} has no object component, skipping");
                i += 1;
                continue;
            };
            // coalesce the run of entities sharing this mesh
            let mut instance_count = 1u32;
            while i + (instance_count as usize) < staged.len() {
                let next = staged[i + instance_count as usize];
                let next_mesh = self
                    .library
                    .get_component(keys.object, next)
                    .map(|o| o.mesh);
                if next_mesh == Some(object.mesh) {
                    instance_count += 1;
                } else {
                    break;
                }
            }

            let Some(mesh) = self.library.get_component(keys.mesh, object.mesh).cloned() else {
                tracing::warn!("object {entity:?} references missing mesh, skipping drawable");
                i += instance_count as usize;
                continue;
            };

            let staged_geometry = append_mesh_geometry(
                &mesh,
                &mut self.vertex_positions,
                &mut self.vertex_data,
                &mut self.indices,
            );

            let material_slot = self.materials.upsert(
                device.as_ref(),
                &mut self.bindless,
                &self.library,
                mesh.material,
            )?;

            let mut skin_index = -1i32;
            if !mesh.skin.is_null() {
                let joint_count = self
                    .library
                    .get_component(keys.skin, mesh.skin)
                    .map(|skin| skin.joints.len())
                    .unwrap_or(0);
                let source_offset = append_skin_source(&mesh, &mut self.skin_vertex_data);
                let skin_data = SkinData::new(
                    device.as_ref(),
                    variants,
                    mesh.skin,
                    joint_count,
                    mesh.vertex_stream_mask,
                    staged_geometry.vertex_count,
                    source_offset,
                    staged_geometry.data_offset,
                    staged_geometry.vertex_offset,
                )?;
                skin_index = self.skins.len() as i32;
                self.skins.push(skin_data);
            }

            let (forward, double_sided) = {
                let material = self.library.get_component(keys.material, mesh.material);
                (
                    material
                        .map(|m| m.blend_mode != BlendMode::Opaque)
                        .unwrap_or(false)
                        || object.flags.contains(ObjectFlags::FORWARD),
                    material
                        .map(|m| m.flags.contains(MaterialFlags::DOUBLE_SIDED))
                        .unwrap_or(false),
                )
            };

            let transform_index = self.transforms.len() as u32;
            for instance in 0..instance_count {
                let instance_entity = staged[i + instance as usize];
                let world = self
                    .library
                    .get_component(keys.object, instance_entity)
                    .and_then(|o| self.library.get_component(keys.transform, o.transform))
                    .map(|t| t.world)
                    .unwrap_or(glam::Mat4::IDENTITY);
                self.transforms.push(gpu_mat4(world));
            }

            self.drawables.push(Drawable {
                entity,
                mesh: object.mesh,
                index_offset: staged_geometry.index_offset,
                index_count: staged_geometry.index_count,
                vertex_offset: staged_geometry.vertex_offset,
                vertex_count: staged_geometry.vertex_count,
                data_offset: staged_geometry.data_offset,
                material_slot,
                transform_index,
                instance_count,
                skin_index,
                forward,
                cast_shadow: object.flags.contains(ObjectFlags::CAST_SHADOW),
                double_sided,
            });
            i += instance_count as usize;
        }

        self.upload_geometry()?;
        if self.shadow_atlas_texture.is_null() {
            self.create_shadow_atlas()?;
        }
        self.finalized = true;
        tracing::info!(
            "scene finalized: {} drawables, {} materials, {} skins",
            self.drawables.len(),
            self.materials.len(),
            self.skins.len()
        );
        Ok(())
    }

    fn upload_geometry(&mut self) -> Result<(), RendererError> {
        let device = self.device.as_ref();
        let frames = device.frames_in_flight();

        let recreate = |device: &dyn Device,
                        old: BufferHandle,
                        bytes: &[u8],
                        usage: BufferUsage,
                        memory: BufferMemory,
                        label: &'static str|
         -> Result<BufferHandle, RendererError> {
            if !old.is_null() {
                device.queue_buffer_for_deletion(old);
            }
            let buffer = device.create_buffer(&BufferDesc {
                size: (bytes.len() as u64).max(16),
                usage: usage | BufferUsage::TRANSFER_DST,
                memory,
                label: Some(label),
            })?;
            if !bytes.is_empty() {
                device.write_buffer(buffer, 0, bytes)?;
            }
            Ok(buffer)
        };

        self.vertex_buffer = recreate(
            device,
            self.vertex_buffer,
            bytemuck::cast_slice(&self.vertex_positions),
            BufferUsage::VERTEX | BufferUsage::STORAGE,
            BufferMemory::DeviceLocal,
            "Scene.vertex_buffer",
        )?;
        self.index_buffer = recreate(
            device,
            self.index_buffer,
            bytemuck::cast_slice(&self.indices),
            BufferUsage::INDEX,
            BufferMemory::DeviceLocal,
            "Scene.index_buffer",
        )?;
        self.data_buffer = recreate(
            device,
            self.data_buffer,
            bytemuck::cast_slice(&self.vertex_data),
            BufferUsage::STORAGE,
            BufferMemory::DeviceLocal,
            "Scene.vertex_data_buffer",
        )?;
        self.skin_buffer = recreate(
            device,
            self.skin_buffer,
            bytemuck::cast_slice(&self.skin_vertex_data),
            BufferUsage::STORAGE,
            BufferMemory::DeviceLocal,
            "Scene.skin_vertex_buffer",
        )?;
        self.material_buffer = recreate(
            device,
            self.material_buffer,
            bytemuck::cast_slice(self.materials.materials()),
            BufferUsage::STORAGE,
            BufferMemory::HostVisible,
            "Scene.material_buffer",
        )?;

        for buffer in self.transform_buffers.drain(..) {
            device.queue_buffer_for_deletion(buffer);
        }
        let transform_bytes: &[u8] = bytemuck::cast_slice(&self.transforms);
        for _ in 0..frames {
            let buffer = device.create_buffer(&BufferDesc {
                size: (transform_bytes.len() as u64).max(64),
                usage: BufferUsage::STORAGE,
                memory: BufferMemory::HostVisible,
                label: Some("Scene.transform_buffer"),
            })?;
            if !transform_bytes.is_empty() {
                device.write_buffer(buffer, 0, transform_bytes)?;
            }
            self.transform_buffers.push(buffer);
        }

        device.update_bind_group(
            self.global_bind_group,
            &BindGroupUpdate {
                buffers: vec![
                    BufferWrite {
                        slot: SCENE_VERTEX_DATA_SLOT,
                        buffer: self.data_buffer,
                        offset: 0,
                        range: 0,
                    },
                    BufferWrite {
                        slot: SCENE_MATERIAL_SLOT,
                        buffer: self.material_buffer,
                        offset: 0,
                        range: 0,
                    },
                    BufferWrite {
                        slot: SCENE_TRANSFORM_SLOT,
                        buffer: self.transform_buffers[0],
                        offset: 0,
                        range: 0,
                    },
                ],
                ..Default::default()
            },
        )?;
        Ok(())
    }

    fn create_shadow_atlas(&mut self) -> Result<(), RendererError> {
        let resolution = self.desc.shadow_atlas_resolution;
        self.shadow_atlas_texture = self.device.create_texture(
            &TextureDesc::d2(
                resolution,
                resolution,
                Format::Depth32Float,
                TextureUsage::DEPTH_ATTACHMENT | TextureUsage::SAMPLED,
            )
            .with_label("Scene.shadow_atlas"),
        )?;
        let device = self.device.clone();
        self.shadow_atlas_slot = self
            .bindless
            .texture_slot(device.as_ref(), self.shadow_atlas_texture)? as i32;
        Ok(())
    }

    /// Refreshes the per-instance transform table from the ECS and writes
    /// this frame's transform buffer.
    #[profiling::function]
    pub fn update_transforms(&mut self, frame_index: u32) -> Result<(), RendererError> {
        let keys = *self.library.keys();
        let mut cursor = 0usize;
        for drawable in &self.drawables {
            // instances follow the drawable's first transform slot
            for _ in 0..drawable.instance_count {
                let world = self
                    .library
                    .get_component(keys.object, drawable.entity)
                    .and_then(|o| self.library.get_component(keys.transform, o.transform))
                    .map(|t| t.world)
                    .unwrap_or(glam::Mat4::IDENTITY);
                if cursor < self.transforms.len() {
                    self.transforms[cursor] = gpu_mat4(world);
                }
                cursor += 1;
            }
        }
        if let Some(buffer) = self.transform_buffers.get(frame_index as usize) {
            if !self.transforms.is_empty() {
                self.device
                    .write_buffer(*buffer, 0, bytemuck::cast_slice(&self.transforms))?;
            }
        }
        Ok(())
    }

    /// Rebuilds the CPU light table from light components and writes this
    /// frame's light buffer. Shadow indices are patched in afterwards by
    /// the shadow passes.
    #[profiling::function]
    pub fn update_lights(&mut self, frame_index: u32) -> Result<(), RendererError> {
        let key = self.library.keys().light;
        let (lights, entities) = self.library.get_components(key);
        self.lights_gpu.clear();
        self.light_entities.clear();
        for (light, entity) in lights.iter().zip(entities) {
            self.light_entities.push(*entity);
            self.lights_gpu.push(GpuLight {
                intensity: light.intensity,
                range: light.range,
                position: light.position.to_array(),
                direction: light.direction.to_array(),
                color: light.color.to_array(),
                shadow_index: -1,
                cast_shadow: light.flags.contains(LightFlags::CAST_SHADOW) as i32,
                cascade_count: light.cascade_count as i32,
                light_type: match light.kind {
                    LightKind::Directional => 0,
                    LightKind::Point => 1,
                    LightKind::Spot => 2,
                },
                inner_cone_cos: light.inner_cone_angle.cos(),
                outer_cone_cos: light.outer_cone_angle.cos(),
            });
        }

        self.upload_lights(frame_index)
    }

    /// Writes the current CPU light table into this frame's light buffer
    /// and points the scene bind group at it.
    pub fn upload_lights(&mut self, frame_index: u32) -> Result<(), RendererError> {
        let device = self.device.as_ref();
        let frames = device.frames_in_flight() as usize;
        while self.light_buffers.len() < frames {
            self.light_buffers.push(BufferHandle::NULL);
        }
        let bytes: &[u8] = bytemuck::cast_slice(&self.lights_gpu);
        let slot = frame_index as usize;
        let needed = (bytes.len() as u64).max(16);
        if self.light_buffers[slot].is_null()
            || device
                .write_buffer(self.light_buffers[slot], 0, bytes)
                .is_err()
        {
            if !self.light_buffers[slot].is_null() {
                device.queue_buffer_for_deletion(self.light_buffers[slot]);
            }
            self.light_buffers[slot] = device.create_buffer(&BufferDesc {
                size: needed.next_power_of_two(),
                usage: BufferUsage::STORAGE,
                memory: BufferMemory::HostVisible,
                label: Some("Scene.light_buffer"),
            })?;
            device.write_buffer(self.light_buffers[slot], 0, bytes)?;
        }
        device.update_bind_group(
            self.global_bind_group,
            &BindGroupUpdate {
                buffers: vec![BufferWrite {
                    slot: SCENE_LIGHT_SLOT,
                    buffer: self.light_buffers[slot],
                    offset: 0,
                    range: 0,
                }],
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// Writes this frame's point/spot shadow table.
    pub fn upload_point_shadow_data(&mut self, frame_index: u32) -> Result<(), RendererError> {
        let device = self.device.as_ref();
        let frames = device.frames_in_flight() as usize;
        while self.point_shadow_buffers.len() < frames {
            self.point_shadow_buffers.push(BufferHandle::NULL);
        }
        let bytes: &[u8] = bytemuck::cast_slice(&self.point_shadow_data);
        let slot = frame_index as usize;
        if self.point_shadow_buffers[slot].is_null()
            || device
                .write_buffer(self.point_shadow_buffers[slot], 0, bytes)
                .is_err()
        {
            if !self.point_shadow_buffers[slot].is_null() {
                device.queue_buffer_for_deletion(self.point_shadow_buffers[slot]);
            }
            self.point_shadow_buffers[slot] = device.create_buffer(&BufferDesc {
                size: (bytes.len() as u64).max(16).next_power_of_two(),
                usage: BufferUsage::STORAGE,
                memory: BufferMemory::HostVisible,
                label: Some("Scene.point_shadow_buffer"),
            })?;
            device.write_buffer(self.point_shadow_buffers[slot], 0, bytes)?;
        }
        Ok(())
    }

    /// Rewrites the material buffer when material slots changed this
    /// frame. Grows by recreating the buffer and repatching the scene bind
    /// group.
    pub fn flush_materials(&mut self) -> Result<(), RendererError> {
        if !self.materials.take_dirty() {
            return Ok(());
        }
        let device = self.device.as_ref();
        let bytes: &[u8] = bytemuck::cast_slice(self.materials.materials());
        if bytes.is_empty() {
            return Ok(());
        }
        if device.write_buffer(self.material_buffer, 0, bytes).is_err() {
            device.queue_buffer_for_deletion(self.material_buffer);
            self.material_buffer = device.create_buffer(&BufferDesc {
                size: (bytes.len() as u64).next_power_of_two(),
                usage: BufferUsage::STORAGE | BufferUsage::TRANSFER_DST,
                memory: BufferMemory::HostVisible,
                label: Some("Scene.material_buffer"),
            })?;
            device.write_buffer(self.material_buffer, 0, bytes)?;
            device.update_bind_group(
                self.global_bind_group,
                &BindGroupUpdate {
                    buffers: vec![BufferWrite {
                        slot: SCENE_MATERIAL_SLOT,
                        buffer: self.material_buffer,
                        offset: 0,
                        range: 0,
                    }],
                    ..Default::default()
                },
            )?;
        }
        Ok(())
    }

    /// Caches drawable world AABBs and rebuilds the BVH over them.
    #[profiling::function]
    pub fn update_bounds(&mut self) {
        let keys = *self.library.keys();
        self.drawable_aabbs.clear();
        for drawable in &self.drawables {
            let aabb = self
                .library
                .get_component(keys.object, drawable.entity)
                .map(|o| o.world_aabb)
                .unwrap_or(Aabb::EMPTY);
            self.drawable_aabbs.push(aabb);
        }
        self.bvh.build(&self.drawable_aabbs);
    }

    /// Releases every GPU resource the scene owns. Views must be cleaned
    /// up first by the renderer.
    pub fn cleanup(&mut self) {
        let device = self.device.as_ref();
        for buffer in [
            self.vertex_buffer,
            self.index_buffer,
            self.data_buffer,
            self.skin_buffer,
            self.material_buffer,
        ] {
            if !buffer.is_null() {
                device.queue_buffer_for_deletion(buffer);
            }
        }
        for buffer in self
            .transform_buffers
            .drain(..)
            .chain(self.light_buffers.drain(..))
            .chain(self.point_shadow_buffers.drain(..))
        {
            if !buffer.is_null() {
                device.queue_buffer_for_deletion(buffer);
            }
        }
        if !self.shadow_atlas_texture.is_null() {
            self.bindless.release_texture(self.shadow_atlas_texture);
            device.queue_texture_for_deletion(self.shadow_atlas_texture);
            self.shadow_atlas_texture = TextureHandle::NULL;
        }
        for skin in self.skins.drain(..) {
            for texture in skin.joint_textures {
                device.queue_texture_for_deletion(texture);
            }
        }
        for probe in self.probes.drain(..) {
            probe.cleanup(device, &mut self.bindless);
        }
        self.vertex_buffer = BufferHandle::NULL;
        self.index_buffer = BufferHandle::NULL;
        self.data_buffer = BufferHandle::NULL;
        self.skin_buffer = BufferHandle::NULL;
        self.material_buffer = BufferHandle::NULL;
        self.drawables.clear();
        self.vertex_positions.clear();
        self.vertex_data.clear();
        self.indices.clear();
        self.skin_vertex_data.clear();
        self.transforms.clear();
        self.finalized = false;
    }
}
