//! Bindless descriptor tables and the GPU material table. Shaders index
//! both by plain integers, so a slot must stay stable from allocation until
//! explicit release; vacated slots are recycled through free lists.

use std::collections::HashMap;

use helio_ecs::{ComponentLibrary, Entity, Material, TEXTURE_SLOT_COUNT};
use helio_gpu::{
    BindGroupHandle, BindGroupUpdate, Device, TextureHandle, TextureWrite,
};

use crate::gpu_types::GpuMaterial;
use crate::RendererError;

/// Binding slot of the 2D bindless texture array.
pub const BINDLESS_TEXTURE_BINDING: u32 = 4;
/// Binding slot of the cube bindless texture array.
pub const BINDLESS_CUBE_BINDING: u32 = 4100;

struct SlotAllocator {
    map: HashMap<TextureHandle, u32>,
    free: Vec<u32>,
    next: u32,
    capacity: u32,
}

impl SlotAllocator {
    fn new(capacity: u32) -> Self {
        Self {
            map: HashMap::new(),
            free: Vec::new(),
            next: 0,
            capacity,
        }
    }

    fn allocate(&mut self, texture: TextureHandle) -> Option<(u32, bool)> {
        if let Some(slot) = self.map.get(&texture) {
            return Some((*slot, false));
        }
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                if self.next >= self.capacity {
                    return None;
                }
                let slot = self.next;
                self.next += 1;
                slot
            }
        };
        self.map.insert(texture, slot);
        Some((slot, true))
    }

    fn release(&mut self, texture: TextureHandle) -> Option<u32> {
        let slot = self.map.remove(&texture)?;
        self.free.push(slot);
        Some(slot)
    }

    fn get(&self, texture: TextureHandle) -> Option<u32> {
        self.map.get(&texture).copied()
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// The scene's 2D and cube bindless tables. Descriptor writes go through
/// the scene's global bind group.
pub struct BindlessTables {
    textures_2d: SlotAllocator,
    textures_cube: SlotAllocator,
    bind_group: BindGroupHandle,
}

impl BindlessTables {
    pub fn new(capacity_2d: u32, capacity_cube: u32, bind_group: BindGroupHandle) -> Self {
        Self {
            textures_2d: SlotAllocator::new(capacity_2d),
            textures_cube: SlotAllocator::new(capacity_cube),
            bind_group,
        }
    }

    pub fn bind_group(&self) -> BindGroupHandle {
        self.bind_group
    }

    /// Slot of `texture` in the 2D table, allocating and writing the
    /// descriptor on first sight.
    pub fn texture_slot(
        &mut self,
        device: &dyn Device,
        texture: TextureHandle,
    ) -> Result<u32, RendererError> {
        let (slot, fresh) = self
            .textures_2d
            .allocate(texture)
            .ok_or(RendererError::BindlessTableFull("2d"))?;
        if fresh {
            device.update_bind_group(
                self.bind_group,
                &BindGroupUpdate {
                    textures: vec![TextureWrite {
                        slot: BINDLESS_TEXTURE_BINDING,
                        array_index: slot,
                        texture,
                    }],
                    ..Default::default()
                },
            )?;
        }
        Ok(slot)
    }

    pub fn cube_texture_slot(
        &mut self,
        device: &dyn Device,
        texture: TextureHandle,
    ) -> Result<u32, RendererError> {
        let (slot, fresh) = self
            .textures_cube
            .allocate(texture)
            .ok_or(RendererError::BindlessTableFull("cube"))?;
        if fresh {
            device.update_bind_group(
                self.bind_group,
                &BindGroupUpdate {
                    textures: vec![TextureWrite {
                        slot: BINDLESS_CUBE_BINDING,
                        array_index: slot,
                        texture,
                    }],
                    ..Default::default()
                },
            )?;
        }
        Ok(slot)
    }

    /// Frees the texture's slot for reuse. The descriptor keeps its last
    /// contents until the slot is handed out again.
    pub fn release_texture(&mut self, texture: TextureHandle) {
        self.textures_2d.release(texture);
    }

    pub fn release_cube_texture(&mut self, texture: TextureHandle) {
        self.textures_cube.release(texture);
    }

    pub fn get_texture_slot(&self, texture: TextureHandle) -> Option<u32> {
        self.textures_2d.get(texture)
    }

    pub fn texture_count(&self) -> usize {
        self.textures_2d.len()
    }
}

/// CPU mirror of the GPU material array plus the `material entity -> slot`
/// hash the draw paths resolve through.
#[derive(Default)]
pub struct MaterialTable {
    materials: Vec<GpuMaterial>,
    map: HashMap<Entity, u32>,
    free: Vec<u32>,
    dirty: bool,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `entity`'s material, allocating one (free list first) when
    /// unseen. The GPU-side struct is refreshed from the component either
    /// way.
    pub fn upsert(
        &mut self,
        device: &dyn Device,
        tables: &mut BindlessTables,
        library: &ComponentLibrary,
        entity: Entity,
    ) -> Result<u32, RendererError> {
        let material = library
            .get_component(library.keys().material, entity)
            .cloned()
            .unwrap_or_else(|| {
                tracing::warn!("drawable references missing material {entity:?}, substituting default");
                Material::default()
            });
        let gpu = Self::to_gpu(device, tables, &material)?;

        let slot = match self.map.get(&entity) {
            Some(slot) => *slot,
            None => {
                let slot = match self.free.pop() {
                    Some(slot) => slot,
                    None => {
                        self.materials.push(GpuMaterial::default());
                        (self.materials.len() - 1) as u32
                    }
                };
                self.map.insert(entity, slot);
                slot
            }
        };
        self.materials[slot as usize] = gpu;
        self.dirty = true;
        Ok(slot)
    }

    pub fn release(&mut self, entity: Entity) {
        if let Some(slot) = self.map.remove(&entity) {
            self.materials[slot as usize] = GpuMaterial::default();
            self.free.push(slot);
            self.dirty = true;
        }
    }

    pub fn slot_of(&self, entity: Entity) -> Option<u32> {
        self.map.get(&entity).copied()
    }

    pub fn materials(&self) -> &[GpuMaterial] {
        &self.materials
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn to_gpu(
        device: &dyn Device,
        tables: &mut BindlessTables,
        material: &Material,
    ) -> Result<GpuMaterial, RendererError> {
        let mut gpu = GpuMaterial {
            metallic: material.metallic,
            roughness: material.roughness,
            base_color: material.base_color.to_array(),
            emissive: material.emissive.to_array(),
            alpha_cutoff: material.alpha_cutoff,
            occlusion_strength: material.occlusion_strength,
            emissive_strength: material.emissive_strength,
            uv_set_indices: [0; TEXTURE_SLOT_COUNT],
            bindless_tex_indices: [-1; TEXTURE_SLOT_COUNT],
        };
        for (slot, map) in material.texture_maps.iter().enumerate() {
            gpu.uv_set_indices[slot] = map.uv_set as i32;
            if let Some(texture) = map.texture {
                gpu.bindless_tex_indices[slot] = tables.texture_slot(device, texture)? as i32;
            }
        }
        Ok(gpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helio_gpu::{
        BindGroupDesc, BindGroupLayoutDesc, DeviceLimits, ShaderStages, TextureBinding,
        TextureBindingKind, TextureDesc, TextureUsage,
    };

    fn setup() -> (helio_gpu::null::NullDevice, BindlessTables) {
        let device = helio_gpu::null::NullDevice::new(DeviceLimits {
            max_bindless_textures: 4,
            ..Default::default()
        });
        let layout = device
            .create_bind_group_layout(&BindGroupLayoutDesc {
                textures: vec![TextureBinding {
                    slot: BINDLESS_TEXTURE_BINDING,
                    kind: TextureBindingKind::Sampled,
                    count: 4,
                    stages: ShaderStages::ALL,
                }],
                ..Default::default()
            })
            .ok()
            .unwrap();
        let group = device
            .create_bind_group(&BindGroupDesc {
                layout,
                label: Some("test bindless"),
            })
            .ok()
            .unwrap();
        let tables = BindlessTables::new(4, 2, group);
        (device, tables)
    }

    fn texture(device: &helio_gpu::null::NullDevice) -> TextureHandle {
        device
            .create_texture(&TextureDesc::d2(
                2,
                2,
                helio_gpu::Format::Rgba8Unorm,
                TextureUsage::SAMPLED,
            ))
            .ok()
            .unwrap()
    }

    #[test]
    fn released_slots_are_reused_and_others_stay_stable() {
        let (device, mut tables) = setup();
        let a = texture(&device);
        let b = texture(&device);
        let c = texture(&device);

        assert_eq!(tables.texture_slot(&device, a).ok(), Some(0));
        assert_eq!(tables.texture_slot(&device, b).ok(), Some(1));
        assert_eq!(tables.texture_slot(&device, c).ok(), Some(2));

        tables.release_texture(b);
        let d = texture(&device);
        assert_eq!(tables.texture_slot(&device, d).ok(), Some(1));
        assert_eq!(tables.get_texture_slot(a), Some(0));
        assert_eq!(tables.get_texture_slot(c), Some(2));

        // repeat lookups do not move a texture
        assert_eq!(tables.texture_slot(&device, a).ok(), Some(0));
        assert_eq!(tables.texture_count(), 3);
    }

    #[test]
    fn table_capacity_is_enforced() {
        let (device, mut tables) = setup();
        for _ in 0..4 {
            let t = texture(&device);
            assert!(tables.texture_slot(&device, t).is_ok());
        }
        let overflow = texture(&device);
        assert!(matches!(
            tables.texture_slot(&device, overflow),
            Err(RendererError::BindlessTableFull("2d"))
        ));
    }
}
