//! Environment probes. Each probe captures the scene into a cubemap from
//! its world position (six reverse-Z perspective faces), then prefilters
//! the result into a roughness-mipped GGX specular cubemap, a Lambertian
//! diffuse cubemap and a 2D GGX BRDF LUT. Probes flagged DIRTY capture
//! once; REALTIME probes re-capture every `interval` frames.

use glam::Vec3;
use helio_ecs::{ComponentLibrary, Entity, EnvironmentProbe, ProbeFlags};
use helio_gpu::{
    BindGroupDesc, BindGroupHandle, BindGroupLayoutHandle, BindGroupUpdate, BufferDesc,
    BufferHandle, BufferMemory, BufferUsage, BufferWrite, Device, Format, RenderPassDesc,
    RenderPassHandle, RenderPassLayoutHandle, TextureDesc, TextureHandle, TextureUsage,
};

use crate::gpu_types::BindGroup0;

use crate::bindless::BindlessTables;
use crate::camera::Camera;
use crate::gpu_types::GpuProbeData;
use crate::shadows::OMNI_FACE_PITCH_YAW;
use crate::RendererError;

/// Retained GPU state for one environment probe.
pub struct ProbeSlot {
    pub entity: Entity,
    pub resolution: u32,
    pub samples: u32,
    /// Per-face capture targets; assembled into `capture_cube` after all
    /// six faces rendered.
    pub face_color: [TextureHandle; 6],
    pub face_depth: TextureHandle,
    pub face_passes: [RenderPassHandle; 6],
    pub face_camera_buffers: [BufferHandle; 6],
    pub face_bind_groups: [BindGroupHandle; 6],
    pub capture_cube: TextureHandle,
    pub ggx_cube: TextureHandle,
    pub lambertian_cube: TextureHandle,
    pub brdf_lut: TextureHandle,
    pub gpu: GpuProbeData,
    /// Frames left until a REALTIME probe re-captures.
    pub cooldown: u32,
}

impl ProbeSlot {
    pub fn new(
        device: &dyn Device,
        bindless: &mut BindlessTables,
        capture_layout: RenderPassLayoutHandle,
        capture_bind_layout: BindGroupLayoutHandle,
        library: &ComponentLibrary,
        entity: Entity,
    ) -> Result<Self, RendererError> {
        let keys = *library.keys();
        let probe = library
            .get_component(keys.environment_probe, entity)
            .cloned()
            .unwrap_or_default();
        let position = library
            .get_component(keys.transform, entity)
            .map(|t| t.world.w_axis.truncate())
            .unwrap_or(Vec3::ZERO);

        let resolution = probe.resolution.max(8);
        let mips = mip_count(resolution);

        let mut face_color = [TextureHandle::NULL; 6];
        for face in face_color.iter_mut() {
            *face = device.create_texture(
                &TextureDesc::d2(
                    resolution,
                    resolution,
                    Format::Rgba16Float,
                    TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED | TextureUsage::TRANSFER_SRC,
                )
                .with_label("Probe.face_color"),
            )?;
        }
        let face_depth = device.create_texture(
            &TextureDesc::d2(
                resolution,
                resolution,
                Format::Depth32Float,
                TextureUsage::DEPTH_ATTACHMENT,
            )
            .with_label("Probe.face_depth"),
        )?;
        let mut face_passes = [helio_gpu::RenderPassHandle::NULL; 6];
        for (face, pass) in face_passes.iter_mut().enumerate() {
            *pass = device.create_render_pass(&RenderPassDesc {
                layout: capture_layout,
                dimensions: (resolution, resolution),
                attachments: vec![face_color[face], face_depth],
                label: Some("Probe.face_pass"),
            })?;
        }

        let mut face_camera_buffers = [BufferHandle::NULL; 6];
        let mut face_bind_groups = [BindGroupHandle::NULL; 6];
        for face in 0..6 {
            face_camera_buffers[face] = device.create_buffer(&BufferDesc {
                size: std::mem::size_of::<BindGroup0>() as u64,
                usage: BufferUsage::UNIFORM,
                memory: BufferMemory::HostVisible,
                label: Some("Probe.face_camera"),
            })?;
            face_bind_groups[face] = device.create_bind_group(&BindGroupDesc {
                layout: capture_bind_layout,
                label: Some("Probe.face_bind_group"),
            })?;
            device.update_bind_group(
                face_bind_groups[face],
                &BindGroupUpdate {
                    buffers: vec![BufferWrite {
                        slot: 0,
                        buffer: face_camera_buffers[face],
                        offset: 0,
                        range: 0,
                    }],
                    ..Default::default()
                },
            )?;
        }

        let capture_cube = device.create_texture(
            &TextureDesc::cube(
                resolution,
                mips,
                Format::Rgba16Float,
                TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST | TextureUsage::TRANSFER_SRC,
            )
            .with_label("Probe.capture_cube"),
        )?;
        let ggx_cube = device.create_texture(
            &TextureDesc::cube(
                resolution,
                mips,
                Format::Rgba16Float,
                TextureUsage::SAMPLED | TextureUsage::STORAGE,
            )
            .with_label("Probe.ggx_cube"),
        )?;
        let lambertian_cube = device.create_texture(
            &TextureDesc::cube(
                resolution.min(64),
                1,
                Format::Rgba16Float,
                TextureUsage::SAMPLED | TextureUsage::STORAGE,
            )
            .with_label("Probe.lambertian_cube"),
        )?;
        let brdf_lut = device.create_texture(
            &TextureDesc::d2(
                512,
                512,
                Format::Rgba16Float,
                TextureUsage::SAMPLED | TextureUsage::STORAGE,
            )
            .with_label("Probe.brdf_lut"),
        )?;

        let ggx_slot = bindless.cube_texture_slot(device, ggx_cube)? as i32;
        let lambertian_slot = bindless.cube_texture_slot(device, lambertian_cube)? as i32;
        let lut_slot = bindless.texture_slot(device, brdf_lut)? as i32;

        let range = probe.range.max(0.0);
        let gpu = GpuProbeData {
            position: position.to_array(),
            range_sqr: range * range,
            ggx_env: ggx_slot,
            lambertian_env: lambertian_slot,
            ggx_lut: lut_slot,
            aabb_min: [position.x - range, position.y - range, position.z - range, 0.0],
            aabb_max: [position.x + range, position.y + range, position.z + range, 0.0],
            parallax_correction: probe.flags.contains(ProbeFlags::PARALLAX_CORRECTION) as i32,
        };

        Ok(Self {
            entity,
            resolution,
            samples: probe.samples,
            face_color,
            face_depth,
            face_passes,
            face_camera_buffers,
            face_bind_groups,
            capture_cube,
            ggx_cube,
            lambertian_cube,
            brdf_lut,
            gpu,
            cooldown: 0,
        })
    }

    /// The six face cameras at the probe's position.
    pub fn face_cameras(&self, near: f32, far: f32) -> [Camera; 6] {
        let position = Vec3::from_array([
            self.gpu.position[0],
            self.gpu.position[1],
            self.gpu.position[2],
        ]);
        let mut camera =
            Camera::perspective_reverse_z(position, std::f32::consts::FRAC_PI_2, 1.0, near, far);
        let mut cameras = [camera; 6];
        for (face, (pitch, yaw)) in OMNI_FACE_PITCH_YAW.iter().enumerate() {
            camera.set_pitch_yaw(*pitch, *yaw);
            camera.update();
            cameras[face] = camera;
        }
        cameras
    }

    pub fn cleanup(self, device: &dyn Device, bindless: &mut BindlessTables) {
        bindless.release_cube_texture(self.ggx_cube);
        bindless.release_cube_texture(self.lambertian_cube);
        bindless.release_texture(self.brdf_lut);
        for pass in self.face_passes {
            device.destroy_render_pass(pass);
        }
        for buffer in self.face_camera_buffers {
            device.queue_buffer_for_deletion(buffer);
        }
        for group in self.face_bind_groups {
            device.queue_bind_group_for_deletion(group);
        }
        for texture in self
            .face_color
            .into_iter()
            .chain([
                self.face_depth,
                self.capture_cube,
                self.ggx_cube,
                self.lambertian_cube,
                self.brdf_lut,
            ])
        {
            device.queue_texture_for_deletion(texture);
        }
    }
}

pub fn mip_count(resolution: u32) -> u32 {
    32 - resolution.max(1).leading_zeros()
}

/// Decides which probes to capture this frame and steps their state
/// machines: DIRTY probes render once and clear the flag, REALTIME probes
/// render whenever their interval elapses.
pub fn select_probe_updates(library: &mut ComponentLibrary, slots: &mut [ProbeSlot]) -> Vec<usize> {
    let key = library.keys().environment_probe;
    let mut selected = Vec::new();
    for (index, slot) in slots.iter_mut().enumerate() {
        let Some(probe) = library.get_component_mut(key, slot.entity) else {
            continue;
        };
        if probe.flags.contains(ProbeFlags::DIRTY) {
            probe.flags.remove(ProbeFlags::DIRTY);
            slot.cooldown = probe.interval.max(1);
            selected.push(index);
            continue;
        }
        if probe.flags.contains(ProbeFlags::REALTIME) {
            slot.cooldown = slot.cooldown.saturating_sub(1);
            if slot.cooldown == 0 {
                slot.cooldown = probe.interval.max(1);
                selected.push(index);
            }
        }
    }
    selected
}

/// Refreshes a slot's table entry from its component (range, position,
/// parallax box), keeping the bindless slots.
pub fn refresh_probe_data(
    library: &ComponentLibrary,
    slot: &mut ProbeSlot,
) -> Option<EnvironmentProbe> {
    let keys = *library.keys();
    let probe = library
        .get_component(keys.environment_probe, slot.entity)
        .cloned()?;
    let position = library
        .get_component(keys.transform, slot.entity)
        .map(|t| t.world.w_axis.truncate())
        .unwrap_or(Vec3::ZERO);
    let range = probe.range.max(0.0);
    slot.gpu.position = position.to_array();
    slot.gpu.range_sqr = range * range;
    slot.gpu.aabb_min = [position.x - range, position.y - range, position.z - range, 0.0];
    slot.gpu.aabb_max = [position.x + range, position.y + range, position.z + range, 0.0];
    slot.gpu.parallax_correction = probe.flags.contains(ProbeFlags::PARALLAX_CORRECTION) as i32;
    Some(probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use helio_ecs::EcsContext;

    fn library() -> ComponentLibrary {
        let mut ctx = EcsContext::new();
        ctx.finalize();
        match ctx.create_library() {
            Ok(lib) => lib,
            Err(e) => panic!("{e}"),
        }
    }

    fn slot(entity: Entity) -> ProbeSlot {
        ProbeSlot {
            entity,
            resolution: 128,
            samples: 128,
            face_color: [TextureHandle::NULL; 6],
            face_depth: TextureHandle::NULL,
            face_passes: [RenderPassHandle::NULL; 6],
            face_camera_buffers: [BufferHandle::NULL; 6],
            face_bind_groups: [BindGroupHandle::NULL; 6],
            capture_cube: TextureHandle::NULL,
            ggx_cube: TextureHandle::NULL,
            lambertian_cube: TextureHandle::NULL,
            brdf_lut: TextureHandle::NULL,
            gpu: GpuProbeData::default(),
            cooldown: 0,
        }
    }

    #[test]
    fn dirty_probes_update_exactly_once() {
        let mut lib = library();
        let entity = lib.create_environment_probe(Some("probe"));
        let mut slots = vec![slot(entity)];

        assert_eq!(select_probe_updates(&mut lib, &mut slots), vec![0]);
        assert!(select_probe_updates(&mut lib, &mut slots).is_empty());
        assert!(select_probe_updates(&mut lib, &mut slots).is_empty());
    }

    #[test]
    fn realtime_probes_respect_their_interval() {
        let mut lib = library();
        let entity = lib.create_environment_probe(Some("probe"));
        let key = lib.keys().environment_probe;
        if let Some(probe) = lib.get_component_mut(key, entity) {
            probe.flags = ProbeFlags::REALTIME;
            probe.interval = 3;
        }
        let mut slots = vec![slot(entity)];

        let mut updates = Vec::new();
        for frame in 0..9 {
            if !select_probe_updates(&mut lib, &mut slots).is_empty() {
                updates.push(frame);
            }
        }
        assert_eq!(updates, vec![0, 3, 6]);
    }

    #[test]
    fn mip_chain_reaches_one_texel() {
        assert_eq!(mip_count(1), 1);
        assert_eq!(mip_count(128), 8);
        assert_eq!(mip_count(100), 7);
    }
}
