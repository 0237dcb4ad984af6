//! A view: one rendering target with its G-buffer, selection-outline and
//! picking resources, per-frame camera data, visibility lists and debug
//! drawlists.

use glam::{Vec3, Vec4};
use helio_ecs::Entity;
use helio_gpu::{
    BindGroupDesc, BindGroupHandle, BindGroupLayoutHandle, BindGroupUpdate, BufferDesc,
    BufferHandle, BufferMemory, BufferUsage, BufferWrite, Device, Format, RenderPassDesc,
    RenderPassHandle, RenderPassLayoutHandle, TextureDesc, TextureHandle, TextureUsage,
    TextureWrite,
};

use crate::camera::Camera;
use crate::gpu_types::{gpu_mat4, BindGroup0, GpuLightShadowData};
use crate::picking::{PickState, PICK_RESULT_SIZE};
use crate::RendererError;

/// View bind group (group 1) slots.
pub const VIEW_CAMERA_SLOT: u32 = 0;
pub const VIEW_DIR_SHADOW_SLOT: u32 = 1;
pub const VIEW_POINT_SHADOW_SLOT: u32 = 2;
pub const VIEW_INPUT_ALBEDO_SLOT: u32 = 3;
pub const VIEW_INPUT_NORMAL_SLOT: u32 = 4;
pub const VIEW_INPUT_AOMR_SLOT: u32 = 5;
pub const VIEW_INPUT_DEPTH_SLOT: u32 = 6;

/// Pass layouts shared by every view, created once by the renderer.
#[derive(Clone, Copy, Debug)]
pub struct ViewPassLayouts {
    pub geometry: RenderPassLayoutHandle,
    pub pick: RenderPassLayoutHandle,
    pub post: RenderPassLayoutHandle,
    pub view_bind_group_layout: BindGroupLayoutHandle,
    pub jfa_bind_group_layout: BindGroupLayoutHandle,
}

pub struct ViewTargets {
    pub depth: TextureHandle,
    /// Raw HDR output the lighting and forward passes accumulate into.
    pub output: TextureHandle,
    pub albedo: TextureHandle,
    pub normal: TextureHandle,
    pub ao_metal_roughness: TextureHandle,
    pub outline_mask: [TextureHandle; 2],
    pub pick: TextureHandle,
    pub pick_depth: TextureHandle,
    pub final_color: TextureHandle,
}

#[derive(Clone, Copy, Debug)]
pub struct DebugLine {
    pub from: Vec3,
    pub to: Vec3,
    pub color: Vec4,
}

#[derive(Default)]
pub struct DebugDrawlists {
    pub world: Vec<DebugLine>,
    pub gizmo: Vec<DebugLine>,
    pub selection: Vec<DebugLine>,
}

impl DebugDrawlists {
    pub fn clear(&mut self) {
        self.world.clear();
        self.gizmo.clear();
        self.selection.clear();
    }
}

pub struct View {
    pub camera: Camera,
    /// Camera the culling pass uses instead, when debugging culling.
    pub culling_camera: Option<Camera>,
    width: u32,
    height: u32,

    pub targets: ViewTargets,
    pub geometry_pass: RenderPassHandle,
    pub pick_pass: RenderPassHandle,
    pub post_pass: RenderPassHandle,

    camera_buffers: Vec<BufferHandle>,
    pub view_bind_groups: Vec<BindGroupHandle>,
    pub jfa_bind_groups: [BindGroupHandle; 2],

    pub dir_shadow_data: Vec<GpuLightShadowData>,
    dir_shadow_buffers: Vec<BufferHandle>,

    pub visible_deferred: Vec<u32>,
    pub visible_forward: Vec<u32>,

    pub picking: PickState,
    pub drawlists: DebugDrawlists,
    pub selection: Vec<Entity>,
}

impl View {
    pub fn new(
        device: &dyn Device,
        layouts: &ViewPassLayouts,
        camera: Camera,
        width: u32,
        height: u32,
    ) -> Result<Self, RendererError> {
        let frames = device.frames_in_flight() as usize;
        let targets = create_targets(device, width, height)?;
        let (geometry_pass, pick_pass, post_pass) =
            create_passes(device, layouts, &targets, width, height)?;

        let mut camera_buffers = Vec::with_capacity(frames);
        let mut dir_shadow_buffers = Vec::with_capacity(frames);
        let mut pick_staging = Vec::with_capacity(frames);
        for _ in 0..frames {
            camera_buffers.push(device.create_buffer(&BufferDesc {
                size: std::mem::size_of::<BindGroup0>() as u64,
                usage: BufferUsage::UNIFORM,
                memory: BufferMemory::HostVisible,
                label: Some("View.camera_buffer"),
            })?);
            dir_shadow_buffers.push(device.create_buffer(&BufferDesc {
                size: 4096,
                usage: BufferUsage::STORAGE,
                memory: BufferMemory::HostVisible,
                label: Some("View.dir_shadow_buffer"),
            })?);
            pick_staging.push(device.create_buffer(&BufferDesc {
                size: PICK_RESULT_SIZE,
                usage: BufferUsage::STAGING | BufferUsage::TRANSFER_DST,
                memory: BufferMemory::HostVisible,
                label: Some("View.pick_staging"),
            })?);
        }

        let view_bind_groups = (0..frames)
            .map(|_| {
                device.create_bind_group(&BindGroupDesc {
                    layout: layouts.view_bind_group_layout,
                    label: Some("View.bind_group"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let jfa_bind_groups = [
            device.create_bind_group(&BindGroupDesc {
                layout: layouts.jfa_bind_group_layout,
                label: Some("View.jfa_bind_group"),
            })?,
            device.create_bind_group(&BindGroupDesc {
                layout: layouts.jfa_bind_group_layout,
                label: Some("View.jfa_bind_group"),
            })?,
        ];

        let mut view = Self {
            camera,
            culling_camera: None,
            width,
            height,
            targets,
            geometry_pass,
            pick_pass,
            post_pass,
            camera_buffers,
            view_bind_groups,
            jfa_bind_groups,
            dir_shadow_data: Vec::new(),
            dir_shadow_buffers,
            visible_deferred: Vec::new(),
            visible_forward: Vec::new(),
            picking: PickState::new(pick_staging),
            drawlists: DebugDrawlists::default(),
            selection: Vec::new(),
        };
        view.write_bind_groups(device)?;
        Ok(view)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Recreates the size-dependent targets and passes. In-flight pick
    /// read-backs are invalidated by the dimension change and resolve to
    /// no-hit.
    pub fn resize(
        &mut self,
        device: &dyn Device,
        layouts: &ViewPassLayouts,
        width: u32,
        height: u32,
    ) -> Result<(), RendererError> {
        if width == self.width && height == self.height {
            return Ok(());
        }
        self.release_targets(device);
        self.width = width;
        self.height = height;
        self.targets = create_targets(device, width, height)?;
        let (geometry, pick, post) = create_passes(device, layouts, &self.targets, width, height)?;
        self.geometry_pass = geometry;
        self.pick_pass = pick;
        self.post_pass = post;
        self.write_bind_groups(device)?;
        Ok(())
    }

    /// Writes this frame's camera uniform.
    pub fn update_camera(&mut self, device: &dyn Device, frame_index: u32) -> Result<(), RendererError> {
        self.camera.update();
        let data = BindGroup0 {
            viewport_size: [
                self.width as f32,
                self.height as f32,
                1.0 / self.width.max(1) as f32,
                1.0 / self.height.max(1) as f32,
            ],
            viewport_info: [self.camera.near, self.camera.far, 0.0, 0.0],
            camera_pos: self.camera.position.to_array(),
            projection: gpu_mat4(self.camera.projection()),
            view: gpu_mat4(self.camera.view()),
            view_projection: gpu_mat4(self.camera.view_projection()),
        };
        let buffer = self.camera_buffers[frame_index as usize];
        device.write_buffer(buffer, 0, bytemuck::bytes_of(&data))?;
        Ok(())
    }

    /// Writes this frame's directional shadow table, growing the buffer as
    /// needed.
    pub fn upload_dir_shadow_data(
        &mut self,
        device: &dyn Device,
        frame_index: u32,
    ) -> Result<(), RendererError> {
        let bytes: &[u8] = bytemuck::cast_slice(&self.dir_shadow_data);
        let slot = frame_index as usize;
        if device
            .write_buffer(self.dir_shadow_buffers[slot], 0, bytes)
            .is_err()
        {
            device.queue_buffer_for_deletion(self.dir_shadow_buffers[slot]);
            self.dir_shadow_buffers[slot] = device.create_buffer(&BufferDesc {
                size: (bytes.len() as u64).max(4096).next_power_of_two(),
                usage: BufferUsage::STORAGE,
                memory: BufferMemory::HostVisible,
                label: Some("View.dir_shadow_buffer"),
            })?;
            device.write_buffer(self.dir_shadow_buffers[slot], 0, bytes)?;
            self.write_bind_groups(device)?;
        }
        Ok(())
    }

    /// Points this frame's view bind group at the scene's omni shadow
    /// table.
    pub fn bind_point_shadow_buffer(
        &self,
        device: &dyn Device,
        frame_index: u32,
        buffer: BufferHandle,
    ) -> Result<(), RendererError> {
        if buffer.is_null() {
            return Ok(());
        }
        device.update_bind_group(
            self.view_bind_groups[frame_index as usize],
            &BindGroupUpdate {
                buffers: vec![BufferWrite {
                    slot: VIEW_POINT_SHADOW_SLOT,
                    buffer,
                    offset: 0,
                    range: 0,
                }],
                ..Default::default()
            },
        )?;
        Ok(())
    }

    pub fn camera_buffer(&self, frame_index: u32) -> BufferHandle {
        self.camera_buffers[frame_index as usize]
    }

    pub fn dir_shadow_buffer(&self, frame_index: u32) -> BufferHandle {
        self.dir_shadow_buffers[frame_index as usize]
    }

    fn write_bind_groups(&mut self, device: &dyn Device) -> Result<(), RendererError> {
        for (frame, bind_group) in self.view_bind_groups.iter().enumerate() {
            device.update_bind_group(
                *bind_group,
                &BindGroupUpdate {
                    buffers: vec![
                        BufferWrite {
                            slot: VIEW_CAMERA_SLOT,
                            buffer: self.camera_buffers[frame],
                            offset: 0,
                            range: 0,
                        },
                        BufferWrite {
                            slot: VIEW_DIR_SHADOW_SLOT,
                            buffer: self.dir_shadow_buffers[frame],
                            offset: 0,
                            range: 0,
                        },
                    ],
                    textures: vec![
                        TextureWrite {
                            slot: VIEW_INPUT_ALBEDO_SLOT,
                            array_index: 0,
                            texture: self.targets.albedo,
                        },
                        TextureWrite {
                            slot: VIEW_INPUT_NORMAL_SLOT,
                            array_index: 0,
                            texture: self.targets.normal,
                        },
                        TextureWrite {
                            slot: VIEW_INPUT_AOMR_SLOT,
                            array_index: 0,
                            texture: self.targets.ao_metal_roughness,
                        },
                        TextureWrite {
                            slot: VIEW_INPUT_DEPTH_SLOT,
                            array_index: 0,
                            texture: self.targets.depth,
                        },
                    ],
                    samplers: Vec::new(),
                },
            )?;
        }
        // jump-flood ping-pong: group 0 reads mask 0 / writes mask 1,
        // group 1 the reverse
        for (group, (read, write)) in self.jfa_bind_groups.iter().zip([(0, 1), (1, 0)]) {
            device.update_bind_group(
                *group,
                &BindGroupUpdate {
                    textures: vec![
                        TextureWrite {
                            slot: 0,
                            array_index: 0,
                            texture: self.targets.outline_mask[read],
                        },
                        TextureWrite {
                            slot: 1,
                            array_index: 0,
                            texture: self.targets.outline_mask[write],
                        },
                    ],
                    ..Default::default()
                },
            )?;
        }
        Ok(())
    }

    fn release_targets(&mut self, device: &dyn Device) {
        for texture in [
            self.targets.depth,
            self.targets.output,
            self.targets.albedo,
            self.targets.normal,
            self.targets.ao_metal_roughness,
            self.targets.outline_mask[0],
            self.targets.outline_mask[1],
            self.targets.pick,
            self.targets.pick_depth,
            self.targets.final_color,
        ] {
            device.queue_texture_for_deletion(texture);
        }
        device.destroy_render_pass(self.geometry_pass);
        device.destroy_render_pass(self.pick_pass);
        device.destroy_render_pass(self.post_pass);
    }

    /// Releases every GPU resource the view owns.
    pub fn cleanup(&mut self, device: &dyn Device) {
        self.release_targets(device);
        for buffer in self
            .camera_buffers
            .drain(..)
            .chain(self.dir_shadow_buffers.drain(..))
            .chain(self.picking.staging_buffers().to_vec())
        {
            device.queue_buffer_for_deletion(buffer);
        }
        for group in self
            .view_bind_groups
            .drain(..)
            .chain(self.jfa_bind_groups)
        {
            device.queue_bind_group_for_deletion(group);
        }
        self.picking.clear();
    }
}

fn create_targets(
    device: &dyn Device,
    width: u32,
    height: u32,
) -> Result<ViewTargets, RendererError> {
    let color = |format: Format, usage: TextureUsage, label: &'static str| {
        device.create_texture(&TextureDesc::d2(width, height, format, usage).with_label(label))
    };
    let attach_sampled =
        TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED | TextureUsage::INPUT_ATTACHMENT;
    Ok(ViewTargets {
        depth: color(
            Format::Depth32Float,
            TextureUsage::DEPTH_ATTACHMENT | TextureUsage::SAMPLED | TextureUsage::INPUT_ATTACHMENT,
            "View.depth",
        )?,
        output: color(Format::Rgba16Float, attach_sampled, "View.output")?,
        albedo: color(Format::Rgba8Unorm, attach_sampled, "View.albedo")?,
        normal: color(Format::Rgba16Float, attach_sampled, "View.normal")?,
        ao_metal_roughness: color(Format::Rgba8Unorm, attach_sampled, "View.ao_metal_roughness")?,
        outline_mask: [
            color(
                Format::Rgba16Float,
                TextureUsage::STORAGE | TextureUsage::SAMPLED,
                "View.outline_mask_0",
            )?,
            color(
                Format::Rgba16Float,
                TextureUsage::STORAGE | TextureUsage::SAMPLED,
                "View.outline_mask_1",
            )?,
        ],
        pick: color(
            Format::Rgba8Unorm,
            TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_SRC,
            "View.pick",
        )?,
        pick_depth: color(
            Format::Depth32Float,
            TextureUsage::DEPTH_ATTACHMENT,
            "View.pick_depth",
        )?,
        final_color: color(
            Format::Rgba8Unorm,
            TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED | TextureUsage::TRANSFER_SRC,
            "View.final",
        )?,
    })
}

fn create_passes(
    device: &dyn Device,
    layouts: &ViewPassLayouts,
    targets: &ViewTargets,
    width: u32,
    height: u32,
) -> Result<(RenderPassHandle, RenderPassHandle, RenderPassHandle), RendererError> {
    let geometry = device.create_render_pass(&RenderPassDesc {
        layout: layouts.geometry,
        dimensions: (width, height),
        attachments: vec![
            targets.depth,
            targets.output,
            targets.albedo,
            targets.normal,
            targets.ao_metal_roughness,
        ],
        label: Some("View.geometry_pass"),
    })?;
    let pick = device.create_render_pass(&RenderPassDesc {
        layout: layouts.pick,
        dimensions: (width, height),
        attachments: vec![targets.pick, targets.pick_depth],
        label: Some("View.pick_pass"),
    })?;
    let post = device.create_render_pass(&RenderPassDesc {
        layout: layouts.post,
        dimensions: (width, height),
        attachments: vec![targets.final_color, targets.depth],
        label: Some("View.post_pass"),
    })?;
    Ok((geometry, pick, post))
}
