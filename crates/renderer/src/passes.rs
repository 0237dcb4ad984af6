//! The per-frame graph. Submissions are strictly ordered on the GPU by a
//! timeline semaphore: skin upload → skinning compute → shadow atlas →
//! probe faces → per-view geometry (G-buffer → lighting → forward) → jump
//! flood → post-process → present. The CPU blocks only on culling jobs and
//! at present.

use std::sync::Arc;

use helio_core::{JobSystem, RuntimeOptions};
use helio_ecs::{Aabb, Entity, LightKind};
use helio_gpu::{
    Access, AttachmentDesc, BindGroupHandle, BindGroupLayoutDesc, BlendState, BufferBinding,
    BufferBindingKind, CommandBuffer, CompareOp, CullMode, Device, Draw, DrawStream,
    DynamicDataAllocator, Format, GpuError, GraphicsState, LoadOp, PipelineStages,
    RenderPassLayoutDesc, SemaphoreHandle, SemaphoreOp, ShaderManifest, ShaderStages,
    ShaderVariantCache, StoreOp, SubpassDesc, TextureBinding, TextureBindingKind, Scissor,
    Viewport,
};
use smallvec::SmallVec;

use crate::camera::Camera;
use crate::culling::cull_aabbs;
use crate::gpu_types::{gpu_mat4, BindGroup0, DrawDynamicData, SkinDynamicData};
use crate::outline::record_jump_flood;
use crate::picking::encode_pick_id;
use crate::probes::{refresh_probe_data, select_probe_updates, ProbeSlot};
use crate::scene::Scene;
use crate::shadow_atlas::{collect_shadow_rects, pack_rects};
use crate::shadows::{
    directional_shadow_data, omni_face_viewport, point_shadow_data, DEFAULT_SPLIT_LAMBDA,
};
use crate::skinning::{record_skin_dispatch, upload_joint_texture};
use crate::view::{View, ViewPassLayouts};
use crate::RendererError;

/// Pass-independent resources shared by every scene and view.
pub struct Renderer {
    device: Arc<dyn Device>,
    pub variants: ShaderVariantCache,
    dynamic: DynamicDataAllocator,
    timeline: SemaphoreHandle,
    timeline_value: u64,
    view_layouts: ViewPassLayouts,
    shadow_pass_layout: helio_gpu::RenderPassLayoutHandle,
    capture_pass_layout: helio_gpu::RenderPassLayoutHandle,
    capture_bind_layout: helio_gpu::BindGroupLayoutHandle,
    skin_io_layout: helio_gpu::BindGroupLayoutHandle,
    joint_texture_layout: helio_gpu::BindGroupLayoutHandle,
    stream: DrawStream,
    frame_count: u64,
    pub split_lambda: f32,
}

impl Renderer {
    pub fn new(device: Arc<dyn Device>, manifest: ShaderManifest) -> Result<Self, RendererError> {
        let geometry = device.create_render_pass_layout(&RenderPassLayoutDesc {
            attachments: vec![
                AttachmentDesc::depth(Format::Depth32Float),
                AttachmentDesc::color(Format::Rgba16Float),
                AttachmentDesc::color(Format::Rgba8Unorm),
                AttachmentDesc::color(Format::Rgba16Float),
                AttachmentDesc::color(Format::Rgba8Unorm),
            ],
            subpasses: vec![
                // G-buffer fill
                SubpassDesc {
                    color_attachments: vec![2, 3, 4],
                    input_attachments: vec![],
                    depth_attachment: Some(0),
                },
                // deferred lighting reads the G-buffer as input attachments
                SubpassDesc {
                    color_attachments: vec![1],
                    input_attachments: vec![2, 3, 4, 0],
                    depth_attachment: None,
                },
                // forward transparency on top of the lit output
                SubpassDesc {
                    color_attachments: vec![1],
                    input_attachments: vec![],
                    depth_attachment: Some(0),
                },
            ],
            label: Some("Renderer.geometry_layout"),
        })?;
        let pick = device.create_render_pass_layout(&RenderPassLayoutDesc {
            attachments: vec![
                AttachmentDesc::color(Format::Rgba8Unorm),
                AttachmentDesc::depth(Format::Depth32Float),
            ],
            subpasses: vec![SubpassDesc {
                color_attachments: vec![0],
                input_attachments: vec![],
                depth_attachment: Some(1),
            }],
            label: Some("Renderer.pick_layout"),
        })?;
        let post = device.create_render_pass_layout(&RenderPassLayoutDesc {
            attachments: vec![
                AttachmentDesc::color(Format::Rgba8Unorm),
                AttachmentDesc {
                    load: LoadOp::Load,
                    store: StoreOp::DontCare,
                    ..AttachmentDesc::depth(Format::Depth32Float)
                },
            ],
            subpasses: vec![SubpassDesc {
                color_attachments: vec![0],
                input_attachments: vec![],
                depth_attachment: Some(1),
            }],
            label: Some("Renderer.post_layout"),
        })?;
        let shadow_pass_layout = device.create_render_pass_layout(&RenderPassLayoutDesc {
            attachments: vec![AttachmentDesc::depth(Format::Depth32Float)],
            subpasses: vec![SubpassDesc {
                color_attachments: vec![],
                input_attachments: vec![],
                depth_attachment: Some(0),
            }],
            label: Some("Renderer.shadow_layout"),
        })?;
        let capture_pass_layout = device.create_render_pass_layout(&RenderPassLayoutDesc {
            attachments: vec![
                AttachmentDesc::color(Format::Rgba16Float),
                AttachmentDesc::depth(Format::Depth32Float),
            ],
            subpasses: vec![SubpassDesc {
                color_attachments: vec![0],
                input_attachments: vec![],
                depth_attachment: Some(1),
            }],
            label: Some("Renderer.capture_layout"),
        })?;

        let view_bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDesc {
            buffers: vec![
                BufferBinding {
                    slot: crate::view::VIEW_CAMERA_SLOT,
                    kind: BufferBindingKind::Uniform,
                    stages: ShaderStages::ALL,
                },
                BufferBinding {
                    slot: crate::view::VIEW_DIR_SHADOW_SLOT,
                    kind: BufferBindingKind::Storage,
                    stages: ShaderStages::FRAGMENT,
                },
                BufferBinding {
                    slot: crate::view::VIEW_POINT_SHADOW_SLOT,
                    kind: BufferBindingKind::Storage,
                    stages: ShaderStages::FRAGMENT,
                },
            ],
            textures: (crate::view::VIEW_INPUT_ALBEDO_SLOT..=crate::view::VIEW_INPUT_DEPTH_SLOT)
                .map(|slot| TextureBinding {
                    slot,
                    kind: TextureBindingKind::InputAttachment,
                    count: 1,
                    stages: ShaderStages::FRAGMENT,
                })
                .collect(),
            samplers: Vec::new(),
            label: Some("Renderer.view_layout"),
        })?;
        let jfa_bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDesc {
            textures: vec![
                TextureBinding {
                    slot: 0,
                    kind: TextureBindingKind::Storage,
                    count: 1,
                    stages: ShaderStages::COMPUTE,
                },
                TextureBinding {
                    slot: 1,
                    kind: TextureBindingKind::Storage,
                    count: 1,
                    stages: ShaderStages::COMPUTE,
                },
            ],
            ..Default::default()
        })?;
        let capture_bind_layout = device.create_bind_group_layout(&BindGroupLayoutDesc {
            buffers: vec![BufferBinding {
                slot: 0,
                kind: BufferBindingKind::Uniform,
                stages: ShaderStages::ALL,
            }],
            ..Default::default()
        })?;
        let skin_io_layout = device.create_bind_group_layout(&BindGroupLayoutDesc {
            buffers: vec![
                BufferBinding {
                    slot: 0,
                    kind: BufferBindingKind::Storage,
                    stages: ShaderStages::COMPUTE,
                },
                BufferBinding {
                    slot: 1,
                    kind: BufferBindingKind::Storage,
                    stages: ShaderStages::COMPUTE,
                },
                BufferBinding {
                    slot: 2,
                    kind: BufferBindingKind::Storage,
                    stages: ShaderStages::COMPUTE,
                },
            ],
            ..Default::default()
        })?;
        let joint_texture_layout = device.create_bind_group_layout(&BindGroupLayoutDesc {
            textures: vec![TextureBinding {
                slot: 0,
                kind: TextureBindingKind::Sampled,
                count: 1,
                stages: ShaderStages::COMPUTE,
            }],
            ..Default::default()
        })?;

        let timeline = device.create_semaphore()?;
        let frames = device.frames_in_flight();
        Ok(Self {
            device,
            variants: ShaderVariantCache::new(manifest),
            dynamic: DynamicDataAllocator::new(frames),
            timeline,
            timeline_value: 0,
            view_layouts: ViewPassLayouts {
                geometry,
                pick,
                post,
                view_bind_group_layout,
                jfa_bind_group_layout,
            },
            shadow_pass_layout,
            capture_pass_layout,
            capture_bind_layout,
            skin_io_layout,
            joint_texture_layout,
            stream: DrawStream::new(),
            frame_count: 0,
            split_lambda: DEFAULT_SPLIT_LAMBDA,
        })
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn view_layouts(&self) -> &ViewPassLayouts {
        &self.view_layouts
    }

    /// Creates the pass-dependent resources a freshly finalized scene
    /// needs: the shadow render pass over its atlas, per-skin bind groups,
    /// and a probe slot per probe component.
    pub fn prepare_scene(&mut self, scene: &mut Scene) -> Result<(), RendererError> {
        let device = self.device.clone();

        let (atlas_texture, atlas_resolution, _) = scene.shadow_atlas();
        if scene.shadow_pass.is_null() && !atlas_texture.is_null() {
            scene.shadow_pass = device.create_render_pass(&helio_gpu::RenderPassDesc {
                layout: self.shadow_pass_layout,
                dimensions: (atlas_resolution, atlas_resolution),
                attachments: vec![atlas_texture],
                label: Some("Scene.shadow_pass"),
            })?;
        }

        if scene.skin_io_bind_group.is_null() && !scene.skins.is_empty() {
            let (vertex_buffer, _, data_buffer, skin_buffer) = scene.geometry_buffers();
            let group = device.create_bind_group(&helio_gpu::BindGroupDesc {
                layout: self.skin_io_layout,
                label: Some("Scene.skin_io"),
            })?;
            device.update_bind_group(
                group,
                &helio_gpu::BindGroupUpdate {
                    buffers: vec![
                        helio_gpu::BufferWrite {
                            slot: 0,
                            buffer: skin_buffer,
                            offset: 0,
                            range: 0,
                        },
                        helio_gpu::BufferWrite {
                            slot: 1,
                            buffer: vertex_buffer,
                            offset: 0,
                            range: 0,
                        },
                        helio_gpu::BufferWrite {
                            slot: 2,
                            buffer: data_buffer,
                            offset: 0,
                            range: 0,
                        },
                    ],
                    ..Default::default()
                },
            )?;
            scene.skin_io_bind_group = group;
        }

        while scene.skin_joint_groups.len() < scene.skins.len() {
            let skin = &scene.skins[scene.skin_joint_groups.len()];
            let mut groups = Vec::with_capacity(skin.joint_textures.len());
            for texture in &skin.joint_textures {
                let group = device.create_bind_group(&helio_gpu::BindGroupDesc {
                    layout: self.joint_texture_layout,
                    label: Some("Scene.skin_joint_group"),
                })?;
                device.update_bind_group(
                    group,
                    &helio_gpu::BindGroupUpdate {
                        textures: vec![helio_gpu::TextureWrite {
                            slot: 0,
                            array_index: 0,
                            texture: *texture,
                        }],
                        ..Default::default()
                    },
                )?;
                groups.push(group);
            }
            scene.skin_joint_groups.push(groups);
        }

        let probe_entities: Vec<Entity> = {
            let key = scene.library.keys().environment_probe;
            let (_, entities) = scene.library.get_components(key);
            entities.to_vec()
        };
        for entity in probe_entities {
            if scene.probes.iter().any(|slot| slot.entity == entity) {
                continue;
            }
            let slot = ProbeSlot::new(
                device.as_ref(),
                &mut scene.bindless,
                self.capture_pass_layout,
                self.capture_bind_layout,
                &scene.library,
                entity,
            )?;
            scene.probes.push(slot);
        }
        Ok(())
    }

    pub fn create_view(
        &self,
        scene: &mut Scene,
        camera: Camera,
        width: u32,
        height: u32,
    ) -> Result<usize, RendererError> {
        let view = View::new(self.device.as_ref(), &self.view_layouts, camera, width, height)?;
        scene.views.push(view);
        Ok(scene.views.len() - 1)
    }

    pub fn resize_view(
        &self,
        scene: &mut Scene,
        view_index: usize,
        width: u32,
        height: u32,
    ) -> Result<(), RendererError> {
        let view = &mut scene.views[view_index];
        view.resize(self.device.as_ref(), &self.view_layouts, width, height)
    }

    pub fn cleanup_view(&self, scene: &mut Scene, view_index: usize) {
        if view_index < scene.views.len() {
            let mut view = scene.views.remove(view_index);
            view.cleanup(self.device.as_ref());
        }
    }

    pub fn cleanup_scene(&self, scene: &mut Scene) {
        for mut view in std::mem::take(&mut scene.views) {
            view.cleanup(self.device.as_ref());
        }
        scene.cleanup();
    }

    fn submit_ordered(&mut self, commands: CommandBuffer) -> Result<(), GpuError> {
        let wait_value = self.timeline_value;
        self.timeline_value += 1;
        self.device.submit(
            commands,
            &[SemaphoreOp {
                semaphore: self.timeline,
                value: wait_value,
            }],
            &[SemaphoreOp {
                semaphore: self.timeline,
                value: self.timeline_value,
            }],
        )
    }

    /// Runs one frame: updates scene GPU state, renders shadows, probes and
    /// every view, and presents. Runtime failures retry once after a
    /// swapchain resize, then abort the frame.
    #[profiling::function]
    pub fn render_frame(
        &mut self,
        scene: &mut Scene,
        jobs: &JobSystem,
        options: &RuntimeOptions,
    ) -> Result<(), RendererError> {
        match self.render_frame_inner(scene, jobs, options) {
            Ok(()) => Ok(()),
            Err(RendererError::Gpu(first)) => {
                tracing::warn!("frame submission failed ({first}), recreating swapchain");
                let io_size = scene
                    .views
                    .first()
                    .map(|v| v.dimensions())
                    .unwrap_or((1280, 720));
                self.device.resize_swapchain(io_size.0, io_size.1)?;
                self.render_frame_inner(scene, jobs, options).map_err(|err| {
                    tracing::error!("frame aborted after swapchain recreate: {err}");
                    err
                })
            }
            Err(other) => Err(other),
        }
    }

    fn render_frame_inner(
        &mut self,
        scene: &mut Scene,
        jobs: &JobSystem,
        options: &RuntimeOptions,
    ) -> Result<(), RendererError> {
        if !scene.is_finalized() {
            return Err(RendererError::SceneNotFinalized);
        }
        let device = self.device.clone();
        device.begin_frame()?;
        let frame_index = device.frame_index();
        self.frame_count += 1;
        self.dynamic.reset(frame_index);

        scene.update_transforms(frame_index)?;
        scene.update_lights(frame_index)?;
        scene.flush_materials()?;
        scene.update_bounds();
        // shadow cascades read the cached view matrices, so refresh the
        // cameras before any pass runs
        for view in &mut scene.views {
            view.camera.update();
        }

        self.upload_skins(scene, frame_index)?;
        self.dispatch_skinning(scene, frame_index)?;
        self.render_shadows(scene, frame_index, options)?;
        self.render_probes(scene, frame_index, options)?;

        for view_index in 0..scene.views.len() {
            self.render_view(scene, view_index, jobs, frame_index, options)?;
        }

        device.acquire_swapchain_texture()?;
        device.present().map_err(RendererError::Gpu)?;
        Ok(())
    }

    /// Copies every skin's joint matrices into its per-frame joint texture.
    fn upload_skins(&mut self, scene: &mut Scene, frame_index: u32) -> Result<(), RendererError> {
        if scene.skins.is_empty() {
            return Ok(());
        }
        let device = self.device.clone();
        let skin_key = scene.library.keys().skin;
        for skin_data in &scene.skins {
            let Some(skin) = scene.library.get_component(skin_key, skin_data.skin_entity) else {
                continue;
            };
            upload_joint_texture(device.as_ref(), skin_data, &skin.texture_data, frame_index)?;
        }
        // barrier-only submission keeps the upload ordered before the
        // skinning dispatches on the timeline
        let mut commands = CommandBuffer::new("skin_upload");
        commands.begin_blit_pass().barrier(
            PipelineStages::TRANSFER,
            Access::TRANSFER_WRITE,
            PipelineStages::COMPUTE,
            Access::SHADER_READ,
        );
        self.submit_ordered(commands)?;
        Ok(())
    }

    fn dispatch_skinning(
        &mut self,
        scene: &mut Scene,
        frame_index: u32,
    ) -> Result<(), RendererError> {
        if scene.skins.is_empty() {
            return Ok(());
        }
        let device = self.device.clone();
        let mut commands = CommandBuffer::new("skinning");
        {
            let mut encoder = commands.begin_compute_pass();
            for (index, skin_data) in scene.skins.iter().enumerate() {
                let dynamic_data = SkinDynamicData {
                    source_data_offset: skin_data.source_data_offset as i32,
                    dest_data_offset: skin_data.dest_data_offset as i32,
                    dest_vertex_offset: skin_data.dest_vertex_offset as i32,
                    vertex_count: skin_data.vertex_count,
                };
                let binding = self.dynamic.allocate(
                    device.as_ref(),
                    frame_index,
                    bytemuck::bytes_of(&dynamic_data),
                )?;
                let joint_group = scene
                    .skin_joint_groups
                    .get(index)
                    .and_then(|groups| groups.get(frame_index as usize))
                    .copied()
                    .unwrap_or(BindGroupHandle::NULL);
                record_skin_dispatch(
                    &mut encoder,
                    skin_data,
                    [scene.skin_io_bind_group, joint_group, BindGroupHandle::NULL],
                    binding,
                );
            }
            encoder.barrier(
                PipelineStages::COMPUTE,
                Access::SHADER_WRITE,
                PipelineStages::VERTEX | PipelineStages::COMPUTE,
                Access::SHADER_READ,
            );
        }
        self.submit_ordered(commands)?;
        Ok(())
    }

    /// Packs the shadow atlas and renders every shadow-casting light into
    /// it: per-view cascaded maps for directional lights, a 2×3 face grid
    /// for point lights, one square for spots. Rects that fail to pack
    /// lose their shadow for the frame.
    fn render_shadows(
        &mut self,
        scene: &mut Scene,
        frame_index: u32,
        options: &RuntimeOptions,
    ) -> Result<(), RendererError> {
        if scene.shadow_pass.is_null() {
            tracing::warn!("scene has no shadow pass (prepare_scene not run), skipping shadows");
            return Ok(());
        }
        let device = self.device.clone();
        let view_count = scene.views.len().max(1) as u32;
        let (_, atlas_resolution, atlas_slot) = scene.shadow_atlas();

        let lights: Vec<helio_ecs::Light> = {
            let key = scene.library.keys().light;
            let (components, _) = scene.library.get_components(key);
            components.to_vec()
        };
        scene.shadow_rects = collect_shadow_rects(&lights, view_count);
        if !pack_rects(atlas_resolution, atlas_resolution, &mut scene.shadow_rects) {
            let dropped = scene.shadow_rects.iter().filter(|r| !r.packed).count();
            tracing::error!(
                "shadow atlas overflow: dropping {dropped} shadow map(s) this frame"
            );
        }

        for view in &mut scene.views {
            view.dir_shadow_data.clear();
        }
        scene.point_shadow_data.clear();

        let mut commands = CommandBuffer::new("shadow_atlas");
        let shadow_shader = self.variants.get_variant(
            device.as_ref(),
            "shadow",
            GraphicsState {
                cull_mode: CullMode::Front,
                ..Default::default()
            },
            &[],
            Some(self.shadow_pass_layout),
            0,
        )?;

        {
            let mut encoder = commands.begin_render_pass(scene.shadow_pass);
            encoder.set_depth_bias(
                options.shadow_const_depth_bias,
                options.shadow_slope_depth_bias,
            );

            let mut last_light = u32::MAX;
            let mut light_view = 0usize;
            let rects = scene.shadow_rects.clone();
            for rect in &rects {
                if !rect.packed {
                    continue;
                }
                if rect.id == last_light {
                    light_view += 1;
                } else {
                    last_light = rect.id;
                    light_view = 0;
                }
                let light = &lights[rect.id as usize];
                match light.kind {
                    LightKind::Directional => {
                        let Some(view) = scene.views.get(light_view) else {
                            continue;
                        };
                        let camera = view.culling_camera.unwrap_or(view.camera);
                        let (shadow_data, setup) = directional_shadow_data(
                            &camera,
                            light,
                            rect,
                            atlas_resolution,
                            atlas_slot,
                            self.split_lambda,
                        );
                        let shadow_index = scene.views[light_view].dir_shadow_data.len() as i32;
                        if let Some(gpu_light) = scene.lights_gpu.get_mut(rect.id as usize) {
                            gpu_light.shadow_index = shadow_index;
                        }
                        scene.views[light_view].dir_shadow_data.push(shadow_data);

                        let multi_viewport = options.multi_viewport_shadows
                            && device.limits().multi_viewport;
                        for cascade in 0..setup.count {
                            let origin_x = rect.x + cascade * light.shadow_resolution;
                            let viewport = Viewport {
                                x: origin_x as f32,
                                y: rect.y as f32,
                                width: light.shadow_resolution as f32,
                                height: light.shadow_resolution as f32,
                            };
                            let scissor = Scissor {
                                x: origin_x as i32,
                                y: rect.y as i32,
                                width: light.shadow_resolution,
                                height: light.shadow_resolution,
                            };
                            if multi_viewport && cascade == 0 {
                                // one instanced submission covers all
                                // cascades through gl_ViewportIndex
                                let viewports: SmallVec<[Viewport; 6]> = (0..setup.count)
                                    .map(|c| Viewport {
                                        x: (rect.x + c * light.shadow_resolution) as f32,
                                        ..viewport
                                    })
                                    .collect();
                                encoder.set_viewports(&viewports);
                                self.record_shadow_draws(
                                    &device,
                                    scene,
                                    frame_index,
                                    shadow_shader,
                                    gpu_mat4(setup.view_projections[0]),
                                    setup.count,
                                )?;
                                self.stream_into(&mut encoder);
                                break;
                            }
                            encoder.set_viewports(&[viewport]);
                            encoder.set_scissors(&[scissor]);
                            self.record_shadow_draws(
                                &device,
                                scene,
                                frame_index,
                                shadow_shader,
                                gpu_mat4(setup.view_projections[cascade as usize]),
                                1,
                            )?;
                            self.stream_into(&mut encoder);
                        }
                    }
                    LightKind::Point => {
                        let (shadow_data, cameras) = point_shadow_data(
                            light,
                            rect,
                            atlas_resolution,
                            atlas_slot,
                            device.limits().cube_face_left_handed,
                        );
                        if let Some(gpu_light) = scene.lights_gpu.get_mut(rect.id as usize) {
                            gpu_light.shadow_index = scene.point_shadow_data.len() as i32;
                        }
                        scene.point_shadow_data.push(shadow_data);
                        for (face, camera) in cameras.iter().enumerate() {
                            let (x, y) =
                                omni_face_viewport(rect, light.shadow_resolution, face);
                            encoder.set_viewports(&[Viewport {
                                x: x as f32,
                                y: y as f32,
                                width: light.shadow_resolution as f32,
                                height: light.shadow_resolution as f32,
                            }]);
                            encoder.set_scissors(&[Scissor {
                                x: x as i32,
                                y: y as i32,
                                width: light.shadow_resolution,
                                height: light.shadow_resolution,
                            }]);
                            self.record_shadow_draws(
                                &device,
                                scene,
                                frame_index,
                                shadow_shader,
                                gpu_mat4(camera.view_projection()),
                                1,
                            )?;
                            self.stream_into(&mut encoder);
                        }
                    }
                    LightKind::Spot => {
                        let mut camera = Camera::perspective_reverse_z(
                            light.position,
                            light.outer_cone_angle * 2.0,
                            1.0,
                            light.radius.max(0.01),
                            light.range,
                        );
                        camera.look_at(light.position, light.position + light.direction);
                        camera.update();
                        // spot maps share the omni table
                        let shadow_data = crate::gpu_types::GpuOmniShadowData {
                            view_proj: [gpu_mat4(camera.view_projection()); 6],
                            factor: light.shadow_resolution as f32 / atlas_resolution as f32,
                            x_offset: rect.x as f32 / atlas_resolution as f32,
                            y_offset: rect.y as f32 / atlas_resolution as f32,
                            shadow_map_tex_idx: atlas_slot,
                        };
                        if let Some(gpu_light) = scene.lights_gpu.get_mut(rect.id as usize) {
                            gpu_light.shadow_index = scene.point_shadow_data.len() as i32;
                        }
                        scene.point_shadow_data.push(shadow_data);
                        encoder.set_viewports(&[Viewport {
                            x: rect.x as f32,
                            y: rect.y as f32,
                            width: rect.width as f32,
                            height: rect.height as f32,
                        }]);
                        encoder.set_scissors(&[Scissor {
                            x: rect.x as i32,
                            y: rect.y as i32,
                            width: rect.width,
                            height: rect.height,
                        }]);
                        self.record_shadow_draws(
                            &device,
                            scene,
                            frame_index,
                            shadow_shader,
                            gpu_mat4(camera.view_projection()),
                            1,
                        )?;
                        self.stream_into(&mut encoder);
                    }
                }
            }
            encoder.end();
        }
        self.submit_ordered(commands)?;

        scene.upload_point_shadow_data(frame_index)?;
        let point_shadow_buffer = scene.point_shadow_buffer(frame_index);
        for view_index in 0..scene.views.len() {
            scene.views[view_index].upload_dir_shadow_data(self.device.as_ref(), frame_index)?;
            scene.views[view_index].bind_point_shadow_buffer(
                self.device.as_ref(),
                frame_index,
                point_shadow_buffer,
            )?;
        }
        // shadow indices were patched while recording
        scene.upload_lights(frame_index)?;
        Ok(())
    }

    /// Records one draw per shadow-casting drawable into the pending
    /// stream. The light's view-projection rides in the dynamic block.
    fn record_shadow_draws(
        &mut self,
        device: &Arc<dyn Device>,
        scene: &Scene,
        frame_index: u32,
        shader: helio_gpu::ShaderHandle,
        light_view_proj: crate::gpu_types::GpuMat4,
        instance_multiplier: u32,
    ) -> Result<(), RendererError> {
        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct ShadowDynamicData {
            view_proj: crate::gpu_types::GpuMat4,
            draw: DrawDynamicData,
        }

        let (vertex_buffer, index_buffer, _, _) = scene.geometry_buffers();
        for drawable in scene.drawables() {
            if !drawable.cast_shadow || drawable.index_count == 0 {
                continue;
            }
            let dynamic_data = ShadowDynamicData {
                view_proj: light_view_proj,
                draw: DrawDynamicData {
                    data_offset: drawable.data_offset as i32,
                    vertex_offset: drawable.vertex_offset as i32,
                    material_offset: drawable.material_slot as i32,
                    global_index: 0,
                },
            };
            let binding =
                self.dynamic
                    .allocate(device.as_ref(), frame_index, bytemuck::bytes_of(&dynamic_data))?;
            self.stream.push(Draw {
                shader,
                bind_groups: [
                    scene.global_bind_group(),
                    BindGroupHandle::NULL,
                    BindGroupHandle::NULL,
                ],
                dynamic_buffer: binding.buffer,
                dynamic_offset: binding.offset,
                index_buffer,
                index_offset: drawable.index_offset,
                triangle_count: drawable.index_count / 3,
                vertex_buffer,
                vertex_offset: drawable.vertex_offset,
                instance_offset: drawable.transform_index,
                instance_count: drawable.instance_count * instance_multiplier,
            });
        }
        Ok(())
    }

    fn stream_into(&mut self, encoder: &mut helio_gpu::RenderEncoder<'_>) {
        encoder.draw_stream(&mut self.stream);
    }

    /// Captures every probe scheduled this frame: six face passes, cube
    /// assembly with mips, then the GGX / Lambertian / BRDF-LUT prefilter
    /// dispatches.
    fn render_probes(
        &mut self,
        scene: &mut Scene,
        frame_index: u32,
        options: &RuntimeOptions,
    ) -> Result<(), RendererError> {
        if !options.image_based_lighting {
            return Ok(());
        }
        let device = self.device.clone();
        let selected = {
            let Scene {
                library, probes, ..
            } = scene;
            select_probe_updates(library, probes)
        };
        if selected.is_empty() {
            return Ok(());
        }

        let capture_shader = self.variants.get_variant(
            device.as_ref(),
            "gbuffer_fill",
            GraphicsState::default(),
            &[],
            Some(self.capture_pass_layout),
            0,
        )?;
        let filter_shader = self
            .variants
            .get_compute_variant(device.as_ref(), "environment_filter", &[])?;
        let lut_shader = self
            .variants
            .get_compute_variant(device.as_ref(), "brdf_lut", &[])?;

        for probe_index in selected {
            let probe_component = {
                let Scene {
                    library, probes, ..
                } = scene;
                refresh_probe_data(library, &mut probes[probe_index])
            };
            let Some(probe_component) = probe_component else {
                continue;
            };
            let mut commands = CommandBuffer::new("probe_capture");
            let near = 0.1f32;
            let far = probe_component.range.max(near * 2.0);

            {
                let probe = &scene.probes[probe_index];
                let cameras = probe.face_cameras(near, far);
                for (face, camera) in cameras.iter().enumerate() {
                    let camera_data = BindGroup0 {
                        viewport_size: [
                            probe.resolution as f32,
                            probe.resolution as f32,
                            1.0 / probe.resolution as f32,
                            1.0 / probe.resolution as f32,
                        ],
                        viewport_info: [near, far, 0.0, 0.0],
                        camera_pos: camera.position.to_array(),
                        projection: gpu_mat4(camera.projection()),
                        view: gpu_mat4(camera.view()),
                        view_projection: gpu_mat4(camera.view_projection()),
                    };
                    device.write_buffer(
                        probe.face_camera_buffers[face],
                        0,
                        bytemuck::bytes_of(&camera_data),
                    )?;
                }
            }

            // face passes
            for face in 0..6 {
                let (pass, face_group) = {
                    let probe = &scene.probes[probe_index];
                    (probe.face_passes[face], probe.face_bind_groups[face])
                };
                let (vertex_buffer, index_buffer, _, _) = scene.geometry_buffers();
                let mut encoder = commands.begin_render_pass(pass);
                for drawable in scene.drawables() {
                    if drawable.index_count == 0 {
                        continue;
                    }
                    let dynamic_data = DrawDynamicData {
                        data_offset: drawable.data_offset as i32,
                        vertex_offset: drawable.vertex_offset as i32,
                        material_offset: drawable.material_slot as i32,
                        global_index: 0,
                    };
                    let binding = self.dynamic.allocate(
                        device.as_ref(),
                        frame_index,
                        bytemuck::bytes_of(&dynamic_data),
                    )?;
                    self.stream.push(Draw {
                        shader: capture_shader,
                        bind_groups: [
                            scene.global_bind_group(),
                            face_group,
                            BindGroupHandle::NULL,
                        ],
                        dynamic_buffer: binding.buffer,
                        dynamic_offset: binding.offset,
                        index_buffer,
                        index_offset: drawable.index_offset,
                        triangle_count: drawable.index_count / 3,
                        vertex_buffer,
                        vertex_offset: drawable.vertex_offset,
                        instance_offset: drawable.transform_index,
                        instance_count: drawable.instance_count,
                    });
                }
                encoder.draw_stream(&mut self.stream);
                encoder.end();
            }

            // assemble the cube and prefilter
            {
                let probe = &scene.probes[probe_index];
                let mut blit = commands.begin_blit_pass();
                for face in 0..6 {
                    blit.copy_texture_to_texture(probe.face_color[face], 0, probe.capture_cube, face as u32, 0);
                }
                blit.generate_mipmaps(probe.capture_cube);
                blit.barrier(
                    PipelineStages::TRANSFER,
                    Access::TRANSFER_WRITE,
                    PipelineStages::COMPUTE,
                    Access::SHADER_READ,
                );
            }
            {
                #[repr(C)]
                #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
                struct FilterData {
                    resolution: u32,
                    mip: u32,
                    mip_count: u32,
                    samples: u32,
                    distribution: u32, // 0 = GGX, 1 = Lambertian
                    _padding: [u32; 3],
                }
                let (resolution, samples, mips) = {
                    let probe = &scene.probes[probe_index];
                    (
                        probe.resolution,
                        probe.samples,
                        crate::probes::mip_count(probe.resolution),
                    )
                };
                let mut encoder = commands.begin_compute_pass();
                for mip in 0..mips {
                    let data = FilterData {
                        resolution,
                        mip,
                        mip_count: mips,
                        samples,
                        distribution: 0,
                        _padding: [0; 3],
                    };
                    let binding = self.dynamic.allocate(
                        device.as_ref(),
                        frame_index,
                        bytemuck::bytes_of(&data),
                    )?;
                    let groups = ((resolution >> mip).max(1)).div_ceil(8).max(1);
                    encoder.dispatch(
                        filter_shader,
                        [scene.global_bind_group(), BindGroupHandle::NULL, BindGroupHandle::NULL],
                        binding.buffer,
                        binding.offset,
                        [groups, groups, 6],
                    );
                }
                let lambertian = FilterData {
                    resolution: resolution.min(64),
                    mip: 0,
                    mip_count: 1,
                    samples,
                    distribution: 1,
                    _padding: [0; 3],
                };
                let binding = self.dynamic.allocate(
                    device.as_ref(),
                    frame_index,
                    bytemuck::bytes_of(&lambertian),
                )?;
                let groups = resolution.min(64).div_ceil(8).max(1);
                encoder.dispatch(
                    filter_shader,
                    [scene.global_bind_group(), BindGroupHandle::NULL, BindGroupHandle::NULL],
                    binding.buffer,
                    binding.offset,
                    [groups, groups, 6],
                );
                let lut_binding = self.dynamic.allocate(
                    device.as_ref(),
                    frame_index,
                    bytemuck::bytes_of(&FilterData {
                        resolution: 512,
                        mip: 0,
                        mip_count: 1,
                        samples,
                        distribution: 0,
                        _padding: [0; 3],
                    }),
                )?;
                encoder.dispatch(
                    lut_shader,
                    [scene.global_bind_group(), BindGroupHandle::NULL, BindGroupHandle::NULL],
                    lut_binding.buffer,
                    lut_binding.offset,
                    [512 / 8, 512 / 8, 1],
                );
                encoder.barrier(
                    PipelineStages::COMPUTE,
                    Access::SHADER_WRITE,
                    PipelineStages::FRAGMENT,
                    Access::SHADER_READ,
                );
            }
            self.submit_ordered(commands)?;
        }
        Ok(())
    }

    /// Culls, buckets and renders one view: G-buffer fill, deferred
    /// lighting, forward + skybox, debug drawlists, the picking pass and
    /// read-back copy, the jump-flood outline and the post-process.
    fn render_view(
        &mut self,
        scene: &mut Scene,
        view_index: usize,
        jobs: &JobSystem,
        frame_index: u32,
        options: &RuntimeOptions,
    ) -> Result<(), RendererError> {
        let device = self.device.clone();

        // resolve matured pick read-backs first: stale indices must be
        // checked against the *current* generations
        {
            let dims = scene.views[view_index].dimensions();
            let Scene { library, views, .. } = scene;
            views[view_index].picking.resolve(
                device.as_ref(),
                library,
                self.frame_count,
                device.frames_in_flight() as u64,
                dims,
            );
        }

        scene.views[view_index].update_camera(device.as_ref(), frame_index)?;

        // parallel SAT culling against the view (or override) camera
        let (visible_deferred, visible_forward) = {
            let view = &scene.views[view_index];
            let camera = view.culling_camera.unwrap_or(view.camera);
            let aabbs = Arc::new(scene.drawable_aabbs().to_vec());
            let visibility = cull_aabbs(jobs, &camera, aabbs);
            let mut deferred = Vec::new();
            let mut forward = Vec::new();
            for (index, drawable) in scene.drawables().iter().enumerate() {
                if !visibility.get(index).copied().unwrap_or(false) {
                    continue;
                }
                if drawable.forward {
                    forward.push(index as u32);
                } else {
                    deferred.push(index as u32);
                }
            }
            (deferred, forward)
        };
        scene.views[view_index].visible_deferred = visible_deferred;
        scene.views[view_index].visible_forward = visible_forward;

        let lighting_constants = [
            options.punctual_lighting as i32,
            options.image_based_lighting as i32,
        ];
        let lighting_shader = self.variants.get_variant(
            device.as_ref(),
            "deferred_lighting",
            GraphicsState {
                depth_write: false,
                depth_test: CompareOp::Always,
                cull_mode: CullMode::None,
                ..Default::default()
            },
            bytemuck::cast_slice(&lighting_constants),
            Some(self.view_layouts.geometry),
            1,
        )?;
        let forward_shader = self.variants.get_variant(
            device.as_ref(),
            "forward",
            GraphicsState {
                depth_write: false,
                blend: BlendState::Alpha,
                wireframe: options.wireframe,
                ..Default::default()
            },
            bytemuck::cast_slice(&lighting_constants),
            Some(self.view_layouts.geometry),
            2,
        )?;

        let mut commands = CommandBuffer::new("view_geometry");
        {
            let view = &scene.views[view_index];
            let view_group = view.view_bind_groups[frame_index as usize];
            let (vertex_buffer, index_buffer, _, _) = scene.geometry_buffers();
            let (width, height) = view.dimensions();

            let mut encoder = commands.begin_render_pass(view.geometry_pass);
            encoder.set_viewports(&[Viewport {
                x: 0.0,
                y: 0.0,
                width: width as f32,
                height: height as f32,
            }]);
            encoder.set_scissors(&[Scissor {
                x: 0,
                y: 0,
                width,
                height,
            }]);

            // subpass 0: G-buffer fill
            for index in &view.visible_deferred {
                let drawable = &scene.drawables()[*index as usize];
                if drawable.instance_count == 0 || drawable.index_count == 0 {
                    continue;
                }
                let selected = view.selection.contains(&drawable.entity);
                let dynamic_data = DrawDynamicData {
                    data_offset: drawable.data_offset as i32,
                    vertex_offset: drawable.vertex_offset as i32,
                    material_offset: drawable.material_slot as i32,
                    global_index: 0,
                };
                let binding = self.dynamic.allocate(
                    device.as_ref(),
                    frame_index,
                    bytemuck::bytes_of(&dynamic_data),
                )?;
                // stencil-marked variants of selected drawables seed the
                // outline mask
                let state = GraphicsState {
                    stencil_write: selected,
                    ..material_graphics_state(drawable.double_sided, options.wireframe)
                };
                let shader = self.variants.get_variant(
                    device.as_ref(),
                    "gbuffer_fill",
                    state,
                    &[],
                    Some(self.view_layouts.geometry),
                    0,
                )?;
                self.stream.push(Draw {
                    shader,
                    bind_groups: [
                        scene.global_bind_group(),
                        view_group,
                        BindGroupHandle::NULL,
                    ],
                    dynamic_buffer: binding.buffer,
                    dynamic_offset: binding.offset,
                    index_buffer,
                    index_offset: drawable.index_offset,
                    triangle_count: drawable.index_count / 3,
                    vertex_buffer,
                    vertex_offset: drawable.vertex_offset,
                    instance_offset: drawable.transform_index,
                    instance_count: drawable.instance_count,
                });
            }
            encoder.draw_stream(&mut self.stream);

            // subpass 1: full-screen deferred lighting
            encoder.next_subpass();
            self.stream.push(Draw {
                shader: lighting_shader,
                bind_groups: [scene.global_bind_group(), view_group, BindGroupHandle::NULL],
                triangle_count: 2,
                instance_count: 1,
                ..Default::default()
            });
            encoder.draw_stream(&mut self.stream);

            // subpass 2: skybox then forward drawables
            encoder.next_subpass();
            if scene.skybox_cube.is_some() {
                let skybox_shader = self.variants.get_variant(
                    device.as_ref(),
                    "skybox",
                    GraphicsState {
                        depth_write: false,
                        depth_test: CompareOp::GreaterOrEqual,
                        cull_mode: CullMode::None,
                        ..Default::default()
                    },
                    &[],
                    Some(self.view_layouts.geometry),
                    2,
                )?;
                self.stream.push(Draw {
                    shader: skybox_shader,
                    bind_groups: [scene.global_bind_group(), view_group, BindGroupHandle::NULL],
                    triangle_count: 2,
                    instance_count: 1,
                    ..Default::default()
                });
            }
            for index in &view.visible_forward {
                let drawable = &scene.drawables()[*index as usize];
                if drawable.instance_count == 0 || drawable.index_count == 0 {
                    continue;
                }
                let dynamic_data = DrawDynamicData {
                    data_offset: drawable.data_offset as i32,
                    vertex_offset: drawable.vertex_offset as i32,
                    material_offset: drawable.material_slot as i32,
                    global_index: 0,
                };
                let binding = self.dynamic.allocate(
                    device.as_ref(),
                    frame_index,
                    bytemuck::bytes_of(&dynamic_data),
                )?;
                self.stream.push(Draw {
                    shader: forward_shader,
                    bind_groups: [
                        scene.global_bind_group(),
                        view_group,
                        BindGroupHandle::NULL,
                    ],
                    dynamic_buffer: binding.buffer,
                    dynamic_offset: binding.offset,
                    index_buffer,
                    index_offset: drawable.index_offset,
                    triangle_count: drawable.index_count / 3,
                    vertex_buffer,
                    vertex_offset: drawable.vertex_offset,
                    instance_offset: drawable.transform_index,
                    instance_count: drawable.instance_count,
                });
            }
            encoder.draw_stream(&mut self.stream);
            encoder.end();
        }

        // picking pass and read-back copy
        let pick_request = scene.views[view_index].picking.take_request();
        if let Some((pick_x, pick_y)) = pick_request {
            let pick_shader = self.variants.get_variant(
                device.as_ref(),
                "picking",
                GraphicsState::default(),
                &[],
                Some(self.view_layouts.pick),
                0,
            )?;
            let view = &scene.views[view_index];
            let (width, height) = view.dimensions();
            let view_group = view.view_bind_groups[frame_index as usize];
            let (vertex_buffer, index_buffer, _, _) = scene.geometry_buffers();
            let mut encoder = commands.begin_render_pass(view.pick_pass);
            let visible = view
                .visible_deferred
                .iter()
                .chain(&view.visible_forward)
                .copied()
                .collect::<Vec<u32>>();
            for index in visible {
                let drawable = &scene.drawables()[index as usize];
                let dynamic_data = DrawDynamicData {
                    data_offset: drawable.data_offset as i32,
                    vertex_offset: drawable.vertex_offset as i32,
                    material_offset: drawable.material_slot as i32,
                    global_index: encode_pick_id(drawable.entity) as i32,
                };
                let binding = self.dynamic.allocate(
                    device.as_ref(),
                    frame_index,
                    bytemuck::bytes_of(&dynamic_data),
                )?;
                self.stream.push(Draw {
                    shader: pick_shader,
                    bind_groups: [
                        scene.global_bind_group(),
                        view_group,
                        BindGroupHandle::NULL,
                    ],
                    dynamic_buffer: binding.buffer,
                    dynamic_offset: binding.offset,
                    index_buffer,
                    index_offset: drawable.index_offset,
                    triangle_count: drawable.index_count / 3,
                    vertex_buffer,
                    vertex_offset: drawable.vertex_offset,
                    instance_offset: drawable.transform_index,
                    instance_count: drawable.instance_count,
                });
            }
            encoder.draw_stream(&mut self.stream);
            encoder.end();

            let staging_slot = frame_index;
            let staging =
                view.picking.staging_buffers()[staging_slot as usize];
            let mut blit = commands.begin_blit_pass();
            let x = pick_x.min(width.saturating_sub(1));
            let y = pick_y.min(height.saturating_sub(1));
            blit.copy_texture_to_buffer(view.targets.pick, (x, y), (1, 1), staging, 0);
            scene.views[view_index].picking.mark_dispatched(
                self.frame_count,
                staging_slot,
                (width, height),
            );
        }

        // selection outline: seed + jump-flood ping-pong
        if !scene.views[view_index].selection.is_empty() {
            let seed_shader = self
                .variants
                .get_compute_variant(device.as_ref(), "uvmap", &[])?;
            let jfa_shader = self
                .variants
                .get_compute_variant(device.as_ref(), "jumpfloodalgo", &[])?;
            let view = &scene.views[view_index];
            let (width, height) = view.dimensions();
            {
                let mut encoder = commands.begin_compute_pass();
                let seed_binding = self.dynamic.allocate(
                    device.as_ref(),
                    frame_index,
                    bytemuck::cast_slice(&[width, height, 0u32, 0u32]),
                )?;
                encoder.dispatch(
                    seed_shader,
                    [
                        view.jfa_bind_groups[0],
                        view.view_bind_groups[frame_index as usize],
                        BindGroupHandle::NULL,
                    ],
                    seed_binding.buffer,
                    seed_binding.offset,
                    [width.div_ceil(8).max(1), height.div_ceil(8).max(1), 1],
                );
                encoder.barrier(
                    PipelineStages::COMPUTE,
                    Access::SHADER_WRITE,
                    PipelineStages::COMPUTE,
                    Access::SHADER_READ,
                );
            }
            record_jump_flood(
                device.as_ref(),
                &mut commands,
                &mut self.dynamic,
                frame_index,
                jfa_shader,
                view.jfa_bind_groups,
                width,
                height,
            )?;
        }

        // post-process: tonemap + outline mix, then gizmo overlay
        {
            let post_shader = self.variants.get_variant(
                device.as_ref(),
                "post_process",
                GraphicsState {
                    depth_write: false,
                    depth_test: CompareOp::Always,
                    cull_mode: CullMode::None,
                    ..Default::default()
                },
                &[],
                Some(self.view_layouts.post),
                0,
            )?;
            let view = &scene.views[view_index];
            let view_group = view.view_bind_groups[frame_index as usize];
            let mut encoder = commands.begin_render_pass(view.post_pass);
            let post_binding = self.dynamic.allocate(
                device.as_ref(),
                frame_index,
                bytemuck::cast_slice(&[options.outline_width, 0.0f32, 0.0, 0.0]),
            )?;
            self.stream.push(Draw {
                shader: post_shader,
                bind_groups: [scene.global_bind_group(), view_group, BindGroupHandle::NULL],
                dynamic_buffer: post_binding.buffer,
                dynamic_offset: post_binding.offset,
                triangle_count: 2,
                instance_count: 1,
                ..Default::default()
            });
            encoder.draw_stream(&mut self.stream);

            // gizmo drawlist overlays with depth test against the scene
            if !view.drawlists.gizmo.is_empty() || !view.drawlists.world.is_empty() {
                let line_shader = self.variants.get_variant(
                    device.as_ref(),
                    "debug_lines",
                    GraphicsState {
                        depth_write: false,
                        cull_mode: CullMode::None,
                        ..Default::default()
                    },
                    &[],
                    Some(self.view_layouts.post),
                    0,
                )?;
                let mut vertices: Vec<[f32; 8]> = Vec::new();
                for line in view.drawlists.world.iter().chain(&view.drawlists.gizmo) {
                    for point in [line.from, line.to] {
                        vertices.push([
                            point.x,
                            point.y,
                            point.z,
                            1.0,
                            line.color.x,
                            line.color.y,
                            line.color.z,
                            line.color.w,
                        ]);
                    }
                }
                let binding = self.dynamic.allocate(
                    device.as_ref(),
                    frame_index,
                    bytemuck::cast_slice(&vertices),
                )?;
                self.stream.push(Draw {
                    shader: line_shader,
                    bind_groups: [scene.global_bind_group(), view_group, BindGroupHandle::NULL],
                    dynamic_buffer: binding.buffer,
                    dynamic_offset: binding.offset,
                    triangle_count: vertices.len() as u32 / 2,
                    instance_count: 1,
                    ..Default::default()
                });
            }
            encoder.draw_stream(&mut self.stream);
            encoder.end();
        }

        scene.views[view_index].drawlists.clear();
        self.submit_ordered(commands)?;
        Ok(())
    }

    /// Debug drawlist helpers: world AABB boxes for the selection and the
    /// probes, plus a world origin cross, per the runtime options.
    pub fn push_debug_geometry(&self, scene: &mut Scene, view_index: usize, options: &RuntimeOptions) {
        use glam::{vec3, Vec4};
        let selection_boxes: Vec<Aabb> = if options.show_selected_bbox {
            let Scene {
                library,
                views,
                ..
            } = scene;
            let keys = *library.keys();
            views[view_index]
                .selection
                .iter()
                .filter_map(|entity| {
                    library
                        .get_component(keys.object, *entity)
                        .map(|o| o.world_aabb)
                })
                .collect()
        } else {
            Vec::new()
        };
        let probe_positions: Vec<glam::Vec3> = if options.show_probes {
            scene
                .probes
                .iter()
                .map(|p| glam::Vec3::from_array([p.gpu.position[0], p.gpu.position[1], p.gpu.position[2]]))
                .collect()
        } else {
            Vec::new()
        };

        let view = &mut scene.views[view_index];
        for aabb in selection_boxes {
            push_aabb_lines(&mut view.drawlists.selection, &aabb, Vec4::new(1.0, 0.6, 0.1, 1.0));
        }
        for position in probe_positions {
            let aabb = Aabb::from_center_radius(position, 0.25);
            push_aabb_lines(&mut view.drawlists.world, &aabb, Vec4::new(0.2, 0.8, 1.0, 1.0));
        }
        if options.show_origin {
            for (axis, color) in [
                (vec3(1.0, 0.0, 0.0), Vec4::new(1.0, 0.0, 0.0, 1.0)),
                (vec3(0.0, 1.0, 0.0), Vec4::new(0.0, 1.0, 0.0, 1.0)),
                (vec3(0.0, 0.0, 1.0), Vec4::new(0.0, 0.0, 1.0, 1.0)),
            ] {
                view.drawlists.gizmo.push(crate::view::DebugLine {
                    from: glam::Vec3::ZERO,
                    to: axis,
                    color,
                });
            }
        }
    }
}

fn push_aabb_lines(list: &mut Vec<crate::view::DebugLine>, aabb: &Aabb, color: glam::Vec4) {
    if aabb.is_empty() {
        return;
    }
    let c = aabb.corners();
    // bottom ring, top ring, verticals
    let edges = [
        (0, 1),
        (1, 4),
        (4, 2),
        (2, 0),
        (3, 5),
        (5, 7),
        (7, 6),
        (6, 3),
        (0, 3),
        (1, 5),
        (4, 7),
        (2, 6),
    ];
    for (a, b) in edges {
        list.push(crate::view::DebugLine {
            from: c[a],
            to: c[b],
            color,
        });
    }
}

/// Graphics state for a material-driven draw.
pub fn material_graphics_state(double_sided: bool, wireframe: bool) -> GraphicsState {
    GraphicsState {
        cull_mode: if double_sided {
            CullMode::None
        } else {
            CullMode::Back
        },
        wireframe,
        ..Default::default()
    }
}
