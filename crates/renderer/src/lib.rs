//! Retained-mode renderer core. A [`Scene`] owns the component library,
//! the packed geometry buffers, material/bindless tables, lights, probes
//! and views; the [`Renderer`] builds the per-frame draw streams and runs
//! the pass graph (shadow atlas, probe capture, deferred G-buffer +
//! lighting + forward, selection outline, post-process) over the
//! backend-agnostic device interface.

use thiserror::Error;

use helio_gpu::GpuError;

mod bindless;
mod bvh;
mod camera;
mod culling;
mod gpu_types;
mod outline;
mod passes;
mod picking;
mod probes;
mod scene;
mod shadow_atlas;
mod shadows;
mod skinning;
mod staging;
mod view;

pub use bindless::{BindlessTables, MaterialTable, BINDLESS_CUBE_BINDING, BINDLESS_TEXTURE_BINDING};
pub use bvh::Bvh;
pub use camera::{Camera, CameraKind};
pub use culling::{cull_aabbs, plane_visibility_test, sat_visibility_test};
pub use gpu_types::{
    gpu_mat4, BindGroup0, DrawDynamicData, GpuLight, GpuLightShadowData, GpuMat4, GpuMaterial,
    GpuOmniShadowData, GpuProbeData, SkinDynamicData, MAX_SHADOW_CASCADES,
};
pub use outline::{final_target_index, pass_count as outline_pass_count, record_jump_flood};
pub use passes::{material_graphics_state, Renderer};
pub use picking::{encode_pick_id, PickState, PICK_RESULT_SIZE};
pub use probes::{mip_count, refresh_probe_data, select_probe_updates, ProbeSlot};
pub use scene::{Drawable, Scene, SceneDesc};
pub use shadow_atlas::{collect_shadow_rects, light_shadow_rect, pack_rects, PackedRect};
pub use shadows::{
    cascade_split_distances, compute_directional_cascades, directional_shadow_data,
    omni_face_viewport, point_shadow_data, CascadeSetup, DEFAULT_SPLIT_LAMBDA,
    OMNI_FACE_PITCH_YAW,
};
pub use skinning::{skin_vertex_streams, upload_joint_texture, SkinData, SKIN_WORKGROUP_SIZE};
pub use staging::{
    append_mesh_geometry, append_skin_source, attribute_mask, attribute_stride, skin_mask,
    skin_stride, StagedGeometry,
};
pub use view::{DebugDrawlists, DebugLine, View, ViewPassLayouts, ViewTargets};

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("bindless {0} texture table is full")]
    BindlessTableFull(&'static str),
    #[error("scene not finalized")]
    SceneNotFinalized,
    #[error(transparent)]
    Gpu(#[from] GpuError),
}
