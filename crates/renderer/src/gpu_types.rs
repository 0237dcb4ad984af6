//! GPU-visible structs. Layouts are bit-exact contracts with the shaders;
//! fields are ordered to match the shader-side declarations, not Rust
//! conventions.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

pub const MAX_SHADOW_CASCADES: usize = 4;

/// Column-major matrix as raw floats. `glam::Mat4` is SIMD-aligned, which
/// would insert padding into these layouts; the raw form keeps them packed
/// exactly as the shaders declare them.
pub type GpuMat4 = [[f32; 4]; 4];

pub fn gpu_mat4(m: Mat4) -> GpuMat4 {
    m.to_cols_array_2d()
}

const GPU_MAT4_IDENTITY: GpuMat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub metallic: f32,
    pub roughness: f32,
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub alpha_cutoff: f32,
    pub occlusion_strength: f32,
    pub emissive_strength: f32,
    pub uv_set_indices: [i32; 5],
    pub bindless_tex_indices: [i32; 5],
}

impl Default for GpuMaterial {
    fn default() -> Self {
        Self {
            metallic: 1.0,
            roughness: 1.0,
            base_color: [1.0; 4],
            emissive: [0.0; 3],
            alpha_cutoff: 0.5,
            occlusion_strength: 1.0,
            emissive_strength: 1.0,
            uv_set_indices: [0; 5],
            bindless_tex_indices: [-1; 5],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    pub intensity: f32,
    pub range: f32,
    pub position: [f32; 3],
    pub direction: [f32; 3],
    pub color: [f32; 3],
    pub shadow_index: i32,
    pub cast_shadow: i32,
    pub cascade_count: i32,
    pub light_type: i32,
    pub inner_cone_cos: f32,
    pub outer_cone_cos: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuLightShadowData {
    pub cascade_view_proj: [GpuMat4; MAX_SHADOW_CASCADES],
    pub cascade_splits: [f32; MAX_SHADOW_CASCADES],
    pub factor: f32,
    pub x_offset: f32,
    pub y_offset: f32,
    pub shadow_map_tex_idx: i32,
}

impl Default for GpuLightShadowData {
    fn default() -> Self {
        Self {
            cascade_view_proj: [GPU_MAT4_IDENTITY; MAX_SHADOW_CASCADES],
            cascade_splits: [0.0; MAX_SHADOW_CASCADES],
            factor: 0.0,
            x_offset: 0.0,
            y_offset: 0.0,
            shadow_map_tex_idx: -1,
        }
    }
}

/// Point-light shadow table entry: one view-projection per cube face, in
/// the 2×3 atlas layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuOmniShadowData {
    pub view_proj: [GpuMat4; 6],
    pub factor: f32,
    pub x_offset: f32,
    pub y_offset: f32,
    pub shadow_map_tex_idx: i32,
}

impl Default for GpuOmniShadowData {
    fn default() -> Self {
        Self {
            view_proj: [GPU_MAT4_IDENTITY; 6],
            factor: 0.0,
            x_offset: 0.0,
            y_offset: 0.0,
            shadow_map_tex_idx: -1,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuProbeData {
    pub position: [f32; 3],
    pub range_sqr: f32,
    pub ggx_env: i32,
    pub lambertian_env: i32,
    pub ggx_lut: i32,
    pub aabb_min: [f32; 4],
    pub aabb_max: [f32; 4],
    pub parallax_correction: i32,
}

/// Global per-view uniform block, bind group 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BindGroup0 {
    pub viewport_size: [f32; 4],
    pub viewport_info: [f32; 4],
    pub camera_pos: [f32; 3],
    pub projection: GpuMat4,
    pub view: GpuMat4,
    pub view_projection: GpuMat4,
}

impl Default for BindGroup0 {
    fn default() -> Self {
        Self {
            viewport_size: [0.0; 4],
            viewport_info: [0.0; 4],
            camera_pos: [0.0; 3],
            projection: GPU_MAT4_IDENTITY,
            view: GPU_MAT4_IDENTITY,
            view_projection: GPU_MAT4_IDENTITY,
        }
    }
}

/// Per-draw dynamic uniform block shared by the G-buffer, forward and
/// shadow paths.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct DrawDynamicData {
    pub data_offset: i32,
    pub vertex_offset: i32,
    pub material_offset: i32,
    pub global_index: i32,
}

/// Per-dispatch dynamic block for the skinning compute pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct SkinDynamicData {
    pub source_data_offset: i32,
    pub dest_data_offset: i32,
    pub dest_vertex_offset: i32,
    pub vertex_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_shader_contracts() {
        assert_eq!(std::mem::size_of::<GpuMaterial>(), 88);
        assert_eq!(std::mem::size_of::<GpuLight>(), 68);
        assert_eq!(
            std::mem::size_of::<GpuLightShadowData>(),
            64 * MAX_SHADOW_CASCADES + 4 * MAX_SHADOW_CASCADES + 16
        );
        assert_eq!(std::mem::size_of::<GpuProbeData>(), 64);
        assert_eq!(std::mem::size_of::<BindGroup0>(), 44 + 3 * 64);
        assert_eq!(std::mem::size_of::<DrawDynamicData>(), 16);
    }
}
