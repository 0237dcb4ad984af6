//! GPU skinning. Each skinned mesh keeps its pre-skin vertex streams in a
//! separate source buffer; one compute dispatch per mesh transforms them by
//! the joint texture and writes the results over the mesh's slots in the
//! scene's position and attribute buffers, so every later pass reads
//! skinned geometry with no second vertex layout.

use glam::{Mat4, Vec4};
use helio_ecs::{Entity, VertexStreamMask};
use helio_gpu::{
    ComputeEncoder, ComputeShaderHandle, Device, DynamicBinding, Format, GpuError, TextureDesc,
    TextureHandle, TextureUsage, ShaderVariantCache,
};

use crate::staging::{attribute_mask, attribute_stride, skin_mask, skin_stride};

pub const SKIN_WORKGROUP_SIZE: u32 = 256;

/// Per-skinned-drawable data created at scene finalize.
pub struct SkinData {
    pub skin_entity: Entity,
    pub vertex_count: u32,
    pub source_data_offset: u32,
    pub dest_data_offset: u32,
    pub dest_vertex_offset: u32,
    pub texture_width: u32,
    /// One joint texture per frame in flight.
    pub joint_textures: Vec<TextureHandle>,
    pub shader: ComputeShaderHandle,
}

impl SkinData {
    /// Creates the joint textures and resolves the skinning shader variant
    /// specialized on the source/destination stream layouts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &dyn Device,
        variants: &mut ShaderVariantCache,
        skin_entity: Entity,
        joint_count: usize,
        stream_mask: VertexStreamMask,
        vertex_count: u32,
        source_data_offset: u32,
        dest_data_offset: u32,
        dest_vertex_offset: u32,
    ) -> Result<Self, GpuError> {
        // joint + normal matrix per joint, 8 texels of RGBA32F each
        let texture_width = (((joint_count * 8) as f32).sqrt().ceil()) as u32;
        let texture_width = texture_width.max(1);
        let joint_textures = (0..device.frames_in_flight())
            .map(|_| {
                device.create_texture(
                    &TextureDesc::d2(
                        texture_width,
                        texture_width,
                        Format::Rgba32Float,
                        TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
                    )
                    .with_label("Scene.joint_texture"),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let source_mask = skin_mask(stream_mask);
        let dest_mask = attribute_mask(stream_mask);
        let constants = [
            source_mask.bits() as i32,
            skin_stride(stream_mask) as i32,
            dest_mask.bits() as i32,
            attribute_stride(stream_mask) as i32,
        ];
        let shader =
            variants.get_compute_variant(device, "skinning", bytemuck::cast_slice(&constants))?;

        Ok(Self {
            skin_entity,
            vertex_count,
            source_data_offset,
            dest_data_offset,
            dest_vertex_offset,
            texture_width,
            joint_textures,
            shader,
        })
    }
}

/// Uploads this frame's joint matrices into the skin's joint texture slot.
pub fn upload_joint_texture(
    device: &dyn Device,
    skin_data: &SkinData,
    texture_data: &[Mat4],
    frame_index: u32,
) -> Result<(), GpuError> {
    let texel_count = (skin_data.texture_width * skin_data.texture_width) as usize;
    let mut texels = vec![[0.0f32; 4]; texel_count];
    for (m, matrix) in texture_data.iter().enumerate() {
        let columns = matrix.to_cols_array_2d();
        for (c, column) in columns.iter().enumerate() {
            let texel = m * 4 + c;
            if texel < texel_count {
                texels[texel] = *column;
            }
        }
    }
    device.write_texture(
        skin_data.joint_textures[frame_index as usize],
        bytemuck::cast_slice(&texels),
    )
}

/// Records the skinning dispatch for one mesh.
pub fn record_skin_dispatch(
    encoder: &mut ComputeEncoder<'_>,
    skin_data: &SkinData,
    bind_groups: [helio_gpu::BindGroupHandle; 3],
    dynamic: DynamicBinding,
) {
    let groups = skin_data.vertex_count.div_ceil(SKIN_WORKGROUP_SIZE);
    encoder.dispatch(
        skin_data.shader,
        bind_groups,
        dynamic.buffer,
        dynamic.offset,
        [groups.max(1), 1, 1],
    );
}

/// CPU reference for the skinning kernel: reads the packed source streams,
/// applies the blended joint matrices, and writes positions plus packed
/// normal/tangent slots the same way the compute shader does. The joint
/// matrix table is `(joint, normal)` pairs, as produced by the skin update.
#[allow(clippy::too_many_arguments)]
pub fn skin_vertex_streams(
    source: &[Vec4],
    source_offset: u32,
    stream_mask: VertexStreamMask,
    joint_pairs: &[Mat4],
    vertex_count: u32,
    positions: &mut [Vec4],
    dest_vertex_offset: u32,
    data: &mut [Vec4],
    dest_data_offset: u32,
) {
    let src_stride = skin_stride(stream_mask) as usize;
    let dst_stride = attribute_stride(stream_mask) as usize;
    let src_mask = skin_mask(stream_mask);

    let slot = |stream: VertexStreamMask| -> Option<usize> {
        use crate::staging::SKIN_STREAMS;
        if !src_mask.contains(stream) {
            return None;
        }
        Some(
            SKIN_STREAMS
                .iter()
                .take_while(|s| **s != stream)
                .filter(|s| src_mask.contains(**s))
                .count(),
        )
    };
    let position_slot = slot(VertexStreamMask::POSITION);
    let normal_slot = slot(VertexStreamMask::NORMAL);
    let tangent_slot = slot(VertexStreamMask::TANGENT);
    let joints_slot = slot(VertexStreamMask::JOINTS_0);
    let weights_slot = slot(VertexStreamMask::WEIGHTS_0);

    for v in 0..vertex_count as usize {
        let src = source_offset as usize + v * src_stride;
        let read = |slot: Option<usize>| slot.map(|s| source[src + s]).unwrap_or(Vec4::ZERO);

        let joints = read(joints_slot);
        let weights = read(weights_slot);
        let mut skin_matrix = Mat4::ZERO;
        let mut normal_matrix = Mat4::ZERO;
        let joint_indices = [joints.x, joints.y, joints.z, joints.w];
        let weight_values = [weights.x, weights.y, weights.z, weights.w];
        let mut total_weight = 0.0;
        for (joint, weight) in joint_indices.iter().zip(weight_values) {
            if weight <= 0.0 {
                continue;
            }
            let pair = (*joint as usize) * 2;
            if pair + 1 >= joint_pairs.len() {
                continue;
            }
            skin_matrix += joint_pairs[pair] * weight;
            normal_matrix += joint_pairs[pair + 1] * weight;
            total_weight += weight;
        }
        if total_weight <= 0.0 {
            skin_matrix = Mat4::IDENTITY;
            normal_matrix = Mat4::IDENTITY;
        }

        if position_slot.is_some() {
            let position = read(position_slot);
            let skinned = skin_matrix * Vec4::new(position.x, position.y, position.z, 1.0);
            positions[dest_vertex_offset as usize + v] =
                Vec4::new(skinned.x, skinned.y, skinned.z, 1.0);
        }

        let dst = dest_data_offset as usize + v * dst_stride;
        let mut dst_slot = 0usize;
        if normal_slot.is_some() {
            let normal = read(normal_slot);
            let skinned = normal_matrix * Vec4::new(normal.x, normal.y, normal.z, 0.0);
            let normalized = glam::Vec3::new(skinned.x, skinned.y, skinned.z).normalize_or_zero();
            data[dst + dst_slot] = normalized.extend(0.0);
            dst_slot += 1;
        }
        if tangent_slot.is_some() {
            let tangent = read(tangent_slot);
            let skinned = skin_matrix * Vec4::new(tangent.x, tangent.y, tangent.z, 0.0);
            data[dst + dst_slot] = Vec4::new(skinned.x, skinned.y, skinned.z, tangent.w);
            dst_slot += 1;
        }
        let _ = dst_slot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{vec3, vec4};

    #[test]
    fn two_joint_translation_moves_only_the_bound_vertex() {
        // vertex 0 fully bound to joint 0 (identity), vertex 1 fully bound
        // to joint 1 (translate +10 in x)
        let mask = VertexStreamMask::POSITION
            | VertexStreamMask::NORMAL
            | VertexStreamMask::JOINTS_0
            | VertexStreamMask::WEIGHTS_0;
        let source = vec![
            // vertex 0: position, normal, joints, weights
            vec4(1.0, 2.0, 3.0, 1.0),
            vec4(0.0, 1.0, 0.0, 0.0),
            vec4(0.0, 1.0, 0.0, 0.0),
            vec4(1.0, 0.0, 0.0, 0.0),
            // vertex 1
            vec4(4.0, 5.0, 6.0, 1.0),
            vec4(0.0, 1.0, 0.0, 0.0),
            vec4(0.0, 1.0, 0.0, 0.0),
            vec4(0.0, 1.0, 0.0, 0.0),
        ];
        let translate = Mat4::from_translation(vec3(10.0, 0.0, 0.0));
        let joint_pairs = vec![
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            translate,
            translate.inverse().transpose(),
        ];

        let mut positions = vec![Vec4::ZERO; 2];
        let mut data = vec![Vec4::ZERO; 2];
        skin_vertex_streams(
            &source,
            0,
            mask,
            &joint_pairs,
            2,
            &mut positions,
            0,
            &mut data,
            0,
        );

        assert_eq!(positions[0], vec4(1.0, 2.0, 3.0, 1.0));
        assert_eq!(positions[1], vec4(14.0, 5.0, 6.0, 1.0));
        // normals are rotated only; a translation leaves them alone
        assert_eq!(data[0], vec4(0.0, 1.0, 0.0, 0.0));
        assert_eq!(data[1], vec4(0.0, 1.0, 0.0, 0.0));
    }

    #[test]
    fn blended_weights_interpolate_positions() {
        let mask =
            VertexStreamMask::POSITION | VertexStreamMask::JOINTS_0 | VertexStreamMask::WEIGHTS_0;
        let source = vec![
            vec4(0.0, 0.0, 0.0, 1.0),
            vec4(0.0, 1.0, 0.0, 0.0),
            vec4(0.5, 0.5, 0.0, 0.0),
        ];
        let translate = Mat4::from_translation(vec3(8.0, 0.0, 0.0));
        let joint_pairs = vec![
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            translate,
            translate.inverse().transpose(),
        ];
        let mut positions = vec![Vec4::ZERO; 1];
        let mut data = vec![];
        skin_vertex_streams(
            &source,
            0,
            mask,
            &joint_pairs,
            1,
            &mut positions,
            0,
            &mut data,
            0,
        );
        assert_eq!(positions[0], vec4(4.0, 0.0, 0.0, 1.0));
    }
}
