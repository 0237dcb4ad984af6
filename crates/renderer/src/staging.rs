//! Packed vertex staging. Every mesh contributes an index slice, a
//! position stream, and one interleaved attribute stream whose per-vertex
//! stride is the number of present attribute streams in vec4 slots:
//! normal, tangent, the four packed uv pairs, then color.

use glam::Vec4;
use helio_ecs::{Mesh, VertexStreamMask};

/// Attribute streams that occupy a slot in the packed data buffer, in
/// write order.
pub const ATTRIBUTE_STREAMS: [VertexStreamMask; 7] = [
    VertexStreamMask::NORMAL,
    VertexStreamMask::TANGENT,
    VertexStreamMask::TEXCOORD_0,
    VertexStreamMask::TEXCOORD_1,
    VertexStreamMask::TEXCOORD_2,
    VertexStreamMask::TEXCOORD_3,
    VertexStreamMask::COLOR_0,
];

/// Streams of the skinning source buffer, in write order.
pub const SKIN_STREAMS: [VertexStreamMask; 5] = [
    VertexStreamMask::POSITION,
    VertexStreamMask::NORMAL,
    VertexStreamMask::TANGENT,
    VertexStreamMask::JOINTS_0,
    VertexStreamMask::WEIGHTS_0,
];

/// Packed stride of the attribute data stream, in vec4 slots.
pub fn attribute_stride(mask: VertexStreamMask) -> u32 {
    ATTRIBUTE_STREAMS
        .iter()
        .filter(|stream| mask.contains(**stream))
        .count() as u32
}

/// Mask restricted to the streams that live in the attribute data buffer,
/// i.e. the bits whose popcount equals [`attribute_stride`].
pub fn attribute_mask(mask: VertexStreamMask) -> VertexStreamMask {
    let mut out = VertexStreamMask::empty();
    for stream in ATTRIBUTE_STREAMS {
        if mask.contains(stream) {
            out |= stream;
        }
    }
    out
}

/// Packed stride of the skinning source stream, in vec4 slots.
pub fn skin_stride(mask: VertexStreamMask) -> u32 {
    SKIN_STREAMS
        .iter()
        .filter(|stream| mask.contains(**stream))
        .count() as u32
}

pub fn skin_mask(mask: VertexStreamMask) -> VertexStreamMask {
    let mut out = VertexStreamMask::empty();
    for stream in SKIN_STREAMS {
        if mask.contains(stream) {
            out |= stream;
        }
    }
    out
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StagedGeometry {
    pub index_offset: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub data_offset: u32,
}

/// Appends the mesh's indices, positions and packed attribute stream to the
/// scene-global CPU buffers. Indices are rebased so the scene index buffer
/// addresses the global position buffer directly.
pub fn append_mesh_geometry(
    mesh: &Mesh,
    positions: &mut Vec<Vec4>,
    data: &mut Vec<Vec4>,
    indices: &mut Vec<u32>,
) -> StagedGeometry {
    let vertex_offset = positions.len() as u32;
    let index_offset = indices.len() as u32;
    let data_offset = data.len() as u32;
    let vertex_count = mesh.positions.len();

    indices.reserve(mesh.indices.len());
    for index in &mesh.indices {
        indices.push(vertex_offset + index);
    }

    positions.reserve(vertex_count);
    for position in &mesh.positions {
        positions.push(position.extend(1.0));
    }

    let stride = attribute_stride(mesh.vertex_stream_mask) as usize;
    let base = data.len();
    data.resize(base + stride * vertex_count, Vec4::ZERO);

    let mut offset = 0usize;
    if mesh.vertex_stream_mask.contains(VertexStreamMask::NORMAL) {
        for (i, normal) in mesh.normals.iter().enumerate() {
            data[base + i * stride + offset] = normal.normalize_or_zero().extend(0.0);
        }
        offset += 1;
    }
    if mesh.vertex_stream_mask.contains(VertexStreamMask::TANGENT) {
        for (i, tangent) in mesh.tangents.iter().enumerate() {
            data[base + i * stride + offset] = *tangent;
        }
        offset += 1;
    }
    // uv sets pack two to a slot: (u0, v0, u1, v1)
    const UV_FLAGS: [VertexStreamMask; 4] = [
        VertexStreamMask::TEXCOORD_0,
        VertexStreamMask::TEXCOORD_1,
        VertexStreamMask::TEXCOORD_2,
        VertexStreamMask::TEXCOORD_3,
    ];
    for pair in 0..4 {
        if !mesh.vertex_stream_mask.contains(UV_FLAGS[pair]) {
            continue;
        }
        let first = &mesh.uvs[pair * 2];
        let second = &mesh.uvs[pair * 2 + 1];
        for (i, uv) in first.iter().enumerate() {
            let other = second.get(i).copied().unwrap_or_default();
            data[base + i * stride + offset] = Vec4::new(uv.x, uv.y, other.x, other.y);
        }
        offset += 1;
    }
    if mesh.vertex_stream_mask.contains(VertexStreamMask::COLOR_0) {
        for (i, color) in mesh.colors[0].iter().enumerate() {
            data[base + i * stride + offset] = *color;
        }
        offset += 1;
    }
    debug_assert_eq!(offset, stride);

    StagedGeometry {
        index_offset,
        index_count: mesh.indices.len() as u32,
        vertex_offset,
        vertex_count: vertex_count as u32,
        data_offset,
    }
}

/// Appends the pre-skin source streams (positions, normals, tangents,
/// joints, weights) for a skinned mesh. Returns the element offset of the
/// first vec4.
pub fn append_skin_source(mesh: &Mesh, skin_data: &mut Vec<Vec4>) -> u32 {
    let source_offset = skin_data.len() as u32;
    let vertex_count = mesh.positions.len();
    let stride = skin_stride(mesh.vertex_stream_mask) as usize;
    let base = skin_data.len();
    skin_data.resize(base + stride * vertex_count, Vec4::ZERO);

    let mut offset = 0usize;
    if mesh.vertex_stream_mask.contains(VertexStreamMask::POSITION) {
        for (i, position) in mesh.positions.iter().enumerate() {
            skin_data[base + i * stride + offset] = position.extend(1.0);
        }
        offset += 1;
    }
    if mesh.vertex_stream_mask.contains(VertexStreamMask::NORMAL) {
        for (i, normal) in mesh.normals.iter().enumerate() {
            skin_data[base + i * stride + offset] = normal.normalize_or_zero().extend(0.0);
        }
        offset += 1;
    }
    if mesh.vertex_stream_mask.contains(VertexStreamMask::TANGENT) {
        for (i, tangent) in mesh.tangents.iter().enumerate() {
            skin_data[base + i * stride + offset] = *tangent;
        }
        offset += 1;
    }
    if mesh.vertex_stream_mask.contains(VertexStreamMask::JOINTS_0) {
        for (i, joints) in mesh.joints[0].iter().enumerate() {
            skin_data[base + i * stride + offset] = *joints;
        }
        offset += 1;
    }
    if mesh.vertex_stream_mask.contains(VertexStreamMask::WEIGHTS_0) {
        for (i, weights) in mesh.weights[0].iter().enumerate() {
            skin_data[base + i * stride + offset] = *weights;
        }
        offset += 1;
    }
    debug_assert_eq!(offset, stride);
    source_offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{vec2, vec3, vec4};

    fn mesh() -> Mesh {
        let mut mesh = Mesh {
            positions: vec![vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0)],
            normals: vec![vec3(0.0, 2.0, 0.0), vec3(0.0, 0.0, 3.0)],
            indices: vec![0, 1],
            ..Default::default()
        };
        mesh.uvs[0] = vec![vec2(0.25, 0.5), vec2(0.75, 1.0)];
        mesh.vertex_stream_mask =
            VertexStreamMask::POSITION | VertexStreamMask::NORMAL | VertexStreamMask::TEXCOORD_0;
        mesh
    }

    #[test]
    fn stride_is_popcount_of_attribute_streams() {
        let mesh = mesh();
        assert_eq!(attribute_stride(mesh.vertex_stream_mask), 2);
        assert_eq!(
            attribute_mask(mesh.vertex_stream_mask).bits().count_ones(),
            attribute_stride(mesh.vertex_stream_mask)
        );
    }

    #[test]
    fn append_rebases_indices_and_interleaves() {
        let mesh = mesh();
        let mut positions = vec![Vec4::ZERO; 5]; // pre-existing geometry
        let mut data = vec![Vec4::ZERO; 7];
        let mut indices = vec![0u32; 3];

        let staged = append_mesh_geometry(&mesh, &mut positions, &mut data, &mut indices);
        assert_eq!(staged.vertex_offset, 5);
        assert_eq!(staged.index_offset, 3);
        assert_eq!(staged.data_offset, 7);
        assert_eq!(indices[3..], [5, 6]);

        // vertex 1: normal slot then packed uv slot
        assert_eq!(data[7 + 2], vec4(0.0, 0.0, 1.0, 0.0));
        assert_eq!(data[7 + 3], vec4(0.75, 1.0, 0.0, 0.0));
    }

    #[test]
    fn skin_source_packs_present_streams_only() {
        let mut mesh = mesh();
        mesh.joints[0] = vec![vec4(0.0, 1.0, 0.0, 0.0); 2];
        mesh.weights[0] = vec![vec4(1.0, 0.0, 0.0, 0.0); 2];
        mesh.vertex_stream_mask |= VertexStreamMask::JOINTS_0 | VertexStreamMask::WEIGHTS_0;

        assert_eq!(skin_stride(mesh.vertex_stream_mask), 4);
        let mut skin_data = Vec::new();
        let offset = append_skin_source(&mesh, &mut skin_data);
        assert_eq!(offset, 0);
        assert_eq!(skin_data.len(), 8);
        // vertex 0: position, normal, joints, weights
        assert_eq!(skin_data[0], vec4(0.0, 0.0, 0.0, 1.0));
        assert_eq!(skin_data[2], vec4(0.0, 1.0, 0.0, 0.0));
        assert_eq!(skin_data[3], vec4(1.0, 0.0, 0.0, 0.0));
    }
}
