//! Selection outline via jump flooding. Stencil-marked geometry seeds a UV
//! mask; log2(max_dim) ping-pong compute passes halve the jump distance
//! down to one pixel, leaving a signed-distance field the post-process pass
//! mixes into the final image at the configured outline width.

use bytemuck::{Pod, Zeroable};
use helio_gpu::{
    BindGroupHandle, CommandBuffer, ComputeShaderHandle, Device, DynamicDataAllocator, GpuError,
    Access, PipelineStages,
};

const JFA_WORKGROUP: u32 = 8;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct JumpFloodData {
    jump_distance: i32,
    width: i32,
    height: i32,
    _padding: i32,
}

/// Number of jump-flood passes for a target size: one per power of two
/// down to a single pixel.
pub fn pass_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    32 - (largest - 1).leading_zeros()
}

/// Records the seed pass plus the ping-pong jump-flood dispatches. The two
/// bind groups alternate read/write between the mask textures; the pass
/// count decides which one ends up holding the final field.
#[allow(clippy::too_many_arguments)]
pub fn record_jump_flood(
    device: &dyn Device,
    commands: &mut CommandBuffer,
    dynamic: &mut DynamicDataAllocator,
    frame_index: u32,
    shader: ComputeShaderHandle,
    ping_pong_groups: [BindGroupHandle; 2],
    width: u32,
    height: u32,
) -> Result<u32, GpuError> {
    let passes = pass_count(width, height);
    let groups_x = width.div_ceil(JFA_WORKGROUP).max(1);
    let groups_y = height.div_ceil(JFA_WORKGROUP).max(1);

    let mut encoder = commands.begin_compute_pass();
    for pass in 0..passes {
        let jump = 1i32 << (passes - 1 - pass);
        let data = JumpFloodData {
            jump_distance: jump,
            width: width as i32,
            height: height as i32,
            _padding: 0,
        };
        let binding = dynamic.allocate(device, frame_index, bytemuck::bytes_of(&data))?;
        let read_write = ping_pong_groups[(pass % 2) as usize];
        encoder.dispatch(
            shader,
            [read_write, BindGroupHandle::NULL, BindGroupHandle::NULL],
            binding.buffer,
            binding.offset,
            [groups_x, groups_y, 1],
        );
        encoder.barrier(
            PipelineStages::COMPUTE,
            Access::SHADER_WRITE,
            PipelineStages::COMPUTE | PipelineStages::FRAGMENT,
            Access::SHADER_READ,
        );
    }
    Ok(passes)
}

/// Which of the two ping-pong targets holds the finished distance field.
pub fn final_target_index(width: u32, height: u32) -> usize {
    // the last executed pass (pass_count - 1) wrote through group
    // (pass_count - 1) % 2, which writes into texture (pass % 2 == 0 ? 1 : 0)
    ((pass_count(width, height)) % 2) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_counts_halve_to_one_pixel() {
        assert_eq!(pass_count(1, 1), 0);
        assert_eq!(pass_count(2, 2), 1);
        assert_eq!(pass_count(256, 256), 8);
        assert_eq!(pass_count(1920, 1080), 11);
        // jumps: 1024, 512, ..., 1 cover every offset below 2048
        let passes = pass_count(1920, 1080);
        let total: i32 = (0..passes).map(|p| 1i32 << (passes - 1 - p)).sum();
        assert!(total >= 1919);
    }
}
