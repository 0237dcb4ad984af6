use crate::backend::{Device, GpuError};
use crate::types::{BufferDesc, BufferHandle, BufferMemory, BufferUsage};

const BLOCK_ALIGNMENT: u64 = 256;
const PAGE_SIZE: u64 = 1 << 20;

/// A block handed out by the allocator: which per-frame buffer it lives in
/// and where.
#[derive(Clone, Copy, Debug, Default)]
pub struct DynamicBinding {
    pub buffer: BufferHandle,
    pub offset: u32,
}

struct FramePool {
    pages: Vec<BufferHandle>,
    page: usize,
    offset: u64,
}

/// Per-frame dynamic uniform allocator. Blocks are written once by the CPU
/// and read by the GPU until the frame's semaphore completes; `reset` at
/// frame start recycles the frame slot's pages wholesale.
pub struct DynamicDataAllocator {
    frames: Vec<FramePool>,
}

impl DynamicDataAllocator {
    pub fn new(frames_in_flight: u32) -> Self {
        Self {
            frames: (0..frames_in_flight)
                .map(|_| FramePool {
                    pages: Vec::new(),
                    page: 0,
                    offset: 0,
                })
                .collect(),
        }
    }

    pub fn reset(&mut self, frame_index: u32) {
        let pool = &mut self.frames[frame_index as usize];
        pool.page = 0;
        pool.offset = 0;
    }

    /// Copies `data` into a fresh block of the frame's pool.
    pub fn allocate(
        &mut self,
        device: &dyn Device,
        frame_index: u32,
        data: &[u8],
    ) -> Result<DynamicBinding, GpuError> {
        let size = (data.len() as u64).max(1);
        if size > PAGE_SIZE {
            return Err(GpuError::OutOfMemory(size));
        }
        let pool = &mut self.frames[frame_index as usize];

        if pool.pages.is_empty() || pool.offset + size > PAGE_SIZE {
            if pool.pages.is_empty() || pool.page + 1 == pool.pages.len() {
                let buffer = device.create_buffer(&BufferDesc {
                    size: PAGE_SIZE,
                    usage: BufferUsage::UNIFORM | BufferUsage::STORAGE,
                    memory: BufferMemory::HostVisible,
                    label: Some("DynamicDataAllocator.page"),
                })?;
                pool.pages.push(buffer);
            }
            if pool.offset != 0 {
                pool.page += 1;
            }
            pool.offset = 0;
        }

        let buffer = pool.pages[pool.page];
        let offset = pool.offset;
        device.write_buffer(buffer, offset, data)?;
        pool.offset = align_up(offset + size, BLOCK_ALIGNMENT);
        Ok(DynamicBinding {
            buffer,
            offset: offset as u32,
        })
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::NullDevice;

    #[test]
    fn blocks_are_aligned_and_disjoint() {
        let device = NullDevice::new(Default::default());
        let mut alloc = DynamicDataAllocator::new(2);

        let a = alloc.allocate(&device, 0, &[1u8; 100]).ok();
        let b = alloc.allocate(&device, 0, &[2u8; 100]).ok();
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.offset % 256, 0);
        assert_eq!(b.offset, a.offset + 256);
        assert_eq!(a.buffer, b.buffer);

        alloc.reset(0);
        let c = alloc.allocate(&device, 0, &[3u8; 4]).ok().unwrap();
        assert_eq!(c.offset, a.offset);
    }
}
