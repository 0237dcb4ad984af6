//! Entity picking. The picking pass renders entity ids into a small id
//! image; the id under the queried pixel is copied into a per-frame staging
//! buffer and read back once that frame's work is provably complete. Ids
//! carry only the entity index, so the result is re-validated against the
//! library's current generation; a handle that died in flight resolves to
//! null, never to the stale entity.

use std::collections::VecDeque;

use helio_ecs::{ComponentLibrary, Entity};
use helio_gpu::{BufferHandle, Device};

/// `(index + 1, reserved)`; zero means no hit.
pub const PICK_RESULT_SIZE: u64 = 8;

#[derive(Clone, Copy, Debug)]
struct PendingPick {
    frame: u64,
    staging_slot: u32,
    dimensions: (u32, u32),
}

/// Per-view picking state machine: idle → request → dispatching → ready →
/// consumed, with one slot per frame in flight.
pub struct PickState {
    request: Option<(u32, u32)>,
    pending: VecDeque<PendingPick>,
    staging: Vec<BufferHandle>,
    hovered: Entity,
}

impl PickState {
    pub fn new(staging: Vec<BufferHandle>) -> Self {
        Self {
            request: None,
            pending: VecDeque::new(),
            staging,
            hovered: Entity::NULL,
        }
    }

    pub fn staging_buffers(&self) -> &[BufferHandle] {
        &self.staging
    }

    /// Queues a pick at a pixel. A newer request supersedes an unserved
    /// one.
    pub fn request_pick(&mut self, x: u32, y: u32) {
        self.request = Some((x, y));
    }

    pub fn has_request(&self) -> bool {
        self.request.is_some()
    }

    /// Takes the pixel to serve this frame, marking the request as
    /// dispatching.
    pub fn take_request(&mut self) -> Option<(u32, u32)> {
        self.request.take()
    }

    /// Records that a pick copy was submitted this frame.
    pub fn mark_dispatched(&mut self, frame: u64, staging_slot: u32, dimensions: (u32, u32)) {
        self.pending.push_back(PendingPick {
            frame,
            staging_slot,
            dimensions,
        });
    }

    /// Resolves any read-backs whose frame slot has completed. A read that
    /// straddled a view resize reports no hit.
    pub fn resolve(
        &mut self,
        device: &dyn Device,
        library: &ComponentLibrary,
        current_frame: u64,
        frames_in_flight: u64,
        current_dimensions: (u32, u32),
    ) {
        while let Some(pending) = self.pending.front().copied() {
            if current_frame < pending.frame + frames_in_flight {
                break;
            }
            self.pending.pop_front();

            if pending.dimensions != current_dimensions {
                self.hovered = Entity::NULL;
                continue;
            }
            let Some(buffer) = self.staging.get(pending.staging_slot as usize).copied() else {
                self.hovered = Entity::NULL;
                continue;
            };
            let mut raw = [0u8; PICK_RESULT_SIZE as usize];
            if device.read_buffer(buffer, 0, &mut raw).is_err() {
                self.hovered = Entity::NULL;
                continue;
            }
            let id = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            self.hovered = if id == 0 {
                Entity::NULL
            } else {
                // stale handles must lose: resolve the index against the
                // entity currently occupying it
                library.get_current_entity(Entity::new(id - 1, 0))
            };
        }
    }

    pub fn hovered(&self) -> Entity {
        self.hovered
    }

    pub fn clear(&mut self) {
        self.request = None;
        self.pending.clear();
        self.hovered = Entity::NULL;
    }
}

/// Encodes an entity for the id image / staging buffer.
pub fn encode_pick_id(entity: Entity) -> u32 {
    if entity.is_null() {
        0
    } else {
        entity.index + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helio_ecs::EcsContext;
    use helio_gpu::{BufferDesc, BufferMemory, BufferUsage, DeviceLimits};

    fn setup() -> (helio_gpu::null::NullDevice, PickState, ComponentLibrary) {
        let device = helio_gpu::null::NullDevice::new(DeviceLimits::default());
        let staging = (0..2)
            .map(|_| {
                device
                    .create_buffer(&BufferDesc {
                        size: PICK_RESULT_SIZE,
                        usage: BufferUsage::STAGING | BufferUsage::TRANSFER_DST,
                        memory: BufferMemory::HostVisible,
                        label: Some("test pick staging"),
                    })
                    .ok()
                    .unwrap()
            })
            .collect();
        let mut ctx = EcsContext::new();
        ctx.finalize();
        let library = match ctx.create_library() {
            Ok(lib) => lib,
            Err(e) => panic!("{e}"),
        };
        (device, PickState::new(staging), library)
    }

    #[test]
    fn newest_request_wins() {
        let (_, mut picking, _) = setup();
        picking.request_pick(10, 10);
        picking.request_pick(20, 30);
        assert_eq!(picking.take_request(), Some((20, 30)));
        assert_eq!(picking.take_request(), None);
    }

    #[test]
    fn stale_generation_resolves_to_current_entity() {
        let (device, mut picking, mut library) = setup();
        let original = library.create_entity(Some("cube"));

        // the GPU wrote the pick id for `original`
        let buffer = picking.staging_buffers()[0];
        let id = encode_pick_id(original);
        device
            .write_buffer(buffer, 0, &[id.to_le_bytes(), [0; 4]].concat())
            .ok()
            .unwrap();
        picking.mark_dispatched(10, 0, (640, 480));

        // before the read-back completes the entity dies and its index is
        // reused
        library.remove_entity(original);
        let replacement = library.create_entity(Some("sphere"));
        assert_eq!(replacement.index, original.index);

        picking.resolve(&device, &library, 12, 2, (640, 480));
        assert_eq!(picking.hovered(), replacement);
        assert_ne!(picking.hovered(), original);
    }

    #[test]
    fn resize_straddling_readback_is_no_hit() {
        let (device, mut picking, library) = setup();
        picking.mark_dispatched(5, 0, (640, 480));
        picking.resolve(&device, &library, 8, 2, (800, 600));
        assert_eq!(picking.hovered(), Entity::NULL);
    }

    #[test]
    fn results_wait_for_frames_in_flight() {
        let (device, mut picking, mut library) = setup();
        let entity = library.create_entity(None);
        let buffer = picking.staging_buffers()[1];
        device
            .write_buffer(buffer, 0, &[encode_pick_id(entity).to_le_bytes(), [0; 4]].concat())
            .ok()
            .unwrap();
        picking.mark_dispatched(10, 1, (640, 480));

        picking.resolve(&device, &library, 11, 2, (640, 480));
        assert_eq!(picking.hovered(), Entity::NULL);
        picking.resolve(&device, &library, 12, 2, (640, 480));
        assert_eq!(picking.hovered(), entity);
    }
}
