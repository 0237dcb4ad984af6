//! Backend-agnostic GPU layer: typed resource handles, plain-data
//! descriptors, CPU-recorded command buffers, the [`Device`] trait concrete
//! backends implement, a per-frame dynamic uniform allocator, and the
//! shader manifest + variant cache.

mod backend;
mod commands;
mod dynamic;
pub mod null;
mod shader;
mod types;

pub use backend::{Device, GpuError, SemaphoreOp};
pub use commands::{
    Access, BlitEncoder, Command, CommandBuffer, ComputeEncoder, Draw, DrawStream, PipelineStages,
    RenderEncoder, Scissor, Viewport,
};
pub use dynamic::{DynamicBinding, DynamicDataAllocator};
pub use shader::{
    ConstantType, ManifestStage, ManifestStageDesc, ShaderManifest, ShaderManifestEntry,
    ShaderVariantCache, SpecializationSlot,
};
pub use types::*;
