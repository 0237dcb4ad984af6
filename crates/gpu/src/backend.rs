use thiserror::Error;

use crate::commands::CommandBuffer;
use crate::types::*;

#[derive(Clone, Debug, Error)]
pub enum GpuError {
    #[error("out of device memory allocating {0} bytes")]
    OutOfMemory(u64),
    #[error("stale or invalid {0} handle")]
    InvalidHandle(&'static str),
    #[error("shader variant '{0}' not found")]
    ShaderVariantNotFound(String),
    #[error("submission failed: {0}")]
    SubmitFailed(String),
    #[error("present failed: {0}")]
    PresentFailed(String),
    #[error("read-back not available")]
    ReadbackUnavailable,
}

/// Timeline semaphore wait/signal: the submission interacts with the
/// semaphore at `value`.
#[derive(Clone, Copy, Debug)]
pub struct SemaphoreOp {
    pub semaphore: SemaphoreHandle,
    pub value: u64,
}

/// The narrow device interface the runtime core renders through. Concrete
/// backends (Vulkan, Metal, DX) live outside the core; the in-tree
/// [`NullDevice`](crate::null::NullDevice) satisfies it for tests and
/// headless runs.
pub trait Device: Send + Sync {
    fn limits(&self) -> DeviceLimits;
    fn frames_in_flight(&self) -> u32;
    fn frame_index(&self) -> u32;

    /// Rolls to the next frame slot and reclaims resources whose deferred
    /// deletion matured.
    fn begin_frame(&self) -> Result<(), GpuError>;

    // buffers
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle, GpuError>;
    fn destroy_buffer(&self, handle: BufferHandle);
    fn queue_buffer_for_deletion(&self, handle: BufferHandle);
    fn write_buffer(&self, handle: BufferHandle, offset: u64, data: &[u8])
        -> Result<(), GpuError>;
    /// Host read of a staging buffer (pick read-back).
    fn read_buffer(&self, handle: BufferHandle, offset: u64, out: &mut [u8])
        -> Result<(), GpuError>;

    // textures
    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureHandle, GpuError>;
    fn destroy_texture(&self, handle: TextureHandle);
    fn queue_texture_for_deletion(&self, handle: TextureHandle);
    fn write_texture(&self, handle: TextureHandle, data: &[u8]) -> Result<(), GpuError>;

    // samplers & bind groups
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle, GpuError>;
    fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDesc,
    ) -> Result<BindGroupLayoutHandle, GpuError>;
    fn create_bind_group(&self, desc: &BindGroupDesc) -> Result<BindGroupHandle, GpuError>;
    fn update_bind_group(
        &self,
        handle: BindGroupHandle,
        update: &BindGroupUpdate,
    ) -> Result<(), GpuError>;
    fn queue_bind_group_for_deletion(&self, handle: BindGroupHandle);

    // render passes
    fn create_render_pass_layout(
        &self,
        desc: &RenderPassLayoutDesc,
    ) -> Result<RenderPassLayoutHandle, GpuError>;
    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle, GpuError>;
    fn destroy_render_pass(&self, handle: RenderPassHandle);

    // shaders
    fn create_shader(&self, desc: &ShaderDesc) -> Result<ShaderHandle, GpuError>;
    fn create_compute_shader(&self, desc: &ComputeShaderDesc)
        -> Result<ComputeShaderHandle, GpuError>;

    // synchronization & submission
    fn create_semaphore(&self) -> Result<SemaphoreHandle, GpuError>;
    fn semaphore_value(&self, handle: SemaphoreHandle) -> u64;
    fn wait_semaphore(&self, handle: SemaphoreHandle, value: u64) -> Result<(), GpuError>;
    fn submit(
        &self,
        commands: CommandBuffer,
        waits: &[SemaphoreOp],
        signals: &[SemaphoreOp],
    ) -> Result<(), GpuError>;
    fn wait_idle(&self);

    // swapchain
    fn acquire_swapchain_texture(&self) -> Result<TextureHandle, GpuError>;
    fn present(&self) -> Result<(), GpuError>;
    fn resize_swapchain(&self, width: u32, height: u32) -> Result<(), GpuError>;
}
