use parking_lot::Mutex;

use crate::backend::{Device, GpuError, SemaphoreOp};
use crate::commands::{Command, CommandBuffer};
use crate::types::*;

struct Slots<T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free: Vec<u32>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Slots<T> {
    fn insert(&mut self, value: T) -> (u32, u32) {
        if let Some(index) = self.free.pop() {
            self.items[index as usize] = Some(value);
            (index, self.generations[index as usize])
        } else {
            self.items.push(Some(value));
            self.generations.push(0);
            ((self.items.len() - 1) as u32, 0)
        }
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        if *self.generations.get(index as usize)? != generation {
            return None;
        }
        self.items[index as usize].as_ref()
    }

    fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        if *self.generations.get(index as usize)? != generation {
            return None;
        }
        self.items[index as usize].as_mut()
    }

    fn remove(&mut self, index: u32, generation: u32) -> Option<T> {
        if *self.generations.get(index as usize)? != generation {
            return None;
        }
        let value = self.items[index as usize].take()?;
        self.generations[index as usize] += 1;
        self.free.push(index);
        Some(value)
    }
}

struct NullBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

enum Deletion {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    BindGroup(BindGroupHandle),
}

/// Execution statistics tests can assert against.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDeviceStats {
    pub submissions: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub render_passes: u64,
    pub presents: u64,
}

#[derive(Default)]
struct NullState {
    buffers: Slots<NullBuffer>,
    textures: Slots<TextureDesc>,
    samplers: Slots<SamplerDesc>,
    bind_group_layouts: Slots<BindGroupLayoutDesc>,
    bind_groups: Slots<BindGroupLayoutHandle>,
    render_pass_layouts: Slots<RenderPassLayoutDesc>,
    render_passes: Slots<RenderPassDesc>,
    shaders: Slots<ShaderDesc>,
    compute_shaders: Slots<ComputeShaderDesc>,
    semaphores: Slots<u64>,
    deletions: Vec<(u32, Deletion)>,
    frame_index: u32,
    swapchain: (u32, u32),
    swapchain_texture: TextureHandle,
    stats: NullDeviceStats,
}

/// A [`Device`] that allocates handles, keeps host copies of buffer
/// contents, and treats draws as no-ops. Backs tests and headless runs;
/// submissions complete (and signal their semaphores) immediately.
pub struct NullDevice {
    limits: DeviceLimits,
    state: Mutex<NullState>,
}

impl NullDevice {
    pub fn new(limits: DeviceLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(NullState {
                swapchain: (1280, 720),
                swapchain_texture: TextureHandle::NULL,
                ..Default::default()
            }),
        }
    }

    pub fn stats(&self) -> NullDeviceStats {
        self.state.lock().stats
    }

    /// Host copy of a buffer's contents, for test assertions.
    pub fn buffer_contents(&self, handle: BufferHandle) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state
            .buffers
            .get(handle.index, handle.generation)
            .map(|b| b.data.clone())
    }
}

impl Device for NullDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits.clone()
    }

    fn frames_in_flight(&self) -> u32 {
        self.limits.frames_in_flight
    }

    fn frame_index(&self) -> u32 {
        self.state.lock().frame_index
    }

    fn begin_frame(&self) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.frame_index = (state.frame_index + 1) % self.limits.frames_in_flight;

        let matured: Vec<Deletion> = {
            let mut kept = Vec::new();
            let mut matured = Vec::new();
            for (age, deletion) in state.deletions.drain(..) {
                if age == 0 {
                    matured.push(deletion);
                } else {
                    kept.push((age - 1, deletion));
                }
            }
            state.deletions = kept;
            matured
        };
        for deletion in matured {
            match deletion {
                Deletion::Buffer(h) => {
                    state.buffers.remove(h.index, h.generation);
                }
                Deletion::Texture(h) => {
                    state.textures.remove(h.index, h.generation);
                }
                Deletion::BindGroup(h) => {
                    state.bind_groups.remove(h.index, h.generation);
                }
            }
        }
        Ok(())
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle, GpuError> {
        let mut state = self.state.lock();
        let data = vec![0u8; desc.size as usize];
        let (index, generation) = state.buffers.insert(NullBuffer {
            desc: desc.clone(),
            data,
        });
        Ok(BufferHandle::new(index, generation))
    }

    fn destroy_buffer(&self, handle: BufferHandle) {
        self.state.lock().buffers.remove(handle.index, handle.generation);
    }

    fn queue_buffer_for_deletion(&self, handle: BufferHandle) {
        let frames = self.limits.frames_in_flight;
        self.state
            .lock()
            .deletions
            .push((frames, Deletion::Buffer(handle)));
    }

    fn write_buffer(
        &self,
        handle: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        let buffer = state
            .buffers
            .get_mut(handle.index, handle.generation)
            .ok_or(GpuError::InvalidHandle("buffer"))?;
        let end = offset as usize + data.len();
        if end as u64 > buffer.desc.size {
            return Err(GpuError::OutOfMemory(end as u64));
        }
        buffer.data[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(
        &self,
        handle: BufferHandle,
        offset: u64,
        out: &mut [u8],
    ) -> Result<(), GpuError> {
        let state = self.state.lock();
        let buffer = state
            .buffers
            .get(handle.index, handle.generation)
            .ok_or(GpuError::InvalidHandle("buffer"))?;
        let end = offset as usize + out.len();
        if end > buffer.data.len() {
            return Err(GpuError::ReadbackUnavailable);
        }
        out.copy_from_slice(&buffer.data[offset as usize..end]);
        Ok(())
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureHandle, GpuError> {
        let (index, generation) = self.state.lock().textures.insert(desc.clone());
        Ok(TextureHandle::new(index, generation))
    }

    fn destroy_texture(&self, handle: TextureHandle) {
        self.state.lock().textures.remove(handle.index, handle.generation);
    }

    fn queue_texture_for_deletion(&self, handle: TextureHandle) {
        let frames = self.limits.frames_in_flight;
        self.state
            .lock()
            .deletions
            .push((frames, Deletion::Texture(handle)));
    }

    fn write_texture(&self, handle: TextureHandle, _data: &[u8]) -> Result<(), GpuError> {
        self.state
            .lock()
            .textures
            .get(handle.index, handle.generation)
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("texture"))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle, GpuError> {
        let (index, generation) = self.state.lock().samplers.insert(desc.clone());
        Ok(SamplerHandle::new(index, generation))
    }

    fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDesc,
    ) -> Result<BindGroupLayoutHandle, GpuError> {
        let (index, generation) = self.state.lock().bind_group_layouts.insert(desc.clone());
        Ok(BindGroupLayoutHandle::new(index, generation))
    }

    fn create_bind_group(&self, desc: &BindGroupDesc) -> Result<BindGroupHandle, GpuError> {
        let mut state = self.state.lock();
        if state
            .bind_group_layouts
            .get(desc.layout.index, desc.layout.generation)
            .is_none()
        {
            return Err(GpuError::InvalidHandle("bind group layout"));
        }
        let (index, generation) = state.bind_groups.insert(desc.layout);
        Ok(BindGroupHandle::new(index, generation))
    }

    fn update_bind_group(
        &self,
        handle: BindGroupHandle,
        update: &BindGroupUpdate,
    ) -> Result<(), GpuError> {
        let state = self.state.lock();
        if state.bind_groups.get(handle.index, handle.generation).is_none() {
            return Err(GpuError::InvalidHandle("bind group"));
        }
        for write in &update.buffers {
            if state
                .buffers
                .get(write.buffer.index, write.buffer.generation)
                .is_none()
            {
                return Err(GpuError::InvalidHandle("buffer"));
            }
        }
        for write in &update.textures {
            if state
                .textures
                .get(write.texture.index, write.texture.generation)
                .is_none()
            {
                return Err(GpuError::InvalidHandle("texture"));
            }
        }
        Ok(())
    }

    fn queue_bind_group_for_deletion(&self, handle: BindGroupHandle) {
        let frames = self.limits.frames_in_flight;
        self.state
            .lock()
            .deletions
            .push((frames, Deletion::BindGroup(handle)));
    }

    fn create_render_pass_layout(
        &self,
        desc: &RenderPassLayoutDesc,
    ) -> Result<RenderPassLayoutHandle, GpuError> {
        let (index, generation) = self.state.lock().render_pass_layouts.insert(desc.clone());
        Ok(RenderPassLayoutHandle::new(index, generation))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle, GpuError> {
        let mut state = self.state.lock();
        let layout = state
            .render_pass_layouts
            .get(desc.layout.index, desc.layout.generation)
            .ok_or(GpuError::InvalidHandle("render pass layout"))?;
        if layout.attachments.len() != desc.attachments.len() {
            return Err(GpuError::SubmitFailed(format!(
                "render pass expects {} attachments, got {}",
                layout.attachments.len(),
                desc.attachments.len()
            )));
        }
        let (index, generation) = state.render_passes.insert(desc.clone());
        Ok(RenderPassHandle::new(index, generation))
    }

    fn destroy_render_pass(&self, handle: RenderPassHandle) {
        self.state
            .lock()
            .render_passes
            .remove(handle.index, handle.generation);
    }

    fn create_shader(&self, desc: &ShaderDesc) -> Result<ShaderHandle, GpuError> {
        let (index, generation) = self.state.lock().shaders.insert(desc.clone());
        Ok(ShaderHandle::new(index, generation))
    }

    fn create_compute_shader(
        &self,
        desc: &ComputeShaderDesc,
    ) -> Result<ComputeShaderHandle, GpuError> {
        let (index, generation) = self.state.lock().compute_shaders.insert(desc.clone());
        Ok(ComputeShaderHandle::new(index, generation))
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle, GpuError> {
        let (index, generation) = self.state.lock().semaphores.insert(0);
        Ok(SemaphoreHandle::new(index, generation))
    }

    fn semaphore_value(&self, handle: SemaphoreHandle) -> u64 {
        self.state
            .lock()
            .semaphores
            .get(handle.index, handle.generation)
            .copied()
            .unwrap_or(0)
    }

    fn wait_semaphore(&self, _handle: SemaphoreHandle, _value: u64) -> Result<(), GpuError> {
        // submissions complete synchronously
        Ok(())
    }

    fn submit(
        &self,
        commands: CommandBuffer,
        _waits: &[SemaphoreOp],
        signals: &[SemaphoreOp],
    ) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.stats.submissions += 1;
        for command in commands.commands() {
            match command {
                Command::BeginRenderPass { pass } => {
                    if state.render_passes.get(pass.index, pass.generation).is_none() {
                        return Err(GpuError::InvalidHandle("render pass"));
                    }
                    state.stats.render_passes += 1;
                }
                Command::DrawStream(draws) => {
                    state.stats.draws += draws.len() as u64;
                }
                Command::Dispatch { shader, .. } => {
                    if state
                        .compute_shaders
                        .get(shader.index, shader.generation)
                        .is_none()
                    {
                        return Err(GpuError::InvalidHandle("compute shader"));
                    }
                    state.stats.dispatches += 1;
                }
                Command::CopyBuffer {
                    src,
                    dst,
                    src_offset,
                    dst_offset,
                    size,
                } => {
                    let chunk = {
                        let source = state
                            .buffers
                            .get(src.index, src.generation)
                            .ok_or(GpuError::InvalidHandle("buffer"))?;
                        let start = *src_offset as usize;
                        let end = start + *size as usize;
                        if end > source.data.len() {
                            return Err(GpuError::SubmitFailed("copy out of range".into()));
                        }
                        source.data[start..end].to_vec()
                    };
                    let dest = state
                        .buffers
                        .get_mut(dst.index, dst.generation)
                        .ok_or(GpuError::InvalidHandle("buffer"))?;
                    let start = *dst_offset as usize;
                    let end = start + chunk.len();
                    if end > dest.data.len() {
                        return Err(GpuError::SubmitFailed("copy out of range".into()));
                    }
                    dest.data[start..end].copy_from_slice(&chunk);
                }
                Command::CopyBufferToTexture { dst, .. } => {
                    if state.textures.get(dst.index, dst.generation).is_none() {
                        return Err(GpuError::InvalidHandle("texture"));
                    }
                }
                Command::CopyTextureToBuffer { src, dst, .. } => {
                    if state.textures.get(src.index, src.generation).is_none()
                        || state.buffers.get(dst.index, dst.generation).is_none()
                    {
                        return Err(GpuError::InvalidHandle("copy"));
                    }
                }
                Command::CopyTextureToTexture { src, dst, .. } => {
                    if state.textures.get(src.index, src.generation).is_none()
                        || state.textures.get(dst.index, dst.generation).is_none()
                    {
                        return Err(GpuError::InvalidHandle("copy"));
                    }
                }
                Command::NextSubpass
                | Command::EndRenderPass
                | Command::SetViewports(_)
                | Command::SetScissors(_)
                | Command::SetDepthBias { .. }
                | Command::GenerateMipmaps { .. }
                | Command::Barrier { .. } => {}
            }
        }
        for signal in signals {
            if let Some(value) = state
                .semaphores
                .get_mut(signal.semaphore.index, signal.semaphore.generation)
            {
                *value = (*value).max(signal.value);
            }
        }
        Ok(())
    }

    fn wait_idle(&self) {}

    fn acquire_swapchain_texture(&self) -> Result<TextureHandle, GpuError> {
        let mut state = self.state.lock();
        if state.swapchain_texture.is_null() {
            let (width, height) = state.swapchain;
            let (index, generation) = state.textures.insert(
                TextureDesc::d2(
                    width,
                    height,
                    Format::Bgra8Unorm,
                    TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_DST,
                )
                .with_label("NullDevice.swapchain"),
            );
            state.swapchain_texture = TextureHandle::new(index, generation);
        }
        Ok(state.swapchain_texture)
    }

    fn present(&self) -> Result<(), GpuError> {
        self.state.lock().stats.presents += 1;
        Ok(())
    }

    fn resize_swapchain(&self, width: u32, height: u32) -> Result<(), GpuError> {
        let mut state = self.state.lock();
        state.swapchain = (width, height);
        let old = state.swapchain_texture;
        if !old.is_null() {
            state.textures.remove(old.index, old.generation);
            state.swapchain_texture = TextureHandle::NULL;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_write_read_round_trip() {
        let device = NullDevice::new(Default::default());
        let buffer = device
            .create_buffer(&BufferDesc {
                size: 16,
                usage: BufferUsage::STAGING,
                memory: BufferMemory::HostVisible,
                label: None,
            })
            .ok()
            .unwrap();
        device.write_buffer(buffer, 4, &[1, 2, 3, 4]).ok().unwrap();
        let mut out = [0u8; 4];
        device.read_buffer(buffer, 4, &mut out).ok().unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn queued_deletion_survives_frames_in_flight() {
        let device = NullDevice::new(DeviceLimits {
            frames_in_flight: 2,
            ..Default::default()
        });
        let buffer = device
            .create_buffer(&BufferDesc {
                size: 4,
                usage: BufferUsage::UNIFORM,
                memory: BufferMemory::HostVisible,
                label: None,
            })
            .ok()
            .unwrap();
        device.queue_buffer_for_deletion(buffer);
        for _ in 0..2 {
            device.begin_frame().ok().unwrap();
            assert!(device.write_buffer(buffer, 0, &[0; 4]).is_ok());
        }
        device.begin_frame().ok().unwrap();
        assert!(device.write_buffer(buffer, 0, &[0; 4]).is_err());
    }

    #[test]
    fn copy_buffer_executes_on_submit() {
        let device = NullDevice::new(Default::default());
        let desc = BufferDesc {
            size: 8,
            usage: BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
            memory: BufferMemory::HostVisible,
            label: None,
        };
        let src = device.create_buffer(&desc).ok().unwrap();
        let dst = device.create_buffer(&desc).ok().unwrap();
        device
            .write_buffer(src, 0, &[9, 9, 9, 9, 0, 0, 0, 0])
            .ok()
            .unwrap();

        let mut cmd = CommandBuffer::new("copy");
        cmd.begin_blit_pass().copy_buffer(src, dst, 0, 4, 4);
        let semaphore = device.create_semaphore().ok().unwrap();
        device
            .submit(
                cmd,
                &[],
                &[SemaphoreOp {
                    semaphore,
                    value: 7,
                }],
            )
            .ok()
            .unwrap();

        assert_eq!(device.semaphore_value(semaphore), 7);
        let contents = device.buffer_contents(dst).unwrap();
        assert_eq!(&contents[4..8], &[9, 9, 9, 9]);
    }
}
