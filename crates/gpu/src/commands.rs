use crate::types::*;

/// One draw in a stream. Offsets follow the engine's global-buffer model:
/// geometry lives in scene-wide buffers and every draw addresses its slice
/// through offsets plus a dynamic uniform block.
#[derive(Clone, Copy, Debug)]
pub struct Draw {
    pub shader: ShaderHandle,
    pub bind_groups: [BindGroupHandle; 3],
    pub dynamic_buffer: BufferHandle,
    pub dynamic_offset: u32,
    pub index_buffer: BufferHandle,
    pub index_offset: u32,
    pub triangle_count: u32,
    pub vertex_buffer: BufferHandle,
    pub vertex_offset: u32,
    pub instance_offset: u32,
    pub instance_count: u32,
}

impl Default for Draw {
    fn default() -> Self {
        Self {
            shader: ShaderHandle::NULL,
            bind_groups: [BindGroupHandle::NULL; 3],
            dynamic_buffer: BufferHandle::NULL,
            dynamic_offset: 0,
            index_buffer: BufferHandle::NULL,
            index_offset: 0,
            triangle_count: 0,
            vertex_buffer: BufferHandle::NULL,
            vertex_offset: 0,
            instance_offset: 0,
            instance_count: 1,
        }
    }
}

/// Reusable draw list. Cleared and refilled every pass.
#[derive(Default)]
pub struct DrawStream {
    draws: Vec<Draw>,
}

impl DrawStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.draws.clear();
    }

    pub fn push(&mut self, draw: Draw) {
        self.draws.push(draw);
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    pub fn take(&mut self) -> Vec<Draw> {
        std::mem::take(&mut self.draws)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct Scissor {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

bitflags::bitflags! {
    pub struct PipelineStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const TRANSFER = 1 << 3;
    }
}

bitflags::bitflags! {
    pub struct Access: u32 {
        const SHADER_READ = 1 << 0;
        const SHADER_WRITE = 1 << 1;
        const TRANSFER_READ = 1 << 2;
        const TRANSFER_WRITE = 1 << 3;
    }
}

#[derive(Clone, Debug)]
pub enum Command {
    BeginRenderPass {
        pass: RenderPassHandle,
    },
    NextSubpass,
    EndRenderPass,
    SetViewports(Vec<Viewport>),
    SetScissors(Vec<Scissor>),
    SetDepthBias {
        constant: f32,
        slope_scale: f32,
    },
    DrawStream(Vec<Draw>),
    Dispatch {
        shader: ComputeShaderHandle,
        bind_groups: [BindGroupHandle; 3],
        dynamic_buffer: BufferHandle,
        dynamic_offset: u32,
        groups: [u32; 3],
    },
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        src: BufferHandle,
        src_offset: u64,
        dst: TextureHandle,
        mip: u32,
        layer: u32,
    },
    CopyTextureToBuffer {
        src: TextureHandle,
        origin: (u32, u32),
        extent: (u32, u32),
        dst: BufferHandle,
        dst_offset: u64,
    },
    CopyTextureToTexture {
        src: TextureHandle,
        src_layer: u32,
        dst: TextureHandle,
        dst_layer: u32,
        dst_mip: u32,
    },
    GenerateMipmaps {
        texture: TextureHandle,
    },
    Barrier {
        src_stages: PipelineStages,
        src_access: Access,
        dst_stages: PipelineStages,
        dst_access: Access,
    },
}

/// CPU-recorded command buffer. Encoders append typed commands; `submit`
/// hands the finished list to the device.
pub struct CommandBuffer {
    pub label: &'static str,
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn begin_render_pass(&mut self, pass: RenderPassHandle) -> RenderEncoder<'_> {
        self.commands.push(Command::BeginRenderPass { pass });
        RenderEncoder { cmd: self }
    }

    pub fn begin_compute_pass(&mut self) -> ComputeEncoder<'_> {
        ComputeEncoder { cmd: self }
    }

    pub fn begin_blit_pass(&mut self) -> BlitEncoder<'_> {
        BlitEncoder { cmd: self }
    }
}

pub struct RenderEncoder<'a> {
    cmd: &'a mut CommandBuffer,
}

impl RenderEncoder<'_> {
    pub fn set_viewports(&mut self, viewports: &[Viewport]) {
        self.cmd.commands.push(Command::SetViewports(viewports.to_vec()));
    }

    pub fn set_scissors(&mut self, scissors: &[Scissor]) {
        self.cmd.commands.push(Command::SetScissors(scissors.to_vec()));
    }

    pub fn set_depth_bias(&mut self, constant: f32, slope_scale: f32) {
        self.cmd.commands.push(Command::SetDepthBias {
            constant,
            slope_scale,
        });
    }

    pub fn draw_stream(&mut self, stream: &mut DrawStream) {
        if !stream.is_empty() {
            self.cmd.commands.push(Command::DrawStream(stream.take()));
        }
    }

    pub fn next_subpass(&mut self) {
        self.cmd.commands.push(Command::NextSubpass);
    }

    pub fn end(self) {
        self.cmd.commands.push(Command::EndRenderPass);
    }
}

pub struct ComputeEncoder<'a> {
    cmd: &'a mut CommandBuffer,
}

impl ComputeEncoder<'_> {
    pub fn dispatch(
        &mut self,
        shader: ComputeShaderHandle,
        bind_groups: [BindGroupHandle; 3],
        dynamic_buffer: BufferHandle,
        dynamic_offset: u32,
        groups: [u32; 3],
    ) {
        self.cmd.commands.push(Command::Dispatch {
            shader,
            bind_groups,
            dynamic_buffer,
            dynamic_offset,
            groups,
        });
    }

    pub fn barrier(
        &mut self,
        src_stages: PipelineStages,
        src_access: Access,
        dst_stages: PipelineStages,
        dst_access: Access,
    ) {
        self.cmd.commands.push(Command::Barrier {
            src_stages,
            src_access,
            dst_stages,
            dst_access,
        });
    }
}

pub struct BlitEncoder<'a> {
    cmd: &'a mut CommandBuffer,
}

impl BlitEncoder<'_> {
    pub fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        self.cmd.commands.push(Command::CopyBuffer {
            src,
            dst,
            src_offset,
            dst_offset,
            size,
        });
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        src: BufferHandle,
        src_offset: u64,
        dst: TextureHandle,
        mip: u32,
        layer: u32,
    ) {
        self.cmd.commands.push(Command::CopyBufferToTexture {
            src,
            src_offset,
            dst,
            mip,
            layer,
        });
    }

    pub fn copy_texture_to_buffer(
        &mut self,
        src: TextureHandle,
        origin: (u32, u32),
        extent: (u32, u32),
        dst: BufferHandle,
        dst_offset: u64,
    ) {
        self.cmd.commands.push(Command::CopyTextureToBuffer {
            src,
            origin,
            extent,
            dst,
            dst_offset,
        });
    }

    pub fn copy_texture_to_texture(
        &mut self,
        src: TextureHandle,
        src_layer: u32,
        dst: TextureHandle,
        dst_layer: u32,
        dst_mip: u32,
    ) {
        self.cmd.commands.push(Command::CopyTextureToTexture {
            src,
            src_layer,
            dst,
            dst_layer,
            dst_mip,
        });
    }

    pub fn generate_mipmaps(&mut self, texture: TextureHandle) {
        self.cmd.commands.push(Command::GenerateMipmaps { texture });
    }

    pub fn barrier(
        &mut self,
        src_stages: PipelineStages,
        src_access: Access,
        dst_stages: PipelineStages,
        dst_access: Access,
    ) {
        self.cmd.commands.push(Command::Barrier {
            src_stages,
            src_access,
            dst_stages,
            dst_access,
        });
    }
}
