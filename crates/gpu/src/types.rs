use bitflags::bitflags;

/// Generates an index + generation handle type. Handles are plain data;
/// the owning device validates generations on use.
macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub struct $name {
            pub index: u32,
            pub generation: u32,
        }

        impl $name {
            pub const NULL: $name = $name {
                index: u32::MAX,
                generation: u32::MAX,
            };

            pub fn new(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            pub fn is_null(self) -> bool {
                self.index == u32::MAX || self.generation == u32::MAX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NULL
            }
        }
    };
}

define_handle!(BufferHandle);
define_handle!(TextureHandle);
define_handle!(SamplerHandle);
define_handle!(BindGroupLayoutHandle);
define_handle!(BindGroupHandle);
define_handle!(ShaderHandle);
define_handle!(ComputeShaderHandle);
define_handle!(RenderPassLayoutHandle);
define_handle!(RenderPassHandle);
define_handle!(SemaphoreHandle);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    R8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Rg32Uint,
    R32Uint,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    Depth24Stencil8,
}

impl Format {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Format::R8Unorm => 1,
            Format::Rgba8Unorm | Format::Rgba8Srgb | Format::Bgra8Unorm | Format::R32Uint => 4,
            Format::Rg32Uint => 8,
            Format::Rgba16Float => 8,
            Format::Rgba32Float => 16,
            Format::Depth32Float => 4,
            Format::Depth24Stencil8 => 4,
        }
    }

    pub fn has_depth(self) -> bool {
        matches!(self, Format::Depth32Float | Format::Depth24Stencil8)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::Depth24Stencil8)
    }
}

bitflags! {
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
        const STAGING = 1 << 6;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferMemory {
    DeviceLocal,
    HostVisible,
}

#[derive(Clone, Debug)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: BufferMemory,
    pub label: Option<&'static str>,
}

bitflags! {
    pub struct TextureUsage: u32 {
        const SAMPLED = 1 << 0;
        const COLOR_ATTACHMENT = 1 << 1;
        const DEPTH_ATTACHMENT = 1 << 2;
        const INPUT_ATTACHMENT = 1 << 3;
        const STORAGE = 1 << 4;
        const TRANSFER_SRC = 1 << 5;
        const TRANSFER_DST = 1 << 6;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureKind {
    D2,
    D2Array,
    Cube,
}

#[derive(Clone, Debug)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub mips: u32,
    pub format: Format,
    pub kind: TextureKind,
    pub usage: TextureUsage,
    pub label: Option<&'static str>,
}

impl TextureDesc {
    pub fn d2(width: u32, height: u32, format: Format, usage: TextureUsage) -> Self {
        Self {
            width,
            height,
            layers: 1,
            mips: 1,
            format,
            kind: TextureKind::D2,
            usage,
            label: None,
        }
    }

    pub fn cube(resolution: u32, mips: u32, format: Format, usage: TextureUsage) -> Self {
        Self {
            width: resolution,
            height: resolution,
            layers: 6,
            mips,
            format,
            kind: TextureKind::Cube,
            usage,
            label: None,
        }
    }

    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wrap {
    Clamp,
    Repeat,
    Mirror,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    LessOrEqual,
    Equal,
    Greater,
    GreaterOrEqual,
    Always,
}

#[derive(Clone, Debug)]
pub struct SamplerDesc {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub wrap: Wrap,
    pub compare: Option<CompareOp>,
    pub label: Option<&'static str>,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            wrap: Wrap::Clamp,
            compare: None,
            label: None,
        }
    }
}

bitflags! {
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const ALL = Self::VERTEX.bits | Self::FRAGMENT.bits | Self::COMPUTE.bits;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferBindingKind {
    Uniform,
    DynamicUniform,
    Storage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureBindingKind {
    Sampled,
    Storage,
    InputAttachment,
}

#[derive(Clone, Copy, Debug)]
pub struct BufferBinding {
    pub slot: u32,
    pub kind: BufferBindingKind,
    pub stages: ShaderStages,
}

#[derive(Clone, Copy, Debug)]
pub struct TextureBinding {
    pub slot: u32,
    pub kind: TextureBindingKind,
    /// Descriptor array length; 1 for a single texture, larger for a
    /// bindless table.
    pub count: u32,
    pub stages: ShaderStages,
}

#[derive(Clone, Copy, Debug)]
pub struct SamplerBinding {
    pub slot: u32,
    pub stages: ShaderStages,
}

#[derive(Clone, Debug, Default)]
pub struct BindGroupLayoutDesc {
    pub buffers: Vec<BufferBinding>,
    pub textures: Vec<TextureBinding>,
    pub samplers: Vec<SamplerBinding>,
    pub label: Option<&'static str>,
}

#[derive(Clone, Debug)]
pub struct BindGroupDesc {
    pub layout: BindGroupLayoutHandle,
    pub label: Option<&'static str>,
}

#[derive(Clone, Copy, Debug)]
pub struct BufferWrite {
    pub slot: u32,
    pub buffer: BufferHandle,
    pub offset: u64,
    pub range: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct TextureWrite {
    pub slot: u32,
    /// Index into the binding's descriptor array.
    pub array_index: u32,
    pub texture: TextureHandle,
}

#[derive(Clone, Copy, Debug)]
pub struct SamplerWrite {
    pub slot: u32,
    pub sampler: SamplerHandle,
}

#[derive(Clone, Debug, Default)]
pub struct BindGroupUpdate {
    pub buffers: Vec<BufferWrite>,
    pub textures: Vec<TextureWrite>,
    pub samplers: Vec<SamplerWrite>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Clone, Copy, Debug)]
pub struct AttachmentDesc {
    pub format: Format,
    pub load: LoadOp,
    pub store: StoreOp,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

impl AttachmentDesc {
    pub fn color(format: Format) -> Self {
        Self {
            format,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            clear_color: [0.0; 4],
            clear_depth: 0.0,
        }
    }

    /// Reverse-Z depth clears to 0.
    pub fn depth(format: Format) -> Self {
        Self {
            format,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            clear_color: [0.0; 4],
            clear_depth: 0.0,
        }
    }
}

/// One subpass: which attachments it writes, which it reads as input
/// attachments, and its depth attachment, all as indices into the layout's
/// attachment list.
#[derive(Clone, Debug, Default)]
pub struct SubpassDesc {
    pub color_attachments: Vec<u32>,
    pub input_attachments: Vec<u32>,
    pub depth_attachment: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct RenderPassLayoutDesc {
    pub attachments: Vec<AttachmentDesc>,
    pub subpasses: Vec<SubpassDesc>,
    pub label: Option<&'static str>,
}

#[derive(Clone, Debug)]
pub struct RenderPassDesc {
    pub layout: RenderPassLayoutHandle,
    pub dimensions: (u32, u32),
    /// One texture per layout attachment.
    pub attachments: Vec<TextureHandle>,
    pub label: Option<&'static str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Fixed-function state a graphics shader variant is specialized against.
/// Packs into a u64 for variant hashing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphicsState {
    pub depth_write: bool,
    pub depth_test: CompareOp,
    pub cull_mode: CullMode,
    pub wireframe: bool,
    pub stencil_write: bool,
    pub stencil_test: bool,
    pub blend: BlendState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendState {
    Opaque,
    Alpha,
    Premultiplied,
    Additive,
    Multiply,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            depth_write: true,
            // reverse-Z: nearer fragments have larger depth
            depth_test: CompareOp::GreaterOrEqual,
            cull_mode: CullMode::Back,
            wireframe: false,
            stencil_write: false,
            stencil_test: false,
            blend: BlendState::Opaque,
        }
    }
}

impl GraphicsState {
    pub fn to_bits(self) -> u64 {
        (self.depth_write as u64)
            | (self.depth_test as u64) << 1
            | (self.cull_mode as u64) << 4
            | (self.wireframe as u64) << 6
            | (self.stencil_write as u64) << 7
            | (self.stencil_test as u64) << 8
            | (self.blend as u64) << 9
    }
}

#[derive(Clone, Debug)]
pub struct ShaderDesc {
    pub name: String,
    pub state: GraphicsState,
    /// Raw specialization-constant bytes, laid out per the manifest's slots.
    pub constants: Vec<u8>,
    pub pass_layout: Option<RenderPassLayoutHandle>,
    pub subpass: u32,
}

#[derive(Clone, Debug)]
pub struct ComputeShaderDesc {
    pub name: String,
    pub constants: Vec<u8>,
}

/// Device capabilities the renderer adapts to.
#[derive(Clone, Debug)]
pub struct DeviceLimits {
    pub max_bindless_textures: u32,
    pub max_bindless_cube_textures: u32,
    /// Six-wide viewport/scissor arrays, letting cube and cascade shadows
    /// submit one instanced draw instead of one per face.
    pub multi_viewport: bool,
    /// True when the backend's cubemap convention needs the ±X faces
    /// swapped relative to the engine's left-handed face table.
    pub cube_face_left_handed: bool,
    pub frames_in_flight: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_bindless_textures: 4096,
            max_bindless_cube_textures: 64,
            multi_viewport: false,
            cube_face_left_handed: true,
            frames_in_flight: 2,
        }
    }
}
