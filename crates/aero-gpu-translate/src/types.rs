//! Guest-facing state vocabulary shared by the shadows, caches and the command stream.
//!
//! These are "semantic" enums (not raw guest register encodings) so the rest of the
//! translation layer stays independent of how the guest API packs its state words.

use std::fmt;

use bitflags::bitflags;

pub const MAX_RENDER_TARGETS: usize = 8;
pub const MAX_VERTEX_BUFFERS: usize = 16;
pub const MAX_VERTEX_ATTRIBS: usize = 32;
pub const MAX_TRANSFORM_FEEDBACK_BUFFERS: usize = 4;
pub const MAX_VIEWPORTS: usize = 16;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);
    };
}

handle!(
    /// Guest buffer handle, as seen by the emulated API.
    BufferHandle
);
handle!(
    /// Identity of the host allocation currently backing a guest buffer.
    AllocationId
);
handle!(
    /// Native buffer object.
    NativeBuffer
);
handle!(ImageViewId);
handle!(ProgramId);
handle!(PipelineLayoutId);
handle!(NativePipeline);
handle!(NativeRenderPass);
handle!(NativeFramebuffer);
handle!(
    /// Monotonic serial of a command-recording context.
    ContextId
);

/// Byte range of a guest buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferRange {
    pub handle: BufferHandle,
    pub offset: u64,
    pub size: u64,
}

impl BufferRange {
    pub fn new(handle: BufferHandle, offset: u64, size: u64) -> Self {
        Self {
            handle,
            offset,
            size,
        }
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    pub fn overlaps(&self, offset: u64, size: u64) -> bool {
        let end = offset.saturating_add(size);
        self.offset < end && offset < self.end()
    }
}

/// Sub-range of a native buffer, valid for the current recording context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeBufferSlice {
    pub buffer: NativeBuffer,
    pub offset: u64,
    pub size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Graphics,
    Compute,
}

impl BindPoint {
    pub(crate) fn index(self) -> usize {
        match self {
            BindPoint::Graphics => 0,
            BindPoint::Compute => 1,
        }
    }
}

/// Primitive topologies the guest API can request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
    QuadStrip,
    Polygon,
    LinesAdjacency,
    LineStripAdjacency,
    TrianglesAdjacency,
    TriangleStripAdjacency,
    Patches,
}

impl fmt::Display for PrimitiveTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveTopology::Points => "points",
            PrimitiveTopology::Lines => "lines",
            PrimitiveTopology::LineLoop => "line_loop",
            PrimitiveTopology::LineStrip => "line_strip",
            PrimitiveTopology::Triangles => "triangles",
            PrimitiveTopology::TriangleStrip => "triangle_strip",
            PrimitiveTopology::TriangleFan => "triangle_fan",
            PrimitiveTopology::Quads => "quads",
            PrimitiveTopology::QuadStrip => "quad_strip",
            PrimitiveTopology::Polygon => "polygon",
            PrimitiveTopology::LinesAdjacency => "lines_adjacency",
            PrimitiveTopology::LineStripAdjacency => "line_strip_adjacency",
            PrimitiveTopology::TrianglesAdjacency => "triangles_adjacency",
            PrimitiveTopology::TriangleStripAdjacency => "triangle_strip_adjacency",
            PrimitiveTopology::Patches => "patches",
        };
        f.write_str(s)
    }
}

/// Topologies the target API can draw directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum NativeTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineListWithAdjacency,
    LineStripWithAdjacency,
    TriangleListWithAdjacency,
    TriangleStripWithAdjacency,
    PatchList,
}

/// Topology class: the part of the topology that stays baked into a pipeline object when
/// the exact topology is dynamic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TopologyClass {
    Point,
    Line,
    Triangle,
    Patch,
}

impl NativeTopology {
    pub fn class(self) -> TopologyClass {
        match self {
            NativeTopology::PointList => TopologyClass::Point,
            NativeTopology::LineList
            | NativeTopology::LineStrip
            | NativeTopology::LineListWithAdjacency
            | NativeTopology::LineStripWithAdjacency => TopologyClass::Line,
            NativeTopology::TriangleList
            | NativeTopology::TriangleStrip
            | NativeTopology::TriangleFan
            | NativeTopology::TriangleListWithAdjacency
            | NativeTopology::TriangleStripWithAdjacency => TopologyClass::Triangle,
            NativeTopology::PatchList => TopologyClass::Patch,
        }
    }
}

impl TopologyClass {
    /// Topology used when creating a pipeline whose exact topology is set dynamically.
    pub fn representative(self) -> NativeTopology {
        match self {
            TopologyClass::Point => NativeTopology::PointList,
            TopologyClass::Line => NativeTopology::LineList,
            TopologyClass::Triangle => NativeTopology::TriangleList,
            TopologyClass::Patch => NativeTopology::PatchList,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Blend configuration of one render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendDescriptor {
    pub enable: bool,
    pub color_op: BlendOp,
    pub color_src: BlendFactor,
    pub color_dst: BlendFactor,
    pub alpha_op: BlendOp,
    pub alpha_src: BlendFactor,
    pub alpha_dst: BlendFactor,
}

impl Default for BlendDescriptor {
    fn default() -> Self {
        Self {
            enable: false,
            color_op: BlendOp::Add,
            color_src: BlendFactor::One,
            color_dst: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            alpha_src: BlendFactor::One,
            alpha_dst: BlendFactor::Zero,
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        ColorWriteMask::ALL
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilFace {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilFace {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare: CompareOp::Always,
            compare_mask: 0xff,
            write_mask: 0xff,
            reference: 0,
        }
    }
}

impl StencilFace {
    pub(crate) fn same_ops(&self, other: &StencilFace) -> bool {
        self.fail_op == other.fail_op
            && self.pass_op == other.pass_op
            && self.depth_fail_op == other.depth_fail_op
            && self.compare == other.compare
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct DepthTest {
    pub test_enable: bool,
    pub write_enable: bool,
    pub compare: CompareOp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct StencilTest {
    pub enable: bool,
    pub front: StencilFace,
    pub back: StencilFace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
    FrontAndBack,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LogicOp {
    Clear,
    And,
    AndReverse,
    #[default]
    Copy,
    AndInverted,
    NoOp,
    Xor,
    Or,
    Nor,
    Equivalent,
    Invert,
    OrReverse,
    CopyInverted,
    OrInverted,
    Nand,
    Set,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct DepthBias {
    pub enable: bool,
    pub constant_factor: f32,
    pub slope_factor: f32,
    pub clamp: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }

    /// Intersection of two rectangles; empty (zero-sized) when they do not overlap.
    pub fn intersect(&self, other: &Rect2D) -> Rect2D {
        let x0 = i64::from(self.x).max(i64::from(other.x));
        let y0 = i64::from(self.y).max(i64::from(other.y));
        let x1 = (i64::from(self.x) + i64::from(self.width))
            .min(i64::from(other.x) + i64::from(other.width));
        let y1 = (i64::from(self.y) + i64::from(self.height))
            .min(i64::from(other.y) + i64::from(other.height));
        if x1 <= x0 || y1 <= y0 {
            return Rect2D {
                x: x0 as i32,
                y: y0 as i32,
                width: 0,
                height: 0,
            };
        }
        Rect2D {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        }
    }
}

/// Attachment / image formats the translation layer needs to reason about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    R8Unorm,
    R8Uint,
    R8Sint,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Rgba8Uint,
    Rgba8Sint,
    R16Float,
    R16Uint,
    R16Sint,
    Rg16Float,
    Rgba16Float,
    Rgba16Uint,
    R32Float,
    R32Uint,
    R32Sint,
    Rg32Float,
    Rg32Uint,
    Rgba32Float,
    Rgba32Uint,
    Rgba32Sint,
    Rgb10a2Unorm,
    Rg11b10Float,
    D16Unorm,
    D24UnormS8Uint,
    D32Float,
    D32FloatS8Uint,
    S8Uint,
}

impl Format {
    pub fn is_integer(self) -> bool {
        self.is_unsigned_integer() || self.is_signed_integer()
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            Format::R8Uint
                | Format::Rgba8Uint
                | Format::R16Uint
                | Format::Rgba16Uint
                | Format::R32Uint
                | Format::Rg32Uint
                | Format::Rgba32Uint
        )
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(
            self,
            Format::R8Sint | Format::Rgba8Sint | Format::R16Sint | Format::R32Sint | Format::Rgba32Sint
        )
    }

    pub fn has_depth(self) -> bool {
        matches!(
            self,
            Format::D16Unorm | Format::D24UnormS8Uint | Format::D32Float | Format::D32FloatS8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            Format::D24UnormS8Uint | Format::D32FloatS8Uint | Format::S8Uint
        )
    }

    pub fn is_depth_stencil(self) -> bool {
        self.has_depth() || self.has_stencil()
    }
}

/// Vertex attribute formats, named after their component layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Uint8x2,
    Uint8x4,
    Sint8x4,
    Unorm8x2,
    Unorm8x4,
    Snorm8x4,
    Uint16x2,
    Uint16x4,
    Sint16x2,
    Unorm16x2,
    Unorm16x4,
    Snorm16x2,
    Float16x2,
    Float16x4,
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Uint32x2,
    Uint32x4,
    Sint32,
    Sint32x4,
}

impl VertexFormat {
    /// Size of one scalar component; vertex fetch requires this alignment on the target API.
    pub fn component_size(self) -> u32 {
        match self {
            VertexFormat::Uint8x2
            | VertexFormat::Uint8x4
            | VertexFormat::Sint8x4
            | VertexFormat::Unorm8x2
            | VertexFormat::Unorm8x4
            | VertexFormat::Snorm8x4 => 1,
            VertexFormat::Uint16x2
            | VertexFormat::Uint16x4
            | VertexFormat::Sint16x2
            | VertexFormat::Unorm16x2
            | VertexFormat::Unorm16x4
            | VertexFormat::Snorm16x2
            | VertexFormat::Float16x2
            | VertexFormat::Float16x4 => 2,
            VertexFormat::Float32
            | VertexFormat::Float32x2
            | VertexFormat::Float32x3
            | VertexFormat::Float32x4
            | VertexFormat::Uint32
            | VertexFormat::Uint32x2
            | VertexFormat::Uint32x4
            | VertexFormat::Sint32
            | VertexFormat::Sint32x4 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttrib {
    pub location: u32,
    pub binding: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexBindingDesc {
    pub binding: u32,
    pub stride: u32,
    pub step: VertexStepMode,
    pub divisor: u32,
}

/// Guest vertex buffer binding: the byte range plus the stride between vertices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    pub range: BufferRange,
    pub stride: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    U8,
    #[default]
    U16,
    U32,
}

impl IndexType {
    pub fn size_bytes(self) -> u64 {
        match self {
            IndexType::U8 => 1,
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u8 {
        const VERTEX = 1 << 0;
        const TESS_CONTROL = 1 << 1;
        const TESS_EVAL = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
        const COMPUTE = 1 << 5;
    }
}

/// Clear value for a color attachment; the variant must match the attachment's format class.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearColor {
    Float([f32; 4]),
    Sint([i32; 4]),
    Uint([u32; 4]),
}

impl ClearColor {
    /// Reinterprets a float clear color for an attachment of `format`.
    pub fn for_format(color: [f32; 4], format: Format) -> ClearColor {
        if format.is_unsigned_integer() {
            ClearColor::Uint(color.map(|c| c.max(0.0) as u32))
        } else if format.is_signed_integer() {
            ClearColor::Sint(color.map(|c| c as i32))
        } else {
            ClearColor::Float(color)
        }
    }
}

/// One bound render target as supplied by the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTarget {
    pub view: ImageViewId,
    pub format: Format,
    pub extent: Extent2D,
    pub layers: u32,
    pub samples: u32,
}
