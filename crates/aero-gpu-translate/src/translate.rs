//! Mapping of the translation layer's state vocabulary onto wgpu types.
//!
//! Used by wgpu-based backends when building pipeline descriptors, and to derive a
//! [`HostCapabilities`] from a wgpu adapter.

use crate::caps::{HostCapabilities, Vendor, Workarounds};
use crate::error::{Result, TranslateError};
use crate::types::{
    BlendDescriptor, BlendFactor, BlendOp, ColorWriteMask, CompareOp, CullMode, DepthBias,
    DepthTest, Format, FrontFace, IndexType, NativeTopology, PolygonMode, StencilFace, StencilOp,
    StencilTest, VertexFormat, VertexStepMode,
};

pub fn translate_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::ConstantColor => wgpu::BlendFactor::Constant,
        BlendFactor::OneMinusConstantColor => wgpu::BlendFactor::OneMinusConstant,
        BlendFactor::SrcAlphaSaturate => wgpu::BlendFactor::SrcAlphaSaturated,
    }
}

pub fn translate_blend_op(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOp::Min => wgpu::BlendOperation::Min,
        BlendOp::Max => wgpu::BlendOperation::Max,
    }
}

/// `None` when blending is disabled for the target.
pub fn translate_blend_state(desc: &BlendDescriptor) -> Option<wgpu::BlendState> {
    if !desc.enable {
        return None;
    }
    Some(wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: translate_blend_factor(desc.color_src),
            dst_factor: translate_blend_factor(desc.color_dst),
            operation: translate_blend_op(desc.color_op),
        },
        alpha: wgpu::BlendComponent {
            src_factor: translate_blend_factor(desc.alpha_src),
            dst_factor: translate_blend_factor(desc.alpha_dst),
            operation: translate_blend_op(desc.alpha_op),
        },
    })
}

pub fn translate_color_write_mask(mask: ColorWriteMask) -> wgpu::ColorWrites {
    let mut out = wgpu::ColorWrites::empty();
    if mask.contains(ColorWriteMask::RED) {
        out |= wgpu::ColorWrites::RED;
    }
    if mask.contains(ColorWriteMask::GREEN) {
        out |= wgpu::ColorWrites::GREEN;
    }
    if mask.contains(ColorWriteMask::BLUE) {
        out |= wgpu::ColorWrites::BLUE;
    }
    if mask.contains(ColorWriteMask::ALPHA) {
        out |= wgpu::ColorWrites::ALPHA;
    }
    out
}

pub fn translate_compare_op(op: CompareOp) -> wgpu::CompareFunction {
    match op {
        CompareOp::Never => wgpu::CompareFunction::Never,
        CompareOp::Less => wgpu::CompareFunction::Less,
        CompareOp::Equal => wgpu::CompareFunction::Equal,
        CompareOp::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareOp::Greater => wgpu::CompareFunction::Greater,
        CompareOp::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareOp::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareOp::Always => wgpu::CompareFunction::Always,
    }
}

pub fn translate_stencil_op(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::IncrementAndClamp => wgpu::StencilOperation::IncrementClamp,
        StencilOp::DecrementAndClamp => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
        StencilOp::IncrementAndWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::DecrementAndWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

fn translate_stencil_face(face: &StencilFace) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: translate_compare_op(face.compare),
        fail_op: translate_stencil_op(face.fail_op),
        depth_fail_op: translate_stencil_op(face.depth_fail_op),
        pass_op: translate_stencil_op(face.pass_op),
    }
}

/// wgpu cannot cull both faces; callers drop such draws instead.
pub fn translate_cull_mode(mode: CullMode) -> Result<Option<wgpu::Face>> {
    match mode {
        CullMode::None => Ok(None),
        CullMode::Front => Ok(Some(wgpu::Face::Front)),
        CullMode::Back => Ok(Some(wgpu::Face::Back)),
        CullMode::FrontAndBack => Err(TranslateError::Unsupported("front-and-back culling")),
    }
}

pub fn translate_front_face(face: FrontFace) -> wgpu::FrontFace {
    match face {
        FrontFace::CounterClockwise => wgpu::FrontFace::Ccw,
        FrontFace::Clockwise => wgpu::FrontFace::Cw,
    }
}

pub fn translate_polygon_mode(mode: PolygonMode) -> wgpu::PolygonMode {
    match mode {
        PolygonMode::Fill => wgpu::PolygonMode::Fill,
        PolygonMode::Line => wgpu::PolygonMode::Line,
        PolygonMode::Point => wgpu::PolygonMode::Point,
    }
}

/// wgpu has no fans, adjacency or patches.
pub fn translate_topology(topology: NativeTopology) -> Option<wgpu::PrimitiveTopology> {
    Some(match topology {
        NativeTopology::PointList => wgpu::PrimitiveTopology::PointList,
        NativeTopology::LineList => wgpu::PrimitiveTopology::LineList,
        NativeTopology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        NativeTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        NativeTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        NativeTopology::TriangleFan
        | NativeTopology::LineListWithAdjacency
        | NativeTopology::LineStripWithAdjacency
        | NativeTopology::TriangleListWithAdjacency
        | NativeTopology::TriangleStripWithAdjacency
        | NativeTopology::PatchList => return None,
    })
}

pub fn translate_format(format: Format) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as T;
    Some(match format {
        Format::R8Unorm => T::R8Unorm,
        Format::R8Uint => T::R8Uint,
        Format::R8Sint => T::R8Sint,
        Format::Rg8Unorm => T::Rg8Unorm,
        Format::Rgba8Unorm => T::Rgba8Unorm,
        Format::Rgba8Srgb => T::Rgba8UnormSrgb,
        Format::Bgra8Unorm => T::Bgra8Unorm,
        Format::Rgba8Uint => T::Rgba8Uint,
        Format::Rgba8Sint => T::Rgba8Sint,
        Format::R16Float => T::R16Float,
        Format::R16Uint => T::R16Uint,
        Format::R16Sint => T::R16Sint,
        Format::Rg16Float => T::Rg16Float,
        Format::Rgba16Float => T::Rgba16Float,
        Format::Rgba16Uint => T::Rgba16Uint,
        Format::R32Float => T::R32Float,
        Format::R32Uint => T::R32Uint,
        Format::R32Sint => T::R32Sint,
        Format::Rg32Float => T::Rg32Float,
        Format::Rg32Uint => T::Rg32Uint,
        Format::Rgba32Float => T::Rgba32Float,
        Format::Rgba32Uint => T::Rgba32Uint,
        Format::Rgba32Sint => T::Rgba32Sint,
        Format::Rgb10a2Unorm => T::Rgb10a2Unorm,
        Format::Rg11b10Float => T::Rg11b10Float,
        Format::D16Unorm => T::Depth16Unorm,
        // wgpu only exposes the "24 bits or better" variant.
        Format::D24UnormS8Uint => T::Depth24PlusStencil8,
        Format::D32Float => T::Depth32Float,
        Format::D32FloatS8Uint => T::Depth32FloatStencil8,
        Format::S8Uint => T::Stencil8,
    })
}

pub fn translate_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    use wgpu::VertexFormat as V;
    match format {
        VertexFormat::Uint8x2 => V::Uint8x2,
        VertexFormat::Uint8x4 => V::Uint8x4,
        VertexFormat::Sint8x4 => V::Sint8x4,
        VertexFormat::Unorm8x2 => V::Unorm8x2,
        VertexFormat::Unorm8x4 => V::Unorm8x4,
        VertexFormat::Snorm8x4 => V::Snorm8x4,
        VertexFormat::Uint16x2 => V::Uint16x2,
        VertexFormat::Uint16x4 => V::Uint16x4,
        VertexFormat::Sint16x2 => V::Sint16x2,
        VertexFormat::Unorm16x2 => V::Unorm16x2,
        VertexFormat::Unorm16x4 => V::Unorm16x4,
        VertexFormat::Snorm16x2 => V::Snorm16x2,
        VertexFormat::Float16x2 => V::Float16x2,
        VertexFormat::Float16x4 => V::Float16x4,
        VertexFormat::Float32 => V::Float32,
        VertexFormat::Float32x2 => V::Float32x2,
        VertexFormat::Float32x3 => V::Float32x3,
        VertexFormat::Float32x4 => V::Float32x4,
        VertexFormat::Uint32 => V::Uint32,
        VertexFormat::Uint32x2 => V::Uint32x2,
        VertexFormat::Uint32x4 => V::Uint32x4,
        VertexFormat::Sint32 => V::Sint32,
        VertexFormat::Sint32x4 => V::Sint32x4,
    }
}

pub fn translate_step_mode(step: VertexStepMode) -> wgpu::VertexStepMode {
    match step {
        VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
        VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
    }
}

/// `None` for 8-bit indices, which have to be widened first.
pub fn translate_index_type(index_type: IndexType) -> Option<wgpu::IndexFormat> {
    match index_type {
        IndexType::U8 => None,
        IndexType::U16 => Some(wgpu::IndexFormat::Uint16),
        IndexType::U32 => Some(wgpu::IndexFormat::Uint32),
    }
}

/// Depth/stencil state for a pipeline rendering to `format`. `None` when the format has no
/// depth or stencil aspect (or is unknown to wgpu).
pub fn translate_depth_stencil_state(
    format: Format,
    depth: &DepthTest,
    stencil: &StencilTest,
    bias: &DepthBias,
) -> Option<wgpu::DepthStencilState> {
    if !format.is_depth_stencil() {
        return None;
    }
    let format = translate_format(format)?;

    let depth_compare = if depth.test_enable {
        translate_compare_op(depth.compare)
    } else {
        wgpu::CompareFunction::Always
    };
    let stencil = if stencil.enable {
        wgpu::StencilState {
            front: translate_stencil_face(&stencil.front),
            back: translate_stencil_face(&stencil.back),
            // wgpu masks are shared between faces.
            read_mask: stencil.front.compare_mask,
            write_mask: stencil.front.write_mask,
        }
    } else {
        wgpu::StencilState::default()
    };
    let bias = if bias.enable {
        wgpu::DepthBiasState {
            constant: bias.constant_factor as i32,
            slope_scale: bias.slope_factor,
            clamp: bias.clamp,
        }
    } else {
        wgpu::DepthBiasState::default()
    };

    Some(wgpu::DepthStencilState {
        format,
        depth_write_enabled: depth.test_enable && depth.write_enable,
        depth_compare,
        stencil,
        bias,
    })
}

impl HostCapabilities {
    /// Capability descriptor of a wgpu device.
    ///
    /// wgpu pipelines bake all state, so the tier is always baseline, and there is one
    /// viewport and no native fans or 8-bit indices.
    pub fn from_wgpu(features: wgpu::Features, info: &wgpu::AdapterInfo) -> Self {
        let vendor = Vendor::from_pci_id(info.vendor);
        let mut workarounds = Workarounds::for_vendor(vendor);
        if info.device_type == wgpu::DeviceType::Cpu {
            workarounds = Workarounds::empty();
        }
        Self {
            indirect_draw_count: features.contains(wgpu::Features::MULTI_DRAW_INDIRECT_COUNT),
            index_buffer_alignment: wgpu::COPY_BUFFER_ALIGNMENT,
            vendor,
            workarounds,
            ..HostCapabilities::default()
        }
    }
}
