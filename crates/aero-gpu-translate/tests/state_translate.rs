mod common;

use aero_gpu_translate::caps::{DynamicStateTier, HostCapabilities, Vendor, Workarounds};
use aero_gpu_translate::translate::{
    translate_blend_state, translate_color_write_mask, translate_cull_mode,
    translate_depth_stencil_state, translate_front_face, translate_polygon_mode,
    translate_step_mode, translate_topology, translate_vertex_format,
};
use aero_gpu_translate::types::{
    BlendDescriptor, BlendFactor, BlendOp, ColorWriteMask, CompareOp, CullMode, DepthBias,
    DepthTest, Format, FrontFace, NativeTopology, PolygonMode, PrimitiveTopology, StencilFace,
    StencilOp, StencilTest, VertexFormat, VertexStepMode,
};
use aero_gpu_translate::{NativeCmd, TranslateError};
use pretty_assertions::assert_eq;

use common::{recording, runtime};

fn adapter(vendor: u32, device_type: wgpu::DeviceType) -> wgpu::AdapterInfo {
    wgpu::AdapterInfo {
        name: "test adapter".into(),
        vendor,
        device: 0,
        device_type,
        driver: String::new(),
        driver_info: String::new(),
        backend: wgpu::Backend::Vulkan,
    }
}

#[test]
fn premultiplied_alpha_blend() {
    let desc = BlendDescriptor {
        enable: true,
        color_op: BlendOp::Add,
        color_src: BlendFactor::One,
        color_dst: BlendFactor::OneMinusSrcAlpha,
        alpha_op: BlendOp::ReverseSubtract,
        alpha_src: BlendFactor::ConstantColor,
        alpha_dst: BlendFactor::Zero,
    };
    assert_eq!(
        translate_blend_state(&desc),
        Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Constant,
                dst_factor: wgpu::BlendFactor::Zero,
                operation: wgpu::BlendOperation::ReverseSubtract,
            },
        })
    );
    assert_eq!(translate_blend_state(&BlendDescriptor::default()), None);
}

#[test]
fn write_masks_map_per_channel() {
    assert_eq!(
        translate_color_write_mask(ColorWriteMask::RED | ColorWriteMask::ALPHA),
        wgpu::ColorWrites::RED | wgpu::ColorWrites::ALPHA
    );
    assert_eq!(
        translate_color_write_mask(ColorWriteMask::empty()),
        wgpu::ColorWrites::empty()
    );
}

#[test]
fn culling_both_faces_has_no_wgpu_equivalent() {
    assert_eq!(translate_cull_mode(CullMode::Back).unwrap(), Some(wgpu::Face::Back));
    assert!(matches!(
        translate_cull_mode(CullMode::FrontAndBack),
        Err(TranslateError::Unsupported(_))
    ));
}

#[test]
fn rasterizer_and_vertex_input_enums() {
    assert_eq!(
        translate_front_face(FrontFace::CounterClockwise),
        wgpu::FrontFace::Ccw
    );
    assert_eq!(translate_front_face(FrontFace::Clockwise), wgpu::FrontFace::Cw);
    assert_eq!(translate_polygon_mode(PolygonMode::Line), wgpu::PolygonMode::Line);
    assert_eq!(
        translate_step_mode(VertexStepMode::Instance),
        wgpu::VertexStepMode::Instance
    );

    // Component size times count has to agree with what wgpu fetches.
    for (format, components) in [
        (VertexFormat::Unorm8x4, 4),
        (VertexFormat::Sint16x2, 2),
        (VertexFormat::Float16x4, 4),
        (VertexFormat::Float32x3, 3),
        (VertexFormat::Uint32, 1),
    ] {
        assert_eq!(
            translate_vertex_format(format).size(),
            u64::from(format.component_size() * components),
            "{format:?}"
        );
    }
}

#[test]
fn fans_and_adjacency_are_not_wgpu_topologies() {
    assert_eq!(
        translate_topology(NativeTopology::TriangleStrip),
        Some(wgpu::PrimitiveTopology::TriangleStrip)
    );
    assert_eq!(translate_topology(NativeTopology::TriangleFan), None);
    assert_eq!(translate_topology(NativeTopology::PatchList), None);
}

#[test]
fn depth_stencil_state() {
    let depth = DepthTest {
        test_enable: true,
        write_enable: true,
        compare: CompareOp::LessEqual,
    };
    let face = StencilFace {
        fail_op: StencilOp::Keep,
        pass_op: StencilOp::Replace,
        depth_fail_op: StencilOp::IncrementAndWrap,
        compare: CompareOp::Equal,
        compare_mask: 0x0f,
        write_mask: 0xf0,
        reference: 1,
    };
    let stencil = StencilTest {
        enable: true,
        front: face,
        back: face,
    };
    let bias = DepthBias {
        enable: true,
        constant_factor: 2.0,
        slope_factor: 1.5,
        clamp: 0.0,
    };

    let state =
        translate_depth_stencil_state(Format::D24UnormS8Uint, &depth, &stencil, &bias).unwrap();
    assert_eq!(state.format, wgpu::TextureFormat::Depth24PlusStencil8);
    assert!(state.depth_write_enabled);
    assert_eq!(state.depth_compare, wgpu::CompareFunction::LessEqual);
    assert_eq!(state.stencil.front.pass_op, wgpu::StencilOperation::Replace);
    assert_eq!(
        state.stencil.back.depth_fail_op,
        wgpu::StencilOperation::IncrementWrap
    );
    assert_eq!(state.stencil.read_mask, 0x0f);
    assert_eq!(state.stencil.write_mask, 0xf0);
    assert_eq!(state.bias.constant, 2);

    // Writes need the test enabled; a disabled test always passes.
    let no_test = DepthTest {
        test_enable: false,
        ..depth
    };
    let state = translate_depth_stencil_state(
        Format::D32Float,
        &no_test,
        &StencilTest::default(),
        &DepthBias::default(),
    )
    .unwrap();
    assert!(!state.depth_write_enabled);
    assert_eq!(state.depth_compare, wgpu::CompareFunction::Always);
    assert_eq!(state.stencil, wgpu::StencilState::default());

    assert!(translate_depth_stencil_state(
        Format::Rgba8Unorm,
        &depth,
        &stencil,
        &bias
    )
    .is_none());
}

#[test]
fn wgpu_adapter_capabilities() {
    let caps = HostCapabilities::from_wgpu(
        wgpu::Features::MULTI_DRAW_INDIRECT_COUNT,
        &adapter(0x5143, wgpu::DeviceType::IntegratedGpu),
    );
    assert_eq!(caps.vendor, Vendor::Qualcomm);
    assert!(caps.indirect_draw_count);
    assert!(!caps.triangle_fans);
    assert!(caps
        .workarounds
        .contains(Workarounds::DEDUPLICATE_COLOR_ATTACHMENTS));

    let software = HostCapabilities::from_wgpu(
        wgpu::Features::empty(),
        &adapter(0x5143, wgpu::DeviceType::Cpu),
    );
    assert_eq!(software.workarounds, Workarounds::empty());
    assert!(!software.indirect_draw_count);

    let rt = runtime(caps);
    assert_eq!(rt.tier(), DynamicStateTier::Baseline);
}

#[test]
fn wgpu_hosts_emulate_fans() {
    let caps = HostCapabilities::from_wgpu(
        wgpu::Features::empty(),
        &adapter(0x10de, wgpu::DeviceType::DiscreteGpu),
    );
    let mut rt = recording(caps);
    rt.set_primitive_topology(PrimitiveTopology::TriangleFan);
    assert_eq!(rt.native_topology(), NativeTopology::TriangleList);
    rt.draw(6, 1, 0, 0).unwrap();
    assert!(rt.commands().iter().any(|c| matches!(
        c,
        NativeCmd::DrawIndexed {
            index_count: 12,
            ..
        }
    )));
    assert!(rt
        .commands()
        .iter()
        .all(|c| !matches!(c, NativeCmd::SetPrimitiveTopology(_))));
}
