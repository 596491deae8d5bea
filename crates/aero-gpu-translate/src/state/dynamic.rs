//! Dynamic state shadow: values that can change without a new pipeline object.
//!
//! Setters only record the value and set a per-field dirty bit when the value actually
//! changes. [`DynamicState::replay`] runs right before a draw and emits exactly the dirty
//! fields, so repeating identical state calls costs nothing on the native side.

use bitflags::bitflags;

use crate::cmd::{CommandSink, NativeCmd, StencilFaces};
use crate::types::{
    CullMode, DepthTest, FrontFace, LogicOp, NativeTopology, Rect2D, StencilFace, Viewport,
};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DynamicFields: u32 {
        const CULL_MODE = 1 << 0;
        const FRONT_FACE = 1 << 1;
        const DEPTH_TEST_ENABLE = 1 << 2;
        const DEPTH_WRITE_ENABLE = 1 << 3;
        const DEPTH_COMPARE_OP = 1 << 4;
        const STENCIL_TEST_ENABLE = 1 << 5;
        const STENCIL_OP = 1 << 6;
        const STENCIL_COMPARE_MASK = 1 << 7;
        const STENCIL_WRITE_MASK = 1 << 8;
        const STENCIL_REFERENCE = 1 << 9;
        const BLEND_CONSTANTS = 1 << 10;
        const VIEWPORT = 1 << 11;
        const SCISSOR = 1 << 12;
        const LINE_WIDTH = 1 << 13;
        const PRIMITIVE_TOPOLOGY = 1 << 14;

        const RASTERIZER_DISCARD = 1 << 15;
        const PRIMITIVE_RESTART = 1 << 16;
        const PATCH_CONTROL_POINTS = 1 << 17;
        const LOGIC_OP = 1 << 18;

        const DEPTH = Self::DEPTH_TEST_ENABLE.bits()
            | Self::DEPTH_WRITE_ENABLE.bits()
            | Self::DEPTH_COMPARE_OP.bits();
        const STENCIL = Self::STENCIL_TEST_ENABLE.bits()
            | Self::STENCIL_OP.bits()
            | Self::STENCIL_COMPARE_MASK.bits()
            | Self::STENCIL_WRITE_MASK.bits()
            | Self::STENCIL_REFERENCE.bits();
        const TIER_A = Self::CULL_MODE.bits()
            | Self::FRONT_FACE.bits()
            | Self::DEPTH.bits()
            | Self::STENCIL.bits()
            | Self::BLEND_CONSTANTS.bits()
            | Self::VIEWPORT.bits()
            | Self::SCISSOR.bits()
            | Self::LINE_WIDTH.bits()
            | Self::PRIMITIVE_TOPOLOGY.bits();
    }
}

fn update<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

#[derive(Debug, Clone)]
pub struct DynamicState {
    covered: DynamicFields,
    dirty: DynamicFields,
    max_viewports: usize,

    cull_mode: CullMode,
    front_face: FrontFace,
    depth: DepthTest,
    stencil_enable: bool,
    stencil_front: StencilFace,
    stencil_back: StencilFace,
    blend_constants: [f32; 4],
    viewports: Vec<Viewport>,
    scissors: Vec<Rect2D>,
    line_width: f32,
    topology: NativeTopology,
    rasterizer_discard: bool,
    primitive_restart: bool,
    patch_control_points: u32,
    logic_op: LogicOp,
}

impl DynamicState {
    /// `covered` is the set of fields the active tier makes dynamic; everything starts dirty
    /// so the first draw of a context establishes the full state.
    pub fn new(covered: DynamicFields, max_viewports: usize) -> Self {
        Self {
            covered,
            dirty: covered,
            max_viewports: max_viewports.max(1),
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            depth: DepthTest::default(),
            stencil_enable: false,
            stencil_front: StencilFace::default(),
            stencil_back: StencilFace::default(),
            blend_constants: [0.0; 4],
            viewports: vec![Viewport::default()],
            scissors: vec![Rect2D {
                x: 0,
                y: 0,
                width: u32::MAX >> 1,
                height: u32::MAX >> 1,
            }],
            line_width: 1.0,
            topology: NativeTopology::TriangleList,
            rasterizer_discard: false,
            primitive_restart: false,
            patch_control_points: 1,
            logic_op: LogicOp::Copy,
        }
    }

    pub fn covered(&self) -> DynamicFields {
        self.covered
    }

    pub fn covers(&self, field: DynamicFields) -> bool {
        self.covered.contains(field)
    }

    pub fn dirty(&self) -> DynamicFields {
        self.dirty
    }

    fn mark(&mut self, changed: bool, field: DynamicFields) {
        if changed {
            self.dirty |= field & self.covered;
        }
    }

    /// Escape hatch for driver defects: the next replay re-emits every covered field.
    pub fn force_all_dirty(&mut self) {
        self.dirty = self.covered;
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) {
        let changed = update(&mut self.cull_mode, mode);
        self.mark(changed, DynamicFields::CULL_MODE);
    }

    pub fn set_front_face(&mut self, face: FrontFace) {
        let changed = update(&mut self.front_face, face);
        self.mark(changed, DynamicFields::FRONT_FACE);
    }

    pub fn set_depth_test(&mut self, depth: DepthTest) {
        let old = self.depth;
        self.depth = depth;
        self.mark(
            old.test_enable != depth.test_enable,
            DynamicFields::DEPTH_TEST_ENABLE,
        );
        self.mark(
            old.write_enable != depth.write_enable,
            DynamicFields::DEPTH_WRITE_ENABLE,
        );
        self.mark(old.compare != depth.compare, DynamicFields::DEPTH_COMPARE_OP);
    }

    pub fn set_stencil(&mut self, enable: bool, front: StencilFace, back: StencilFace) {
        let changed = update(&mut self.stencil_enable, enable);
        self.mark(changed, DynamicFields::STENCIL_TEST_ENABLE);

        let (old_front, old_back) = (self.stencil_front, self.stencil_back);
        self.stencil_front = front;
        self.stencil_back = back;
        self.mark(
            !old_front.same_ops(&front) || !old_back.same_ops(&back),
            DynamicFields::STENCIL_OP,
        );
        self.mark(
            old_front.compare_mask != front.compare_mask || old_back.compare_mask != back.compare_mask,
            DynamicFields::STENCIL_COMPARE_MASK,
        );
        self.mark(
            old_front.write_mask != front.write_mask || old_back.write_mask != back.write_mask,
            DynamicFields::STENCIL_WRITE_MASK,
        );
        self.mark(
            old_front.reference != front.reference || old_back.reference != back.reference,
            DynamicFields::STENCIL_REFERENCE,
        );
    }

    pub fn set_blend_constants(&mut self, constants: [f32; 4]) {
        let changed = update(&mut self.blend_constants, constants);
        self.mark(changed, DynamicFields::BLEND_CONSTANTS);
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) {
        if viewports.is_empty() {
            return;
        }
        let n = viewports.len().min(self.max_viewports);
        if self.viewports[..] != viewports[..n] {
            self.viewports.clear();
            self.viewports.extend_from_slice(&viewports[..n]);
            self.mark(true, DynamicFields::VIEWPORT);
        }
    }

    pub fn set_scissors(&mut self, scissors: &[Rect2D]) {
        if scissors.is_empty() {
            return;
        }
        let n = scissors.len().min(self.max_viewports);
        if self.scissors[..] != scissors[..n] {
            self.scissors.clear();
            self.scissors.extend_from_slice(&scissors[..n]);
            self.mark(true, DynamicFields::SCISSOR);
        }
    }

    pub fn set_line_width(&mut self, width: f32) {
        let changed = update(&mut self.line_width, width);
        self.mark(changed, DynamicFields::LINE_WIDTH);
    }

    pub fn set_topology(&mut self, topology: NativeTopology) {
        let changed = update(&mut self.topology, topology);
        self.mark(changed, DynamicFields::PRIMITIVE_TOPOLOGY);
    }

    /// Returns the previous value.
    pub fn set_rasterizer_discard(&mut self, enable: bool) -> bool {
        let old = self.rasterizer_discard;
        let changed = update(&mut self.rasterizer_discard, enable);
        self.mark(changed, DynamicFields::RASTERIZER_DISCARD);
        old
    }

    pub fn set_primitive_restart(&mut self, enable: bool) {
        let changed = update(&mut self.primitive_restart, enable);
        self.mark(changed, DynamicFields::PRIMITIVE_RESTART);
    }

    pub fn set_patch_control_points(&mut self, points: u32) {
        let changed = update(&mut self.patch_control_points, points);
        self.mark(changed, DynamicFields::PATCH_CONTROL_POINTS);
    }

    pub fn set_logic_op(&mut self, op: LogicOp) {
        let changed = update(&mut self.logic_op, op);
        self.mark(changed, DynamicFields::LOGIC_OP);
    }

    pub fn topology(&self) -> NativeTopology {
        self.topology
    }

    /// Emits native commands for every dirty field and clears the dirty set. Returns the
    /// number of commands emitted.
    pub fn replay(&mut self, sink: &mut dyn CommandSink) -> u32 {
        let dirty = self.dirty & self.covered;
        self.dirty = DynamicFields::empty();
        if dirty.is_empty() {
            return 0;
        }

        let mut emitted = 0u32;
        let mut emit = |cmd: NativeCmd| {
            sink.push(cmd);
            emitted += 1;
        };

        if dirty.contains(DynamicFields::CULL_MODE) {
            emit(NativeCmd::SetCullMode(self.cull_mode));
        }
        if dirty.contains(DynamicFields::FRONT_FACE) {
            emit(NativeCmd::SetFrontFace(self.front_face));
        }
        if dirty.contains(DynamicFields::DEPTH_TEST_ENABLE) {
            emit(NativeCmd::SetDepthTestEnable(self.depth.test_enable));
        }
        if dirty.contains(DynamicFields::DEPTH_WRITE_ENABLE) {
            emit(NativeCmd::SetDepthWriteEnable(self.depth.write_enable));
        }
        if dirty.contains(DynamicFields::DEPTH_COMPARE_OP) {
            emit(NativeCmd::SetDepthCompareOp(self.depth.compare));
        }
        if dirty.contains(DynamicFields::STENCIL_TEST_ENABLE) {
            emit(NativeCmd::SetStencilTestEnable(self.stencil_enable));
        }
        let (front, back) = (self.stencil_front, self.stencil_back);
        if dirty.contains(DynamicFields::STENCIL_OP) {
            if front.same_ops(&back) {
                emit(stencil_op_cmd(StencilFaces::FrontAndBack, &front));
            } else {
                emit(stencil_op_cmd(StencilFaces::Front, &front));
                emit(stencil_op_cmd(StencilFaces::Back, &back));
            }
        }
        if dirty.contains(DynamicFields::STENCIL_COMPARE_MASK) {
            for (faces, mask) in split_faces(front.compare_mask, back.compare_mask) {
                emit(NativeCmd::SetStencilCompareMask { faces, mask });
            }
        }
        if dirty.contains(DynamicFields::STENCIL_WRITE_MASK) {
            for (faces, mask) in split_faces(front.write_mask, back.write_mask) {
                emit(NativeCmd::SetStencilWriteMask { faces, mask });
            }
        }
        if dirty.contains(DynamicFields::STENCIL_REFERENCE) {
            for (faces, reference) in split_faces(front.reference, back.reference) {
                emit(NativeCmd::SetStencilReference { faces, reference });
            }
        }
        if dirty.contains(DynamicFields::BLEND_CONSTANTS) {
            emit(NativeCmd::SetBlendConstants(self.blend_constants));
        }
        if dirty.contains(DynamicFields::VIEWPORT) {
            emit(NativeCmd::SetViewports(self.viewports.clone()));
        }
        if dirty.contains(DynamicFields::SCISSOR) {
            emit(NativeCmd::SetScissors(self.scissors.clone()));
        }
        if dirty.contains(DynamicFields::LINE_WIDTH) {
            emit(NativeCmd::SetLineWidth(self.line_width));
        }
        if dirty.contains(DynamicFields::PRIMITIVE_TOPOLOGY) {
            emit(NativeCmd::SetPrimitiveTopology(self.topology));
        }
        if dirty.contains(DynamicFields::RASTERIZER_DISCARD) {
            emit(NativeCmd::SetRasterizerDiscardEnable(self.rasterizer_discard));
        }
        if dirty.contains(DynamicFields::PRIMITIVE_RESTART) {
            emit(NativeCmd::SetPrimitiveRestartEnable(self.primitive_restart));
        }
        if dirty.contains(DynamicFields::PATCH_CONTROL_POINTS) {
            emit(NativeCmd::SetPatchControlPoints(self.patch_control_points));
        }
        if dirty.contains(DynamicFields::LOGIC_OP) {
            emit(NativeCmd::SetLogicOp(self.logic_op));
        }
        emitted
    }
}

fn stencil_op_cmd(faces: StencilFaces, face: &StencilFace) -> NativeCmd {
    NativeCmd::SetStencilOp {
        faces,
        fail: face.fail_op,
        pass: face.pass_op,
        depth_fail: face.depth_fail_op,
        compare: face.compare,
    }
}

fn split_faces(front: u32, back: u32) -> impl Iterator<Item = (StencilFaces, u32)> {
    let pairs = if front == back {
        [Some((StencilFaces::FrontAndBack, front)), None]
    } else {
        [
            Some((StencilFaces::Front, front)),
            Some((StencilFaces::Back, back)),
        ]
    };
    pairs.into_iter().flatten()
}
