//! Backend-agnostic native command stream.
//!
//! The translation layer never talks to a graphics API directly. Every native command it
//! decides to issue is appended to a [`CommandSink`] as a [`NativeCmd`]; a backend encoder
//! replays the list against the real device.

use crate::types::{
    BindPoint, ClearColor, CompareOp, CullMode, FrontFace, IndexType, LogicOp, NativeBuffer,
    NativeBufferSlice, NativeFramebuffer, NativePipeline, NativeRenderPass, NativeTopology, Rect2D,
    StencilOp, Viewport,
};
use crate::topology::PatternKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilFaces {
    Front,
    Back,
    FrontAndBack,
}

/// What a single clear-attachments entry targets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearAttachment {
    Color {
        /// Index into the render pass' color attachment references (the guest slot).
        slot: u32,
        value: ClearColor,
    },
    DepthStencil {
        depth: Option<f32>,
        stencil: Option<u32>,
    },
}

bitflags::bitflags! {
    /// Kinds of synchronization a barrier collaborator may emit.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct BarrierKinds: u8 {
        const MEMORY = 1 << 0;
        const TEXTURE = 1 << 1;
        const COMMAND_BUFFER = 1 << 2;
        const ATTACHMENT_LOAD = 1 << 3;
    }
}

/// Native command stream entry.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeCmd {
    BindPipeline {
        bind_point: BindPoint,
        pipeline: NativePipeline,
    },

    // Dynamic state.
    SetCullMode(CullMode),
    SetFrontFace(FrontFace),
    SetDepthTestEnable(bool),
    SetDepthWriteEnable(bool),
    SetDepthCompareOp(CompareOp),
    SetStencilTestEnable(bool),
    SetStencilOp {
        faces: StencilFaces,
        fail: StencilOp,
        pass: StencilOp,
        depth_fail: StencilOp,
        compare: CompareOp,
    },
    SetStencilCompareMask {
        faces: StencilFaces,
        mask: u32,
    },
    SetStencilWriteMask {
        faces: StencilFaces,
        mask: u32,
    },
    SetStencilReference {
        faces: StencilFaces,
        reference: u32,
    },
    SetBlendConstants([f32; 4]),
    SetViewports(Vec<Viewport>),
    SetScissors(Vec<Rect2D>),
    SetLineWidth(f32),
    SetPrimitiveTopology(NativeTopology),
    SetRasterizerDiscardEnable(bool),
    SetPrimitiveRestartEnable(bool),
    SetPatchControlPoints(u32),
    SetLogicOp(LogicOp),

    BeginRenderPass {
        render_pass: NativeRenderPass,
        framebuffer: NativeFramebuffer,
        render_area: Rect2D,
    },
    EndRenderPass,
    ClearAttachments {
        attachments: Vec<ClearAttachment>,
        rect: Rect2D,
        base_layer: u32,
        layer_count: u32,
    },

    BindVertexBuffer {
        slot: u32,
        buffer: NativeBufferSlice,
        stride: u32,
    },
    BindIndexBuffer {
        buffer: NativeBufferSlice,
        index_type: IndexType,
    },
    BindTransformFeedbackBuffer {
        slot: u32,
        buffer: NativeBufferSlice,
    },
    /// Starts capture; `resume` continues from the counters written by the last pause.
    BeginTransformFeedback {
        resume: bool,
    },
    /// Stops capture; `pause` writes counters so capture can be resumed later.
    EndTransformFeedback {
        pause: bool,
    },

    UpdateBuffer {
        buffer: NativeBuffer,
        offset: u64,
        data: Vec<u8>,
    },
    CopyBuffer {
        src: NativeBufferSlice,
        dst: NativeBufferSlice,
    },
    PipelineBarrier(BarrierKinds),

    /// Rewrites `index_count` source indices starting at `first_index` through `pattern` into
    /// `dst` as 32-bit indices.
    ConvertIndices {
        pattern: PatternKind,
        src: NativeBufferSlice,
        src_type: IndexType,
        first_index: u32,
        index_count: u32,
        dst: NativeBufferSlice,
    },
    /// Converts indexed indirect draws: every argument record is rewritten to address its
    /// converted index range in `dst_indices`. Records at or beyond the draw count read from
    /// `count` are written as zero.
    ConvertIndexedIndirect {
        pattern: PatternKind,
        src_indices: NativeBufferSlice,
        src_type: IndexType,
        src_args: NativeBufferSlice,
        src_stride: u32,
        count: Option<NativeBufferSlice>,
        max_draw_count: u32,
        dst_indices: NativeBufferSlice,
        dst_args: NativeBufferSlice,
    },
    /// Converts non-indexed indirect draws into indexed draws over a pattern index buffer,
    /// with the same zero-fill rule as [`NativeCmd::ConvertIndexedIndirect`].
    ConvertIndirect {
        pattern: PatternKind,
        src_args: NativeBufferSlice,
        src_stride: u32,
        count: Option<NativeBufferSlice>,
        max_draw_count: u32,
        dst_args: NativeBufferSlice,
    },

    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    DrawIndirect {
        args: NativeBufferSlice,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        args: NativeBufferSlice,
        draw_count: u32,
        stride: u32,
    },
    DrawIndirectCount {
        args: NativeBufferSlice,
        count: NativeBufferSlice,
        max_draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirectCount {
        args: NativeBufferSlice,
        count: NativeBufferSlice,
        max_draw_count: u32,
        stride: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    DispatchIndirect {
        args: NativeBufferSlice,
    },
}

impl NativeCmd {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            NativeCmd::Draw { .. }
                | NativeCmd::DrawIndexed { .. }
                | NativeCmd::DrawIndirect { .. }
                | NativeCmd::DrawIndexedIndirect { .. }
                | NativeCmd::DrawIndirectCount { .. }
                | NativeCmd::DrawIndexedIndirectCount { .. }
        )
    }

    /// Dynamic state setters (anything replayed by the dynamic state shadow).
    pub fn is_dynamic_state(&self) -> bool {
        matches!(
            self,
            NativeCmd::SetCullMode(_)
                | NativeCmd::SetFrontFace(_)
                | NativeCmd::SetDepthTestEnable(_)
                | NativeCmd::SetDepthWriteEnable(_)
                | NativeCmd::SetDepthCompareOp(_)
                | NativeCmd::SetStencilTestEnable(_)
                | NativeCmd::SetStencilOp { .. }
                | NativeCmd::SetStencilCompareMask { .. }
                | NativeCmd::SetStencilWriteMask { .. }
                | NativeCmd::SetStencilReference { .. }
                | NativeCmd::SetBlendConstants(_)
                | NativeCmd::SetViewports(_)
                | NativeCmd::SetScissors(_)
                | NativeCmd::SetLineWidth(_)
                | NativeCmd::SetPrimitiveTopology(_)
                | NativeCmd::SetRasterizerDiscardEnable(_)
                | NativeCmd::SetPrimitiveRestartEnable(_)
                | NativeCmd::SetPatchControlPoints(_)
                | NativeCmd::SetLogicOp(_)
        )
    }
}

/// Destination for native commands.
pub trait CommandSink {
    fn push(&mut self, cmd: NativeCmd);
}

impl CommandSink for Vec<NativeCmd> {
    fn push(&mut self, cmd: NativeCmd) {
        Vec::push(self, cmd);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordMetrics {
    pub commands: u64,
    pub draws: u64,
    pub pipeline_binds: u64,
    pub dynamic_state_commands: u64,
    pub render_passes: u64,
}

/// Command list for one recording context.
#[derive(Debug, Default)]
pub struct CommandRecorder {
    cmds: Vec<NativeCmd>,
    metrics: RecordMetrics,
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[NativeCmd] {
        &self.cmds
    }

    pub fn metrics(&self) -> RecordMetrics {
        self.metrics
    }

    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Hands out the recorded list and resets the recorder.
    pub fn finish(&mut self) -> Vec<NativeCmd> {
        self.metrics = RecordMetrics::default();
        std::mem::take(&mut self.cmds)
    }
}

impl CommandSink for CommandRecorder {
    fn push(&mut self, cmd: NativeCmd) {
        self.metrics.commands += 1;
        if cmd.is_draw() {
            self.metrics.draws += 1;
        } else if cmd.is_dynamic_state() {
            self.metrics.dynamic_state_commands += 1;
        }
        match cmd {
            NativeCmd::BindPipeline { .. } => self.metrics.pipeline_binds += 1,
            NativeCmd::BeginRenderPass { .. } => self.metrics.render_passes += 1,
            _ => {}
        }
        self.cmds.push(cmd);
    }
}
