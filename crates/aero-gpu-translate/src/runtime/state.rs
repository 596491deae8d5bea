//! Guest state setters.
//!
//! Each setter writes the dynamic shadow when the active tier covers the field and the
//! pipeline shadow otherwise. Pipeline-shadow changes mark both bind points dirty; nothing is
//! emitted natively except direct vertex/index binds.

use std::sync::Arc;

use tracing::{debug, trace};

use super::GfxRuntime;
use crate::backend::{Backend, ShaderProgram};
use crate::bindings::{BindMode, BoundBuffer};
use crate::caps::{DynamicStateTier, Workarounds};
use crate::cmd::{CommandSink, NativeCmd};
use crate::error::Result;
use crate::render_pass::FramebufferParams;
use crate::state::DynamicFields;
use crate::topology::plan_topology;
use crate::types::{
    BlendDescriptor, BufferRange, ColorWriteMask, CullMode, DepthBias, DepthTest, FrontFace,
    IndexType, LogicOp, PolygonMode, PrimitiveTopology, Rect2D, RenderTarget, StencilTest,
    VertexAttrib, VertexBindingDesc, VertexBufferBinding, Viewport, MAX_RENDER_TARGETS,
    MAX_TRANSFORM_FEEDBACK_BUFFERS, MAX_VERTEX_ATTRIBS, MAX_VERTEX_BUFFERS,
};

impl<B: Backend> GfxRuntime<B> {
    fn pipeline_changed(&mut self, changed: bool) {
        if changed {
            self.mark_pipeline_dirty();
        }
    }

    pub fn set_program(&mut self, program: Arc<dyn ShaderProgram>) {
        let slot = if program.is_compute() {
            &mut self.compute_program
        } else {
            &mut self.graphics_program
        };
        if slot.as_ref().is_some_and(|p| p.id() == program.id()) {
            return;
        }
        *slot = Some(program);
        self.mark_pipeline_dirty();
    }

    /// Unsupported topologies are accepted here and rejected by the next draw.
    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.guest_topology = topology;
        let Ok(plan) = plan_topology(topology, &self.caps) else {
            return;
        };
        if self.dynamic.covers(DynamicFields::PRIMITIVE_TOPOLOGY) {
            self.dynamic.set_topology(plan.native);
            let class = plan.native.class().representative();
            let changed = self.pipeline.set_topology(class);
            self.pipeline_changed(changed);
        } else {
            let changed = self.pipeline.set_topology(plan.native);
            self.pipeline_changed(changed);
        }
    }

    pub fn set_blend_state(&mut self, index: usize, desc: BlendDescriptor) -> Result<()> {
        if !self.check_slot("render target", index, MAX_RENDER_TARGETS)? {
            return Ok(());
        }
        let changed = self.pipeline.set_blend(index, desc);
        self.pipeline_changed(changed);
        Ok(())
    }

    pub fn set_blend_constants(&mut self, constants: [f32; 4]) {
        if self.dynamic.covers(DynamicFields::BLEND_CONSTANTS) {
            self.dynamic.set_blend_constants(constants);
        } else {
            let changed = self.pipeline.set_blend_constants(constants);
            self.pipeline_changed(changed);
        }
    }

    /// Write masks for targets `0..masks.len()`.
    pub fn set_render_target_color_masks(&mut self, masks: &[ColorWriteMask]) -> Result<()> {
        if masks.len() > MAX_RENDER_TARGETS {
            self.check_slot("render target", masks.len() - 1, MAX_RENDER_TARGETS)?;
        }
        let mut changed = false;
        for (index, mask) in masks.iter().take(MAX_RENDER_TARGETS).enumerate() {
            changed |= self.pipeline.set_color_write_mask(index, *mask);
        }
        if changed {
            self.mark_pipeline_dirty();
            self.refresh_deduplicated_framebuffer()?;
        }
        Ok(())
    }

    /// Rebuilds the framebuffer when new write masks change which duplicate attachments are
    /// dropped.
    fn refresh_deduplicated_framebuffer(&mut self) -> Result<()> {
        if !self
            .caps
            .workarounds
            .contains(Workarounds::DEDUPLICATE_COLOR_ATTACHMENTS)
        {
            return Ok(());
        }
        let masks = *self.pipeline.color_write_masks();
        let rebuilt = match self.passes.params() {
            Some(params) if params.needs_rebuild(&masks) => params.rebuild(&masks, true),
            _ => return Ok(()),
        };
        self.end_pass();
        let dropped = rebuilt.dropped_slots();
        let attachments = rebuilt.attachments().len();
        let context = self.context_serial();
        let signature = self.passes.bind(&mut self.backend, rebuilt, context)?.clone();
        self.pipeline.set_attachments(signature);
        self.mark_pipeline_dirty();
        self.stats.inc_framebuffer_rebuilds();
        debug!(
            dropped = format_args!("{dropped:#010b}"),
            attachments, "rebuilt framebuffer after write mask change"
        );
        Ok(())
    }

    pub fn set_depth_test(&mut self, depth: DepthTest) {
        if self.dynamic.covers(DynamicFields::DEPTH) {
            self.dynamic.set_depth_test(depth);
        } else {
            let changed = self.pipeline.set_depth(depth);
            self.pipeline_changed(changed);
        }
    }

    pub fn set_stencil_test(&mut self, stencil: StencilTest) {
        if self.dynamic.covers(DynamicFields::STENCIL) {
            self.dynamic
                .set_stencil(stencil.enable, stencil.front, stencil.back);
        } else {
            let changed = self.pipeline.set_stencil(stencil);
            self.pipeline_changed(changed);
        }
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) {
        if self.dynamic.covers(DynamicFields::CULL_MODE) {
            self.dynamic.set_cull_mode(mode);
        } else {
            let changed = self.pipeline.set_cull_mode(mode);
            self.pipeline_changed(changed);
        }
    }

    pub fn set_front_face(&mut self, face: FrontFace) {
        if self.dynamic.covers(DynamicFields::FRONT_FACE) {
            self.dynamic.set_front_face(face);
        } else {
            let changed = self.pipeline.set_front_face(face);
            self.pipeline_changed(changed);
        }
    }

    pub fn set_rasterizer_discard(&mut self, enable: bool) {
        let was_enabled = if self.dynamic.covers(DynamicFields::RASTERIZER_DISCARD) {
            self.dynamic.set_rasterizer_discard(enable)
        } else {
            let old = self.pipeline.raster().rasterizer_discard;
            let changed = self.pipeline.set_rasterizer_discard(enable);
            self.pipeline_changed(changed);
            old
        };
        if was_enabled
            && !enable
            && self
                .caps
                .workarounds
                .contains(Workarounds::RASTERIZER_DISCARD_CLOBBERS_DYNAMIC_STATE)
        {
            debug!("rasterizer discard disabled, forcing full dynamic state replay");
            self.dynamic.force_all_dirty();
        }
    }

    pub fn set_depth_bias(&mut self, bias: DepthBias) {
        let changed = self.pipeline.set_depth_bias(bias);
        self.pipeline_changed(changed);
    }

    pub fn set_depth_clamp(&mut self, enable: bool) {
        let changed = self.pipeline.set_depth_clamp(enable);
        self.pipeline_changed(changed);
    }

    pub fn set_polygon_mode(&mut self, mode: PolygonMode) {
        let changed = self.pipeline.set_polygon_mode(mode);
        self.pipeline_changed(changed);
    }

    pub fn set_line_width(&mut self, width: f32) {
        if self.dynamic.covers(DynamicFields::LINE_WIDTH) {
            self.dynamic.set_line_width(width);
        } else {
            let changed = self.pipeline.set_line_width(width);
            self.pipeline_changed(changed);
        }
    }

    /// `None` disables logic ops. Enablement is always baked; the op itself is dynamic when the
    /// tier allows it.
    pub fn set_logic_op(&mut self, op: Option<LogicOp>) {
        if self.dynamic.covers(DynamicFields::LOGIC_OP) {
            let changed = self.pipeline.set_logic_op_enable(op.is_some());
            self.pipeline_changed(changed);
            if let Some(op) = op {
                self.dynamic.set_logic_op(op);
            }
        } else {
            let changed = self.pipeline.set_logic_op(op);
            self.pipeline_changed(changed);
        }
    }

    pub fn set_primitive_restart(&mut self, enable: bool) {
        if self.dynamic.covers(DynamicFields::PRIMITIVE_RESTART) {
            self.dynamic.set_primitive_restart(enable);
        } else {
            let changed = self.pipeline.set_primitive_restart(enable);
            self.pipeline_changed(changed);
        }
    }

    pub fn set_patch_control_points(&mut self, points: u32) {
        if self.dynamic.covers(DynamicFields::PATCH_CONTROL_POINTS) {
            self.dynamic.set_patch_control_points(points);
        } else {
            let changed = self.pipeline.set_patch_control_points(points);
            self.pipeline_changed(changed);
        }
    }

    pub fn set_alpha_to_coverage(&mut self, enable: bool) {
        let changed = self.pipeline.set_alpha_to_coverage(enable);
        self.pipeline_changed(changed);
    }

    /// Viewports beyond what the host supports are dropped.
    pub fn set_viewports(&mut self, viewports: &[Viewport]) {
        if viewports.is_empty() {
            return;
        }
        if self.dynamic.covers(DynamicFields::VIEWPORT) {
            self.dynamic.set_viewports(viewports);
        } else {
            let n = viewports.len().min(self.caps.max_viewports());
            let changed = self.pipeline.set_viewports(&viewports[..n]);
            self.pipeline_changed(changed);
        }
    }

    pub fn set_scissors(&mut self, scissors: &[Rect2D]) {
        let Some(first) = scissors.first() else {
            return;
        };
        self.clear_scissor = Some(*first);
        if self.dynamic.covers(DynamicFields::SCISSOR) {
            self.dynamic.set_scissors(scissors);
        } else {
            let n = scissors.len().min(self.caps.max_viewports());
            let changed = self.pipeline.set_scissors(&scissors[..n]);
            self.pipeline_changed(changed);
        }
    }

    /// Vertex input layout. Binding strides come from [`GfxRuntime::set_vertex_buffers`].
    pub fn set_vertex_attribs(
        &mut self,
        bindings: &[VertexBindingDesc],
        attribs: &[VertexAttrib],
    ) -> Result<()> {
        let mut layout = Vec::with_capacity(bindings.len());
        for b in bindings {
            if self.check_slot("vertex binding", b.binding as usize, MAX_VERTEX_BUFFERS)? {
                layout.push(*b);
            }
        }
        let mut valid = Vec::with_capacity(attribs.len());
        for a in attribs {
            if self.check_slot("vertex attribute", a.location as usize, MAX_VERTEX_ATTRIBS)?
                && self.check_slot("vertex binding", a.binding as usize, MAX_VERTEX_BUFFERS)?
            {
                valid.push(*a);
            }
        }
        self.vertex_layout = layout;
        let dirtied = self.bindings.set_vertex_attribs(&valid);
        if dirtied > 0 {
            trace!(slots = dirtied, "vertex alignment changed");
        }
        let descs = self.vertex_binding_descs();
        let changed = self.pipeline.set_vertex_input(&descs, &valid);
        self.pipeline_changed(changed);
        Ok(())
    }

    /// Binding descriptions baked into the pipeline. Strides are bind-time state unless the
    /// tier is [`DynamicStateTier::Baseline`].
    fn vertex_binding_descs(&self) -> Vec<VertexBindingDesc> {
        let baked_strides = self.tier == DynamicStateTier::Baseline;
        self.vertex_layout
            .iter()
            .map(|d| VertexBindingDesc {
                stride: if baked_strides {
                    self.bindings.vertex_slot(d.binding as usize).stride
                } else {
                    0
                },
                ..*d
            })
            .collect()
    }

    /// Binds `buffers` to slots `first..`. Aligned buffers are bound immediately while
    /// recording; the rest are bound before the next draw.
    pub fn set_vertex_buffers(
        &mut self,
        first: u32,
        buffers: &[Option<VertexBufferBinding>],
    ) -> Result<()> {
        for (i, binding) in buffers.iter().enumerate() {
            let slot = first as usize + i;
            if !self.check_slot("vertex buffer", slot, MAX_VERTEX_BUFFERS)? {
                continue;
            }
            let stride = binding.map_or(0, |b| b.stride);
            let resolved = match binding {
                Some(b) => {
                    let r = self.backend.resolve(b.range, false);
                    if r.is_none() {
                        trace!(slot, buffer = b.range.handle.0, "vertex buffer did not resolve");
                    }
                    r
                }
                None => None,
            };
            let bound = binding.zip(resolved).map(|(b, r)| BoundBuffer {
                range: b.range,
                allocation: r.allocation,
            });
            let mode = self.bindings.set_vertex_buffer(slot, bound, stride);
            if mode == BindMode::Direct && self.context.is_some() {
                if let Some(r) = resolved {
                    self.recorder.push(NativeCmd::BindVertexBuffer {
                        slot: slot as u32,
                        buffer: r.whole(),
                        stride,
                    });
                    self.bindings.clear_vertex_dirty(slot);
                }
            }
        }
        if self.tier == DynamicStateTier::Baseline {
            let descs = self.vertex_binding_descs();
            let attribs = self.pipeline.vertex_attribs().to_vec();
            let changed = self.pipeline.set_vertex_input(&descs, &attribs);
            self.pipeline_changed(changed);
        }
        Ok(())
    }

    /// Whether the host can read an index buffer of `index_type` at `offset` as-is.
    pub(super) fn index_buffer_native(&self, offset: u64, index_type: IndexType) -> bool {
        if index_type == IndexType::U8 && !self.caps.index_type_u8 {
            return false;
        }
        let alignment = self
            .caps
            .index_buffer_alignment
            .max(index_type.size_bytes());
        offset % alignment == 0
    }

    pub fn set_index_buffer(&mut self, range: Option<BufferRange>, index_type: IndexType) {
        let resolved = range.and_then(|r| self.backend.resolve(r, false).map(|b| (r, b)));
        let bound = resolved.map(|(range, r)| BoundBuffer {
            range,
            allocation: r.allocation,
        });
        let emulated = plan_topology(self.guest_topology, &self.caps)
            .map_or(false, |plan| plan.pattern.is_some());
        let direct = self.context.is_some()
            && !emulated
            && range.is_some_and(|r| self.index_buffer_native(r.offset, index_type));
        if self.bindings.set_index_buffer(bound, index_type, direct) == BindMode::Direct {
            if let Some((_, r)) = resolved {
                self.recorder.push(NativeCmd::BindIndexBuffer {
                    buffer: r.whole(),
                    index_type,
                });
                self.bindings.clear_index_dirty();
            }
        }
    }

    /// Capture buffers for slots `first..`. Running capture is paused first; it resumes on
    /// the next draw.
    pub fn set_transform_feedback_buffers(
        &mut self,
        first: u32,
        buffers: &[Option<BufferRange>],
    ) -> Result<()> {
        self.bindings.pause_transform_feedback(&mut self.recorder);
        for (i, range) in buffers.iter().enumerate() {
            let slot = first as usize + i;
            if !self.check_slot(
                "transform feedback buffer",
                slot,
                MAX_TRANSFORM_FEEDBACK_BUFFERS,
            )? {
                continue;
            }
            let bound = range.and_then(|range| {
                self.backend.resolve(range, true).map(|r| BoundBuffer {
                    range,
                    allocation: r.allocation,
                })
            });
            self.bindings.set_transform_feedback_buffer(slot, bound);
        }
        Ok(())
    }

    pub fn set_specialization_data(&mut self, data: &[u8]) {
        let changed = self.pipeline.set_specialization(data);
        self.pipeline_changed(changed);
    }

    /// Binds new render targets. Any open pass ends; the pass and framebuffer for the new
    /// attachment set come from the caches.
    pub fn set_render_targets(
        &mut self,
        colors: &[Option<RenderTarget>],
        depth_stencil: Option<RenderTarget>,
    ) -> Result<()> {
        if colors.len() > MAX_RENDER_TARGETS {
            self.check_slot("render target", colors.len() - 1, MAX_RENDER_TARGETS)?;
        }
        self.end_pass();
        let dedup = self
            .caps
            .workarounds
            .contains(Workarounds::DEDUPLICATE_COLOR_ATTACHMENTS);
        let params = FramebufferParams::new(
            colors,
            depth_stencil,
            self.pipeline.color_write_masks(),
            dedup,
        );
        if params.dropped_slots() != 0 {
            debug!(
                dropped = format_args!("{:#010b}", params.dropped_slots()),
                "dropped masked duplicate color attachments"
            );
        }
        let context = self.context_serial();
        let signature = self.passes.bind(&mut self.backend, params, context)?.clone();
        self.pipeline.set_attachments(signature);
        self.mark_pipeline_dirty();
        Ok(())
    }
}
