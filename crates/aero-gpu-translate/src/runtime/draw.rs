//! Draw and dispatch entry points.
//!
//! Every graphics draw reconciles in the same order: realize and bind the pipeline, replay
//! dirty dynamic state, open the render pass, rebind dirty vertex buffers, prepare index data
//! (guest buffer, pattern buffer or converted buffer), flush barriers, update descriptors,
//! resume transform feedback, then emit the draw.

use std::sync::Arc;

use tracing::{trace, warn};

use super::{GfxRuntime, PipelineDirty};
use crate::backend::{Backend, BufferRef, ComputePipelineDesc, GraphicsPipelineDesc};
use crate::bindings::BoundBuffer;
use crate::cmd::{CommandSink, NativeCmd};
use crate::deferred::DeferredObject;
use crate::error::{DrawOutcome, Result, SkipReason, TranslateError};
use crate::indirect::{DrawIndexedIndirectArgs, DRAW_COUNT_SIZE_BYTES};
use crate::state::DynamicFields;
use crate::topology::{
    plan_topology, ConversionKey, ConvertedIndices, IndexBufferPattern, PatternKind,
};
use crate::types::{
    BindPoint, BufferRange, IndexType, NativeBuffer, NativeBufferSlice, NativeTopology,
};

const U32_INDEX_SIZE: u64 = 4;

/// Shorthand for bailing out of a draw with a skip.
macro_rules! try_skip {
    ($self:ident, $e:expr) => {
        if let Some(reason) = $e {
            return Ok($self.skip(reason));
        }
    };
}

fn pattern_slice(buffer: NativeBuffer, index_count: u32) -> NativeBufferSlice {
    NativeBufferSlice {
        buffer,
        offset: 0,
        size: u64::from(index_count) * U32_INDEX_SIZE,
    }
}

impl<B: Backend> GfxRuntime<B> {
    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<DrawOutcome> {
        self.require_context()?;
        if vertex_count == 0 || instance_count == 0 {
            return Ok(self.skip(SkipReason::EmptyDraw));
        }
        let plan = plan_topology(self.guest_topology, &self.caps)?;
        let emulated = plan
            .pattern
            .map(|kind| (kind, IndexBufferPattern::for_kind(kind).converted_count(vertex_count)));
        if emulated.is_some_and(|(_, count)| count == 0) {
            return Ok(self.skip(SkipReason::EmptyDraw));
        }
        // Pattern indices start at zero, so the first vertex becomes the base vertex.
        let base_vertex = match emulated {
            Some(_) => i32::try_from(first_vertex)
                .map_err(|_| TranslateError::BaseVertexOutOfRange(first_vertex))?,
            None => 0,
        };

        try_skip!(self, self.prepare_graphics()?);
        match emulated {
            None => {
                self.finish_graphics()?;
                self.recorder.push(NativeCmd::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                });
            }
            Some((kind, index_count)) => {
                let buffer = self.pattern_buffer(kind, vertex_count)?;
                self.recorder.push(NativeCmd::BindIndexBuffer {
                    buffer: pattern_slice(buffer, index_count),
                    index_type: IndexType::U32,
                });
                self.bindings.mark_index_dirty();
                self.finish_graphics()?;
                self.recorder.push(NativeCmd::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index: 0,
                    base_vertex,
                    first_instance,
                });
                self.stats.inc_topology_conversions();
            }
        }
        self.stats.inc_draws_recorded();
        Ok(DrawOutcome::Recorded)
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<DrawOutcome> {
        self.require_context()?;
        if index_count == 0 || instance_count == 0 {
            return Ok(self.skip(SkipReason::EmptyDraw));
        }
        let plan = plan_topology(self.guest_topology, &self.caps)?;
        let index = *self.bindings.index_slot();
        let Some(bound) = index.binding else {
            return Ok(self.skip(SkipReason::NoIndexBuffer));
        };
        let conversion = self.index_conversion(plan.pattern, bound, index.index_type);
        if conversion
            .is_some_and(|kind| IndexBufferPattern::for_kind(kind).converted_count(index_count) == 0)
        {
            return Ok(self.skip(SkipReason::EmptyDraw));
        }

        try_skip!(self, self.prepare_graphics()?);
        match conversion {
            None => {
                try_skip!(self, self.bind_guest_index_buffer());
                self.finish_graphics()?;
                self.recorder.push(NativeCmd::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    base_vertex,
                    first_instance,
                });
            }
            Some(kind) => {
                let Some(converted) =
                    self.convert_indices(kind, bound, index.index_type, first_index, index_count)?
                else {
                    return Ok(self.skip(SkipReason::UnresolvedBuffer));
                };
                self.recorder.push(NativeCmd::BindIndexBuffer {
                    buffer: pattern_slice(converted.buffer, converted.index_count),
                    index_type: IndexType::U32,
                });
                self.bindings.mark_index_dirty();
                self.finish_graphics()?;
                self.recorder.push(NativeCmd::DrawIndexed {
                    index_count: converted.index_count,
                    instance_count,
                    first_index: 0,
                    base_vertex,
                    first_instance,
                });
            }
        }
        self.stats.inc_draws_recorded();
        Ok(DrawOutcome::Recorded)
    }

    pub fn draw_indirect(
        &mut self,
        args: BufferRange,
        draw_count: u32,
        stride: u32,
    ) -> Result<DrawOutcome> {
        self.require_context()?;
        if draw_count == 0 {
            return Ok(self.skip(SkipReason::EmptyDraw));
        }
        let plan = plan_topology(self.guest_topology, &self.caps)?;
        self.indirect_draw(plan.pattern, args, None, draw_count, stride)
    }

    /// Draw count read from `count`, at most `max_draw_count`.
    ///
    /// Fails with [`TranslateError::IndirectCountUnsupported`] when the host has no native
    /// indirect-count draw and the topology is drawn natively. Emulated topologies fall back
    /// to a plain indirect draw over zero-filled converted arguments.
    pub fn draw_indirect_count(
        &mut self,
        args: BufferRange,
        count: BufferRange,
        max_draw_count: u32,
        stride: u32,
    ) -> Result<DrawOutcome> {
        self.require_context()?;
        let plan = plan_topology(self.guest_topology, &self.caps)?;
        if plan.pattern.is_none() && !self.caps.indirect_draw_count {
            return Err(TranslateError::IndirectCountUnsupported);
        }
        if max_draw_count == 0 {
            return Ok(self.skip(SkipReason::EmptyDraw));
        }
        self.indirect_draw(plan.pattern, args, Some(count), max_draw_count, stride)
    }

    pub fn draw_indexed_indirect(
        &mut self,
        args: BufferRange,
        draw_count: u32,
        stride: u32,
    ) -> Result<DrawOutcome> {
        self.require_context()?;
        if draw_count == 0 {
            return Ok(self.skip(SkipReason::EmptyDraw));
        }
        let plan = plan_topology(self.guest_topology, &self.caps)?;
        self.indexed_indirect_draw(plan.pattern, args, None, draw_count, stride)
    }

    /// Indexed counterpart of [`GfxRuntime::draw_indirect_count`].
    pub fn draw_indexed_indirect_count(
        &mut self,
        args: BufferRange,
        count: BufferRange,
        max_draw_count: u32,
        stride: u32,
    ) -> Result<DrawOutcome> {
        self.require_context()?;
        let plan = plan_topology(self.guest_topology, &self.caps)?;
        self.indexed_indirect_draw(plan.pattern, args, Some(count), max_draw_count, stride)
    }

    pub fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) -> Result<DrawOutcome> {
        self.require_context()?;
        if x == 0 || y == 0 || z == 0 {
            return Ok(self.skip(SkipReason::EmptyDraw));
        }
        try_skip!(self, self.prepare_compute()?);
        self.recorder.push(NativeCmd::Dispatch { x, y, z });
        self.stats.inc_dispatches_recorded();
        Ok(DrawOutcome::Recorded)
    }

    pub fn dispatch_compute_indirect(&mut self, args: BufferRange) -> Result<DrawOutcome> {
        self.require_context()?;
        if args.size == 0 {
            return Ok(self.skip(SkipReason::EmptyDraw));
        }
        try_skip!(self, self.prepare_compute()?);
        let Some(args) = self.backend.resolve(args, false) else {
            return Ok(self.skip(SkipReason::UnresolvedBuffer));
        };
        self.recorder
            .push(NativeCmd::DispatchIndirect { args: args.whole() });
        self.stats.inc_dispatches_recorded();
        Ok(DrawOutcome::Recorded)
    }

    // -------------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------------

    /// Makes sure the pipeline for `bind_point` matches the shadow and is bound. `Some` means
    /// the command must be skipped; the shadow stays dirty so the next call retries.
    fn realize(&mut self, bind_point: BindPoint) -> Result<Option<SkipReason>> {
        let idx = bind_point.index();
        let (flag, program) = match bind_point {
            BindPoint::Graphics => (PipelineDirty::GRAPHICS, self.graphics_program.clone()),
            BindPoint::Compute => (PipelineDirty::COMPUTE, self.compute_program.clone()),
        };
        let Some(program) = program else {
            return Ok(Some(SkipReason::NoProgram));
        };
        if !program.is_linked() {
            return Ok(Some(SkipReason::ProgramNotLinked));
        }

        let context = self.context_serial();
        if self.dirty.contains(flag) || self.realized[idx].is_none() {
            let render_pass = match bind_point {
                BindPoint::Graphics => Some(self.passes.ensure_created(&mut self.backend, context)?),
                BindPoint::Compute => None,
            };
            let key = match bind_point {
                BindPoint::Graphics => self.pipeline.graphics_key(program.as_ref()),
                BindPoint::Compute => self.pipeline.compute_key(program.as_ref()),
            };
            let backend = &mut self.backend;
            let state = &self.pipeline;
            let dynamic_fields = self.dynamic_fields;
            let created = self.pipelines.get_or_create(
                key,
                bind_point,
                program.id(),
                context,
                |key| match render_pass {
                    Some(render_pass) => backend.create_graphics_pipeline(&GraphicsPipelineDesc {
                        key,
                        state,
                        program: program.as_ref(),
                        render_pass,
                        dynamic_fields,
                    }),
                    None => backend.create_compute_pipeline(&ComputePipelineDesc {
                        key,
                        program: program.as_ref(),
                        specialization: state.specialization(),
                    }),
                },
            );
            match created {
                Ok(realized) => {
                    if let Some(evicted) = realized.evicted {
                        // The other bind point may still hold the evicted object.
                        for (slot, flag) in self
                            .realized
                            .iter_mut()
                            .zip([PipelineDirty::GRAPHICS, PipelineDirty::COMPUTE])
                        {
                            if slot.as_ref().is_some_and(|o| Arc::ptr_eq(o, &evicted)) {
                                *slot = None;
                                self.dirty.insert(flag);
                            }
                        }
                        self.deferred
                            .defer(DeferredObject::Pipeline(evicted), context);
                    }
                    self.realized[idx] = Some(realized.object);
                    self.dirty.remove(flag);
                }
                Err(err) => {
                    warn!(
                        ?bind_point,
                        program = program.id().0,
                        "pipeline creation failed: {err:#}"
                    );
                    self.stats.inc_pipeline_compile_failures();
                    self.realized[idx] = None;
                    return Ok(Some(SkipReason::PipelineCompileFailed));
                }
            }
        }

        let Some(object) = self.realized[idx].clone() else {
            return Ok(Some(SkipReason::PipelineCompileFailed));
        };
        object.touch(context);
        let handle = object.handle();
        if self.bound[idx] == Some(handle) {
            self.stats.inc_pipeline_binds_elided();
            return Ok(None);
        }
        if bind_point == BindPoint::Graphics {
            self.bindings.pause_transform_feedback(&mut self.recorder);
        }
        self.recorder.push(NativeCmd::BindPipeline {
            bind_point,
            pipeline: handle,
        });
        self.bound[idx] = Some(handle);
        self.stats.inc_pipeline_binds();
        Ok(None)
    }

    fn replay_dynamic_state(&mut self) {
        if self.config.force_full_dynamic_replay {
            self.dynamic.force_all_dirty();
        }
        let emitted = self.dynamic.replay(&mut self.recorder);
        if emitted > 0 {
            self.stats.add_dynamic_state_commands(emitted);
        }
    }

    /// Pipeline, dynamic state, render pass and vertex buffers.
    fn prepare_graphics(&mut self) -> Result<Option<SkipReason>> {
        if let Some(reason) = self.realize(BindPoint::Graphics)? {
            return Ok(Some(reason));
        }
        self.replay_dynamic_state();
        self.begin_pass()?;
        Ok(self.rebind_vertex_buffers())
    }

    /// Barriers, descriptors and transform feedback, right before the draw.
    fn finish_graphics(&mut self) -> Result<()> {
        self.flush_barriers()?;
        if let Some(program) = self.graphics_program.clone() {
            self.backend
                .update_and_bind(BindPoint::Graphics, program.as_ref(), &mut self.recorder);
        }
        self.resume_transform_feedback();
        Ok(())
    }

    fn prepare_compute(&mut self) -> Result<Option<SkipReason>> {
        if let Some(reason) = self.realize(BindPoint::Compute)? {
            return Ok(Some(reason));
        }
        self.end_pass();
        self.replay_dynamic_state();
        if self.backend.has_pending() {
            self.backend.flush(&mut self.recorder, false);
        }
        if let Some(program) = self.compute_program.clone() {
            self.backend
                .update_and_bind(BindPoint::Compute, program.as_ref(), &mut self.recorder);
        }
        Ok(None)
    }

    fn rebind_vertex_buffers(&mut self) -> Option<SkipReason> {
        for slot in self.bindings.dirty_vertex_slots() {
            let vertex = *self.bindings.vertex_slot(slot);
            let Some(bound) = vertex.binding else {
                continue;
            };
            let alignment = self.bindings.vertex_alignment(slot);
            let Some(r) = self.backend.resolve_aligned(bound.range, alignment) else {
                return Some(SkipReason::UnresolvedBuffer);
            };
            self.recorder.push(NativeCmd::BindVertexBuffer {
                slot: slot as u32,
                buffer: r.whole(),
                stride: vertex.stride,
            });
            self.bindings.clear_vertex_dirty(slot);
            self.stats.inc_buffer_rebinds();
        }
        None
    }

    fn bind_guest_index_buffer(&mut self) -> Option<SkipReason> {
        let index = *self.bindings.index_slot();
        let Some(bound) = index.binding else {
            return Some(SkipReason::NoIndexBuffer);
        };
        if !index.dirty {
            return None;
        }
        let Some(r) = self.backend.resolve(bound.range, false) else {
            return Some(SkipReason::UnresolvedBuffer);
        };
        self.recorder.push(NativeCmd::BindIndexBuffer {
            buffer: r.whole(),
            index_type: index.index_type,
        });
        self.bindings.clear_index_dirty();
        self.stats.inc_buffer_rebinds();
        None
    }

    /// Pattern an indexed draw has to go through, if the host cannot read the guest indices
    /// directly.
    fn index_conversion(
        &self,
        topology_pattern: Option<PatternKind>,
        bound: BoundBuffer,
        index_type: IndexType,
    ) -> Option<PatternKind> {
        if topology_pattern.is_some() {
            return topology_pattern;
        }
        if self.index_buffer_native(bound.range.offset, index_type) {
            None
        } else {
            Some(PatternKind::Identity)
        }
    }

    // -------------------------------------------------------------------------
    // Topology emulation
    // -------------------------------------------------------------------------

    /// Pattern index buffer covering `vertex_count` vertices. Growing it interrupts the
    /// render pass for the upload; the pass is open again on return.
    fn pattern_buffer(&mut self, kind: PatternKind, vertex_count: u32) -> Result<NativeBuffer> {
        if let Some(buffer) = self.emulator.pattern_buffer(kind, vertex_count) {
            return Ok(buffer);
        }
        self.end_pass();
        let (buffer, old) = self.emulator.grow_pattern_buffer(
            &mut self.backend,
            &mut self.recorder,
            kind,
            vertex_count,
        )?;
        if let Some(old) = old {
            let context = self.context_serial();
            self.deferred.defer(DeferredObject::Buffer(old), context);
        }
        self.backend.queue_memory_barrier();
        self.begin_pass()?;
        Ok(buffer)
    }

    /// Converted copy of `index_count` guest indices from `first_index`, cached until the
    /// source range is written or relocated. `None` when the source does not resolve.
    fn convert_indices(
        &mut self,
        kind: PatternKind,
        bound: BoundBuffer,
        index_type: IndexType,
        first_index: u32,
        index_count: u32,
    ) -> Result<Option<ConvertedIndices>> {
        let key = ConversionKey {
            pattern: kind,
            source: bound.range.handle,
            allocation: bound.allocation,
            offset: bound.range.offset,
            index_type,
            first_index,
            index_count,
        };
        if let Some(hit) = self.emulator.lookup_conversion(&key) {
            return Ok(Some(hit));
        }
        let Some(src) = self.backend.resolve(bound.range, false) else {
            return Ok(None);
        };

        let converted_count = IndexBufferPattern::for_kind(kind).converted_count(index_count);
        let dst_size = u64::from(converted_count) * U32_INDEX_SIZE;
        let buffer = self
            .backend
            .create_scratch(dst_size.max(U32_INDEX_SIZE))
            .map_err(TranslateError::ScratchAllocation)?;

        self.end_pass();
        self.backend.queue_memory_barrier();
        self.backend.flush(&mut self.recorder, false);
        self.recorder.push(NativeCmd::ConvertIndices {
            pattern: kind,
            src: src.whole(),
            src_type: index_type,
            first_index,
            index_count,
            dst: pattern_slice(buffer, converted_count),
        });
        self.backend.queue_memory_barrier();

        let converted = ConvertedIndices {
            buffer,
            index_count: converted_count,
        };
        if let Some(evicted) = self.emulator.insert_conversion(key, converted) {
            let context = self.context_serial();
            self.deferred.defer(DeferredObject::Buffer(evicted), context);
        }
        self.stats.inc_topology_conversions();
        trace!(
            pattern = %kind,
            index_count,
            converted_count,
            "converted index buffer"
        );
        self.begin_pass()?;
        Ok(Some(converted))
    }

    fn indirect_args_scratch(&mut self, size: u64) -> Result<NativeBuffer> {
        let (buffer, old) = self.emulator.indirect_args.ensure(&mut self.backend, size)?;
        if let Some(old) = old {
            let context = self.context_serial();
            self.deferred.defer(DeferredObject::Buffer(old), context);
        }
        Ok(buffer)
    }

    fn indirect_indices_scratch(&mut self, size: u64) -> Result<NativeBuffer> {
        let (buffer, old) = self
            .emulator
            .indirect_indices
            .ensure(&mut self.backend, size)?;
        if let Some(old) = old {
            let context = self.context_serial();
            self.deferred.defer(DeferredObject::Buffer(old), context);
        }
        Ok(buffer)
    }

    fn resolve_count(&mut self, count: Option<BufferRange>) -> Result<Option<BufferRef>, SkipReason> {
        match count {
            None => Ok(None),
            Some(range) => self
                .backend
                .resolve(range, false)
                .map(Some)
                .ok_or(SkipReason::UnresolvedBuffer),
        }
    }

    /// Emits an indexed indirect draw over converted arguments. With a count buffer the
    /// native count draw is used when available; otherwise every record up to
    /// `max_draw_count` is drawn, relying on the conversion having zeroed the inactive ones.
    fn emit_converted_indirect(
        &mut self,
        args: NativeBufferSlice,
        count: Option<BufferRef>,
        max_draw_count: u32,
    ) {
        let stride = DrawIndexedIndirectArgs::SIZE_BYTES as u32;
        match count {
            Some(count) if self.caps.indirect_draw_count => {
                self.recorder.push(NativeCmd::DrawIndexedIndirectCount {
                    args,
                    count: count.slice(0, DRAW_COUNT_SIZE_BYTES),
                    max_draw_count,
                    stride,
                });
            }
            Some(_) => {
                self.stats.inc_indirect_count_fallbacks();
                trace!(max_draw_count, "indirect count emulated with zero-filled records");
                self.recorder.push(NativeCmd::DrawIndexedIndirect {
                    args,
                    draw_count: max_draw_count,
                    stride,
                });
            }
            None => {
                self.recorder.push(NativeCmd::DrawIndexedIndirect {
                    args,
                    draw_count: max_draw_count,
                    stride,
                });
            }
        }
    }

    fn indirect_draw(
        &mut self,
        pattern: Option<PatternKind>,
        args: BufferRange,
        count: Option<BufferRange>,
        max_draw_count: u32,
        stride: u32,
    ) -> Result<DrawOutcome> {
        try_skip!(self, self.prepare_graphics()?);
        let Some(src_args) = self.backend.resolve(args, false) else {
            return Ok(self.skip(SkipReason::UnresolvedBuffer));
        };
        let count = match self.resolve_count(count) {
            Ok(count) => count,
            Err(reason) => return Ok(self.skip(reason)),
        };

        let Some(kind) = pattern else {
            self.finish_graphics()?;
            match count {
                Some(count) => self.recorder.push(NativeCmd::DrawIndirectCount {
                    args: src_args.whole(),
                    count: count.slice(0, DRAW_COUNT_SIZE_BYTES),
                    max_draw_count,
                    stride,
                }),
                None => self.recorder.push(NativeCmd::DrawIndirect {
                    args: src_args.whole(),
                    draw_count: max_draw_count,
                    stride,
                }),
            }
            self.stats.inc_draws_recorded();
            return Ok(DrawOutcome::Recorded);
        };

        let capacity = self.config.indirect_pattern_vertex_capacity.max(1);
        let pattern_buffer = self.pattern_buffer(kind, capacity)?;
        let args_size = u64::from(max_draw_count) * DrawIndexedIndirectArgs::SIZE_BYTES;
        let dst_args = NativeBufferSlice {
            buffer: self.indirect_args_scratch(args_size)?,
            offset: 0,
            size: args_size,
        };

        self.end_pass();
        self.backend.queue_memory_barrier();
        self.backend.flush(&mut self.recorder, false);
        self.recorder.push(NativeCmd::ConvertIndirect {
            pattern: kind,
            src_args: src_args.whole(),
            src_stride: stride,
            count: count.map(|c| c.slice(0, DRAW_COUNT_SIZE_BYTES)),
            max_draw_count,
            dst_args,
        });
        self.backend.queue_memory_barrier();
        self.stats.inc_topology_conversions();
        self.begin_pass()?;

        let pattern_indices = IndexBufferPattern::for_kind(kind).converted_count(capacity);
        self.recorder.push(NativeCmd::BindIndexBuffer {
            buffer: pattern_slice(pattern_buffer, pattern_indices),
            index_type: IndexType::U32,
        });
        self.bindings.mark_index_dirty();
        self.finish_graphics()?;
        self.emit_converted_indirect(dst_args, count, max_draw_count);
        self.stats.inc_draws_recorded();
        Ok(DrawOutcome::Recorded)
    }

    fn indexed_indirect_draw(
        &mut self,
        pattern: Option<PatternKind>,
        args: BufferRange,
        count: Option<BufferRange>,
        max_draw_count: u32,
        stride: u32,
    ) -> Result<DrawOutcome> {
        let index = *self.bindings.index_slot();
        let Some(bound) = index.binding else {
            return Ok(self.skip(SkipReason::NoIndexBuffer));
        };
        let conversion = self.index_conversion(pattern, bound, index.index_type);
        if count.is_some() && conversion.is_none() && !self.caps.indirect_draw_count {
            return Err(TranslateError::IndirectCountUnsupported);
        }
        if max_draw_count == 0 {
            return Ok(self.skip(SkipReason::EmptyDraw));
        }

        try_skip!(self, self.prepare_graphics()?);
        let Some(src_args) = self.backend.resolve(args, false) else {
            return Ok(self.skip(SkipReason::UnresolvedBuffer));
        };
        let count = match self.resolve_count(count) {
            Ok(count) => count,
            Err(reason) => return Ok(self.skip(reason)),
        };

        let Some(kind) = conversion else {
            try_skip!(self, self.bind_guest_index_buffer());
            self.finish_graphics()?;
            match count {
                Some(count) => self.recorder.push(NativeCmd::DrawIndexedIndirectCount {
                    args: src_args.whole(),
                    count: count.slice(0, DRAW_COUNT_SIZE_BYTES),
                    max_draw_count,
                    stride,
                }),
                None => self.recorder.push(NativeCmd::DrawIndexedIndirect {
                    args: src_args.whole(),
                    draw_count: max_draw_count,
                    stride,
                }),
            }
            self.stats.inc_draws_recorded();
            return Ok(DrawOutcome::Recorded);
        };

        let Some(src_indices) = self.backend.resolve(bound.range, false) else {
            return Ok(self.skip(SkipReason::UnresolvedBuffer));
        };
        // Every record may address the whole source buffer.
        let source_indices = bound.range.size / index.index_type.size_bytes();
        let per_draw = IndexBufferPattern::for_kind(kind)
            .converted_count(u32::try_from(source_indices).unwrap_or(u32::MAX));
        let indices_size = (u64::from(per_draw) * U32_INDEX_SIZE)
            .saturating_mul(u64::from(max_draw_count))
            .max(U32_INDEX_SIZE);
        let dst_indices = NativeBufferSlice {
            buffer: self.indirect_indices_scratch(indices_size)?,
            offset: 0,
            size: indices_size,
        };
        let args_size = u64::from(max_draw_count) * DrawIndexedIndirectArgs::SIZE_BYTES;
        let dst_args = NativeBufferSlice {
            buffer: self.indirect_args_scratch(args_size)?,
            offset: 0,
            size: args_size,
        };

        self.end_pass();
        self.backend.queue_memory_barrier();
        self.backend.flush(&mut self.recorder, false);
        self.recorder.push(NativeCmd::ConvertIndexedIndirect {
            pattern: kind,
            src_indices: src_indices.whole(),
            src_type: index.index_type,
            src_args: src_args.whole(),
            src_stride: stride,
            count: count.map(|c| c.slice(0, DRAW_COUNT_SIZE_BYTES)),
            max_draw_count,
            dst_indices,
            dst_args,
        });
        self.backend.queue_memory_barrier();
        self.stats.inc_topology_conversions();
        self.begin_pass()?;

        self.recorder.push(NativeCmd::BindIndexBuffer {
            buffer: dst_indices,
            index_type: IndexType::U32,
        });
        self.bindings.mark_index_dirty();
        self.finish_graphics()?;
        self.emit_converted_indirect(dst_args, count, max_draw_count);
        self.stats.inc_draws_recorded();
        Ok(DrawOutcome::Recorded)
    }

    /// Topology the pipeline was realized with; diagnostic.
    pub fn native_topology(&self) -> NativeTopology {
        if self.dynamic.covers(DynamicFields::PRIMITIVE_TOPOLOGY) {
            self.dynamic.topology()
        } else {
            self.pipeline.topology()
        }
    }
}
