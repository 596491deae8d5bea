//! The draw dispatcher.
//!
//! [`GfxRuntime`] owns every shadow and cache of the translation layer and exposes the guest's
//! state/draw surface. State setters only touch shadows; draws reconcile the shadows against
//! native objects in a fixed order (pipeline, dynamic state, render pass, buffers, barriers,
//! descriptors) and then emit the native draw.

mod draw;
mod pass;
mod state;

use std::sync::Arc;

use bitflags::bitflags;
use tracing::{debug, trace, warn};

use crate::backend::{Backend, RenderPassObserver, ShaderProgram};
use crate::bindings::BindingTracker;
use crate::caps::{DynamicStateTier, HostCapabilities};
use crate::cmd::{CommandRecorder, NativeCmd, RecordMetrics};
use crate::config::RuntimeConfig;
use crate::deferred::{DeferredDestroyQueue, DeferredObject};
use crate::error::{DrawOutcome, Result, SkipReason, TranslateError};
use crate::pipeline_cache::{
    decode_blob, encode_blob, PipelineCache, PipelineCacheStats, PipelineObject,
};
use crate::render_pass::{
    AttachmentSignature, PassState, RenderPassCacheStats, RenderPassManager,
};
use crate::state::{DynamicFields, DynamicState, PipelineState};
use crate::stats::{TranslateStats, TranslateStatsSnapshot};
use crate::topology::{ConversionStats, TopologyEmulator};
use crate::types::{
    AllocationId, BufferHandle, ContextId, ImageViewId, NativeBuffer, NativePipeline,
    PrimitiveTopology, ProgramId, Rect2D, VertexBindingDesc,
};

bitflags! {
    /// Bind points whose pipeline shadow changed since the last realization.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct PipelineDirty: u8 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
    }
}

pub struct GfxRuntime<B: Backend> {
    backend: B,
    caps: HostCapabilities,
    config: RuntimeConfig,
    tier: DynamicStateTier,
    dynamic_fields: DynamicFields,

    pipeline: PipelineState,
    dynamic: DynamicState,
    dirty: PipelineDirty,
    graphics_program: Option<Arc<dyn ShaderProgram>>,
    compute_program: Option<Arc<dyn ShaderProgram>>,
    guest_topology: PrimitiveTopology,
    /// Guest binding descriptions; strides are filled in per tier.
    vertex_layout: Vec<VertexBindingDesc>,
    /// First guest scissor, used to scope clears.
    clear_scissor: Option<Rect2D>,

    pipelines: PipelineCache,
    /// Object realized from the current shadow, per bind point.
    realized: [Option<Arc<PipelineObject>>; 2],
    /// Native pipeline last bound in the current context, per bind point.
    bound: [Option<NativePipeline>; 2],

    passes: RenderPassManager,
    bindings: BindingTracker,
    emulator: TopologyEmulator,
    deferred: DeferredDestroyQueue,
    recorder: CommandRecorder,
    observer: Option<Box<dyn RenderPassObserver>>,

    context: Option<ContextId>,
    last_context: Option<ContextId>,
    stats: TranslateStats,
}

impl<B: Backend> GfxRuntime<B> {
    pub fn new(mut backend: B, caps: HostCapabilities, config: RuntimeConfig) -> Self {
        let tier = DynamicStateTier::select(&caps, &config);
        let dynamic_fields = tier.dynamic_fields();
        debug!(
            ?tier,
            vendor = ?caps.vendor,
            workarounds = ?caps.workarounds,
            "translation runtime initialized"
        );

        if let Some(path) = &config.pipeline_cache_path {
            match std::fs::read(path) {
                Ok(blob) => match decode_blob(&blob) {
                    Ok(payload) => {
                        if let Err(err) = backend.load_pipeline_cache(payload) {
                            warn!(path = %path.display(), "device rejected pipeline cache: {err:#}");
                        } else {
                            debug!(path = %path.display(), bytes = payload.len(), "loaded pipeline cache");
                        }
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "ignoring pipeline cache blob");
                    }
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "no pipeline cache blob yet");
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to read pipeline cache blob");
                }
            }
        }

        Self {
            dynamic: DynamicState::new(dynamic_fields, caps.max_viewports()),
            pipelines: PipelineCache::new(config.pipeline_cache_capacity),
            emulator: TopologyEmulator::new(config.conversion_cache_capacity),
            backend,
            caps,
            config,
            tier,
            dynamic_fields,
            pipeline: PipelineState::new(),
            dirty: PipelineDirty::all(),
            graphics_program: None,
            compute_program: None,
            guest_topology: PrimitiveTopology::Triangles,
            vertex_layout: Vec::new(),
            clear_scissor: None,
            realized: [None, None],
            bound: [None, None],
            passes: RenderPassManager::new(),
            bindings: BindingTracker::new(),
            deferred: DeferredDestroyQueue::new(),
            recorder: CommandRecorder::new(),
            observer: None,
            context: None,
            last_context: None,
            stats: TranslateStats::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn caps(&self) -> &HostCapabilities {
        &self.caps
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn tier(&self) -> DynamicStateTier {
        self.tier
    }

    pub fn pipeline_state(&self) -> &PipelineState {
        &self.pipeline
    }

    pub fn dynamic_state(&self) -> &DynamicState {
        &self.dynamic
    }

    pub fn render_pass_state(&self) -> PassState {
        self.passes.state()
    }

    pub fn render_passes(&self) -> &RenderPassManager {
        &self.passes
    }

    pub fn bindings(&self) -> &BindingTracker {
        &self.bindings
    }

    /// Commands recorded so far in the current context.
    pub fn commands(&self) -> &[NativeCmd] {
        self.recorder.commands()
    }

    pub fn record_metrics(&self) -> RecordMetrics {
        self.recorder.metrics()
    }

    pub fn set_render_pass_observer(&mut self, observer: Option<Box<dyn RenderPassObserver>>) {
        self.observer = observer;
    }

    pub fn stats(&self) -> TranslateStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn pipeline_cache_stats(&self) -> PipelineCacheStats {
        self.pipelines.stats()
    }

    pub fn render_pass_cache_stats(&self) -> RenderPassCacheStats {
        self.passes.stats()
    }

    pub fn conversion_stats(&self) -> ConversionStats {
        self.emulator.stats()
    }

    pub fn pending_destroys(&self) -> usize {
        self.deferred.len()
    }

    // -------------------------------------------------------------------------
    // Recording contexts
    // -------------------------------------------------------------------------

    /// Starts a command-recording context. Nothing bound natively in an earlier context is
    /// assumed to persist.
    pub fn begin_recording(&mut self, context: ContextId) -> Result<()> {
        if let Some(active) = self.context {
            return Err(TranslateError::RecordingInProgress(active));
        }
        if let Some(previous) = self.last_context {
            if context <= previous {
                return Err(TranslateError::ContextOutOfOrder {
                    previous,
                    new: context,
                });
            }
        }
        self.context = Some(context);
        self.bindings.invalidate_all();
        self.backend.invalidate();
        self.bound = [None, None];
        self.dynamic.force_all_dirty();
        self.passes.reset_for_new_context();
        trace!(context = context.0, "recording context started");
        Ok(())
    }

    /// Closes any open pass and hands out the commands recorded for the context.
    pub fn end_recording(&mut self) -> Result<Vec<NativeCmd>> {
        let context = self.require_context()?;
        self.end_pass();
        self.context = None;
        self.last_context = Some(context);
        let cmds = self.recorder.finish();
        trace!(context = context.0, commands = cmds.len(), "recording context ended");
        Ok(cmds)
    }

    /// Destroys every parked native object whose last user is `completed` or older.
    pub fn retire_contexts(&mut self, completed: ContextId) -> usize {
        let ready = self.deferred.retire(completed.0);
        let n = ready.len();
        for object in ready {
            self.destroy_native(object);
        }
        if n > 0 {
            self.stats.add_deferred_destroys(n);
            trace!(completed = completed.0, destroyed = n, "retired native objects");
        }
        n
    }

    /// Writes the device pipeline cache to `pipeline_cache_path`. Returns `false` when no path
    /// is configured.
    pub fn save_pipeline_cache(&mut self) -> Result<bool> {
        let Some(path) = self.config.pipeline_cache_path.clone() else {
            return Ok(false);
        };
        let data = self
            .backend
            .pipeline_cache_data()
            .map_err(TranslateError::PipelineCacheDevice)?;
        std::fs::write(&path, encode_blob(&data))?;
        debug!(path = %path.display(), bytes = data.len(), "saved pipeline cache");
        Ok(true)
    }

    /// Destroys every native object the runtime owns and returns the backend.
    ///
    /// The caller guarantees the device is idle.
    pub fn into_backend(mut self) -> B {
        self.end_pass();
        for object in self.pipelines.drain() {
            self.backend.destroy_pipeline(object.handle());
        }
        for buffer in self.emulator.drain_buffers() {
            self.backend.destroy_scratch(buffer);
        }
        for object in self.deferred.retire(u64::MAX) {
            self.destroy_native(object);
        }
        let (render_passes, framebuffers) = self.passes.drain();
        for framebuffer in framebuffers {
            self.backend.destroy_framebuffer(framebuffer);
        }
        for render_pass in render_passes {
            self.backend.destroy_render_pass(render_pass);
        }
        self.backend
    }

    // -------------------------------------------------------------------------
    // Invalidation
    // -------------------------------------------------------------------------

    pub fn force_texture_dirty(&mut self) {
        self.backend.force_texture_dirty();
    }

    pub fn force_image_dirty(&mut self) {
        self.backend.force_image_dirty();
    }

    /// The allocation backing one or more guest buffers moved from `old` to `new`.
    pub fn swap_buffer(&mut self, old: AllocationId, new: AllocationId) {
        let retargeted = self.bindings.swap_allocation(old, new);
        let freed = self.emulator.invalidate_allocation(old);
        trace!(
            old = old.0,
            new = new.0,
            retargeted,
            conversions = freed.len(),
            "buffer allocation swapped"
        );
        self.defer_buffers(freed);
    }

    /// Guest (or transfer) write to `offset..offset+size` of `handle`.
    pub fn buffer_written(&mut self, handle: BufferHandle, offset: u64, size: u64) {
        let dirtied = self.bindings.buffer_written(handle, offset, size);
        let freed = self.emulator.invalidate_written(handle, offset, size);
        if dirtied > 0 || !freed.is_empty() {
            trace!(
                buffer = handle.0,
                offset,
                size,
                slots = dirtied,
                conversions = freed.len(),
                "bound buffer range written"
            );
        }
        self.defer_buffers(freed);
    }

    /// Drops every pipeline built from `program`.
    pub fn destroy_program(&mut self, program: ProgramId) {
        let removed = self.pipelines.remove_program(program);
        for slot in &mut self.realized {
            if slot.as_ref().is_some_and(|o| o.program() == program) {
                *slot = None;
            }
        }
        if self
            .graphics_program
            .as_ref()
            .is_some_and(|p| p.id() == program)
        {
            self.graphics_program = None;
        }
        if self
            .compute_program
            .as_ref()
            .is_some_and(|p| p.id() == program)
        {
            self.compute_program = None;
        }
        let context = self.context_serial();
        for object in removed {
            self.deferred
                .defer(DeferredObject::Pipeline(object), context);
        }
    }

    /// Drops cached framebuffers that reference `view`.
    pub fn image_view_destroyed(&mut self, view: ImageViewId) {
        if self
            .passes
            .params()
            .is_some_and(|p| p.references(view))
        {
            self.end_pass();
            self.pipeline.set_attachments(AttachmentSignature::default());
            self.mark_pipeline_dirty();
        }
        for (framebuffer, last_use) in self.passes.evict_view(view) {
            self.deferred
                .defer(DeferredObject::Framebuffer(framebuffer), last_use);
        }
    }

    /// Replays every dynamic field before the next draw.
    pub fn force_dynamic_state_dirty(&mut self) {
        self.dynamic.force_all_dirty();
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn require_context(&self) -> Result<ContextId> {
        self.context.ok_or(TranslateError::NoRecordingContext)
    }

    /// Serial used to gate destruction of objects touched now.
    fn context_serial(&self) -> u64 {
        self.context.or(self.last_context).map_or(0, |c| c.0)
    }

    fn mark_pipeline_dirty(&mut self) {
        self.dirty = PipelineDirty::all();
    }

    /// Bounds-checks a guest slot index. Out-of-range slots are an error with validation on and
    /// are ignored otherwise.
    fn check_slot(&self, kind: &'static str, slot: usize, max: usize) -> Result<bool> {
        if slot < max {
            return Ok(true);
        }
        if self.config.validation {
            return Err(TranslateError::SlotOutOfRange { kind, slot, max });
        }
        debug!(kind, slot, max, "ignoring out-of-range slot");
        Ok(false)
    }

    fn skip(&self, reason: SkipReason) -> DrawOutcome {
        self.stats.inc_draws_skipped();
        trace!(?reason, "draw skipped");
        DrawOutcome::Skipped(reason)
    }

    fn defer_buffers(&mut self, buffers: Vec<NativeBuffer>) {
        let context = self.context_serial();
        for buffer in buffers {
            self.deferred.defer(DeferredObject::Buffer(buffer), context);
        }
    }

    fn destroy_native(&mut self, object: DeferredObject) {
        match object {
            DeferredObject::Pipeline(p) => self.backend.destroy_pipeline(p.handle()),
            DeferredObject::Framebuffer(fb) => self.backend.destroy_framebuffer(fb),
            DeferredObject::Buffer(buffer) => self.backend.destroy_scratch(buffer),
        }
    }
}
