//! Vertex, index and transform-feedback slot tracking.
//!
//! A slot's dirty bit means "the native binding may be stale": the backing allocation moved,
//! a write overlapped the bound range, the vertex layout changed its alignment requirement,
//! or a new recording context started. Dirty slots are rebound right before the next draw.

use crate::cmd::{CommandSink, NativeCmd};
use crate::types::{
    AllocationId, BufferHandle, BufferRange, IndexType, VertexAttrib, MAX_TRANSFORM_FEEDBACK_BUFFERS,
    MAX_VERTEX_BUFFERS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundBuffer {
    pub range: BufferRange,
    pub allocation: AllocationId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VertexSlot {
    pub binding: Option<BoundBuffer>,
    pub stride: u32,
    pub dirty: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexSlot {
    pub binding: Option<BoundBuffer>,
    pub index_type: IndexType,
    pub dirty: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransformFeedbackSlot {
    pub binding: Option<BoundBuffer>,
    pub dirty: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformFeedbackState {
    Inactive,
    /// Capture requested but not running natively; `resume` continues from saved counters.
    Pending { resume: bool },
    Running,
}

/// How a binding call is realized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindMode {
    /// Bind now.
    Direct,
    /// Shadow updated, slot dirty; bound before the next draw.
    Deferred,
}

#[derive(Debug)]
pub struct BindingTracker {
    vertex: [VertexSlot; MAX_VERTEX_BUFFERS],
    /// Largest attribute scalar size read from each vertex binding.
    vertex_alignment: [u32; MAX_VERTEX_BUFFERS],
    index: IndexSlot,
    tfb: [TransformFeedbackSlot; MAX_TRANSFORM_FEEDBACK_BUFFERS],
    tfb_state: TransformFeedbackState,
}

impl Default for BindingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingTracker {
    pub fn new() -> Self {
        Self {
            vertex: [VertexSlot::default(); MAX_VERTEX_BUFFERS],
            vertex_alignment: [1; MAX_VERTEX_BUFFERS],
            index: IndexSlot::default(),
            tfb: [TransformFeedbackSlot::default(); MAX_TRANSFORM_FEEDBACK_BUFFERS],
            tfb_state: TransformFeedbackState::Inactive,
        }
    }

    pub fn vertex_slot(&self, slot: usize) -> &VertexSlot {
        &self.vertex[slot]
    }

    pub fn vertex_alignment(&self, slot: usize) -> u32 {
        self.vertex_alignment[slot]
    }

    pub fn index_slot(&self) -> &IndexSlot {
        &self.index
    }

    pub fn transform_feedback_slot(&self, slot: usize) -> &TransformFeedbackSlot {
        &self.tfb[slot]
    }

    fn vertex_aligned(&self, slot: usize) -> bool {
        let align = u64::from(self.vertex_alignment[slot].max(1));
        let s = &self.vertex[slot];
        s.binding.map_or(true, |b| b.range.offset % align == 0) && u64::from(s.stride) % align == 0
    }

    pub fn set_vertex_buffer(
        &mut self,
        slot: usize,
        binding: Option<BoundBuffer>,
        stride: u32,
    ) -> BindMode {
        self.vertex[slot] = VertexSlot {
            binding,
            stride,
            dirty: true,
        };
        if binding.is_some() && self.vertex_aligned(slot) {
            BindMode::Direct
        } else {
            BindMode::Deferred
        }
    }

    /// Recomputes per-binding alignment from the attribute layout; bound slots whose
    /// requirement changed become dirty. Returns how many slots were dirtied.
    pub fn set_vertex_attribs(&mut self, attribs: &[VertexAttrib]) -> u32 {
        let mut alignment = [1u32; MAX_VERTEX_BUFFERS];
        for a in attribs {
            if let Some(slot) = alignment.get_mut(a.binding as usize) {
                *slot = (*slot).max(a.format.component_size());
            }
        }
        let mut dirtied = 0;
        for (i, (old, new)) in self
            .vertex_alignment
            .iter_mut()
            .zip(alignment)
            .enumerate()
        {
            if *old != new {
                *old = new;
                let s = &mut self.vertex[i];
                if s.binding.is_some() && !s.dirty {
                    s.dirty = true;
                    dirtied += 1;
                }
            }
        }
        dirtied
    }

    pub fn clear_vertex_dirty(&mut self, slot: usize) {
        self.vertex[slot].dirty = false;
    }

    pub fn dirty_vertex_slots(&self) -> Vec<usize> {
        self.vertex
            .iter()
            .enumerate()
            .filter(|(_, s)| s.dirty && s.binding.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    /// Records the index buffer. `direct_allowed` says whether the host can consume the
    /// buffer as-is right now (native index type, aligned offset, no emulated topology).
    pub fn set_index_buffer(
        &mut self,
        binding: Option<BoundBuffer>,
        index_type: IndexType,
        direct_allowed: bool,
    ) -> BindMode {
        self.index = IndexSlot {
            binding,
            index_type,
            dirty: true,
        };
        if binding.is_some() && direct_allowed {
            BindMode::Direct
        } else {
            BindMode::Deferred
        }
    }

    pub fn clear_index_dirty(&mut self) {
        self.index.dirty = false;
    }

    /// A temporary index buffer replaced the guest's binding.
    pub fn mark_index_dirty(&mut self) {
        self.index.dirty = true;
    }

    pub fn set_transform_feedback_buffer(&mut self, slot: usize, binding: Option<BoundBuffer>) {
        self.tfb[slot] = TransformFeedbackSlot {
            binding,
            dirty: true,
        };
    }

    pub fn dirty_transform_feedback_slots(&self) -> Vec<usize> {
        self.tfb
            .iter()
            .enumerate()
            .filter(|(_, s)| s.dirty && s.binding.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn has_dirty_transform_feedback(&self) -> bool {
        self.tfb.iter().any(|s| s.dirty && s.binding.is_some())
    }

    pub fn clear_transform_feedback_dirty(&mut self, slot: usize) {
        self.tfb[slot].dirty = false;
    }

    /// Every slot backed by `old` now refers to `new` and is rebound before the next draw.
    pub fn swap_allocation(&mut self, old: AllocationId, new: AllocationId) -> u32 {
        let mut retargeted = 0;
        let mut retarget = |binding: &mut Option<BoundBuffer>, dirty: &mut bool| {
            if let Some(b) = binding {
                if b.allocation == old {
                    b.allocation = new;
                    *dirty = true;
                    retargeted += 1;
                }
            }
        };
        for s in &mut self.vertex {
            retarget(&mut s.binding, &mut s.dirty);
        }
        retarget(&mut self.index.binding, &mut self.index.dirty);
        for s in &mut self.tfb {
            retarget(&mut s.binding, &mut s.dirty);
        }
        retargeted
    }

    /// Marks slots whose bound range overlaps a write as dirty.
    pub fn buffer_written(&mut self, handle: BufferHandle, offset: u64, size: u64) -> u32 {
        let mut dirtied = 0;
        let mut check = |binding: &Option<BoundBuffer>, dirty: &mut bool| {
            if let Some(b) = binding {
                if b.range.handle == handle && b.range.overlaps(offset, size) {
                    *dirty = true;
                    dirtied += 1;
                }
            }
        };
        for s in &mut self.vertex {
            check(&s.binding, &mut s.dirty);
        }
        check(&self.index.binding, &mut self.index.dirty);
        for s in &mut self.tfb {
            check(&s.binding, &mut s.dirty);
        }
        dirtied
    }

    /// Nothing bound natively survives a new recording context.
    pub fn invalidate_all(&mut self) {
        for s in &mut self.vertex {
            s.dirty = s.binding.is_some();
        }
        self.index.dirty = self.index.binding.is_some();
        for s in &mut self.tfb {
            s.dirty = s.binding.is_some();
        }
    }

    pub fn transform_feedback_state(&self) -> TransformFeedbackState {
        self.tfb_state
    }

    pub fn begin_transform_feedback(&mut self) {
        if self.tfb_state == TransformFeedbackState::Inactive {
            self.tfb_state = TransformFeedbackState::Pending { resume: false };
        }
    }

    /// Suspends running capture, keeping counters so it can be resumed. Returns whether a
    /// native command was emitted.
    pub fn pause_transform_feedback(&mut self, sink: &mut dyn CommandSink) -> bool {
        if self.tfb_state != TransformFeedbackState::Running {
            return false;
        }
        sink.push(NativeCmd::EndTransformFeedback { pause: true });
        self.tfb_state = TransformFeedbackState::Pending { resume: true };
        true
    }

    pub fn end_transform_feedback(&mut self, sink: &mut dyn CommandSink) {
        if self.tfb_state == TransformFeedbackState::Running {
            sink.push(NativeCmd::EndTransformFeedback { pause: false });
        }
        self.tfb_state = TransformFeedbackState::Inactive;
    }

    /// Starts (or resumes) capture. Returns the native `resume` flag used, or `None` when
    /// capture is not pending.
    pub fn start_transform_feedback(&mut self, sink: &mut dyn CommandSink) -> Option<bool> {
        let TransformFeedbackState::Pending { resume } = self.tfb_state else {
            return None;
        };
        sink.push(NativeCmd::BeginTransformFeedback { resume });
        self.tfb_state = TransformFeedbackState::Running;
        Some(resume)
    }
}
