//! Deferred destruction of native objects.
//!
//! Objects leave their caches while command lists recorded earlier may still reference them.
//! They are parked here with the serial of the last recording context that used them and
//! destroyed once that context is known to have completed.

use std::sync::Arc;

use crate::pipeline_cache::PipelineObject;
use crate::types::{NativeBuffer, NativeFramebuffer};

#[derive(Debug, Clone)]
pub enum DeferredObject {
    /// Pipelines keep reporting their latest use, so the gate is re-read at retire time.
    Pipeline(Arc<PipelineObject>),
    Framebuffer(NativeFramebuffer),
    Buffer(NativeBuffer),
}

#[derive(Debug)]
struct Pending {
    last_use: u64,
    object: DeferredObject,
}

impl Pending {
    fn last_use(&self) -> u64 {
        match &self.object {
            DeferredObject::Pipeline(p) => p.last_used().max(self.last_use),
            _ => self.last_use,
        }
    }
}

#[derive(Debug, Default)]
pub struct DeferredDestroyQueue {
    pending: Vec<Pending>,
}

impl DeferredDestroyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&mut self, object: DeferredObject, last_use: u64) {
        self.pending.push(Pending { last_use, object });
    }

    /// Removes and returns every object whose last user is at or before `completed`.
    pub fn retire(&mut self, completed: u64) -> Vec<DeferredObject> {
        let mut ready = Vec::new();
        self.pending.retain(|p| {
            if p.last_use() <= completed {
                ready.push(p.object.clone());
                false
            } else {
                true
            }
        });
        ready
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
