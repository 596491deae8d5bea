use thiserror::Error;

use crate::pipeline_cache::PersistentCacheError;
use crate::types::{ContextId, PrimitiveTopology};

/// Errors surfaced by the translation layer.
///
/// Transient conditions (program still compiling, pipeline compile failure, empty draws) are
/// not errors; they are reported as [`DrawOutcome::Skipped`].
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("primitive topology {0} has no native equivalent and no emulation pattern")]
    UnsupportedTopology(PrimitiveTopology),

    #[error("indirect draw with count is not supported by the host device")]
    IndirectCountUnsupported,

    #[error("no command recording context is active")]
    NoRecordingContext,

    #[error("recording context {0:?} is still active")]
    RecordingInProgress(ContextId),

    #[error("recording context {new:?} does not follow {previous:?}")]
    ContextOutOfOrder { previous: ContextId, new: ContextId },

    #[error("{kind} slot {slot} out of range (max {max})")]
    SlotOutOfRange {
        kind: &'static str,
        slot: usize,
        max: usize,
    },

    #[error("first vertex {0} does not fit the signed base vertex of an emulated draw")]
    BaseVertexOutOfRange(u32),

    #[error("{0} is not expressible on the target API")]
    Unsupported(&'static str),

    #[error("failed to create render pass: {0:#}")]
    RenderPassCreation(anyhow::Error),

    #[error("failed to create framebuffer: {0:#}")]
    FramebufferCreation(anyhow::Error),

    #[error("failed to allocate scratch buffer: {0:#}")]
    ScratchAllocation(anyhow::Error),

    #[error("device pipeline cache error: {0:#}")]
    PipelineCacheDevice(anyhow::Error),

    #[error(transparent)]
    PersistentCache(#[from] PersistentCacheError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why a draw or dispatch was dropped without emitting native commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    NoProgram,
    /// Background compilation has not produced a linked program yet.
    ProgramNotLinked,
    PipelineCompileFailed,
    /// Zero vertices, indices, instances, primitives or work groups.
    EmptyDraw,
    NoIndexBuffer,
    UnresolvedBuffer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawOutcome {
    Recorded,
    Skipped(SkipReason),
}

impl DrawOutcome {
    pub fn is_recorded(self) -> bool {
        self == DrawOutcome::Recorded
    }
}

pub type Result<T, E = TranslateError> = std::result::Result<T, E>;
