//! `aero-gpu-translate` turns a stateful, immediate-mode guest GPU command stream into native
//! commands for a pipeline-object based API.
//!
//! Currently this crate provides:
//! - Pipeline and dynamic state shadows with per-field dirty tracking (see [`state`]).
//! - A pipeline object cache backed by a persistent cache blob (see [`pipeline_cache`]).
//! - Render pass / framebuffer caching with tile-based attachment deduplication
//!   (see [`render_pass`]).
//! - Emulation of quads, fans and polygons through index patterns (see [`topology`]).
//! - Vertex/index/transform-feedback binding hazard tracking (see [`bindings`]).
//! - The draw dispatcher tying it together (see [`GfxRuntime`]).
//!
//! The layer never talks to a device directly: native work is recorded as [`cmd::NativeCmd`]
//! and every collaborator is a trait in [`backend`].

mod deferred;
mod error;

pub mod backend;
pub mod bindings;
pub mod caps;
pub mod cmd;
pub mod config;
pub mod indirect;
pub mod pipeline_cache;
pub mod render_pass;
pub mod runtime;
pub mod state;
pub mod stats;
pub mod topology;
pub mod translate;
pub mod types;

pub use backend::{
    Backend, BarrierBatch, BufferAllocator, BufferRef, DescriptorUpdater, NativeDevice,
    RenderPassObserver, ShaderProgram,
};
pub use caps::{DynamicStateTier, HostCapabilities, Vendor, Workarounds};
pub use cmd::{CommandRecorder, CommandSink, NativeCmd};
pub use config::RuntimeConfig;
pub use error::{DrawOutcome, Result, SkipReason, TranslateError};
pub use runtime::GfxRuntime;
pub use stats::{TranslateStats, TranslateStatsSnapshot};
