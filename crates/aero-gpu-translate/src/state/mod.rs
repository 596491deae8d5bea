//! Shadows of guest pipeline state.
//!
//! [`pipeline::PipelineState`] holds everything baked into pipeline objects;
//! [`dynamic::DynamicState`] holds what the host can change with plain state commands.

pub mod dynamic;
pub mod pipeline;

pub use dynamic::{DynamicFields, DynamicState};
pub use pipeline::{PipelineKey, PipelineState, RasterState};
