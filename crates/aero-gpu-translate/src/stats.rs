use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the translation layer.
///
/// Updated on the recording thread; safe to snapshot from another thread.
#[derive(Debug, Default)]
pub struct TranslateStats {
    draws_recorded: AtomicU64,
    draws_skipped: AtomicU64,
    dispatches_recorded: AtomicU64,
    pipeline_binds: AtomicU64,
    pipeline_binds_elided: AtomicU64,
    pipeline_compile_failures: AtomicU64,
    dynamic_state_commands: AtomicU64,
    render_pass_begins: AtomicU64,
    render_pass_ends: AtomicU64,
    framebuffer_rebuilds: AtomicU64,
    topology_conversions: AtomicU64,
    indirect_count_fallbacks: AtomicU64,
    buffer_rebinds: AtomicU64,
    deferred_destroys: AtomicU64,
}

impl TranslateStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_draws_recorded(&self) {
        self.draws_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_draws_skipped(&self) {
        self.draws_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dispatches_recorded(&self) {
        self.dispatches_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pipeline_binds(&self) {
        self.pipeline_binds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pipeline_binds_elided(&self) {
        self.pipeline_binds_elided.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pipeline_compile_failures(&self) {
        self.pipeline_compile_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_dynamic_state_commands(&self, n: u32) {
        self.dynamic_state_commands
            .fetch_add(u64::from(n), Ordering::Relaxed);
    }

    pub fn inc_render_pass_begins(&self) {
        self.render_pass_begins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_render_pass_ends(&self) {
        self.render_pass_ends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_framebuffer_rebuilds(&self) {
        self.framebuffer_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_topology_conversions(&self) {
        self.topology_conversions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_indirect_count_fallbacks(&self) {
        self.indirect_count_fallbacks
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_buffer_rebinds(&self) {
        self.buffer_rebinds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_deferred_destroys(&self, n: usize) {
        self.deferred_destroys
            .fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TranslateStatsSnapshot {
        TranslateStatsSnapshot {
            draws_recorded: self.draws_recorded.load(Ordering::Relaxed),
            draws_skipped: self.draws_skipped.load(Ordering::Relaxed),
            dispatches_recorded: self.dispatches_recorded.load(Ordering::Relaxed),
            pipeline_binds: self.pipeline_binds.load(Ordering::Relaxed),
            pipeline_binds_elided: self.pipeline_binds_elided.load(Ordering::Relaxed),
            pipeline_compile_failures: self.pipeline_compile_failures.load(Ordering::Relaxed),
            dynamic_state_commands: self.dynamic_state_commands.load(Ordering::Relaxed),
            render_pass_begins: self.render_pass_begins.load(Ordering::Relaxed),
            render_pass_ends: self.render_pass_ends.load(Ordering::Relaxed),
            framebuffer_rebuilds: self.framebuffer_rebuilds.load(Ordering::Relaxed),
            topology_conversions: self.topology_conversions.load(Ordering::Relaxed),
            indirect_count_fallbacks: self.indirect_count_fallbacks.load(Ordering::Relaxed),
            buffer_rebinds: self.buffer_rebinds.load(Ordering::Relaxed),
            deferred_destroys: self.deferred_destroys.load(Ordering::Relaxed),
        }
    }

    /// Returns a JSON object as a string.
    pub fn to_json(&self) -> String {
        self.snapshot().to_json()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslateStatsSnapshot {
    pub draws_recorded: u64,
    pub draws_skipped: u64,
    pub dispatches_recorded: u64,
    pub pipeline_binds: u64,
    pub pipeline_binds_elided: u64,
    pub pipeline_compile_failures: u64,
    pub dynamic_state_commands: u64,
    pub render_pass_begins: u64,
    pub render_pass_ends: u64,
    pub framebuffer_rebuilds: u64,
    pub topology_conversions: u64,
    pub indirect_count_fallbacks: u64,
    pub buffer_rebinds: u64,
    pub deferred_destroys: u64,
}

impl TranslateStatsSnapshot {
    pub fn to_json(self) -> String {
        // Hand-built: called on the recording thread.
        format!(
            "{{\"draws_recorded\":{},\"draws_skipped\":{},\"dispatches_recorded\":{},\"pipeline_binds\":{},\"pipeline_binds_elided\":{},\"pipeline_compile_failures\":{},\"dynamic_state_commands\":{},\"render_pass\":{{\"begins\":{},\"ends\":{},\"framebuffer_rebuilds\":{}}},\"topology_conversions\":{},\"indirect_count_fallbacks\":{},\"buffer_rebinds\":{},\"deferred_destroys\":{}}}",
            self.draws_recorded,
            self.draws_skipped,
            self.dispatches_recorded,
            self.pipeline_binds,
            self.pipeline_binds_elided,
            self.pipeline_compile_failures,
            self.dynamic_state_commands,
            self.render_pass_begins,
            self.render_pass_ends,
            self.framebuffer_rebuilds,
            self.topology_conversions,
            self.indirect_count_fallbacks,
            self.buffer_rebinds,
            self.deferred_destroys,
        )
    }
}
