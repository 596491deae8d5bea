use std::path::PathBuf;

pub const ENV_VALIDATION: &str = "AERO_GPU_TRANSLATE_VALIDATION";
pub const ENV_PIPELINE_CACHE_PATH: &str = "AERO_GPU_PIPELINE_CACHE_PATH";
pub const ENV_FORCE_DYNAMIC_REPLAY: &str = "AERO_GPU_FORCE_DYNAMIC_REPLAY";
pub const ENV_DISABLE_EXTENDED_DYNAMIC_STATE: &str = "AERO_GPU_DISABLE_EXTENDED_DYNAMIC_STATE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Check guest-supplied slot indices and counts before acting on them.
    pub validation: bool,
    /// Maximum number of live pipeline objects before least-recently-used ones are retired.
    pub pipeline_cache_capacity: usize,
    /// Where the persistent pipeline cache blob is loaded from and saved to.
    pub pipeline_cache_path: Option<PathBuf>,
    /// Maximum number of cached index-buffer conversions.
    pub conversion_cache_capacity: usize,
    /// Replay every dynamic field before every draw (diagnostic).
    pub force_full_dynamic_replay: bool,
    /// Treat the host as baseline tier even when extended dynamic state is available.
    pub disable_extended_dynamic_state: bool,
    /// Vertex capacity of the pattern index buffer used by non-indexed indirect draws with an
    /// emulated topology. Indirect vertex counts beyond this are clipped.
    pub indirect_pattern_vertex_capacity: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            validation: false,
            pipeline_cache_capacity: 4096,
            pipeline_cache_path: None,
            conversion_cache_capacity: 256,
            force_full_dynamic_replay: false,
            disable_extended_dynamic_state: false,
            indirect_pattern_vertex_capacity: 65536,
        }
    }
}

impl RuntimeConfig {
    /// Defaults, overridden by `AERO_GPU_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_VALIDATION) {
            self.validation = is_truthy(&v);
        }
        if let Some(v) = lookup(ENV_FORCE_DYNAMIC_REPLAY) {
            self.force_full_dynamic_replay = is_truthy(&v);
        }
        if let Some(v) = lookup(ENV_DISABLE_EXTENDED_DYNAMIC_STATE) {
            self.disable_extended_dynamic_state = is_truthy(&v);
        }
        if let Some(v) = lookup(ENV_PIPELINE_CACHE_PATH) {
            let v = v.trim();
            if !v.is_empty() {
                self.pipeline_cache_path = Some(PathBuf::from(v));
            }
        }
    }
}

fn is_truthy(raw: &str) -> bool {
    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}
