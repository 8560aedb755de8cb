use std::fmt;
use std::sync::{Arc, OnceLock};

use tether_obj_model::{HeaderAllocator, SystemAllocator};

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|val| !val.is_empty() && val != "0")
        .unwrap_or(false)
}

fn profile_from_env() -> bool {
    static PROFILE: OnceLock<bool> = OnceLock::new();
    *PROFILE.get_or_init(|| env_flag("TETHER_PROFILE"))
}

fn trace_refcount_from_env() -> bool {
    static TRACE: OnceLock<bool> = OnceLock::new();
    *TRACE.get_or_init(|| {
        matches!(
            std::env::var("TETHER_TRACE_REFCOUNT").ok().as_deref(),
            Some("1")
        )
    })
}

#[derive(Clone)]
pub struct BridgeConfig {
    /// Count store/refcount/teardown events in `StoreMetrics`.
    pub profile: bool,
    /// Emit a trace event for every store, incref, decref and release.
    pub trace_refcounts: bool,
    pub allocator: Arc<dyn HeaderAllocator>,
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self {
            profile: profile_from_env(),
            trace_refcounts: trace_refcount_from_env(),
            allocator: Arc::new(SystemAllocator),
        }
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn HeaderAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_trace_refcounts(mut self, trace: bool) -> Self {
        self.trace_refcounts = trace;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            profile: false,
            trace_refcounts: false,
            allocator: Arc::new(SystemAllocator),
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("profile", &self.profile)
            .field("trace_refcounts", &self.trace_refcounts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = BridgeConfig::default()
            .with_profile(true)
            .with_trace_refcounts(true);
        assert!(config.profile);
        assert!(config.trace_refcounts);
        assert!(!BridgeConfig::default().profile);
    }
}
