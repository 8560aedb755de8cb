use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Profile counters for the object store and thread lifecycle. Only bumped
/// when profiling is enabled.
#[derive(Debug, Default)]
pub(crate) struct StoreMetrics {
    enabled: bool,
    pub(crate) stores: AtomicU64,
    pub(crate) dedup_hits: AtomicU64,
    pub(crate) increfs: AtomicU64,
    pub(crate) decrefs: AtomicU64,
    pub(crate) releases: AtomicU64,
    pub(crate) temps_freed: AtomicU64,
    pub(crate) thread_teardowns: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub stores: u64,
    pub dedup_hits: u64,
    pub increfs: u64,
    pub decrefs: u64,
    /// Header blocks returned to the allocator.
    pub releases: u64,
    pub temps_freed: u64,
    pub thread_teardowns: u64,
}

impl StoreMetrics {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub(crate) fn profile_hit(&self, counter: &AtomicU64) {
        if self.enabled {
            counter.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    pub(crate) fn profile_add(&self, counter: &AtomicU64, n: u64) {
        if self.enabled && n > 0 {
            counter.fetch_add(n, AtomicOrdering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(AtomicOrdering::Relaxed);
        MetricsSnapshot {
            stores: load(&self.stores),
            dedup_hits: load(&self.dedup_hits),
            increfs: load(&self.increfs),
            decrefs: load(&self.decrefs),
            releases: load(&self.releases),
            temps_freed: load(&self.temps_freed),
            thread_teardowns: load(&self.thread_teardowns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_counters_stay_at_zero() {
        let metrics = StoreMetrics::new(false);
        metrics.profile_hit(&metrics.stores);
        metrics.profile_add(&metrics.temps_freed, 3);
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());

        let metrics = StoreMetrics::new(true);
        metrics.profile_hit(&metrics.stores);
        metrics.profile_add(&metrics.temps_freed, 3);
        let snap = metrics.snapshot();
        assert_eq!(snap.stores, 1);
        assert_eq!(snap.temps_freed, 3);
    }
}
