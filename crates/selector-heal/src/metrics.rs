//! Resolver telemetry.
//!
//! Lightweight counters so callers can surface how often locators heal without
//! depending on an external metrics backend.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ResolverMetrics {
    total: AtomicU64,
    original_hits: AtomicU64,
    cache_hits: AtomicU64,
    healed: AtomicU64,
    exhausted: AtomicU64,
    healing_disabled: AtomicU64,
    malformed_originals: AtomicU64,
    probe_calls: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub original_hits: u64,
    pub cache_hits: u64,
    pub healed: u64,
    pub exhausted: u64,
    pub healing_disabled: u64,
    pub malformed_originals: u64,
    pub probe_calls: u64,
    /// Share of resolutions that needed a fallback and found one
    pub heal_rate: f64,
}

impl ResolverMetrics {
    pub(crate) fn record_call(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_original_hit(&self) {
        self.original_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_healed(&self) {
        self.healed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_healing_disabled(&self) {
        self.healing_disabled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_originals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_probe_call(&self) {
        self.probe_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let healed = self.healed.load(Ordering::Relaxed);
        let exhausted = self.exhausted.load(Ordering::Relaxed);
        let attempts = cache_hits + healed + exhausted;
        let heal_rate = if attempts == 0 {
            0.0
        } else {
            (cache_hits + healed) as f64 / attempts as f64
        };
        MetricsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            original_hits: self.original_hits.load(Ordering::Relaxed),
            cache_hits,
            healed,
            exhausted,
            healing_disabled: self.healing_disabled.load(Ordering::Relaxed),
            malformed_originals: self.malformed_originals.load(Ordering::Relaxed),
            probe_calls: self.probe_calls.load(Ordering::Relaxed),
            heal_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heal_rate_ignores_original_hits() {
        let metrics = ResolverMetrics::default();
        metrics.record_original_hit();
        metrics.record_healed();
        metrics.record_cache_hit();
        metrics.record_exhausted();
        metrics.record_exhausted();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.original_hits, 1);
        assert!((snapshot.heal_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_metrics_have_zero_rate() {
        assert_eq!(ResolverMetrics::default().snapshot().heal_rate, 0.0);
    }
}
