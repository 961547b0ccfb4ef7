//! Per-locator resolution cache
//!
//! Maps an original locator to the last healing strategy that resolved it.
//! Two independent windows apply: entries are replayed only inside the reuse
//! window, and every write sweeps out entries older than the eviction window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::types::Strategy;

pub const DEFAULT_REUSE_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_EVICTION_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Time source for cache ageing
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(duration_to_millis(by), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

/// Reuse and eviction windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheWindows {
    pub reuse: Duration,
    pub eviction: Duration,
}

impl Default for CacheWindows {
    fn default() -> Self {
        Self {
            reuse: DEFAULT_REUSE_WINDOW,
            eviction: DEFAULT_EVICTION_WINDOW,
        }
    }
}

/// Cached healing outcome for one locator
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub strategy: Strategy,
    pub last_used: Instant,
    pub success_count: u32,
}

pub struct ResolutionCache {
    entries: DashMap<String, CacheEntry>,
    windows: CacheWindows,
    clock: Arc<dyn Clock>,
}

impl ResolutionCache {
    pub fn new(windows: CacheWindows) -> Self {
        Self::with_clock(windows, Arc::new(SystemClock))
    }

    pub fn with_clock(windows: CacheWindows, clock: Arc<dyn Clock>) -> Self {
        let windows = if windows.eviction < windows.reuse {
            warn!(
                "Eviction window {:?} shorter than reuse window {:?}; raising it",
                windows.eviction, windows.reuse
            );
            CacheWindows {
                reuse: windows.reuse,
                eviction: windows.reuse,
            }
        } else {
            windows
        };
        Self {
            entries: DashMap::new(),
            windows,
            clock,
        }
    }

    pub fn windows(&self) -> CacheWindows {
        self.windows
    }

    /// Entry for `locator`, regardless of age
    pub fn get(&self, locator: &str) -> Option<CacheEntry> {
        self.entries.get(locator).map(|entry| entry.value().clone())
    }

    /// Entry for `locator` if it was last used inside the reuse window
    pub fn get_reusable(&self, locator: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        self.get(locator)
            .filter(|entry| now.saturating_duration_since(entry.last_used) <= self.windows.reuse)
    }

    /// Record a successful strategy for `locator`.
    ///
    /// Returns the entry's success count, or `None` when the strategy kind is
    /// not cacheable.
    pub fn put(&self, locator: &str, strategy: Strategy) -> Option<u32> {
        if !strategy.kind.is_cacheable() {
            warn!(
                "Refusing to cache {} strategy for '{}'",
                strategy.kind, locator
            );
            return None;
        }

        let now = self.clock.now();
        // The entry guard holds the shard lock; release it before sweeping.
        let count = {
            let mut entry = self
                .entries
                .entry(locator.to_string())
                .or_insert_with(|| CacheEntry {
                    strategy: strategy.clone(),
                    last_used: now,
                    success_count: 0,
                });
            if entry.strategy.same_target(&strategy) {
                entry.success_count = entry.success_count.saturating_add(1);
            } else {
                entry.strategy = strategy;
                entry.success_count = 1;
            }
            entry.last_used = now;
            entry.success_count
        };

        self.sweep(now);
        Some(count)
    }

    pub fn remove(&self, locator: &str) -> Option<CacheEntry> {
        self.entries.remove(locator).map(|(_, entry)| entry)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<(String, CacheEntry)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn sweep(&self, now: Instant) {
        let before = self.entries.len();
        let eviction = self.windows.eviction;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_used) <= eviction);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!("Evicted {} expired cache entries", evicted);
        }
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(CacheWindows::default())
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    if millis > u128::from(u64::MAX) {
        u64::MAX
    } else {
        millis as u64
    }
}
