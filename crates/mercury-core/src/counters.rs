//! Process-wide instrumentation counters
//!
//! Instrumented call sites bump these counters; sessions only read them.
//! Each counter is an independent atomic, so increments are never lost and
//! a racing reset leaves every counter at either its old value or zero.

use std::sync::atomic::{AtomicU32, Ordering};

/// Point-in-time view of all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub queries: u32,
    pub cache_hits: u32,
    pub cache_misses: u32,
}

/// Shared counter state
#[derive(Debug, Default)]
pub struct GlobalCounters {
    queries: AtomicU32,
    cache_hits: AtomicU32,
    cache_misses: AtomicU32,
}

impl GlobalCounters {
    /// Create counters initialized to zero
    pub const fn new() -> Self {
        Self {
            queries: AtomicU32::new(0),
            cache_hits: AtomicU32::new(0),
            cache_misses: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn increment_query(&self) {
        self.queries.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn increment_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn increment_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::AcqRel);
    }

    /// Current query count
    #[inline]
    pub fn queries(&self) -> u32 {
        self.queries.load(Ordering::Acquire)
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.queries.store(0, Ordering::Release);
        self.cache_hits.store(0, Ordering::Release);
        self.cache_misses.store(0, Ordering::Release);
    }

    /// Read all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            queries: self.queries.load(Ordering::Acquire),
            cache_hits: self.cache_hits.load(Ordering::Acquire),
            cache_misses: self.cache_misses.load(Ordering::Acquire),
        }
    }
}
