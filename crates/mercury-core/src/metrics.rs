//! Metrics record produced by a completed monitoring session
//!
//! The layout is `#[repr(C)]` so the record can be handed across the C ABI
//! as an opaque, fixed-layout block. Once built it is never mutated.

use crate::fixed_str::FixedStr;
use crate::memory::bytes_to_mb;

/// Bounded operation name (255 visible bytes)
pub type OperationName = FixedStr<256>;
/// Bounded operation type (63 visible bytes)
pub type OperationType = FixedStr<64>;

/// Memory growth above which an operation counts as memory intensive
pub const MEMORY_INTENSIVE_MB: f64 = 50.0;

/// Hit ratio below which cache usage counts as poor
pub const POOR_CACHE_HIT_RATIO: f64 = 0.7;

/// Result of one `start`/`stop` interval
#[repr(C)]
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRecord {
    pub session_id: i64,
    /// Nanoseconds since the engine epoch (monotonic)
    pub start_time_ns: u64,
    /// Nanoseconds since the engine epoch (monotonic)
    pub end_time_ns: u64,
    pub elapsed_ms: f64,
    pub memory_start_bytes: u64,
    pub memory_peak_bytes: u64,
    pub memory_end_bytes: u64,
    /// Global query counter at stop
    pub query_count: u32,
    /// Global query counter at start
    pub query_count_start: u32,
    pub cache_hits: u32,
    pub cache_misses: u32,
    /// 0 (none) ..= 5 (critical)
    pub n_plus_one_severity: u8,
    pub operation_name: OperationName,
    pub operation_type: OperationType,
}

impl MetricsRecord {
    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    #[inline]
    pub fn query_count(&self) -> u32 {
        self.query_count
    }

    /// Queries issued while the session was open, assuming no reset in between
    pub fn queries_during_session(&self) -> u32 {
        self.query_count.saturating_sub(self.query_count_start)
    }

    /// Fraction of cache accesses that hit, 0.0 when there were none
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = u64::from(self.cache_hits) + u64::from(self.cache_misses);
        if total == 0 {
            0.0
        } else {
            f64::from(self.cache_hits) / total as f64
        }
    }

    /// Peak resident memory seen during the session, in megabytes
    pub fn memory_usage_mb(&self) -> f64 {
        bytes_to_mb(self.memory_peak_bytes)
    }

    /// Memory growth over the session in megabytes (never negative)
    pub fn memory_delta_mb(&self) -> f64 {
        bytes_to_mb(self.memory_end_bytes.saturating_sub(self.memory_start_bytes))
    }

    pub fn is_memory_intensive(&self) -> bool {
        self.memory_delta_mb() >= MEMORY_INTENSIVE_MB
    }

    pub fn has_poor_cache_performance(&self) -> bool {
        let total = u64::from(self.cache_hits) + u64::from(self.cache_misses);
        total > 0 && self.cache_hit_ratio() < POOR_CACHE_HIT_RATIO
    }

    /// Mean time per query in milliseconds, 0.0 without queries
    pub fn mean_query_time_ms(&self) -> f64 {
        if self.query_count == 0 {
            0.0
        } else {
            self.elapsed_ms / f64::from(self.query_count)
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_record(query_count: u32, elapsed_ms: f64) -> MetricsRecord {
    MetricsRecord {
        session_id: 1,
        start_time_ns: 0,
        end_time_ns: (elapsed_ms * 1_000_000.0) as u64,
        elapsed_ms,
        memory_start_bytes: 0,
        memory_peak_bytes: 0,
        memory_end_bytes: 0,
        query_count,
        query_count_start: 0,
        cache_hits: 0,
        cache_misses: 0,
        n_plus_one_severity: 0,
        operation_name: OperationName::from_str_truncated("SampleView"),
        operation_type: OperationType::from_str_truncated("view"),
    }
}
