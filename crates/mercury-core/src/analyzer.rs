//! N+1 query severity analysis
//!
//! Pure functions over a [`MetricsRecord`]. Severity is a step function of
//! the query count, so it never decreases as the count grows and is always
//! within `0..=MAX_SEVERITY`.

use crate::metrics::MetricsRecord;
use serde::{Deserialize, Serialize};

/// Highest severity level
pub const MAX_SEVERITY: u8 = 5;

/// Mean query time below which repeated queries look like serializer fan-out
const SERIALIZER_MEAN_QUERY_MS: f64 = 0.3;

/// Mean query time above which repeated queries look like foreign-key access
const FOREIGN_KEY_MEAN_QUERY_MS: f64 = 0.8;

/// Query-count thresholds for severity levels 1 through 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityPolicy {
    pub thresholds: [u32; 5],
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self {
            // mild, moderate, high, severe, critical
            thresholds: [12, 18, 25, 35, 50],
        }
    }
}

impl SeverityPolicy {
    /// Build a policy, rejecting thresholds that are zero or not strictly ascending
    pub fn new(thresholds: [u32; 5]) -> Result<Self, String> {
        let policy = Self { thresholds };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.thresholds[0] == 0 {
            return Err("first severity threshold must be > 0".into());
        }
        if self.thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!(
                "severity thresholds must be strictly ascending: {:?}",
                self.thresholds
            ));
        }
        Ok(())
    }

    /// Severity for a raw query count
    pub fn severity_for_count(&self, query_count: u32) -> u8 {
        let level = self
            .thresholds
            .iter()
            .take_while(|&&t| query_count >= t)
            .count();
        // At most five thresholds, so this always fits
        level.min(usize::from(MAX_SEVERITY)) as u8
    }

    /// Severity for a completed session
    pub fn severity(&self, record: &MetricsRecord) -> u8 {
        self.severity_for_count(record.query_count)
    }

    pub fn has_n_plus_one(&self, record: &MetricsRecord) -> bool {
        self.severity(record) >= 1
    }

    pub fn is_moderate(&self, record: &MetricsRecord) -> bool {
        matches!(self.severity(record), 2 | 3)
    }

    pub fn is_severe(&self, record: &MetricsRecord) -> bool {
        self.severity(record) >= 4
    }

    /// Most likely origin of the repeated queries
    pub fn estimate_cause(&self, record: &MetricsRecord) -> NPlusOneCause {
        if !self.has_n_plus_one(record) {
            return NPlusOneCause::None;
        }
        if record.query_count >= self.thresholds[4] {
            return NPlusOneCause::ComplexRelationship;
        }

        let mean_ms = record.mean_query_time_ms();
        if record.operation_type.as_str().eq_ignore_ascii_case("serializer")
            || mean_ms < SERIALIZER_MEAN_QUERY_MS
        {
            NPlusOneCause::Serializer
        } else if mean_ms > FOREIGN_KEY_MEAN_QUERY_MS {
            NPlusOneCause::ForeignKey
        } else {
            NPlusOneCause::RelatedModel
        }
    }
}

/// Classified origin of an N+1 pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum NPlusOneCause {
    None = 0,
    Serializer = 1,
    RelatedModel = 2,
    ForeignKey = 3,
    ComplexRelationship = 4,
}

impl NPlusOneCause {
    /// Fix suggestion, NUL-terminated for direct use across the C ABI
    pub fn suggestion_with_nul(self) -> &'static str {
        match self {
            NPlusOneCause::None => "No N+1 pattern detected.\0",
            NPlusOneCause::Serializer => {
                "Serializer fan-out: prefetch nested relations with prefetch_related() before serializing.\0"
            }
            NPlusOneCause::RelatedModel => {
                "Related model lookups in a loop: use select_related() for forward relations.\0"
            }
            NPlusOneCause::ForeignKey => {
                "Slow per-row foreign key access: join with select_related() or annotate the needed fields.\0"
            }
            NPlusOneCause::ComplexRelationship => {
                "Complex relationship traversal: combine select_related(), prefetch_related() with Prefetch() and only().\0"
            }
        }
    }

    /// Fix suggestion text
    pub fn suggestion(self) -> &'static str {
        let s = self.suggestion_with_nul();
        &s[..s.len() - 1]
    }
}
