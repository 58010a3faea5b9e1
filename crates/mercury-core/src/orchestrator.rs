//! Test orchestrator
//!
//! Ties the context store to the history store: contexts are created and
//! updated in memory, and finalizing one appends it to the open history
//! file and folds it into the running statistics.

use crate::analyzer::SeverityPolicy;
use crate::config::{ContextStoreConfig, HistoryConfig};
use crate::context::{ContextHandle, ContextStore, TestContext};
use crate::error::Result;
use crate::history::{HistoryEntry, HistoryQuery, HistoryStore};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Cumulative totals over finalized tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub total_tests: u64,
    pub total_violations: u64,
    pub total_n_plus_one: u64,
    pub total_response_time_ms: f64,
    pub total_memory_mb: f64,
}

impl OrchestratorStats {
    fn record(&mut self, context: &TestContext) {
        self.total_tests += 1;
        if context.is_violation() {
            self.total_violations += 1;
        }
        if context.has_n_plus_one {
            self.total_n_plus_one += 1;
        }
        self.total_response_time_ms += context.response_time_ms;
        self.total_memory_mb += context.memory_usage_mb;
    }

    pub fn avg_response_time_ms(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            self.total_response_time_ms / self.total_tests as f64
        }
    }

    pub fn avg_memory_usage_mb(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            self.total_memory_mb / self.total_tests as f64
        }
    }
}

/// Point-in-time statistics report
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrchestratorStatistics {
    pub total_tests: u64,
    pub total_violations: u64,
    pub total_n_plus_one: u64,
    pub active_contexts: usize,
    pub history_entries: u64,
    pub avg_response_time_ms: f64,
    pub avg_memory_usage_mb: f64,
}

pub struct Orchestrator {
    contexts: ContextStore,
    history: RwLock<Option<HistoryStore>>,
    stats: Mutex<OrchestratorStats>,
    history_config: HistoryConfig,
}

impl Orchestrator {
    pub fn new(contexts: &ContextStoreConfig, history_config: HistoryConfig) -> Self {
        Self {
            contexts: ContextStore::new(contexts),
            history: RwLock::new(None),
            stats: Mutex::new(OrchestratorStats::default()),
            history_config,
        }
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    pub fn history_config(&self) -> &HistoryConfig {
        &self.history_config
    }

    /// Open `path` as the history store.
    ///
    /// On failure any previously open store stays in place.
    pub fn initialize_history(&self, path: &Path) -> Result<()> {
        let store = HistoryStore::open(path, &self.history_config)?;
        let previous = self.history.write().replace(store);
        if let Some(previous) = previous {
            if let Err(e) = previous.close() {
                warn!(error = %e, "Failed to close previous history store");
            }
        }
        Ok(())
    }

    /// Close the history store if one is open
    pub fn cleanup_history(&self) {
        if let Some(store) = self.history.write().take() {
            if let Err(e) = store.close() {
                warn!(error = %e, "Failed to flush history store on cleanup");
            }
        }
    }

    pub fn has_history(&self) -> bool {
        self.history.read().is_some()
    }

    pub fn create_context(
        &self,
        class_name: Option<&str>,
        method_name: Option<&str>,
    ) -> Result<ContextHandle> {
        Ok(self.contexts.create(class_name, method_name)?)
    }

    pub fn update_metrics(
        &self,
        handle: ContextHandle,
        response_time_ms: f64,
        memory_usage_mb: f64,
        query_count: u32,
        cache_hit_ratio: f64,
        grade: Option<&str>,
    ) -> Result<()> {
        Ok(self.contexts.update_metrics(
            handle,
            response_time_ms,
            memory_usage_mb,
            query_count,
            cache_hit_ratio,
            grade,
        )?)
    }

    pub fn update_n_plus_one(
        &self,
        handle: ContextHandle,
        query_count: u32,
        duplicate_count: u32,
        suggestion: Option<&str>,
        policy: &SeverityPolicy,
    ) -> Result<()> {
        Ok(self
            .contexts
            .update_n_plus_one(handle, query_count, duplicate_count, suggestion, policy)?)
    }

    /// Release the context, count it, and append it to history if open.
    ///
    /// The slot is released and counted even when the append fails.
    pub fn finalize(&self, handle: ContextHandle) -> Result<TestContext> {
        let context = self.contexts.take(handle)?;
        self.stats.lock().record(&context);

        if let Some(store) = self.history.read().as_ref() {
            store.append_context(&context).map_err(|e| {
                warn!(
                    class = context.class_name.as_str(),
                    method = context.method_name.as_str(),
                    error = %e,
                    "Failed to append test context to history"
                );
                e
            })?;
        }
        Ok(context)
    }

    /// Release the context without recording it
    pub fn destroy(&self, handle: ContextHandle) -> Result<()> {
        Ok(self.contexts.destroy(handle)?)
    }

    pub fn statistics(&self) -> OrchestratorStatistics {
        let stats = *self.stats.lock();
        OrchestratorStatistics {
            total_tests: stats.total_tests,
            total_violations: stats.total_violations,
            total_n_plus_one: stats.total_n_plus_one,
            active_contexts: self.contexts.active_count(),
            history_entries: self.history.read().as_ref().map_or(0, |h| h.len()),
            avg_response_time_ms: stats.avg_response_time_ms(),
            avg_memory_usage_mb: stats.avg_memory_usage_mb(),
        }
    }

    pub fn stats_snapshot(&self) -> OrchestratorStats {
        *self.stats.lock()
    }

    pub fn restore_stats(&self, stats: OrchestratorStats) {
        *self.stats.lock() = stats;
        info!(total_tests = stats.total_tests, "Restored orchestrator statistics");
    }

    /// Matching history entries; empty when no store is open
    pub fn query_history(&self, query: &HistoryQuery<'_>) -> Result<Vec<HistoryEntry>> {
        match self.history.read().as_ref() {
            Some(store) => Ok(store.query(query)?),
            None => Ok(Vec::new()),
        }
    }

    /// Render matching entries into `out`, one per line.
    ///
    /// Only whole lines are written and the output is always NUL-terminated.
    /// Returns the number of lines written.
    pub fn write_history_lines(&self, query: &HistoryQuery<'_>, out: &mut [u8]) -> Result<usize> {
        let Some(limit) = out.len().checked_sub(1) else {
            return Ok(0);
        };
        out[0] = 0;

        let entries = self.query_history(query)?;
        let mut pos = 0;
        let mut lines = 0;
        for entry in &entries {
            let line = format!(
                "{}::{} grade={} response_ms={:.2} queries={} severity={}\n",
                entry.class_name,
                entry.method_name,
                entry.grade,
                entry.response_time_ms,
                entry.query_count,
                entry.severity_level
            );
            if pos + line.len() > limit {
                break;
            }
            out[pos..pos + line.len()].copy_from_slice(line.as_bytes());
            pos += line.len();
            lines += 1;
        }
        out[pos] = 0;
        Ok(lines)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(&ContextStoreConfig::default(), HistoryConfig::default())
    }
}
