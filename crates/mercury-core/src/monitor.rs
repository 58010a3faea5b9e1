//! Session registry
//!
//! Issues session ids, remembers when each session started, and turns a
//! stopped session into a [`MetricsRecord`]. Sessions are partitioned over
//! shards keyed by id; each shard uses RwLock so starts and stops on
//! different shards never contend.

use crate::analyzer::SeverityPolicy;
use crate::config::MonitorConfig;
use crate::counters::{CounterSnapshot, GlobalCounters};
use crate::error::MonitorError;
use crate::memory::get_rss_bytes;
use crate::metrics::{MetricsRecord, OperationName, OperationType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Id returned to callers when a session cannot be started
pub const INVALID_SESSION_ID: i64 = -1;

/// An open monitoring interval
#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    pub operation_name: OperationName,
    pub operation_type: OperationType,
    pub start_time: Instant,
    pub active: bool,
    counters_at_start: CounterSnapshot,
    memory_start_bytes: u64,
}

/// Monitoring engine: session registry plus the counters it snapshots
pub struct Monitor {
    shards: Vec<RwLock<HashMap<i64, Session>>>,
    next_id: AtomicI64,
    counters: Arc<GlobalCounters>,
    policy: RwLock<SeverityPolicy>,
    epoch: Instant,
    config: MonitorConfig,
}

impl Monitor {
    /// Create a monitor with default configuration and its own counters
    pub fn new() -> Self {
        Self::with_config(MonitorConfig::default(), Arc::new(GlobalCounters::new()))
    }

    pub fn with_config(config: MonitorConfig, counters: Arc<GlobalCounters>) -> Self {
        let num_shards = config.shards.max(1);
        Self {
            shards: (0..num_shards).map(|_| RwLock::new(HashMap::new())).collect(),
            next_id: AtomicI64::new(1),
            counters,
            policy: RwLock::new(SeverityPolicy::default()),
            epoch: Instant::now(),
            config,
        }
    }

    #[inline]
    fn shard_for_id(&self, id: i64) -> &RwLock<HashMap<i64, Session>> {
        &self.shards[id as usize % self.shards.len()]
    }

    #[inline]
    fn sample_memory(&self) -> u64 {
        if self.config.track_memory {
            get_rss_bytes().unwrap_or(0)
        } else {
            0
        }
    }

    /// Shared counters read by this monitor
    pub fn counters(&self) -> &Arc<GlobalCounters> {
        &self.counters
    }

    /// Severity policy applied when sessions stop
    pub fn policy(&self) -> SeverityPolicy {
        *self.policy.read()
    }

    pub fn set_policy(&self, policy: SeverityPolicy) {
        *self.policy.write() = policy;
    }

    /// Open a session.
    ///
    /// `operation_type` falls back to the configured default when absent.
    pub fn start(
        &self,
        operation_name: &str,
        operation_type: Option<&str>,
    ) -> Result<i64, MonitorError> {
        if operation_name.is_empty() {
            return Err(MonitorError::EmptyOperationName);
        }

        let operation_type = operation_type.unwrap_or(&self.config.default_operation_type);
        // Ids start at 1 and only grow; 0 and negatives stay reserved
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let session = Session {
            id,
            operation_name: OperationName::from_str_truncated(operation_name),
            operation_type: OperationType::from_str_truncated(operation_type),
            start_time: Instant::now(),
            active: true,
            counters_at_start: self.counters.snapshot(),
            memory_start_bytes: self.sample_memory(),
        };

        self.shard_for_id(id).write().insert(id, session);
        debug!(session_id = id, operation = operation_name, "Started monitoring session");
        Ok(id)
    }

    /// Close a session and build its metrics record.
    ///
    /// Returns `None` for unknown, non-positive or already stopped ids.
    pub fn stop(&self, id: i64) -> Option<MetricsRecord> {
        if id <= 0 {
            return None;
        }

        let end = Instant::now();
        let counters = self.counters.snapshot();
        // Removal hands the session to exactly one caller
        let mut session = self.shard_for_id(id).write().remove(&id)?;
        session.active = false;

        let memory_end_bytes = self.sample_memory();
        let elapsed = end.saturating_duration_since(session.start_time);

        let mut record = MetricsRecord {
            session_id: session.id,
            start_time_ns: self.nanos_since_epoch(session.start_time),
            end_time_ns: self.nanos_since_epoch(end),
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            memory_start_bytes: session.memory_start_bytes,
            memory_peak_bytes: session.memory_start_bytes.max(memory_end_bytes),
            memory_end_bytes,
            query_count: counters.queries,
            query_count_start: session.counters_at_start.queries,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            n_plus_one_severity: 0,
            operation_name: session.operation_name,
            operation_type: session.operation_type,
        };
        record.n_plus_one_severity = self.policy().severity(&record);

        debug!(
            session_id = id,
            elapsed_ms = record.elapsed_ms,
            queries = record.query_count,
            severity = record.n_plus_one_severity,
            "Stopped monitoring session"
        );
        Some(record)
    }

    /// Number of sessions started but not yet stopped
    pub fn active_sessions(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    fn nanos_since_epoch(&self, at: Instant) -> u64 {
        u64::try_from(at.saturating_duration_since(self.epoch).as_nanos()).unwrap_or(u64::MAX)
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_start_stop_lifecycle() {
        let monitor = Monitor::new();
        let id = monitor.start("UserViewTest", Some("view")).unwrap();
        assert!(id > 0);
        assert_eq!(monitor.active_sessions(), 1);

        thread::sleep(Duration::from_millis(10));

        let record = monitor.stop(id).unwrap();
        assert_eq!(record.session_id, id);
        assert!(record.elapsed_ms >= 10.0);
        assert!(record.end_time_ns > record.start_time_ns);
        assert_eq!(record.operation_name.as_str(), "UserViewTest");
        assert_eq!(record.operation_type.as_str(), "view");
        assert_eq!(monitor.active_sessions(), 0);
    }

    #[test]
    fn test_empty_name_rejected() {
        let monitor = Monitor::new();
        assert_eq!(monitor.start("", Some("view")), Err(MonitorError::EmptyOperationName));
        assert_eq!(monitor.active_sessions(), 0);
    }

    #[test]
    fn test_missing_type_uses_default() {
        let monitor = Monitor::with_config(
            MonitorConfig::default().with_default_operation_type("boundary"),
            Arc::new(GlobalCounters::new()),
        );
        let id = monitor.start("NullType", None).unwrap();
        let record = monitor.stop(id).unwrap();
        assert_eq!(record.operation_type.as_str(), "boundary");
    }

    #[test]
    fn test_stop_twice_returns_none() {
        let monitor = Monitor::new();
        let id = monitor.start("Once", None).unwrap();
        assert!(monitor.stop(id).is_some());
        assert!(monitor.stop(id).is_none());
    }

    #[test]
    fn test_stop_invalid_ids() {
        let monitor = Monitor::new();
        assert!(monitor.stop(-1).is_none());
        assert!(monitor.stop(0).is_none());
        assert!(monitor.stop(i64::MAX).is_none());
    }

    #[test]
    fn test_query_count_snapshot() {
        let monitor = Monitor::new();
        let id = monitor.start("Queries", Some("view")).unwrap();
        for _ in 0..3 {
            monitor.counters().increment_query();
        }
        let record = monitor.stop(id).unwrap();
        assert_eq!(record.query_count, 3);
        assert_eq!(record.query_count_start, 0);
    }

    #[test]
    fn test_counters_persist_across_sessions() {
        let monitor = Monitor::new();

        let first = monitor.start("First", None).unwrap();
        monitor.counters().increment_query();
        assert_eq!(monitor.stop(first).unwrap().query_count, 1);

        let second = monitor.start("Second", None).unwrap();
        monitor.counters().increment_query();
        monitor.counters().increment_query();
        let record = monitor.stop(second).unwrap();
        assert_eq!(record.query_count, 3);
        assert_eq!(record.queries_during_session(), 2);

        monitor.counters().reset();
        let third = monitor.start("Third", None).unwrap();
        assert_eq!(monitor.stop(third).unwrap().query_count, 0);
    }

    #[test]
    fn test_severity_recorded_on_stop() {
        let monitor = Monitor::new();
        let id = monitor.start("HighQueryTest", Some("view")).unwrap();
        for _ in 0..60 {
            monitor.counters().increment_query();
        }
        assert_eq!(monitor.stop(id).unwrap().n_plus_one_severity, 5);
    }

    #[test]
    fn test_long_labels_truncated() {
        let monitor = Monitor::new();
        let name = "N".repeat(1000);
        let kind = "T".repeat(1000);
        let id = monitor.start(&name, Some(&kind)).unwrap();
        let record = monitor.stop(id).unwrap();
        assert_eq!(record.operation_name.len(), 255);
        assert_eq!(record.operation_type.len(), 63);
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let monitor = Arc::new(Monitor::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let monitor = Arc::clone(&monitor);
                thread::spawn(move || {
                    (0..10)
                        .map(|i| monitor.start(&format!("Thread{}_{}", t, i), Some("view")).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 40);
        assert!(ids.iter().all(|&id| id > 0));
        assert_eq!(monitor.active_sessions(), 40);

        for id in ids {
            assert!(monitor.stop(id).is_some());
        }
    }

    #[test]
    fn test_concurrent_stop_yields_single_record() {
        let monitor = Arc::new(Monitor::new());
        let id = monitor.start("Contended", None).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                thread::spawn(move || monitor.stop(id).is_some())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(successes, 1);
    }
}
