//! Mercury instrumentation engine
//!
//! Times instrumented code regions, scores repeated-query (N+1) patterns and
//! keeps a memory-mapped history of per-test quality metrics.
//!
//! # Architecture
//!
//! ```text
//! increment_query() ──► GlobalCounters ◄── snapshot ── Monitor (sharded sessions)
//!                                                          │ stop
//!                                                          ▼
//!                                                    MetricsRecord ──► SeverityPolicy
//!
//! create/update ──► ContextStore (bounded arena) ── finalize ──► HistoryStore (mmap)
//! ```
//!
//! # Example
//!
//! ```
//! use mercury_core::Engine;
//!
//! let engine = Engine::default();
//! let id = engine.monitor().start("UserListView", Some("view")).unwrap();
//! for _ in 0..15 {
//!     engine.counters().increment_query();
//! }
//! let record = engine.monitor().stop(id).unwrap();
//! assert_eq!(record.query_count, 15);
//! assert_eq!(record.n_plus_one_severity, 1);
//! ```

pub mod analyzer;
pub mod config;
pub mod config_file;
pub mod context;
pub mod counters;
pub mod engine;
pub mod error;
pub mod fixed_str;
pub mod history;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;
pub mod safe_path;

pub use analyzer::{NPlusOneCause, SeverityPolicy, MAX_SEVERITY};
pub use config::{ContextStoreConfig, EngineConfig, HistoryConfig, MonitorConfig};
pub use context::{ContextHandle, ContextStore, TestContext};
pub use counters::{CounterSnapshot, GlobalCounters};
pub use engine::Engine;
pub use error::{ContextError, MercuryError, MonitorError, Result};
pub use fixed_str::FixedStr;
pub use history::{HistoryEntry, HistoryError, HistoryQuery, HistoryStore};
pub use logging::init_logging;
pub use metrics::MetricsRecord;
pub use monitor::{Monitor, INVALID_SESSION_ID};
pub use orchestrator::{Orchestrator, OrchestratorStatistics, OrchestratorStats};
