//! Engine configuration
//!
//! Plain structs with defaults and `with_*` builders. Nothing here reads the
//! environment; the host passes every setting explicitly.

use crate::analyzer::SeverityPolicy;
use crate::error::{MercuryError, Result};

/// Default number of session registry shards (power of 2 for efficient modulo)
const DEFAULT_NUM_SHARDS: usize = 64;

/// Top-level configuration for an [`Engine`](crate::Engine)
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub monitor: MonitorConfig,
    pub severity: SeverityPolicy,
    pub contexts: ContextStoreConfig,
    pub history: HistoryConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_monitor(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_severity(mut self, severity: SeverityPolicy) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_contexts(mut self, contexts: ContextStoreConfig) -> Self {
        self.contexts = contexts;
        self
    }

    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = history;
        self
    }

    /// Check every section for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.severity.validate().map_err(MercuryError::InvalidConfig)?;
        if self.monitor.default_operation_type.is_empty() {
            return Err(MercuryError::InvalidConfig(
                "default operation type must not be empty".into(),
            ));
        }
        if self.contexts.max_contexts == 0 {
            return Err(MercuryError::InvalidConfig("max_contexts must be > 0".into()));
        }
        if self.history.initial_capacity == 0 {
            return Err(MercuryError::InvalidConfig(
                "history initial_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Session registry configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Number of registry shards (default: 64)
    pub shards: usize,

    /// Sample resident memory at start and stop (default: true)
    pub track_memory: bool,

    /// Operation type recorded when the caller supplies none
    pub default_operation_type: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            shards: DEFAULT_NUM_SHARDS,
            track_memory: true,
            default_operation_type: "general".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards.max(1);
        self
    }

    pub fn with_memory_tracking(mut self, enabled: bool) -> Self {
        self.track_memory = enabled;
        self
    }

    pub fn with_default_operation_type(mut self, operation_type: impl Into<String>) -> Self {
        self.default_operation_type = operation_type.into();
        self
    }
}

/// Test context pool configuration
#[derive(Debug, Clone)]
pub struct ContextStoreConfig {
    /// Maximum live contexts (default: 256)
    pub max_contexts: usize,
}

impl Default for ContextStoreConfig {
    fn default() -> Self {
        Self { max_contexts: 256 }
    }
}

impl ContextStoreConfig {
    pub fn with_max_contexts(mut self, max_contexts: usize) -> Self {
        self.max_contexts = max_contexts;
        self
    }
}

/// History store configuration
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Record slots allocated when a new file is created (default: 1024)
    pub initial_capacity: u64,

    /// Longest accepted path in bytes (default: 4096)
    pub max_path_len: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1024,
            max_path_len: 4096,
        }
    }
}

impl HistoryConfig {
    pub fn with_initial_capacity(mut self, initial_capacity: u64) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn with_max_path_len(mut self, max_path_len: usize) -> Self {
        self.max_path_len = max_path_len;
        self
    }
}
