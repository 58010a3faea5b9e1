//! Engine facade
//!
//! One `Engine` owns the counters, the session registry and the test
//! orchestrator, and shares a single severity policy between them.

use crate::analyzer::SeverityPolicy;
use crate::config::EngineConfig;
use crate::config_file::{self, PersistedConfig};
use crate::context::ContextHandle;
use crate::counters::GlobalCounters;
use crate::error::{MercuryError, Result};
use crate::monitor::Monitor;
use crate::orchestrator::Orchestrator;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct Engine {
    counters: Arc<GlobalCounters>,
    monitor: Monitor,
    orchestrator: Orchestrator,
    config: EngineConfig,
}

impl Engine {
    /// Build an engine after validating `config`
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        let counters = Arc::new(GlobalCounters::new());
        let monitor = Monitor::with_config(config.monitor.clone(), Arc::clone(&counters));
        monitor.set_policy(config.severity);
        let orchestrator = Orchestrator::new(&config.contexts, config.history.clone());
        Self {
            counters,
            monitor,
            orchestrator,
            config,
        }
    }

    pub fn counters(&self) -> &GlobalCounters {
        &self.counters
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Active severity policy
    pub fn policy(&self) -> SeverityPolicy {
        self.monitor.policy()
    }

    /// Replace the severity thresholds; the old policy stays on error
    pub fn configure_thresholds(&self, thresholds: [u32; 5]) -> Result<()> {
        let policy = SeverityPolicy::new(thresholds).map_err(MercuryError::InvalidConfig)?;
        self.monitor.set_policy(policy);
        info!(?thresholds, "Updated N+1 severity thresholds");
        Ok(())
    }

    /// Record N+1 analysis on a context using the active policy
    pub fn update_n_plus_one(
        &self,
        handle: ContextHandle,
        query_count: u32,
        duplicate_count: u32,
        suggestion: Option<&str>,
    ) -> Result<()> {
        let policy = self.policy();
        self.orchestrator
            .update_n_plus_one(handle, query_count, duplicate_count, suggestion, &policy)
    }

    /// Persist the severity policy and cumulative statistics
    pub fn save_configuration(&self, path: &Path) -> Result<()> {
        let persisted = PersistedConfig {
            policy: self.policy(),
            stats: self.orchestrator.stats_snapshot(),
        };
        config_file::save(path, &persisted, self.config.history.max_path_len)?;
        Ok(())
    }

    /// Restore the severity policy and cumulative statistics.
    ///
    /// The file is fully verified before anything is applied.
    pub fn load_configuration(&self, path: &Path) -> Result<()> {
        let persisted = config_file::load(path, self.config.history.max_path_len)?;
        self.monitor.set_policy(persisted.policy);
        self.orchestrator.restore_stats(persisted.stats);
        Ok(())
    }

    /// Close the history store and zero the counters
    pub fn shutdown(&self) {
        self.orchestrator.cleanup_history();
        self.counters.reset();
    }
}

impl Default for Engine {
    fn default() -> Self {
        // Default configuration always validates
        Self::build(EngineConfig::default())
    }
}
