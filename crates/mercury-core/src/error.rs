//! Engine error types
//!
//! Each subsystem has its own error enum; `MercuryError` unifies them for
//! callers that drive the whole engine.

use thiserror::Error;

/// Result type alias for engine-level operations
pub type Result<T> = std::result::Result<T, MercuryError>;

/// Errors raised by the session registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Operation name must not be empty")]
    EmptyOperationName,
}

/// Errors raised by the test context store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Context pool exhausted ({0} live contexts)")]
    PoolExhausted(usize),

    #[error("Unknown or released context handle: {0:#x}")]
    InvalidHandle(u64),
}

/// Unified error type for the engine
#[derive(Error, Debug)]
pub enum MercuryError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    History(#[from] crate::history::HistoryError),

    #[error(transparent)]
    Config(#[from] crate::config_file::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
