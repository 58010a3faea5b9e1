//! Logging setup
//!
//! The host chooses the level explicitly; the environment is not consulted.

use crate::error::{MercuryError, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global fmt subscriber filtered at `level`.
///
/// `level` is any `EnvFilter` directive (`"info"`, `"mercury_core=debug"`).
/// Calling again once a subscriber is installed is a no-op.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| MercuryError::InvalidConfig(format!("invalid log level {:?}: {}", level, e)))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok(); // Ignore error if already initialized

    Ok(())
}
