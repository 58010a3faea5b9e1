//! Binary configuration file
//!
//! ```text
//! Header:  [Magic:4 "MERC" | Version:2 | Flags:2 | PayloadSize:4 | CRC32:4] = 16 bytes
//! Payload: bincode(PersistedConfig)
//! ```
//!
//! Files are written to a sibling temp file, synced and renamed into
//! place, so a reader never sees a half-written configuration.

use crate::analyzer::SeverityPolicy;
use crate::orchestrator::OrchestratorStats;
use crate::safe_path::{self, PathError};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration file magic number: "MERC"
pub const CONFIG_MAGIC: u32 = 0x4D45_5243;

/// Configuration format version
pub const CONFIG_VERSION: u16 = 1;

pub const CONFIG_HEADER_SIZE: usize = 16;

/// Largest payload accepted on load
const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    Path(#[from] PathError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Invalid magic number: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    #[error("Truncated file: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Checksum mismatch: expected {expected:x}, got {actual:x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Invalid severity policy: {0}")]
    InvalidPolicy(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration file header (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigHeader {
    pub magic: u32,
    pub version: u16,
    pub flags: u16,
    pub payload_size: u32,
    pub checksum: u32,
}

impl ConfigHeader {
    pub fn for_payload(payload: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(payload);
        Self {
            magic: CONFIG_MAGIC,
            version: CONFIG_VERSION,
            flags: 0,
            payload_size: payload.len() as u32,
            checksum: hasher.finalize(),
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.magic.to_be_bytes())?;
        writer.write_all(&self.version.to_be_bytes())?;
        writer.write_all(&self.flags.to_be_bytes())?;
        writer.write_all(&self.payload_size.to_be_bytes())?;
        writer.write_all(&self.checksum.to_be_bytes())?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; CONFIG_HEADER_SIZE];
        let mut filled = 0;
        while filled < CONFIG_HEADER_SIZE {
            let n = reader.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(ConfigError::Truncated { expected: CONFIG_HEADER_SIZE, actual: filled });
            }
            filled += n;
        }

        let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != CONFIG_MAGIC {
            return Err(ConfigError::InvalidMagic { expected: CONFIG_MAGIC, actual: magic });
        }
        let version = u16::from_be_bytes([buf[4], buf[5]]);
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        Ok(Self {
            magic,
            version,
            flags: u16::from_be_bytes([buf[6], buf[7]]),
            payload_size: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            checksum: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }
}

/// State persisted by [`save`] and restored by [`load`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    pub policy: SeverityPolicy,
    pub stats: OrchestratorStats,
}

/// Write `config` to `path` through the validated path layer
pub fn save(path: &Path, config: &PersistedConfig, max_path_len: usize) -> Result<()> {
    safe_path::validate_target(path, max_path_len)?;

    let payload = bincode::serialize(config)?;
    let header = ConfigHeader::for_payload(&payload);

    replace_file(path, |file| {
        header.write(file)?;
        file.write_all(&payload)?;
        Ok(())
    })?;

    info!(path = %path.display(), bytes = payload.len(), "Saved binary configuration");
    Ok(())
}

/// Read and verify a configuration file. Nothing is applied here.
pub fn load(path: &Path, max_path_len: usize) -> Result<PersistedConfig> {
    let len = path.as_os_str().len();
    if len == 0 {
        return Err(PathError::Empty.into());
    }
    if len > max_path_len {
        return Err(PathError::TooLong { len, max: max_path_len }.into());
    }

    let mut file = fs::File::open(path)?;
    let header = ConfigHeader::read(&mut file).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Rejected configuration file");
        e
    })?;
    if header.payload_size > MAX_PAYLOAD_SIZE {
        warn!(path = %path.display(), size = header.payload_size, "Configuration payload too large");
        return Err(ConfigError::Truncated {
            expected: header.payload_size as usize,
            actual: MAX_PAYLOAD_SIZE as usize,
        });
    }

    let mut payload = Vec::with_capacity(header.payload_size as usize);
    file.read_to_end(&mut payload)?;
    if payload.len() != header.payload_size as usize {
        warn!(path = %path.display(), "Configuration payload size mismatch");
        return Err(ConfigError::Truncated {
            expected: header.payload_size as usize,
            actual: payload.len(),
        });
    }

    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let actual = hasher.finalize();
    if actual != header.checksum {
        warn!(path = %path.display(), "Configuration checksum mismatch");
        return Err(ConfigError::ChecksumMismatch { expected: header.checksum, actual });
    }

    let config: PersistedConfig = bincode::deserialize(&payload)?;
    config.policy.validate().map_err(ConfigError::InvalidPolicy)?;

    debug!(path = %path.display(), thresholds = ?config.policy.thresholds, "Loaded binary configuration");
    Ok(config)
}

/// Write through `<path>.tmp`, sync, then rename over `path`.
///
/// The temp file is removed whenever any step fails.
fn replace_file(path: &Path, write: impl FnOnce(&mut fs::File) -> Result<()>) -> Result<()> {
    let temp_path = temp_path_for(path);
    let result = (|| -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        write(&mut file)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safe_path::DEFAULT_MAX_PATH_LEN;
    use tempfile::TempDir;

    fn sample_config() -> PersistedConfig {
        PersistedConfig {
            policy: SeverityPolicy::new([5, 10, 20, 40, 80]).unwrap(),
            stats: OrchestratorStats {
                total_tests: 12,
                total_violations: 2,
                total_n_plus_one: 3,
                total_response_time_ms: 240.0,
                total_memory_mb: 96.0,
            },
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mercury.cfg");
        save(&path, &sample_config(), DEFAULT_MAX_PATH_LEN).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"MERC");
        assert_eq!(&bytes[4..6], &[0, 1]);
        assert!(!temp_path_for(&path).exists());

        assert_eq!(load(&path, DEFAULT_MAX_PATH_LEN).unwrap(), sample_config());
    }

    #[test]
    fn test_load_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foreign.cfg");
        std::fs::write(&path, b"#!/bin/sh\necho not a config\n").unwrap();
        assert!(matches!(
            load(&path, DEFAULT_MAX_PATH_LEN),
            Err(ConfigError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn test_load_rejects_short_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.cfg");
        std::fs::write(&path, b"MERC").unwrap();
        assert!(matches!(
            load(&path, DEFAULT_MAX_PATH_LEN),
            Err(ConfigError::Truncated { expected: 16, actual: 4 })
        ));
    }

    #[test]
    fn test_load_rejects_flipped_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flip.cfg");
        save(&path, &sample_config(), DEFAULT_MAX_PATH_LEN).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            load(&path, DEFAULT_MAX_PATH_LEN),
            Err(ConfigError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_load_rejects_truncated_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cut.cfg");
        save(&path, &sample_config(), DEFAULT_MAX_PATH_LEN).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        assert!(matches!(load(&path, DEFAULT_MAX_PATH_LEN), Err(ConfigError::Truncated { .. })));
    }

    #[test]
    fn test_failed_write_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mercury.cfg");

        let result = replace_file(&path, |file| {
            file.write_all(b"MERC")?;
            Err(ConfigError::InvalidPolicy("rejected mid-write".into()))
        });
        assert!(matches!(result, Err(ConfigError::InvalidPolicy(_))));
        assert!(!temp_path_for(&path).exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_save_missing_parent_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("mercury.cfg");
        assert!(matches!(
            save(&path, &sample_config(), DEFAULT_MAX_PATH_LEN),
            Err(ConfigError::Path(PathError::ParentMissing(_)))
        ));
    }
}
