//! Path handling for files the engine writes
//!
//! Paths arrive from the host as raw bytes and are used only with direct
//! filesystem calls (`open`, `ftruncate`, `mmap`). Nothing is ever handed
//! to a shell, so quotes, backticks, `;`, `|`, `$`, `&` and `>` are plain
//! filename bytes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Default upper bound on accepted path length in bytes
pub const DEFAULT_MAX_PATH_LEN: usize = 4096;

/// Reasons a path is refused before any file is touched
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Path is empty")]
    Empty,

    #[error("Path is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("Path contains an interior NUL byte")]
    InteriorNul,

    #[error("Path is not valid for this platform")]
    Unrepresentable,

    #[error("Parent directory does not exist: {0}")]
    ParentMissing(PathBuf),

    #[error("Parent is not a directory: {0}")]
    ParentNotDirectory(PathBuf),

    #[error("Parent directory is read-only: {0}")]
    ReadOnlyParent(PathBuf),

    #[error("Path refers to a directory: {0}")]
    IsDirectory(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PathError>;

/// Build a path from the literal bytes supplied by the host
pub fn path_from_bytes(bytes: &[u8], max_len: usize) -> Result<PathBuf> {
    if bytes.is_empty() {
        return Err(PathError::Empty);
    }
    if bytes.len() > max_len {
        return Err(PathError::TooLong { len: bytes.len(), max: max_len });
    }
    if bytes.contains(&0) {
        return Err(PathError::InteriorNul);
    }

    #[cfg(unix)]
    {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        Ok(PathBuf::from(OsStr::from_bytes(bytes)))
    }

    #[cfg(not(unix))]
    {
        std::str::from_utf8(bytes)
            .map(PathBuf::from)
            .map_err(|_| PathError::Unrepresentable)
    }
}

/// Check that `path` names a file that can be created or rewritten.
///
/// The parent must exist, be a directory and not be read-only, and the
/// path itself must not be a directory.
pub fn validate_target(path: &Path, max_len: usize) -> Result<()> {
    let len = path.as_os_str().len();
    if len == 0 {
        return Err(PathError::Empty);
    }
    if len > max_len {
        return Err(PathError::TooLong { len, max: max_len });
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let parent_meta = match fs::metadata(parent) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Rejected path: parent directory missing");
            return Err(PathError::ParentMissing(parent.to_path_buf()));
        }
        Err(e) => return Err(PathError::Io(e)),
    };
    if !parent_meta.is_dir() {
        warn!(path = %path.display(), "Rejected path: parent is not a directory");
        return Err(PathError::ParentNotDirectory(parent.to_path_buf()));
    }
    if parent_meta.permissions().readonly() {
        warn!(path = %path.display(), "Rejected path: parent directory is read-only");
        return Err(PathError::ReadOnlyParent(parent.to_path_buf()));
    }

    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Err(PathError::IsDirectory(path.to_path_buf())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_from_bytes_rejects_bad_input() {
        assert!(matches!(path_from_bytes(b"", 16), Err(PathError::Empty)));
        assert!(matches!(
            path_from_bytes(&[b'a'; 17], 16),
            Err(PathError::TooLong { len: 17, max: 16 })
        ));
        assert!(matches!(path_from_bytes(b"a\0b", 16), Err(PathError::InteriorNul)));
    }

    #[test]
    fn test_metacharacters_kept_literally() {
        let raw = b"/tmp/x'; touch /tmp/CANARY; echo '.bin";
        let path = path_from_bytes(raw, DEFAULT_MAX_PATH_LEN).unwrap();
        assert_eq!(path.as_os_str().len(), raw.len());
        assert!(path.to_string_lossy().contains("; touch"));
    }

    #[test]
    fn test_validate_target() {
        let dir = TempDir::new().unwrap();

        let ok = dir.path().join("history.bin");
        assert!(validate_target(&ok, DEFAULT_MAX_PATH_LEN).is_ok());

        let missing = dir.path().join("nope").join("history.bin");
        assert!(matches!(
            validate_target(&missing, DEFAULT_MAX_PATH_LEN),
            Err(PathError::ParentMissing(_))
        ));

        assert!(matches!(
            validate_target(dir.path(), DEFAULT_MAX_PATH_LEN),
            Err(PathError::IsDirectory(_))
        ));

        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            validate_target(&file.join("child"), DEFAULT_MAX_PATH_LEN),
            Err(PathError::ParentNotDirectory(_))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_read_only_parent_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();

        let result = validate_target(&locked.join("history.bin"), DEFAULT_MAX_PATH_LEN);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(PathError::ReadOnlyParent(_))));
    }
}
