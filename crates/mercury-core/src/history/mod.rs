//! Memory-mapped history of finalized test contexts
//!
//! The store maps a single file laid out as a 64-byte header followed by
//! fixed-width records (see [`format`]). Appends happen under one writer
//! lock; when the mapped region is full the file is extended to twice its
//! record capacity and remapped while that lock is held.
//!
//! # Example
//!
//! ```no_run
//! use mercury_core::config::HistoryConfig;
//! use mercury_core::history::{HistoryQuery, HistoryStore};
//!
//! let store = HistoryStore::open("/tmp/mercury_history.bin", &HistoryConfig::default())?;
//! for entry in store.query(&HistoryQuery::all().with_class_prefix("UserView"))? {
//!     println!("{}::{}", entry.class_name, entry.method_name);
//! }
//! # Ok::<(), mercury_core::history::HistoryError>(())
//! ```

pub mod format;

pub use format::{HistoryEntry, HistoryHeader, HEADER_SIZE, RECORD_SIZE};

use crate::config::HistoryConfig;
use crate::context::{unix_now_ns, TestContext};
use crate::safe_path::{self, PathError};
use format::record_offset;
use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// History store errors
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    Path(#[from] PathError),

    #[error("Invalid magic number: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u32),

    #[error("Corrupted header: {0}")]
    CorruptHeader(String),

    #[error("Corrupted record {index}: {reason}")]
    CorruptRecord { index: u64, reason: String },

    #[error("Checksum mismatch in record {index}: expected {expected:x}, got {actual:x}")]
    ChecksumMismatch { index: u64, expected: u32, actual: u32 },

    #[error("History file is full ({0} records)")]
    CapacityOverflow(u64),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

/// Filter for [`HistoryStore::query`].
///
/// Name filters are prefix matches; `None` or an empty prefix matches
/// everything. The timestamp range is inclusive.
#[derive(Debug, Clone, Copy)]
pub struct HistoryQuery<'a> {
    pub class_prefix: Option<&'a str>,
    pub method_prefix: Option<&'a str>,
    pub start_ns: u64,
    pub end_ns: u64,
}

impl<'a> HistoryQuery<'a> {
    pub fn all() -> Self {
        Self {
            class_prefix: None,
            method_prefix: None,
            start_ns: 0,
            end_ns: u64::MAX,
        }
    }

    pub fn with_class_prefix(mut self, prefix: &'a str) -> Self {
        self.class_prefix = Some(prefix);
        self
    }

    pub fn with_method_prefix(mut self, prefix: &'a str) -> Self {
        self.method_prefix = Some(prefix);
        self
    }

    pub fn with_time_range(mut self, start_ns: u64, end_ns: u64) -> Self {
        self.start_ns = start_ns;
        self.end_ns = end_ns;
        self
    }

    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        let prefix_ok = |prefix: Option<&str>, value: &str| {
            prefix.map_or(true, |p| value.starts_with(p))
        };
        prefix_ok(self.class_prefix, entry.class_name.as_str())
            && prefix_ok(self.method_prefix, entry.method_name.as_str())
            && entry.timestamp_ns >= self.start_ns
            && entry.timestamp_ns <= self.end_ns
    }
}

impl Default for HistoryQuery<'_> {
    fn default() -> Self {
        Self::all()
    }
}

struct MappedFile {
    file: File,
    mmap: MmapMut,
    header: HistoryHeader,
}

impl MappedFile {
    fn write_header(&mut self) {
        self.mmap[..HEADER_SIZE].copy_from_slice(&self.header.encode());
    }

    /// Extend the file to hold twice as many records and remap it
    fn grow(&mut self) -> Result<()> {
        let old_max = self.header.max_entries;
        let new_max = old_max
            .max(1)
            .checked_mul(2)
            .ok_or(HistoryError::CapacityOverflow(old_max))?;
        let new_len = record_offset(new_max).ok_or(HistoryError::CapacityOverflow(old_max))?;

        self.mmap.flush()?;
        self.file.set_len(new_len)?;
        // SAFETY: the file is owned by this store and only mutated through
        // this mapping while the writer lock is held
        self.mmap = unsafe { MmapOptions::new().map_mut(&self.file)? };
        self.header.max_entries = new_max;
        self.write_header();

        debug!(old_max, new_max, "Grew history file");
        Ok(())
    }
}

/// Persistent, memory-mapped history of finalized test contexts
pub struct HistoryStore {
    path: PathBuf,
    inner: Mutex<MappedFile>,
}

impl HistoryStore {
    /// Open an existing history file or create a new one.
    ///
    /// The path is validated before any file is created. An existing file
    /// must carry a valid header whose counts fit within the file.
    pub fn open(path: impl AsRef<Path>, config: &HistoryConfig) -> Result<Self> {
        let path = path.as_ref();
        safe_path::validate_target(path, config.max_path_len)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let file_len = file.metadata()?.len();

        let (mmap, header, created) = if file_len == 0 {
            let capacity = config.initial_capacity.max(1);
            let header = HistoryHeader::new(capacity, unix_now_ns() as i64);
            let len = header
                .required_len()
                .ok_or(HistoryError::CapacityOverflow(capacity))?;
            file.set_len(len)?;
            // SAFETY: freshly sized file owned by this store
            let mut mmap = unsafe { MmapOptions::new().map_mut(&file)? };
            mmap[..HEADER_SIZE].copy_from_slice(&header.encode());
            mmap.flush()?;
            (mmap, header, true)
        } else {
            if file_len < HEADER_SIZE as u64 {
                warn!(path = %path.display(), file_len, "History file shorter than header");
                return Err(HistoryError::CorruptHeader(format!(
                    "file is {} bytes, header needs {}",
                    file_len, HEADER_SIZE
                )));
            }
            // SAFETY: file length checked above; mutation goes through the writer lock
            let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
            let header = HistoryHeader::decode(&mmap).map_err(|e| {
                warn!(path = %path.display(), error = %e, "Rejected history file");
                e
            })?;
            match header.required_len() {
                Some(required) if required <= file_len => {}
                _ => {
                    warn!(path = %path.display(), "History header exceeds file length");
                    return Err(HistoryError::CorruptHeader(format!(
                        "header claims {} records but file is {} bytes",
                        header.max_entries, file_len
                    )));
                }
            }
            (mmap, header, false)
        };

        info!(
            path = %path.display(),
            entries = header.entry_count,
            capacity = header.max_entries,
            created,
            "Opened history store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(MappedFile { file, mmap, header }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a finalized context stamped with the current time
    pub fn append_context(&self, context: &TestContext) -> Result<u64> {
        self.append(&HistoryEntry::from_context(context, unix_now_ns()))
    }

    /// Append an entry, returning its record index
    pub fn append(&self, entry: &HistoryEntry) -> Result<u64> {
        let mut inner = self.inner.lock();
        if inner.header.entry_count >= inner.header.max_entries {
            inner.grow()?;
        }

        let index = inner.header.entry_count;
        let offset = inner.header.next_offset as usize;
        inner.mmap[offset..offset + RECORD_SIZE].copy_from_slice(&entry.encode());

        inner.header.entry_count += 1;
        inner.header.next_offset += RECORD_SIZE as u64;
        inner.write_header();
        Ok(index)
    }

    /// Read one record, verifying its checksum
    pub fn get(&self, index: u64) -> Result<HistoryEntry> {
        let inner = self.inner.lock();
        if index >= inner.header.entry_count {
            return Err(HistoryError::CorruptRecord {
                index,
                reason: format!("out of range ({} records)", inner.header.entry_count),
            });
        }
        let offset = record_offset(index).unwrap_or(u64::MAX) as usize;
        HistoryEntry::decode(&inner.mmap[offset..offset + RECORD_SIZE], index)
    }

    /// Entries matching `query`, oldest first. Corrupt records are skipped.
    pub fn query(&self, query: &HistoryQuery<'_>) -> Result<Vec<HistoryEntry>> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        for index in 0..inner.header.entry_count {
            let offset = index as usize * RECORD_SIZE + HEADER_SIZE;
            match HistoryEntry::decode(&inner.mmap[offset..offset + RECORD_SIZE], index) {
                Ok(entry) if query.matches(&entry) => out.push(entry),
                Ok(_) => {}
                Err(e) => warn!(path = %self.path.display(), error = %e, "Skipping history record"),
            }
        }
        Ok(out)
    }

    /// Number of stored records
    pub fn len(&self) -> u64 {
        self.inner.lock().header.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record slots currently mapped
    pub fn capacity(&self) -> u64 {
        self.inner.lock().header.max_entries
    }

    /// Flush mapped pages to the file
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().mmap.flush()?;
        Ok(())
    }

    /// Flush and unmap
    pub fn close(self) -> Result<()> {
        self.flush()?;
        info!(path = %self.path.display(), "Closed history store");
        Ok(())
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        if let Err(e) = self.inner.get_mut().mmap.flush() {
            warn!(path = %self.path.display(), error = %e, "Failed to flush history on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Grade, TestName};
    use tempfile::TempDir;

    fn entry(class: &str, method: &str, ts: u64) -> HistoryEntry {
        HistoryEntry {
            timestamp_ns: ts,
            context_id: ts,
            class_name: TestName::from_str_truncated(class),
            method_name: TestName::from_str_truncated(method),
            response_time_ms: 10.0,
            memory_usage_mb: 4.0,
            cache_hit_ratio: 0.5,
            query_count: 3,
            n_plus_one_query_count: 0,
            duplicate_count: 0,
            severity_level: 0,
            has_n_plus_one: false,
            grade: Grade::from_str_truncated("A"),
            optimization_suggestion: Default::default(),
        }
    }

    #[test]
    fn test_open_creates_file_with_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.bin");
        let store = HistoryStore::open(&path, &HistoryConfig::default()).unwrap();

        assert!(store.is_empty());
        assert_eq!(store.capacity(), 1024);
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, (HEADER_SIZE + 1024 * RECORD_SIZE) as u64);
    }

    #[test]
    fn test_append_and_query_filters() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::open(dir.path().join("h.bin"), &HistoryConfig::default()).unwrap();

        store.append(&entry("UserModelTest", "test_create", 100)).unwrap();
        store.append(&entry("UserModelTest", "test_update", 200)).unwrap();
        store.append(&entry("ProfileModelTest", "test_update", 300)).unwrap();

        assert_eq!(store.query(&HistoryQuery::all()).unwrap().len(), 3);
        assert_eq!(
            store.query(&HistoryQuery::all().with_class_prefix("UserModel")).unwrap().len(),
            2
        );
        assert_eq!(
            store.query(&HistoryQuery::all().with_method_prefix("test_update")).unwrap().len(),
            2
        );
        assert_eq!(
            store.query(&HistoryQuery::all().with_class_prefix("")).unwrap().len(),
            3
        );
        assert_eq!(
            store.query(&HistoryQuery::all().with_time_range(200, 300)).unwrap().len(),
            2
        );
        assert!(store
            .query(&HistoryQuery::all().with_class_prefix("Missing"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_grows_by_doubling() {
        let dir = TempDir::new().unwrap();
        let config = HistoryConfig::default().with_initial_capacity(2);
        let store = HistoryStore::open(dir.path().join("h.bin"), &config).unwrap();

        for i in 0..5 {
            assert_eq!(store.append(&entry("C", "m", i)).unwrap(), i);
        }
        assert_eq!(store.len(), 5);
        assert_eq!(store.capacity(), 8);
        assert_eq!(store.get(4).unwrap().timestamp_ns, 4);
    }

    #[test]
    fn test_corrupt_record_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.bin");
        {
            let store = HistoryStore::open(&path, &HistoryConfig::default()).unwrap();
            store.append(&entry("A", "m", 1)).unwrap();
            store.append(&entry("B", "m", 2)).unwrap();
            store.close().unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[HEADER_SIZE + 30] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let store = HistoryStore::open(&path, &HistoryConfig::default()).unwrap();
        let entries = store.query(&HistoryQuery::all()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].class_name.as_str(), "B");
        assert!(matches!(store.get(0), Err(HistoryError::ChecksumMismatch { index: 0, .. })));
    }

    #[test]
    fn test_get_out_of_range() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::open(dir.path().join("h.bin"), &HistoryConfig::default()).unwrap();
        assert!(matches!(store.get(0), Err(HistoryError::CorruptRecord { index: 0, .. })));
    }
}
