//! Binary layout of the history file
//!
//! ```text
//! Header: [Magic:4 | Version:4 | EntryCount:8 | MaxEntries:8 | NextOffset:8 | Created:8 | Reserved:24] = 64 bytes
//! Record: [Timestamp:8 | ContextId:8 | Class:128 | Method:128 | ResponseMs:8 | MemoryMb:8 | CacheRatio:8
//!          | Queries:4 | NPlusOneQueries:4 | Duplicates:4 | Severity:1 | Flags:1 | Grade:4
//!          | Suggestion:256 | Reserved:2 | CRC32:4] = 576 bytes
//! ```
//!
//! All integers are big-endian; floats are stored as their IEEE-754 bits.

use super::{HistoryError, Result};
use crate::context::{Grade, Suggestion, TestContext, TestName};
use crc32fast::Hasher;

/// History file magic number: "HIST"
pub const HISTORY_MAGIC: u32 = u32::from_be_bytes(*b"HIST");

/// History format version
pub const HISTORY_VERSION: u32 = 1;

pub const HEADER_SIZE: usize = 64;
pub const RECORD_SIZE: usize = 576;

/// Bytes covered by the record checksum
const RECORD_BODY_SIZE: usize = RECORD_SIZE - 4;

const FLAG_HAS_N_PLUS_ONE: u8 = 0x01;

/// History file header (64 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryHeader {
    pub magic: u32,
    pub version: u32,
    pub entry_count: u64,
    pub max_entries: u64,
    pub next_offset: u64,
    /// Nanoseconds since the Unix epoch
    pub created_at: i64,
}

impl HistoryHeader {
    pub fn new(max_entries: u64, created_at: i64) -> Self {
        Self {
            magic: HISTORY_MAGIC,
            version: HISTORY_VERSION,
            entry_count: 0,
            max_entries,
            next_offset: HEADER_SIZE as u64,
            created_at,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut w = FieldWriter::new(&mut buf);
        w.put(&self.magic.to_be_bytes());
        w.put(&self.version.to_be_bytes());
        w.put(&self.entry_count.to_be_bytes());
        w.put(&self.max_entries.to_be_bytes());
        w.put(&self.next_offset.to_be_bytes());
        w.put(&self.created_at.to_be_bytes());
        // Remaining 24 bytes reserved (zero)
        buf
    }

    /// Decode and check magic, version and internal consistency
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(HistoryError::CorruptHeader(format!(
                "header is {} bytes, expected {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let mut r = FieldReader::new(&bytes[..HEADER_SIZE]);

        let magic = u32::from_be_bytes(r.take());
        if magic != HISTORY_MAGIC {
            return Err(HistoryError::InvalidMagic { expected: HISTORY_MAGIC, actual: magic });
        }
        let version = u32::from_be_bytes(r.take());
        if version != HISTORY_VERSION {
            return Err(HistoryError::UnsupportedVersion(version));
        }

        let header = Self {
            magic,
            version,
            entry_count: u64::from_be_bytes(r.take()),
            max_entries: u64::from_be_bytes(r.take()),
            next_offset: u64::from_be_bytes(r.take()),
            created_at: i64::from_be_bytes(r.take()),
        };

        if header.max_entries == 0 {
            return Err(HistoryError::CorruptHeader("max_entries is zero".into()));
        }
        if header.entry_count > header.max_entries {
            return Err(HistoryError::CorruptHeader(format!(
                "entry_count {} exceeds max_entries {}",
                header.entry_count, header.max_entries
            )));
        }
        if Some(header.next_offset) != record_offset(header.entry_count) {
            return Err(HistoryError::CorruptHeader(format!(
                "next_offset {} does not match entry_count {}",
                header.next_offset, header.entry_count
            )));
        }
        Ok(header)
    }

    /// File length needed to hold `max_entries` records
    pub fn required_len(&self) -> Option<u64> {
        record_offset(self.max_entries)
    }
}

/// Byte offset of record `index`
pub fn record_offset(index: u64) -> Option<u64> {
    index
        .checked_mul(RECORD_SIZE as u64)?
        .checked_add(HEADER_SIZE as u64)
}

/// One finalized test context as stored on disk
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Nanoseconds since the Unix epoch, taken at finalize
    pub timestamp_ns: u64,
    pub context_id: u64,
    pub class_name: TestName,
    pub method_name: TestName,
    pub response_time_ms: f64,
    pub memory_usage_mb: f64,
    pub cache_hit_ratio: f64,
    pub query_count: u32,
    pub n_plus_one_query_count: u32,
    pub duplicate_count: u32,
    pub severity_level: u8,
    pub has_n_plus_one: bool,
    pub grade: Grade,
    pub optimization_suggestion: Suggestion,
}

impl HistoryEntry {
    pub fn from_context(context: &TestContext, timestamp_ns: u64) -> Self {
        Self {
            timestamp_ns,
            context_id: context.context_id,
            class_name: context.class_name,
            method_name: context.method_name,
            response_time_ms: context.response_time_ms,
            memory_usage_mb: context.memory_usage_mb,
            cache_hit_ratio: context.cache_hit_ratio,
            query_count: context.query_count,
            n_plus_one_query_count: context.n_plus_one_query_count,
            duplicate_count: context.duplicate_count,
            severity_level: context.severity_level,
            has_n_plus_one: context.has_n_plus_one,
            grade: context.grade,
            optimization_suggestion: context.optimization_suggestion,
        }
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        {
            let mut w = FieldWriter::new(&mut buf[..RECORD_BODY_SIZE]);
            w.put(&self.timestamp_ns.to_be_bytes());
            w.put(&self.context_id.to_be_bytes());
            w.put(self.class_name.as_bytes_with_nul());
            w.put(self.method_name.as_bytes_with_nul());
            w.put(&self.response_time_ms.to_bits().to_be_bytes());
            w.put(&self.memory_usage_mb.to_bits().to_be_bytes());
            w.put(&self.cache_hit_ratio.to_bits().to_be_bytes());
            w.put(&self.query_count.to_be_bytes());
            w.put(&self.n_plus_one_query_count.to_be_bytes());
            w.put(&self.duplicate_count.to_be_bytes());
            w.put(&[self.severity_level]);
            w.put(&[if self.has_n_plus_one { FLAG_HAS_N_PLUS_ONE } else { 0 }]);
            w.put(self.grade.as_bytes_with_nul());
            w.put(self.optimization_suggestion.as_bytes_with_nul());
        }

        let crc = checksum(&buf[..RECORD_BODY_SIZE]);
        buf[RECORD_BODY_SIZE..].copy_from_slice(&crc.to_be_bytes());
        buf
    }

    /// Decode record `index`, verifying its checksum
    pub fn decode(bytes: &[u8], index: u64) -> Result<Self> {
        if bytes.len() < RECORD_SIZE {
            return Err(HistoryError::CorruptRecord {
                index,
                reason: format!("record is {} bytes, expected {}", bytes.len(), RECORD_SIZE),
            });
        }
        let body = &bytes[..RECORD_BODY_SIZE];
        let mut stored = [0u8; 4];
        stored.copy_from_slice(&bytes[RECORD_BODY_SIZE..RECORD_SIZE]);
        let expected = u32::from_be_bytes(stored);
        let actual = checksum(body);
        if expected != actual {
            return Err(HistoryError::ChecksumMismatch { index, expected, actual });
        }

        let mut r = FieldReader::new(body);
        Ok(Self {
            timestamp_ns: u64::from_be_bytes(r.take()),
            context_id: u64::from_be_bytes(r.take()),
            class_name: TestName::from_raw(&r.take()),
            method_name: TestName::from_raw(&r.take()),
            response_time_ms: f64::from_bits(u64::from_be_bytes(r.take())),
            memory_usage_mb: f64::from_bits(u64::from_be_bytes(r.take())),
            cache_hit_ratio: f64::from_bits(u64::from_be_bytes(r.take())),
            query_count: u32::from_be_bytes(r.take()),
            n_plus_one_query_count: u32::from_be_bytes(r.take()),
            duplicate_count: u32::from_be_bytes(r.take()),
            severity_level: r.take::<1>()[0],
            has_n_plus_one: r.take::<1>()[0] & FLAG_HAS_N_PLUS_ONE != 0,
            grade: Grade::from_raw(&r.take()),
            optimization_suggestion: Suggestion::from_raw(&r.take()),
        })
    }
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Sequential writer over a buffer whose size is fixed by the layout
struct FieldWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> FieldWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }
}

/// Sequential reader; callers check the length up front
struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }
}
