//! Test context store
//!
//! A bounded arena of [`TestContext`] records addressed by generation-tagged
//! handles. Freed slots are reused; a handle to a freed slot is rejected
//! because its generation no longer matches.
//!
//! Every string field is a [`FixedStr`], so an oversized write truncates in
//! place and can never reach the fields laid out after it.

use crate::analyzer::SeverityPolicy;
use crate::config::ContextStoreConfig;
use crate::error::ContextError;
use crate::fixed_str::FixedStr;
use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Result type alias for context operations
pub type Result<T> = std::result::Result<T, ContextError>;

/// Test class or method name (127 visible bytes)
pub type TestName = FixedStr<128>;
/// Letter grade (3 visible bytes)
pub type Grade = FixedStr<4>;
/// Optimization suggestion (255 visible bytes)
pub type Suggestion = FixedStr<256>;

/// Quality metrics for one test
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestContext {
    pub class_name: TestName,
    pub method_name: TestName,
    pub response_time_ms: f64,
    pub memory_usage_mb: f64,
    pub query_count: u32,
    pub cache_hit_ratio: f64,
    pub grade: Grade,
    pub n_plus_one_query_count: u32,
    pub duplicate_count: u32,
    pub has_n_plus_one: bool,
    pub severity_level: u8,
    pub optimization_suggestion: Suggestion,
    pub is_active: bool,
    /// Nanoseconds since the Unix epoch
    pub created_at_ns: u64,
    pub context_id: u64,
}

impl TestContext {
    fn new(class_name: &str, method_name: &str, context_id: u64) -> Self {
        Self {
            class_name: TestName::from_str_truncated(class_name),
            method_name: TestName::from_str_truncated(method_name),
            response_time_ms: 0.0,
            memory_usage_mb: 0.0,
            query_count: 0,
            cache_hit_ratio: 0.0,
            grade: Grade::new(),
            n_plus_one_query_count: 0,
            duplicate_count: 0,
            has_n_plus_one: false,
            severity_level: 0,
            optimization_suggestion: Suggestion::new(),
            is_active: true,
            created_at_ns: unix_now_ns(),
            context_id,
        }
    }

    /// Failing grade or a severe N+1 pattern
    pub fn is_violation(&self) -> bool {
        matches!(self.grade.as_str().as_bytes().first(), Some(b'D' | b'F'))
            || self.severity_level >= 4
    }
}

/// Opaque reference to a live context.
///
/// The raw form packs the slot generation into the high 32 bits and the
/// slot index plus one into the low 32 bits, so 0 is never a valid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle {
    index: u32,
    generation: u32,
}

impl ContextHandle {
    pub fn to_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | (u64::from(self.index) + 1)
    }

    pub fn from_raw(raw: u64) -> Option<Self> {
        let low = (raw & 0xFFFF_FFFF) as u32;
        if low == 0 {
            return None;
        }
        Some(Self {
            index: low - 1,
            generation: (raw >> 32) as u32,
        })
    }
}

struct Slot {
    generation: u32,
    context: Option<TestContext>,
}

struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    next_context_id: u64,
}

impl Arena {
    fn get_mut(&mut self, handle: ContextHandle) -> Result<&mut TestContext> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.context.as_mut())
            .ok_or(ContextError::InvalidHandle(handle.to_raw()))
    }

    fn release(&mut self, handle: ContextHandle) -> Result<TestContext> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(ContextError::InvalidHandle(handle.to_raw()))?;
        let mut context = slot
            .context
            .take()
            .ok_or(ContextError::InvalidHandle(handle.to_raw()))?;
        // Bump now so the released handle can never match again
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(handle.index);
        self.live -= 1;
        context.is_active = false;
        Ok(context)
    }
}

/// Bounded pool of live test contexts
pub struct ContextStore {
    arena: Mutex<Arena>,
    max_contexts: usize,
}

impl ContextStore {
    pub fn new(config: &ContextStoreConfig) -> Self {
        Self {
            arena: Mutex::new(Arena {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
                next_context_id: 1,
            }),
            max_contexts: config.max_contexts,
        }
    }

    /// Allocate a zeroed, active context. Absent names are stored empty.
    pub fn create(
        &self,
        class_name: Option<&str>,
        method_name: Option<&str>,
    ) -> Result<ContextHandle> {
        let mut arena = self.arena.lock();
        if arena.live >= self.max_contexts {
            return Err(ContextError::PoolExhausted(arena.live));
        }

        let context_id = arena.next_context_id;
        arena.next_context_id += 1;
        let context = TestContext::new(
            class_name.unwrap_or_default(),
            method_name.unwrap_or_default(),
            context_id,
        );

        let handle = match arena.free.pop() {
            Some(index) => {
                let slot = &mut arena.slots[index as usize];
                slot.context = Some(context);
                ContextHandle { index, generation: slot.generation }
            }
            None => {
                let index = arena.slots.len() as u32;
                arena.slots.push(Slot { generation: 1, context: Some(context) });
                ContextHandle { index, generation: 1 }
            }
        };
        arena.live += 1;

        debug!(
            handle = handle.to_raw(),
            class = context.class_name.as_str(),
            method = context.method_name.as_str(),
            "Created test context"
        );
        Ok(handle)
    }

    /// Record response time, memory, query count, cache ratio and grade
    pub fn update_metrics(
        &self,
        handle: ContextHandle,
        response_time_ms: f64,
        memory_usage_mb: f64,
        query_count: u32,
        cache_hit_ratio: f64,
        grade: Option<&str>,
    ) -> Result<()> {
        let mut arena = self.arena.lock();
        let context = arena.get_mut(handle)?;
        context.response_time_ms = non_negative(response_time_ms);
        context.memory_usage_mb = non_negative(memory_usage_mb);
        context.query_count = query_count;
        context.cache_hit_ratio = non_negative(cache_hit_ratio).min(1.0);
        context.grade.set(grade.unwrap_or_default());
        Ok(())
    }

    /// Record the N+1 analysis for a test.
    ///
    /// Severity comes from `policy` and is 0 when there are no duplicates.
    pub fn update_n_plus_one(
        &self,
        handle: ContextHandle,
        query_count: u32,
        duplicate_count: u32,
        suggestion: Option<&str>,
        policy: &SeverityPolicy,
    ) -> Result<()> {
        let mut arena = self.arena.lock();
        let context = arena.get_mut(handle)?;
        context.n_plus_one_query_count = query_count;
        context.duplicate_count = duplicate_count;
        context.has_n_plus_one = duplicate_count > 0;
        context.severity_level = if context.has_n_plus_one {
            policy.severity_for_count(query_count)
        } else {
            0
        };
        context.optimization_suggestion.set(suggestion.unwrap_or_default());
        Ok(())
    }

    /// Copy of a live context
    pub fn get(&self, handle: ContextHandle) -> Result<TestContext> {
        let mut arena = self.arena.lock();
        arena.get_mut(handle).map(|context| *context)
    }

    /// Release the slot and hand back the final state of the context
    pub fn take(&self, handle: ContextHandle) -> Result<TestContext> {
        let context = self.arena.lock().release(handle)?;
        debug!(handle = handle.to_raw(), "Released test context");
        Ok(context)
    }

    /// Release the slot, discarding the context
    pub fn destroy(&self, handle: ContextHandle) -> Result<()> {
        self.take(handle).map(|_| ())
    }

    /// Number of live contexts
    pub fn active_count(&self) -> usize {
        self.arena.lock().live
    }

    pub fn capacity(&self) -> usize {
        self.max_contexts
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(&ContextStoreConfig::default())
    }
}

#[inline]
fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

pub(crate) fn unix_now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
