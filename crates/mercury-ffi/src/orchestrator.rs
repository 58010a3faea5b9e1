//! Test context, history and configuration entry points

use crate::guard::ffi_guard;
use crate::strings::{opt_bytes, opt_str};
use crate::ENGINE;
use libc::{c_char, c_int, size_t};
use mercury_core::history::HistoryQuery;
use mercury_core::safe_path::path_from_bytes;
use mercury_core::ContextHandle;
use std::path::PathBuf;
use tracing::warn;

/// Resolve a host path under the configured length limit
unsafe fn host_path(ptr: *const c_char) -> Option<PathBuf> {
    let bytes = opt_bytes(ptr)?;
    match path_from_bytes(bytes, ENGINE.config().history.max_path_len) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(error = %e, "Rejected path");
            None
        }
    }
}

/// Open (or create) the history file at `path`.
///
/// Returns 0 on success and -1 for a null, overlong or unusable path. On
/// failure any store that was already open stays open.
///
/// # Safety
/// `path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn initialize_history_store(path: *const c_char) -> c_int {
    ffi_guard("initialize_history_store", -1, || {
        let Some(path) = host_path(path) else {
            return -1;
        };
        match ENGINE.orchestrator().initialize_history(&path) {
            Ok(()) => 0,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to initialize history store");
                -1
            }
        }
    })
}

/// Flush and close the history file. Safe to call repeatedly.
#[no_mangle]
pub extern "C" fn cleanup_history_store() {
    ffi_guard("cleanup_history_store", (), || ENGINE.orchestrator().cleanup_history())
}

/// Allocate a test context; returns 0 when the pool is full.
///
/// # Safety
/// Both arguments must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn create_test_context(
    class_name: *const c_char,
    method_name: *const c_char,
) -> u64 {
    ffi_guard("create_test_context", 0, || {
        let class_name = opt_str(class_name);
        let method_name = opt_str(method_name);
        match ENGINE
            .orchestrator()
            .create_context(class_name.as_deref(), method_name.as_deref())
        {
            Ok(handle) => handle.to_raw(),
            Err(e) => {
                warn!(error = %e, "Failed to create test context");
                0
            }
        }
    })
}

/// # Safety
/// `grade` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn update_test_metrics(
    context: u64,
    response_time_ms: f64,
    memory_usage_mb: f64,
    query_count: u32,
    cache_hit_ratio: f64,
    grade: *const c_char,
) -> c_int {
    ffi_guard("update_test_metrics", -1, || {
        let Some(handle) = ContextHandle::from_raw(context) else {
            return -1;
        };
        let grade = opt_str(grade);
        status(ENGINE.orchestrator().update_metrics(
            handle,
            response_time_ms,
            memory_usage_mb,
            query_count,
            cache_hit_ratio,
            grade.as_deref(),
        ))
    })
}

/// # Safety
/// `suggestion` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn update_n_plus_one_analysis(
    context: u64,
    query_count: u32,
    duplicate_count: u32,
    suggestion: *const c_char,
) -> c_int {
    ffi_guard("update_n_plus_one_analysis", -1, || {
        let Some(handle) = ContextHandle::from_raw(context) else {
            return -1;
        };
        let suggestion = opt_str(suggestion);
        status(ENGINE.update_n_plus_one(handle, query_count, duplicate_count, suggestion.as_deref()))
    })
}

/// Record the context in history and statistics, then release it
#[no_mangle]
pub extern "C" fn finalize_test_context(context: u64) -> c_int {
    ffi_guard("finalize_test_context", -1, || {
        let Some(handle) = ContextHandle::from_raw(context) else {
            return -1;
        };
        status(ENGINE.orchestrator().finalize(handle).map(|_| ()))
    })
}

/// Release the context without recording it
#[no_mangle]
pub extern "C" fn destroy_test_context(context: u64) -> c_int {
    ffi_guard("destroy_test_context", -1, || {
        let Some(handle) = ContextHandle::from_raw(context) else {
            return -1;
        };
        status(ENGINE.orchestrator().destroy(handle))
    })
}

/// Write the severity policy and statistics to `path`.
///
/// # Safety
/// `path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn save_binary_configuration(path: *const c_char) -> c_int {
    ffi_guard("save_binary_configuration", -1, || {
        let Some(path) = host_path(path) else {
            return -1;
        };
        status(ENGINE.save_configuration(&path))
    })
}

/// Restore the severity policy and statistics from `path`.
///
/// Nothing changes unless the whole file verifies.
///
/// # Safety
/// `path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn load_binary_configuration(path: *const c_char) -> c_int {
    ffi_guard("load_binary_configuration", -1, || {
        let Some(path) = host_path(path) else {
            return -1;
        };
        status(ENGINE.load_configuration(&path))
    })
}

/// Copy totals into the non-null out-pointers.
///
/// # Safety
/// Each pointer must be null or valid for a `u64` write.
#[no_mangle]
pub unsafe extern "C" fn get_orchestrator_statistics(
    total_tests: *mut u64,
    total_violations: *mut u64,
    total_n_plus_one: *mut u64,
    active_contexts: *mut u64,
    history_entries: *mut u64,
) {
    let stats = ffi_guard("get_orchestrator_statistics", Default::default(), || {
        ENGINE.orchestrator().statistics()
    });
    write_out(total_tests, stats.total_tests);
    write_out(total_violations, stats.total_violations);
    write_out(total_n_plus_one, stats.total_n_plus_one);
    write_out(active_contexts, stats.active_contexts as u64);
    write_out(history_entries, stats.history_entries);
}

/// Copy average response time and memory usage into the non-null out-pointers.
///
/// # Safety
/// Each pointer must be null or valid for an `f64` write.
#[no_mangle]
pub unsafe extern "C" fn get_orchestrator_averages(
    avg_response_time_ms: *mut f64,
    avg_memory_usage_mb: *mut f64,
) {
    let stats = ffi_guard("get_orchestrator_averages", Default::default(), || {
        ENGINE.orchestrator().statistics()
    });
    write_out(avg_response_time_ms, stats.avg_response_time_ms);
    write_out(avg_memory_usage_mb, stats.avg_memory_usage_mb);
}

/// Render matching history entries into `buffer`, one line each.
///
/// Filters are prefix matches (null or empty matches all); the timestamp
/// range is inclusive. Returns the number of lines written, or -1 for a
/// null buffer or zero size.
///
/// # Safety
/// Filters must be null or valid NUL-terminated strings; `buffer` must be
/// null or valid for `buffer_size` bytes of writes.
#[no_mangle]
pub unsafe extern "C" fn query_history_entries(
    class_filter: *const c_char,
    method_filter: *const c_char,
    start_timestamp_ns: u64,
    end_timestamp_ns: u64,
    buffer: *mut c_char,
    buffer_size: size_t,
) -> c_int {
    if buffer.is_null() || buffer_size == 0 {
        return -1;
    }
    // SAFETY: caller guarantees `buffer` is valid for `buffer_size` bytes
    let out = std::slice::from_raw_parts_mut(buffer.cast::<u8>(), buffer_size);
    out[0] = 0;

    ffi_guard("query_history_entries", -1, || {
        let class_filter = opt_str(class_filter);
        let method_filter = opt_str(method_filter);
        let mut query = HistoryQuery::all().with_time_range(start_timestamp_ns, end_timestamp_ns);
        query.class_prefix = class_filter.as_deref().filter(|s| !s.is_empty());
        query.method_prefix = method_filter.as_deref().filter(|s| !s.is_empty());

        match ENGINE.orchestrator().write_history_lines(&query, out) {
            Ok(lines) => c_int::try_from(lines).unwrap_or(c_int::MAX),
            Err(e) => {
                warn!(error = %e, "History query failed");
                -1
            }
        }
    })
}

fn status<E: std::fmt::Display>(result: Result<(), E>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => {
            warn!(error = %e, "Operation failed");
            -1
        }
    }
}

unsafe fn write_out<T>(ptr: *mut T, value: T) {
    if !ptr.is_null() {
        ptr.write(value);
    }
}
