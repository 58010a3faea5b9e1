//! Session and counter entry points

use crate::guard::ffi_guard;
use crate::strings::opt_str;
use crate::ENGINE;
use libc::{c_char, c_int};
use mercury_core::{MetricsRecord, NPlusOneCause, INVALID_SESSION_ID};
use tracing::debug;

/// Start a monitoring session.
///
/// Returns a positive session id, or -1 when `operation_name` is null or
/// empty. A null `operation_type` uses the default type.
///
/// # Safety
/// Both arguments must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn start_monitoring(
    operation_name: *const c_char,
    operation_type: *const c_char,
) -> i64 {
    ffi_guard("start_monitoring", INVALID_SESSION_ID, || {
        let Some(name) = opt_str(operation_name) else {
            return INVALID_SESSION_ID;
        };
        let kind = opt_str(operation_type);
        ENGINE
            .monitor()
            .start(&name, kind.as_deref())
            .unwrap_or(INVALID_SESSION_ID)
    })
}

/// Stop a session and return its metrics, or null if `session_id` is
/// unknown, non-positive or already stopped.
///
/// The record must be released with [`free_metrics`].
#[no_mangle]
pub extern "C" fn stop_monitoring(session_id: i64) -> *mut MetricsRecord {
    ffi_guard("stop_monitoring", std::ptr::null_mut(), || {
        match ENGINE.monitor().stop(session_id) {
            Some(record) => Box::into_raw(Box::new(record)),
            None => {
                debug!(session_id, "stop_monitoring: no active session");
                std::ptr::null_mut()
            }
        }
    })
}

/// Release a record returned by [`stop_monitoring`]. Null is ignored.
///
/// # Safety
/// `metrics` must be null or a pointer from `stop_monitoring` that has not
/// been freed yet.
#[no_mangle]
pub unsafe extern "C" fn free_metrics(metrics: *mut MetricsRecord) {
    if !metrics.is_null() {
        drop(Box::from_raw(metrics));
    }
}

/// Read a field from a possibly-null record
///
/// # Safety
/// `metrics` must be null or point to a live record.
unsafe fn with_record<T>(
    name: &'static str,
    metrics: *const MetricsRecord,
    fallback: T,
    f: impl FnOnce(&MetricsRecord) -> T,
) -> T {
    match metrics.as_ref() {
        Some(record) => ffi_guard(name, fallback, || f(record)),
        None => fallback,
    }
}

/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn get_elapsed_time_ms(metrics: *const MetricsRecord) -> f64 {
    with_record("get_elapsed_time_ms", metrics, 0.0, |r| r.elapsed_ms())
}

/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn get_query_count(metrics: *const MetricsRecord) -> u32 {
    with_record("get_query_count", metrics, 0, |r| r.query_count())
}

/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn get_cache_hit_count(metrics: *const MetricsRecord) -> u32 {
    with_record("get_cache_hit_count", metrics, 0, |r| r.cache_hits)
}

/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn get_cache_miss_count(metrics: *const MetricsRecord) -> u32 {
    with_record("get_cache_miss_count", metrics, 0, |r| r.cache_misses)
}

/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn get_cache_hit_ratio(metrics: *const MetricsRecord) -> f64 {
    with_record("get_cache_hit_ratio", metrics, 0.0, |r| r.cache_hit_ratio())
}

/// Peak resident memory of the session in MB
///
/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn get_memory_usage_mb(metrics: *const MetricsRecord) -> f64 {
    with_record("get_memory_usage_mb", metrics, 0.0, |r| r.memory_usage_mb())
}

/// Growth in resident memory between start and stop, in MB
///
/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn get_memory_delta_mb(metrics: *const MetricsRecord) -> f64 {
    with_record("get_memory_delta_mb", metrics, 0.0, |r| r.memory_delta_mb())
}

/// Severity 0..=5 under the active thresholds
///
/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn calculate_n_plus_one_severity(metrics: *const MetricsRecord) -> c_int {
    with_record("calculate_n_plus_one_severity", metrics, 0, |r| {
        c_int::from(ENGINE.policy().severity(r))
    })
}

/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn has_n_plus_one_pattern(metrics: *const MetricsRecord) -> c_int {
    with_record("has_n_plus_one_pattern", metrics, 0, |r| {
        c_int::from(ENGINE.policy().has_n_plus_one(r))
    })
}

/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn detect_n_plus_one_severe(metrics: *const MetricsRecord) -> c_int {
    with_record("detect_n_plus_one_severe", metrics, 0, |r| {
        c_int::from(ENGINE.policy().is_severe(r))
    })
}

/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn detect_n_plus_one_moderate(metrics: *const MetricsRecord) -> c_int {
    with_record("detect_n_plus_one_moderate", metrics, 0, |r| {
        c_int::from(ENGINE.policy().is_moderate(r))
    })
}

/// Cause code: 0 none, 1 serializer, 2 related model, 3 foreign key,
/// 4 complex relationship
///
/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn estimate_n_plus_one_cause(metrics: *const MetricsRecord) -> c_int {
    with_record("estimate_n_plus_one_cause", metrics, 0, |r| {
        ENGINE.policy().estimate_cause(r) as c_int
    })
}

/// Static fix suggestion for the record's cause; never null
///
/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn get_n_plus_one_fix_suggestion(
    metrics: *const MetricsRecord,
) -> *const c_char {
    let cause = with_record("get_n_plus_one_fix_suggestion", metrics, NPlusOneCause::None, |r| {
        ENGINE.policy().estimate_cause(r)
    });
    cause.suggestion_with_nul().as_ptr().cast()
}

/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn is_memory_intensive(metrics: *const MetricsRecord) -> c_int {
    with_record("is_memory_intensive", metrics, 0, |r| c_int::from(r.is_memory_intensive()))
}

/// # Safety
/// `metrics` must be null or point to a live record.
#[no_mangle]
pub unsafe extern "C" fn has_poor_cache_performance(metrics: *const MetricsRecord) -> c_int {
    with_record("has_poor_cache_performance", metrics, 0, |r| {
        c_int::from(r.has_poor_cache_performance())
    })
}

#[no_mangle]
pub extern "C" fn reset_global_counters() {
    ENGINE.counters().reset();
}

#[no_mangle]
pub extern "C" fn increment_query_count() {
    ENGINE.counters().increment_query();
}

#[no_mangle]
pub extern "C" fn increment_cache_hits() {
    ENGINE.counters().increment_cache_hit();
}

#[no_mangle]
pub extern "C" fn increment_cache_misses() {
    ENGINE.counters().increment_cache_miss();
}

/// Sessions started but not yet stopped
#[no_mangle]
pub extern "C" fn get_active_session_count() -> c_int {
    ffi_guard("get_active_session_count", 0, || {
        c_int::try_from(ENGINE.monitor().active_sessions()).unwrap_or(c_int::MAX)
    })
}

/// Replace the five severity thresholds.
///
/// Returns 0, or -1 when they are negative, zero-based or not strictly
/// ascending (the previous thresholds stay active).
#[no_mangle]
pub extern "C" fn configure_n_plus_one_thresholds(
    mild: c_int,
    moderate: c_int,
    high: c_int,
    severe: c_int,
    critical: c_int,
) -> c_int {
    ffi_guard("configure_n_plus_one_thresholds", -1, || {
        let mut thresholds = [0u32; 5];
        for (slot, value) in thresholds.iter_mut().zip([mild, moderate, high, severe, critical]) {
            match u32::try_from(value) {
                Ok(v) => *slot = v,
                Err(_) => return -1,
            }
        }
        match ENGINE.configure_thresholds(thresholds) {
            Ok(()) => 0,
            Err(_) => -1,
        }
    })
}
