//! Panic boundary for exported functions.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Run `f`, returning `fallback` instead of unwinding into the host.
///
/// A panic that crosses an `extern "C"` boundary aborts the host process, so
/// every exported function goes through here and reports failure with its
/// usual sentinel.
pub(crate) fn ffi_guard<T>(name: &'static str, fallback: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(panic_info) => {
            let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown error".to_string()
            };
            error!(function = name, panic = %msg, "Rust panic in mercury entry point");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_passes_through() {
        assert_eq!(ffi_guard("ok", -1, || 7), 7);
    }

    #[test]
    fn test_panic_becomes_fallback() {
        let result = ffi_guard("boom", -1, || -> i32 { panic!("boom") });
        assert_eq!(result, -1);
    }
}
