//! C ABI for the Mercury instrumentation engine
//!
//! Every exported function works against one process-wide [`Engine`] and
//! reports failure with a sentinel (`-1`, `0` or null) rather than
//! unwinding. String arguments may be null; paths are used as literal bytes.
//!
//! Ownership across the boundary:
//! - `stop_monitoring` returns a heap record the caller frees with
//!   `free_metrics`.
//! - `create_test_context` returns an opaque non-zero handle that is
//!   released by `finalize_test_context` or `destroy_test_context`.

mod guard;
mod strings;

pub mod monitor;
pub mod orchestrator;

pub use mercury_core::MetricsRecord;

use guard::ffi_guard;
use libc::{c_char, c_int};
use mercury_core::Engine;
use once_cell::sync::Lazy;

/// Engine shared by every entry point
pub(crate) static ENGINE: Lazy<Engine> = Lazy::new(Engine::default);

/// Install a stderr log subscriber at `level` (e.g. `"info"`).
///
/// Returns 0 on success (including when logging is already set up) and -1
/// for a null or unparsable level.
///
/// # Safety
/// `level` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mercury_init_logging(level: *const c_char) -> c_int {
    ffi_guard("mercury_init_logging", -1, || {
        let Some(level) = strings::opt_str(level) else {
            return -1;
        };
        match mercury_core::init_logging(&level) {
            Ok(()) => 0,
            Err(_) => -1,
        }
    })
}
