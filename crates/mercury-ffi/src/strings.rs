//! C string conversion at the boundary.

use libc::c_char;
use std::borrow::Cow;
use std::ffi::CStr;

/// Borrow a host string; `None` for a null pointer.
///
/// Invalid UTF-8 is replaced rather than rejected.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the returned lifetime.
pub(crate) unsafe fn opt_str<'a>(ptr: *const c_char) -> Option<Cow<'a, str>> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy())
}

/// Borrow the raw bytes of a host string; `None` for a null pointer.
///
/// # Safety
/// Same contract as [`opt_str`].
pub(crate) unsafe fn opt_bytes<'a>(ptr: *const c_char) -> Option<&'a [u8]> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_bytes())
}
