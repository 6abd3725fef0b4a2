//! Conversions between C arguments and Rust values.
//!
//! Strings arrive as NUL-terminated UTF-8 (converted lossily), booleans as
//! integers where zero is false.

use std::ffi::{c_char, CStr, CString};

/// Copy a C string. `None` for a null pointer.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string valid for the
/// duration of the call.
pub unsafe fn read_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

pub fn read_flag(value: u32) -> bool {
    value != 0
}

/// Parse an event payload. A null pointer becomes `{}`; text that is not
/// JSON is kept as a JSON string so the event is not lost.
///
/// # Safety
/// Same contract as [`read_str`].
pub unsafe fn read_payload(ptr: *const c_char) -> serde_json::Value {
    match read_str(ptr) {
        None => serde_json::json!({}),
        Some(raw) => parse_payload(raw),
    }
}

fn parse_payload(raw: String) -> serde_json::Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Payload is not valid JSON ({e}), sending it as a string");
            serde_json::Value::String(raw)
        }
    }
}

/// Hand a string to the host. Interior NULs are dropped. Release with
/// [`free_c_string`].
pub fn into_c_string(text: String) -> *mut c_char {
    let bytes: Vec<u8> = text.into_bytes().into_iter().filter(|b| *b != 0).collect();
    match CString::new(bytes) {
        Ok(c_string) => c_string.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// # Safety
/// `ptr` must be null or a pointer returned by [`into_c_string`] that has not
/// been freed yet.
pub unsafe fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
