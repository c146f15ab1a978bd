//! Engine strings
//!
//! Strings cross into the engine as UTF-16 so embedded NUL characters and
//! non-BMP text survive unchanged.

use sieve_jsc_sys::*;
use std::marker::PhantomData;

use crate::error::{JsError, JsResult};

/// Owned `JSStringRef`, released on drop.
pub(crate) struct JsString {
    raw: JSStringRef,
    _not_send: PhantomData<*mut ()>,
}

impl JsString {
    pub(crate) fn new(s: &str) -> JsResult<Self> {
        let units: Vec<JSChar> = s.encode_utf16().collect();
        // SAFETY: units outlives the call; JSC copies the characters.
        let raw = unsafe { JSStringCreateWithCharacters(units.as_ptr(), units.len()) };
        if raw.is_null() {
            return Err(JsError::internal("JSStringCreateWithCharacters returned null"));
        }
        Ok(Self {
            raw,
            _not_send: PhantomData,
        })
    }

    pub(crate) fn raw(&self) -> JSStringRef {
        self.raw
    }
}

impl Drop for JsString {
    fn drop(&mut self) {
        // SAFETY: raw was created in new() and is released exactly once.
        unsafe { JSStringRelease(self.raw) };
    }
}

/// Copy a `JSStringRef` into a Rust `String`.
///
/// Unpaired surrogates are replaced with U+FFFD.
///
/// # Safety
/// `js_str` must be a valid `JSStringRef` or null.
pub(crate) unsafe fn js_string_to_rust(js_str: JSStringRef) -> String {
    if js_str.is_null() {
        return String::new();
    }
    // SAFETY: js_str is valid per caller contract; the characters pointer
    // stays valid while the string is alive.
    unsafe {
        let len = JSStringGetLength(js_str);
        if len == 0 {
            return String::new();
        }
        let chars = JSStringGetCharactersPtr(js_str);
        String::from_utf16_lossy(std::slice::from_raw_parts(chars, len))
    }
}

/// Take ownership of a string returned by a `*Copy`/`Create*` call, convert
/// it and release it.
///
/// # Safety
/// `js_str` must be an owned `JSStringRef` or null.
pub(crate) unsafe fn take_js_string(js_str: JSStringRef) -> String {
    if js_str.is_null() {
        return String::new();
    }
    let js_str = scopeguard::guard(js_str, |s| {
        // SAFETY: the caller handed us the only reference.
        unsafe { JSStringRelease(s) }
    });
    // SAFETY: js_str is valid until the guard releases it.
    unsafe { js_string_to_rust(*js_str) }
}
