//! Exception translation between the engine and Rust
//!
//! Outbound: a thrown engine value becomes [`JsError::Script`] with the
//! value's string form as description and, for error objects, the
//! `sourceURL`/`line` the engine attached. Inbound: native failures are
//! raised into script as `Error` objects.

use sieve_jsc_sys::*;
use std::ptr;

use crate::error::{JsError, ScriptException, SourceLocation};
use crate::string::{JsString, take_js_string};

/// Render an exception description with its optional location.
///
/// `"<description> at <resource>:<line>"` when a location is known,
/// otherwise the description alone.
pub fn format_exception(description: &str, location: Option<&SourceLocation>) -> String {
    match location {
        Some(loc) => format!("{} at {}:{}", description, loc.resource, loc.line),
        None => description.to_string(),
    }
}

/// Translate a thrown engine value into a [`JsError`].
///
/// # Safety
/// `ctx` must be entered on this thread and `exception` must be a live
/// value in it.
pub(crate) unsafe fn extract_exception(ctx: JSContextRef, exception: JSValueRef) -> JsError {
    // SAFETY: caller contract
    let description = unsafe { describe(ctx, exception) };
    // SAFETY: caller contract
    let location = unsafe { locate(ctx, exception) };
    JsError::Script(ScriptException {
        description,
        location,
    })
}

unsafe fn describe(ctx: JSContextRef, exception: JSValueRef) -> String {
    let mut nested: JSValueRef = ptr::null_mut();
    // SAFETY: ctx/exception valid per caller contract
    let js_str = unsafe { JSValueToStringCopy(ctx, exception, &mut nested) };
    if !nested.is_null() || js_str.is_null() {
        return "Unknown exception".to_string();
    }
    // SAFETY: js_str is owned by us
    unsafe { take_js_string(js_str) }
}

unsafe fn locate(ctx: JSContextRef, exception: JSValueRef) -> Option<SourceLocation> {
    // SAFETY: ctx/exception valid per caller contract
    unsafe {
        if !JSValueIsObject(ctx, exception) {
            return None;
        }
        let resource = string_property(ctx, exception, "sourceURL")?;
        if resource.is_empty() {
            return None;
        }
        let line = number_property(ctx, exception, "line")?;
        Some(SourceLocation { resource, line })
    }
}

unsafe fn property(ctx: JSContextRef, object: JSObjectRef, name: &str) -> Option<JSValueRef> {
    let name = JsString::new(name).ok()?;
    let mut exception: JSValueRef = ptr::null_mut();
    // SAFETY: object is a live object per caller contract
    let value = unsafe { JSObjectGetProperty(ctx, object, name.raw(), &mut exception) };
    if !exception.is_null() || value.is_null() {
        return None;
    }
    Some(value)
}

unsafe fn string_property(ctx: JSContextRef, object: JSObjectRef, name: &str) -> Option<String> {
    // SAFETY: caller contract
    unsafe {
        let value = property(ctx, object, name)?;
        if !JSValueIsString(ctx, value) {
            return None;
        }
        let mut exception: JSValueRef = ptr::null_mut();
        let js_str = JSValueToStringCopy(ctx, value, &mut exception);
        if !exception.is_null() {
            return None;
        }
        Some(take_js_string(js_str))
    }
}

unsafe fn number_property(ctx: JSContextRef, object: JSObjectRef, name: &str) -> Option<u32> {
    // SAFETY: caller contract
    unsafe {
        let value = property(ctx, object, name)?;
        if !JSValueIsNumber(ctx, value) {
            return None;
        }
        let mut exception: JSValueRef = ptr::null_mut();
        let n = JSValueToNumber(ctx, value, &mut exception);
        (exception.is_null() && n.is_finite() && n >= 0.0).then_some(n as u32)
    }
}

/// Build an `Error` object carrying `message`, for throwing into script.
///
/// # Safety
/// `ctx` must be entered on this thread.
pub(crate) unsafe fn make_error(ctx: JSContextRef, message: &str) -> JSValueRef {
    // SAFETY: caller contract; the message string is released by JsString.
    unsafe {
        let message_value = match JsString::new(message) {
            Ok(s) => JSValueMakeString(ctx, s.raw()),
            Err(_) => JSValueMakeUndefined(ctx),
        };
        let args = [message_value];
        let mut exception: JSValueRef = ptr::null_mut();
        let error = JSObjectMakeError(ctx, args.len(), args.as_ptr(), &mut exception);
        if error.is_null() || !exception.is_null() {
            return message_value;
        }
        error
    }
}
