//! Value wrapper with automatic GC protection
//!
//! A [`JsValue`] keeps its [`Engine`] alive and its engine value protected
//! from collection until dropped. Every accessor takes the engine guard.
//!
//! Soft conversions (`as_string`, `as_int`, `as_bool`) never fail.
//! Structural accessors (`as_list`, properties, `call`) fail with
//! [`JsError::TypeMismatch`] when used on the wrong kind of value.

use sieve_jsc_sys::*;
use std::fmt;
use std::ptr;

use crate::engine::Engine;
use crate::error::{JsError, JsResult};
use crate::exception::extract_exception;
use crate::string::{JsString, take_js_string};

/// Upper bound on the capacity `as_list` reserves up front.
const MAX_LIST_PREALLOCATION: u32 = 1024;

/// Ordered list of values, used for call arguments and array contents.
pub type JsValueList = Vec<JsValue>;

/// Kind of an engine value. Arrays and functions are objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Object,
    Array,
    Function,
    Other,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::Object => "object",
            Self::Array => "array",
            Self::Function => "function",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to one value on the engine heap.
pub struct JsValue {
    engine: Engine,
    raw: JSValueRef,
}

// SAFETY: the handle is opaque; it is only dereferenced while the owning
// engine's guard is held.
unsafe impl Send for JsValue {}
unsafe impl Sync for JsValue {}

impl JsValue {
    /// Wrap and protect `raw`. A null `raw` becomes `undefined`.
    ///
    /// # Safety
    /// The engine guard must be held on this thread and `raw` must be a live
    /// value of the engine's context (or null).
    pub(crate) unsafe fn from_raw(engine: &Engine, raw: JSValueRef) -> Self {
        let ctx = engine.context();
        // SAFETY: caller contract
        unsafe {
            let raw = if raw.is_null() {
                JSValueMakeUndefined(ctx)
            } else {
                raw
            };
            JSValueProtect(ctx, raw);
            Self {
                engine: engine.clone(),
                raw,
            }
        }
    }

    /// Wrap a handle whose protection the new value takes over.
    ///
    /// # Safety
    /// `raw` must carry one `JSValueProtect` that nothing else will release.
    pub(crate) unsafe fn adopt(engine: &Engine, raw: JSValueRef) -> Self {
        Self {
            engine: engine.clone(),
            raw,
        }
    }

    /// Add a protection for a caller that stores the raw handle itself.
    pub(crate) fn protected_handle(&self) -> JSValueRef {
        let guard = self.engine.enter();
        // SAFETY: guard held; raw is live while self is.
        unsafe { JSValueProtect(guard.context(), self.raw) };
        self.raw
    }

    pub(crate) fn raw(&self) -> JSValueRef {
        self.raw
    }

    /// The engine this value belongs to.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn kind(&self) -> ValueKind {
        let guard = self.engine.enter();
        let ctx = guard.context();
        // SAFETY: guard held
        unsafe {
            match JSValueGetType(ctx, self.raw) {
                K_JS_TYPE_UNDEFINED => ValueKind::Undefined,
                K_JS_TYPE_NULL => ValueKind::Null,
                K_JS_TYPE_BOOLEAN => ValueKind::Boolean,
                K_JS_TYPE_NUMBER => ValueKind::Number,
                K_JS_TYPE_STRING => ValueKind::String,
                K_JS_TYPE_SYMBOL => ValueKind::Symbol,
                K_JS_TYPE_OBJECT if JSValueIsArray(ctx, self.raw) => ValueKind::Array,
                K_JS_TYPE_OBJECT if JSObjectIsFunction(ctx, self.raw) => ValueKind::Function,
                K_JS_TYPE_OBJECT => ValueKind::Object,
                _ => ValueKind::Other,
            }
        }
    }

    pub fn is_undefined(&self) -> bool {
        let guard = self.engine.enter();
        // SAFETY: guard held
        unsafe { JSValueIsUndefined(guard.context(), self.raw) }
    }

    pub fn is_null(&self) -> bool {
        let guard = self.engine.enter();
        // SAFETY: guard held
        unsafe { JSValueIsNull(guard.context(), self.raw) }
    }

    pub fn is_string(&self) -> bool {
        let guard = self.engine.enter();
        // SAFETY: guard held
        unsafe { JSValueIsString(guard.context(), self.raw) }
    }

    pub fn is_number(&self) -> bool {
        let guard = self.engine.enter();
        // SAFETY: guard held
        unsafe { JSValueIsNumber(guard.context(), self.raw) }
    }

    pub fn is_bool(&self) -> bool {
        let guard = self.engine.enter();
        // SAFETY: guard held
        unsafe { JSValueIsBoolean(guard.context(), self.raw) }
    }

    /// True for objects, including arrays and functions. `null` is not an
    /// object.
    pub fn is_object(&self) -> bool {
        let guard = self.engine.enter();
        // SAFETY: guard held
        unsafe { JSValueIsObject(guard.context(), self.raw) }
    }

    pub fn is_array(&self) -> bool {
        let guard = self.engine.enter();
        // SAFETY: guard held
        unsafe { JSValueIsArray(guard.context(), self.raw) }
    }

    pub fn is_function(&self) -> bool {
        let guard = self.engine.enter();
        let ctx = guard.context();
        // SAFETY: guard held; raw is only treated as an object once checked
        unsafe { JSValueIsObject(ctx, self.raw) && JSObjectIsFunction(ctx, self.raw) }
    }

    /// String form of the value, using its own `toString` for objects.
    ///
    /// Returns an empty string if the conversion throws.
    pub fn as_string(&self) -> String {
        let guard = self.engine.enter();
        let ctx = guard.context();
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: guard held; the returned string is owned by us
        unsafe {
            let js_str = JSValueToStringCopy(ctx, self.raw, &mut exception);
            if !exception.is_null() {
                if !js_str.is_null() {
                    JSStringRelease(js_str);
                }
                return String::new();
            }
            take_js_string(js_str)
        }
    }

    /// Numeric coercion truncated to an integer.
    ///
    /// Returns 0 if the conversion throws or yields NaN; out-of-range
    /// numbers saturate.
    pub fn as_int(&self) -> i64 {
        let guard = self.engine.enter();
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: guard held
        let n = unsafe { JSValueToNumber(guard.context(), self.raw, &mut exception) };
        if !exception.is_null() || n.is_nan() {
            return 0;
        }
        n as i64
    }

    /// Engine truthiness.
    pub fn as_bool(&self) -> bool {
        let guard = self.engine.enter();
        // SAFETY: guard held
        unsafe { JSValueToBoolean(guard.context(), self.raw) }
    }

    /// Elements of an array, in index order.
    pub fn as_list(&self) -> JsResult<JsValueList> {
        let guard = self.engine.enter();
        let ctx = guard.context();
        if !self.is_array() {
            return Err(JsError::type_mismatch(
                "convert to list",
                "array",
                self.kind().as_str(),
            ));
        }

        let length = self.get_property("length")?.as_int().clamp(0, u32::MAX as i64) as u32;
        // The length comes from script, so it only bounds the loop.
        let mut items = Vec::with_capacity(length.min(MAX_LIST_PREALLOCATION) as usize);
        for index in 0..length {
            let mut exception: JSValueRef = ptr::null_mut();
            // SAFETY: guard held; raw is an array object
            let item = unsafe { JSObjectGetPropertyAtIndex(ctx, self.raw, index, &mut exception) };
            if !exception.is_null() {
                // SAFETY: guard held
                return Err(unsafe { extract_exception(ctx, exception) });
            }
            // SAFETY: guard held; item belongs to ctx
            items.push(unsafe { JsValue::from_raw(&self.engine, item) });
        }
        Ok(items)
    }

    /// Read a property. Works on any object, including arrays and functions.
    pub fn get_property(&self, name: &str) -> JsResult<JsValue> {
        let guard = self.engine.enter();
        self.require_object("get property")?;
        // SAFETY: guard held; raw is an object
        unsafe {
            let raw = get_raw_property(guard.context(), self.raw, name)?;
            Ok(JsValue::from_raw(&self.engine, raw))
        }
    }

    /// Write a property. `value` may be a primitive or a value of this
    /// engine.
    pub fn set_property<V: IntoJsValue>(&self, name: &str, value: V) -> JsResult<()> {
        self.put_property(name, value, K_JS_PROPERTY_ATTRIBUTE_NONE)
    }

    /// Define a property that enumeration skips, for host-installed names.
    pub(crate) fn define_hidden<V: IntoJsValue>(&self, name: &str, value: V) -> JsResult<()> {
        self.put_property(name, value, K_JS_PROPERTY_ATTRIBUTE_DONT_ENUM)
    }

    fn put_property<V: IntoJsValue>(
        &self,
        name: &str,
        value: V,
        attributes: JSPropertyAttributes,
    ) -> JsResult<()> {
        let guard = self.engine.enter();
        let ctx = guard.context();
        self.require_object("set property")?;
        let value = value.into_js_value(&self.engine)?;
        let name = JsString::new(name)?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: guard held; raw is an object and value belongs to ctx
        unsafe {
            JSObjectSetProperty(ctx, self.raw, name.raw(), value.raw, attributes, &mut exception);
            if !exception.is_null() {
                return Err(extract_exception(ctx, exception));
            }
        }
        Ok(())
    }

    /// Name of the object's constructor, `"Object"` when it has none.
    pub fn get_class(&self) -> JsResult<String> {
        let _guard = self.engine.enter();
        self.require_object("get class")?;
        let constructor = self.get_property("constructor")?;
        if constructor.is_object() {
            let name = constructor.get_property("name")?;
            if name.is_string() {
                let name = name.as_string();
                if !name.is_empty() {
                    return Ok(name);
                }
            }
        }
        Ok("Object".to_string())
    }

    /// Enumerable own property names, each once, in engine order.
    pub fn get_own_property_names(&self) -> JsResult<Vec<String>> {
        let _guard = self.engine.enter();
        self.require_object("list own properties")?;
        // SAFETY: guard held; the captured Object.keys stays protected for
        // the engine's lifetime.
        let keys = unsafe {
            let object_keys = self.engine.inner().object_keys();
            JsValue::from_raw(&self.engine, object_keys)
        };
        let names = keys.call(std::slice::from_ref(self), None)?;
        Ok(names.as_list()?.iter().map(JsValue::as_string).collect())
    }

    /// Call a function with `args` and receiver `this` (undefined when
    /// `None`). Primitive receivers are boxed.
    pub fn call(&self, args: &[JsValue], this: Option<&JsValue>) -> JsResult<JsValue> {
        let guard = self.engine.enter();
        let ctx = guard.context();
        if !self.is_function() {
            return Err(JsError::type_mismatch(
                "call",
                "function",
                self.kind().as_str(),
            ));
        }
        for arg in args {
            self.engine.check_owned(arg)?;
        }
        let this_object = match this {
            Some(this) => {
                self.engine.check_owned(this)?;
                if this.is_undefined() || this.is_null() {
                    ptr::null_mut()
                } else {
                    let mut exception: JSValueRef = ptr::null_mut();
                    // SAFETY: guard held
                    let object = unsafe { JSValueToObject(ctx, this.raw, &mut exception) };
                    if !exception.is_null() {
                        // SAFETY: guard held
                        return Err(unsafe { extract_exception(ctx, exception) });
                    }
                    object
                }
            }
            None => ptr::null_mut(),
        };

        let raw_args: Vec<JSValueRef> = args.iter().map(|arg| arg.raw).collect();
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: guard held; raw is a function; args are protected by `args`
        unsafe {
            let result = JSObjectCallAsFunction(
                ctx,
                self.raw,
                this_object,
                raw_args.len(),
                raw_args.as_ptr(),
                &mut exception,
            );
            if !exception.is_null() {
                return Err(extract_exception(ctx, exception));
            }
            Ok(JsValue::from_raw(&self.engine, result))
        }
    }

    /// JSON text of the value, `None` when it has no JSON form
    /// (e.g. `undefined` or a function).
    pub fn to_json(&self) -> JsResult<Option<String>> {
        let guard = self.engine.enter();
        let ctx = guard.context();
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: guard held
        unsafe {
            let js_str = JSValueCreateJSONString(ctx, self.raw, 0, &mut exception);
            if !exception.is_null() {
                if !js_str.is_null() {
                    JSStringRelease(js_str);
                }
                return Err(extract_exception(ctx, exception));
            }
            if js_str.is_null() {
                return Ok(None);
            }
            Ok(Some(take_js_string(js_str)))
        }
    }

    fn require_object(&self, operation: &'static str) -> JsResult<()> {
        if self.is_object() {
            Ok(())
        } else {
            Err(JsError::type_mismatch(
                operation,
                "object",
                self.kind().as_str(),
            ))
        }
    }
}

impl Clone for JsValue {
    fn clone(&self) -> Self {
        // SAFETY: protected_handle adds the protection the clone releases.
        unsafe { JsValue::adopt(&self.engine, self.protected_handle()) }
    }
}

impl Drop for JsValue {
    fn drop(&mut self) {
        let guard = self.engine.enter();
        // SAFETY: guard held; balances the protection taken at creation
        unsafe { JSValueUnprotect(guard.context(), self.raw) };
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JsValue")
            .field(&self.kind())
            .field(&self.as_string())
            .finish()
    }
}

/// Read a property of a raw object.
///
/// # Safety
/// `ctx` must be entered on this thread and `object` must be a live object.
pub(crate) unsafe fn get_raw_property(
    ctx: JSContextRef,
    object: JSObjectRef,
    name: &str,
) -> JsResult<JSValueRef> {
    let name = JsString::new(name)?;
    let mut exception: JSValueRef = ptr::null_mut();
    // SAFETY: caller contract
    unsafe {
        let value = JSObjectGetProperty(ctx, object, name.raw(), &mut exception);
        if !exception.is_null() {
            return Err(extract_exception(ctx, exception));
        }
        Ok(value)
    }
}

/// Conversion into a value of a given engine.
pub trait IntoJsValue {
    fn into_js_value(self, engine: &Engine) -> JsResult<JsValue>;
}

impl IntoJsValue for JsValue {
    fn into_js_value(self, engine: &Engine) -> JsResult<JsValue> {
        engine.check_owned(&self)?;
        Ok(self)
    }
}

impl IntoJsValue for &JsValue {
    fn into_js_value(self, engine: &Engine) -> JsResult<JsValue> {
        engine.check_owned(self)?;
        Ok(self.clone())
    }
}

impl IntoJsValue for &str {
    fn into_js_value(self, engine: &Engine) -> JsResult<JsValue> {
        let guard = engine.enter();
        let js_str = JsString::new(self)?;
        // SAFETY: guard held; JSC copies the string
        unsafe {
            let raw = JSValueMakeString(guard.context(), js_str.raw());
            Ok(JsValue::from_raw(engine, raw))
        }
    }
}

impl IntoJsValue for String {
    fn into_js_value(self, engine: &Engine) -> JsResult<JsValue> {
        self.as_str().into_js_value(engine)
    }
}

impl IntoJsValue for &String {
    fn into_js_value(self, engine: &Engine) -> JsResult<JsValue> {
        self.as_str().into_js_value(engine)
    }
}

impl IntoJsValue for bool {
    fn into_js_value(self, engine: &Engine) -> JsResult<JsValue> {
        let guard = engine.enter();
        // SAFETY: guard held
        unsafe {
            let raw = JSValueMakeBoolean(guard.context(), self);
            Ok(JsValue::from_raw(engine, raw))
        }
    }
}

impl IntoJsValue for f64 {
    fn into_js_value(self, engine: &Engine) -> JsResult<JsValue> {
        let guard = engine.enter();
        // SAFETY: guard held
        unsafe {
            let raw = JSValueMakeNumber(guard.context(), self);
            Ok(JsValue::from_raw(engine, raw))
        }
    }
}

impl IntoJsValue for i64 {
    fn into_js_value(self, engine: &Engine) -> JsResult<JsValue> {
        (self as f64).into_js_value(engine)
    }
}

impl IntoJsValue for i32 {
    fn into_js_value(self, engine: &Engine) -> JsResult<JsValue> {
        f64::from(self).into_js_value(engine)
    }
}

impl IntoJsValue for u32 {
    fn into_js_value(self, engine: &Engine) -> JsResult<JsValue> {
        f64::from(self).into_js_value(engine)
    }
}
