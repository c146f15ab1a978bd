//! Native callback bridge
//!
//! Native functions become script functions through one shared JSC class
//! whose private data is a boxed [`CallbackBinding`]. The binding holds the
//! Rust function and a weak engine reference. When the collector
//! finalizes the function object the binding moves to the engine's
//! [`ReleaseQueue`] and is dropped on the next guard acquisition.
//! Finalizers run wherever the collector runs, possibly a heap timer thread
//! that holds the VM lock, so they never take the engine guard themselves.

use sieve_jsc_sys::*;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use tracing::{error, trace, warn};

use crate::engine::{Engine, WeakEngine};
use crate::error::{JsError, JsResult};
use crate::exception::make_error;
use crate::value::{JsValue, JsValueList};

pub(crate) type NativeFunction = dyn Fn(&CallbackInfo) -> JsResult<JsValue> + Send + Sync;

/// Arguments of a native callback invocation.
pub struct CallbackInfo {
    engine: Engine,
    this: JsValue,
    args: JsValueList,
}

impl CallbackInfo {
    /// The engine the callback runs in.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The receiver, `undefined` for plain calls.
    pub fn this(&self) -> &JsValue {
        &self.this
    }

    pub fn args(&self) -> &[JsValue] {
        &self.args
    }

    /// Argument `index`, or `undefined` when fewer were passed.
    pub fn arg(&self, index: usize) -> JsValue {
        match self.args.get(index) {
            Some(value) => value.clone(),
            None => self.engine.undefined(),
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

struct CallbackBinding {
    engine: WeakEngine,
    release: Arc<ReleaseQueue>,
    function: Arc<NativeFunction>,
}

/// Bindings whose function objects were finalized, waiting to be dropped
/// under the engine guard.
#[derive(Default)]
pub(crate) struct ReleaseQueue {
    bindings: Mutex<Vec<Box<CallbackBinding>>>,
}

impl ReleaseQueue {
    fn push(&self, binding: Box<CallbackBinding>) {
        self.bindings.lock().push(binding);
    }

    /// Drop every queued binding. Must not be called from a finalizer.
    pub(crate) fn drain(&self) {
        let released = std::mem::take(&mut *self.bindings.lock());
        if !released.is_empty() {
            trace!(count = released.len(), "releasing finalized callbacks");
        }
        drop(released);
    }
}

struct CallbackClass(JSClassRef);

// SAFETY: a JSClassRef is immutable after creation and usable from any
// context.
unsafe impl Send for CallbackClass {}
unsafe impl Sync for CallbackClass {}

static CALLBACK_CLASS: OnceLock<CallbackClass> = OnceLock::new();

fn callback_class() -> JSClassRef {
    CALLBACK_CLASS
        .get_or_init(|| {
            let definition = JSClassDefinition {
                class_name: c"SieveNativeFunction".as_ptr(),
                finalize: Some(finalize_binding),
                call_as_function: Some(call_binding),
                ..Default::default()
            };
            // SAFETY: definition is fully initialized; JSC copies it.
            CallbackClass(unsafe { JSClassCreate(&definition) })
        })
        .0
}

/// Create a script function that calls `function`.
pub(crate) fn make_function(engine: &Engine, function: Arc<NativeFunction>) -> JsResult<JsValue> {
    let guard = engine.enter();
    let ctx = guard.context();
    let class = callback_class();
    if class.is_null() {
        return Err(JsError::internal("JSClassCreate returned null"));
    }

    let binding = Box::into_raw(Box::new(CallbackBinding {
        engine: engine.downgrade(),
        release: engine.inner().release_queue(),
        function,
    }));

    // SAFETY: guard held; ownership of binding passes to the object and is
    // reclaimed in finalize_binding.
    unsafe {
        let object = JSObjectMake(ctx, class, binding.cast::<c_void>());
        if object.is_null() {
            drop(Box::from_raw(binding));
            return Err(JsError::internal("JSObjectMake returned null"));
        }

        // Give the object Function.prototype so call/apply/bind work.
        JSObjectSetPrototype(ctx, object, engine.inner().function_prototype());

        Ok(JsValue::from_raw(engine, object))
    }
}

unsafe extern "C" fn call_binding(
    ctx: JSContextRef,
    function: JSObjectRef,
    this_object: JSObjectRef,
    argument_count: usize,
    arguments: *const JSValueRef,
    exception: *mut JSValueRef,
) -> JSValueRef {
    // SAFETY: the private data was set in make_function and lives until
    // finalize_binding, which cannot run while the object is being called.
    let binding = unsafe { (JSObjectGetPrivate(function) as *const CallbackBinding).as_ref() };
    let Some(binding) = binding else {
        // SAFETY: ctx is the calling context
        return unsafe { throw(ctx, exception, "native callback has no binding") };
    };

    let engine = match binding.engine.upgrade() {
        Ok(engine) => engine,
        Err(err) => {
            error!(error = %err, "native callback invoked after its engine was dropped");
            // SAFETY: ctx is the calling context
            return unsafe { throw(ctx, exception, &err.to_string()) };
        }
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: script only calls functions while the engine guard is
        // held on this thread; arguments are live for the call.
        let info = unsafe { CallbackInfo::from_raw(&engine, this_object, argument_count, arguments) };
        let value = (binding.function)(&info)?;
        engine.check_owned(&value)?;
        Ok::<_, JsError>(value)
    }));

    match outcome {
        // The caller receives the raw handle before this frame unprotects
        // it; the collector scans the native stack conservatively.
        Ok(Ok(value)) => value.raw(),
        Ok(Err(err)) => {
            warn!(error = %err, "native callback failed");
            // SAFETY: ctx is the calling context
            unsafe { throw(ctx, exception, &err.to_string()) }
        }
        Err(_) => {
            error!("native callback panicked");
            // SAFETY: ctx is the calling context
            unsafe { throw(ctx, exception, "native callback panicked") }
        }
    }
}

unsafe extern "C" fn finalize_binding(object: JSObjectRef) {
    // SAFETY: the private data is the Box leaked in make_function; the
    // collector finalizes each object once.
    let binding = unsafe {
        let binding = JSObjectGetPrivate(object) as *mut CallbackBinding;
        if binding.is_null() {
            return;
        }
        Box::from_raw(binding)
    };
    let release = binding.release.clone();
    release.push(binding);
}

/// Store an `Error(message)` in `exception` and return `undefined`.
unsafe fn throw(ctx: JSContextRef, exception: *mut JSValueRef, message: &str) -> JSValueRef {
    // SAFETY: caller passes the callback's context and out-parameter
    unsafe {
        if !exception.is_null() {
            *exception = make_error(ctx, message);
        }
        JSValueMakeUndefined(ctx)
    }
}

impl CallbackInfo {
    /// # Safety
    /// The engine guard must be held on this thread and `arguments` must
    /// point to `argument_count` live values.
    unsafe fn from_raw(
        engine: &Engine,
        this_object: JSObjectRef,
        argument_count: usize,
        arguments: *const JSValueRef,
    ) -> Self {
        // SAFETY: caller contract
        unsafe {
            let args = if argument_count == 0 || arguments.is_null() {
                Vec::new()
            } else {
                std::slice::from_raw_parts(arguments, argument_count)
                    .iter()
                    .map(|raw| JsValue::from_raw(engine, *raw))
                    .collect()
            };
            let this = if this_object.is_null() {
                engine.undefined()
            } else {
                JsValue::from_raw(engine, this_object)
            };
            Self {
                engine: engine.clone(),
                this,
                args,
            }
        }
    }
}
