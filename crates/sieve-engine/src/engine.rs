//! Thread-safe script engine
//!
//! An [`Engine`] owns one JavaScriptCore context for its whole lifetime.
//! It is a cheap, cloneable handle; the context is released when the last
//! handle and the last [`JsValue`] referring to it are dropped.
//!
//! Any thread may use the engine. Each operation holds the engine's
//! [`ExecutionGuard`], so script never runs on two threads at once.
//!
//! # Example
//!
//! ```no_run
//! use sieve_engine::{AppInfo, Engine};
//!
//! let engine = Engine::create(AppInfo::new().name("sieve")).unwrap();
//! let value = engine.eval("[5, 8, 12].join('-')").unwrap();
//! assert_eq!(value.as_string(), "5-8-12");
//! ```

use parking_lot::{Mutex, ReentrantMutex};
use sieve_jsc_sys::*;
use std::fmt;
use std::path::PathBuf;
use std::ptr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

use crate::apis::{self, PendingTimers};
use crate::callback::{self, CallbackInfo, ReleaseQueue};
use crate::config::{AppInfo, EngineConfig};
use crate::error::{JsError, JsResult};
use crate::exception::extract_exception;
use crate::guard::{self, ExecutionGuard};
use crate::platform::{
    DefaultErrorCallback, DefaultFileSystem, DefaultWebRequest, ErrorCallback, FileSystem,
    WebRequest,
};
use crate::string::JsString;
use crate::value::{IntoJsValue, JsValue, get_raw_property};

/// Builder for an [`Engine`] with custom configuration and collaborators.
///
/// Collaborators left unset are default-constructed on first use.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    file_system: Option<Arc<dyn FileSystem>>,
    web_request: Option<Arc<dyn WebRequest>>,
    error_callback: Option<Arc<dyn ErrorCallback>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn app_info(mut self, app_info: AppInfo) -> Self {
        self.config.app_info = app_info;
        self
    }

    /// Base directory for the default file system's `resolve`.
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.base_path = Some(path.into());
        self
    }

    pub fn web_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.web_request_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(file_system);
        self
    }

    pub fn web_request(mut self, web_request: Arc<dyn WebRequest>) -> Self {
        self.web_request = Some(web_request);
        self
    }

    pub fn error_callback(mut self, error_callback: Arc<dyn ErrorCallback>) -> Self {
        self.error_callback = Some(error_callback);
        self
    }

    /// Create the context and install the host globals.
    pub fn build(self) -> JsResult<Engine> {
        // SAFETY: a null class requests the default global object.
        let context = unsafe { JSGlobalContextCreate(ptr::null_mut()) };
        if context.is_null() {
            return Err(JsError::ContextCreation {
                message: "JSGlobalContextCreate returned null".into(),
            });
        }

        // SAFETY: the context is new and not yet reachable from any other
        // thread or from script.
        let intrinsics = match unsafe { Intrinsics::capture(context) } {
            Ok(intrinsics) => intrinsics,
            Err(err) => {
                // SAFETY: nothing else refers to the context
                unsafe { JSGlobalContextRelease(context) };
                return Err(err);
            }
        };

        let engine = Engine {
            inner: Arc::new(EngineInner {
                context,
                lock: ReentrantMutex::new(()),
                intrinsics,
                released: Arc::new(ReleaseQueue::default()),
                config: self.config,
                file_system: Mutex::new(self.file_system),
                web_request: Mutex::new(self.web_request),
                error_callback: Mutex::new(self.error_callback),
                timers: Mutex::new(PendingTimers::default()),
            }),
        };

        apis::install(&engine)?;
        debug!(
            app = %engine.inner.config.app_info.name,
            version = %engine.inner.config.app_info.version,
            "engine created"
        );
        Ok(engine)
    }
}

/// Built-ins captured at creation, before script can replace them.
struct Intrinsics {
    object_keys: JSObjectRef,
    function_prototype: JSValueRef,
}

impl Intrinsics {
    /// Look up and protect `Object.keys` and `Function.prototype`.
    ///
    /// # Safety
    /// `ctx` must be a live context no other thread is using.
    unsafe fn capture(ctx: JSGlobalContextRef) -> JsResult<Self> {
        // SAFETY: caller contract; each lookup is checked before it is used
        // as an object.
        unsafe {
            let global = JSContextGetGlobalObject(ctx);
            let object = get_raw_property(ctx, global, "Object")?;
            let function = get_raw_property(ctx, global, "Function")?;
            if !JSValueIsObject(ctx, object) || !JSValueIsObject(ctx, function) {
                return Err(JsError::internal("Object or Function constructor missing"));
            }
            let object_keys = get_raw_property(ctx, object, "keys")?;
            let function_prototype = get_raw_property(ctx, function, "prototype")?;
            if !JSValueIsObject(ctx, object_keys)
                || !JSObjectIsFunction(ctx, object_keys)
                || !JSValueIsObject(ctx, function_prototype)
            {
                return Err(JsError::internal("Object.keys or Function.prototype missing"));
            }
            JSValueProtect(ctx, object_keys);
            JSValueProtect(ctx, function_prototype);
            Ok(Self {
                object_keys,
                function_prototype,
            })
        }
    }

    /// # Safety
    /// `ctx` must be the context the handles were captured from, entered on
    /// this thread.
    unsafe fn release(&self, ctx: JSContextRef) {
        // SAFETY: caller contract; each handle was protected once
        unsafe {
            JSValueUnprotect(ctx, self.object_keys);
            JSValueUnprotect(ctx, self.function_prototype);
        }
    }
}

pub(crate) struct EngineInner {
    context: JSGlobalContextRef,
    pub(crate) lock: ReentrantMutex<()>,
    intrinsics: Intrinsics,
    released: Arc<ReleaseQueue>,
    config: EngineConfig,
    file_system: Mutex<Option<Arc<dyn FileSystem>>>,
    web_request: Mutex<Option<Arc<dyn WebRequest>>>,
    error_callback: Mutex<Option<Arc<dyn ErrorCallback>>>,
    pub(crate) timers: Mutex<PendingTimers>,
}

// SAFETY: the context, the intrinsics and the raw timer handles are only
// used while `lock` is held.
unsafe impl Send for EngineInner {}
unsafe impl Sync for EngineInner {}

impl EngineInner {
    pub(crate) fn context(&self) -> JSGlobalContextRef {
        self.context
    }

    /// `Object.keys` as it was when the engine was created.
    pub(crate) fn object_keys(&self) -> JSObjectRef {
        self.intrinsics.object_keys
    }

    /// `Function.prototype` as it was when the engine was created.
    pub(crate) fn function_prototype(&self) -> JSValueRef {
        self.intrinsics.function_prototype
    }

    pub(crate) fn release_queue(&self) -> Arc<ReleaseQueue> {
        self.released.clone()
    }

    pub(crate) fn drain_released(&self) {
        self.released.drain();
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let guard = ExecutionGuard::new(self);
        let ctx = guard.context();
        // SAFETY: guard held; no JsValue of this context is left, and pending
        // timer handles and intrinsics are released before the context itself.
        unsafe {
            self.timers.lock().release(ctx);
            self.intrinsics.release(ctx);
            JSGlobalContextRelease(ctx);
        }
        drop(guard);
        // Callbacks finalized during the release above
        self.released.drain();
        debug!("engine context released");
    }
}

/// Handle to a script engine. Clones share the same context.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("context", &self.inner.context)
            .field("app", &self.inner.config.app_info.name)
            .finish()
    }
}

impl Engine {
    /// Create an engine with default configuration.
    pub fn create(app_info: AppInfo) -> JsResult<Self> {
        Self::builder().app_info(app_info).build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Acquire the engine guard for the current thread.
    ///
    /// Blocks while another thread holds it; nested calls on the owning
    /// thread do not block. Value operations take the guard themselves, so
    /// holding one explicitly is only needed to make a sequence of
    /// operations atomic.
    pub fn enter(&self) -> ExecutionGuard<'_> {
        ExecutionGuard::new(&self.inner)
    }

    /// Whether the current thread is inside this engine's context.
    pub fn is_entered(&self) -> bool {
        guard::is_entered(self.inner.context)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn app_info(&self) -> &AppInfo {
        &self.inner.config.app_info
    }

    /// Evaluate `source` without a resource name.
    ///
    /// There is no timeout or cancellation: a script that never finishes
    /// keeps the engine locked for every other thread.
    pub fn eval(&self, source: &str) -> JsResult<JsValue> {
        self.eval_with_source(source, "")
    }

    /// Evaluate `source`, reporting `filename` as its resource name in
    /// exception locations. An empty `filename` means no resource name.
    ///
    /// Syntax errors and uncaught exceptions both come back as
    /// [`JsError::Script`]. Like [`Engine::eval`], this cannot be
    /// interrupted.
    pub fn eval_with_source(&self, source: &str, filename: &str) -> JsResult<JsValue> {
        let guard = self.enter();
        let ctx = guard.context();
        debug!(resource = filename, len = source.len(), "evaluating script");

        let script = JsString::new(source)?;
        let source_url = if filename.is_empty() {
            None
        } else {
            Some(JsString::new(filename)?)
        };
        let source_url = source_url
            .as_ref()
            .map_or(ptr::null_mut(), |url| url.raw());

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: guard held; strings outlive the call
        unsafe {
            let result = JSEvaluateScript(
                ctx,
                script.raw(),
                ptr::null_mut(),
                source_url,
                1,
                &mut exception,
            );
            if !exception.is_null() {
                return Err(extract_exception(ctx, exception));
            }
            Ok(JsValue::from_raw(self, result))
        }
    }

    /// Create a primitive value. Values of this engine pass through.
    pub fn new_value<V: IntoJsValue>(&self, value: V) -> JsResult<JsValue> {
        value.into_js_value(self)
    }

    /// Create an empty plain object.
    pub fn new_object(&self) -> JsResult<JsValue> {
        let guard = self.enter();
        // SAFETY: guard held; a null class makes a plain object
        unsafe {
            let object = JSObjectMake(guard.context(), ptr::null_mut(), ptr::null_mut());
            if object.is_null() {
                return Err(JsError::internal("JSObjectMake returned null"));
            }
            Ok(JsValue::from_raw(self, object))
        }
    }

    /// Expose a native function to script.
    ///
    /// The function keeps only a weak reference to the engine; it receives
    /// the live engine through [`CallbackInfo::engine`]. Errors it returns
    /// are thrown into script as `Error` objects.
    ///
    /// Capturing a [`JsValue`] of the same engine in `function` keeps the
    /// engine alive for as long as script holds the function.
    pub fn new_callback<F>(&self, function: F) -> JsResult<JsValue>
    where
        F: Fn(&CallbackInfo) -> JsResult<JsValue> + Send + Sync + 'static,
    {
        callback::make_function(self, Arc::new(function))
    }

    /// Parse JSON text into an engine value.
    pub fn parse_json(&self, json: &str) -> JsResult<JsValue> {
        let guard = self.enter();
        let text = JsString::new(json)?;
        // SAFETY: guard held
        let raw = unsafe { JSValueMakeFromJSONString(guard.context(), text.raw()) };
        if raw.is_null() {
            return Err(match serde_json::from_str::<serde::de::IgnoredAny>(json) {
                Err(e) => e.into(),
                Ok(_) => JsError::internal("engine rejected JSON accepted by serde_json"),
            });
        }
        // SAFETY: guard held; raw belongs to this context
        Ok(unsafe { JsValue::from_raw(self, raw) })
    }

    /// The global object.
    pub fn global(&self) -> JsValue {
        let guard = self.enter();
        // SAFETY: guard held
        unsafe {
            let global = JSContextGetGlobalObject(guard.context());
            JsValue::from_raw(self, global)
        }
    }

    pub fn undefined(&self) -> JsValue {
        let guard = self.enter();
        // SAFETY: guard held
        unsafe { JsValue::from_raw(self, JSValueMakeUndefined(guard.context())) }
    }

    pub fn null(&self) -> JsValue {
        let guard = self.enter();
        // SAFETY: guard held
        unsafe { JsValue::from_raw(self, JSValueMakeNull(guard.context())) }
    }

    /// Ask the collector to run. Advisory; collection may be deferred.
    pub fn gc(&self) {
        let guard = self.enter();
        debug!("garbage collection requested");
        // SAFETY: guard held
        unsafe { JSGarbageCollect(guard.context()) };
        self.inner.drain_released();
    }

    pub fn downgrade(&self) -> WeakEngine {
        WeakEngine {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The storage collaborator, default-constructed on first use.
    pub fn file_system(&self) -> Arc<dyn FileSystem> {
        let mut slot = self.inner.file_system.lock();
        slot.get_or_insert_with(|| {
            debug!(base_path = ?self.inner.config.base_path, "using default file system");
            Arc::new(DefaultFileSystem::new(self.inner.config.base_path.clone()))
        })
        .clone()
    }

    pub fn set_file_system(&self, file_system: Option<Arc<dyn FileSystem>>) -> JsResult<()> {
        let file_system =
            file_system.ok_or_else(|| JsError::invalid_argument("FileSystem cannot be null"))?;
        *self.inner.file_system.lock() = Some(file_system);
        Ok(())
    }

    /// The network collaborator, default-constructed on first use.
    pub fn web_request(&self) -> Arc<dyn WebRequest> {
        let mut slot = self.inner.web_request.lock();
        slot.get_or_insert_with(|| {
            let config = &self.inner.config;
            debug!(timeout = ?config.web_request_timeout, "using default web request");
            Arc::new(DefaultWebRequest::new(
                config.web_request_timeout,
                config.user_agent.clone(),
            ))
        })
        .clone()
    }

    pub fn set_web_request(&self, web_request: Option<Arc<dyn WebRequest>>) -> JsResult<()> {
        let web_request =
            web_request.ok_or_else(|| JsError::invalid_argument("WebRequest cannot be null"))?;
        *self.inner.web_request.lock() = Some(web_request);
        Ok(())
    }

    /// The error-reporting sink, default-constructed on first use.
    pub fn error_callback(&self) -> Arc<dyn ErrorCallback> {
        let mut slot = self.inner.error_callback.lock();
        slot.get_or_insert_with(|| {
            debug!("using default error callback");
            Arc::new(DefaultErrorCallback)
        })
        .clone()
    }

    pub fn set_error_callback(
        &self,
        error_callback: Option<Arc<dyn ErrorCallback>>,
    ) -> JsResult<()> {
        let error_callback = error_callback
            .ok_or_else(|| JsError::invalid_argument("ErrorCallback cannot be null"))?;
        *self.inner.error_callback.lock() = Some(error_callback);
        Ok(())
    }

    pub(crate) fn report_error(&self, message: &str) {
        self.error_callback().report(message);
    }

    pub(crate) fn context(&self) -> JSGlobalContextRef {
        self.inner.context
    }

    pub(crate) fn inner(&self) -> &EngineInner {
        &self.inner
    }

    /// Reject values that belong to another engine.
    pub(crate) fn check_owned(&self, value: &JsValue) -> JsResult<()> {
        if Arc::ptr_eq(&self.inner, &value.engine().inner) {
            Ok(())
        } else {
            Err(JsError::invalid_argument(
                "value belongs to a different engine",
            ))
        }
    }
}

/// Non-owning engine reference, held by native callbacks and timers.
#[derive(Clone)]
pub struct WeakEngine {
    inner: Weak<EngineInner>,
}

impl WeakEngine {
    /// The engine, or [`JsError::EngineGone`] once it has been dropped.
    pub fn upgrade(&self) -> JsResult<Engine> {
        self.inner
            .upgrade()
            .map(|inner| Engine { inner })
            .ok_or(JsError::EngineGone)
    }
}

impl fmt::Debug for WeakEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEngine")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
