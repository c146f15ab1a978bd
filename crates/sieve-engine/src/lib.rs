// Allow raw pointer arguments in safe internal helpers - this is an FFI
// bridge where pointers always come from the engine's own context.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

//! Embedded JavaScriptCore engine for filter hosts.
//!
//! An [`Engine`] owns one script context. Hosts evaluate script, build and
//! inspect values through [`JsValue`], and expose native functions with
//! [`Engine::new_callback`]. Script exceptions come back as
//! [`JsError::Script`].
//!
//! # Example
//!
//! ```no_run
//! use sieve_engine::{AppInfo, Engine};
//!
//! let engine = Engine::create(AppInfo::new().name("sieve")).unwrap();
//! let double = engine
//!     .new_callback(|info| info.engine().new_value(info.arg(0).as_int() * 2))
//!     .unwrap();
//! engine.global().set_property("double", &double).unwrap();
//!
//! assert_eq!(engine.eval("double(21)").unwrap().as_int(), 42);
//! ```
//!
//! # Thread Safety
//!
//! [`Engine`] and [`JsValue`] are `Send + Sync`. Every operation takes the
//! engine's re-entrant lock, so script runs on one thread at a time.
//! Native callbacks invoked from script run on the thread that entered the
//! engine and may call back into it freely.
//!
//! # Host globals
//!
//! Each engine starts with `_appInfo`, `console`, `setTimeout`,
//! `clearTimeout`, `_fileSystem` and `_webRequest`. The last two go through
//! the [`FileSystem`] and [`WebRequest`] collaborators, which default to
//! [`DefaultFileSystem`] and [`DefaultWebRequest`] unless the host
//! installs its own.

mod apis;
pub mod callback;
pub mod config;
mod engine;
mod error;
pub mod exception;
mod guard;
pub mod platform;
mod string;
mod value;

pub use callback::CallbackInfo;
pub use config::{AppInfo, EngineConfig};
pub use engine::{Engine, EngineBuilder, WeakEngine};
pub use error::{JsError, JsResult, ScriptException, SourceLocation};
pub use guard::ExecutionGuard;
pub use platform::{
    DefaultErrorCallback, DefaultFileSystem, DefaultWebRequest, ErrorCallback, FileSystem,
    WebRequest,
};
pub use value::{IntoJsValue, JsValue, JsValueList, ValueKind};

// Re-export the raw bindings for hosts that need direct FFI access
pub use sieve_jsc_sys;

pub mod prelude {
    pub use crate::{
        AppInfo, CallbackInfo, Engine, ErrorCallback, FileSystem, IntoJsValue, JsError, JsResult,
        JsValue, JsValueList, WebRequest,
    };
}
