//! Host globals installed into every engine
//!
//! - `_appInfo` (app_info.rs)
//! - `console` (console.rs)
//! - `setTimeout` / `clearTimeout` (timers.rs)
//! - `_fileSystem` (fs.rs)
//! - `_webRequest` (web_request.rs)

mod app_info;
mod console;
mod fs;
mod timers;
mod web_request;

pub(crate) use timers::PendingTimers;

use tracing::warn;

use crate::callback::CallbackInfo;
use crate::engine::Engine;
use crate::error::{JsError, JsResult};
use crate::value::JsValue;

pub(crate) fn install(engine: &Engine) -> JsResult<()> {
    let global = engine.global();
    app_info::install(engine, &global)?;
    console::install(engine, &global)?;
    timers::install(engine, &global)?;
    fs::install(engine, &global)?;
    web_request::install(engine, &global)?;
    Ok(())
}

/// Attach a native function as `target[name]`.
fn define_function<F>(engine: &Engine, target: &JsValue, name: &str, function: F) -> JsResult<()>
where
    F: Fn(&CallbackInfo) -> JsResult<JsValue> + Send + Sync + 'static,
{
    target.define_hidden(name, engine.new_callback(function)?)
}

/// Fail unless at least `count` arguments were passed.
fn require_args(info: &CallbackInfo, count: usize, function: &str) -> JsResult<()> {
    if info.len() < count {
        return Err(JsError::invalid_argument(format!(
            "{function} requires {count} parameters"
        )));
    }
    Ok(())
}

/// Argument `index`, which must be a function.
fn function_arg(info: &CallbackInfo, index: usize, function: &'static str) -> JsResult<JsValue> {
    let value = info.arg(index);
    if !value.is_function() {
        return Err(JsError::type_mismatch(
            function,
            "function",
            value.kind().as_str(),
        ));
    }
    Ok(value)
}

/// Call a script callback with the argument built by `build`, reporting
/// failures to the engine's error sink.
fn deliver<F>(callback: JsValue, build: F)
where
    F: FnOnce(&Engine) -> JsResult<JsValue>,
{
    let engine = callback.engine().clone();
    let result = {
        let _guard = engine.enter();
        build(&engine).and_then(|arg| callback.call(&[arg], None))
    };
    if let Err(err) = result {
        warn!(error = %err, "script callback failed");
        engine.report_error(&err.to_string());
    }
}
