//! Console API
//!
//! `console.log/debug/info/warn/error/trace` route to `tracing` under the
//! `sieve::console` target. `console.error` also reaches the engine's
//! error callback.

use tracing::{debug, error, info, trace, warn};

use super::define_function;
use crate::callback::CallbackInfo;
use crate::engine::Engine;
use crate::error::JsResult;
use crate::value::{JsValue, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleLevel {
    Log,
    Debug,
    Info,
    Warn,
    Error,
    Trace,
}

const METHODS: [(&str, ConsoleLevel); 6] = [
    ("log", ConsoleLevel::Log),
    ("debug", ConsoleLevel::Debug),
    ("info", ConsoleLevel::Info),
    ("warn", ConsoleLevel::Warn),
    ("error", ConsoleLevel::Error),
    ("trace", ConsoleLevel::Trace),
];

pub(super) fn install(engine: &Engine, global: &JsValue) -> JsResult<()> {
    let console = engine.new_object()?;
    for (name, level) in METHODS {
        define_function(engine, &console, name, move |info| {
            let message = join_args(info);
            emit(level, &message);
            if level == ConsoleLevel::Error {
                info.engine().report_error(&message);
            }
            Ok(info.engine().undefined())
        })?;
    }
    global.define_hidden("console", console)
}

fn emit(level: ConsoleLevel, message: &str) {
    match level {
        ConsoleLevel::Log | ConsoleLevel::Info => info!(target: "sieve::console", "{}", message),
        ConsoleLevel::Debug => debug!(target: "sieve::console", "{}", message),
        ConsoleLevel::Warn => warn!(target: "sieve::console", "{}", message),
        ConsoleLevel::Error => error!(target: "sieve::console", "{}", message),
        ConsoleLevel::Trace => trace!(target: "sieve::console", "{}", message),
    }
}

/// Objects print as JSON when they have a JSON form, everything else in
/// its string form.
fn join_args(info: &CallbackInfo) -> String {
    info.args()
        .iter()
        .map(|arg| match arg.kind() {
            ValueKind::Object | ValueKind::Array => match arg.to_json() {
                Ok(Some(json)) => json,
                _ => arg.as_string(),
            },
            _ => arg.as_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
