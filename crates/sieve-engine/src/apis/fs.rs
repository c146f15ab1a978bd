//! `_fileSystem` API
//!
//! Script-facing wrapper over the engine's [`FileSystem`] collaborator.
//! File contents cross as UTF-8 text.
//!
//! ```javascript
//! _fileSystem.read(path, ({content, error}) => {});
//! _fileSystem.write(path, content, (error) => {});
//! _fileSystem.move(from, to, (error) => {});
//! _fileSystem.remove(path, (error) => {});
//! _fileSystem.stat(path, ({exists, isFile, isDirectory, lastModified, error}) => {});
//! _fileSystem.resolve(path); // synchronous
//! ```
//!
//! [`FileSystem`]: crate::platform::FileSystem

use super::{define_function, deliver, function_arg, require_args};
use crate::engine::Engine;
use crate::error::JsResult;
use crate::platform::StatResult;
use crate::value::JsValue;

pub(super) fn install(engine: &Engine, global: &JsValue) -> JsResult<()> {
    let fs = engine.new_object()?;

    define_function(engine, &fs, "read", |info| {
        require_args(info, 2, "_fileSystem.read")?;
        let path = info.arg(0).as_string();
        let callback = function_arg(info, 1, "_fileSystem.read")?;
        info.engine().file_system().read(
            &path,
            Box::new(move |result| {
                deliver(callback, |engine| {
                    let payload = engine.new_object()?;
                    match result {
                        Ok(data) => {
                            payload.set_property("content", &*String::from_utf8_lossy(&data))?;
                            payload.set_property("error", "")?;
                        }
                        Err(error) => {
                            payload.set_property("content", "")?;
                            payload.set_property("error", error)?;
                        }
                    }
                    Ok(payload)
                })
            }),
        );
        Ok(info.engine().undefined())
    })?;

    define_function(engine, &fs, "write", |info| {
        require_args(info, 3, "_fileSystem.write")?;
        let path = info.arg(0).as_string();
        let content = info.arg(1).as_string().into_bytes();
        let callback = function_arg(info, 2, "_fileSystem.write")?;
        info.engine()
            .file_system()
            .write(&path, content, Box::new(move |result| report_outcome(callback, result)));
        Ok(info.engine().undefined())
    })?;

    define_function(engine, &fs, "move", |info| {
        require_args(info, 3, "_fileSystem.move")?;
        let from = info.arg(0).as_string();
        let to = info.arg(1).as_string();
        let callback = function_arg(info, 2, "_fileSystem.move")?;
        info.engine()
            .file_system()
            .move_file(&from, &to, Box::new(move |result| report_outcome(callback, result)));
        Ok(info.engine().undefined())
    })?;

    define_function(engine, &fs, "remove", |info| {
        require_args(info, 2, "_fileSystem.remove")?;
        let path = info.arg(0).as_string();
        let callback = function_arg(info, 1, "_fileSystem.remove")?;
        info.engine()
            .file_system()
            .remove(&path, Box::new(move |result| report_outcome(callback, result)));
        Ok(info.engine().undefined())
    })?;

    define_function(engine, &fs, "stat", |info| {
        require_args(info, 2, "_fileSystem.stat")?;
        let path = info.arg(0).as_string();
        let callback = function_arg(info, 1, "_fileSystem.stat")?;
        info.engine().file_system().stat(
            &path,
            Box::new(move |result| {
                deliver(callback, |engine| {
                    let (stat, error) = match result {
                        Ok(stat) => (stat, String::new()),
                        Err(error) => (StatResult::default(), error),
                    };
                    let payload = engine.new_object()?;
                    payload.set_property("exists", stat.exists)?;
                    payload.set_property("isFile", stat.is_file)?;
                    payload.set_property("isDirectory", stat.is_directory)?;
                    payload.set_property("lastModified", stat.last_modified)?;
                    payload.set_property("error", error)?;
                    Ok(payload)
                })
            }),
        );
        Ok(info.engine().undefined())
    })?;

    define_function(engine, &fs, "resolve", |info| {
        require_args(info, 1, "_fileSystem.resolve")?;
        let path = info.arg(0).as_string();
        let resolved = info.engine().file_system().resolve(&path);
        info.engine().new_value(resolved)
    })?;

    global.define_hidden("_fileSystem", fs)
}

/// Call back with the error message, empty on success.
fn report_outcome(callback: JsValue, result: Result<(), String>) {
    deliver(callback, |engine| {
        engine.new_value(result.err().unwrap_or_default())
    })
}
