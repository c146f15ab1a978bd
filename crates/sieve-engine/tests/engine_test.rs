//! Integration tests for the Engine API

use sieve_engine::platform::{
    FsCallback, ReadCallback, RequestStatus, ResponseCallback, ServerResponse, StatCallback,
};
use sieve_engine::{AppInfo, Engine, ErrorCallback, FileSystem, JsError, WebRequest};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn engine() -> Engine {
    Engine::create(AppInfo::new().name("sieve-test")).unwrap()
}

#[test]
fn test_basic_eval() {
    let engine = engine();
    assert_eq!(engine.eval("1 + 1").unwrap().as_int(), 2);
    assert_eq!(engine.eval("'hello' + ' ' + 'world'").unwrap().as_string(), "hello world");
}

#[test]
fn test_eval_keeps_global_state() {
    let engine = engine();
    engine.eval("var counter = 40;").unwrap();
    engine.eval("counter += 2;").unwrap();
    assert_eq!(engine.eval("counter").unwrap().as_int(), 42);
    assert_eq!(engine.global().get_property("counter").unwrap().as_int(), 42);
}

#[test]
fn test_clones_share_context() {
    let engine = engine();
    let other = engine.clone();
    engine.eval("var shared = 'yes';").unwrap();
    assert_eq!(other.eval("shared").unwrap().as_string(), "yes");
}

#[test]
fn test_syntax_error_is_script_error() {
    let engine = engine();
    let err = engine.eval_with_source("var x = ;", "file.js").unwrap_err();
    assert!(err.is_script_error());
    assert!(err.to_string().starts_with("SyntaxError"));
    assert!(err.to_string().ends_with(" at file.js:1"), "{err}");
    let location = err.location().unwrap();
    assert_eq!(location.resource, "file.js");
    assert_eq!(location.line, 1);
}

#[test]
fn test_runtime_error_names_resource_and_line() {
    let engine = engine();
    let err = engine
        .eval_with_source("var a = 1;\nthrow new Error('boom');", "file.js")
        .unwrap_err();
    assert_eq!(err.to_string(), "Error: boom at file.js:2");
    let location = err.location().unwrap();
    assert_eq!(location.resource, "file.js");
    assert_eq!(location.line, 2);
}

#[test]
fn test_error_without_filename_has_no_location() {
    let engine = engine();
    let err = engine.eval("throw new TypeError('bad type')").unwrap_err();
    assert_eq!(err.to_string(), "TypeError: bad type");
    assert!(err.location().is_none());
}

#[test]
fn test_thrown_primitive() {
    let engine = engine();
    let err = engine.eval("throw 'plain string'").unwrap_err();
    assert_eq!(err.to_string(), "plain string");
}

#[test]
fn test_app_info_global() {
    let info = AppInfo::new()
        .id("3")
        .name("4")
        .version("1")
        .application("5")
        .application_version("2")
        .locale("2-2")
        .development_build(true);
    let engine = Engine::create(info).unwrap();

    assert_eq!(engine.eval("_appInfo.version").unwrap().as_string(), "1");
    assert_eq!(engine.eval("_appInfo.applicationVersion").unwrap().as_string(), "2");
    assert_eq!(engine.eval("_appInfo.id").unwrap().as_string(), "3");
    assert_eq!(engine.eval("_appInfo.name").unwrap().as_string(), "4");
    assert_eq!(engine.eval("_appInfo.application").unwrap().as_string(), "5");
    assert_eq!(engine.eval("_appInfo.locale").unwrap().as_string(), "2-2");
    assert!(engine.eval("_appInfo.developmentBuild").unwrap().as_bool());
}

#[test]
fn test_host_globals_installed() {
    let engine = engine();
    for name in [
        "console.log",
        "console.error",
        "setTimeout",
        "clearTimeout",
        "_fileSystem.read",
        "_fileSystem.resolve",
        "_webRequest.GET",
    ] {
        let kind = engine.eval(&format!("typeof {name}")).unwrap().as_string();
        assert_eq!(kind, "function", "{name}");
    }
}

#[test]
fn test_host_globals_are_not_enumerable() {
    let engine = engine();
    let names = engine.global().get_own_property_names().unwrap();
    for name in ["_appInfo", "console", "setTimeout", "_fileSystem", "_webRequest"] {
        assert!(!names.iter().any(|n| n == name), "{name}");
    }
    assert!(engine.eval("_fileSystem").unwrap().get_own_property_names().unwrap().is_empty());
}

#[test]
fn test_gc_is_harmless() {
    let engine = engine();
    let kept = engine.eval("({tag: 'alive'})").unwrap();
    engine.eval("for (var i = 0; i < 1000; i++) { ({garbage: i}); }").unwrap();
    engine.gc();
    assert_eq!(kept.get_property("tag").unwrap().as_string(), "alive");
}

#[test]
fn test_is_entered_tracks_guard() {
    let engine = engine();
    assert!(!engine.is_entered());
    {
        let _guard = engine.enter();
        assert!(engine.is_entered());
        // Re-entrant on the owning thread.
        assert_eq!(engine.eval("3").unwrap().as_int(), 3);
        assert!(engine.is_entered());
    }
    assert!(!engine.is_entered());
}

#[test]
fn test_guard_released_when_panicking() {
    let engine = engine();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _guard = engine.enter();
        panic!("host code failed while entered");
    }));
    assert!(result.is_err());
    assert!(!engine.is_entered());

    // Another thread can still take the lock.
    let other = engine.clone();
    let value = thread::spawn(move || other.eval("7 * 6").unwrap().as_int())
        .join()
        .unwrap();
    assert_eq!(value, 42);
}

#[test]
fn test_values_keep_engine_alive() {
    let value = {
        let engine = engine();
        engine.eval("({answer: 42})").unwrap()
    };
    assert_eq!(value.get_property("answer").unwrap().as_int(), 42);
    assert_eq!(value.engine().eval("1").unwrap().as_int(), 1);
}

#[test]
fn test_setting_none_collaborator_fails() {
    let engine = engine();
    assert!(matches!(
        engine.set_file_system(None),
        Err(JsError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.set_web_request(None),
        Err(JsError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.set_error_callback(None),
        Err(JsError::InvalidArgument(_))
    ));
}

#[test]
fn test_collaborators_default_lazily_and_stay_stable() {
    let engine = engine();
    let first = engine.file_system();
    let second = engine.file_system();
    assert!(Arc::ptr_eq(&first, &second));

    let web_first = engine.web_request();
    let web_second = engine.web_request();
    assert!(Arc::ptr_eq(&web_first, &web_second));

    let sink_first = engine.error_callback();
    let sink_second = engine.error_callback();
    assert!(Arc::ptr_eq(&sink_first, &sink_second));
}

struct NullFileSystem;

impl FileSystem for NullFileSystem {
    fn read(&self, _path: &str, callback: ReadCallback) {
        callback(Err("unsupported".into()));
    }

    fn write(&self, _path: &str, _data: Vec<u8>, callback: FsCallback) {
        callback(Err("unsupported".into()));
    }

    fn move_file(&self, _from: &str, _to: &str, callback: FsCallback) {
        callback(Err("unsupported".into()));
    }

    fn remove(&self, _path: &str, callback: FsCallback) {
        callback(Err("unsupported".into()));
    }

    fn stat(&self, _path: &str, callback: StatCallback) {
        callback(Err("unsupported".into()));
    }

    fn resolve(&self, path: &str) -> String {
        format!("null:{path}")
    }
}

#[test]
fn test_replaced_file_system_is_used() {
    let engine = engine();
    let custom: Arc<dyn FileSystem> = Arc::new(NullFileSystem);
    engine.set_file_system(Some(custom.clone())).unwrap();
    assert!(Arc::ptr_eq(&engine.file_system(), &custom));
    assert_eq!(
        engine.eval("_fileSystem.resolve('a.txt')").unwrap().as_string(),
        "null:a.txt"
    );
}

#[test]
fn test_builder_supplies_collaborators() {
    let reports = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
    let sink = reports.clone();
    let callback: Arc<dyn ErrorCallback> =
        Arc::new(move |message: &str| sink.lock().push(message.to_string()));

    let engine = Engine::builder()
        .app_info(AppInfo::new().name("builder"))
        .file_system(Arc::new(NullFileSystem))
        .error_callback(callback)
        .web_request_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    assert_eq!(engine.eval("_appInfo.name").unwrap().as_string(), "builder");
    assert_eq!(engine.config().web_request_timeout, Duration::from_secs(5));
    engine.eval("console.error('broken', 'rule', 42)").unwrap();
    assert_eq!(reports.lock().as_slice(), ["broken rule 42"]);
}

#[test]
fn test_console_formats_objects_as_json() {
    let reports = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
    let sink = reports.clone();
    let engine = engine();
    engine
        .set_error_callback(Some(Arc::new(move |message: &str| {
            sink.lock().push(message.to_string())
        })))
        .unwrap();

    engine.eval("console.log('not reported')").unwrap();
    engine.eval("console.error({a: 1}, [1, 2], undefined)").unwrap();
    assert_eq!(reports.lock().as_slice(), [r#"{"a":1} [1,2] undefined"#]);
}

#[test]
fn test_web_request_collaborator_is_replaceable() {
    struct Unreachable;
    impl WebRequest for Unreachable {
        fn get(
            &self,
            _url: &str,
            _headers: &[(String, String)],
            callback: ResponseCallback,
        ) {
            callback(ServerResponse::failed(RequestStatus::ConnectionFailed));
        }
    }

    let engine = engine();
    engine.set_web_request(Some(Arc::new(Unreachable))).unwrap();
    engine
        .eval(
            "var result; _webRequest.GET('http://example.com', {}, function(r) { result = r; });",
        )
        .unwrap();
    assert_eq!(engine.eval("result.status").unwrap().as_string(), "connection_failed");
    assert_eq!(engine.eval("result.responseStatus").unwrap().as_int(), 0);
}
