//! Integration tests for native callbacks

use sieve_engine::{AppInfo, Engine, JsError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn engine() -> Engine {
    Engine::create(AppInfo::new().name("sieve-test")).unwrap()
}

#[test]
fn test_callback_receives_arguments() {
    let engine = engine();
    let join = engine
        .new_callback(|info| {
            let parts: Vec<String> = info.args().iter().map(|arg| arg.as_string()).collect();
            info.engine().new_value(parts.join("|"))
        })
        .unwrap();
    assert!(join.is_function());
    engine.global().set_property("join", &join).unwrap();

    assert_eq!(engine.eval("join('a', 1, true)").unwrap().as_string(), "a|1|true");
    assert_eq!(engine.eval("join()").unwrap().as_string(), "");
}

#[test]
fn test_callback_called_from_rust() {
    let engine = engine();
    let add = engine
        .new_callback(|info| info.engine().new_value(info.arg(0).as_int() + info.arg(1).as_int()))
        .unwrap();
    let args = [engine.new_value(2).unwrap(), engine.new_value(40).unwrap()];
    assert_eq!(add.call(&args, None).unwrap().as_int(), 42);
}

#[test]
fn test_missing_argument_is_undefined() {
    let engine = engine();
    let probe = engine
        .new_callback(|info| info.engine().new_value(info.arg(5).is_undefined()))
        .unwrap();
    assert!(probe.call(&[], None).unwrap().as_bool());
}

#[test]
fn test_callback_sees_receiver() {
    let engine = engine();
    let get_x = engine
        .new_callback(|info| info.this().get_property("x"))
        .unwrap();
    engine.global().set_property("getX", &get_x).unwrap();
    assert_eq!(engine.eval("({x: 9, getX: getX}).getX()").unwrap().as_int(), 9);
}

#[test]
fn test_callback_has_function_prototype() {
    let engine = engine();
    let echo = engine.new_callback(|info| Ok(info.arg(0))).unwrap();
    engine.global().set_property("echo", &echo).unwrap();

    assert_eq!(engine.eval("typeof echo").unwrap().as_string(), "function");
    assert_eq!(engine.eval("echo.call(null, 'via call')").unwrap().as_string(), "via call");
    assert_eq!(engine.eval("echo.bind(null, 'bound')()").unwrap().as_string(), "bound");
    assert_eq!(echo.get_class().unwrap(), "Function");
}

#[test]
fn test_callback_reenters_engine() {
    let engine = engine();
    let evaluate = engine
        .new_callback(|info| {
            let source = info.arg(0).as_string();
            info.engine().eval(&source)
        })
        .unwrap();
    engine.global().set_property("evaluate", &evaluate).unwrap();
    assert_eq!(engine.eval("evaluate('6 * 7') + 1").unwrap().as_int(), 43);
}

#[test]
fn test_callback_error_becomes_script_exception() {
    let engine = engine();
    let fail = engine
        .new_callback(|_| Err(JsError::invalid_argument("no filters loaded")))
        .unwrap();
    engine.global().set_property("fail", &fail).unwrap();

    let caught = engine
        .eval("try { fail(); 'not thrown' } catch (e) { e.message }")
        .unwrap();
    assert_eq!(caught.as_string(), "Invalid argument: no filters loaded");

    let err = engine.eval("fail()").unwrap_err();
    assert!(err.is_script_error());
    assert!(err.to_string().contains("no filters loaded"));
}

#[test]
fn test_callback_panic_becomes_script_exception() {
    let engine = engine();
    let explode = engine
        .new_callback(|_| -> sieve_engine::JsResult<sieve_engine::JsValue> {
            panic!("callback bug")
        })
        .unwrap();
    engine.global().set_property("explode", &explode).unwrap();

    let caught = engine
        .eval("try { explode(); '' } catch (e) { e.message }")
        .unwrap();
    assert_eq!(caught.as_string(), "native callback panicked");
    assert!(!engine.is_entered());
}

#[test]
fn test_script_exception_from_nested_call_propagates() {
    let engine = engine();
    let run = engine
        .new_callback(|info| info.arg(0).call(&[], None))
        .unwrap();
    engine.global().set_property("run", &run).unwrap();

    let caught = engine
        .eval("try { run(function() { throw new Error('inner'); }); } catch (e) { String(e.message) }")
        .unwrap();
    assert!(caught.as_string().contains("inner"));
}

#[test]
fn test_weak_engine_fails_after_last_handle() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let first = engine();
    let counting = first
        .new_callback(move |info| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(info.engine().undefined())
        })
        .unwrap();
    assert!(counting.call(&[], None).is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The weak reference resolves for as long as any handle is alive.
    let weak = first.downgrade();
    drop(first);
    assert!(weak.upgrade().is_ok());
    drop(counting);
    assert!(matches!(weak.upgrade(), Err(JsError::EngineGone)));
}

#[test]
fn test_returning_foreign_value_is_rejected() {
    let engine = engine();
    let other = Engine::create(AppInfo::new()).unwrap();
    let foreign = other.new_value("elsewhere").unwrap();
    let leak = engine.new_callback(move |_| Ok(foreign.clone())).unwrap();

    let err = leak.call(&[], None).unwrap_err();
    assert!(err.is_script_error());
    assert!(err.to_string().contains("different engine"));
}

#[test]
fn test_callback_prototype_survives_replaced_function() {
    let engine = engine();
    engine.eval("var Function = 1;").unwrap();
    let echo = engine.new_callback(|info| Ok(info.arg(0))).unwrap();
    engine.global().set_property("echo", &echo).unwrap();
    assert_eq!(engine.eval("echo.call(null, 'still works')").unwrap().as_string(), "still works");
}
