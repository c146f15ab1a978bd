//! Integration tests for JsValue semantics

use sieve_engine::{AppInfo, Engine, JsError, JsValue, ValueKind};

fn engine() -> Engine {
    Engine::create(AppInfo::new().name("sieve-test")).unwrap()
}

fn assert_structural_accessors_fail(value: &JsValue) {
    assert!(matches!(value.as_list(), Err(JsError::TypeMismatch { .. })));
    assert!(matches!(value.get_property("foo"), Err(JsError::TypeMismatch { .. })));
    assert!(matches!(value.set_property("foo", false), Err(JsError::TypeMismatch { .. })));
    assert!(matches!(value.get_class(), Err(JsError::TypeMismatch { .. })));
    assert!(matches!(value.get_own_property_names(), Err(JsError::TypeMismatch { .. })));
    assert!(matches!(value.call(&[], None), Err(JsError::TypeMismatch { .. })));
}

#[test]
fn test_undefined_value() {
    let engine = engine();
    let value = engine.eval("undefined").unwrap();
    assert!(value.is_undefined());
    assert!(!value.is_null());
    assert!(!value.is_string());
    assert!(!value.is_bool());
    assert!(!value.is_number());
    assert!(!value.is_object());
    assert!(!value.is_array());
    assert!(!value.is_function());
    assert_eq!(value.as_string(), "undefined");
    assert!(!value.as_bool());
    assert_eq!(value.kind(), ValueKind::Undefined);
    assert_structural_accessors_fail(&value);
}

#[test]
fn test_null_value() {
    let engine = engine();
    let value = engine.eval("null").unwrap();
    assert!(!value.is_undefined());
    assert!(value.is_null());
    assert!(!value.is_string());
    assert!(!value.is_bool());
    assert!(!value.is_number());
    assert!(!value.is_object());
    assert!(!value.is_array());
    assert!(!value.is_function());
    assert_eq!(value.as_string(), "null");
    assert!(!value.as_bool());
    assert_structural_accessors_fail(&value);
}

#[test]
fn test_string_value() {
    let engine = engine();
    let value = engine.eval("'123'").unwrap();
    assert!(!value.is_undefined());
    assert!(!value.is_null());
    assert!(value.is_string());
    assert!(!value.is_bool());
    assert!(!value.is_number());
    assert!(!value.is_object());
    assert!(!value.is_array());
    assert!(!value.is_function());
    assert_eq!(value.as_string(), "123");
    assert_eq!(value.as_int(), 123);
    assert!(value.as_bool());
    assert_structural_accessors_fail(&value);
}

#[test]
fn test_int_value() {
    let engine = engine();
    let value = engine.eval("12345678901234").unwrap();
    assert!(!value.is_undefined());
    assert!(!value.is_null());
    assert!(!value.is_string());
    assert!(!value.is_bool());
    assert!(value.is_number());
    assert!(!value.is_object());
    assert!(!value.is_array());
    assert!(!value.is_function());
    assert_eq!(value.as_string(), "12345678901234");
    assert_eq!(value.as_int(), 12345678901234);
    assert!(value.as_bool());
    assert_structural_accessors_fail(&value);
}

#[test]
fn test_bool_value() {
    let engine = engine();
    let value = engine.eval("true").unwrap();
    assert!(!value.is_undefined());
    assert!(!value.is_null());
    assert!(!value.is_string());
    assert!(value.is_bool());
    assert!(!value.is_number());
    assert!(!value.is_object());
    assert!(!value.is_array());
    assert!(!value.is_function());
    assert_eq!(value.as_string(), "true");
    assert!(value.as_bool());
    assert_structural_accessors_fail(&value);
}

#[test]
fn test_object_value() {
    let engine = engine();
    let source = "
        function Foo() {
          this.x = 2;
          this.toString = function() {return 'foo';};
          this.valueOf = function() {return 123;};
        };
        new Foo()";
    let value = engine.eval(source).unwrap();
    assert!(!value.is_undefined());
    assert!(!value.is_null());
    assert!(!value.is_string());
    assert!(!value.is_bool());
    assert!(!value.is_number());
    assert!(value.is_object());
    assert!(!value.is_array());
    assert!(!value.is_function());
    assert_eq!(value.kind(), ValueKind::Object);
    assert_eq!(value.as_string(), "foo");
    assert_eq!(value.as_int(), 123);
    assert!(value.as_bool());
    assert!(matches!(value.as_list(), Err(JsError::TypeMismatch { .. })));

    assert_eq!(value.get_property("x").unwrap().as_int(), 2);
    value.set_property("x", 12).unwrap();
    assert_eq!(value.get_property("x").unwrap().as_int(), 12);
    value.set_property("x", engine.new_value(15).unwrap()).unwrap();
    assert_eq!(value.get_property("x").unwrap().as_int(), 15);

    assert_eq!(value.get_class().unwrap(), "Foo");
    assert_eq!(value.get_own_property_names().unwrap().len(), 3);
    assert!(matches!(value.call(&[], None), Err(JsError::TypeMismatch { .. })));
}

#[test]
fn test_array_value() {
    let engine = engine();
    let value = engine.eval("[5,8,12]").unwrap();
    assert!(!value.is_undefined());
    assert!(!value.is_null());
    assert!(!value.is_string());
    assert!(!value.is_bool());
    assert!(!value.is_number());
    assert!(value.is_object());
    assert!(value.is_array());
    assert!(!value.is_function());
    assert_eq!(value.kind(), ValueKind::Array);
    assert_eq!(value.as_string(), "5,8,12");
    assert!(value.as_bool());

    let items = value.as_list().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1].as_int(), 8);
    assert_eq!(value.get_property("length").unwrap().as_int(), 3);
    assert_eq!(value.get_class().unwrap(), "Array");
    assert!(matches!(value.call(&[], None), Err(JsError::TypeMismatch { .. })));
}

#[test]
fn test_function_value() {
    let engine = engine();
    let value = engine
        .eval("(function(foo, bar) {return this.x + '/' + foo + '/' + bar;})")
        .unwrap();
    assert!(!value.is_undefined());
    assert!(!value.is_null());
    assert!(!value.is_string());
    assert!(!value.is_bool());
    assert!(!value.is_number());
    assert!(value.is_object());
    assert!(!value.is_array());
    assert!(value.is_function());
    assert_eq!(value.kind(), ValueKind::Function);
    assert!(value.as_bool());
    assert!(matches!(value.as_list(), Err(JsError::TypeMismatch { .. })));
    assert_eq!(value.get_property("length").unwrap().as_int(), 2);

    let this = engine.eval("({x:2})").unwrap();
    let params = vec![engine.new_value(5).unwrap(), engine.new_value("xyz").unwrap()];
    let result = value.call(&params, Some(&this)).unwrap();
    assert_eq!(result.as_string(), "2/5/xyz");
}

#[test]
fn test_call_single_arg() {
    let engine = engine();
    let func = engine.eval("(function(arg) {return arg * 2;})").unwrap();
    let arg = engine.new_value(5).unwrap();
    assert_eq!(func.call(&[arg], None).unwrap().as_int(), 10);
}

#[test]
fn test_call_with_primitive_receiver() {
    let engine = engine();
    let func = engine.eval("(function() {return typeof this;})").unwrap();
    let receiver = engine.new_value("abc").unwrap();
    assert_eq!(func.call(&[], Some(&receiver)).unwrap().as_string(), "object");
}

#[test]
fn test_call_propagates_exception() {
    let engine = engine();
    let func = engine
        .eval_with_source("(function() {throw new Error('call failed');})", "call.js")
        .unwrap();
    let err = func.call(&[], None).unwrap_err();
    assert!(err.is_script_error());
    assert_eq!(err.to_string(), "Error: call failed at call.js:1");
}

#[test]
fn test_throwing_conversion() {
    let engine = engine();
    let source = "
        function Foo() {
          this.toString = function() {throw 'test1';};
          this.valueOf = function() {throw 'test2';};
        };
        new Foo()";
    let value = engine.eval(source).unwrap();
    assert_eq!(value.as_string(), "");
    assert_eq!(value.as_int(), 0);
}

#[test]
fn test_nan_converts_to_zero() {
    let engine = engine();
    assert_eq!(engine.eval("'not a number'").unwrap().as_int(), 0);
    assert_eq!(engine.eval("-7.9").unwrap().as_int(), -7);
}

#[test]
fn test_new_value_round_trip() {
    let engine = engine();
    assert_eq!(engine.new_value("filter").unwrap().as_string(), "filter");
    assert!(engine.new_value("filter").unwrap().is_string());
    assert_eq!(engine.new_value(12345678901234i64).unwrap().as_int(), 12345678901234);
    assert!(engine.new_value(-3).unwrap().is_number());
    assert!(engine.new_value(true).unwrap().as_bool());
    assert!(engine.new_value(false).unwrap().is_bool());
}

#[test]
fn test_strings_keep_embedded_nul() {
    let engine = engine();
    let value = engine.new_value("a\0b").unwrap();
    let length = engine.eval("(function(s) {return s.length;})").unwrap();
    assert_eq!(length.call(&[value.clone()], None).unwrap().as_int(), 3);
    assert_eq!(value.as_string(), "a\0b");
}

#[test]
fn test_non_ascii_strings() {
    let engine = engine();
    let value = engine.eval("'Grüße 🚫'").unwrap();
    assert_eq!(value.as_string(), "Grüße 🚫");
}

#[test]
fn test_own_property_names_are_enumerable_own() {
    let engine = engine();
    let value = engine
        .eval("var o = Object.create({inherited: 1}); o.a = 1; o.b = 2; o")
        .unwrap();
    let mut names = value.get_own_property_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_plain_object_class() {
    let engine = engine();
    assert_eq!(engine.eval("({})").unwrap().get_class().unwrap(), "Object");
    assert_eq!(
        engine.eval("Object.create(null)").unwrap().get_class().unwrap(),
        "Object"
    );
}

#[test]
fn test_json_helpers() {
    let engine = engine();
    let value = engine.parse_json(r#"{"rules": [1, 2]}"#).unwrap();
    assert_eq!(value.get_property("rules").unwrap().as_list().unwrap().len(), 2);
    assert_eq!(value.to_json().unwrap().as_deref(), Some(r#"{"rules":[1,2]}"#));
    assert_eq!(engine.undefined().to_json().unwrap(), None);
    assert!(matches!(engine.parse_json("{broken"), Err(JsError::Json(_))));
}

#[test]
fn test_values_from_another_engine_are_rejected() {
    let first = engine();
    let second = engine();
    let object = first.new_object().unwrap();
    let foreign = second.new_value(1).unwrap();
    assert!(matches!(
        object.set_property("x", &foreign),
        Err(JsError::InvalidArgument(_))
    ));

    let func = first.eval("(function(a) {return a;})").unwrap();
    assert!(matches!(
        func.call(&[foreign], None),
        Err(JsError::InvalidArgument(_))
    ));
}

#[test]
fn test_clone_survives_original_drop() {
    let engine = engine();
    let original = engine.eval("({name: 'kept'})").unwrap();
    let copy = original.clone();
    drop(original);
    engine.gc();
    assert_eq!(copy.get_property("name").unwrap().as_string(), "kept");
}

#[test]
fn test_debug_shows_kind_and_string() {
    let engine = engine();
    let value = engine.eval("[1,2]").unwrap();
    assert_eq!(format!("{value:?}"), r#"JsValue(Array, "1,2")"#);
}

#[test]
fn test_own_property_names_ignore_replaced_object_keys() {
    let engine = engine();
    let value = engine.eval("({a: 1, b: 2})").unwrap();
    engine
        .eval("Object.keys = function() { return ['x']; };")
        .unwrap();
    let mut names = value.get_own_property_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);

    engine.eval("var Object = 1;").unwrap();
    assert_eq!(value.get_own_property_names().unwrap().len(), 2);
}

#[test]
fn test_sparse_array_list() {
    let engine = engine();
    let value = engine
        .eval("var a = []; a[2] = 'last'; a.length = 100000; a")
        .unwrap();
    let items = value.as_list().unwrap();
    assert_eq!(items.len(), 100000);
    assert!(items[0].is_undefined());
    assert_eq!(items[2].as_string(), "last");
}
