use std::sync::Arc;

use trellis_codegen::compile_unit;
use trellis_context::test_db::TestDatabase;
use trellis_context::{ClassDef, FnContributor, MergedContext, MergedContextBuilder};
use trellis_core::{CompiledUnit, Fingerprint, HostError, HostObject, Signature, TypeRef, Value};

use crate::{Loader, MAX_CALL_DEPTH, RuntimeError};

fn compile(db: &mut TestDatabase, name: &str, text: &str) -> CompiledUnit {
    let source = db.template(name, text);
    let compiled = compile_unit(&*db, source).expect("template compiles");
    let hash = Fingerprint::of(text);
    CompiledUnit::new("test", (*compiled).clone(), hash, hash)
}

fn loader_with(templates: &[(&str, &str)]) -> Loader {
    let mut db = TestDatabase::default();
    for (name, text) in templates {
        db.template(name, text);
    }
    let loader = Loader::new();
    for (name, text) in templates {
        loader.load(compile(&mut db, name, text));
    }
    loader
}

const GREET: &str = "<% template greet(String name) %>Hello <% name %>!";

#[test]
fn test_output_and_result_value() {
    let loader = loader_with(&[("greet", GREET)]);
    let context = MergedContext::base_only();
    let invocation = loader
        .invoke("greet", &context, vec![Value::from("Ada")])
        .unwrap();
    assert_eq!(invocation.output, "Hello Ada!");
    assert_eq!(invocation.value, Value::from("Ada"));
}

#[test]
fn test_template_calls_share_the_output_buffer() {
    let loader = loader_with(&[
        ("greet", GREET),
        ("page", "<% template page(String who) %>[<% call greet(who) %>]"),
    ]);
    let context = MergedContext::base_only();
    let invocation = loader
        .invoke("page", &context, vec![Value::from("Bo")])
        .unwrap();
    assert_eq!(invocation.output, "[Hello Bo!]");
}

#[test]
fn test_arguments_are_checked_before_running() {
    let loader = loader_with(&[("greet", GREET)]);
    let context = MergedContext::base_only();
    let error = loader
        .invoke("greet", &context, vec![Value::Int(3)])
        .unwrap_err();
    assert_eq!(
        error,
        RuntimeError::SignatureMismatch {
            template: "greet".into(),
            expected: "String".into(),
            found: "Integer".into(),
        }
    );
    assert!(matches!(
        loader.invoke("greet", &context, vec![]),
        Err(RuntimeError::SignatureMismatch { .. })
    ));
    let nothing = loader
        .invoke("greet", &context, vec![Value::Null])
        .unwrap();
    assert_eq!(nothing.output, "Hello !");
}

#[test]
fn test_primitive_parameters_widen_arguments() {
    let loader = loader_with(&[("half", "<% template half(double x) %><% x / 2 %>")]);
    let context = MergedContext::base_only();
    let invocation = loader.invoke("half", &context, vec![Value::Int(3)]).unwrap();
    assert_eq!(invocation.output, "1.5");
    assert!(loader.invoke("half", &context, vec![Value::from("3")]).is_err());
}

#[test]
fn test_division_by_zero_fails_the_invocation() {
    let loader = loader_with(&[("div", "<% template div(int a, int b) %><% a / b %>")]);
    let context = MergedContext::base_only();
    let ok = loader
        .invoke("div", &context, vec![Value::Int(7), Value::Int(2)])
        .unwrap();
    assert_eq!(ok.output, "3");
    assert_eq!(ok.value, Value::Int(3));
    let error = loader
        .invoke("div", &context, vec![Value::Int(1), Value::Int(0)])
        .unwrap_err();
    assert_eq!(error.to_string(), "template `div` failed: division by zero");
}

#[test]
fn test_runaway_recursion_is_stopped() {
    let loader = loader_with(&[("again", "<% template again() %>.<% call again() %>")]);
    let context = MergedContext::base_only();
    let error = loader.invoke("again", &context, vec![]).unwrap_err();
    assert_eq!(
        error,
        RuntimeError::InvocationFailure {
            template: "again".into(),
            message: format!("template calls nested deeper than {MAX_CALL_DEPTH}"),
        }
    );
}

#[test]
fn test_null_collection_iterates_as_empty() {
    let loader = loader_with(&[(
        "each",
        "<% template each(List<String> xs) %><% foreach (x in xs) { x } %>",
    )]);
    let context = MergedContext::base_only();
    let empty = loader.invoke("each", &context, vec![Value::Null]).unwrap();
    assert_eq!(empty.output, "");
    let items = Value::list(vec![Value::from("a"), Value::from("b")]);
    let full = loader.invoke("each", &context, vec![items]).unwrap();
    assert_eq!(full.output, "ab");
    assert_eq!(full.value, Value::Null);
}

#[test]
fn test_replacing_a_unit_leaves_held_versions_intact() {
    let mut db = TestDatabase::default();
    let loader = Loader::new();
    let first = loader.load(compile(&mut db, "banner", "<% template banner() %>v1"));
    let held = loader.lookup("banner").unwrap();
    let second = loader.load(compile(&mut db, "banner", "<% template banner() %>v2"));
    assert!(second > first);
    assert_eq!(loader.version("banner"), Some(second));

    let context = MergedContext::base_only();
    let old = loader.invoke_unit(&held, &context, vec![]).unwrap();
    assert_eq!(old.output, "v1");
    let new = loader.invoke("banner", &context, vec![]).unwrap();
    assert_eq!(new.output, "v2");
    assert_eq!(loader.names(), vec!["banner".to_string()]);
}

#[test]
fn test_missing_template() {
    let loader = Loader::new();
    let context = MergedContext::base_only();
    assert_eq!(
        loader.invoke("nowhere", &context, vec![]).unwrap_err(),
        RuntimeError::TemplateNotFound("nowhere".into())
    );
}

#[derive(Debug)]
struct Point {
    x: i32,
}

impl HostObject for Point {
    fn class_name(&self) -> &str {
        "Point"
    }

    fn invoke(&self, method: &str, _args: Vec<Value>) -> Result<Value, HostError> {
        match method {
            "getX" => Ok(Value::Int(self.x)),
            other => Err(HostError::new(format!("Point has no method `{other}`"))),
        }
    }
}

#[test]
fn test_host_objects_and_context_calls() {
    let geo = FnContributor::new()
        .class(ClassDef::final_class("Point").method(Signature::new("getX", vec![], TypeRef::int())))
        .function(
            Signature::new("origin", vec![], TypeRef::class("Point")),
            |_| Ok(Value::Object(Arc::new(Point { x: 7 }))),
        );
    let context = MergedContextBuilder::new()
        .contributor("geo", geo)
        .build()
        .unwrap();
    let mut db = TestDatabase::new(context.clone());
    let loader = Loader::new();
    let text = "<% template px() %><% p = origin(); p isa Point ? p.x + 1 : -1 %>";
    loader.load(compile(&mut db, "px", text));
    let invocation = loader.invoke("px", &context, vec![]).unwrap();
    assert_eq!(invocation.output, "8");
    assert_eq!(invocation.value, Value::Int(8));
}
