//! Templates compiled by the driver and executed by the loader.

use std::sync::Arc;

use trellis::{
    Compiler, DiagnosticKind, FnContributor, Invocation, Loader, MemorySource, MemoryStore,
    MergedContext, MergedContextBuilder, SourceSet, Value,
};
use trellis_context::MergeCollisionError;
use trellis_core::{Signature, TypeRef};

fn run_in(context: MergedContext, text: &str, args: Vec<Value>) -> Invocation {
    let loader = Arc::new(Loader::new());
    let compiler = Compiler::new(
        context,
        SourceSet::new().with(MemorySource::new().with("main", text)),
        Arc::new(MemoryStore::new()),
    )
    .with_loader(Arc::clone(&loader));
    let report = compiler.compile_all(false);
    assert!(report.is_success(), "{:?}", report.diagnostics);
    loader.invoke("main", compiler.context(), args).unwrap()
}

fn run(text: &str) -> Invocation {
    run_in(MergedContext::base_only(), text, vec![])
}

#[test]
fn test_ternary_on_a_boolean_local() {
    let invocation = run("<% a = false; a ? 'true' : 'false' %>");
    assert_eq!(invocation.value, Value::from("false"));
    assert_eq!(invocation.output, "false");
}

#[test]
fn test_three_way_compare_of_strings() {
    let invocation = run("<% str1 = 'abc'; str2 = 'def'; str1 <=> str2 %>");
    let Value::Int(order) = invocation.value else {
        panic!("expected an int, got {:?}", invocation.value);
    };
    assert!(order < 0);
}

#[test]
fn test_fixed_arity_overload_is_preferred() {
    let host = FnContributor::new()
        .function(
            Signature::variadic("doSomething", vec![], TypeRef::object(), TypeRef::string()),
            |_| Ok(Value::from("varargs")),
        )
        .function(
            Signature::new(
                "doSomething",
                vec![TypeRef::object(), TypeRef::object()],
                TypeRef::string(),
            ),
            |_| Ok(Value::from("fixed")),
        );
    let context = MergedContextBuilder::new()
        .contributor("host", host)
        .build()
        .unwrap();
    let invocation = run_in(
        context,
        "<% test1 = 'a'; test2 = 2; doSomething(test1, test2) %>",
        vec![],
    );
    assert_eq!(invocation.value, Value::from("fixed"));
}

#[test]
fn test_elvis_uses_truthiness() {
    assert_eq!(run("<% f = null; f ?: 'valid' %>").value, Value::from("valid"));
    assert_eq!(run("<% j = 0; j ?: 10 %>").output, "10");
    assert_eq!(run("<% j = 5; j ?: 10 %>").output, "5");
}

#[test]
fn test_sets_ignore_order_and_duplicates() {
    assert_eq!(run("<% ##(1, 2) == ##(2, 1) %>").value, Value::Bool(true));
    assert_eq!(run("<% ##(1, 2) == ##(1, 3) %>").value, Value::Bool(false));
    assert_eq!(run("<% ##(1, 1).size() %>").value, Value::Int(1));
    assert_eq!(run("<% s = ##(); s ?: 'empty' %>").output, "empty");
    assert_eq!(run("<% s = ##('x', 'x'); s ? 'full' : 'empty' %>").output, "full");
}

#[test]
fn test_foreach_over_a_huge_range_is_lazy() {
    let invocation = run("<% foreach (i in 0..2000000000 reverse) { return i } %>");
    assert_eq!(invocation.value, Value::Int(2_000_000_000));
    assert_eq!(run("<% foreach (i in 1..3 reverse) { i } %>").output, "321");
    assert_eq!(run("<% foreach (i in 3..1) { i } %>").output, "");
}

#[test]
fn test_three_way_compare_orders_nan_last() {
    let invocation = run_in(
        MergedContext::base_only(),
        "<% template main(double d) %><% d <=> 1.0 %>",
        vec![Value::Double(f64::NAN)],
    );
    assert_eq!(invocation.value, Value::Int(1));
}

#[test]
fn test_null_safe_chain_short_circuits() {
    let invocation = run("<% f = null; f?.toString()?.length() == 0 %>");
    assert_eq!(invocation.value, Value::Bool(true));
}

#[test]
fn test_foreach_over_a_list_literal() {
    let forward = run("<% foreach (x in #('a', 'b', 'c')) { x } %>");
    assert_eq!(forward.output, "abc");
    let backward = run("<% foreach (x in #('a', 'b', 'c') reverse) { x } %>");
    assert_eq!(backward.output, "cba");
}

#[test]
fn test_parameters_flow_into_text() {
    let invocation = run_in(
        MergedContext::base_only(),
        "<% template main(String who, int n) %><% who %> x<% n %>",
        vec![Value::from("Ada"), Value::Int(3)],
    );
    assert_eq!(invocation.output, "Ada x3");
}

#[test]
fn test_one_bad_template_does_not_sink_the_batch() {
    let compiler = Compiler::new(
        MergedContext::base_only(),
        SourceSet::new().with(
            MemorySource::new()
                .with("good", "<% template good() %>fine")
                .with("broken", "<% template broken( %>"),
        ),
        Arc::new(MemoryStore::new()),
    );
    let report = compiler.compile_all(false);
    assert_eq!(report.succeeded, vec!["good"]);
    assert_eq!(report.failed, vec!["broken"]);
    assert_eq!(
        report.diagnostics["broken"][0].kind,
        DiagnosticKind::SyntaxError
    );
    assert!(compiler.unit("good").is_some());
    assert!(compiler.unit("broken").is_none());
}

#[test]
fn test_identical_members_merge_and_conflicts_fail() {
    let greeting = || {
        FnContributor::new().function(
            Signature::new("greeting", vec![], TypeRef::string()),
            |_| Ok(Value::from("hi")),
        )
    };
    let context = MergedContextBuilder::new()
        .contributor("one", greeting())
        .contributor("two", greeting())
        .build()
        .unwrap();
    assert_eq!(context.model().overloads("greeting").len(), 1);

    let clash = FnContributor::new().function(
        Signature::new("greeting", vec![], TypeRef::int()),
        |_| Ok(Value::Int(1)),
    );
    let error = MergedContextBuilder::new()
        .contributor("one", greeting())
        .contributor("two", clash)
        .build()
        .err()
        .unwrap();
    assert!(matches!(error, MergeCollisionError::Member { ref first, ref second, .. }
        if first == "one" && second == "two"));
}

#[test]
fn test_stored_unit_disassembles() {
    let compiler = Compiler::new(
        MergedContext::base_only(),
        SourceSet::new().with(
            MemorySource::new().with("greet", "<% template greet(String name) %>Hello <% name %>!"),
        ),
        Arc::new(MemoryStore::new()),
    );
    compiler.compile_all(false);
    let unit = compiler.unit("greet").unwrap();
    insta::assert_snapshot!(trellis_codegen::disassemble(&unit.name, &unit.payload), @r#"
    template greet(String name) -> String
    locals 2, iterators 0, constants 2
    0000 const #0  ; "Hello "
    0001 emit
    0002 load 0
    0003 dup
    0004 emit
    0005 store 1
    0006 const #1  ; "!"
    0007 emit
    0008 load 1
    0009 return
    "#);
}
