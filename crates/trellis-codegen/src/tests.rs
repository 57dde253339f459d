use std::collections::BTreeSet;

use trellis_context::test_db::TestDatabase;
use trellis_core::unit::Instr;
use trellis_core::{DiagnosticKind, Span, TypeRef};
use trellis_hir::{HirExpr, HirExprKind, HirStmt, HirStmtKind, TypedTemplate};

use crate::errors::CodegenErrorKind;
use crate::{compile_diagnostics, compile_unit, disassemble, lower_template};

fn listing(name: &str, text: &str) -> String {
    let mut db = TestDatabase::default();
    let source = db.template(name, text);
    let compiled = compile_unit(&db, source).expect("template compiles");
    disassemble(&compiled.name, &compiled.payload)
}

#[test]
fn test_text_and_result_slot() {
    insta::assert_snapshot!(listing("greet", "<% template greet(String name) %>Hello <% name %>!"), @r#"
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

#[test]
fn test_null_safe_chain_jumps_to_zero() {
    insta::assert_snapshot!(listing("chain", "<% f = null; f?.toString()?.length() == 0 %>"), @r#"
    template chain() -> Boolean
    locals 2, iterators 0, constants 3
    0000 null
    0001 store 0
    0002 load 0
    0003 jump_if_null 8
    0004 invoke_method #0 0  ; Object.toString(): String
    0005 jump_if_null 8
    0006 invoke_method #1 0  ; String.length(): int
    0007 jump 10
    0008 pop
    0009 const #2  ; 0
    0010 const #2  ; 0
    0011 cmp eq
    0012 dup
    0013 emit
    0014 box boolean
    0015 store 1
    0016 load 1
    0017 return
    "#);
}

#[test]
fn test_reverse_foreach_loop() {
    let text = "<% template list(List<String> items) %><% foreach (item in items reverse) { if (item) { item } } %>";
    insta::assert_snapshot!(listing("list", text), @r#"
    template list(List<String> items) -> void
    locals 2, iterators 1, constants 0
    0000 load 0
    0001 iter_init 0 reverse
    0002 iter_next 0 9
    0003 store 1
    0004 load 1
    0005 jump_if_false 8
    0006 load 1
    0007 emit
    0008 jump 2
    0009 null
    0010 return
    "#);
}

#[test]
fn test_foreach_over_a_range_does_not_build_a_list() {
    let mut db = TestDatabase::default();
    let source = db.template("count", "<% foreach (i in 1..3 reverse) { i } %>");
    let compiled = compile_unit(&db, source).expect("template compiles");
    let code = &compiled.payload.code;
    assert!(
        code.iter()
            .any(|instr| matches!(instr, Instr::IterRange { reverse: true, .. }))
    );
    assert!(
        !code
            .iter()
            .any(|instr| matches!(instr, Instr::Range | Instr::IterInit { .. }))
    );
}

#[test]
fn test_variadic_tail_is_packed() {
    let mut db = TestDatabase::default();
    let source = db.template("joined", "<% join(', ', 1, 'b') %>");
    let compiled = compile_unit(&db, source).expect("template compiles");
    let code = &compiled.payload.code;
    let call = code
        .iter()
        .position(|instr| matches!(instr, Instr::InvokeContext { argc: 2, .. }))
        .expect("join is called with two arguments");
    assert!(matches!(code[call - 1], Instr::NewArray { len: 2, .. }));
}

#[test]
fn test_compilation_is_deterministic() {
    let text = "<% template page(String title, List<String> rows) %><h1><% title %></h1>\n\
                <% foreach (row in rows) { %><p><% row + '!' %></p><% } %>\
                <% 'a' & 'a' %>";
    let first = {
        let mut db = TestDatabase::default();
        let source = db.template("page", text);
        compile_unit(&db, source).expect("template compiles")
    };
    let second = {
        let mut db = TestDatabase::default();
        let source = db.template("page", text);
        compile_unit(&db, source).expect("template compiles")
    };
    assert_eq!(first.payload, second.payload);
    let strings = first
        .payload
        .constants
        .iter()
        .filter(|c| matches!(c, trellis_core::unit::Constant::Str(s) if s == "a"))
        .count();
    assert_eq!(strings, 1);
}

#[test]
fn test_failed_analysis_produces_no_unit() {
    let mut db = TestDatabase::default();
    let source = db.template("bad", "<% 1 + true %>");
    assert!(compile_unit(&db, source).is_none());
    let diagnostics = compile_diagnostics(&db, source);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::TypeMismatch);
}

#[test]
fn test_guard_outside_chain_is_rejected() {
    let span = Span::new(3, 8, 1, 4);
    let guard = HirExpr::new(
        HirExprKind::NullGuard(Box::new(HirExpr::new(
            HirExprKind::Null,
            TypeRef::object(),
            span,
        ))),
        TypeRef::object(),
        span,
    );
    let typed = TypedTemplate {
        name: "odd".into(),
        params: Vec::new(),
        returns: TypeRef::void(),
        body: vec![HirStmt {
            kind: HirStmtKind::Expr {
                expr: guard,
                emit: true,
                result: None,
            },
            span,
        }],
        result_slot: None,
        locals: 0,
        iterators: 0,
        dependencies: BTreeSet::new(),
    };
    let error = lower_template(&typed).unwrap_err();
    assert_eq!(error.kind, CodegenErrorKind::GuardOutsideChain);
    assert_eq!(error.span, span);
}
