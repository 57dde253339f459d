use std::sync::Arc;

use salsa::Accumulator;
use tracing::debug;
use trellis_ast::parse_template;
use trellis_context::Db;
use trellis_core::{Diagnostic, SourceTemplate};

use crate::check::Checker;
use crate::hir::TypedTemplate;

/// Resolve and type-check a template.
///
/// `None` when the template failed to parse or any analysis error was
/// reported; warnings do not prevent a result.
#[salsa::tracked]
pub fn check_template(db: &dyn Db, source: SourceTemplate) -> Option<Arc<TypedTemplate>> {
    let decl = parse_template(db, source)?;
    let (typed, diagnostics) = Checker::new(db, decl.name.as_str()).check(&decl);
    let failed = diagnostics.iter().any(Diagnostic::is_error);
    debug!(
        template = %decl.name,
        diagnostics = diagnostics.len(),
        failed,
        "checked template"
    );
    for diagnostic in diagnostics {
        diagnostic.accumulate(db);
    }
    (!failed).then(|| Arc::new(typed))
}

/// Every diagnostic from parsing and analysing `source`.
#[salsa::tracked]
pub fn analysis_diagnostics(db: &dyn Db, source: SourceTemplate) -> Vec<Diagnostic> {
    let _ = check_template(db, source);
    check_template::accumulated::<Diagnostic>(db, source)
        .into_iter()
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{HirExpr, HirExprKind, HirStmtKind};
    use trellis_context::test_db::TestDatabase;
    use trellis_context::{FnContributor, MergedContextBuilder};
    use trellis_core::{Dependency, DiagnosticKind, Severity, Signature, TypeRef, Value};

    fn messages(db: &TestDatabase, source: SourceTemplate) -> Vec<String> {
        analysis_diagnostics(db, source)
            .iter()
            .map(|d| format!("{:?}/{:?}: {}", d.severity, d.kind, d.message))
            .collect()
    }

    fn result_expr(typed: &TypedTemplate) -> &HirExpr {
        typed
            .body
            .iter()
            .rev()
            .find_map(|stmt| match &stmt.kind {
                HirStmtKind::Expr {
                    expr,
                    result: Some(_),
                    ..
                } => Some(expr),
                _ => None,
            })
            .expect("template has a result expression")
    }

    fn host_context() -> trellis_context::MergedContext {
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
            )
            .function(
                Signature::new(
                    "pick",
                    vec![TypeRef::long(), TypeRef::class("Integer")],
                    TypeRef::int(),
                ),
                |_| Ok(Value::Int(1)),
            )
            .function(
                Signature::new(
                    "pick",
                    vec![TypeRef::class("Integer"), TypeRef::long()],
                    TypeRef::int(),
                ),
                |_| Ok(Value::Int(2)),
            );
        MergedContextBuilder::new()
            .contributor("host", host)
            .build()
            .unwrap()
    }

    #[test]
    fn test_ternary_result_is_string() {
        let mut db = TestDatabase::default();
        let source = db.template("flag", "<% a = false; a ? 'true' : 'false' %>");
        let typed = check_template(&db, source).expect("template checks");
        assert_eq!(typed.returns, TypeRef::string());
        assert!(typed.params.is_empty());
        assert!(typed.result_slot.is_some());
        assert!(messages(&db, source).is_empty());
    }

    #[test]
    fn test_result_join_is_boxed() {
        let mut db = TestDatabase::default();
        let source = db.template(
            "count",
            "<% template count(boolean big) %><% if (big) { return 10L } %><% 1 %>",
        );
        let typed = check_template(&db, source).expect("template checks");
        assert_eq!(typed.returns, TypeRef::class("Long"));
    }

    #[test]
    fn test_fixed_arity_overload_beats_varargs() {
        let mut db = TestDatabase::new(host_context());
        let source = db.template(
            "host",
            "<% test1 = 'a'; test2 = 2; doSomething(test1, test2) %>",
        );
        let typed = check_template(&db, source).expect("template checks");
        let HirExprKind::InvokeContext { member, args } = &result_expr(&typed).kind else {
            panic!("expected a context call");
        };
        assert!(!member.signature.variadic);
        assert_eq!(member.signature.params.len(), 2);
        assert_eq!(args.len(), 2);
        assert!(typed.dependencies.contains(&Dependency::Member {
            contributor: None,
            name: "doSomething".into(),
        }));
    }

    #[test]
    fn test_single_argument_packs_into_varargs() {
        let mut db = TestDatabase::new(host_context());
        let source = db.template("host", "<% doSomething(1) %>");
        let typed = check_template(&db, source).expect("template checks");
        let HirExprKind::InvokeContext { member, args } = &result_expr(&typed).kind else {
            panic!("expected a context call");
        };
        assert!(member.signature.variadic);
        assert!(matches!(
            &args[..],
            [HirExpr {
                kind: HirExprKind::NewArray { items, .. },
                ..
            }] if items.len() == 1
        ));
    }

    #[test]
    fn test_mixed_widening_and_boxing_is_ambiguous() {
        let mut db = TestDatabase::new(host_context());
        let source = db.template("tie", "<% pick(1, 2) %>");
        assert!(check_template(&db, source).is_none());
        let diagnostics = analysis_diagnostics(&db, source);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::AmbiguousCall);
        assert!(diagnostics[0].message.contains("pick"));
    }

    #[test]
    fn test_errors_do_not_cascade() {
        let mut db = TestDatabase::default();
        let source = db.template("broken", "<% x = missing(1); x.foo() + 2 %>");
        assert!(check_template(&db, source).is_none());
        assert_eq!(
            messages(&db, source),
            vec!["Error/UnresolvedSymbol: unknown function `missing`".to_string()]
        );
    }

    #[test]
    fn test_method_and_property_errors() {
        let mut db = TestDatabase::default();
        let source = db.template(
            "members",
            "<% s = 'abc'; s.shout(); s.color; 1 < 'x' %>",
        );
        assert_eq!(
            messages(&db, source),
            vec![
                "Error/UnresolvedSymbol: type `String` has no method `shout`".to_string(),
                "Error/UnresolvedSymbol: type `String` has no property `color`".to_string(),
                "Error/TypeMismatch: values of type `int` and `String` cannot be ordered"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_statement_after_return_warns_once() {
        let mut db = TestDatabase::default();
        let source = db.template("early", "<% return 1; 2; 3 %>");
        let typed = check_template(&db, source).expect("warnings do not block");
        assert_eq!(typed.returns, TypeRef::class("Integer"));
        let diagnostics = analysis_diagnostics(&db, source);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UnreachableCode);
    }

    #[test]
    fn test_null_safe_chain_types() {
        let mut db = TestDatabase::default();
        let source = db.template("chain", "<% f = null; f?.toString()?.length() == 0 %>");
        let typed = check_template(&db, source).expect("template checks");
        assert_eq!(typed.returns, TypeRef::class("Boolean"));
        let HirExprKind::Compare { lhs, .. } = &result_expr(&typed).kind else {
            panic!("expected a comparison");
        };
        assert!(matches!(
            &lhs.kind,
            HirExprKind::NullChain {
                zero: Some(trellis_core::unit::Constant::Int(0)),
                ..
            }
        ));
    }

    #[test]
    fn test_template_call_checks_callee_header() {
        let mut db = TestDatabase::default();
        db.template("parts/header", "<% template header(String title) %><h1><% title %></h1>");
        let source = db.template("page", "<% call parts/header(1) %>");
        assert_eq!(
            messages(&db, source),
            vec![
                "Error/TypeMismatch: parameter `title` of template `parts/header` expects `String`, found `int`"
                    .to_string()
            ]
        );

        let source = db.template("page", "<% call parts/header('Home') %>");
        let typed = check_template(&db, source).expect("template checks");
        assert_eq!(typed.returns, TypeRef::object());
        assert!(
            typed
                .dependencies
                .contains(&Dependency::Template("parts/header".into()))
        );
    }

    #[test]
    fn test_callee_errors_stay_with_the_callee() {
        let mut db = TestDatabase::default();
        db.template("bad", "<% template bad(int n) %><% n + %>");
        let source = db.template("caller", "<% call bad(1) %>");
        assert!(check_template(&db, source).is_some());
        assert!(messages(&db, source).is_empty());
    }

    #[test]
    fn test_foreach_binds_element_type() {
        let mut db = TestDatabase::default();
        let source = db.template(
            "loop",
            "<% template loop(List<String> items) %><% foreach (item in items) { item.length() } %>",
        );
        let typed = check_template(&db, source).expect("template checks");
        assert_eq!(typed.iterators, 1);
        assert_eq!(typed.returns, TypeRef::void());
        assert_eq!(typed.locals, 2);
    }
}
