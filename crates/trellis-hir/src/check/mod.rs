//! Semantic analysis: name resolution, type checking and overload
//! resolution, producing a [`TypedTemplate`].
//!
//! Errors are collected rather than returned, so one pass reports every
//! problem in a template. An expression that failed to check gets the
//! poison type, and operations on poisoned operands report nothing further.

mod call;
mod expr;

use std::collections::BTreeSet;

use trellis_ast::{Block, Stmt, StmtKind, TemplateDecl};
use trellis_context::{ClassTable, ContextModel, Db};
use trellis_core::unit::{Conversion, Param};
use trellis_core::{
    CompilationPhase, Dependency, Diagnostic, DiagnosticKind, Span, TypeRef,
};

use crate::error::ResolveError;
use crate::hir::{HirExpr, HirExprKind, HirStmt, HirStmtKind, TypedTemplate};
use crate::scope::Scopes;

const POISON: &str = "{error}";

fn poison_type() -> TypeRef {
    TypeRef::var(POISON)
}

pub(crate) fn is_poison(ty: &TypeRef) -> bool {
    matches!(ty, TypeRef::Var(name) if name == POISON)
}

pub struct Checker<'a> {
    db: &'a dyn Db,
    template: String,
    classes: &'a ClassTable,
    model: &'a ContextModel,
    scopes: Scopes,
    diagnostics: Vec<Diagnostic>,
    dependencies: BTreeSet<Dependency>,
    /// Static types of every expression that can become the result value.
    results: Vec<TypeRef>,
}

impl<'a> Checker<'a> {
    pub fn new(db: &'a dyn Db, template: impl Into<String>) -> Self {
        let model = db.context().model();
        Self {
            db,
            template: template.into(),
            classes: model.classes(),
            model,
            scopes: Scopes::default(),
            diagnostics: Vec::new(),
            dependencies: BTreeSet::new(),
            results: Vec::new(),
        }
    }

    /// Check a whole template. The result is only meaningful when none of the
    /// returned diagnostics is an error.
    pub fn check(mut self, decl: &TemplateDecl) -> (TypedTemplate, Vec<Diagnostic>) {
        self.scopes = Scopes::with_params([]);
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let ty = self.declared_type(&param.ty, param.span);
            if param.ty.is_void() {
                self.report(
                    param.span,
                    ResolveError::TypeMismatch(format!(
                        "parameter `{}` cannot have type `void`",
                        param.name
                    )),
                );
            }
            if params.iter().any(|p: &Param| p.name == param.name) {
                self.report(
                    param.span,
                    ResolveError::TypeMismatch(format!("duplicate parameter `{}`", param.name)),
                );
            }
            self.scopes.declare(&param.name, ty);
            params.push(Param {
                name: param.name.clone(),
                ty: param.ty.clone(),
            });
        }

        let result_index = decl
            .body
            .iter()
            .rposition(|stmt| matches!(stmt.kind, StmtKind::Expr(_)));
        let mut result_slot = None;
        self.scopes.push();
        let mut body = Vec::with_capacity(decl.body.len());
        let mut returned = false;
        for (index, stmt) in decl.body.iter().enumerate() {
            self.check_reachable(&mut returned, stmt);
            let mut checked = self.stmt(stmt);
            if Some(index) == result_index {
                if let HirStmtKind::Expr { expr, result, .. } = &mut checked.kind {
                    if !expr.ty.is_void() && !is_poison(&expr.ty) {
                        self.results.push(expr.ty.clone());
                        *result = Some(Vec::new());
                        result_slot = Some(self.scopes.fresh_slot());
                    }
                }
            }
            body.push(checked);
        }
        self.scopes.pop();

        let join = self.result_join();
        let returns = match &join {
            None => TypeRef::void(),
            Some(TypeRef::Null) => TypeRef::object(),
            Some(ty) => ty.boxed(),
        };
        if let Some(join) = &join {
            self.patch_results(&mut body, join);
        }

        let typed = TypedTemplate {
            name: self.template.clone(),
            params,
            returns,
            body,
            result_slot,
            locals: self.scopes.locals(),
            iterators: self.scopes.iterators(),
            dependencies: std::mem::take(&mut self.dependencies),
        };
        (typed, self.diagnostics)
    }

    // ---- diagnostics ----

    fn report(&mut self, span: Span, error: ResolveError) -> HirExpr {
        self.diagnostics.push(Diagnostic::error(
            self.template.as_str(),
            error.kind(),
            CompilationPhase::Analysis,
            span,
            error.to_string(),
        ));
        HirExpr::new(HirExprKind::Null, poison_type(), span)
    }

    fn check_reachable(&mut self, returned: &mut bool, stmt: &Stmt) {
        if !*returned {
            *returned = matches!(stmt.kind, StmtKind::Return(_));
            return;
        }
        if matches!(&stmt.kind, StmtKind::Text(text) if text.trim().is_empty()) {
            return;
        }
        self.diagnostics.push(Diagnostic::warning(
            self.template.as_str(),
            DiagnosticKind::UnreachableCode,
            CompilationPhase::Analysis,
            stmt.span,
            "unreachable code after `return`",
        ));
        // One warning per block.
        *returned = false;
    }

    /// A type written in the source, checked against the class table.
    fn declared_type(&mut self, ty: &TypeRef, span: Span) -> TypeRef {
        match self.classes.validate(ty) {
            Ok(()) => ty.clone(),
            Err(reason) => {
                self.report(span, ResolveError::UnresolvedSymbol(reason));
                poison_type()
            }
        }
    }

    // ---- statements ----

    fn stmts(&mut self, stmts: &[Stmt]) -> Vec<HirStmt> {
        let mut returned = false;
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.check_reachable(&mut returned, stmt);
            out.push(self.stmt(stmt));
        }
        out
    }

    fn block(&mut self, block: &Block) -> Vec<HirStmt> {
        self.scopes.push();
        let stmts = self.stmts(&block.stmts);
        self.scopes.pop();
        stmts
    }

    fn stmt(&mut self, stmt: &Stmt) -> HirStmt {
        let kind = match &stmt.kind {
            StmtKind::Text(text) => HirStmtKind::Text(text.clone()),
            StmtKind::Expr(expr) => {
                let emit = !matches!(expr.kind, trellis_ast::ExprKind::TemplateCall { .. });
                HirStmtKind::Expr {
                    expr: self.expr(expr),
                    emit,
                    result: None,
                }
            }
            StmtKind::Assign { name, value } => self.assign(name, value, stmt.span),
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.condition(cond);
                let then = self.block(then);
                let otherwise = otherwise
                    .as_ref()
                    .map(|block| self.block(block))
                    .unwrap_or_default();
                HirStmtKind::If {
                    cond,
                    then,
                    otherwise,
                }
            }
            StmtKind::Foreach {
                var,
                iterable,
                reverse,
                body,
            } => {
                let iterable = self.expr(iterable);
                let element = if is_poison(&iterable.ty) {
                    poison_type()
                } else if let Some(element) = self.classes.element_type(&iterable.ty) {
                    element
                } else {
                    self.report(
                        iterable.span,
                        ResolveError::TypeMismatch(format!(
                            "cannot iterate over a value of type `{}`",
                            iterable.ty
                        )),
                    );
                    poison_type()
                };
                let iterator = self.scopes.enter_loop();
                self.scopes.push();
                let slot = self.scopes.declare(var, element);
                let body = self.stmts(&body.stmts);
                self.scopes.pop();
                self.scopes.exit_loop();
                HirStmtKind::Foreach {
                    slot,
                    iterator,
                    iterable,
                    reverse: *reverse,
                    body,
                }
            }
            StmtKind::Return(value) => {
                let value = value.as_ref().map(|value| self.expr(value));
                if let Some(value) = &value {
                    if value.ty.is_void() {
                        self.report(
                            value.span,
                            ResolveError::TypeMismatch(
                                "cannot return the result of a `void` call".into(),
                            ),
                        );
                    } else if !is_poison(&value.ty) {
                        self.results.push(value.ty.clone());
                    }
                }
                HirStmtKind::Return(value)
            }
            StmtKind::Block(block) => HirStmtKind::Block(self.block(block)),
        };
        HirStmt {
            kind,
            span: stmt.span,
        }
    }

    fn assign(&mut self, name: &str, value: &trellis_ast::Expr, span: Span) -> HirStmtKind {
        let value = self.expr(value);
        if let Some(local) = self.scopes.lookup(name).cloned() {
            if is_poison(&value.ty) || is_poison(&local.ty) {
                return HirStmtKind::Store {
                    slot: local.slot,
                    value,
                };
            }
            return match self.classes.coerce(&value.ty, &local.ty) {
                Some(coercion) => HirStmtKind::Store {
                    slot: local.slot,
                    value: value.convert(coercion.conversions, local.ty),
                },
                None => {
                    let value = self.report(
                        span,
                        ResolveError::TypeMismatch(format!(
                            "cannot assign a value of type `{}` to `{name}` of type `{}`",
                            value.ty, local.ty
                        )),
                    );
                    HirStmtKind::Store {
                        slot: local.slot,
                        value,
                    }
                }
            };
        }
        let ty = match &value.ty {
            TypeRef::Null => TypeRef::object(),
            ty if ty.is_void() => {
                self.report(
                    span,
                    ResolveError::TypeMismatch(format!(
                        "cannot assign the result of a `void` call to `{name}`"
                    )),
                );
                poison_type()
            }
            ty => ty.clone(),
        };
        let slot = self.scopes.declare(name, ty.clone());
        HirStmtKind::Store {
            slot,
            value: HirExpr { ty, ..value },
        }
    }

    /// An expression used for its truthiness.
    fn condition(&mut self, expr: &trellis_ast::Expr) -> HirExpr {
        let checked = self.expr(expr);
        if checked.ty.is_void() {
            return self.report(
                checked.span,
                ResolveError::TypeMismatch("a `void` call has no truth value".into()),
            );
        }
        checked
    }

    // ---- result value ----

    fn result_join(&mut self) -> Option<TypeRef> {
        let mut types = std::mem::take(&mut self.results).into_iter();
        let first = types.next()?;
        Some(types.fold(first, |acc, ty| {
            self.classes
                .common_supertype(&acc, &ty)
                .unwrap_or_else(TypeRef::object)
        }))
    }

    /// Conversions from a result expression of type `from` to the return
    /// type, given the unboxed join of all result types.
    fn result_conversions(&self, from: &TypeRef, join: &TypeRef) -> Vec<Conversion> {
        let mut conversions = self
            .classes
            .coerce(from, join)
            .map(|c| c.conversions)
            .unwrap_or_default();
        if let Some(p) = join.as_primitive() {
            conversions.push(Conversion::Box(p));
        }
        conversions
    }

    fn patch_results(&self, stmts: &mut [HirStmt], join: &TypeRef) {
        let returns = match join {
            TypeRef::Null => TypeRef::object(),
            ty => ty.boxed(),
        };
        for stmt in stmts {
            match &mut stmt.kind {
                HirStmtKind::Return(Some(value)) => {
                    let conversions = self.result_conversions(&value.ty, join);
                    let placeholder = HirExpr::new(HirExprKind::Null, TypeRef::Null, value.span);
                    let taken = std::mem::replace(value, placeholder);
                    *value = taken.convert(conversions, returns.clone());
                }
                HirStmtKind::Expr {
                    expr,
                    result: Some(conversions),
                    ..
                } => {
                    *conversions = self.result_conversions(&expr.ty, join);
                }
                HirStmtKind::If { then, otherwise, .. } => {
                    self.patch_results(then, join);
                    self.patch_results(otherwise, join);
                }
                HirStmtKind::Foreach { body, .. } | HirStmtKind::Block(body) => {
                    self.patch_results(body, join);
                }
                _ => {}
            }
        }
    }
}
