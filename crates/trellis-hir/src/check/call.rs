//! Calls, member access and null-safe chains.

use trellis_ast::{Expr, ExprKind, find_template, template_header};
use trellis_context::{OverloadResolver, Resolved};
use trellis_core::unit::{Constant, MemberRef, MethodRef};
use trellis_core::{Dependency, Signature, Span, TypeArg, TypeRef};

use super::{Checker, is_poison, poison_type};
use crate::error::ResolveError;
use crate::hir::{HirExpr, HirExprKind};

fn postfix_kind(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Call { target: Some(_), .. } | ExprKind::Property { .. } | ExprKind::Index { .. }
    )
}

/// Whether any access along the left spine of `expr` is null-safe.
fn has_null_safe_link(expr: &Expr) -> bool {
    let mut current = expr;
    loop {
        if current.is_null_safe() {
            return true;
        }
        current = match &current.kind {
            ExprKind::Call {
                target: Some(target),
                ..
            }
            | ExprKind::Property { target, .. }
            | ExprKind::Index { target, .. } => target,
            _ => return false,
        };
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Checker<'_> {
    /// Entry point for method calls, property reads and indexing.
    pub(crate) fn postfix(&mut self, expr: &Expr) -> HirExpr {
        if !has_null_safe_link(expr) {
            return self.spine(expr);
        }
        let body = self.spine(expr);
        if is_poison(&body.ty) {
            return body;
        }
        let ty = body.ty.clone();
        let zero = ty.as_primitive().and_then(Constant::zero);
        let span = body.span;
        HirExpr::new(
            HirExprKind::NullChain {
                body: Box::new(body),
                zero,
            },
            ty,
            span,
        )
    }

    fn spine(&mut self, expr: &Expr) -> HirExpr {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Call {
                target: Some(target),
                name,
                args,
                null_safe,
            } => {
                if let ExprKind::Ident(qualifier) = &target.kind
                    && !*null_safe
                    && self.scopes.lookup(qualifier).is_none()
                    && self.model.is_contributor(qualifier)
                {
                    return self.context_call(Some(qualifier.as_str()), name, args, span);
                }
                let receiver = self.receiver(target, *null_safe);
                let args = self.args(args);
                self.method_call(receiver, name, args, span)
            }
            ExprKind::Property {
                target,
                name,
                null_safe,
            } => {
                let receiver = self.receiver(target, *null_safe);
                self.property(receiver, name, span)
            }
            ExprKind::Index {
                target,
                index,
                null_safe,
            } => {
                let receiver = self.receiver(target, *null_safe);
                let index = self.expr(index);
                self.index(receiver, index, span)
            }
            _ => self.expr(expr),
        }
    }

    fn receiver(&mut self, target: &Expr, null_safe: bool) -> HirExpr {
        let receiver = if postfix_kind(target) {
            self.spine(target)
        } else {
            self.expr(target)
        };
        if !null_safe || is_poison(&receiver.ty) {
            return receiver;
        }
        let (ty, span) = (receiver.ty.clone(), receiver.span);
        HirExpr::new(HirExprKind::NullGuard(Box::new(receiver)), ty, span)
    }

    fn args(&mut self, args: &[Expr]) -> Vec<HirExpr> {
        args.iter().map(|arg| self.expr(arg)).collect()
    }

    /// Convert arguments as the resolved overload requires, packing a
    /// variadic tail into an array.
    fn apply(&mut self, resolved: &Resolved, args: Vec<HirExpr>) -> Vec<HirExpr> {
        let mut converted: Vec<HirExpr> = args
            .into_iter()
            .zip(resolved.params.iter().zip(&resolved.coercions))
            .map(|(arg, (param, conversions))| arg.convert(conversions.clone(), param.clone()))
            .collect();
        if let Some((at, element)) = &resolved.spread {
            let items = converted.split_off(*at);
            let span = items
                .iter()
                .map(|item| item.span)
                .reduce(Span::to)
                .unwrap_or_default();
            converted.push(HirExpr::new(
                HirExprKind::NewArray {
                    elem: element.clone(),
                    items,
                },
                TypeRef::array(element.clone()),
                span,
            ));
        }
        converted
    }

    fn void_argument(&mut self, args: &[HirExpr]) -> Option<HirExpr> {
        let span = args.iter().find(|arg| arg.ty.is_void())?.span;
        Some(self.report(
            span,
            ResolveError::TypeMismatch("a `void` call cannot be an argument".into()),
        ))
    }

    /// `name(args)` or `contributor.name(args)`.
    pub(crate) fn context_call(
        &mut self,
        qualifier: Option<&str>,
        name: &str,
        args: &[Expr],
        span: Span,
    ) -> HirExpr {
        let args = self.args(args);
        self.dependencies.insert(Dependency::Member {
            contributor: qualifier.map(str::to_string),
            name: name.to_string(),
        });
        let model = self.model;
        let candidates: Vec<&Signature> = match qualifier {
            Some(contributor) => model
                .contributor_overloads(contributor, name)
                .iter()
                .collect(),
            None => model
                .overloads(name)
                .iter()
                .map(|member| &member.signature)
                .collect(),
        };
        if candidates.is_empty() {
            let message = match qualifier {
                Some(contributor) => format!("contributor `{contributor}` has no member `{name}`"),
                None => format!("unknown function `{name}`"),
            };
            return self.report(span, ResolveError::UnresolvedSymbol(message));
        }
        if args.iter().any(|arg| is_poison(&arg.ty)) {
            return HirExpr::new(HirExprKind::Null, poison_type(), span);
        }
        if let Some(poisoned) = self.void_argument(&args) {
            return poisoned;
        }
        let arg_types: Vec<TypeRef> = args.iter().map(|arg| arg.ty.clone()).collect();
        let resolved = match OverloadResolver::new(self.classes).resolve(&candidates, &arg_types) {
            Ok(resolved) => resolved,
            Err(error) => return self.report(span, error.into()),
        };
        let member = MemberRef {
            contributor: qualifier.map(str::to_string),
            signature: candidates[resolved.index].clone(),
        };
        let args = self.apply(&resolved, args);
        HirExpr::new(
            HirExprKind::InvokeContext { member, args },
            resolved.returns,
            span,
        )
    }

    fn method_call(&mut self, receiver: HirExpr, name: &str, args: Vec<HirExpr>, span: Span) -> HirExpr {
        if is_poison(&receiver.ty) || args.iter().any(|arg| is_poison(&arg.ty)) {
            return HirExpr::new(HirExprKind::Null, poison_type(), span);
        }
        if receiver.ty.is_null() || receiver.ty.is_void() {
            let message = format!("cannot call `{name}` on a value of type `{}`", receiver.ty);
            return self.report(span, ResolveError::TypeMismatch(message));
        }
        if let Some(poisoned) = self.void_argument(&args) {
            return poisoned;
        }
        let found = self.classes.methods(&receiver.ty, name);
        if found.is_empty() {
            let message = format!("type `{}` has no method `{name}`", receiver.ty);
            return self.report(span, ResolveError::UnresolvedSymbol(message));
        }
        let signatures: Vec<&Signature> = found.iter().map(|c| &c.signature).collect();
        let arg_types: Vec<TypeRef> = args.iter().map(|arg| arg.ty.clone()).collect();
        let resolved = match OverloadResolver::new(self.classes).resolve(&signatures, &arg_types) {
            Ok(resolved) => resolved,
            Err(error) => return self.report(span, error.into()),
        };
        let chosen = &found[resolved.index];
        let method = MethodRef {
            owner: chosen.owner.clone(),
            signature: chosen.declared.clone(),
        };
        let receiver = self.box_primitive(receiver);
        let args = self.apply(&resolved, args);
        HirExpr::new(
            HirExprKind::InvokeMethod {
                method,
                receiver: Box::new(receiver),
                args,
            },
            resolved.returns,
            span,
        )
    }

    /// `e.name`: array `length`, or a `getName()` / `isName()` getter.
    fn property(&mut self, receiver: HirExpr, name: &str, span: Span) -> HirExpr {
        if is_poison(&receiver.ty) {
            return receiver;
        }
        if matches!(receiver.ty, TypeRef::Array(_)) && name == "length" {
            return HirExpr::new(
                HirExprKind::ArrayLength(Box::new(receiver)),
                TypeRef::int(),
                span,
            );
        }
        if !receiver.ty.is_null() && !receiver.ty.is_void() {
            let capitalized = capitalize(name);
            for getter in [format!("get{capitalized}"), format!("is{capitalized}")] {
                let has_getter = self
                    .classes
                    .methods(&receiver.ty, &getter)
                    .iter()
                    .any(|candidate| candidate.signature.params.is_empty());
                if has_getter {
                    return self.method_call(receiver, &getter, Vec::new(), span);
                }
            }
        }
        let message = format!("type `{}` has no property `{name}`", receiver.ty);
        self.report(span, ResolveError::UnresolvedSymbol(message))
    }

    fn index(&mut self, target: HirExpr, index: HirExpr, span: Span) -> HirExpr {
        if is_poison(&target.ty) || is_poison(&index.ty) {
            return HirExpr::new(HirExprKind::Null, poison_type(), span);
        }
        let element = match &target.ty {
            TypeRef::Array(elem) => Some((**elem).clone()),
            ty => self.classes.as_super(ty, "List").map(|list| {
                list.type_args()
                    .first()
                    .map_or_else(TypeRef::object, TypeArg::upper_bound)
            }),
        };
        let Some(element) = element else {
            let message = format!("cannot index into a value of type `{}`", target.ty);
            return self.report(span, ResolveError::TypeMismatch(message));
        };
        let index = self.coerce_to(index, &TypeRef::int(), "an index");
        HirExpr::new(
            HirExprKind::Index {
                target: Box::new(target),
                index: Box::new(index),
            },
            element,
            span,
        )
    }

    /// `call name(args)`: checked against the callee's header only.
    pub(crate) fn template_call(&mut self, name: &str, args: &[Expr], span: Span) -> HirExpr {
        let args = self.args(args);
        self.dependencies
            .insert(Dependency::Template(name.to_string()));
        let Some(source) = find_template(self.db, name) else {
            let message = format!("unknown template `{name}`");
            return self.report(span, ResolveError::UnresolvedSymbol(message));
        };
        let Some(header) = template_header(self.db, source) else {
            let message = format!("template `{name}` cannot be called: its header does not parse");
            return self.report(span, ResolveError::UnresolvedSymbol(message));
        };
        if args.len() != header.params.len() {
            let message = format!(
                "template `{name}` takes {} argument(s) but {} were given",
                header.params.len(),
                args.len()
            );
            return self.report(span, ResolveError::TypeMismatch(message));
        }
        let args = args
            .into_iter()
            .zip(&header.params)
            .map(|(arg, param)| {
                let what = format!("parameter `{}` of template `{name}`", param.name);
                self.coerce_to(arg, &param.ty, &what)
            })
            .collect();
        HirExpr::new(
            HirExprKind::CallTemplate {
                name: name.to_string(),
                args,
            },
            TypeRef::object(),
            span,
        )
    }
}
