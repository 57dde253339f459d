//! Expressions and operators.

use trellis_ast::{BinaryOp, Expr, ExprKind, Literal, UnaryOp};
use trellis_core::unit::{ArithOp, CompareOp, Constant, Conversion};
use trellis_core::{Primitive, Span, TypeRef};

use super::{Checker, is_poison, poison_type};
use crate::error::ResolveError;
use crate::hir::{HirExpr, HirExprKind};

fn boxed(expr: HirExpr) -> Box<HirExpr> {
    Box::new(expr)
}

impl Checker<'_> {
    pub(crate) fn expr(&mut self, expr: &Expr) -> HirExpr {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Literal(literal) => literal_expr(literal, span),
            ExprKind::Ident(name) => match self.scopes.lookup(name) {
                Some(local) => HirExpr::new(HirExprKind::Local(local.slot), local.ty.clone(), span),
                None => self.report(
                    span,
                    ResolveError::UnresolvedSymbol(format!("unknown variable `{name}`")),
                ),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs);
                let rhs = self.expr(rhs);
                self.binary(*op, lhs, rhs, span)
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.expr(operand);
                self.unary(*op, operand, span)
            }
            ExprKind::Call { target: None, name, args, .. } => self.context_call(None, name, args, span),
            ExprKind::Call { .. } | ExprKind::Property { .. } | ExprKind::Index { .. } => {
                self.postfix(expr)
            }
            ExprKind::TemplateCall { name, args } => self.template_call(name, args, span),
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.condition(cond);
                let then = self.expr(then);
                let otherwise = self.expr(otherwise);
                self.branches("?:", cond.ty.clone(), then, otherwise, span, |then, otherwise| {
                    HirExprKind::Ternary {
                        cond: boxed(cond),
                        then,
                        otherwise,
                    }
                })
            }
            ExprKind::Elvis { lhs, rhs } => {
                let lhs = self.condition(lhs);
                let rhs = self.expr(rhs);
                self.branches("?:", TypeRef::boolean(), lhs, rhs, span, HirExprKind::Elvis)
            }
            ExprKind::Coalesce { lhs, rhs } => {
                let lhs = self.expr(lhs);
                let rhs = self.expr(rhs);
                self.branches("??", TypeRef::boolean(), lhs, rhs, span, HirExprKind::Coalesce)
            }
            ExprKind::List(items) => self.collection(items, "List", span),
            ExprKind::Set(items) => self.collection(items, "Set", span),
            ExprKind::Cast { expr, ty } => {
                let operand = self.expr(expr);
                self.cast(operand, ty, span)
            }
            ExprKind::TypeTest { expr, ty } => {
                let operand = self.expr(expr);
                self.type_test(operand, ty, span)
            }
            ExprKind::Compare3 { lhs, rhs } => {
                let lhs = self.expr(lhs);
                let rhs = self.expr(rhs);
                self.compare3(lhs, rhs, span)
            }
        }
    }

    fn mismatch(&mut self, span: Span, message: String) -> HirExpr {
        self.report(span, ResolveError::TypeMismatch(message))
    }

    fn operator_mismatch(&mut self, symbol: &str, lhs: &TypeRef, rhs: &TypeRef, span: Span) -> HirExpr {
        self.mismatch(
            span,
            format!("operator `{symbol}` cannot be applied to `{lhs}` and `{rhs}`"),
        )
    }

    /// Convert `expr` to `target`, which must be reachable by an implicit
    /// conversion.
    pub(crate) fn coerce_to(&mut self, expr: HirExpr, target: &TypeRef, what: &str) -> HirExpr {
        if is_poison(&expr.ty) || is_poison(target) {
            return expr;
        }
        match self.classes.coerce(&expr.ty, target) {
            Some(coercion) => expr.convert(coercion.conversions, target.clone()),
            None => {
                let message = format!("{what} expects `{target}`, found `{}`", expr.ty);
                self.mismatch(expr.span, message)
            }
        }
    }

    /// Convert `expr` to a join computed by `common_supertype`, boxing when
    /// `box_primitive` is set and the join is primitive.
    fn to_join(&self, expr: HirExpr, join: &TypeRef, box_primitive: bool) -> HirExpr {
        let mut conversions = self
            .classes
            .coerce(&expr.ty, join)
            .map(|c| c.conversions)
            .unwrap_or_default();
        let mut ty = join.clone();
        if box_primitive && let Some(p) = join.as_primitive() {
            conversions.push(Conversion::Box(p));
            ty = join.boxed();
        }
        expr.convert(conversions, ty)
    }

    /// Both operands as the promoted numeric primitive, when both are numeric.
    fn numeric_pair(&self, lhs: &HirExpr, rhs: &HirExpr) -> Option<Primitive> {
        lhs.ty.numeric()?.promote(rhs.ty.numeric()?)
    }

    fn to_primitive(&self, expr: HirExpr, prim: Primitive) -> HirExpr {
        let target = TypeRef::Primitive(prim);
        let conversions = self
            .classes
            .coerce(&expr.ty, &target)
            .map(|c| c.conversions)
            .unwrap_or_default();
        expr.convert(conversions, target)
    }

    fn binary(&mut self, op: BinaryOp, lhs: HirExpr, rhs: HirExpr, span: Span) -> HirExpr {
        if is_poison(&lhs.ty) || is_poison(&rhs.ty) {
            return HirExpr::new(HirExprKind::Null, poison_type(), span);
        }
        if lhs.ty.is_void() || rhs.ty.is_void() {
            return self.operator_mismatch(op.symbol(), &lhs.ty, &rhs.ty, span);
        }
        match op {
            BinaryOp::Or => HirExpr::new(
                HirExprKind::Or(boxed(lhs), boxed(rhs)),
                TypeRef::boolean(),
                span,
            ),
            BinaryOp::And => HirExpr::new(
                HirExprKind::And(boxed(lhs), boxed(rhs)),
                TypeRef::boolean(),
                span,
            ),
            BinaryOp::Concat => self.concat(lhs, rhs, span),
            BinaryOp::Add if lhs.ty.is_class("String") || rhs.ty.is_class("String") => {
                self.concat(lhs, rhs, span)
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let arith = match op {
                    BinaryOp::Add => ArithOp::Add,
                    BinaryOp::Sub => ArithOp::Sub,
                    BinaryOp::Mul => ArithOp::Mul,
                    BinaryOp::Div => ArithOp::Div,
                    _ => ArithOp::Rem,
                };
                let Some(prim) = self.numeric_pair(&lhs, &rhs) else {
                    return self.operator_mismatch(op.symbol(), &lhs.ty, &rhs.ty, span);
                };
                let lhs = self.to_primitive(lhs, prim);
                let rhs = self.to_primitive(rhs, prim);
                HirExpr::new(
                    HirExprKind::Arith {
                        op: arith,
                        prim,
                        lhs: boxed(lhs),
                        rhs: boxed(rhs),
                    },
                    TypeRef::Primitive(prim),
                    span,
                )
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let cmp = if op == BinaryOp::Eq {
                    CompareOp::Eq
                } else {
                    CompareOp::Ne
                };
                self.equality(cmp, op.symbol(), lhs, rhs, span)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let cmp = match op {
                    BinaryOp::Lt => CompareOp::Lt,
                    BinaryOp::Le => CompareOp::Le,
                    BinaryOp::Gt => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                let Some((lhs, rhs)) = self.ordered_operands(lhs, rhs) else {
                    return HirExpr::new(HirExprKind::Null, poison_type(), span);
                };
                HirExpr::new(
                    HirExprKind::Compare {
                        op: cmp,
                        lhs: boxed(lhs),
                        rhs: boxed(rhs),
                    },
                    TypeRef::boolean(),
                    span,
                )
            }
            BinaryOp::Range => {
                let lhs = self.coerce_to(lhs, &TypeRef::int(), "a range bound");
                let rhs = self.coerce_to(rhs, &TypeRef::int(), "a range bound");
                HirExpr::new(
                    HirExprKind::Range(boxed(lhs), boxed(rhs)),
                    TypeRef::generic("List", [TypeRef::class("Integer")]),
                    span,
                )
            }
        }
    }

    fn concat(&mut self, lhs: HirExpr, rhs: HirExpr, span: Span) -> HirExpr {
        HirExpr::new(
            HirExprKind::Concat(boxed(lhs), boxed(rhs)),
            TypeRef::string(),
            span,
        )
    }

    fn equality(
        &mut self,
        op: CompareOp,
        symbol: &str,
        lhs: HirExpr,
        rhs: HirExpr,
        span: Span,
    ) -> HirExpr {
        let either_primitive = lhs.ty.is_primitive() || rhs.ty.is_primitive();
        let (lhs, rhs) = match (lhs.ty.unboxed(), rhs.ty.unboxed()) {
            (Some(a), Some(b)) if either_primitive && (a == b || (a.is_numeric() && b.is_numeric())) => {
                let prim = a.promote(b).unwrap_or(a);
                (self.to_primitive(lhs, prim), self.to_primitive(rhs, prim))
            }
            _ => {
                let (a, b) = (lhs.ty.boxed(), rhs.ty.boxed());
                if !self.classes.are_related(&a, &b) {
                    let (l, r) = (lhs.ty.clone(), rhs.ty.clone());
                    return self.operator_mismatch(symbol, &l, &r, span);
                }
                (self.box_primitive(lhs), self.box_primitive(rhs))
            }
        };
        HirExpr::new(
            HirExprKind::Compare {
                op,
                lhs: boxed(lhs),
                rhs: boxed(rhs),
            },
            TypeRef::boolean(),
            span,
        )
    }

    pub(crate) fn box_primitive(&self, expr: HirExpr) -> HirExpr {
        match expr.ty.as_primitive() {
            Some(p) if expr.ty.is_primitive() => {
                let ty = expr.ty.boxed();
                expr.convert(vec![Conversion::Box(p)], ty)
            }
            _ => expr,
        }
    }

    /// Operands of `<`, `<=`, `>`, `>=` and `<=>`: promoted numbers, or two
    /// related comparable references.
    fn ordered_operands(&mut self, lhs: HirExpr, rhs: HirExpr) -> Option<(HirExpr, HirExpr)> {
        if let Some(prim) = self.numeric_pair(&lhs, &rhs) {
            return Some((self.to_primitive(lhs, prim), self.to_primitive(rhs, prim)));
        }
        let comparable = self.classes.is_comparable(&lhs.ty)
            && self.classes.is_comparable(&rhs.ty)
            && self.classes.are_related(&lhs.ty, &rhs.ty);
        if !comparable {
            let message = format!("values of type `{}` and `{}` cannot be ordered", lhs.ty, rhs.ty);
            self.mismatch(lhs.span.to(rhs.span), message);
            return None;
        }
        Some((lhs, rhs))
    }

    fn compare3(&mut self, lhs: HirExpr, rhs: HirExpr, span: Span) -> HirExpr {
        if is_poison(&lhs.ty) || is_poison(&rhs.ty) {
            return HirExpr::new(HirExprKind::Null, poison_type(), span);
        }
        match self.ordered_operands(lhs, rhs) {
            Some((lhs, rhs)) => HirExpr::new(
                HirExprKind::Compare3(boxed(lhs), boxed(rhs)),
                TypeRef::int(),
                span,
            ),
            None => HirExpr::new(HirExprKind::Null, poison_type(), span),
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: HirExpr, span: Span) -> HirExpr {
        if is_poison(&operand.ty) {
            return HirExpr::new(HirExprKind::Null, poison_type(), span);
        }
        match op {
            UnaryOp::Neg => match operand.ty.numeric() {
                Some(prim) => {
                    let operand = self.to_primitive(operand, prim);
                    HirExpr::new(
                        HirExprKind::Negate {
                            prim,
                            operand: boxed(operand),
                        },
                        TypeRef::Primitive(prim),
                        span,
                    )
                }
                None => {
                    let message = format!("cannot negate a value of type `{}`", operand.ty);
                    self.mismatch(span, message)
                }
            },
            UnaryOp::Not if operand.ty.is_void() => {
                self.mismatch(span, "a `void` call has no truth value".into())
            }
            UnaryOp::Not => HirExpr::new(HirExprKind::Not(boxed(operand)), TypeRef::boolean(), span),
        }
    }

    /// Two alternatives joined to their common supertype.
    fn branches(
        &mut self,
        symbol: &str,
        guard: TypeRef,
        first: HirExpr,
        second: HirExpr,
        span: Span,
        build: impl FnOnce(Box<HirExpr>, Box<HirExpr>) -> HirExprKind,
    ) -> HirExpr {
        if is_poison(&guard) || is_poison(&first.ty) || is_poison(&second.ty) {
            return HirExpr::new(HirExprKind::Null, poison_type(), span);
        }
        let Some(join) = self.classes.common_supertype(&first.ty, &second.ty) else {
            let message = format!(
                "branches of `{symbol}` have incompatible types `{}` and `{}`",
                first.ty, second.ty
            );
            return self.mismatch(span, message);
        };
        let first = self.to_join(first, &join, false);
        let second = self.to_join(second, &join, false);
        HirExpr::new(build(boxed(first), boxed(second)), join, span)
    }

    fn collection(&mut self, items: &[Expr], class: &str, span: Span) -> HirExpr {
        let items: Vec<HirExpr> = items.iter().map(|item| self.expr(item)).collect();
        if items.iter().any(|item| is_poison(&item.ty)) {
            return HirExpr::new(HirExprKind::Null, poison_type(), span);
        }
        if let Some(void) = items.iter().find(|item| item.ty.is_void()) {
            let span = void.span;
            return self.mismatch(span, "a `void` call cannot be a collection element".into());
        }
        let join = items
            .iter()
            .map(|item| item.ty.clone())
            .reduce(|acc, ty| {
                self.classes
                    .common_supertype(&acc, &ty)
                    .unwrap_or_else(TypeRef::object)
            })
            .map(|join| if join.is_null() { TypeRef::object() } else { join })
            .unwrap_or_else(TypeRef::object);
        let items: Vec<HirExpr> = items
            .into_iter()
            .map(|item| self.to_join(item, &join, true))
            .collect();
        let ty = TypeRef::generic(class, [join.boxed()]);
        let kind = if class == "Set" {
            HirExprKind::NewSet(items)
        } else {
            HirExprKind::NewList(items)
        };
        HirExpr::new(kind, ty, span)
    }

    fn cast(&mut self, operand: HirExpr, target: &TypeRef, span: Span) -> HirExpr {
        let target = self.declared_type(target, span);
        if is_poison(&operand.ty) || is_poison(&target) {
            return HirExpr::new(HirExprKind::Null, poison_type(), span);
        }
        let Some(plan) = self.classes.cast(&operand.ty, &target) else {
            let message = format!("cannot cast `{}` to `{target}`", operand.ty);
            return self.mismatch(span, message);
        };
        HirExpr::new(
            HirExprKind::Cast {
                expr: boxed(operand),
                before: plan.before,
                check: plan.check,
                after: plan.after,
            },
            target,
            span,
        )
    }

    fn type_test(&mut self, operand: HirExpr, target: &TypeRef, span: Span) -> HirExpr {
        let target = self.declared_type(target, span);
        if is_poison(&operand.ty) || is_poison(&target) {
            return HirExpr::new(HirExprKind::Null, poison_type(), span);
        }
        if operand.ty.is_void() || !self.classes.are_related(&operand.ty, &target) {
            let message = format!(
                "a value of type `{}` can never be an instance of `{target}`",
                operand.ty
            );
            return self.mismatch(span, message);
        }
        let operand = self.box_primitive(operand);
        HirExpr::new(
            HirExprKind::InstanceOf {
                expr: boxed(operand),
                ty: target.boxed().erased(),
            },
            TypeRef::boolean(),
            span,
        )
    }
}

fn literal_expr(literal: &Literal, span: Span) -> HirExpr {
    let (constant, ty) = match literal {
        Literal::Bool(b) => (Constant::Bool(*b), TypeRef::boolean()),
        Literal::Int(n) => (Constant::Int(*n), TypeRef::int()),
        Literal::Long(n) => (Constant::Long(*n), TypeRef::long()),
        Literal::Double(bits) => (Constant::Double(*bits), TypeRef::double()),
        Literal::Str(s) => (Constant::Str(s.clone()), TypeRef::string()),
        Literal::Null => return HirExpr::new(HirExprKind::Null, TypeRef::Null, span),
    };
    HirExpr::new(HirExprKind::Const(constant), ty, span)
}
