//! Typed intermediate representation.
//!
//! Every expression carries its static type. Implicit conversions are
//! explicit `Convert` nodes, overloads are resolved to concrete member and
//! method references, and locals are numbered slots.

use std::collections::BTreeSet;

use trellis_core::unit::{ArithOp, CompareOp, Constant, Conversion, MemberRef, MethodRef, Param};
use trellis_core::{Dependency, Primitive, Span, TypeRef};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypedTemplate {
    pub name: String,
    pub params: Vec<Param>,
    /// Boxed common supertype of every result expression, `void` when the
    /// template produces no value.
    pub returns: TypeRef,
    pub body: Vec<HirStmt>,
    /// Slot holding the value of the final top-level expression statement.
    pub result_slot: Option<u16>,
    /// Local slots, parameters first.
    pub locals: u16,
    /// Iterator slots; one per nesting level of `foreach`.
    pub iterators: u16,
    pub dependencies: BTreeSet<Dependency>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HirStmt {
    pub kind: HirStmtKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HirStmtKind {
    Text(String),
    Expr {
        expr: HirExpr,
        /// Whether the value is appended to the output.
        emit: bool,
        /// For the final top-level expression statement: conversions to the
        /// template's return type before storing into the result slot.
        result: Option<Vec<Conversion>>,
    },
    Store {
        slot: u16,
        value: HirExpr,
    },
    If {
        cond: HirExpr,
        then: Vec<HirStmt>,
        otherwise: Vec<HirStmt>,
    },
    Foreach {
        slot: u16,
        iterator: u16,
        iterable: HirExpr,
        reverse: bool,
        body: Vec<HirStmt>,
    },
    /// The value is already converted to the return type.
    Return(Option<HirExpr>),
    Block(Vec<HirStmt>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HirExpr {
    pub kind: HirExprKind,
    pub ty: TypeRef,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HirExprKind {
    Const(Constant),
    Null,
    Local(u16),
    Convert {
        expr: Box<HirExpr>,
        conversions: Vec<Conversion>,
    },
    /// Both operands are already converted to `prim`.
    Arith {
        op: ArithOp,
        prim: Primitive,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    Negate {
        prim: Primitive,
        operand: Box<HirExpr>,
    },
    /// Truthiness negation.
    Not(Box<HirExpr>),
    And(Box<HirExpr>, Box<HirExpr>),
    Or(Box<HirExpr>, Box<HirExpr>),
    Concat(Box<HirExpr>, Box<HirExpr>),
    Compare {
        op: CompareOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    Compare3(Box<HirExpr>, Box<HirExpr>),
    Range(Box<HirExpr>, Box<HirExpr>),
    InvokeContext {
        member: MemberRef,
        args: Vec<HirExpr>,
    },
    InvokeMethod {
        method: MethodRef,
        receiver: Box<HirExpr>,
        args: Vec<HirExpr>,
    },
    CallTemplate {
        name: String,
        args: Vec<HirExpr>,
    },
    ArrayLength(Box<HirExpr>),
    Index {
        target: Box<HirExpr>,
        index: Box<HirExpr>,
    },
    NewList(Vec<HirExpr>),
    NewSet(Vec<HirExpr>),
    /// Packed variadic arguments.
    NewArray {
        elem: TypeRef,
        items: Vec<HirExpr>,
    },
    /// Branches are converted to the result type.
    Ternary {
        cond: Box<HirExpr>,
        then: Box<HirExpr>,
        otherwise: Box<HirExpr>,
    },
    Elvis(Box<HirExpr>, Box<HirExpr>),
    Coalesce(Box<HirExpr>, Box<HirExpr>),
    InstanceOf {
        expr: Box<HirExpr>,
        ty: TypeRef,
    },
    /// Explicit cast: `before` conversions, an optional run-time check
    /// against a reference type, then `after` conversions.
    Cast {
        expr: Box<HirExpr>,
        before: Vec<Conversion>,
        check: Option<TypeRef>,
        after: Vec<Conversion>,
    },
    /// A null-safe chain. Any [`HirExprKind::NullGuard`] inside `body` that
    /// meets `null` abandons the rest of the chain, which then yields `null`
    /// or `zero` when the chain's type is primitive.
    NullChain {
        body: Box<HirExpr>,
        zero: Option<Constant>,
    },
    NullGuard(Box<HirExpr>),
}

impl HirExpr {
    pub fn new(kind: HirExprKind, ty: TypeRef, span: Span) -> Self {
        Self { kind, ty, span }
    }

    /// Wrap in a conversion node; a no-op when there is nothing to convert.
    pub fn convert(self, conversions: Vec<Conversion>, ty: TypeRef) -> Self {
        if conversions.is_empty() {
            return Self { ty, ..self };
        }
        let span = self.span;
        Self::new(
            HirExprKind::Convert {
                expr: Box::new(self),
                conversions,
            },
            ty,
            span,
        )
    }
}
