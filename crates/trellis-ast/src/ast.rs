//! Abstract syntax tree. Nodes are immutable once built and own their
//! children.

use serde::Serialize;
use trellis_core::{Span, TypeRef};

/// One parsed template: its header and body.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TemplateDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub body: Vec<Stmt>,
    /// Span of the `template` header, when the source declares one.
    pub header: Option<Span>,
}

/// The callable interface of a template, as seen by its callers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TemplateHeader {
    pub name: String,
    pub params: Vec<ParamDecl>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeRef,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum StmtKind {
    Text(String),
    Expr(Expr),
    Assign {
        name: String,
        value: Expr,
    },
    If {
        cond: Expr,
        then: Block,
        /// `else if` is an `else` block holding a single `If`.
        otherwise: Option<Block>,
    },
    Foreach {
        var: String,
        iterable: Expr,
        reverse: bool,
        body: Block,
    },
    Return(Option<Expr>),
    Block(Block),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Literal {
    Bool(bool),
    Int(i32),
    Long(i64),
    /// IEEE-754 bits.
    Double(u64),
    Str(String),
    Null,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    /// `&`
    Concat,
    /// `..`
    Range,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Concat => "&",
            BinaryOp::Range => "..",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `name(args)` when `target` is `None`, otherwise `target.name(args)` or
    /// `target?.name(args)`.
    Call {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        null_safe: bool,
    },
    /// `call name(args)`
    TemplateCall {
        name: String,
        args: Vec<Expr>,
    },
    /// `target.name` or `target?.name`
    Property {
        target: Box<Expr>,
        name: String,
        null_safe: bool,
    },
    /// `target[index]` or `target?[index]`
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        null_safe: bool,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `lhs ?: rhs`
    Elvis {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `lhs ?? rhs`
    Coalesce {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `#(...)`
    List(Vec<Expr>),
    /// `##(...)`
    Set(Vec<Expr>),
    /// `(Type) expr` or `expr as Type`
    Cast {
        expr: Box<Expr>,
        ty: TypeRef,
    },
    /// `expr isa Type`
    TypeTest {
        expr: Box<Expr>,
        ty: TypeRef,
    },
    /// `lhs <=> rhs`
    Compare3 {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether this node continues a null-safe chain started further left
    /// (used to group `a?.b.c` into one short-circuit region).
    pub fn is_null_safe(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Call { null_safe: true, .. }
                | ExprKind::Property { null_safe: true, .. }
                | ExprKind::Index { null_safe: true, .. }
        )
    }
}

impl TemplateDecl {
    pub fn header(&self) -> TemplateHeader {
        TemplateHeader {
            name: self.name.clone(),
            params: self.params.clone(),
        }
    }
}
