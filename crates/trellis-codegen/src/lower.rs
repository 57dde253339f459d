//! Lowering a [`TypedTemplate`] to a linear instruction sequence.
//!
//! Code is emitted in one pass. Forward jumps go to [`Label`]s that are
//! patched when the template is finished; every conversion was already made
//! explicit by the analyzer, so lowering is a direct walk of the typed tree.

use std::collections::HashMap;

use trellis_core::Span;
use trellis_core::unit::{CompiledTemplate, Constant, Conversion, EntryDescriptor, Instr, Payload};
use trellis_hir::{HirExpr, HirExprKind, HirStmt, HirStmtKind, TypedTemplate};

use crate::errors::{CodegenError, CodegenErrorKind, CodegenResult};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Label(usize);

/// Lower a checked template.
pub fn lower_template(typed: &TypedTemplate) -> CodegenResult<CompiledTemplate> {
    let mut lowerer = Lowerer::new(typed.result_slot);
    lowerer.stmts(&typed.body)?;
    match typed.result_slot {
        Some(slot) => lowerer.emit(Instr::Load(slot)),
        None => lowerer.emit(Instr::Null),
    }
    lowerer.emit(Instr::Return);
    let (constants, code) = lowerer.finish()?;
    Ok(CompiledTemplate {
        name: typed.name.clone(),
        payload: Payload {
            constants,
            code,
            entry: EntryDescriptor {
                params: typed.params.clone(),
                returns: typed.returns.clone(),
                entry: 0,
                locals: typed.locals,
                iterators: typed.iterators,
            },
        },
        dependencies: typed.dependencies.clone(),
    })
}

struct Lowerer {
    constants: Vec<Constant>,
    pool: HashMap<Constant, u32>,
    code: Vec<Instr>,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, Label)>,
    /// Exit labels of the enclosing null-safe chains, innermost last.
    chains: Vec<Label>,
    result_slot: Option<u16>,
    span: Span,
}

impl Lowerer {
    fn new(result_slot: Option<u16>) -> Self {
        Self {
            constants: Vec::new(),
            pool: HashMap::new(),
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            chains: Vec::new(),
            result_slot,
            span: Span::default(),
        }
    }

    fn error(&self, kind: CodegenErrorKind) -> CodegenError {
        CodegenError::new(kind, self.span)
    }

    fn emit(&mut self, instr: Instr) {
        self.code.push(instr);
    }

    /// Index of `constant` in the pool, adding it on first use.
    fn constant(&mut self, constant: Constant) -> CodegenResult<u32> {
        if let Some(&index) = self.pool.get(&constant) {
            return Ok(index);
        }
        let index = u32::try_from(self.constants.len())
            .map_err(|_| self.error(CodegenErrorKind::TooManyConstants))?;
        self.pool.insert(constant.clone(), index);
        self.constants.push(constant);
        Ok(index)
    }

    fn push_constant(&mut self, constant: Constant) -> CodegenResult<()> {
        let index = self.constant(constant)?;
        self.emit(Instr::Const(index));
        Ok(())
    }

    fn count(&self, what: &'static str, count: usize) -> CodegenResult<u16> {
        u16::try_from(count).map_err(|_| self.error(CodegenErrorKind::TooMany { what, count }))
    }

    fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    fn place(&mut self, label: Label) -> CodegenResult<()> {
        let position = u32::try_from(self.code.len())
            .map_err(|_| self.error(CodegenErrorKind::CodeTooLarge))?;
        self.labels[label.0] = Some(position);
        Ok(())
    }

    /// Emit a jump whose target is patched to `label` in [`Lowerer::finish`].
    fn jump(&mut self, instr: Instr, label: Label) {
        self.fixups.push((self.code.len(), label));
        self.emit(instr);
    }

    fn finish(mut self) -> CodegenResult<(Vec<Constant>, Vec<Instr>)> {
        for (at, label) in std::mem::take(&mut self.fixups) {
            let target = self.labels[label.0]
                .ok_or_else(|| self.error(CodegenErrorKind::UnplacedLabel))?;
            match &mut self.code[at] {
                Instr::Jump(to)
                | Instr::JumpIfFalse(to)
                | Instr::JumpIfTrue(to)
                | Instr::JumpIfNull(to)
                | Instr::JumpIfNotNull(to)
                | Instr::IterNext { exit: to, .. } => *to = target,
                _ => {}
            }
        }
        Ok((self.constants, self.code))
    }

    fn conversions(&mut self, conversions: &[Conversion]) {
        for conversion in conversions {
            self.emit(Instr::Convert(*conversion));
        }
    }

    // ---- statements ----

    fn stmts(&mut self, stmts: &[HirStmt]) -> CodegenResult<()> {
        stmts.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&mut self, stmt: &HirStmt) -> CodegenResult<()> {
        self.span = stmt.span;
        match &stmt.kind {
            HirStmtKind::Text(text) => {
                if !text.is_empty() {
                    self.push_constant(Constant::Str(text.clone()))?;
                    self.emit(Instr::Emit);
                }
            }
            HirStmtKind::Expr { expr, emit, result } => {
                self.expr(expr)?;
                match (result, self.result_slot) {
                    (Some(conversions), Some(slot)) => {
                        if *emit {
                            self.emit(Instr::Dup);
                            self.emit(Instr::Emit);
                        }
                        self.conversions(conversions);
                        self.emit(Instr::Store(slot));
                    }
                    _ if *emit => self.emit(Instr::Emit),
                    _ => self.emit(Instr::Pop),
                }
            }
            HirStmtKind::Store { slot, value } => {
                self.expr(value)?;
                self.emit(Instr::Store(*slot));
            }
            HirStmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let otherwise_label = self.label();
                self.expr(cond)?;
                self.jump(Instr::JumpIfFalse(0), otherwise_label);
                self.stmts(then)?;
                if otherwise.is_empty() {
                    self.place(otherwise_label)?;
                } else {
                    let end = self.label();
                    self.jump(Instr::Jump(0), end);
                    self.place(otherwise_label)?;
                    self.stmts(otherwise)?;
                    self.place(end)?;
                }
            }
            HirStmtKind::Foreach {
                slot,
                iterator,
                iterable,
                reverse,
                body,
            } => {
                if let HirExprKind::Range(lo, hi) = &iterable.kind {
                    self.expr(lo)?;
                    self.expr(hi)?;
                    self.emit(Instr::IterRange {
                        slot: *iterator,
                        reverse: *reverse,
                    });
                } else {
                    self.expr(iterable)?;
                    self.emit(Instr::IterInit {
                        slot: *iterator,
                        reverse: *reverse,
                    });
                }
                let head = self.label();
                let exit = self.label();
                self.place(head)?;
                self.jump(
                    Instr::IterNext {
                        slot: *iterator,
                        exit: 0,
                    },
                    exit,
                );
                self.emit(Instr::Store(*slot));
                self.stmts(body)?;
                self.jump(Instr::Jump(0), head);
                self.place(exit)?;
            }
            HirStmtKind::Return(value) => {
                match value {
                    Some(value) => self.expr(value)?,
                    None => self.emit(Instr::Null),
                }
                self.emit(Instr::Return);
            }
            HirStmtKind::Block(stmts) => self.stmts(stmts)?,
        }
        Ok(())
    }

    // ---- expressions ----

    fn exprs(&mut self, exprs: &[HirExpr]) -> CodegenResult<()> {
        exprs.iter().try_for_each(|expr| self.expr(expr))
    }

    fn expr(&mut self, expr: &HirExpr) -> CodegenResult<()> {
        self.span = expr.span;
        match &expr.kind {
            HirExprKind::Const(constant) => self.push_constant(constant.clone())?,
            HirExprKind::Null => self.emit(Instr::Null),
            HirExprKind::Local(slot) => self.emit(Instr::Load(*slot)),
            HirExprKind::Convert { expr, conversions } => {
                self.expr(expr)?;
                self.conversions(conversions);
            }
            HirExprKind::Arith { op, prim, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.emit(Instr::Arith(*op, *prim));
            }
            HirExprKind::Negate { prim, operand } => {
                self.expr(operand)?;
                self.emit(Instr::Negate(*prim));
            }
            HirExprKind::Not(operand) => {
                self.expr(operand)?;
                self.emit(Instr::Not);
            }
            HirExprKind::And(lhs, rhs) => self.short_circuit(lhs, rhs, false)?,
            HirExprKind::Or(lhs, rhs) => self.short_circuit(lhs, rhs, true)?,
            HirExprKind::Concat(lhs, rhs) => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.emit(Instr::Concat);
            }
            HirExprKind::Compare { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.emit(Instr::Compare(*op));
            }
            HirExprKind::Compare3(lhs, rhs) => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.emit(Instr::Compare3);
            }
            HirExprKind::Range(lhs, rhs) => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.emit(Instr::Range);
            }
            HirExprKind::InvokeContext { member, args } => {
                self.exprs(args)?;
                let argc = self.count("argument", args.len())?;
                let member = self.constant(Constant::Member(member.clone()))?;
                self.emit(Instr::InvokeContext { member, argc });
            }
            HirExprKind::InvokeMethod {
                method,
                receiver,
                args,
            } => {
                self.expr(receiver)?;
                self.exprs(args)?;
                let argc = self.count("argument", args.len())?;
                let method = self.constant(Constant::Method(method.clone()))?;
                self.emit(Instr::InvokeMethod { method, argc });
            }
            HirExprKind::CallTemplate { name, args } => {
                self.exprs(args)?;
                let argc = self.count("argument", args.len())?;
                let template = self.constant(Constant::Template(name.clone()))?;
                self.emit(Instr::CallTemplate { template, argc });
            }
            HirExprKind::ArrayLength(array) => {
                self.expr(array)?;
                self.emit(Instr::ArrayLength);
            }
            HirExprKind::Index { target, index } => {
                self.expr(target)?;
                self.expr(index)?;
                self.emit(Instr::Index);
            }
            HirExprKind::NewList(items) => {
                self.exprs(items)?;
                let len = self.count("list element", items.len())?;
                self.emit(Instr::NewList(len));
            }
            HirExprKind::NewSet(items) => {
                self.exprs(items)?;
                let len = self.count("set element", items.len())?;
                self.emit(Instr::NewSet(len));
            }
            HirExprKind::NewArray { elem, items } => {
                self.exprs(items)?;
                let len = self.count("array element", items.len())?;
                let elem = self.constant(Constant::Type(elem.clone()))?;
                self.emit(Instr::NewArray { elem, len });
            }
            HirExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let otherwise_label = self.label();
                let end = self.label();
                self.expr(cond)?;
                self.jump(Instr::JumpIfFalse(0), otherwise_label);
                self.expr(then)?;
                self.jump(Instr::Jump(0), end);
                self.place(otherwise_label)?;
                self.expr(otherwise)?;
                self.place(end)?;
            }
            HirExprKind::Elvis(lhs, rhs) => {
                let end = self.label();
                self.expr(lhs)?;
                self.emit(Instr::Dup);
                self.jump(Instr::JumpIfTrue(0), end);
                self.emit(Instr::Pop);
                self.expr(rhs)?;
                self.place(end)?;
            }
            HirExprKind::Coalesce(lhs, rhs) => {
                let end = self.label();
                self.expr(lhs)?;
                self.jump(Instr::JumpIfNotNull(0), end);
                self.emit(Instr::Pop);
                self.expr(rhs)?;
                self.place(end)?;
            }
            HirExprKind::InstanceOf { expr, ty } => {
                self.expr(expr)?;
                let ty = self.constant(Constant::Type(ty.clone()))?;
                self.emit(Instr::InstanceOf(ty));
            }
            HirExprKind::Cast {
                expr,
                before,
                check,
                after,
            } => {
                self.expr(expr)?;
                self.conversions(before);
                if let Some(check) = check {
                    let ty = self.constant(Constant::Type(check.clone()))?;
                    self.emit(Instr::CheckCast(ty));
                }
                self.conversions(after);
            }
            HirExprKind::NullChain { body, zero } => {
                let exit = self.label();
                self.chains.push(exit);
                let lowered = self.expr(body);
                self.chains.pop();
                lowered?;
                match zero {
                    Some(zero) => {
                        let end = self.label();
                        self.jump(Instr::Jump(0), end);
                        self.place(exit)?;
                        self.emit(Instr::Pop);
                        self.push_constant(zero.clone())?;
                        self.place(end)?;
                    }
                    None => self.place(exit)?,
                }
            }
            HirExprKind::NullGuard(receiver) => {
                self.expr(receiver)?;
                let Some(&exit) = self.chains.last() else {
                    return Err(self.error(CodegenErrorKind::GuardOutsideChain));
                };
                self.jump(Instr::JumpIfNull(0), exit);
            }
        }
        Ok(())
    }

    /// `and` / `or`, always producing a boolean.
    fn short_circuit(&mut self, lhs: &HirExpr, rhs: &HirExpr, is_or: bool) -> CodegenResult<()> {
        let decided = self.label();
        let end = self.label();
        let test = if is_or {
            Instr::JumpIfTrue(0)
        } else {
            Instr::JumpIfFalse(0)
        };
        self.expr(lhs)?;
        self.jump(test.clone(), decided);
        self.expr(rhs)?;
        self.jump(test, decided);
        self.push_constant(Constant::Bool(!is_or))?;
        self.jump(Instr::Jump(0), end);
        self.place(decided)?;
        self.push_constant(Constant::Bool(is_or))?;
        self.place(end)?;
        Ok(())
    }
}
