//! Human-readable listing of a compiled payload.

use std::fmt;

use trellis_core::unit::{
    ArithOp, CompareOp, Constant, Conversion, Instr, MemberRef, MethodRef, Payload,
};

pub fn render_constant(constant: &Constant) -> String {
    match constant {
        Constant::Bool(b) => b.to_string(),
        Constant::Int(n) => n.to_string(),
        Constant::Long(n) => format!("{n}L"),
        Constant::Double(bits) => format!("{:?}", f64::from_bits(*bits)),
        Constant::Str(s) => format!("{s:?}"),
        Constant::Type(ty) => ty.to_string(),
        Constant::Member(MemberRef {
            contributor: Some(contributor),
            signature,
        }) => format!("{contributor}.{signature}"),
        Constant::Member(MemberRef {
            contributor: None,
            signature,
        }) => signature.to_string(),
        Constant::Method(MethodRef { owner, signature }) => format!("{owner}.{signature}"),
        Constant::Template(name) => format!("template {name}"),
    }
}

fn arith(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "add",
        ArithOp::Sub => "sub",
        ArithOp::Mul => "mul",
        ArithOp::Div => "div",
        ArithOp::Rem => "rem",
    }
}

fn compare(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::Ne => "ne",
        CompareOp::Lt => "lt",
        CompareOp::Le => "le",
        CompareOp::Gt => "gt",
        CompareOp::Ge => "ge",
    }
}

fn conversion(conversion: &Conversion) -> String {
    match conversion {
        Conversion::Widen(from, to) => format!("widen {} {}", from.keyword(), to.keyword()),
        Conversion::Narrow(from, to) => format!("narrow {} {}", from.keyword(), to.keyword()),
        Conversion::Box(p) => format!("box {}", p.keyword()),
        Conversion::Unbox(p) => format!("unbox {}", p.keyword()),
    }
}

/// Mnemonic and operands of one instruction, plus the constant it refers to.
fn instruction(instr: &Instr) -> (String, Option<u32>) {
    let plain = |text: &str| (text.to_string(), None);
    match instr {
        Instr::Const(index) => (format!("const #{index}"), Some(*index)),
        Instr::Null => plain("null"),
        Instr::Load(slot) => (format!("load {slot}"), None),
        Instr::Store(slot) => (format!("store {slot}"), None),
        Instr::Pop => plain("pop"),
        Instr::Dup => plain("dup"),
        Instr::Emit => plain("emit"),
        Instr::Jump(to) => (format!("jump {to}"), None),
        Instr::JumpIfFalse(to) => (format!("jump_if_false {to}"), None),
        Instr::JumpIfTrue(to) => (format!("jump_if_true {to}"), None),
        Instr::JumpIfNull(to) => (format!("jump_if_null {to}"), None),
        Instr::JumpIfNotNull(to) => (format!("jump_if_not_null {to}"), None),
        Instr::Convert(c) => (conversion(c), None),
        Instr::Arith(op, p) => (format!("{} {}", arith(*op), p.keyword()), None),
        Instr::Negate(p) => (format!("neg {}", p.keyword()), None),
        Instr::Not => plain("not"),
        Instr::Concat => plain("concat"),
        Instr::Compare(op) => (format!("cmp {}", compare(*op)), None),
        Instr::Compare3 => plain("cmp3"),
        Instr::NewList(len) => (format!("new_list {len}"), None),
        Instr::NewSet(len) => (format!("new_set {len}"), None),
        Instr::NewArray { elem, len } => (format!("new_array #{elem} {len}"), Some(*elem)),
        Instr::Range => plain("range"),
        Instr::Index => plain("index"),
        Instr::ArrayLength => plain("array_length"),
        Instr::InstanceOf(ty) => (format!("instance_of #{ty}"), Some(*ty)),
        Instr::CheckCast(ty) => (format!("check_cast #{ty}"), Some(*ty)),
        Instr::InvokeContext { member, argc } => {
            (format!("invoke_context #{member} {argc}"), Some(*member))
        }
        Instr::InvokeMethod { method, argc } => {
            (format!("invoke_method #{method} {argc}"), Some(*method))
        }
        Instr::CallTemplate { template, argc } => {
            (format!("call_template #{template} {argc}"), Some(*template))
        }
        Instr::IterInit { slot, reverse } => {
            let suffix = if *reverse { " reverse" } else { "" };
            (format!("iter_init {slot}{suffix}"), None)
        }
        Instr::IterRange { slot, reverse } => {
            let suffix = if *reverse { " reverse" } else { "" };
            (format!("iter_range {slot}{suffix}"), None)
        }
        Instr::IterNext { slot, exit } => (format!("iter_next {slot} {exit}"), None),
        Instr::Return => plain("return"),
    }
}

/// Instruction listing of a payload, one instruction per line.
pub struct Disassembly<'a> {
    pub name: &'a str,
    pub payload: &'a Payload,
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = &self.payload.entry;
        write!(f, "template {}(", self.name)?;
        for (i, param) in entry.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", param.ty, param.name)?;
        }
        writeln!(f, ") -> {}", entry.returns)?;
        writeln!(
            f,
            "locals {}, iterators {}, constants {}",
            entry.locals,
            entry.iterators,
            self.payload.constants.len()
        )?;
        for (at, instr) in self.payload.code.iter().enumerate() {
            let (text, constant) = instruction(instr);
            write!(f, "{at:04} {text}")?;
            if let Some(constant) =
                constant.and_then(|index| self.payload.constants.get(index as usize))
            {
                write!(f, "  ; {}", render_constant(constant))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub fn disassemble(name: &str, payload: &Payload) -> String {
    Disassembly { name, payload }.to_string()
}
