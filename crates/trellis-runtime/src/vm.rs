//! The stack-machine interpreter.
//!
//! Every frame owns its operand stack, locals and iterator slots; nested
//! template calls run in a fresh frame that appends to the caller's output
//! buffer.

use std::fmt::Write;
use std::sync::Arc;

use derive_more::From;
use trellis_context::MergedContext;
use trellis_core::unit::{ArithOp, CompareOp, Constant, Conversion, Instr};
use trellis_core::{CompiledUnit, HostError, Primitive, TypeRef, Value};

use crate::builtins;
use crate::error::{RuntimeError, RuntimeResult};
use crate::loader::{Loader, bind_arguments};

/// Nesting limit for template-to-template calls.
pub const MAX_CALL_DEPTH: usize = 128;

/// Largest range that can be built as a list value. `foreach` over a range
/// expression iterates lazily and is not bound by this.
pub const MAX_RANGE_LEN: u64 = 1 << 20;

/// Why a frame stopped early.
#[derive(Debug, From)]
enum Trap {
    /// Failure in this frame's own code.
    Fault(String),
    /// A nested call failed; reported as-is.
    Nested(RuntimeError),
}

impl From<HostError> for Trap {
    fn from(error: HostError) -> Self {
        Trap::Fault(error.message)
    }
}

type Step<T> = Result<T, Trap>;

/// Iteration state of one `foreach`.
#[derive(Debug)]
enum Cursor {
    Items {
        items: Arc<Vec<Value>>,
        next: usize,
        reverse: bool,
    },
    /// Integers from `next` towards `last`, both inclusive.
    Range { next: i64, last: i64, reverse: bool },
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::Items {
            items: Arc::default(),
            next: 0,
            reverse: false,
        }
    }
}

impl Cursor {
    fn range(lo: i32, hi: i32, reverse: bool) -> Self {
        let (lo, hi) = (i64::from(lo), i64::from(hi));
        if reverse {
            Cursor::Range {
                next: hi,
                last: lo,
                reverse,
            }
        } else {
            Cursor::Range {
                next: lo,
                last: hi,
                reverse,
            }
        }
    }

    fn advance(&mut self) -> Option<Value> {
        match self {
            Cursor::Items {
                items,
                next,
                reverse,
            } => {
                let len = items.len();
                if *next >= len {
                    return None;
                }
                let at = if *reverse { len - 1 - *next } else { *next };
                *next += 1;
                items.get(at).cloned()
            }
            Cursor::Range {
                next,
                last,
                reverse,
            } => {
                let done = if *reverse { *next < *last } else { *next > *last };
                if done {
                    return None;
                }
                let value = i32::try_from(*next).ok()?;
                *next += if *reverse { -1 } else { 1 };
                Some(Value::Int(value))
            }
        }
    }
}

struct Frame<'u> {
    unit: &'u CompiledUnit,
    stack: Vec<Value>,
    locals: Vec<Value>,
    iterators: Vec<Cursor>,
}

impl<'u> Frame<'u> {
    fn new(unit: &'u CompiledUnit, args: Vec<Value>) -> Self {
        let entry = &unit.payload.entry;
        let mut locals = args;
        locals.resize(usize::from(entry.locals).max(locals.len()), Value::Null);
        Self {
            unit,
            stack: Vec::with_capacity(16),
            locals,
            iterators: (0..entry.iterators).map(|_| Cursor::default()).collect(),
        }
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Step<Value> {
        self.stack
            .pop()
            .ok_or_else(|| Trap::Fault("operand stack underflow".into()))
    }

    fn peek(&self) -> Step<&Value> {
        self.stack
            .last()
            .ok_or_else(|| Trap::Fault("operand stack underflow".into()))
    }

    fn pop_many(&mut self, count: u16) -> Step<Vec<Value>> {
        let count = usize::from(count);
        let Some(at) = self.stack.len().checked_sub(count) else {
            return Err(Trap::Fault("operand stack underflow".into()));
        };
        Ok(self.stack.split_off(at))
    }

    fn local(&mut self, slot: u16) -> Step<&mut Value> {
        self.locals
            .get_mut(usize::from(slot))
            .ok_or_else(|| Trap::Fault(format!("local slot {slot} out of range")))
    }

    fn cursor(&mut self, slot: u16) -> Step<&mut Cursor> {
        self.iterators
            .get_mut(usize::from(slot))
            .ok_or_else(|| Trap::Fault(format!("iterator slot {slot} out of range")))
    }

    fn constant(&self, index: u32) -> Step<&'u Constant> {
        self.unit
            .payload
            .constants
            .get(index as usize)
            .ok_or_else(|| Trap::Fault(format!("constant #{index} out of range")))
    }

    fn type_constant(&self, index: u32) -> Step<&'u TypeRef> {
        match self.constant(index)? {
            Constant::Type(ty) => Ok(ty),
            other => Err(Trap::Fault(format!("constant #{index} is not a type: {other:?}"))),
        }
    }
}

fn constant_value(constant: &Constant) -> Step<Value> {
    Ok(match constant {
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(n) => Value::Int(*n),
        Constant::Long(n) => Value::Long(*n),
        Constant::Double(bits) => Value::Double(f64::from_bits(*bits)),
        Constant::Str(s) => Value::from(s.as_str()),
        other => return Err(Trap::Fault(format!("{other:?} is not a value"))),
    })
}

fn to_primitive(value: Value, to: Primitive) -> Step<Value> {
    Ok(match (to, value) {
        (Primitive::Int, same @ Value::Int(_))
        | (Primitive::Long, same @ Value::Long(_))
        | (Primitive::Double, same @ Value::Double(_))
        | (Primitive::Boolean, same @ Value::Bool(_)) => same,
        (Primitive::Int, Value::Long(n)) => Value::Int(n as i32),
        (Primitive::Int, Value::Double(n)) => Value::Int(n as i32),
        (Primitive::Long, Value::Int(n)) => Value::Long(i64::from(n)),
        (Primitive::Long, Value::Double(n)) => Value::Long(n as i64),
        (Primitive::Double, Value::Int(n)) => Value::Double(f64::from(n)),
        (Primitive::Double, Value::Long(n)) => Value::Double(n as f64),
        (to, value) => {
            return Err(Trap::Fault(format!("cannot convert {value} to {}", to.keyword())));
        }
    })
}

fn convert(value: Value, conversion: Conversion) -> Step<Value> {
    match conversion {
        Conversion::Widen(_, to) | Conversion::Narrow(_, to) => to_primitive(value, to),
        Conversion::Box(_) => Ok(value),
        Conversion::Unbox(p) if value.is_null() => {
            Err(Trap::Fault(format!("cannot unbox null to {}", p.keyword())))
        }
        Conversion::Unbox(p) => to_primitive(value, p),
    }
}

fn int_arith(op: ArithOp, a: i64, b: i64, wrap: impl Fn(i64) -> Value) -> Step<Value> {
    if matches!(op, ArithOp::Div | ArithOp::Rem) && b == 0 {
        return Err(Trap::Fault("division by zero".into()));
    }
    Ok(wrap(match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div => a.wrapping_div(b),
        ArithOp::Rem => a.wrapping_rem(b),
    }))
}

fn arith(op: ArithOp, prim: Primitive, lhs: Value, rhs: Value) -> Step<Value> {
    match (prim, &lhs, &rhs) {
        (Primitive::Int, Value::Int(a), Value::Int(b)) => {
            // Low 32 bits of the 64-bit result wrap the way `int` does.
            int_arith(op, i64::from(*a), i64::from(*b), |n| Value::Int(n as i32))
        }
        (Primitive::Long, Value::Long(a), Value::Long(b)) => int_arith(op, *a, *b, Value::Long),
        (Primitive::Double, Value::Double(a), Value::Double(b)) => Ok(Value::Double(match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Rem => a % b,
        })),
        _ => Err(Trap::Fault(format!(
            "bad operands for {} arithmetic: {lhs}, {rhs}",
            prim.keyword()
        ))),
    }
}

fn negate(prim: Primitive, value: Value) -> Step<Value> {
    match (prim, value) {
        (Primitive::Int, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (Primitive::Long, Value::Long(n)) => Ok(Value::Long(n.wrapping_neg())),
        (Primitive::Double, Value::Double(n)) => Ok(Value::Double(-n)),
        (_, value) => Err(Trap::Fault(format!("cannot negate {value}"))),
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Step<bool> {
    let ordering = match op {
        CompareOp::Eq => return Ok(lhs.loose_eq(rhs)),
        CompareOp::Ne => return Ok(!lhs.loose_eq(rhs)),
        _ => lhs.compare(rhs),
    };
    let Some(ordering) = ordering else {
        // NaN orders against nothing.
        if lhs.as_f64().is_some() && rhs.as_f64().is_some() {
            return Ok(false);
        }
        return Err(Trap::Fault(format!("cannot compare {lhs} with {rhs}")));
    };
    Ok(match op {
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Le => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    })
}

fn range_bounds(lo: &Value, hi: &Value) -> Step<(i32, i32)> {
    match (lo, hi) {
        (Value::Int(lo), Value::Int(hi)) => Ok((*lo, *hi)),
        _ => Err(Trap::Fault(format!("bad range bounds {lo}..{hi}"))),
    }
}

fn range(lo: &Value, hi: &Value) -> Step<Value> {
    let (lo, hi) = range_bounds(lo, hi)?;
    let len = (i64::from(hi) - i64::from(lo) + 1).max(0) as u64;
    if len > MAX_RANGE_LEN {
        return Err(Trap::Fault(format!(
            "range {lo}..{hi} has {len} elements, more than the {MAX_RANGE_LEN} allowed"
        )));
    }
    Ok(Value::list((lo..=hi).map(Value::Int).collect()))
}

fn index(target: &Value, index: &Value) -> Step<Value> {
    let Value::Int(at) = index else {
        return Err(Trap::Fault(format!("bad index {index}")));
    };
    let items = match target {
        Value::Null => return Err(Trap::Fault("cannot index into null".into())),
        Value::List(items) | Value::Array { items, .. } => items,
        other => return Err(Trap::Fault(format!("cannot index into {other}"))),
    };
    usize::try_from(*at)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or_else(|| {
            Trap::Fault(format!("index {at} out of bounds for length {}", items.len()))
        })
}

/// Executes units against one context, appending to one output buffer.
pub(crate) struct Machine<'a> {
    loader: &'a Loader,
    context: &'a MergedContext,
    output: String,
    depth: usize,
}

impl<'a> Machine<'a> {
    pub(crate) fn new(loader: &'a Loader, context: &'a MergedContext) -> Self {
        Self {
            loader,
            context,
            output: String::new(),
            depth: 0,
        }
    }

    pub(crate) fn into_output(self) -> String {
        self.output
    }

    /// Run `unit` with already-bound arguments.
    pub(crate) fn run(&mut self, unit: &CompiledUnit, args: Vec<Value>) -> RuntimeResult<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::InvocationFailure {
                template: unit.name.clone(),
                message: format!("template calls nested deeper than {MAX_CALL_DEPTH}"),
            });
        }
        self.depth += 1;
        let result = self.execute(Frame::new(unit, args));
        self.depth -= 1;
        result.map_err(|trap| match trap {
            Trap::Fault(message) => RuntimeError::InvocationFailure {
                template: unit.name.clone(),
                message,
            },
            Trap::Nested(error) => error,
        })
    }

    fn call_template(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let unit = self
            .loader
            .lookup(name)
            .ok_or_else(|| RuntimeError::TemplateNotFound(name.to_string()))?;
        let args = bind_arguments(&unit, self.context.classes(), args)?;
        tracing::trace!(template = name, depth = self.depth, "call");
        self.run(&unit, args)
    }

    fn execute(&mut self, mut frame: Frame<'_>) -> Step<Value> {
        let unit = frame.unit;
        let code = &unit.payload.code;
        let mut pc = unit.payload.entry.entry as usize;
        loop {
            let instr = code
                .get(pc)
                .ok_or_else(|| Trap::Fault(format!("no instruction at {pc}")))?;
            pc += 1;
            match instr {
                Instr::Const(index) => {
                    let value = constant_value(frame.constant(*index)?)?;
                    frame.push(value);
                }
                Instr::Null => frame.push(Value::Null),
                Instr::Load(slot) => {
                    let value = frame.local(*slot)?.clone();
                    frame.push(value);
                }
                Instr::Store(slot) => {
                    let value = frame.pop()?;
                    *frame.local(*slot)? = value;
                }
                Instr::Pop => {
                    frame.pop()?;
                }
                Instr::Dup => {
                    let value = frame.peek()?.clone();
                    frame.push(value);
                }
                Instr::Emit => {
                    let value = frame.pop()?;
                    if !value.is_null() {
                        let _ = write!(self.output, "{value}");
                    }
                }
                Instr::Jump(to) => pc = *to as usize,
                Instr::JumpIfFalse(to) => {
                    if !frame.pop()?.is_truthy() {
                        pc = *to as usize;
                    }
                }
                Instr::JumpIfTrue(to) => {
                    if frame.pop()?.is_truthy() {
                        pc = *to as usize;
                    }
                }
                Instr::JumpIfNull(to) => {
                    if frame.peek()?.is_null() {
                        pc = *to as usize;
                    }
                }
                Instr::JumpIfNotNull(to) => {
                    if !frame.peek()?.is_null() {
                        pc = *to as usize;
                    }
                }
                Instr::Convert(conversion) => {
                    let value = frame.pop()?;
                    frame.push(convert(value, *conversion)?);
                }
                Instr::Arith(op, prim) => {
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    frame.push(arith(*op, *prim, lhs, rhs)?);
                }
                Instr::Negate(prim) => {
                    let value = frame.pop()?;
                    frame.push(negate(*prim, value)?);
                }
                Instr::Not => {
                    let value = frame.pop()?;
                    frame.push(Value::Bool(!value.is_truthy()));
                }
                Instr::Concat => {
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    frame.push(Value::from(format!("{lhs}{rhs}")));
                }
                Instr::Compare(op) => {
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    frame.push(Value::Bool(compare(*op, &lhs, &rhs)?));
                }
                Instr::Compare3 => {
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    let ordering = lhs
                        .three_way(&rhs)
                        .ok_or_else(|| Trap::Fault(format!("cannot compare {lhs} with {rhs}")))?;
                    frame.push(Value::Int(ordering as i32));
                }
                Instr::NewList(len) => {
                    let items = frame.pop_many(*len)?;
                    frame.push(Value::list(items));
                }
                Instr::NewSet(len) => {
                    let items = frame.pop_many(*len)?;
                    frame.push(Value::set(items));
                }
                Instr::NewArray { elem, len } => {
                    let elem = frame.type_constant(*elem)?.clone();
                    let items = frame.pop_many(*len)?;
                    frame.push(Value::Array {
                        elem,
                        items: Arc::new(items),
                    });
                }
                Instr::Range => {
                    let hi = frame.pop()?;
                    let lo = frame.pop()?;
                    frame.push(range(&lo, &hi)?);
                }
                Instr::Index => {
                    let at = frame.pop()?;
                    let target = frame.pop()?;
                    frame.push(index(&target, &at)?);
                }
                Instr::ArrayLength => match frame.pop()? {
                    Value::Array { items, .. } => frame.push(Value::Int(items.len() as i32)),
                    other => return Err(Trap::Fault(format!("{other} is not an array"))),
                },
                Instr::InstanceOf(ty) => {
                    let ty = frame.type_constant(*ty)?;
                    let value = frame.pop()?;
                    let matches = value
                        .runtime_type()
                        .is_some_and(|actual| self.context.classes().is_assignable(&actual, ty));
                    frame.push(Value::Bool(matches));
                }
                Instr::CheckCast(ty) => {
                    let ty = frame.type_constant(*ty)?;
                    if let Some(actual) = frame.peek()?.runtime_type()
                        && !self.context.classes().is_assignable(&actual, ty)
                    {
                        return Err(Trap::Fault(format!("cannot cast `{actual}` to `{ty}`")));
                    }
                }
                Instr::InvokeContext { member, argc } => {
                    let Constant::Member(member) = frame.constant(*member)? else {
                        return Err(Trap::Fault(format!("constant #{member} is not a member")));
                    };
                    let args = frame.pop_many(*argc)?;
                    let value = self.context.dispatch(member, args)?;
                    frame.push(value);
                }
                Instr::InvokeMethod { method, argc } => {
                    let Constant::Method(method) = frame.constant(*method)? else {
                        return Err(Trap::Fault(format!("constant #{method} is not a method")));
                    };
                    let args = frame.pop_many(*argc)?;
                    let receiver = frame.pop()?;
                    frame.push(builtins::invoke_method(&receiver, method, args)?);
                }
                Instr::CallTemplate { template, argc } => {
                    let Constant::Template(name) = frame.constant(*template)? else {
                        return Err(Trap::Fault(format!("constant #{template} is not a template")));
                    };
                    let args = frame.pop_many(*argc)?;
                    let value = self.call_template(name, args)?;
                    frame.push(value);
                }
                Instr::IterInit { slot, reverse } => {
                    let items = match frame.pop()? {
                        Value::Null => Arc::default(),
                        value => match value.elements() {
                            Some(items) => Arc::clone(items),
                            None => return Err(Trap::Fault(format!("cannot iterate over {value}"))),
                        },
                    };
                    *frame.cursor(*slot)? = Cursor::Items {
                        items,
                        next: 0,
                        reverse: *reverse,
                    };
                }
                Instr::IterRange { slot, reverse } => {
                    let hi = frame.pop()?;
                    let lo = frame.pop()?;
                    let (lo, hi) = range_bounds(&lo, &hi)?;
                    *frame.cursor(*slot)? = Cursor::range(lo, hi, *reverse);
                }
                Instr::IterNext { slot, exit } => match frame.cursor(*slot)?.advance() {
                    Some(value) => frame.push(value),
                    None => pc = *exit as usize,
                },
                Instr::Return => return frame.pop(),
            }
        }
    }
}
