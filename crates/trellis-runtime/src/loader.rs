//! The name-indexed table of loaded units.
//!
//! Replacing a unit swaps an `Arc`: invocations that already looked the old
//! unit up keep running it, later lookups see the new one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use trellis_context::{ClassTable, MergedContext};
use trellis_core::{CompiledUnit, Primitive, TypeRef, Value};

use crate::error::{RuntimeError, RuntimeResult};
use crate::vm::Machine;

#[derive(Clone, Debug)]
struct Slot {
    unit: Arc<CompiledUnit>,
    version: u64,
}

/// Result of a successful invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    /// Text emitted by the template and everything it called.
    pub output: String,
    /// The template's result value (`null` for void templates).
    pub value: Value,
}

#[derive(Debug, Default)]
pub struct Loader {
    units: DashMap<String, Slot>,
    next_version: AtomicU64,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `unit` under its name, replacing any previous unit. Returns
    /// the version assigned to it.
    pub fn load(&self, unit: CompiledUnit) -> u64 {
        self.load_shared(Arc::new(unit))
    }

    pub fn load_shared(&self, unit: Arc<CompiledUnit>) -> u64 {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        let name = unit.name.clone();
        let fingerprint = unit.fingerprint;
        let previous = self.units.insert(name.clone(), Slot { unit, version });
        match previous {
            Some(old) => tracing::info!(
                template = %name,
                %fingerprint,
                from = old.version,
                to = version,
                "replaced loaded unit"
            ),
            None => tracing::debug!(template = %name, %fingerprint, version, "loaded unit"),
        }
        version
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<CompiledUnit>> {
        self.units.get(name).map(|slot| Arc::clone(&slot.unit))
    }

    /// Version of the unit currently installed under `name`.
    pub fn version(&self, name: &str) -> Option<u64> {
        self.units.get(name).map(|slot| slot.version)
    }

    /// Loaded template names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.units.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Run the template called `name` against `context`.
    pub fn invoke(
        &self,
        name: &str,
        context: &MergedContext,
        args: Vec<Value>,
    ) -> RuntimeResult<Invocation> {
        let unit = self
            .lookup(name)
            .ok_or_else(|| RuntimeError::TemplateNotFound(name.to_string()))?;
        self.invoke_unit(&unit, context, args)
    }

    /// Run `unit` directly; template calls inside it still resolve through
    /// this loader.
    pub fn invoke_unit(
        &self,
        unit: &CompiledUnit,
        context: &MergedContext,
        args: Vec<Value>,
    ) -> RuntimeResult<Invocation> {
        let args = bind_arguments(unit, context.classes(), args)?;
        let mut machine = Machine::new(self, context);
        let value = machine.run(unit, args)?;
        Ok(Invocation {
            output: machine.into_output(),
            value,
        })
    }
}

fn describe(value: &Value) -> String {
    value
        .runtime_type()
        .map_or_else(|| "null".to_string(), |ty| ty.to_string())
}

/// Check `args` against the unit's parameters and widen numeric arguments
/// bound to primitive parameters.
pub(crate) fn bind_arguments(
    unit: &CompiledUnit,
    classes: &ClassTable,
    args: Vec<Value>,
) -> RuntimeResult<Vec<Value>> {
    let params: Vec<&TypeRef> = unit.params().collect();
    let mismatch = |args: &[Value]| RuntimeError::SignatureMismatch {
        template: unit.name.clone(),
        expected: params
            .iter()
            .map(|ty| ty.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        found: args.iter().map(describe).collect::<Vec<_>>().join(", "),
    };
    if args.len() != params.len() {
        return Err(mismatch(&args));
    }
    let mut bound = Vec::with_capacity(args.len());
    for (arg, ty) in args.iter().zip(&params) {
        let accepted = match ty.as_primitive() {
            Some(prim) if ty.is_primitive() => bind_primitive(arg, prim),
            _ => match arg.runtime_type() {
                None => Some(Value::Null),
                Some(actual) => classes
                    .is_assignable(&actual, &ty.boxed().erased())
                    .then(|| arg.clone()),
            },
        };
        match accepted {
            Some(value) => bound.push(value),
            None => return Err(mismatch(&args)),
        }
    }
    Ok(bound)
}

fn bind_primitive(arg: &Value, prim: Primitive) -> Option<Value> {
    match (prim, arg) {
        (Primitive::Boolean, Value::Bool(_))
        | (Primitive::Int, Value::Int(_))
        | (Primitive::Long, Value::Long(_))
        | (Primitive::Double, Value::Double(_)) => Some(arg.clone()),
        (Primitive::Long, Value::Int(n)) => Some(Value::Long(i64::from(*n))),
        (Primitive::Double, Value::Int(n)) => Some(Value::Double(f64::from(*n))),
        (Primitive::Double, Value::Long(n)) => Some(Value::Double(*n as f64)),
        _ => None,
    }
}
