//! Host capability contributors.
//!
//! A contributor publishes a list of member signatures (and optionally extra
//! classes) and executes calls routed to it by the merged context's
//! dispatcher. Rust has no runtime reflection, so every contributor is
//! declarative; [`FnContributor`] covers the common case of a set of closures.

use std::fmt;
use std::sync::Arc;

use trellis_core::{HostError, Signature, Value};

use crate::classes::ClassDef;

pub trait Contributor: Send + Sync {
    /// Members this contributor declares, in priority order.
    fn members(&self) -> Vec<Signature>;

    /// Classes this contributor adds to the class table.
    fn classes(&self) -> Vec<ClassDef> {
        Vec::new()
    }

    /// Execute one of the declared members. For variadic members the trailing
    /// arguments arrive packed into a single array value.
    fn invoke(&self, member: &Signature, args: Vec<Value>) -> Result<Value, HostError>;
}

pub type HostFn = Arc<dyn Fn(&[Value]) -> Result<Value, HostError> + Send + Sync>;

/// A contributor assembled from closures.
#[derive(Clone, Default)]
pub struct FnContributor {
    functions: Vec<(Signature, HostFn)>,
    classes: Vec<ClassDef>,
}

impl FnContributor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function<F>(mut self, signature: Signature, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        self.functions.push((signature, Arc::new(function)));
        self
    }

    pub fn class(mut self, def: ClassDef) -> Self {
        self.classes.push(def);
        self
    }
}

impl Contributor for FnContributor {
    fn members(&self) -> Vec<Signature> {
        self.functions.iter().map(|(sig, _)| sig.clone()).collect()
    }

    fn classes(&self) -> Vec<ClassDef> {
        self.classes.clone()
    }

    fn invoke(&self, member: &Signature, args: Vec<Value>) -> Result<Value, HostError> {
        let (_, function) = self
            .functions
            .iter()
            .find(|(sig, _)| sig == member)
            .ok_or_else(|| HostError::new(format!("no member `{member}`")))?;
        function(&args)
    }
}

impl fmt::Debug for FnContributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnContributor")
            .field("members", &self.members())
            .field("classes", &self.classes)
            .finish()
    }
}

/// Positional argument accessors for host functions.
pub mod args {
    use trellis_core::{HostError, Value};

    pub fn get(args: &[Value], index: usize) -> Result<&Value, HostError> {
        args.get(index)
            .ok_or_else(|| HostError::new(format!("missing argument {index}")))
    }

    pub fn string(args: &[Value], index: usize) -> Result<&str, HostError> {
        match get(args, index)? {
            Value::Str(s) => Ok(&**s),
            Value::Null => Err(HostError::new(format!("argument {index} is null"))),
            other => Err(HostError::new(format!(
                "argument {index}: expected a string, found {other}"
            ))),
        }
    }

    pub fn int(args: &[Value], index: usize) -> Result<i32, HostError> {
        match get(args, index)? {
            Value::Int(n) => Ok(*n),
            other => Err(HostError::new(format!(
                "argument {index}: expected an int, found {other}"
            ))),
        }
    }

    pub fn long(args: &[Value], index: usize) -> Result<i64, HostError> {
        get(args, index)?
            .as_i64()
            .ok_or_else(|| HostError::new(format!("argument {index}: expected a long")))
    }

    pub fn double(args: &[Value], index: usize) -> Result<f64, HostError> {
        get(args, index)?
            .as_f64()
            .ok_or_else(|| HostError::new(format!("argument {index}: expected a double")))
    }

    /// Elements of a packed variadic tail (or any list/set/array argument).
    pub fn elements(args: &[Value], index: usize) -> Result<&[Value], HostError> {
        match get(args, index)? {
            Value::Null => Ok(&[]),
            value => value.elements().map(|items| items.as_slice()).ok_or_else(|| {
                HostError::new(format!("argument {index}: expected a collection"))
            }),
        }
    }
}
