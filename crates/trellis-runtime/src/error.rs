use derive_more::{Display, Error};

/// Failure of an invocation, surfaced synchronously to the caller.
#[derive(Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// The arguments do not fit the unit's declared parameters; raised
    /// before any template code runs.
    #[display("template `{template}` expects ({expected}) but was invoked with ({found})")]
    SignatureMismatch {
        template: String,
        expected: String,
        found: String,
    },
    /// Template code failed: a host error, a failed cast or unboxing, an
    /// index out of range, division by zero, or runaway recursion.
    #[display("template `{template}` failed: {message}")]
    InvocationFailure { template: String, message: String },
    #[display("no template named `{_0}` is loaded")]
    TemplateNotFound(#[error(not(source))] String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
