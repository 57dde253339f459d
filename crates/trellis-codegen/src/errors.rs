//! Error types for code generation.
//!
//! The analyzer rejects every ill-typed template, so these only fire on
//! templates that exceed the limits of the unit format.

use derive_more::{Display, Error};
use trellis_core::Span;

pub type CodegenResult<T> = Result<T, CodegenError>;

#[derive(Clone, Debug, Display, Error, PartialEq, Eq)]
#[display("{kind}")]
pub struct CodegenError {
    pub kind: CodegenErrorKind,
    pub span: Span,
}

#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum CodegenErrorKind {
    #[display("template needs more than {} constants", u32::MAX)]
    TooManyConstants,
    #[display("template has more than {} instructions", u32::MAX)]
    CodeTooLarge,
    #[display("{what} count {count} exceeds the limit of {}", u16::MAX)]
    TooMany { what: &'static str, count: usize },
    #[display("null-safe access outside a null-safe chain")]
    GuardOutsideChain,
    #[display("jump to a label that was never placed")]
    UnplacedLabel,
}

impl CodegenError {
    pub(crate) fn new(kind: CodegenErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}
