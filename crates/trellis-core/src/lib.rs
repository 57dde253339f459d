//! Shared data model for the Trellis template compiler.
//!
//! Every pipeline crate speaks in terms of the types defined here: source
//! spans and diagnostics, static types and member signatures, runtime values,
//! and the [`CompiledUnit`] contract between the code generator and the
//! runtime loader.

pub mod database;
pub mod diagnostic;
pub mod fingerprint;
pub mod signature;
pub mod span;
pub mod types;
pub mod unit;
pub mod value;

pub use database::{SourceTemplate, TemplateSet};
pub use diagnostic::{CompilationPhase, Diagnostic, DiagnosticKind, Severity};
pub use fingerprint::{Fingerprint, FingerprintBuilder};
pub use signature::Signature;
pub use span::{Span, Spanned};
pub use types::{Primitive, TypeArg, TypeRef};
pub use unit::{CompiledTemplate, CompiledUnit, Dependency, UnitCodecError};
pub use value::{HostError, HostObject, Value};

pub type Identifier = String;
