//! Semantic analysis for Trellis templates.
//!
//! [`check_template`] resolves names, types every expression and picks an
//! overload for every call, producing a [`TypedTemplate`] for the code
//! generator.

mod check;
pub mod error;
pub mod hir;
pub mod queries;
pub mod scope;

pub use check::Checker;
pub use error::ResolveError;
pub use hir::*;
pub use queries::{analysis_diagnostics, check_template};
