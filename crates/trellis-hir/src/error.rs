use derive_more::{Display, Error};
use trellis_context::OverloadError;
use trellis_core::DiagnosticKind;

/// An error found while resolving and type-checking a template.
#[derive(Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[display("{_0}")]
    UnresolvedSymbol(#[error(not(source))] String),
    #[display("{_0}")]
    AmbiguousCall(OverloadError),
    #[display("{_0}")]
    TypeMismatch(#[error(not(source))] String),
}

impl ResolveError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            ResolveError::UnresolvedSymbol(_) => DiagnosticKind::UnresolvedSymbol,
            ResolveError::AmbiguousCall(_) => DiagnosticKind::AmbiguousCall,
            ResolveError::TypeMismatch(_) => DiagnosticKind::TypeMismatch,
        }
    }
}

impl From<OverloadError> for ResolveError {
    fn from(error: OverloadError) -> Self {
        match error {
            OverloadError::Ambiguous { .. } => ResolveError::AmbiguousCall(error),
            OverloadError::NoMatch { .. } => ResolveError::TypeMismatch(error.to_string()),
        }
    }
}
