//! Diagnostic messages emitted during compilation.

use crate::span::Span;

/// A diagnostic message (error or warning) attached to one template.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[salsa::accumulator]
pub struct Diagnostic {
    pub template: String,
    pub message: String,
    pub span: Span,
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub phase: CompilationPhase,
}

/// Severity level of a diagnostic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

/// What went wrong, independent of the message text.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    LexError,
    SyntaxError,
    UnresolvedSymbol,
    AmbiguousCall,
    TypeMismatch,
    CodegenError,
    NameMismatch,
    UnreachableCode,
    SourceNotFound,
    StoreError,
}

/// Compilation phase where a diagnostic was emitted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompilationPhase {
    Lexing,
    Parsing,
    Analysis,
    Codegen,
    /// Reading sources and persisting units.
    Driver,
}

impl Diagnostic {
    pub fn error(
        template: impl Into<String>,
        kind: DiagnosticKind,
        phase: CompilationPhase,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self {
            template: template.into(),
            message: message.into(),
            span,
            severity: Severity::Error,
            kind,
            phase,
        }
    }

    pub fn warning(
        template: impl Into<String>,
        kind: DiagnosticKind,
        phase: CompilationPhase,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(template, kind, phase, span, message)
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn line(&self) -> u32 {
        self.span.line
    }

    pub fn column(&self) -> u32 {
        self.span.column
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.template, self.span.line, self.span.column, self.severity, self.message
        )
    }
}
