//! Salsa queries over template sources.

use std::sync::Arc;

use salsa::Accumulator;
use trellis_context::Db;
use trellis_core::{CompilationPhase, Diagnostic, DiagnosticKind, SourceTemplate};

use crate::ast::{TemplateDecl, TemplateHeader};
use crate::parser::{self, ParseError, default_name};

/// Parse a template, reporting lexical and syntax errors as diagnostics.
#[salsa::tracked]
pub fn parse_template(db: &dyn Db, source: SourceTemplate) -> Option<Arc<TemplateDecl>> {
    let name = source.name(db);
    let classes = db.context().classes();
    match parser::parse(name, source.text(db), classes) {
        Ok(decl) => {
            let expected = default_name(name);
            if let Some(span) = decl.header.filter(|_| decl.name != expected) {
                Diagnostic::warning(
                    name.as_str(),
                    DiagnosticKind::NameMismatch,
                    CompilationPhase::Parsing,
                    span,
                    format!(
                        "template declares name `{}` but its source is named `{expected}`",
                        decl.name
                    ),
                )
                .accumulate(db);
            }
            Some(Arc::new(decl))
        }
        Err(ParseError::Lex(err)) => {
            Diagnostic::error(
                name.as_str(),
                DiagnosticKind::LexError,
                CompilationPhase::Lexing,
                err.span,
                err.message(),
            )
            .accumulate(db);
            None
        }
        Err(ParseError::Syntax(err)) => {
            Diagnostic::error(
                name.as_str(),
                DiagnosticKind::SyntaxError,
                CompilationPhase::Parsing,
                err.position,
                err.message(),
            )
            .accumulate(db);
            None
        }
    }
}

/// The header of a template, for callers type-checking `call` expressions.
///
/// Reports nothing: errors in the callee belong to the callee's own
/// compilation.
#[salsa::tracked]
pub fn template_header(db: &dyn Db, source: SourceTemplate) -> Option<Arc<TemplateHeader>> {
    parser::parse_header(source.name(db), source.text(db), db.context().classes())
        .ok()
        .map(Arc::new)
}

/// Look a template up by name in the database's template set.
pub fn find_template(db: &dyn Db, name: &str) -> Option<SourceTemplate> {
    db.template_set()?.templates(db).get(name).copied()
}
