use std::sync::Arc;

use salsa::Accumulator;
use trellis_context::Db;
use trellis_core::{CompilationPhase, CompiledTemplate, Diagnostic, DiagnosticKind, SourceTemplate};
use trellis_hir::check_template;

use crate::lower::lower_template;

/// Compile one template down to its unit payload.
///
/// `None` when any earlier phase failed or lowering hit a format limit.
#[salsa::tracked]
pub fn compile_unit(db: &dyn Db, source: SourceTemplate) -> Option<Arc<CompiledTemplate>> {
    let typed = check_template(db, source)?;
    match lower_template(&typed) {
        Ok(compiled) => Some(Arc::new(compiled)),
        Err(error) => {
            Diagnostic::error(
                typed.name.as_str(),
                DiagnosticKind::CodegenError,
                CompilationPhase::Codegen,
                error.span,
                error.to_string(),
            )
            .accumulate(db);
            None
        }
    }
}

/// Every diagnostic produced while compiling `source`, in pipeline order.
#[salsa::tracked]
pub fn compile_diagnostics(db: &dyn Db, source: SourceTemplate) -> Vec<Diagnostic> {
    let _ = compile_unit(db, source);
    compile_unit::accumulated::<Diagnostic>(db, source)
        .into_iter()
        .cloned()
        .collect()
}
