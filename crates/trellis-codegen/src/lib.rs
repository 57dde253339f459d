//! Code generation: typed templates to compiled-unit payloads.

pub mod disasm;
pub mod errors;
pub mod lower;
pub mod queries;

#[cfg(test)]
mod tests;

pub use disasm::{Disassembly, disassemble, render_constant};
pub use errors::{CodegenError, CodegenErrorKind, CodegenResult};
pub use lower::lower_template;
pub use queries::{compile_diagnostics, compile_unit};
