//! Loading and executing compiled Trellis units.

pub mod builtins;
pub mod error;
pub mod loader;
pub mod vm;

#[cfg(test)]
mod tests;

pub use error::{RuntimeError, RuntimeResult};
pub use loader::{Invocation, Loader};
pub use vm::MAX_CALL_DEPTH;
