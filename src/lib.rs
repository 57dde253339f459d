//! Trellis: a statically typed template language.
//!
//! This crate ties the pipeline together. A [`Compiler`] reads templates
//! from a [`SourceSet`], compiles the ones whose fingerprint changed, stores
//! the resulting units in a [`UnitStore`] and hands them to a [`Loader`] for
//! execution.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use trellis::{Compiler, DirectorySource, Loader, MemoryStore, MergedContext, SourceSet};
//!
//! let loader = Arc::new(Loader::new());
//! let compiler = Compiler::new(
//!     MergedContext::base_only(),
//!     SourceSet::new().with(DirectorySource::new("templates")),
//!     Arc::new(MemoryStore::new()),
//! )
//! .with_loader(Arc::clone(&loader));
//! let report = compiler.compile_all(false);
//! assert!(report.is_success());
//! let page = loader.invoke("index", compiler.context(), vec![]).unwrap();
//! print!("{}", page.output);
//! ```

pub mod args;
pub mod config;
pub mod database;
pub mod diagnostics;
pub mod driver;
pub mod source;
pub mod store;

pub use config::{CompilerConfig, Config, ConfigError};
pub use database::TemplateDatabase;
pub use driver::{
    CompileReport, Compiler, DiagnosticSink, DiagnosticStream, Status, TemplateOutcome,
};
pub use source::{DirectorySource, MemorySource, SourceError, SourceProvider, SourceSet};
pub use store::{DirectoryStore, MemoryStore, StoreError, UnitStore};
pub use trellis_context::{Contributor, FnContributor, MergedContext, MergedContextBuilder};
pub use trellis_core::{CompiledUnit, Diagnostic, DiagnosticKind, Value};
pub use trellis_runtime::{Invocation, Loader, RuntimeError};
