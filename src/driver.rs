//! The compiler driver.
//!
//! A batch syncs every provided source into the salsa database, then walks
//! the requested names in sorted order. Each template passes a fingerprint
//! gate first: its source hash plus the state of every dependency recorded
//! in its last successful unit. Template dependencies are read from a
//! snapshot taken when the batch starts, so a dependent notices a callee's
//! change on its next check rather than in the batch that rebuilt the callee.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Condvar, Mutex};
use trellis_codegen::{compile_diagnostics, compile_unit};
use trellis_context::MergedContext;
use trellis_core::{
    CompilationPhase, CompiledUnit, Dependency, Diagnostic, DiagnosticKind, Fingerprint,
    FingerprintBuilder, Span,
};
use trellis_runtime::Loader;

use crate::database::TemplateDatabase;
use crate::source::{SourceProvider, SourceSet};
use crate::store::{StoreError, UnitStore};

/// Receives diagnostics as soon as each template finishes.
pub type DiagnosticSink<'a> = dyn FnMut(&Diagnostic) + 'a;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Compiled,
    /// Fingerprint unchanged; the recorded unit stays current.
    Skipped,
    Failed,
}

#[derive(Clone, Debug)]
pub struct TemplateOutcome {
    pub name: String,
    pub status: Status,
    pub diagnostics: Vec<Diagnostic>,
    /// The unit now current for this name, if any.
    pub unit: Option<Arc<CompiledUnit>>,
}

impl TemplateOutcome {
    fn failed(name: &str, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            name: name.to_string(),
            status: Status::Failed,
            diagnostics,
            unit: None,
        }
    }
}

fn driver_error(name: &str, kind: DiagnosticKind, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(name, kind, CompilationPhase::Driver, Span::default(), message)
}

/// Summary of one batch.
#[derive(Clone, Debug, Default)]
pub struct CompileReport {
    pub considered: usize,
    /// Templates rebuilt by this batch.
    pub compiled: Vec<String>,
    pub skipped: Vec<String>,
    /// Templates with a current, error-free unit (compiled or skipped).
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub errors: usize,
    pub warnings: usize,
    pub diagnostics: BTreeMap<String, Vec<Diagnostic>>,
}

impl CompileReport {
    fn record(&mut self, outcome: TemplateOutcome) {
        self.considered += 1;
        let errors = outcome.diagnostics.iter().filter(|d| d.is_error()).count();
        self.errors += errors;
        self.warnings += outcome.diagnostics.len() - errors;
        match outcome.status {
            Status::Compiled => {
                self.compiled.push(outcome.name.clone());
                self.succeeded.push(outcome.name.clone());
            }
            Status::Skipped => {
                self.skipped.push(outcome.name.clone());
                self.succeeded.push(outcome.name.clone());
            }
            Status::Failed => self.failed.push(outcome.name.clone()),
        }
        self.diagnostics.insert(outcome.name, outcome.diagnostics);
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Every diagnostic of the batch, template by template.
    pub fn iter_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.values().flatten()
    }
}

#[derive(Default)]
enum FlightState {
    #[default]
    Running,
    Done(TemplateOutcome),
    Abandoned,
}

/// One in-progress compilation that concurrent requests for the same name
/// wait on.
#[derive(Default)]
struct Flight {
    state: Mutex<FlightState>,
    done: Condvar,
}

impl Flight {
    fn wait(&self, name: &str) -> TemplateOutcome {
        let mut state = self.state.lock();
        while matches!(*state, FlightState::Running) {
            self.done.wait(&mut state);
        }
        match &*state {
            FlightState::Done(outcome) => outcome.clone(),
            FlightState::Running | FlightState::Abandoned => TemplateOutcome::failed(
                name,
                vec![driver_error(
                    name,
                    DiagnosticKind::CodegenError,
                    "the compilation this request joined did not finish",
                )],
            ),
        }
    }

    fn settle(&self, state: FlightState) {
        *self.state.lock() = state;
        self.done.notify_all();
    }
}

/// Removes the in-flight entry on every exit path, including unwinding.
struct Landing<'a> {
    in_flight: &'a DashMap<String, Arc<Flight>>,
    name: &'a str,
    flight: Arc<Flight>,
    settled: bool,
}

impl Landing<'_> {
    fn land(mut self, outcome: &TemplateOutcome) {
        self.flight.settle(FlightState::Done(outcome.clone()));
        self.settled = true;
    }
}

impl Drop for Landing<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(self.name);
        if !self.settled {
            self.flight.settle(FlightState::Abandoned);
        }
    }
}

pub struct Compiler {
    namespace: String,
    context: Arc<MergedContext>,
    sources: SourceSet,
    store: Arc<dyn UnitStore>,
    loader: Option<Arc<Loader>>,
    db: Mutex<TemplateDatabase>,
    /// Last successful unit per template.
    records: DashMap<String, Arc<CompiledUnit>>,
    in_flight: DashMap<String, Arc<Flight>>,
}

impl Compiler {
    pub fn new(context: MergedContext, sources: SourceSet, store: Arc<dyn UnitStore>) -> Self {
        let context = Arc::new(context);
        Self {
            namespace: "default".to_string(),
            db: Mutex::new(TemplateDatabase::new(Arc::clone(&context))),
            context,
            sources,
            store,
            loader: None,
            records: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Load every successfully compiled unit into `loader`.
    pub fn with_loader(mut self, loader: Arc<Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn context(&self) -> &MergedContext {
        &self.context
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn loader(&self) -> Option<&Arc<Loader>> {
        self.loader.as_ref()
    }

    /// The recorded unit for `name`.
    pub fn unit(&self, name: &str) -> Option<Arc<CompiledUnit>> {
        self.records.get(name).map(|unit| Arc::clone(&unit))
    }

    /// Every template name the providers offer.
    pub fn template_names(&self) -> BTreeSet<String> {
        self.sources.names()
    }

    /// Rehydrate recorded units (and the loader) from the store. Returns the
    /// number of units restored; unreadable units are skipped.
    pub fn restore(&self) -> Result<usize, StoreError> {
        let mut restored = 0;
        for name in self.store.list(&self.namespace)? {
            let unit = match self.store.read(&self.namespace, &name) {
                Ok(Some(unit)) => Arc::new(unit),
                Ok(None) => continue,
                Err(error) => {
                    tracing::warn!(template = %name, %error, "skipping unreadable unit");
                    continue;
                }
            };
            if let Some(loader) = &self.loader {
                loader.load_shared(Arc::clone(&unit));
            }
            self.records.insert(name, unit);
            restored += 1;
        }
        tracing::info!(namespace = %self.namespace, restored, "restored units");
        Ok(restored)
    }

    pub fn compile_all(&self, force: bool) -> CompileReport {
        self.compile_all_with(force, &mut |_| {})
    }

    pub fn compile_all_with(&self, force: bool, sink: &mut DiagnosticSink<'_>) -> CompileReport {
        let names = self.sources.names();
        self.compile_with(names, force, sink)
    }

    pub fn compile<I, S>(&self, names: I, force: bool) -> CompileReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compile_with(names, force, &mut |_| {})
    }

    pub fn compile_with<I, S>(&self, names: I, force: bool, sink: &mut DiagnosticSink<'_>) -> CompileReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut stream = self.stream(names, force);
        for diagnostic in &mut stream {
            sink(&diagnostic);
        }
        stream.finish()
    }

    /// Start a batch whose diagnostics are produced lazily: each template is
    /// compiled only when the stream is pulled past the previous one's
    /// diagnostics.
    pub fn stream<I, S>(&self, names: I, force: bool) -> DiagnosticStream<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        let span = tracing::info_span!("batch", namespace = %self.namespace, requested = names.len(), force);
        let batch = span.in_scope(|| Batch {
            force,
            texts: self.sync(),
            snapshot: self
                .records
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().source_hash))
                .collect(),
        });
        DiagnosticStream {
            compiler: self,
            names: names.into_iter(),
            batch,
            pending: VecDeque::new(),
            report: CompileReport::default(),
            span,
        }
    }

    /// Mirror the providers into the database. Returns the text of every
    /// readable source.
    fn sync(&self) -> BTreeMap<String, String> {
        let mut texts = BTreeMap::new();
        for name in self.sources.names() {
            match self.sources.read(&name) {
                Ok(text) => {
                    texts.insert(name, text);
                }
                Err(error) => tracing::warn!(template = %name, %error, "cannot read source"),
            }
        }
        let mut db = self.db.lock();
        for stale in db.names() {
            if !texts.contains_key(&stale) {
                tracing::debug!(template = %stale, "source disappeared");
                db.remove_source(&stale);
            }
        }
        for (name, text) in &texts {
            db.set_source(name, text);
        }
        texts
    }

    /// Build `name`, or join a build of it already running elsewhere.
    fn compile_one(&self, name: &str, batch: &Batch) -> TemplateOutcome {
        let flight = match self.in_flight.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let flight = Arc::clone(entry.get());
                drop(entry);
                tracing::debug!(template = name, "joining in-flight compilation");
                return flight.wait(name);
            }
            Entry::Vacant(entry) => {
                let flight = Arc::new(Flight::default());
                entry.insert(Arc::clone(&flight));
                flight
            }
        };
        let landing = Landing {
            in_flight: &self.in_flight,
            name,
            flight,
            settled: false,
        };
        let outcome = self.build(name, batch);
        landing.land(&outcome);
        outcome
    }

    fn build(&self, name: &str, batch: &Batch) -> TemplateOutcome {
        let span = tracing::debug_span!("template", name);
        let _enter = span.enter();

        let Some(text) = batch.texts.get(name) else {
            let message = match self.sources.read(name) {
                Err(error) => error.to_string(),
                Ok(_) => format!("source of template `{name}` appeared mid-batch"),
            };
            return TemplateOutcome::failed(
                name,
                vec![driver_error(name, DiagnosticKind::SourceNotFound, message)],
            );
        };
        let source_hash = Fingerprint::of(text);

        if !batch.force
            && let Some(record) = self.unit(name)
        {
            let fingerprint = self.fingerprint(name, source_hash, &record.dependencies, batch);
            if fingerprint == record.fingerprint {
                tracing::debug!(%fingerprint, "unchanged, skipping");
                return TemplateOutcome {
                    name: name.to_string(),
                    status: Status::Skipped,
                    diagnostics: Vec::new(),
                    unit: Some(record),
                };
            }
            tracing::debug!(old = %record.fingerprint, new = %fingerprint, "fingerprint changed");
        }

        let (compiled, mut diagnostics) = {
            let mut db = self.db.lock();
            let source = db.set_source(name, text);
            (compile_unit(&*db, source), compile_diagnostics(&*db, source))
        };
        let compiled = match compiled {
            Some(compiled) if !diagnostics.iter().any(Diagnostic::is_error) => compiled,
            _ => {
                tracing::debug!(diagnostics = diagnostics.len(), "compilation failed");
                return TemplateOutcome::failed(name, diagnostics);
            }
        };

        let fingerprint = self.fingerprint(name, source_hash, &compiled.dependencies, batch);
        let unit = Arc::new(CompiledUnit::new(
            self.namespace.as_str(),
            (*compiled).clone(),
            source_hash,
            fingerprint,
        ));
        if let Err(error) = self.store.write(&unit) {
            tracing::error!(%error, "cannot persist unit");
            diagnostics.push(driver_error(name, DiagnosticKind::StoreError, error.to_string()));
            return TemplateOutcome::failed(name, diagnostics);
        }
        self.records.insert(name.to_string(), Arc::clone(&unit));
        if let Some(loader) = &self.loader {
            loader.load_shared(Arc::clone(&unit));
        }
        tracing::debug!(%fingerprint, "compiled");
        TemplateOutcome {
            name: name.to_string(),
            status: Status::Compiled,
            diagnostics,
            unit: Some(unit),
        }
    }

    fn fingerprint(
        &self,
        name: &str,
        source_hash: Fingerprint,
        dependencies: &BTreeSet<Dependency>,
        batch: &Batch,
    ) -> Fingerprint {
        let mut builder = FingerprintBuilder::new("trellis-unit");
        builder.field("source", source_hash.as_bytes());
        for dependency in dependencies {
            let state = match dependency {
                Dependency::Template(callee) if callee == name => continue,
                Dependency::Template(callee) => batch
                    .snapshot
                    .get(callee)
                    .copied()
                    .or_else(|| batch.texts.get(callee).map(Fingerprint::of))
                    .map_or_else(|| "missing".to_string(), |hash| hash.to_string()),
                member => self
                    .context
                    .model()
                    .render_dependency(member)
                    .unwrap_or_default(),
            };
            builder.field(&dependency.to_string(), state.as_bytes());
        }
        builder.finish()
    }
}

/// State shared by every template of one batch.
struct Batch {
    force: bool,
    texts: BTreeMap<String, String>,
    /// Source hash of each recorded unit when the batch started.
    snapshot: BTreeMap<String, Fingerprint>,
}

/// Diagnostics of one batch, in template order. Finite and not restartable;
/// [`DiagnosticStream::finish`] compiles whatever was not pulled yet.
pub struct DiagnosticStream<'c> {
    compiler: &'c Compiler,
    names: std::collections::btree_set::IntoIter<String>,
    batch: Batch,
    pending: VecDeque<Diagnostic>,
    report: CompileReport,
    span: tracing::Span,
}

impl DiagnosticStream<'_> {
    /// The report so far.
    pub fn report(&self) -> &CompileReport {
        &self.report
    }

    pub fn finish(mut self) -> CompileReport {
        while self.next().is_some() {}
        let report = std::mem::take(&mut self.report);
        self.span.in_scope(|| {
            tracing::info!(
                considered = report.considered,
                compiled = report.compiled.len(),
                skipped = report.skipped.len(),
                errors = report.errors,
                warnings = report.warnings,
                "batch finished"
            )
        });
        report
    }
}

impl Iterator for DiagnosticStream<'_> {
    type Item = Diagnostic;

    fn next(&mut self) -> Option<Diagnostic> {
        loop {
            if let Some(diagnostic) = self.pending.pop_front() {
                return Some(diagnostic);
            }
            let name = self.names.next()?;
            let outcome = self
                .span
                .in_scope(|| self.compiler.compile_one(&name, &self.batch));
            self.pending.extend(outcome.diagnostics.iter().cloned());
            self.report.record(outcome);
        }
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("namespace", &self.namespace)
            .field("sources", &self.sources)
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::store::MemoryStore;

    fn compiler(source: MemorySource) -> Compiler {
        Compiler::new(
            MergedContext::base_only(),
            SourceSet::new().with(source),
            Arc::new(MemoryStore::new()),
        )
    }

    #[test]
    fn test_unchanged_templates_are_skipped() {
        let compiler = compiler(MemorySource::new().with("a", "<% template a() %>a"));
        let first = compiler.compile_all(false);
        assert_eq!(first.compiled, vec!["a"]);
        let second = compiler.compile_all(false);
        assert_eq!(second.skipped, vec!["a"]);
        assert_eq!(second.succeeded, vec!["a"]);
        let forced = compiler.compile_all(true);
        assert_eq!(forced.compiled, vec!["a"]);
    }

    #[test]
    fn test_failure_keeps_the_previous_unit() {
        let source = Arc::new(MemorySource::new().with("a", "<% template a() %>a"));
        let mut sources = SourceSet::new();
        sources.push(Arc::clone(&source) as Arc<dyn SourceProvider>);
        let compiler = Compiler::new(MergedContext::base_only(), sources, Arc::new(MemoryStore::new()));
        compiler.compile_all(false);
        let good = compiler.unit("a").unwrap();

        source.insert("a", "<% template a() %><% 1 + true %>");
        let mut seen = Vec::new();
        let report = compiler.compile_all_with(false, &mut |d| seen.push(d.kind));
        assert_eq!(report.failed, vec!["a"]);
        assert_eq!(report.errors, 1);
        assert_eq!(seen, vec![DiagnosticKind::TypeMismatch]);
        assert!(Arc::ptr_eq(&compiler.unit("a").unwrap(), &good));
    }

    #[test]
    fn test_missing_source_is_reported_per_template() {
        let compiler = compiler(MemorySource::new().with("a", "<% template a() %>a"));
        let report = compiler.compile(["a", "ghost"], false);
        assert_eq!(report.considered, 2);
        assert_eq!(report.succeeded, vec!["a"]);
        assert_eq!(report.failed, vec!["ghost"]);
        let ghost = &report.diagnostics["ghost"];
        assert_eq!(ghost[0].kind, DiagnosticKind::SourceNotFound);
        assert_eq!(ghost[0].message, "no source for template `ghost`");
    }

    #[test]
    fn test_stream_compiles_on_demand() {
        let compiler = compiler(
            MemorySource::new()
                .with("a", "<% template a() %><% 1 + true %>")
                .with("b", "<% template b() %>b"),
        );
        let mut stream = compiler.stream(["b", "a"], false);
        let first = stream.next().unwrap();
        assert_eq!(first.template, "a");
        assert_eq!(stream.report().considered, 1);
        assert!(compiler.unit("b").is_none());

        let report = stream.finish();
        assert_eq!(report.considered, 2);
        assert_eq!(report.succeeded, vec!["b"]);
        assert!(compiler.unit("b").is_some());
    }

    #[test]
    fn test_warnings_do_not_block_codegen() {
        let compiler = compiler(MemorySource::new().with("pages/home", "<% template other() %>x"));
        let report = compiler.compile_all(false);
        assert_eq!(report.compiled, vec!["pages/home"]);
        assert_eq!(report.errors, 0);
        assert_eq!(report.warnings, 1);
        let warning = report.iter_diagnostics().next().unwrap();
        assert_eq!(warning.kind, DiagnosticKind::NameMismatch);
    }
}
