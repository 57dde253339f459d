//! Fingerprint gating, persistence and hot replacement across batches.

use std::sync::Arc;

use trellis::{
    Compiler, DirectoryStore, Loader, MemorySource, MemoryStore, MergedContext, SourceProvider,
    SourceSet, UnitStore,
};

const CALLEE: &str = "<% template a() %>v1";
const CALLER: &str = "<% template b() %>[<% call a() %>]";

fn shared_source(templates: &[(&str, &str)]) -> (Arc<MemorySource>, SourceSet) {
    let source = Arc::new(MemorySource::new());
    for (name, text) in templates {
        source.insert(*name, *text);
    }
    let mut set = SourceSet::new();
    set.push(Arc::clone(&source) as Arc<dyn SourceProvider>);
    (source, set)
}

#[test]
fn test_dependents_recompile_on_their_next_check() {
    let (source, sources) = shared_source(&[("a", CALLEE), ("b", CALLER)]);
    let loader = Arc::new(Loader::new());
    let compiler = Compiler::new(
        MergedContext::base_only(),
        sources,
        Arc::new(MemoryStore::new()),
    )
    .with_loader(Arc::clone(&loader));

    let first = compiler.compile_all(false);
    assert_eq!(first.compiled, vec!["a", "b"]);

    source.insert("a", "<% template a() %>v2");
    let second = compiler.compile_all(false);
    assert_eq!(second.compiled, vec!["a"]);
    assert_eq!(second.skipped, vec!["b"]);
    // Calls resolve to whatever unit is loaded now.
    let page = loader.invoke("b", compiler.context(), vec![]).unwrap();
    assert_eq!(page.output, "[v2]");

    let third = compiler.compile_all(false);
    assert_eq!(third.compiled, vec!["b"]);
    assert_eq!(third.skipped, vec!["a"]);

    let fourth = compiler.compile_all(false);
    assert!(fourth.compiled.is_empty());
    assert_eq!(fourth.skipped, vec!["a", "b"]);
}

#[test]
fn test_compilation_is_deterministic() {
    let build = || {
        let (_, sources) = shared_source(&[("a", CALLEE), ("b", CALLER)]);
        let compiler = Compiler::new(
            MergedContext::base_only(),
            sources,
            Arc::new(MemoryStore::new()),
        );
        compiler.compile_all(false);
        compiler
    };
    let (one, two) = (build(), build());
    for name in ["a", "b"] {
        let (x, y) = (one.unit(name).unwrap(), two.unit(name).unwrap());
        assert_eq!(x.payload_bytes().unwrap(), y.payload_bytes().unwrap());
        assert_eq!(x.fingerprint, y.fingerprint);
        assert_eq!(x.source_hash, y.source_hash);
    }
}

#[test]
fn test_restored_units_skip_recompilation() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn UnitStore> = Arc::new(DirectoryStore::new(dir.path()));
    let templates = [("a", CALLEE), ("b", CALLER)];

    let (_, sources) = shared_source(&templates);
    let first = Compiler::new(MergedContext::base_only(), sources, Arc::clone(&store))
        .with_namespace("site");
    assert_eq!(first.compile_all(false).compiled, vec!["a", "b"]);
    assert!(dir.path().join("site/b.tlu").is_file());

    let (_, sources) = shared_source(&templates);
    let loader = Arc::new(Loader::new());
    let second = Compiler::new(MergedContext::base_only(), sources, store)
        .with_namespace("site")
        .with_loader(Arc::clone(&loader));
    assert_eq!(second.restore().unwrap(), 2);
    let page = loader.invoke("b", second.context(), vec![]).unwrap();
    assert_eq!(page.output, "[v1]");

    let report = second.compile_all(false);
    assert!(report.compiled.is_empty());
    assert_eq!(report.skipped, vec!["a", "b"]);
}

#[test]
fn test_recompiling_replaces_the_loaded_unit() {
    let (source, sources) = shared_source(&[("banner", "<% template banner() %>old")]);
    let loader = Arc::new(Loader::new());
    let compiler = Compiler::new(
        MergedContext::base_only(),
        sources,
        Arc::new(MemoryStore::new()),
    )
    .with_loader(Arc::clone(&loader));

    compiler.compile_all(false);
    let held = loader.lookup("banner").unwrap();
    let before = loader.version("banner").unwrap();

    source.insert("banner", "<% template banner() %>new");
    compiler.compile_all(false);
    assert!(loader.version("banner").unwrap() > before);

    let context = compiler.context();
    assert_eq!(loader.invoke_unit(&held, context, vec![]).unwrap().output, "old");
    assert_eq!(loader.invoke("banner", context, vec![]).unwrap().output, "new");
}

#[test]
fn test_failed_recompile_keeps_serving_the_last_good_unit() {
    let (source, sources) = shared_source(&[("banner", "<% template banner() %>good")]);
    let loader = Arc::new(Loader::new());
    let compiler = Compiler::new(
        MergedContext::base_only(),
        sources,
        Arc::new(MemoryStore::new()),
    )
    .with_loader(Arc::clone(&loader));
    compiler.compile_all(false);

    source.insert("banner", "<% template banner() %><% 'x' - 1 %>");
    let report = compiler.compile_all(false);
    assert_eq!(report.failed, vec!["banner"]);
    let page = loader.invoke("banner", compiler.context(), vec![]).unwrap();
    assert_eq!(page.output, "good");
}

#[test]
fn test_concurrent_requests_compile_once() {
    let (_, sources) = shared_source(&[("page", "<% template page() %>hello")]);
    let loader = Arc::new(Loader::new());
    let compiler = Compiler::new(
        MergedContext::base_only(),
        sources,
        Arc::new(MemoryStore::new()),
    )
    .with_loader(Arc::clone(&loader));

    let outcomes: Vec<Vec<String>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| compiler.compile(["page"], false).succeeded))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert!(outcomes.iter().all(|succeeded| succeeded == &["page"]));
    assert_eq!(loader.version("page"), Some(1));
    assert_eq!(
        compiler.compile(["page"], false).skipped,
        vec!["page".to_string()]
    );
}

#[test]
fn test_forced_builds_ignore_fingerprints() {
    let (_, sources) = shared_source(&[("a", CALLEE)]);
    let compiler = Compiler::new(
        MergedContext::base_only(),
        sources,
        Arc::new(MemoryStore::new()),
    );
    compiler.compile_all(false);
    let before = compiler.unit("a").unwrap();
    let report = compiler.compile_all(true);
    assert_eq!(report.compiled, vec!["a"]);
    let after = compiler.unit("a").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.fingerprint, after.fingerprint);
    assert!(matches!(
        compiler.compile_all(false).skipped.as_slice(),
        [name] if name == "a"
    ));
}
