//! Where template sources come from.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use derive_more::{Display, Error};
use parking_lot::RwLock;

/// File extension of template sources.
pub const SOURCE_EXTENSION: &str = "trl";

#[derive(Debug, Display, Error)]
pub enum SourceError {
    #[display("no source for template `{_0}`")]
    NotFound(#[error(not(source))] String),
    #[display("cannot read template `{name}`: {source}")]
    Io {
        name: String,
        source: std::io::Error,
    },
}

/// A named collection of template sources.
pub trait SourceProvider: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    fn names(&self) -> BTreeSet<String>;

    fn read(&self, name: &str) -> Result<String, SourceError>;
}

/// Sources held in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    templates: RwLock<BTreeMap<String, String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    /// Add or replace a template, returning the previous text.
    pub fn insert(&self, name: impl Into<String>, text: impl Into<String>) -> Option<String> {
        self.templates.write().insert(name.into(), text.into())
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.templates.write().remove(name)
    }
}

impl SourceProvider for MemorySource {
    fn exists(&self, name: &str) -> bool {
        self.templates.read().contains_key(name)
    }

    fn names(&self) -> BTreeSet<String> {
        self.templates.read().keys().cloned().collect()
    }

    fn read(&self, name: &str) -> Result<String, SourceError> {
        self.templates
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(name.to_string()))
    }
}

/// `*.trl` files below a root directory. `pages/home.trl` is the template
/// `pages/home`.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `name`, or `None` when the name could escape the root.
    fn path_of(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let plain = !name.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        plain.then(|| self.root.join(format!("{name}.{SOURCE_EXTENSION}")))
    }

    fn collect(&self, dir: &Path, prefix: &str, names: &mut BTreeSet<String>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(dir = %dir.display(), %error, "cannot list template directory");
                return;
            }
        };
        let qualify = |part: &str| {
            if prefix.is_empty() {
                part.to_string()
            } else {
                format!("{prefix}/{part}")
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if let Some(dir_name) = path.file_name().and_then(|name| name.to_str()) {
                    self.collect(&path, &qualify(dir_name), names);
                }
            } else if path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            {
                names.insert(qualify(stem));
            }
        }
    }
}

impl SourceProvider for DirectorySource {
    fn exists(&self, name: &str) -> bool {
        self.path_of(name).is_some_and(|path| path.is_file())
    }

    fn names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect(&self.root, "", &mut names);
        names
    }

    fn read(&self, name: &str) -> Result<String, SourceError> {
        let path = self
            .path_of(name)
            .ok_or_else(|| SourceError::NotFound(name.to_string()))?;
        std::fs::read_to_string(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound(name.to_string()),
            _ => SourceError::Io {
                name: name.to_string(),
                source,
            },
        })
    }
}

/// Providers consulted in order; the first one that has a name wins.
#[derive(Clone, Default)]
pub struct SourceSet {
    providers: Vec<Arc<dyn SourceProvider>>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl SourceProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn push(&mut self, provider: Arc<dyn SourceProvider>) {
        self.providers.push(provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl SourceProvider for SourceSet {
    fn exists(&self, name: &str) -> bool {
        self.providers.iter().any(|provider| provider.exists(name))
    }

    fn names(&self) -> BTreeSet<String> {
        self.providers
            .iter()
            .flat_map(|provider| provider.names())
            .collect()
    }

    fn read(&self, name: &str) -> Result<String, SourceError> {
        for provider in &self.providers {
            if provider.exists(name) {
                return provider.read(name);
            }
        }
        Err(SourceError::NotFound(name.to_string()))
    }
}

impl std::fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSet")
            .field("providers", &self.providers.len())
            .finish()
    }
}
