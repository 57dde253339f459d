//! Persistence of compiled units, addressed by namespace and template name.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use derive_more::{Display, Error};
use trellis_core::{CompiledUnit, UnitCodecError};

/// File extension of persisted units.
pub const UNIT_EXTENSION: &str = "tlu";

#[derive(Debug, Display, Error)]
pub enum StoreError {
    #[display("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[display("unit `{namespace}/{name}` is unreadable: {source}")]
    Codec {
        namespace: String,
        name: String,
        source: UnitCodecError,
    },
}

pub trait UnitStore: Send + Sync {
    fn write(&self, unit: &CompiledUnit) -> Result<(), StoreError>;

    fn read(&self, namespace: &str, name: &str) -> Result<Option<CompiledUnit>, StoreError>;

    /// Template names stored under `namespace`, sorted.
    fn list(&self, namespace: &str) -> Result<Vec<String>, StoreError>;
}

fn encode(unit: &CompiledUnit) -> Result<Vec<u8>, StoreError> {
    unit.encode().map_err(|source| StoreError::Codec {
        namespace: unit.namespace.clone(),
        name: unit.name.clone(),
        source,
    })
}

fn decode(namespace: &str, name: &str, bytes: &[u8]) -> Result<CompiledUnit, StoreError> {
    CompiledUnit::decode(bytes).map_err(|source| StoreError::Codec {
        namespace: namespace.to_string(),
        name: name.to_string(),
        source,
    })
}

/// Encoded units kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    units: DashMap<(String, String), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UnitStore for MemoryStore {
    fn write(&self, unit: &CompiledUnit) -> Result<(), StoreError> {
        let bytes = encode(unit)?;
        self.units
            .insert((unit.namespace.clone(), unit.name.clone()), bytes);
        Ok(())
    }

    fn read(&self, namespace: &str, name: &str) -> Result<Option<CompiledUnit>, StoreError> {
        let key = (namespace.to_string(), name.to_string());
        match self.units.get(&key) {
            Some(bytes) => decode(namespace, name, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn list(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self
            .units
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .map(|entry| entry.key().1.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Units on disk at `<root>/<namespace>/<name>.tlu`.
#[derive(Clone, Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, namespace: &str, name: &str) -> PathBuf {
        self.root
            .join(namespace)
            .join(format!("{name}.{UNIT_EXTENSION}"))
    }

    fn collect(dir: &Path, prefix: &str, names: &mut Vec<String>) -> Result<(), StoreError> {
        let io = |source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        };
        for entry in std::fs::read_dir(dir).map_err(io)? {
            let path = entry.map_err(io)?.path();
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let qualified = |part: &str| {
                if prefix.is_empty() {
                    part.to_string()
                } else {
                    format!("{prefix}/{part}")
                }
            };
            if path.is_dir() {
                Self::collect(&path, &qualified(file_name), names)?;
            } else if let Some(stem) = file_name.strip_suffix(&format!(".{UNIT_EXTENSION}")) {
                names.push(qualified(stem));
            }
        }
        Ok(())
    }
}

impl UnitStore for DirectoryStore {
    fn write(&self, unit: &CompiledUnit) -> Result<(), StoreError> {
        let path = self.path_of(&unit.namespace, &unit.name);
        let io = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        // Readers see either the old file or the new one, never a prefix.
        let staging = path.with_extension(format!("{UNIT_EXTENSION}.tmp"));
        std::fs::write(&staging, encode(unit)?).map_err(io)?;
        std::fs::rename(&staging, &path).map_err(io)
    }

    fn read(&self, namespace: &str, name: &str) -> Result<Option<CompiledUnit>, StoreError> {
        let path = self.path_of(namespace, name);
        match std::fs::read(&path) {
            Ok(bytes) => decode(namespace, name, &bytes).map(Some),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn list(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(namespace);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        Self::collect(&dir, "", &mut names)?;
        names.sort();
        Ok(names)
    }
}
