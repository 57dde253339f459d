//! `trellis.toml`.

use std::path::{Path, PathBuf};

use derive_more::{Display, Error};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "trellis.toml";

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[display("invalid {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub compiler: CompilerConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Namespace units are stored under.
    pub namespace: String,
    /// Source directories, consulted in order.
    pub sources: Vec<PathBuf>,
    pub out_dir: PathBuf,
    /// Recompile even when fingerprints match.
    pub force: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            sources: vec![PathBuf::from("templates")],
            out_dir: PathBuf::from("build/trellis"),
            force: false,
        }
    }
}

impl Config {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `path`; relative directories in it are taken relative to the
    /// file's own directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&text, path)?;
        if let Some(base) = path.parent() {
            config.compiler.rebase(base);
        }
        tracing::debug!(path = %path.display(), ?config, "loaded configuration");
        Ok(config)
    }

    /// `trellis.toml` in `dir` if present, otherwise the defaults.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            let mut config = Self::default();
            config.compiler.rebase(dir);
            Ok(config)
        }
    }
}

impl CompilerConfig {
    fn rebase(&mut self, base: &Path) {
        for source in &mut self.sources {
            if source.is_relative() {
                *source = base.join(&*source);
            }
        }
        if self.out_dir.is_relative() {
            self.out_dir = base.join(&self.out_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse("[compiler]\nnamespace = \"site\"\n", Path::new("t.toml")).unwrap();
        assert_eq!(config.compiler.namespace, "site");
        assert_eq!(config.compiler.sources, vec![PathBuf::from("templates")]);
        assert!(!config.compiler.force);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let error = Config::parse("[compiler]\nnamesapce = \"x\"\n", Path::new("t.toml")).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().starts_with("invalid t.toml: "));
    }

    #[test]
    fn test_paths_are_relative_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[compiler]\nsources = [\"src/templates\", \"/abs\"]\nout_dir = \"out\"\nforce = true\n",
        )
        .unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(
            config.compiler.sources,
            vec![dir.path().join("src/templates"), PathBuf::from("/abs")]
        );
        assert_eq!(config.compiler.out_dir, dir.path().join("out"));
        assert!(config.compiler.force);
    }
}
