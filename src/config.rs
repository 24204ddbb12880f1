//! Evaluator tuning knobs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::oids;

/// Settings shared by every evaluator built for one search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Upper bound on parent hops walked by the subtree scope evaluator.
    pub max_ancestor_depth: usize,
    /// Lets a `*` between two substring fragments match zero characters.
    pub allow_empty_substring_gaps: bool,
    /// OIDs of attribute types present on every stored entry.
    pub implicit_presence: Vec<String>,
    /// Entry count assumed when the store cannot estimate one.
    pub default_entry_count: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self::strict()
    }
}

impl EvaluatorConfig {
    /// Substring gaps must consume at least one character.
    pub fn strict() -> Self {
        Self {
            max_ancestor_depth: 4096,
            allow_empty_substring_gaps: false,
            implicit_presence: vec![
                oids::OBJECT_CLASS.to_owned(),
                oids::ENTRY_UUID.to_owned(),
                oids::ENTRY_CSN.to_owned(),
            ],
            default_entry_count: 1_000_000,
        }
    }

    /// Standard zero-or-more wildcard semantics.
    pub fn lenient() -> Self {
        Self {
            allow_empty_substring_gaps: true,
            ..Self::strict()
        }
    }

    /// Parses a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|source| ConfigError::Parse { path: None, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Returns true when `oid` is always present on stored entries.
    pub fn is_implicitly_present(&self, oid: &str) -> bool {
        self.implicit_presence.iter().any(|candidate| candidate == oid)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_ancestor_depth == 0 {
            return Err(ConfigError::Invalid {
                key: "max_ancestor_depth",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Failures while loading an [`EvaluatorConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read evaluator config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The document is not valid TOML for this schema.
    #[error("failed to parse evaluator config{}: {source}", path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    Parse {
        /// File that failed, if loaded from disk.
        path: Option<PathBuf>,
        /// Parser error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("config key '{key}' {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}
