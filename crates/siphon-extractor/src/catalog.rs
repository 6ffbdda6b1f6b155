//! Persisted extractor catalog
//!
//! Maps extractor names to entry points. Loaded once at startup, by the agent
//! and by every worker process, from a TOML file:
//!
//! ```toml
//! [[extractors]]
//! name = "chunker"
//! entry_point = "builtin:chunker"
//!
//! [[extractors]]
//! name = "ocr"
//! entry_point = "exec:/opt/extractors/ocr"
//! ```

use crate::error::ExtractorError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where an extractor's code comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntryPoint {
    /// Compiled into this binary
    Builtin(String),
    /// External program speaking JSON over stdin/stdout
    Exec(PathBuf),
}

impl FromStr for EntryPoint {
    type Err = ExtractorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("builtin", name)) if !name.is_empty() => Ok(EntryPoint::Builtin(name.to_string())),
            Some(("exec", path)) if !path.is_empty() => Ok(EntryPoint::Exec(PathBuf::from(path))),
            _ => Err(ExtractorError::Catalog(format!(
                "invalid entry point '{s}', expected builtin:<name> or exec:<path>"
            ))),
        }
    }
}

impl TryFrom<String> for EntryPoint {
    type Error = ExtractorError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntryPoint> for String {
    fn from(entry_point: EntryPoint) -> Self {
        entry_point.to_string()
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPoint::Builtin(name) => write!(f, "builtin:{name}"),
            EntryPoint::Exec(path) => write!(f, "exec:{}", path.display()),
        }
    }
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Extractor name tasks refer to
    pub name: String,
    /// Code location
    pub entry_point: EntryPoint,
}

/// List of extractors an agent can load
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractorCatalog {
    /// Entries, in declaration order
    #[serde(default)]
    pub extractors: Vec<CatalogEntry>,
}

impl ExtractorCatalog {
    /// Catalog of every compiled-in extractor
    pub fn builtin() -> Self {
        let extractors = crate::builtins::NAMES
            .iter()
            .map(|name| CatalogEntry {
                name: name.to_string(),
                entry_point: EntryPoint::Builtin(name.to_string()),
            })
            .collect();
        Self { extractors }
    }

    /// Load a catalog from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ExtractorError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a catalog from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ExtractorError> {
        let catalog: Self = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load from `path` when given, else the built-in catalog
    pub fn load(path: Option<&Path>) -> Result<Self, ExtractorError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> Result<String, ExtractorError> {
        toml::to_string_pretty(self).map_err(|e| ExtractorError::Catalog(e.to_string()))
    }

    /// Reject empty or duplicate names
    pub fn validate(&self) -> Result<(), ExtractorError> {
        let mut seen = HashSet::new();
        for entry in &self.extractors {
            if entry.name.trim().is_empty() {
                return Err(ExtractorError::Catalog("extractor name must not be empty".to_string()));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(ExtractorError::Catalog(format!("duplicate extractor '{}'", entry.name)));
            }
        }
        Ok(())
    }

    /// Extractor names, in declaration order
    pub fn names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name.as_str()).collect()
    }
}
