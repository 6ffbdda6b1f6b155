//! Extractor registry
//!
//! Maps extractor names to loader functions. Loaders are cheap to hold and
//! expensive to call: calling one builds an extractor instance (model
//! weights, clients), so callers cache what they load.

use crate::builtins;
use crate::catalog::{EntryPoint, ExtractorCatalog};
use crate::error::ExtractorError;
use crate::external::ExecExtractor;
use siphon_domain::Extractor;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a fresh extractor instance
pub type Loader = Arc<dyn Fn() -> Result<Box<dyn Extractor>, ExtractorError> + Send + Sync>;

/// Name to loader mapping
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    loaders: BTreeMap<String, Loader>,
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extractors", &self.names())
            .finish()
    }
}

impl ExtractorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of every compiled-in extractor
    pub fn builtins() -> Self {
        // The built-in catalog only names known built-ins
        Self::from_catalog(&ExtractorCatalog::builtin()).unwrap_or_default()
    }

    /// Build a registry from catalog entries
    ///
    /// Fails if a `builtin:` entry names an extractor this binary lacks.
    /// `exec:` programs are not started until first load.
    pub fn from_catalog(catalog: &ExtractorCatalog) -> Result<Self, ExtractorError> {
        let mut registry = Self::new();
        for entry in &catalog.extractors {
            let loader: Loader = match &entry.entry_point {
                EntryPoint::Builtin(name) => {
                    if builtins::create(name).is_none() {
                        return Err(ExtractorError::Catalog(format!(
                            "'{}' refers to unknown built-in '{}'",
                            entry.name, name
                        )));
                    }
                    let name = name.clone();
                    Arc::new(move || {
                        builtins::create(&name).ok_or_else(|| ExtractorError::UnknownExtractor(name.clone()))
                    })
                }
                EntryPoint::Exec(path) => {
                    let path = path.clone();
                    let name = entry.name.clone();
                    Arc::new(move || {
                        let extractor = ExecExtractor::load(&name, &path)?;
                        Ok(Box::new(extractor) as Box<dyn Extractor>)
                    })
                }
            };
            registry.register(entry.name.clone(), loader);
        }
        Ok(registry)
    }

    /// Register or replace a loader
    pub fn register(&mut self, name: impl Into<String>, loader: Loader) {
        self.loaders.insert(name.into(), loader);
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.loaders.keys().cloned().collect()
    }

    /// Keep only the named extractors
    pub fn retain(&mut self, names: &[String]) -> Result<(), ExtractorError> {
        if let Some(missing) = names.iter().find(|n| !self.loaders.contains_key(n.as_str())) {
            return Err(ExtractorError::UnknownExtractor(missing.clone()));
        }
        self.loaders.retain(|name, _| names.contains(name));
        Ok(())
    }

    /// Build a new instance of `name`
    pub fn load(&self, name: &str) -> Result<Box<dyn Extractor>, ExtractorError> {
        let loader = self
            .loaders
            .get(name)
            .ok_or_else(|| ExtractorError::UnknownExtractor(name.to_string()))?;
        loader()
    }
}
