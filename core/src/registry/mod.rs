//! Plugin registries: named lookup tables for orchestrators, connectors, tools,
//! prompt processors, and RAG processors (§4.3).
//!
//! Each registry is a thin wrapper over a concurrent map so registration can happen
//! at startup from multiple init tasks without a global lock.

use std::sync::Arc;

use dashmap::DashMap;

use crate::connector::Connector;
use crate::error::LambError;
use crate::orchestrator::Orchestrator;
use crate::prompt_processor::PromptProcessor;
use crate::tool::Tool;

/// A named lookup table of `Arc<T>` plugins, keyed by plugin name.
pub struct Registry<T: ?Sized> {
    entries: DashMap<String, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn register(&self, name: impl Into<String>, plugin: Arc<T>) {
        self.entries.insert(name.into(), plugin);
    }

    pub fn get(&self, name: &str) -> Result<Arc<T>, LambError> {
        self.entries
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LambError::PluginNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The five plugin registries a running process holds, one instance shared across
/// every request via `Arc`.
#[derive(Default)]
pub struct Registries {
    pub orchestrators: Registry<dyn Orchestrator>,
    pub connectors: Registry<dyn Connector>,
    pub tools: Registry<dyn Tool>,
    pub prompt_processors: Registry<dyn PromptProcessor>,
    pub rag_processors: Registry<dyn Tool>,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }
}
