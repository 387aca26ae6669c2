//! Provider registry and plugin loading.
//!
//! The [`Registry`] is an explicit value owned by the build session and
//! passed by reference to every component that needs lookups, so independent
//! builds never share provider state. Plugins are resolved through a
//! [`PluginLoader`], a table of id → factory standing in for module-path
//! resolution; loading the same id twice is a no-op.

use crate::{
    config::Config,
    error::BuildError,
    log,
    provider::{ContentProvider, MediaProvider, PluginValues, PostProvider, PrinterProvider},
};
use anyhow::Result;
use rustc_hash::FxHashSet;
use std::{collections::HashMap, sync::Arc};

type PluginFactory = Box<dyn Fn() -> Result<PluginValues> + Send + Sync>;

/// Resolves plugin ids to their factories.
#[derive(Default)]
pub struct PluginLoader {
    factories: HashMap<String, PluginFactory>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a plugin id. A later registration for the
    /// same id replaces the earlier one.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<PluginValues> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Box::new(factory));
    }

    fn resolve(&self, id: &str) -> Option<&PluginFactory> {
        self.factories.get(id)
    }
}

/// Four disjoint provider mappings plus the set of already-loaded plugin ids.
///
/// Content and media are keyed by file extension (with leading dot), printer
/// and post by provider name. A provider key maps to exactly one instance; a
/// later-loaded plugin silently overwrites an earlier one for the same key.
#[derive(Default)]
pub struct Registry {
    loaded: FxHashSet<String>,
    content: HashMap<String, Arc<dyn ContentProvider>>,
    media: HashMap<String, Arc<dyn MediaProvider>>,
    printer: HashMap<String, Arc<dyn PrinterProvider>>,
    post: HashMap<String, Arc<dyn PostProvider>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every plugin the manifest lists that is not already loaded.
    ///
    /// A miss in the loader is fatal for the whole run: a missing provider
    /// makes every affected document unbuildable.
    pub fn validate_plugins(
        &mut self,
        config: &Config,
        loader: &PluginLoader,
    ) -> Result<(), BuildError> {
        for id in &config.plugins {
            if !self.loaded.contains(id) {
                self.load_plugin(id, loader)?;
            }
        }
        Ok(())
    }

    fn load_plugin(&mut self, id: &str, loader: &PluginLoader) -> Result<(), BuildError> {
        log!("plugin"; "loading {id}");

        let factory = loader
            .resolve(id)
            .ok_or_else(|| BuildError::PluginNotFound(id.to_string()))?;
        let values = factory().map_err(|source| BuildError::PluginLoadFailed {
            id: id.to_string(),
            source,
        })?;

        self.content.extend(values.content_providers);
        self.media.extend(values.media_providers);
        self.printer.extend(values.printer_providers);
        self.post.extend(values.post_providers);

        self.loaded.insert(id.to_string());
        Ok(())
    }

    pub fn content_provider(&self, extension: &str) -> Option<&Arc<dyn ContentProvider>> {
        self.content.get(extension)
    }

    pub fn media_provider(&self, extension: &str) -> Option<&Arc<dyn MediaProvider>> {
        self.media.get(extension)
    }

    pub fn printer_provider(&self, name: &str) -> Option<&Arc<dyn PrinterProvider>> {
        self.printer.get(name)
    }

    pub fn post_provider(&self, name: &str) -> Option<&Arc<dyn PostProvider>> {
        self.post.get(name)
    }
}

// ============================================================================
// Tests
// ============================================================================
