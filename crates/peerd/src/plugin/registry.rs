// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Plugin registry.
//!
//! Maps qualified names (`plugin:local`) to explorer and handler factories.
//! The registry is built once at startup, filled by each plugin's setup
//! function through a [`PluginApi`], then only used for lookups.

use super::explorer::{Explorer, ExplorerInstance};
use super::handler::{Handler, HandlerInstance};
use super::PluginConfigError;
use serde_yaml::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Factory producing an explorer from its configuration document.
pub type ExplorerFactory =
    Arc<dyn Fn(&Value) -> Result<Arc<dyn Explorer>, PluginConfigError> + Send + Sync>;

/// Factory producing a handler from its configuration document.
pub type HandlerFactory =
    Arc<dyn Fn(&Value) -> Result<Box<dyn Handler>, PluginConfigError> + Send + Sync>;

/// Plugin resolution errors.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("explorer with name '{0}' does not exist")]
    UnknownExplorer(String),

    #[error("handler with name '{0}' does not exist")]
    UnknownHandler(String),

    #[error("invalid configuration for '{name}': {source}")]
    Config {
        name: String,
        #[source]
        source: PluginConfigError,
    },
}

/// Build the registry key for a plugin-local name.
pub fn qualified_name(plugin: &str, local: &str) -> String {
    format!("{}:{}", plugin, local)
}

/// Registry of explorer and handler factories.
#[derive(Default)]
pub struct PluginRegistry {
    explorers: HashMap<String, ExplorerFactory>,
    handlers: HashMap<String, HandlerFactory>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a plugin's setup function against this registry.
    ///
    /// Everything the plugin registers is stored under `plugin:<name>`.
    pub fn register<F>(&mut self, plugin: &str, setup: F)
    where
        F: FnOnce(&mut PluginApi<'_>),
    {
        info!("Loading plugin '{}'", plugin);
        let mut api = PluginApi {
            plugin,
            registry: self,
        };
        setup(&mut api);
    }

    /// Instantiate the explorer registered under `name`.
    pub fn explorer(&self, name: &str, config: &Value) -> Result<ExplorerInstance, PluginError> {
        let factory = self
            .explorers
            .get(name)
            .ok_or_else(|| PluginError::UnknownExplorer(name.to_string()))?;

        let explorer = factory(config).map_err(|source| PluginError::Config {
            name: name.to_string(),
            source,
        })?;

        Ok(ExplorerInstance::new(name, explorer))
    }

    /// Instantiate the handler registered under `name`.
    pub fn handler(&self, name: &str, config: &Value) -> Result<HandlerInstance, PluginError> {
        let factory = self
            .handlers
            .get(name)
            .ok_or_else(|| PluginError::UnknownHandler(name.to_string()))?;

        let handler = factory(config).map_err(|source| PluginError::Config {
            name: name.to_string(),
            source,
        })?;

        Ok(HandlerInstance::new(name, handler))
    }

    /// Registered explorer names, sorted.
    pub fn explorer_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.explorers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered handler names, sorted.
    pub fn handler_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn insert_explorer(&mut self, name: String, factory: ExplorerFactory) {
        info!("Registering explorer '{}'", name);
        if self.explorers.insert(name.clone(), factory).is_some() {
            warn!("Explorer '{}' registered twice, keeping the last one", name);
        }
    }

    fn insert_handler(&mut self, name: String, factory: HandlerFactory) {
        info!("Registering handler '{}'", name);
        if self.handlers.insert(name.clone(), factory).is_some() {
            warn!("Handler '{}' registered twice, keeping the last one", name);
        }
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("explorers", &self.explorer_names())
            .field("handlers", &self.handler_names())
            .finish()
    }
}

/// Registration surface handed to a plugin's setup function.
pub struct PluginApi<'a> {
    plugin: &'a str,
    registry: &'a mut PluginRegistry,
}

impl PluginApi<'_> {
    /// Register an explorer factory under `<plugin>:<name>`.
    pub fn register_explorer<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn Explorer>, PluginConfigError> + Send + Sync + 'static,
    {
        let name = qualified_name(self.plugin, name);
        self.registry.insert_explorer(name, Arc::new(factory));
    }

    /// Register a handler factory under `<plugin>:<name>`.
    pub fn register_handler<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Value) -> Result<Box<dyn Handler>, PluginConfigError> + Send + Sync + 'static,
    {
        let name = qualified_name(self.plugin, name);
        self.registry.insert_handler(name, Arc::new(factory));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::DiscoverySink;
    use crate::plugin::{decode_config, Deadline};
    use async_trait::async_trait;
    use serde::Deserialize;

    struct NullExplorer;

    #[async_trait]
    impl Explorer for NullExplorer {
        async fn explore(&self, _deadline: &Deadline, _sink: DiscoverySink) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct NullHandler;

    impl Handler for NullHandler {}

    #[derive(Deserialize)]
    struct NeedsPort {
        port: Option<u16>,
    }

    fn setup(api: &mut PluginApi<'_>) {
        api.register_explorer("null", |_| Ok(Arc::new(NullExplorer) as Arc<dyn Explorer>));
        api.register_explorer("strict", |value| {
            let config: NeedsPort = decode_config(value)?;
            config.port.ok_or(PluginConfigError::Missing("port"))?;
            Ok(Arc::new(NullExplorer) as Arc<dyn Explorer>)
        });
        api.register_handler("null", |_| Ok(Box::new(NullHandler) as Box<dyn Handler>));
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry.register("test", setup);
        registry
    }

    #[test]
    fn test_names_are_qualified() {
        let registry = registry();
        assert_eq!(registry.explorer_names(), vec!["test:null", "test:strict"]);
        assert_eq!(registry.handler_names(), vec!["test:null"]);
    }

    #[test]
    fn test_same_local_name_in_two_plugins() {
        let mut registry = registry();
        registry.register("other", setup);

        assert!(registry.explorer("test:null", &Value::Null).is_ok());
        assert!(registry.explorer("other:null", &Value::Null).is_ok());
        assert_eq!(registry.explorer_names().len(), 4);
    }

    #[test]
    fn test_instance_carries_label() {
        let registry = registry();
        let explorer = registry.explorer("test:null", &Value::Null).unwrap();
        let handler = registry.handler("test:null", &Value::Null).unwrap();

        assert_eq!(explorer.label(), "test:null");
        assert_eq!(handler.label(), "test:null");
    }

    #[test]
    fn test_unknown_names() {
        let registry = registry();

        let err = registry.explorer("test:missing", &Value::Null).unwrap_err();
        assert!(matches!(err, PluginError::UnknownExplorer(ref n) if n == "test:missing"));

        // Local name without plugin prefix does not resolve.
        let err = registry.handler("null", &Value::Null).unwrap_err();
        assert!(matches!(err, PluginError::UnknownHandler(_)));
    }

    #[test]
    fn test_factory_error_is_surfaced() {
        let registry = registry();

        let err = registry.explorer("test:strict", &Value::Null).unwrap_err();
        match err {
            PluginError::Config { name, source } => {
                assert_eq!(name, "test:strict");
                assert!(matches!(source, PluginConfigError::Missing("port")));
            }
            other => panic!("unexpected error: {other}"),
        }

        let config: Value = serde_yaml::from_str("port: 9000").unwrap();
        assert!(registry.explorer("test:strict", &config).is_ok());
    }

    #[test]
    fn test_factory_decode_error() {
        let registry = registry();
        let config: Value = serde_yaml::from_str("port: not-a-number").unwrap();

        let err = registry.explorer("test:strict", &config).unwrap_err();
        assert!(matches!(
            err,
            PluginError::Config {
                source: PluginConfigError::Decode(_),
                ..
            }
        ));
    }
}
