// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon configuration.
//!
//! ```yaml
//! log_level: info
//! ttl: 30s
//! exploration_timeout: 10s
//! groups:
//!   cluster:
//!     explorers:
//!       - name: multicast:dns
//!         configuration:
//!           hostname: node-a
//!           service: _peerd._tcp
//!           port: 7946
//!     handlers:
//!       - name: template:file
//!         configuration:
//!           filename: /etc/peers.txt
//!           template_string: "{% for p in peers %}{{ p.ipv4 }}\n{% endfor %}"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/peerd/peerd.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerdConfig {
    /// Log filter (trace, debug, info, warn, error or an env-filter directive)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Silence after which an active peer is evicted
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    /// Length of the per-cycle exploration window
    #[serde(default = "default_exploration_timeout", with = "humantime_serde")]
    pub exploration_timeout: Duration,

    /// Groups by name
    #[serde(default)]
    pub groups: BTreeMap<String, GroupConfig>,
}

/// Explorers and handlers of one group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default)]
    pub explorers: Vec<PluginConfig>,

    /// Invoked in list order
    #[serde(default)]
    pub handlers: Vec<PluginConfig>,
}

/// One plugin instance: qualified name plus its opaque configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Qualified name, `plugin:local`
    pub name: String,

    /// Handed untouched to the plugin factory
    #[serde(default)]
    pub configuration: serde_yaml::Value,
}

impl PluginConfig {
    pub fn new(name: impl Into<String>, configuration: serde_yaml::Value) -> Self {
        Self {
            name: name.into(),
            configuration,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_exploration_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for PeerdConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            ttl: default_ttl(),
            exploration_timeout: default_exploration_timeout(),
            groups: BTreeMap::new(),
        }
    }
}

impl PeerdConfig {
    /// Load and validate configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::Invalid("ttl cannot be 0".into()));
        }
        if self.exploration_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "exploration_timeout cannot be 0".into(),
            ));
        }

        for (group, group_config) in &self.groups {
            let plugins = group_config
                .explorers
                .iter()
                .chain(group_config.handlers.iter());
            for plugin in plugins {
                if !is_qualified(&plugin.name) {
                    return Err(ConfigError::Invalid(format!(
                        "Group '{}': plugin name '{}' must be of the form plugin:name",
                        group, plugin.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn is_qualified(name: &str) -> bool {
    match name.split_once(':') {
        Some((plugin, local)) => !plugin.is_empty() && !local.is_empty(),
        None => false,
    }
}
