// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Plugin contracts and registry.

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

pub mod explorer;
pub mod handler;
pub mod registry;

pub use explorer::{Deadline, Explorer, ExplorerInstance};
pub use handler::{Handler, HandlerInstance};
pub use registry::{
    qualified_name, ExplorerFactory, HandlerFactory, PluginApi, PluginError, PluginRegistry,
};

/// Errors returned by plugin factories for invalid configuration.
#[derive(Debug, Error)]
pub enum PluginConfigError {
    #[error("invalid configuration document: {0}")]
    Decode(#[from] serde_yaml::Error),

    #[error("missing required field '{0}'")]
    Missing(&'static str),

    #[error("fields '{0}' and '{1}' are mutually exclusive")]
    Conflict(&'static str, &'static str),

    #[error("invalid value: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode a plugin configuration document into a typed struct.
///
/// An absent document (`null`) decodes like an empty mapping, so structs with
/// all-default fields accept a missing `configuration` key.
pub fn decode_config<T: DeserializeOwned>(value: &Value) -> Result<T, PluginConfigError> {
    let value = match value {
        Value::Null => Value::Mapping(Mapping::new()),
        other => other.clone(),
    };
    Ok(serde_yaml::from_value(value)?)
}
