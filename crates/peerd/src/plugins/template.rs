// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `template:file`: render the peer list into a file after every cycle.
//!
//! ```yaml
//! - name: template:file
//!   configuration:
//!     filename: /etc/haproxy/backends.cfg
//!     mode: "0640"
//!     template_string: |
//!       {% for peer in peers %}server {{ peer.ipv4 }} {{ peer.ipv4 }}:{{ peer.port }}
//!       {% endfor %}
//! ```
//!
//! Templates use Tera syntax. The context holds `peers`, each with `ipv4`,
//! `ipv6`, `port`, `first_seen` and `last_seen`.

use crate::group::Membership;
use crate::peer::Peer;
use crate::plugin::{decode_config, Handler, PluginApi, PluginConfigError};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tera::Tera;
use tracing::debug;

const TEMPLATE_NAME: &str = "peers";
const DEFAULT_MODE: u32 = 0o644;

pub(crate) fn setup(api: &mut PluginApi<'_>) {
    api.register_handler("file", |value| {
        Ok(Box::new(FileHandler::from_value(value)?) as Box<dyn Handler>)
    });
}

/// File permissions as octal digits, as `chmod` takes them.
///
/// `mode: 0644` arrives as a string and `mode: 644` as an integer; both mean
/// `0o644`, since an integer's decimal digits are read as octal digits. YAML
/// turns an unquoted `0o644` into the integer 420, so that form must be
/// quoted (`"0o644"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FileMode {
    Bits(u32),
    Octal(String),
}

impl FileMode {
    fn bits(&self) -> Result<u32, PluginConfigError> {
        let bits = match self {
            FileMode::Bits(digits) => {
                u32::from_str_radix(&digits.to_string(), 8).map_err(|_| {
                    PluginConfigError::Invalid(format!("mode {} is not an octal number", digits))
                })?
            }
            FileMode::Octal(text) => {
                let digits = text.trim();
                let digits = digits.strip_prefix("0o").unwrap_or(digits);
                u32::from_str_radix(digits, 8).map_err(|_| {
                    PluginConfigError::Invalid(format!("mode '{}' is not an octal number", text))
                })?
            }
        };

        if bits > 0o7777 {
            return Err(PluginConfigError::Invalid(format!(
                "mode {:o} is out of range",
                bits
            )));
        }
        Ok(bits)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub filename: Option<PathBuf>,
    pub mode: Option<FileMode>,
    pub template_filename: Option<PathBuf>,
    pub template_string: Option<String>,
}

#[derive(Serialize)]
struct TemplateContext<'a> {
    peers: &'a [Peer],
}

/// Renders the reconciled peer list to a file.
#[derive(Debug)]
pub struct FileHandler {
    tera: Tera,
    path: PathBuf,
    staging: PathBuf,
    mode: u32,
}

impl FileHandler {
    /// Validate the configuration and parse the template.
    pub fn new(config: FileConfig) -> Result<Self, PluginConfigError> {
        let path = config
            .filename
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(PluginConfigError::Missing("filename"))?;
        let staging = staging_path(&path)?;

        let mode = match &config.mode {
            Some(mode) => mode.bits()?,
            None => DEFAULT_MODE,
        };

        let template_filename = config
            .template_filename
            .filter(|p| !p.as_os_str().is_empty());
        let template_string = config.template_string.filter(|s| !s.is_empty());

        let source = match (template_filename, template_string) {
            (Some(_), Some(_)) => {
                return Err(PluginConfigError::Conflict(
                    "template_filename",
                    "template_string",
                ))
            }
            (None, None) => return Err(PluginConfigError::Missing("template_string")),
            (Some(file), None) => std::fs::read_to_string(file)?,
            (None, Some(text)) => text,
        };

        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, &source)
            .map_err(|e| PluginConfigError::Invalid(format!("template: {}", e)))?;

        Ok(Self {
            tera,
            path,
            staging,
            mode,
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, PluginConfigError> {
        Self::new(decode_config(value)?)
    }

    fn render(&self, peers: &[Peer]) -> anyhow::Result<String> {
        let ctx = tera::Context::from_serialize(TemplateContext { peers })?;
        self.tera
            .render(TEMPLATE_NAME, &ctx)
            .context("failed to render template")
    }

    /// Write through a staging file in the same directory, then rename over
    /// the target.
    async fn write(&self, contents: &str) -> anyhow::Result<()> {
        tokio::fs::write(&self.staging, contents)
            .await
            .with_context(|| format!("failed to write {}", self.staging.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(self.mode);
            tokio::fs::set_permissions(&self.staging, perms)
                .await
                .with_context(|| format!("failed to chmod {}", self.staging.display()))?;
        }

        if let Err(e) = tokio::fs::rename(&self.staging, &self.path).await {
            let _ = tokio::fs::remove_file(&self.staging).await;
            return Err(e).with_context(|| format!("failed to replace {}", self.path.display()));
        }

        debug!(
            "Wrote {} ({} bytes, mode {:o})",
            self.path.display(),
            contents.len(),
            self.mode
        );
        Ok(())
    }
}

fn staging_path(path: &Path) -> Result<PathBuf, PluginConfigError> {
    let name = path.file_name().ok_or_else(|| {
        PluginConfigError::Invalid(format!("'{}' does not name a file", path.display()))
    })?;
    Ok(path.with_file_name(format!(".{}.tmp", name.to_string_lossy())))
}

#[async_trait]
impl Handler for FileHandler {
    async fn post_exploration(&self, membership: &Membership) -> anyhow::Result<()> {
        let contents = self.render(&membership.peers)?;
        self.write(&contents).await
    }
}
