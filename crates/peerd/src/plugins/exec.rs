// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `exec:command`: run an external command on selected hooks.
//!
//! ```yaml
//! - name: exec:command
//!   configuration:
//!     command: /usr/bin/systemctl
//!     args: [reload, haproxy]
//!     on_new_peer: false
//!     on_post_exploration:
//!       new_peers: true
//!       lost_peers: true
//! ```
//!
//! The command is spawned directly, without a shell.

use crate::group::Membership;
use crate::peer::Peer;
use crate::plugin::{decode_config, Handler, PluginApi, PluginConfigError};
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Value;
use tokio::process::Command;
use tracing::{debug, warn};

pub(crate) fn setup(api: &mut PluginApi<'_>) {
    api.register_handler("command", |value| {
        Ok(Box::new(CommandHandler::from_value(value)?) as Box<dyn Handler>)
    });
}

/// Post-exploration triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PostExplorationTriggers {
    /// Run after every cycle
    pub always: bool,
    /// Run when the cycle promoted at least one peer
    pub new_peers: bool,
    /// Run when the cycle evicted at least one peer
    pub lost_peers: bool,
}

impl PostExplorationTriggers {
    fn matches(&self, membership: &Membership) -> bool {
        self.always
            || (self.new_peers && !membership.new_peers.is_empty())
            || (self.lost_peers && !membership.lost_peers.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub command: String,
    pub args: Vec<String>,
    pub on_pre_exploration: bool,
    pub on_new_peer: bool,
    pub on_lost_peer: bool,
    pub on_post_exploration: PostExplorationTriggers,
}

/// Runs a command on the configured hooks.
#[derive(Debug)]
pub struct CommandHandler {
    config: CommandConfig,
}

impl CommandHandler {
    pub fn new(config: CommandConfig) -> Result<Self, PluginConfigError> {
        if config.command.is_empty() {
            return Err(PluginConfigError::Missing("command"));
        }
        Ok(Self { config })
    }

    pub fn from_value(value: &Value) -> Result<Self, PluginConfigError> {
        Self::new(decode_config(value)?)
    }

    async fn run(&self) -> anyhow::Result<()> {
        let output = Command::new(&self.config.command)
            .args(&self.config.args)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn '{}'", self.config.command))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            debug!(
                "Command '{}' with args {:?} ran successfully, stdout={:?}, stderr={:?}",
                self.config.command, self.config.args, stdout, stderr
            );
            Ok(())
        } else {
            warn!(
                "Command '{}' with args {:?} failed, stdout={:?}, stderr={:?}",
                self.config.command, self.config.args, stdout, stderr
            );
            bail!("'{}' exited with {}", self.config.command, output.status)
        }
    }
}

#[async_trait]
impl Handler for CommandHandler {
    async fn pre_exploration(&self, _peers: &[Peer]) -> anyhow::Result<()> {
        if self.config.on_pre_exploration {
            self.run().await?;
        }
        Ok(())
    }

    async fn new_peer(&self, _peer: &Peer) -> anyhow::Result<()> {
        if self.config.on_new_peer {
            self.run().await?;
        }
        Ok(())
    }

    async fn lost_peer(&self, _peer: &Peer) -> anyhow::Result<()> {
        if self.config.on_lost_peer {
            self.run().await?;
        }
        Ok(())
    }

    async fn post_exploration(&self, membership: &Membership) -> anyhow::Result<()> {
        if self.config.on_post_exploration.matches(membership) {
            self.run().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::Discovery;
    use chrono::Utc;
    use std::net::Ipv4Addr;
    use std::path::Path;

    fn peer() -> Peer {
        let report = Discovery {
            ipv4: Some(Ipv4Addr::new(10, 0, 0, 1)),
            ipv6: None,
            port: 9000,
        };
        Peer::pending(&report, Utc::now())
    }

    fn touch(path: &Path, yaml: &str) -> CommandHandler {
        let value: Value = serde_yaml::from_str(&format!(
            "command: touch\nargs: [\"{}\"]\n{}",
            path.display(),
            yaml
        ))
        .unwrap();
        CommandHandler::from_value(&value).unwrap()
    }

    #[test]
    fn test_command_required() {
        let err = CommandHandler::from_value(&Value::Null).unwrap_err();
        assert!(matches!(err, PluginConfigError::Missing("command")));

        let value: Value = serde_yaml::from_str("command: \"\"").unwrap();
        assert!(CommandHandler::from_value(&value).is_err());
    }

    #[test]
    fn test_config_defaults() {
        let value: Value = serde_yaml::from_str("command: /bin/true").unwrap();
        let handler = CommandHandler::from_value(&value).unwrap();

        assert!(handler.config.args.is_empty());
        assert!(!handler.config.on_new_peer);
        assert_eq!(
            handler.config.on_post_exploration,
            PostExplorationTriggers::default()
        );
    }

    #[test]
    fn test_post_exploration_triggers() {
        let empty = Membership::default();
        let with_new = Membership {
            peers: vec![peer()],
            new_peers: vec![peer()],
            lost_peers: Vec::new(),
        };
        let with_lost = Membership {
            peers: Vec::new(),
            new_peers: Vec::new(),
            lost_peers: vec![peer()],
        };

        let always = PostExplorationTriggers {
            always: true,
            ..Default::default()
        };
        assert!(always.matches(&empty));

        let on_new = PostExplorationTriggers {
            new_peers: true,
            ..Default::default()
        };
        assert!(!on_new.matches(&empty));
        assert!(on_new.matches(&with_new));
        assert!(!on_new.matches(&with_lost));

        let on_lost = PostExplorationTriggers {
            lost_peers: true,
            ..Default::default()
        };
        assert!(on_lost.matches(&with_lost));
        assert!(!on_lost.matches(&with_new));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_only_on_enabled_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let handler = touch(&marker, "on_lost_peer: true");

        handler.new_peer(&peer()).await.unwrap();
        handler.pre_exploration(&[]).await.unwrap();
        assert!(!marker.exists());

        handler.lost_peer(&peer()).await.unwrap();
        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_post_exploration_runs_on_new_peers() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let handler = touch(&marker, "on_post_exploration:\n  new_peers: true");

        handler
            .post_exploration(&Membership::default())
            .await
            .unwrap();
        assert!(!marker.exists());

        let membership = Membership {
            peers: vec![peer()],
            new_peers: vec![peer()],
            lost_peers: Vec::new(),
        };
        handler.post_exploration(&membership).await.unwrap();
        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let value: Value =
            serde_yaml::from_str("command: sh\nargs: [-c, \"exit 3\"]\non_new_peer: true")
                .unwrap();
        let handler = CommandHandler::from_value(&value).unwrap();

        assert!(handler.new_peer(&peer()).await.is_err());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let value: Value =
            serde_yaml::from_str("command: /nonexistent/peerd-test-binary\non_new_peer: true")
                .unwrap();
        let handler = CommandHandler::from_value(&value).unwrap();

        let err = handler.new_peer(&peer()).await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
