// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer discovery daemon
//!
//! Maintains, per named group, the set of peers found by pluggable
//! discovery sources (explorers) and notifies pluggable reactors (handlers)
//! whenever that set changes.
//!
//! # Features
//!
//! - **Peer lifecycle**: pending, active and evicted peers, with TTL eviction
//! - **Cycles**: bounded exploration window, then reconciliation and hooks
//! - **Plugins**: explorers and handlers resolved by qualified name
//! - **Built-ins**: `exec:command`, `template:file`, `netlink:hardwareaddr`,
//!   `multicast:dns`
//!
//! # Quick Start
//!
//! ```bash
//! # Run with the default configuration file
//! peerd
//!
//! # Validate a configuration file and exit
//! peerd --config peerd.yaml --check
//! ```
//!
//! # Configuration File
//!
//! ```yaml
//! ttl: 30s
//! exploration_timeout: 10s
//! groups:
//!   cluster:
//!     explorers:
//!       - name: netlink:hardwareaddr
//!         configuration:
//!           interface: eth0
//!     handlers:
//!       - name: exec:command
//!         configuration:
//!           command: /usr/local/bin/reload-cluster
//!           on_post_exploration:
//!             new_peers: true
//! ```

pub mod config;
pub mod group;
pub mod orchestrator;
pub mod peer;
pub mod plugin;
pub mod plugins;

pub use config::{ConfigError, GroupConfig, PeerdConfig, PluginConfig};
pub use group::{DiscoverySink, Group, Membership};
pub use orchestrator::{CycleSettings, Orchestrator, OrchestratorError};
pub use peer::{Discovery, Peer, PeerKey};
pub use plugin::{
    Deadline, Explorer, Handler, PluginApi, PluginConfigError, PluginError, PluginRegistry,
};
