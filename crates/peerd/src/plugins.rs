// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in plugins.
//!
//! | Name                   | Kind     |
//! |------------------------|----------|
//! | `exec:command`         | handler  |
//! | `template:file`        | handler  |
//! | `netlink:hardwareaddr` | explorer |
//! | `multicast:dns`        | explorer |

use crate::plugin::PluginRegistry;

pub mod exec;
pub mod multicast;
pub mod netlink;
pub mod template;

/// Register every built-in plugin.
pub fn register_builtin(registry: &mut PluginRegistry) {
    registry.register("exec", exec::setup);
    registry.register("template", template::setup);
    registry.register("netlink", netlink::setup);
    registry.register("multicast", multicast::setup);
}
