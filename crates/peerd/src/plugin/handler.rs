// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handler contract.

use crate::group::Membership;
use crate::peer::Peer;
use async_trait::async_trait;
use std::fmt;

/// Reaction sink invoked on membership lifecycle events.
///
/// Hooks are called sequentially, once per cycle per handler. A failing hook
/// is logged and does not affect other hooks or later cycles. Every hook
/// defaults to a no-op.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Before probing, with the current membership.
    async fn pre_exploration(&self, _peers: &[Peer]) -> anyhow::Result<()> {
        Ok(())
    }

    /// Once per newly promoted peer.
    async fn new_peer(&self, _peer: &Peer) -> anyhow::Result<()> {
        Ok(())
    }

    /// Once per newly evicted peer.
    async fn lost_peer(&self, _peer: &Peer) -> anyhow::Result<()> {
        Ok(())
    }

    /// After reconciliation, with the reconciled membership.
    async fn post_exploration(&self, _membership: &Membership) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Handler created from the plugin registry, labelled with its qualified name.
pub struct HandlerInstance {
    label: String,
    handler: Box<dyn Handler>,
}

impl HandlerInstance {
    pub fn new(label: impl Into<String>, handler: Box<dyn Handler>) -> Self {
        Self {
            label: label.into(),
            handler,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for HandlerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInstance")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
