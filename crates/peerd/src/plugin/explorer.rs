// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Explorer contract.
//!
//! An explorer is a discovery source. It may run a long-lived background task
//! (answering incoming discovery queries, for instance) and is asked to explore
//! once per cycle with a [`Deadline`], pushing [`Discovery`](crate::peer::Discovery)
//! reports into a [`DiscoverySink`].

use crate::group::DiscoverySink;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Discovery source.
#[async_trait]
pub trait Explorer: Send + Sync {
    /// Background task, started once before the first cycle.
    ///
    /// Must return promptly once `shutdown` is cancelled. An error is treated
    /// as fatal by the orchestrator. The default has nothing to run.
    async fn run(&self, _shutdown: CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }

    /// One-shot exploration bounded by `deadline`.
    ///
    /// Reports may be pushed to `sink` from any task or thread. Work left
    /// running past the deadline is not aborted; it should watch
    /// [`Deadline::expired`] and stop on its own.
    async fn explore(&self, deadline: &Deadline, sink: DiscoverySink) -> anyhow::Result<()>;
}

/// Shared per-cycle deadline.
///
/// Combines the instant at which the exploration window closes with a
/// cancellation token that the orchestrator cancels when the window closes
/// or the daemon shuts down.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    token: CancellationToken,
}

impl Deadline {
    pub fn new(at: Instant, token: CancellationToken) -> Self {
        Self { at, token }
    }

    /// Deadline `timeout` from now with a fresh token.
    pub fn after(timeout: Duration) -> Self {
        Self::new(Instant::now() + timeout, CancellationToken::new())
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before the window closes (zero once expired).
    pub fn remaining(&self) -> Duration {
        if self.token.is_cancelled() {
            return Duration::ZERO;
        }
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.at
    }

    /// Resolves once the window has closed or was cancelled.
    pub async fn expired(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep_until(self.at) => {}
        }
    }

    /// Close the window for every holder of this deadline.
    pub fn expire(&self) {
        self.token.cancel();
    }
}

/// Explorer created from the plugin registry, labelled with its qualified name.
#[derive(Clone)]
pub struct ExplorerInstance {
    label: String,
    explorer: Arc<dyn Explorer>,
}

impl ExplorerInstance {
    pub fn new(label: impl Into<String>, explorer: Arc<dyn Explorer>) -> Self {
        Self {
            label: label.into(),
            explorer,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn explorer(&self) -> Arc<dyn Explorer> {
        Arc::clone(&self.explorer)
    }
}

impl fmt::Debug for ExplorerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplorerInstance")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
