// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Groups: a named peer registry bound to its explorers and handlers.

use crate::peer::{Discovery, Peer};
use crate::plugin::{ExplorerInstance, HandlerInstance};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub mod registry;

pub use registry::{PeerEvent, PeerRegistry, Reconciliation};

/// Reconciled membership handed to post-exploration hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    /// All peers retained after the pass
    pub peers: Vec<Peer>,
    /// Peers promoted by the pass
    pub new_peers: Vec<Peer>,
    /// Peers evicted by the pass
    pub lost_peers: Vec<Peer>,
}

impl From<Reconciliation> for Membership {
    fn from(result: Reconciliation) -> Self {
        let new_peers = result.new_peers().cloned().collect();
        let lost_peers = result.lost_peers().cloned().collect();
        Self {
            peers: result.peers,
            new_peers,
            lost_peers,
        }
    }
}

/// Handle through which explorers report discoveries into a group.
///
/// Cheap to clone and safe to use from any task or thread; the lookup and the
/// insert happen under one lock.
#[derive(Clone)]
pub struct DiscoverySink {
    group: Arc<str>,
    registry: Arc<Mutex<PeerRegistry>>,
}

impl DiscoverySink {
    /// Report a discovery at the current time.
    pub fn discovered(&self, report: Discovery) {
        self.discovered_at(report, Utc::now());
    }

    /// Report a discovery observed at `now`.
    pub fn discovered_at(&self, report: Discovery, now: DateTime<Utc>) {
        let inserted = self.registry.lock().discovered(&report, now);
        if inserted {
            debug!("Group '{}': discovered {:?}", self.group, report);
        }
    }
}

impl fmt::Debug for DiscoverySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoverySink")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

/// Named binding of explorers, handlers and one peer registry.
pub struct Group {
    name: Arc<str>,
    explorers: Vec<ExplorerInstance>,
    handlers: Vec<HandlerInstance>,
    registry: Arc<Mutex<PeerRegistry>>,
}

impl Group {
    /// Create an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            explorers: Vec::new(),
            handlers: Vec::new(),
            registry: Arc::new(Mutex::new(PeerRegistry::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_explorer(&mut self, explorer: ExplorerInstance) {
        self.explorers.push(explorer);
    }

    /// Handlers are invoked in the order they were added.
    pub fn add_handler(&mut self, handler: HandlerInstance) {
        self.handlers.push(handler);
    }

    pub fn explorers(&self) -> &[ExplorerInstance] {
        &self.explorers
    }

    pub fn handlers(&self) -> &[HandlerInstance] {
        &self.handlers
    }

    /// Sink feeding this group's registry.
    pub fn sink(&self) -> DiscoverySink {
        DiscoverySink {
            group: Arc::clone(&self.name),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Copy of the current peer set.
    pub fn peers(&self) -> Vec<Peer> {
        self.registry.lock().snapshot()
    }

    /// Run a reconciliation pass at the current time.
    pub async fn reconcile(&self, ttl: Duration) -> Membership {
        self.reconcile_at(Utc::now(), ttl).await
    }

    /// Run a reconciliation pass evaluated at `now`.
    ///
    /// The registry transitions are applied first, under the lock; new-peer and
    /// lost-peer hooks are then dispatched in pass order. Hook failures are
    /// logged and never undo a transition.
    pub async fn reconcile_at(&self, now: DateTime<Utc>, ttl: Duration) -> Membership {
        let result = self.registry.lock().reconcile(now, ttl);

        for event in &result.events {
            match event {
                PeerEvent::New(peer) => {
                    debug!("Group '{}': new peer {}", self.name, peer);
                    for h in &self.handlers {
                        if let Err(e) = h.handler().new_peer(peer).await {
                            warn!(
                                "Failed running new-peer hook for group '{}' of handler '{}': {:#}",
                                self.name,
                                h.label(),
                                e
                            );
                        }
                    }
                }
                PeerEvent::Lost(peer) => {
                    debug!("Group '{}': lost peer {}", self.name, peer);
                    for h in &self.handlers {
                        if let Err(e) = h.handler().lost_peer(peer).await {
                            warn!(
                                "Failed running lost-peer hook for group '{}' of handler '{}': {:#}",
                                self.name,
                                h.label(),
                                e
                            );
                        }
                    }
                }
            }
        }

        Membership::from(result)
    }

    /// Invoke every handler's pre-exploration hook with the current peers.
    pub async fn pre_exploration(&self) {
        let peers = self.peers();
        for h in &self.handlers {
            if let Err(e) = h.handler().pre_exploration(&peers).await {
                warn!(
                    "Failed running pre-exploration hook for group '{}' of handler '{}': {:#}",
                    self.name,
                    h.label(),
                    e
                );
            }
        }
    }

    /// Invoke every handler's post-exploration hook.
    pub async fn post_exploration(&self, membership: &Membership) {
        for h in &self.handlers {
            if let Err(e) = h.handler().post_exploration(membership).await {
                warn!(
                    "Failed running post-exploration hook for group '{}' of handler '{}': {:#}",
                    self.name,
                    h.label(),
                    e
                );
            }
        }
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("explorers", &self.explorers)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}
