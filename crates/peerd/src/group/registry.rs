// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer registry for one group.
//!
//! Holds the authoritative peer set and implements the
//! pending -> active -> evicted state machine. The registry itself performs
//! no I/O and takes the current time as an argument; hook dispatch happens in
//! [`Group`](super::Group) after the pass has completed.

use crate::peer::{Discovery, Peer, PeerKey};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Lifecycle transition produced by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Pending peer promoted to active
    New(Peer),
    /// Active peer evicted after its TTL elapsed
    Lost(Peer),
}

impl PeerEvent {
    pub fn peer(&self) -> &Peer {
        match self {
            Self::New(peer) | Self::Lost(peer) => peer,
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Peers retained after eviction
    pub peers: Vec<Peer>,

    /// Transitions in pass order
    pub events: Vec<PeerEvent>,
}

impl Reconciliation {
    /// Peers promoted by this pass.
    pub fn new_peers(&self) -> impl Iterator<Item = &Peer> {
        self.events.iter().filter_map(|e| match e {
            PeerEvent::New(peer) => Some(peer),
            PeerEvent::Lost(_) => None,
        })
    }

    /// Peers evicted by this pass.
    pub fn lost_peers(&self) -> impl Iterator<Item = &Peer> {
        self.events.iter().filter_map(|e| match e {
            PeerEvent::Lost(peer) => Some(peer),
            PeerEvent::New(_) => None,
        })
    }
}

/// Registry of the peers known to a group.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    /// Peers indexed by identity
    peers: HashMap<PeerKey, Peer>,
}

impl PeerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Record a discovery report.
    ///
    /// An unknown identity becomes a pending peer. A known active peer has its
    /// `last_seen` refreshed; a known pending peer stays pending so that the
    /// next pass still promotes it. Returns `true` when a peer was inserted.
    pub fn discovered(&mut self, report: &Discovery, now: DateTime<Utc>) -> bool {
        match self.peers.get_mut(&report.key()) {
            Some(peer) => {
                if !peer.is_pending() {
                    peer.last_seen = Some(now);
                }
                false
            }
            None => {
                self.peers.insert(report.key(), Peer::pending(report, now));
                true
            }
        }
    }

    /// Get a peer by identity.
    pub fn get(&self, key: &PeerKey) -> Option<&Peer> {
        self.peers.get(key)
    }

    /// Copy of the current peer set, oldest first.
    pub fn snapshot(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.values().cloned().collect();
        sort_peers(&mut peers);
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Promote pending peers and evict stale ones, evaluated at `now`.
    ///
    /// Pending peers get `last_seen = now`. Active peers whose `last_seen` is
    /// at least `ttl` old are removed. A peer promoted by this pass is never
    /// evicted by the same pass, even with a zero TTL.
    pub fn reconcile(&mut self, now: DateTime<Utc>, ttl: Duration) -> Reconciliation {
        let mut order: Vec<(DateTime<Utc>, PeerKey)> = self
            .peers
            .values()
            .map(|peer| (peer.first_seen, peer.key()))
            .collect();
        order.sort();

        let mut events = Vec::new();

        for (_, key) in order {
            let Some(peer) = self.peers.get_mut(&key) else {
                continue;
            };

            let last_seen = peer.last_seen;
            match last_seen {
                None => {
                    peer.last_seen = Some(now);
                    events.push(PeerEvent::New(peer.clone()));
                }
                Some(last_seen) if is_stale(last_seen, now, ttl) => {
                    if let Some(peer) = self.peers.remove(&key) {
                        events.push(PeerEvent::Lost(peer));
                    }
                }
                Some(_) => {}
            }
        }

        Reconciliation {
            peers: self.snapshot(),
            events,
        }
    }
}

fn is_stale(last_seen: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    // A last_seen in the future (clock step) is never stale.
    match (now - last_seen).to_std() {
        Ok(elapsed) => elapsed >= ttl,
        Err(_) => false,
    }
}

pub(crate) fn sort_peers(peers: &mut [Peer]) {
    peers.sort_by(|a, b| (a.first_seen, a.key()).cmp(&(b.first_seen, b.key())));
}
