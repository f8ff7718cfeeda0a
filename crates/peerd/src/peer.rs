// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer entity and discovery reports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Identity of a peer within one group: (IPv4, IPv6, port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerKey {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub port: u16,
}

/// A discovery report emitted by an explorer.
///
/// Reports are not retained: they either refresh an existing peer or seed a
/// new pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Discovery {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub port: u16,
}

impl Discovery {
    /// Build a report from a single address of either family.
    pub fn from_addr(addr: IpAddr, port: u16) -> Self {
        match addr {
            IpAddr::V4(v4) => Self {
                ipv4: Some(v4),
                ipv6: None,
                port,
            },
            IpAddr::V6(v6) => Self {
                ipv4: None,
                ipv6: Some(v6),
                port,
            },
        }
    }

    /// Identity this report refers to.
    pub fn key(&self) -> PeerKey {
        PeerKey {
            ipv4: self.ipv4,
            ipv6: self.ipv6,
            port: self.port,
        }
    }

    /// True when neither address family is set.
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_none() && self.ipv6.is_none()
    }
}

/// A discovered network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    /// IPv4 address, if reported
    pub ipv4: Option<Ipv4Addr>,

    /// IPv6 address, if reported
    pub ipv6: Option<Ipv6Addr>,

    /// Service port (0 when the explorer has no port notion)
    pub port: u16,

    /// First report timestamp
    pub first_seen: DateTime<Utc>,

    /// Last refresh timestamp; `None` while the peer is pending
    pub last_seen: Option<DateTime<Utc>>,
}

impl Peer {
    /// Create a pending peer from its first report.
    pub fn pending(report: &Discovery, now: DateTime<Utc>) -> Self {
        Self {
            ipv4: report.ipv4,
            ipv6: report.ipv6,
            port: report.port,
            first_seen: now,
            last_seen: None,
        }
    }

    pub fn key(&self) -> PeerKey {
        PeerKey {
            ipv4: self.ipv4,
            ipv6: self.ipv6,
            port: self.port,
        }
    }

    /// True until the first reconciliation pass promotes the peer.
    pub fn is_pending(&self) -> bool {
        self.last_seen.is_none()
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.ipv4, self.ipv6) {
            (Some(v4), Some(v6)) => write!(f, "{}/[{}]:{}", v4, v6, self.port),
            (Some(v4), None) => write!(f, "{}:{}", v4, self.port),
            (None, Some(v6)) => write!(f, "[{}]:{}", v6, self.port),
            (None, None) => write!(f, "<no address>:{}", self.port),
        }
    }
}
