// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `multicast:dns`: announce this instance over mDNS and browse for others.
//!
//! ```yaml
//! - name: multicast:dns
//!   configuration:
//!     hostname: node-a
//!     service: _peerd._tcp
//!     port: 7946
//!     interface: eth0
//!     allowed_ips: [10.0.0.0/8]
//! ```
//!
//! The background task keeps the service registered until shutdown. Each
//! exploration browses the service type until the deadline and reports every
//! resolved instance other than this one.

use crate::group::DiscoverySink;
use crate::peer::Discovery;
use crate::plugin::{decode_config, Deadline, Explorer, PluginApi, PluginConfigError};
use anyhow::Context;
use async_trait::async_trait;
use ipnetwork::IpNetwork;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use serde::Deserialize;
use serde_yaml::Value;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) fn setup(api: &mut PluginApi<'_>) {
    api.register_explorer("dns", |value| {
        Ok(Arc::new(DnsExplorer::from_value(value)?) as Arc<dyn Explorer>)
    });
}

fn default_domain() -> String {
    "local".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Instance name; a random UUID when unset
    pub instance_id: Option<String>,
    /// Interface whose addresses are announced
    pub interface: Option<String>,
    /// Announced addresses, overriding interface discovery
    pub ips: Vec<IpAddr>,
    /// CIDR filter applied to the announced addresses
    pub allowed_ips: Vec<String>,
    pub hostname: String,
    pub domain: String,
    /// Service type, e.g. `_peerd._tcp`
    pub service: String,
    pub port: u16,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            interface: None,
            ips: Vec::new(),
            allowed_ips: Vec::new(),
            hostname: String::new(),
            domain: default_domain(),
            service: String::new(),
            port: 0,
        }
    }
}

/// Validated announcement parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSettings {
    pub instance_id: String,
    /// `<service>.<domain>.`
    pub ty_domain: String,
    /// `<hostname>.<domain>.`
    pub host_name: String,
    pub port: u16,
    pub ips: Vec<IpAddr>,
}

impl DnsSettings {
    /// Validate `config` against the local `(interface, address)` list.
    pub fn resolve(
        config: DnsConfig,
        interfaces: &[(String, IpAddr)],
    ) -> Result<Self, PluginConfigError> {
        if config.hostname.is_empty() {
            return Err(PluginConfigError::Missing("hostname"));
        }
        if config.service.is_empty() {
            return Err(PluginConfigError::Missing("service"));
        }
        let domain = if config.domain.is_empty() {
            default_domain()
        } else {
            config.domain
        };

        let filters = config
            .allowed_ips
            .iter()
            .map(|cidr| {
                cidr.parse::<IpNetwork>().map_err(|e| {
                    PluginConfigError::Invalid(format!("allowed_ips '{}': {}", cidr, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let candidates: Vec<IpAddr> = if !config.ips.is_empty() {
            config.ips
        } else {
            interfaces
                .iter()
                .filter(|(name, ip)| match &config.interface {
                    Some(iface) => name == iface,
                    None => !ip.is_loopback(),
                })
                .map(|(_, ip)| *ip)
                .collect()
        };

        let ips: Vec<IpAddr> = if filters.is_empty() {
            candidates
        } else {
            candidates
                .into_iter()
                .filter(|ip| filters.iter().any(|net| net.contains(*ip)))
                .collect()
        };

        if ips.is_empty() {
            return Err(PluginConfigError::Invalid(format!(
                "no suitable IP addresses for interface {}",
                config.interface.as_deref().unwrap_or("<any>")
            )));
        }

        let instance_id = config
            .instance_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            instance_id,
            ty_domain: format!("{}.{}.", config.service, domain),
            host_name: format!("{}.{}.", config.hostname, domain),
            port: config.port,
            ips,
        })
    }

    /// Full instance name as seen on the wire.
    pub fn fullname(&self) -> String {
        format!("{}.{}", self.instance_id, self.ty_domain)
    }

    /// Whether a browsed instance should be reported.
    fn accepts(&self, fullname: &str) -> bool {
        if fullname == self.fullname() {
            debug!("Skipping entry {} as it's ourself", fullname);
            return false;
        }
        let suffix = format!(".{}", self.ty_domain);
        if !fullname.ends_with(&suffix) {
            debug!("Skipping alien service {}", fullname);
            return false;
        }
        true
    }
}

/// Build a report from resolved addresses: first IPv4, first IPv6.
fn discovery_from_addrs<I>(addrs: I, port: u16) -> Discovery
where
    I: IntoIterator<Item = IpAddr>,
{
    let mut report = Discovery {
        port,
        ..Default::default()
    };
    for addr in addrs {
        match addr {
            IpAddr::V4(v4) if report.ipv4.is_none() => report.ipv4 = Some(v4),
            IpAddr::V6(v6) if report.ipv6.is_none() => report.ipv6 = Some(v6),
            _ => {}
        }
    }
    report
}

/// Parse an address as printed by mdns-sd, dropping any `%scope` suffix.
fn parse_addr(text: &str) -> Option<IpAddr> {
    text.split('%').next()?.parse().ok()
}

pub struct DnsExplorer {
    settings: DnsSettings,
    service: ServiceInfo,
    daemon: ServiceDaemon,
}

impl DnsExplorer {
    pub fn new(settings: DnsSettings) -> Result<Self, PluginConfigError> {
        let addrs = settings
            .ips
            .iter()
            .map(IpAddr::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let properties = [("id", settings.instance_id.as_str())];

        let service = ServiceInfo::new(
            &settings.ty_domain,
            &settings.instance_id,
            &settings.host_name,
            addrs.as_str(),
            settings.port,
            &properties[..],
        )
        .map_err(|e| PluginConfigError::Invalid(format!("mDNS service: {}", e)))?;

        let daemon = ServiceDaemon::new()
            .map_err(|e| PluginConfigError::Invalid(format!("mDNS daemon: {}", e)))?;

        Ok(Self {
            settings,
            service,
            daemon,
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, PluginConfigError> {
        let config: DnsConfig = decode_config(value)?;
        let interfaces = local_ip_address::list_afinet_netifas().map_err(|e| {
            PluginConfigError::Invalid(format!("failed to list network interfaces: {}", e))
        })?;
        Self::new(DnsSettings::resolve(config, &interfaces)?)
    }
}

impl Drop for DnsExplorer {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            debug!("Failed to stop mDNS daemon: {}", e);
        }
    }
}

#[async_trait]
impl Explorer for DnsExplorer {
    async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let fullname = self.service.get_fullname().to_string();
        self.daemon
            .register(self.service.clone())
            .with_context(|| format!("failed to register {}", fullname))?;
        info!(
            "Announcing {} on {:?} port {}",
            fullname, self.settings.ips, self.settings.port
        );

        shutdown.cancelled().await;

        info!("Unregistering {}", fullname);
        if let Err(e) = self.daemon.unregister(&fullname) {
            warn!("Failed to unregister {}: {}", fullname, e);
        }
        Ok(())
    }

    async fn explore(&self, deadline: &Deadline, sink: DiscoverySink) -> anyhow::Result<()> {
        let ty_domain = &self.settings.ty_domain;
        let receiver = self
            .daemon
            .browse(ty_domain)
            .with_context(|| format!("failed to browse {}", ty_domain))?;

        loop {
            tokio::select! {
                _ = deadline.expired() => break,
                event = receiver.recv_async() => match event {
                    Ok(ServiceEvent::ServiceResolved(entry)) => {
                        let fullname = entry.get_fullname().to_string();
                        if !self.settings.accepts(&fullname) {
                            continue;
                        }
                        let addrs = entry
                            .get_addresses()
                            .iter()
                            .filter_map(|addr| parse_addr(&addr.to_string()))
                            .collect::<Vec<_>>();
                        let report = discovery_from_addrs(addrs, entry.get_port());
                        if report.is_empty() {
                            debug!("Skipping {} without usable address", fullname);
                            continue;
                        }
                        sink.discovered(report);
                    }
                    Ok(_) => {}
                    Err(_) => break,
                },
            }
        }

        if let Err(e) = self.daemon.stop_browse(ty_domain) {
            debug!("Failed to stop browsing {}: {}", ty_domain, e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn interfaces() -> Vec<(String, IpAddr)> {
        vec![
            ("lo".into(), IpAddr::V4(Ipv4Addr::LOCALHOST)),
            ("eth0".into(), "10.1.2.3".parse().unwrap()),
            ("eth0".into(), "fe80::1".parse().unwrap()),
            ("eth1".into(), "192.168.1.20".parse().unwrap()),
        ]
    }

    fn config(yaml: &str) -> DnsConfig {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        decode_config(&value).unwrap()
    }

    const BASE: &str = "hostname: node-a\nservice: _peerd._tcp\nport: 7946\n";

    #[test]
    fn test_required_fields() {
        let err = DnsSettings::resolve(config("service: _peerd._tcp"), &interfaces()).unwrap_err();
        assert!(matches!(err, PluginConfigError::Missing("hostname")));

        let err = DnsSettings::resolve(config("hostname: a"), &interfaces()).unwrap_err();
        assert!(matches!(err, PluginConfigError::Missing("service")));
    }

    #[test]
    fn test_defaults() {
        let settings = DnsSettings::resolve(config(BASE), &interfaces()).unwrap();

        assert_eq!(settings.ty_domain, "_peerd._tcp.local.");
        assert_eq!(settings.host_name, "node-a.local.");
        assert_eq!(settings.port, 7946);
        assert!(uuid::Uuid::parse_str(&settings.instance_id).is_ok());
        // Every non-loopback address.
        assert_eq!(settings.ips.len(), 3);
    }

    #[test]
    fn test_interface_and_filter() {
        let yaml = format!("{}interface: eth0\ninstance_id: alpha\n", BASE);
        let settings = DnsSettings::resolve(config(&yaml), &interfaces()).unwrap();
        assert_eq!(settings.instance_id, "alpha");
        assert_eq!(settings.fullname(), "alpha._peerd._tcp.local.");
        assert_eq!(settings.ips.len(), 2);

        let yaml = format!("{}interface: eth0\nallowed_ips: [10.0.0.0/8]\n", BASE);
        let settings = DnsSettings::resolve(config(&yaml), &interfaces()).unwrap();
        assert_eq!(settings.ips, vec!["10.1.2.3".parse::<IpAddr>().unwrap()]);

        let yaml = format!("{}interface: eth1\nallowed_ips: [10.0.0.0/8]\n", BASE);
        let err = DnsSettings::resolve(config(&yaml), &interfaces()).unwrap_err();
        assert!(err.to_string().contains("eth1"));
    }

    #[test]
    fn test_explicit_ips_and_bad_cidr() {
        let yaml = format!("{}ips: [172.16.0.9]\n", BASE);
        let settings = DnsSettings::resolve(config(&yaml), &[]).unwrap();
        assert_eq!(settings.ips, vec!["172.16.0.9".parse::<IpAddr>().unwrap()]);

        let yaml = format!("{}allowed_ips: [not-a-cidr]\n", BASE);
        let err = DnsSettings::resolve(config(&yaml), &interfaces()).unwrap_err();
        assert!(matches!(err, PluginConfigError::Invalid(_)));
    }

    #[test]
    fn test_accepts() {
        let yaml = format!("{}instance_id: alpha\n", BASE);
        let settings = DnsSettings::resolve(config(&yaml), &interfaces()).unwrap();

        assert!(!settings.accepts("alpha._peerd._tcp.local."));
        assert!(!settings.accepts("beta._other._tcp.local."));
        assert!(!settings.accepts("_peerd._tcp.local."));
        assert!(settings.accepts("beta._peerd._tcp.local."));
    }

    #[test]
    fn test_discovery_from_addrs() {
        let addrs = vec![
            "fe80::1".parse::<IpAddr>().unwrap(),
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
            "fe80::2".parse().unwrap(),
        ];
        let report = discovery_from_addrs(addrs, 7946);

        assert_eq!(report.ipv4, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(report.ipv6, Some("fe80::1".parse::<Ipv6Addr>().unwrap()));
        assert_eq!(report.port, 7946);

        assert!(discovery_from_addrs(Vec::new(), 7946).is_empty());
    }

    #[test]
    fn test_parse_addr() {
        assert_eq!(
            parse_addr("fe80::1%eth0"),
            Some("fe80::1".parse::<IpAddr>().unwrap())
        );
        assert_eq!(
            parse_addr("10.0.0.1"),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
        );
        assert_eq!(parse_addr("garbage"), None);
    }
}
