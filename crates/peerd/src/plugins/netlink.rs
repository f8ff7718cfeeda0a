// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `netlink:hardwareaddr`: derive a peer from a local interface's hardware
//! address.
//!
//! The last four bytes of the MAC become the IPv4 address; the MAC fills the
//! trailing bytes of an otherwise-zero IPv6 address. Port is always 0.
//!
//! Reads `/sys/class/net/<interface>/address` (Linux).

use crate::group::DiscoverySink;
use crate::peer::Discovery;
use crate::plugin::{decode_config, Deadline, Explorer, PluginApi, PluginConfigError};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Value;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::sync::Arc;

const SYSFS_NET: &str = "/sys/class/net";

pub(crate) fn setup(api: &mut PluginApi<'_>) {
    api.register_explorer("hardwareaddr", |value| {
        Ok(Arc::new(HardwareAddrExplorer::from_value(value)?) as Arc<dyn Explorer>)
    });
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HardwareAddrConfig {
    pub interface: String,
}

#[derive(Debug)]
pub struct HardwareAddrExplorer {
    interface: String,
    sysfs_root: PathBuf,
}

impl HardwareAddrExplorer {
    pub fn new(config: HardwareAddrConfig) -> Result<Self, PluginConfigError> {
        if config.interface.is_empty() {
            return Err(PluginConfigError::Missing("interface"));
        }
        if config.interface.contains('/') {
            return Err(PluginConfigError::Invalid(format!(
                "'{}' is not an interface name",
                config.interface
            )));
        }

        Ok(Self {
            interface: config.interface,
            sysfs_root: PathBuf::from(SYSFS_NET),
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, PluginConfigError> {
        Self::new(decode_config(value)?)
    }

    async fn hardware_addr(&self) -> anyhow::Result<Vec<u8>> {
        let path = self.sysfs_root.join(&self.interface).join("address");
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("interface '{}' not found", self.interface))?;
        parse_hardware_addr(text.trim())
    }
}

/// Parse a colon-separated hex hardware address.
fn parse_hardware_addr(text: &str) -> anyhow::Result<Vec<u8>> {
    text.split(':')
        .map(|byte| {
            if byte.len() != 2 {
                return Err(anyhow!("malformed hardware address '{}'", text));
            }
            u8::from_str_radix(byte, 16)
                .map_err(|_| anyhow!("malformed hardware address '{}'", text))
        })
        .collect()
}

/// Map a hardware address onto a discovery report.
fn discovery_from_hardware_addr(addr: &[u8]) -> anyhow::Result<Discovery> {
    if addr.len() < 4 || addr.len() > 16 {
        bail!("unsupported hardware address length {}", addr.len());
    }

    let mut v4 = [0u8; 4];
    v4.copy_from_slice(&addr[addr.len() - 4..]);

    let mut v6 = [0u8; 16];
    v6[16 - addr.len()..].copy_from_slice(addr);

    Ok(Discovery {
        ipv4: Some(Ipv4Addr::from(v4)),
        ipv6: Some(Ipv6Addr::from(v6)),
        port: 0,
    })
}

#[async_trait]
impl Explorer for HardwareAddrExplorer {
    async fn explore(&self, _deadline: &Deadline, sink: DiscoverySink) -> anyhow::Result<()> {
        let addr = self.hardware_addr().await?;
        sink.discovered(discovery_from_hardware_addr(&addr)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Group;
    use std::time::Duration;

    fn explorer_in(root: &std::path::Path, iface: &str) -> HardwareAddrExplorer {
        let mut explorer = HardwareAddrExplorer::new(HardwareAddrConfig {
            interface: iface.to_string(),
        })
        .unwrap();
        explorer.sysfs_root = root.to_path_buf();
        explorer
    }

    #[test]
    fn test_interface_required() {
        let err = HardwareAddrExplorer::from_value(&Value::Null).unwrap_err();
        assert!(matches!(err, PluginConfigError::Missing("interface")));

        let value: Value = serde_yaml::from_str("interface: ../etc").unwrap();
        assert!(HardwareAddrExplorer::from_value(&value).is_err());
    }

    #[test]
    fn test_parse_hardware_addr() {
        assert_eq!(
            parse_hardware_addr("02:42:ac:11:00:02").unwrap(),
            vec![0x02, 0x42, 0xac, 0x11, 0x00, 0x02]
        );
        assert!(parse_hardware_addr("").is_err());
        assert!(parse_hardware_addr("02:42:zz:11:00:02").is_err());
        assert!(parse_hardware_addr("2:42:ac:11:00:02").is_err());
    }

    #[test]
    fn test_mapping() {
        let report =
            discovery_from_hardware_addr(&[0x02, 0x42, 0xac, 0x11, 0x00, 0x02]).unwrap();

        assert_eq!(report.ipv4, Some(Ipv4Addr::new(172, 17, 0, 2)));
        assert_eq!(
            report.ipv6,
            Some("::242:ac11:2".parse::<Ipv6Addr>().unwrap())
        );
        assert_eq!(report.port, 0);

        assert!(discovery_from_hardware_addr(&[1, 2, 3]).is_err());
        assert!(discovery_from_hardware_addr(&[0; 20]).is_err());
    }

    #[tokio::test]
    async fn test_explore_reports_one_peer() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("eth0")).unwrap();
        std::fs::write(root.path().join("eth0/address"), "02:42:ac:11:00:02\n").unwrap();

        let group = Group::new("hw");
        let explorer = explorer_in(root.path(), "eth0");
        explorer
            .explore(&Deadline::after(Duration::from_secs(1)), group.sink())
            .await
            .unwrap();

        let peers = group.peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].ipv4, Some(Ipv4Addr::new(172, 17, 0, 2)));
        assert!(peers[0].is_pending());
    }

    #[tokio::test]
    async fn test_explore_unknown_interface() {
        let root = tempfile::tempdir().unwrap();
        let group = Group::new("hw");
        let explorer = explorer_in(root.path(), "eth9");

        let err = explorer
            .explore(&Deadline::after(Duration::from_secs(1)), group.sink())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("eth9"));
        assert!(group.peers().is_empty());
    }
}
