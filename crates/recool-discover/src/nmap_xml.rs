//! Nmap XML output deserialization.
//!
//! Nmap's `-oX <file>` flag writes structured XML describing every host it
//! saw. This module provides typed Rust structs that deserialize from that
//! XML using `quick-xml` with serde, and flattens them into the per-host
//! [`HostScan`] entries the registry consumes.

use std::collections::BTreeMap;
use std::net::IpAddr;

use recool_core::{HostScan, ServiceInfo};
use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Root element: `<nmaprun>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "nmaprun")]
pub struct NmapRun {
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
    pub runstats: Option<RunStats>,
}

/// A single host from scan results.
#[derive(Debug, Clone, Deserialize)]
pub struct NmapHost {
    pub status: Option<HostStatus>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub hostnames: Option<Hostnames>,
    pub ports: Option<Ports>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostStatus {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub hostnames: Vec<Hostname>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub ports: Vec<NmapPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub port_id: u16,
    pub state: PortState,
    pub service: Option<NmapService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortState {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapService {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@product")]
    pub product: Option<String>,
    #[serde(rename = "@version")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStats {
    pub finished: Option<Finished>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Finished {
    #[serde(rename = "@elapsed")]
    pub elapsed: Option<String>,
}

impl NmapHost {
    /// The host's IP address, preferring IPv4.
    pub fn ip(&self) -> Option<IpAddr> {
        let find = |kind: &str| {
            self.addresses
                .iter()
                .find(|a| a.addr_type == kind)
                .and_then(|a| a.addr.parse().ok())
        };
        find("ipv4").or_else(|| find("ipv6"))
    }

    /// Extract the first hostname, if present.
    pub fn hostname(&self) -> Option<&str> {
        self.hostnames
            .as_ref()
            .and_then(|hn| hn.hostnames.first())
            .map(|h| h.name.as_str())
    }

    /// Check if the host is up.
    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "up")
    }

    /// Flatten into the registry's view: first hostname and the TCP port table.
    pub fn to_host_scan(&self) -> HostScan {
        let tcp = self
            .ports
            .iter()
            .flat_map(|p| &p.ports)
            .filter(|p| p.protocol == "tcp")
            .map(|p| {
                let service = p.service.as_ref();
                let info = ServiceInfo {
                    state: p.state.state.clone(),
                    name: service.map(|s| s.name.clone()).unwrap_or_default(),
                    product: service.and_then(|s| s.product.clone()).unwrap_or_default(),
                    version: service.and_then(|s| s.version.clone()).unwrap_or_default(),
                };
                (p.port_id, info)
            })
            .collect();

        HostScan {
            hostname: self.hostname().filter(|n| !n.is_empty()).map(String::from),
            tcp,
        }
    }
}

impl NmapRun {
    /// Per-host results for every host reported up, keyed by address.
    pub fn host_results(&self) -> BTreeMap<IpAddr, HostScan> {
        self.hosts
            .iter()
            .filter(|h| h.is_up())
            .filter_map(|h| Some((h.ip()?, h.to_host_scan())))
            .collect()
    }

    /// Wall-clock seconds nmap reported for the run.
    pub fn elapsed(&self) -> Option<&str> {
        self.runstats
            .as_ref()
            .and_then(|r| r.finished.as_ref())
            .and_then(|f| f.elapsed.as_deref())
    }
}

/// Parse nmap XML bytes into a structured `NmapRun`.
pub fn parse_nmap_xml(xml: &[u8]) -> Result<NmapRun> {
    quick_xml::de::from_reader(xml).map_err(|e| DiscoverError::XmlParse(format!("{e}")))
}
