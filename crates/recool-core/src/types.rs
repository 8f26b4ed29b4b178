//! Core domain types for recool.
//!
//! A `Device` is created lazily the first time an IP is referenced and is
//! only ever mutated forward: flags go from `false` to `true`, the name is
//! set at most once and services are upserted, never removed.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

// ── Services ──────────────────────────────────────────────────────

/// What a full scan found on a single TCP port.
///
/// Fields the scanner did not report are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub version: String,
}

impl ServiceInfo {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }
}

// ── Scan results ──────────────────────────────────────────────────

/// One host's entry in a parsed scanner result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostScan {
    /// First reported hostname, if any.
    pub hostname: Option<String>,
    /// TCP port table keyed by port number.
    pub tcp: BTreeMap<u16, ServiceInfo>,
}

impl HostScan {
    /// True when the result carries neither a hostname nor port data.
    pub fn is_empty(&self) -> bool {
        self.hostname.as_deref().map_or(true, str::is_empty) && self.tcp.is_empty()
    }
}

// ── Devices ───────────────────────────────────────────────────────

/// A device on the scanned network, keyed by its IP address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    ip: IpAddr,
    name: Option<String>,
    is_up: bool,
    done_ping_scan: bool,
    done_full_scan: bool,
    services: BTreeMap<u16, ServiceInfo>,
}

impl Device {
    /// A fresh record: not up, not scanned, no services.
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            name: None,
            is_up: false,
            done_ping_scan: false,
            done_full_scan: false,
            services: BTreeMap::new(),
        }
    }

    /// Rebuild a record from persisted state.
    ///
    /// A record claiming a finished full scan is always up.
    pub fn restore(
        ip: IpAddr,
        name: Option<String>,
        is_up: bool,
        done_ping_scan: bool,
        done_full_scan: bool,
        services: BTreeMap<u16, ServiceInfo>,
    ) -> Self {
        Self {
            ip,
            name: name.filter(|n| !n.is_empty()),
            is_up: is_up || done_full_scan,
            done_ping_scan,
            done_full_scan,
            services,
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_up(&self) -> bool {
        self.is_up
    }

    pub fn done_ping_scan(&self) -> bool {
        self.done_ping_scan
    }

    pub fn done_full_scan(&self) -> bool {
        self.done_full_scan
    }

    pub fn services(&self) -> &BTreeMap<u16, ServiceInfo> {
        &self.services
    }

    /// Whether at least one service is in the `open` state.
    pub fn has_open_services(&self) -> bool {
        self.services.values().any(ServiceInfo::is_open)
    }

    pub fn mark_up(&mut self) {
        self.is_up = true;
    }

    pub fn mark_ping_scanned(&mut self) {
        self.done_ping_scan = true;
    }

    /// Record a completed full scan. Only hosts that answered get one,
    /// so this also marks the device up.
    pub fn mark_full_scanned(&mut self) {
        self.is_up = true;
        self.done_full_scan = true;
    }

    /// Set the hostname unless one is already known. Empty names are ignored.
    pub fn set_name_if_unset(&mut self, name: &str) {
        if self.name.is_none() && !name.is_empty() {
            self.name = Some(name.to_string());
        }
    }

    /// Insert or fully replace the service entry for `port`.
    pub fn upsert_service(&mut self, port: u16, info: ServiceInfo) {
        self.services.insert(port, info);
    }

    /// Fold one host's scan result into this record.
    pub fn apply(&mut self, scan: &HostScan) {
        if let Some(hostname) = scan.hostname.as_deref() {
            self.set_name_if_unset(hostname);
        }
        for (port, info) in &scan.tcp {
            self.upsert_service(*port, info.clone());
        }
    }
}
