//! recool-store: the device registry and its on-disk snapshot.
//!
//! The registry maps IP address to [`Device`] and is the single owner of
//! scan state during a run. It is mutated only by the scan workflow; the
//! snapshot is how that state survives between runs.

pub mod error;
pub mod snapshot;

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use recool_core::{Device, HostScan};

pub use error::{Result, StoreError};
pub use snapshot::SNAPSHOT_FILE;

/// In-memory registry of every device referenced so far.
///
/// Iteration is in ascending address order.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<IpAddr, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, ip: IpAddr) -> Option<&Device> {
        self.devices.get(&ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Look up the record for `ip`.
    ///
    /// With `create` set a missing record is created empty and returned;
    /// otherwise a missing record yields `None` and nothing is inserted.
    pub fn find_by_ip(&mut self, ip: IpAddr, create: bool) -> Option<&mut Device> {
        if create {
            Some(self.entry(ip))
        } else {
            self.devices.get_mut(&ip)
        }
    }

    /// The record for `ip`, created empty if missing.
    pub fn entry(&mut self, ip: IpAddr) -> &mut Device {
        self.devices.entry(ip).or_insert_with(|| Device::new(ip))
    }

    /// Fold one host's scan result into its record.
    ///
    /// The first non-empty hostname becomes the device name; every reported
    /// port replaces its previous service entry wholesale.
    pub fn merge_scan_result(&mut self, ip: IpAddr, scan: &HostScan) -> &mut Device {
        let device = self.entry(ip);
        if !scan.is_empty() {
            device.apply(scan);
        }
        device
    }

    /// Replace the registry with the snapshot at `path`.
    ///
    /// A missing file leaves the registry untouched and returns `false`.
    /// On any error the registry is left as it was.
    pub fn load_snapshot(&mut self, path: &Path) -> Result<bool> {
        let Some(devices) = snapshot::read_snapshot(path)? else {
            tracing::info!(path = %path.display(), "No snapshot found, starting fresh");
            return Ok(false);
        };

        self.devices = devices.into_iter().map(|d| (d.ip(), d)).collect();
        tracing::info!(
            path = %path.display(),
            devices = self.devices.len(),
            "Snapshot loaded"
        );
        Ok(true)
    }

    /// Persist the whole registry to `path` via a staged write and rename.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        snapshot::write_snapshot(path, self.devices.values())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use recool_core::ServiceInfo;

    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn http(version: &str) -> ServiceInfo {
        ServiceInfo {
            state: "open".to_string(),
            name: "http".to_string(),
            product: "nginx".to_string(),
            version: version.to_string(),
        }
    }

    fn scan_with_port(hostname: Option<&str>, port: u16, info: ServiceInfo) -> HostScan {
        HostScan {
            hostname: hostname.map(String::from),
            tcp: [(port, info)].into_iter().collect(),
        }
    }

    #[test]
    fn test_find_by_ip_without_create_does_not_insert() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.find_by_ip(ip("10.0.0.1"), false).is_none());
        assert!(registry.is_empty());

        let device = registry.find_by_ip(ip("10.0.0.1"), true).unwrap();
        assert_eq!(device.ip(), ip("10.0.0.1"));
        assert_eq!(registry.len(), 1);
        assert!(registry.find_by_ip(ip("10.0.0.1"), false).is_some());
    }

    #[test]
    fn test_merge_empty_result_only_creates_record() {
        let mut registry = DeviceRegistry::new();
        let device = registry.merge_scan_result(ip("10.0.0.1"), &HostScan::default());
        assert_eq!(device.name(), None);
        assert!(device.services().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_merge_overwrites_service_version() {
        let mut registry = DeviceRegistry::new();
        let target = ip("10.0.0.1");
        registry.merge_scan_result(target, &scan_with_port(Some("web.lan"), 80, http("1.18")));
        registry.merge_scan_result(target, &scan_with_port(Some("other.lan"), 80, http("1.24")));

        let device = registry.get(target).unwrap();
        assert_eq!(device.name(), Some("web.lan"));
        assert_eq!(device.services()[&80], http("1.24"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);

        let mut registry = DeviceRegistry::new();
        registry
            .merge_scan_result(ip("192.168.1.10"), &scan_with_port(Some("web.lan"), 80, http("1.24")))
            .mark_full_scanned();
        registry.entry(ip("192.168.1.10")).mark_ping_scanned();
        registry.entry(ip("192.168.1.11")).mark_ping_scanned();
        registry.entry(ip("192.168.1.12")).mark_up();
        registry.save_snapshot(&path).unwrap();

        let mut loaded = DeviceRegistry::new();
        assert!(loaded.load_snapshot(&path).unwrap());

        let before: Vec<_> = registry.iter().cloned().collect();
        let after: Vec<_> = loaded.iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_load_missing_snapshot_leaves_registry_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = DeviceRegistry::new();
        registry.entry(ip("10.0.0.1")).mark_up();

        let loaded = registry
            .load_snapshot(&dir.path().join(SNAPSHOT_FILE))
            .unwrap();

        assert!(!loaded);
        assert!(registry.get(ip("10.0.0.1")).unwrap().is_up());
    }

    #[test]
    fn test_load_replaces_registry_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        let mut saved = DeviceRegistry::new();
        saved.entry(ip("10.0.0.2")).mark_ping_scanned();
        saved.save_snapshot(&path).unwrap();

        let mut registry = DeviceRegistry::new();
        registry.entry(ip("10.0.0.1")).mark_up();
        registry.load_snapshot(&path).unwrap();

        assert!(registry.get(ip("10.0.0.1")).is_none());
        assert!(registry.get(ip("10.0.0.2")).unwrap().done_ping_scan());
    }

    #[test]
    fn test_failed_load_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        fs::write(&path, "[]").unwrap();

        let mut registry = DeviceRegistry::new();
        registry.entry(ip("10.0.0.1")).mark_up();

        assert!(registry.load_snapshot(&path).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_interrupted_save_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);

        let mut registry = DeviceRegistry::new();
        registry.entry(ip("10.0.0.1")).mark_up();
        registry.save_snapshot(&path).unwrap();

        // A crash after staging but before the rename leaves a stray file.
        fs::write(snapshot::staging_path(&path), r#"{"10.0.0.1": {"is_up": tru"#).unwrap();

        let mut loaded = DeviceRegistry::new();
        assert!(loaded.load_snapshot(&path).unwrap());
        assert!(loaded.get(ip("10.0.0.1")).unwrap().is_up());

        // The next save overwrites the stray staging file.
        registry.entry(ip("10.0.0.2")).mark_ping_scanned();
        registry.save_snapshot(&path).unwrap();
        loaded.load_snapshot(&path).unwrap();
        assert_eq!(loaded.len(), 2);
    }
}
