//! On-disk snapshot of the device registry.
//!
//! The snapshot is a single JSON object keyed by IP address string. Each
//! value is a [`SnapshotDevice`]; the IP lives only in the key. Writes go to
//! a sibling temp file which is then renamed over the previous snapshot, so
//! a reader only ever sees a complete file.
//!
//! ```text
//! {
//!   "192.168.1.1": { "name": "router.lan", "is_up": true, ... },
//!   "192.168.1.2": { "is_up": false, "done_ping_scan": true, ... }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use recool_core::{Device, ServiceInfo};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Default snapshot file name inside the storage directory.
pub const SNAPSHOT_FILE: &str = "recool_save.json";

/// Persisted form of a [`Device`], without its IP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_up: bool,
    #[serde(default)]
    pub done_ping_scan: bool,
    #[serde(default)]
    pub done_full_scan: bool,
    #[serde(default)]
    pub services: BTreeMap<u16, ServiceInfo>,
}

impl From<&Device> for SnapshotDevice {
    fn from(device: &Device) -> Self {
        Self {
            name: device.name().map(String::from),
            is_up: device.is_up(),
            done_ping_scan: device.done_ping_scan(),
            done_full_scan: device.done_full_scan(),
            services: device.services().clone(),
        }
    }
}

impl SnapshotDevice {
    /// Re-attach the map key as the device's IP.
    pub fn into_device(self, ip: IpAddr) -> Device {
        Device::restore(
            ip,
            self.name,
            self.is_up,
            self.done_ping_scan,
            self.done_full_scan,
            self.services,
        )
    }
}

/// The temp file a snapshot is staged in before it replaces `path`.
///
/// `recool_save.json` stages as `recool_save_new.json`.
pub fn staging_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_new.{}", ext.to_string_lossy()),
        None => format!("{stem}_new"),
    };
    path.with_file_name(name)
}

/// Read a snapshot. Returns `Ok(None)` when no snapshot exists yet.
pub fn read_snapshot(path: &Path) -> Result<Option<Vec<Device>>> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let entries: BTreeMap<String, SnapshotDevice> =
        serde_json::from_str(&json).map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    entries
        .into_iter()
        .map(|(key, entry)| {
            let ip: IpAddr = key.parse().map_err(|_| StoreError::InvalidKey {
                path: path.to_path_buf(),
                key: key.clone(),
            })?;
            Ok(entry.into_device(ip))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Write a snapshot of `devices` to `path`, replacing any previous one.
pub fn write_snapshot<'a>(
    path: &Path,
    devices: impl IntoIterator<Item = &'a Device>,
) -> Result<()> {
    let entries: BTreeMap<String, SnapshotDevice> = devices
        .into_iter()
        .map(|d| (d.ip().to_string(), SnapshotDevice::from(d)))
        .collect();

    let staging = staging_path(path);

    let file = File::create(&staging).map_err(io_err(&staging))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &entries)?;
    writer.flush().map_err(io_err(&staging))?;
    writer.get_ref().sync_all().map_err(io_err(&staging))?;
    drop(writer);

    fs::rename(&staging, path).map_err(io_err(path))?;

    tracing::debug!(
        path = %path.display(),
        devices = entries.len(),
        "Snapshot saved"
    );

    Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}
