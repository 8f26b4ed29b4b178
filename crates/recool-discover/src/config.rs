//! Configuration for the recool scanner.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level scan configuration.
///
/// Loaded from `recool.toml` or `RECOOL_` environment variables, then
/// overridden by command-line flags.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Path to the nplan binary. Model export is skipped when unset.
    #[serde(default)]
    pub nplan_path: Option<String>,

    /// This machine's address; subnets are computed around it.
    #[serde(default)]
    pub ip: Option<IpAddr>,

    /// Directory holding the snapshot, scan output and logs.
    #[serde(default = "default_storage")]
    pub storage: PathBuf,

    /// Nmap timing template passed through verbatim (e.g. "-T4").
    #[serde(default = "default_speed")]
    pub speed: String,

    /// Interval for nmap's `--stats-every` progress lines.
    #[serde(default = "default_stats_every")]
    pub stats_every: String,

    /// Prefix lengths to sweep, most specific first.
    #[serde(default = "default_subnets")]
    pub subnets: Vec<u8>,

    /// How often the progress line is refreshed, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// The two kinds of nmap pass recool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Host discovery only, no ports, no DNS: `-sn -n`
    PingSweep,
    /// All TCP ports with service detection: `-A -p- -sV`
    Full,
}

impl ScanMode {
    /// Return the nmap flags for this mode.
    pub fn nmap_flags(&self) -> Vec<&'static str> {
        match self {
            Self::PingSweep => vec!["-sn", "-n"],
            Self::Full => vec!["-A", "-p-", "-sV"],
        }
    }
}

impl ScanConfig {
    /// Structured nmap output (`-oX`).
    pub fn xml_path(&self) -> PathBuf {
        self.storage.join("scan.xml")
    }

    /// Nmap stdout; doubles as the progress side channel.
    pub fn stats_path(&self) -> PathBuf {
        self.storage.join("nmap.log")
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.storage.join("nmap.error")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.storage.join(recool_store::SNAPSHOT_FILE)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Configured prefixes, most specific (longest) first, deduplicated.
    pub fn sweep_order(&self) -> Vec<u8> {
        let mut prefixes = self.subnets.clone();
        prefixes.sort_unstable_by(|a, b| b.cmp(a));
        prefixes.dedup();
        prefixes
    }
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_storage() -> PathBuf {
    PathBuf::from("./recool")
}

fn default_speed() -> String {
    "-T4".to_string()
}

fn default_stats_every() -> String {
    "5s".to_string()
}

fn default_subnets() -> Vec<u8> {
    vec![24]
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            nplan_path: None,
            ip: None,
            storage: default_storage(),
            speed: default_speed(),
            stats_every: default_stats_every(),
            subnets: default_subnets(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}
