//! Two-phase scan workflow.
//!
//! Phase one sweeps a subnet for live hosts; phase two runs a full service
//! scan against each live host, one at a time. Every device carries flags
//! recording which phases it has been through, and the registry is saved
//! after every completed scan, so a run that dies halfway resumes at the
//! next unscanned host instead of starting over.

use std::net::IpAddr;
use std::path::PathBuf;

use console::style;
use indicatif::ProgressBar;
use ipnet::IpNet;
use recool_core::Device;
use recool_store::DeviceRegistry;

use crate::config::{ScanConfig, ScanMode};
use crate::error::{DiscoverError, Result};
use crate::export::ModelExporter;
use crate::interrupt::InterruptController;
use crate::scanner::{ScanOutcome, ScanResults, Scanner};

/// Shortest prefix accepted for a sweep (65534 hosts).
const MIN_PREFIX: u8 = 16;

/// Drives scans and feeds their results into the registry.
pub struct Orchestrator<S> {
    scanner: S,
    registry: DeviceRegistry,
    interrupts: InterruptController,
    exporter: Option<ModelExporter>,
    spinner: ProgressBar,
    own_ip: IpAddr,
    snapshot_path: PathBuf,
    xml_path: PathBuf,
}

impl<S: Scanner> Orchestrator<S> {
    pub fn new(
        config: &ScanConfig,
        own_ip: IpAddr,
        scanner: S,
        interrupts: InterruptController,
        spinner: ProgressBar,
    ) -> Self {
        let exporter = config
            .nplan_path
            .as_deref()
            .map(|nplan| ModelExporter::new(nplan, &config.storage));

        Self {
            scanner,
            registry: DeviceRegistry::new(),
            interrupts,
            exporter,
            spinner,
            own_ip,
            snapshot_path: config.snapshot_path(),
            xml_path: config.xml_path(),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    /// Resume from the saved snapshot, if there is one.
    pub fn load_snapshot(&mut self) -> Result<bool> {
        Ok(self.registry.load_snapshot(&self.snapshot_path)?)
    }

    /// The subnet of length `prefix` around this machine's address.
    ///
    /// Only IPv4 ranges of at most 2^16 addresses are swept.
    pub fn subnet(&self, prefix: u8) -> Result<IpNet> {
        let invalid = |reason: String| DiscoverError::InvalidSubnet {
            ip: self.own_ip,
            prefix,
            reason,
        };
        if !self.own_ip.is_ipv4() {
            return Err(invalid("only IPv4 subnets can be swept".to_string()));
        }
        if prefix < MIN_PREFIX {
            return Err(invalid(format!("prefix must be at least /{MIN_PREFIX}")));
        }

        IpNet::new(self.own_ip, prefix)
            .map(|net| net.trunc())
            .map_err(|e| invalid(e.to_string()))
    }

    /// Find live hosts in the subnet of length `prefix`.
    ///
    /// Only hosts not yet swept and not already known up are scanned. After
    /// a completed sweep every host of the subnet is marked swept, whether
    /// or not it answered and whether or not it was part of the batch, so
    /// the same range is never swept twice.
    pub async fn ping_sweep(&mut self, prefix: u8) -> Result<()> {
        let network = self.subnet(prefix)?;
        let subnet_hosts: Vec<IpAddr> = network.hosts().collect();
        let pending: Vec<IpAddr> = subnet_hosts
            .iter()
            .copied()
            .filter(|ip| {
                self.registry
                    .get(*ip)
                    .map_or(true, |d| !d.done_ping_scan() && !d.is_up())
            })
            .collect();

        if pending.is_empty() {
            tracing::info!(subnet = %network, "Subnet already swept");
            return Ok(());
        }

        self.spinner.set_message(format!(
            "Performing ping-scan on subnet {}",
            style(network).cyan().bold()
        ));
        tracing::info!(subnet = %network, hosts = pending.len(), "Ping sweep");

        let Some(results) = self.run_scan(&pending, ScanMode::PingSweep).await? else {
            return Ok(());
        };

        for (ip, scan) in &results {
            self.registry.merge_scan_result(*ip, scan).mark_up();
        }
        for ip in &subnet_hosts {
            self.registry.entry(*ip).mark_ping_scanned();
        }

        tracing::info!(subnet = %network, hosts_up = results.len(), "Ping sweep complete");
        self.update_model().await
    }

    /// Run a full service scan against every live, not yet fully scanned
    /// device in `subset` (the whole registry when `None`).
    ///
    /// Hosts are scanned one at a time and the snapshot is saved after each.
    pub async fn full_scan_up(&mut self, subset: Option<&[IpAddr]>) -> Result<()> {
        let needs_scan = |d: &&Device| d.is_up() && !d.done_full_scan();
        let candidates: Vec<IpAddr> = match subset {
            Some(ips) => ips
                .iter()
                .filter_map(|ip| self.registry.get(*ip))
                .filter(needs_scan)
                .map(Device::ip)
                .collect(),
            None => self
                .registry
                .iter()
                .filter(needs_scan)
                .map(Device::ip)
                .collect(),
        };

        for ip in candidates {
            if self.interrupts.is_suppressed() {
                break;
            }

            self.spinner.set_message(format!(
                "Performing full-scan for: {}",
                style(ip).cyan().bold()
            ));

            let Some(results) = self.run_scan(&[ip], ScanMode::Full).await? else {
                continue;
            };

            for (host, scan) in &results {
                let device = self.registry.merge_scan_result(*host, scan);
                device.mark_full_scanned();
                tracing::info!(
                    ip = %host,
                    open_ports = device.services().values().filter(|s| s.is_open()).count(),
                    "Full scan complete"
                );
                self.spinner.println(device.to_string().trim_end());
            }

            self.update_model().await?;
        }

        Ok(())
    }

    /// Run one scan, unless scanning has been switched off for the session.
    ///
    /// `None` means the scan produced nothing to merge.
    async fn run_scan(
        &mut self,
        hosts: &[IpAddr],
        mode: ScanMode,
    ) -> Result<Option<ScanResults>> {
        if self.interrupts.is_suppressed() {
            tracing::info!(mode = ?mode, "Scanning disabled for this session, skipping");
            return Ok(None);
        }

        match self.scanner.scan(hosts, mode, &mut self.interrupts).await? {
            ScanOutcome::Completed(results) => Ok(Some(results)),
            ScanOutcome::NoResult | ScanOutcome::Skipped => Ok(None),
            ScanOutcome::ExitRequested => Err(DiscoverError::ExitRequested),
        }
    }

    /// Refresh the exported model, then save the snapshot.
    async fn update_model(&self) -> Result<()> {
        if let Some(exporter) = &self.exporter {
            self.spinner.set_message("Updating the nplan model...");
            if !exporter.export(&self.xml_path).await {
                tracing::info!("Network model not updated, saving scan state anyway");
            }
        }

        self.spinner.set_message("Saving the current state... (DO NOT EXIT)");
        self.registry.save_snapshot(&self.snapshot_path)?;
        Ok(())
    }
}
