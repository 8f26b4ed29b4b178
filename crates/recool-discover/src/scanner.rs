//! Nmap process wrapper.
//!
//! Executes nmap as a child process via `tokio::process::Command`, writing
//! XML to a file in the storage directory, and supervises it until it exits
//! or the user interrupts it. Only one nmap process runs at a time.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::net::IpAddr;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use indicatif::ProgressBar;
use recool_core::HostScan;
use tokio::process::{Child, Command};
use uuid::Uuid;

use crate::config::{ScanConfig, ScanMode};
use crate::error::{DiscoverError, Result};
use crate::interrupt::{Decision, InterruptController};
use crate::nmap_xml;
use crate::progress::ProgressPoller;

/// Per-host results of one scan, keyed by address.
pub type ScanResults = BTreeMap<IpAddr, HostScan>;

/// How a scan call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Nmap finished and its XML was parsed.
    Completed(ScanResults),
    /// The result file was missing or unreadable.
    NoResult,
    /// The user skipped this scan.
    Skipped,
    /// The user asked to leave the program.
    ExitRequested,
}

/// The external scanner, as seen by the orchestrator.
#[allow(async_fn_in_trait)]
pub trait Scanner {
    /// Scan `hosts` in `mode`. Interrupts are observed through `interrupts`.
    async fn scan(
        &mut self,
        hosts: &[IpAddr],
        mode: ScanMode,
        interrupts: &mut InterruptController,
    ) -> Result<ScanOutcome>;
}

/// How the supervised child finished.
#[derive(Debug)]
enum Supervised {
    Exited(ExitStatus),
    Aborted,
    ExitRequested,
}

/// Wrapper around the nmap binary.
pub struct NmapScanner {
    config: ScanConfig,
    spinner: ProgressBar,
}

impl NmapScanner {
    pub fn new(config: &ScanConfig, spinner: ProgressBar) -> Self {
        Self {
            config: config.clone(),
            spinner,
        }
    }

    /// Verify nmap is installed and accessible.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.config.nmap_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| DiscoverError::NmapNotFound {
                path: self.config.nmap_path.clone(),
            })?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// The full nmap argument list for a scan.
    pub fn arguments(&self, hosts: &[IpAddr], mode: ScanMode) -> Vec<String> {
        let mut args = vec![
            "-oX".to_string(),
            self.config.xml_path().display().to_string(),
            "--stats-every".to_string(),
            self.config.stats_every.clone(),
        ];
        args.extend(mode.nmap_flags().into_iter().map(String::from));
        args.push(self.config.speed.clone());
        args.extend(hosts.iter().map(IpAddr::to_string));
        args
    }

    fn spawn(&self, hosts: &[IpAddr], mode: ScanMode) -> Result<Child> {
        let stdout = File::create(self.config.stats_path())?;
        let stderr = File::create(self.config.error_log_path())?;

        let mut command = Command::new(&self.config.nmap_path);
        command
            .args(self.arguments(hosts, mode))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        // Keep the terminal's Ctrl-C away from nmap; recool decides its fate.
        #[cfg(unix)]
        command.process_group(0);

        command.spawn().map_err(|e| DiscoverError::NmapNotFound {
            path: format!("{}: {e}", self.config.nmap_path),
        })
    }

    /// Read and parse the XML the last scan produced.
    async fn read_results(&self) -> Option<ScanResults> {
        let path = self.config.xml_path();
        let xml = match tokio::fs::read(&path).await {
            Ok(xml) => xml,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "No nmap result file");
                return None;
            }
        };

        match nmap_xml::parse_nmap_xml(&xml) {
            Ok(run) => {
                tracing::debug!(elapsed = run.elapsed().unwrap_or("?"), "Nmap XML parsed");
                Some(run.host_results())
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable nmap result file");
                None
            }
        }
    }
}

impl Scanner for NmapScanner {
    async fn scan(
        &mut self,
        hosts: &[IpAddr],
        mode: ScanMode,
        interrupts: &mut InterruptController,
    ) -> Result<ScanOutcome> {
        let scan_id = Uuid::new_v4();
        let start = Instant::now();

        tracing::info!(
            scan_id = %scan_id,
            hosts = hosts.len(),
            mode = ?mode,
            "Starting nmap scan"
        );

        // A result file left over from an earlier scan must never be read
        // back as this scan's output.
        match std::fs::remove_file(self.config.xml_path()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let mut child = self.spawn(hosts, mode)?;
        let progress = ProgressPoller::spawn(
            self.spinner.clone(),
            self.config.stats_path(),
            self.config.poll_interval(),
        );

        interrupts.begin_scan();
        let supervised = supervise(&mut child, interrupts).await;
        interrupts.end_scan();

        // Whatever happened, no nmap outlives this call.
        let _ = child.start_kill();
        let _ = child.wait().await;
        drop(child);
        progress.stop();

        let outcome = match supervised? {
            Supervised::Aborted => ScanOutcome::Skipped,
            Supervised::ExitRequested => ScanOutcome::ExitRequested,
            Supervised::Exited(status) => {
                if !status.success() {
                    tracing::warn!(
                        scan_id = %scan_id,
                        code = ?status.code(),
                        log = %self.config.error_log_path().display(),
                        "Nmap exited with an error"
                    );
                }
                match self.read_results().await {
                    Some(results) => ScanOutcome::Completed(results),
                    None => ScanOutcome::NoResult,
                }
            }
        };

        let hosts_up = match &outcome {
            ScanOutcome::Completed(results) => results.len(),
            _ => 0,
        };
        tracing::info!(
            scan_id = %scan_id,
            hosts_up,
            outcome = outcome.label(),
            duration_ms = start.elapsed().as_millis(),
            "Nmap scan finished"
        );

        Ok(outcome)
    }
}

impl ScanOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::NoResult => "no-result",
            Self::Skipped => "skipped",
            Self::ExitRequested => "exit-requested",
        }
    }
}

/// Wait for `child` to exit, handling interrupts as they arrive.
async fn supervise(child: &mut Child, interrupts: &mut InterruptController) -> Result<Supervised> {
    loop {
        tokio::select! {
            status = child.wait() => return Ok(Supervised::Exited(status?)),
            Some(()) = interrupts.interrupted() => match interrupts.decide() {
                Decision::Resume => continue,
                Decision::Abort => return Ok(Supervised::Aborted),
                Decision::Exit => return Ok(Supervised::ExitRequested),
            },
        }
    }
}
