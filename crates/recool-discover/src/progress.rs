//! Live scan progress on the spinner.
//!
//! Nmap prints a status line every `--stats-every` interval to its stdout,
//! which recool redirects to a log file. A background task tails that file
//! and mirrors the newest line onto the spinner. It is display-only: a
//! missing or unreadable file just means no update this tick.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::ProgressBar;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Handle to a running progress task. Dropping it stops the task.
pub struct ProgressPoller {
    spinner: ProgressBar,
    prefix: String,
    handle: JoinHandle<()>,
    _guard: DropGuard,
}

impl ProgressPoller {
    /// Start polling `stats_path` every `period`.
    pub fn spawn(spinner: ProgressBar, stats_path: PathBuf, period: Duration) -> Self {
        let token = CancellationToken::new();
        let prefix = spinner.message();

        let handle = tokio::spawn(poll_loop(
            spinner.clone(),
            prefix.clone(),
            stats_path,
            period,
            token.clone(),
        ));

        Self {
            spinner,
            prefix,
            handle,
            _guard: token.drop_guard(),
        }
    }

    /// Stop polling and restore the spinner message. Does not wait for an
    /// in-flight read.
    pub fn stop(self) {
        self.handle.abort();
        self.spinner.set_message(self.prefix.clone());
    }
}

async fn poll_loop(
    spinner: ProgressBar,
    prefix: String,
    stats_path: PathBuf,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(line) = last_line(&stats_path).await {
                    spinner.set_message(format!("{prefix} - {line}"));
                }
            }
        }
    }
}

/// The last non-blank line of the file at `path`, if it can be read.
pub async fn last_line(path: &Path) -> Option<String> {
    let contents = tokio::fs::read(path).await.ok()?;
    String::from_utf8_lossy(&contents)
        .lines()
        .rev()
        .map(str::trim_end)
        .find(|l| !l.trim().is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_last_line_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(last_line(&dir.path().join("nmap.log")).await, None);
    }

    #[tokio::test]
    async fn test_last_line_skips_trailing_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nmap.log");
        std::fs::write(
            &path,
            "Starting Nmap 7.94\nStats: 0:00:05 elapsed; 0 hosts completed (1 up)\nSYN Stealth Scan Timing: About 12.50% done\n\n",
        )
        .unwrap();

        assert_eq!(
            last_line(&path).await.as_deref(),
            Some("SYN Stealth Scan Timing: About 12.50% done")
        );
    }

    #[tokio::test]
    async fn test_poller_updates_and_restores_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nmap.log");
        std::fs::write(&path, "About 50.00% done\n").unwrap();

        let spinner = ProgressBar::hidden();
        spinner.set_message("Scanning");

        let poller = ProgressPoller::spawn(spinner.clone(), path, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(spinner.message(), "Scanning - About 50.00% done");

        poller.stop();
        assert_eq!(spinner.message(), "Scanning");
    }

    #[tokio::test]
    async fn test_poller_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let spinner = ProgressBar::hidden();
        spinner.set_message("Scanning");

        let poller = ProgressPoller::spawn(
            spinner.clone(),
            dir.path().join("nmap.log"),
            Duration::from_millis(10),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(spinner.message(), "Scanning");
        poller.stop();
    }
}
