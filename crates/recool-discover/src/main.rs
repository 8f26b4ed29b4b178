//! CLI entry point for recool.

use std::io::{self, IsTerminal, Write};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use if_addrs::{get_if_addrs, IfAddr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use recool_discover::config::ScanConfig;
use recool_discover::error::DiscoverError;
use recool_discover::interrupt::{
    FixedChoice, InterruptChoice, InterruptController, InterruptSignal, TerminalPrompt,
};
use recool_discover::orchestrator::Orchestrator;
use recool_discover::scanner::{NmapScanner, Scanner};

#[derive(Parser)]
#[command(name = "recool")]
#[command(about = "Resumable network discovery driven by nmap")]
struct Cli {
    /// This machine's IP address (default: first non-loopback IPv4 interface).
    #[arg(long)]
    ip: Option<IpAddr>,

    /// Directory for the snapshot, scan output and logs.
    #[arg(short, long)]
    storage: Option<PathBuf>,

    /// Nmap timing template, e.g. -T4.
    #[arg(long, allow_hyphen_values = true)]
    speed: Option<String>,

    /// Subnet prefix length to sweep; repeat for several (e.g. --subnet 24 --subnet 16).
    #[arg(long = "subnet")]
    subnets: Vec<u8>,

    /// Path to the nmap binary.
    #[arg(long)]
    nmap: Option<String>,

    /// Path to the nplan binary; enables model and diagram export.
    #[arg(long)]
    nplan: Option<String>,

    /// Only sweep for live hosts, skip full service scans.
    #[arg(long)]
    ping_only: bool,

    /// Config file prefix (default: recool).
    #[arg(short, long, default_value = "recool")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let spinner = init_spinner();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_target = spinner.clone();
    fmt()
        .with_env_filter(filter)
        .with_writer(move || SpinnerWriter(log_target.clone()))
        .init();

    let config = load_config(&cli)?;
    std::fs::create_dir_all(&config.storage)?;
    let own_ip = resolve_own_ip(&config)?;
    tracing::info!(ip = %own_ip, storage = %config.storage.display(), "Starting recool");

    let scanner = NmapScanner::new(&config, spinner.clone());
    let version = scanner.verify_installation().await?;
    tracing::info!(
        nmap_version = %version.lines().next().unwrap_or_default().trim(),
        "Nmap verified"
    );

    let signal = InterruptSignal::ctrl_c();
    let interrupts = if io::stdin().is_terminal() && io::stderr().is_terminal() {
        InterruptController::new(signal, TerminalPrompt::new(spinner.clone()))
    } else {
        InterruptController::new(signal, FixedChoice(InterruptChoice::Exit))
    };

    let mut orchestrator = Orchestrator::new(&config, own_ip, scanner, interrupts, spinner.clone());
    orchestrator.load_snapshot()?;

    match run(&mut orchestrator, &config, cli.ping_only).await {
        Err(DiscoverError::ExitRequested) => {
            spinner.finish_and_clear();
            tracing::info!("Exiting at user request, current scan state not saved");
            std::process::exit(0);
        }
        result => result?,
    }

    spinner.finish_and_clear();

    let registry = orchestrator.registry();
    tracing::info!(
        known = registry.len(),
        up = registry.iter().filter(|d| d.is_up()).count(),
        fully_scanned = registry.iter().filter(|d| d.done_full_scan()).count(),
        "Discovery finished"
    );

    Ok(())
}

/// Sweep each configured subnet, most specific first, scanning the live
/// hosts found before moving on to the next range.
async fn run<S: Scanner>(
    orchestrator: &mut Orchestrator<S>,
    config: &ScanConfig,
    ping_only: bool,
) -> recool_discover::error::Result<()> {
    for prefix in config.sweep_order() {
        orchestrator.ping_sweep(prefix).await?;
        if !ping_only {
            orchestrator.full_scan_up(None).await?;
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ScanConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(&cli.config).required(false))
        .add_source(config::Environment::with_prefix("RECOOL").try_parsing(true))
        .build()?;

    let mut scan_config: ScanConfig = cfg.try_deserialize()?;

    if let Some(ip) = cli.ip {
        scan_config.ip = Some(ip);
    }
    if let Some(storage) = &cli.storage {
        scan_config.storage = storage.clone();
    }
    if let Some(speed) = &cli.speed {
        scan_config.speed = speed.clone();
    }
    if !cli.subnets.is_empty() {
        scan_config.subnets = cli.subnets.clone();
    }
    if let Some(nmap) = &cli.nmap {
        scan_config.nmap_path = nmap.clone();
    }
    if let Some(nplan) = &cli.nplan {
        scan_config.nplan_path = Some(nplan.clone());
    }

    Ok(scan_config)
}

/// The configured address, else the first non-loopback IPv4 interface.
fn resolve_own_ip(config: &ScanConfig) -> anyhow::Result<IpAddr> {
    if let Some(ip) = config.ip {
        return Ok(ip);
    }

    get_if_addrs()?
        .into_iter()
        .find_map(|iface| match iface.addr {
            IfAddr::V4(v4) if !v4.ip.is_loopback() => Some(IpAddr::V4(v4.ip)),
            _ => None,
        })
        .ok_or_else(|| {
            DiscoverError::Config(
                "no non-loopback IPv4 interface found; pass --ip".to_string(),
            )
            .into()
        })
}

fn init_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Routes log lines above the spinner so they do not tear it.
struct SpinnerWriter(ProgressBar);

impl Write for SpinnerWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.0.is_hidden() || self.0.is_finished() {
            return io::stderr().write(buf);
        }
        let msg = String::from_utf8_lossy(buf);
        self.0.println(msg.trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}
