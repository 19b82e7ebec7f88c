use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use port_scan_rs::error::ValidationError;
use port_scan_rs::probe::TcpProber;
use port_scan_rs::scanner::{self, SharedProgress};
use port_scan_rs::types::{ScanRequest, ScanResult, DEFAULT_CONCURRENCY};

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// port-scan-rs — scan a range of TCP ports on one host with bounded concurrency.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-scan-rs",
    version,
    about = "Scan a range of TCP ports on one host with bounded concurrency.",
    long_about = None
)]
struct Cli {
    /// Host to scan (e.g., localhost or 192.168.1.1).
    host: String,

    /// Starting port number.
    start_port: u32,

    /// Ending port number (inclusive).
    end_port: u32,

    /// Timeout for each connection attempt, in seconds.
    #[arg(long, default_value_t = 1.0)]
    timeout: f64,

    /// Max concurrent connection attempts.
    #[arg(long = "threads", visible_alias = "concurrency", default_value_t = DEFAULT_CONCURRENCY)]
    threads: usize,

    /// Write results as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Enable debug logging on stderr (RUST_LOG overrides).
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Negative, NaN and overflowing values all collapse to a zero timeout, which validation rejects.
    let timeout = Duration::try_from_secs_f64(cli.timeout).unwrap_or(Duration::ZERO);
    let request = ScanRequest::new(cli.host, cli.start_port, cli.end_port)
        .with_timeout(timeout)
        .with_concurrency(cli.threads);

    let cancel = CancellationToken::new();
    let progress = SharedProgress::new();
    let cancel_ctrlc = cancel.clone();
    let progress_ctrlc = progress.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(
                scanned = progress_ctrlc.scanned(),
                open = progress_ctrlc.open(),
                "interrupted, waiting for in-flight connects"
            );
            cancel_ctrlc.cancel();
        }
    });

    let scan = scanner::scan_with_progress(&request, Arc::new(TcpProber), cancel, progress);
    let results = match scan.await {
        Ok(results) => results,
        Err(e) => {
            report_invalid_request(&e);
            return Ok(ExitCode::from(2));
        }
    };

    print_results(&results);
    if let Some(path) = cli.output.as_deref() {
        if let Err(e) = write_results_json(path, &results) {
            eprintln!("Failed to write JSON to {}: {}", path.display(), e);
        } else {
            println!("Wrote JSON results to {}", path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report_invalid_request(error: &ValidationError) {
    eprintln!(
        "Invalid scan request: {error}. Ports must be between 1 and 65535 and \
         start port must be less than or equal to end port."
    );
}

fn print_results(results: &ScanResult) {
    if results.cancelled {
        println!(
            "Scan interrupted after {} ports; results are partial.",
            results.scanned
        );
    }
    if results.is_empty() {
        println!("No open ports found.");
        return;
    }
    let ports: Vec<String> = results.open_ports.iter().map(u16::to_string).collect();
    println!("Open ports: {}", ports.join(", "));
}

fn write_results_json(path: &std::path::Path, results: &ScanResult) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}
