use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use portscan_rs::config::{ScanOptions, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECS};
use portscan_rs::types::{PortState, ScanReport};
use portscan_rs::{ports, scanner, server};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

/// portscan-rs: TCP connect port scanner with best-effort SSH/HTTP banner identification.
#[derive(Debug, Parser)]
#[command(name = "portscan-rs", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan a target.
    Scan(ScanArgs),
    /// Serve the JSON scan API.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

#[derive(Debug, clap::Args)]
#[command(group(ArgGroup::new("port_source").required(true).args(["ports", "ports_file"])))]
struct ScanArgs {
    /// IP or hostname.
    target: String,

    /// Ports, e.g. 22,80,443,8000-8100.
    #[arg(short, long)]
    ports: Option<String>,

    /// File with port specs (one or more per line, `#` starts a comment).
    #[arg(long = "ports-file")]
    ports_file: Option<PathBuf>,

    /// Connect timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: f64,

    /// Max concurrent probes (1 scans one port at a time).
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Print closed ports too.
    #[arg(long = "show-closed")]
    show_closed: bool,

    /// Print timed-out ports too.
    #[arg(long = "show-timeout")]
    show_timeout: bool,

    /// Print ports that failed with an error too.
    #[arg(long = "show-error")]
    show_error: bool,

    /// Best-effort banner grabbing on open ports.
    #[arg(long)]
    banner: bool,

    /// Write the report as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match Cli::parse().command {
        Command::Scan(args) => run_scan(args).await,
        Command::Serve { bind } => {
            println!("Serving scan API on http://{bind} (Ctrl+C to stop)");
            tokio::select! {
                res = server::spawn_server(&bind) => res?,
                _ = tokio::signal::ctrl_c() => {}
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_scan(args: ScanArgs) -> Result<ExitCode> {
    let port_list = match load_ports(&args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[!] {e:#}");
            return Ok(ExitCode::from(2));
        }
    };
    let opts = ScanOptions::from_secs(args.timeout, args.concurrency, args.banner)?;

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let report = scanner::scan_target(&args.target, &port_list, &opts, cancel, None).await;
    print_report(&report, &args);

    if let Some(path) = args.output.as_deref() {
        write_report_json(path, &report)?;
        println!("Wrote JSON report to {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn load_ports(args: &ScanArgs) -> Result<ports::PortSet> {
    match (&args.ports, &args.ports_file) {
        (Some(spec), _) => Ok(ports::parse_port_spec(spec)?),
        (None, Some(path)) => ports::load_port_spec_file(path),
        (None, None) => bail!("no ports given"),
    }
}

fn print_report(report: &ScanReport, args: &ScanArgs) {
    println!("{} ({})", report.target, report.address);
    for o in &report.outcomes {
        match &o.state {
            PortState::Open => match &o.banner {
                Some(b) => println!("  {}/tcp  open     {}", o.port, b),
                None => println!("  {}/tcp  open", o.port),
            },
            PortState::Closed if args.show_closed => println!("  {}/tcp  closed", o.port),
            PortState::Timeout if args.show_timeout => println!("  {}/tcp  timeout", o.port),
            PortState::Error { .. } if args.show_error => match o.state.detail() {
                Some(detail) if !detail.is_empty() => {
                    println!("  {}/tcp  error ({})", o.port, detail)
                }
                _ => println!("  {}/tcp  error", o.port),
            },
            _ => {}
        }
    }
    if report.scanned_done < report.scanned_total {
        println!(
            "Scan interrupted: {} of {} ports probed",
            report.scanned_done, report.scanned_total
        );
    }
    println!("Summary: {}", report.summary);
}

fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create output file: {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
