use crate::banner;
use crate::config::ScanOptions;
use crate::types::{PortState, ScanOutcome, ScanReport, ScanSummary};
use ::time::{format_description::well_known, OffsetDateTime};
use log::{debug, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Probe a single TCP port with one connect attempt bounded by `timeout`.
///
/// - connect succeeds: `Open` (the stream is dropped right away, nothing is read)
/// - connection refused: `Closed`
/// - no answer within `timeout`: `Timeout`
/// - anything else, including resolution failure: `Error` with the OS message
pub async fn probe(host: &str, port: u16, timeout: Duration) -> ScanOutcome {
    let state = match connect(host, port, timeout).await {
        Ok(_stream) => PortState::Open,
        Err(e) => classify_error(&e),
    };
    debug!("{host}:{port} -> {state}");
    ScanOutcome::new(port, state)
}

/// Resolve `target` to an address string for display, or return it unchanged.
///
/// IPv4 results are preferred when a name has both families.
pub async fn resolve_host(target: &str) -> String {
    match lookup_host((target, 0)).await {
        Ok(addrs) => {
            let addrs: Vec<SocketAddr> = addrs.collect();
            addrs
                .iter()
                .find(|a| a.is_ipv4())
                .or_else(|| addrs.first())
                .map(|a| a.ip().to_string())
                .unwrap_or_else(|| target.to_string())
        }
        Err(_) => target.to_string(),
    }
}

/// Map a connect failure onto the port state taxonomy.
pub fn classify_error(err: &io::Error) -> PortState {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => PortState::Closed,
        io::ErrorKind::TimedOut => PortState::Timeout,
        _ => PortState::Error {
            detail: err.to_string(),
        },
    }
}

/// Open a TCP connection to `host:port`, bounding each connect by `timeout`.
///
/// Resolution happens first and is not counted against the timeout. Every
/// resolved address is tried once, in order; the last failure is returned.
/// An elapsed timeout surfaces as `io::ErrorKind::TimedOut`.
pub(crate) async fn connect(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in lookup_host((host, port)).await? {
        match time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => last_err = Some(e),
            Err(_) => {
                last_err = Some(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection timed out",
                ))
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses found for {host}"),
        )
    }))
}

/// Progress counters shared with an observer while a scan runs.
#[derive(Clone, Debug)]
pub struct SharedProgress {
    pub scanned_done: Arc<AtomicU64>,
    pub open_count: Arc<AtomicU64>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self {
            scanned_done: Arc::new(AtomicU64::new(0)),
            open_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn scanned(&self) -> u64 {
        self.scanned_done.load(Ordering::Relaxed)
    }

    pub fn open(&self) -> u64 {
        self.open_count.load(Ordering::Relaxed)
    }
}

impl Default for SharedProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe every port in `ports` with at most `opts.concurrency` probes in flight.
///
/// Open ports are passed to the banner classifier when `opts.grab_banner` is set.
/// Once `cancel` fires no new probes start; ports never probed are left out.
/// The returned outcomes are sorted by port, independent of completion order.
pub async fn scan_ports(
    host: &str,
    ports: &[u16],
    opts: &ScanOptions,
    cancel: CancellationToken,
    progress: Option<SharedProgress>,
) -> Vec<ScanOutcome> {
    let progress = progress.unwrap_or_default();
    let sem = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let host: Arc<str> = Arc::from(host);
    let mut set = JoinSet::new();

    for &port in ports {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = sem.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        let host = host.clone();
        let progress = progress.clone();
        let cancel = cancel.clone();
        let opts = *opts;

        set.spawn(async move {
            let _permit = permit; // keep permit until task completes
            if cancel.is_cancelled() {
                return None;
            }

            let mut outcome = probe(&host, port, opts.timeout).await;
            if outcome.state.is_open() {
                progress.open_count.fetch_add(1, Ordering::Relaxed);
                if opts.grab_banner {
                    let found = banner::identify(&host, port, opts.timeout).await;
                    outcome = outcome.with_banner(found);
                }
            }
            progress.scanned_done.fetch_add(1, Ordering::Relaxed);
            Some(outcome)
        });
    }

    let mut outcomes = Vec::with_capacity(ports.len());
    while let Some(res) = set.join_next().await {
        match res {
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => {}
            Err(e) => warn!("probe task failed: {e}"),
        }
    }
    outcomes.sort_by_key(|o| o.port);
    outcomes
}

/// Resolve `target`, scan `ports` and assemble a report with summary counts.
pub async fn scan_target(
    target: &str,
    ports: &[u16],
    opts: &ScanOptions,
    cancel: CancellationToken,
    progress: Option<SharedProgress>,
) -> ScanReport {
    let started_at = now_rfc3339();
    let address = resolve_host(target).await;
    info!(
        "scanning {} ports on {target} ({address}), timeout {:?}, concurrency {}",
        ports.len(),
        opts.timeout,
        opts.concurrency
    );

    let outcomes = scan_ports(target, ports, opts, cancel, progress).await;
    let summary = ScanSummary::from_outcomes(&outcomes);
    info!("scan of {target} finished: {summary}");

    ScanReport {
        target: target.to_string(),
        address,
        started_at,
        scanned_total: ports.len() as u64,
        scanned_done: outcomes.len() as u64,
        summary,
        outcomes,
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
