use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: f64 = 0.5;
pub const DEFAULT_CONCURRENCY: usize = 64;
pub const MAX_CONCURRENCY: usize = 5_000;

/// Knobs shared by every probe of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Bounds the connect and every banner read/write.
    pub timeout: Duration,
    /// Maximum probes in flight; 1 scans strictly one port at a time.
    pub concurrency: usize,
    pub grab_banner: bool,
}

impl ScanOptions {
    /// Build options from a user-supplied timeout in seconds.
    pub fn from_secs(timeout_secs: f64, concurrency: usize, grab_banner: bool) -> Result<Self> {
        Ok(Self {
            timeout: timeout_from_secs(timeout_secs)?,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            grab_banner,
        })
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            concurrency: DEFAULT_CONCURRENCY,
            grab_banner: false,
        }
    }
}

pub fn timeout_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        bail!("timeout must be a positive number of seconds, got {secs}");
    }
    Ok(Duration::try_from_secs_f64(secs)?)
}
