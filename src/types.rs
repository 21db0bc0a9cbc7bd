use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of one TCP connect attempt.
///
/// Serialized as `{"state": "open"}` or `{"state": "error", "detail": "..."}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Timeout,
    Error { detail: String },
}

impl PortState {
    /// Exact token shown to users: `open`, `closed`, `timeout` or `error`.
    pub fn as_str(&self) -> &'static str {
        match self {
            PortState::Open => "open",
            PortState::Closed => "closed",
            PortState::Timeout => "timeout",
            PortState::Error { .. } => "error",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, PortState::Open)
    }

    /// Diagnostic text, only carried by `Error`.
    pub fn detail(&self) -> Option<&str> {
        match self {
            PortState::Error { detail } => Some(detail),
            _ => None,
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub port: u16,
    #[serde(flatten)]
    pub state: PortState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

impl ScanOutcome {
    pub fn new(port: u16, state: PortState) -> Self {
        Self {
            port,
            state,
            banner: None,
        }
    }

    /// Attach a banner display string. Ignored unless the port is open.
    pub fn with_banner(mut self, banner: Option<Banner>) -> Self {
        if self.state.is_open() {
            self.banner = banner.map(|b| b.to_string());
        }
        self
    }
}

/// Best-effort protocol identification of an open port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    /// First line sent by the service, e.g. `SSH-2.0-OpenSSH_9.0` or `HTTP/1.1 200 OK`.
    pub text: String,
    /// Value of the HTTP `Server:` header, when present.
    pub server: Option<String>,
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.server {
            Some(server) => write!(f, "{} (Server: {})", self.text, server),
            None => f.write_str(&self.text),
        }
    }
}

/// Per-state counts over a set of outcomes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub open: u64,
    pub closed: u64,
    pub timeout: u64,
    pub error: u64,
}

impl ScanSummary {
    pub fn from_outcomes(outcomes: &[ScanOutcome]) -> Self {
        let mut s = Self::default();
        for o in outcomes {
            match o.state {
                PortState::Open => s.open += 1,
                PortState::Closed => s.closed += 1,
                PortState::Timeout => s.timeout += 1,
                PortState::Error { .. } => s.error += 1,
            }
        }
        s
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "open={} closed={} timeout={} error={}",
            self.open, self.closed, self.timeout, self.error
        )
    }
}

/// Full result of scanning one target.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanReport {
    pub target: String,
    pub address: String,
    pub started_at: String,
    pub scanned_total: u64,
    pub scanned_done: u64,
    pub summary: ScanSummary,
    /// Sorted ascending by port.
    pub outcomes: Vec<ScanOutcome>,
}
