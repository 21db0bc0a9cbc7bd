use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Ascending, duplicate-free list of TCP ports in 1..=65535.
pub type PortSet = Vec<u16>;

/// Rejected port specification. The whole spec is rejected, never a prefix of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PortParseError {
    pub message: String,
}

impl PortParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse a port specification such as `22,80,443,8000-8100`.
///
/// Supported items, separated by commas:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - whitespace around items and around the dash is ignored
/// - empty items (`80,,443`, trailing comma) are skipped
///
/// Returns the distinct ports sorted ascending.
pub fn parse_port_spec(spec: &str) -> Result<PortSet, PortParseError> {
    let items: Vec<&str> = spec
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() {
        return Err(PortParseError::new("Port spec is empty"));
    }

    let mut ports = BTreeSet::new();
    for item in items {
        // Range `start-end`
        if let Some((a, b)) = item.split_once('-') {
            let (a, b) = (a.trim(), b.trim());
            if !is_digits(a) || !is_digits(b) {
                return Err(PortParseError::new(format!("Invalid range: '{item}'")));
            }
            let (start, end) = (digits_value(a), digits_value(b));
            if start > end {
                return Err(PortParseError::new(format!("Range start > end: '{item}'")));
            }
            ports.extend(check_port(start, item)?..=check_port(end, item)?);
            continue;
        }

        // Single number
        if !is_digits(item) {
            return Err(PortParseError::new(format!("Invalid port: '{item}'")));
        }
        ports.insert(check_port(digits_value(item), item)?);
    }

    Ok(ports.into_iter().collect())
}

/// Load a port specification from a file.
///
/// Everything after `#` on a line is a comment. The remaining non-empty lines
/// are joined with commas, so a line may hold a single port, a range, or a list.
pub fn load_port_spec_file(path: impl AsRef<Path>) -> Result<PortSet> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read ports file: {}", path.display()))?;
    let joined = content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    parse_port_spec(&joined).with_context(|| format!("invalid ports file: {}", path.display()))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Numeric value of a digit-only token, saturating at `u32::MAX`.
fn digits_value(digits: &str) -> u32 {
    // Only overflow can fail here.
    digits.parse().unwrap_or(u32::MAX)
}

fn check_port(val: u32, item: &str) -> Result<u16, PortParseError> {
    if val == 0 || val > 65535 {
        return Err(PortParseError::new(format!(
            "Port out of range (1-65535): '{item}'"
        )));
    }
    Ok(val as u16)
}
