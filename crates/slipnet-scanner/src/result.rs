//! Per-resolver scan outcome.

use crate::hosts::ResolverTarget;
use serde::{Deserialize, Serialize};

/// Resolver status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStatus {
    /// Not probed yet
    Pending,
    /// Probe in flight
    Scanning,
    /// Answered with a plausible address
    Working,
    /// Answered with a known hijack address
    Censored,
    /// No reply before the deadline
    Timeout,
    /// Transport failure or unusable reply
    Error,
}

impl ScanStatus {
    /// Whether the probe has finished
    pub fn is_final(&self) -> bool {
        !matches!(self, ScanStatus::Pending | ScanStatus::Scanning)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "PENDING",
            ScanStatus::Scanning => "SCANNING",
            ScanStatus::Working => "WORKING",
            ScanStatus::Censored => "CENSORED",
            ScanStatus::Timeout => "TIMEOUT",
            ScanStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result for one resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverScanResult {
    pub host: String,
    pub port: u16,
    pub status: ScanStatus,
    /// Wall-clock time of the probe, whatever the outcome
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl ResolverScanResult {
    /// Not yet probed
    pub fn pending(target: &ResolverTarget) -> Self {
        Self {
            host: target.host.clone(),
            port: target.port,
            status: ScanStatus::Pending,
            response_time_ms: 0,
            error: None,
        }
    }

    pub fn target(&self) -> ResolverTarget {
        ResolverTarget::new(self.host.clone(), self.port)
    }

    /// One-line summary
    pub fn format(&self) -> String {
        let mut line = format!(
            "{:<21} {:<8} {:>5} ms",
            self.target().to_string(),
            self.status.label(),
            self.response_time_ms
        );
        if let Some(error) = &self.error {
            line.push_str(&format!("  {}", error));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let mut result = ResolverScanResult::pending(&ResolverTarget::new("9.9.9.9", 53));
        assert!(!result.status.is_final());

        result.status = ScanStatus::Censored;
        result.response_time_ms = 42;
        result.error = Some("Hijacked to 10.10.34.35".into());
        let line = result.format();
        assert!(line.starts_with("9.9.9.9:53"));
        assert!(line.contains("CENSORED"));
        assert!(line.contains("42 ms"));
        assert!(line.ends_with("Hijacked to 10.10.34.35"));
    }
}
