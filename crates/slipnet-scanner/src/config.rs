//! Scan settings.

use crate::dns::build_query;
use crate::error::ScanConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Scan configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Name every resolver is asked about
    #[serde(default = "default_test_domain")]
    pub test_domain: String,

    /// Port used for list entries without an explicit one
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-probe timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum probes in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_test_domain() -> String {
    "google.com".to_string()
}

fn default_port() -> u16 {
    53
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_concurrency() -> usize {
    50
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            test_domain: default_test_domain(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            concurrency: default_concurrency(),
        }
    }
}

impl ScanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ScanConfigError> {
        build_query(0, &self.test_domain)?;
        if self.concurrency == 0 {
            return Err(ScanConfigError::ZeroConcurrency);
        }
        if self.timeout_ms == 0 {
            return Err(ScanConfigError::ZeroTimeout);
        }
        if self.port == 0 {
            return Err(ScanConfigError::ZeroPort);
        }
        Ok(())
    }

    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ScanConfigError> {
        toml::from_str(content).map_err(|e| ScanConfigError::Parse(e.to_string()))
    }

    /// Load from TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ScanConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ScanConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }
}
