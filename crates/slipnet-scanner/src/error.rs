//! Scanner errors.

use crate::dns::DnsCodecError;

/// Coarse failure classes reported per resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailureKind {
    Timeout,
    MalformedResponse,
    Transport,
}

/// Why a single probe did not produce an address
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Timeout")]
    Timeout,

    #[error("Malformed response: {0}")]
    Malformed(#[from] DnsCodecError),

    #[error("DNS error code: {0}")]
    Rcode(u8),

    #[error("No answers in response")]
    NoAnswers,

    #[error("No IP in response")]
    NoAddress,

    #[error("Cannot resolve {0}")]
    Unresolvable(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    pub fn kind(&self) -> ProbeFailureKind {
        match self {
            ProbeError::Timeout => ProbeFailureKind::Timeout,
            ProbeError::Malformed(_)
            | ProbeError::Rcode(_)
            | ProbeError::NoAnswers
            | ProbeError::NoAddress => ProbeFailureKind::MalformedResponse,
            ProbeError::Unresolvable(_) | ProbeError::Io(_) => ProbeFailureKind::Transport,
        }
    }
}

/// Scan configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanConfigError {
    #[error("Invalid test domain: {0}")]
    InvalidDomain(#[from] DnsCodecError),

    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("Timeout must be at least 1 ms")]
    ZeroTimeout,

    #[error("Port must be non-zero")]
    ZeroPort,

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse scan config: {0}")]
    Parse(String),
}

/// Resolver list loading errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("No valid resolvers in {path} ({rejected} lines rejected)")]
    Empty { path: String, rejected: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        assert_eq!(ProbeError::Timeout.kind(), ProbeFailureKind::Timeout);
        assert_eq!(ProbeError::NoAddress.kind(), ProbeFailureKind::MalformedResponse);
        assert_eq!(
            ProbeError::Io(std::io::Error::other("boom")).kind(),
            ProbeFailureKind::Transport
        );
        assert_eq!(ProbeError::NoAddress.to_string(), "No IP in response");
    }
}
