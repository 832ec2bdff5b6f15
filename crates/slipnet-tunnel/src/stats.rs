//! Traffic statistics reported by the packet relay.

use serde::{Deserialize, Serialize};

/// Relay traffic snapshot
///
/// Pulled on demand from the relay and forwarded as-is; the orchestrator
/// never accumulates these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficStats {
    /// Bytes sent into the tunnel
    pub bytes_sent: u64,
    /// Bytes received from the tunnel
    pub bytes_received: u64,
    /// Packets sent
    pub packets_sent: u64,
    /// Packets received
    pub packets_received: u64,
}

impl TrafficStats {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent.saturating_add(self.bytes_received)
    }

    /// Format as human-readable string
    pub fn format(&self) -> String {
        format!(
            "TX: {:.2}MB ({} pkts), RX: {:.2}MB ({} pkts)",
            self.bytes_sent as f64 / (1024.0 * 1024.0),
            self.packets_sent,
            self.bytes_received as f64 / (1024.0 * 1024.0),
            self.packets_received,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let stats = TrafficStats {
            bytes_sent: 2 * 1024 * 1024,
            bytes_received: 1024 * 1024,
            packets_sent: 10,
            packets_received: 5,
        };
        assert_eq!(stats.format(), "TX: 2.00MB (10 pkts), RX: 1.00MB (5 pkts)");
        assert_eq!(stats.total_bytes(), 3 * 1024 * 1024);
    }
}
