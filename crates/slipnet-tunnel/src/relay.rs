//! Packet Relay
//!
//! Bridges the virtual interface's packets to the tunnel engine's local
//! proxy endpoint. Opaque to the orchestrator beyond start/stop/stats.

use crate::interface::RawDescriptor;
use crate::stats::TrafficStats;
use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Arguments for starting the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Interface descriptor the relay reads from and writes to
    pub descriptor: RawDescriptor,
    /// Engine proxy host
    pub proxy_host: String,
    /// Engine proxy port
    pub proxy_port: u16,
    /// DNS server inside the tunnel
    pub dns_server: Ipv4Addr,
    pub mtu: u16,
    /// Interface address, CIDR notation
    pub local_address: String,
}

/// Packet relay contract used by the orchestrator
#[async_trait]
pub trait PacketRelay: Send + Sync {
    async fn start(&self, config: RelayConfig) -> anyhow::Result<()>;

    /// Stop the relay. Must be idempotent.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Current counters, `None` when the relay is not running
    fn stats(&self) -> Option<TrafficStats>;
}
