//! Single-resolver probe.

use crate::dns::{self, DnsHeader, MAX_MESSAGE_LEN};
use crate::error::{ProbeError, ScanConfigError};
use crate::hosts::ResolverTarget;
use crate::result::{ResolverScanResult, ScanStatus};
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Probes one resolver and reports a final result
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, target: &ResolverTarget) -> ResolverScanResult;
}

/// Address ranges resolvers answer with when they hijack a query
pub fn is_hijacked(ip: Ipv4Addr) -> bool {
    let [first, ..] = ip.octets();
    first == 10 || first == 127 || ip.is_unspecified()
}

/// Read the first A record of a reply, or say why there is none
pub fn read_answer(reply: &[u8]) -> Result<Ipv4Addr, ProbeError> {
    let response = dns::parse_response(reply)?;
    if response.header.rcode() != 0 {
        return Err(ProbeError::Rcode(response.header.rcode()));
    }
    if response.header.ancount == 0 {
        return Err(ProbeError::NoAnswers);
    }
    response.address.ok_or(ProbeError::NoAddress)
}

/// Map a probe outcome onto a scan result
pub fn classify(
    target: &ResolverTarget,
    outcome: Result<Ipv4Addr, ProbeError>,
    elapsed: Duration,
) -> ResolverScanResult {
    let (status, error) = match outcome {
        Ok(ip) if is_hijacked(ip) => (ScanStatus::Censored, Some(format!("Hijacked to {}", ip))),
        Ok(_) => (ScanStatus::Working, None),
        Err(ProbeError::Timeout) => (ScanStatus::Timeout, None),
        Err(e) => (ScanStatus::Error, Some(e.to_string())),
    };

    ResolverScanResult {
        host: target.host.clone(),
        port: target.port,
        status,
        response_time_ms: elapsed.as_millis() as u64,
        error,
    }
}

/// Raw UDP prober
#[derive(Debug, Clone)]
pub struct UdpProber {
    domain: String,
    timeout: Duration,
    /// Local address for probe sockets, wildcard when unset
    bind_addr: Option<SocketAddr>,
}

impl UdpProber {
    /// Fails when `domain` cannot be encoded as a query name
    pub fn new(domain: impl Into<String>, timeout: Duration) -> Result<Self, ScanConfigError> {
        let domain = domain.into();
        dns::build_query(0, &domain)?;
        Ok(Self { domain, timeout, bind_addr: None })
    }

    /// Send probes from a fixed local address
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask `target` for the test domain's A record
    pub async fn query(&self, target: &ResolverTarget) -> Result<Ipv4Addr, ProbeError> {
        let (id, query) = dns::random_query(&self.domain)?;

        tokio::time::timeout(self.timeout, async {
            let addr = resolve(target).await?;
            let bind: SocketAddr = match self.bind_addr {
                Some(bind) => bind,
                None if addr.is_ipv4() => (Ipv4Addr::UNSPECIFIED, 0).into(),
                None => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
            };

            let socket = UdpSocket::bind(bind).await?;
            socket.connect(addr).await?;
            socket.send(&query).await?;
            trace!("Sent query {:#06x} to {}", id, target);

            let mut buf = [0u8; MAX_MESSAGE_LEN];
            loop {
                let n = socket.recv(&mut buf).await?;
                let reply = &buf[..n];
                match DnsHeader::parse(reply) {
                    Some(header) if header.id == id && header.is_response() => {
                        return read_answer(reply);
                    }
                    Some(header) => {
                        debug!(
                            "Ignoring reply from {} (id {:#06x}, expected {:#06x})",
                            target, header.id, id
                        );
                    }
                    None => debug!("Ignoring {}-byte datagram from {}", n, target),
                }
            }
        })
        .await
        .map_err(|_| ProbeError::Timeout)?
    }
}

#[async_trait]
impl Prober for UdpProber {
    async fn probe(&self, target: &ResolverTarget) -> ResolverScanResult {
        let started = Instant::now();
        let outcome = self.query(target).await;
        let result = classify(target, outcome, started.elapsed());
        debug!("{} -> {} ({} ms)", target, result.status, result.response_time_ms);
        result
    }
}

async fn resolve(target: &ResolverTarget) -> Result<SocketAddr, ProbeError> {
    if let Ok(ip) = target.host.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, target.port));
    }
    tokio::net::lookup_host((target.host.as_str(), target.port))
        .await?
        .next()
        .ok_or_else(|| ProbeError::Unresolvable(target.host.clone()))
}
