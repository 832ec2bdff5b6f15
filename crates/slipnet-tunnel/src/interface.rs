//! Virtual Interface
//!
//! The host allocates the tun-like interface; the orchestrator owns the
//! resulting descriptor for the session's lifetime and closes it exactly
//! once on every exit path.

use crate::config::InterfaceConfig;
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Raw interface descriptor as understood by the host
pub type RawDescriptor = i32;

/// Parameters passed to the host when establishing the interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRequest {
    pub mtu: u16,
    /// Interface address, CIDR notation
    pub local_address: String,
    /// Route through the interface, CIDR notation
    pub route: String,
    pub dns_server: Ipv4Addr,
}

impl From<&InterfaceConfig> for InterfaceRequest {
    fn from(config: &InterfaceConfig) -> Self {
        Self {
            mtu: config.mtu,
            local_address: config.local_cidr(),
            route: config.route_cidr(),
            dns_server: config.dns_server,
        }
    }
}

/// An established interface as handed out by the host
pub trait TunDevice: Send + Sync {
    /// Readable/writable descriptor of the interface
    fn fd(&self) -> RawDescriptor;

    /// Release the interface
    fn close(&self) -> std::io::Result<()>;
}

/// Host capability that allocates the virtual interface
#[async_trait]
pub trait VirtualInterfaceProvider: Send + Sync {
    /// Returns `None` on any host-level failure (permission revoked,
    /// interface already established elsewhere).
    async fn establish(&self, request: &InterfaceRequest) -> Option<Box<dyn TunDevice>>;
}

/// Session-owned interface
///
/// Close is idempotent; the first call releases the device and later calls
/// are silent no-ops. Dropping an unclosed interface closes it.
pub struct SessionInterface {
    device: Box<dyn TunDevice>,
    closed: AtomicBool,
}

impl SessionInterface {
    pub fn new(device: Box<dyn TunDevice>) -> Self {
        info!("Virtual interface established (fd={})", device.fd());
        Self {
            device,
            closed: AtomicBool::new(false),
        }
    }

    pub fn fd(&self) -> RawDescriptor {
        self.device.fd()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the interface once; errors are logged, never returned
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Virtual interface already closed");
            return;
        }

        match self.device.close() {
            Ok(()) => info!("Virtual interface closed (fd={})", self.device.fd()),
            Err(e) => warn!("Error closing virtual interface: {}", e),
        }
    }
}

impl Drop for SessionInterface {
    fn drop(&mut self) {
        if !self.is_closed() {
            warn!("Virtual interface dropped while open, closing");
            self.close();
        }
    }
}

impl std::fmt::Debug for SessionInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInterface")
            .field("fd", &self.fd())
            .field("closed", &self.is_closed())
            .finish()
    }
}
