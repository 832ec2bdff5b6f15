//! Socket Protection
//!
//! Sockets the tunnel engine opens towards its resolvers must bypass the
//! virtual interface, otherwise they loop back into the tunnel. The host
//! provides that capability; the session only borrows it.

use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, error, warn};

/// Raw socket descriptor as understood by the host
pub type RawSocket = i32;

/// Host capability that exempts a socket from the tunnel
pub trait SocketProtector: Send + Sync {
    /// Returns true if the socket now bypasses the tunnel
    fn protect(&self, fd: RawSocket) -> bool;
}

impl<F> SocketProtector for F
where
    F: Fn(RawSocket) -> bool + Send + Sync,
{
    fn protect(&self, fd: RawSocket) -> bool {
        self(fd)
    }
}

/// Non-owning handle to the session's socket protector
///
/// Attached when a session starts and detached when it ends. Clones share
/// the same slot, so the engine can keep a copy without extending the
/// protector's lifetime.
#[derive(Clone, Default)]
pub struct ProtectHandle {
    slot: Arc<RwLock<Option<Weak<dyn SocketProtector>>>>,
}

impl ProtectHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the handle at a protector without taking ownership
    pub fn attach(&self, protector: &Arc<dyn SocketProtector>) {
        match self.slot.write() {
            Ok(mut slot) => {
                *slot = Some(Arc::downgrade(protector));
                debug!("Socket protector attached");
            }
            Err(_) => error!("Socket protector slot poisoned, attach skipped"),
        }
    }

    /// Clear the handle; later protect calls fail
    pub fn detach(&self) {
        match self.slot.write() {
            Ok(mut slot) => {
                if slot.take().is_some() {
                    debug!("Socket protector detached");
                }
            }
            Err(_) => error!("Socket protector slot poisoned, detach skipped"),
        }
    }

    /// Whether a live protector is reachable
    pub fn is_attached(&self) -> bool {
        self.upgrade().is_some()
    }

    /// Protect a socket through the attached protector
    pub fn protect(&self, fd: RawSocket) -> bool {
        let Some(protector) = self.upgrade() else {
            error!("Cannot protect socket fd={}: no protector attached", fd);
            return false;
        };

        let protected = protector.protect(fd);
        if protected {
            debug!("Protected socket fd={}", fd);
        } else {
            warn!("Failed to protect socket fd={} (host returned false)", fd);
        }
        protected
    }

    fn upgrade(&self) -> Option<Arc<dyn SocketProtector>> {
        self.slot.read().ok()?.as_ref()?.upgrade()
    }
}

impl std::fmt::Debug for ProtectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn test_unattached_handle_refuses() {
        let handle = ProtectHandle::new();
        assert!(!handle.is_attached());
        assert!(!handle.protect(7));
    }

    #[test]
    fn test_attach_and_detach() {
        let seen = Arc::new(AtomicI32::new(-1));
        let seen_by_host = seen.clone();
        let protector: Arc<dyn SocketProtector> = Arc::new(move |fd: RawSocket| {
            seen_by_host.store(fd, Ordering::SeqCst);
            true
        });

        let handle = ProtectHandle::new();
        let engine_copy = handle.clone();
        handle.attach(&protector);

        assert!(engine_copy.protect(42));
        assert_eq!(seen.load(Ordering::SeqCst), 42);

        handle.detach();
        assert!(!engine_copy.protect(43));
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_handle_does_not_own_protector() {
        let handle = ProtectHandle::new();
        {
            let protector: Arc<dyn SocketProtector> = Arc::new(|_fd: RawSocket| true);
            handle.attach(&protector);
            assert!(handle.is_attached());
        }
        assert!(!handle.is_attached());
        assert!(!handle.protect(1));
    }
}
