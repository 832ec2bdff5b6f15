//! Connection state and its observable holder.

use crate::config::ServerProfile;
use tokio::sync::watch;
use tracing::debug;

/// Connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session
    Disconnected,
    /// Startup sequence in progress
    Connecting,
    /// Session fully established
    Connected { profile: ServerProfile },
    /// Teardown in progress
    Disconnecting,
    /// Startup failed or the session was terminated externally
    Error { message: String },
}

impl ConnectionState {
    /// Check if the tunnel is usable
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    /// Connecting or connected; a new connect is rejected here
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ConnectionState::Error { .. })
    }

    /// Short lowercase name for logs and errors
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected { .. } => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Error { .. } => "error",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connected { profile } => {
                write!(f, "connected ({})", profile.display_name())
            }
            ConnectionState::Error { message } => write!(f, "error: {}", message),
            other => f.write_str(other.label()),
        }
    }
}

/// Single source of truth for the connection state
///
/// Every change goes through [`StateCell::transition`], which decides and
/// applies the new value under the channel's lock, so observers never see
/// a torn update and racing writers are serialized.
pub(crate) struct StateCell {
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Apply `next` if it yields a state for the current one
    ///
    /// Returns the previous state on success, or the unchanged current
    /// state when `next` declined.
    pub(crate) fn transition<F>(&self, next: F) -> Result<ConnectionState, ConnectionState>
    where
        F: FnOnce(&ConnectionState) -> Option<ConnectionState>,
    {
        let mut outcome = None;
        self.tx.send_if_modified(|state| match next(&*state) {
            Some(new_state) => {
                debug!("State: {} -> {}", state.label(), new_state.label());
                outcome = Some(Ok(std::mem::replace(state, new_state)));
                true
            }
            None => {
                outcome = Some(Err(state.clone()));
                false
            }
        });
        outcome.unwrap_or_else(|| Err(self.get()))
    }

    /// Unconditionally replace the state
    pub(crate) fn set(&self, state: ConnectionState) {
        debug!("State: -> {}", state.label());
        self.tx.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(ConnectionState::Error { message: "x".into() }.is_error());
        assert_eq!(ConnectionState::Disconnecting.to_string(), "disconnecting");
    }

    #[test]
    fn test_transition_guard() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();

        let prev = cell.transition(|s| {
            matches!(s, ConnectionState::Disconnected).then_some(ConnectionState::Connecting)
        });
        assert_eq!(prev, Ok(ConnectionState::Disconnected));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connecting);

        let refused = cell.transition(|s| {
            matches!(s, ConnectionState::Disconnected).then_some(ConnectionState::Connecting)
        });
        assert_eq!(refused, Err(ConnectionState::Connecting));
        assert!(!rx.has_changed().unwrap());
    }
}
