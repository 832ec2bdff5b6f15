//! Connection Orchestrator
//!
//! Coordinates the tunnel engine, the virtual interface and the packet
//! relay into one session with a single observable connection state.
//!
//! # Usage
//!
//! ```rust,ignore
//! let orchestrator = ConnectionOrchestrator::new(engine, interfaces, relay, store);
//! let mut states = orchestrator.subscribe();
//!
//! orchestrator.connect(profile, protector).await?;
//! assert!(orchestrator.state().is_connected());
//!
//! orchestrator.disconnect().await?;
//! ```
//!
//! # Ordering
//!
//! Startup runs engine → interface → relay; the engine's proxy must be
//! listening before the interface starts capturing traffic, and the relay
//! needs the interface descriptor. Teardown always runs relay → engine →
//! interface, and each step is best-effort.
//!
//! External signals ([`ConnectionOrchestrator::on_vpn_error`],
//! [`ConnectionOrchestrator::on_revoke`]) may arrive while a startup is in
//! flight. The startup re-checks the state before every forward step and
//! rolls back when it has been superseded; the external state stands.
//! Both signals wait for the session lock, so a sequence that completes
//! just before the signal lands is still torn down.

use crate::config::{ConfigError, InterfaceConfig, ServerProfile};
use crate::engine::{EngineConfig, TunnelEngine};
use crate::error::{OrchestratorError, StartupStage};
use crate::interface::{InterfaceRequest, SessionInterface, VirtualInterfaceProvider};
use crate::protect::{ProtectHandle, SocketProtector};
use crate::relay::{PacketRelay, RelayConfig};
use crate::state::{ConnectionState, StateCell};
use crate::stats::TrafficStats;
use crate::store::ProfileStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Resources acquired by the current session
#[derive(Default)]
struct Session {
    engine_started: bool,
    interface: Option<SessionInterface>,
    relay_started: bool,
}

impl Session {
    fn holds_resources(&self) -> bool {
        self.engine_started || self.relay_started || self.interface.is_some()
    }
}

/// Which stop calls a release issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    /// Only what this session acquired (startup rollback)
    Acquired,
    /// Every stop call, regardless of bookkeeping (disconnect)
    Full,
}

#[derive(Default)]
struct ProfileSlots {
    pending: Option<ServerProfile>,
    connected: Option<ServerProfile>,
    connected_at: Option<Instant>,
}

/// Connection Orchestrator
///
/// Owns the connection state and the session resources. One
/// connect/disconnect sequence runs at a time; overlapping requests are
/// rejected by the state guard rather than queued.
pub struct ConnectionOrchestrator {
    engine: Arc<dyn TunnelEngine>,
    interfaces: Arc<dyn VirtualInterfaceProvider>,
    relay: Arc<dyn PacketRelay>,
    store: Arc<dyn ProfileStore>,
    interface_config: InterfaceConfig,
    state: StateCell,
    /// Held for the whole of a startup or teardown sequence
    session: Mutex<Session>,
    profiles: RwLock<ProfileSlots>,
    protect: ProtectHandle,
}

impl ConnectionOrchestrator {
    pub fn new(
        engine: Arc<dyn TunnelEngine>,
        interfaces: Arc<dyn VirtualInterfaceProvider>,
        relay: Arc<dyn PacketRelay>,
        store: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            engine,
            interfaces,
            relay,
            store,
            interface_config: InterfaceConfig::default(),
            state: StateCell::new(),
            session: Mutex::new(Session::default()),
            profiles: RwLock::new(ProfileSlots::default()),
            protect: ProtectHandle::new(),
        }
    }

    /// Override the virtual interface parameters
    pub fn with_interface_config(mut self, config: InterfaceConfig) -> Self {
        self.interface_config = config;
        self
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Profile of the attempt in progress or the live session
    pub async fn pending_profile(&self) -> Option<ServerProfile> {
        self.profiles.read().await.pending.clone()
    }

    /// Profile of the live session
    pub async fn connected_profile(&self) -> Option<ServerProfile> {
        self.profiles.read().await.connected.clone()
    }

    /// Get connection duration
    pub async fn connection_duration(&self) -> Option<Duration> {
        self.profiles.read().await.connected_at.map(|t| t.elapsed())
    }

    /// Socket protection handle of the current session
    pub fn protect_handle(&self) -> &ProtectHandle {
        &self.protect
    }

    /// Latest relay counters, `None` unless connected and the relay reports
    pub fn stats(&self) -> Option<TrafficStats> {
        if !self.state.get().is_connected() {
            return None;
        }
        self.relay.stats()
    }

    /// Connect using a profile from the profile store
    pub async fn connect_by_id(
        &self,
        id: &str,
        protector: Arc<dyn SocketProtector>,
    ) -> Result<(), OrchestratorError> {
        let profile = self
            .store
            .profile_by_id(id)
            .ok_or_else(|| ConfigError::ProfileNotFound(id.to_string()))?;
        self.store.set_active_profile(id);
        self.connect(profile, protector).await
    }

    /// Bring up the tunnel pipeline
    ///
    /// Rejected while connecting or connected. On failure every resource
    /// acquired so far is released before `Error` is published.
    pub async fn connect(
        &self,
        profile: ServerProfile,
        protector: Arc<dyn SocketProtector>,
    ) -> Result<(), OrchestratorError> {
        let Ok(mut session) = self.session.try_lock() else {
            let state = self.state.get();
            warn!("Connect ignored: a sequence is still running ({})", state.label());
            return Err(OrchestratorError::Rejected { state: state.label() });
        };

        if let Err(current) = self.state.transition(|s| match s {
            ConnectionState::Disconnected | ConnectionState::Error { .. } => {
                Some(ConnectionState::Connecting)
            }
            _ => None,
        }) {
            warn!("Connect ignored while {}", current.label());
            return Err(OrchestratorError::Rejected { state: current.label() });
        }

        info!("Connecting with profile {}", profile.display_name());
        self.profiles.write().await.pending = Some(profile.clone());

        if let Err(e) = profile.validate().and_then(|_| self.interface_config.validate()) {
            error!("Invalid profile {}: {}", profile.id, e);
            let err = OrchestratorError::from(e);
            self.finish_failed(&err).await;
            return Err(err);
        }

        self.protect.attach(&protector);

        if let Err(err) = self.start_session(&mut session, &profile).await {
            self.finish_failed(&err).await;
            return Err(err);
        }

        {
            let mut profiles = self.profiles.write().await;
            profiles.connected = Some(profile.clone());
            profiles.connected_at = Some(Instant::now());
        }

        let published = self.state.transition(|s| {
            matches!(s, ConnectionState::Connecting).then(|| ConnectionState::Connected {
                profile: profile.clone(),
            })
        });

        if let Err(current) = published {
            warn!("Session superseded ({}) just before completion, rolling back", current.label());
            self.release(&mut session, Release::Acquired).await;
            let err = OrchestratorError::ForcedTermination(superseded_reason(&current));
            self.finish_failed(&err).await;
            return Err(err);
        }

        self.store.set_last_connected_profile_id(&profile.id);
        info!("Connected (proxy {}:{})", profile.listen_host, profile.listen_port);
        Ok(())
    }

    /// Run the three startup steps, rolling back on any failure
    async fn start_session(
        &self,
        session: &mut Session,
        profile: &ServerProfile,
    ) -> Result<(), OrchestratorError> {
        // Engine first: its proxy must listen before traffic is captured
        let engine_config = EngineConfig::from_profile(profile, self.protect.clone());
        session.engine_started = true;
        if let Err(e) = self.engine.start(engine_config).await {
            error!("Tunnel engine failed to start: {:#}", e);
            self.release(session, Release::Acquired).await;
            return Err(OrchestratorError::Startup {
                stage: StartupStage::Tunnel,
                cause: format!("{:#}", e),
            });
        }
        self.ensure_connecting(session).await?;

        let request = InterfaceRequest::from(&self.interface_config);
        let Some(device) = self.interfaces.establish(&request).await else {
            error!("Virtual interface could not be established");
            self.release(session, Release::Acquired).await;
            return Err(OrchestratorError::Startup {
                stage: StartupStage::Interface,
                cause: "host refused to establish the interface".to_string(),
            });
        };
        let interface = SessionInterface::new(device);
        let descriptor = interface.fd();
        session.interface = Some(interface);
        self.ensure_connecting(session).await?;

        let relay_config = RelayConfig {
            descriptor,
            proxy_host: profile.listen_host.clone(),
            proxy_port: profile.listen_port,
            dns_server: self.interface_config.dns_server,
            mtu: self.interface_config.mtu,
            local_address: self.interface_config.local_cidr(),
        };
        info!(
            "Starting packet relay (fd={}, proxy {}:{})",
            descriptor, relay_config.proxy_host, relay_config.proxy_port
        );
        session.relay_started = true;
        if let Err(e) = self.relay.start(relay_config).await {
            error!("Packet relay failed to start: {:#}", e);
            self.release(session, Release::Acquired).await;
            return Err(OrchestratorError::Startup {
                stage: StartupStage::Relay,
                cause: format!("{:#}", e),
            });
        }

        Ok(())
    }

    /// Abort the startup if someone else moved the state on
    async fn ensure_connecting(&self, session: &mut Session) -> Result<(), OrchestratorError> {
        let current = self.state.get();
        if matches!(current, ConnectionState::Connecting) {
            return Ok(());
        }

        warn!("Startup superseded ({}), rolling back", current.label());
        self.release(session, Release::Acquired).await;
        Err(OrchestratorError::ForcedTermination(superseded_reason(&current)))
    }

    /// Clean up after a failed attempt and publish the error
    ///
    /// A forced termination already published its own state, so only
    /// locally detected failures are published here.
    async fn finish_failed(&self, err: &OrchestratorError) {
        self.protect.detach();
        self.clear_profiles().await;

        if matches!(err, OrchestratorError::ForcedTermination(_)) {
            return;
        }

        let message = err.to_string();
        if self
            .state
            .transition(|s| {
                matches!(s, ConnectionState::Connecting).then(|| ConnectionState::Error {
                    message: message.clone(),
                })
            })
            .is_err()
        {
            debug!("Error not published, state already moved on");
        }
    }

    /// Tear the session down
    ///
    /// Allowed from any state except `Disconnected`. Always ends in
    /// `Disconnected`, whatever the individual stop calls report.
    pub async fn disconnect(&self) -> Result<(), OrchestratorError> {
        if let Err(current) = self.state.transition(|s| match s {
            ConnectionState::Disconnected | ConnectionState::Disconnecting => None,
            _ => Some(ConnectionState::Disconnecting),
        }) {
            debug!("Disconnect ignored while {}", current.label());
            return Err(OrchestratorError::Rejected { state: current.label() });
        }

        info!("Disconnecting");

        // Waits for an in-flight startup to notice and roll back
        let mut session = self.session.lock().await;
        self.release(&mut session, Release::Full).await;
        self.protect.detach();
        self.clear_profiles().await;
        self.state.set(ConnectionState::Disconnected);

        info!("Disconnected");
        Ok(())
    }

    /// Host revoked the virtual interface
    pub async fn on_revoke(&self) {
        warn!("Virtual interface revoked by host");
        if let Err(e) = self.disconnect().await {
            debug!("Revoke handled without teardown: {}", e);
        }
    }

    /// External failure signal (relay crash, descriptor revoked)
    ///
    /// Forces `Error` from any state other than `Disconnected` or
    /// `Disconnecting`, then waits for any running sequence to finish and
    /// releases whatever the session still holds. A startup in flight
    /// rolls itself back at its next step, leaving nothing to release.
    pub async fn on_vpn_error(&self, message: impl Into<String>) {
        let message = message.into();
        let forced = self.state.transition(|s| match s {
            ConnectionState::Disconnected | ConnectionState::Disconnecting => None,
            _ => Some(ConnectionState::Error { message: message.clone() }),
        });

        if let Err(current) = forced {
            debug!("VPN error ignored while {}: {}", current.label(), message);
            return;
        }

        error!("VPN error: {}", message);

        let mut session = self.session.lock().await;
        if session.holds_resources() {
            info!("Releasing session after VPN error");
            self.release(&mut session, Release::Acquired).await;
        }
        self.protect.detach();
        self.clear_profiles().await;
    }

    /// Release session resources in fixed order: relay, engine, interface
    ///
    /// Every step runs even if an earlier one fails; failures are logged.
    async fn release(&self, session: &mut Session, mode: Release) {
        if session.relay_started || mode == Release::Full {
            session.relay_started = false;
            match self.relay.stop().await {
                Ok(()) => debug!("Packet relay stopped"),
                Err(e) => warn!("Error stopping packet relay: {:#}", e),
            }
        }

        if session.engine_started || mode == Release::Full {
            session.engine_started = false;
            match self.engine.stop().await {
                Ok(()) => debug!("Tunnel engine stopped"),
                Err(e) => warn!("Error stopping tunnel engine: {:#}", e),
            }
        }

        if let Some(interface) = session.interface.take() {
            interface.close();
        }
    }

    async fn clear_profiles(&self) {
        let mut profiles = self.profiles.write().await;
        profiles.pending = None;
        profiles.connected = None;
        profiles.connected_at = None;
    }
}

fn superseded_reason(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Error { message } => message.clone(),
        ConnectionState::Disconnecting | ConnectionState::Disconnected => {
            "connection cancelled".to_string()
        }
        other => format!("state changed to {}", other.label()),
    }
}
