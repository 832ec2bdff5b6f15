//! SlipNet Tunnel - Connection Orchestrator
//!
//! Brings up the local tunnel pipeline of the SlipNet client in a strict
//! order and tears it down safely on every exit path.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        Host Application                        │
//! │                                                                │
//! │  ┌─────────────┐    ┌───────────────────┐    ┌──────────────┐  │
//! │  │   Virtual   │───▶│   Packet Relay    │───▶│    Tunnel    │  │
//! │  │  Interface  │    │ (fd → local proxy)│    │    Engine    │  │
//! │  └─────────────┘    └───────────────────┘    └───────┬──────┘  │
//! │                                                      │         │
//! └──────────────────────────────────────────────────────│─────────┘
//!                                                        │
//!                                                        ▼ DNS queries
//!                                               ┌──────────────────┐
//!                                               │ Public Resolvers │
//!                                               └──────────────────┘
//! ```
//!
//! Startup order: engine → interface → relay. Teardown order: relay →
//! engine → interface. See [`ConnectionOrchestrator`].

mod config;
mod engine;
mod error;
mod interface;
mod orchestrator;
mod protect;
mod relay;
mod state;
mod stats;
mod store;

pub use config::{
    ConfigError, CongestionControl, InterfaceConfig, ProfileSet, ResolverConfig, ResolverMode,
    ServerProfile,
};
pub use engine::{EngineConfig, EngineError, EngineHost, EngineRunner, TunnelEngine};
pub use error::{OrchestratorError, StartupStage};
pub use interface::{
    InterfaceRequest, RawDescriptor, SessionInterface, TunDevice, VirtualInterfaceProvider,
};
pub use orchestrator::ConnectionOrchestrator;
pub use protect::{ProtectHandle, RawSocket, SocketProtector};
pub use relay::{PacketRelay, RelayConfig};
pub use state::ConnectionState;
pub use stats::TrafficStats;
pub use store::{MemoryProfileStore, ProfileStore};
