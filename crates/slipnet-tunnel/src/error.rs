//! Orchestrator error taxonomy.

use crate::config::ConfigError;

/// Pipeline stage that failed during startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    Tunnel,
    Interface,
    Relay,
}

impl std::fmt::Display for StartupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupStage::Tunnel => write!(f, "Tunnel engine"),
            StartupStage::Interface => write!(f, "Virtual interface"),
            StartupStage::Relay => write!(f, "Packet relay"),
        }
    }
}

/// Orchestrator errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("{stage} failed to start: {cause}")]
    Startup { stage: StartupStage, cause: String },

    #[error("Connection terminated: {0}")]
    ForcedTermination(String),

    #[error("Request ignored while {state}")]
    Rejected { state: &'static str },
}

impl OrchestratorError {
    pub fn stage(&self) -> Option<StartupStage> {
        match self {
            OrchestratorError::Startup { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
