//! Profile Store
//!
//! Profiles are persisted by the host application. The orchestrator reads a
//! profile for one connection attempt and records the last connected one.

use crate::config::{ProfileSet, ServerProfile};
use std::sync::RwLock;
use tracing::debug;

/// Profile storage contract
pub trait ProfileStore: Send + Sync {
    fn profile_by_id(&self, id: &str) -> Option<ServerProfile>;

    fn set_active_profile(&self, id: &str);

    fn last_connected_profile_id(&self) -> Option<String>;

    fn set_last_connected_profile_id(&self, id: &str);
}

#[derive(Debug, Default)]
struct StoreState {
    profiles: Vec<ServerProfile>,
    active: Option<String>,
    last_connected: Option<String>,
}

/// In-memory profile store, optionally seeded from a [`ProfileSet`]
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    state: RwLock<StoreState>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_set(set: ProfileSet) -> Self {
        Self {
            state: RwLock::new(StoreState {
                profiles: set.profiles,
                ..StoreState::default()
            }),
        }
    }

    /// Insert or replace a profile
    pub fn upsert(&self, profile: ServerProfile) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        match state.profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile,
            None => state.profiles.push(profile),
        }
    }

    pub fn active_profile_id(&self) -> Option<String> {
        self.state.read().unwrap_or_else(|p| p.into_inner()).active.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(|p| p.into_inner()).profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProfileStore for MemoryProfileStore {
    fn profile_by_id(&self, id: &str) -> Option<ServerProfile> {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        state.profiles.iter().find(|p| p.id == id).cloned()
    }

    fn set_active_profile(&self, id: &str) {
        debug!("Active profile: {}", id);
        self.state.write().unwrap_or_else(|p| p.into_inner()).active = Some(id.to_string());
    }

    fn last_connected_profile_id(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .last_connected
            .clone()
    }

    fn set_last_connected_profile_id(&self, id: &str) {
        debug!("Last connected profile: {}", id);
        self.state.write().unwrap_or_else(|p| p.into_inner()).last_connected = Some(id.to_string());
    }
}
