use std::fmt;

use serde::Serialize;
use tracing::info;
use tracing::warn;

use super::integration::FromIntegrationSender;
use super::message::FromIntegrationMessage;

/// Lifecycle state of a config entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    NotLoaded,
    Loaded,
    SetupError,
    FailedUnload,
}

impl ConfigEntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigEntryState::NotLoaded => "not_loaded",
            ConfigEntryState::Loaded => "loaded",
            ConfigEntryState::SetupError => "setup_error",
            ConfigEntryState::FailedUnload => "failed_unload",
        }
    }
}

impl fmt::Display for ConfigEntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured instance of an integration.
///
/// `D` is the integration-specific entry data (connection settings and the like).
#[derive(Debug, Clone)]
pub struct ConfigEntry<D> {
    pub entry_id: String,
    pub domain: String,
    pub title: String,
    pub data: D,
    state: ConfigEntryState,
}

impl<D> ConfigEntry<D> {
    pub fn new(
        entry_id: impl Into<String>,
        domain: impl Into<String>,
        title: impl Into<String>,
        data: D,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            domain: domain.into(),
            title: title.into(),
            data,
            state: ConfigEntryState::NotLoaded,
        }
    }

    pub fn state(&self) -> ConfigEntryState {
        self.state
    }

    /// Move the entry to `state` and report the transition to the engine.
    pub async fn set_state(&mut self, state: ConfigEntryState, tx: &FromIntegrationSender) {
        if self.state == state {
            return;
        }

        info!(
            "Config entry {} ({}) {} -> {}",
            self.entry_id, self.title, self.state, state
        );
        self.state = state;

        let msg = FromIntegrationMessage::ConfigEntryStateChanged {
            entry_id: self.entry_id.clone(),
            domain: self.domain.clone(),
            title: self.title.clone(),
            state,
        };
        if let Err(e) = tx.send(msg).await {
            warn!("Failed to send ConfigEntryStateChanged message: {}", e);
        }
    }
}
