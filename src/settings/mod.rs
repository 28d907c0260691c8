//! Settings data model shared by the controller, the stores and the UI
//!
//! `AiSettings` and `ProviderKeyStatus` are owned by the controller; the
//! presentation layer only ever sees them through a `SettingsSnapshot`.

pub mod endpoint;
pub mod options;

pub use endpoint::{ProviderEndpointConfig, DEFAULT_LOCAL_PORT};
pub use options::{EnhancementOptions, EnhancementPreset};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The active enhancement selection
///
/// `enabled` implies `has_api_key` and a non-empty `model`; use
/// [`AiSettings::normalized`] before publishing a value from an outside source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    /// Whether transcripts are sent through enhancement
    pub enabled: bool,
    /// Provider id, empty when nothing is selected
    pub provider: String,
    /// Model id, empty when nothing is selected
    pub model: String,
    /// Whether the active provider has a usable credential
    #[serde(default)]
    pub has_api_key: bool,
}

impl AiSettings {
    /// Settings with nothing selected and enhancement off
    pub fn cleared() -> Self {
        Self::default()
    }

    /// Initial in-memory value before anything has been loaded
    pub fn unloaded(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    /// Whether enhancement may be switched on with this selection
    pub fn can_enable(&self) -> bool {
        self.has_api_key && !self.model.is_empty()
    }

    /// Whether the enabled/credential invariant holds
    pub fn is_consistent(&self) -> bool {
        !self.enabled || self.can_enable()
    }

    /// Force `enabled = false` when the selection cannot back it
    pub fn normalized(mut self) -> Self {
        if !self.is_consistent() {
            tracing::warn!(
                provider = %self.provider,
                model = %self.model,
                has_api_key = self.has_api_key,
                "enhancement reported enabled without a usable selection; showing it as disabled"
            );
            self.enabled = false;
        }
        self
    }
}

/// Which providers currently have a credential in the OS store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderKeyStatus(BTreeMap<String, bool>);

impl ProviderKeyStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unknown providers report `false`
    pub fn get(&self, provider: &str) -> bool {
        self.0.get(provider).copied().unwrap_or(false)
    }

    pub fn set(&mut self, provider: impl Into<String>, present: bool) {
        self.0.insert(provider.into(), present);
    }

    /// Providers whose entry is `true`, in id order
    pub fn providers_with_key(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, present)| **present)
            .map(|(provider, _)| provider.as_str())
            .collect()
    }

    /// Whether any provider has a key
    pub fn any(&self) -> bool {
        self.0.values().any(|present| *present)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(provider, present)| (provider.as_str(), *present))
    }
}

/// Read-only view handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsSnapshot {
    pub settings: AiSettings,
    pub key_status: ProviderKeyStatus,
    pub options: EnhancementOptions,
    pub endpoint: Option<ProviderEndpointConfig>,
    /// Set once the first load has finished
    pub loaded: bool,
    /// A cached key or a backend-validated endpoint exists
    pub has_any_valid_config: bool,
    /// The enable switch may be turned on
    pub can_toggle: bool,
}

impl SettingsSnapshot {
    pub fn new(
        settings: AiSettings,
        key_status: ProviderKeyStatus,
        options: EnhancementOptions,
        endpoint: Option<ProviderEndpointConfig>,
        loaded: bool,
    ) -> Self {
        let has_any_valid_config = settings.has_api_key || key_status.any();
        let can_toggle = settings.can_enable();
        Self {
            settings,
            key_status,
            options,
            endpoint,
            loaded,
            has_any_valid_config,
            can_toggle,
        }
    }
}
