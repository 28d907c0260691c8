//! Pure state transitions of the controller
//!
//! Nothing in here performs I/O. Backend events are reduced to a new state
//! plus a list of [`Effect`]s that the controller carries out afterwards.

use crate::ai::provider::ProviderCatalog;
use crate::events::{BackendEvent, Notification};
use crate::settings::{
    AiSettings, EnhancementOptions, ProviderEndpointConfig, ProviderKeyStatus, SettingsSnapshot,
};
use tracing::{debug, info, warn};

/// Everything the controller owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerState {
    pub settings: AiSettings,
    pub key_status: ProviderKeyStatus,
    pub options: EnhancementOptions,
    pub endpoint: Option<ProviderEndpointConfig>,
}

impl ControllerState {
    /// State before the first load
    pub fn initial(catalog: &ProviderCatalog) -> Self {
        let provider = catalog
            .local_provider()
            .map(|provider| provider.id.clone())
            .unwrap_or_default();
        Self {
            settings: AiSettings::unloaded(provider),
            key_status: ProviderKeyStatus::new(),
            options: EnhancementOptions::editor_default(),
            endpoint: None,
        }
    }

    pub fn snapshot(&self, loaded: bool) -> SettingsSnapshot {
        SettingsSnapshot::new(
            self.settings.clone(),
            self.key_status.clone(),
            self.options.clone(),
            self.endpoint.clone(),
            loaded,
        )
    }
}

/// Follow-up work requested by a reduction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Re-read `AiSettings` from the backend
    RefreshSettings,
    /// Re-read `AiSettings` and trust the backend's credential flag
    RederiveFromBackend,
    /// Write this selection to the backend
    Persist(AiSettings),
    Notify(Notification),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    pub state: ControllerState,
    pub effects: Vec<Effect>,
}

/// Apply a backend event to `state`
pub fn reduce(state: &ControllerState, event: &BackendEvent) -> Reduction {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match event {
        BackendEvent::AiReady => {
            effects.push(Effect::RederiveFromBackend);
        }
        BackendEvent::ApiKeySaved { provider } => {
            next.key_status.set(provider.clone(), true);
            effects.push(Effect::RefreshSettings);
        }
        BackendEvent::ApiKeyRemoved { provider } => {
            next.key_status.set(provider.clone(), false);
            // Only the provider that is active now is cleared, whoever issued the removal.
            if !provider.is_empty() && next.settings.provider == *provider {
                info!(provider = %provider, "credential of the active provider removed, disabling enhancement");
                next.settings = AiSettings::cleared();
                effects.push(Effect::Persist(next.settings.clone()));
            } else {
                debug!(
                    provider = %provider,
                    active = %next.settings.provider,
                    "credential of an inactive provider removed"
                );
            }
        }
        BackendEvent::FormattingError { message } => {
            effects.push(Effect::Notify(Notification::formatting_failed(message)));
        }
    }

    Reduction {
        state: next,
        effects,
    }
}

/// Whether `settings.provider` has a usable credential
///
/// Local endpoints are validated by the backend, so its flag is trusted;
/// everything else is decided by the key status.
pub fn derive_has_api_key(
    catalog: &ProviderCatalog,
    key_status: &ProviderKeyStatus,
    settings: &AiSettings,
) -> bool {
    if settings.provider.is_empty() {
        return false;
    }
    if catalog.is_local_endpoint(&settings.provider) {
        settings.has_api_key
    } else {
        key_status.get(&settings.provider)
    }
}

/// Backend settings with the credential flag re-derived and the invariant enforced
pub fn derive_settings(
    catalog: &ProviderCatalog,
    key_status: &ProviderKeyStatus,
    backend: AiSettings,
) -> AiSettings {
    let has_api_key = derive_has_api_key(catalog, key_status, &backend);
    AiSettings {
        has_api_key,
        ..backend
    }
    .normalized()
}

/// Mark `provider` as keyed when readiness confirms it; returns whether anything changed
pub fn apply_readiness(key_status: &mut ProviderKeyStatus, provider: &str, ready: bool) -> bool {
    if !ready || provider.is_empty() || key_status.get(provider) {
        return false;
    }
    debug!(provider, "readiness confirms a credential the key check missed");
    key_status.set(provider, true);
    true
}

/// Selection to adopt when no model is set and exactly one provider has a key
pub fn auto_select(
    catalog: &ProviderCatalog,
    key_status: &ProviderKeyStatus,
    current: &AiSettings,
) -> Option<AiSettings> {
    if !current.model.is_empty() {
        return None;
    }

    let keyed = key_status.providers_with_key();
    let [provider] = keyed.as_slice() else {
        debug!(keyed = keyed.len(), "auto-select needs exactly one keyed provider");
        return None;
    };

    let Some(descriptor) = catalog.get(provider) else {
        warn!(provider = %provider, "keyed provider missing from catalog, not auto-selecting");
        return None;
    };

    Some(AiSettings {
        enabled: current.enabled,
        provider: descriptor.id.clone(),
        model: descriptor.default_model.clone(),
        has_api_key: true,
    })
}
