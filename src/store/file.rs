//! TOML-file settings backend
//!
//! Persists the enabled/provider/model triple, the enhancement options and
//! the local endpoint in one file. Cached secrets are held in memory only.

use super::{ReadinessSignal, SettingsBackend};
use crate::ai::openai::{EndpointError, OpenAiCompatClient, OpenAiCompatConfig};
use crate::error::{EnhanceError, Result};
use crate::events::{BackendEvent, EventBus};
use crate::settings::{AiSettings, EnhancementOptions, ProviderEndpointConfig};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// On-disk layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(default)]
    ai: StoredAi,
    #[serde(default)]
    options: EnhancementOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint: Option<ProviderEndpointConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredAi {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Default)]
struct State {
    stored: StoredSettings,
    secrets: HashMap<String, String>,
}

impl State {
    /// A cached secret, or a no-auth endpoint for the local provider
    fn is_usable(&self, provider: &str, local_provider: &str) -> bool {
        if provider.is_empty() {
            return false;
        }
        if self.secrets.contains_key(provider) {
            return true;
        }
        provider == local_provider
            && self
                .stored
                .endpoint
                .as_ref()
                .map(|endpoint| endpoint.no_auth)
                .unwrap_or(false)
    }
}

/// Settings backend persisted to a TOML file
pub struct FileSettingsBackend {
    path: PathBuf,
    local_provider: String,
    timeout: Duration,
    state: Mutex<State>,
    /// Held across a whole write so snapshots reach disk in order
    writes: tokio::sync::Mutex<()>,
    events: Option<EventBus>,
}

impl FileSettingsBackend {
    /// Open the settings file, starting empty when it does not exist yet
    pub async fn open(
        path: impl Into<PathBuf>,
        local_provider: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let path = path.into();
        let stored = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read settings file: {:?}", path))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse settings file: {:?}", path))?
        } else {
            debug!("No settings file at {:?}, starting with defaults", path);
            StoredSettings::default()
        };

        Ok(Self {
            path,
            local_provider: local_provider.into(),
            timeout,
            state: Mutex::new(State {
                stored,
                secrets: HashMap::new(),
            }),
            writes: tokio::sync::Mutex::new(()),
            events: None,
        })
    }

    /// Announce `ai-ready` on `events` whenever a provider becomes usable
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` and write the result to disk
    async fn persist(&self, change: impl FnOnce(&mut StoredSettings)) -> Result<()> {
        let _write = self.writes.lock().await;
        let snapshot = {
            let mut state = self.lock();
            change(&mut state.stored);
            state.stored.clone()
        };

        let contents = toml::to_string_pretty(&snapshot)
            .map_err(|e| EnhanceError::Persistence(format!("Failed to serialize settings: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EnhanceError::Persistence(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }
        tokio::fs::write(&self.path, contents).await.map_err(|e| {
            EnhanceError::Persistence(format!("Failed to write {:?}: {}", self.path, e))
        })?;
        debug!("Saved settings to {:?}", self.path);
        Ok(())
    }

    fn announce_ready(&self) {
        let ready = {
            let state = self.lock();
            state.is_usable(&state.stored.ai.provider, &self.local_provider)
        };
        if let (true, Some(events)) = (ready, &self.events) {
            events.emit(BackendEvent::AiReady);
        }
    }
}

#[async_trait]
impl SettingsBackend for FileSettingsBackend {
    async fn get_ai_settings(&self) -> Result<AiSettings> {
        let state = self.lock();
        let ai = &state.stored.ai;
        Ok(AiSettings {
            enabled: ai.enabled,
            provider: ai.provider.clone(),
            model: ai.model.clone(),
            has_api_key: state.is_usable(&ai.provider, &self.local_provider),
        })
    }

    async fn update_ai_settings(&self, enabled: bool, provider: &str, model: &str) -> Result<()> {
        info!(enabled, provider, model, "updating AI settings");
        self.persist(|stored| {
            stored.ai = StoredAi {
                enabled,
                provider: provider.to_string(),
                model: model.to_string(),
            };
        })
        .await
    }

    async fn get_enhancement_options(&self) -> Result<EnhancementOptions> {
        Ok(self.lock().stored.options.clone())
    }

    async fn update_enhancement_options(&self, options: &EnhancementOptions) -> Result<()> {
        let options = options.clone();
        self.persist(move |stored| stored.options = options).await
    }

    async fn get_openai_config(&self) -> Result<ProviderEndpointConfig> {
        Ok(self.lock().stored.endpoint.clone().unwrap_or_default())
    }

    async fn update_openai_config(&self, config: &ProviderEndpointConfig) -> Result<()> {
        let config = config.clone();
        self.persist(move |stored| stored.endpoint = Some(config)).await?;
        self.announce_ready();
        Ok(())
    }

    async fn cache_ai_api_key(&self, provider: &str, api_key: &str) -> Result<()> {
        self.lock()
            .secrets
            .insert(provider.to_string(), api_key.to_string());
        debug!(provider, "cached API key");
        self.announce_ready();
        Ok(())
    }

    async fn clear_ai_api_key(&self, provider: &str) -> Result<()> {
        self.lock().secrets.remove(provider);
        debug!(provider, "cleared cached API key");
        Ok(())
    }

    async fn test_openai_endpoint(
        &self,
        base_url: &str,
        model: &str,
        no_auth: bool,
    ) -> std::result::Result<(), EndpointError> {
        let api_key = if no_auth {
            None
        } else {
            self.lock().secrets.get(&self.local_provider).cloned()
        };
        let client = OpenAiCompatClient::new(OpenAiCompatConfig {
            base_url: base_url.to_string(),
            api_key,
            model: model.to_string(),
            timeout: self.timeout,
        })?;
        client.ping().await
    }
}

impl ReadinessSignal for FileSettingsBackend {
    fn is_ready(&self, provider: &str) -> bool {
        self.lock().is_usable(provider, &self.local_provider)
    }
}
