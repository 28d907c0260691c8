//! OS keychain credential store
//!
//! Secrets live in the platform keychain under one service name, one entry
//! per provider. Every change is mirrored into the settings backend's secret
//! cache and announced on the event bus.

use super::{CredentialStore, SettingsBackend};
use crate::error::{EnhanceError, Result};
use crate::events::{BackendEvent, EventBus};
use crate::settings::ProviderEndpointConfig;
use async_trait::async_trait;
use keyring::Entry;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keychain service used when the config does not name one
pub const DEFAULT_KEYRING_SERVICE: &str = "enhance-settings";

/// Credential store backed by the `keyring` crate
pub struct KeyringCredentialStore {
    service: String,
    backend: Arc<dyn SettingsBackend>,
    events: EventBus,
}

impl KeyringCredentialStore {
    pub fn new(
        service: impl Into<String>,
        backend: Arc<dyn SettingsBackend>,
        events: EventBus,
    ) -> Self {
        Self {
            service: service.into(),
            backend,
            events,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(service: &str, provider: &str) -> Result<Entry> {
        Entry::new(service, provider)
            .map_err(|e| EnhanceError::Credential(format!("Failed to access keyring: {}", e)))
    }

    /// Run a blocking keychain call off the async runtime
    async fn blocking<T, F>(&self, provider: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T> + Send + 'static,
    {
        let entry = Self::entry(&self.service, provider)?;
        tokio::task::spawn_blocking(move || op(entry))
            .await
            .map_err(|e| EnhanceError::Credential(format!("Keyring task failed: {}", e)))?
    }

    fn read(entry: &Entry) -> Result<Option<String>> {
        match entry.get_password() {
            Ok(password) if !password.is_empty() => Ok(Some(password)),
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(EnhanceError::Credential(format!(
                "Failed to read API key: {}",
                e
            ))),
        }
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn has(&self, provider: &str) -> Result<bool> {
        let secret = self.blocking(provider, |entry| Self::read(&entry)).await?;
        Ok(secret.is_some())
    }

    async fn get(&self, provider: &str) -> Result<Option<String>> {
        self.blocking(provider, |entry| Self::read(&entry)).await
    }

    async fn set(
        &self,
        provider: &str,
        secret: &str,
        config: Option<ProviderEndpointConfig>,
    ) -> Result<()> {
        let secret = secret.trim().to_string();
        let no_auth = config.as_ref().map(|c| c.no_auth).unwrap_or(false);
        if secret.is_empty() && !no_auth {
            return Err(EnhanceError::Validation("API key cannot be empty".to_string()));
        }

        if let Some(config) = &config {
            self.backend
                .update_openai_config(config)
                .await
                .map_err(|e| EnhanceError::Credential(format!("Failed to store endpoint: {}", e)))?;
        }

        if secret.is_empty() {
            debug!(provider, "no-auth endpoint, nothing to put in the keychain");
        } else {
            let value = secret.clone();
            self.blocking(provider, move |entry| {
                entry.set_password(&value).map_err(|e| {
                    EnhanceError::Credential(format!("Failed to store API key: {}", e))
                })
            })
            .await?;

            if let Err(e) = self.backend.cache_ai_api_key(provider, &secret).await {
                warn!(provider, "Failed to cache API key in backend: {}", e);
            }
        }

        info!(provider, "credential saved");
        self.events.emit(BackendEvent::ApiKeySaved {
            provider: provider.to_string(),
        });
        Ok(())
    }

    async fn remove(&self, provider: &str) -> Result<()> {
        self.blocking(provider, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(EnhanceError::Credential(format!(
                "Failed to delete API key: {}",
                e
            ))),
        })
        .await?;

        if let Err(e) = self.backend.clear_ai_api_key(provider).await {
            warn!(provider, "Failed to clear cached API key: {}", e);
        }

        info!(provider, "credential removed");
        self.events.emit(BackendEvent::ApiKeyRemoved {
            provider: provider.to_string(),
        });
        Ok(())
    }
}
