//! External collaborators of the controller
//!
//! The controller only ever talks to these traits. `keyring` and `file` hold
//! the implementations used by the command-line front-end; tests plug in
//! recording fakes.

pub mod file;
pub mod keyring;

pub use file::FileSettingsBackend;
pub use self::keyring::KeyringCredentialStore;

use crate::ai::openai::EndpointError;
use crate::error::Result;
use crate::settings::{AiSettings, EnhancementOptions, ProviderEndpointConfig};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-provider secret storage
///
/// `set` and `remove` announce themselves on the event bus
/// (`api-key-saved` / `api-key-removed`).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Whether a secret exists for `provider`
    async fn has(&self, provider: &str) -> Result<bool>;

    /// The secret for `provider`, if any
    async fn get(&self, provider: &str) -> Result<Option<String>>;

    /// Store a secret; `config` carries the endpoint of a local provider
    async fn set(
        &self,
        provider: &str,
        secret: &str,
        config: Option<ProviderEndpointConfig>,
    ) -> Result<()>;

    /// Delete the secret for `provider`
    async fn remove(&self, provider: &str) -> Result<()>;
}

/// Persistent settings store reached through request/response calls
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    async fn get_ai_settings(&self) -> Result<AiSettings>;

    async fn update_ai_settings(&self, enabled: bool, provider: &str, model: &str) -> Result<()>;

    async fn get_enhancement_options(&self) -> Result<EnhancementOptions>;

    async fn update_enhancement_options(&self, options: &EnhancementOptions) -> Result<()>;

    /// Endpoint of the local OpenAI-compatible provider
    async fn get_openai_config(&self) -> Result<ProviderEndpointConfig>;

    async fn update_openai_config(&self, config: &ProviderEndpointConfig) -> Result<()>;

    /// Mirror a secret so later backend calls need not reach the keychain
    async fn cache_ai_api_key(&self, provider: &str, api_key: &str) -> Result<()>;

    async fn clear_ai_api_key(&self, provider: &str) -> Result<()>;

    /// Send one validation request; the raw error is classified by the caller
    async fn test_openai_endpoint(
        &self,
        base_url: &str,
        model: &str,
        no_auth: bool,
    ) -> std::result::Result<(), EndpointError>;
}

/// Out-of-band confirmation that a provider is usable
pub trait ReadinessSignal: Send + Sync {
    fn is_ready(&self, provider: &str) -> bool;
}

/// Readiness flag flipped by whoever observes `ai-ready`
#[derive(Debug, Default)]
pub struct ReadinessFlag(AtomicBool);

impl ReadinessFlag {
    pub fn new(ready: bool) -> Self {
        Self(AtomicBool::new(ready))
    }

    pub fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }
}

impl ReadinessSignal for ReadinessFlag {
    fn is_ready(&self, _provider: &str) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
