//! Recording fakes of the controller's collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use enhance_settings::ai::openai::EndpointError;
use enhance_settings::ai::provider::{ProviderCatalog, ProviderDescriptor, ProviderKind};
use enhance_settings::controller::{ControllerOptions, ReconciliationController};
use enhance_settings::error::{EnhanceError, Result};
use enhance_settings::events::{BackendEvent, EventBus, Notification};
use enhance_settings::settings::{AiSettings, EnhancementOptions, ProviderEndpointConfig};
use enhance_settings::store::{CredentialStore, ReadinessFlag, SettingsBackend};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCall {
    Has(String),
    Get(String),
    Set {
        provider: String,
        secret: String,
        config: Option<ProviderEndpointConfig>,
    },
    Remove(String),
}

pub struct FakeCredentialStore {
    secrets: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<CredentialCall>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    events: EventBus,
}

impl FakeCredentialStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            secrets: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            events,
        }
    }

    /// Seed a secret without emitting an event
    pub fn insert(&self, provider: &str, secret: &str) {
        self.secrets
            .lock()
            .unwrap()
            .insert(provider.to_string(), secret.to_string());
    }

    pub fn calls(&self) -> Vec<CredentialCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: CredentialCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn unreachable() -> EnhanceError {
        EnhanceError::Credential("keychain locked".to_string())
    }
}

#[async_trait]
impl CredentialStore for FakeCredentialStore {
    async fn has(&self, provider: &str) -> Result<bool> {
        self.record(CredentialCall::Has(provider.to_string()));
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }
        Ok(self.secrets.lock().unwrap().contains_key(provider))
    }

    async fn get(&self, provider: &str) -> Result<Option<String>> {
        self.record(CredentialCall::Get(provider.to_string()));
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }
        Ok(self.secrets.lock().unwrap().get(provider).cloned())
    }

    async fn set(
        &self,
        provider: &str,
        secret: &str,
        config: Option<ProviderEndpointConfig>,
    ) -> Result<()> {
        self.record(CredentialCall::Set {
            provider: provider.to_string(),
            secret: secret.to_string(),
            config: config.clone(),
        });
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }
        if !secret.is_empty() {
            self.insert(provider, secret);
        }
        self.events.emit(BackendEvent::ApiKeySaved {
            provider: provider.to_string(),
        });
        Ok(())
    }

    async fn remove(&self, provider: &str) -> Result<()> {
        self.record(CredentialCall::Remove(provider.to_string()));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }
        self.secrets.lock().unwrap().remove(provider);
        self.events.emit(BackendEvent::ApiKeyRemoved {
            provider: provider.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    GetSettings,
    UpdateSettings {
        enabled: bool,
        provider: String,
        model: String,
    },
    GetOptions,
    UpdateOptions(EnhancementOptions),
    GetConfig,
    UpdateConfig(ProviderEndpointConfig),
    Cache { provider: String, api_key: String },
    Clear(String),
    Test {
        base_url: String,
        model: String,
        no_auth: bool,
    },
}

/// Suspends the next gated backend call until released
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

pub struct FakeBackend {
    settings: Mutex<AiSettings>,
    options: Mutex<EnhancementOptions>,
    endpoint: Mutex<ProviderEndpointConfig>,
    cache: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<BackendCall>>,
    gate: Mutex<Option<Arc<Gate>>>,
    update_gate: Mutex<Option<Arc<Gate>>>,
    probe: Mutex<std::result::Result<(), EndpointError>>,
    pub fail_updates: AtomicBool,
    pub fail_settings_read: AtomicBool,
    pub fail_options: AtomicBool,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            settings: Mutex::new(AiSettings::cleared()),
            options: Mutex::new(EnhancementOptions::default()),
            endpoint: Mutex::new(ProviderEndpointConfig::default()),
            cache: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            update_gate: Mutex::new(None),
            probe: Mutex::new(Ok(())),
            fail_updates: AtomicBool::new(false),
            fail_settings_read: AtomicBool::new(false),
            fail_options: AtomicBool::new(false),
        }
    }
}

impl FakeBackend {
    pub fn set_settings(&self, settings: AiSettings) {
        *self.settings.lock().unwrap() = settings;
    }

    pub fn stored_settings(&self) -> AiSettings {
        self.settings.lock().unwrap().clone()
    }

    pub fn set_options(&self, options: EnhancementOptions) {
        *self.options.lock().unwrap() = options;
    }

    pub fn stored_options(&self) -> EnhancementOptions {
        self.options.lock().unwrap().clone()
    }

    pub fn set_endpoint(&self, endpoint: ProviderEndpointConfig) {
        *self.endpoint.lock().unwrap() = endpoint;
    }

    pub fn set_probe_response(&self, response: std::result::Result<(), EndpointError>) {
        *self.probe.lock().unwrap() = response;
    }

    /// Hold the next settings read until `Gate::release` is notified
    pub fn gate_next_read(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold the next settings write until `Gate::release` is notified
    pub fn gate_next_update(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.update_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn cached(&self, provider: &str) -> Option<String> {
        self.cache.lock().unwrap().get(provider).cloned()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn update_calls(&self) -> Vec<(bool, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::UpdateSettings {
                    enabled,
                    provider,
                    model,
                } => Some((enabled, provider, model)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(&self, flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(EnhanceError::Persistence("backend unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SettingsBackend for FakeBackend {
    async fn get_ai_settings(&self) -> Result<AiSettings> {
        self.record(BackendCall::GetSettings);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.failure(&self.fail_settings_read)?;
        Ok(self.stored_settings())
    }

    async fn update_ai_settings(&self, enabled: bool, provider: &str, model: &str) -> Result<()> {
        self.record(BackendCall::UpdateSettings {
            enabled,
            provider: provider.to_string(),
            model: model.to_string(),
        });
        let gate = self.update_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.failure(&self.fail_updates)?;
        let has_api_key = self.cache.lock().unwrap().contains_key(provider);
        let mut settings = self.settings.lock().unwrap();
        *settings = AiSettings {
            enabled,
            provider: provider.to_string(),
            model: model.to_string(),
            has_api_key: has_api_key || (settings.has_api_key && settings.provider == provider),
        };
        Ok(())
    }

    async fn get_enhancement_options(&self) -> Result<EnhancementOptions> {
        self.record(BackendCall::GetOptions);
        self.failure(&self.fail_options)?;
        Ok(self.stored_options())
    }

    async fn update_enhancement_options(&self, options: &EnhancementOptions) -> Result<()> {
        self.record(BackendCall::UpdateOptions(options.clone()));
        self.failure(&self.fail_options)?;
        self.set_options(options.clone());
        Ok(())
    }

    async fn get_openai_config(&self) -> Result<ProviderEndpointConfig> {
        self.record(BackendCall::GetConfig);
        Ok(self.endpoint.lock().unwrap().clone())
    }

    async fn update_openai_config(&self, config: &ProviderEndpointConfig) -> Result<()> {
        self.record(BackendCall::UpdateConfig(config.clone()));
        self.failure(&self.fail_updates)?;
        self.set_endpoint(config.clone());
        Ok(())
    }

    async fn cache_ai_api_key(&self, provider: &str, api_key: &str) -> Result<()> {
        self.record(BackendCall::Cache {
            provider: provider.to_string(),
            api_key: api_key.to_string(),
        });
        self.cache
            .lock()
            .unwrap()
            .insert(provider.to_string(), api_key.to_string());
        Ok(())
    }

    async fn clear_ai_api_key(&self, provider: &str) -> Result<()> {
        self.record(BackendCall::Clear(provider.to_string()));
        self.cache.lock().unwrap().remove(provider);
        Ok(())
    }

    async fn test_openai_endpoint(
        &self,
        base_url: &str,
        model: &str,
        no_auth: bool,
    ) -> std::result::Result<(), EndpointError> {
        self.record(BackendCall::Test {
            base_url: base_url.to_string(),
            model: model.to_string(),
            no_auth,
        });
        self.probe.lock().unwrap().clone()
    }
}

/// Local Ollama provider plus two key-based providers `A` and `B`
pub fn catalog() -> ProviderCatalog {
    let mut catalog = ProviderCatalog::builtin();
    catalog.extend(["A", "B"].into_iter().map(|id| ProviderDescriptor {
        id: id.to_string(),
        name: format!("Provider {}", id),
        kind: ProviderKind::ApiKey,
        default_model: format!("{}-model", id.to_lowercase()),
        description: None,
    }));
    catalog
}

pub fn settings(enabled: bool, provider: &str, model: &str) -> AiSettings {
    AiSettings {
        enabled,
        provider: provider.to_string(),
        model: model.to_string(),
        has_api_key: false,
    }
}

pub struct Harness {
    pub events: EventBus,
    pub credentials: Arc<FakeCredentialStore>,
    pub backend: Arc<FakeBackend>,
    pub readiness: Arc<ReadinessFlag>,
    pub controller: ReconciliationController,
}

impl Harness {
    pub fn new() -> Self {
        let events = EventBus::default();
        let credentials = Arc::new(FakeCredentialStore::new(events.clone()));
        let backend = Arc::new(FakeBackend::default());
        let readiness = Arc::new(ReadinessFlag::default());
        let controller = ReconciliationController::new(
            credentials.clone(),
            backend.clone(),
            readiness.clone(),
            ControllerOptions {
                catalog: catalog(),
                probe_host: "localhost".to_string(),
            },
        );
        Self {
            events,
            credentials,
            backend,
            readiness,
            controller,
        }
    }

    /// Harness with secrets seeded and the backend holding `stored`
    pub fn with(keys: &[&str], stored: AiSettings) -> Self {
        let harness = Self::new();
        for provider in keys {
            harness
                .credentials
                .insert(provider, &format!("sk-{}", provider.to_lowercase()));
        }
        harness.backend.set_settings(stored);
        harness
    }

    pub fn settings(&self) -> AiSettings {
        self.controller.snapshot().settings
    }
}

/// Every notification queued so far
pub fn drain_notifications(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}
