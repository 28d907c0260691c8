//! Reconciliation controller
//!
//! Owns the in-memory `AiSettings`, `ProviderKeyStatus`, options and endpoint
//! copy. Keeps them consistent with the credential store and the settings
//! backend across user actions and backend-pushed events.
//!
//! State is only touched between suspension points. Every completion goes
//! through [`ReconciliationController::commit`], which drops it once the
//! controller has been shut down, so a late backend answer can never revive
//! state nobody observes anymore.

pub mod latch;
pub mod reducer;

pub use latch::{LatchState, LoadLatch};
pub use reducer::{ControllerState, Effect, Reduction};

use crate::ai::probe::{ConnectivityProbe, ProbeResult};
use crate::ai::provider::ProviderCatalog;
use crate::error::{EnhanceError, Result};
use crate::events::{BackendEvent, EventBus, EventSubscription, Notification};
use crate::settings::{
    AiSettings, EnhancementOptions, ProviderEndpointConfig, ProviderKeyStatus, SettingsSnapshot,
};
use crate::store::{CredentialStore, ReadinessSignal, SettingsBackend};
use futures::future::join_all;
use reducer::{apply_readiness, auto_select, derive_settings, reduce};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const NOTIFICATION_CAPACITY: usize = 64;

/// Static inputs of a controller
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Providers whose credentials are tracked
    pub catalog: ProviderCatalog,
    /// Host used for local endpoint URLs
    pub probe_host: String,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            catalog: ProviderCatalog::builtin(),
            probe_host: "localhost".to_string(),
        }
    }
}

struct Inner {
    credentials: Arc<dyn CredentialStore>,
    backend: Arc<dyn SettingsBackend>,
    readiness: Arc<dyn ReadinessSignal>,
    probe: ConnectivityProbe,
    catalog: ProviderCatalog,
    probe_host: String,
    latch: LoadLatch,
    alive: AtomicBool,
    state: Mutex<ControllerState>,
    snapshots: watch::Sender<SettingsSnapshot>,
    notifications: broadcast::Sender<Notification>,
}

/// Single owner of the enhancement settings state
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ReconciliationController {
    inner: Arc<Inner>,
}

impl ReconciliationController {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        backend: Arc<dyn SettingsBackend>,
        readiness: Arc<dyn ReadinessSignal>,
        options: ControllerOptions,
    ) -> Self {
        let state = ControllerState::initial(&options.catalog);
        let (snapshots, _) = watch::channel(state.snapshot(false));
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                credentials,
                probe: ConnectivityProbe::new(backend.clone()),
                backend,
                readiness,
                catalog: options.catalog,
                probe_host: options.probe_host,
                latch: LoadLatch::new(),
                alive: AtomicBool::new(true),
                state: Mutex::new(state),
                snapshots,
                notifications,
            }),
        }
    }

    /// Current read-only view
    pub fn snapshot(&self) -> SettingsSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Stream of snapshots, one per committed change
    pub fn watch(&self) -> watch::Receiver<SettingsSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Stream of user-facing notifications
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.inner.catalog
    }

    pub fn latch_state(&self) -> LatchState {
        self.inner.latch.state()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Tear the controller down; pending completions become no-ops
    pub fn shutdown(&self) {
        if self.inner.alive.swap(false, Ordering::SeqCst) {
            info!("settings controller shut down");
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> ControllerState {
        self.lock().clone()
    }

    /// Apply `change` and publish a snapshot; `None` after shutdown
    fn commit<R>(&self, change: impl FnOnce(&mut ControllerState) -> R) -> Option<R> {
        if !self.is_alive() {
            debug!("controller shut down, dropping completion");
            return None;
        }
        let (result, snapshot) = {
            let mut state = self.lock();
            let result = change(&mut state);
            state.settings = std::mem::take(&mut state.settings).normalized();
            (result, state.snapshot(self.inner.latch.is_done()))
        };
        self.inner.snapshots.send_replace(snapshot);
        Some(result)
    }

    fn notify(&self, notification: Notification) {
        if !self.is_alive() {
            return;
        }
        if notification.is_error() {
            warn!(title = %notification.title, "{}", notification.message);
        } else {
            debug!(title = %notification.title, "{}", notification.message);
        }
        let _ = self.inner.notifications.send(notification);
    }

    fn fail(&self, err: EnhanceError) -> EnhanceError {
        self.notify(Notification::from_error(&err));
        err
    }

    /// Startup reconciliation; runs once, later calls return immediately
    pub async fn load(&self) -> Result<()> {
        if !self.inner.latch.try_begin() {
            debug!(state = ?self.inner.latch.state(), "settings load already claimed");
            return Ok(());
        }

        info!("loading AI settings");
        let result = self.run_load().await;
        self.inner.latch.finish();
        // republish with `loaded` set
        self.commit(|_| ());

        match &result {
            Ok(()) => info!("AI settings loaded"),
            Err(e) => error!("AI settings load failed: {}", e),
        }
        result
    }

    async fn run_load(&self) -> Result<()> {
        let inner = &self.inner;

        let checks = inner.catalog.ids().map(|provider| async move {
            let present = match inner.credentials.has(provider).await {
                Ok(present) => present,
                Err(e) => {
                    warn!(provider, "Credential check failed, treating as absent: {}", e);
                    false
                }
            };
            (provider.to_string(), present)
        });
        let mut key_status = ProviderKeyStatus::new();
        for (provider, present) in join_all(checks).await {
            key_status.set(provider, present);
        }

        for provider in key_status.providers_with_key() {
            self.cache_secret(provider).await;
        }

        let loaded_status = key_status.clone();
        self.commit(move |state| state.key_status = loaded_status);

        match inner.backend.get_enhancement_options().await {
            Ok(options) => {
                self.commit(|state| state.options = options);
            }
            Err(e) => warn!("Failed to load enhancement options, keeping defaults: {}", e),
        }

        let backend_settings = inner
            .backend
            .get_ai_settings()
            .await
            .map_err(|e| self.fail(e))?;
        debug!(
            provider = %backend_settings.provider,
            model = %backend_settings.model,
            enabled = backend_settings.enabled,
            "backend settings fetched"
        );

        let selected = auto_select(&inner.catalog, &key_status, &backend_settings);
        let ready = inner.readiness.is_ready(&backend_settings.provider);
        let mut outcome = Ok(());

        match selected {
            Some(selection) => {
                info!(
                    provider = %selection.provider,
                    model = %selection.model,
                    "auto-selecting the only configured provider"
                );
                match inner
                    .backend
                    .update_ai_settings(selection.enabled, &selection.provider, &selection.model)
                    .await
                {
                    Ok(()) => {
                        self.commit(|state| {
                            apply_readiness(&mut state.key_status, &backend_settings.provider, ready);
                            state.settings = selection;
                        });
                    }
                    Err(e) => {
                        self.commit(|state| {
                            apply_readiness(&mut state.key_status, &backend_settings.provider, ready);
                            state.settings =
                                derive_settings(&inner.catalog, &state.key_status, backend_settings);
                        });
                        outcome = Err(self.fail(e));
                    }
                }
            }
            None => {
                self.commit(|state| {
                    apply_readiness(&mut state.key_status, &backend_settings.provider, ready);
                    state.settings =
                        derive_settings(&inner.catalog, &state.key_status, backend_settings);
                });
            }
        }

        if inner.catalog.local_provider().is_some() {
            if let Err(e) = self.load_endpoint_config().await {
                warn!("Failed to load local endpoint config: {}", e);
            }
        }

        outcome
    }

    /// Push the stored secret of `provider` into the backend cache
    async fn cache_secret(&self, provider: &str) {
        let secret = match self.inner.credentials.get(provider).await {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                debug!(provider, "credential vanished before it could be cached");
                return;
            }
            Err(e) => {
                warn!(provider, "Failed to read credential, not caching: {}", e);
                return;
            }
        };
        match self.inner.backend.cache_ai_api_key(provider, &secret).await {
            Ok(()) => debug!(provider, "cached credential in backend"),
            Err(e) => warn!(provider, "Failed to cache credential in backend: {}", e),
        }
    }

    /// Switch enhancement on or off for the current selection
    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        let current = self.read().settings;
        if enabled && !current.can_enable() {
            return Err(self.fail(EnhanceError::Validation(
                "Please select a model and add an API key first".to_string(),
            )));
        }

        self.inner
            .backend
            .update_ai_settings(enabled, &current.provider, &current.model)
            .await
            .map_err(|e| self.fail(e))?;

        self.commit(|state| {
            if state.settings.provider == current.provider && state.settings.model == current.model {
                state.settings.enabled = enabled;
            } else {
                debug!("selection changed while persisting, enabled flag not applied");
            }
        });

        let message = if enabled {
            "AI formatting enabled"
        } else {
            "AI formatting disabled"
        };
        self.notify(Notification::success("AI Formatting", message));
        Ok(())
    }

    /// Make `provider`/`model` the active pair
    ///
    /// `enabled` survives only when `provider` has a credential.
    pub async fn select_model(&self, model: &str, provider: &str) -> Result<()> {
        if model.is_empty() || provider.is_empty() {
            return Err(self.fail(EnhanceError::Validation(
                "Please select a model".to_string(),
            )));
        }

        let current = self.read();
        let has_key = current.key_status.get(provider);
        let enabled = has_key && current.settings.enabled;
        if current.settings.enabled && !enabled {
            info!(provider, "selected provider has no credential, disabling enhancement");
        }

        self.inner
            .backend
            .update_ai_settings(enabled, provider, model)
            .await
            .map_err(|e| self.fail(e))?;

        // the credential may have been removed while persisting
        let revoked = self.commit(|state| {
            let has_key = state.key_status.get(provider);
            state.settings = AiSettings {
                enabled: enabled && has_key,
                provider: provider.to_string(),
                model: model.to_string(),
                has_api_key: has_key,
            };
            enabled && !has_key
        });
        if revoked == Some(true) {
            info!(provider, "credential removed during selection, disabling enhancement");
            if let Err(e) = self.inner.backend.update_ai_settings(false, provider, model).await {
                self.fail(e);
            }
        }
        self.notify(Notification::success("Model Selected", format!("Using {}", model)));
        Ok(())
    }

    /// Store a secret; state follows through the `api-key-saved` event
    pub async fn save_credential(&self, provider: &str, secret: &str) -> Result<()> {
        self.inner
            .credentials
            .set(provider, secret, None)
            .await
            .map_err(|e| self.fail(e))?;
        self.notify(Notification::success("API Key Saved", format!("Saved key for {}", provider)));
        Ok(())
    }

    /// Delete a secret; state follows through the `api-key-removed` event
    pub async fn remove_credential(&self, provider: &str) -> Result<()> {
        self.inner
            .credentials
            .remove(provider)
            .await
            .map_err(|e| self.fail(e))?;
        self.notify(Notification::success("API Key Removed", "API key removed"));
        Ok(())
    }

    /// Replace the enhancement options
    ///
    /// The local copy changes first and is kept even if persisting fails.
    pub async fn update_enhancement_options(&self, options: EnhancementOptions) -> Result<()> {
        let persisted = options.clone();
        self.commit(move |state| state.options = options);

        self.inner
            .backend
            .update_enhancement_options(&persisted)
            .await
            .map_err(|e| {
                warn!("Enhancement options diverge from backend until next load");
                self.fail(e)
            })?;
        self.notify(Notification::success("Enhancement Options", "Enhancement options saved"));
        Ok(())
    }

    /// Read the local endpoint config from the backend
    pub async fn load_endpoint_config(&self) -> Result<ProviderEndpointConfig> {
        let config = self.inner.backend.get_openai_config().await?;
        debug!(base_url = %config.base_url, port = config.port(), "local endpoint config");
        let published = config.clone();
        self.commit(move |state| state.endpoint = Some(published));
        Ok(config)
    }

    fn local_endpoint(&self, port: u16, model: &str) -> Result<ProviderEndpointConfig> {
        if model.trim().is_empty() {
            return Err(EnhanceError::Validation("Please enter a model name".to_string()));
        }
        if port == 0 {
            return Err(EnhanceError::Validation("Port must be between 1 and 65535".to_string()));
        }
        Ok(ProviderEndpointConfig::local(&self.inner.probe_host, port))
    }

    /// Probe a local endpoint without persisting anything
    pub async fn test_local_endpoint(&self, port: u16, model: &str) -> Result<ProbeResult> {
        let config = self.local_endpoint(port, model).map_err(|e| self.fail(e))?;
        Ok(self
            .inner
            .probe
            .test(&config.base_url, model.trim(), config.no_auth)
            .await)
    }

    /// Run the probe against an arbitrary endpoint
    pub async fn probe(&self, base_url: &str, model: &str, no_auth: bool) -> ProbeResult {
        self.inner.probe.test(base_url, model, no_auth).await
    }

    /// Store a no-auth local endpoint and make it the enabled selection
    pub async fn configure_local_endpoint(&self, port: u16, model: &str) -> Result<()> {
        let config = self.local_endpoint(port, model).map_err(|e| self.fail(e))?;
        let model = model.trim();
        let provider = self
            .inner
            .catalog
            .local_provider()
            .map(|provider| provider.id.clone())
            .ok_or_else(|| {
                self.fail(EnhanceError::Validation(
                    "No local provider is configured".to_string(),
                ))
            })?;

        self.inner
            .credentials
            .set(&provider, "", Some(config.clone()))
            .await
            .map_err(|e| self.fail(e))?;
        self.inner
            .backend
            .update_ai_settings(true, &provider, model)
            .await
            .map_err(|e| self.fail(e))?;

        info!(provider = %provider, model, base_url = %config.base_url, "local endpoint configured");
        let selection = AiSettings {
            enabled: true,
            provider: provider.clone(),
            model: model.to_string(),
            has_api_key: true,
        };
        self.commit(|state| {
            state.key_status.set(provider, true);
            state.settings = selection;
            state.endpoint = Some(config);
        });
        self.notify(Notification::success(
            "Ollama Configured",
            format!("Using {} on the local server", model),
        ));
        Ok(())
    }

    /// Apply one backend event
    pub async fn handle_event(&self, event: BackendEvent) {
        if !self.is_alive() {
            return;
        }
        if event == BackendEvent::AiReady && !self.inner.latch.is_done() {
            debug!("ai-ready before settings are loaded, ignored");
            return;
        }

        debug!(event = event.name(), "handling backend event");
        let Some(effects) = self.commit(|state| {
            let Reduction { state: next, effects } = reduce(state, &event);
            *state = next;
            effects
        }) else {
            return;
        };

        for effect in effects {
            self.run_effect(effect).await;
        }
    }

    async fn run_effect(&self, effect: Effect) {
        let inner = &self.inner;
        match effect {
            Effect::RefreshSettings => match inner.backend.get_ai_settings().await {
                Ok(backend) => {
                    self.commit(|state| {
                        state.settings = derive_settings(&inner.catalog, &state.key_status, backend);
                    });
                }
                Err(e) => warn!("Failed to refresh AI settings: {}", e),
            },
            Effect::RederiveFromBackend => match inner.backend.get_ai_settings().await {
                Ok(backend) => {
                    let ready =
                        backend.has_api_key || inner.readiness.is_ready(&backend.provider);
                    self.commit(|state| {
                        apply_readiness(&mut state.key_status, &backend.provider, ready);
                        state.settings = derive_settings(&inner.catalog, &state.key_status, backend);
                    });
                }
                Err(e) => warn!("Failed to re-derive AI settings: {}", e),
            },
            Effect::Persist(settings) => {
                if let Err(e) = inner
                    .backend
                    .update_ai_settings(settings.enabled, &settings.provider, &settings.model)
                    .await
                {
                    self.fail(e);
                }
            }
            Effect::Notify(notification) => self.notify(notification),
        }
    }

    /// Consume `events` on a background task until the subscription is dropped
    ///
    /// Dropping the subscription stops receiving; an event already being
    /// handled runs to completion.
    pub fn attach(&self, events: &EventBus) -> EventSubscription {
        let mut rx = events.subscribe();
        let controller = self.clone();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    received = rx.recv() => received,
                };
                match received {
                    Ok(event) => controller.handle_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event consumer lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("event consumer stopped");
        });
        EventSubscription::new(handle, token)
    }

    /// Handle every event already queued on `rx`; returns how many ran
    pub async fn drain_events(&self, rx: &mut broadcast::Receiver<BackendEvent>) -> usize {
        let mut handled = 0;
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event).await;
                    handled += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event queue lagged, events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        handled
    }
}
