//! Connectivity probe for locally hosted endpoints
//!
//! Sends one validation request through the settings backend and turns the
//! outcome into something a user can act on. Probing never persists anything;
//! the caller decides what to do with a successful result.

use crate::ai::openai::EndpointError;
use crate::error::EnhanceError;
use crate::store::SettingsBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Message shown after a successful probe
pub const REACHABLE_MESSAGE: &str = "Connected to Ollama successfully!";

/// Message shown when nothing is listening on the endpoint
pub const CONNECTION_REFUSED_MESSAGE: &str =
    "Cannot connect to Ollama. Make sure Ollama is running (ollama serve)";

/// Outcome category of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeClassification {
    Reachable,
    ConnectionRefused,
    ModelNotFound,
    Other,
}

/// Result of probing an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub ok: bool,
    pub classification: ProbeClassification,
    pub message: String,
}

impl ProbeResult {
    pub fn reachable() -> Self {
        Self {
            ok: true,
            classification: ProbeClassification::Reachable,
            message: REACHABLE_MESSAGE.to_string(),
        }
    }

    /// `Ok` for a reachable endpoint, otherwise a `Connectivity` error
    pub fn into_result(self) -> Result<Self, EnhanceError> {
        if self.ok {
            Ok(self)
        } else {
            Err(EnhanceError::Connectivity {
                classification: self.classification,
                message: self.message,
            })
        }
    }
}

/// Map a failed validation request to a probe result
///
/// Checked in order: refused connection, missing model, anything else.
pub fn classify(error: &EndpointError, model: &str) -> ProbeResult {
    let text = error.message.as_str();

    if text.contains("Connection refused") || text.contains("error sending request") {
        return ProbeResult {
            ok: false,
            classification: ProbeClassification::ConnectionRefused,
            message: CONNECTION_REFUSED_MESSAGE.to_string(),
        };
    }

    if error.status == Some(404) || text.contains("404") || text.contains("not found") {
        return ProbeResult {
            ok: false,
            classification: ProbeClassification::ModelNotFound,
            message: format!("Model \"{}\" not found. Run: ollama pull {}", model, model),
        };
    }

    ProbeResult {
        ok: false,
        classification: ProbeClassification::Other,
        message: text.to_string(),
    }
}

/// Read-only reachability check against a configured endpoint
#[derive(Clone)]
pub struct ConnectivityProbe {
    backend: Arc<dyn SettingsBackend>,
}

impl ConnectivityProbe {
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Self {
        Self { backend }
    }

    /// Issue one minimal request to `base_url` and classify the outcome
    pub async fn test(&self, base_url: &str, model: &str, no_auth: bool) -> ProbeResult {
        debug!(base_url, model, no_auth, "probing endpoint");
        let result = match self.backend.test_openai_endpoint(base_url, model, no_auth).await {
            Ok(()) => ProbeResult::reachable(),
            Err(err) => classify(&err, model),
        };
        info!(
            base_url,
            model,
            classification = ?result.classification,
            "endpoint probe finished"
        );
        result
    }
}
