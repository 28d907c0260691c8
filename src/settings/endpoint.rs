//! Non-secret configuration of a locally hosted provider

use serde::{Deserialize, Serialize};
use url::Url;

/// Port Ollama listens on out of the box
pub const DEFAULT_LOCAL_PORT: u16 = 11434;

/// Where a local OpenAI-compatible server lives
///
/// The model is not stored here; it comes from `AiSettings::model`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpointConfig {
    pub base_url: String,
    #[serde(default)]
    pub no_auth: bool,
}

impl Default for ProviderEndpointConfig {
    fn default() -> Self {
        Self::local("localhost", DEFAULT_LOCAL_PORT)
    }
}

impl ProviderEndpointConfig {
    /// No-auth endpoint on `http://<host>:<port>`
    pub fn local(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{}", host, port),
            no_auth: true,
        }
    }

    /// Explicit port of `base_url`, or the Ollama default
    pub fn port(&self) -> u16 {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|url| url.port())
            .unwrap_or(DEFAULT_LOCAL_PORT)
    }
}
