//! OpenAI-compatible chat completions client
//!
//! Talks to locally hosted servers such as Ollama. The only request sent
//! from this crate is a one-token completion that proves the server is up
//! and the model is installed.

use crate::ai::provider::DEFAULT_LOCAL_MODEL;
use crate::settings::DEFAULT_LOCAL_PORT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

/// Default request timeout for local servers
pub const LOCAL_TIMEOUT_SECS: u64 = 10;

/// Failure of an endpoint call, as raw as the transport reported it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EndpointError {
    /// HTTP status when the server answered
    pub status: Option<u16>,
    pub message: String,
}

impl EndpointError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Server root, e.g. `http://localhost:11434`
    pub base_url: String,
    /// Bearer token; `None` for no-auth servers
    pub api_key: Option<String>,
    /// Model to address (e.g. "qwen2.5:3b")
    pub model: String,
    pub timeout: Duration,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: format!("http://localhost:{}", DEFAULT_LOCAL_PORT),
            api_key: None,
            model: DEFAULT_LOCAL_MODEL.to_string(),
            timeout: Duration::from_secs(LOCAL_TIMEOUT_SECS),
        }
    }
}

/// OpenAI-compatible client
pub struct OpenAiCompatClient {
    client: Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    /// Create a new client
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, EndpointError> {
        // Local servers are never reached through a proxy.
        let client = Client::builder()
            .timeout(config.timeout)
            .no_proxy()
            .build()
            .map_err(|e| EndpointError::transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Get the model name
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Chat completions URL for the configured server
    pub fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Send a one-token completion and check that a choice comes back
    pub async fn ping(&self) -> Result<(), EndpointError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: "ping".to_string(),
            }],
            max_tokens: Some(1),
            temperature: Some(0.0),
            stream: Some(false),
        };

        let mut builder = self.client.post(self.chat_url()).json(&request);
        if let Some(api_key) = self.config.api_key.as_deref().filter(|key| !key.is_empty()) {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EndpointError::transport(error_chain(&e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EndpointError {
                status: Some(status.as_u16()),
                message: format!("API error ({}): {}", status, body),
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| EndpointError::transport(format!("Failed to parse response: {}", e)))?;

        if chat_response.choices.is_empty() {
            return Err(EndpointError::transport("No completion returned"));
        }
        Ok(())
    }
}

/// Render an error with its sources, e.g. "error sending request ...: Connection refused"
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[allow(dead_code)]
    message: Message,
}
