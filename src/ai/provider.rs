//! Provider catalog
//!
//! Lists the enhancement backends the controller knows about. Key status is
//! tracked for every entry, and auto-selection picks the entry's default model.

use serde::{Deserialize, Serialize};

/// Provider id of the OpenAI-compatible local server (Ollama)
pub const LOCAL_PROVIDER_ID: &str = "openai";

/// Model suggested for a fresh Ollama install
pub const DEFAULT_LOCAL_MODEL: &str = "qwen2.5:3b";

/// How a provider proves it is usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Locally hosted endpoint; the backend reports whether it is configured
    LocalEndpoint,
    /// Needs a secret in the credential store
    ApiKey,
}

/// One entry of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Provider id as stored by the settings backend
    pub id: String,
    /// Display name
    pub name: String,
    pub kind: ProviderKind,
    /// Model selected when this provider is auto-selected
    pub default_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Ordered set of known providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCatalog {
    providers: Vec<ProviderDescriptor>,
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProviderCatalog {
    /// Build a catalog; later duplicates of an id are ignored
    pub fn new(providers: impl IntoIterator<Item = ProviderDescriptor>) -> Self {
        let mut catalog = Self {
            providers: Vec::new(),
        };
        catalog.extend(providers);
        catalog
    }

    /// The local Ollama provider only
    pub fn builtin() -> Self {
        Self::new([ProviderDescriptor {
            id: LOCAL_PROVIDER_ID.to_string(),
            name: "Ollama (Local)".to_string(),
            kind: ProviderKind::LocalEndpoint,
            default_model: DEFAULT_LOCAL_MODEL.to_string(),
            description: Some("Run AI locally - no API key or internet needed".to_string()),
        }])
    }

    /// Append providers whose id is not known yet
    pub fn extend(&mut self, providers: impl IntoIterator<Item = ProviderDescriptor>) {
        for provider in providers {
            if self.get(&provider.id).is_some() {
                tracing::warn!(provider = %provider.id, "duplicate provider in catalog ignored");
                continue;
            }
            self.providers.push(provider);
        }
    }

    pub fn get(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|provider| provider.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|provider| provider.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers.iter()
    }

    /// Whether `id` names a locally hosted endpoint
    pub fn is_local_endpoint(&self, id: &str) -> bool {
        self.get(id)
            .map(|provider| provider.kind == ProviderKind::LocalEndpoint)
            .unwrap_or(false)
    }

    /// First locally hosted provider, if any
    pub fn local_provider(&self) -> Option<&ProviderDescriptor> {
        self.providers
            .iter()
            .find(|provider| provider.kind == ProviderKind::LocalEndpoint)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_key_provider(id: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            id: id.to_string(),
            name: id.to_uppercase(),
            kind: ProviderKind::ApiKey,
            default_model: format!("{}-model", id),
            description: None,
        }
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = ProviderCatalog::builtin();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.is_local_endpoint(LOCAL_PROVIDER_ID));
        assert_eq!(
            catalog.local_provider().map(|p| p.default_model.as_str()),
            Some(DEFAULT_LOCAL_MODEL)
        );
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut duplicate = api_key_provider("a");
        duplicate.default_model = "other".to_string();
        let catalog = ProviderCatalog::new([api_key_provider("a"), duplicate, api_key_provider("b")]);
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(catalog.get("a").unwrap().default_model, "a-model");
    }

    #[test]
    fn test_unknown_provider_is_not_local() {
        let catalog = ProviderCatalog::new([api_key_provider("a")]);
        assert!(!catalog.is_local_endpoint("a"));
        assert!(!catalog.is_local_endpoint("missing"));
        assert!(catalog.local_provider().is_none());
    }

    #[test]
    fn test_descriptor_from_toml() {
        let toml_str = r#"
id = "groq"
name = "Groq"
kind = "api_key"
default_model = "llama-3.1-8b-instant"
"#;
        let provider: ProviderDescriptor = toml::from_str(toml_str).unwrap();
        assert_eq!(provider.kind, ProviderKind::ApiKey);
        assert!(provider.description.is_none());
    }
}
