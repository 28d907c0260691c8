//! Application settings loaded from config file

use crate::ai::provider::{ProviderCatalog, ProviderDescriptor};
use crate::settings::DEFAULT_LOCAL_PORT;
use crate::store::keyring::DEFAULT_KEYRING_SERVICE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "enhance-settings";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Credential store settings
    #[serde(default)]
    pub keyring: KeyringConfig,
    /// Settings backend location
    #[serde(default)]
    pub backend: BackendConfig,
    /// Local endpoint probe settings
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Log filter
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Providers appended to the built-in catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderDescriptor>,
}

/// Credential store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyringConfig {
    /// Keychain service name the secrets are filed under
    #[serde(default = "default_service")]
    pub service: String,
}

fn default_service() -> String {
    DEFAULT_KEYRING_SERVICE.to_string()
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
        }
    }
}

/// Settings backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Settings file (defaults to ai_settings.toml next to the config)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Port used when none is given
    #[serde(default = "default_port")]
    pub default_port: u16,
    /// Host the local server listens on
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_port() -> u16 {
    DEFAULT_LOCAL_PORT
}

fn default_host() -> String {
    "localhost".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            default_port: default_port(),
            host: default_host(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by RUST_LOG
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "enhance_settings=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// Looks for config at:
    /// 1. ~/.config/enhance-settings/config.toml
    /// 2. Creates default config if not found
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_or_create(&config_path)
    }

    /// Load `path`, writing a default config there first if it is missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            tracing::info!("Created default config at {:?}", path);
            Ok(config)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, &contents)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default config file path
    ///
    /// Priority:
    /// 1. $XDG_CONFIG_HOME/enhance-settings/config.toml
    /// 2. ~/.config/enhance-settings/config.toml
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    fn config_dir() -> Result<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            Ok(PathBuf::from(xdg_config).join(APP_DIR))
        } else {
            let home = dirs::home_dir().context("Could not determine home directory")?;
            Ok(home.join(".config").join(APP_DIR))
        }
    }

    /// Settings backend file; relative to `config_path` unless configured
    pub fn settings_path(&self, config_path: &Path) -> PathBuf {
        match &self.backend.path {
            Some(path) => path.clone(),
            None => config_path
                .parent()
                .map(|dir| dir.join("ai_settings.toml"))
                .unwrap_or_else(|| PathBuf::from("ai_settings.toml")),
        }
    }

    /// Built-in providers plus the configured ones
    pub fn catalog(&self) -> ProviderCatalog {
        let mut catalog = ProviderCatalog::builtin();
        catalog.extend(self.providers.iter().cloned());
        catalog
    }
}
