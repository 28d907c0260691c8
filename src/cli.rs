use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use enhance_settings::ai::provider::LOCAL_PROVIDER_ID;
use enhance_settings::config::Config;
use enhance_settings::controller::{ControllerOptions, ReconciliationController};
use enhance_settings::events::{EventBus, Notification};
use enhance_settings::settings::EnhancementPreset;
use enhance_settings::store::{FileSettingsBackend, KeyringCredentialStore};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "enhance-settings")]
#[command(about = "Inspect and change AI text-enhancement settings")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the reconciled settings
    Status,
    /// Turn AI formatting on
    Enable,
    /// Turn AI formatting off
    Disable,
    /// Select the active provider and model
    Select {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        model: String,
    },
    /// Store an API key in the OS keychain
    SetKey {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        secret: String,
    },
    /// Delete an API key from the OS keychain
    RemoveKey {
        #[arg(long)]
        provider: String,
    },
    /// Check that a local server answers for a model
    Probe {
        #[arg(long)]
        model: String,
        /// Port of the local server (config default when omitted)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Use a local server as the enhancement provider
    ConfigureLocal {
        #[arg(long)]
        model: String,
        #[arg(long)]
        port: Option<u16>,
        /// Save without probing first
        #[arg(long)]
        skip_probe: bool,
    },
    /// Change enhancement options
    Options {
        #[arg(long, value_enum)]
        preset: Option<PresetArg>,
        /// Replace the custom vocabulary (repeatable)
        #[arg(long = "vocabulary", value_name = "WORD")]
        vocabulary: Vec<String>,
        #[arg(long)]
        instructions: Option<String>,
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PresetArg {
    Default,
    Prompts,
}

impl From<PresetArg> for EnhancementPreset {
    fn from(preset: PresetArg) -> Self {
        match preset {
            PresetArg::Default => EnhancementPreset::Default,
            PresetArg::Prompts => EnhancementPreset::Prompts,
        }
    }
}

/// Run one command; `Ok(false)` when the operation itself failed
pub async fn run(command: Commands, config: &Config, config_path: &Path) -> Result<bool> {
    let catalog = config.catalog();
    let local_provider = catalog
        .local_provider()
        .map(|provider| provider.id.clone())
        .unwrap_or_else(|| LOCAL_PROVIDER_ID.to_string());

    let events = EventBus::default();
    let settings_path = config.settings_path(config_path);
    let backend = Arc::new(
        FileSettingsBackend::open(&settings_path, local_provider, config.probe.timeout())
            .await
            .with_context(|| format!("Failed to open settings backend at {:?}", settings_path))?
            .with_events(events.clone()),
    );
    let credentials = Arc::new(KeyringCredentialStore::new(
        config.keyring.service.clone(),
        backend.clone(),
        events.clone(),
    ));
    let controller = ReconciliationController::new(
        credentials,
        backend.clone(),
        backend,
        ControllerOptions {
            catalog,
            probe_host: config.probe.host.clone(),
        },
    );

    let mut pending = events.subscribe();
    let mut notifications = controller.notifications();

    let loaded = controller.load().await.is_ok();
    controller.drain_events(&mut pending).await;

    let default_port = config.probe.default_port;
    let ok = match command {
        Commands::Status => loaded,
        Commands::Enable => controller.set_enabled(true).await.is_ok(),
        Commands::Disable => controller.set_enabled(false).await.is_ok(),
        Commands::Select { provider, model } => {
            controller.select_model(&model, &provider).await.is_ok()
        }
        Commands::SetKey { provider, secret } => {
            controller.save_credential(&provider, &secret).await.is_ok()
        }
        Commands::RemoveKey { provider } => controller.remove_credential(&provider).await.is_ok(),
        Commands::Probe { model, port } => {
            match controller
                .test_local_endpoint(port.unwrap_or(default_port), &model)
                .await
            {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    result.ok
                }
                Err(_) => false,
            }
        }
        Commands::ConfigureLocal {
            model,
            port,
            skip_probe,
        } => {
            let port = port.unwrap_or(default_port);
            let reachable = if skip_probe {
                true
            } else {
                match controller.test_local_endpoint(port, &model).await {
                    Ok(result) => {
                        eprintln!("{}", result.message);
                        result.ok
                    }
                    Err(_) => false,
                }
            };
            reachable && controller.configure_local_endpoint(port, &model).await.is_ok()
        }
        Commands::Options {
            preset,
            vocabulary,
            instructions,
            prefix,
        } => {
            let mut options = controller.snapshot().options;
            if let Some(preset) = preset {
                options.preset = preset.into();
            }
            if !vocabulary.is_empty() {
                options.custom_vocabulary = vocabulary;
            }
            if instructions.is_some() {
                options.custom_instructions = instructions;
            }
            if prefix.is_some() {
                options.output_prefix = prefix;
            }
            controller.update_enhancement_options(options).await.is_ok()
        }
    };

    controller.drain_events(&mut pending).await;
    print_notifications(&mut notifications);
    println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);
    controller.shutdown();

    Ok(ok)
}

fn print_notifications(notifications: &mut broadcast::Receiver<Notification>) {
    while let Ok(notification) = notifications.try_recv() {
        let marker = if notification.is_error() { "✗" } else { "✓" };
        eprintln!("{} {}: {}", marker, notification.title, notification.message);
    }
}
