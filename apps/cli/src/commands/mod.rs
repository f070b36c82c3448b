//! Command implementations for the Transbridge CLI.

pub mod batch;
pub mod models;
pub mod translate;

use anyhow::{Context, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use transbridge_core::{AppConfig, TranslationService};
use transbridge_models::BackendFactory;

/// Loads and validates the configuration file.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load(path).with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Builds the translation service described by the configuration.
pub async fn build_service(config: &AppConfig) -> Result<TranslationService> {
    config
        .build_service(&BackendFactory::default())
        .await
        .context("Failed to initialize translation service")
}

/// A token cancelled when the process receives Ctrl-C.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}
