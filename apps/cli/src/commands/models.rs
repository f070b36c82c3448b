//! Models command implementation.

use super::load_config;
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::Path;
use transbridge_models::{BackendFactory, ModelRegistry};

/// Execute the models command.
pub fn execute(config_path: &Path, provider: Option<&str>, json_output: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = ModelRegistry::build(&config.providers, &BackendFactory::default())
        .context("Failed to initialize model registry")?;

    let models: Vec<_> = registry
        .list_all()
        .into_iter()
        .filter(|identity| provider.is_none_or(|p| identity.provider == p))
        .collect();
    let default = registry.get_default().identity().clone();

    if json_output {
        let list: Vec<_> = models
            .iter()
            .map(|identity| {
                json!({
                    "provider": identity.provider,
                    "model": identity.model,
                    "api_url": identity.api_url,
                    "is_default": *identity == default,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    if models.is_empty() {
        println!("{}", "No models configured.".yellow());
        return Ok(());
    }

    println!("{}", format!("Configured models ({})", models.len()).bold().cyan());
    for identity in &models {
        let marker = if *identity == default { " (default)".green().to_string() } else { String::new() };
        println!("  {}{}  {}", identity.to_string().bold(), marker, identity.api_url.dimmed());
    }

    Ok(())
}
