//! Translate command implementation.

use super::{build_service, interrupt_token, load_config};
use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use std::path::Path;
use transbridge_core::TranslateRequest;

/// Arguments of the translate command.
#[derive(Debug)]
pub struct TranslateOptions {
    pub text: String,
    pub from: String,
    pub to: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub template: Option<String>,
    pub json: bool,
}

/// Execute the translate command.
pub async fn execute(config_path: &Path, options: TranslateOptions) -> Result<()> {
    let config = load_config(config_path)?;
    let service = build_service(&config).await?;

    let mut request = TranslateRequest::new(options.text, options.from, options.to);
    request.provider = options.provider;
    request.model = options.model;
    request.prompt_template = options.template;

    let result = service.translate(&interrupt_token(), &request).await;
    service.close().await;
    let outcome = result?;

    if options.json {
        let output = json!({
            "text": outcome.text,
            "cache_hit": outcome.cache_hit,
            "provider": outcome.backend.provider,
            "model": outcome.backend.model,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", outcome.text);
        let source = if outcome.cache_hit { "cache" } else { "backend" };
        eprintln!("{}", format!("via {} ({})", outcome.backend, source).dimmed());
    }

    Ok(())
}
