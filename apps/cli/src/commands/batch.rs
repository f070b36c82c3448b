//! Batch command implementation.

use super::{build_service, interrupt_token, load_config};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use transbridge_core::{BatchTranslator, TranslateRequest};

/// One entry of a batch file.
#[derive(Debug, Deserialize)]
struct BatchItem {
    text: String,
    #[serde(default)]
    source_lang: String,
    target_lang: String,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_template: Option<String>,
}

impl From<BatchItem> for TranslateRequest {
    fn from(item: BatchItem) -> Self {
        let mut request = TranslateRequest::new(item.text, item.source_lang, item.target_lang);
        request.provider = item.provider;
        request.model = item.model;
        request.prompt_template = item.prompt_template;
        request
    }
}

/// Execute the batch command.
///
/// Prints a JSON array with one object per input item, in input order.
pub async fn execute(config_path: &Path, file: &Path, concurrency: Option<usize>) -> Result<()> {
    let config = load_config(config_path)?;

    let content =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read batch file {}", file.display()))?;
    let items: Vec<BatchItem> =
        serde_json::from_str(&content).with_context(|| format!("Invalid batch file {}", file.display()))?;

    let service = Arc::new(build_service(&config).await?);
    let batch = BatchTranslator::new(Arc::clone(&service), concurrency.unwrap_or(config.batch.concurrency));

    let requests = items.into_iter().map(TranslateRequest::from).collect();
    let results = batch.translate_all(&interrupt_token(), requests).await;
    service.close().await;

    let output: Vec<_> = results
        .into_iter()
        .map(|result| match result {
            Ok(outcome) => json!({
                "text": outcome.text,
                "cache_hit": outcome.cache_hit,
                "provider": outcome.backend.provider,
                "model": outcome.backend.model,
            }),
            Err(e) => json!({ "error": e.to_string() }),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
