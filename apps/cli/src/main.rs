//! Transbridge CLI - command-line front end for the translation gateway
//!
//! This CLI provides a `transbridge` command that loads the gateway
//! configuration, builds the translation service and runs single, batch or
//! listing requests against it.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, models, translate};

/// Transbridge - translation gateway over interchangeable LLM backends
#[derive(Parser, Debug)]
#[command(
    name = "transbridge",
    author,
    version,
    about = "Transbridge - translation gateway over LLM backends",
    long_about = "Transbridge routes translation requests to configured LLM backends,\ncaching results and recording per-request telemetry."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Configuration file
    #[arg(short, long, default_value = "transbridge.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a single text
    ///
    /// Serves the translation from cache when possible, otherwise calls the
    /// requested backend (or a weighted random one).
    Translate {
        /// Text to translate
        text: String,

        /// Source language code (empty lets the model detect it)
        #[arg(short, long, default_value = "")]
        from: String,

        /// Target language code
        #[arg(short, long)]
        to: String,

        /// Provider of the backend to use
        #[arg(long)]
        provider: Option<String>,

        /// Model of the backend to use
        #[arg(long)]
        model: Option<String>,

        /// Prompt template overriding the configured one
        #[arg(long)]
        template: Option<String>,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Translate every item of a JSON batch file
    ///
    /// The file holds an array of objects with `text`, `source_lang`,
    /// `target_lang` and optional `provider`, `model` and `prompt_template`.
    Batch {
        /// Path to the batch file
        file: PathBuf,

        /// Maximum concurrent translations (overrides the configuration)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// List configured models
    Models {
        /// Only list models of this provider
        #[arg(long)]
        provider: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Translate { text, from, to, provider, model, template, json } => {
            let options = translate::TranslateOptions { text, from, to, provider, model, template, json };
            translate::execute(&args.config, options).await?;
        }
        Command::Batch { file, concurrency } => {
            batch::execute(&args.config, &file, concurrency).await?;
        }
        Command::Models { provider, json } => {
            models::execute(&args.config, provider.as_deref(), json)?;
        }
    }

    Ok(())
}
