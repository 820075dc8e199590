#![forbid(unsafe_code)]

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relief_harness::bulk::{
    decode_response, run_bulk, sanitize, BulkOptions, DecodedValue, Prompt, ResponseKind,
};
use relief_harness::gateway::{ChatGateway, ProviderGateway, TracingUsageSink};

#[derive(Parser)]
#[command(name = "relief", version, about = "Bulk LLM extraction over humanitarian evidence")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean raw model output read from stdin
    Sanitize {
        /// Summary output is passed through untouched
        #[arg(long, default_value = "extraction")]
        kind: ResponseKind,
    },
    /// Clean and decode raw model output read from stdin, printing JSON
    Decode {
        #[arg(long)]
        kind: ResponseKind,
    },
    /// Send a batch of prompts and write decoded results in input order
    Run {
        /// JSON array of prompts, each an array of {role, content}
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "gpt-4o")]
        model: String,
        #[arg(long, default_value = "extraction")]
        kind: ResponseKind,
        /// Maximum calls in flight
        #[arg(long, default_value_t = 1)]
        rate_limit: usize,
        /// Per-call timeout
        #[arg(long, default_value_t = 90)]
        timeout_secs: u64,
        #[arg(long)]
        no_progress: bool,
        /// Progress bar label
        #[arg(long)]
        label: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sanitize { kind } => {
            let raw = read_stdin()?;
            if kind.is_structured() {
                println!("{}", sanitize(&raw));
            } else {
                print!("{raw}");
            }
        }
        Commands::Decode { kind } => {
            let raw = read_stdin()?;
            let value = decode_response(&raw, kind).unwrap_or_else(|err| {
                warn!(kind = kind.as_str(), error = %err, "formatting failed; using empty default");
                DecodedValue::Empty(kind)
            });
            println!("{}", serde_json::to_string(&value.to_json())?);
        }
        Commands::Run {
            input,
            out,
            model,
            kind,
            rate_limit,
            timeout_secs,
            no_progress,
            label,
        } => {
            let raw = fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let batch: Vec<Prompt> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing prompts from {}", input.display()))?;

            let gateway: Arc<dyn ChatGateway> =
                Arc::new(ProviderGateway::from_env(Arc::new(TracingUsageSink))?);

            let mut options = BulkOptions::new(model, kind)
                .rate_limit(rate_limit)
                .call_timeout(Duration::from_secs(timeout_secs))
                .caller("relief::run");
            if no_progress {
                options = options.show_progress(false);
            }
            if let Some(label) = label {
                options = options.label(label);
            }

            let outcome = run_bulk(gateway, batch, &options).await?;
            let transport_failures = outcome.transport_failures();
            let decode_failures = outcome.decode_failures();

            let results: Vec<serde_json::Value> = outcome
                .into_results()
                .iter()
                .map(DecodedValue::to_json)
                .collect();
            fs::write(&out, serde_json::to_string_pretty(&results)?)
                .with_context(|| format!("writing {}", out.display()))?;

            info!(
                results = results.len(),
                transport_failures,
                decode_failures,
                out = %out.display(),
                "wrote results"
            );
        }
    }

    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .context("reading stdin")?;
    Ok(raw)
}
