//! Replay a finished call leg against a directory snapshot
//!
//! Usage:
//!   deskcall-replay --transcript call.txt --directory employees.json --assignee alice
//!   deskcall-replay -t call.json -d employees.json -a carla --previous alice --previous bob
//!   deskcall-replay -t call.txt -d employees.json -a alice --config redirect.toml --json-logs
//!
//! Prints the resulting ticket mutation (and transfer command, if any) as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use tracing::Level;

use deskcall_redirect_engine::logging::{log_welcome, parse_log_level, setup_logging, LoggingConfig};
use deskcall_redirect_engine::prelude::*;

#[derive(Parser)]
#[command(name = "deskcall-replay")]
#[command(about = "Replay a call transcript through the redirect engine")]
struct Args {
    /// Transcript file: plain text, or a JSON payload / list of turns
    #[arg(short = 't', long)]
    transcript: PathBuf,

    /// JSON array of employee records
    #[arg(short = 'd', long)]
    directory: PathBuf,

    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Employee the call leg was held with
    #[arg(short = 'a', long)]
    assignee: String,

    /// Earlier assignees of the ticket, oldest first
    #[arg(long = "previous")]
    previous: Vec<String>,

    /// Ticket identifier
    #[arg(long, default_value = "replay-ticket")]
    ticket: String,

    /// Redirect budget, overriding the configuration
    #[arg(long)]
    max_redirects: Option<u32>,

    /// SQLite database for ticket state (in memory when omitted)
    #[arg(long)]
    database: Option<String>,

    /// Log level, overriding the configuration
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn load_transcript(path: &PathBuf) -> Result<Transcript> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading transcript {}", path.display()))?;
    let looks_like_json = path.extension().is_some_and(|ext| ext == "json")
        || matches!(raw.trim_start().chars().next(), Some('{') | Some('['));
    if looks_like_json {
        if let Ok(value) = serde_json::from_str::<Value>(&raw) {
            return Ok(Transcript::from_json(&value));
        }
    }
    Ok(Transcript::from_text(raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RedirectEngineConfig::from_file(path)?,
        None => RedirectEngineConfig::default(),
    };

    let mut logging = LoggingConfig::from_section(&config.logging, "deskcall-replay")?;
    if let Some(level) = &args.log_level {
        logging.level = parse_log_level(level)?;
    } else if std::env::var_os("RUST_LOG").is_none() && config.logging.level == "info" {
        // keep stdout readable unless asked for more
        logging.level = Level::WARN;
    }
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(&logging)?;
    log_welcome("deskcall-replay", env!("CARGO_PKG_VERSION"));

    let transcript = load_transcript(&args.transcript)?;
    if transcript.is_empty() {
        bail!("transcript {} is empty", args.transcript.display());
    }
    let directory_json = std::fs::read_to_string(&args.directory)
        .with_context(|| format!("reading directory {}", args.directory.display()))?;
    let directory = InMemoryDirectory::from_json_str(&directory_json)?;

    let max_redirects = args
        .max_redirects
        .unwrap_or(config.redirect.default_max_redirects);
    let transfers = RecordingTransferSink::new();
    let mut builder = RedirectEngine::builder()
        .with_config(config)
        .with_directory(Arc::new(directory))
        .with_transfer_sink(Arc::new(transfers.clone()));
    if let Some(path) = &args.database {
        builder = builder.with_database_path(path.clone());
    }
    let engine = builder.build().await?;

    // rebuild the ticket's redirect history from the assignee chain
    let ticket_id = TicketId::from(args.ticket.as_str());
    let mut chain = args.previous.iter().chain(std::iter::once(&args.assignee));
    let first = chain.next().context("assignee chain is empty")?;
    let mut state = TicketRedirectState::new(ticket_id.clone(), first.as_str(), max_redirects);
    for next in chain {
        state.record_redirect(next.as_str(), "replayed history")?;
    }
    engine.coordinator().store().insert(state).await?;

    let call = engine.start_call(&ticket_id).await?;
    let outcome = engine.finalize(&call, &transcript).await?;

    let escalation = match &outcome {
        CompletionOutcome::Redirected(redirect) => redirect.escalation().map(|e| e.to_string()),
        _ => None,
    };
    let report = json!({
        "phase": outcome.phase(),
        "escalation": escalation,
        "outcome": outcome,
        "transfers": transfers.commands(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
