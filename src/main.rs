//! cadence - Trigger surface for the follow-up engine
//!
//! Each invocation runs exactly one scheduling pass and prints the batch
//! summary as JSON. Exit codes follow the HTTP-style result codes of the
//! engine: 0 for a processed batch (200), 2 for bad input (400), 1 for a
//! fatal failure (500).

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;

use cadence::providers::templates::PlaceholderRenderer;
use cadence::providers::transport::HttpTransport;
use cadence::services::{
    BatchSummary, DispatchOptions, DispatchService, PassOptions, SchedulerService, TimeSlot,
};
use cadence::storage::{Database, SqliteStore};

const USAGE: &str = "\
Usage: cadence <command> [options]

Commands:
  schedule             Run one continuous-scheduling pass
  dispatch <slot>      Send eligible follow-ups for a slot (morning|midday|afternoon)
  send-due             Deliver scheduled follow-ups whose time has arrived

Options:
  --db <path>          SQLite database path (default: cadence.db)
  --recipient <addr>   Narrow the candidate list to one recipient
  --source <tag>       Trace tag echoed into logs
";

enum Command {
    Schedule,
    Dispatch(TimeSlot),
    SendDue,
}

struct Args {
    command: Command,
    db_path: String,
    recipient: Option<String>,
    source: Option<String>,
}

fn parse_args(mut args: std::env::Args) -> Result<Args, String> {
    args.next(); // program name

    let command = match args.next().as_deref() {
        Some("schedule") => Command::Schedule,
        Some("dispatch") => {
            let slot = args
                .next()
                .ok_or_else(|| "dispatch requires a slot".to_string())?;
            Command::Dispatch(slot.parse()?)
        }
        Some("send-due") => Command::SendDue,
        Some(other) => return Err(format!("unknown command: {other}")),
        None => return Err("missing command".to_string()),
    };

    let mut parsed = Args {
        command,
        db_path: "cadence.db".to_string(),
        recipient: None,
        source: None,
    };

    while let Some(flag) = args.next() {
        let mut value = || {
            args.next()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag.as_str() {
            "--db" => parsed.db_path = value()?,
            "--recipient" => parsed.recipient = Some(value()?),
            "--source" => parsed.source = Some(value()?),
            other => return Err(format!("unknown option: {other}")),
        }
    }

    Ok(parsed)
}

async fn run(args: Args) -> anyhow::Result<BatchSummary> {
    let db = Database::open(&args.db_path).await?;
    let store = Arc::new(SqliteStore::new(db));
    let now = Utc::now();

    let summary = match args.command {
        Command::Schedule => {
            let scheduler = SchedulerService::new(store, PlaceholderRenderer);
            let options = PassOptions {
                recipient: args.recipient,
                source: args.source,
            };
            scheduler.run_pass(&options, now).await?
        }
        Command::Dispatch(slot) => {
            let transport = HttpTransport::from_env()?;
            let dispatcher = DispatchService::new(store, PlaceholderRenderer, transport);
            let options = DispatchOptions {
                slot,
                source: args.source,
                recipient: args.recipient,
            };
            dispatcher.run_slot(&options, now).await?
        }
        Command::SendDue => {
            let transport = HttpTransport::from_env()?;
            let scheduler = SchedulerService::new(store, PlaceholderRenderer);
            scheduler.send_due_attempts(&transport, now).await?
        }
    };

    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = match parse_args(std::env::args()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(summary) => {
            tracing::info!(status = summary.http_status(), "pass complete");
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).unwrap_or_default()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("pass failed: {e}");
            let summary = BatchSummary {
                success: false,
                emails_analyzed: 0,
                emails_eligible: 0,
                followups_scheduled: 0,
                followups_sent: 0,
                followups_failed: 0,
                errors: vec![e.to_string()],
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).unwrap_or_default()
            );
            ExitCode::FAILURE
        }
    }
}
