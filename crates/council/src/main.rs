use std::io::Read;

use anyhow::{Context, Result};
use clap::Parser;
use council::agents::claude_cli::check_cli_available;
use council::ledger::SessionLedger;
use council::models::session::SessionOutcome;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "council", about = "Multi-agent crypto portfolio council")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/council.toml")]
    config: String,

    /// Read the PortfolioSnapshot JSON from a file instead of stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// JSON file describing the event that triggered this session
    #[arg(long, value_name = "FILE")]
    event: Option<String>,

    /// Print the N most recent ledger entries and exit
    #[arg(long, value_name = "N")]
    history: Option<usize>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays a single JSON document
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = council::load_config(&cli.config)?;

    if let Some(limit) = cli.history {
        let ledger = council::open_ledger(&config.ledger)?;
        let records = ledger.recent(limit).context("Failed to read ledger")?;
        print_json(&records, cli.pretty)?;
        return Ok(());
    }

    let snapshot_json = if let Some(input_path) = &cli.input {
        std::fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read input: {input_path}"))?
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };
    let snapshot = council::parse_snapshot(&snapshot_json);
    let event = cli.event.as_deref().map(council::load_event).transpose()?;

    for program in council::specialist_programs(&config) {
        if !check_cli_available(&program).await {
            warn!(
                program = %program,
                "Specialist CLI not available; the mandatory news call will fail and the session will abort"
            );
        }
    }

    let orchestrator =
        council::build_orchestrator(&config).context("Failed to build orchestrator")?;
    let record = orchestrator.run_session_with_event(snapshot, event).await;
    info!(session_id = %record.session_id, outcome = ?record.outcome, "Session recorded");

    print_json(&record, cli.pretty)?;

    if record.outcome == SessionOutcome::Aborted {
        std::process::exit(2);
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}
