//! Portfolio council
//!
//! Runs a session of specialist Claude CLI agents over a two-asset crypto
//! portfolio, reaches a weighted consensus under a risk veto and hands the
//! resulting trade instructions to an execution venue. Every session is
//! appended to a SQLite ledger.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use council::models::portfolio::PortfolioSnapshot;
//! use council::agents::{Orchestrator, SpecialistRoster, DryRunVenue};
//! use council::ledger::{SessionLedger, SqliteLedger};
//! use council::models::config::CouncilConfig;
//! ```

pub use council_agents as agents;
pub use council_ledger as ledger;
pub use council_models as models;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use council_agents::claude_cli::ClaudeCliConfig;
use council_agents::{
    ClaudeSpecialist, ClaudeTraderVenue, DryRunVenue, ExecutionVenue, Orchestrator,
    SpecialistAgent, SpecialistRoster,
};
use council_ledger::SqliteLedger;
use council_models::config::{CouncilConfig, LedgerConfig, VenueKind};
use council_models::portfolio::PortfolioSnapshot;
use tracing::{info, warn};

/// Read, parse and validate a TOML configuration file.
pub fn load_config(path: &str) -> Result<CouncilConfig, anyhow::Error> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {path}"))?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<CouncilConfig, anyhow::Error> {
    let config: CouncilConfig = toml::from_str(raw).context("Failed to parse config")?;
    config.validate().context("Invalid config")?;
    Ok(config)
}

/// Open the ledger file, creating its directory if needed.
pub fn open_ledger(config: &LedgerConfig) -> Result<SqliteLedger, anyhow::Error> {
    if let Some(parent) = Path::new(&config.sqlite_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create ledger directory: {}", parent.display())
            })?;
        }
    }
    SqliteLedger::open(&config.sqlite_path)
        .with_context(|| format!("Failed to open ledger: {}", config.sqlite_path))
}

pub fn build_venue(config: &CouncilConfig) -> Arc<dyn ExecutionVenue> {
    match config.execution.venue {
        VenueKind::DryRun => Arc::new(DryRunVenue),
        VenueKind::ClaudeTrader => {
            let model = config
                .execution
                .trader_model
                .as_deref()
                .unwrap_or(&config.agents.specialist_model);
            let timeout = Duration::from_secs(config.execution.timeout_seconds);
            Arc::new(ClaudeTraderVenue::new(ClaudeCliConfig::new(model, timeout)))
        }
    }
}

/// CLI-backed specialists for every enabled roster entry.
fn claude_specialists(config: &CouncilConfig) -> Vec<ClaudeSpecialist> {
    config
        .agents
        .specialists
        .iter()
        .filter(|s| s.enabled)
        .map(|s| ClaudeSpecialist::from_config(s, &config.agents))
        .collect()
}

/// Executables the assembled roster will spawn, deduplicated.
pub fn specialist_programs(config: &CouncilConfig) -> Vec<String> {
    let mut programs: Vec<String> = claude_specialists(config)
        .into_iter()
        .map(|s| s.cli_config.program)
        .collect();
    programs.sort();
    programs.dedup();
    programs
}

/// Build an Orchestrator from configuration.
pub fn build_orchestrator(config: &CouncilConfig) -> Result<Orchestrator, anyhow::Error> {
    let ledger = open_ledger(&config.ledger)?;

    let specialists: Vec<Arc<dyn SpecialistAgent>> = claude_specialists(config)
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn SpecialistAgent>)
        .collect();
    let roster = SpecialistRoster::assemble(specialists, &config.agents)
        .context("Failed to assemble specialist roster")?;
    let venue = build_venue(config);

    info!(
        specialists = config.agents.specialists.iter().filter(|s| s.enabled).count(),
        venue = %venue.name(),
        ledger = %config.ledger.sqlite_path,
        "Council assembled"
    );
    Ok(Orchestrator::new(
        roster,
        venue,
        Arc::new(ledger),
        config.clone(),
    ))
}

/// Parse snapshot JSON. An unreadable snapshot is not an error here: the
/// session runs without one and records the data fault.
pub fn parse_snapshot(raw: &str) -> Option<PortfolioSnapshot> {
    match serde_json::from_str(raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(error = %e, "Portfolio snapshot could not be parsed");
            None
        }
    }
}

/// Read the JSON event that triggers a session.
pub fn load_event(path: &str) -> Result<serde_json::Value, anyhow::Error> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event: {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in event file: {path}"))
}
