use async_trait::async_trait;
use council_models::consensus::ConsensusResult;
use council_models::instruction::{ExecutionReport, TradeInstruction};
use serde::Deserialize;
use tracing::info;

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::extract_json;
use crate::prompts::trader_system_prompt;

/// The only component allowed to act on instructions.
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        instructions: &[TradeInstruction],
        consensus: &ConsensusResult,
    ) -> Result<ExecutionReport, AgentError>;
}

/// Logs instructions and acknowledges them without trading.
#[derive(Debug, Default)]
pub struct DryRunVenue;

#[async_trait]
impl ExecutionVenue for DryRunVenue {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn execute(
        &self,
        instructions: &[TradeInstruction],
        consensus: &ConsensusResult,
    ) -> Result<ExecutionReport, AgentError> {
        for instruction in instructions {
            info!(
                asset = %instruction.asset,
                side = ?instruction.side,
                notional_usd = %instruction.notional_usd,
                quantity = %instruction.quantity,
                stop_loss = ?instruction.stop_loss,
                execution_mode = ?consensus.execution_mode,
                "Dry run: instruction not sent"
            );
        }
        Ok(ExecutionReport {
            venue: self.name().to_string(),
            accepted: true,
            message: format!("dry run: {} instruction(s) logged", instructions.len()),
            order_refs: Vec::new(),
        })
    }
}

/// Hands the instruction list to the trader specialist.
pub struct ClaudeTraderVenue {
    cli_config: ClaudeCliConfig,
}

#[derive(Debug, Deserialize)]
struct TraderAck {
    accepted: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    order_refs: Vec<String>,
}

impl ClaudeTraderVenue {
    pub fn new(cli_config: ClaudeCliConfig) -> Self {
        Self { cli_config }
    }
}

#[async_trait]
impl ExecutionVenue for ClaudeTraderVenue {
    fn name(&self) -> &str {
        "claude_trader"
    }

    async fn execute(
        &self,
        instructions: &[TradeInstruction],
        consensus: &ConsensusResult,
    ) -> Result<ExecutionReport, AgentError> {
        let user_prompt = serde_json::to_string_pretty(&serde_json::json!({
            "instructions": instructions,
            "consensus": consensus,
        }))?;

        let raw = invoke_claude(&trader_system_prompt(), &user_prompt, &self.cli_config).await?;
        let ack: TraderAck = serde_json::from_value(extract_json(&raw)?)
            .map_err(|e| AgentError::Parse(format!("trader acknowledgement: {e}")))?;

        info!(accepted = ack.accepted, orders = ack.order_refs.len(), "Trader acknowledged");
        Ok(ExecutionReport {
            venue: self.name().to_string(),
            accepted: ack.accepted,
            message: ack.message,
            order_refs: ack.order_refs,
        })
    }
}
