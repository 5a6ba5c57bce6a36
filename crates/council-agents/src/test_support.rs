//! Scripted collaborators for exercising sessions without the Claude CLI.
//!
//! `ScriptedSpecialist` answers every request the same way (a fixed payload,
//! an error, a slow reply or unparseable text) and records what it was asked.
//! `RecordingVenue` captures the instructions it receives.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use council_models::consensus::ConsensusResult;
use council_models::instruction::{ExecutionReport, TradeInstruction};
use council_models::recommendation::{AgentRequest, Direction, RecommendationKind, VetoCategory};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::error::AgentError;
use crate::execution::ExecutionVenue;
use crate::parser::parse_payload;
use crate::specialist::SpecialistAgent;

/// Shared log of specialist names in call order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
pub enum Script {
    Respond(Value),
    Fail(String),
    /// Sleep, then respond.
    Delay(Duration, Value),
    /// Free text that contains no JSON object.
    Garbage(String),
}

pub struct ScriptedSpecialist {
    name: String,
    role: String,
    script: Script,
    requests: Mutex<Vec<AgentRequest>>,
    log: Option<CallLog>,
}

impl ScriptedSpecialist {
    pub fn new(name: &str, role: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
            script,
            requests: Mutex::new(Vec::new()),
            log: None,
        }
    }

    pub fn responding(name: &str, role: &str, payload: Value) -> Self {
        Self::new(name, role, Script::Respond(payload))
    }

    pub fn failing(name: &str, role: &str) -> Self {
        Self::new(name, role, Script::Fail(format!("{name} is unreachable")))
    }

    pub fn delayed(name: &str, role: &str, delay: Duration, payload: Value) -> Self {
        Self::new(name, role, Script::Delay(delay, payload))
    }

    pub fn garbage(name: &str, role: &str) -> Self {
        Self::new(
            name,
            role,
            Script::Garbage("I looked at the charts and I feel good about it.".to_string()),
        )
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Every request this specialist has received.
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SpecialistAgent for ScriptedSpecialist {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> &str {
        &self.role
    }

    async fn evaluate(&self, request: &AgentRequest) -> Result<Value, AgentError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(log) = &self.log {
            if let Ok(mut log) = log.lock() {
                log.push(self.name.clone());
            }
        }

        match &self.script {
            Script::Respond(payload) => Ok(payload.clone()),
            Script::Fail(reason) => Err(AgentError::Cli(reason.clone())),
            Script::Delay(delay, payload) => {
                tokio::time::sleep(*delay).await;
                Ok(payload.clone())
            }
            Script::Garbage(text) => parse_payload(text).map(Value::Object),
        }
    }
}

/// A recommendation payload as a specialist would send it.
pub fn recommendation(
    kind: RecommendationKind,
    direction: Direction,
    asset: &str,
    confidence: Decimal,
) -> Value {
    json!({
        "recommendation_kind": kind,
        "direction": direction,
        "asset": asset,
        "confidence": confidence,
        "veto_category": VetoCategory::None,
        "rationale": format!("scripted {direction:?} on {asset}"),
    })
}

/// The risk specialist's payload carrying `veto`.
pub fn risk_verdict(veto: VetoCategory, direction: Direction, confidence: Decimal) -> Value {
    let mut payload = recommendation(RecommendationKind::Hold, direction, "PORTFOLIO", confidence);
    payload["veto_category"] = json!(veto);
    payload
}

pub fn report() -> Value {
    json!({
        "headline": "Session complete",
        "summary": "scripted report",
        "trades": [],
        "warnings": [],
    })
}

/// Captures everything handed to it. Optionally fails every call.
#[derive(Default)]
pub struct RecordingVenue {
    calls: Mutex<Vec<(Vec<TradeInstruction>, ConsensusResult)>>,
    fail_with: Option<String>,
}

impl RecordingVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(reason.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<(Vec<TradeInstruction>, ConsensusResult)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ExecutionVenue for RecordingVenue {
    fn name(&self) -> &str {
        "recording"
    }

    async fn execute(
        &self,
        instructions: &[TradeInstruction],
        consensus: &ConsensusResult,
    ) -> Result<ExecutionReport, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((instructions.to_vec(), consensus.clone()));
        }
        if let Some(reason) = &self.fail_with {
            return Err(AgentError::Venue(reason.clone()));
        }
        Ok(ExecutionReport {
            venue: self.name().to_string(),
            accepted: true,
            message: format!("recorded {} instruction(s)", instructions.len()),
            order_refs: (0..instructions.len()).map(|i| format!("rec-{i}")).collect(),
        })
    }
}
