use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::consensus::ConsensusResult;
use crate::exposure::ExposureAssessment;
use crate::instruction::{ExecutionReport, RejectedInstruction, TradeInstruction};
use crate::portfolio::PortfolioSnapshot;
use crate::recommendation::{Phase, Vote};

pub const SESSION_SCHEMA_VERSION: u32 = 2;

/// Everything that can go wrong inside a session. None of these escape the
/// session boundary; they are recorded on the [`SessionRecord`].
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionFault {
    #[error("portfolio data unavailable: {reason}")]
    DataUnavailable { reason: String },

    #[error("mandatory agent {agent} missing in {phase}: {reason}")]
    MandatoryAgentMissing {
        agent: String,
        phase: Phase,
        reason: String,
    },

    #[error("agent {agent} abstained: {reason}")]
    OptionalAgentAbstain { agent: String, reason: String },

    #[error("instruction for {asset} failed validation: {reason}")]
    SynthesisValidationFailure { asset: String, reason: String },

    #[error("execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("ledger unavailable: {reason}")]
    LedgerUnavailable { reason: String },
}

impl SessionFault {
    /// Faults that stop trading for the rest of the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionFault::DataUnavailable { .. } | SessionFault::MandatoryAgentMissing { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub detail: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Responded,
    Failed,
    TimedOut,
}

/// One collaborator call: a specialist or the execution venue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentActivity {
    pub agent: String,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub status: ActivityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Instructions were handed to the execution collaborator.
    Executed,
    /// Session completed without trading.
    NoTrade,
    /// The risk specialist's verdict stopped the trade.
    VetoBlocked,
    /// A fatal fault stopped the session before consensus.
    Aborted,
}

/// Append-only audit entry, written to the ledger once per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub schema_version: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// External event that triggered the session, passed through verbatim.
    #[serde(default)]
    pub event: Option<serde_json::Value>,
    pub snapshot: Option<PortfolioSnapshot>,
    pub exposure: Option<ExposureAssessment>,
    /// All votes including the P0 context entry.
    pub recommendations: Vec<Vote>,
    pub consensus: Option<ConsensusResult>,
    /// `None` when no synthesis was attempted.
    pub instructions: Option<Vec<TradeInstruction>>,
    pub rejected_instructions: Vec<RejectedInstruction>,
    pub execution: Option<ExecutionReport>,
    /// Raw output of the P5 reporter.
    pub report: Option<serde_json::Value>,
    pub phases: Vec<PhaseOutcome>,
    /// Every specialist and venue call in the order it settled.
    #[serde(default)]
    pub agent_activity: Vec<AgentActivity>,
    pub errors: Vec<SessionFault>,
    pub outcome: SessionOutcome,
    pub reason: String,
}

impl SessionRecord {
    /// A blank record for a session that has just started.
    pub fn open(session_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            schema_version: SESSION_SCHEMA_VERSION,
            started_at,
            finished_at: None,
            event: None,
            snapshot: None,
            exposure: None,
            recommendations: Vec::new(),
            consensus: None,
            instructions: None,
            rejected_instructions: Vec::new(),
            execution: None,
            report: None,
            phases: Vec::new(),
            agent_activity: Vec::new(),
            errors: Vec::new(),
            outcome: SessionOutcome::Aborted,
            reason: String::new(),
        }
    }

    pub fn phase_outcome(&self, phase: Phase) -> Option<&PhaseOutcome> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    pub fn has_fatal_fault(&self) -> bool {
        self.errors.iter().any(SessionFault::is_fatal)
    }

    pub fn activity_of(&self, agent: &str) -> Option<&AgentActivity> {
        self.agent_activity.iter().find(|a| a.agent == agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_serialization_is_tagged() {
        let fault = SessionFault::MandatoryAgentMissing {
            agent: "news-analyst".to_string(),
            phase: Phase::News,
            reason: "Agent timed out after 45 seconds".to_string(),
        };
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(json["kind"], "mandatory_agent_missing");
        assert_eq!(json["phase"], "news");
        assert!(fault.is_fatal());
        assert_eq!(
            fault.to_string(),
            "mandatory agent news-analyst missing in P0: Agent timed out after 45 seconds"
        );
    }

    #[test]
    fn abstain_is_not_fatal() {
        let fault = SessionFault::OptionalAgentAbstain {
            agent: "data-analyst".to_string(),
            reason: "confidence out of range".to_string(),
        };
        assert!(!fault.is_fatal());
    }

    #[test]
    fn roundtrip_open_record() {
        let mut record = SessionRecord::open(Uuid::new_v4(), Utc::now());
        record.errors.push(SessionFault::DataUnavailable {
            reason: "total value is zero".to_string(),
        });
        record.phases.push(PhaseOutcome {
            phase: Phase::Exposure,
            status: PhaseStatus::Failed,
            detail: "total value is zero".to_string(),
            elapsed_ms: 0,
        });
        record.reason = "Aborted: portfolio data unavailable".to_string();
        record.event = Some(serde_json::json!({"type": "price_drop", "asset": "BTC"}));
        record.agent_activity.push(AgentActivity {
            agent: "news-analyst".to_string(),
            phase: Phase::News,
            started_at: record.started_at,
            finished_at: record.started_at,
            elapsed_ms: 0,
            status: ActivityStatus::TimedOut,
            error: Some("Agent timed out after 45 seconds".to_string()),
        });

        let json = serde_json::to_string(&record).unwrap();
        let parsed: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
        assert!(parsed.has_fatal_fault());
        assert_eq!(
            parsed.phase_outcome(Phase::Exposure).map(|p| p.status),
            Some(PhaseStatus::Failed)
        );
        assert_eq!(
            parsed.activity_of("news-analyst").map(|a| a.status),
            Some(ActivityStatus::TimedOut)
        );
    }

    #[test]
    fn first_version_records_still_parse() {
        let mut json = serde_json::to_value(SessionRecord::open(Uuid::new_v4(), Utc::now())).unwrap();
        let fields = json.as_object_mut().unwrap();
        fields.remove("event");
        fields.remove("agent_activity");
        fields.insert("schema_version".to_string(), 1.into());

        let parsed: SessionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.schema_version, 1);
        assert!(parsed.event.is_none());
        assert!(parsed.agent_activity.is_empty());
    }
}
