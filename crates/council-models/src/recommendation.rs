use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exposure::{ExposureHistory, SessionMode};
use crate::portfolio::PortfolioSnapshot;

/// Asset marker for a recommendation that applies to every risk asset.
pub const PORTFOLIO_WIDE: &str = "PORTFOLIO";

/// Session phases in execution order. `Ord` follows declaration order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// P0: news and market data gathering.
    News,
    /// P0.5: internal exposure evaluation.
    Exposure,
    /// P1: market intelligence over P0 output, portfolio and history.
    Intelligence,
    /// P2: risk specialist plus optional analysts, run concurrently.
    Analysis,
    /// P3: internal consensus.
    Consensus,
    /// P4: conditional hand-off to the execution collaborator.
    Execution,
    /// P5: terminal reporting.
    Reporting,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::News,
        Phase::Exposure,
        Phase::Intelligence,
        Phase::Analysis,
        Phase::Consensus,
        Phase::Execution,
        Phase::Reporting,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Phase::News => "P0",
            Phase::Exposure => "P0.5",
            Phase::Intelligence => "P1",
            Phase::Analysis => "P2",
            Phase::Consensus => "P3",
            Phase::Execution => "P4",
            Phase::Reporting => "P5",
        }
    }

    /// Phases that call out to a specialist.
    pub fn is_external(self) -> bool {
        !matches!(self, Phase::Exposure | Phase::Consensus)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationKind {
    Rebalance,
    Hold,
    Reduce,
    Increase,
    Deploy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

/// Categorical verdict. Only the designated risk specialist may issue anything
/// other than `None`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VetoCategory {
    HardReject,
    SoftReject,
    Caution,
    Approve,
    #[default]
    None,
}

impl VetoCategory {
    /// Whether a consensus override may lift this verdict.
    pub fn is_overridable(self) -> bool {
        matches!(self, VetoCategory::SoftReject)
    }

    /// Whether this verdict stops a trade unless overridden.
    pub fn is_rejection(self) -> bool {
        matches!(self, VetoCategory::HardReject | VetoCategory::SoftReject)
    }
}

impl std::fmt::Display for VetoCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VetoCategory::HardReject => "HARD_REJECT",
            VetoCategory::SoftReject => "SOFT_REJECT",
            VetoCategory::Caution => "CAUTION",
            VetoCategory::Approve => "APPROVE",
            VetoCategory::None => "NONE",
        })
    }
}

/// A validated recommendation from one specialist. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecommendation {
    pub agent_id: String,
    pub phase: Phase,
    pub recommendation_kind: RecommendationKind,
    pub direction: Direction,
    /// A configured risk asset, or [`PORTFOLIO_WIDE`].
    pub asset: String,
    /// 0 to 10.
    pub confidence: Decimal,
    pub veto_category: VetoCategory,
    /// Taken from configuration, never from the specialist's payload.
    pub base_weight: Decimal,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

impl AgentRecommendation {
    pub fn applies_to(&self, asset: &str) -> bool {
        self.asset == asset || self.asset == PORTFOLIO_WIDE
    }
}

/// One entry in the collected recommendation set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "vote", rename_all = "snake_case")]
pub enum Vote {
    Cast(AgentRecommendation),
    /// Missing or invalid response. Carries zero weight.
    Abstain {
        agent_id: String,
        phase: Phase,
        reason: String,
    },
}

impl Vote {
    pub fn agent_id(&self) -> &str {
        match self {
            Vote::Cast(rec) => &rec.agent_id,
            Vote::Abstain { agent_id, .. } => agent_id,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Vote::Cast(rec) => rec.phase,
            Vote::Abstain { phase, .. } => *phase,
        }
    }

    pub fn recommendation(&self) -> Option<&AgentRecommendation> {
        match self {
            Vote::Cast(rec) => Some(rec),
            Vote::Abstain { .. } => None,
        }
    }

    pub fn is_abstain(&self) -> bool {
        matches!(self, Vote::Abstain { .. })
    }
}

/// Request context sent to a specialist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    pub request_id: Uuid,
    pub session_id: Uuid,
    pub phase: Phase,
    pub portfolio: Option<PortfolioSnapshot>,
    /// Raw outputs of earlier phases, keyed by agent name.
    pub prior_phase_outputs: serde_json::Map<String, serde_json::Value>,
    pub session_mode: Option<SessionMode>,
    pub history: Option<ExposureHistory>,
    /// Risk assets the specialist may recommend on.
    pub assets: Vec<String>,
    /// Event that triggered the session, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<serde_json::Value>,
}
