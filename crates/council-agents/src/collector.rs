//! Turns raw specialist payloads into validated votes.
//!
//! Every field the tally depends on is checked here. A payload that fails any
//! check becomes an abstention; base weights always come from configuration.

use chrono::{DateTime, Utc};
use council_models::config::AgentsConfig;
use council_models::recommendation::{
    AgentRecommendation, Direction, Phase, RecommendationKind, VetoCategory, Vote, PORTFOLIO_WIDE,
};
use council_models::session::SessionFault;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::AgentError;

const MAX_CONFIDENCE: Decimal = Decimal::TEN;
const REQUIRED_FIELDS: [&str; 4] = ["recommendation_kind", "direction", "asset", "confidence"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid payload: {0}")]
    Malformed(String),

    #[error("confidence {0} outside 0-10")]
    ConfidenceOutOfRange(Decimal),

    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    #[error("{0} is not the risk specialist and may not issue a veto")]
    UnauthorizedVeto(String),

    #[error("{0} is not on the roster")]
    UnknownAgent(String),
}

/// The fields a specialist controls. Weight and identity are assigned here.
#[derive(Debug, Deserialize)]
struct RecommendationPayload {
    recommendation_kind: RecommendationKind,
    direction: Direction,
    asset: String,
    confidence: Decimal,
    #[serde(default)]
    veto_category: VetoCategory,
    #[serde(default)]
    rationale: String,
}

/// What came back from one specialist call.
#[derive(Debug)]
pub struct SpecialistReply {
    pub agent_id: String,
    pub phase: Phase,
    pub payload: Result<Value, AgentError>,
    pub received_at: DateTime<Utc>,
}

/// Validated votes plus the non-fatal faults raised while collecting them.
#[derive(Debug, Default)]
pub struct Collection {
    pub votes: Vec<Vote>,
    pub faults: Vec<SessionFault>,
}

pub struct RecommendationCollector<'a> {
    agents: &'a AgentsConfig,
    assets: &'a [String],
}

impl<'a> RecommendationCollector<'a> {
    pub fn new(agents: &'a AgentsConfig, assets: &'a [String]) -> Self {
        Self { agents, assets }
    }

    /// Validate one payload into a recommendation.
    pub fn validate(
        &self,
        agent_id: &str,
        phase: Phase,
        payload: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<AgentRecommendation, ValidationError> {
        let spec = self
            .agents
            .find(agent_id)
            .ok_or_else(|| ValidationError::UnknownAgent(agent_id.to_string()))?;

        let object = payload.as_object().ok_or(ValidationError::NotAnObject)?;
        for field in REQUIRED_FIELDS {
            match object.get(field) {
                None | Some(Value::Null) => return Err(ValidationError::MissingField(field)),
                Some(_) => {}
            }
        }

        let parsed: RecommendationPayload = serde_json::from_value(payload.clone())
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        if parsed.confidence < Decimal::ZERO || parsed.confidence > MAX_CONFIDENCE {
            return Err(ValidationError::ConfidenceOutOfRange(parsed.confidence));
        }
        if parsed.asset != PORTFOLIO_WIDE && !self.assets.contains(&parsed.asset) {
            return Err(ValidationError::UnknownAsset(parsed.asset));
        }
        if parsed.veto_category != VetoCategory::None && agent_id != self.agents.risk_agent {
            return Err(ValidationError::UnauthorizedVeto(agent_id.to_string()));
        }

        Ok(AgentRecommendation {
            agent_id: agent_id.to_string(),
            phase,
            recommendation_kind: parsed.recommendation_kind,
            direction: parsed.direction,
            asset: parsed.asset,
            confidence: parsed.confidence,
            veto_category: parsed.veto_category,
            base_weight: spec.base_weight,
            rationale: parsed.rationale,
            timestamp: received_at,
        })
    }

    /// Validate a batch of replies, in the order given. The first reply per
    /// agent wins; later ones are dropped.
    pub fn collect(&self, replies: Vec<SpecialistReply>) -> Collection {
        let mut collection = Collection::default();

        for reply in replies {
            if collection
                .votes
                .iter()
                .any(|v| v.agent_id() == reply.agent_id)
            {
                warn!(agent = %reply.agent_id, "Duplicate reply dropped");
                continue;
            }

            let outcome = match &reply.payload {
                Ok(payload) => self
                    .validate(&reply.agent_id, reply.phase, payload, reply.received_at)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(recommendation) => {
                    debug!(
                        agent = %recommendation.agent_id,
                        direction = ?recommendation.direction,
                        asset = %recommendation.asset,
                        confidence = %recommendation.confidence,
                        veto = ?recommendation.veto_category,
                        "Recommendation accepted"
                    );
                    collection.votes.push(Vote::Cast(recommendation));
                }
                Err(reason) => {
                    warn!(agent = %reply.agent_id, phase = %reply.phase, reason = %reason, "Agent abstains");
                    collection.faults.push(SessionFault::OptionalAgentAbstain {
                        agent: reply.agent_id.clone(),
                        reason: reason.clone(),
                    });
                    collection.votes.push(Vote::Abstain {
                        agent_id: reply.agent_id,
                        phase: reply.phase,
                        reason,
                    });
                }
            }
        }

        collection
    }
}
