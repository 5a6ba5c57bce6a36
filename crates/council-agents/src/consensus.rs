//! P3 consensus. Deterministic and input-pure: the same votes, exposure
//! assessment and configuration always give the same [`ConsensusResult`].

use council_models::config::{AgentsConfig, ConsensusConfig, CouncilConfig};
use council_models::consensus::{AssetVerdict, ConsensusResult, DirectionTotals, ExecutionMode};
use council_models::exposure::{ExposureAssessment, SessionMode};
use council_models::recommendation::{
    AgentRecommendation, Direction, Phase, RecommendationKind, VetoCategory, Vote,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Fixed precedence used when two recommendation kinds carry equal weight.
const KIND_ORDER: [RecommendationKind; 5] = [
    RecommendationKind::Rebalance,
    RecommendationKind::Hold,
    RecommendationKind::Reduce,
    RecommendationKind::Increase,
    RecommendationKind::Deploy,
];

pub struct ConsensusEngine<'a> {
    config: &'a ConsensusConfig,
    agents: &'a AgentsConfig,
    assets: &'a [String],
    force_deploy_after_days: u32,
}

impl<'a> ConsensusEngine<'a> {
    pub fn new(config: &'a CouncilConfig) -> Self {
        Self {
            config: &config.consensus,
            agents: &config.agents,
            assets: &config.portfolio.risk_assets,
            force_deploy_after_days: config.exposure.force_deploy_after_days,
        }
    }

    /// Weight a single recommendation contributes to its direction.
    pub fn effective_weight(&self, rec: &AgentRecommendation, mode: SessionMode) -> Decimal {
        let modifier = match mode {
            SessionMode::MustDeploy => self
                .agents
                .find(&rec.agent_id)
                .map(|s| s.must_deploy_modifier)
                .unwrap_or(Decimal::ONE),
            SessionMode::Standard | SessionMode::Defensive => Decimal::ONE,
        };
        rec.base_weight * self.config.tier_multiplier(rec.confidence) * modifier
    }

    pub fn evaluate(&self, votes: &[Vote], exposure: &ExposureAssessment) -> ConsensusResult {
        let mode = exposure.mode;
        let verdicts = self.tally(votes, mode);
        let directional_agreement = directional_agreement(&verdicts);
        let veto = self.risk_verdict(votes);
        let streak_met =
            exposure.under_exposed_days >= Decimal::from(self.force_deploy_after_days);

        let blocked = |reason: String| ConsensusResult {
            assets: verdicts.clone(),
            achieved: false,
            execution_mode: ExecutionMode::Blocked,
            override_applied: false,
            override_reason: None,
            directional_agreement,
            veto,
            reason,
        };

        let mut override_reason = None;
        match veto {
            None | Some(VetoCategory::None) => {
                return blocked("No verdict from the risk specialist".to_string());
            }
            Some(verdict) if verdict.is_overridable() => {
                if mode != SessionMode::MustDeploy {
                    return blocked(format!("Risk specialist issued {verdict} in {mode:?} mode"));
                }
                if directional_agreement >= self.config.override_threshold_fraction {
                    override_reason = Some(format!(
                        "{verdict} overridden: directional agreement {} >= {}",
                        directional_agreement.round_dp(4),
                        self.config.override_threshold_fraction
                    ));
                } else if streak_met {
                    override_reason = Some(format!(
                        "{verdict} overridden: under-exposed for {} days (limit {})",
                        exposure.under_exposed_days.round_dp(2),
                        self.force_deploy_after_days
                    ));
                } else {
                    return blocked(format!(
                        "{verdict} stands: directional agreement {} below override threshold {}",
                        directional_agreement.round_dp(4),
                        self.config.override_threshold_fraction
                    ));
                }
            }
            Some(verdict) if verdict.is_rejection() => {
                info!(mode = ?mode, verdict = %verdict, "Risk specialist rejected the trade");
                return blocked(format!("Risk specialist issued {verdict}"));
            }
            Some(_) => {}
        }
        let override_applied = override_reason.is_some();

        let actionable: Vec<&AssetVerdict> = verdicts.iter().filter(|v| v.is_actionable()).collect();
        let achieved = !actionable.is_empty();
        let forced = exposure.forced_deployment_eligible
            && (override_applied || (mode == SessionMode::MustDeploy && streak_met));

        let (execution_mode, reason) = if forced {
            (
                ExecutionMode::ForcedDeployment,
                format!(
                    "Forced deployment: cash idle for {} days at {}% risk exposure",
                    exposure.high_cash_days.round_dp(2),
                    exposure.risk_exposure_pct
                ),
            )
        } else if let Some(weakest) = actionable.iter().map(|v| v.agreement).min() {
            if weakest >= self.config.strong_majority_fraction {
                (
                    ExecutionMode::Standard,
                    format!("Strong consensus on {} asset(s)", actionable.len()),
                )
            } else {
                (
                    ExecutionMode::ReducedSize,
                    format!(
                        "Consensus on {} asset(s) with weakest agreement {}",
                        actionable.len(),
                        weakest.round_dp(4)
                    ),
                )
            }
        } else {
            (
                ExecutionMode::Blocked,
                "Consensus not reached on any asset".to_string(),
            )
        };

        debug!(
            execution_mode = ?execution_mode,
            directional_agreement = %directional_agreement,
            override_applied,
            "Consensus evaluated"
        );

        ConsensusResult {
            assets: verdicts,
            achieved,
            execution_mode,
            override_applied,
            override_reason,
            directional_agreement,
            veto,
            reason,
        }
    }

    /// The risk specialist's verdict, `None` when it abstained.
    fn risk_verdict(&self, votes: &[Vote]) -> Option<VetoCategory> {
        votes
            .iter()
            .filter_map(Vote::recommendation)
            .find(|rec| rec.agent_id == self.agents.risk_agent && rec.phase == Phase::Analysis)
            .map(|rec| rec.veto_category)
    }

    fn tally(&self, votes: &[Vote], mode: SessionMode) -> Vec<AssetVerdict> {
        let eligible: Vec<(&AgentRecommendation, Decimal)> = votes
            .iter()
            .filter_map(Vote::recommendation)
            .filter(|rec| matches!(rec.phase, Phase::Intelligence | Phase::Analysis))
            .map(|rec| (rec, self.effective_weight(rec, mode)))
            .collect();

        self.assets
            .iter()
            .map(|asset| {
                let applicable: Vec<&(&AgentRecommendation, Decimal)> =
                    eligible.iter().filter(|(rec, _)| rec.applies_to(asset)).collect();

                let mut totals = DirectionTotals::default();
                for (rec, weight) in &applicable {
                    totals.add(rec.direction, *weight);
                }

                let (winning_direction, winning_weight) = totals.leader();
                let total = totals.total();
                let agreement = if total > Decimal::ZERO {
                    winning_weight / total
                } else {
                    Decimal::ZERO
                };

                let dominant_kind = KIND_ORDER
                    .iter()
                    .map(|kind| {
                        let weight: Decimal = applicable
                            .iter()
                            .filter(|(rec, _)| {
                                rec.direction == winning_direction && rec.recommendation_kind == *kind
                            })
                            .map(|(_, w)| *w)
                            .sum();
                        (*kind, weight)
                    })
                    .filter(|(_, weight)| *weight > Decimal::ZERO)
                    .fold(None, |best: Option<(RecommendationKind, Decimal)>, (kind, weight)| {
                        match best {
                            Some((_, top)) if top >= weight => best,
                            _ => Some((kind, weight)),
                        }
                    })
                    .map(|(kind, _)| kind);

                AssetVerdict {
                    asset: asset.clone(),
                    winning_direction,
                    winning_weight,
                    total_eligible_weight: total,
                    agreement,
                    achieved: total > Decimal::ZERO
                        && agreement >= self.config.required_majority_fraction,
                    totals,
                    dominant_kind,
                }
            })
            .collect()
    }
}

/// Leading BUY/SELL weight over all eligible weight, summed across assets.
/// A BUY/SELL tie has no leading direction.
fn directional_agreement(verdicts: &[AssetVerdict]) -> Decimal {
    let mut combined = DirectionTotals::default();
    for verdict in verdicts {
        for direction in [Direction::Buy, Direction::Sell, Direction::Hold] {
            combined.add(direction, verdict.totals.get(direction));
        }
    }
    let total = combined.total();
    if total <= Decimal::ZERO || combined.buy == combined.sell {
        return Decimal::ZERO;
    }
    combined.buy.max(combined.sell) / total
}
