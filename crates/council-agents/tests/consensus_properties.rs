//! Property checks for the consensus engine over arbitrary vote sets.

use chrono::{TimeZone, Utc};
use council_agents::exposure::evaluate_exposure;
use council_agents::ConsensusEngine;
use council_models::config::{CouncilConfig, ExposureConfig};
use council_models::consensus::ExecutionMode;
use council_models::exposure::{ExposureAssessment, ExposureHistory};
use council_models::portfolio::{AssetPosition, CashPosition, PortfolioSnapshot};
use council_models::recommendation::{
    AgentRecommendation, Direction, Phase, RecommendationKind, VetoCategory, Vote,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

const ANALYSTS: [&str; 3] = ["technical-analyst", "data-analyst", "futures-analyst"];

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![
        Just(Direction::Buy),
        Just(Direction::Sell),
        Just(Direction::Hold)
    ]
}

fn kind() -> impl Strategy<Value = RecommendationKind> {
    prop_oneof![
        Just(RecommendationKind::Rebalance),
        Just(RecommendationKind::Hold),
        Just(RecommendationKind::Reduce),
        Just(RecommendationKind::Increase),
        Just(RecommendationKind::Deploy),
    ]
}

fn asset() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("BTC"), Just("ETH"), Just("PORTFOLIO")]
}

/// Confidence in tenths, 0.0 to 10.0.
fn confidence() -> impl Strategy<Value = Decimal> {
    (0i64..=100).prop_map(|tenths| Decimal::new(tenths, 1))
}

fn cast(
    agent: &str,
    phase: Phase,
    (kind, direction, asset, confidence): (RecommendationKind, Direction, &str, Decimal),
    veto: VetoCategory,
) -> Vote {
    let config = CouncilConfig::default();
    Vote::Cast(AgentRecommendation {
        agent_id: agent.to_string(),
        phase,
        recommendation_kind: kind,
        direction,
        asset: asset.to_string(),
        confidence,
        veto_category: veto,
        base_weight: config
            .agents
            .find(agent)
            .map(|s| s.base_weight)
            .unwrap_or(Decimal::ONE),
        rationale: String::new(),
        timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    })
}

fn ballot() -> impl Strategy<Value = (RecommendationKind, Direction, &'static str, Decimal)> {
    (kind(), direction(), asset(), confidence())
}

/// Intelligence vote, risk vote with `veto` and up to three analysts.
fn votes(veto: VetoCategory) -> impl Strategy<Value = Vec<Vote>> {
    (
        ballot(),
        ballot(),
        proptest::collection::vec(proptest::option::of(ballot()), 3),
    )
        .prop_map(move |(intelligence, risk, analysts)| {
            let mut votes = vec![
                cast("market-intelligence", Phase::Intelligence, intelligence, VetoCategory::None),
                cast("risk-manager", Phase::Analysis, risk, veto),
            ];
            for (name, ballot) in ANALYSTS.iter().zip(analysts) {
                votes.push(match ballot {
                    Some(ballot) => cast(name, Phase::Analysis, ballot, VetoCategory::None),
                    None => Vote::Abstain {
                        agent_id: name.to_string(),
                        phase: Phase::Analysis,
                        reason: "no reply".to_string(),
                    },
                });
            }
            votes
        })
}

/// Exposure assessments across the whole band, with and without history.
fn assessment() -> impl Strategy<Value = ExposureAssessment> {
    (0i64..=100, 0i64..=10, 0i64..=10).prop_map(|(risk_pct, under_days, cash_days)| {
        let risk_value = Decimal::from(risk_pct * 1000);
        let snapshot = PortfolioSnapshot::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            vec![
                AssetPosition::new("BTC", risk_value / Decimal::from(50000), Decimal::from(50000)),
                AssetPosition::new("ETH", Decimal::ZERO, Decimal::from(2500)),
            ],
            CashPosition {
                asset: "USDT".to_string(),
                value_usd: Decimal::from(100_000) - risk_value,
            },
        );
        let history = ExposureHistory {
            under_exposed_days: Decimal::from(under_days),
            high_cash_days: Decimal::from(cash_days),
            sessions_considered: 10,
        };
        evaluate_exposure(Some(&snapshot), &ExposureConfig::default(), &history)
            .expect("snapshot is consistent")
    })
}

proptest! {
    #[test]
    fn hard_reject_always_blocks(votes in votes(VetoCategory::HardReject), exposure in assessment()) {
        let config = CouncilConfig::default();
        let result = ConsensusEngine::new(&config).evaluate(&votes, &exposure);
        prop_assert_eq!(result.execution_mode, ExecutionMode::Blocked);
        prop_assert!(!result.override_applied);
        prop_assert!(result.is_veto_blocked());
    }

    #[test]
    fn evaluation_is_deterministic(votes in votes(VetoCategory::Caution), exposure in assessment()) {
        let config = CouncilConfig::default();
        let engine = ConsensusEngine::new(&config);
        let first = engine.evaluate(&votes, &exposure);
        let mut reversed = votes.clone();
        reversed.reverse();
        prop_assert_eq!(&first, &engine.evaluate(&votes, &exposure));
        prop_assert_eq!(first, engine.evaluate(&reversed, &exposure));
    }

    #[test]
    fn agreement_is_a_fraction(votes in votes(VetoCategory::Approve), exposure in assessment()) {
        let config = CouncilConfig::default();
        let result = ConsensusEngine::new(&config).evaluate(&votes, &exposure);
        prop_assert!(result.directional_agreement >= Decimal::ZERO);
        prop_assert!(result.directional_agreement <= Decimal::ONE);
        for verdict in &result.assets {
            prop_assert!(verdict.agreement <= Decimal::ONE);
            if verdict.is_actionable() {
                prop_assert!(verdict.winning_direction != Direction::Hold);
            }
        }
    }

    #[test]
    fn soft_reject_outside_must_deploy_blocks(votes in votes(VetoCategory::SoftReject), exposure in assessment()) {
        prop_assume!(exposure.mode != council_models::exposure::SessionMode::MustDeploy);
        let config = CouncilConfig::default();
        let result = ConsensusEngine::new(&config).evaluate(&votes, &exposure);
        prop_assert_eq!(result.execution_mode, ExecutionMode::Blocked);
        prop_assert!(!result.override_applied);
    }
}
