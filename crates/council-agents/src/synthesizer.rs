//! P4 trade instruction synthesis.
//!
//! Pure over the consensus result and the snapshot, so replaying a stored
//! session record reproduces its instructions exactly.

use council_models::config::{ExposureConfig, PortfolioConfig, SynthesisConfig};
use council_models::consensus::{AssetVerdict, ConsensusResult, ExecutionMode};
use council_models::instruction::{
    InstructionPurpose, OrderSide, RejectedInstruction, TradeInstruction,
};
use council_models::portfolio::PortfolioSnapshot;
use council_models::recommendation::{Direction, RecommendationKind};
use council_models::session::SessionFault;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::exposure::risk_exposure_pct;

const USD_SCALE: u32 = 2;
const QUANTITY_SCALE: u32 = 8;

/// Everything the synthesizer needs beyond the session's own data.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisParams<'a> {
    pub portfolio: &'a PortfolioConfig,
    pub exposure: &'a ExposureConfig,
    pub synthesis: &'a SynthesisConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Synthesis {
    pub instructions: Vec<TradeInstruction>,
    pub rejected: Vec<RejectedInstruction>,
}

impl Synthesis {
    /// One `SynthesisValidationFailure` per rejected instruction.
    pub fn faults(&self) -> Vec<SessionFault> {
        self.rejected
            .iter()
            .map(|r| SessionFault::SynthesisValidationFailure {
                asset: r.asset.clone(),
                reason: r.reason.clone(),
            })
            .collect()
    }
}

pub fn synthesize(
    consensus: &ConsensusResult,
    snapshot: &PortfolioSnapshot,
    params: SynthesisParams<'_>,
) -> Synthesis {
    let mut synthesis = Synthesis::default();

    let candidates = match consensus.execution_mode {
        ExecutionMode::Blocked => Vec::new(),
        ExecutionMode::ForcedDeployment => deployment_candidates(snapshot, params),
        ExecutionMode::Standard | ExecutionMode::ReducedSize => consensus
            .assets
            .iter()
            .filter(|v| v.is_actionable())
            .filter_map(|v| rebalance_candidate(v, consensus.execution_mode, snapshot, params))
            .collect(),
    };

    for (asset, side, purpose, notional) in candidates {
        match build_instruction(&asset, side, purpose, notional, snapshot, params.synthesis) {
            Ok(instruction) => {
                debug!(
                    asset = %instruction.asset,
                    side = ?instruction.side,
                    notional_usd = %instruction.notional_usd,
                    purpose = ?instruction.purpose,
                    "Instruction synthesized"
                );
                synthesis.instructions.push(instruction);
            }
            Err(reason) => {
                warn!(asset = %asset, reason = %reason, "Instruction failed validation");
                synthesis.rejected.push(RejectedInstruction {
                    asset,
                    side,
                    notional_usd: notional,
                    reason,
                });
            }
        }
    }

    synthesis
}

type Candidate = (String, OrderSide, InstructionPurpose, Decimal);

/// Move an actionable asset toward its benchmark weight.
fn rebalance_candidate(
    verdict: &AssetVerdict,
    mode: ExecutionMode,
    snapshot: &PortfolioSnapshot,
    params: SynthesisParams<'_>,
) -> Option<Candidate> {
    let target = params.portfolio.benchmark_weight(&verdict.asset) * snapshot.total_value;
    let mut delta = target - snapshot.value_of(&verdict.asset);
    if mode == ExecutionMode::ReducedSize {
        delta *= params.synthesis.reduced_size_multiplier;
    }
    let delta = delta.round_dp(USD_SCALE);

    let side = match verdict.winning_direction {
        Direction::Buy if delta > Decimal::ZERO => OrderSide::Buy,
        Direction::Sell if delta < Decimal::ZERO => OrderSide::Sell,
        _ => {
            debug!(asset = %verdict.asset, delta = %delta, direction = ?verdict.winning_direction, "Delta disagrees with consensus direction");
            return None;
        }
    };
    if delta.abs() <= params.synthesis.min_rebalance_delta {
        debug!(asset = %verdict.asset, delta = %delta, "Delta below rebalance threshold");
        return None;
    }

    let purpose = match verdict.dominant_kind {
        None | Some(RecommendationKind::Rebalance) | Some(RecommendationKind::Hold) => {
            InstructionPurpose::Rebalance
        }
        Some(_) => InstructionPurpose::Directional,
    };
    Some((verdict.asset.clone(), side, purpose, delta.abs()))
}

/// Close the gap to the minimum exposure, split by benchmark shortfall.
fn deployment_candidates(
    snapshot: &PortfolioSnapshot,
    params: SynthesisParams<'_>,
) -> Vec<Candidate> {
    let gap_pct = params.exposure.min_exposure_pct - risk_exposure_pct(snapshot);
    if gap_pct <= Decimal::ZERO {
        debug!(gap_pct = %gap_pct, "Already at minimum exposure; nothing to deploy");
        return Vec::new();
    }
    let total_delta = gap_pct / Decimal::ONE_HUNDRED * snapshot.total_value;

    let assets = &params.portfolio.risk_assets;
    let shortfalls: Vec<Decimal> = assets
        .iter()
        .map(|asset| {
            let target = params.portfolio.benchmark_weight(asset) * snapshot.total_value;
            (target - snapshot.value_of(asset)).max(Decimal::ZERO)
        })
        .collect();
    let total_shortfall: Decimal = shortfalls.iter().copied().sum();
    let even_share = Decimal::ONE / Decimal::from(assets.len().max(1));

    assets
        .iter()
        .zip(shortfalls)
        .filter_map(|(asset, shortfall)| {
            let share = if total_shortfall > Decimal::ZERO {
                shortfall / total_shortfall
            } else {
                even_share
            };
            let notional = (total_delta * share).round_dp(USD_SCALE);
            if notional <= params.synthesis.min_rebalance_delta {
                debug!(asset = %asset, notional = %notional, "Deployment slice below threshold");
                return None;
            }
            Some((asset.clone(), OrderSide::Buy, InstructionPurpose::Deploy, notional))
        })
        .collect()
}

fn build_instruction(
    asset: &str,
    side: OrderSide,
    purpose: InstructionPurpose,
    notional: Decimal,
    snapshot: &PortfolioSnapshot,
    config: &SynthesisConfig,
) -> Result<TradeInstruction, String> {
    let price = snapshot
        .position(asset)
        .map(|p| p.price_usd)
        .unwrap_or(Decimal::ZERO);
    if price <= Decimal::ZERO {
        return Err(format!("no usable reference price for {asset}"));
    }
    let quantity = (notional / price).round_dp(QUANTITY_SCALE);
    if quantity <= Decimal::ZERO {
        return Err(format!("quantity for {notional} USD at {price} rounds to zero"));
    }

    let (stop_loss, take_profit) = if purpose.is_directional() {
        let offset = |pct: Decimal| price * pct / Decimal::ONE_HUNDRED;
        let stop_loss = config.stop_loss_pct.map(|pct| match side {
            OrderSide::Buy => price - offset(pct),
            OrderSide::Sell => price + offset(pct),
        });
        let take_profit = config.take_profit_pct.map(|pct| match side {
            OrderSide::Buy => price + offset(pct),
            OrderSide::Sell => price - offset(pct),
        });
        match stop_loss {
            Some(stop) if stop > Decimal::ZERO => {
                (Some(stop.round_dp(USD_SCALE)), take_profit.map(|t| t.round_dp(USD_SCALE)))
            }
            _ => return Err("directional instruction without a valid stop loss".to_string()),
        }
    } else {
        (None, None)
    };

    Ok(TradeInstruction {
        asset: asset.to_string(),
        side,
        purpose,
        notional_usd: notional,
        quantity,
        order_type: config.order_type,
        reference_price: price,
        stop_loss,
        take_profit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use council_models::config::CouncilConfig;
    use council_models::consensus::DirectionTotals;
    use council_models::portfolio::{AssetPosition, CashPosition};
    use rust_decimal_macros::dec;

    fn snapshot(btc: Decimal, eth: Decimal, cash: Decimal) -> PortfolioSnapshot {
        PortfolioSnapshot::new(
            Utc::now(),
            vec![
                AssetPosition::new("BTC", btc / dec!(50000), dec!(50000)),
                AssetPosition::new("ETH", eth / dec!(2500), dec!(2500)),
            ],
            CashPosition {
                asset: "USDT".to_string(),
                value_usd: cash,
            },
        )
    }

    fn verdict(asset: &str, direction: Direction, kind: RecommendationKind) -> AssetVerdict {
        AssetVerdict {
            asset: asset.to_string(),
            winning_direction: direction,
            winning_weight: dec!(4),
            total_eligible_weight: dec!(5),
            agreement: dec!(0.8),
            achieved: true,
            totals: DirectionTotals::default(),
            dominant_kind: Some(kind),
        }
    }

    fn consensus(mode: ExecutionMode, assets: Vec<AssetVerdict>) -> ConsensusResult {
        ConsensusResult {
            assets,
            achieved: true,
            execution_mode: mode,
            override_applied: false,
            override_reason: None,
            directional_agreement: dec!(0.8),
            veto: None,
            reason: String::new(),
        }
    }

    fn params(config: &CouncilConfig) -> SynthesisParams<'_> {
        SynthesisParams {
            portfolio: &config.portfolio,
            exposure: &config.exposure,
            synthesis: &config.synthesis,
        }
    }

    #[test]
    fn standard_buy_moves_to_benchmark() {
        let config = CouncilConfig::default();
        let snap = snapshot(dec!(2000), dec!(3330), dec!(4670));
        let result = synthesize(
            &consensus(
                ExecutionMode::Standard,
                vec![verdict("BTC", Direction::Buy, RecommendationKind::Increase)],
            ),
            &snap,
            params(&config),
        );

        assert!(result.rejected.is_empty());
        assert_eq!(result.instructions.len(), 1);
        let btc = &result.instructions[0];
        assert_eq!(btc.side, OrderSide::Buy);
        assert_eq!(btc.notional_usd, dec!(1330));
        assert_eq!(btc.quantity, dec!(0.0266));
        assert_eq!(btc.purpose, InstructionPurpose::Directional);
        assert_eq!(btc.stop_loss, Some(dec!(47500)));
        assert_eq!(btc.take_profit, Some(dec!(55000)));
    }

    #[test]
    fn reduced_size_halves_the_delta() {
        let config = CouncilConfig::default();
        let snap = snapshot(dec!(2000), dec!(3330), dec!(4670));
        let result = synthesize(
            &consensus(
                ExecutionMode::ReducedSize,
                vec![verdict("BTC", Direction::Buy, RecommendationKind::Rebalance)],
            ),
            &snap,
            params(&config),
        );
        let btc = &result.instructions[0];
        assert_eq!(btc.notional_usd, dec!(665));
        assert_eq!(btc.purpose, InstructionPurpose::Rebalance);
        assert_eq!(btc.stop_loss, None);
    }

    #[test]
    fn delta_against_consensus_direction_is_skipped() {
        let config = CouncilConfig::default();
        // BTC already above benchmark; a BUY verdict cannot be served by rebalancing
        let snap = snapshot(dec!(5000), dec!(3330), dec!(1670));
        let result = synthesize(
            &consensus(
                ExecutionMode::Standard,
                vec![verdict("BTC", Direction::Buy, RecommendationKind::Increase)],
            ),
            &snap,
            params(&config),
        );
        assert!(result.instructions.is_empty());
        assert!(result.rejected.is_empty());
    }

    #[test]
    fn small_delta_is_skipped() {
        let config = CouncilConfig::default();
        let snap = snapshot(dec!(3325), dec!(3330), dec!(3345));
        let result = synthesize(
            &consensus(
                ExecutionMode::Standard,
                vec![verdict("BTC", Direction::Buy, RecommendationKind::Increase)],
            ),
            &snap,
            params(&config),
        );
        assert!(result.instructions.is_empty());
    }

    #[test]
    fn sell_stop_sits_above_price() {
        let config = CouncilConfig::default();
        let snap = snapshot(dec!(2000), dec!(6000), dec!(2000));
        let result = synthesize(
            &consensus(
                ExecutionMode::Standard,
                vec![verdict("ETH", Direction::Sell, RecommendationKind::Reduce)],
            ),
            &snap,
            params(&config),
        );
        let eth = &result.instructions[0];
        assert_eq!(eth.side, OrderSide::Sell);
        assert_eq!(eth.notional_usd, dec!(2670));
        assert_eq!(eth.stop_loss, Some(dec!(2625)));
        assert_eq!(eth.take_profit, Some(dec!(2250)));
    }

    #[test]
    fn forced_deployment_splits_by_shortfall() {
        let config = CouncilConfig::default();
        // 15% risk exposure, 5% gap to the 20% floor => 500 USD
        let snap = snapshot(dec!(1330), dec!(170), dec!(8500));
        let result = synthesize(
            &consensus(ExecutionMode::ForcedDeployment, vec![]),
            &snap,
            params(&config),
        );

        assert_eq!(result.instructions.len(), 2);
        let total: Decimal = result.instructions.iter().map(|i| i.notional_usd).sum();
        assert_eq!(total, dec!(500));
        let btc = result.instructions.iter().find(|i| i.asset == "BTC").unwrap();
        let eth = result.instructions.iter().find(|i| i.asset == "ETH").unwrap();
        // Shortfalls: BTC 2000, ETH 3160
        assert!(eth.notional_usd > btc.notional_usd);
        for instruction in &result.instructions {
            assert_eq!(instruction.purpose, InstructionPurpose::Deploy);
            assert_eq!(instruction.side, OrderSide::Buy);
            assert!(instruction.stop_loss.is_some());
        }
    }

    #[test]
    fn missing_stop_loss_rejects_directional_instruction() {
        let mut config = CouncilConfig::default();
        config.synthesis.stop_loss_pct = None;
        let snap = snapshot(dec!(2000), dec!(3330), dec!(4670));
        let result = synthesize(
            &consensus(
                ExecutionMode::Standard,
                vec![verdict("BTC", Direction::Buy, RecommendationKind::Increase)],
            ),
            &snap,
            params(&config),
        );
        assert!(result.instructions.is_empty());
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].notional_usd, dec!(1330));
        assert!(matches!(
            result.faults()[0],
            SessionFault::SynthesisValidationFailure { ref asset, .. } if asset == "BTC"
        ));
    }

    #[test]
    fn unpriced_asset_is_rejected() {
        let config = CouncilConfig::default();
        let mut snap = snapshot(dec!(2000), dec!(3330), dec!(4670));
        snap.positions[0].price_usd = Decimal::ZERO;
        let result = synthesize(
            &consensus(
                ExecutionMode::Standard,
                vec![verdict("BTC", Direction::Buy, RecommendationKind::Rebalance)],
            ),
            &snap,
            params(&config),
        );
        assert!(result.instructions.is_empty());
        assert!(result.rejected[0].reason.contains("reference price"));
    }

    #[test]
    fn blocked_emits_nothing() {
        let config = CouncilConfig::default();
        let snap = snapshot(dec!(2000), dec!(3330), dec!(4670));
        let result = synthesize(
            &consensus(
                ExecutionMode::Blocked,
                vec![verdict("BTC", Direction::Buy, RecommendationKind::Increase)],
            ),
            &snap,
            params(&config),
        );
        assert_eq!(result, Synthesis::default());
    }
}
