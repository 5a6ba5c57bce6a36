use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::recommendation::{Direction, RecommendationKind, VetoCategory};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    Standard,
    /// Consensus reached below the strong threshold; deltas are scaled down.
    ReducedSize,
    /// Exposure-gap deployment that bypasses vote magnitudes.
    ForcedDeployment,
    /// Maintain current allocation.
    Blocked,
}

impl ExecutionMode {
    pub fn permits_trading(self) -> bool {
        !matches!(self, ExecutionMode::Blocked)
    }
}

/// Weighted sums per direction for one asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectionTotals {
    pub buy: Decimal,
    pub sell: Decimal,
    pub hold: Decimal,
}

impl DirectionTotals {
    pub fn add(&mut self, direction: Direction, weight: Decimal) {
        match direction {
            Direction::Buy => self.buy += weight,
            Direction::Sell => self.sell += weight,
            Direction::Hold => self.hold += weight,
        }
    }

    pub fn get(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Buy => self.buy,
            Direction::Sell => self.sell,
            Direction::Hold => self.hold,
        }
    }

    pub fn total(&self) -> Decimal {
        self.buy + self.sell + self.hold
    }

    /// The strictly heaviest direction. Any tie for the top spot yields `Hold`.
    pub fn leader(&self) -> (Direction, Decimal) {
        let candidates = [
            (Direction::Buy, self.buy),
            (Direction::Sell, self.sell),
            (Direction::Hold, self.hold),
        ];
        let top = candidates
            .iter()
            .map(|(_, w)| *w)
            .max()
            .unwrap_or(Decimal::ZERO);
        let mut leaders = candidates.iter().filter(|(_, w)| *w == top);
        match (leaders.next(), leaders.next()) {
            (Some((direction, weight)), None) => (*direction, *weight),
            _ => (Direction::Hold, top),
        }
    }
}

/// Consensus outcome for a single risk asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetVerdict {
    pub asset: String,
    pub winning_direction: Direction,
    pub winning_weight: Decimal,
    pub total_eligible_weight: Decimal,
    /// winning_weight / total_eligible_weight, zero when nobody voted.
    pub agreement: Decimal,
    pub achieved: bool,
    pub totals: DirectionTotals,
    /// Heaviest recommendation kind among voters backing the winning direction.
    pub dominant_kind: Option<RecommendationKind>,
}

impl AssetVerdict {
    /// Consensus reached on an actual trade direction.
    pub fn is_actionable(&self) -> bool {
        self.achieved && self.winning_direction != Direction::Hold
    }
}

/// The single verdict produced per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusResult {
    pub assets: Vec<AssetVerdict>,
    pub achieved: bool,
    pub execution_mode: ExecutionMode,
    pub override_applied: bool,
    pub override_reason: Option<String>,
    /// Leading BUY/SELL weight over all eligible weight, across assets.
    pub directional_agreement: Decimal,
    /// The risk specialist's verdict, if it delivered one.
    pub veto: Option<VetoCategory>,
    pub reason: String,
}

impl ConsensusResult {
    pub fn verdict(&self, asset: &str) -> Option<&AssetVerdict> {
        self.assets.iter().find(|v| v.asset == asset)
    }

    pub fn is_veto_blocked(&self) -> bool {
        self.execution_mode == ExecutionMode::Blocked
            && matches!(self.veto, Some(v) if v.is_rejection())
            && !self.override_applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn leader_picks_strict_maximum() {
        let mut totals = DirectionTotals::default();
        totals.add(Direction::Buy, dec!(3.0));
        totals.add(Direction::Sell, dec!(1.5));
        totals.add(Direction::Buy, dec!(0.5));
        assert_eq!(totals.leader(), (Direction::Buy, dec!(3.5)));
        assert_eq!(totals.total(), dec!(5.0));
    }

    #[test]
    fn buy_sell_tie_resolves_to_hold() {
        let totals = DirectionTotals {
            buy: dec!(2.0),
            sell: dec!(2.0),
            hold: Decimal::ZERO,
        };
        assert_eq!(totals.leader(), (Direction::Hold, dec!(2.0)));
    }

    #[test]
    fn tie_with_different_scale_is_still_a_tie() {
        let totals = DirectionTotals {
            buy: dec!(1.50),
            sell: dec!(1.5),
            hold: dec!(0.1),
        };
        assert_eq!(totals.leader().0, Direction::Hold);
    }

    #[test]
    fn empty_totals_lead_with_hold() {
        assert_eq!(
            DirectionTotals::default().leader(),
            (Direction::Hold, Decimal::ZERO)
        );
    }

    #[test]
    fn blocked_does_not_permit_trading() {
        assert!(!ExecutionMode::Blocked.permits_trading());
        assert!(ExecutionMode::ReducedSize.permits_trading());
        assert_eq!(
            serde_json::to_string(&ExecutionMode::ForcedDeployment).unwrap(),
            "\"FORCED_DEPLOYMENT\""
        );
    }
}
