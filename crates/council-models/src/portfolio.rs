use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance used when checking that valuations add up to the stated total.
const VALUATION_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("total portfolio value must be positive, got {0}")]
    NonPositiveTotal(Decimal),

    #[error("valuations sum to {sum} but total_value is {total}")]
    ValuationMismatch { sum: Decimal, total: Decimal },

    #[error("negative valuation for {0}")]
    NegativeValuation(String),

    #[error("duplicate position for {0}")]
    DuplicateAsset(String),

    #[error("valuations overflow the representable range")]
    Overflow,
}

/// A holding of one volatile asset, valued in USD at the snapshot's mark price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetPosition {
    pub asset: String,
    pub quantity: Decimal,
    /// Mark price in USD. Zero when the venue could not price the asset.
    pub price_usd: Decimal,
    pub value_usd: Decimal,
}

impl AssetPosition {
    pub fn new(asset: &str, quantity: Decimal, price_usd: Decimal) -> Self {
        Self {
            asset: asset.to_string(),
            quantity,
            price_usd,
            value_usd: quantity * price_usd,
        }
    }
}

/// The stable-coin / fiat leg of the portfolio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CashPosition {
    pub asset: String,
    pub value_usd: Decimal,
}

/// Point-in-time view of the portfolio. Built once at session start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSnapshot {
    pub taken_at: DateTime<Utc>,
    pub positions: Vec<AssetPosition>,
    pub cash: CashPosition,
    pub total_value: Decimal,
}

impl PortfolioSnapshot {
    /// Build a snapshot whose total is derived from its parts. The total
    /// saturates; `validate` reports parts that do not fit.
    pub fn new(taken_at: DateTime<Utc>, positions: Vec<AssetPosition>, cash: CashPosition) -> Self {
        let total_value = positions
            .iter()
            .fold(cash.value_usd, |acc, p| acc.saturating_add(p.value_usd));
        Self {
            taken_at,
            positions,
            cash,
            total_value,
        }
    }

    /// Check the snapshot invariants. Snapshots arriving over the wire are not
    /// trusted to have been built with [`PortfolioSnapshot::new`].
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.total_value <= Decimal::ZERO {
            return Err(SnapshotError::NonPositiveTotal(self.total_value));
        }

        let mut seen: Vec<&str> = Vec::with_capacity(self.positions.len());
        for position in &self.positions {
            if position.value_usd < Decimal::ZERO {
                return Err(SnapshotError::NegativeValuation(position.asset.clone()));
            }
            if seen.contains(&position.asset.as_str()) {
                return Err(SnapshotError::DuplicateAsset(position.asset.clone()));
            }
            seen.push(&position.asset);
        }
        if self.cash.value_usd < Decimal::ZERO {
            return Err(SnapshotError::NegativeValuation(self.cash.asset.clone()));
        }

        let sum = self
            .positions
            .iter()
            .try_fold(self.cash.value_usd, |acc, p| acc.checked_add(p.value_usd))
            .ok_or(SnapshotError::Overflow)?;
        if (sum - self.total_value).abs() > VALUATION_TOLERANCE {
            return Err(SnapshotError::ValuationMismatch {
                sum,
                total: self.total_value,
            });
        }
        Ok(())
    }

    pub fn position(&self, asset: &str) -> Option<&AssetPosition> {
        self.positions.iter().find(|p| p.asset == asset)
    }

    /// USD value held in an asset; zero when the asset is not held.
    pub fn value_of(&self, asset: &str) -> Decimal {
        if asset == self.cash.asset {
            return self.cash.value_usd;
        }
        self.position(asset)
            .map(|p| p.value_usd)
            .unwrap_or(Decimal::ZERO)
    }

    /// Combined USD value of all volatile positions. Saturates instead of
    /// overflowing; a validated snapshot never reaches the bound.
    pub fn risk_value(&self) -> Decimal {
        self.positions
            .iter()
            .fold(Decimal::ZERO, |acc, p| acc.saturating_add(p.value_usd))
    }
}
