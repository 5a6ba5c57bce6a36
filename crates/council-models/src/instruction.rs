use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

/// Why an instruction exists. Anything other than `Rebalance` is directional
/// and must carry a stop loss.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstructionPurpose {
    /// Move an asset back toward its benchmark weight.
    Rebalance,
    /// Act on a directional call (increase/reduce).
    Directional,
    /// Forced deployment of idle cash.
    Deploy,
}

impl InstructionPurpose {
    pub fn is_directional(self) -> bool {
        !matches!(self, InstructionPurpose::Rebalance)
    }
}

/// A single order handed to the execution collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeInstruction {
    pub asset: String,
    pub side: OrderSide,
    pub purpose: InstructionPurpose,
    /// Absolute USD notional.
    pub notional_usd: Decimal,
    /// Units of the asset at `reference_price`.
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub reference_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// An instruction dropped at synthesis time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedInstruction {
    pub asset: String,
    pub side: OrderSide,
    pub notional_usd: Decimal,
    pub reason: String,
}

/// Acknowledgement returned by the execution collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionReport {
    pub venue: String,
    pub accepted: bool,
    pub message: String,
    #[serde(default)]
    pub order_refs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rebalance_is_not_directional() {
        assert!(!InstructionPurpose::Rebalance.is_directional());
        assert!(InstructionPurpose::Directional.is_directional());
        assert!(InstructionPurpose::Deploy.is_directional());
    }

    #[test]
    fn instruction_serialization() {
        let instruction = TradeInstruction {
            asset: "ETH".to_string(),
            side: OrderSide::Buy,
            purpose: InstructionPurpose::Deploy,
            notional_usd: dec!(250),
            quantity: dec!(0.0833),
            order_type: OrderType::Market,
            reference_price: dec!(3000),
            stop_loss: Some(dec!(2850)),
            take_profit: None,
        };
        let json = serde_json::to_value(&instruction).unwrap();
        assert_eq!(json["side"], "buy");
        assert_eq!(json["purpose"], "deploy");
        assert_eq!(json["order_type"], "market");
        assert_eq!(json["stop_loss"], "2850");
    }

    #[test]
    fn execution_report_order_refs_default() {
        let report: ExecutionReport = serde_json::from_str(
            r#"{"venue": "dry_run", "accepted": true, "message": "ok"}"#,
        )
        .unwrap();
        assert!(report.order_refs.is_empty());
    }
}
