use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::instruction::OrderType;
use crate::recommendation::Phase;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid exposure band: {0}")]
    ExposureBand(String),

    #[error("invalid consensus thresholds: {0}")]
    Thresholds(String),

    #[error("invalid portfolio: {0}")]
    Portfolio(String),

    #[error("invalid specialist roster: {0}")]
    Roster(String),
}

/// Top-level configuration. Read once at start-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CouncilConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub exposure: ExposureConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl CouncilConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.portfolio.validate()?;
        self.exposure.validate()?;
        self.consensus.validate()?;
        self.agents.validate()?;
        if self.synthesis.reduced_size_multiplier <= Decimal::ZERO
            || self.synthesis.reduced_size_multiplier >= Decimal::ONE
        {
            return Err(ConfigError::Thresholds(format!(
                "reduced_size_multiplier must be in (0, 1), got {}",
                self.synthesis.reduced_size_multiplier
            )));
        }
        Ok(())
    }
}

/// Where session records are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    pub sqlite_path: String,
    /// How many prior sessions to read when deriving exposure history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/council_ledger.db".to_string(),
            history_limit: default_history_limit(),
        }
    }
}

/// Configuration for the specialist roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    /// Per-call timeout in seconds. Applies to every specialist.
    pub specialist_timeout_seconds: u64,
    /// Default model for specialist agents.
    pub specialist_model: String,
    /// Name of the veto-bearing risk specialist.
    pub risk_agent: String,
    pub specialists: Vec<SpecialistConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            specialist_timeout_seconds: 45,
            specialist_model: "sonnet".to_string(),
            risk_agent: "risk-manager".to_string(),
            specialists: vec![
                SpecialistConfig::new("news-analyst", "news", Phase::News, Decimal::ZERO),
                SpecialistConfig::new(
                    "market-intelligence",
                    "intelligence",
                    Phase::Intelligence,
                    Decimal::ONE,
                ),
                SpecialistConfig {
                    must_deploy_modifier: Decimal::new(7, 1),
                    ..SpecialistConfig::new(
                        "risk-manager",
                        "risk",
                        Phase::Analysis,
                        Decimal::new(15, 1),
                    )
                },
                SpecialistConfig {
                    must_deploy_modifier: Decimal::new(125, 2),
                    ..SpecialistConfig::new(
                        "technical-analyst",
                        "technical",
                        Phase::Analysis,
                        Decimal::ONE,
                    )
                },
                SpecialistConfig::new("data-analyst", "data", Phase::Analysis, Decimal::ONE),
                SpecialistConfig::new(
                    "futures-analyst",
                    "futures",
                    Phase::Analysis,
                    Decimal::new(75, 2),
                ),
                SpecialistConfig::new("reporter", "reporter", Phase::Reporting, Decimal::ZERO),
            ],
        }
    }
}

impl AgentsConfig {
    pub fn enabled_in(&self, phase: Phase) -> impl Iterator<Item = &SpecialistConfig> {
        self.specialists
            .iter()
            .filter(move |s| s.enabled && s.phase == phase)
    }

    pub fn find(&self, name: &str) -> Option<&SpecialistConfig> {
        self.specialists.iter().find(|s| s.name == name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for phase in [Phase::News, Phase::Intelligence, Phase::Reporting] {
            let count = self.enabled_in(phase).count();
            if count != 1 {
                return Err(ConfigError::Roster(format!(
                    "{phase} needs exactly one enabled specialist, found {count}"
                )));
            }
        }
        for spec in &self.specialists {
            if !spec.phase.is_external() || spec.phase == Phase::Execution {
                return Err(ConfigError::Roster(format!(
                    "{} is assigned to {}, which does not call specialists",
                    spec.name, spec.phase
                )));
            }
            if spec.base_weight < Decimal::ZERO || spec.must_deploy_modifier < Decimal::ZERO {
                return Err(ConfigError::Roster(format!(
                    "{} has a negative weight",
                    spec.name
                )));
            }
        }
        match self.find(&self.risk_agent) {
            Some(risk) if risk.enabled && risk.phase == Phase::Analysis => Ok(()),
            Some(_) => Err(ConfigError::Roster(format!(
                "risk agent {} must be enabled in P2",
                self.risk_agent
            ))),
            None => Err(ConfigError::Roster(format!(
                "risk agent {} is not configured",
                self.risk_agent
            ))),
        }
    }
}

/// Configuration for a single specialist agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialistConfig {
    pub name: String,
    /// Selects the system prompt.
    pub role: String,
    pub phase: Phase,
    /// Voting weight before confidence and mode adjustments.
    pub base_weight: Decimal,
    /// Multiplier applied only when the session mode is MUST_DEPLOY.
    #[serde(default = "default_modifier")]
    pub must_deploy_modifier: Decimal,
    /// Override model for this specialist. Falls back to `AgentsConfig::specialist_model`.
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SpecialistConfig {
    pub fn new(name: &str, role: &str, phase: Phase, base_weight: Decimal) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
            phase,
            base_weight,
            must_deploy_modifier: Decimal::ONE,
            model: None,
            enabled: true,
        }
    }
}

/// Asset universe and benchmark weights.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioConfig {
    /// The two volatile assets.
    pub risk_assets: Vec<String>,
    pub cash_asset: String,
    /// Target weight per asset, fractions summing to 1.
    pub benchmark: BTreeMap<String, Decimal>,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        let mut benchmark = BTreeMap::new();
        benchmark.insert("BTC".to_string(), Decimal::new(333, 3));
        benchmark.insert("ETH".to_string(), Decimal::new(333, 3));
        benchmark.insert("USDT".to_string(), Decimal::new(334, 3));
        Self {
            risk_assets: vec!["BTC".to_string(), "ETH".to_string()],
            cash_asset: "USDT".to_string(),
            benchmark,
        }
    }
}

impl PortfolioConfig {
    pub fn benchmark_weight(&self, asset: &str) -> Decimal {
        self.benchmark.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.risk_assets.len() != 2 {
            return Err(ConfigError::Portfolio(format!(
                "expected two risk assets, found {}",
                self.risk_assets.len()
            )));
        }
        if self.risk_assets[0] == self.risk_assets[1]
            || self.risk_assets.contains(&self.cash_asset)
        {
            return Err(ConfigError::Portfolio(
                "risk assets and cash asset must be distinct".to_string(),
            ));
        }
        for asset in self.risk_assets.iter().chain(std::iter::once(&self.cash_asset)) {
            if !self.benchmark.contains_key(asset) {
                return Err(ConfigError::Portfolio(format!(
                    "benchmark has no weight for {asset}"
                )));
            }
        }
        let sum: Decimal = self.benchmark.values().copied().sum();
        if (sum - Decimal::ONE).abs() > Decimal::new(1, 3) {
            return Err(ConfigError::Portfolio(format!(
                "benchmark weights sum to {sum}, expected 1"
            )));
        }
        Ok(())
    }
}

/// Exposure band, in percent of total portfolio value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExposureConfig {
    pub min_exposure_pct: Decimal,
    pub max_exposure_pct: Decimal,
    pub target_exposure_pct: Decimal,
    /// Cash share above which idle cash starts counting toward forced deployment.
    pub force_deploy_threshold_pct: Decimal,
    pub force_deploy_after_days: u32,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            min_exposure_pct: Decimal::from(20),
            max_exposure_pct: Decimal::from(80),
            target_exposure_pct: Decimal::from(66),
            force_deploy_threshold_pct: Decimal::from(50),
            force_deploy_after_days: 3,
        }
    }
}

impl ExposureConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let ordered = Decimal::ZERO <= self.min_exposure_pct
            && self.min_exposure_pct <= self.target_exposure_pct
            && self.target_exposure_pct <= self.max_exposure_pct
            && self.max_exposure_pct <= Decimal::ONE_HUNDRED;
        if !ordered {
            return Err(ConfigError::ExposureBand(format!(
                "need 0 <= min ({}) <= target ({}) <= max ({}) <= 100",
                self.min_exposure_pct, self.target_exposure_pct, self.max_exposure_pct
            )));
        }
        if self.force_deploy_threshold_pct < Decimal::ZERO
            || self.force_deploy_threshold_pct > Decimal::ONE_HUNDRED
        {
            return Err(ConfigError::ExposureBand(format!(
                "force_deploy_threshold_pct out of range: {}",
                self.force_deploy_threshold_pct
            )));
        }
        Ok(())
    }
}

/// One step of the confidence tier table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceTier {
    /// Lower bound on confidence expressed in percent (confidence x 10).
    pub min_pct: Decimal,
    pub multiplier: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusConfig {
    pub required_majority_fraction: Decimal,
    /// At or above this agreement the trade runs at full size.
    pub strong_majority_fraction: Decimal,
    /// Supermajority that lifts a SOFT_REJECT in MUST_DEPLOY sessions.
    pub override_threshold_fraction: Decimal,
    pub confidence_tiers: Vec<ConfidenceTier>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        let tier = |min_pct: i64, multiplier: Decimal| ConfidenceTier {
            min_pct: Decimal::from(min_pct),
            multiplier,
        };
        Self {
            required_majority_fraction: Decimal::new(6, 1),
            strong_majority_fraction: Decimal::new(8, 1),
            override_threshold_fraction: Decimal::new(7, 1),
            confidence_tiers: vec![
                tier(80, Decimal::TWO),
                tier(70, Decimal::new(15, 1)),
                tier(60, Decimal::ONE),
                tier(0, Decimal::new(5, 1)),
            ],
        }
    }
}

impl ConsensusConfig {
    /// Multiplier for a 0-10 confidence. Tiers are matched highest first.
    pub fn tier_multiplier(&self, confidence: Decimal) -> Decimal {
        let pct = confidence * Decimal::TEN;
        let mut tiers: Vec<&ConfidenceTier> = self.confidence_tiers.iter().collect();
        tiers.sort_by(|a, b| b.min_pct.cmp(&a.min_pct));
        tiers
            .into_iter()
            .find(|t| pct >= t.min_pct)
            .map(|t| t.multiplier)
            .unwrap_or(Decimal::ZERO)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let one = Decimal::ONE;
        let required = self.required_majority_fraction;
        if required <= Decimal::ZERO || required > one {
            return Err(ConfigError::Thresholds(format!(
                "required_majority_fraction must be in (0, 1], got {required}"
            )));
        }
        if self.override_threshold_fraction < required || self.override_threshold_fraction > one {
            return Err(ConfigError::Thresholds(format!(
                "override_threshold_fraction ({}) must be between the majority ({required}) and 1",
                self.override_threshold_fraction
            )));
        }
        if self.strong_majority_fraction < required || self.strong_majority_fraction > one {
            return Err(ConfigError::Thresholds(format!(
                "strong_majority_fraction ({}) must be between the majority ({required}) and 1",
                self.strong_majority_fraction
            )));
        }
        if self.confidence_tiers.is_empty() {
            return Err(ConfigError::Thresholds(
                "confidence_tiers must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisConfig {
    /// Absolute USD delta below which no order is emitted.
    pub min_rebalance_delta: Decimal,
    pub reduced_size_multiplier: Decimal,
    /// Stop distance in percent of the reference price. `None` disables stops,
    /// which makes every directional instruction fail validation.
    pub stop_loss_pct: Option<Decimal>,
    pub take_profit_pct: Option<Decimal>,
    #[serde(default)]
    pub order_type: OrderType,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            min_rebalance_delta: Decimal::from(10),
            reduced_size_multiplier: Decimal::new(5, 1),
            stop_loss_pct: Some(Decimal::from(5)),
            take_profit_pct: Some(Decimal::from(10)),
            order_type: OrderType::Market,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    /// Log and acknowledge without trading.
    #[default]
    DryRun,
    /// Hand instructions to the trader specialist.
    ClaudeTrader,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    pub venue: VenueKind,
    pub trader_model: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            venue: VenueKind::DryRun,
            trader_model: None,
            timeout_seconds: 120,
        }
    }
}

fn default_history_limit() -> usize {
    90
}
fn default_modifier() -> Decimal {
    Decimal::ONE
}
fn default_true() -> bool {
    true
}
