pub mod config;
pub mod consensus;
pub mod exposure;
pub mod instruction;
pub mod ledger_schema;
pub mod portfolio;
pub mod recommendation;
pub mod session;

pub use config::{
    AgentsConfig, ConfidenceTier, ConfigError, ConsensusConfig, CouncilConfig, ExecutionConfig,
    ExposureConfig, LedgerConfig, PortfolioConfig, SpecialistConfig, SynthesisConfig, VenueKind,
};
pub use consensus::{AssetVerdict, ConsensusResult, DirectionTotals, ExecutionMode};
pub use exposure::{ExposureAssessment, ExposureHistory, ExposureState, SessionMode};
pub use instruction::{
    ExecutionReport, InstructionPurpose, OrderSide, OrderType, RejectedInstruction,
    TradeInstruction,
};
pub use ledger_schema::LedgerRow;
pub use portfolio::{AssetPosition, CashPosition, PortfolioSnapshot, SnapshotError};
pub use recommendation::{
    AgentRecommendation, AgentRequest, Direction, Phase, RecommendationKind, VetoCategory, Vote,
    PORTFOLIO_WIDE,
};
pub use session::{
    ActivityStatus, AgentActivity, PhaseOutcome, PhaseStatus, SessionFault, SessionOutcome,
    SessionRecord,
};
