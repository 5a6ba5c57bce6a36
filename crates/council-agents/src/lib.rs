pub mod claude_cli;
pub mod collector;
pub mod consensus;
pub mod error;
pub mod execution;
pub mod exposure;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod scheduler;
pub mod specialist;
pub mod synthesizer;

pub mod test_support;

pub use consensus::ConsensusEngine;
pub use error::AgentError;
pub use execution::{ClaudeTraderVenue, DryRunVenue, ExecutionVenue};
pub use orchestrator::{Orchestrator, SpecialistRoster};
pub use specialist::{ClaudeSpecialist, SpecialistAgent};
pub use synthesizer::{synthesize, SynthesisParams};
