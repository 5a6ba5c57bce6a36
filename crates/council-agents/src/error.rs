use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Agent timed out after {0} seconds")]
    Timeout(u64),

    #[error("Agent task failed: {0}")]
    Task(String),

    #[error("Roster error: {0}")]
    Roster(String),

    #[error("Execution venue error: {0}")]
    Venue(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
