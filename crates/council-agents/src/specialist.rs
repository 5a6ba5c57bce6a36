use async_trait::async_trait;
use council_models::config::{AgentsConfig, SpecialistConfig};
use council_models::recommendation::AgentRequest;
use serde_json::Value;

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::parse_payload;
use crate::prompts::{format_event_prompt, get_specialist_prompt};

/// A council member. Returns its raw JSON payload; validation happens in the
/// collector so that every specialist is held to the same rules.
#[async_trait]
pub trait SpecialistAgent: Send + Sync {
    fn name(&self) -> &str;
    fn role(&self) -> &str;

    async fn evaluate(&self, request: &AgentRequest) -> Result<Value, AgentError>;
}

/// A specialist backed by the Claude CLI.
pub struct ClaudeSpecialist {
    pub name: String,
    pub role: String,
    pub cli_config: ClaudeCliConfig,
}

impl ClaudeSpecialist {
    pub fn new(name: &str, role: &str, cli_config: ClaudeCliConfig) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
            cli_config,
        }
    }

    /// Build from roster configuration, falling back to the roster-wide model.
    pub fn from_config(spec: &SpecialistConfig, agents: &AgentsConfig) -> Self {
        let model = spec.model.as_deref().unwrap_or(&agents.specialist_model);
        let timeout = std::time::Duration::from_secs(agents.specialist_timeout_seconds);
        Self::new(&spec.name, &spec.role, ClaudeCliConfig::new(model, timeout))
    }
}

#[async_trait]
impl SpecialistAgent for ClaudeSpecialist {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> &str {
        &self.role
    }

    async fn evaluate(&self, request: &AgentRequest) -> Result<Value, AgentError> {
        let system_prompt = get_specialist_prompt(&self.role)
            .ok_or_else(|| AgentError::Cli(format!("No system prompt for role: {}", self.role)))?;

        let mut user_prompt = serde_json::to_string(request)?;
        if let Some(event) = &request.event {
            let alert = format_event_prompt(event);
            if !alert.is_empty() {
                user_prompt = format!("{alert}\n\n{user_prompt}");
            }
        }
        let raw_output = invoke_claude(&system_prompt, &user_prompt, &self.cli_config).await?;
        Ok(Value::Object(parse_payload(&raw_output)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use council_models::recommendation::Phase;
    use uuid::Uuid;

    fn request() -> AgentRequest {
        AgentRequest {
            request_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            phase: Phase::Analysis,
            portfolio: None,
            prior_phase_outputs: serde_json::Map::new(),
            session_mode: None,
            history: None,
            assets: vec!["BTC".to_string(), "ETH".to_string()],
            event: None,
        }
    }

    #[test]
    fn from_config_prefers_specialist_model() {
        let agents = AgentsConfig::default();
        let mut spec = agents.find("technical-analyst").unwrap().clone();
        let specialist = ClaudeSpecialist::from_config(&spec, &agents);
        assert_eq!(specialist.cli_config.model, "sonnet");
        assert_eq!(specialist.cli_config.timeout.as_secs(), 45);

        spec.model = Some("opus".to_string());
        let specialist = ClaudeSpecialist::from_config(&spec, &agents);
        assert_eq!(specialist.cli_config.model, "opus");
        assert_eq!(specialist.role(), "technical");
    }

    #[tokio::test]
    async fn unknown_role_fails_before_spawning() {
        let specialist = ClaudeSpecialist::new("tarot", "tarot", ClaudeCliConfig::default());
        let result = specialist.evaluate(&request()).await;
        assert!(matches!(result, Err(AgentError::Cli(msg)) if msg.contains("tarot")));
    }
}
