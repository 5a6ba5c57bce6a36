use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;

/// Executable, model and deadline used for one specialist's CLI calls.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    /// Executable name or path.
    pub program: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            model: "sonnet".to_string(),
            timeout: Duration::from_secs(45),
        }
    }
}

impl ClaudeCliConfig {
    pub fn new(model: &str, timeout: Duration) -> Self {
        Self {
            model: model.to_string(),
            timeout,
            ..Self::default()
        }
    }

    /// One-shot text-mode invocation. The child dies with the handle.
    fn command(&self, system_prompt: &str, user_prompt: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-p")
            .arg(user_prompt)
            .arg("--system-prompt")
            .arg(system_prompt)
            .arg("--model")
            .arg(&self.model)
            .arg("--output-format")
            .arg("text")
            .kill_on_drop(true);
        command
    }
}

/// Send one prompt pair to the specialist process and hand back its stdout.
/// Exceeding `config.timeout` drops the child.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(
        program = %config.program,
        model = %config.model,
        prompt_bytes = user_prompt.len(),
        "Spawning specialist process"
    );

    let mut command = config.command(system_prompt, user_prompt);
    let output = match tokio::time::timeout(config.timeout, command.output()).await {
        Err(_) => return Err(AgentError::Timeout(config.timeout.as_secs())),
        Ok(Err(e)) => {
            return Err(AgentError::Cli(format!("could not start {}: {e}", config.program)))
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        warn!(
            program = %config.program,
            status = %output.status,
            stderr = %stderr,
            "Specialist process failed"
        );
        return Err(AgentError::Cli(format!(
            "{} failed with {}: {stderr}",
            config.program, output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if stdout.trim().is_empty() {
        return Err(AgentError::Cli(format!("{} produced no output", config.program)));
    }
    Ok(stdout)
}

/// True when `program --version` runs and exits cleanly.
pub async fn check_cli_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_sonnet_on_path() {
        let config = ClaudeCliConfig::default();
        assert_eq!(config.program, "claude");
        assert_eq!(config.model, "sonnet");
        assert_eq!(config.timeout, Duration::from_secs(45));
    }

    #[test]
    fn command_passes_model_and_prompts() {
        let config = ClaudeCliConfig::new("opus", Duration::from_secs(5));
        let command = config.command("be terse", "{\"phase\":\"analysis\"}");
        let args: Vec<_> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "-p",
                "{\"phase\":\"analysis\"}",
                "--system-prompt",
                "be terse",
                "--model",
                "opus",
                "--output-format",
                "text"
            ]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_a_cli_error() {
        let config = ClaudeCliConfig {
            program: "definitely-not-a-real-claude-binary".to_string(),
            ..ClaudeCliConfig::default()
        };
        let result = invoke_claude("system", "user", &config).await;
        assert!(matches!(result, Err(AgentError::Cli(msg)) if msg.starts_with("could not start")));
        assert!(!check_cli_available(&config.program).await);
    }
}
