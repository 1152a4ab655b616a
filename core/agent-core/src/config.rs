//! Runtime configuration for the agent hooks.
//!
//! Read from `~/.claude/agent-hooks.toml` (or `$AGENT_HOOKS_CONFIG`). Every key
//! is optional; a missing file yields defaults.

use crate::error::{AgentError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Maximum recursion depth for nested agent spawns. Root callers are depth 0.
pub const MAX_DEPTH: u32 = 3;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "AGENT_HOOKS_CONFIG";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HooksConfig {
    pub max_depth: u32,
    /// Output directory, relative to the working tree.
    pub output_dir: String,
    pub claude_bin: String,
    /// Runs agents whose model is not an Anthropic one.
    pub cursor_bin: String,
    pub permission_mode: String,
    /// Directory of agent definition files. `None` means `~/.claude/agents`.
    pub agents_dir: Option<PathBuf>,
    /// Supervisor kills the worker after this many seconds.
    pub timeout_secs: Option<u64>,
    pub update_marker: String,
    /// Tool names whose PreToolUse is converted into a background spawn.
    pub intercept_tools: Vec<String>,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            output_dir: "agent-responses".to_string(),
            claude_bin: "claude".to_string(),
            cursor_bin: "cursor-agent".to_string(),
            permission_mode: "bypassPermissions".to_string(),
            agents_dir: None,
            timeout_secs: None,
            update_marker: "📝".to_string(),
            intercept_tools: vec!["Task".to_string(), "Agent".to_string()],
        }
    }
}

impl HooksConfig {
    pub fn intercepts(&self, tool_name: &str) -> bool {
        self.intercept_tools.iter().any(|t| t == tool_name)
    }

    /// Resolves the agent definitions directory.
    pub fn agents_dir(&self) -> Option<PathBuf> {
        self.agents_dir
            .clone()
            .or_else(|| claude_dir().map(|d| d.join("agents")))
    }
}

/// Returns the path to the Claude directory (~/.claude).
pub fn claude_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".claude"))
}

pub fn default_config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    claude_dir()
        .map(|d| d.join("agent-hooks.toml"))
        .ok_or(AgentError::HomeDirNotFound)
}

/// Loads configuration from `path`, or the default location when `None`.
pub fn load_config(path: Option<&Path>) -> Result<HooksConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(HooksConfig::default());
    }

    let content = fs_err::read_to_string(&config_path)
        .map_err(|e| AgentError::io(format!("reading {}", config_path.display()), e))?;
    toml::from_str::<HooksConfig>(&content).map_err(|err| AgentError::Config {
        path: config_path.clone(),
        details: err.to_string(),
    })
}

/// Like [`load_config`], but a malformed or unreadable file degrades to defaults.
pub fn load_config_or_default(path: Option<&Path>) -> HooksConfig {
    match load_config(path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "Falling back to default hook configuration");
            HooksConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("missing.toml");
        let config = load_config(Some(&path)).expect("load config");
        assert_eq!(config, HooksConfig::default());
        assert_eq!(config.max_depth, MAX_DEPTH);
    }

    #[test]
    fn load_config_merges_partial_file_with_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("agent-hooks.toml");
        fs_err::write(
            &path,
            r#"
max_depth = 2
output_dir = "out"
timeout_secs = 600
intercept_tools = ["Task"]
"#,
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("load config");
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.output_dir, "out");
        assert_eq!(config.timeout_secs, Some(600));
        assert!(config.intercepts("Task"));
        assert!(!config.intercepts("Agent"));
        assert_eq!(config.claude_bin, "claude");
        assert_eq!(config.cursor_bin, "cursor-agent");
    }

    #[test]
    fn malformed_config_reports_path_and_degrades() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("agent-hooks.toml");
        fs_err::write(&path, "max_depth = \"lots\"").expect("write config");

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("agent-hooks.toml"));
        assert_eq!(load_config_or_default(Some(&path)), HooksConfig::default());
    }
}
