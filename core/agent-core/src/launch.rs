//! Launch spec (`<agentId>.launch.json`).
//!
//! Everything the runner and worker need, written by the spawn controller
//! before the runner starts. The runner deletes it once the worker exits.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::AgentContext;
use crate::error::{AgentError, Result};
use crate::persist::write_json_atomic;

/// Which CLI executes the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    #[default]
    Claude,
    Cursor,
}

impl Backend {
    /// Anthropic models (and no model at all) run on `claude`. Any other
    /// model name is routed to `cursor-agent`.
    pub fn for_model(model: Option<&str>) -> Self {
        let Some(model) = model.map(str::to_lowercase) else {
            return Backend::Claude;
        };
        let anthropic = ["sonnet", "opus", "haiku"]
            .iter()
            .any(|family| model.starts_with(family))
            || model.contains("claude");
        if anthropic {
            Backend::Claude
        } else {
            Backend::Cursor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpec {
    pub agent_id: String,
    pub agent_type: String,
    /// Depth the child runs at (requester depth + 1).
    pub depth: u32,
    pub cwd: PathBuf,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    /// `--mcp-config` payload, `{"mcpServers": {...}}`.
    pub mcp_config: Option<Value>,
    #[serde(default)]
    pub backend: Backend,
    pub allowed_agents: Option<Vec<String>>,
    pub allowed_mcp_servers: Option<Vec<String>>,
    pub claude_bin: String,
    pub cursor_bin: String,
    pub permission_mode: String,
    pub update_marker: String,
    pub timeout_secs: Option<u64>,
}

impl LaunchSpec {
    pub fn write(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn read(path: &Path, agent_id: &str) -> Result<Self> {
        let content = match fs_err::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(AgentError::LaunchSpecMissing(agent_id.to_string()))
            }
            Err(err) => return Err(AgentError::io("reading launch spec", err)),
        };
        serde_json::from_str(&content).map_err(|e| AgentError::json("parsing launch spec", e))
    }

    /// Environment variables identifying the child to its own hooks.
    pub fn child_env(&self) -> Vec<(String, String)> {
        AgentContext::child_env(&self.agent_id, &self.agent_type, self.depth)
    }
}
