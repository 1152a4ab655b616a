//! Identity of whoever is invoking a hook.
//!
//! Read once from the environment at the entrypoint, then passed explicitly.
//! A root Claude session has no agent id and depth 0; a spawned agent's worker
//! carries its id, type and depth into every hook its session fires.

pub const ENV_AGENT_ID: &str = "CLAUDE_AGENT_ID";
pub const ENV_AGENT_TYPE: &str = "CLAUDE_AGENT_TYPE";
pub const ENV_AGENT_DEPTH: &str = "CLAUDE_AGENT_DEPTH";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentContext {
    pub agent_id: Option<String>,
    pub agent_type: Option<String>,
    pub depth: u32,
}

impl AgentContext {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let depth = non_empty(ENV_AGENT_DEPTH)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(0);
        Self {
            agent_id: non_empty(ENV_AGENT_ID),
            agent_type: non_empty(ENV_AGENT_TYPE),
            depth,
        }
    }

    pub fn is_root(&self) -> bool {
        self.agent_id.is_none()
    }

    /// Environment a child spawned by this context runs with.
    pub fn child_env(agent_id: &str, agent_type: &str, depth: u32) -> Vec<(String, String)> {
        vec![
            (ENV_AGENT_ID.to_string(), agent_id.to_string()),
            (ENV_AGENT_TYPE.to_string(), agent_type.to_string()),
            (ENV_AGENT_DEPTH.to_string(), depth.to_string()),
        ]
    }
}
