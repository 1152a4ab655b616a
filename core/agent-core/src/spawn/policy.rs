//! Spawn admission rules. Pure functions over the request and the requester's
//! declared restrictions; no I/O.

use std::fmt;

/// What the requesting agent is allowed to do, from its registry entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restrictions {
    /// `None` is unrestricted. `Some(vec![])` permits nothing.
    pub allowed_agents: Option<Vec<String>>,
    pub allowed_mcp_servers: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SpawnCheck<'a> {
    pub current_depth: u32,
    pub max_depth: u32,
    pub requester_type: Option<&'a str>,
    pub requested_type: &'a str,
    /// MCP servers the requested agent's definition asks for.
    pub requested_mcp_servers: &'a [String],
    pub restrictions: &'a Restrictions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnRejection {
    DepthExceeded { depth: u32, max: u32 },
    SelfSpawn { agent_type: String },
    AgentNotAllowed { requested: String, allowed: Vec<String> },
    McpServerNotAllowed { server: String, allowed: Vec<String> },
}

impl fmt::Display for SpawnRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnRejection::DepthExceeded { depth, max } => write!(
                f,
                "Max recursion depth reached ({}/{}). Complete this task directly instead of delegating.",
                depth, max
            ),
            SpawnRejection::SelfSpawn { agent_type } => write!(
                f,
                "An agent cannot spawn another '{}' agent. Complete this task directly.",
                agent_type
            ),
            SpawnRejection::AgentNotAllowed { requested, allowed } => write!(
                f,
                "This agent can only spawn: {}. '{}' is not allowed.",
                join_or_none(allowed),
                requested
            ),
            SpawnRejection::McpServerNotAllowed { server, allowed } => write!(
                f,
                "This agent can only grant MCP servers: {}. '{}' is not allowed.",
                join_or_none(allowed),
                server
            ),
        }
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Checks a spawn request. Rules apply in order: depth, self-spawn, agent
/// allow-list, MCP allow-list.
pub fn check_spawn(check: &SpawnCheck<'_>) -> Result<(), SpawnRejection> {
    if check.current_depth >= check.max_depth {
        return Err(SpawnRejection::DepthExceeded {
            depth: check.current_depth,
            max: check.max_depth,
        });
    }

    if check.requester_type == Some(check.requested_type) {
        return Err(SpawnRejection::SelfSpawn {
            agent_type: check.requested_type.to_string(),
        });
    }

    if let Some(allowed) = &check.restrictions.allowed_agents {
        if !allowed.iter().any(|a| a == check.requested_type) {
            return Err(SpawnRejection::AgentNotAllowed {
                requested: check.requested_type.to_string(),
                allowed: allowed.clone(),
            });
        }
    }

    if let Some(allowed) = &check.restrictions.allowed_mcp_servers {
        if let Some(server) = check
            .requested_mcp_servers
            .iter()
            .find(|s| !allowed.contains(s))
        {
            return Err(SpawnRejection::McpServerNotAllowed {
                server: server.clone(),
                allowed: allowed.clone(),
            });
        }
    }

    Ok(())
}

/// Restrictions the child runs under: its own definition's lists when
/// declared, otherwise the requester's.
pub fn child_restrictions(
    declared_agents: Option<&Vec<String>>,
    declared_mcp: Option<&Vec<String>>,
    requester: &Restrictions,
) -> Restrictions {
    Restrictions {
        allowed_agents: declared_agents
            .cloned()
            .or_else(|| requester.allowed_agents.clone()),
        allowed_mcp_servers: declared_mcp
            .cloned()
            .or_else(|| requester.allowed_mcp_servers.clone()),
    }
}
