//! Agent definitions (`<agents_dir>/<agentType>.md`).
//!
//! A definition is optional markdown with a `---` frontmatter block:
//!
//! ```text
//! ---
//! model: sonnet
//! allowed-agents: [reviewer, tester]
//! mcp-servers: none
//! ---
//! You are a focused research agent...
//! ```
//!
//! The body becomes the worker's appended system prompt. A missing list key
//! means unrestricted (`None`); `none` or `[]` means nothing is permitted.

use std::path::Path;

use crate::patterns::{RE_FRONTMATTER, RE_FRONTMATTER_FIELD};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentDefinition {
    pub model: Option<String>,
    pub allowed_agents: Option<Vec<String>>,
    pub mcp_servers: Option<Vec<String>>,
    pub system_prompt: Option<String>,
}

impl AgentDefinition {
    pub fn parse(content: &str) -> Self {
        let Some(caps) = RE_FRONTMATTER.captures(content) else {
            return Self {
                system_prompt: non_empty(content),
                ..Self::default()
            };
        };

        let mut def = Self::default();
        for field in RE_FRONTMATTER_FIELD.captures_iter(&caps[1]) {
            let value = &field[2];
            match &field[1] {
                "model" => def.model = non_empty(unquote(value)),
                "allowed-agents" | "allowedAgents" | "allowed_agents" => {
                    def.allowed_agents = Some(parse_list(value))
                }
                "mcp-servers" | "mcpServers" | "mcp_servers" => {
                    def.mcp_servers = Some(parse_list(value))
                }
                _ => {}
            }
        }

        let body_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
        def.system_prompt = non_empty(&content[body_start..]);
        def
    }
}

/// Loads the definition for `agent_type`, or `None` if no file exists.
///
/// Type names that would escape the definitions directory are ignored.
pub fn load_definition(agents_dir: &Path, agent_type: &str) -> Option<AgentDefinition> {
    if agent_type.is_empty()
        || agent_type.contains('/')
        || agent_type.contains('\\')
        || agent_type.contains("..")
    {
        tracing::warn!(agent_type, "Ignoring suspicious agent type name");
        return None;
    }

    let path = agents_dir.join(format!("{}.md", agent_type));
    match fs_err::read_to_string(&path) {
        Ok(content) => Some(AgentDefinition::parse(&content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to read agent definition");
            None
        }
    }
}

/// Parses `[a, b]`, `a, b`, `none` or `[]` into a list.
fn parse_list(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .map(unquote)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '"' || c == '\'')
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
