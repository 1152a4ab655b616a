//! MCP server resolution for spawned agents.
//!
//! Names listed in an agent definition are looked up in the project's
//! `.mcp.json` first, then the user's `~/.claude.json`. Both files keep their
//! servers under a top-level `mcpServers` object.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct McpResolution {
    pub servers: BTreeMap<String, Value>,
    /// Requested names not found in any source.
    pub missing: Vec<String>,
}

impl McpResolution {
    /// Renders the `--mcp-config` payload, or `None` when nothing resolved.
    pub fn config_json(&self) -> Option<Value> {
        if self.servers.is_empty() {
            return None;
        }
        Some(json!({ "mcpServers": self.servers }))
    }
}

/// Config files to search, in priority order.
pub fn default_sources(cwd: &Path) -> Vec<PathBuf> {
    let mut sources = vec![cwd.join(".mcp.json")];
    if let Some(home) = dirs::home_dir() {
        sources.push(home.join(".claude.json"));
    }
    sources
}

pub fn resolve_servers(names: &[String], sources: &[PathBuf]) -> McpResolution {
    let tables: Vec<serde_json::Map<String, Value>> =
        sources.iter().filter_map(|p| read_servers(p)).collect();

    let mut resolution = McpResolution::default();
    for name in names {
        match tables.iter().find_map(|t| t.get(name)) {
            Some(config) => {
                resolution.servers.insert(name.clone(), config.clone());
            }
            None => {
                tracing::warn!(server = %name, "MCP server not found in any config");
                resolution.missing.push(name.clone());
            }
        }
    }
    resolution
}

fn read_servers(path: &Path) -> Option<serde_json::Map<String, Value>> {
    let content = fs_err::read_to_string(path).ok()?;
    let mut value: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Ignoring malformed MCP config");
            return None;
        }
    };
    match value.get_mut("mcpServers").map(Value::take) {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}
