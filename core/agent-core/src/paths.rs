//! Path management for the agent output directory.
//!
//! Every working tree gets its own output directory (default
//! `<cwd>/agent-responses/`) holding:
//!
//! - `<agentId>.md`: one log per agent
//! - `<agentId>.launch.json`: transient launch spec, deleted by the runner
//! - `.active-pids.json`: the shared agent registry
//! - `.monitor-state.json`: the monitor's snapshot
//!
//! Tests construct `AgentPaths::with_dir(temp_dir)` for isolation.

use std::path::{Path, PathBuf};

use crate::error::{AgentError, Result};

/// Prefix shared by every agent id and therefore every log file name.
pub const AGENT_ID_PREFIX: &str = "agent_";

const REGISTRY_FILE: &str = ".active-pids.json";
const MONITOR_STATE_FILE: &str = ".monitor-state.json";

#[derive(Debug, Clone)]
pub struct AgentPaths {
    /// The working tree the output directory belongs to.
    cwd: PathBuf,
    dir: PathBuf,
}

impl AgentPaths {
    pub fn new(cwd: impl Into<PathBuf>, output_dir: &str) -> Self {
        let cwd = cwd.into();
        let dir = cwd.join(output_dir);
        Self { cwd, dir }
    }

    /// Uses `dir` directly as the output directory. Display paths are
    /// relative to its parent.
    pub fn with_dir(dir: PathBuf) -> Self {
        let cwd = dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.clone());
        Self { cwd, dir }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs_err::create_dir_all(&self.dir)
            .map_err(|e| AgentError::io("creating agent output directory", e))
    }

    pub fn registry_file(&self) -> PathBuf {
        self.dir.join(REGISTRY_FILE)
    }

    pub fn monitor_state_file(&self) -> PathBuf {
        self.dir.join(MONITOR_STATE_FILE)
    }

    pub fn log_file(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{}.md", agent_id))
    }

    pub fn launch_file(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{}.launch.json", agent_id))
    }

    /// Lists every agent log in the output directory, sorted by path.
    ///
    /// A missing directory yields an empty list.
    pub fn list_logs(&self) -> Vec<PathBuf> {
        let entries = match fs_err::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut logs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && agent_id_from_log(path).is_some())
            .collect();
        logs.sort();
        logs
    }

    /// Renders a path the way Claude Code file references read: `@relative/path`.
    pub fn display_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.cwd).unwrap_or(path);
        format!("@{}", rel.display())
    }
}

/// Extracts the agent id from a log file path (`.../agent_xyz.md` → `agent_xyz`).
pub fn agent_id_from_log(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("md") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.starts_with(AGENT_ID_PREFIX) && !stem.contains('.') {
        Some(stem.to_string())
    } else {
        None
    }
}
