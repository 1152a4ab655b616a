//! Shared agent registry (`.active-pids.json`).
//!
//! Maps agent id to lifecycle metadata. Every component reads and writes it;
//! none owns it.
//!
//! # Consistency
//!
//! There is no file lock. Each mutation is a whole-file read-modify-write and
//! the last writer wins. Writes are atomic (temp file + rename), so a reader
//! never sees a torn file, but two concurrent mutations can lose one update.
//!
//! # Defensive Design
//!
//! A missing, empty or corrupt registry reads as empty. Agents keep running
//! when the registry is lost; only notifications may be skipped.
//!
//! # File Format
//!
//! ```json
//! {
//!   "agent_01hx...": {
//!     "pid": 4242,
//!     "depth": 0,
//!     "parentId": null,
//!     "agentType": "researcher",
//!     "allowedAgents": null,
//!     "allowedMcpServers": ["github"]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::persist::{read_json_or_default, write_json_atomic};

/// Lifecycle metadata for one spawned agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    /// Runner process id. `None` until the OS returns it.
    pub pid: Option<u32>,
    pub depth: u32,
    pub parent_id: Option<String>,
    pub agent_type: String,
    /// `None` means unrestricted; `Some(vec![])` permits nothing.
    pub allowed_agents: Option<Vec<String>>,
    pub allowed_mcp_servers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_mcp_servers: Vec<String>,
    /// Process start time (unix seconds) recorded alongside `pid` to detect
    /// PID reuse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proc_started: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AgentRecord {
    pub fn new(agent_type: impl Into<String>, depth: u32, parent_id: Option<String>) -> Self {
        Self {
            pid: None,
            depth,
            parent_id,
            agent_type: agent_type.into(),
            allowed_agents: None,
            allowed_mcp_servers: None,
            missing_mcp_servers: Vec::new(),
            proc_started: None,
            session_id: None,
        }
    }

    /// True when `invoker` spawned this agent. A root invoker (`None`) owns
    /// the agents that have no parent.
    pub fn is_owned_by(&self, invoker: Option<&str>) -> bool {
        self.parent_id.as_deref() == invoker
    }
}

pub type RegistryMap = BTreeMap<String, AgentRecord>;

/// Handle to the registry file. Holds no cached state.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
}

impl Registry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole mapping. Never fails.
    pub fn read(&self) -> RegistryMap {
        read_json_or_default(&self.path, "agent registry")
    }

    /// Atomically replaces the whole mapping.
    pub fn write(&self, map: &RegistryMap) -> Result<()> {
        write_json_atomic(&self.path, map)
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentRecord> {
        self.read().remove(agent_id)
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.read().contains_key(agent_id)
    }

    /// Creates or replaces an entry.
    pub fn insert(&self, agent_id: &str, record: AgentRecord) -> Result<()> {
        let mut map = self.read();
        map.insert(agent_id.to_string(), record);
        self.write(&map)
    }

    /// Applies `f` to an existing entry and writes back.
    ///
    /// Returns `false` without writing if the entry is gone (e.g. removed
    /// concurrently by the monitor).
    pub fn update<F>(&self, agent_id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut AgentRecord),
    {
        let mut map = self.read();
        let Some(record) = map.get_mut(agent_id) else {
            return Ok(false);
        };
        f(record);
        self.write(&map)?;
        Ok(true)
    }

    /// Sets the pid of an existing entry. No-op if the entry was deleted.
    pub fn upsert_pid(&self, agent_id: &str, pid: u32, proc_started: Option<u64>) -> Result<bool> {
        let updated = self.update(agent_id, |record| {
            record.pid = Some(pid);
            record.proc_started = proc_started;
        })?;
        if !updated {
            tracing::debug!(agent_id, pid, "Registry entry gone, pid not recorded");
        }
        Ok(updated)
    }

    /// Sets the pid only if none is recorded yet. The runner records the
    /// worker pid, which must not be replaced by the runner's own pid.
    pub fn record_pid_if_unset(
        &self,
        agent_id: &str,
        pid: u32,
        proc_started: Option<u64>,
    ) -> Result<bool> {
        let mut recorded = false;
        self.update(agent_id, |record| {
            if record.pid.is_none() {
                record.pid = Some(pid);
                record.proc_started = proc_started;
                recorded = true;
            }
        })?;
        Ok(recorded)
    }

    pub fn set_session_id(&self, agent_id: &str, session_id: &str) -> Result<bool> {
        self.update(agent_id, |record| {
            record.session_id = Some(session_id.to_string());
        })
    }

    /// Removes an entry. Returns whether it existed.
    pub fn remove(&self, agent_id: &str) -> Result<bool> {
        let mut map = self.read();
        if map.remove(agent_id).is_none() {
            return Ok(false);
        }
        self.write(&map)?;
        Ok(true)
    }
}
