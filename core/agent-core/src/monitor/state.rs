//! Monitor snapshot (`.monitor-state.json`), keyed by absolute log path.
//!
//! Written only by the monitor, read at the start of every invocation and
//! written back atomically at the end. A corrupt snapshot reads as empty,
//! which at worst repeats notifications the parent already saw.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent_log::AgentStatus;
use crate::error::Result;
use crate::persist::{read_json_or_default, write_json_atomic};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileState {
    pub mtime_ms: u64,
    pub status: AgentStatus,
    pub size: u64,
    #[serde(default)]
    pub notified_completed: bool,
    #[serde(default)]
    pub notified_interrupted: bool,
    /// Complete body lines already scanned for update markers.
    #[serde(default)]
    pub last_update_line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorState {
    files: BTreeMap<String, FileState>,
}

impl MonitorState {
    pub fn load(path: &Path) -> Self {
        read_json_or_default(path, "monitor state")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn get(&self, key: &str) -> Option<&FileState> {
        self.files.get(key)
    }

    pub fn insert(&mut self, key: String, state: FileState) {
        self.files.insert(key, state);
    }

    /// Drops entries whose key is not in `live`.
    pub fn retain_keys(&mut self, live: &[String]) {
        self.files.retain(|key, _| live.contains(key));
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
