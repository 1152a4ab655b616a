//! Completion/interruption monitor.
//!
//! Invoked once per hook event, never as a loop. Each invocation scans the
//! agent logs, diffs them against the persisted snapshot and returns the
//! notifications the invoker has not seen yet. Running it twice with no file
//! changes yields nothing the second time.
//!
//! An invoker is only told about its direct children. When the registry entry
//! is already gone, ownership is unknown and the notification goes out.

pub mod state;

use std::fmt;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::agent_log::{parse_body, parse_status, AgentLog, AgentStatus};
use crate::error::Result;
use crate::liveness::LivenessProbe;
use crate::paths::{agent_id_from_log, AgentPaths};
use crate::registry::{AgentRecord, Registry};

pub use state::{FileState, MonitorState};

/// `reason` values that indicate the invoking session was cut short.
const INTERRUPT_REASONS: &[&str] = &[
    "interrupt",
    "interrupted",
    "user_interrupt",
    "abort",
    "aborted",
    "cancelled",
    "canceled",
    "prompt_input_exit",
];

/// Hook events that indicate a session ended.
const INTERRUPT_EVENTS: &[&str] = &["SubagentStop", "SessionEnd"];

/// Who invoked the monitor and why.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorInvocation {
    pub event: String,
    pub reason: Option<String>,
    /// Agent id of the invoker. `None` for a root session.
    pub invoker: Option<String>,
}

impl MonitorInvocation {
    pub fn suggests_interruption(&self) -> bool {
        INTERRUPT_EVENTS.contains(&self.event.as_str())
            || self
                .reason
                .as_deref()
                .is_some_and(|r| INTERRUPT_REASONS.contains(&r.to_ascii_lowercase().as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Completed { path: String },
    Failed { path: String },
    Interrupted { path: String },
    Update { path: String, lines: Vec<String> },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Completed { path } => write!(f, "Agent completed: {}", path),
            Notification::Failed { path } => write!(f, "Agent failed: {}", path),
            Notification::Interrupted { path } => write!(f, "Agent interrupted: {}", path),
            Notification::Update { path, lines } => {
                write!(f, "Agent update ({}): {}", path, lines.join("\n"))
            }
        }
    }
}

/// Joins notifications into the single message returned to the invoker.
pub fn combine(notifications: &[Notification]) -> Option<String> {
    if notifications.is_empty() {
        return None;
    }
    Some(
        notifications
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

pub struct Monitor<P: LivenessProbe> {
    paths: AgentPaths,
    marker: String,
    probe: P,
}

struct Observation {
    mtime_ms: u64,
    size: u64,
    status: AgentStatus,
    content: String,
}

fn observe(path: &Path) -> Option<Observation> {
    let content = match fs_err::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "Skipping unreadable log");
            return None;
        }
    };
    let meta = fs_err::metadata(path).ok()?;
    let mtime_ms = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Some(Observation {
        mtime_ms,
        size: meta.len(),
        status: parse_status(&content),
        content,
    })
}

impl<P: LivenessProbe> Monitor<P> {
    pub fn new(paths: AgentPaths, marker: impl Into<String>, probe: P) -> Self {
        Self {
            paths,
            marker: marker.into(),
            probe,
        }
    }

    pub fn run(&self, invocation: &MonitorInvocation) -> Result<Vec<Notification>> {
        let logs = self.paths.list_logs();
        let registry = Registry::new(self.paths.registry_file());
        let records = registry.read();
        let state_path = self.paths.monitor_state_file();
        let mut state = MonitorState::load(&state_path);
        let before = state.clone();
        let invoker = invocation.invoker.as_deref();
        let mut notifications = Vec::new();
        let mut live_keys = Vec::with_capacity(logs.len());

        for path in &logs {
            let key = path.display().to_string();
            live_keys.push(key.clone());
            let Some(agent_id) = agent_id_from_log(path) else {
                continue;
            };
            let Some(mut seen) = observe(path) else {
                continue;
            };
            let record = records.get(&agent_id);
            let owned = record.map_or(true, |r| r.is_owned_by(invoker));

            if invocation.suggests_interruption() && seen.status == AgentStatus::InProgress {
                let reclaimed = self
                    .reclaim_orphan(path, &agent_id, record, owned, &registry)
                    .unwrap_or_else(|err| {
                        tracing::warn!(
                            agent_id = %agent_id,
                            error = %err,
                            "Failed to reclaim orphaned agent"
                        );
                        false
                    });
                if reclaimed {
                    match observe(path) {
                        Some(after) => seen = after,
                        None => continue,
                    }
                }
            }

            if !owned {
                continue;
            }

            let previous = state.get(&key).cloned();
            let unchanged = previous.as_ref().is_some_and(|p| {
                p.mtime_ms == seen.mtime_ms && p.status == seen.status && p.size == seen.size
            });
            if unchanged {
                continue;
            }

            let mut next = FileState {
                mtime_ms: seen.mtime_ms,
                status: seen.status,
                size: seen.size,
                notified_completed: previous.as_ref().is_some_and(|p| p.notified_completed),
                notified_interrupted: previous.as_ref().is_some_and(|p| p.notified_interrupted),
                last_update_line: previous.as_ref().map_or(0, |p| p.last_update_line),
            };
            let display = self.paths.display_path(path);

            match seen.status {
                AgentStatus::Done | AgentStatus::Failed if !next.notified_completed => {
                    notifications.push(if seen.status == AgentStatus::Done {
                        Notification::Completed { path: display }
                    } else {
                        Notification::Failed { path: display }
                    });
                    next.notified_completed = true;
                    forget(&registry, &agent_id);
                }
                AgentStatus::Interrupted if !next.notified_interrupted => {
                    notifications.push(Notification::Interrupted { path: display });
                    next.notified_interrupted = true;
                    forget(&registry, &agent_id);
                }
                AgentStatus::InProgress => {
                    let body = parse_body(&seen.content);
                    let complete = complete_lines(body);
                    if previous.is_some() {
                        let lines = self.marked_lines(&complete, next.last_update_line);
                        if !lines.is_empty() {
                            notifications.push(Notification::Update {
                                path: display,
                                lines,
                            });
                        }
                    }
                    next.last_update_line = complete.len();
                }
                _ => {}
            }

            state.insert(key, next);
        }

        state.retain_keys(&live_keys);
        if state != before {
            state.save(&state_path)?;
        }

        if !notifications.is_empty() {
            tracing::info!(
                count = notifications.len(),
                event = %invocation.event,
                invoker = ?invoker,
                "Monitor queued notifications"
            );
        }
        Ok(notifications)
    }

    /// Marks a running log `interrupted` when its recorded process is gone.
    ///
    /// The registry entry of an agent the invoker does not own is kept, so
    /// its real parent still learns about it.
    fn reclaim_orphan(
        &self,
        path: &Path,
        agent_id: &str,
        record: Option<&AgentRecord>,
        owned: bool,
        registry: &Registry,
    ) -> Result<bool> {
        let Some((pid, started)) = record.and_then(|r| r.pid.map(|pid| (pid, r.proc_started)))
        else {
            return Ok(false);
        };
        if !self.probe.probe(pid, started).is_dead() {
            return Ok(false);
        }

        let log = AgentLog::new(path);
        let reclaimed = log.interrupt(&format!(
            "Agent process {} is no longer running; marked interrupted.",
            pid
        ))?;
        if reclaimed {
            tracing::info!(agent_id, pid, "Reclaimed orphaned agent");
            if owned {
                forget(registry, agent_id);
            }
        }
        Ok(reclaimed)
    }

    /// Text after the marker on each line past `cursor`.
    fn marked_lines(&self, lines: &[&str], cursor: usize) -> Vec<String> {
        if self.marker.is_empty() {
            return Vec::new();
        }
        lines
            .iter()
            .skip(cursor)
            .filter_map(|line| {
                let at = line.find(&self.marker)?;
                let text = line[at + self.marker.len()..].trim();
                (!text.is_empty()).then(|| text.to_string())
            })
            .collect()
    }
}

/// Body lines terminated by a newline. A trailing partial line is still
/// being written and is left for a later invocation.
fn complete_lines(body: &str) -> Vec<&str> {
    body.split_inclusive('\n')
        .filter(|line| line.ends_with('\n'))
        .map(|line| line.trim_end_matches(['\n', '\r']))
        .collect()
}

fn forget(registry: &Registry, agent_id: &str) {
    if let Err(err) = registry.remove(agent_id) {
        tracing::warn!(agent_id, error = %err, "Failed to remove registry entry");
    }
}
