//! Per-agent markdown log (`<agentId>.md`).
//!
//! # File Format
//!
//! ```text
//! ---
//! Task: Survey the parser
//! Instructions: Read src/parser and list
//!   every public entry point.
//! Started: 2026-01-01T00:00:00Z
//! Status: in-progress
//! Depth: 0
//! ParentAgent: root
//! ---
//!
//! <body: streamed assistant output>
//! ```
//!
//! Multi-line instructions are indented on continuation lines so that no body
//! or prompt text can impersonate a header field or close the header early.
//!
//! # Status Contract
//!
//! Status moves one way: `in-progress` to `done`, `failed` or `interrupted`.
//! [`AgentLog::finalize`] is the only rewrite of header text and refuses to
//! touch a log that is already terminal. The body is append-only.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use regex::NoExpand;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::patterns::RE_STATUS_LINE;

const HEADER_OPEN: &str = "---\n";
const HEADER_CLOSE: &str = "\n---\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentStatus {
    InProgress,
    Done,
    Failed,
    Interrupted,
    /// Header missing or status token not recognised.
    #[serde(other)]
    Unknown,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::InProgress => "in-progress",
            AgentStatus::Done => "done",
            AgentStatus::Failed => "failed",
            AgentStatus::Interrupted => "interrupted",
            AgentStatus::Unknown => "unknown",
        }
    }

    pub fn parse(token: &str) -> Self {
        match token {
            "in-progress" => AgentStatus::InProgress,
            "done" => AgentStatus::Done,
            "failed" => AgentStatus::Failed,
            "interrupted" => AgentStatus::Interrupted,
            _ => AgentStatus::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentStatus::Done | AgentStatus::Failed | AgentStatus::Interrupted
        )
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields written once when the log is created.
#[derive(Debug, Clone)]
pub struct LogHeader {
    pub task: String,
    pub instructions: String,
    pub started: DateTime<Utc>,
    pub depth: u32,
    pub parent_id: Option<String>,
}

impl LogHeader {
    fn render(&self) -> String {
        let task = self.task.split_whitespace().collect::<Vec<_>>().join(" ");
        let instructions = self
            .instructions
            .trim_end()
            .lines()
            .collect::<Vec<_>>()
            .join("\n  ");
        format!(
            "---\nTask: {}\nInstructions: {}\nStarted: {}\nStatus: {}\nDepth: {}\nParentAgent: {}\n---\n\n",
            task,
            instructions,
            timestamp(self.started),
            AgentStatus::InProgress,
            self.depth,
            self.parent_id.as_deref().unwrap_or("root"),
        )
    }
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Splits a log into (header, body). The header includes both `---` lines.
fn split_header(content: &str) -> Option<(&str, &str)> {
    if !content.starts_with(HEADER_OPEN) {
        return None;
    }
    let close = content[HEADER_OPEN.len() - 1..].find(HEADER_CLOSE)? + HEADER_OPEN.len() - 1;
    let header_end = close + HEADER_CLOSE.len();
    let body = &content[header_end..];
    Some((&content[..header_end], body.strip_prefix('\n').unwrap_or(body)))
}

/// Reads the status field from log text.
pub fn parse_status(content: &str) -> AgentStatus {
    split_header(content)
        .and_then(|(header, _)| RE_STATUS_LINE.captures(header))
        .map(|caps| AgentStatus::parse(&caps[1]))
        .unwrap_or(AgentStatus::Unknown)
}

/// Returns the body portion of log text (everything after the header).
pub fn parse_body(content: &str) -> &str {
    split_header(content).map(|(_, body)| body).unwrap_or(content)
}

/// Handle to one agent's log file.
#[derive(Debug, Clone)]
pub struct AgentLog {
    path: PathBuf,
}

impl AgentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the log with an `in-progress` header. Fails if it already exists.
    pub fn create(path: impl Into<PathBuf>, header: &LogHeader) -> Result<Self> {
        let log = Self::new(path);
        let mut file = fs_err::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&log.path)
            .map_err(|e| AgentError::io("creating agent log", e))?;
        file.write_all(header.render().as_bytes())
            .map_err(|e| AgentError::io("writing agent log header", e))?;
        Ok(log)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn read(&self) -> Result<String> {
        fs_err::read_to_string(&self.path).map_err(|e| AgentError::io("reading agent log", e))
    }

    /// Appends raw text to the body.
    pub fn append(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let mut file = fs_err::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| AgentError::io("opening agent log", e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| AgentError::io("appending to agent log", e))
    }

    pub fn status(&self) -> Result<AgentStatus> {
        Ok(parse_status(&self.read()?))
    }

    pub fn body(&self) -> Result<String> {
        Ok(parse_body(&self.read()?).to_string())
    }

    /// Moves an `in-progress` log to `status` and stamps `Ended:`.
    ///
    /// Returns `false` and leaves the file untouched if the log is already
    /// terminal or has no readable header.
    pub fn finalize(&self, status: AgentStatus) -> Result<bool> {
        if !status.is_terminal() {
            return Err(AgentError::LogFormat {
                path: self.path.clone(),
                details: format!("{} is not a terminal status", status),
            });
        }

        let content = self.read()?;
        let Some((header, body)) = split_header(&content) else {
            return Ok(false);
        };
        if parse_status(&content) != AgentStatus::InProgress {
            return Ok(false);
        }

        let replacement = format!("Status: {}\nEnded: {}", status, timestamp(Utc::now()));
        let new_header = RE_STATUS_LINE.replace(header, NoExpand(&replacement));
        let updated = format!("{}\n{}", new_header, body);

        // Rewrite in place: a writer holding an append handle must keep
        // writing to this inode.
        fs_err::write(&self.path, updated).map_err(|e| AgentError::io("finalizing agent log", e))?;
        tracing::info!(path = %self.path.display(), %status, "Agent log finalized");
        Ok(true)
    }

    /// Appends an error section and finalizes to `failed`, if still running.
    pub fn fail_with(&self, heading: &str, message: &str) -> Result<bool> {
        if self.status()? != AgentStatus::InProgress {
            return Ok(false);
        }
        self.append(&format!("\n\n{}\n\n{}\n", heading, message.trim_end()))?;
        self.finalize(AgentStatus::Failed)
    }

    /// Finalizes to `interrupted` and appends an interruption marker.
    pub fn interrupt(&self, reason: &str) -> Result<bool> {
        if !self.finalize(AgentStatus::Interrupted)? {
            return Ok(false);
        }
        self.append(&format!("\n\n## Interrupted\n\n{}\n", reason))?;
        Ok(true)
    }
}
