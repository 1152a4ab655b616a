//! The worker: drives one agent session and streams it into the agent log.
//!
//! Errors never escape as a process failure. Anything that goes wrong is
//! written into the log under `## Status: Failed` and the log is finalized.

use crate::agent_log::{AgentLog, AgentStatus};
use crate::error::{AgentError, Result};
use crate::executor::AgentStream;
use crate::launch::Backend;
use crate::registry::Registry;
use crate::stream::{Normalizer, StreamEvent, StreamLogWriter};

const FAILURE_HEADING: &str = "## Status: Failed";

struct Terminal {
    success: bool,
    result: Option<String>,
    errors: Vec<String>,
}

pub struct Worker {
    agent_id: String,
    log: AgentLog,
    registry: Registry,
    marker: String,
    backend: Backend,
}

impl Worker {
    pub fn new(
        agent_id: impl Into<String>,
        log: AgentLog,
        registry: Registry,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            log,
            registry,
            marker: marker.into(),
            backend: Backend::Claude,
        }
    }

    /// Selects the stream dialect to read.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Drives `stream` to the end and returns the log's final status.
    pub fn drive<A: AgentStream>(&self, stream: &mut A) -> Result<AgentStatus> {
        let mut normalizer = Normalizer::for_backend(self.backend, self.agent_id.clone());
        let mut writer = StreamLogWriter::new(self.log.clone(), self.marker.clone());
        let mut terminal: Option<Terminal> = None;

        while let Some(line) = stream.next_line()? {
            for event in normalizer.normalize_line(&line) {
                match event {
                    StreamEvent::SessionStarted { session_id } => {
                        tracing::debug!(agent_id = %self.agent_id, %session_id, "Session started");
                        if let Err(err) = self.registry.set_session_id(&self.agent_id, &session_id)
                        {
                            tracing::warn!(error = %err, "Failed to record session id");
                        }
                    }
                    StreamEvent::BlockStart { block } => writer.block_start(&block),
                    StreamEvent::BlockFullText { block, text } => writer.full_text(&block, &text)?,
                    StreamEvent::BlockDelta { block, text } => writer.delta(&block, &text)?,
                    // The first terminal event decides the outcome.
                    StreamEvent::Terminal {
                        success,
                        result,
                        errors,
                    } if terminal.is_none() => {
                        terminal = Some(Terminal {
                            success,
                            result,
                            errors,
                        })
                    }
                    StreamEvent::Terminal { .. } => {}
                }
            }
        }

        let exit = stream.finish()?;

        let Some(terminal) = terminal else {
            let mut message = format!(
                "Error: agent stream ended without a result. {}",
                exit.outcome.describe()
            );
            if !exit.stderr.trim().is_empty() {
                message.push_str("\n\n");
                message.push_str(exit.stderr.trim());
            }
            self.log.fail_with(FAILURE_HEADING, &message)?;
            return self.log.status();
        };

        if !writer.wrote_any() {
            if let Some(result) = terminal.result.as_deref().filter(|r| !r.trim().is_empty()) {
                writer.write_raw(result)?;
            }
        }
        if !terminal.success && !terminal.errors.is_empty() {
            writer.write_raw(&format!("\n\n## Errors\n\n{}\n", terminal.errors.join("\n")))?;
        }

        let status = if terminal.success {
            AgentStatus::Done
        } else {
            AgentStatus::Failed
        };
        self.log.finalize(status)?;
        self.log.status()
    }

    /// Records an error that stopped the worker and finalizes to `failed`.
    pub fn record_failure(&self, err: &AgentError) -> AgentStatus {
        tracing::error!(agent_id = %self.agent_id, error = %err, "Worker failed");
        if let Err(write_err) = self
            .log
            .fail_with(FAILURE_HEADING, &format!("Error: {}", err))
        {
            tracing::error!(error = %write_err, "Failed to record worker error in log");
        }
        self.log.status().unwrap_or(AgentStatus::Unknown)
    }
}
