//! Blocking wait on an agent log, for callers that need the result inline.

use std::thread;
use std::time::{Duration, Instant};

use crate::agent_log::{parse_body, parse_status, AgentLog, AgentStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Terminal { status: AgentStatus, body: String },
    TimedOut,
    Missing,
}

/// Polls `log` until its status is terminal or `timeout` elapses.
pub fn wait_for_terminal(log: &AgentLog, timeout: Option<Duration>, poll: Duration) -> WaitOutcome {
    let started = Instant::now();
    loop {
        if !log.exists() {
            return WaitOutcome::Missing;
        }
        match log.read() {
            Ok(content) => {
                let status = parse_status(&content);
                if status.is_terminal() {
                    return WaitOutcome::Terminal {
                        status,
                        body: parse_body(&content).to_string(),
                    };
                }
            }
            Err(err) => tracing::debug!(error = %err, "Log read failed while waiting"),
        }

        if timeout.is_some_and(|limit| started.elapsed() >= limit) {
            return WaitOutcome::TimedOut;
        }
        thread::sleep(poll);
    }
}
