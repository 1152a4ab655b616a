//! `agent-hook await`: blocks until an agent reaches a terminal status.
//!
//! Prints the agent's response body (or a JSON report with `--json`).
//! Exits 0 once the agent finished, 1 on timeout or when no log exists.

use std::path::PathBuf;
use std::time::Duration;

use agent_core::agent_log::AgentLog;
use agent_core::wait::{wait_for_terminal, WaitOutcome};
use agent_core::{load_config_or_default, AgentPaths, AgentStatus};
use serde::Serialize;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AwaitReport<'a> {
    agent_id: &'a str,
    status: Option<AgentStatus>,
    timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

pub fn run(agent_id: &str, timeout_secs: Option<u64>, cwd: Option<PathBuf>, json: bool) -> i32 {
    let Some(cwd) = cwd.or_else(|| std::env::current_dir().ok()) else {
        eprintln!("agent-hook: cannot determine working directory");
        return 1;
    };
    let config = load_config_or_default(None);
    let paths = AgentPaths::new(cwd, &config.output_dir);
    let log = AgentLog::new(paths.log_file(agent_id));

    let outcome = wait_for_terminal(&log, timeout_secs.map(Duration::from_secs), POLL_INTERVAL);
    tracing::debug!(agent_id, ?outcome, "Await finished");

    let (report, code) = match &outcome {
        WaitOutcome::Terminal { status, body } => (
            AwaitReport {
                agent_id,
                status: Some(*status),
                timed_out: false,
                body: Some(body.as_str()),
            },
            0,
        ),
        WaitOutcome::TimedOut => (
            AwaitReport {
                agent_id,
                status: Some(AgentStatus::InProgress),
                timed_out: true,
                body: None,
            },
            1,
        ),
        WaitOutcome::Missing => (
            AwaitReport {
                agent_id,
                status: None,
                timed_out: false,
                body: None,
            },
            1,
        ),
    };

    if json {
        match serde_json::to_string(&report) {
            Ok(text) => println!("{}", text),
            Err(err) => eprintln!("agent-hook: {}", err),
        }
        return code;
    }

    match outcome {
        WaitOutcome::Terminal { status, body } => {
            if status != AgentStatus::Done {
                println!("Agent {}: {}", status, paths.display_path(log.path()));
            }
            println!("{}", body);
        }
        WaitOutcome::TimedOut => eprintln!(
            "Timed out waiting for {}. The agent is still running; see {}",
            agent_id,
            paths.display_path(log.path())
        ),
        WaitOutcome::Missing => eprintln!("No agent log found for {}", agent_id),
    }
    code
}
