//! Event handler for Claude Code hooks.
//!
//! Reads JSON from stdin, routes the event and prints at most one JSON
//! response on stdout.
//!
//! ## Routing
//!
//! ```text
//! PreToolUse (intercepted tool)  → spawn controller → deny + delegation text
//! PostToolUse                    → monitor → additionalContext
//! UserPromptSubmit, Stop         → monitor → systemMessage
//! SubagentStop, SessionEnd       → monitor (with orphan reclaim) → systemMessage
//! anything else                  → no output
//! ```

use std::io::{self, Read};
use std::path::PathBuf;

use agent_core::hook::{HookEvent, HookInput, HookOutput};
use agent_core::liveness::{LivenessProbe, SystemProbe};
use agent_core::monitor::{combine, Monitor, MonitorInvocation};
use agent_core::spawn::{DetachedLauncher, Launcher, SpawnController, SpawnOutcome, SpawnRequest};
use agent_core::{load_config_or_default, AgentContext, AgentError, AgentPaths, HooksConfig};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("Failed to read stdin: {0}")]
    Stdin(#[source] io::Error),

    #[error("Failed to parse hook input: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Cannot locate agent-hook executable: {0}")]
    CurrentExe(#[source] io::Error),

    #[error(transparent)]
    Core(#[from] AgentError),
}

pub fn run() -> Result<(), HandleError> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(HandleError::Stdin)?;

    if input.trim().is_empty() {
        return Ok(());
    }

    let hook_input: HookInput = serde_json::from_str(&input)?;
    let config = load_config_or_default(None);
    let runner_program = std::env::current_exe().map_err(HandleError::CurrentExe)?;
    let dispatcher = Dispatcher {
        config: &config,
        context: AgentContext::from_env(),
        launcher: DetachedLauncher,
        runner_program,
        probe: SystemProbe,
    };

    if let Some(output) = dispatcher.handle(&hook_input)? {
        println!("{}", serde_json::to_string(&output)?);
    }
    Ok(())
}

/// Everything a hook invocation needs besides its input.
pub struct Dispatcher<'a, L: Launcher, P: LivenessProbe> {
    pub config: &'a HooksConfig,
    pub context: AgentContext,
    pub launcher: L,
    pub runner_program: PathBuf,
    pub probe: P,
}

impl<'a, L: Launcher, P: LivenessProbe> Dispatcher<'a, L, P> {
    pub fn handle(self, input: &HookInput) -> Result<Option<HookOutput>, HandleError> {
        let Some(event) = input.to_event() else {
            tracing::debug!(event = ?input.hook_event_name, "Ignoring unhandled hook event");
            return Ok(None);
        };
        let Some(cwd) = input.resolve_cwd() else {
            tracing::debug!(event = event.name(), "Skipping event (missing cwd)");
            return Ok(None);
        };
        let paths = AgentPaths::new(cwd, &self.config.output_dir);

        match &event {
            HookEvent::PreToolUse {
                tool_name,
                tool_input,
            } => {
                if !self.config.intercepts(tool_name) {
                    return Ok(None);
                }
                self.delegate(paths, tool_input)
            }
            _ => self.notify(paths, &event, input),
        }
    }

    fn delegate(
        self,
        paths: AgentPaths,
        tool_input: &serde_json::Value,
    ) -> Result<Option<HookOutput>, HandleError> {
        let request = SpawnRequest::from_tool_input(tool_input);
        let controller =
            SpawnController::new(self.config, paths, self.launcher, self.runner_program);
        match controller.spawn(&self.context, &request) {
            Ok(outcome) => {
                if let SpawnOutcome::Delegated(delegation) = &outcome {
                    tracing::debug!(agent_id = %delegation.agent_id, "Task delegated");
                }
                Ok(Some(HookOutput::deny(outcome.reason())))
            }
            Err(err) => {
                // Let the tool call run natively rather than losing the task.
                tracing::error!(error = %err, "Spawn failed, allowing tool call");
                Ok(None)
            }
        }
    }

    fn notify(
        self,
        paths: AgentPaths,
        event: &HookEvent,
        input: &HookInput,
    ) -> Result<Option<HookOutput>, HandleError> {
        if !paths.dir().is_dir() {
            return Ok(None);
        }
        let invocation = MonitorInvocation {
            event: event.name().to_string(),
            reason: input.reason.clone(),
            invoker: self.context.agent_id.clone(),
        };
        let monitor = Monitor::new(paths, self.config.update_marker.clone(), self.probe);
        let notifications = monitor.run(&invocation)?;
        Ok(combine(&notifications).map(|message| HookOutput::notify(event, message)))
    }
}
