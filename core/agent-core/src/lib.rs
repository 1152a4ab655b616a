//! # agent-core
//!
//! Core library for background agent delegation in Claude Code hooks:
//! intercepting Task calls, spawning detached agents, supervising them,
//! streaming their output into markdown logs and notifying the parent
//! session when they finish or die.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Hooks are short-lived processes and the
//!   worker reads the agent stream line by line.
//! - **Files are the interface**: Agent logs, the registry and the monitor
//!   snapshot live under `<cwd>/agent-responses/`. Any process can read them.
//! - **Graceful degradation**: Missing or corrupt state files read as empty,
//!   not errors.
//! - **Exactly-once terminal status**: A log leaves `in-progress` once. Every
//!   exit path of the runner and worker converges on a terminal status.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agent_core::{AgentContext, AgentPaths, DetachedLauncher, SpawnController, SpawnRequest};
//!
//! let config = agent_core::load_config_or_default(None);
//! let paths = AgentPaths::new(cwd, &config.output_dir);
//! let controller = SpawnController::new(&config, paths, DetachedLauncher, runner_exe);
//! let outcome = controller.spawn(&AgentContext::from_env(), &SpawnRequest::from_tool_input(&input))?;
//! ```

pub mod agent_defs;
pub mod agent_log;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod hook;
pub mod launch;
pub mod liveness;
pub mod mcp;
pub mod monitor;
pub mod paths;
pub mod patterns;
pub mod persist;
pub mod registry;
pub mod runner;
pub mod spawn;
pub mod stream;
pub mod wait;
pub mod worker;

pub use agent_log::{AgentLog, AgentStatus, LogHeader};
pub use config::{load_config, load_config_or_default, HooksConfig, MAX_DEPTH};
pub use context::AgentContext;
pub use error::{AgentError, Result};
pub use executor::{AgentStream, CliSession, SessionExit};
pub use hook::{HookEvent, HookInput, HookOutput};
pub use launch::{Backend, LaunchSpec};
pub use liveness::{Liveness, LivenessProbe, SystemProbe};
pub use monitor::{combine, Monitor, MonitorInvocation, Notification};
pub use paths::AgentPaths;
pub use registry::{AgentRecord, Registry};
pub use runner::{ExitOutcome, ProcessSpawner, Supervisor};
pub use spawn::{
    DetachedLauncher, LaunchCommand, Launcher, SpawnController, SpawnOutcome, SpawnRejection,
    SpawnRequest,
};
pub use wait::{wait_for_terminal, WaitOutcome};
pub use worker::Worker;
