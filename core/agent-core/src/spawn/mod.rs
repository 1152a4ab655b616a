//! Spawn controller: turns an intercepted Task call into a background agent.
//!
//! On acceptance the controller creates, in order: the agent log, the launch
//! spec, the registry entry (pid unknown), then starts the runner and records
//! its pid unless the runner already recorded the worker's. Rejections touch
//! nothing on disk.

pub mod policy;

use std::path::PathBuf;
use std::process::{Command, Stdio};

use chrono::Utc;
use serde_json::Value;

use crate::agent_defs::{load_definition, AgentDefinition};
use crate::agent_log::{AgentLog, LogHeader};
use crate::config::HooksConfig;
use crate::context::AgentContext;
use crate::error::{AgentError, Result};
use crate::launch::{Backend, LaunchSpec};
use crate::liveness::process_start_time;
use crate::mcp::{default_sources, resolve_servers};
use crate::paths::{AgentPaths, AGENT_ID_PREFIX};
use crate::registry::{AgentRecord, Registry};

pub use policy::{check_spawn, child_restrictions, Restrictions, SpawnCheck, SpawnRejection};

const DEFAULT_AGENT_TYPE: &str = "general-purpose";
const ID_ATTEMPTS: usize = 8;

/// The Task tool call being intercepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub description: String,
    pub prompt: String,
    pub subagent_type: String,
    pub model: Option<String>,
}

impl SpawnRequest {
    pub fn from_tool_input(tool_input: &Value) -> Self {
        let text = |key: &str| {
            tool_input
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            description: text("description").unwrap_or_else(|| "Unnamed task".to_string()),
            prompt: text("prompt").unwrap_or_default(),
            subagent_type: text("subagent_type").unwrap_or_else(|| DEFAULT_AGENT_TYPE.to_string()),
            model: text("model"),
        }
    }
}

/// A process to start, decoupled from how the OS starts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

pub trait Launcher {
    /// Starts the command without waiting on it and returns its pid.
    fn launch(&self, command: &LaunchCommand) -> Result<u32>;
}

/// Starts processes in their own process group with null stdio, so they
/// outlive the hook that started them.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedLauncher;

impl Launcher for DetachedLauncher {
    fn launch(&self, command: &LaunchCommand) -> Result<u32> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.cwd)
            .envs(command.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|source| AgentError::Spawn {
            command: command.program.display().to_string(),
            source,
        })?;
        Ok(child.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub agent_id: String,
    pub log_path: PathBuf,
    /// `@relative/path` form of `log_path`.
    pub display_path: String,
    pub pid: u32,
}

impl Delegation {
    /// Text returned to the calling model in place of the Task result.
    pub fn message(&self) -> String {
        format!(
            "Delegated to an agent. Response logged to {} in real time.\n\n\
             A hook will alert you (not the user) on updates and when complete. \
             To sleep until completion run `agent-hook await {}`. \
             The user cannot see the agent's progress: either await it or keep \
             working on something else until it completes. If this task is not \
             blocking, do not await it.",
            self.display_path, self.agent_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    Delegated(Delegation),
    Rejected(SpawnRejection),
}

impl SpawnOutcome {
    /// The `permissionDecisionReason` for the denied tool call.
    pub fn reason(&self) -> String {
        match self {
            SpawnOutcome::Delegated(delegation) => delegation.message(),
            SpawnOutcome::Rejected(rejection) => rejection.to_string(),
        }
    }
}

pub struct SpawnController<'a, L: Launcher> {
    config: &'a HooksConfig,
    paths: AgentPaths,
    launcher: L,
    /// Executable providing the `run` subcommand.
    runner_program: PathBuf,
    agents_dir: Option<PathBuf>,
    mcp_sources: Vec<PathBuf>,
}

impl<'a, L: Launcher> SpawnController<'a, L> {
    pub fn new(
        config: &'a HooksConfig,
        paths: AgentPaths,
        launcher: L,
        runner_program: PathBuf,
    ) -> Self {
        let mcp_sources = default_sources(paths.cwd());
        Self {
            config,
            agents_dir: config.agents_dir(),
            paths,
            launcher,
            runner_program,
            mcp_sources,
        }
    }

    pub fn with_agents_dir(mut self, dir: PathBuf) -> Self {
        self.agents_dir = Some(dir);
        self
    }

    pub fn with_mcp_sources(mut self, sources: Vec<PathBuf>) -> Self {
        self.mcp_sources = sources;
        self
    }

    fn registry(&self) -> Registry {
        Registry::new(self.paths.registry_file())
    }

    fn requester_restrictions(&self, ctx: &AgentContext) -> Restrictions {
        let Some(id) = ctx.agent_id.as_deref() else {
            return Restrictions::default();
        };
        match self.registry().get(id) {
            Some(record) => Restrictions {
                allowed_agents: record.allowed_agents,
                allowed_mcp_servers: record.allowed_mcp_servers,
            },
            None => {
                tracing::debug!(agent_id = id, "Requester not in registry, treating as unrestricted");
                Restrictions::default()
            }
        }
    }

    pub fn spawn(&self, ctx: &AgentContext, request: &SpawnRequest) -> Result<SpawnOutcome> {
        let definition: AgentDefinition = self
            .agents_dir
            .as_deref()
            .and_then(|dir| load_definition(dir, &request.subagent_type))
            .unwrap_or_default();
        let requested_mcp = definition.mcp_servers.clone().unwrap_or_default();
        let requester = self.requester_restrictions(ctx);

        let check = SpawnCheck {
            current_depth: ctx.depth,
            max_depth: self.config.max_depth,
            requester_type: ctx.agent_type.as_deref(),
            requested_type: &request.subagent_type,
            requested_mcp_servers: &requested_mcp,
            restrictions: &requester,
        };
        if let Err(rejection) = check_spawn(&check) {
            tracing::info!(
                requested = %request.subagent_type,
                depth = ctx.depth,
                reason = %rejection,
                "Spawn rejected"
            );
            return Ok(SpawnOutcome::Rejected(rejection));
        }

        self.paths.ensure_dir()?;
        let registry = self.registry();
        let (agent_id, log) = self.create_log(&registry, ctx, request)?;

        let child = child_restrictions(
            definition.allowed_agents.as_ref(),
            definition.mcp_servers.as_ref(),
            &requester,
        );
        let mcp = resolve_servers(&requested_mcp, &self.mcp_sources);

        let model = request.model.clone().or_else(|| definition.model.clone());
        let spec = LaunchSpec {
            agent_id: agent_id.clone(),
            agent_type: request.subagent_type.clone(),
            depth: ctx.depth + 1,
            cwd: self.paths.cwd().to_path_buf(),
            prompt: request.prompt.clone(),
            system_prompt: definition.system_prompt.clone(),
            backend: Backend::for_model(model.as_deref()),
            model,
            mcp_config: mcp.config_json(),
            allowed_agents: child.allowed_agents.clone(),
            allowed_mcp_servers: child.allowed_mcp_servers.clone(),
            claude_bin: self.config.claude_bin.clone(),
            cursor_bin: self.config.cursor_bin.clone(),
            permission_mode: self.config.permission_mode.clone(),
            update_marker: self.config.update_marker.clone(),
            timeout_secs: self.config.timeout_secs,
        };
        let launch_path = self.paths.launch_file(&agent_id);
        spec.write(&launch_path)?;

        let mut record = AgentRecord::new(&request.subagent_type, ctx.depth, ctx.agent_id.clone());
        record.allowed_agents = child.allowed_agents;
        record.allowed_mcp_servers = child.allowed_mcp_servers;
        record.missing_mcp_servers = mcp.missing;
        registry.insert(&agent_id, record)?;

        let command = LaunchCommand {
            program: self.runner_program.clone(),
            args: vec![
                "run".to_string(),
                "--agent-id".to_string(),
                agent_id.clone(),
                "--cwd".to_string(),
                self.paths.cwd().display().to_string(),
            ],
            cwd: self.paths.cwd().to_path_buf(),
            env: spec.child_env(),
        };

        let pid = match self.launcher.launch(&command) {
            Ok(pid) => pid,
            Err(err) => {
                tracing::error!(agent_id = %agent_id, error = %err, "Runner launch failed");
                let _ = log.fail_with("## Error", &format!("Failed to start agent runner: {}", err));
                let _ = registry.remove(&agent_id);
                let _ = fs_err::remove_file(&launch_path);
                return Err(err);
            }
        };

        match registry.record_pid_if_unset(&agent_id, pid, process_start_time(pid)) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(agent_id = %agent_id, pid, "Worker pid already recorded");
            }
            Err(err) => {
                tracing::warn!(agent_id = %agent_id, error = %err, "Failed to record runner pid");
            }
        }

        tracing::info!(
            agent_id = %agent_id,
            agent_type = %request.subagent_type,
            depth = ctx.depth,
            pid,
            "Agent delegated"
        );

        Ok(SpawnOutcome::Delegated(Delegation {
            display_path: self.paths.display_path(log.path()),
            log_path: log.path().to_path_buf(),
            agent_id,
            pid,
        }))
    }

    /// Allocates a fresh id and creates its log, retrying on collision.
    fn create_log(
        &self,
        registry: &Registry,
        ctx: &AgentContext,
        request: &SpawnRequest,
    ) -> Result<(String, AgentLog)> {
        let header = LogHeader {
            task: request.description.clone(),
            instructions: request.prompt.clone(),
            started: Utc::now(),
            depth: ctx.depth,
            parent_id: ctx.agent_id.clone(),
        };

        for _ in 0..ID_ATTEMPTS {
            let agent_id = new_agent_id();
            if registry.contains(&agent_id) {
                continue;
            }
            match AgentLog::create(self.paths.log_file(&agent_id), &header) {
                Ok(log) => return Ok((agent_id, log)),
                Err(AgentError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::AlreadyExists =>
                {
                    continue
                }
                Err(err) => return Err(err),
            }
        }
        Err(AgentError::IdExhausted(ID_ATTEMPTS))
    }
}

pub fn new_agent_id() -> String {
    format!(
        "{}{}",
        AGENT_ID_PREFIX,
        ulid::Ulid::new().to_string().to_lowercase()
    )
}
