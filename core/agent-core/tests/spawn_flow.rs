use agent_core::agent_log::{parse_status, AgentLog, AgentStatus};
use agent_core::context::{AgentContext, ENV_AGENT_DEPTH, ENV_AGENT_ID};
use agent_core::launch::{Backend, LaunchSpec};
use agent_core::paths::AgentPaths;
use agent_core::registry::Registry;
use agent_core::spawn::{
    LaunchCommand, Launcher, SpawnController, SpawnOutcome, SpawnRejection, SpawnRequest,
};
use agent_core::{AgentError, HooksConfig, Result};
use serde_json::json;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Records launches instead of starting processes.
#[derive(Default)]
struct RecordingLauncher {
    launched: RefCell<Vec<LaunchCommand>>,
}

impl Launcher for &RecordingLauncher {
    fn launch(&self, command: &LaunchCommand) -> Result<u32> {
        let mut launched = self.launched.borrow_mut();
        launched.push(command.clone());
        Ok(40_000 + launched.len() as u32)
    }
}

struct FailingLauncher;

impl Launcher for FailingLauncher {
    fn launch(&self, _command: &LaunchCommand) -> Result<u32> {
        Err(AgentError::Process("fork refused".to_string()))
    }
}

/// A runner that records its worker pid before `launch` returns.
struct EagerRunner {
    registry: Registry,
}

impl Launcher for EagerRunner {
    fn launch(&self, command: &LaunchCommand) -> Result<u32> {
        let agent_id = &command.args[2];
        self.registry.upsert_pid(agent_id, 777, Some(1_700_000_000))?;
        Ok(4242)
    }
}

struct Tree {
    _temp: TempDir,
    config: HooksConfig,
    paths: AgentPaths,
}

impl Tree {
    fn new() -> Self {
        let temp = tempdir().unwrap();
        let config = HooksConfig {
            agents_dir: Some(fixture_path("agents")),
            ..HooksConfig::default()
        };
        let paths = AgentPaths::new(temp.path(), &config.output_dir);
        Self {
            _temp: temp,
            config,
            paths,
        }
    }

    fn controller<'a, L: Launcher>(&'a self, launcher: L) -> SpawnController<'a, L> {
        SpawnController::new(
            &self.config,
            self.paths.clone(),
            launcher,
            PathBuf::from("/opt/agent-hook"),
        )
        .with_mcp_sources(vec![fixture_path("mcp.json")])
    }

    fn registry(&self) -> Registry {
        Registry::new(self.paths.registry_file())
    }

    fn snapshot(&self) -> (Vec<PathBuf>, String) {
        let registry = fs_err::read_to_string(self.paths.registry_file()).unwrap_or_default();
        (self.paths.list_logs(), registry)
    }
}

fn request(agent_type: &str) -> SpawnRequest {
    SpawnRequest::from_tool_input(&json!({
        "description": format!("{} task", agent_type),
        "prompt": "Do the work",
        "subagent_type": agent_type,
    }))
}

fn delegated(outcome: SpawnOutcome) -> agent_core::spawn::Delegation {
    match outcome {
        SpawnOutcome::Delegated(delegation) => delegation,
        SpawnOutcome::Rejected(rejection) => panic!("unexpected rejection: {}", rejection),
    }
}

fn rejected(outcome: SpawnOutcome) -> SpawnRejection {
    match outcome {
        SpawnOutcome::Delegated(delegation) => {
            panic!("unexpected delegation: {}", delegation.agent_id)
        }
        SpawnOutcome::Rejected(rejection) => rejection,
    }
}

/// The context a launched child's own hooks would see.
fn child_context(command: &LaunchCommand) -> AgentContext {
    AgentContext::from_lookup(|key| {
        command
            .env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
}

fn header_field(path: &Path, field: &str) -> String {
    let content = fs_err::read_to_string(path).unwrap();
    content
        .lines()
        .find_map(|line| line.strip_prefix(&format!("{}: ", field)).map(str::to_string))
        .unwrap()
}

#[test]
fn test_nested_spawns_until_depth_limit() {
    let tree = Tree::new();
    let launcher = RecordingLauncher::default();
    let controller = tree.controller(&launcher);

    let planner = delegated(controller.spawn(&AgentContext::root(), &request("planner")).unwrap());
    let planner_ctx = child_context(&launcher.launched.borrow()[0]);
    assert_eq!(planner_ctx.depth, 1);
    assert_eq!(planner_ctx.agent_id.as_deref(), Some(planner.agent_id.as_str()));

    let researcher = delegated(controller.spawn(&planner_ctx, &request("researcher")).unwrap());
    let researcher_ctx = child_context(&launcher.launched.borrow()[1]);
    assert_eq!(researcher_ctx.depth, 2);

    let reviewer = delegated(controller.spawn(&researcher_ctx, &request("reviewer")).unwrap());
    let reviewer_ctx = child_context(&launcher.launched.borrow()[2]);
    assert_eq!(reviewer_ctx.depth, 3);

    let before = tree.snapshot();
    let rejection = rejected(controller.spawn(&reviewer_ctx, &request("planner")).unwrap());
    assert_eq!(rejection, SpawnRejection::DepthExceeded { depth: 3, max: 3 });
    assert!(rejection.to_string().contains("Max recursion depth reached (3/3)"));
    assert_eq!(tree.snapshot(), before);
    assert_eq!(launcher.launched.borrow().len(), 3);

    // Log and registry carry the requester's depth and parent.
    assert_eq!(header_field(&planner.log_path, "Depth"), "0");
    assert_eq!(header_field(&planner.log_path, "ParentAgent"), "root");
    assert_eq!(header_field(&reviewer.log_path, "Depth"), "2");
    assert_eq!(
        header_field(&reviewer.log_path, "ParentAgent"),
        researcher.agent_id
    );

    let registry = tree.registry();
    let record = registry.get(&researcher.agent_id).unwrap();
    assert_eq!(record.depth, 1);
    assert_eq!(record.parent_id.as_deref(), Some(planner.agent_id.as_str()));
    assert_eq!(record.pid, Some(40_002));
    // No declaration of its own: inherits the planner's lists.
    assert_eq!(
        record.allowed_agents,
        Some(vec![
            "researcher".to_string(),
            "reviewer".to_string(),
            "scraper".to_string()
        ])
    );
}

#[test]
fn test_delegation_writes_launch_spec_and_log() {
    let tree = Tree::new();
    let launcher = RecordingLauncher::default();
    let planner = delegated(
        tree.controller(&launcher)
            .spawn(&AgentContext::root(), &request("planner"))
            .unwrap(),
    );

    assert!(planner.agent_id.starts_with("agent_"));
    assert_eq!(
        planner.display_path,
        format!("@agent-responses/{}.md", planner.agent_id)
    );
    assert!(planner.message().contains(&planner.display_path));
    assert!(planner
        .message()
        .contains(&format!("agent-hook await {}", planner.agent_id)));

    let log = AgentLog::new(&planner.log_path);
    assert_eq!(log.status().unwrap(), AgentStatus::InProgress);
    assert_eq!(header_field(&planner.log_path, "Task"), "planner task");

    let spec = LaunchSpec::read(&tree.paths.launch_file(&planner.agent_id), &planner.agent_id)
        .unwrap();
    assert_eq!(spec.depth, 1);
    assert_eq!(spec.model.as_deref(), Some("opus"));
    assert_eq!(
        spec.system_prompt.as_deref(),
        Some("You break work into focused research tasks and delegate them.")
    );
    assert_eq!(
        spec.mcp_config,
        Some(json!({"mcpServers": {"github": {"command": "github-mcp", "args": ["--stdio"]}}}))
    );

    let record = tree.registry().get(&planner.agent_id).unwrap();
    assert_eq!(record.missing_mcp_servers, vec!["jira".to_string()]);
    assert_eq!(
        record.allowed_mcp_servers,
        Some(vec!["github".to_string(), "jira".to_string()])
    );

    let launched = launcher.launched.borrow();
    let command = &launched[0];
    assert_eq!(command.program, PathBuf::from("/opt/agent-hook"));
    assert_eq!(
        command.args,
        vec![
            "run".to_string(),
            "--agent-id".to_string(),
            planner.agent_id.clone(),
            "--cwd".to_string(),
            tree.paths.cwd().display().to_string(),
        ]
    );
    assert!(command
        .env
        .contains(&(ENV_AGENT_ID.to_string(), planner.agent_id.clone())));
    assert!(command
        .env
        .contains(&(ENV_AGENT_DEPTH.to_string(), "1".to_string())));
}

#[test]
fn test_self_spawn_is_rejected() {
    let tree = Tree::new();
    let launcher = RecordingLauncher::default();
    let controller = tree.controller(&launcher);
    delegated(controller.spawn(&AgentContext::root(), &request("planner")).unwrap());
    let planner_ctx = child_context(&launcher.launched.borrow()[0]);

    let rejection = rejected(controller.spawn(&planner_ctx, &request("planner")).unwrap());
    assert_eq!(
        rejection,
        SpawnRejection::SelfSpawn {
            agent_type: "planner".to_string()
        }
    );
}

#[test]
fn test_allow_lists_distinguish_empty_from_unset() {
    let tree = Tree::new();
    let launcher = RecordingLauncher::default();
    let controller = tree.controller(&launcher);

    // `allowed-agents: none` permits nothing.
    delegated(controller.spawn(&AgentContext::root(), &request("sealed")).unwrap());
    let sealed_ctx = child_context(&launcher.launched.borrow()[0]);
    let rejection = rejected(controller.spawn(&sealed_ctx, &request("researcher")).unwrap());
    assert_eq!(
        rejection.to_string(),
        "This agent can only spawn: none. 'researcher' is not allowed."
    );

    // No definition at all: unrestricted.
    delegated(controller.spawn(&AgentContext::root(), &request("general-purpose")).unwrap());
    let general_ctx = child_context(&launcher.launched.borrow()[1]);
    delegated(controller.spawn(&general_ctx, &request("sealed")).unwrap());
}

#[test]
fn test_allow_list_rejections() {
    let tree = Tree::new();
    let launcher = RecordingLauncher::default();
    let controller = tree.controller(&launcher);
    delegated(controller.spawn(&AgentContext::root(), &request("planner")).unwrap());
    let planner_ctx = child_context(&launcher.launched.borrow()[0]);

    let rejection = rejected(controller.spawn(&planner_ctx, &request("sealed")).unwrap());
    assert_eq!(
        rejection.to_string(),
        "This agent can only spawn: researcher, reviewer, scraper. 'sealed' is not allowed."
    );

    let rejection = rejected(controller.spawn(&planner_ctx, &request("scraper")).unwrap());
    assert_eq!(
        rejection,
        SpawnRejection::McpServerNotAllowed {
            server: "browser".to_string(),
            allowed: vec!["github".to_string(), "jira".to_string()],
        }
    );
}

#[test]
fn test_launch_failure_leaves_failed_log_only() {
    let tree = Tree::new();
    let err = tree
        .controller(FailingLauncher)
        .spawn(&AgentContext::root(), &request("researcher"))
        .unwrap_err();
    assert!(err.to_string().contains("fork refused"));

    let logs = tree.paths.list_logs();
    assert_eq!(logs.len(), 1);
    let content = fs_err::read_to_string(&logs[0]).unwrap();
    assert_eq!(parse_status(&content), AgentStatus::Failed);
    assert!(content.contains("Failed to start agent runner"));

    assert!(tree.registry().read().is_empty());
    let leftovers: Vec<_> = fs_err::read_dir(tree.paths.dir())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".launch.json"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_rejection_at_root_creates_nothing() {
    let mut tree = Tree::new();
    tree.config.max_depth = 0;
    let launcher = RecordingLauncher::default();
    let rejection = rejected(
        tree.controller(&launcher)
            .spawn(&AgentContext::root(), &request("researcher"))
            .unwrap(),
    );
    assert_eq!(rejection, SpawnRejection::DepthExceeded { depth: 0, max: 0 });
    assert!(!tree.paths.dir().exists());
}

#[test]
fn test_worker_pid_recorded_by_runner_is_kept() {
    let tree = Tree::new();
    let launcher = EagerRunner {
        registry: tree.registry(),
    };
    let planner = delegated(
        tree.controller(launcher)
            .spawn(&AgentContext::root(), &request("planner"))
            .unwrap(),
    );

    assert_eq!(planner.pid, 4242);
    let record = tree.registry().get(&planner.agent_id).unwrap();
    assert_eq!(record.pid, Some(777));
    assert_eq!(record.proc_started, Some(1_700_000_000));
}

#[test]
fn test_non_anthropic_models_run_on_cursor() {
    let tree = Tree::new();
    let launcher = RecordingLauncher::default();
    let controller = tree.controller(&launcher);

    let mut gpt = request("researcher");
    gpt.model = Some("gpt-5".to_string());
    let cursor = delegated(controller.spawn(&AgentContext::root(), &gpt).unwrap());
    let spec = LaunchSpec::read(&tree.paths.launch_file(&cursor.agent_id), &cursor.agent_id)
        .unwrap();
    assert_eq!(spec.backend, Backend::Cursor);
    assert_eq!(spec.model.as_deref(), Some("gpt-5"));

    // The definition's `sonnet` stays on claude.
    let claude = delegated(controller.spawn(&AgentContext::root(), &request("researcher")).unwrap());
    let spec = LaunchSpec::read(&tree.paths.launch_file(&claude.agent_id), &claude.agent_id)
        .unwrap();
    assert_eq!(spec.backend, Backend::Claude);
}
