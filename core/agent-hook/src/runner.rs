//! `agent-hook run`: supervises one agent's worker process.
//!
//! Started detached by the spawn controller. Spawns `agent-hook worker` with
//! the agent's identity in its environment, waits for it and makes sure the
//! log ends in a terminal status.

use std::path::Path;
use std::time::Duration;

use agent_core::agent_log::AgentLog;
use agent_core::launch::LaunchSpec;
use agent_core::registry::Registry;
use agent_core::runner::{install_panic_finalizer, ProcessSpawner, Supervisor};
use agent_core::spawn::LaunchCommand;
use agent_core::{load_config_or_default, AgentPaths, AgentStatus, Result};

pub fn run(agent_id: &str, cwd: &Path) -> Result<AgentStatus> {
    let config = load_config_or_default(None);
    let paths = AgentPaths::new(cwd, &config.output_dir);
    let log = AgentLog::new(paths.log_file(agent_id));
    install_panic_finalizer(log.clone());

    let launch_path = paths.launch_file(agent_id);
    let spec = match LaunchSpec::read(&launch_path, agent_id) {
        Ok(spec) => spec,
        Err(err) => {
            log.fail_with("## Error", &format!("Error: {}", err))?;
            return Err(err);
        }
    };

    let program = match std::env::current_exe() {
        Ok(program) => program,
        Err(err) => {
            let err = agent_core::AgentError::io("locating agent-hook executable", err);
            log.fail_with("## Error", &format!("Error: {}", err))?;
            return Err(err);
        }
    };

    let command = LaunchCommand {
        program,
        args: vec![
            "worker".to_string(),
            "--agent-id".to_string(),
            agent_id.to_string(),
            "--cwd".to_string(),
            cwd.display().to_string(),
        ],
        cwd: spec.cwd.clone(),
        env: spec.child_env(),
    };

    let status = Supervisor::new(
        ProcessSpawner,
        Registry::new(paths.registry_file()),
        log,
        launch_path,
    )
    .with_timeout(spec.timeout_secs.map(Duration::from_secs))
    .run(agent_id, &command)?;

    tracing::info!(agent_id, %status, "Runner finished");
    Ok(status)
}
