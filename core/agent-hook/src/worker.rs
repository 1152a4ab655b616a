//! `agent-hook worker`: runs the agent session and streams it into the log.
//!
//! Every failure ends up in the agent log; the process itself always exits 0.

use std::path::Path;

use agent_core::agent_log::{AgentLog, AgentStatus};
use agent_core::executor::CliSession;
use agent_core::launch::LaunchSpec;
use agent_core::registry::Registry;
use agent_core::runner::install_panic_finalizer;
use agent_core::worker::Worker;
use agent_core::{load_config_or_default, AgentPaths};

pub fn run(agent_id: &str, cwd: &Path) -> AgentStatus {
    let config = load_config_or_default(None);
    let paths = AgentPaths::new(cwd, &config.output_dir);
    let log = AgentLog::new(paths.log_file(agent_id));
    install_panic_finalizer(log.clone());
    let registry = Registry::new(paths.registry_file());

    let spec = match LaunchSpec::read(&paths.launch_file(agent_id), agent_id) {
        Ok(spec) => spec,
        Err(err) => {
            return Worker::new(agent_id, log, registry, config.update_marker).record_failure(&err)
        }
    };

    let worker =
        Worker::new(agent_id, log, registry, spec.update_marker.clone()).with_backend(spec.backend);
    tracing::info!(
        agent_id,
        agent_type = %spec.agent_type,
        depth = spec.depth,
        backend = ?spec.backend,
        "Worker starting session"
    );
    match CliSession::start(&spec).and_then(|mut session| worker.drive(&mut session)) {
        Ok(status) => status,
        Err(err) => worker.record_failure(&err),
    }
}
