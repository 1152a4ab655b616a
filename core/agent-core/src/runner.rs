//! Runner/supervisor: owns the worker process and guarantees its log reaches
//! a terminal status exactly once, however the worker ends.
//!
//! The worker normally finalizes its own log. The supervisor only steps in
//! when the log is still `in-progress` after the worker exits (crash, kill,
//! timeout), and always deletes the launch spec afterwards.

use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::agent_log::{AgentLog, AgentStatus};
use crate::error::{AgentError, Result};
use crate::liveness::process_start_time;
use crate::registry::Registry;
use crate::spawn::LaunchCommand;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How the worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe(&self) -> String {
        let code = self
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "null".to_string());
        match self.signal {
            Some(signal) => format!("Process exited with code {} (signal: {})", code, signal),
            None => format!("Process exited with code {}", code),
        }
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

/// A running worker. Abstracted so supervision can be tested without
/// real processes.
pub trait WorkerChild {
    fn id(&self) -> u32;
    fn try_wait(&mut self) -> Result<Option<ExitOutcome>>;
    fn kill(&mut self) -> Result<()>;
}

pub trait WorkerSpawner {
    type Child: WorkerChild;
    fn spawn(&self, command: &LaunchCommand) -> Result<Self::Child>;
}

/// Spawns real worker processes with null stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSpawner;

pub struct ProcessChild(Child);

impl WorkerChild for ProcessChild {
    fn id(&self) -> u32 {
        self.0.id()
    }

    fn try_wait(&mut self) -> Result<Option<ExitOutcome>> {
        self.0
            .try_wait()
            .map(|status| status.map(ExitOutcome::from))
            .map_err(|e| AgentError::io("waiting on worker", e))
    }

    fn kill(&mut self) -> Result<()> {
        self.0
            .kill()
            .map_err(|e| AgentError::io("killing worker", e))
    }
}

impl WorkerSpawner for ProcessSpawner {
    type Child = ProcessChild;

    fn spawn(&self, command: &LaunchCommand) -> Result<ProcessChild> {
        Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.cwd)
            .envs(command.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(ProcessChild)
            .map_err(|source| AgentError::Spawn {
                command: command.program.display().to_string(),
                source,
            })
    }
}

pub struct Supervisor<S: WorkerSpawner> {
    spawner: S,
    registry: Registry,
    log: AgentLog,
    launch_path: PathBuf,
    timeout: Option<Duration>,
    poll_interval: Duration,
}

impl<S: WorkerSpawner> Supervisor<S> {
    pub fn new(spawner: S, registry: Registry, log: AgentLog, launch_path: PathBuf) -> Self {
        Self {
            spawner,
            registry,
            log,
            launch_path,
            timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs the worker to completion and returns the log's final status.
    pub fn run(&self, agent_id: &str, command: &LaunchCommand) -> Result<AgentStatus> {
        let result = self.supervise(agent_id, command);
        if let Err(err) = &result {
            tracing::error!(agent_id, error = %err, "Supervision failed");
            if let Err(log_err) = self
                .log
                .fail_with("## Error", &format!("Supervisor error: {}", err))
            {
                tracing::error!(agent_id, error = %log_err, "Failed to finalize log");
            }
        }
        self.remove_launch_spec();
        result
    }

    fn supervise(&self, agent_id: &str, command: &LaunchCommand) -> Result<AgentStatus> {
        let mut child = match self.spawner.spawn(command) {
            Ok(child) => child,
            Err(err) => {
                tracing::error!(agent_id, error = %err, "Worker spawn failed");
                self.log
                    .fail_with("## Error", &format!("Error spawning worker: {}", err))?;
                return self.log.status();
            }
        };

        let pid = child.id();
        if let Err(err) = self.registry.upsert_pid(agent_id, pid, process_start_time(pid)) {
            tracing::warn!(agent_id, error = %err, "Failed to record worker pid");
        }
        tracing::info!(agent_id, pid, "Worker started");

        let started = Instant::now();
        let mut timed_out = false;
        let outcome = loop {
            match child.try_wait() {
                Ok(Some(outcome)) => break outcome,
                Ok(None) => {}
                Err(err) => {
                    if let Err(kill_err) = child.kill() {
                        tracing::warn!(agent_id, pid, error = %kill_err, "Failed to kill worker");
                    }
                    return Err(err);
                }
            }
            if let Some(limit) = self.timeout {
                if !timed_out && started.elapsed() >= limit {
                    timed_out = true;
                    tracing::warn!(agent_id, pid, "Worker timed out, killing");
                    // Killed first so nothing lands after the terminal status.
                    child.kill()?;
                    self.log.fail_with(
                        "## Error",
                        &format!("Agent timed out after {} seconds", limit.as_secs()),
                    )?;
                }
            }
            thread::sleep(self.poll_interval);
        };

        tracing::info!(agent_id, code = ?outcome.code, signal = ?outcome.signal, "Worker exited");
        finalize_after_exit(&self.log, outcome)
    }

    fn remove_launch_spec(&self) {
        match fs_err::remove_file(&self.launch_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(error = %err, "Failed to remove launch spec"),
        }
    }
}

/// Applies the exit rules to a log whose worker has exited: a non-zero exit
/// fails a still-running log, a clean exit completes it. A log the worker
/// already finalized is left alone.
pub fn finalize_after_exit(log: &AgentLog, outcome: ExitOutcome) -> Result<AgentStatus> {
    let status = log.status()?;
    if status != AgentStatus::InProgress {
        return Ok(status);
    }

    if outcome.success() {
        log.finalize(AgentStatus::Done)?;
    } else {
        log.fail_with("## Error", &outcome.describe())?;
    }
    log.status()
}

/// Installs a panic hook that records the panic into `log` and finalizes it
/// to `failed` before the default hook runs.
pub fn install_panic_finalizer(log: AgentLog) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = log.fail_with("## Error", &format!("Uncaught panic: {}", info));
        previous(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_log::LogHeader;
    use crate::registry::AgentRecord;
    use chrono::Utc;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::tempdir;

    struct FakeChild {
        polls_until_exit: Cell<u32>,
        outcome: ExitOutcome,
        killed: bool,
    }

    impl WorkerChild for FakeChild {
        fn id(&self) -> u32 {
            4242
        }

        fn try_wait(&mut self) -> Result<Option<ExitOutcome>> {
            if self.killed {
                return Ok(Some(ExitOutcome {
                    code: None,
                    signal: Some(9),
                }));
            }
            let left = self.polls_until_exit.get();
            if left == 0 {
                return Ok(Some(self.outcome));
            }
            self.polls_until_exit.set(left - 1);
            Ok(None)
        }

        fn kill(&mut self) -> Result<()> {
            self.killed = true;
            Ok(())
        }
    }

    struct FakeSpawner {
        polls: u32,
        outcome: ExitOutcome,
        fail: bool,
    }

    impl WorkerSpawner for FakeSpawner {
        type Child = FakeChild;

        fn spawn(&self, _command: &LaunchCommand) -> Result<FakeChild> {
            if self.fail {
                return Err(AgentError::Process("no such binary".to_string()));
            }
            Ok(FakeChild {
                polls_until_exit: Cell::new(self.polls),
                outcome: self.outcome,
                killed: false,
            })
        }
    }

    /// A worker whose exit status cannot be collected.
    struct UnwaitableChild {
        killed: Rc<Cell<bool>>,
    }

    impl WorkerChild for UnwaitableChild {
        fn id(&self) -> u32 {
            4343
        }

        fn try_wait(&mut self) -> Result<Option<ExitOutcome>> {
            Err(AgentError::Process("ECHILD".to_string()))
        }

        fn kill(&mut self) -> Result<()> {
            self.killed.set(true);
            Ok(())
        }
    }

    struct UnwaitableSpawner {
        killed: Rc<Cell<bool>>,
    }

    impl WorkerSpawner for UnwaitableSpawner {
        type Child = UnwaitableChild;

        fn spawn(&self, _command: &LaunchCommand) -> Result<UnwaitableChild> {
            Ok(UnwaitableChild {
                killed: Rc::clone(&self.killed),
            })
        }
    }

    /// Runs until killed and notes the log status it saw at kill time.
    struct WatchedChild {
        log: AgentLog,
        status_at_kill: Rc<Cell<Option<AgentStatus>>>,
        killed: bool,
    }

    impl WorkerChild for WatchedChild {
        fn id(&self) -> u32 {
            4444
        }

        fn try_wait(&mut self) -> Result<Option<ExitOutcome>> {
            Ok(self.killed.then_some(ExitOutcome {
                code: None,
                signal: Some(9),
            }))
        }

        fn kill(&mut self) -> Result<()> {
            self.status_at_kill.set(Some(self.log.status()?));
            self.killed = true;
            Ok(())
        }
    }

    struct WatchedSpawner {
        log: AgentLog,
        status_at_kill: Rc<Cell<Option<AgentStatus>>>,
    }

    impl WorkerSpawner for WatchedSpawner {
        type Child = WatchedChild;

        fn spawn(&self, _command: &LaunchCommand) -> Result<WatchedChild> {
            Ok(WatchedChild {
                log: self.log.clone(),
                status_at_kill: Rc::clone(&self.status_at_kill),
                killed: false,
            })
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        log: AgentLog,
        registry: Registry,
        launch_path: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = tempdir().unwrap();
        let log = AgentLog::create(
            temp.path().join("agent_w.md"),
            &LogHeader {
                task: "t".to_string(),
                instructions: "i".to_string(),
                started: Utc::now(),
                depth: 0,
                parent_id: None,
            },
        )
        .unwrap();
        let registry = Registry::new(temp.path().join(".active-pids.json"));
        registry
            .insert("agent_w", AgentRecord::new("researcher", 0, None))
            .unwrap();
        let launch_path = temp.path().join("agent_w.launch.json");
        fs_err::write(&launch_path, "{}").unwrap();
        Fixture {
            _temp: temp,
            log,
            registry,
            launch_path,
        }
    }

    fn command() -> LaunchCommand {
        LaunchCommand {
            program: PathBuf::from("agent-hook"),
            args: vec!["worker".to_string()],
            cwd: PathBuf::from("/"),
            env: Vec::new(),
        }
    }

    fn supervisor(f: &Fixture, spawner: FakeSpawner) -> Supervisor<FakeSpawner> {
        Supervisor::new(spawner, f.registry.clone(), f.log.clone(), f.launch_path.clone())
            .with_poll_interval(Duration::from_millis(1))
    }

    const CLEAN: ExitOutcome = ExitOutcome {
        code: Some(0),
        signal: None,
    };

    #[test]
    fn test_clean_exit_without_status_finalizes_done() {
        let f = fixture();
        let status = supervisor(&f, FakeSpawner { polls: 2, outcome: CLEAN, fail: false })
            .run("agent_w", &command())
            .unwrap();
        assert_eq!(status, AgentStatus::Done);
        assert_eq!(f.registry.get("agent_w").unwrap().pid, Some(4242));
        assert!(!f.launch_path.exists());
    }

    #[test]
    fn test_crash_finalizes_failed_with_trailer() {
        let f = fixture();
        let outcome = ExitOutcome {
            code: Some(1),
            signal: None,
        };
        let status = supervisor(&f, FakeSpawner { polls: 0, outcome, fail: false })
            .run("agent_w", &command())
            .unwrap();
        assert_eq!(status, AgentStatus::Failed);
        assert!(f.log.body().unwrap().contains("Process exited with code 1"));
        assert!(!f.launch_path.exists());
    }

    #[test]
    fn test_worker_finalized_status_is_kept() {
        let f = fixture();
        f.log.finalize(AgentStatus::Done).unwrap();
        let outcome = ExitOutcome {
            code: None,
            signal: Some(9),
        };
        let status = finalize_after_exit(&f.log, outcome).unwrap();
        assert_eq!(status, AgentStatus::Done);
        assert!(!f.log.read().unwrap().contains("## Error"));
    }

    #[test]
    fn test_spawn_failure_fails_log_and_cleans_up() {
        let f = fixture();
        let status = supervisor(&f, FakeSpawner { polls: 0, outcome: CLEAN, fail: true })
            .run("agent_w", &command())
            .unwrap();
        assert_eq!(status, AgentStatus::Failed);
        assert!(f.log.body().unwrap().contains("Error spawning worker"));
        assert!(!f.launch_path.exists());
    }

    #[test]
    fn test_timeout_kills_and_fails() {
        let f = fixture();
        let status = supervisor(&f, FakeSpawner { polls: u32::MAX, outcome: CLEAN, fail: false })
            .with_timeout(Some(Duration::ZERO))
            .run("agent_w", &command())
            .unwrap();
        assert_eq!(status, AgentStatus::Failed);
        let body = f.log.body().unwrap();
        assert!(body.contains("timed out"));
        assert_eq!(body.matches("## Error").count(), 1);
    }

    #[test]
    fn test_wait_error_still_fails_log() {
        let f = fixture();
        let killed = Rc::new(Cell::new(false));
        let spawner = UnwaitableSpawner {
            killed: Rc::clone(&killed),
        };
        let result = Supervisor::new(spawner, f.registry.clone(), f.log.clone(), f.launch_path.clone())
            .with_poll_interval(Duration::from_millis(1))
            .run("agent_w", &command());

        assert!(result.is_err());
        assert!(killed.get());
        assert_eq!(f.log.status().unwrap(), AgentStatus::Failed);
        assert!(f.log.body().unwrap().contains("Supervisor error: "));
        assert!(!f.launch_path.exists());
    }

    #[test]
    fn test_timeout_kills_before_failing_log() {
        let f = fixture();
        let status_at_kill = Rc::new(Cell::new(None));
        let spawner = WatchedSpawner {
            log: f.log.clone(),
            status_at_kill: Rc::clone(&status_at_kill),
        };
        let status = Supervisor::new(spawner, f.registry.clone(), f.log.clone(), f.launch_path.clone())
            .with_poll_interval(Duration::from_millis(1))
            .with_timeout(Some(Duration::ZERO))
            .run("agent_w", &command())
            .unwrap();

        assert_eq!(status, AgentStatus::Failed);
        assert_eq!(status_at_kill.get(), Some(AgentStatus::InProgress));
        assert!(f.log.body().unwrap().contains("timed out"));
    }

    #[test]
    fn test_exit_description() {
        let killed = ExitOutcome {
            code: None,
            signal: Some(9),
        };
        assert_eq!(killed.describe(), "Process exited with code null (signal: 9)");
    }
}
