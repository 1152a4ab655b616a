//! The agent execution backends: a CLI subprocess emitting stream-json.
//!
//! `claude` reads the prompt as a single stream-json user message on stdin,
//! which is then closed. `cursor-agent` takes the prompt as its last argument
//! and gets no stdin. Responses are read as JSONL from stdout. Stderr is
//! drained on a background thread and surfaced when the process exits.

use std::io::{BufRead, BufReader, Lines, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::error::{AgentError, Result};
use crate::launch::{Backend, LaunchSpec};
use crate::runner::ExitOutcome;

/// A source of stream-json lines. The worker drives any implementation.
pub trait AgentStream {
    /// Next stdout line, or `None` at end of stream.
    fn next_line(&mut self) -> Result<Option<String>>;
    /// Waits for the backend to exit.
    fn finish(&mut self) -> Result<SessionExit>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionExit {
    pub outcome: ExitOutcome,
    pub stderr: String,
}

pub struct CliSession {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_buf: Arc<Mutex<String>>,
    stderr_reader: Option<JoinHandle<()>>,
    reaped: bool,
}

impl CliSession {
    /// Starts the spec's backend and hands it the prompt.
    pub fn start(spec: &LaunchSpec) -> Result<Self> {
        match spec.backend {
            Backend::Claude => {
                let mut session = Self::spawn(claude_command(spec))?;
                session.send_prompt(&spec.prompt)?;
                Ok(session)
            }
            Backend::Cursor => {
                let mut session = Self::spawn(cursor_command(spec))?;
                // Closing stdin: the prompt is already on the command line
                drop(session.child.stdin.take());
                Ok(session)
            }
        }
    }

    /// Spawns an arbitrary command with piped stdio. Stdin stays open until
    /// [`CliSession::send_prompt`] closes it.
    pub fn spawn(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let program = cmd.get_program().to_string_lossy().into_owned();
        let mut child = cmd
            .spawn()
            .map_err(|source| AgentError::Spawn { command: program, source })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Process("stdout not captured".into()))?;

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        let stderr_reader = child.stderr.take().map(|stderr| {
            let buf = Arc::clone(&stderr_buf);
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    let Ok(line) = line else { break };
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            })
        });

        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr_buf,
            stderr_reader,
            reaped: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Writes the prompt as a stream-json user message and closes stdin.
    pub fn send_prompt(&mut self, prompt: &str) -> Result<()> {
        let mut stdin = self
            .child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Process("stdin already closed".into()))?;

        let message = serde_json::json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{"type": "text", "text": prompt}]
            }
        });
        let mut buf = serde_json::to_vec(&message)
            .map_err(|e| AgentError::json("serializing prompt message", e))?;
        buf.push(b'\n');
        stdin
            .write_all(&buf)
            .map_err(|e| AgentError::io("writing prompt to agent", e))?;
        // Dropping stdin closes it: single-turn session
        Ok(())
    }
}

impl AgentStream for CliSession {
    fn next_line(&mut self) -> Result<Option<String>> {
        self.lines
            .next()
            .transpose()
            .map_err(|e| AgentError::io("reading agent output", e))
    }

    fn finish(&mut self) -> Result<SessionExit> {
        let status = self
            .child
            .wait()
            .map_err(|e| AgentError::io("waiting on agent", e))?;
        self.reaped = true;
        if let Some(handle) = self.stderr_reader.take() {
            let _ = handle.join();
        }
        let stderr = self
            .stderr_buf
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default();
        Ok(SessionExit {
            outcome: ExitOutcome::from(status),
            stderr,
        })
    }
}

/// A session abandoned before [`AgentStream::finish`] is killed and reaped,
/// so no agent process keeps working without a log owner.
impl Drop for CliSession {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        tracing::warn!(pid = self.child.id(), "Killing abandoned agent session");
        if let Err(err) = self.child.kill() {
            tracing::warn!(error = %err, "Failed to kill agent session");
        }
        let _ = self.child.wait();
    }
}

/// Builds the `claude` invocation for a launch spec.
pub fn claude_command(spec: &LaunchSpec) -> Command {
    let mut cmd = Command::new(&spec.claude_bin);
    cmd.arg("--output-format")
        .arg("stream-json")
        .arg("--verbose")
        .arg("--include-partial-messages")
        .arg("--input-format")
        .arg("stream-json")
        .arg("--permission-mode")
        .arg(&spec.permission_mode);

    if let Some(model) = &spec.model {
        cmd.arg("--model").arg(model);
    }
    if let Some(system_prompt) = &spec.system_prompt {
        cmd.arg("--append-system-prompt").arg(system_prompt);
    }
    if let Some(mcp) = &spec.mcp_config {
        cmd.arg("--mcp-config").arg(mcp.to_string());
    }

    // Nested sessions must not think they run inside the parent's terminal
    cmd.env_remove("CLAUDECODE");
    cmd.envs(spec.child_env());
    cmd.current_dir(&spec.cwd);
    cmd
}

/// Builds the `cursor-agent` invocation. Cursor has no system prompt flag,
/// so the agent's instructions are prepended to the prompt.
pub fn cursor_command(spec: &LaunchSpec) -> Command {
    let prompt = match &spec.system_prompt {
        Some(system_prompt) => format!("{}\n\n{}", system_prompt, spec.prompt),
        None => spec.prompt.clone(),
    };
    let mut cmd = Command::new(&spec.cursor_bin);
    cmd.arg("--print")
        .arg("--output-format")
        .arg("stream-json")
        .arg("--stream-partial-output")
        .arg("--force")
        .arg("--model")
        .arg(spec.model.as_deref().unwrap_or("auto"))
        .arg(prompt);

    cmd.env_remove("CLAUDECODE");
    cmd.envs(spec.child_env());
    cmd.current_dir(&spec.cwd);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            agent_id: "agent_e".to_string(),
            agent_type: "researcher".to_string(),
            depth: 1,
            cwd: PathBuf::from("/"),
            prompt: "hi".to_string(),
            system_prompt: Some("Be brief".to_string()),
            model: Some("haiku".to_string()),
            mcp_config: Some(serde_json::json!({"mcpServers": {"gh": {"command": "gh"}}})),
            backend: Backend::Claude,
            allowed_agents: None,
            allowed_mcp_servers: None,
            claude_bin: "claude".to_string(),
            cursor_bin: "cursor-agent".to_string(),
            permission_mode: "bypassPermissions".to_string(),
            update_marker: "📝".to_string(),
            timeout_secs: None,
        }
    }

    #[test]
    fn test_build_command_args() {
        let cmd = claude_command(&spec());
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(cmd.get_program(), "claude");
        assert!(args.windows(2).any(|w| w == ["--output-format", "stream-json"]));
        assert!(args.windows(2).any(|w| w == ["--input-format", "stream-json"]));
        assert!(args.windows(2).any(|w| w == ["--permission-mode", "bypassPermissions"]));
        assert!(args.windows(2).any(|w| w == ["--model", "haiku"]));
        assert!(args.windows(2).any(|w| w == ["--append-system-prompt", "Be brief"]));
        assert!(args.contains(&"--include-partial-messages".to_string()));
        let mcp_pos = args.iter().position(|a| a == "--mcp-config").unwrap();
        assert!(args[mcp_pos + 1].contains("mcpServers"));
    }

    #[test]
    fn test_cursor_command_args() {
        let mut spec = spec();
        spec.backend = Backend::Cursor;
        spec.model = Some("gpt-5".to_string());
        let cmd = cursor_command(&spec);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(cmd.get_program(), "cursor-agent");
        assert!(args.windows(2).any(|w| w == ["--output-format", "stream-json"]));
        assert!(args.windows(2).any(|w| w == ["--model", "gpt-5"]));
        assert!(args.contains(&"--stream-partial-output".to_string()));
        assert!(!args.contains(&"--mcp-config".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("Be brief\n\nhi"));
    }

    #[test]
    #[cfg(unix)]
    fn test_abandoned_session_is_killed_and_reaped() {
        use crate::liveness::{Liveness, LivenessProbe, SystemProbe};

        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let session = CliSession::spawn(cmd).unwrap();
        let pid = session.id();
        assert_eq!(SystemProbe.probe(pid, None), Liveness::Alive);

        drop(session);
        assert_eq!(SystemProbe.probe(pid, None), Liveness::Dead);
    }

    #[test]
    #[cfg(unix)]
    fn test_session_reads_lines_and_stderr() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("cat >/dev/null; echo '{\"a\":1}'; echo oops >&2; exit 3");
        let mut session = CliSession::spawn(cmd).unwrap();
        session.send_prompt("ignored").unwrap();

        assert_eq!(session.next_line().unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(session.next_line().unwrap(), None);

        let exit = session.finish().unwrap();
        assert_eq!(exit.outcome.code, Some(3));
        assert_eq!(exit.stderr, "oops");
    }
}
