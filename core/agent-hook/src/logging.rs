//! File logging for agent-hook.
//!
//! stdout carries hook JSON responses, so logs go to a daily rolling file
//! under ~/.claude/logs. `AGENT_HOOK_LOG` takes an `EnvFilter` directive
//! (default `info`); `AGENT_HOOK_DEBUG=1` forces `debug`.

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "AGENT_HOOK_LOG";
const DEBUG_ENV: &str = "AGENT_HOOK_DEBUG";
const LOG_FILE_PREFIX: &str = "agent-hook.log";

fn filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. The guard must live until exit so
/// buffered lines are flushed. Returns `None` when there is no home
/// directory to log into.
pub fn init() -> Option<WorkerGuard> {
    let log_dir = dirs::home_dir()?.join(".claude").join("logs");
    if let Err(err) = fs_err::create_dir_all(&log_dir) {
        eprintln!("agent-hook: cannot create log directory: {}", err);
        return None;
    }

    let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    if installed.is_err() {
        return None;
    }
    Some(guard)
}
