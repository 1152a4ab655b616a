//! agent-hook: Claude Code hook handler that runs Task calls as background agents.
//!
//! Called directly by Claude Code hooks configured in ~/.claude/settings.json,
//! and re-invoked by itself to host the processes of a spawned agent.
//!
//! ## Subcommands
//!
//! - `handle`: Main hook handler, reads JSON from stdin
//! - `run`: Runner/supervisor for one agent (spawned by `handle`)
//! - `worker`: Drives the agent session and streams its log (spawned by `run`)
//! - `await`: Blocks until an agent finishes and prints its response

mod await_agent;
mod handle;
mod logging;
mod runner;
mod worker;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agent-hook")]
#[command(about = "Background agent delegation for Claude Code")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a hook event (reads JSON from stdin)
    Handle,

    /// Supervise an agent's worker (spawned by handle)
    Run {
        #[arg(long)]
        agent_id: String,

        /// Working tree the agent was spawned in
        #[arg(long)]
        cwd: PathBuf,
    },

    /// Run an agent session (spawned by run)
    Worker {
        #[arg(long)]
        agent_id: String,

        #[arg(long)]
        cwd: PathBuf,
    },

    /// Wait for an agent to finish and print its response
    Await {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        /// Give up after this many seconds (exit 1)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Working tree containing the agent logs (defaults to the current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Print a JSON object instead of the raw response
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    // Hook, runner and worker failures are reported through logs and agent
    // log files. A non-zero exit would surface as a hook pipeline error.
    match cli.command {
        Commands::Handle => {
            if let Err(e) = handle::run() {
                tracing::error!(error = %e, "agent-hook handle failed");
            }
        }
        Commands::Run { agent_id, cwd } => {
            if let Err(e) = runner::run(&agent_id, &cwd) {
                tracing::error!(agent_id = %agent_id, error = %e, "agent-hook run failed");
            }
        }
        Commands::Worker { agent_id, cwd } => {
            let status = worker::run(&agent_id, &cwd);
            tracing::info!(agent_id = %agent_id, %status, "Worker finished");
        }
        Commands::Await {
            agent_id,
            timeout_secs,
            cwd,
            json,
        } => {
            let code = await_agent::run(&agent_id, timeout_secs, cwd, json);
            std::process::exit(code);
        }
    }
}
