//! Error types for agent-core operations.

use std::path::PathBuf;

/// All errors that can occur in agent-core operations.
///
/// Hook entrypoints never surface these as process failures: they are logged
/// and, where an agent log exists, recorded into that log.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    Config { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Agent Log Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Agent log malformed: {path}: {details}")]
    LogFormat { path: PathBuf, details: String },

    #[error("Launch spec not found for agent {0}")]
    LaunchSpecMissing(String),

    // ─────────────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent process error: {0}")]
    Process(String),

    #[error("Could not allocate a unique agent id after {0} attempts")]
    IdExhausted(usize),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl AgentError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AgentError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        AgentError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using AgentError.
pub type Result<T> = std::result::Result<T, AgentError>;
