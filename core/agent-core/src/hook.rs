//! Claude Code hook payloads: the JSON read from stdin and the JSON written
//! back on stdout.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub hook_event_name: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub stop_hook_active: Option<bool>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// The events this crate reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    PreToolUse { tool_name: String, tool_input: Value },
    PostToolUse { tool_name: String },
    UserPromptSubmit,
    Stop { stop_hook_active: bool },
    SubagentStop,
    SessionEnd { reason: Option<String> },
}

impl HookEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HookEvent::PreToolUse { .. } => "PreToolUse",
            HookEvent::PostToolUse { .. } => "PostToolUse",
            HookEvent::UserPromptSubmit => "UserPromptSubmit",
            HookEvent::Stop { .. } => "Stop",
            HookEvent::SubagentStop => "SubagentStop",
            HookEvent::SessionEnd { .. } => "SessionEnd",
        }
    }
}

impl HookInput {
    /// Parses the event. Unknown events and tool events without a tool name
    /// return `None`.
    pub fn to_event(&self) -> Option<HookEvent> {
        let tool_name = || self.tool_name.clone().filter(|t| !t.is_empty());
        match self.hook_event_name.as_deref()? {
            "PreToolUse" => Some(HookEvent::PreToolUse {
                tool_name: tool_name()?,
                tool_input: self.tool_input.clone().unwrap_or(Value::Null),
            }),
            "PostToolUse" => Some(HookEvent::PostToolUse {
                tool_name: tool_name()?,
            }),
            "UserPromptSubmit" => Some(HookEvent::UserPromptSubmit),
            "Stop" => Some(HookEvent::Stop {
                stop_hook_active: self.stop_hook_active.unwrap_or(false),
            }),
            "SubagentStop" => Some(HookEvent::SubagentStop),
            "SessionEnd" => Some(HookEvent::SessionEnd {
                reason: self.reason.clone(),
            }),
            _ => None,
        }
    }

    /// The working tree the hook fired in, falling back to the process cwd.
    pub fn resolve_cwd(&self) -> Option<PathBuf> {
        self.cwd
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

impl HookOutput {
    /// Denies the pending tool call with `reason` shown to the model.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            hook_specific_output: Some(HookSpecificOutput {
                hook_event_name: "PreToolUse".to_string(),
                permission_decision: Some("deny".to_string()),
                permission_decision_reason: Some(reason.into()),
                additional_context: None,
            }),
            system_message: None,
        }
    }

    /// Delivers monitor notifications. Mid-session tool events get inline
    /// context for the model; every other event gets a system message.
    pub fn notify(event: &HookEvent, message: impl Into<String>) -> Self {
        match event {
            HookEvent::PostToolUse { .. } => Self {
                hook_specific_output: Some(HookSpecificOutput {
                    hook_event_name: event.name().to_string(),
                    additional_context: Some(message.into()),
                    ..HookSpecificOutput::default()
                }),
                system_message: None,
            },
            _ => Self {
                hook_specific_output: None,
                system_message: Some(message.into()),
            },
        }
    }
}
