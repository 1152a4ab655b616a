//! Normalization of `cursor-agent --output-format stream-json` lines.
//!
//! Cursor events are loosely shaped: assistant text may sit under `delta`,
//! `message`, `content` or `text`, nested to a few levels. Text is collected
//! from whatever string leaves those keys lead to. Each assistant turn is one
//! block, closed by a `result`, `done`/`complete` or `error` event.

use serde_json::Value;

use super::event::StreamEvent;

const TEXT_KEYS: [&str; 6] = ["text", "content", "delta", "value", "result", "output_text"];
const NESTED_KEYS: [&str; 9] = [
    "content",
    "delta",
    "message",
    "value",
    "parts",
    "messages",
    "choices",
    "data",
    "output_text",
];
const MAX_NESTING: usize = 5;

#[derive(Debug, Clone, Default)]
pub(super) struct CursorState {
    turn: u64,
    session_seen: bool,
}

impl CursorState {
    pub(super) fn normalize(&mut self, fallback_id: &str, value: Value) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.session_seen {
            if let Some(session_id) = value.get("session_id").and_then(Value::as_str) {
                self.session_seen = true;
                events.push(StreamEvent::SessionStarted {
                    session_id: session_id.to_string(),
                });
            }
        }

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();

        if is_assistant(&kind, &value) {
            let block = format!("{}:cursor-{}", fallback_id, self.turn);
            let delta = joined_text(value.get("delta"));
            if !delta.is_empty() {
                events.push(StreamEvent::BlockDelta {
                    block: block.clone(),
                    text: delta,
                });
            }
            let full: String = ["message", "content", "text"]
                .iter()
                .map(|key| joined_text(value.get(*key)))
                .collect();
            if !full.is_empty() {
                events.push(StreamEvent::BlockFullText { block, text: full });
            }
        } else if kind == "result" || kind.ends_with(".result") {
            self.turn += 1;
            events.push(StreamEvent::Terminal {
                success: value.get("subtype").and_then(Value::as_str) != Some("failure"),
                result: value
                    .get("result")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string),
                errors: Vec::new(),
            });
        } else if kind == "done" || kind == "complete" {
            self.turn += 1;
            events.push(StreamEvent::Terminal {
                success: true,
                result: None,
                errors: Vec::new(),
            });
        } else if let Some(message) = error_message(&kind, &value) {
            self.turn += 1;
            events.push(StreamEvent::Terminal {
                success: false,
                result: None,
                errors: vec![message],
            });
        }
        events
    }
}

fn is_assistant(kind: &str, value: &Value) -> bool {
    let typed = ["assistant", "output_text", "delta"]
        .iter()
        .any(|needle| kind.contains(needle));
    typed
        || value.get("role").and_then(Value::as_str) == Some("assistant")
        || value.pointer("/message/role").and_then(Value::as_str) == Some("assistant")
}

fn error_message(kind: &str, value: &Value) -> Option<String> {
    let error = value
        .get("error")
        .filter(|e| !e.is_null() && e.as_str() != Some(""));
    if kind != "error" && error.is_none() {
        return None;
    }
    let text = match error.or_else(|| value.get("message")) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
        None => "Unknown error".to_string(),
    };
    Some(text)
}

fn joined_text(value: Option<&Value>) -> String {
    let mut chunks = Vec::new();
    if let Some(value) = value {
        collect_text(value, 0, &mut chunks);
    }
    chunks.concat()
}

fn collect_text(value: &Value, depth: usize, chunks: &mut Vec<String>) {
    if depth > MAX_NESTING {
        return;
    }
    match value {
        Value::String(s) if !s.is_empty() => chunks.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                collect_text(item, depth + 1, chunks);
            }
        }
        Value::Object(map) => {
            for (key, nested) in map {
                let key = key.as_str();
                match nested {
                    Value::String(s) if TEXT_KEYS.contains(&key) && !s.is_empty() => {
                        chunks.push(s.clone())
                    }
                    Value::Array(_) | Value::Object(_) if NESTED_KEYS.contains(&key) => {
                        collect_text(nested, depth + 1, chunks)
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(values: Vec<Value>) -> Vec<StreamEvent> {
        let mut state = CursorState::default();
        values
            .into_iter()
            .flat_map(|v| state.normalize("agent_c", v))
            .collect()
    }

    #[test]
    fn test_nested_message_text_is_collected() {
        let events = run(vec![json!({
            "type": "assistant",
            "message": {"role": "assistant", "content": [{"type": "text", "text": "Hi there"}]}
        })]);
        assert_eq!(
            events,
            vec![StreamEvent::BlockFullText {
                block: "agent_c:cursor-0".to_string(),
                text: "Hi there".to_string()
            }]
        );
    }

    #[test]
    fn test_delta_events_and_role_only_events() {
        let events = run(vec![
            json!({"type": "assistant_delta", "delta": {"text": "Hel"}}),
            json!({"role": "assistant", "text": "Hello"}),
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::BlockDelta {
                    block: "agent_c:cursor-0".to_string(),
                    text: "Hel".to_string()
                },
                StreamEvent::BlockFullText {
                    block: "agent_c:cursor-0".to_string(),
                    text: "Hello".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_session_id_reported_once() {
        let events = run(vec![
            json!({"type": "system", "subtype": "init", "session_id": "cur-1"}),
            json!({"type": "user", "session_id": "cur-1"}),
        ]);
        assert_eq!(
            events,
            vec![StreamEvent::SessionStarted {
                session_id: "cur-1".to_string()
            }]
        );
    }

    #[test]
    fn test_terminal_events_advance_the_turn() {
        let events = run(vec![
            json!({"type": "result", "subtype": "failure", "result": "  partial  "}),
            json!({"type": "assistant", "text": "again"}),
            json!({"type": "done"}),
            json!({"type": "error", "error": {"message": "rate limited"}}),
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::Terminal {
                    success: false,
                    result: Some("partial".to_string()),
                    errors: vec![]
                },
                StreamEvent::BlockFullText {
                    block: "agent_c:cursor-1".to_string(),
                    text: "again".to_string()
                },
                StreamEvent::Terminal {
                    success: true,
                    result: None,
                    errors: vec![]
                },
                StreamEvent::Terminal {
                    success: false,
                    result: None,
                    errors: vec!["rate limited".to_string()]
                },
            ]
        );
    }

    #[test]
    fn test_unrelated_events_are_skipped() {
        assert!(run(vec![json!({"type": "tool_call", "subtype": "started"})]).is_empty());
    }
}
