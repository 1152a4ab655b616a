//! Normalization of `claude --output-format stream-json` lines, and dispatch
//! to the Cursor dialect.
//!
//! The CLI emits whole assistant messages, and with
//! `--include-partial-messages` also wraps raw API stream events in
//! `{"type": "stream_event", "event": {...}}`. Bare API events (as produced by
//! the agent SDK) are accepted too. Everything is reduced to [`StreamEvent`]
//! so the log writer never sees vendor shapes.

use serde::Deserialize;
use serde_json::Value;

use super::cursor::CursorState;
use crate::launch::Backend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    SessionStarted { session_id: String },
    /// A text block opened. Keyed as `<messageId>:<blockId or index>`.
    BlockStart { block: String },
    /// Snapshot of a block's text so far.
    BlockFullText { block: String, text: String },
    /// Incremental text for a block.
    BlockDelta { block: String, text: String },
    Terminal {
        success: bool,
        result: Option<String>,
        errors: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEvent {
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    Assistant {
        message: RawMessage,
    },
    MessageStart {
        message: RawMessage,
    },
    ContentBlockStart {
        #[serde(default)]
        index: u64,
        content_block: RawBlock,
    },
    ContentBlockDelta {
        #[serde(default)]
        index: u64,
        delta: RawBlock,
    },
    Result {
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        errors: Vec<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content: Vec<RawBlock>,
}

/// Content blocks and deltas share this loose shape; only text matters here.
#[derive(Debug, Deserialize)]
struct RawBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Stateful converter: stream events only carry a block index, so the id of
/// the message they belong to is remembered from `message_start`.
#[derive(Debug, Clone)]
pub struct Normalizer {
    fallback_id: String,
    current_message: Option<String>,
    /// Set when reading `cursor-agent` output.
    cursor: Option<CursorState>,
}

impl Normalizer {
    /// `fallback_id` stands in for a message id when the stream omits one.
    pub fn new(fallback_id: impl Into<String>) -> Self {
        Self {
            fallback_id: fallback_id.into(),
            current_message: None,
            cursor: None,
        }
    }

    pub fn for_backend(backend: Backend, fallback_id: impl Into<String>) -> Self {
        let mut normalizer = Self::new(fallback_id);
        if backend == Backend::Cursor {
            normalizer.cursor = Some(CursorState::default());
        }
        normalizer
    }

    /// Normalizes one JSONL line. Blank, non-JSON and unknown lines yield
    /// nothing.
    pub fn normalize_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => self.normalize(value),
            Err(err) => {
                tracing::debug!(error = %err, "Skipping non-JSON stream line");
                Vec::new()
            }
        }
    }

    pub fn normalize(&mut self, mut value: Value) -> Vec<StreamEvent> {
        if let Some(cursor) = self.cursor.as_mut() {
            return cursor.normalize(&self.fallback_id, value);
        }
        if value.get("type").and_then(Value::as_str) == Some("stream_event") {
            value = match value.get_mut("event").map(Value::take) {
                Some(event) => event,
                None => return Vec::new(),
            };
        }

        let raw: RawEvent = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(error = %err, "Skipping unrecognised stream event");
                return Vec::new();
            }
        };

        match raw {
            RawEvent::System {
                subtype,
                session_id: Some(session_id),
            } if subtype.as_deref() == Some("init") => {
                vec![StreamEvent::SessionStarted { session_id }]
            }
            RawEvent::Assistant { message } => {
                let message_id = message.id.unwrap_or_else(|| self.fallback_id.clone());
                message
                    .content
                    .into_iter()
                    .enumerate()
                    .filter(|(_, block)| block.kind == "text")
                    .filter_map(|(index, block)| {
                        let key = block_key(&message_id, block.id.as_deref(), index as u64);
                        block.text.map(|text| StreamEvent::BlockFullText { block: key, text })
                    })
                    .collect()
            }
            RawEvent::MessageStart { message } => {
                self.current_message = message.id;
                Vec::new()
            }
            RawEvent::ContentBlockStart {
                index,
                content_block,
            } if content_block.kind == "text" => {
                let key = block_key(self.message_id(), content_block.id.as_deref(), index);
                vec![StreamEvent::BlockStart { block: key }]
            }
            RawEvent::ContentBlockDelta { index, delta } if delta.kind == "text_delta" => {
                let key = block_key(self.message_id(), None, index);
                match delta.text {
                    Some(text) if !text.is_empty() => {
                        vec![StreamEvent::BlockDelta { block: key, text }]
                    }
                    _ => Vec::new(),
                }
            }
            RawEvent::Result {
                subtype,
                result,
                errors,
            } => vec![StreamEvent::Terminal {
                success: subtype == "success",
                result,
                errors,
            }],
            _ => Vec::new(),
        }
    }

    fn message_id(&self) -> &str {
        self.current_message.as_deref().unwrap_or(&self.fallback_id)
    }
}

fn block_key(message_id: &str, block_id: Option<&str>, index: u64) -> String {
    match block_id {
        Some(id) => format!("{}:{}", message_id, id),
        None => format!("{}:{}", message_id, index),
    }
}
