//! Append-only reconciliation of streamed text into an agent log.
//!
//! Two input shapes arrive for the same blocks:
//!
//! - **Full text**: a snapshot of a block. Only the part not yet written is
//!   appended. A snapshot that repeats another block's text is an echo and is
//!   dropped. A snapshot that diverges from what was written is restated on a
//!   new line; nothing already in the log is retracted.
//! - **Delta**: a fragment appended verbatim. A fragment starting with the
//!   update marker always begins a fresh line.

use std::collections::HashMap;

use crate::agent_log::AgentLog;
use crate::error::Result;

/// Destination for body text.
pub trait LogSink {
    fn append(&mut self, text: &str) -> Result<()>;
}

impl LogSink for AgentLog {
    fn append(&mut self, text: &str) -> Result<()> {
        AgentLog::append(self, text)
    }
}

impl LogSink for String {
    fn append(&mut self, text: &str) -> Result<()> {
        self.push_str(text);
        Ok(())
    }
}

pub struct StreamLogWriter<S: LogSink> {
    sink: S,
    /// Text seen so far per block key.
    blocks: HashMap<String, String>,
    marker: String,
    last_char: Option<char>,
}

impl<S: LogSink> StreamLogWriter<S> {
    pub fn new(sink: S, marker: impl Into<String>) -> Self {
        Self {
            sink,
            blocks: HashMap::new(),
            marker: marker.into(),
            last_char: None,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// True once any body text has been written.
    pub fn wrote_any(&self) -> bool {
        self.last_char.is_some()
    }

    /// Appends text outside any block (result fallbacks, error sections).
    pub fn write_raw(&mut self, text: &str) -> Result<()> {
        self.emit(text)
    }

    pub fn block_start(&mut self, block: &str) {
        self.blocks.entry(block.to_string()).or_default();
    }

    pub fn full_text(&mut self, block: &str, text: &str) -> Result<()> {
        let previous = self.blocks.get(block).map(String::as_str).unwrap_or("");
        if text == previous || text.is_empty() {
            return Ok(());
        }

        let is_echo = self
            .blocks
            .iter()
            .any(|(key, seen)| key != block && seen == text);
        if is_echo {
            self.blocks.insert(block.to_string(), text.to_string());
            return Ok(());
        }

        let addition = match text.strip_prefix(previous) {
            Some(suffix) => suffix.to_string(),
            None => format!("\n{}", text),
        };
        self.emit(&addition)?;
        self.blocks.insert(block.to_string(), text.to_string());
        Ok(())
    }

    pub fn delta(&mut self, block: &str, fragment: &str) -> Result<()> {
        if fragment.is_empty() {
            return Ok(());
        }

        let starts_marker = !self.marker.is_empty() && fragment.starts_with(&self.marker);
        if starts_marker && self.last_char.is_some_and(|c| c != '\n') {
            self.emit("\n")?;
        }
        self.emit(fragment)?;
        self.blocks
            .entry(block.to_string())
            .or_default()
            .push_str(fragment);
        Ok(())
    }

    fn emit(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.sink.append(text)?;
        self.last_char = text.chars().last();
        Ok(())
    }
}
