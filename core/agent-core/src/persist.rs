//! Atomic JSON persistence shared by the registry and the monitor snapshot.
//!
//! Writes go to a temp file in the target directory and are renamed into
//! place, so readers never observe a half-written file.

use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{AgentError, Result};

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs_err::create_dir_all(parent_dir)
        .map_err(|e| AgentError::io(format!("creating {}", parent_dir.display()), e))?;

    let content = serde_json::to_string_pretty(value)
        .map_err(|e| AgentError::json(format!("serializing {}", path.display()), e))?;

    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .map_err(|e| AgentError::io("creating temp file", e))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| AgentError::io("writing temp file", e))?;
    temp_file
        .persist(path)
        .map_err(|e| AgentError::io(format!("replacing {}", path.display()), e.error))?;
    Ok(())
}

/// Reads a JSON file, degrading to `T::default()` when the file is missing,
/// empty or unparseable.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    let content = match fs_err::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to read {what}, using empty");
            return T::default();
        }
    };

    if content.trim().is_empty() {
        return T::default();
    }

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Corrupt {what}, using empty");
            T::default()
        }
    }
}
