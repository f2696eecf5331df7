//! Whole-file JSON snapshots
//!
//! The result cache and the hive blackboard both serialise their full state
//! to one file after every mutation. Writes go to a sibling temp file and are
//! renamed into place so a crash mid-write never leaves a truncated snapshot.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

/// Write `value` as JSON to `path`, creating parent directories
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}

/// Read a JSON snapshot. Missing files and corrupt contents both yield
/// `None`; corruption is logged.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring unreadable snapshot {}: {}", path.display(), e);
            None
        }
    }
}
