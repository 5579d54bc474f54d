//! Listing and cleaning old debug captures.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::constants::SESSION_FILENAME;
use crate::errors::RevscopeError;

/// One capture directory under the debug base.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugCapture {
    /// Directory name.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    /// `created_at` from the capture metadata, else the directory mtime.
    pub created_at: DateTime<Utc>,
    /// Total size of all files, in bytes.
    pub size_bytes: u64,
    /// Whether `finalize` wrote a README.
    pub finalized: bool,
}

/// List captures under `base`, newest first. A missing base yields none.
pub fn list_captures(base: &Path) -> Result<Vec<DebugCapture>, RevscopeError> {
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut captures = Vec::new();
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        captures.push(DebugCapture {
            name: entry.file_name().to_string_lossy().into_owned(),
            created_at: created_at(&path)?,
            size_bytes: dir_size(&path),
            finalized: path.join(crate::constants::README_FILENAME).exists(),
            path,
        });
    }

    captures.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(captures)
}

/// Delete captures older than `max_age`, or all of them when `max_age` is
/// `None`. Returns the removed captures.
pub fn sweep_captures(
    base: &Path,
    max_age: Option<Duration>,
) -> Result<Vec<DebugCapture>, RevscopeError> {
    let cutoff = max_age.map(|age| Utc::now() - age);
    let mut removed = Vec::new();

    for capture in list_captures(base)? {
        let expired = match cutoff {
            Some(cutoff) => capture.created_at < cutoff,
            None => true,
        };
        if expired {
            tracing::debug!("Removing debug capture {}", capture.path.display());
            fs::remove_dir_all(&capture.path)?;
            removed.push(capture);
        }
    }

    Ok(removed)
}

fn created_at(dir: &Path) -> Result<DateTime<Utc>, RevscopeError> {
    let from_metadata = fs::read_to_string(dir.join(SESSION_FILENAME))
        .ok()
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
        .and_then(|v| v.get("created_at").and_then(|c| c.as_str()).map(String::from))
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc));

    match from_metadata {
        Some(at) => Ok(at),
        None => Ok(DateTime::<Utc>::from(fs::metadata(dir)?.modified()?)),
    }
}

fn dir_size(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| match e.file_type() {
            Ok(t) if t.is_dir() => dir_size(&e.path()),
            Ok(_) => e.metadata().map(|m| m.len()).unwrap_or(0),
            Err(_) => 0,
        })
        .sum()
}
