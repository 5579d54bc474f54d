//! Debug instrumentation.
//!
//! Pipeline code talks to a [`DebugSink`]. Exactly one implementation is
//! chosen at startup:
//!
//! - [`NoopDebug`] when debugging is off. Every method returns immediately;
//!   nothing is formatted and nothing touches the filesystem.
//! - [`RecordingDebug`] when `REVSCOPE_DEBUG` is set. Artifacts, command
//!   output, traces and timing events land in a per-run directory under the
//!   debug base.
//!
//! In both cases [`DebugSink::log_command`] runs the command and returns its
//! exit code unchanged.

pub mod recorder;
pub mod retention;
pub mod timing;

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub use recorder::RecordingDebug;
pub use retention::{list_captures, sweep_captures, DebugCapture};
pub use timing::{StageDuration, TimingEvent};

use crate::constants::{CONFIG_DIR_NAME, ENV_DEBUG, ENV_DEBUG_DIR};
use crate::errors::RevscopeError;
use crate::identity::RepoIdentity;

/// Exit code reported when a command could not be spawned at all.
pub const SPAWN_FAILED_EXIT_CODE: i32 = 127;

// ============================================================================
// DebugSink
// ============================================================================

/// Destination for debug artifacts.
pub trait DebugSink {
    /// Whether this sink records anything.
    fn is_enabled(&self) -> bool;

    /// Root directory of the capture, if recording.
    fn root(&self) -> Option<&Path>;

    /// Store a text artifact as `<stage>/<name>`.
    fn save(&self, stage: &str, name: &str, content: &str);

    /// Store a JSON artifact as `<stage>/<name>`.
    fn save_json(&self, stage: &str, name: &str, value: &serde_json::Value);

    /// Run `command` and return its exit code.
    fn log_command(&self, stage: &str, command: &mut Command) -> i32;

    /// Append a timing event for `stage`.
    fn time(&self, stage: &str, event: &str);

    /// Append a line to `<stage>/trace.log`.
    fn trace(&self, stage: &str, message: &str);

    /// Record `key = value` in `<stage>/stats.json`.
    fn stats(&self, stage: &str, key: &str, value: serde_json::Value);

    /// Render the summary. Returns the README path when recording.
    fn finalize(&self) -> Result<Option<PathBuf>, RevscopeError>;
}

/// Run a command with its output discarded.
pub(crate) fn run_quiet(command: &mut Command) -> i32 {
    match command.stdout(Stdio::null()).stderr(Stdio::null()).status() {
        Ok(status) => status.code().unwrap_or(-1),
        Err(e) => {
            tracing::debug!("Failed to spawn {:?}: {}", command.get_program(), e);
            SPAWN_FAILED_EXIT_CODE
        }
    }
}

// ============================================================================
// NoopDebug
// ============================================================================

/// Sink used when debugging is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDebug;

impl DebugSink for NoopDebug {
    fn is_enabled(&self) -> bool {
        false
    }

    fn root(&self) -> Option<&Path> {
        None
    }

    fn save(&self, _stage: &str, _name: &str, _content: &str) {}

    fn save_json(&self, _stage: &str, _name: &str, _value: &serde_json::Value) {}

    fn log_command(&self, _stage: &str, command: &mut Command) -> i32 {
        run_quiet(command)
    }

    fn time(&self, _stage: &str, _event: &str) {}

    fn trace(&self, _stage: &str, _message: &str) {}

    fn stats(&self, _stage: &str, _key: &str, _value: serde_json::Value) {}

    fn finalize(&self) -> Result<Option<PathBuf>, RevscopeError> {
        Ok(None)
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Whether a raw `REVSCOPE_DEBUG` value turns debugging on.
pub fn flag_enabled(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

/// Whether `REVSCOPE_DEBUG` is set in the environment.
pub fn enabled_from_env() -> bool {
    flag_enabled(std::env::var(ENV_DEBUG).ok().as_deref())
}

/// Base directory for captures: `REVSCOPE_DEBUG_DIR`, else
/// `<cache_dir>/revscope/debug`, else `<temp_dir>/revscope-debug`.
pub fn debug_base() -> PathBuf {
    if let Some(dir) = std::env::var_os(ENV_DEBUG_DIR).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .map(|d| d.join(CONFIG_DIR_NAME).join("debug"))
        .unwrap_or_else(|| std::env::temp_dir().join("revscope-debug"))
}

/// Pick the sink for this run.
///
/// If the recording directory cannot be created the run continues without
/// debugging.
pub fn select(
    enabled: bool,
    base: &Path,
    identity: &RepoIdentity,
    mode: &str,
    identifier: &str,
) -> Box<dyn DebugSink> {
    if !enabled {
        return Box::new(NoopDebug);
    }
    match RecordingDebug::init(base, identity, mode, identifier) {
        Ok(recorder) => {
            tracing::info!("Debug capture: {}", recorder.dir().display());
            Box::new(recorder)
        }
        Err(e) => {
            tracing::warn!("Debug capture disabled: {}", e);
            Box::new(NoopDebug)
        }
    }
}
