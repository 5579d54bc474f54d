//! Common constants used throughout revscope-core.
//!
//! This module centralizes file names, environment variables, and configuration
//! keys to avoid duplication and ensure consistency across the codebase.

// ============================================================================
// Configuration
// ============================================================================

/// Config key for the directory review reports are written under.
pub const KEY_REVIEW_ROOT_PATH: &str = "REVIEW_ROOT_PATH";

/// Config key for the directory holding shared review context files.
pub const KEY_CONTEXT_PATH: &str = "CONTEXT_PATH";

/// Config key for the number of context lines passed to `git diff -U`.
pub const KEY_DIFF_CONTEXT_LINES: &str = "DIFF_CONTEXT_LINES";

/// The only config keys that are ever applied as settings.
pub const CONFIG_WHITELIST: &[&str] = &[KEY_REVIEW_ROOT_PATH, KEY_CONTEXT_PATH, KEY_DIFF_CONTEXT_LINES];

/// Default review output root, relative to the repository root.
pub const DEFAULT_REVIEW_ROOT: &str = ".reviews";

/// Default `git diff` context lines.
pub const DEFAULT_DIFF_CONTEXT_LINES: u32 = 3;

/// Directory name under the platform config dir (`~/.config/revscope`).
pub const CONFIG_DIR_NAME: &str = "revscope";

/// File name of the config file inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILENAME: &str = "config";

// ============================================================================
// Environment Variables
// ============================================================================

/// Enables debug capture when set to `1`, `true`, `yes` or `on`.
pub const ENV_DEBUG: &str = "REVSCOPE_DEBUG";

/// Overrides the base directory for debug sessions.
pub const ENV_DEBUG_DIR: &str = "REVSCOPE_DEBUG_DIR";

/// Overrides the directory review sessions are cached in.
pub const ENV_SESSION_DIR: &str = "REVSCOPE_SESSION_DIR";

// ============================================================================
// Sessions
// ============================================================================

/// Prefix of the per-user session directory used when no cache dir exists.
pub const SESSIONS_DIR_NAME: &str = "revscope-sessions";

/// The record file inside every session and debug-session directory.
pub const SESSION_FILENAME: &str = "session.json";

/// Schema version of `session.json`. Bump on incompatible changes.
pub const SESSION_SCHEMA_VERSION: u32 = 1;

/// Timestamp format embedded in session and debug directory names.
pub const ID_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

// ============================================================================
// Debug capture
// ============================================================================

/// Append-only timing log inside a debug session.
pub const TIMING_FILENAME: &str = "timing.ndjson";

/// Summary rendered by `finalize`.
pub const README_FILENAME: &str = "README.md";

/// Per-stage log of executed commands.
pub const COMMANDS_LOG: &str = "commands.log";

/// Per-stage captured stdout.
pub const STDOUT_LOG: &str = "stdout.log";

/// Per-stage captured stderr.
pub const STDERR_LOG: &str = "stderr.log";

/// Per-stage free-form trace lines.
pub const TRACE_LOG: &str = "trace.log";

/// Per-stage statistics record.
pub const STATS_FILENAME: &str = "stats.json";

// ============================================================================
// Context discovery
// ============================================================================

/// Per-directory context file picked up for changed files.
pub const CONTEXT_FILENAME: &str = ".review-context.md";
