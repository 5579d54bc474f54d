//! Error types for revscope-core.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain-specific errors for revscope operations.
#[derive(Error, Debug)]
pub enum RevscopeError {
    /// The raw argument matched none of the detectors.
    #[error("Unrecognized argument `{0}`: expected an area keyword, PR number or URL, range, or git ref.")]
    UnrecognizedArgument(String),

    /// An argument or identifier was recognized but is not usable.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A ref (range endpoint, commit, branch) does not resolve.
    #[error("Invalid ref `{name}`: {detail}")]
    InvalidRef {
        /// The ref that failed to resolve.
        name: String,
        /// What was being resolved (e.g. "start of range").
        detail: String,
    },

    /// On the base branch with nothing uncommitted and no target given.
    #[error("Nothing to review: on base branch `{base_branch}` with no uncommitted changes. Pass a branch, commit, range, or PR.")]
    NoChangesToReview {
        /// The base branch the user is currently on.
        base_branch: String,
    },

    /// The config file has the wrong owner or is group/other-writable.
    #[error("Refusing to load config `{path}`: {reason}. Fix the file ownership/permissions manually.")]
    ConfigSecurityViolation {
        /// Path to the rejected config file.
        path: PathBuf,
        /// What the check found.
        reason: String,
    },

    /// A pull request URL whose captured number failed secondary validation.
    #[error("Malformed pull request URL `{0}`: the PR number must be digits only.")]
    MalformedUrl(String),

    /// A required external tool (git, gh) is not installed or not on PATH.
    #[error("Required tool `{tool}` is not available: {reason}")]
    ExternalToolMissing {
        /// The missing executable.
        tool: String,
        /// Reason reported when spawning it.
        reason: String,
    },

    /// A git command exited with a failure status.
    #[error("`git {args}` failed: {stderr}")]
    GitCommandFailed {
        /// The arguments passed to git, space-joined.
        args: String,
        /// Trimmed stderr of the failed command.
        stderr: String,
    },

    /// An unknown review mode was requested.
    #[error("Unknown review mode `{0}`. Valid modes: auto, local, branch, commit, range, pr, area.")]
    InvalidMode(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// No session directory exists for the given id.
    #[error("Session `{0}` not found.")]
    SessionNotFound(String),

    /// The session record exists but was never fully written.
    #[error("Session `{0}` is incomplete (the computing process did not finish writing it).")]
    SessionIncomplete(String),

    /// The session record was written by an incompatible version.
    #[error("Session `{id}` has schema version {found}, expected {expected}.")]
    SessionSchemaMismatch {
        /// The session id.
        id: String,
        /// Schema version found on disk.
        found: u32,
        /// Schema version this build understands.
        expected: u32,
    },

    /// An accessor was called for a status the session is not in.
    #[error("Session `{id}` has status `{actual}`; `{expected}` data is not available.")]
    SessionDataUnavailable {
        /// The session id.
        id: String,
        /// Status the accessor requires.
        expected: String,
        /// Status recorded in the session.
        actual: String,
    },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A wrapped generic error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stable machine-readable code for an error, emitted in JSON payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    InvalidRef,
    NoChangesToReview,
    ConfigSecurityViolation,
    MalformedUrl,
    ExternalToolMissing,
    Internal,
}

impl RevscopeError {
    /// Map this error onto the taxonomy reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnrecognizedArgument(_) | Self::InvalidArgument(_) | Self::InvalidMode(_) => {
                ErrorKind::InvalidArgument
            }
            Self::InvalidRef { .. } => ErrorKind::InvalidRef,
            Self::NoChangesToReview { .. } => ErrorKind::NoChangesToReview,
            Self::ConfigSecurityViolation { .. } => ErrorKind::ConfigSecurityViolation,
            Self::MalformedUrl(_) => ErrorKind::MalformedUrl,
            Self::ExternalToolMissing { .. } => ErrorKind::ExternalToolMissing,
            _ => ErrorKind::Internal,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidRef => "invalid_ref",
            Self::NoChangesToReview => "no_changes_to_review",
            Self::ConfigSecurityViolation => "config_security_violation",
            Self::MalformedUrl => "malformed_url",
            Self::ExternalToolMissing => "external_tool_missing",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            RevscopeError::InvalidArgument("x".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            RevscopeError::MalformedUrl("u".into()).kind(),
            ErrorKind::MalformedUrl
        );
        assert_eq!(
            RevscopeError::SessionNotFound("s".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NoChangesToReview).unwrap();
        assert_eq!(json, "\"no_changes_to_review\"");
        assert_eq!(ErrorKind::InvalidRef.to_string(), "invalid_ref");
    }
}
