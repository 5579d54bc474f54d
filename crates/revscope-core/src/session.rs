//! Review sessions.
//!
//! A session caches one fully resolved review request on disk so that a
//! multi-step caller can ask many cheap questions about it. All expensive
//! work (resolution, diff, file metadata, languages, context, PR metadata)
//! happens once in [`SessionManager::init`]; every accessor afterwards only
//! reads `session.json`.
//!
//! ```text
//! <session_root>/<org>-<repo>-<mode>-<identifier>-<YYYYMMDD-HHMMSS>/
//!   session.json
//! ```
//!
//! The record carries a schema version and a `complete` marker and is
//! written by temp-file-and-rename, so a reader sees either the whole record
//! or none of it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::bundle::{BundleBuilder, ReviewBundle};
use crate::config::Settings;
use crate::constants::{
    CONFIG_DIR_NAME, ENV_SESSION_DIR, ID_TIMESTAMP_FORMAT, SESSIONS_DIR_NAME,
    SESSION_FILENAME, SESSION_SCHEMA_VERSION,
};
use crate::debug::DebugSink;
use crate::errors::{ErrorKind, RevscopeError};
use crate::git::{GitQueries, PullRequestLister};
use crate::identity::{sanitize_component, RepoIdentity};
use crate::resolver::{Resolution, Resolver, ReviewMode};
use crate::storage::{create_private_dir, write_atomic};
use crate::target::{AreaKeyword, RefKind, ReviewTarget};

const STAGE: &str = "session";

// ============================================================================
// SessionStatus
// ============================================================================

/// What the caller should do next with a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Resolution or bundle computation failed.
    Error,
    /// Ask which interpretation of a ref was meant.
    Ambiguous,
    /// Ask whether to review uncommitted changes or the branch.
    Prompt,
    /// Ask whether to pull before reviewing.
    PromptPull,
    /// Area review; the caller searches the codebase itself.
    Find,
    /// Bundle computed; read it from the session file.
    Ready,
}

impl SessionStatus {
    /// Status implied by a resolved target.
    pub fn for_target(target: &ReviewTarget) -> Self {
        match target {
            ReviewTarget::Error { .. } => Self::Error,
            ReviewTarget::Ambiguous { .. } => Self::Ambiguous,
            ReviewTarget::PromptUncommitted { .. } => Self::Prompt,
            ReviewTarget::PromptPull { .. } => Self::PromptPull,
            ReviewTarget::AreaKeyword { .. } => Self::Find,
            ReviewTarget::LocalUncommitted { .. }
            | ReviewTarget::Branch { .. }
            | ReviewTarget::Commit { .. }
            | ReviewTarget::Range { .. }
            | ReviewTarget::PullRequest { .. } => Self::Ready,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Ambiguous => "ambiguous",
            Self::Prompt => "prompt",
            Self::PromptPull => "prompt_pull",
            Self::Find => "find",
            Self::Ready => "ready",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// What the caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Raw identifier (argument, ref, PR, keyword); may be empty.
    pub identifier: String,
    pub mode: ReviewMode,
    #[serde(default)]
    pub file_pattern: Option<String>,
    /// Base branch override.
    #[serde(default)]
    pub base: Option<String>,
}

/// Payload of an `error` session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
    pub kind: ErrorKind,
}

/// Payload of an `ambiguous` session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousData {
    pub raw_arg: String,
    pub ref_kind: RefKind,
    pub is_branch: bool,
    pub is_current_branch: bool,
    pub base_branch: String,
    pub reason: String,
}

/// Payload of a `prompt` session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptData {
    pub current_branch: String,
    pub base_branch: String,
    pub has_uncommitted: bool,
}

/// Payload of a `prompt_pull` session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPullData {
    pub branch: String,
    pub associated_pr: Option<u64>,
    pub remote_ahead: bool,
}

/// Payload of a `find` session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindData {
    pub area: AreaKeyword,
    pub file_pattern: Option<String>,
    pub repo_root: PathBuf,
}

/// The on-disk session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub schema_version: u32,
    /// Set on every record that was fully written.
    pub complete: bool,
    pub id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub repo: RepoIdentity,
    pub repo_root: PathBuf,
    pub request: SessionRequest,
    pub resolution: Resolution,
    #[serde(default)]
    pub error: Option<ErrorData>,
    #[serde(default)]
    pub bundle: Option<ReviewBundle>,
    #[serde(default)]
    pub debug_dir: Option<PathBuf>,
}

/// One entry of [`SessionManager::list`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub path: PathBuf,
    /// `None` when the record is missing or unreadable.
    pub status: Option<SessionStatus>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// SessionManager
// ============================================================================

/// Default session root: `REVSCOPE_SESSION_DIR`, else
/// `<cache_dir>/revscope/sessions`, else a per-user directory under the
/// system temp dir.
pub fn default_session_root() -> PathBuf {
    if let Some(dir) = std::env::var_os(ENV_SESSION_DIR).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .map(|d| d.join(CONFIG_DIR_NAME).join("sessions"))
        .unwrap_or_else(temp_session_root)
}

/// `<temp>/revscope-sessions-<euid>`. The temp dir is shared between
/// accounts, so the name carries the owner.
#[cfg(unix)]
fn temp_session_root() -> PathBuf {
    let euid = unsafe { libc::geteuid() };
    std::env::temp_dir().join(format!("{}-{}", SESSIONS_DIR_NAME, euid))
}

#[cfg(not(unix))]
fn temp_session_root() -> PathBuf {
    std::env::temp_dir().join(SESSIONS_DIR_NAME)
}

/// Build a session id from its parts.
pub fn session_id(
    identity: &RepoIdentity,
    mode: ReviewMode,
    identifier: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        identity.org,
        identity.repo,
        mode,
        identifier_component(identifier),
        at.format(ID_TIMESTAMP_FORMAT)
    )
}

/// Identifier as it appears in ids. `..` is folded so ids never contain it.
fn identifier_component(identifier: &str) -> String {
    match sanitize_component(identifier.trim()).replace("..", "_") {
        s if s.is_empty() => "none".to_string(),
        s => s,
    }
}

/// Creates, reads and removes sessions under one root directory.
pub struct SessionManager<'a> {
    settings: &'a Settings,
    root: PathBuf,
    git: &'a dyn GitQueries,
    prs: &'a dyn PullRequestLister,
    debug: &'a dyn DebugSink,
}

impl<'a> SessionManager<'a> {
    pub fn new(
        settings: &'a Settings,
        root: impl Into<PathBuf>,
        git: &'a dyn GitQueries,
        prs: &'a dyn PullRequestLister,
        debug: &'a dyn DebugSink,
    ) -> Self {
        Self {
            settings,
            root: root.into(),
            git,
            prs,
            debug,
        }
    }

    /// Session root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the request, compute the bundle when ready, and persist the
    /// record. Returns the session id.
    ///
    /// Pipeline failures are recorded in the session with status `error`;
    /// only failures to write the session itself are returned as `Err`.
    pub fn init(&self, request: &SessionRequest) -> Result<String, RevscopeError> {
        self.debug.time(STAGE, "start");
        if self.debug.is_enabled() {
            self.debug
                .log_command("environment", Command::new("git").arg("--version"));
        }

        let created_at = Utc::now();
        let repo = RepoIdentity::detect(self.git);
        let repo_root = self.git.repo_root();
        let id = session_id(&repo, request.mode, &request.identifier, created_at);
        tracing::debug!("Initializing session {}", id);

        self.debug.time("resolve", "start");
        let resolution = Resolver::new(self.git, self.prs)
            .with_base_override(request.base.clone())
            .resolve_mode(request.mode, &request.identifier, request.file_pattern.as_deref());
        self.debug.time("resolve", "end");
        if let Ok(json) = serde_json::to_value(&resolution) {
            self.debug.save_json("resolve", "resolution.json", &json);
        }

        let mut status = SessionStatus::for_target(&resolution.target);
        let mut error = match &resolution.target {
            ReviewTarget::Error { message, kind } => Some(ErrorData {
                message: message.clone(),
                kind: *kind,
            }),
            _ => None,
        };

        let mut bundle = None;
        if status == SessionStatus::Ready {
            let label = format!(
                "{}-{}-{}",
                resolution.target.mode_name(),
                identifier_component(&request.identifier),
                created_at.format(ID_TIMESTAMP_FORMAT)
            );
            let builder = BundleBuilder::new(self.git, self.prs, self.settings, &repo, self.debug);
            match builder.compute(&resolution.target, &resolution.file_pattern, &label) {
                Ok(b) => bundle = Some(b),
                Err(e) => {
                    tracing::warn!("Bundle computation failed: {}", e);
                    status = SessionStatus::Error;
                    error = Some(ErrorData {
                        message: e.to_string(),
                        kind: e.kind(),
                    });
                }
            }
        }

        let record = SessionRecord {
            schema_version: SESSION_SCHEMA_VERSION,
            complete: true,
            id: id.clone(),
            status,
            created_at,
            repo,
            repo_root,
            request: request.clone(),
            resolution,
            error,
            bundle,
            debug_dir: self.debug.root().map(Path::to_path_buf),
        };
        self.write(&record)?;

        self.debug.stats(STAGE, "status", serde_json::json!(status.as_str()));
        self.debug.time(STAGE, "end");
        Ok(id)
    }

    fn write(&self, record: &SessionRecord) -> Result<(), RevscopeError> {
        if !self.root.exists() {
            create_private_dir(&self.root)?;
        }
        let dir = self.root.join(&record.id);
        if dir.exists() {
            tracing::warn!("Session directory {} already exists; replacing", dir.display());
        }
        create_private_dir(&dir)?;
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&dir.join(SESSION_FILENAME), &json)
    }

    /// Directory for `id`, rejecting ids that could escape the root.
    fn session_dir(&self, id: &str) -> Result<PathBuf, RevscopeError> {
        if id.is_empty() || sanitize_component(id) != id || id.contains("..") {
            return Err(RevscopeError::InvalidArgument(format!(
                "invalid session id `{}`",
                id
            )));
        }
        Ok(self.root.join(id))
    }

    /// Read and validate the record for `id`.
    pub fn read(&self, id: &str) -> Result<SessionRecord, RevscopeError> {
        let dir = self.session_dir(id)?;
        if !dir.is_dir() {
            return Err(RevscopeError::SessionNotFound(id.to_string()));
        }
        let path = dir.join(SESSION_FILENAME);
        if !path.is_file() {
            return Err(RevscopeError::SessionIncomplete(id.to_string()));
        }

        let content = fs::read_to_string(&path)?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|_| RevscopeError::SessionIncomplete(id.to_string()))?;

        let found = value
            .get("schema_version")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;
        if found != SESSION_SCHEMA_VERSION {
            return Err(RevscopeError::SessionSchemaMismatch {
                id: id.to_string(),
                found,
                expected: SESSION_SCHEMA_VERSION,
            });
        }
        if value.get("complete").and_then(|v| v.as_bool()) != Some(true) {
            return Err(RevscopeError::SessionIncomplete(id.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }

    pub fn get_status(&self, id: &str) -> Result<SessionStatus, RevscopeError> {
        Ok(self.read(id)?.status)
    }

    fn require_status(
        &self,
        id: &str,
        expected: SessionStatus,
    ) -> Result<SessionRecord, RevscopeError> {
        let record = self.read(id)?;
        if record.status != expected {
            return Err(RevscopeError::SessionDataUnavailable {
                id: id.to_string(),
                expected: expected.to_string(),
                actual: record.status.to_string(),
            });
        }
        Ok(record)
    }

    fn mismatch(record: &SessionRecord, expected: SessionStatus) -> RevscopeError {
        RevscopeError::SessionDataUnavailable {
            id: record.id.clone(),
            expected: expected.to_string(),
            actual: record.resolution.target.mode_name().to_string(),
        }
    }

    pub fn get_error_data(&self, id: &str) -> Result<ErrorData, RevscopeError> {
        let record = self.require_status(id, SessionStatus::Error)?;
        record
            .error
            .clone()
            .ok_or_else(|| Self::mismatch(&record, SessionStatus::Error))
    }

    pub fn get_ambiguous_data(&self, id: &str) -> Result<AmbiguousData, RevscopeError> {
        let record = self.require_status(id, SessionStatus::Ambiguous)?;
        match record.resolution.target {
            ReviewTarget::Ambiguous {
                raw_arg,
                ref_kind,
                is_branch,
                is_current_branch,
                base_branch,
                reason,
            } => Ok(AmbiguousData {
                raw_arg,
                ref_kind,
                is_branch,
                is_current_branch,
                base_branch,
                reason,
            }),
            _ => Err(Self::mismatch(&record, SessionStatus::Ambiguous)),
        }
    }

    pub fn get_prompt_data(&self, id: &str) -> Result<PromptData, RevscopeError> {
        let record = self.require_status(id, SessionStatus::Prompt)?;
        match record.resolution.target {
            ReviewTarget::PromptUncommitted {
                current_branch,
                base_branch,
                has_uncommitted,
            } => Ok(PromptData {
                current_branch,
                base_branch,
                has_uncommitted,
            }),
            _ => Err(Self::mismatch(&record, SessionStatus::Prompt)),
        }
    }

    pub fn get_prompt_pull_data(&self, id: &str) -> Result<PromptPullData, RevscopeError> {
        let record = self.require_status(id, SessionStatus::PromptPull)?;
        match record.resolution.target {
            ReviewTarget::PromptPull {
                branch,
                associated_pr,
                remote_ahead,
            } => Ok(PromptPullData {
                branch,
                associated_pr,
                remote_ahead,
            }),
            _ => Err(Self::mismatch(&record, SessionStatus::PromptPull)),
        }
    }

    pub fn get_find_data(&self, id: &str) -> Result<FindData, RevscopeError> {
        let record = self.require_status(id, SessionStatus::Find)?;
        match record.resolution.target {
            ReviewTarget::AreaKeyword { name } => Ok(FindData {
                area: name,
                file_pattern: record.resolution.file_pattern.as_deref().map(String::from),
                repo_root: record.repo_root,
            }),
            _ => Err(Self::mismatch(&record, SessionStatus::Find)),
        }
    }

    /// Path of the record of a `ready` session.
    pub fn get_session_file(&self, id: &str) -> Result<PathBuf, RevscopeError> {
        self.require_status(id, SessionStatus::Ready)?;
        Ok(self.session_dir(id)?.join(SESSION_FILENAME))
    }

    /// Remove the session directory. Removing a missing session succeeds.
    pub fn cleanup(&self, id: &str) -> Result<(), RevscopeError> {
        let dir = self.session_dir(id)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!("Removed session {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All session directories under the root, newest first.
    pub fn list(&self) -> Result<Vec<SessionSummary>, RevscopeError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            let summary = match self.read(&id) {
                Ok(record) => SessionSummary {
                    id,
                    path,
                    status: Some(record.status),
                    created_at: record.created_at,
                },
                Err(e) => {
                    tracing::debug!("Unreadable session {}: {}", id, e);
                    let created_at = fs::metadata(&path)?.modified()?.into();
                    SessionSummary {
                        id,
                        path,
                        status: None,
                        created_at,
                    }
                }
            };
            sessions.push(summary);
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Remove sessions older than `max_age`, returning the removed ids.
    pub fn sweep(&self, max_age: Duration) -> Result<Vec<String>, RevscopeError> {
        let cutoff = Utc::now() - max_age;
        let mut removed = Vec::new();
        for session in self.list()? {
            if session.created_at < cutoff {
                fs::remove_dir_all(&session.path)?;
                removed.push(session.id);
            }
        }
        Ok(removed)
    }
}
