//! # revscope-core
//!
//! Review-target resolution and session caching.
//!
//! This crate turns one free-form command-line argument into exactly one
//! review target (area keyword, pull request, range, commit, branch, or the
//! uncommitted working set), and caches the diff bundle for that target in a
//! short-lived session so a multi-step caller can read it cheaply.
//!
//! ## Main Types
//!
//! - [`RevscopeEngine`] – entry point bound to one repository
//! - [`Resolver`] – the detector cascade
//! - [`ReviewTarget`] – the resolution outcome
//! - [`SessionManager`] – compute-once session cache
//! - [`Settings`] – immutable configuration
//! - [`DebugSink`] – optional debug capture
//! - [`RevscopeError`] – domain-specific error type
//!
//! ## Example
//!
//! ```ignore
//! use revscope_core::{RevscopeEngine, SessionRequest, NoopDebug};
//! use std::path::Path;
//!
//! let engine = RevscopeEngine::with_defaults(Path::new("."))?;
//! let sessions = engine.sessions(&NoopDebug);
//! let id = sessions.init(&SessionRequest {
//!     identifier: "feature/login".into(),
//!     ..Default::default()
//! })?;
//! println!("{}", sessions.get_status(&id)?);
//! ```

// Modules
pub mod base_branch;
pub mod bundle;
pub mod config;
pub mod constants;
pub mod debug;
pub mod engine;
pub mod errors;
pub mod git;
pub mod identity;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod target;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use base_branch::{is_base_branch, locate_base, LAST_RESORT_BASE};
pub use bundle::{
    BundleBuilder, ContextFile, ContextSource, DiffStats, FileChange, ReviewBundle,
    MAX_CONTEXT_FILE_BYTES,
};
pub use config::{SettingSource, Settings};
pub use debug::{
    debug_base, DebugCapture, DebugSink, NoopDebug, RecordingDebug, StageDuration, TimingEvent,
};
pub use engine::RevscopeEngine;
pub use errors::{ErrorKind, RevscopeError};
pub use git::{
    GhCli, GitCli, GitQueries, PullRequestLister, PullRequestMetadata, PullRequestSummary,
};
pub use identity::RepoIdentity;
pub use resolver::{Resolution, Resolver, ReviewMode};
pub use session::{
    default_session_root, AmbiguousData, ErrorData, FindData, PromptData, PromptPullData,
    SessionManager, SessionRecord, SessionRequest, SessionStatus, SessionSummary,
};
pub use target::{AreaKeyword, FilePattern, RefKind, ReviewTarget};
