//! The main entry point for revscope operations.
//!
//! [`RevscopeEngine`] ties the loaded [`Settings`] to one repository checkout
//! and hands out the resolver and session manager wired to the real `git` and
//! `gh` executables.

use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::debug::DebugSink;
use crate::errors::RevscopeError;
use crate::git::{GhCli, GitCli, GitQueries};
use crate::identity::RepoIdentity;
use crate::resolver::{Resolution, Resolver};
use crate::session::{default_session_root, SessionManager};

/// Engine bound to one repository.
///
/// # Example
///
/// ```ignore
/// use revscope_core::{RevscopeEngine, NoopDebug};
///
/// let engine = RevscopeEngine::with_defaults(Path::new("."))?;
/// let resolution = engine.resolve(Some("feature"), None, &NoopDebug);
/// ```
#[derive(Debug)]
pub struct RevscopeEngine {
    settings: Settings,
    repo_dir: PathBuf,
    git: GitCli,
    prs: GhCli,
    session_root: PathBuf,
}

impl RevscopeEngine {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create an engine for `repo_dir` with already-loaded settings.
    ///
    /// # Errors
    ///
    /// Returns [`RevscopeError::InvalidArgument`] if `repo_dir` is not a directory.
    pub fn from_settings(settings: Settings, repo_dir: &Path) -> Result<Self, RevscopeError> {
        if !repo_dir.is_dir() {
            return Err(RevscopeError::InvalidArgument(format!(
                "repository directory `{}` does not exist",
                repo_dir.display()
            )));
        }
        Ok(Self {
            settings,
            repo_dir: repo_dir.to_path_buf(),
            git: GitCli::new(repo_dir),
            prs: GhCli::new(repo_dir),
            session_root: default_session_root(),
        })
    }

    /// Load settings from the default config path and create an engine.
    pub fn with_defaults(repo_dir: &Path) -> Result<Self, RevscopeError> {
        Self::from_settings(Settings::load(None)?, repo_dir)
    }

    /// Load settings from `config` and create an engine.
    pub fn with_config(config: &Path, repo_dir: &Path) -> Result<Self, RevscopeError> {
        Self::from_settings(Settings::load(Some(config))?, repo_dir)
    }

    /// Store sessions under `root` instead of the default location.
    pub fn with_session_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.session_root = root.into();
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn session_root(&self) -> &Path {
        &self.session_root
    }

    /// `org`/`repo` of the checkout.
    pub fn identity(&self) -> RepoIdentity {
        RepoIdentity::detect(&self.git)
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Classify one raw argument.
    pub fn resolve(
        &self,
        raw_arg: Option<&str>,
        file_pattern: Option<&str>,
        debug: &dyn DebugSink,
    ) -> Resolution {
        debug.time("resolve", "start");
        let resolution = Resolver::new(&self.git, &self.prs).resolve(raw_arg, file_pattern);
        debug.time("resolve", "end");

        if let Ok(json) = serde_json::to_value(&resolution) {
            debug.save_json("resolve", "resolution.json", &json);
        }
        debug.trace(
            "resolve",
            &format!("{:?} -> {}", raw_arg.unwrap_or(""), resolution.target.mode_name()),
        );
        resolution
    }

    /// Session manager wired to this repository.
    pub fn sessions<'a>(&'a self, debug: &'a dyn DebugSink) -> SessionManager<'a> {
        SessionManager::new(&self.settings, &self.session_root, &self.git, &self.prs, debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::NoopDebug;
    use crate::target::ReviewTarget;
    use tempfile::TempDir;

    #[test]
    fn test_rejects_missing_repo_dir() {
        let dir = TempDir::new().unwrap();
        let err = RevscopeEngine::from_settings(Settings::default(), &dir.path().join("missing"))
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_area_keyword_resolves_outside_git() {
        let dir = TempDir::new().unwrap();
        let engine = RevscopeEngine::from_settings(Settings::default(), dir.path()).unwrap();
        let resolution = engine.resolve(Some("maintainability"), None, &NoopDebug);
        assert!(matches!(resolution.target, ReviewTarget::AreaKeyword { .. }));
    }

    #[test]
    fn test_session_root_override() {
        let dir = TempDir::new().unwrap();
        let engine = RevscopeEngine::from_settings(Settings::default(), dir.path())
            .unwrap()
            .with_session_root(dir.path().join("sessions"));
        let debug = NoopDebug;
        assert_eq!(engine.sessions(&debug).root(), dir.path().join("sessions"));
    }
}
