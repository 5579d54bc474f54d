//! Shared test utilities for revscope-cli integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

use assert_cmd::Command;
use tempfile::TempDir;

/// Get a Command for the revscope binary.
///
/// # Panics
///
/// Panics if the revscope binary cannot be found.
#[allow(deprecated)]
pub fn revscope_cmd() -> Command {
    Command::cargo_bin("revscope").expect("revscope binary should exist")
}

/// Whether a usable `git` is on PATH. Fixture tests return early without it.
pub fn git_available() -> bool {
    StdCommand::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// A throwaway git repository plus isolated session/debug/config locations.
pub struct Fixture {
    repo: TempDir,
    state: TempDir,
}

impl Fixture {
    /// Repository on `main` with one commit of `src/lib.rs`.
    ///
    /// Returns `None` when git is not installed.
    pub fn new() -> Option<Self> {
        if !git_available() {
            eprintln!("git not available; skipping");
            return None;
        }

        let fixture = Self {
            repo: TempDir::new().expect("create repo dir"),
            state: TempDir::new().expect("create state dir"),
        };
        fixture.git(&["init", "-q"]);
        fixture.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        fixture.git(&["config", "user.email", "dev@example.com"]);
        fixture.git(&["config", "user.name", "Dev"]);
        fixture.git(&["config", "commit.gpgsign", "false"]);
        fixture.commit_file("src/lib.rs", "pub fn answer() -> u32 {\n    41\n}\n", "initial");
        Some(fixture)
    }

    pub fn repo(&self) -> &Path {
        self.repo.path()
    }

    pub fn session_dir(&self) -> PathBuf {
        self.state.path().join("sessions")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.state.path().join("debug")
    }

    /// Config path that does not exist unless a test writes it.
    pub fn config_path(&self) -> PathBuf {
        self.state.path().join("config")
    }

    /// Run git in the repository, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(self.repo())
            .output()
            .expect("spawn git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn write_file(&self, rel: &str, content: &str) {
        let path = self.repo().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, content).expect("write file");
    }

    pub fn commit_file(&self, rel: &str, content: &str, message: &str) {
        self.write_file(rel, content);
        self.git(&["add", rel]);
        self.git(&["commit", "-q", "-m", message]);
    }

    /// Create `name` from the current HEAD with one extra commit, then switch
    /// back to `main`.
    pub fn feature_branch(&self, name: &str) {
        self.git(&["checkout", "-q", "-b", name]);
        self.commit_file("src/lib.rs", "pub fn answer() -> u32 {\n    42\n}\n", "fix answer");
        self.git(&["checkout", "-q", "main"]);
    }

    /// revscope command rooted in the repository with isolated state.
    pub fn cmd(&self) -> Command {
        let mut cmd = revscope_cmd();
        cmd.current_dir(self.repo())
            .env("REVSCOPE_SESSION_DIR", self.session_dir())
            .env("REVSCOPE_DEBUG_DIR", self.debug_dir())
            .env("REVSCOPE_CONFIG", self.config_path())
            .env("NO_COLOR", "1")
            .env_remove("REVSCOPE_DEBUG")
            .env_remove("REVSCOPE_VERBOSE")
            .env_remove("REVIEW_ROOT_PATH")
            .env_remove("CONTEXT_PATH")
            .env_remove("DIFF_CONTEXT_LINES");
        cmd
    }

    /// Run `revscope session init` and return the printed id.
    pub fn init_session(&self, args: &[&str]) -> String {
        let output = self
            .cmd()
            .args(["session", "init"])
            .args(args)
            .output()
            .expect("run session init");
        assert!(
            output.status.success(),
            "session init failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Run a command and parse its stdout as JSON.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cmd().args(args).output().expect("run revscope");
        serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
            panic!(
                "stdout of {:?} is not JSON ({}): {}",
                args,
                e,
                String::from_utf8_lossy(&output.stdout)
            )
        })
    }
}
