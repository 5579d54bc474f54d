//! Git and GitHub CLI access.
//!
//! Everything revscope learns about a repository goes through the
//! [`GitQueries`] trait, and everything it learns about pull requests goes
//! through [`PullRequestLister`]. The production implementations shell out to
//! `git` and `gh`; tests substitute in-memory fakes.
//!
//! None of these operations mutate the repository.

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use serde::{Deserialize, Serialize};

use crate::errors::RevscopeError;

// ============================================================================
// Traits
// ============================================================================

/// Read-only queries against a git repository.
pub trait GitQueries {
    /// Whether the `git` executable can be run at all.
    fn is_available(&self) -> bool;

    /// Whether `rev` resolves to a commit (`rev-parse --verify <rev>^{commit}`).
    fn verify_commit(&self, rev: &str) -> bool;

    /// Object type of `rev` (`commit`, `tag`, `tree`, `blob`), if it resolves.
    fn object_type(&self, rev: &str) -> Option<String>;

    /// Whether `refs/heads/<name>` exists.
    fn local_branch_exists(&self, name: &str) -> bool;

    /// Whether `refs/remotes/<name>` exists (`name` includes the remote, e.g. `origin/main`).
    fn remote_branch_exists(&self, name: &str) -> bool;

    /// Current branch name, or the short commit hash when HEAD is detached.
    fn current_branch(&self) -> Result<String, RevscopeError>;

    /// Default branch recorded for `origin` (without the `origin/` prefix).
    fn remote_default_branch(&self) -> Option<String>;

    /// Whether tracked files in the working tree or index differ from HEAD.
    /// Untracked files are ignored, matching the `git diff HEAD` bundle scope.
    fn has_uncommitted_changes(&self) -> Result<bool, RevscopeError>;

    /// Upstream tracking ref of the current branch (e.g. `origin/feature`).
    fn upstream(&self) -> Option<String>;

    /// `(ahead, behind)` commit counts of HEAD relative to `upstream`.
    fn ahead_behind(&self, upstream: &str) -> Option<(u32, u32)>;

    /// URL of the `origin` remote.
    fn remote_url(&self) -> Option<String>;

    /// Top-level directory of the working tree.
    fn repo_root(&self) -> PathBuf;

    /// Run an arbitrary read-only git command and return its stdout.
    fn run(&self, args: &[&str]) -> Result<String, RevscopeError>;
}

/// Pull request lookups, backed by the GitHub CLI in production.
pub trait PullRequestLister {
    /// Open pull requests whose head is `branch`, in the order the backend lists them.
    fn open_prs_for_branch(&self, branch: &str) -> Result<Vec<PullRequestSummary>, RevscopeError>;

    /// Metadata for pull request `number`.
    fn metadata(&self, number: u64) -> Result<PullRequestMetadata, RevscopeError>;

    /// Unified diff of pull request `number`.
    fn diff(&self, number: u64) -> Result<String, RevscopeError>;
}

// ============================================================================
// Pull request records
// ============================================================================

/// A pull request found by branch lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    /// PR number.
    pub number: u64,
    /// Web URL.
    #[serde(default)]
    pub url: String,
    /// Title.
    #[serde(default)]
    pub title: String,
}

/// Author block as emitted by `gh --json author`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestAuthor {
    /// GitHub login.
    pub login: String,
}

/// Pull request metadata attached to PR-mode bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestMetadata {
    /// PR number.
    pub number: u64,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Description body.
    #[serde(default)]
    pub body: String,
    /// Author, if reported.
    #[serde(default)]
    pub author: Option<PullRequestAuthor>,
    /// Branch the PR merges into.
    #[serde(default)]
    pub base_ref_name: String,
    /// Branch the PR merges from.
    #[serde(default)]
    pub head_ref_name: String,
    /// Web URL.
    #[serde(default)]
    pub url: String,
}

// ============================================================================
// GitCli
// ============================================================================

/// [`GitQueries`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    /// Create a git accessor running commands in `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Run git and return the raw output, mapping spawn failures.
    fn output(&self, args: &[&str]) -> Result<Output, RevscopeError> {
        tracing::debug!("git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error("git", e))
    }

    /// Run git, returning trimmed stdout on success and `None` otherwise.
    fn query(&self, args: &[&str]) -> Option<String> {
        match self.output(args) {
            Ok(out) if out.status.success() => {
                Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
            }
            _ => None,
        }
    }

    /// Run git and report only whether it succeeded.
    fn succeeds(&self, args: &[&str]) -> bool {
        matches!(self.output(args), Ok(out) if out.status.success())
    }
}

impl GitQueries for GitCli {
    fn is_available(&self) -> bool {
        self.succeeds(&["--version"])
    }

    fn verify_commit(&self, rev: &str) -> bool {
        if rev.is_empty() || rev.starts_with('-') {
            return false;
        }
        let spec = format!("{}^{{commit}}", rev);
        self.succeeds(&["rev-parse", "--verify", "--quiet", &spec])
    }

    fn object_type(&self, rev: &str) -> Option<String> {
        if rev.is_empty() || rev.starts_with('-') {
            return None;
        }
        self.query(&["cat-file", "-t", rev]).filter(|t| !t.is_empty())
    }

    fn local_branch_exists(&self, name: &str) -> bool {
        let full = format!("refs/heads/{}", name);
        self.succeeds(&["show-ref", "--verify", "--quiet", &full])
    }

    fn remote_branch_exists(&self, name: &str) -> bool {
        let full = format!("refs/remotes/{}", name);
        self.succeeds(&["show-ref", "--verify", "--quiet", &full])
    }

    fn current_branch(&self) -> Result<String, RevscopeError> {
        if let Some(branch) = self
            .query(&["symbolic-ref", "--quiet", "--short", "HEAD"])
            .filter(|b| !b.is_empty())
        {
            return Ok(branch);
        }

        // Detached HEAD: fall back to the short hash.
        let out = self.output(&["rev-parse", "--short", "HEAD"])?;
        if out.status.success() {
            let hash = String::from_utf8_lossy(&out.stdout).trim().to_string();
            tracing::debug!("Detached HEAD at {}", hash);
            return Ok(hash);
        }

        Err(RevscopeError::InvalidRef {
            name: "HEAD".to_string(),
            detail: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        })
    }

    fn remote_default_branch(&self) -> Option<String> {
        let full = self.query(&["symbolic-ref", "--quiet", "--short", "refs/remotes/origin/HEAD"])?;
        let name = full.strip_prefix("origin/").unwrap_or(&full).to_string();
        (!name.is_empty()).then_some(name)
    }

    fn has_uncommitted_changes(&self) -> Result<bool, RevscopeError> {
        Ok(!self.run(&["status", "--porcelain", "--untracked-files=no"])?.is_empty())
    }

    fn upstream(&self) -> Option<String> {
        self.query(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{upstream}"])
            .filter(|u| !u.is_empty())
    }

    fn ahead_behind(&self, upstream: &str) -> Option<(u32, u32)> {
        let range = format!("HEAD...{}", upstream);
        let counts = self.query(&["rev-list", "--left-right", "--count", &range])?;
        parse_left_right(&counts)
    }

    fn remote_url(&self) -> Option<String> {
        self.query(&["remote", "get-url", "origin"]).filter(|u| !u.is_empty())
    }

    fn repo_root(&self) -> PathBuf {
        self.query(&["rev-parse", "--show-toplevel"])
            .map(PathBuf::from)
            .unwrap_or_else(|| self.root.clone())
    }

    fn run(&self, args: &[&str]) -> Result<String, RevscopeError> {
        let out = self.output(args)?;
        if !out.status.success() {
            return Err(RevscopeError::GitCommandFailed {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

/// Parse `git rev-list --left-right --count` output (`"<ahead>\t<behind>"`).
fn parse_left_right(counts: &str) -> Option<(u32, u32)> {
    let mut parts = counts.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}

fn spawn_error(tool: &str, e: std::io::Error) -> RevscopeError {
    if e.kind() == std::io::ErrorKind::NotFound {
        RevscopeError::ExternalToolMissing {
            tool: tool.to_string(),
            reason: "not found on PATH".to_string(),
        }
    } else {
        RevscopeError::Io(e)
    }
}

// ============================================================================
// GhCli
// ============================================================================

/// [`PullRequestLister`] backed by the `gh` executable.
#[derive(Debug, Clone)]
pub struct GhCli {
    root: PathBuf,
}

impl GhCli {
    /// Create a GitHub CLI accessor running commands in `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn run(&self, args: &[&str]) -> Result<String, RevscopeError> {
        tracing::debug!("gh {}", args.join(" "));
        let out = Command::new("gh")
            .args(args)
            .current_dir(&self.root)
            .env("GH_NO_UPDATE_NOTIFIER", "1")
            .env("GH_PROMPT_DISABLED", "1")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error("gh", e))?;

        if !out.status.success() {
            return Err(anyhow::anyhow!(
                "`gh {}` failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            )
            .into());
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

impl PullRequestLister for GhCli {
    fn open_prs_for_branch(&self, branch: &str) -> Result<Vec<PullRequestSummary>, RevscopeError> {
        let json = self.run(&[
            "pr", "list", "--head", branch, "--state", "open", "--json", "number,url,title",
        ])?;
        Ok(serde_json::from_str(&json)?)
    }

    fn metadata(&self, number: u64) -> Result<PullRequestMetadata, RevscopeError> {
        let n = number.to_string();
        let json = self.run(&[
            "pr",
            "view",
            &n,
            "--json",
            "number,title,body,author,baseRefName,headRefName,url",
        ])?;
        Ok(serde_json::from_str(&json)?)
    }

    fn diff(&self, number: u64) -> Result<String, RevscopeError> {
        self.run(&["pr", "diff", &number.to_string()])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_left_right() {
        assert_eq!(parse_left_right("3\t1"), Some((3, 1)));
        assert_eq!(parse_left_right("0 0\n"), Some((0, 0)));
        assert_eq!(parse_left_right("x\t1"), None);
        assert_eq!(parse_left_right(""), None);
    }

    #[test]
    fn test_pr_metadata_parses_gh_json() {
        let json = r#"{
            "number": 42,
            "title": "Add widgets",
            "body": "Adds them.",
            "author": {"login": "octocat"},
            "baseRefName": "main",
            "headRefName": "feature/widgets",
            "url": "https://github.com/acme/widgets/pull/42"
        }"#;
        let meta: PullRequestMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.number, 42);
        assert_eq!(meta.author.unwrap().login, "octocat");
        assert_eq!(meta.head_ref_name, "feature/widgets");
    }

    #[test]
    fn test_pr_summary_list_parses() {
        let json = r#"[{"number": 7, "url": "u", "title": "t"}, {"number": 9}]"#;
        let prs: Vec<PullRequestSummary> = serde_json::from_str(json).unwrap();
        assert_eq!(prs.len(), 2);
        assert_eq!(prs[1].number, 9);
        assert!(prs[1].url.is_empty());
    }

    #[test]
    fn test_verify_commit_rejects_option_like_refs() {
        let git = GitCli::new(std::env::temp_dir());
        assert!(!git.verify_commit("--all"));
        assert!(!git.verify_commit(""));
        assert!(git.object_type("-p").is_none());
    }
}
