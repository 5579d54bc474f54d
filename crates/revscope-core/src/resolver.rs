//! Target resolution.
//!
//! [`Resolver::resolve`] classifies one raw positional argument into exactly
//! one [`ReviewTarget`]. Classification runs an ordered cascade of
//! [`Detector`]s; the first whose predicate matches builds the result and no
//! later detector is consulted. Detector failures are returned as
//! `ReviewTarget::Error` and never fall through to the next detector.
//!
//! Cascade order:
//!
//! | # | Detector | Matches |
//! |---|----------|---------|
//! | 1 | area keyword | exact keyword (`security`, ...) |
//! | 2 | pull request | digits, or `https://host/org/repo/pull/<n>...` |
//! | 3 | range | contains `..` |
//! | 4 | git ref | resolves to a git object |
//! | 5 | no argument | empty input |
//!
//! Anything else is an `UnrecognizedArgument` error.
//!
//! [`Resolver::resolve_mode`] handles the second invocation, after the user has
//! picked an explicit [`ReviewMode`] in response to a pending state.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::base_branch::{is_base_branch, locate_base};
use crate::errors::RevscopeError;
use crate::git::{GitQueries, PullRequestLister};
use crate::target::{AreaKeyword, FilePattern, RefKind, ReviewTarget};

/// Shown when the current branch is passed explicitly.
pub const REASON_CURRENT_BRANCH: &str =
    "uncertain whether to review uncommitted changes or the branch's committed changes against the base";

/// Shown when a commit (not a branch head) is passed.
pub const REASON_COMMIT: &str =
    "uncertain whether to review this single commit or the range from it to HEAD";

/// Shown when a tag is passed.
pub const REASON_TAG: &str =
    "uncertain whether to review the tagged commit alone or the range from the tag to HEAD";

/// Shown for other object types (trees, blobs).
pub const REASON_OTHER: &str = "ref does not name a branch, commit, or tag";

// ============================================================================
// Resolution
// ============================================================================

/// Result of one resolver invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The classification.
    #[serde(flatten)]
    pub target: ReviewTarget,

    /// File filter, passed through unchanged.
    #[serde(default, skip_serializing_if = "file_pattern_unset")]
    pub file_pattern: FilePattern,

    /// Non-fatal notes (diverged upstream, multiple PRs).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn file_pattern_unset(p: &FilePattern) -> bool {
    !p.is_set()
}

// ============================================================================
// ReviewMode
// ============================================================================

/// How a session request should be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewMode {
    /// Run the detector cascade on the identifier.
    #[default]
    Auto,
    /// Uncommitted changes in the working tree.
    Local,
    /// A branch against the base branch.
    Branch,
    /// A single commit.
    Commit,
    /// `a..b`, or `<ref>..HEAD` when a single ref is given.
    Range,
    /// A pull request number or URL.
    Pr,
    /// A focus area keyword.
    Area,
}

impl ReviewMode {
    /// Name used in session ids and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Local => "local",
            Self::Branch => "branch",
            Self::Commit => "commit",
            Self::Range => "range",
            Self::Pr => "pr",
            Self::Area => "area",
        }
    }
}

impl std::fmt::Display for ReviewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReviewMode {
    type Err = RevscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "local" | "uncommitted" => Ok(Self::Local),
            "branch" => Ok(Self::Branch),
            "commit" => Ok(Self::Commit),
            "range" => Ok(Self::Range),
            "pr" | "pull" | "pull_request" => Ok(Self::Pr),
            "area" => Ok(Self::Area),
            other => Err(RevscopeError::InvalidMode(other.to_string())),
        }
    }
}

// ============================================================================
// Detectors
// ============================================================================

/// Mutable state shared by the detectors of one resolution.
struct Probe<'a> {
    git: &'a dyn GitQueries,
    prs: &'a dyn PullRequestLister,
    base_override: Option<&'a str>,
    git_ready: Option<bool>,
    warnings: Vec<String>,
}

impl Probe<'_> {
    fn git_ready(&mut self) -> bool {
        let git = self.git;
        *self.git_ready.get_or_insert_with(|| git.is_available())
    }

    fn base(&self) -> String {
        match self.base_override {
            Some(base) => base.to_string(),
            None => locate_base(self.git),
        }
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

/// One step of the cascade: a predicate and the constructor run when it matches.
struct Detector {
    name: &'static str,
    needs_git: bool,
    matches: fn(&Probe<'_>, &str) -> bool,
    build: fn(&mut Probe<'_>, &str) -> ReviewTarget,
}

/// The cascade, in priority order.
const DETECTORS: &[Detector] = &[
    Detector {
        name: "area_keyword",
        needs_git: false,
        matches: |_, arg| AreaKeyword::parse(arg).is_some(),
        build: build_area_keyword,
    },
    Detector {
        name: "pull_request",
        needs_git: false,
        matches: |_, arg| is_pr_number(arg) || pr_url_pattern().is_match(arg),
        build: build_pull_request,
    },
    Detector {
        name: "range",
        needs_git: true,
        matches: |_, arg| arg.contains(".."),
        build: build_range,
    },
    Detector {
        name: "git_ref",
        needs_git: true,
        matches: |probe, arg| !arg.is_empty() && probe.git.object_type(arg).is_some(),
        build: build_git_ref,
    },
    Detector {
        name: "no_argument",
        needs_git: true,
        matches: |_, arg| arg.is_empty(),
        build: build_no_argument,
    },
];

fn pr_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https://[^/\s]+/[^/\s]+/[^/\s]+/pull/([^/?#\s]*)(?:[/?#].*)?$")
            .expect("Invalid regex")
    })
}

fn digits_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]+$").expect("Invalid regex"))
}

fn is_pr_number(arg: &str) -> bool {
    digits_pattern().is_match(arg)
}

fn build_area_keyword(_: &mut Probe<'_>, arg: &str) -> ReviewTarget {
    match AreaKeyword::parse(arg) {
        Some(name) => ReviewTarget::AreaKeyword { name },
        None => ReviewTarget::from_error(&RevscopeError::UnrecognizedArgument(arg.to_string())),
    }
}

fn build_pull_request(_: &mut Probe<'_>, arg: &str) -> ReviewTarget {
    match parse_pull_request(arg) {
        Ok(target) => target,
        Err(e) => ReviewTarget::from_error(&e),
    }
}

/// Parse a bare PR number or PR URL into a `PullRequest` target.
///
/// The number captured from a URL is re-validated as digits-only; a URL whose
/// capture fails that check is a hard error.
pub fn parse_pull_request(arg: &str) -> Result<ReviewTarget, RevscopeError> {
    if is_pr_number(arg) {
        let number = arg
            .parse::<u64>()
            .map_err(|_| RevscopeError::InvalidArgument(format!("PR number `{}` is out of range", arg)))?;
        return Ok(ReviewTarget::PullRequest {
            number,
            source_url: None,
        });
    }

    let captured = pr_url_pattern()
        .captures(arg)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| RevscopeError::UnrecognizedArgument(arg.to_string()))?;

    if !digits_pattern().is_match(captured) {
        return Err(RevscopeError::MalformedUrl(arg.to_string()));
    }
    let number = captured
        .parse::<u64>()
        .map_err(|_| RevscopeError::MalformedUrl(arg.to_string()))?;

    Ok(ReviewTarget::PullRequest {
        number,
        source_url: Some(arg.to_string()),
    })
}

fn build_range(probe: &mut Probe<'_>, arg: &str) -> ReviewTarget {
    match parse_range(probe.git, arg) {
        Ok(target) => target,
        Err(e) => ReviewTarget::from_error(&e),
    }
}

/// Split at the first `..` and validate both endpoints.
fn parse_range(git: &dyn GitQueries, arg: &str) -> Result<ReviewTarget, RevscopeError> {
    let (start, end) = arg
        .split_once("..")
        .ok_or_else(|| RevscopeError::UnrecognizedArgument(arg.to_string()))?;

    if !git.verify_commit(start) {
        return Err(RevscopeError::InvalidRef {
            name: start.to_string(),
            detail: "start of range does not resolve to a commit".to_string(),
        });
    }
    if !git.verify_commit(end) {
        return Err(RevscopeError::InvalidRef {
            name: end.to_string(),
            detail: "end of range does not resolve to a commit".to_string(),
        });
    }

    Ok(ReviewTarget::Range {
        start_ref: start.to_string(),
        end_ref: end.to_string(),
    })
}

fn build_git_ref(probe: &mut Probe<'_>, arg: &str) -> ReviewTarget {
    let git = probe.git;
    let object_type = git.object_type(arg);
    let is_branch = git.local_branch_exists(arg);
    let ref_kind = if is_branch {
        RefKind::Branch
    } else {
        match object_type.as_deref() {
            Some("commit") => RefKind::Commit,
            Some("tag") => RefKind::Tag,
            _ => RefKind::Unknown,
        }
    };

    // current_branch already falls back to the short hash on a detached HEAD.
    let current = git.current_branch().ok();
    let is_current_branch = current.as_deref() == Some(arg);
    let base_branch = probe.base();

    if is_branch && !is_current_branch {
        return ReviewTarget::Branch {
            name: arg.to_string(),
            base_branch,
            ref_kind,
        };
    }

    let reason = if is_current_branch {
        REASON_CURRENT_BRANCH
    } else {
        match ref_kind {
            RefKind::Commit => REASON_COMMIT,
            RefKind::Tag => REASON_TAG,
            _ => REASON_OTHER,
        }
    };

    ReviewTarget::Ambiguous {
        raw_arg: arg.to_string(),
        ref_kind,
        is_branch,
        is_current_branch,
        base_branch,
        reason: reason.to_string(),
    }
}

fn build_no_argument(probe: &mut Probe<'_>, _: &str) -> ReviewTarget {
    let git = probe.git;

    let current = match git.current_branch() {
        Ok(branch) => branch,
        Err(e) => return ReviewTarget::from_error(&e),
    };
    let base_branch = probe.base();
    let on_base = is_base_branch(&current, &base_branch);
    let dirty = match git.has_uncommitted_changes() {
        Ok(dirty) => dirty,
        Err(e) => return ReviewTarget::from_error(&e),
    };

    match (on_base, dirty) {
        (true, true) => ReviewTarget::LocalUncommitted {
            current_branch: current,
            base_branch,
        },
        (true, false) => {
            ReviewTarget::from_error(&RevscopeError::NoChangesToReview { base_branch })
        }
        (false, true) => ReviewTarget::PromptUncommitted {
            current_branch: current,
            base_branch,
            has_uncommitted: true,
        },
        (false, false) => {
            let remote_ahead = inspect_upstream(probe, &current);
            let associated_pr = lookup_branch_pr(probe, &current);
            ReviewTarget::PromptPull {
                branch: current,
                associated_pr,
                remote_ahead,
            }
        }
    }
}

/// Whether the upstream has commits the local branch lacks. A missing
/// upstream or failed count is treated as "not ahead".
fn inspect_upstream(probe: &mut Probe<'_>, branch: &str) -> bool {
    let Some(upstream) = probe.git.upstream() else {
        tracing::debug!("No upstream configured for `{}`", branch);
        return false;
    };
    let Some((ahead, behind)) = probe.git.ahead_behind(&upstream) else {
        tracing::debug!("Could not count commits against `{}`", upstream);
        return false;
    };

    if behind == 0 {
        return false;
    }
    if ahead > 0 {
        probe.warn(format!(
            "Branch `{}` has diverged from `{}` ({} ahead, {} behind)",
            branch, upstream, ahead, behind
        ));
    }
    true
}

/// First open PR for `branch`, if the PR backend answers.
fn lookup_branch_pr(probe: &mut Probe<'_>, branch: &str) -> Option<u64> {
    match probe.prs.open_prs_for_branch(branch) {
        Ok(prs) => {
            if prs.len() > 1 {
                let numbers: Vec<String> = prs.iter().map(|p| format!("#{}", p.number)).collect();
                probe.warn(format!(
                    "Multiple open PRs for `{}` ({}); using #{}",
                    branch,
                    numbers.join(", "),
                    prs[0].number
                ));
            }
            prs.first().map(|p| p.number)
        }
        Err(e) => {
            tracing::debug!("PR lookup for `{}` unavailable: {}", branch, e);
            None
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Classifies invocations against one repository.
pub struct Resolver<'a> {
    git: &'a dyn GitQueries,
    prs: &'a dyn PullRequestLister,
    base_override: Option<String>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over the given git and PR backends.
    pub fn new(git: &'a dyn GitQueries, prs: &'a dyn PullRequestLister) -> Self {
        Self {
            git,
            prs,
            base_override: None,
        }
    }

    /// Compare against `base` instead of the discovered base branch.
    pub fn with_base_override(mut self, base: Option<String>) -> Self {
        self.base_override = base.filter(|b| !b.is_empty());
        self
    }

    fn probe(&self) -> Probe<'_> {
        Probe {
            git: self.git,
            prs: self.prs,
            base_override: self.base_override.as_deref(),
            git_ready: None,
            warnings: Vec::new(),
        }
    }

    /// Run the detector cascade on `raw_arg`.
    pub fn resolve(&self, raw_arg: Option<&str>, file_pattern: Option<&str>) -> Resolution {
        let arg = raw_arg.map(str::trim).unwrap_or("");
        let mut probe = self.probe();

        let target = run_cascade(&mut probe, arg);
        tracing::debug!("Resolved `{}` as {}", arg, target.mode_name());

        Resolution {
            target,
            file_pattern: FilePattern::new(file_pattern),
            warnings: probe.warnings,
        }
    }

    /// Resolve an explicit user choice, bypassing the cascade.
    ///
    /// The identifier is still validated for the chosen mode.
    pub fn resolve_mode(
        &self,
        mode: ReviewMode,
        identifier: &str,
        file_pattern: Option<&str>,
    ) -> Resolution {
        if mode == ReviewMode::Auto {
            return self.resolve(Some(identifier), file_pattern);
        }

        let identifier = identifier.trim();
        let mut probe = self.probe();
        let target = match explicit_target(&mut probe, mode, identifier) {
            Ok(target) => target,
            Err(e) => ReviewTarget::from_error(&e),
        };

        Resolution {
            target,
            file_pattern: FilePattern::new(file_pattern),
            warnings: probe.warnings,
        }
    }
}

fn run_cascade(probe: &mut Probe<'_>, arg: &str) -> ReviewTarget {
    for detector in DETECTORS {
        if detector.needs_git && !probe.git_ready() {
            return ReviewTarget::from_error(&git_missing());
        }
        if (detector.matches)(probe, arg) {
            tracing::debug!("Detector `{}` matched `{}`", detector.name, arg);
            return (detector.build)(probe, arg);
        }
    }
    ReviewTarget::from_error(&RevscopeError::UnrecognizedArgument(arg.to_string()))
}

fn git_missing() -> RevscopeError {
    RevscopeError::ExternalToolMissing {
        tool: "git".to_string(),
        reason: "git is required to resolve refs".to_string(),
    }
}

fn explicit_target(
    probe: &mut Probe<'_>,
    mode: ReviewMode,
    identifier: &str,
) -> Result<ReviewTarget, RevscopeError> {
    match mode {
        ReviewMode::Area => AreaKeyword::parse(identifier)
            .map(|name| ReviewTarget::AreaKeyword { name })
            .ok_or_else(|| RevscopeError::UnrecognizedArgument(identifier.to_string())),
        ReviewMode::Pr => parse_pull_request(identifier),
        _ if !probe.git_ready() => Err(git_missing()),
        ReviewMode::Local => {
            let current_branch = probe.git.current_branch()?;
            let base_branch = probe.base();
            if !probe.git.has_uncommitted_changes()? {
                return Err(RevscopeError::NoChangesToReview { base_branch });
            }
            Ok(ReviewTarget::LocalUncommitted {
                current_branch,
                base_branch,
            })
        }
        ReviewMode::Branch => {
            let name = if identifier.is_empty() {
                probe.git.current_branch()?
            } else {
                identifier.to_string()
            };
            if !probe.git.verify_commit(&name) {
                return Err(RevscopeError::InvalidRef {
                    name,
                    detail: "branch does not resolve to a commit".to_string(),
                });
            }
            let ref_kind = if probe.git.local_branch_exists(&name) {
                RefKind::Branch
            } else {
                match probe.git.object_type(&name).as_deref() {
                    Some("tag") => RefKind::Tag,
                    _ => RefKind::Commit,
                }
            };
            Ok(ReviewTarget::Branch {
                name,
                base_branch: probe.base(),
                ref_kind,
            })
        }
        ReviewMode::Commit => {
            if !probe.git.verify_commit(identifier) {
                return Err(RevscopeError::InvalidRef {
                    name: identifier.to_string(),
                    detail: "commit does not resolve".to_string(),
                });
            }
            Ok(ReviewTarget::Commit {
                rev: identifier.to_string(),
            })
        }
        ReviewMode::Range => {
            if identifier.contains("..") {
                parse_range(probe.git, identifier)
            } else {
                parse_range(probe.git, &format!("{}..HEAD", identifier))
            }
        }
        ReviewMode::Auto => Ok(run_cascade(probe, identifier)),
    }
}

// ============================================================================
// Tests
// ============================================================================
