//! Review target types.
//!
//! A [`ReviewTarget`] is the single classification the resolver produces for
//! one invocation. It serializes to a JSON object tagged by `mode`, which is
//! the shape the orchestration layer reads.

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorKind, RevscopeError};

// ============================================================================
// AreaKeyword
// ============================================================================

/// Focus areas that can be reviewed without a concrete diff target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaKeyword {
    Security,
    Performance,
    Maintainability,
    Testing,
    Compatibility,
    Architecture,
    Frontend,
}

impl AreaKeyword {
    /// All keywords, in documentation order.
    pub const ALL: [AreaKeyword; 7] = [
        Self::Security,
        Self::Performance,
        Self::Maintainability,
        Self::Testing,
        Self::Compatibility,
        Self::Architecture,
        Self::Frontend,
    ];

    /// The keyword as typed on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Maintainability => "maintainability",
            Self::Testing => "testing",
            Self::Compatibility => "compatibility",
            Self::Architecture => "architecture",
            Self::Frontend => "frontend",
        }
    }

    /// Exact (case-sensitive) match against the fixed keyword set.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for AreaKeyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RefKind
// ============================================================================

/// What kind of git object a ref argument names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Branch,
    Commit,
    Tag,
    Unknown,
}

impl std::fmt::Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Branch => write!(f, "branch"),
            Self::Commit => write!(f, "commit"),
            Self::Tag => write!(f, "tag"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// FilePattern
// ============================================================================

/// Optional glob restricting which files a review covers.
///
/// Empty input means "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilePattern(Option<String>);

impl FilePattern {
    /// Build from raw input, normalizing blank strings to no filter.
    pub fn new(raw: Option<&str>) -> Self {
        Self(raw.map(str::trim).filter(|s| !s.is_empty()).map(String::from))
    }

    /// The glob, if any.
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Whether a filter is set.
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

// ============================================================================
// ReviewTarget
// ============================================================================

/// The outcome of resolving one invocation.
///
/// `Ambiguous`, `PromptUncommitted` and `PromptPull` are pending states: the
/// caller must ask the user and invoke again with an explicit choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReviewTarget {
    /// Review a focus area across the codebase.
    AreaKeyword {
        name: AreaKeyword,
    },

    /// Review a GitHub pull request.
    PullRequest {
        number: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_url: Option<String>,
    },

    /// Review an explicit `start..end` range.
    Range {
        start_ref: String,
        end_ref: String,
    },

    /// Review a single commit.
    Commit {
        rev: String,
    },

    /// Review a ref against the base branch.
    Branch {
        name: String,
        base_branch: String,
        ref_kind: RefKind,
    },

    /// The ref is valid but the intended scope is unclear.
    Ambiguous {
        raw_arg: String,
        ref_kind: RefKind,
        is_branch: bool,
        is_current_branch: bool,
        base_branch: String,
        reason: String,
    },

    /// No argument, on a feature branch with uncommitted work.
    PromptUncommitted {
        current_branch: String,
        base_branch: String,
        has_uncommitted: bool,
    },

    /// No argument, clean feature branch; ask whether to pull first.
    PromptPull {
        branch: String,
        #[serde(default)]
        associated_pr: Option<u64>,
        remote_ahead: bool,
    },

    /// No argument, on the base branch with uncommitted work.
    LocalUncommitted {
        current_branch: String,
        base_branch: String,
    },

    /// Resolution failed.
    Error {
        message: String,
        kind: ErrorKind,
    },
}

impl ReviewTarget {
    /// Build an `Error` target from a domain error.
    pub fn from_error(err: &RevscopeError) -> Self {
        Self::Error {
            message: err.to_string(),
            kind: err.kind(),
        }
    }

    /// Whether this is the `Error` variant.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Whether the caller must ask the user before a review can start.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::Ambiguous { .. } | Self::PromptUncommitted { .. } | Self::PromptPull { .. }
        )
    }

    /// The `mode` tag as serialized.
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::AreaKeyword { .. } => "area_keyword",
            Self::PullRequest { .. } => "pull_request",
            Self::Range { .. } => "range",
            Self::Commit { .. } => "commit",
            Self::Branch { .. } => "branch",
            Self::Ambiguous { .. } => "ambiguous",
            Self::PromptUncommitted { .. } => "prompt_uncommitted",
            Self::PromptPull { .. } => "prompt_pull",
            Self::LocalUncommitted { .. } => "local_uncommitted",
            Self::Error { .. } => "error",
        }
    }
}
