//! Review bundle computation.
//!
//! A bundle is everything a downstream reviewer needs for one ready target:
//! the unified diff, per-file change metadata, detected languages, context
//! documents, the path the review report should be written to, and PR
//! metadata when there is a pull request. It is computed once per session and
//! cached by [`crate::session::SessionManager`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::constants::CONTEXT_FILENAME;
use crate::debug::DebugSink;
use crate::errors::RevscopeError;
use crate::git::{GitQueries, PullRequestLister, PullRequestMetadata};
use crate::identity::RepoIdentity;
use crate::target::{FilePattern, ReviewTarget};

/// Context files larger than this are listed but not inlined.
pub const MAX_CONTEXT_FILE_BYTES: u64 = 256 * 1024;

const STAGE: &str = "bundle";

// ============================================================================
// Types
// ============================================================================

/// One changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path relative to the repository root (new path for renames).
    pub path: String,
    /// Single-letter git status (`A`, `M`, `D`, `R`, `C`, `T`).
    pub status: String,
    /// Added lines; `None` for binary files.
    pub added: Option<u64>,
    /// Removed lines; `None` for binary files.
    pub removed: Option<u64>,
    /// Language tag from the file extension.
    pub language: Option<String>,
}

/// Totals over all changed files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub files: usize,
    pub added: u64,
    pub removed: u64,
}

/// Where a context file was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// Under the configured `CONTEXT_PATH`.
    Configured,
    /// A `.review-context.md` in the repository root or a changed file's directory.
    Directory,
}

/// A context document attached to the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    pub path: PathBuf,
    pub source: ContextSource,
    /// File content; `None` when the file was too large or unreadable.
    pub content: Option<String>,
}

/// The cached data for one ready session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewBundle {
    pub diff: String,
    pub files: Vec<FileChange>,
    pub stats: DiffStats,
    pub languages: Vec<String>,
    pub context_files: Vec<ContextFile>,
    /// Where the review report should be written.
    pub review_file: PathBuf,
    #[serde(default)]
    pub pull_request: Option<PullRequestMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// ============================================================================
// BundleBuilder
// ============================================================================

/// Computes bundles against one repository.
pub struct BundleBuilder<'a> {
    git: &'a dyn GitQueries,
    prs: &'a dyn PullRequestLister,
    settings: &'a Settings,
    identity: &'a RepoIdentity,
    debug: &'a dyn DebugSink,
}

impl<'a> BundleBuilder<'a> {
    pub fn new(
        git: &'a dyn GitQueries,
        prs: &'a dyn PullRequestLister,
        settings: &'a Settings,
        identity: &'a RepoIdentity,
        debug: &'a dyn DebugSink,
    ) -> Self {
        Self {
            git,
            prs,
            settings,
            identity,
            debug,
        }
    }

    /// Compute the bundle for a ready `target`.
    ///
    /// `label` names the review file (`<mode>-<identifier>-<timestamp>`).
    pub fn compute(
        &self,
        target: &ReviewTarget,
        file_pattern: &FilePattern,
        label: &str,
    ) -> Result<ReviewBundle, RevscopeError> {
        self.debug.time(STAGE, "start");
        let result = self.compute_inner(target, file_pattern, label);
        self.debug.time(STAGE, "end");
        result
    }

    fn compute_inner(
        &self,
        target: &ReviewTarget,
        file_pattern: &FilePattern,
        label: &str,
    ) -> Result<ReviewBundle, RevscopeError> {
        let mut warnings = Vec::new();
        let context = self.settings.diff_context_lines.to_string();

        let filter = PathFilter::new(file_pattern)?;
        let (diff, mut files) = match target {
            ReviewTarget::PullRequest { number, .. } => {
                let diff = filter.diff(&self.prs.diff(*number)?);
                let files = parse_diff_files(&diff);
                (diff, files)
            }
            _ => {
                let spec = diff_spec(target)?;
                let (diff, mut files) = self.git_diff(&spec, &context)?;
                files.retain(|f| filter.matches(&f.path));
                (filter.diff(&diff), files)
            }
        };

        for file in &mut files {
            file.language = language_for_path(&file.path).map(String::from);
        }

        let stats = DiffStats {
            files: files.len(),
            added: files.iter().filter_map(|f| f.added).sum(),
            removed: files.iter().filter_map(|f| f.removed).sum(),
        };
        let languages: Vec<String> = files
            .iter()
            .filter_map(|f| f.language.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let root = self.git.repo_root();
        let context_files = self.collect_context(&root, &files);
        let pull_request = self.pull_request_metadata(target, &mut warnings);

        let review_file = review_file_path(&root, self.settings, self.identity, label);

        self.debug.save(STAGE, "diff.patch", &diff);
        if let Ok(json) = serde_json::to_value(&files) {
            self.debug.save_json(STAGE, "files.json", &json);
        }
        self.debug.stats(STAGE, "files", serde_json::json!(stats.files));
        self.debug.stats(STAGE, "added", serde_json::json!(stats.added));
        self.debug.stats(STAGE, "removed", serde_json::json!(stats.removed));
        self.debug.stats(STAGE, "context_files", serde_json::json!(context_files.len()));

        Ok(ReviewBundle {
            diff,
            files,
            stats,
            languages,
            context_files,
            review_file,
            pull_request,
            warnings,
        })
    }

    /// Run the diff, numstat and name-status views of one git diff spec.
    ///
    /// The file pattern is applied afterwards by [`PathFilter`], so git and
    /// pull request targets share one glob dialect.
    fn git_diff(
        &self,
        spec: &DiffSpec,
        context: &str,
    ) -> Result<(String, Vec<FileChange>), RevscopeError> {
        let unified = format!("-U{}", context);

        let run = |extra: &[&str]| -> Result<String, RevscopeError> {
            let mut args: Vec<&str> = spec.command.to_vec();
            args.extend_from_slice(extra);
            args.extend(spec.revs.iter().map(String::as_str));
            self.debug.trace(STAGE, &format!("git {}", args.join(" ")));
            self.git.run(&args)
        };

        let diff = run(&["--no-renames", unified.as_str()])?;
        let numstat = run(&["--no-renames", "--numstat"])?;
        let name_status = run(&["--no-renames", "--name-status"])?;

        Ok((diff, merge_file_metadata(&numstat, &name_status)))
    }

    fn collect_context(&self, root: &Path, files: &[FileChange]) -> Vec<ContextFile> {
        let mut found: Vec<ContextFile> = Vec::new();
        let mut seen: BTreeSet<PathBuf> = BTreeSet::new();

        if let Some(dir) = &self.settings.context_path {
            let dir = if dir.is_absolute() {
                dir.clone()
            } else {
                root.join(dir)
            };
            for path in walk_context_dir(&dir) {
                if seen.insert(path.clone()) {
                    found.push(read_context(path, ContextSource::Configured));
                }
            }
        }

        for path in directory_context_files(root, files) {
            if seen.insert(path.clone()) {
                found.push(read_context(path, ContextSource::Directory));
            }
        }

        found
    }

    fn pull_request_metadata(
        &self,
        target: &ReviewTarget,
        warnings: &mut Vec<String>,
    ) -> Option<PullRequestMetadata> {
        let number = match target {
            ReviewTarget::PullRequest { number, .. } => *number,
            ReviewTarget::Branch { name, .. } => match self.prs.open_prs_for_branch(name) {
                Ok(prs) => prs.first()?.number,
                Err(e) => {
                    tracing::debug!("No PR lookup for `{}`: {}", name, e);
                    return None;
                }
            },
            _ => return None,
        };

        match self.prs.metadata(number) {
            Ok(meta) => Some(meta),
            Err(e) => {
                let message = format!("Could not load metadata for PR #{}: {}", number, e);
                tracing::warn!("{}", message);
                warnings.push(message);
                None
            }
        }
    }
}

// ============================================================================
// Diff specs
// ============================================================================

/// A git command plus revision arguments producing the target's diff.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DiffSpec {
    command: &'static [&'static str],
    revs: Vec<String>,
}

fn diff_spec(target: &ReviewTarget) -> Result<DiffSpec, RevscopeError> {
    const DIFF: &[&str] = &["diff"];
    // `show` handles root commits, which have no `^` parent.
    const SHOW: &[&str] = &["show", "--format="];

    let spec = match target {
        ReviewTarget::LocalUncommitted { .. } => DiffSpec {
            command: DIFF,
            revs: vec!["HEAD".to_string()],
        },
        ReviewTarget::Branch {
            name, base_branch, ..
        } => DiffSpec {
            command: DIFF,
            revs: vec![format!("{}...{}", base_branch, name)],
        },
        ReviewTarget::Commit { rev } => DiffSpec {
            command: SHOW,
            revs: vec![rev.clone()],
        },
        ReviewTarget::Range { start_ref, end_ref } => DiffSpec {
            command: DIFF,
            revs: vec![format!("{}..{}", start_ref, end_ref)],
        },
        other => {
            return Err(RevscopeError::InvalidArgument(format!(
                "no diff can be computed for a `{}` target",
                other.mode_name()
            )))
        }
    };
    Ok(spec)
}

/// Merge `--numstat` and `--name-status` output into file records.
pub fn merge_file_metadata(numstat: &str, name_status: &str) -> Vec<FileChange> {
    let mut by_path: BTreeMap<String, FileChange> = BTreeMap::new();

    for line in name_status.lines() {
        let mut parts = line.split('\t');
        let (Some(status), Some(path)) = (parts.next(), parts.next()) else {
            continue;
        };
        let status = status.chars().next().map(String::from).unwrap_or_default();
        by_path.insert(
            path.to_string(),
            FileChange {
                path: path.to_string(),
                status,
                added: None,
                removed: None,
                language: None,
            },
        );
    }

    for line in numstat.lines() {
        let mut parts = line.splitn(3, '\t');
        let (Some(added), Some(removed), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let entry = by_path.entry(path.to_string()).or_insert_with(|| FileChange {
            path: path.to_string(),
            status: "M".to_string(),
            added: None,
            removed: None,
            language: None,
        });
        entry.added = added.parse().ok();
        entry.removed = removed.parse().ok();
    }

    by_path.into_values().collect()
}

/// Extract file records from a unified diff (used for PR diffs).
pub fn parse_diff_files(diff: &str) -> Vec<FileChange> {
    let mut files: Vec<FileChange> = Vec::new();
    let mut in_hunk = false;

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            in_hunk = false;
            let path = rest
                .rsplit_once(" b/")
                .map(|(_, b)| b.to_string())
                .unwrap_or_else(|| rest.to_string());
            files.push(FileChange {
                path,
                status: "M".to_string(),
                added: Some(0),
                removed: Some(0),
                language: None,
            });
            continue;
        }
        let Some(file) = files.last_mut() else {
            continue;
        };
        if line.starts_with("@@") {
            in_hunk = true;
        } else if in_hunk {
            if line.starts_with('+') {
                file.added = file.added.map(|n| n + 1);
            } else if line.starts_with('-') {
                file.removed = file.removed.map(|n| n + 1);
            }
        } else if line.starts_with("new file mode") {
            file.status = "A".to_string();
        } else if line.starts_with("deleted file mode") {
            file.status = "D".to_string();
        } else if line.starts_with("rename from") {
            file.status = "R".to_string();
        } else if line.starts_with("Binary files") {
            file.added = None;
            file.removed = None;
        }
    }

    files
}

/// Compiled `--files` glob, matched with gitignore rules: a pattern without
/// a slash matches at any depth, `**` crosses directories.
struct PathFilter(Option<Gitignore>);

impl PathFilter {
    fn new(pattern: &FilePattern) -> Result<Self, RevscopeError> {
        let Some(glob) = pattern.as_deref() else {
            return Ok(Self(None));
        };
        let invalid =
            |e: ignore::Error| RevscopeError::InvalidArgument(format!("invalid file pattern `{}`: {}", glob, e));

        let mut builder = GitignoreBuilder::new("");
        builder.add_line(None, glob).map_err(invalid)?;
        Ok(Self(Some(builder.build().map_err(invalid)?)))
    }

    fn matches(&self, path: &str) -> bool {
        match &self.0 {
            Some(matcher) => matcher.matched_path_or_any_parents(path, false).is_ignore(),
            None => true,
        }
    }

    /// Keep only the per-file sections of `diff` whose path matches.
    fn diff(&self, diff: &str) -> String {
        if self.0.is_none() {
            return diff.to_string();
        }
        let mut out = String::new();
        let mut keep = false;
        for line in diff.split_inclusive('\n') {
            if let Some(rest) = line.strip_prefix("diff --git ") {
                let path = rest
                    .trim_end()
                    .rsplit_once(" b/")
                    .map(|(_, b)| b)
                    .unwrap_or("");
                keep = self.matches(path);
            }
            if keep {
                out.push_str(line);
            }
        }
        out
    }
}

// ============================================================================
// Languages
// ============================================================================

/// Language tag for a path, by extension or well-known file name.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let name = Path::new(path).file_name()?.to_str()?;
    match name {
        "Dockerfile" | "Containerfile" => return Some("dockerfile"),
        "Makefile" | "GNUmakefile" => return Some("make"),
        "Gemfile" | "Rakefile" => return Some("ruby"),
        _ => {}
    }
    let ext = Path::new(name).extension()?.to_str()?;
    extension_to_language(ext)
}

fn extension_to_language(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "rs" => Some("rust"),
        "js" | "mjs" | "cjs" | "jsx" => Some("javascript"),
        "ts" | "mts" | "cts" | "tsx" => Some("typescript"),
        "vue" => Some("vue"),
        "svelte" => Some("svelte"),
        "py" | "pyi" => Some("python"),
        "go" => Some("go"),
        "java" => Some("java"),
        "kt" | "kts" => Some("kotlin"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some("cpp"),
        "cs" => Some("csharp"),
        "rb" | "rake" | "gemspec" => Some("ruby"),
        "php" => Some("php"),
        "swift" => Some("swift"),
        "dart" => Some("dart"),
        "scala" => Some("scala"),
        "ex" | "exs" => Some("elixir"),
        "sh" | "bash" | "zsh" => Some("shell"),
        "html" | "htm" => Some("html"),
        "css" | "scss" | "sass" | "less" => Some("css"),
        "sql" => Some("sql"),
        "json" => Some("json"),
        "yaml" | "yml" => Some("yaml"),
        "toml" => Some("toml"),
        "xml" => Some("xml"),
        "proto" => Some("protobuf"),
        "graphql" | "gql" => Some("graphql"),
        "md" | "markdown" => Some("markdown"),
        "tf" | "tfvars" => Some("terraform"),
        "lua" => Some("lua"),
        "zig" => Some("zig"),
        _ => None,
    }
}

// ============================================================================
// Context
// ============================================================================

/// Text files under `dir`, honoring ignore files, sorted.
fn walk_context_dir(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        tracing::warn!("Context path {} is not a directory", dir.display());
        return Vec::new();
    }

    let mut paths = Vec::new();
    let walker = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(true)
        .follow_links(false)
        .build();
    for result in walker {
        match result {
            Ok(entry) if entry.file_type().map(|t| t.is_file()).unwrap_or(false) => {
                paths.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("Skipping context entry: {}", e),
        }
    }
    paths.sort();
    paths
}

/// `.review-context.md` files in the root and in every directory on the way
/// to a changed file, outermost first.
fn directory_context_files(root: &Path, files: &[FileChange]) -> Vec<PathBuf> {
    let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
    dirs.insert(PathBuf::new());
    for file in files {
        let mut dir = Path::new(&file.path).parent();
        while let Some(d) = dir {
            if !dirs.insert(d.to_path_buf()) {
                break;
            }
            dir = d.parent();
        }
    }

    let mut ordered: Vec<PathBuf> = dirs.into_iter().collect();
    ordered.sort_by_key(|d| (d.components().count(), d.clone()));
    ordered
        .into_iter()
        .map(|d| root.join(d).join(CONTEXT_FILENAME))
        .filter(|p| p.is_file())
        .collect()
}

fn read_context(path: PathBuf, source: ContextSource) -> ContextFile {
    let too_large = fs::metadata(&path)
        .map(|m| m.len() > MAX_CONTEXT_FILE_BYTES)
        .unwrap_or(true);
    let content = if too_large {
        tracing::debug!("Not inlining context file {}", path.display());
        None
    } else {
        fs::read_to_string(&path).ok()
    };
    ContextFile {
        path,
        source,
        content,
    }
}

// ============================================================================
// Review file
// ============================================================================

/// `<REVIEW_ROOT_PATH>/<org>/<repo>/<label>.md`, relative roots resolved
/// against the repository root.
pub fn review_file_path(
    repo_root: &Path,
    settings: &Settings,
    identity: &RepoIdentity,
    label: &str,
) -> PathBuf {
    let base = if settings.review_root_path.is_absolute() {
        settings.review_root_path.clone()
    } else {
        repo_root.join(&settings.review_root_path)
    };
    base.join(&identity.org)
        .join(&identity.repo)
        .join(format!("{}.md", label))
}
