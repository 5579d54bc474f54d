//! In-memory fakes for unit tests.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::errors::RevscopeError;
use crate::git::{GitQueries, PullRequestLister, PullRequestMetadata, PullRequestSummary};

/// Scriptable repository state.
#[derive(Debug)]
pub(crate) struct FakeRepo {
    pub available: bool,
    pub objects: HashMap<String, String>,
    pub local_branches: HashSet<String>,
    pub remote_branches: HashSet<String>,
    pub current: Option<String>,
    pub default_branch: Option<String>,
    pub dirty: bool,
    pub upstream: Option<String>,
    pub ahead_behind: Option<(u32, u32)>,
    pub run_output: Option<String>,
    pub run_outputs: HashMap<String, String>,
    pub calls: Cell<usize>,
}

impl Default for FakeRepo {
    fn default() -> Self {
        Self {
            available: true,
            objects: HashMap::new(),
            local_branches: HashSet::new(),
            remote_branches: HashSet::new(),
            current: None,
            default_branch: None,
            dirty: false,
            upstream: None,
            ahead_behind: None,
            run_output: None,
            run_outputs: HashMap::new(),
            calls: Cell::new(0),
        }
    }
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn branch(mut self, name: &str) -> Self {
        self.local_branches.insert(name.to_string());
        self.objects.insert(name.to_string(), "commit".to_string());
        self
    }

    pub fn remote_branch(mut self, name: &str) -> Self {
        self.remote_branches.insert(name.to_string());
        self.objects.insert(name.to_string(), "commit".to_string());
        self
    }

    pub fn commit(mut self, rev: &str) -> Self {
        self.objects.insert(rev.to_string(), "commit".to_string());
        self
    }

    pub fn tag(mut self, name: &str) -> Self {
        self.objects.insert(name.to_string(), "tag".to_string());
        self
    }

    pub fn on(mut self, branch: &str) -> Self {
        self.current = Some(branch.to_string());
        self.objects.entry(branch.to_string()).or_insert_with(|| "commit".to_string());
        self.objects.insert("HEAD".to_string(), "commit".to_string());
        self
    }

    pub fn default_branch(mut self, name: &str) -> Self {
        self.default_branch = Some(name.to_string());
        self
    }

    pub fn dirty(mut self) -> Self {
        self.dirty = true;
        self
    }

    pub fn tracking(mut self, upstream: &str, ahead: u32, behind: u32) -> Self {
        self.upstream = Some(upstream.to_string());
        self.ahead_behind = Some((ahead, behind));
        self
    }

    /// Make every `run` call succeed with `stdout`.
    pub fn run_output(mut self, stdout: &str) -> Self {
        self.run_output = Some(stdout.to_string());
        self
    }

    /// Make `run` calls that include `arg` succeed with `stdout`.
    pub fn run_output_for(mut self, arg: &str, stdout: &str) -> Self {
        self.run_outputs.insert(arg.to_string(), stdout.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.get()
    }

    fn tick(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

impl GitQueries for FakeRepo {
    fn is_available(&self) -> bool {
        self.tick();
        self.available
    }

    fn verify_commit(&self, rev: &str) -> bool {
        self.tick();
        matches!(self.objects.get(rev).map(String::as_str), Some("commit" | "tag"))
    }

    fn object_type(&self, rev: &str) -> Option<String> {
        self.tick();
        self.objects.get(rev).cloned()
    }

    fn local_branch_exists(&self, name: &str) -> bool {
        self.tick();
        self.local_branches.contains(name)
    }

    fn remote_branch_exists(&self, name: &str) -> bool {
        self.tick();
        self.remote_branches.contains(name)
    }

    fn current_branch(&self) -> Result<String, RevscopeError> {
        self.tick();
        self.current.clone().ok_or_else(|| RevscopeError::InvalidRef {
            name: "HEAD".into(),
            detail: "not a git repository".into(),
        })
    }

    fn remote_default_branch(&self) -> Option<String> {
        self.tick();
        self.default_branch.clone()
    }

    fn has_uncommitted_changes(&self) -> Result<bool, RevscopeError> {
        self.tick();
        Ok(self.dirty)
    }

    fn upstream(&self) -> Option<String> {
        self.tick();
        self.upstream.clone()
    }

    fn ahead_behind(&self, _upstream: &str) -> Option<(u32, u32)> {
        self.tick();
        self.ahead_behind
    }

    fn remote_url(&self) -> Option<String> {
        self.tick();
        None
    }

    fn repo_root(&self) -> PathBuf {
        PathBuf::from("/fake/repo")
    }

    fn run(&self, args: &[&str]) -> Result<String, RevscopeError> {
        self.tick();
        if let Some(stdout) = args.iter().find_map(|a| self.run_outputs.get(*a)) {
            return Ok(stdout.clone());
        }
        if let Some(stdout) = &self.run_output {
            return Ok(stdout.clone());
        }
        Err(RevscopeError::GitCommandFailed {
            args: args.join(" "),
            stderr: "fake repository".into(),
        })
    }
}

/// Scriptable PR backend. `None` simulates an unavailable `gh`.
#[derive(Debug, Default)]
pub(crate) struct FakePrs {
    pub prs: Option<Vec<PullRequestSummary>>,
}

impl FakePrs {
    pub fn unavailable() -> Self {
        Self { prs: None }
    }

    pub fn with(numbers: &[u64]) -> Self {
        Self {
            prs: Some(
                numbers
                    .iter()
                    .map(|&number| PullRequestSummary {
                        number,
                        url: format!("https://github.com/acme/widgets/pull/{}", number),
                        title: format!("PR {}", number),
                    })
                    .collect(),
            ),
        }
    }
}

impl PullRequestLister for FakePrs {
    fn open_prs_for_branch(&self, _branch: &str) -> Result<Vec<PullRequestSummary>, RevscopeError> {
        self.prs.clone().ok_or_else(|| RevscopeError::ExternalToolMissing {
            tool: "gh".into(),
            reason: "not found on PATH".into(),
        })
    }

    fn metadata(&self, number: u64) -> Result<PullRequestMetadata, RevscopeError> {
        Err(anyhow::anyhow!("no metadata for #{}", number).into())
    }

    fn diff(&self, number: u64) -> Result<String, RevscopeError> {
        Err(anyhow::anyhow!("no diff for #{}", number).into())
    }
}
