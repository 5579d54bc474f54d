//! Base branch discovery.
//!
//! Picks the ref a feature branch is compared against. Local branches are
//! preferred over remote-tracking ones so that comparisons use what the user
//! already has checked out; remote-tracking refs keep fresh clones working.

use crate::git::GitQueries;

/// Returned when nothing in the fallback chain exists.
pub const LAST_RESORT_BASE: &str = "main";

/// Names tried when the remote's default branch is unknown or missing locally.
const FALLBACK_CHAIN: &[(&str, bool)] = &[
    ("main", false),
    ("origin/main", true),
    ("master", false),
    ("origin/master", true),
];

/// Locate the base branch. Never fails.
///
/// Order, first hit wins:
/// 1. The remote default branch, as a local branch, then as `origin/<name>`.
/// 2. `main`, `origin/main`, `master`, `origin/master`.
/// 3. The literal `main`; later git calls surface the real problem.
pub fn locate_base(git: &dyn GitQueries) -> String {
    if let Some(default) = git.remote_default_branch() {
        if git.local_branch_exists(&default) {
            tracing::debug!("Base branch: local default `{}`", default);
            return default;
        }
        let remote = format!("origin/{}", default);
        if git.remote_branch_exists(&remote) {
            tracing::debug!("Base branch: remote default `{}`", remote);
            return remote;
        }
    }

    for (name, is_remote) in FALLBACK_CHAIN {
        let exists = if *is_remote {
            git.remote_branch_exists(name)
        } else {
            git.local_branch_exists(name)
        };
        if exists {
            tracing::debug!("Base branch: fallback `{}`", name);
            return (*name).to_string();
        }
    }

    tracing::debug!("Base branch: nothing found, using `{}`", LAST_RESORT_BASE);
    LAST_RESORT_BASE.to_string()
}

/// Whether `branch` is the base branch, treating `origin/<b>` and `<b>` alike.
pub fn is_base_branch(branch: &str, base: &str) -> bool {
    branch == base || base.strip_prefix("origin/") == Some(branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRepo;

    #[test]
    fn test_prefers_local_default_branch() {
        let repo = FakeRepo::new()
            .default_branch("develop")
            .branch("develop")
            .branch("main");
        assert_eq!(locate_base(&repo), "develop");
    }

    #[test]
    fn test_remote_default_when_no_local() {
        let repo = FakeRepo::new()
            .default_branch("trunk")
            .remote_branch("origin/trunk")
            .branch("main");
        assert_eq!(locate_base(&repo), "origin/trunk");
    }

    #[test]
    fn test_default_missing_falls_through_chain() {
        let repo = FakeRepo::new().default_branch("gone").branch("master");
        assert_eq!(locate_base(&repo), "master");
    }

    #[test]
    fn test_no_default_local_master() {
        let repo = FakeRepo::new().branch("master");
        assert_eq!(locate_base(&repo), "master");
    }

    #[test]
    fn test_origin_main_before_local_master() {
        let repo = FakeRepo::new().remote_branch("origin/main").branch("master");
        assert_eq!(locate_base(&repo), "origin/main");
    }

    #[test]
    fn test_nothing_exists_returns_main() {
        let repo = FakeRepo::new();
        assert_eq!(locate_base(&repo), LAST_RESORT_BASE);
    }

    #[test]
    fn test_is_base_branch() {
        assert!(is_base_branch("main", "main"));
        assert!(is_base_branch("main", "origin/main"));
        assert!(!is_base_branch("feature", "main"));
    }
}
