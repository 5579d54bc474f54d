//! Repository identity (`org`/`repo`) used to name sessions and debug captures.

use serde::{Deserialize, Serialize};

use crate::git::GitQueries;

/// Organization and repository names for the current checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoIdentity {
    /// Owner / organization (`local` when no remote is configured).
    pub org: String,
    /// Repository name.
    pub repo: String,
}

impl RepoIdentity {
    /// Derive the identity from `origin`, falling back to the checkout directory name.
    pub fn detect(git: &dyn GitQueries) -> Self {
        if let Some(identity) = git.remote_url().as_deref().and_then(parse_remote_url) {
            return identity;
        }

        let repo = git
            .repo_root()
            .file_name()
            .and_then(|n| n.to_str())
            .map(sanitize_component)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "repo".to_string());

        Self {
            org: "local".to_string(),
            repo,
        }
    }
}

/// Parse `org/repo` out of an HTTPS, SSH, or scp-style remote URL.
pub fn parse_remote_url(url: &str) -> Option<RepoIdentity> {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);

    let path = if let Some((_, rest)) = url.split_once("://") {
        // scheme://[user@]host[:port]/org/repo
        rest.split_once('/').map(|(_, p)| p)?
    } else if let Some((_, rest)) = url.split_once(':') {
        // git@host:org/repo
        rest
    } else {
        return None;
    };

    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
    let repo = sanitize_component(segments.next()?);
    let org = sanitize_component(segments.next()?);

    if org.is_empty() || repo.is_empty() {
        return None;
    }
    Some(RepoIdentity { org, repo })
}

/// Replace everything outside `[A-Za-z0-9._-]` with `-` so the value is safe
/// inside a directory name.
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(org: &str, repo: &str) -> Option<RepoIdentity> {
        Some(RepoIdentity {
            org: org.to_string(),
            repo: repo.to_string(),
        })
    }

    #[test]
    fn test_parse_https_url() {
        assert_eq!(parse_remote_url("https://github.com/acme/widgets.git"), ident("acme", "widgets"));
        assert_eq!(parse_remote_url("https://github.com/acme/widgets"), ident("acme", "widgets"));
    }

    #[test]
    fn test_parse_scp_url() {
        assert_eq!(parse_remote_url("git@github.com:acme/widgets.git"), ident("acme", "widgets"));
    }

    #[test]
    fn test_parse_ssh_url_with_port() {
        assert_eq!(
            parse_remote_url("ssh://git@example.com:2222/team/tool.git"),
            ident("team", "tool")
        );
    }

    #[test]
    fn test_parse_rejects_local_paths() {
        assert_eq!(parse_remote_url("/srv/git/widgets"), None);
        assert_eq!(parse_remote_url("https://github.com/widgets"), None);
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("feature/login"), "feature-login");
        assert_eq!(sanitize_component("abc..HEAD"), "abc..HEAD");
        assert_eq!(sanitize_component("../etc"), "-etc");
        assert_eq!(sanitize_component("a b$c"), "a-b-c");
    }
}
