//! Configuration loading for revscope.
//!
//! The config file is a plain `KEY=VALUE` file. It is never executed or
//! sourced: lines are parsed one by one and only a fixed whitelist of keys
//! ([`CONFIG_WHITELIST`]) ever becomes an effective setting. Other keys that
//! are syntactically valid are accepted and ignored so that newer files keep
//! working with older binaries.
//!
//! Before the file is read, its metadata is checked: it must be owned by the
//! effective user and must not be group- or world-writable. A file failing
//! either check is rejected with [`RevscopeError::ConfigSecurityViolation`];
//! the loader never repairs permissions itself.
//!
//! ## Precedence
//!
//! 1. Environment variables named like the keys (`REVIEW_ROOT_PATH`, ...)
//! 2. Config file (`~/.config/revscope/config` or the path passed in)
//! 3. Built-in defaults
//!
//! The result is an immutable [`Settings`] value that callers pass explicitly
//! to the components that need it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILENAME, CONFIG_WHITELIST, DEFAULT_DIFF_CONTEXT_LINES,
    DEFAULT_REVIEW_ROOT, KEY_CONTEXT_PATH, KEY_DIFF_CONTEXT_LINES, KEY_REVIEW_ROOT_PATH,
};
use crate::errors::RevscopeError;

// ============================================================================
// SettingSource
// ============================================================================

/// Where an effective setting value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingSource {
    /// Built-in default.
    Default,
    /// The config file.
    File,
    /// An environment variable.
    Env,
}

impl std::fmt::Display for SettingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::File => write!(f, "file"),
            Self::Env => write!(f, "env"),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Effective settings for one invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Root directory review reports are written under.
    pub review_root_path: PathBuf,

    /// Directory with shared context files, if configured.
    pub context_path: Option<PathBuf>,

    /// Context lines for `git diff -U<n>`.
    pub diff_context_lines: u32,

    /// The config file that was read, if any.
    pub config_file: Option<PathBuf>,

    /// Source of each whitelisted key.
    pub sources: BTreeMap<String, SettingSource>,
}

impl Default for Settings {
    fn default() -> Self {
        let sources = CONFIG_WHITELIST
            .iter()
            .map(|k| (k.to_string(), SettingSource::Default))
            .collect();
        Self {
            review_root_path: PathBuf::from(DEFAULT_REVIEW_ROOT),
            context_path: None,
            diff_context_lines: DEFAULT_DIFF_CONTEXT_LINES,
            config_file: None,
            sources,
        }
    }
}

impl Settings {
    /// Load settings from `path` (or the default location) and the process
    /// environment.
    ///
    /// A missing file is not an error; defaults are used.
    ///
    /// # Errors
    ///
    /// Returns [`RevscopeError::ConfigSecurityViolation`] if the file exists
    /// but fails the ownership/permission checks.
    pub fn load(path: Option<&Path>) -> Result<Self, RevscopeError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        Self::load_with_env(path.as_deref(), |key| std::env::var(key).ok())
    }

    /// Load settings with an explicit environment lookup.
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<Self, RevscopeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(path) = path {
            if path.is_file() {
                check_file_security(path)?;
                let content = fs::read_to_string(path)?;
                for (key, value) in parse_config(&content) {
                    settings.apply(&key, &value, SettingSource::File);
                }
                settings.config_file = Some(path.to_path_buf());
                tracing::debug!("Loaded config from {}", path.display());
            } else {
                tracing::debug!("No config file at {}; using defaults", path.display());
            }
        }

        for key in CONFIG_WHITELIST {
            if let Some(value) = env(key).filter(|v| !v.is_empty()) {
                settings.apply(key, &value, SettingSource::Env);
            }
        }

        Ok(settings)
    }

    /// Default config path: `<config_dir>/revscope/config`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILENAME))
    }

    fn apply(&mut self, key: &str, value: &str, source: SettingSource) {
        match key {
            KEY_REVIEW_ROOT_PATH => self.review_root_path = PathBuf::from(value),
            KEY_CONTEXT_PATH => self.context_path = Some(PathBuf::from(value)),
            KEY_DIFF_CONTEXT_LINES => match value.parse::<u32>() {
                Ok(n) => self.diff_context_lines = n,
                Err(_) => {
                    tracing::warn!(
                        "Ignoring {}={:?}: not a non-negative integer",
                        KEY_DIFF_CONTEXT_LINES,
                        value
                    );
                    return;
                }
            },
            _ => {
                tracing::debug!("Ignoring unrecognized config key {}", key);
                return;
            }
        }
        self.sources.insert(key.to_string(), source);
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("Invalid regex"))
}

/// Parse `KEY=VALUE` lines into pairs.
///
/// Comment and blank lines are skipped. Lines whose key does not match
/// `^[A-Z_][A-Z0-9_]*$`, or that have no `=`, are ignored entirely. A single
/// pair of matching surrounding quotes is stripped from the value. Every
/// syntactically valid pair is returned, whitelisted or not.
pub fn parse_config(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };

        let key = key.trim_end();
        if !key_pattern().is_match(key) {
            continue;
        }

        pairs.push((key.to_string(), strip_quotes(value.trim()).to_string()));
    }

    pairs
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

// ============================================================================
// Security checks
// ============================================================================

/// Verify the config file is owned by the effective user and not writable by
/// group or others. Only metadata is inspected; the file is not opened.
#[cfg(unix)]
pub fn check_file_security(path: &Path) -> Result<(), RevscopeError> {
    let euid = unsafe { libc::geteuid() };
    check_file_security_for(path, euid)
}

/// Non-Unix platforms have no comparable ownership model; the check passes.
#[cfg(not(unix))]
pub fn check_file_security(_path: &Path) -> Result<(), RevscopeError> {
    Ok(())
}

#[cfg(unix)]
fn check_file_security_for(path: &Path, euid: u32) -> Result<(), RevscopeError> {
    use std::os::unix::fs::MetadataExt;

    let meta = fs::metadata(path)?;

    if meta.uid() != euid {
        return Err(RevscopeError::ConfigSecurityViolation {
            path: path.to_path_buf(),
            reason: format!("owned by uid {}, expected {}", meta.uid(), euid),
        });
    }

    let mode = meta.mode();
    if mode & 0o022 != 0 {
        return Err(RevscopeError::ConfigSecurityViolation {
            path: path.to_path_buf(),
            reason: format!("writable by group or others (mode {:o})", mode & 0o777),
        });
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[cfg(unix)]
    fn write_config(dir: &TempDir, content: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("config");
        fs::write(&path, content).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_parse_config_basic() {
        let pairs = parse_config("REVIEW_ROOT_PATH=/tmp/reviews\nDIFF_CONTEXT_LINES=5\n");
        assert_eq!(
            pairs,
            vec![
                ("REVIEW_ROOT_PATH".to_string(), "/tmp/reviews".to_string()),
                ("DIFF_CONTEXT_LINES".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_config_skips_comments_and_blanks() {
        let pairs = parse_config("# comment\n\n   # indented comment\nCONTEXT_PATH=ctx\n");
        assert_eq!(pairs, vec![("CONTEXT_PATH".to_string(), "ctx".to_string())]);
    }

    #[test]
    fn test_parse_config_strips_quotes() {
        let pairs = parse_config("A=\"double\"\nB='single'\nC=\"mismatched'\n");
        assert_eq!(pairs[0].1, "double");
        assert_eq!(pairs[1].1, "single");
        assert_eq!(pairs[2].1, "\"mismatched'");
    }

    #[test]
    fn test_parse_config_rejects_invalid_keys() {
        let pairs = parse_config("lower=1\n1ABC=2\nexport FOO=3\nNO_EQUALS\nGOOD_KEY=4\n");
        assert_eq!(pairs, vec![("GOOD_KEY".to_string(), "4".to_string())]);
    }

    #[test]
    fn test_parse_config_keeps_command_text_literal() {
        let pairs = parse_config("REVIEW_ROOT_PATH=$(rm -rf /)\n");
        assert_eq!(pairs[0].1, "$(rm -rf /)");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let settings =
            Settings::load_with_env(Some(&temp.path().join("absent")), no_env).unwrap();
        assert_eq!(settings.review_root_path, PathBuf::from(DEFAULT_REVIEW_ROOT));
        assert_eq!(settings.diff_context_lines, DEFAULT_DIFF_CONTEXT_LINES);
        assert!(settings.context_path.is_none());
        assert!(settings.config_file.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn test_load_applies_whitelist_only() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            &temp,
            "REVIEW_ROOT_PATH=/r\nCONTEXT_PATH='/c'\nDIFF_CONTEXT_LINES=10\nPATH=/evil\n",
            0o600,
        );

        let settings = Settings::load_with_env(Some(&path), no_env).unwrap();
        assert_eq!(settings.review_root_path, PathBuf::from("/r"));
        assert_eq!(settings.context_path, Some(PathBuf::from("/c")));
        assert_eq!(settings.diff_context_lines, 10);
        assert_eq!(settings.sources[KEY_REVIEW_ROOT_PATH], SettingSource::File);
        assert!(!settings.sources.contains_key("PATH"));
    }

    #[test]
    #[cfg(unix)]
    fn test_invalid_context_lines_ignored() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp, "DIFF_CONTEXT_LINES=lots\n", 0o600);
        let settings = Settings::load_with_env(Some(&path), no_env).unwrap();
        assert_eq!(settings.diff_context_lines, DEFAULT_DIFF_CONTEXT_LINES);
        assert_eq!(settings.sources[KEY_DIFF_CONTEXT_LINES], SettingSource::Default);
    }

    #[test]
    #[cfg(unix)]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp, "DIFF_CONTEXT_LINES=10\n", 0o600);
        let settings = Settings::load_with_env(Some(&path), |k| {
            (k == KEY_DIFF_CONTEXT_LINES).then(|| "1".to_string())
        })
        .unwrap();
        assert_eq!(settings.diff_context_lines, 1);
        assert_eq!(settings.sources[KEY_DIFF_CONTEXT_LINES], SettingSource::Env);
    }

    #[test]
    #[cfg(unix)]
    fn test_world_writable_config_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp, "REVIEW_ROOT_PATH=/r\n", 0o666);
        let result = Settings::load_with_env(Some(&path), no_env);
        assert!(matches!(
            result,
            Err(RevscopeError::ConfigSecurityViolation { .. })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_group_writable_config_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp, "REVIEW_ROOT_PATH=/r\n", 0o620);
        assert!(Settings::load_with_env(Some(&path), no_env).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn test_wrong_owner_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp, "REVIEW_ROOT_PATH=/r\n", 0o600);
        let euid = unsafe { libc::geteuid() };
        let result = check_file_security_for(&path, euid.wrapping_add(1));
        match result {
            Err(RevscopeError::ConfigSecurityViolation { reason, .. }) => {
                assert!(reason.contains("owned by uid"));
            }
            other => panic!("Expected ConfigSecurityViolation, got {:?}", other),
        }
    }
}
