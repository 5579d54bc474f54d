//! Recording debug sink.
//!
//! Layout of one capture:
//!
//! ```text
//! <base>/<org>-<repo>-<identifier>-<YYYYMMDD-HHMMSS>/
//!   session.json        run metadata
//!   timing.ndjson       append-only timing events
//!   README.md           written by finalize()
//!   <stage>/            created on first use
//!     commands.log  stdout.log  stderr.log  trace.log  stats.json  *.json  *.txt
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::Utc;

use super::timing::{append_event, pair_durations, read_events, render_readme, TimingEvent};
use super::{DebugSink, SPAWN_FAILED_EXIT_CODE};
use crate::constants::{
    COMMANDS_LOG, ID_TIMESTAMP_FORMAT, README_FILENAME, SESSION_FILENAME, STATS_FILENAME,
    STDERR_LOG, STDOUT_LOG, TIMING_FILENAME, TRACE_LOG,
};
use crate::errors::RevscopeError;
use crate::identity::{sanitize_component, RepoIdentity};
use crate::storage::{create_private_dir, write_atomic};

/// Debug sink that writes everything under one capture directory.
#[derive(Debug)]
pub struct RecordingDebug {
    dir: PathBuf,
    metadata: serde_json::Value,
    stats: RefCell<BTreeMap<String, serde_json::Map<String, serde_json::Value>>>,
}

impl RecordingDebug {
    /// Create a fresh capture directory under `base` and write its metadata.
    pub fn init(
        base: &Path,
        identity: &RepoIdentity,
        mode: &str,
        identifier: &str,
    ) -> Result<Self, RevscopeError> {
        let now = Utc::now();
        let identifier = match sanitize_component(identifier) {
            s if s.is_empty() => "none".to_string(),
            s => s,
        };
        let name = format!(
            "{}-{}-{}-{}",
            identity.org,
            identity.repo,
            identifier,
            now.format(ID_TIMESTAMP_FORMAT)
        );
        let dir = base.join(name);
        create_private_dir(&dir)?;

        let metadata = serde_json::json!({
            "org": identity.org,
            "repo": identity.repo,
            "mode": mode,
            "identifier": identifier,
            "created_at": now.to_rfc3339(),
            "pid": std::process::id(),
            "version": env!("CARGO_PKG_VERSION"),
        });
        write_atomic(
            &dir.join(SESSION_FILENAME),
            serde_json::to_string_pretty(&metadata)?.as_bytes(),
        )?;

        Ok(Self {
            dir,
            metadata,
            stats: RefCell::new(BTreeMap::new()),
        })
    }

    /// The capture directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory for `stage`, created on demand.
    fn stage_dir(&self, stage: &str) -> Result<PathBuf, RevscopeError> {
        let stage = match sanitize_component(stage) {
            s if s.is_empty() => "misc".to_string(),
            s => s,
        };
        let dir = self.dir.join(stage);
        if !dir.exists() {
            create_private_dir(&dir)?;
        }
        Ok(dir)
    }

    /// Path for an artifact, keeping only the final component of `name`.
    fn artifact_path(&self, stage: &str, name: &str) -> Result<PathBuf, RevscopeError> {
        let file = Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "artifact.txt".to_string());
        Ok(self.stage_dir(stage)?.join(file))
    }

    fn append_line(path: &Path, line: &str) -> Result<(), RevscopeError> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn try_save(&self, stage: &str, name: &str, content: &str) -> Result<(), RevscopeError> {
        fs::write(self.artifact_path(stage, name)?, content)?;
        Ok(())
    }

    fn try_trace(&self, stage: &str, message: &str) -> Result<(), RevscopeError> {
        let path = self.stage_dir(stage)?.join(TRACE_LOG);
        Self::append_line(&path, &format!("[{}] {}", Utc::now().to_rfc3339(), message))
    }

    fn try_stats(
        &self,
        stage: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), RevscopeError> {
        let mut stats = self.stats.borrow_mut();
        let entry = stats.entry(stage.to_string()).or_default();
        entry.insert(key.to_string(), value);
        let json = serde_json::to_string_pretty(entry)?;
        fs::write(self.stage_dir(stage)?.join(STATS_FILENAME), json)?;
        Ok(())
    }

    fn try_log_command(&self, stage: &str, command: &mut Command) -> Result<i32, RevscopeError> {
        let dir = self.stage_dir(stage)?;
        let mut line = command.get_program().to_string_lossy().into_owned();
        for arg in command.get_args() {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }

        let open = |name: &str| OpenOptions::new().create(true).append(true).open(dir.join(name));
        let stdout = open(STDOUT_LOG)?;
        let stderr = open(STDERR_LOG)?;

        let started = Utc::now();
        let code = match command
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
        {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                tracing::debug!("Failed to spawn `{}`: {}", line, e);
                SPAWN_FAILED_EXIT_CODE
            }
        };

        report(
            "log command",
            Self::append_line(
                &dir.join(COMMANDS_LOG),
                &format!("[{}] exit={} $ {}", started.to_rfc3339(), code, line),
            ),
        );
        Ok(code)
    }

    fn artifact_counts(&self) -> Result<BTreeMap<String, usize>, RevscopeError> {
        let mut counts = BTreeMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let files = fs::read_dir(entry.path())?
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .count();
            counts.insert(entry.file_name().to_string_lossy().into_owned(), files);
        }
        Ok(counts)
    }
}

/// Recording failures are logged and swallowed.
fn report(what: &str, result: Result<(), RevscopeError>) {
    if let Err(e) = result {
        tracing::warn!("Debug capture: failed to {}: {}", what, e);
    }
}

impl DebugSink for RecordingDebug {
    fn is_enabled(&self) -> bool {
        true
    }

    fn root(&self) -> Option<&Path> {
        Some(&self.dir)
    }

    fn save(&self, stage: &str, name: &str, content: &str) {
        report("save artifact", self.try_save(stage, name, content));
    }

    fn save_json(&self, stage: &str, name: &str, value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => self.save(stage, name, &json),
            Err(e) => report("serialize artifact", Err(e.into())),
        }
    }

    fn log_command(&self, stage: &str, command: &mut Command) -> i32 {
        match self.try_log_command(stage, command) {
            Ok(code) => code,
            Err(e) => {
                // Could not set up the log files; still run the command.
                tracing::warn!("Debug capture: failed to log command: {}", e);
                super::run_quiet(command)
            }
        }
    }

    fn time(&self, stage: &str, event: &str) {
        let path = self.dir.join(TIMING_FILENAME);
        report("record timing", append_event(&path, &TimingEvent::now(stage, event)));
    }

    fn trace(&self, stage: &str, message: &str) {
        report("write trace", self.try_trace(stage, message));
    }

    fn stats(&self, stage: &str, key: &str, value: serde_json::Value) {
        report("write stats", self.try_stats(stage, key, value));
    }

    fn finalize(&self) -> Result<Option<PathBuf>, RevscopeError> {
        let events = read_events(&self.dir.join(TIMING_FILENAME))?;
        let durations = pair_durations(&events);
        let artifacts = self.artifact_counts()?;
        let title = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let readme = render_readme(&title, &self.metadata, &durations, &artifacts);
        let path = self.dir.join(README_FILENAME);
        fs::write(&path, readme)?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn recorder(base: &Path) -> RecordingDebug {
        let identity = RepoIdentity {
            org: "acme".into(),
            repo: "widgets".into(),
        };
        RecordingDebug::init(base, &identity, "auto", "feature/login").unwrap()
    }

    #[test]
    fn test_init_writes_metadata() {
        let dir = TempDir::new().unwrap();
        let rec = recorder(dir.path());

        let name = rec.dir().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("acme-widgets-feature-login-"), "{}", name);

        let meta: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(rec.dir().join(SESSION_FILENAME)).unwrap())
                .unwrap();
        assert_eq!(meta["org"], "acme");
        assert_eq!(meta["mode"], "auto");
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_dir_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let rec = recorder(dir.path());
        let mode = fs::metadata(rec.dir()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_stage_dirs_created_lazily() {
        let dir = TempDir::new().unwrap();
        let rec = recorder(dir.path());
        assert!(!rec.dir().join("diff").exists());

        rec.save("diff", "patch.txt", "diff --git a b");
        rec.save_json("diff", "files.json", &serde_json::json!([{"path": "a.rs"}]));
        assert!(rec.dir().join("diff/patch.txt").exists());
        assert!(rec.dir().join("diff/files.json").exists());
    }

    #[test]
    fn test_save_cannot_escape_stage_dir() {
        let dir = TempDir::new().unwrap();
        let rec = recorder(dir.path());
        rec.save("../outside", "../../evil.txt", "x");
        assert!(!dir.path().join("evil.txt").exists());
        assert!(rec.dir().join("-outside/evil.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_log_command_captures_and_passes_exit_code() {
        let dir = TempDir::new().unwrap();
        let rec = recorder(dir.path());

        let code = rec.log_command(
            "git",
            Command::new("sh").args(["-c", "echo out; echo err >&2; exit 4"]),
        );
        assert_eq!(code, 4);

        let stage = rec.dir().join("git");
        assert_eq!(fs::read_to_string(stage.join(STDOUT_LOG)).unwrap(), "out\n");
        assert_eq!(fs::read_to_string(stage.join(STDERR_LOG)).unwrap(), "err\n");
        let log = fs::read_to_string(stage.join(COMMANDS_LOG)).unwrap();
        assert!(log.contains("exit=4 $ sh -c"));
    }

    #[test]
    fn test_log_command_missing_program() {
        let dir = TempDir::new().unwrap();
        let rec = recorder(dir.path());
        let code = rec.log_command("env", &mut Command::new("revscope-definitely-missing-binary"));
        assert_eq!(code, SPAWN_FAILED_EXIT_CODE);
    }

    #[test]
    fn test_stats_accumulate() {
        let dir = TempDir::new().unwrap();
        let rec = recorder(dir.path());
        rec.stats("bundle", "files", serde_json::json!(3));
        rec.stats("bundle", "lines", serde_json::json!(120));

        let stats: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(rec.dir().join("bundle").join(STATS_FILENAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(stats["files"], 3);
        assert_eq!(stats["lines"], 120);
    }

    #[test]
    fn test_finalize_renders_readme() {
        let dir = TempDir::new().unwrap();
        let rec = recorder(dir.path());
        rec.time("resolve", "start");
        rec.trace("resolve", "resolved as branch");
        rec.time("resolve", "end");

        let readme_path = rec.finalize().unwrap().unwrap();
        let readme = fs::read_to_string(readme_path).unwrap();
        assert!(readme.contains("| resolve |"));
        assert!(readme.contains("`resolve/`: 1 file(s)"));
    }
}
