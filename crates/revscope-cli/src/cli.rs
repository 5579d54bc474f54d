//! CLI definition and command dispatch for revscope.
//!
//! This module defines the command-line interface using `clap` and provides
//! the `run()` function that dispatches commands to the engine.
//!
//! ## Output Contract
//!
//! - `resolve` and the `session get-*` commands write JSON (or a bare value)
//!   to stdout and nothing else.
//! - Logs and styled error messages go to stderr.
//! - Exit code 1 means the command failed or `resolve` produced an `error`
//!   target.
//!
//! ## Configuration Precedence
//!
//! 1. Environment variables (`REVIEW_ROOT_PATH`, `CONTEXT_PATH`, `DIFF_CONTEXT_LINES`)
//! 2. Config file (`--config`, `REVSCOPE_CONFIG`, or `~/.config/revscope/config`)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser, Subcommand};

use crate::ui::{table, ColorMode, MessageType, Style};

use revscope_core::debug::{self, DebugSink, NoopDebug};
use revscope_core::{
    ReviewMode, ReviewTarget, RevscopeEngine, RevscopeError, SessionRequest,
};

// ============================================================================
// CLI Definition
// ============================================================================

/// Version string including git commit hash
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// Resolve what to review from a single argument
#[derive(Parser, Debug)]
#[command(name = "revscope")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging on stderr)
    #[arg(short, long, global = true, env = "REVSCOPE_VERBOSE")]
    pub verbose: bool,

    /// Path to configuration file (default: ~/.config/revscope/config)
    #[arg(long, global = true, env = "REVSCOPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Color output mode: always, never, or auto (default: auto)
    #[arg(long, global = true, env = "REVSCOPE_COLOR", default_value = "auto")]
    pub color: String,

    /// Repository to operate on
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify one argument and print the review target as JSON
    #[command(after_help = r#"EXAMPLES:
    # Review the current work (uncommitted changes or branch)
    revscope resolve

    # Area keyword, PR number, PR URL, range, branch or commit
    revscope resolve security
    revscope resolve 123
    revscope resolve https://github.com/acme/widgets/pull/123
    revscope resolve main..feature
    revscope resolve feature/login

    # Restrict to matching files
    revscope resolve feature/login --files 'src/**/*.rs'
"#)]
    Resolve {
        /// Free-form argument; omit to review the current work
        arg: Option<String>,

        /// Glob restricting which files are reviewed
        #[arg(long)]
        files: Option<String>,
    },

    /// Create and query review sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Inspect and clean debug captures
    Debug {
        #[command(subcommand)]
        action: DebugAction,
    },

    /// Show effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Session subcommands
#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Resolve, compute the bundle once, and print the new session id
    #[command(after_help = r#"EXAMPLES:
    # Auto-detect from a free-form argument
    revscope session init feature/login

    # Explicit mode with a base override
    revscope session init feature/login --mode branch --base develop

    # Then query it
    revscope session get-status <ID>
"#)]
    Init {
        /// Argument to resolve (may be empty)
        identifier: String,

        /// Review mode: auto, local, branch, commit, range, pr, area
        #[arg(long, default_value = "auto")]
        mode: String,

        /// Glob restricting which files are reviewed
        #[arg(long)]
        files: Option<String>,

        /// Base branch override
        #[arg(long)]
        base: Option<String>,
    },

    /// Print the session status
    GetStatus { id: String },

    /// Print the error payload of an `error` session
    GetErrorData { id: String },

    /// Print the payload of an `ambiguous` session
    GetAmbiguousData { id: String },

    /// Print the payload of a `prompt` session
    GetPromptData { id: String },

    /// Print the payload of a `prompt_pull` session
    GetPromptPullData { id: String },

    /// Print the payload of a `find` session
    GetFindData { id: String },

    /// Print the path of a `ready` session's record
    GetSessionFile { id: String },

    /// Remove a session (succeeds if already gone)
    Cleanup { id: String },

    /// List sessions under the session root
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remove sessions older than the given age
    Sweep {
        /// Maximum age in hours
        #[arg(long, value_name = "HOURS")]
        older_than_hours: u32,
    },
}

/// Debug capture subcommands
#[derive(Subcommand, Debug)]
pub enum DebugAction {
    /// List captures under the debug directory, newest first
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remove old captures
    #[command(group(ArgGroup::new("which").required(true).args(["older_than_days", "all"])))]
    Clean {
        /// Remove captures older than this many days
        #[arg(long, value_name = "DAYS")]
        older_than_days: Option<u32>,

        /// Remove every capture
        #[arg(long)]
        all: bool,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show effective settings and where each value came from
    Show {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Entry point
// ============================================================================

type CmdResult = Result<ExitCode, RevscopeError>;

/// Parse CLI arguments and dispatch to the appropriate command handler.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Warnings always; debug only with --verbose. Logs never touch stdout.
    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = format!("revscope_core={},revscope_cli={}", log_level, log_level);

    tracing_subscriber::fmt()
        .with_env_filter(&filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let style = Style::new(ColorMode::parse(&cli.color).unwrap_or_default());

    let engine = match &cli.config {
        Some(config_path) => RevscopeEngine::with_config(config_path, &cli.repo),
        None => RevscopeEngine::with_defaults(&cli.repo),
    };

    let engine = match engine {
        Ok(engine) => engine,
        Err(e) => {
            // `resolve` callers parse stdout; keep the contract on startup failure too.
            if matches!(cli.command, Command::Resolve { .. }) {
                print_json(&ReviewTarget::from_error(&e));
            }
            let hint = match &e {
                RevscopeError::ConfigSecurityViolation { .. } => {
                    Some("chown the file to your user and chmod go-w it")
                }
                _ => None,
            };
            eprintln!(
                "{}",
                style.error_with_context("Failed to initialize revscope", Some(&e.to_string()), hint)
            );
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Resolve { arg, files } => handle_resolve(&style, &engine, arg, files),
        Command::Session { action } => handle_session(&style, &engine, action),
        Command::Debug { action } => handle_debug(&style, action),
        Command::Config { action } => handle_config(&style, &engine, action),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", style.message(MessageType::Err, &e.to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Choose the debug sink for a run. Identity is only looked up when recording.
fn open_debug(engine: &RevscopeEngine, mode: &str, identifier: &str) -> Box<dyn DebugSink> {
    if !debug::enabled_from_env() {
        return Box::new(NoopDebug);
    }
    debug::select(true, &debug::debug_base(), &engine.identity(), mode, identifier)
}

fn close_debug(debug: &dyn DebugSink) {
    match debug.finalize() {
        Ok(Some(readme)) => tracing::info!("Debug summary: {}", readme.display()),
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to finalize debug capture: {}", e),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("Failed to serialize output: {}", e),
    }
}

// ============================================================================
// Command handlers
// ============================================================================

fn handle_resolve(
    style: &Style,
    engine: &RevscopeEngine,
    arg: Option<String>,
    files: Option<String>,
) -> CmdResult {
    let debug = open_debug(engine, "auto", arg.as_deref().unwrap_or(""));
    let resolution = engine.resolve(arg.as_deref(), files.as_deref(), debug.as_ref());
    close_debug(debug.as_ref());

    for warning in &resolution.warnings {
        eprintln!("{}", style.message(MessageType::Warn, warning));
    }
    print_json(&resolution);

    Ok(if resolution.target.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn handle_session(style: &Style, engine: &RevscopeEngine, action: SessionAction) -> CmdResult {
    let debug = NoopDebug;
    let sessions = engine.sessions(&debug);

    match action {
        SessionAction::Init {
            identifier,
            mode,
            files,
            base,
        } => return handle_session_init(engine, identifier, &mode, files, base),
        SessionAction::GetStatus { id } => println!("{}", sessions.get_status(&id)?),
        SessionAction::GetErrorData { id } => print_json(&sessions.get_error_data(&id)?),
        SessionAction::GetAmbiguousData { id } => print_json(&sessions.get_ambiguous_data(&id)?),
        SessionAction::GetPromptData { id } => print_json(&sessions.get_prompt_data(&id)?),
        SessionAction::GetPromptPullData { id } => {
            print_json(&sessions.get_prompt_pull_data(&id)?)
        }
        SessionAction::GetFindData { id } => print_json(&sessions.get_find_data(&id)?),
        SessionAction::GetSessionFile { id } => {
            println!("{}", sessions.get_session_file(&id)?.display())
        }
        SessionAction::Cleanup { id } => sessions.cleanup(&id)?,
        SessionAction::List { json } => {
            let list = sessions.list()?;
            if json {
                print_json(&list);
            } else if list.is_empty() {
                println!(
                    "{}",
                    style.message(
                        MessageType::Info,
                        &format!("No sessions under {}", sessions.root().display())
                    )
                );
            } else {
                println!("{}", table::render_sessions_table(&list));
            }
        }
        SessionAction::Sweep { older_than_hours } => {
            let removed = sessions.sweep(chrono::Duration::hours(i64::from(older_than_hours)))?;
            for id in removed {
                println!("{}", id);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn handle_session_init(
    engine: &RevscopeEngine,
    identifier: String,
    mode: &str,
    files: Option<String>,
    base: Option<String>,
) -> CmdResult {
    let mode: ReviewMode = mode.parse()?;
    let debug = open_debug(engine, mode.as_str(), &identifier);

    let request = SessionRequest {
        identifier,
        mode,
        file_pattern: files,
        base,
    };
    let id = engine.sessions(debug.as_ref()).init(&request);
    close_debug(debug.as_ref());

    println!("{}", id?);
    Ok(ExitCode::SUCCESS)
}

fn handle_debug(style: &Style, action: DebugAction) -> CmdResult {
    let base = debug::debug_base();

    match action {
        DebugAction::List { json } => {
            let captures = debug::list_captures(&base)?;
            if json {
                print_json(&captures);
            } else if captures.is_empty() {
                println!(
                    "{}",
                    style.message(
                        MessageType::Info,
                        &format!("No debug captures under {}", style.path(&base.display().to_string()))
                    )
                );
                println!(
                    "{}",
                    style.message(MessageType::Hint, "Set REVSCOPE_DEBUG=1 to record one")
                );
            } else {
                println!("{}", table::render_captures_table(&captures));
            }
        }
        DebugAction::Clean {
            older_than_days,
            all,
        } => {
            let max_age = if all {
                None
            } else {
                older_than_days.map(|days| chrono::Duration::days(i64::from(days)))
            };
            let removed = debug::sweep_captures(&base, max_age)?;
            println!(
                "{}",
                style.message(
                    MessageType::Ok,
                    &format!("Removed {} debug capture(s)", removed.len())
                )
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn handle_config(style: &Style, engine: &RevscopeEngine, action: ConfigAction) -> CmdResult {
    match action {
        ConfigAction::Show { json } => {
            let settings = engine.settings();
            if json {
                print_json(settings);
                return Ok(ExitCode::SUCCESS);
            }

            let config_file = settings
                .config_file
                .as_ref()
                .map(|p| style.path(&p.display().to_string()))
                .unwrap_or_else(|| "none".to_string());
            println!("{}", style.section("CONFIG"));
            println!("{}", style.key_value("Config file", &config_file));
            println!(
                "{}",
                style.key_value("Session root", &style.path(&engine.session_root().display().to_string()))
            );
            println!(
                "{}",
                style.key_value("Debug directory", &style.path(&debug::debug_base().display().to_string()))
            );
            println!();
            println!("{}", table::render_settings_table(settings));
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_session_init() {
        let cli = Cli::try_parse_from([
            "revscope", "session", "init", "feature", "--mode", "branch", "--base", "develop",
        ])
        .unwrap();
        match cli.command {
            Command::Session {
                action: SessionAction::Init { identifier, mode, base, files },
            } => {
                assert_eq!(identifier, "feature");
                assert_eq!(mode, "branch");
                assert_eq!(base.as_deref(), Some("develop"));
                assert!(files.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_debug_clean_requires_age_or_all() {
        assert!(Cli::try_parse_from(["revscope", "debug", "clean"]).is_err());
        assert!(Cli::try_parse_from(["revscope", "debug", "clean", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["revscope", "debug", "clean", "--older-than-days", "3"]).is_ok());
    }

    #[test]
    fn test_resolve_arg_is_optional() {
        let cli = Cli::try_parse_from(["revscope", "resolve"]).unwrap();
        assert!(matches!(cli.command, Command::Resolve { arg: None, files: None }));
    }
}
