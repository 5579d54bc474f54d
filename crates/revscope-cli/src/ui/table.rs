//! Table rendering with comfy-table.
//!
//! | Command | Renderer |
//! |---------|----------|
//! | `revscope debug list` | [`render_captures_table`] |
//! | `revscope session list` | [`render_sessions_table`] |
//! | `revscope config show` | [`render_settings_table`] |

use chrono::Utc;
use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};

use revscope_core::{DebugCapture, SessionSummary, Settings};

use super::color::terminal_width;
use super::format::{format_age, format_bytes, truncate_str};

const NAME_WIDTH: usize = 60;

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(terminal_width());
    table
}

/// Debug captures, newest first.
///
/// ```text
/// CAPTURE                                  CREATED      SIZE   README
/// acme-widgets-feature-20250101-120000     2h ago     4.2 KB   yes
/// ```
pub fn render_captures_table(captures: &[DebugCapture]) -> String {
    if captures.is_empty() {
        return String::new();
    }

    let now = Utc::now();
    let mut table = base_table();
    table.set_header(vec![
        Cell::new("CAPTURE"),
        Cell::new("CREATED"),
        Cell::new("SIZE").set_alignment(CellAlignment::Right),
        Cell::new("README"),
    ]);

    for capture in captures {
        table.add_row(vec![
            Cell::new(truncate_str(&capture.name, NAME_WIDTH)),
            Cell::new(format_age(capture.created_at, now)),
            Cell::new(format_bytes(capture.size_bytes)).set_alignment(CellAlignment::Right),
            Cell::new(if capture.finalized { "yes" } else { "no" }),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Sessions under the session root. Unreadable records show status `-`.
pub fn render_sessions_table(sessions: &[SessionSummary]) -> String {
    if sessions.is_empty() {
        return String::new();
    }

    let now = Utc::now();
    let mut table = base_table();
    table.set_header(vec![Cell::new("SESSION"), Cell::new("STATUS"), Cell::new("CREATED")]);

    for session in sessions {
        let status = session
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(truncate_str(&session.id, NAME_WIDTH)),
            Cell::new(status),
            Cell::new(format_age(session.created_at, now)),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Effective settings with the source of each value.
pub fn render_settings_table(settings: &Settings) -> String {
    let mut table = base_table();
    table.set_header(vec![Cell::new("KEY"), Cell::new("VALUE"), Cell::new("SOURCE")]);

    for (key, source) in &settings.sources {
        let value = match key.as_str() {
            revscope_core::constants::KEY_REVIEW_ROOT_PATH => {
                settings.review_root_path.display().to_string()
            }
            revscope_core::constants::KEY_CONTEXT_PATH => settings
                .context_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            revscope_core::constants::KEY_DIFF_CONTEXT_LINES => {
                settings.diff_context_lines.to_string()
            }
            _ => "-".to_string(),
        };
        table.add_row(vec![Cell::new(key), Cell::new(value), Cell::new(source.to_string())]);
    }

    table.trim_fmt().to_string()
}
